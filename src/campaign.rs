use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::agents::{self, Agent};
use crate::error::AuraError;

pub const BASE_CLIP_SECONDS: u32 = 8;
pub const EXTENSION_SECONDS: u32 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AspectRatio {
    #[default]
    #[serde(rename = "16:9")]
    Landscape,
    #[serde(rename = "9:16")]
    Portrait,
}

impl AspectRatio {
    pub fn as_str(self) -> &'static str {
        match self {
            AspectRatio::Landscape => "16:9",
            AspectRatio::Portrait => "9:16",
        }
    }

    pub fn parse(value: &str) -> Result<Self, AuraError> {
        match value.trim() {
            "16:9" => Ok(AspectRatio::Landscape),
            "9:16" => Ok(AspectRatio::Portrait),
            other => Err(AuraError::invalid(format!(
                "aspectRatio must be 16:9 or 9:16, got '{other}'"
            ))),
        }
    }
}

/// User-supplied brand image, carried as base64 text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceAsset {
    pub mime_type: String,
    pub data: String,
}

impl ReferenceAsset {
    pub fn from_bytes(mime_type: &str, bytes: &[u8]) -> Self {
        Self {
            mime_type: mime_type.trim().to_string(),
            data: STANDARD.encode(bytes),
        }
    }

    /// Parses `data:<mime>;base64,<payload>`.
    pub fn from_data_uri(uri: &str) -> Result<Self, AuraError> {
        let (mime_type, data) = split_data_uri(uri)?;
        let asset = Self {
            mime_type: mime_type.to_string(),
            data: data.to_string(),
        };
        asset.validate()?;
        Ok(asset)
    }

    pub fn to_data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }

    pub fn decode(&self) -> Result<Vec<u8>, AuraError> {
        STANDARD
            .decode(self.data.trim())
            .map_err(|error| AuraError::invalid(format!("referenceAsset is not valid base64: {error}")))
    }

    pub fn validate(&self) -> Result<(), AuraError> {
        if !self.mime_type.starts_with("image/") {
            return Err(AuraError::invalid(format!(
                "referenceAsset must be an image, got '{}'",
                self.mime_type
            )));
        }
        if self.data.trim().is_empty() {
            return Err(AuraError::invalid("referenceAsset data is empty"));
        }
        self.decode().map(|_| ())
    }
}

pub(crate) fn split_data_uri(uri: &str) -> Result<(&str, &str), AuraError> {
    let rest = uri
        .trim()
        .strip_prefix("data:")
        .ok_or_else(|| AuraError::invalid("expected a data: URI"))?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| AuraError::invalid("data URI has no payload"))?;
    let mime_type = header
        .strip_suffix(";base64")
        .ok_or_else(|| AuraError::invalid("data URI must be base64 encoded"))?;
    Ok((mime_type, payload))
}

/// Target length of the compiled campaign video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct VideoDuration(u32);

impl VideoDuration {
    pub const SUPPORTED: [u32; 4] = [8, 15, 30, 60];

    pub fn new(seconds: u32) -> Result<Self, AuraError> {
        if Self::SUPPORTED.contains(&seconds) {
            Ok(Self(seconds))
        } else {
            Err(AuraError::invalid(format!(
                "video duration must be one of 8, 15, 30 or 60 seconds, got {seconds}"
            )))
        }
    }

    pub fn seconds(self) -> u32 {
        self.0
    }
}

impl Default for VideoDuration {
    fn default() -> Self {
        Self(BASE_CLIP_SECONDS)
    }
}

impl TryFrom<u32> for VideoDuration {
    type Error = AuraError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<VideoDuration> for u32 {
    fn from(value: VideoDuration) -> Self {
        value.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoBrief {
    #[serde(rename = "durationSeconds")]
    pub duration: VideoDuration,
    #[serde(default)]
    pub aspect_ratio: AspectRatio,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignRequest {
    pub objective: String,
    pub target_audience: String,
    pub agent_roster: Vec<Agent>,
    #[serde(default)]
    pub reference_asset: Option<ReferenceAsset>,
    #[serde(default)]
    pub fast_mode: bool,
    #[serde(default)]
    pub video: Option<VideoBrief>,
}

impl CampaignRequest {
    pub fn validate(&self) -> Result<(), AuraError> {
        if self.objective.trim().is_empty() {
            return Err(AuraError::invalid("objective is required"));
        }
        if self.target_audience.trim().is_empty() {
            return Err(AuraError::invalid("targetAudience is required"));
        }
        agents::validate_roster(&self.agent_roster)?;
        if let Some(asset) = &self.reference_asset {
            asset.validate()?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CampaignCopy {
    pub headline: String,
    pub body: String,
    pub cta: String,
    pub social_posts: Vec<String>,
    pub email_subject: String,
    pub email_body: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DistributionStep {
    pub channel: String,
    pub action: String,
}

/// Requested against delivered video length. `degradation` explains any
/// shortfall.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoCoverage {
    pub requested_seconds: u32,
    pub delivered_seconds: u32,
    pub extensions_planned: u32,
    pub extensions_completed: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub degradation: Option<String>,
}

impl VideoCoverage {
    pub fn is_degraded(&self) -> bool {
        self.delivered_seconds < self.requested_seconds || self.degradation.is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CampaignResult {
    pub strategy: String,
    pub copy: CampaignCopy,
    pub distribution: Vec<DistributionStep>,
    pub visual_prompt: String,
    pub video_prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visual_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub campaign_asset: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_coverage: Option<VideoCoverage>,
}

impl CampaignResult {
    /// Generated text fields that are absent or blank, by wire name.
    pub fn missing_fields(&self) -> Vec<String> {
        let mut missing = Vec::new();
        let mut check = |name: &str, value: &str| {
            if value.trim().is_empty() {
                missing.push(name.to_string());
            }
        };
        check("strategy", &self.strategy);
        check("copy.headline", &self.copy.headline);
        check("copy.body", &self.copy.body);
        check("copy.cta", &self.copy.cta);
        check("copy.emailSubject", &self.copy.email_subject);
        check("copy.emailBody", &self.copy.email_body);
        check("visualPrompt", &self.visual_prompt);
        check("videoPrompt", &self.video_prompt);

        if !self
            .copy
            .social_posts
            .iter()
            .any(|post| !post.trim().is_empty())
        {
            missing.push("copy.socialPosts".to_string());
        }
        if !self
            .distribution
            .iter()
            .any(|step| !step.channel.trim().is_empty() && !step.action.trim().is_empty())
        {
            missing.push("distribution".to_string());
        }
        missing
    }

    pub fn has_visual(&self) -> bool {
        self.visual_url
            .as_deref()
            .is_some_and(|url| !url.trim().is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutcomeStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// One history entry. `version` increases on every committed visual
/// refinement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignOutcome {
    pub id: String,
    pub name: String,
    pub status: OutcomeStatus,
    pub objective: String,
    pub target_audience: String,
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_activated: Option<bool>,
    #[serde(default)]
    pub results: Option<CampaignResult>,
    #[serde(default)]
    pub version: u64,
}

pub fn outcome_name(objective: &str) -> String {
    let prefix: String = objective.trim().chars().take(30).collect();
    format!("Outcome: {prefix}...")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_uri_round_trips_through_asset() {
        let asset = ReferenceAsset::from_bytes("image/png", b"\x89PNG fake");
        let uri = asset.to_data_uri();
        assert!(uri.starts_with("data:image/png;base64,"));

        let parsed = ReferenceAsset::from_data_uri(&uri).expect("data uri should parse");
        assert_eq!(parsed, asset);
        assert_eq!(parsed.decode().expect("payload should decode"), b"\x89PNG fake");
    }

    #[test]
    fn rejects_non_image_and_bad_payloads() {
        assert!(ReferenceAsset::from_data_uri("data:text/plain;base64,aGVsbG8=").is_err());
        assert!(ReferenceAsset::from_data_uri("data:image/png;base64,@@@").is_err());
        assert!(ReferenceAsset::from_data_uri("https://example.com/logo.png").is_err());
    }

    #[test]
    fn only_supported_durations_deserialize() {
        let brief: VideoBrief =
            serde_json::from_str(r#"{ "durationSeconds": 30, "aspectRatio": "9:16" }"#)
                .expect("brief should parse");
        assert_eq!(brief.duration.seconds(), 30);
        assert_eq!(brief.aspect_ratio, AspectRatio::Portrait);

        assert!(serde_json::from_str::<VideoBrief>(r#"{ "durationSeconds": 20 }"#).is_err());
    }

    #[test]
    fn missing_fields_lists_blank_and_absent_values() {
        let parsed: CampaignResult = serde_json::from_str(
            r#"{ "strategy": "Own the niche", "copy": { "headline": "Brew better", "socialPosts": [" "] } }"#,
        )
        .expect("partial result should parse");

        let missing = parsed.missing_fields();
        assert!(!missing.contains(&"strategy".to_string()));
        assert!(missing.contains(&"copy.body".to_string()));
        assert!(missing.contains(&"copy.socialPosts".to_string()));
        assert!(missing.contains(&"distribution".to_string()));
        assert!(!parsed.has_visual());
    }

    #[test]
    fn outcome_name_truncates_objective() {
        assert_eq!(
            outcome_name("Launch a premium cold brew subscription for commuters"),
            "Outcome: Launch a premium cold brew sub..."
        );
    }

    #[test]
    fn request_requires_objective_and_audience() {
        let request = CampaignRequest {
            objective: "  ".to_string(),
            target_audience: "founders".to_string(),
            agent_roster: agents::default_roster(),
            reference_asset: None,
            fast_mode: false,
            video: None,
        };
        let error = request.validate().expect_err("blank objective must fail");
        assert_eq!(error.to_string(), "objective is required");
    }
}
