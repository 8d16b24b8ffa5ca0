use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::campaign::{split_data_uri, CampaignOutcome, CampaignResult};
use crate::error::AuraError;
use crate::studio::playable_url;

const FORMAT_VERSION: u32 = 1;
const GENERATOR: &str = concat!("auragrowth/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExportMetadata {
    pub outcome_id: String,
    pub outcome_name: String,
    pub objective: String,
    pub target_audience: String,
    pub exported_at: String,
    pub generator: String,
    pub format_version: u32,
    /// Hex sha256 of the serialized campaign result.
    pub sha256: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Blueprint {
    #[serde(flatten)]
    pub result: CampaignResult,
    pub export_metadata: ExportMetadata,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportReport {
    pub written: Vec<PathBuf>,
    pub skipped: Vec<String>,
}

fn results_of(outcome: &CampaignOutcome) -> Result<&CampaignResult, AuraError> {
    outcome
        .results
        .as_ref()
        .ok_or_else(|| AuraError::invalid(format!("outcome '{}' has no results to export", outcome.id)))
}

pub fn blueprint(outcome: &CampaignOutcome) -> Result<Blueprint, AuraError> {
    let result = results_of(outcome)?;
    let digest = Sha256::digest(serde_json::to_vec(result)?);

    Ok(Blueprint {
        result: result.clone(),
        export_metadata: ExportMetadata {
            outcome_id: outcome.id.clone(),
            outcome_name: outcome.name.clone(),
            objective: outcome.objective.clone(),
            target_audience: outcome.target_audience.clone(),
            exported_at: Utc::now().to_rfc3339(),
            generator: GENERATOR.to_string(),
            format_version: FORMAT_VERSION,
            sha256: format!("{digest:x}"),
        },
    })
}

pub fn delivery_guide(outcome: &CampaignOutcome) -> Result<String, AuraError> {
    let result = results_of(outcome)?;
    let copy = &result.copy;
    let mut guide = String::new();

    // Writing into a String cannot fail.
    let _ = writeln!(guide, "AURAGROWTH DELIVERY GUIDE");
    let _ = writeln!(guide, "{}", outcome.name);
    let _ = writeln!(guide, "Objective: {}", outcome.objective);
    let _ = writeln!(guide, "Audience: {}", outcome.target_audience);

    section(&mut guide, "STRATEGY");
    let _ = writeln!(guide, "{}", result.strategy.trim());

    section(&mut guide, "COPY");
    let _ = writeln!(guide, "Headline: {}", copy.headline);
    let _ = writeln!(guide, "Body: {}", copy.body);
    let _ = writeln!(guide, "CTA: {}", copy.cta);
    let _ = writeln!(guide, "Email subject: {}", copy.email_subject);
    let _ = writeln!(guide, "Email body: {}", copy.email_body);

    section(&mut guide, "SOCIAL POSTS");
    for (index, post) in copy.social_posts.iter().enumerate() {
        let _ = writeln!(guide, "{}. {}", index + 1, post);
    }

    section(&mut guide, "DISTRIBUTION PHASES");
    for (index, step) in result.distribution.iter().enumerate() {
        let _ = writeln!(guide, "Phase {}: {} - {}", index + 1, step.channel, step.action);
    }

    section(&mut guide, "MEDIA MANIFEST");
    let _ = writeln!(guide, "Visual prompt: {}", result.visual_prompt);
    let _ = writeln!(guide, "Video prompt: {}", result.video_prompt);
    let _ = writeln!(
        guide,
        "Hero image: {}",
        if result.has_visual() {
            format!("auragrowth-hero-{}.png", outcome.id)
        } else {
            "not generated".to_string()
        }
    );
    match (&result.video_url, &result.video_coverage) {
        (Some(_), Some(coverage)) => {
            let _ = writeln!(
                guide,
                "Video: auragrowth-video-{}.mp4 ({}s of {}s requested)",
                outcome.id, coverage.delivered_seconds, coverage.requested_seconds
            );
        }
        (Some(_), None) => {
            let _ = writeln!(guide, "Video: auragrowth-video-{}.mp4", outcome.id);
        }
        (None, _) => {
            let _ = writeln!(guide, "Video: not generated");
        }
    }
    if result.campaign_asset.is_some() {
        let _ = writeln!(guide, "Reference asset: embedded in blueprint");
    }

    Ok(guide)
}

fn section(guide: &mut String, title: &str) {
    let _ = writeln!(guide);
    let _ = writeln!(guide, "== {title} ==");
}

pub fn decode_data_uri(uri: &str) -> Result<(String, Vec<u8>), AuraError> {
    let (mime_type, payload) = split_data_uri(uri)?;
    let bytes = STANDARD
        .decode(payload.trim())
        .map_err(|error| AuraError::invalid(format!("data URI payload is not valid base64: {error}")))?;
    Ok((mime_type.to_string(), bytes))
}

/// Downloads a stored video URI. The key, when given, is appended only for
/// this request.
pub async fn download_video(
    http: &reqwest::Client,
    uri: &str,
    api_key: Option<&str>,
) -> Result<Vec<u8>, AuraError> {
    let url = match api_key {
        Some(key) => playable_url(uri, key),
        None => uri.to_string(),
    };
    let response = http.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(AuraError::Api {
            status: status.as_u16(),
            message: format!("video download failed with status {status}"),
        });
    }
    Ok(response.bytes().await?.to_vec())
}

fn image_extension(mime_type: &str) -> Option<&'static str> {
    match mime_type.trim().to_ascii_lowercase().as_str() {
        "image/png" => Some("png"),
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/webp" => Some("webp"),
        "image/gif" => Some("gif"),
        _ => None,
    }
}

/// Writes blueprint, guide, hero image and video for `outcome` into
/// `directory`. Media that is absent, undecodable or fails to download is
/// reported as skipped rather than failing the export.
pub async fn export_outcome(
    outcome: &CampaignOutcome,
    directory: &Path,
    http: &reqwest::Client,
    api_key: Option<&str>,
) -> Result<ExportReport, AuraError> {
    let result = results_of(outcome)?;
    tokio::fs::create_dir_all(directory).await?;
    let mut report = ExportReport::default();

    let blueprint_path = directory.join(format!("auragrowth-blueprint-{}.json", outcome.id));
    let blueprint_json = serde_json::to_string_pretty(&blueprint(outcome)?)?;
    tokio::fs::write(&blueprint_path, blueprint_json).await?;
    report.written.push(blueprint_path);

    let guide_path = directory.join(format!("auragrowth-guide-{}.txt", outcome.id));
    tokio::fs::write(&guide_path, delivery_guide(outcome)?).await?;
    report.written.push(guide_path);

    match result.visual_url.as_deref().filter(|url| !url.trim().is_empty()) {
        Some(uri) => match decode_data_uri(uri) {
            Ok((mime_type, bytes)) => match image_extension(&mime_type) {
                Some(extension) => {
                    let hero_path =
                        directory.join(format!("auragrowth-hero-{}.{extension}", outcome.id));
                    tokio::fs::write(&hero_path, bytes).await?;
                    report.written.push(hero_path);
                }
                None => report
                    .skipped
                    .push(format!("hero image: unsupported type {mime_type}")),
            },
            Err(error) => {
                warn!(outcome_id = outcome.id.as_str(), %error, "hero image is undecodable");
                report.skipped.push(format!("hero image: {error}"));
            }
        },
        None => report.skipped.push("hero image: not generated".to_string()),
    }

    match result.video_url.as_deref() {
        Some(uri) => match download_video(http, uri, api_key).await {
            Ok(bytes) => {
                let video_path = directory.join(format!("auragrowth-video-{}.mp4", outcome.id));
                tokio::fs::write(&video_path, bytes).await?;
                report.written.push(video_path);
            }
            Err(error) => {
                warn!(outcome_id = outcome.id.as_str(), %error, "video download failed");
                report.skipped.push(format!("video: {error}"));
            }
        },
        None => report.skipped.push("video: not generated".to_string()),
    }

    info!(
        outcome_id = outcome.id.as_str(),
        written = report.written.len(),
        skipped = report.skipped.len(),
        "outcome exported"
    );
    Ok(report)
}
