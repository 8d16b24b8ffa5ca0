use serde_json::{json, Value};
use tracing::{debug, info};

use super::{Generation, Studio};
use crate::agents::Agent;
use crate::campaign::{CampaignRequest, CampaignResult};
use crate::error::AuraError;
use crate::genai::{Content, GenerateContentRequest, GenerationConfig, Part};
use crate::model_registry::GenerationKind;
use crate::retry::with_retry;

const SYSTEM_INSTRUCTION: &str = "You are the outcome engine of a high-end digital marketing agency. \
A swarm of specialised agents contributes research, strategy, copy and visual direction. \
Answer only with the JSON object described by the response schema.";

impl Studio {
    /// One structured-output call producing strategy, copy, distribution
    /// and media prompts for the request.
    pub async fn generate_outcome(
        &self,
        request: &CampaignRequest,
    ) -> Result<Generation<CampaignResult>, AuraError> {
        if request.objective.trim().is_empty() {
            return Err(AuraError::invalid("objective is required"));
        }
        if request.target_audience.trim().is_empty() {
            return Err(AuraError::invalid("targetAudience is required"));
        }

        let kind = if request.fast_mode {
            GenerationKind::OutcomeFast
        } else {
            GenerationKind::OutcomeQuality
        };
        let model = self.model(kind);
        let body = GenerateContentRequest {
            contents: vec![Content::user(vec![Part::text(build_outcome_prompt(
                &request.objective,
                &request.target_audience,
                &request.agent_roster,
            ))])],
            system_instruction: Some(Content::system(SYSTEM_INSTRUCTION)),
            generation_config: Some(GenerationConfig {
                temperature: model.temperature,
                response_mime_type: Some("application/json".to_string()),
                response_schema: Some(outcome_schema()),
                ..GenerationConfig::default()
            }),
        };

        info!(model = model.model_id.as_str(), fast = request.fast_mode, "generating campaign outcome");
        let response = with_retry(self.settings.retry, "outcome", || {
            self.backend.generate_content(&model.model_id, &body)
        })
        .await?;

        Ok(parse_outcome(response.text().as_deref()))
    }
}

fn build_outcome_prompt(objective: &str, audience: &str, roster: &[Agent]) -> String {
    let swarm = roster
        .iter()
        .map(|agent| {
            format!(
                "- {} ({}): Focus on {}. Guidance: {}",
                agent.role.label(),
                agent.name,
                agent.specialty,
                agent.instruction
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Objective: {objective}\n\
Target Audience: {audience}\n\n\
Agent Swarm Configuration:\n{swarm}\n\n\
Deliver a JSON object including:\n\
1. strategy: a concise 3-step high-level marketing strategy driven by the Strategist's focus.\n\
2. copy: headline, body, primary cta, 3 socialPosts, emailSubject and emailBody in the Copywriter's voice.\n\
3. distribution: 3 to 5 rollout phases, each a channel and a concrete action.\n\
4. visualPrompt: a detailed hero image prompt following the Designer's focus.\n\
5. videoPrompt: a cinematic 8 second video prompt for the same campaign."
    )
}

fn outcome_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "strategy": { "type": "STRING" },
            "copy": {
                "type": "OBJECT",
                "properties": {
                    "headline": { "type": "STRING" },
                    "body": { "type": "STRING" },
                    "cta": { "type": "STRING" },
                    "socialPosts": { "type": "ARRAY", "items": { "type": "STRING" } },
                    "emailSubject": { "type": "STRING" },
                    "emailBody": { "type": "STRING" }
                },
                "required": ["headline", "body", "cta", "socialPosts", "emailSubject", "emailBody"]
            },
            "distribution": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "channel": { "type": "STRING" },
                        "action": { "type": "STRING" }
                    },
                    "required": ["channel", "action"]
                }
            },
            "visualPrompt": { "type": "STRING" },
            "videoPrompt": { "type": "STRING" }
        },
        "required": ["strategy", "copy", "distribution", "visualPrompt", "videoPrompt"]
    })
}

fn parse_outcome(text: Option<&str>) -> Generation<CampaignResult> {
    let Some(text) = text.map(str::trim).filter(|text| !text.is_empty()) else {
        return Generation::Failed {
            reason: "empty response body".to_string(),
        };
    };

    let value = match serde_json::from_str::<Value>(strip_code_fence(text)) {
        Ok(value @ Value::Object(_)) => value,
        Ok(_) => {
            return Generation::Failed {
                reason: "response is not a JSON object".to_string(),
            }
        }
        Err(error) => {
            return Generation::Failed {
                reason: format!("response is not valid JSON: {error}"),
            }
        }
    };

    let mut result = match serde_json::from_value::<CampaignResult>(value) {
        Ok(result) => result,
        Err(error) => {
            return Generation::Failed {
                reason: format!("response does not match the campaign shape: {error}"),
            }
        }
    };
    // Media slots are filled by the image and video generators only.
    result.visual_url = None;
    result.video_url = None;
    result.campaign_asset = None;
    result.video_coverage = None;

    let missing = result.missing_fields();
    if missing.is_empty() {
        Generation::Complete(result)
    } else {
        debug!(missing = ?missing, "campaign outcome is partial");
        Generation::Partial {
            value: result,
            missing,
        }
    }
}

fn strip_code_fence(text: &str) -> &str {
    let Some(inner) = text.strip_prefix("```") else {
        return text;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}
