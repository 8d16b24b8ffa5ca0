use tracing::{info, warn};

use super::{Generation, Studio};
use crate::campaign::{AspectRatio, ReferenceAsset};
use crate::error::AuraError;
use crate::genai::{Content, GenerateContentRequest, GenerationConfig, ImageConfig, Part};
use crate::model_registry::GenerationKind;
use crate::retry::with_retry;

impl Studio {
    /// Hero image as a `data:` URI. A response without any inline image is
    /// `Generation::Failed`, not an error.
    pub async fn generate_image(
        &self,
        visual_prompt: &str,
        reference: Option<&ReferenceAsset>,
        aspect_ratio: AspectRatio,
    ) -> Result<Generation<String>, AuraError> {
        if visual_prompt.trim().is_empty() {
            return Err(AuraError::invalid("visualPrompt is required"));
        }

        let model = self.model(GenerationKind::Image);
        let request = build_image_request(visual_prompt, reference, aspect_ratio, model.temperature);
        info!(
            model = model.model_id.as_str(),
            with_reference = reference.is_some(),
            "generating hero image"
        );

        let response = with_retry(self.settings.retry, "image", || {
            self.backend.generate_content(&model.model_id, &request)
        })
        .await?;

        match response.first_inline_image() {
            Some(image) => Ok(Generation::Complete(format!(
                "data:{};base64,{}",
                image.mime_type, image.data
            ))),
            None => {
                warn!("image response contained no inline image data");
                Ok(Generation::Failed {
                    reason: "no image returned".to_string(),
                })
            }
        }
    }
}

/// A reference asset is placed before the instruction and always renders
/// at 16:9.
pub fn build_image_request(
    visual_prompt: &str,
    reference: Option<&ReferenceAsset>,
    aspect_ratio: AspectRatio,
    temperature: Option<f32>,
) -> GenerateContentRequest {
    let prompt = visual_prompt.trim();
    let mut parts = Vec::with_capacity(2);
    let aspect_ratio = match reference {
        Some(asset) => {
            parts.push(Part::inline(asset));
            parts.push(Part::text(format!(
                "Integrate the provided brand asset naturally into a professional marketing hero scene: {prompt}. \
High quality, cinematic lighting, 16:9 aspect ratio. Do not render any on-screen text."
            )));
            AspectRatio::Landscape
        }
        None => {
            parts.push(Part::text(format!(
                "Create a professional marketing hero image for: {prompt}. \
High quality, cinematic lighting, {} aspect ratio. Do not render any on-screen text.",
                aspect_ratio.as_str()
            )));
            aspect_ratio
        }
    };

    GenerateContentRequest {
        contents: vec![Content::user(parts)],
        system_instruction: None,
        generation_config: Some(GenerationConfig {
            temperature,
            image_config: Some(ImageConfig {
                aspect_ratio: aspect_ratio.as_str().to_string(),
            }),
            ..GenerationConfig::default()
        }),
    }
}
