pub mod client;
pub mod types;

use async_trait::async_trait;

use crate::error::AuraError;

pub use client::GeminiClient;
pub use types::{
    Content, GenerateContentRequest, GenerateContentResponse, GenerationConfig, ImageConfig,
    InlineData, Part, VideoGenerationRequest, VideoHandle, VideoOperation,
};

/// The hosted generation service. Every outbound call in the crate goes
/// through this trait so studio and pipeline code can run against a scripted
/// backend in tests.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    async fn generate_content(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse, AuraError>;

    async fn generate_video(
        &self,
        request: &VideoGenerationRequest,
    ) -> Result<VideoOperation, AuraError>;

    async fn get_operation(&self, operation: &VideoOperation) -> Result<VideoOperation, AuraError>;
}
