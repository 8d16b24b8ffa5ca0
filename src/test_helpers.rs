use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::credentials::CredentialStore;
use crate::error::AuraError;
use crate::genai::types::{
    Candidate, GenerateVideoResponse, GeneratedSample, OperationResponse,
};
use crate::genai::{
    Content, GenerateContentRequest, GenerateContentResponse, GenerationBackend, InlineData, Part,
    VideoGenerationRequest, VideoHandle, VideoOperation,
};
use crate::model_registry::ModelRegistry;
use crate::retry::RetryPolicy;
use crate::studio::{Studio, StudioSettings};

type Scripted<T> = Mutex<VecDeque<Result<T, AuraError>>>;

/// In-process backend answering from per-call queues. Image requests are
/// recognised by their image config; everything else is a text request.
#[derive(Default)]
pub struct ScriptedBackend {
    text: Scripted<GenerateContentResponse>,
    images: Scripted<GenerateContentResponse>,
    videos: Scripted<VideoOperation>,
    polls: Scripted<VideoOperation>,
    content_calls: Mutex<Vec<(String, GenerateContentRequest)>>,
    video_calls: Mutex<Vec<VideoGenerationRequest>>,
    poll_count: AtomicU32,
}

impl ScriptedBackend {
    pub fn push_outcome(&self, value: Value) {
        self.push_text(Ok(text_response(&value.to_string())));
    }

    pub fn push_text(&self, response: Result<GenerateContentResponse, AuraError>) {
        self.text.lock().expect("script lock").push_back(response);
    }

    pub fn push_image(&self, response: GenerateContentResponse) {
        self.push_image_result(Ok(response));
    }

    pub fn push_image_result(&self, response: Result<GenerateContentResponse, AuraError>) {
        self.images.lock().expect("script lock").push_back(response);
    }

    pub fn push_video(&self, operation: Result<VideoOperation, AuraError>) {
        self.videos.lock().expect("script lock").push_back(operation);
    }

    pub fn push_poll(&self, operation: Result<VideoOperation, AuraError>) {
        self.polls.lock().expect("script lock").push_back(operation);
    }

    pub fn content_calls(&self) -> Vec<(String, GenerateContentRequest)> {
        self.content_calls.lock().expect("script lock").clone()
    }

    pub fn video_calls(&self) -> Vec<VideoGenerationRequest> {
        self.video_calls.lock().expect("script lock").clone()
    }

    pub fn poll_count(&self) -> u32 {
        self.poll_count.load(Ordering::SeqCst)
    }
}

fn exhausted<T>(what: &str) -> Result<T, AuraError> {
    Err(AuraError::Api {
        status: 500,
        message: format!("no scripted {what} response left"),
    })
}

#[async_trait]
impl GenerationBackend for ScriptedBackend {
    async fn generate_content(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse, AuraError> {
        self.content_calls
            .lock()
            .expect("script lock")
            .push((model.to_string(), request.clone()));
        let is_image = request
            .generation_config
            .as_ref()
            .is_some_and(|config| config.image_config.is_some());
        let queue = if is_image { &self.images } else { &self.text };
        let next = queue.lock().expect("script lock").pop_front();
        next.unwrap_or_else(|| exhausted(if is_image { "image" } else { "text" }))
    }

    async fn generate_video(
        &self,
        request: &VideoGenerationRequest,
    ) -> Result<VideoOperation, AuraError> {
        self.video_calls
            .lock()
            .expect("script lock")
            .push(request.clone());
        let next = self.videos.lock().expect("script lock").pop_front();
        next.unwrap_or_else(|| exhausted("video"))
    }

    async fn get_operation(&self, _operation: &VideoOperation) -> Result<VideoOperation, AuraError> {
        self.poll_count.fetch_add(1, Ordering::SeqCst);
        let next = self.polls.lock().expect("script lock").pop_front();
        next.unwrap_or_else(|| exhausted("poll"))
    }
}

pub fn test_settings() -> StudioSettings {
    StudioSettings {
        retry: RetryPolicy {
            retries: 3,
            base_delay: Duration::from_millis(1),
        },
        poll_interval: Duration::from_millis(1),
        poll_timeout: Duration::from_secs(5),
        resolution: "720p".to_string(),
    }
}

pub fn test_studio(backend: Arc<ScriptedBackend>) -> Studio {
    Studio::new(
        backend,
        ModelRegistry::default(),
        Arc::new(CredentialStore::new(vec!["test-key".to_string()])),
        test_settings(),
    )
}

pub fn test_studio_with(
    backend: Arc<ScriptedBackend>,
    poll_interval: Duration,
    poll_timeout: Duration,
) -> Studio {
    Studio::new(
        backend,
        ModelRegistry::default(),
        Arc::new(CredentialStore::new(vec!["test-key".to_string()])),
        StudioSettings {
            poll_interval,
            poll_timeout,
            ..test_settings()
        },
    )
}

pub fn text_response(text: &str) -> GenerateContentResponse {
    GenerateContentResponse {
        candidates: vec![Candidate {
            content: Some(Content {
                role: Some("model".to_string()),
                parts: vec![Part::text(text)],
            }),
            finish_reason: Some("STOP".to_string()),
        }],
    }
}

pub fn image_response(mime_type: &str, data: &str) -> GenerateContentResponse {
    GenerateContentResponse {
        candidates: vec![Candidate {
            content: Some(Content {
                role: Some("model".to_string()),
                parts: vec![
                    Part::text("Here is the hero image."),
                    Part {
                        text: None,
                        inline_data: Some(InlineData {
                            mime_type: mime_type.to_string(),
                            data: data.to_string(),
                        }),
                    },
                ],
            }),
            finish_reason: Some("STOP".to_string()),
        }],
    }
}

pub fn pending_video(name: &str) -> VideoOperation {
    VideoOperation {
        name: name.to_string(),
        done: false,
        response: None,
        error: None,
    }
}

pub fn done_video(name: &str, uri: &str) -> VideoOperation {
    VideoOperation {
        name: name.to_string(),
        done: true,
        response: Some(OperationResponse {
            generate_video_response: Some(GenerateVideoResponse {
                generated_samples: vec![GeneratedSample {
                    video: Some(VideoHandle {
                        uri: uri.to_string(),
                        mime_type: Some("video/mp4".to_string()),
                    }),
                }],
            }),
        }),
        error: None,
    }
}

pub fn sample_outcome_json() -> Value {
    json!({
        "strategy": "1. Seed founder communities with a free tier. 2. Convert with usage-based upgrades. 3. Retain through integrations.",
        "copy": {
            "headline": "Ship your SaaS in a weekend",
            "body": "Everything a founder needs to launch, bill and grow without a platform team.",
            "cta": "Start free",
            "socialPosts": [
                "Launch day should not take a quarter.",
                "Billing, auth and analytics in one import.",
                "Founders ship. We handle the plumbing."
            ],
            "emailSubject": "Your launch checklist just got shorter",
            "emailBody": "Hi founder, here is how teams go from idea to paying users in days."
        },
        "distribution": [
            { "channel": "Product Hunt", "action": "Launch with a founder AMA" },
            { "channel": "X", "action": "Thread the build-in-public story" },
            { "channel": "Email", "action": "Nurture trial users for 14 days" }
        ],
        "visualPrompt": "A founder at a glowing desk at dawn, dashboard reflections, minimalist high-contrast palette",
        "videoPrompt": "Slow dolly across a dawn-lit workspace as a product dashboard comes alive"
    })
}
