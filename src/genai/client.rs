use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use super::types::{
    GenerateContentRequest, GenerateContentResponse, VideoGenerationRequest, VideoOperation,
};
use super::GenerationBackend;
use crate::credentials::CredentialStore;
use crate::error::{is_entity_not_found, AuraError};

const API_KEY_HEADER: &str = "x-goog-api-key";

pub struct GeminiClient {
    http: reqwest::Client,
    base_url: String,
    credentials: Arc<CredentialStore>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<u16>,
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: Option<String>,
}

impl GeminiClient {
    pub fn new(
        base_url: &str,
        timeout: Duration,
        credentials: Arc<CredentialStore>,
    ) -> Result<Self, AuraError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| {
                AuraError::Transport(format!("Failed to build generation HTTP client: {error}"))
            })?;

        Ok(Self {
            http,
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            credentials,
        })
    }

    async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<T, AuraError> {
        let api_key = self.credentials.active_key()?;
        let response = self
            .http
            .post(url)
            .header(API_KEY_HEADER, api_key)
            .json(body)
            .send()
            .await?;
        decode_response(response).await
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, AuraError> {
        let api_key = self.credentials.active_key()?;
        let response = self
            .http
            .get(url)
            .header(API_KEY_HEADER, api_key)
            .send()
            .await?;
        decode_response(response).await
    }
}

#[async_trait]
impl GenerationBackend for GeminiClient {
    async fn generate_content(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse, AuraError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, model.trim());
        debug!(model, "generateContent");
        self.post_json(&url, request).await
    }

    async fn generate_video(
        &self,
        request: &VideoGenerationRequest,
    ) -> Result<VideoOperation, AuraError> {
        let url = format!(
            "{}/models/{}:predictLongRunning",
            self.base_url,
            request.model.trim()
        );
        debug!(
            model = request.model.as_str(),
            extension = request.source_video.is_some(),
            "predictLongRunning"
        );
        self.post_json(&url, &video_request_body(request)).await
    }

    async fn get_operation(&self, operation: &VideoOperation) -> Result<VideoOperation, AuraError> {
        if operation.name.trim().is_empty() {
            return Err(AuraError::GenerationFailed(
                "video operation has no name to poll".to_string(),
            ));
        }
        let url = format!("{}/{}", self.base_url, operation.name.trim_start_matches('/'));
        self.get_json(&url).await
    }
}

fn video_request_body(request: &VideoGenerationRequest) -> Value {
    let mut instance = json!({ "prompt": request.prompt });
    if let Some(asset) = &request.reference_asset {
        instance["referenceImages"] = json!([{
            "image": {
                "bytesBase64Encoded": asset.data,
                "mimeType": asset.mime_type,
            },
            "referenceType": "asset",
        }]);
    }
    if let Some(video) = &request.source_video {
        instance["video"] = json!({ "uri": video.uri });
    }

    json!({
        "instances": [instance],
        "parameters": {
            "aspectRatio": request.aspect_ratio.as_str(),
            "resolution": request.resolution,
            "numberOfVideos": request.number_of_videos,
        }
    })
}

async fn decode_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, AuraError> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(classify_failure(status, &body));
    }
    serde_json::from_str::<T>(&body).map_err(|error| {
        AuraError::GenerationFailed(format!("Invalid generation response payload: {error}"))
    })
}

fn classify_failure(status: StatusCode, body: &str) -> AuraError {
    let (code, message, api_status) = match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => (
            envelope.error.code.unwrap_or(status.as_u16()),
            envelope.error.message,
            envelope.error.status.unwrap_or_default(),
        ),
        Err(_) => (status.as_u16(), body.trim().to_string(), String::new()),
    };

    if status == StatusCode::TOO_MANY_REQUESTS
        || code == 429
        || api_status.eq_ignore_ascii_case("RESOURCE_EXHAUSTED")
        || message.to_ascii_lowercase().contains("quota")
    {
        return AuraError::Quota {
            status: Some(status.as_u16()),
            message,
        };
    }
    if is_entity_not_found(&message) {
        return AuraError::Credential(message);
    }
    AuraError::Api {
        status: status.as_u16(),
        message,
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::campaign::{AspectRatio, ReferenceAsset};
    use crate::genai::types::{Content, Part};

    fn client_for(server: &MockServer) -> GeminiClient {
        GeminiClient::new(
            &server.uri(),
            Duration::from_secs(5),
            Arc::new(CredentialStore::new(vec!["test-key".to_string()])),
        )
        .expect("client should build")
    }

    fn simple_request() -> GenerateContentRequest {
        GenerateContentRequest {
            contents: vec![Content::user(vec![Part::text("hello")])],
            system_instruction: None,
            generation_config: None,
        }
    }

    #[tokio::test]
    async fn sends_key_header_and_parses_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-test:generateContent"))
            .and(header(API_KEY_HEADER, "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{ "content": { "parts": [{ "text": "{\"strategy\":\"go\"}" }] } }]
            })))
            .mount(&server)
            .await;

        let response = client_for(&server)
            .generate_content("gemini-test", &simple_request())
            .await
            .expect("content call should succeed");

        assert_eq!(response.text().as_deref(), Some("{\"strategy\":\"go\"}"));
    }

    #[tokio::test]
    async fn maps_429_to_quota_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-test:generateContent"))
            .respond_with(ResponseTemplate::new(429).set_body_json(json!({
                "error": { "code": 429, "message": "Resource has been exhausted", "status": "RESOURCE_EXHAUSTED" }
            })))
            .mount(&server)
            .await;

        let error = client_for(&server)
            .generate_content("gemini-test", &simple_request())
            .await
            .expect_err("429 should fail");

        assert!(error.is_quota());
    }

    #[tokio::test]
    async fn maps_entity_not_found_to_credential_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/veo-test:predictLongRunning"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "error": { "code": 404, "message": "Requested entity was not found.", "status": "NOT_FOUND" }
            })))
            .mount(&server)
            .await;

        let error = client_for(&server)
            .generate_video(&VideoGenerationRequest {
                model: "veo-test".to_string(),
                prompt: "a sunrise".to_string(),
                reference_asset: None,
                source_video: None,
                aspect_ratio: AspectRatio::Landscape,
                resolution: "720p".to_string(),
                number_of_videos: 1,
            })
            .await
            .expect_err("404 should fail");

        assert!(error.is_credential());
        assert!(!error.is_quota());
    }

    #[tokio::test]
    async fn starts_video_with_reference_and_polls_operation() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/veo-test:predictLongRunning"))
            .and(body_partial_json(json!({
                "parameters": { "aspectRatio": "16:9", "resolution": "720p", "numberOfVideos": 1 }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "models/veo-test/operations/op-1"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/models/veo-test/operations/op-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "models/veo-test/operations/op-1",
                "done": true,
                "response": { "generateVideoResponse": { "generatedSamples": [
                    { "video": { "uri": "https://files.example/clip.mp4" } }
                ] } }
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let started = client
            .generate_video(&VideoGenerationRequest {
                model: "veo-test".to_string(),
                prompt: "logo reveal".to_string(),
                reference_asset: Some(ReferenceAsset::from_bytes("image/png", b"png-bytes")),
                source_video: None,
                aspect_ratio: AspectRatio::Landscape,
                resolution: "720p".to_string(),
                number_of_videos: 1,
            })
            .await
            .expect("video start should succeed");
        assert!(!started.done);

        let finished = client
            .get_operation(&started)
            .await
            .expect("poll should succeed");
        assert!(finished.done);
        assert_eq!(
            finished.first_video().map(|video| video.uri.as_str()),
            Some("https://files.example/clip.mp4")
        );
    }

    #[test]
    fn extension_body_carries_source_video() {
        let body = video_request_body(&VideoGenerationRequest {
            model: "veo-test".to_string(),
            prompt: "continue".to_string(),
            reference_asset: None,
            source_video: Some(crate::genai::types::VideoHandle {
                uri: "https://files.example/base.mp4".to_string(),
                mime_type: None,
            }),
            aspect_ratio: AspectRatio::Portrait,
            resolution: "720p".to_string(),
            number_of_videos: 1,
        });

        assert_eq!(body["instances"][0]["video"]["uri"], "https://files.example/base.mp4");
        assert_eq!(body["parameters"]["aspectRatio"], "9:16");
        assert!(body["instances"][0].get("referenceImages").is_none());
    }
}
