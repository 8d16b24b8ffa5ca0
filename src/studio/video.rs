use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{until_cancelled, Studio};
use crate::campaign::{
    AspectRatio, ReferenceAsset, VideoBrief, VideoCoverage, BASE_CLIP_SECONDS, EXTENSION_SECONDS,
};
use crate::error::{is_entity_not_found, AuraError};
use crate::genai::{VideoGenerationRequest, VideoHandle, VideoOperation};
use crate::model_registry::GenerationKind;
use crate::retry::with_retry;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoClip {
    pub url: String,
    pub handle: VideoHandle,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledVideo {
    pub clip: Option<VideoClip>,
    pub coverage: VideoCoverage,
}

/// Extension calls needed to reach `target_seconds`: 8 → 0, 15 → 1,
/// 30 → 3, 60 → 7.
pub fn extension_steps(target_seconds: u32) -> u32 {
    if target_seconds <= BASE_CLIP_SECONDS {
        return 0;
    }
    let extra = f64::from(target_seconds - BASE_CLIP_SECONDS);
    (extra / f64::from(EXTENSION_SECONDS)).round() as u32
}

pub fn covered_seconds(completed_extensions: u32) -> u32 {
    BASE_CLIP_SECONDS + EXTENSION_SECONDS * completed_extensions
}

/// `uri` with the API key appended as a query parameter.
pub fn playable_url(uri: &str, api_key: &str) -> String {
    let separator = if uri.contains('?') { '&' } else { '?' };
    format!("{uri}{separator}key={api_key}")
}

impl Studio {
    /// Base clip. Returns `Ok(None)` for ordinary failures; credential errors
    /// and cancellation are returned as errors.
    pub async fn generate_video(
        &self,
        prompt: &str,
        aspect_ratio: AspectRatio,
        reference: Option<&ReferenceAsset>,
        extension_anticipated: bool,
        cancel: &CancellationToken,
    ) -> Result<Option<VideoClip>, AuraError> {
        let kind = if reference.is_none() && !extension_anticipated {
            GenerationKind::VideoFast
        } else {
            GenerationKind::VideoFull
        };
        let request = VideoGenerationRequest {
            model: self.model(kind).model_id,
            prompt: prompt.trim().to_string(),
            reference_asset: reference.cloned(),
            source_video: None,
            aspect_ratio: if reference.is_some() {
                AspectRatio::Landscape
            } else {
                aspect_ratio
            },
            resolution: self.settings.resolution.clone(),
            number_of_videos: 1,
        };

        let result = self.run_video_operation(&request, cancel).await;
        self.settle("video generation", result)
    }

    /// Continues `previous` by one extension step, always on the full model.
    pub async fn extend_video(
        &self,
        prompt: &str,
        previous: &VideoHandle,
        aspect_ratio: AspectRatio,
        cancel: &CancellationToken,
    ) -> Result<Option<VideoClip>, AuraError> {
        let request = VideoGenerationRequest {
            model: self.model(GenerationKind::VideoFull).model_id,
            prompt: format!(
                "Continue the previous shot seamlessly. Keep the same motion, camera movement, \
lighting and visual continuity. {}",
                prompt.trim()
            ),
            reference_asset: None,
            source_video: Some(previous.clone()),
            aspect_ratio,
            resolution: self.settings.resolution.clone(),
            number_of_videos: 1,
        };

        let result = self.run_video_operation(&request, cancel).await;
        self.settle("video extension", result)
    }

    /// Base clip plus the extension chain for `brief`. A failed step stops
    /// the chain and the last good clip is kept; the shortfall is reported
    /// in the coverage. Only cancellation is returned as an error.
    pub async fn compile_video(
        &self,
        prompt: &str,
        brief: VideoBrief,
        reference: Option<&ReferenceAsset>,
        cancel: &CancellationToken,
    ) -> Result<CompiledVideo, AuraError> {
        let requested = brief.duration.seconds();
        let planned = extension_steps(requested);
        let aspect_ratio = if reference.is_some() {
            AspectRatio::Landscape
        } else {
            brief.aspect_ratio
        };

        let base = match self
            .generate_video(prompt, aspect_ratio, reference, planned > 0, cancel)
            .await
        {
            Ok(Some(clip)) => clip,
            Ok(None) => return Ok(without_video(requested, planned, "base video generation failed")),
            Err(AuraError::Cancelled) => return Err(AuraError::Cancelled),
            Err(error) => {
                return Ok(without_video(
                    requested,
                    planned,
                    &format!("base video generation failed: {error}"),
                ))
            }
        };

        let mut clip = base;
        let mut completed = 0;
        let mut degradation = None;
        for step in 1..=planned {
            let failure = match self
                .extend_video(prompt, &clip.handle, aspect_ratio, cancel)
                .await
            {
                Ok(Some(next)) => {
                    clip = next;
                    completed = step;
                    debug!(step, planned, "video extension step complete");
                    continue;
                }
                Ok(None) => "extension returned no video".to_string(),
                Err(AuraError::Cancelled) => return Err(AuraError::Cancelled),
                Err(error) => error.to_string(),
            };
            degradation = Some(format!(
                "extension step {step} of {planned} failed ({failure}); delivering {}s of {requested}s",
                covered_seconds(completed)
            ));
            break;
        }

        Ok(CompiledVideo {
            clip: Some(clip),
            coverage: VideoCoverage {
                requested_seconds: requested,
                delivered_seconds: covered_seconds(completed),
                extensions_planned: planned,
                extensions_completed: completed,
                degradation,
            },
        })
    }

    async fn run_video_operation(
        &self,
        request: &VideoGenerationRequest,
        cancel: &CancellationToken,
    ) -> Result<VideoClip, AuraError> {
        info!(
            model = request.model.as_str(),
            aspect_ratio = request.aspect_ratio.as_str(),
            extension = request.source_video.is_some(),
            "starting video operation"
        );
        let started = until_cancelled(
            cancel,
            with_retry(self.settings.retry, "video", || {
                self.backend.generate_video(request)
            }),
        )
        .await?;

        let finished = self.await_operation(started, cancel).await?;
        if let Some(error) = &finished.error {
            return Err(if is_entity_not_found(&error.message) {
                AuraError::Credential(error.message.clone())
            } else {
                AuraError::GenerationFailed(format!(
                    "video operation {} failed: {}",
                    finished.name, error.message
                ))
            });
        }
        let handle = finished.first_video().cloned().ok_or_else(|| {
            AuraError::GenerationFailed(format!(
                "video operation {} finished without a video",
                finished.name
            ))
        })?;

        let api_key = self.credentials.active_key()?;
        Ok(VideoClip {
            url: playable_url(&handle.uri, &api_key),
            handle,
        })
    }

    /// Polls until `done`, bounded by the poll timeout and the token.
    async fn await_operation(
        &self,
        mut operation: VideoOperation,
        cancel: &CancellationToken,
    ) -> Result<VideoOperation, AuraError> {
        let started = Instant::now();
        let name = operation.name.clone();
        let polling = async {
            let mut polls = 0_u32;
            while !operation.done {
                tokio::time::sleep(self.settings.poll_interval).await;
                let next = with_retry(self.settings.retry, "video poll", || {
                    self.backend.get_operation(&operation)
                })
                .await?;
                operation = next;
                polls += 1;
                debug!(
                    operation = operation.name.as_str(),
                    polls,
                    done = operation.done,
                    "polled video operation"
                );
            }
            Ok::<_, AuraError>(operation)
        };

        until_cancelled(cancel, async {
            tokio::time::timeout(self.settings.poll_timeout, polling)
                .await
                .map_err(|_| AuraError::Timeout {
                    operation: name,
                    elapsed: started.elapsed(),
                })?
        })
        .await
    }

    fn settle(
        &self,
        label: &str,
        result: Result<VideoClip, AuraError>,
    ) -> Result<Option<VideoClip>, AuraError> {
        match result {
            Ok(clip) => Ok(Some(clip)),
            Err(AuraError::Cancelled) => Err(AuraError::Cancelled),
            Err(error) if error.is_credential() => {
                self.credentials.reselect();
                Err(error)
            }
            Err(error) => {
                warn!(%error, "{label} failed");
                Ok(None)
            }
        }
    }
}

fn without_video(requested: u32, planned: u32, reason: &str) -> CompiledVideo {
    CompiledVideo {
        clip: None,
        coverage: VideoCoverage {
            requested_seconds: requested,
            delivered_seconds: 0,
            extensions_planned: planned,
            extensions_completed: 0,
            degradation: Some(reason.to_string()),
        },
    }
}
