use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::agents::{self, Agent, AgentRole, AgentStatus, TaskStatus};
use crate::campaign::{
    outcome_name, AspectRatio, CampaignOutcome, CampaignRequest, CampaignResult, OutcomeStatus,
    ReferenceAsset,
};
use crate::error::AuraError;
use crate::runtime_config::RuntimeFlags;
use crate::session::{AgentActivity, EventSink, PipelineEvent, PipelineStage, SessionHandle};
use crate::studio::{until_cancelled, Generation, Studio};

/// Timed pauses between stages. Purely presentational.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NarrationConfig {
    pub enabled: bool,
    pub research: Duration,
    pub strategy: Duration,
    pub writing: Duration,
    pub review: Duration,
}

impl Default for NarrationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            research: Duration::from_millis(1_500),
            strategy: Duration::from_millis(1_000),
            writing: Duration::from_millis(1_200),
            review: Duration::from_millis(800),
        }
    }
}

impl NarrationConfig {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    pub narration: NarrationConfig,
    pub require_visual: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            narration: NarrationConfig::default(),
            require_visual: true,
        }
    }
}

impl RunOptions {
    pub fn from_flags(flags: &RuntimeFlags) -> Self {
        Self {
            narration: if flags.narration_enabled {
                NarrationConfig::default()
            } else {
                NarrationConfig::disabled()
            },
            require_visual: flags.require_visual,
        }
    }
}

pub struct CampaignOrchestrator {
    studio: Arc<Studio>,
}

struct Stage<'a> {
    sink: &'a dyn EventSink,
}

impl Stage<'_> {
    fn enter(&self, stage: PipelineStage) {
        self.sink.emit(PipelineEvent::StageChanged(stage));
    }

    fn agent(&self, role: AgentRole, status: AgentStatus, message: &str) {
        self.sink.emit(PipelineEvent::AgentStatus {
            role,
            status,
            message: message.to_string(),
        });
    }

    fn tasks(&self, agent: &Agent, status: TaskStatus) {
        if agent.tasks.is_empty() {
            return;
        }
        self.sink.emit(PipelineEvent::Tasks {
            role: agent.role,
            task_ids: agents::dependency_order(&agent.tasks),
            status,
        });
    }

    fn activity(&self, activity: AgentActivity) {
        self.sink.emit(PipelineEvent::Activity(activity));
    }
}

fn roster_agent(roster: &[Agent], role: AgentRole) -> Result<&Agent, AuraError> {
    agents::find_agent(roster, role)
        .ok_or_else(|| AuraError::invalid(format!("agentRoster has no {}", role.as_str())))
}

fn preview(text: &str, limit: usize) -> String {
    text.trim().chars().take(limit).collect()
}

impl CampaignOrchestrator {
    pub fn new(studio: Arc<Studio>) -> Self {
        Self { studio }
    }

    /// Runs the whole pipeline for `request`. Validation errors return before
    /// any event is emitted; any later failure emits the failure transition
    /// and no history entry.
    pub async fn run(
        &self,
        request: &CampaignRequest,
        options: &RunOptions,
        sink: &dyn EventSink,
        cancel: &CancellationToken,
    ) -> Result<CampaignOutcome, AuraError> {
        request.validate()?;
        info!(objective = request.objective.as_str(), fast = request.fast_mode, "campaign run started");

        let stage = Stage { sink };
        sink.emit(PipelineEvent::RunStarted);

        match self.execute(request, options, &stage, cancel).await {
            Ok(outcome) => {
                info!(outcome_id = outcome.id.as_str(), "campaign run complete");
                Ok(outcome)
            }
            Err(failure) => {
                error!(error = %failure, "campaign run failed");
                stage.enter(PipelineStage::Failed);
                sink.emit(PipelineEvent::AllAgents {
                    status: AgentStatus::Idle,
                    message: "Execution failed".to_string(),
                });
                stage.activity(AgentActivity::critical(
                    AgentRole::Researcher,
                    format!("CRITICAL ERROR: Swarm connection interrupted. ({failure})"),
                ));
                Err(failure)
            }
        }
    }

    async fn execute(
        &self,
        request: &CampaignRequest,
        options: &RunOptions,
        stage: &Stage<'_>,
        cancel: &CancellationToken,
    ) -> Result<CampaignOutcome, AuraError> {
        let roster = &request.agent_roster;
        let researcher = roster_agent(roster, AgentRole::Researcher)?;
        let strategist = roster_agent(roster, AgentRole::Strategist)?;
        let copywriter = roster_agent(roster, AgentRole::Copywriter)?;
        let designer = roster_agent(roster, AgentRole::Designer)?;
        let narration = options.narration;

        stage.enter(PipelineStage::Researching);
        stage.agent(AgentRole::Researcher, AgentStatus::Active, "Analyzing market trends...");
        stage.tasks(researcher, TaskStatus::InProgress);
        stage.activity(AgentActivity::info(
            AgentRole::Researcher,
            format!("{} is scanning data for: \"{}\"", researcher.name, request.objective),
        ));
        narrate(narration, narration.research, cancel).await?;
        stage.agent(AgentRole::Researcher, AgentStatus::Idle, "Research complete");
        stage.tasks(researcher, TaskStatus::Completed);
        stage.activity(AgentActivity::info(
            AgentRole::Researcher,
            format!("Segments identified based on {}.", researcher.specialty),
        ));

        stage.enter(PipelineStage::Strategizing);
        stage.agent(AgentRole::Strategist, AgentStatus::Active, "Calculating growth trajectory...");
        stage.tasks(strategist, TaskStatus::InProgress);
        stage.activity(AgentActivity::info(
            AgentRole::Strategist,
            format!("{} is calculating outcome trajectory...", strategist.name),
        ));
        let mut results =
            until_cancelled(cancel, self.studio.generate_outcome(request))
                .await?
                .into_complete("campaign outcome")?;
        narrate(narration, narration.strategy, cancel).await?;
        stage.agent(AgentRole::Strategist, AgentStatus::Active, "Finalizing blueprint...");
        stage.activity(AgentActivity::info(
            AgentRole::Strategist,
            format!("Blueprint locked: {}...", preview(&results.strategy, 40)),
        ));

        stage.enter(PipelineStage::Writing);
        stage.agent(AgentRole::Copywriter, AgentStatus::Active, "Synthesizing persuasive copy...");
        stage.tasks(copywriter, TaskStatus::InProgress);
        stage.activity(AgentActivity::info(
            AgentRole::Copywriter,
            format!(
                "{} generating narratives for \"{}\"...",
                copywriter.name, copywriter.specialty
            ),
        ));
        narrate(narration, narration.writing, cancel).await?;
        stage.agent(AgentRole::Copywriter, AgentStatus::Idle, "Copy package ready");
        stage.tasks(copywriter, TaskStatus::Completed);
        stage.activity(AgentActivity::info(
            AgentRole::Copywriter,
            format!("Headline synthesized: \"{}\"", results.copy.headline),
        ));

        stage.enter(PipelineStage::Designing);
        self.design(request, options, designer, &mut results, stage, cancel)
            .await?;

        if let Some(manager) = agents::find_agent(roster, AgentRole::QualityManager) {
            stage.enter(PipelineStage::Reviewing);
            review(manager, &results, narration, stage, cancel).await?;
        }

        let outcome = CampaignOutcome {
            id: Uuid::new_v4().to_string(),
            name: outcome_name(&request.objective),
            status: OutcomeStatus::Completed,
            objective: request.objective.clone(),
            target_audience: request.target_audience.clone(),
            timestamp: Utc::now().timestamp_millis(),
            is_activated: None,
            results: Some(results),
            version: 0,
        };

        stage.sink.emit(PipelineEvent::OutcomeDelivered(outcome.clone()));
        stage.enter(PipelineStage::Complete);
        stage.agent(AgentRole::Strategist, AgentStatus::Idle, "Outcome delivered");
        stage.tasks(strategist, TaskStatus::Completed);
        stage.activity(AgentActivity::info(
            AgentRole::Strategist,
            "Process complete. Outcome fully delivered.",
        ));
        Ok(outcome)
    }

    async fn design(
        &self,
        request: &CampaignRequest,
        options: &RunOptions,
        designer: &Agent,
        results: &mut CampaignResult,
        stage: &Stage<'_>,
        cancel: &CancellationToken,
    ) -> Result<(), AuraError> {
        let reference = request.reference_asset.as_ref();
        let aspect_ratio = request
            .video
            .map(|brief| brief.aspect_ratio)
            .unwrap_or(AspectRatio::Landscape);

        stage.agent(AgentRole::Designer, AgentStatus::Active, "Rendering cinematic assets...");
        stage.tasks(designer, TaskStatus::InProgress);
        stage.activity(AgentActivity::info(
            AgentRole::Designer,
            format!("{} rendering high-fidelity visual outcome...", designer.name),
        ));

        let image = until_cancelled(
            cancel,
            self.studio
                .generate_image(&results.visual_prompt, reference, aspect_ratio),
        )
        .await?;
        match image {
            Generation::Complete(url) => results.visual_url = Some(url),
            Generation::Partial { missing, .. } => {
                return Err(AuraError::GenerationFailed(format!(
                    "hero image is missing {}",
                    missing.join(", ")
                )))
            }
            Generation::Failed { reason } if options.require_visual => {
                return Err(AuraError::GenerationFailed(format!(
                    "hero image was not generated: {reason}"
                )))
            }
            Generation::Failed { reason } => {
                warn!(%reason, "continuing without hero image");
                stage.activity(AgentActivity::warning(
                    AgentRole::Designer,
                    format!("Hero image unavailable; visual slot left empty. ({reason})"),
                ));
            }
        }

        if let Some(brief) = request.video {
            stage.activity(AgentActivity::info(
                AgentRole::Designer,
                format!(
                    "{} compiling {}s campaign video...",
                    designer.name,
                    brief.duration.seconds()
                ),
            ));
            let compiled = self
                .studio
                .compile_video(&results.video_prompt, brief, reference, cancel)
                .await?;
            if compiled.coverage.is_degraded() {
                let coverage = &compiled.coverage;
                stage.activity(AgentActivity::warning(
                    AgentRole::Designer,
                    format!(
                        "Video delivered at {}s of {}s requested. ({})",
                        coverage.delivered_seconds,
                        coverage.requested_seconds,
                        coverage.degradation.as_deref().unwrap_or("shortfall")
                    ),
                ));
            }
            // Keyless; exports append the key at download time.
            results.video_url = compiled.clip.map(|clip| clip.handle.uri);
            results.video_coverage = Some(compiled.coverage);
        }

        results.campaign_asset = reference.map(ReferenceAsset::to_data_uri);
        stage.agent(AgentRole::Designer, AgentStatus::Idle, "Assets generated");
        stage.tasks(designer, TaskStatus::Completed);
        stage.activity(AgentActivity::info(
            AgentRole::Designer,
            "Asset generation finalized.",
        ));
        Ok(())
    }

    /// Regenerates the hero image of a delivered outcome. Only the visual
    /// changes, and only if nothing else committed to the outcome meanwhile.
    pub async fn refine_visual(
        &self,
        session: &SessionHandle,
        outcome_id: &str,
        description: &str,
        sink: &dyn EventSink,
    ) -> Result<CampaignOutcome, AuraError> {
        if description.trim().is_empty() {
            return Err(AuraError::invalid("description is required"));
        }
        let lease = session.lease_outcome(outcome_id)?;
        let stage = Stage { sink };

        stage.agent(AgentRole::Designer, AgentStatus::Active, "Refining campaign visual...");
        stage.activity(AgentActivity::info(
            AgentRole::Designer,
            format!("Visual refinement initiated: \"{}\"", description.trim()),
        ));

        let attempt = async {
            let asset = session
                .outcome(outcome_id)
                .and_then(|outcome| outcome.results)
                .and_then(|results| results.campaign_asset)
                .map(|uri| ReferenceAsset::from_data_uri(&uri))
                .transpose()?;
            let url = self
                .studio
                .generate_image(description, asset.as_ref(), AspectRatio::Landscape)
                .await?
                .into_complete("refined visual")?;
            session.commit_visual(&lease, url)
        };

        match attempt.await {
            Ok(updated) => {
                info!(outcome_id, version = updated.version, "visual refined");
                sink.emit(PipelineEvent::OutcomeUpdated(updated.clone()));
                stage.activity(AgentActivity::info(
                    AgentRole::Designer,
                    "Visual refinement completed successfully.",
                ));
                settle_designer(session, &stage, "Assets generated");
                Ok(updated)
            }
            Err(failure) => {
                warn!(outcome_id, error = %failure, "visual refinement failed");
                stage.activity(AgentActivity::warning(
                    AgentRole::Designer,
                    format!("Error during visual refinement. ({failure})"),
                ));
                settle_designer(session, &stage, "Refinement failed");
                Err(failure)
            }
        }
    }
}

/// A live run owns the designer's status; refinement only resets it when idle.
fn settle_designer(session: &SessionHandle, stage: &Stage<'_>, message: &str) {
    if !session.is_running() {
        stage.agent(AgentRole::Designer, AgentStatus::Idle, message);
    }
}

async fn narrate(
    config: NarrationConfig,
    delay: Duration,
    cancel: &CancellationToken,
) -> Result<(), AuraError> {
    if !config.enabled || delay.is_zero() {
        return if cancel.is_cancelled() {
            Err(AuraError::Cancelled)
        } else {
            Ok(())
        };
    }
    until_cancelled(cancel, async {
        tokio::time::sleep(delay).await;
        Ok(())
    })
    .await
}

async fn review(
    manager: &Agent,
    results: &CampaignResult,
    narration: NarrationConfig,
    stage: &Stage<'_>,
    cancel: &CancellationToken,
) -> Result<(), AuraError> {
    stage.agent(AgentRole::QualityManager, AgentStatus::Active, "Reviewing deliverables...");
    stage.tasks(manager, TaskStatus::InProgress);
    stage.activity(AgentActivity::info(
        AgentRole::QualityManager,
        format!("{} is auditing the campaign package...", manager.name),
    ));
    narrate(narration, narration.review, cancel).await?;

    let mut gaps = results.missing_fields();
    if !results.has_visual() {
        gaps.push("visualUrl".to_string());
    }
    if gaps.is_empty() {
        stage.activity(AgentActivity::info(
            AgentRole::QualityManager,
            "Quality review passed: strategy, copy, distribution and visual verified.",
        ));
    } else {
        stage.activity(AgentActivity::warning(
            AgentRole::QualityManager,
            format!("Quality review flagged gaps: {}", gaps.join(", ")),
        ));
    }
    stage.agent(AgentRole::QualityManager, AgentStatus::Idle, "Review complete");
    stage.tasks(manager, TaskStatus::Completed);
    Ok(())
}
