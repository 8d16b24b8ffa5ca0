use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::agents::{self, Agent, AgentRole, AgentStatus, TaskStatus};
use crate::campaign::CampaignOutcome;
use crate::error::AuraError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineStage {
    Idle,
    Researching,
    Strategizing,
    Writing,
    Designing,
    Reviewing,
    Complete,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActivityLevel {
    Info,
    Warning,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentActivity {
    pub id: String,
    pub role: AgentRole,
    pub message: String,
    pub timestamp: i64,
    #[serde(default)]
    pub is_log: bool,
    pub level: ActivityLevel,
}

impl AgentActivity {
    pub fn new(role: AgentRole, level: ActivityLevel, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            message: message.into(),
            timestamp: Utc::now().timestamp_millis(),
            is_log: false,
            level,
        }
    }

    pub fn info(role: AgentRole, message: impl Into<String>) -> Self {
        Self::new(role, ActivityLevel::Info, message)
    }

    pub fn warning(role: AgentRole, message: impl Into<String>) -> Self {
        Self::new(role, ActivityLevel::Warning, message)
    }

    pub fn critical(role: AgentRole, message: impl Into<String>) -> Self {
        Self::new(role, ActivityLevel::Critical, message)
    }
}

/// State transitions produced by a pipeline run or a refinement flow.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    RunStarted,
    StageChanged(PipelineStage),
    AgentStatus {
        role: AgentRole,
        status: AgentStatus,
        message: String,
    },
    AllAgents {
        status: AgentStatus,
        message: String,
    },
    Tasks {
        role: AgentRole,
        task_ids: Vec<String>,
        status: TaskStatus,
    },
    Activity(AgentActivity),
    OutcomeDelivered(CampaignOutcome),
    OutcomeUpdated(CampaignOutcome),
}

pub trait EventSink: Send + Sync {
    fn emit(&self, event: PipelineEvent);
}

/// Collects events in order; useful for hosts that replay them and in tests.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<PipelineEvent>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<PipelineEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn activities(&self) -> Vec<AgentActivity> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                PipelineEvent::Activity(activity) => Some(activity),
                _ => None,
            })
            .collect()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: PipelineEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub stage: PipelineStage,
    pub running: bool,
    pub agents: Vec<Agent>,
    pub activities: Vec<AgentActivity>,
    pub history: Vec<CampaignOutcome>,
    pub tasks_completed: u64,
}

#[derive(Debug)]
struct Session {
    stage: PipelineStage,
    running: bool,
    agents: Vec<Agent>,
    activities: Vec<AgentActivity>,
    history: Vec<CampaignOutcome>,
    tasks_completed: u64,
    leases: HashSet<String>,
}

impl Session {
    fn apply(&mut self, event: PipelineEvent) {
        match event {
            PipelineEvent::RunStarted => {
                self.activities.clear();
                for agent in &mut self.agents {
                    for task in &mut agent.tasks {
                        task.status = TaskStatus::Pending;
                    }
                    agent.status = AgentStatus::Active;
                    agent.status_message = "Initializing...".to_string();
                }
            }
            PipelineEvent::StageChanged(stage) => self.stage = stage,
            PipelineEvent::AgentStatus {
                role,
                status,
                message,
            } => {
                for agent in self.agents.iter_mut().filter(|agent| agent.role == role) {
                    agent.status = status;
                    agent.status_message = message.clone();
                }
            }
            PipelineEvent::AllAgents { status, message } => {
                for agent in &mut self.agents {
                    agent.status = status;
                    agent.status_message = message.clone();
                }
            }
            PipelineEvent::Tasks {
                role,
                task_ids,
                status,
            } => {
                for agent in self.agents.iter_mut().filter(|agent| agent.role == role) {
                    for task_id in &task_ids {
                        if let Some(task) = agent.tasks.iter_mut().find(|task| &task.id == task_id)
                        {
                            if status == TaskStatus::Completed
                                && task.status != TaskStatus::Completed
                            {
                                self.tasks_completed += 1;
                            }
                            task.status = status;
                        }
                    }
                }
            }
            PipelineEvent::Activity(activity) => self.activities.push(activity),
            PipelineEvent::OutcomeDelivered(outcome) => self.history.insert(0, outcome),
            PipelineEvent::OutcomeUpdated(outcome) => {
                if let Some(existing) = self.history.iter_mut().find(|item| item.id == outcome.id)
                {
                    *existing = outcome;
                }
            }
        }
    }
}

/// Shared handle on one user session. Applies pipeline events and guards
/// against overlapping runs and concurrent edits of the same outcome.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    inner: Arc<Mutex<Session>>,
}

impl Default for SessionHandle {
    fn default() -> Self {
        Self::new(agents::default_roster())
    }
}

impl SessionHandle {
    pub fn new(roster: Vec<Agent>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Session {
                stage: PipelineStage::Idle,
                running: false,
                agents: roster,
                activities: Vec::new(),
                history: Vec::new(),
                tasks_completed: 0,
                leases: HashSet::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Session> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let session = self.lock();
        SessionSnapshot {
            stage: session.stage,
            running: session.running,
            agents: session.agents.clone(),
            activities: session.activities.clone(),
            history: session.history.clone(),
            tasks_completed: session.tasks_completed,
        }
    }

    pub fn is_running(&self) -> bool {
        self.lock().running
    }

    pub fn roster(&self) -> Vec<Agent> {
        self.lock().agents.clone()
    }

    pub fn history(&self) -> Vec<CampaignOutcome> {
        self.lock().history.clone()
    }

    pub fn outcome(&self, id: &str) -> Option<CampaignOutcome> {
        self.lock()
            .history
            .iter()
            .find(|outcome| outcome.id == id)
            .cloned()
    }

    pub fn tasks_completed(&self) -> u64 {
        self.lock().tasks_completed
    }

    pub fn set_roster(&self, roster: Vec<Agent>) -> Result<(), AuraError> {
        agents::validate_roster(&roster)?;
        let mut session = self.lock();
        if session.running {
            return Err(AuraError::RunInProgress);
        }
        session.agents = roster;
        Ok(())
    }

    /// Claims the session for one pipeline run. The claim ends when the
    /// returned guard is dropped.
    pub fn begin_run(&self) -> Result<RunGuard, AuraError> {
        let mut session = self.lock();
        if session.running {
            return Err(AuraError::RunInProgress);
        }
        session.running = true;
        Ok(RunGuard {
            session: self.clone(),
        })
    }

    /// Takes the single in-flight lease on a history outcome.
    pub fn lease_outcome(&self, id: &str) -> Result<OutcomeLease, AuraError> {
        let mut session = self.lock();
        let version = session
            .history
            .iter()
            .find(|outcome| outcome.id == id)
            .map(|outcome| outcome.version)
            .ok_or_else(|| AuraError::OutcomeNotFound(id.to_string()))?;
        if !session.leases.insert(id.to_string()) {
            return Err(AuraError::OutcomeBusy(id.to_string()));
        }
        Ok(OutcomeLease {
            session: self.clone(),
            outcome_id: id.to_string(),
            version,
        })
    }

    /// Replaces the outcome's visual if nothing else changed it since the
    /// lease was taken, then bumps its version.
    pub fn commit_visual(
        &self,
        lease: &OutcomeLease,
        visual_url: String,
    ) -> Result<CampaignOutcome, AuraError> {
        let mut session = self.lock();
        let outcome = session
            .history
            .iter_mut()
            .find(|outcome| outcome.id == lease.outcome_id)
            .ok_or_else(|| AuraError::OutcomeNotFound(lease.outcome_id.clone()))?;
        if outcome.version != lease.version {
            return Err(AuraError::StaleOutcome {
                id: lease.outcome_id.clone(),
                expected: lease.version,
                found: outcome.version,
            });
        }
        let results = outcome.results.as_mut().ok_or_else(|| {
            AuraError::invalid(format!("outcome '{}' has no results", lease.outcome_id))
        })?;
        results.visual_url = Some(visual_url);
        outcome.version += 1;
        Ok(outcome.clone())
    }

    fn finish_run(&self) {
        self.lock().running = false;
    }

    fn release_lease(&self, outcome_id: &str) {
        self.lock().leases.remove(outcome_id);
    }
}

impl EventSink for SessionHandle {
    fn emit(&self, event: PipelineEvent) {
        self.lock().apply(event);
    }
}

#[derive(Debug)]
pub struct RunGuard {
    session: SessionHandle,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.session.finish_run();
    }
}

#[derive(Debug)]
pub struct OutcomeLease {
    session: SessionHandle,
    outcome_id: String,
    version: u64,
}

impl OutcomeLease {
    pub fn outcome_id(&self) -> &str {
        &self.outcome_id
    }

    pub fn version(&self) -> u64 {
        self.version
    }
}

impl Drop for OutcomeLease {
    fn drop(&mut self) {
        self.session.release_lease(&self.outcome_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::campaign::{CampaignResult, OutcomeStatus};

    fn delivered(id: &str) -> CampaignOutcome {
        CampaignOutcome {
            id: id.to_string(),
            name: "Outcome: test...".to_string(),
            status: OutcomeStatus::Completed,
            objective: "test".to_string(),
            target_audience: "testers".to_string(),
            timestamp: 1,
            is_activated: None,
            results: Some(CampaignResult {
                visual_url: Some("data:image/png;base64,AAAA".to_string()),
                ..CampaignResult::default()
            }),
            version: 0,
        }
    }

    #[test]
    fn second_run_is_rejected_until_guard_drops() {
        let session = SessionHandle::default();
        let guard = session.begin_run().expect("first run should start");
        assert!(matches!(session.begin_run(), Err(AuraError::RunInProgress)));
        assert!(session.set_roster(agents::default_roster()).is_err());

        drop(guard);
        assert!(session.begin_run().is_ok());
    }

    #[test]
    fn run_start_resets_tasks_and_counts_completions_once() {
        let session = SessionHandle::default();
        let complete = PipelineEvent::Tasks {
            role: AgentRole::Researcher,
            task_ids: vec!["t1-1".to_string(), "t1-2".to_string()],
            status: TaskStatus::Completed,
        };
        session.emit(complete.clone());
        session.emit(complete);
        assert_eq!(session.tasks_completed(), 2);

        session.emit(PipelineEvent::RunStarted);
        let snapshot = session.snapshot();
        assert!(snapshot
            .agents
            .iter()
            .flat_map(|agent| agent.tasks.iter())
            .all(|task| task.status == TaskStatus::Pending));
        assert!(snapshot
            .agents
            .iter()
            .all(|agent| agent.status == AgentStatus::Active
                && agent.status_message == "Initializing..."));
    }

    #[test]
    fn outcomes_are_prepended() {
        let session = SessionHandle::default();
        session.emit(PipelineEvent::OutcomeDelivered(delivered("first")));
        session.emit(PipelineEvent::OutcomeDelivered(delivered("second")));
        let history = session.history();
        assert_eq!(history[0].id, "second");
        assert_eq!(history[1].id, "first");
    }

    #[test]
    fn lease_is_exclusive_and_released_on_drop() {
        let session = SessionHandle::default();
        session.emit(PipelineEvent::OutcomeDelivered(delivered("o-1")));

        let lease = session.lease_outcome("o-1").expect("lease should be granted");
        assert!(matches!(
            session.lease_outcome("o-1"),
            Err(AuraError::OutcomeBusy(_))
        ));
        assert!(matches!(
            session.lease_outcome("missing"),
            Err(AuraError::OutcomeNotFound(_))
        ));

        drop(lease);
        assert!(session.lease_outcome("o-1").is_ok());
    }

    #[test]
    fn commit_rejects_stale_version() {
        let session = SessionHandle::default();
        session.emit(PipelineEvent::OutcomeDelivered(delivered("o-1")));

        let lease = session.lease_outcome("o-1").expect("lease should be granted");
        let updated = session
            .commit_visual(&lease, "data:image/png;base64,BBBB".to_string())
            .expect("first commit should apply");
        assert_eq!(updated.version, 1);

        let error = session
            .commit_visual(&lease, "data:image/png;base64,CCCC".to_string())
            .expect_err("second commit under the same lease is stale");
        assert!(matches!(
            error,
            AuraError::StaleOutcome {
                expected: 0,
                found: 1,
                ..
            }
        ));
        assert_eq!(
            session
                .outcome("o-1")
                .and_then(|outcome| outcome.results)
                .and_then(|results| results.visual_url)
                .as_deref(),
            Some("data:image/png;base64,BBBB")
        );
    }
}
