pub mod orchestrator;

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::AuraError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentRole {
    Researcher,
    Strategist,
    Copywriter,
    Designer,
    QualityManager,
}

impl AgentRole {
    pub const REQUIRED: [AgentRole; 4] = [
        AgentRole::Researcher,
        AgentRole::Strategist,
        AgentRole::Copywriter,
        AgentRole::Designer,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AgentRole::Researcher => "RESEARCHER",
            AgentRole::Strategist => "STRATEGIST",
            AgentRole::Copywriter => "COPYWRITER",
            AgentRole::Designer => "DESIGNER",
            AgentRole::QualityManager => "QUALITY_MANAGER",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            AgentRole::Researcher => "Researcher",
            AgentRole::Strategist => "Strategist",
            AgentRole::Copywriter => "Copywriter",
            AgentRole::Designer => "Designer",
            AgentRole::QualityManager => "Quality Manager",
        }
    }

    /// Position at which this role's tasks are marked completed during a run.
    /// The strategist signs off last, when the outcome is delivered.
    fn completion_rank(self) -> u8 {
        match self {
            AgentRole::Researcher => 0,
            AgentRole::Copywriter => 1,
            AgentRole::Designer => 2,
            AgentRole::QualityManager => 3,
            AgentRole::Strategist => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentStatus {
    Idle,
    Active,
    Busy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskPriority {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub description: String,
    pub priority: TaskPriority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependency_id: Option<String>,
    pub status: TaskStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    pub id: String,
    pub role: AgentRole,
    pub name: String,
    pub specialty: String,
    pub instruction: String,
    pub status: AgentStatus,
    #[serde(default)]
    pub status_message: String,
    #[serde(default)]
    pub tasks: Vec<Task>,
}

pub fn find_agent(roster: &[Agent], role: AgentRole) -> Option<&Agent> {
    roster.iter().find(|agent| agent.role == role)
}

fn task(id: &str, description: &str, priority: TaskPriority, dependency: Option<&str>) -> Task {
    Task {
        id: id.to_string(),
        description: description.to_string(),
        priority,
        dependency_id: dependency.map(str::to_string),
        status: TaskStatus::Pending,
    }
}

fn agent(
    id: &str,
    role: AgentRole,
    name: &str,
    specialty: &str,
    instruction: &str,
    status_message: &str,
    tasks: Vec<Task>,
) -> Agent {
    Agent {
        id: id.to_string(),
        role,
        name: name.to_string(),
        specialty: specialty.to_string(),
        instruction: instruction.to_string(),
        status: AgentStatus::Idle,
        status_message: status_message.to_string(),
        tasks,
    }
}

pub fn default_roster() -> Vec<Agent> {
    vec![
        agent(
            "agent-1",
            AgentRole::Researcher,
            "Aura-Scan V1",
            "Quantitative Market Analysis",
            "Look for untapped market gaps and viral social triggers in the coffee niche.",
            "Ready for analysis",
            vec![
                task("t1-1", "Analyze market competitors", TaskPriority::High, None),
                task(
                    "t1-2",
                    "Identify audience pain points",
                    TaskPriority::Medium,
                    Some("t1-1"),
                ),
            ],
        ),
        agent(
            "agent-2",
            AgentRole::Strategist,
            "Nexus Prime",
            "Growth Hacking & LTV Optimization",
            "Focus on direct-to-consumer high-conversion funnels.",
            "Standing by for blueprinting",
            vec![task("t2-1", "Draft conversion funnel", TaskPriority::High, None)],
        ),
        agent(
            "agent-3",
            AgentRole::Copywriter,
            "Vox-Elite",
            "Persuasive Storytelling",
            "Use a sophisticated yet approachable tone that appeals to luxury-seeking professionals.",
            "Ready to write",
            vec![task("t3-1", "Create 3 social hooks", TaskPriority::Medium, None)],
        ),
        agent(
            "agent-4",
            AgentRole::Designer,
            "Chromax-AI",
            "Cinematic Brand Visuals",
            "Focus on minimalist, high-contrast, and premium aesthetic styles.",
            "Engines initialized",
            vec![task(
                "t4-1",
                "Generate high-res hero image",
                TaskPriority::High,
                None,
            )],
        ),
    ]
}

pub fn validate_roster(roster: &[Agent]) -> Result<(), AuraError> {
    if !(4..=5).contains(&roster.len()) {
        return Err(AuraError::invalid(format!(
            "agentRoster must contain 4 or 5 agents, got {}",
            roster.len()
        )));
    }

    for role in AgentRole::REQUIRED {
        let count = roster.iter().filter(|agent| agent.role == role).count();
        if count != 1 {
            return Err(AuraError::invalid(format!(
                "agentRoster must contain exactly one {}, found {count}",
                role.as_str()
            )));
        }
    }
    let managers = roster
        .iter()
        .filter(|agent| agent.role == AgentRole::QualityManager)
        .count();
    if managers > 1 {
        return Err(AuraError::invalid(
            "agentRoster may contain at most one QUALITY_MANAGER",
        ));
    }

    let mut owners: HashMap<&str, AgentRole> = HashMap::new();
    for agent in roster {
        if agent.name.trim().is_empty() {
            return Err(AuraError::invalid(format!(
                "agent '{}' name is required",
                agent.id
            )));
        }
        for task in &agent.tasks {
            if task.id.trim().is_empty() {
                return Err(AuraError::invalid(format!(
                    "agent '{}' has a task without an id",
                    agent.name
                )));
            }
            if owners.insert(task.id.as_str(), agent.role).is_some() {
                return Err(AuraError::invalid(format!(
                    "task id '{}' is used more than once",
                    task.id
                )));
            }
        }
    }

    let dependencies: HashMap<&str, &str> = roster
        .iter()
        .flat_map(|agent| agent.tasks.iter())
        .filter_map(|task| {
            task.dependency_id
                .as_deref()
                .map(|dependency| (task.id.as_str(), dependency))
        })
        .collect();

    for (task_id, dependency) in &dependencies {
        let Some(dependency_role) = owners.get(dependency) else {
            return Err(AuraError::invalid(format!(
                "task '{task_id}' depends on unknown task '{dependency}'"
            )));
        };
        let own_role = owners[task_id];
        if dependency_role.completion_rank() > own_role.completion_rank() {
            return Err(AuraError::invalid(format!(
                "task '{task_id}' ({}) cannot depend on '{dependency}' ({}), which completes later",
                own_role.as_str(),
                dependency_role.as_str()
            )));
        }
    }

    for start in dependencies.keys() {
        let mut seen = HashSet::new();
        let mut cursor = Some(*start);
        while let Some(current) = cursor {
            if !seen.insert(current) {
                return Err(AuraError::invalid(format!(
                    "task dependencies form a cycle through '{current}'"
                )));
            }
            cursor = dependencies.get(current).copied();
        }
    }

    Ok(())
}

/// Task ids of one agent ordered so that every task follows the task it
/// depends on. Ties keep roster order.
pub fn dependency_order(tasks: &[Task]) -> Vec<String> {
    let local: HashSet<&str> = tasks.iter().map(|task| task.id.as_str()).collect();
    let mut placed: HashSet<&str> = HashSet::new();
    let mut ordered = Vec::with_capacity(tasks.len());

    while ordered.len() < tasks.len() {
        let before = ordered.len();
        for task in tasks {
            if placed.contains(task.id.as_str()) {
                continue;
            }
            let ready = match task.dependency_id.as_deref() {
                Some(dependency) if local.contains(dependency) => placed.contains(dependency),
                _ => true,
            };
            if ready {
                placed.insert(task.id.as_str());
                ordered.push(task.id.clone());
            }
        }
        if ordered.len() == before {
            // Cycles are rejected by validate_roster; emit the rest as listed.
            for task in tasks {
                if placed.insert(task.id.as_str()) {
                    ordered.push(task.id.clone());
                }
            }
        }
    }

    ordered
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_roster_is_valid() {
        let roster = default_roster();
        validate_roster(&roster).expect("default roster should validate");
        assert_eq!(roster.len(), 4);
        assert_eq!(
            find_agent(&roster, AgentRole::Designer).map(|agent| agent.name.as_str()),
            Some("Chromax-AI")
        );
    }

    #[test]
    fn rejects_missing_role_and_duplicates() {
        let mut roster = default_roster();
        roster[3].role = AgentRole::Copywriter;
        let error = validate_roster(&roster).expect_err("two copywriters must fail");
        assert!(error.to_string().contains("COPYWRITER"));

        let mut roster = default_roster();
        roster[2].tasks[0].id = "t1-1".to_string();
        assert!(validate_roster(&roster).is_err());
    }

    #[test]
    fn accepts_optional_quality_manager() {
        let mut roster = default_roster();
        roster.push(Agent {
            id: "agent-5".to_string(),
            role: AgentRole::QualityManager,
            name: "Sentinel-QA".to_string(),
            specialty: "Brand Consistency".to_string(),
            instruction: "Check every asset against the brief.".to_string(),
            status: AgentStatus::Idle,
            status_message: String::new(),
            tasks: vec![task("t5-1", "Audit deliverables", TaskPriority::Low, Some("t4-1"))],
        });
        validate_roster(&roster).expect("five-agent roster should validate");

        roster.push(roster[4].clone());
        assert!(validate_roster(&roster).is_err());
    }

    #[test]
    fn rejects_unknown_and_cyclic_dependencies() {
        let mut roster = default_roster();
        roster[0].tasks[0].dependency_id = Some("t9-9".to_string());
        let error = validate_roster(&roster).expect_err("unknown dependency must fail");
        assert!(error.to_string().contains("unknown task"));

        let mut roster = default_roster();
        roster[0].tasks[0].dependency_id = Some("t1-2".to_string());
        let error = validate_roster(&roster).expect_err("cycle must fail");
        assert!(error.to_string().contains("cycle"));
    }

    #[test]
    fn rejects_dependency_on_later_stage() {
        let mut roster = default_roster();
        roster[0].tasks[0].dependency_id = Some("t4-1".to_string());
        assert!(validate_roster(&roster).is_err());
    }

    #[test]
    fn orders_tasks_after_their_dependency() {
        let tasks = vec![
            task("b", "second", TaskPriority::Low, Some("a")),
            task("c", "third", TaskPriority::Low, Some("b")),
            task("a", "first", TaskPriority::High, None),
        ];
        assert_eq!(dependency_order(&tasks), vec!["a", "b", "c"]);
    }
}
