//! Stage graph
//!
//! An ordered list of stages. Each stage names the agents it runs and whether
//! they fan out concurrently or run one after another. The last stage is the
//! round's risk gate.

use crate::agents::AgentRegistry;
use crate::error::OrchestrationError;
use crate::models::AgentRole;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StageMode {
    /// Agents run concurrently and see only earlier stages' findings.
    Parallel,
    /// Agents run in order; each also sees its same-stage predecessors.
    Sequential,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stage {
    pub name: String,
    pub agents: Vec<AgentRole>,
    pub mode: StageMode,
    /// Whether a risk loop may re-enter here.
    pub reentry: bool,
}

impl Stage {
    pub fn parallel(name: impl Into<String>, agents: Vec<AgentRole>) -> Self {
        Self {
            name: name.into(),
            agents,
            mode: StageMode::Parallel,
            reentry: false,
        }
    }

    pub fn sequential(name: impl Into<String>, agents: Vec<AgentRole>) -> Self {
        Self {
            mode: StageMode::Sequential,
            ..Self::parallel(name, agents)
        }
    }

    pub fn reentry_target(mut self) -> Self {
        self.reentry = true;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageGraph {
    pub stages: Vec<Stage>,
    pub reentry_stage: String,
}

impl StageGraph {
    pub fn new(stages: Vec<Stage>, reentry_stage: impl Into<String>) -> Self {
        Self {
            stages,
            reentry_stage: reentry_stage.into(),
        }
    }

    /// Default investment committee:
    /// data intelligence -> core analysts -> macro specialist -> risk control
    pub fn committee() -> Self {
        Self::new(
            vec![
                Stage::parallel("data_intelligence", vec![AgentRole::DataIntelligence]),
                Stage::parallel(
                    "core_analysts",
                    vec![
                        AgentRole::NarrativeArbitrageur,
                        AgentRole::FirstOrderQuant,
                        AgentRole::ContrarianSkeptic,
                        AgentRole::SecondOrderStrategist,
                    ],
                )
                .reentry_target(),
                Stage::parallel("specialists", vec![AgentRole::MacroStrategist]),
                Stage::sequential("risk_control", vec![AgentRole::RiskController]),
            ],
            "core_analysts",
        )
    }

    /// Point loops at `stage`, flagging it as a re-entry target.
    pub fn with_reentry(mut self, stage: impl Into<String>) -> Self {
        self.reentry_stage = stage.into();
        for s in &mut self.stages {
            if s.name == self.reentry_stage {
                s.reentry = true;
            }
        }
        self
    }

    pub fn index_of(&self, stage: &str) -> Option<usize> {
        self.stages.iter().position(|s| s.name == stage)
    }

    pub fn reentry_index(&self) -> Result<usize> {
        self.index_of(&self.reentry_stage).ok_or_else(|| {
            OrchestrationError::Configuration(format!(
                "re-entry stage '{}' is not in the graph",
                self.reentry_stage
            ))
        })
    }

    /// Structural checks done once at orchestrator construction.
    pub fn validate(&self, registry: &AgentRegistry) -> Result<()> {
        if self.stages.is_empty() {
            return Err(OrchestrationError::Configuration(
                "stage graph has no stages".to_string(),
            ));
        }

        let mut names = HashSet::new();
        for stage in &self.stages {
            if !names.insert(stage.name.as_str()) {
                return Err(OrchestrationError::Configuration(format!(
                    "duplicate stage name '{}'",
                    stage.name
                )));
            }
            if stage.agents.is_empty() {
                return Err(OrchestrationError::Configuration(format!(
                    "stage '{}' has no agents",
                    stage.name
                )));
            }

            let mut seen = HashSet::new();
            for role in &stage.agents {
                if !seen.insert(*role) {
                    return Err(OrchestrationError::Configuration(format!(
                        "agent {} appears twice in stage '{}'",
                        role, stage.name
                    )));
                }
                if !registry.contains(*role) {
                    return Err(OrchestrationError::Configuration(format!(
                        "agent {} in stage '{}' is not registered",
                        role, stage.name
                    )));
                }
            }
        }

        let reentry = &self.stages[self.reentry_index()?];
        if !reentry.reentry {
            return Err(OrchestrationError::Configuration(format!(
                "stage '{}' is not a valid re-entry target",
                reentry.name
            )));
        }

        Ok(())
    }
}

impl Default for StageGraph {
    fn default() -> Self {
        Self::committee()
    }
}
