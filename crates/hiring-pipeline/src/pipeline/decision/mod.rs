//! Pure evaluation of a tracker's current stage against its recorded score.
//!
//! Nothing here reads a clock or stored state: the same registry, scores and current stage
//! always produce the same [`Decision`].

mod policy;

pub use policy::{DecisionPolicy, FailurePolicy};

use serde::{Deserialize, Serialize};

use super::domain::{Conclusion, ScoreSheet, StageId};
use super::registry::StageRegistry;

/// Transition computed for a tracker after a score lands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Decision {
    Advance(StageId),
    Hold(StageId),
    Conclude(Conclusion),
    NoChange,
}

impl Decision {
    pub fn summary(&self) -> String {
        match self {
            Decision::Advance(next) => format!("advanced to stage {next}"),
            Decision::Hold(current) => format!("holding at stage {current}"),
            Decision::Conclude(Conclusion::Hired) => "pipeline concluded: hired".to_string(),
            Decision::Conclude(Conclusion::Rejected) => "pipeline concluded: rejected".to_string(),
            Decision::NoChange => "awaiting score for current stage".to_string(),
        }
    }
}

/// Evaluator bound to a decision policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct DecisionEngine {
    policy: DecisionPolicy,
}

impl DecisionEngine {
    pub fn new(policy: DecisionPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> DecisionPolicy {
        self.policy
    }

    pub fn evaluate(
        &self,
        registry: &StageRegistry,
        scores: &ScoreSheet,
        current_stage_id: Option<&StageId>,
    ) -> Decision {
        let Some(stage) = current_stage_id.and_then(|id| registry.stage(id)) else {
            return Decision::NoChange;
        };
        let Some(score) = scores.get(&stage.id) else {
            return Decision::NoChange;
        };

        if !stage.passes(score.value) {
            return match self.policy.on_failure {
                FailurePolicy::Reject => Decision::Conclude(Conclusion::Rejected),
                FailurePolicy::Retry => Decision::Hold(stage.id.clone()),
            };
        }

        if !stage.auto_advance {
            return Decision::Hold(stage.id.clone());
        }

        // Passing the final auto-advancing stage is the hiring signal.
        match registry.stage_after(&stage.id) {
            Some(next) => Decision::Advance(next.id.clone()),
            None => Decision::Conclude(Conclusion::Hired),
        }
    }
}

/// Evaluate with the default policy (failing scores reject).
pub fn evaluate(
    registry: &StageRegistry,
    scores: &ScoreSheet,
    current_stage_id: Option<&StageId>,
) -> Decision {
    DecisionEngine::default().evaluate(registry, scores, current_stage_id)
}
