use serde::{Deserialize, Serialize};

/// What a failing stage score does to the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// A score below threshold at any stage concludes the pipeline as rejected.
    #[default]
    Reject,
    /// The tracker holds on the failed stage until a superseding score is recorded.
    Retry,
}

impl FailurePolicy {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "reject" => Some(Self::Reject),
            "retry" | "hold" => Some(Self::Retry),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            FailurePolicy::Reject => "reject",
            FailurePolicy::Retry => "retry",
        }
    }
}

/// Product rules layered on top of the score-versus-threshold comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DecisionPolicy {
    pub on_failure: FailurePolicy,
}

impl DecisionPolicy {
    pub fn new(on_failure: FailurePolicy) -> Self {
        Self { on_failure }
    }
}
