use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::decision::{Decision, DecisionEngine};
use super::domain::{
    normalize_text, ActorId, ApplicationId, AuditNote, Conclusion, PipelineStatus, RegistryId,
    Score, ScoreSheet, StageId,
};
use super::registry::{StageRegistry, MAX_SCORE};

/// Failures raised while moving a tracker through its registry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TrackerError {
    #[error("stage '{0}' is not part of this pipeline")]
    UnknownStage(StageId),
    #[error("score {0} must be between 0 and 100")]
    InvalidScore(i32),
    #[error("application is {} and no longer accepts changes", .status.label())]
    InactiveTracker { status: PipelineStatus },
    #[error("pipeline has no stages")]
    EmptyRegistry,
    #[error("application has no current stage")]
    NoCurrentStage,
    #[error("tracker belongs to registry '{expected}', not '{found}'")]
    RegistryMismatch {
        expected: RegistryId,
        found: RegistryId,
    },
}

/// A single evaluation submitted for a stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreEntry {
    pub stage_id: StageId,
    pub value: i32,
    pub feedback: Option<String>,
    pub recorded_by: ActorId,
    pub recorded_at: DateTime<Utc>,
}

/// Result of a tracker operation: the new tracker, the transition that produced it and the
/// audit entry the caller must append, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackerTransition {
    pub tracker: ApplicationTracker,
    pub decision: Decision,
    pub note: Option<AuditNote>,
}

/// One candidate application's position and score history within a registry.
///
/// Operations never mutate in place; each returns a new tracker so a failed call leaves the
/// caller's copy exactly as it was.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationTracker {
    application_id: ApplicationId,
    registry_id: RegistryId,
    current_stage_id: Option<StageId>,
    status: PipelineStatus,
    scores: ScoreSheet,
    applied_at: DateTime<Utc>,
    #[serde(default)]
    version: u64,
}

impl ApplicationTracker {
    /// Place a new application on the registry's first stage.
    pub fn start(
        registry: &StageRegistry,
        application_id: ApplicationId,
        applied_at: DateTime<Utc>,
    ) -> Result<Self, TrackerError> {
        let first = registry
            .first_stage()
            .map_err(|_| TrackerError::EmptyRegistry)?;

        Ok(Self {
            application_id,
            registry_id: registry.id().clone(),
            current_stage_id: Some(first.id.clone()),
            status: PipelineStatus::Active,
            scores: ScoreSheet::new(),
            applied_at,
            version: 0,
        })
    }

    pub fn application_id(&self) -> &ApplicationId {
        &self.application_id
    }

    pub fn registry_id(&self) -> &RegistryId {
        &self.registry_id
    }

    pub fn current_stage_id(&self) -> Option<&StageId> {
        self.current_stage_id.as_ref()
    }

    pub fn status(&self) -> PipelineStatus {
        self.status
    }

    pub fn scores(&self) -> &ScoreSheet {
        &self.scores
    }

    pub fn score_for(&self, stage_id: &StageId) -> Option<&Score> {
        self.scores.get(stage_id)
    }

    pub fn applied_at(&self) -> DateTime<Utc> {
        self.applied_at
    }

    /// Persistence version used for compare-and-swap saves.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Stamp the version assigned by the storage layer. The engine never calls this.
    pub fn with_version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    /// Stages this tracker sits on or has been scored against.
    pub fn referenced_stages(&self) -> impl Iterator<Item = &StageId> {
        self.current_stage_id.iter().chain(self.scores.keys())
    }

    /// Upsert the score for a stage, then apply the transition the engine computes for the
    /// current stage.
    pub fn record_score(
        &self,
        registry: &StageRegistry,
        engine: &DecisionEngine,
        entry: ScoreEntry,
    ) -> Result<TrackerTransition, TrackerError> {
        self.ensure_active()?;
        self.ensure_registry(registry)?;

        if !registry.contains(&entry.stage_id) {
            return Err(TrackerError::UnknownStage(entry.stage_id));
        }
        if !(0..=MAX_SCORE).contains(&entry.value) {
            return Err(TrackerError::InvalidScore(entry.value));
        }

        let score = Score {
            stage_id: entry.stage_id,
            value: entry.value as u8,
            feedback: normalize_text(entry.feedback),
            recorded_at: entry.recorded_at,
            recorded_by: entry.recorded_by,
        };

        let mut next = self.clone();
        let unchanged = next
            .scores
            .get(&score.stage_id)
            .map(|existing| existing.same_evaluation(&score))
            .unwrap_or(false);
        if !unchanged {
            next.scores.insert(score.stage_id.clone(), score);
        }

        let decision = engine.evaluate(registry, &next.scores, next.current_stage_id.as_ref());
        next.apply(&decision);

        Ok(TrackerTransition {
            tracker: next,
            decision,
            note: None,
        })
    }

    /// Recruiter-driven move to the next stage; on the last stage this concludes as hired.
    pub fn advance_manually(
        &self,
        registry: &StageRegistry,
        acting_user: ActorId,
        at: DateTime<Utc>,
    ) -> Result<TrackerTransition, TrackerError> {
        self.ensure_active()?;
        self.ensure_registry(registry)?;

        let current_id = self
            .current_stage_id
            .as_ref()
            .ok_or(TrackerError::NoCurrentStage)?;
        let current = registry
            .stage(current_id)
            .ok_or_else(|| TrackerError::UnknownStage(current_id.clone()))?;

        let (decision, note) = match registry.stage_after(current_id) {
            Some(next) => (
                Decision::Advance(next.id.clone()),
                format!("manually advanced from {} to {}", current.name, next.name),
            ),
            None => (
                Decision::Conclude(Conclusion::Hired),
                format!("manually concluded final stage {}: hired", current.name),
            ),
        };

        let mut next = self.clone();
        next.apply(&decision);

        Ok(TrackerTransition {
            note: Some(AuditNote {
                application_id: self.application_id.clone(),
                stage_id: Some(current.id.clone()),
                author: acting_user,
                note,
                recorded_at: at,
            }),
            tracker: next,
            decision,
        })
    }

    /// Recruiter decision that concludes the pipeline regardless of scores.
    pub fn override_status(
        &self,
        conclusion: Conclusion,
        acting_user: ActorId,
        reason: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<TrackerTransition, TrackerError> {
        self.ensure_active()?;

        let status = PipelineStatus::from(conclusion);
        let note = match normalize_text(reason) {
            Some(reason) => format!("status overridden to {}: {reason}", status.label()),
            None => format!("status overridden to {}", status.label()),
        };

        let decision = Decision::Conclude(conclusion);
        let mut next = self.clone();
        next.apply(&decision);

        Ok(TrackerTransition {
            note: Some(AuditNote {
                application_id: self.application_id.clone(),
                stage_id: None,
                author: acting_user,
                note,
                recorded_at: at,
            }),
            tracker: next,
            decision,
        })
    }

    fn ensure_active(&self) -> Result<(), TrackerError> {
        if self.status.is_active() {
            Ok(())
        } else {
            Err(TrackerError::InactiveTracker {
                status: self.status,
            })
        }
    }

    fn ensure_registry(&self, registry: &StageRegistry) -> Result<(), TrackerError> {
        if registry.id() == &self.registry_id {
            Ok(())
        } else {
            Err(TrackerError::RegistryMismatch {
                expected: self.registry_id.clone(),
                found: registry.id().clone(),
            })
        }
    }

    fn apply(&mut self, decision: &Decision) {
        match decision {
            Decision::Advance(next) => self.current_stage_id = Some(next.clone()),
            Decision::Conclude(conclusion) => self.status = PipelineStatus::from(*conclusion),
            Decision::Hold(_) | Decision::NoChange => {}
        }
    }
}
