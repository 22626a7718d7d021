//! Hiring pipeline workflow.
//!
//! A job owns one immutable [`StageRegistry`]; each application owns an
//! [`ApplicationTracker`] that only changes through [`DecisionEngine`] outcomes or explicit
//! recruiter actions. [`PipelineService`] serializes writes per application, keeps registry
//! changes exclusive per job and persists trackers through compare-and-swap on their version.

pub mod analytics;
pub mod decision;
pub mod domain;
pub mod intake;
pub mod registry;
pub mod repository;
pub mod router;
pub mod service;
pub mod tracker;

#[cfg(test)]
mod tests;

pub use analytics::{
    PipelineAnalytics, RecentApplication, RecruiterAnalytics, StageOccupancy,
    RECENT_APPLICATION_LIMIT,
};
pub use decision::{evaluate, Decision, DecisionEngine, DecisionPolicy, FailurePolicy};
pub use domain::{
    ActorId, ApplicationId, ApplicationRecord, AuditNote, CandidateProfile, CandidateSubmission,
    Conclusion, JobDetails, JobDraft, JobId, JobPosting, JobStatus, PipelineStatus, RegistryId,
    Score, ScoreSheet, StageId,
};
pub use intake::{IntakeGuard, IntakeViolation};
pub use registry::{RegistryError, Stage, StageRegistry, StageSpec, MAX_SCORE};
pub use repository::{
    ApplicationRepository, ApplicationStatusView, AuditLog, CandidateListing, JobRecord,
    JobRepository, RepositoryError, StageScoreView,
};
pub use router::{pipeline_router, ACTOR_HEADER};
pub use service::{ErrorKind, PipelineService, PipelineServiceError, PipelineUpdate, ScoreRequest};
pub use tracker::{ApplicationTracker, ScoreEntry, TrackerError, TrackerTransition};
