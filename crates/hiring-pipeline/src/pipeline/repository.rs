use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::domain::{
    ActorId, ApplicationId, ApplicationRecord, AuditNote, JobId, JobPosting, PipelineStatus, Score,
    StageId,
};
use super::registry::StageRegistry;

/// A posting together with the registry its applications are tracked against.
#[derive(Debug, Clone)]
pub struct JobRecord {
    pub posting: JobPosting,
    pub registry: Arc<StageRegistry>,
}

/// Storage for postings and their registries.
pub trait JobRepository: Send + Sync {
    fn insert(&self, record: JobRecord) -> Result<JobRecord, RepositoryError>;
    fn update(&self, record: JobRecord) -> Result<(), RepositoryError>;
    fn fetch(&self, id: &JobId) -> Result<Option<JobRecord>, RepositoryError>;
    fn fetch_by_token(&self, public_token: &str) -> Result<Option<JobRecord>, RepositoryError>;
    fn list_for_recruiter(&self, recruiter_id: &ActorId) -> Result<Vec<JobRecord>, RepositoryError>;
    fn remove(&self, id: &JobId) -> Result<Option<JobRecord>, RepositoryError>;
}

/// Storage for application records and the trackers they own.
///
/// Implementations must reject a second application for the same job and candidate email key
/// with `RepositoryError::Conflict`, and must only accept `compare_and_swap` when the stored
/// tracker version equals `expected_version`, bumping it on success.
pub trait ApplicationRepository: Send + Sync {
    fn insert(&self, record: ApplicationRecord) -> Result<ApplicationRecord, RepositoryError>;
    fn fetch(&self, id: &ApplicationId) -> Result<Option<ApplicationRecord>, RepositoryError>;
    fn compare_and_swap(
        &self,
        record: ApplicationRecord,
        expected_version: u64,
    ) -> Result<ApplicationRecord, RepositoryError>;
    fn remove(&self, id: &ApplicationId) -> Result<Option<ApplicationRecord>, RepositoryError>;
    fn list_for_job(&self, job_id: &JobId) -> Result<Vec<ApplicationRecord>, RepositoryError>;
}

/// Append-only log of scores and audit notes.
pub trait AuditLog: Send + Sync {
    fn append_score(&self, application_id: &ApplicationId, score: &Score)
        -> Result<(), RepositoryError>;
    fn append_note(&self, note: AuditNote) -> Result<(), RepositoryError>;
    fn notes_for(&self, application_id: &ApplicationId) -> Result<Vec<AuditNote>, RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("record changed concurrently (expected version {expected}, found {found})")]
    VersionMismatch { expected: u64, found: u64 },
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Per-stage line in an application's status view.
#[derive(Debug, Clone, Serialize)]
pub struct StageScoreView {
    pub stage_id: StageId,
    pub name: String,
    pub order: u32,
    pub pass_threshold: u8,
    pub current: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub passed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
}

/// Sanitized representation of an application's pipeline position.
#[derive(Debug, Clone, Serialize)]
pub struct ApplicationStatusView {
    pub application_id: ApplicationId,
    pub job_id: JobId,
    pub candidate_name: String,
    pub status: &'static str,
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_stage: Option<String>,
    pub applied_at: DateTime<Utc>,
    pub stages: Vec<StageScoreView>,
}

/// Status view of one application alongside the title of the job it was made to.
#[derive(Debug, Clone, Serialize)]
pub struct CandidateListing {
    pub job_title: String,
    #[serde(flatten)]
    pub application: ApplicationStatusView,
}

impl ApplicationRecord {
    pub fn status_summary(&self, registry: &StageRegistry) -> String {
        let stage_name = self
            .tracker
            .current_stage_id()
            .and_then(|id| registry.stage(id))
            .map(|stage| stage.name.as_str());

        match (self.tracker.status(), stage_name) {
            (PipelineStatus::Active, Some(name)) => format!("active at {name}"),
            (PipelineStatus::Active, None) => "active".to_string(),
            (PipelineStatus::Hired, _) => "hired".to_string(),
            (PipelineStatus::Rejected, Some(name)) => format!("rejected at {name}"),
            (PipelineStatus::Rejected, None) => "rejected".to_string(),
        }
    }

    pub fn status_view(&self, registry: &StageRegistry) -> ApplicationStatusView {
        let current_id = self.tracker.current_stage_id();
        let stages = registry
            .stages()
            .iter()
            .map(|stage| {
                let score = self.tracker.score_for(&stage.id);
                StageScoreView {
                    stage_id: stage.id.clone(),
                    name: stage.name.clone(),
                    order: stage.order,
                    pass_threshold: stage.pass_threshold,
                    current: current_id == Some(&stage.id),
                    score: score.map(|score| score.value),
                    passed: score.map(|score| stage.passes(score.value)),
                    feedback: score.and_then(|score| score.feedback.clone()),
                }
            })
            .collect();

        ApplicationStatusView {
            application_id: self.application_id.clone(),
            job_id: self.job_id.clone(),
            candidate_name: self.candidate.full_name.clone(),
            status: self.tracker.status().label(),
            summary: self.status_summary(registry),
            current_stage: current_id
                .and_then(|id| registry.stage(id))
                .map(|stage| stage.name.clone()),
            applied_at: self.tracker.applied_at(),
            stages,
        }
    }
}
