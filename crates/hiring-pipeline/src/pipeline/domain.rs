use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::registry::MAX_SCORE;
use super::tracker::{ApplicationTracker, TrackerError};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(
    /// Identifier for a published job posting.
    JobId
);
string_id!(
    /// Identifier for the stage registry attached to a job.
    RegistryId
);
string_id!(
    /// Identifier for a stage, unique within its registry.
    StageId
);
string_id!(
    /// Identifier for a candidate application (and the tracker it owns).
    ApplicationId
);
string_id!(
    /// Opaque identity supplied by the identity provider for evaluators and recruiters.
    ActorId
);

/// Where a candidate stands in the hiring pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    Active,
    Hired,
    Rejected,
}

impl PipelineStatus {
    pub fn label(&self) -> &'static str {
        match self {
            PipelineStatus::Active => "active",
            PipelineStatus::Hired => "hired",
            PipelineStatus::Rejected => "rejected",
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, PipelineStatus::Active)
    }
}

/// Terminal outcome of a pipeline, either decided by scores or by a recruiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Conclusion {
    Hired,
    Rejected,
}

impl From<Conclusion> for PipelineStatus {
    fn from(value: Conclusion) -> Self {
        match value {
            Conclusion::Hired => PipelineStatus::Hired,
            Conclusion::Rejected => PipelineStatus::Rejected,
        }
    }
}

/// Authoritative evaluation for one (application, stage) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ScoreSnapshot")]
pub struct Score {
    pub stage_id: StageId,
    pub value: u8,
    pub feedback: Option<String>,
    pub recorded_at: DateTime<Utc>,
    pub recorded_by: ActorId,
}

impl Score {
    /// Whether two scores carry the same evaluation, ignoring when they were recorded.
    pub(crate) fn same_evaluation(&self, other: &Score) -> bool {
        self.stage_id == other.stage_id
            && self.value == other.value
            && self.feedback == other.feedback
            && self.recorded_by == other.recorded_by
    }
}

/// Stored score shape; the value is range-checked again when loaded.
#[derive(Deserialize)]
struct ScoreSnapshot {
    stage_id: StageId,
    value: i32,
    feedback: Option<String>,
    recorded_at: DateTime<Utc>,
    recorded_by: ActorId,
}

impl TryFrom<ScoreSnapshot> for Score {
    type Error = TrackerError;

    fn try_from(snapshot: ScoreSnapshot) -> Result<Self, Self::Error> {
        let value = u8::try_from(snapshot.value)
            .ok()
            .filter(|value| i32::from(*value) <= MAX_SCORE)
            .ok_or(TrackerError::InvalidScore(snapshot.value))?;
        Ok(Self {
            stage_id: snapshot.stage_id,
            value,
            feedback: snapshot.feedback,
            recorded_at: snapshot.recorded_at,
            recorded_by: snapshot.recorded_by,
        })
    }
}

/// Scores keyed by stage; one authoritative entry per stage.
pub type ScoreSheet = BTreeMap<StageId, Score>;

/// Append-only audit entry. Status overrides carry no stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditNote {
    pub application_id: ApplicationId,
    pub stage_id: Option<StageId>,
    pub author: ActorId,
    pub note: String,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Draft,
    Open,
    Closed,
}

impl JobStatus {
    pub fn label(&self) -> &'static str {
        match self {
            JobStatus::Draft => "draft",
            JobStatus::Open => "open",
            JobStatus::Closed => "closed",
        }
    }
}

/// Recruiter-authored posting details, before a registry is attached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDraft {
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default = "default_employment_type")]
    pub employment_type: String,
    #[serde(default)]
    pub salary_range: Option<String>,
    #[serde(default)]
    pub requirements: Option<String>,
    #[serde(default = "default_job_status")]
    pub status: JobStatus,
    pub recruiter_id: ActorId,
}

impl JobDraft {
    /// Draft with the default employment type and no optional details.
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        recruiter_id: ActorId,
    ) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            location: None,
            employment_type: default_employment_type(),
            salary_range: None,
            requirements: None,
            status: default_job_status(),
            recruiter_id,
        }
    }
}

fn default_employment_type() -> String {
    "full-time".to_string()
}

fn default_job_status() -> JobStatus {
    JobStatus::Draft
}

/// A published job and the registry its applications are tracked against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobPosting {
    pub id: JobId,
    pub recruiter_id: ActorId,
    pub title: String,
    pub description: String,
    pub location: Option<String>,
    pub employment_type: String,
    pub salary_range: Option<String>,
    pub requirements: Option<String>,
    pub status: JobStatus,
    pub public_token: String,
    pub registry_id: RegistryId,
    pub created_at: DateTime<Utc>,
}

impl JobPosting {
    pub fn accepts_applications(&self) -> bool {
        self.status == JobStatus::Open
    }

    /// Apply a recruiter's edits. Blank optional fields clear the stored value; a blank
    /// employment type keeps the current one. The caller validates the title.
    pub fn apply_details(&mut self, details: JobDetails) {
        if let Some(title) = details.title {
            self.title = title.trim().to_string();
        }
        if let Some(description) = details.description {
            self.description = description;
        }
        if let Some(location) = details.location {
            self.location = normalize_text(Some(location));
        }
        if let Some(employment_type) = normalize_text(details.employment_type) {
            self.employment_type = employment_type;
        }
        if let Some(salary_range) = details.salary_range {
            self.salary_range = normalize_text(Some(salary_range));
        }
        if let Some(requirements) = details.requirements {
            self.requirements = normalize_text(Some(requirements));
        }
    }
}

/// Edits to a posting's descriptive fields; absent fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDetails {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub employment_type: Option<String>,
    #[serde(default)]
    pub salary_range: Option<String>,
    #[serde(default)]
    pub requirements: Option<String>,
}

/// Raw public application form as received from a candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateSubmission {
    pub full_name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub resume_url: Option<String>,
    #[serde(default)]
    pub linkedin_url: Option<String>,
}

/// Candidate details after intake validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateProfile {
    pub full_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub resume_url: Option<String>,
    pub linkedin_url: Option<String>,
}

impl CandidateProfile {
    /// Key used to detect repeat submissions from the same person.
    pub fn email_key(&self) -> String {
        self.email.trim().to_ascii_lowercase()
    }
}

/// Application record owning the candidate's tracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationRecord {
    pub application_id: ApplicationId,
    pub job_id: JobId,
    pub candidate: CandidateProfile,
    pub tracker: ApplicationTracker,
}

/// Trim free text, treating blank input as absent.
pub(crate) fn normalize_text(raw: Option<String>) -> Option<String> {
    raw.map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
