use std::collections::{BTreeSet, HashMap};
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::analytics::{PipelineAnalytics, RecruiterAnalytics};
use super::decision::{Decision, DecisionEngine, DecisionPolicy};
use super::domain::{
    normalize_text, ActorId, ApplicationId, ApplicationRecord, AuditNote, CandidateSubmission,
    Conclusion, JobDetails, JobDraft, JobId, JobPosting, JobStatus, PipelineStatus, RegistryId,
    StageId,
};
use super::intake::{IntakeGuard, IntakeViolation};
use super::registry::{RegistryError, StageRegistry, StageSpec};
use super::repository::{
    ApplicationRepository, ApplicationStatusView, AuditLog, CandidateListing, JobRecord,
    JobRepository, RepositoryError,
};
use super::tracker::{ApplicationTracker, ScoreEntry, TrackerError, TrackerTransition};

/// Score submitted by an evaluator for one stage of an application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreRequest {
    pub stage_id: StageId,
    pub value: i32,
    #[serde(default)]
    pub feedback: Option<String>,
}

/// Committed application state and the transition that produced it.
#[derive(Debug, Clone)]
pub struct PipelineUpdate {
    pub record: ApplicationRecord,
    pub decision: Decision,
    pub view: ApplicationStatusView,
}

/// Service composing the stage registries, trackers, intake guard and collaborators.
///
/// Registry changes hold their job's lock exclusively while submissions and tracker
/// transitions hold it shared, so no tracker is ever written against a superseded registry.
/// Lock order is application, then job.
pub struct PipelineService<J, A, L> {
    jobs: Arc<J>,
    applications: Arc<A>,
    audit: Arc<L>,
    engine: DecisionEngine,
    intake: IntakeGuard,
    job_locks: KeyedLocks<JobId>,
    application_locks: KeyedLocks<ApplicationId>,
}

/// Per-key reader/writer locks created on demand and dropped once nobody holds them.
struct KeyedLocks<K> {
    entries: Mutex<HashMap<K, Arc<RwLock<()>>>>,
}

impl<K: Clone + Eq + Hash> KeyedLocks<K> {
    fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn shared<T>(&self, key: &K, work: impl FnOnce() -> T) -> T {
        let lock = self.acquire(key);
        let result = {
            let _guard = lock.read().unwrap_or_else(PoisonError::into_inner);
            work()
        };
        self.release(key, lock);
        result
    }

    fn exclusive<T>(&self, key: &K, work: impl FnOnce() -> T) -> T {
        let lock = self.acquire(key);
        let result = {
            let _guard = lock.write().unwrap_or_else(PoisonError::into_inner);
            work()
        };
        self.release(key, lock);
        result
    }

    fn acquire(&self, key: &K) -> Arc<RwLock<()>> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.entry(key.clone()).or_default().clone()
    }

    fn release(&self, key: &K, lock: Arc<RwLock<()>>) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        // Handles are only cloned under `entries`, so two means the map and this caller.
        if Arc::strong_count(&lock) == 2 {
            entries.remove(key);
        }
    }

    fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

type ServiceResult<T> = Result<T, PipelineServiceError>;

static JOB_SEQUENCE: AtomicU64 = AtomicU64::new(1);
static APPLICATION_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_job_id() -> (JobId, RegistryId, String) {
    let id = JOB_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    (
        JobId(format!("job-{id:06}")),
        RegistryId(format!("pipeline-{id:06}")),
        format!("apply-{id:06}"),
    )
}

fn next_application_id() -> ApplicationId {
    let id = APPLICATION_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    ApplicationId(format!("app-{id:06}"))
}

impl<J, A, L> PipelineService<J, A, L>
where
    J: JobRepository + 'static,
    A: ApplicationRepository + 'static,
    L: AuditLog + 'static,
{
    pub fn new(jobs: Arc<J>, applications: Arc<A>, audit: Arc<L>, policy: DecisionPolicy) -> Self {
        Self {
            jobs,
            applications,
            audit,
            engine: DecisionEngine::new(policy),
            intake: IntakeGuard::new(),
            job_locks: KeyedLocks::new(),
            application_locks: KeyedLocks::new(),
        }
    }

    pub fn policy(&self) -> DecisionPolicy {
        self.engine.policy()
    }

    /// Number of job and application locks currently tracked.
    pub fn tracked_locks(&self) -> usize {
        self.job_locks.len() + self.application_locks.len()
    }

    /// Publish a posting with its stage registry; the standard stages are used when none are given.
    pub fn publish_job(
        &self,
        draft: JobDraft,
        stages: Option<Vec<StageSpec>>,
    ) -> Result<JobRecord, PipelineServiceError> {
        let title = draft.title.trim().to_string();
        if title.is_empty() {
            return Err(PipelineServiceError::MissingTitle);
        }

        let (job_id, registry_id, public_token) = next_job_id();
        let registry = StageRegistry::create(
            registry_id.clone(),
            stages.unwrap_or_else(StageRegistry::standard_stages),
        )?;

        let posting = JobPosting {
            id: job_id,
            recruiter_id: draft.recruiter_id,
            title,
            description: draft.description,
            location: normalize_text(draft.location),
            employment_type: draft.employment_type,
            salary_range: normalize_text(draft.salary_range),
            requirements: normalize_text(draft.requirements),
            status: draft.status,
            public_token,
            registry_id,
            created_at: Utc::now(),
        };

        let stored = self.jobs.insert(JobRecord {
            posting,
            registry: Arc::new(registry),
        })?;
        info!(
            job_id = %stored.posting.id,
            stages = stored.registry.stages().len(),
            status = stored.posting.status.label(),
            "job published"
        );
        Ok(stored)
    }

    pub fn job(&self, job_id: &JobId) -> Result<JobRecord, PipelineServiceError> {
        self.jobs
            .fetch(job_id)?
            .ok_or_else(|| PipelineServiceError::JobNotFound(job_id.clone()))
    }

    /// Postings owned by a recruiter, newest first.
    pub fn list_jobs(
        &self,
        recruiter_id: &ActorId,
    ) -> Result<Vec<JobRecord>, PipelineServiceError> {
        let mut jobs = self.jobs.list_for_recruiter(recruiter_id)?;
        jobs.sort_by(|a, b| {
            b.posting
                .created_at
                .cmp(&a.posting.created_at)
                .then_with(|| b.posting.id.cmp(&a.posting.id))
        });
        Ok(jobs)
    }

    pub fn set_job_status(
        &self,
        job_id: &JobId,
        status: JobStatus,
    ) -> Result<JobRecord, PipelineServiceError> {
        self.job_locks.exclusive(job_id, || -> ServiceResult<JobRecord> {
            let mut record = self.job(job_id)?;
            record.posting.status = status;
            self.jobs.update(record.clone())?;
            info!(job_id = %job_id, status = status.label(), "job status changed");
            Ok(record)
        })
    }

    /// Edit a posting's descriptive fields; the stage registry is changed through
    /// [`PipelineService::republish_stages`].
    pub fn update_job(
        &self,
        job_id: &JobId,
        details: JobDetails,
    ) -> Result<JobRecord, PipelineServiceError> {
        if details
            .title
            .as_deref()
            .is_some_and(|title| title.trim().is_empty())
        {
            return Err(PipelineServiceError::MissingTitle);
        }

        self.job_locks.exclusive(job_id, || -> ServiceResult<JobRecord> {
            let mut record = self.job(job_id)?;
            record.posting.apply_details(details);
            self.jobs.update(record.clone())?;
            info!(job_id = %job_id, "job details updated");
            Ok(record)
        })
    }

    /// Delete a posting together with every application made to it.
    pub fn delete_job(&self, job_id: &JobId) -> Result<JobRecord, PipelineServiceError> {
        self.job_locks.exclusive(job_id, || -> ServiceResult<JobRecord> {
            let applications = self.applications.list_for_job(job_id)?;
            let removed = self
                .jobs
                .remove(job_id)?
                .ok_or_else(|| PipelineServiceError::JobNotFound(job_id.clone()))?;
            for application in &applications {
                self.applications.remove(&application.application_id)?;
            }

            info!(
                job_id = %job_id,
                applications = applications.len(),
                "job deleted"
            );
            Ok(removed)
        })
    }

    /// Replace a job's stages without reordering any stage its applications already reference.
    pub fn republish_stages(
        &self,
        job_id: &JobId,
        specs: Vec<StageSpec>,
    ) -> Result<Arc<StageRegistry>, PipelineServiceError> {
        self.job_locks.exclusive(job_id, || -> ServiceResult<Arc<StageRegistry>> {
            let record = self.job(job_id)?;
            let referenced: BTreeSet<StageId> = self
                .applications
                .list_for_job(job_id)?
                .iter()
                .flat_map(|application| application.tracker.referenced_stages().cloned())
                .collect();

            let registry = match record.registry.republish(specs, &referenced) {
                Ok(registry) => Arc::new(registry),
                Err(err) => {
                    warn!(job_id = %job_id, error = %err, "stage republish refused");
                    return Err(err.into());
                }
            };

            self.jobs.update(JobRecord {
                posting: record.posting,
                registry: registry.clone(),
            })?;
            info!(
                job_id = %job_id,
                revision = registry.revision(),
                "stage registry republished"
            );
            Ok(registry)
        })
    }

    /// Accept a public application for an open posting and start its tracker.
    pub fn submit(
        &self,
        public_token: &str,
        submission: CandidateSubmission,
    ) -> Result<ApplicationRecord, PipelineServiceError> {
        let job_id = self
            .jobs
            .fetch_by_token(public_token)?
            .ok_or(IntakeViolation::JobNotOpen)?
            .posting
            .id;

        self.job_locks.shared(&job_id, || -> ServiceResult<ApplicationRecord> {
            // Reload under the lock; the registry may have been republished since the lookup.
            let job = self
                .jobs
                .fetch(&job_id)?
                .ok_or(IntakeViolation::JobNotOpen)?;
            self.intake.ensure_open(&job.posting)?;
            let candidate = self.intake.candidate_from_submission(submission)?;

            let application_id = next_application_id();
            let tracker =
                ApplicationTracker::start(&job.registry, application_id.clone(), Utc::now())?;
            let record = ApplicationRecord {
                application_id,
                job_id: job.posting.id.clone(),
                candidate,
                tracker,
            };

            let stored = match self.applications.insert(record) {
                Ok(stored) => stored,
                Err(RepositoryError::Conflict) => {
                    info!(job_id = %job.posting.id, "duplicate application refused");
                    return Err(PipelineServiceError::DuplicateApplication);
                }
                Err(err) => return Err(err.into()),
            };

            info!(
                application_id = %stored.application_id,
                job_id = %stored.job_id,
                "application received"
            );
            Ok(stored)
        })
    }

    pub fn get(
        &self,
        application_id: &ApplicationId,
    ) -> Result<ApplicationRecord, PipelineServiceError> {
        self.applications
            .fetch(application_id)?
            .ok_or_else(|| PipelineServiceError::ApplicationNotFound(application_id.clone()))
    }

    pub fn status(
        &self,
        application_id: &ApplicationId,
    ) -> Result<ApplicationStatusView, PipelineServiceError> {
        let record = self.get(application_id)?;
        let job = self.job(&record.job_id)?;
        Ok(record.status_view(&job.registry))
    }

    /// Upsert a stage score and apply the resulting transition.
    pub fn record_score(
        &self,
        application_id: &ApplicationId,
        request: ScoreRequest,
        recorded_by: ActorId,
    ) -> Result<PipelineUpdate, PipelineServiceError> {
        let stage_id = request.stage_id.clone();
        let engine = self.engine;
        let update = self.transition(application_id, Some(&stage_id), |tracker, registry| {
            tracker.record_score(
                registry,
                &engine,
                ScoreEntry {
                    stage_id: request.stage_id,
                    value: request.value,
                    feedback: request.feedback,
                    recorded_by,
                    recorded_at: Utc::now(),
                },
            )
        })?;

        info!(
            application_id = %application_id,
            stage_id = %stage_id,
            decision = %update.decision.summary(),
            status = update.record.tracker.status().label(),
            "score recorded"
        );
        Ok(update)
    }

    pub fn advance_manually(
        &self,
        application_id: &ApplicationId,
        acting_user: ActorId,
    ) -> Result<PipelineUpdate, PipelineServiceError> {
        let update = self.transition(application_id, None, |tracker, registry| {
            tracker.advance_manually(registry, acting_user, Utc::now())
        })?;
        info!(
            application_id = %application_id,
            decision = %update.decision.summary(),
            "application advanced manually"
        );
        Ok(update)
    }

    pub fn override_status(
        &self,
        application_id: &ApplicationId,
        conclusion: Conclusion,
        acting_user: ActorId,
        reason: Option<String>,
    ) -> Result<PipelineUpdate, PipelineServiceError> {
        let update = self.transition(application_id, None, |tracker, _| {
            tracker.override_status(conclusion, acting_user, reason, Utc::now())
        })?;
        info!(
            application_id = %application_id,
            status = update.record.tracker.status().label(),
            "status overridden"
        );
        Ok(update)
    }

    /// Append a free-form recruiter note, optionally tied to a stage.
    pub fn add_note(
        &self,
        application_id: &ApplicationId,
        author: ActorId,
        stage_id: Option<StageId>,
        note: String,
    ) -> Result<AuditNote, PipelineServiceError> {
        let note = normalize_text(Some(note)).ok_or(PipelineServiceError::EmptyNote)?;
        let record = self.get(application_id)?;
        if let Some(stage_id) = &stage_id {
            let job = self.job(&record.job_id)?;
            if !job.registry.contains(stage_id) {
                return Err(TrackerError::UnknownStage(stage_id.clone()).into());
            }
        }

        let entry = AuditNote {
            application_id: application_id.clone(),
            stage_id,
            author,
            note,
            recorded_at: Utc::now(),
        };
        self.audit.append_note(entry.clone())?;
        Ok(entry)
    }

    pub fn notes(
        &self,
        application_id: &ApplicationId,
    ) -> Result<Vec<AuditNote>, PipelineServiceError> {
        self.get(application_id)?;
        Ok(self.audit.notes_for(application_id)?)
    }

    /// Remove an application; the returned record is the archived tracker.
    pub fn remove_application(
        &self,
        application_id: &ApplicationId,
    ) -> Result<ApplicationRecord, PipelineServiceError> {
        let removed = self
            .application_locks
            .exclusive(application_id, || self.applications.remove(application_id))?
            .ok_or_else(|| PipelineServiceError::ApplicationNotFound(application_id.clone()))?;

        info!(
            application_id = %application_id,
            status = removed.tracker.status().label(),
            "application removed"
        );
        Ok(removed)
    }

    /// A job's applications, newest first, optionally restricted to one status.
    pub fn list_applications(
        &self,
        job_id: &JobId,
        status: Option<PipelineStatus>,
    ) -> Result<Vec<ApplicationStatusView>, PipelineServiceError> {
        let job = self.job(job_id)?;
        let mut records = self.applications.list_for_job(job_id)?;
        records.retain(|record| matches_status(record, status));
        sort_newest_first(&mut records);
        Ok(records
            .iter()
            .map(|record| record.status_view(&job.registry))
            .collect())
    }

    /// Applications across every posting a recruiter owns, newest first.
    pub fn recruiter_applications(
        &self,
        recruiter_id: &ActorId,
        status: Option<PipelineStatus>,
    ) -> Result<Vec<CandidateListing>, PipelineServiceError> {
        let mut listings = Vec::new();
        for job in self.jobs.list_for_recruiter(recruiter_id)? {
            let mut records = self.applications.list_for_job(&job.posting.id)?;
            records.retain(|record| matches_status(record, status));
            listings.extend(records.iter().map(|record| CandidateListing {
                job_title: job.posting.title.clone(),
                application: record.status_view(&job.registry),
            }));
        }

        listings.sort_by(|a, b| {
            b.application
                .applied_at
                .cmp(&a.application.applied_at)
                .then_with(|| b.application.application_id.cmp(&a.application.application_id))
        });
        Ok(listings)
    }

    pub fn analytics(&self, job_id: &JobId) -> Result<PipelineAnalytics, PipelineServiceError> {
        let job = self.job(job_id)?;
        let records = self.applications.list_for_job(job_id)?;
        Ok(PipelineAnalytics::from_records(
            job_id.clone(),
            &job.registry,
            &records,
        ))
    }

    pub fn recruiter_analytics(
        &self,
        recruiter_id: &ActorId,
    ) -> Result<RecruiterAnalytics, PipelineServiceError> {
        let jobs = self
            .jobs
            .list_for_recruiter(recruiter_id)?
            .into_iter()
            .map(|job| -> Result<_, RepositoryError> {
                let records = self.applications.list_for_job(&job.posting.id)?;
                Ok((job, records))
            })
            .collect::<Result<Vec<_>, RepositoryError>>()?;
        Ok(RecruiterAnalytics::from_jobs(recruiter_id.clone(), &jobs))
    }

    /// Load, transform and compare-and-swap one application under its lock and a shared
    /// lock on its job.
    fn transition<F>(
        &self,
        application_id: &ApplicationId,
        scored_stage: Option<&StageId>,
        operation: F,
    ) -> Result<PipelineUpdate, PipelineServiceError>
    where
        F: FnOnce(&ApplicationTracker, &StageRegistry) -> Result<TrackerTransition, TrackerError>,
    {
        self.application_locks.exclusive(application_id, || -> ServiceResult<PipelineUpdate> {
            let record = self.get(application_id)?;
            let job_id = record.job_id.clone();
            self.job_locks.shared(&job_id, || -> ServiceResult<PipelineUpdate> {
                let job = self.job(&job_id)?;
                self.commit(record, &job.registry, scored_stage, operation)
            })
        })
    }

    /// Audit entries are appended before the swap, so a committed transition always has its
    /// audit trail and a failed append leaves the stored tracker untouched.
    fn commit<F>(
        &self,
        record: ApplicationRecord,
        registry: &StageRegistry,
        scored_stage: Option<&StageId>,
        operation: F,
    ) -> Result<PipelineUpdate, PipelineServiceError>
    where
        F: FnOnce(&ApplicationTracker, &StageRegistry) -> Result<TrackerTransition, TrackerError>,
    {
        let application_id = record.application_id.clone();
        let TrackerTransition {
            tracker,
            decision,
            note,
        } = operation(&record.tracker, registry).map_err(|err| {
            warn!(application_id = %application_id, error = %err, "tracker transition refused");
            err
        })?;

        let new_score = scored_stage
            .and_then(|stage_id| tracker.score_for(stage_id))
            .filter(|score| record.tracker.score_for(&score.stage_id) != Some(*score));
        if let Some(score) = new_score {
            self.audit.append_score(&application_id, score)?;
        }

        let noted = note.is_some();
        if let Some(note) = note {
            self.audit.append_note(note)?;
        }

        let stored = if tracker == record.tracker && !noted {
            record
        } else {
            let expected_version = record.tracker.version();
            self.applications
                .compare_and_swap(ApplicationRecord { tracker, ..record }, expected_version)?
        };

        let view = stored.status_view(registry);
        Ok(PipelineUpdate {
            record: stored,
            decision,
            view,
        })
    }
}

fn matches_status(record: &ApplicationRecord, status: Option<PipelineStatus>) -> bool {
    status.map_or(true, |status| record.tracker.status() == status)
}

fn sort_newest_first(records: &mut [ApplicationRecord]) {
    records.sort_by(|a, b| {
        b.tracker
            .applied_at()
            .cmp(&a.tracker.applied_at())
            .then_with(|| b.application_id.cmp(&a.application_id))
    });
}

/// Coarse error classes used to decide how a failure is surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed input; the caller must fix it.
    Validation,
    /// The request does not fit the application's current state.
    State,
    /// Conflicts with existing data; shown to the user as an actionable message.
    Conflict,
    NotFound,
    Unavailable,
}

/// Error raised by the pipeline service.
#[derive(Debug, thiserror::Error)]
pub enum PipelineServiceError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Tracker(#[from] TrackerError),
    #[error(transparent)]
    Intake(#[from] IntakeViolation),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error("you have already applied to this position")]
    DuplicateApplication,
    #[error("job '{0}' not found")]
    JobNotFound(JobId),
    #[error("application '{0}' not found")]
    ApplicationNotFound(ApplicationId),
    #[error("a job title is required")]
    MissingTitle,
    #[error("note text is required")]
    EmptyNote,
}

impl PipelineServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineServiceError::Registry(RegistryError::StageOrderConflict { .. }) => {
                ErrorKind::Conflict
            }
            PipelineServiceError::Registry(_) => ErrorKind::Validation,
            PipelineServiceError::Tracker(TrackerError::InvalidScore(_)) => ErrorKind::Validation,
            PipelineServiceError::Tracker(TrackerError::EmptyRegistry) => ErrorKind::NotFound,
            PipelineServiceError::Tracker(_) => ErrorKind::State,
            PipelineServiceError::Intake(IntakeViolation::JobNotOpen) => ErrorKind::NotFound,
            PipelineServiceError::Intake(_) => ErrorKind::Validation,
            PipelineServiceError::Repository(RepositoryError::Conflict)
            | PipelineServiceError::Repository(RepositoryError::VersionMismatch { .. }) => {
                ErrorKind::Conflict
            }
            PipelineServiceError::Repository(RepositoryError::NotFound) => ErrorKind::NotFound,
            PipelineServiceError::Repository(RepositoryError::Unavailable(_)) => {
                ErrorKind::Unavailable
            }
            PipelineServiceError::DuplicateApplication => ErrorKind::Conflict,
            PipelineServiceError::JobNotFound(_) | PipelineServiceError::ApplicationNotFound(_) => {
                ErrorKind::NotFound
            }
            PipelineServiceError::MissingTitle | PipelineServiceError::EmptyNote => {
                ErrorKind::Validation
            }
        }
    }
}
