use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use axum::response::Response;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

use crate::pipeline::domain::{
    ActorId, ApplicationId, ApplicationRecord, AuditNote, CandidateSubmission, JobDraft, JobId,
    JobStatus, RegistryId, Score, StageId,
};
use crate::pipeline::registry::{StageRegistry, StageSpec};
use crate::pipeline::repository::{
    ApplicationRepository, AuditLog, JobRecord, JobRepository, RepositoryError,
};
use crate::pipeline::tracker::ScoreEntry;
use crate::pipeline::{pipeline_router, DecisionPolicy, FailurePolicy, PipelineService};

pub(super) type MemoryService = PipelineService<MemoryJobs, MemoryApplications, MemoryAudit>;

pub(super) fn at(minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 14, 9, minute, 0)
        .single()
        .expect("valid timestamp")
}

pub(super) fn evaluator() -> ActorId {
    ActorId::new("evaluator-7")
}

pub(super) fn recruiter() -> ActorId {
    ActorId::new("recruiter-1")
}

/// A(1, 70, auto) then B(2, 80, auto).
pub(super) fn two_stage_specs() -> Vec<StageSpec> {
    vec![
        StageSpec::new("Screen", 1, 70, true).with_id("A"),
        StageSpec::new("Onsite", 2, 80, true).with_id("B"),
    ]
}

pub(super) fn two_stage_registry() -> StageRegistry {
    StageRegistry::create(RegistryId::new("reg-1"), two_stage_specs()).expect("valid registry")
}

pub(super) fn single_stage_registry() -> StageRegistry {
    StageRegistry::create(
        RegistryId::new("reg-solo"),
        vec![StageSpec::new("Interview", 1, 75, true).with_id("A")],
    )
    .expect("valid registry")
}

pub(super) fn stage(id: &str) -> StageId {
    StageId::new(id)
}

pub(super) fn entry(stage_id: &str, value: i32, minute: u32) -> ScoreEntry {
    ScoreEntry {
        stage_id: stage(stage_id),
        value,
        feedback: None,
        recorded_by: evaluator(),
        recorded_at: at(minute),
    }
}

pub(super) fn open_draft(title: &str) -> JobDraft {
    let mut draft = JobDraft::new(title, "Build the hiring platform", recruiter());
    draft.status = JobStatus::Open;
    draft
}

pub(super) fn submission(email: &str) -> CandidateSubmission {
    CandidateSubmission {
        full_name: "Ada Lovelace".to_string(),
        email: email.to_string(),
        phone: Some(" 555-0100 ".to_string()),
        resume_url: None,
        linkedin_url: Some("   ".to_string()),
    }
}

pub(super) fn build_service(policy: FailurePolicy) -> (Arc<MemoryService>, MemoryStores) {
    let stores = MemoryStores::default();
    let service = PipelineService::new(
        Arc::new(stores.jobs.clone()),
        Arc::new(stores.applications.clone()),
        Arc::new(stores.audit.clone()),
        DecisionPolicy::new(policy),
    );
    (Arc::new(service), stores)
}

/// Service with an open two-stage job already published.
pub(super) fn service_with_open_job(policy: FailurePolicy) -> (Arc<MemoryService>, MemoryStores, JobRecord) {
    let (service, stores) = build_service(policy);
    let job = service
        .publish_job(open_draft("Platform Engineer"), Some(two_stage_specs()))
        .expect("job publishes");
    (service, stores, job)
}

pub(super) fn router_with_service(service: Arc<MemoryService>) -> axum::Router {
    pipeline_router(service)
}

#[derive(Default, Clone)]
pub(super) struct MemoryStores {
    pub(super) jobs: MemoryJobs,
    pub(super) applications: MemoryApplications,
    pub(super) audit: MemoryAudit,
}

#[derive(Default, Clone)]
pub(super) struct MemoryJobs {
    records: Arc<Mutex<HashMap<JobId, JobRecord>>>,
}

impl JobRepository for MemoryJobs {
    fn insert(&self, record: JobRecord) -> Result<JobRecord, RepositoryError> {
        let mut guard = self.records.lock().expect("job mutex poisoned");
        if guard.contains_key(&record.posting.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(record.posting.id.clone(), record.clone());
        Ok(record)
    }

    fn update(&self, record: JobRecord) -> Result<(), RepositoryError> {
        let mut guard = self.records.lock().expect("job mutex poisoned");
        if !guard.contains_key(&record.posting.id) {
            return Err(RepositoryError::NotFound);
        }
        guard.insert(record.posting.id.clone(), record);
        Ok(())
    }

    fn fetch(&self, id: &JobId) -> Result<Option<JobRecord>, RepositoryError> {
        let guard = self.records.lock().expect("job mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn fetch_by_token(&self, public_token: &str) -> Result<Option<JobRecord>, RepositoryError> {
        let guard = self.records.lock().expect("job mutex poisoned");
        Ok(guard
            .values()
            .find(|record| record.posting.public_token == public_token)
            .cloned())
    }

    fn list_for_recruiter(
        &self,
        recruiter_id: &ActorId,
    ) -> Result<Vec<JobRecord>, RepositoryError> {
        let guard = self.records.lock().expect("job mutex poisoned");
        Ok(guard
            .values()
            .filter(|record| &record.posting.recruiter_id == recruiter_id)
            .cloned()
            .collect())
    }

    fn remove(&self, id: &JobId) -> Result<Option<JobRecord>, RepositoryError> {
        Ok(self.records.lock().expect("job mutex poisoned").remove(id))
    }
}

type Callback = Box<dyn FnOnce() + Send>;

/// Job store that runs a one-off callback after resolving a public token, before the caller
/// sees the (by then possibly stale) record.
#[derive(Default, Clone)]
pub(super) struct InterleavingJobs {
    pub(super) inner: MemoryJobs,
    after_token_lookup: Arc<Mutex<Option<Callback>>>,
}

impl InterleavingJobs {
    pub(super) fn after_token_lookup(&self, callback: impl FnOnce() + Send + 'static) {
        *self
            .after_token_lookup
            .lock()
            .expect("callback mutex poisoned") = Some(Box::new(callback));
    }
}

impl JobRepository for InterleavingJobs {
    fn insert(&self, record: JobRecord) -> Result<JobRecord, RepositoryError> {
        self.inner.insert(record)
    }

    fn update(&self, record: JobRecord) -> Result<(), RepositoryError> {
        self.inner.update(record)
    }

    fn fetch(&self, id: &JobId) -> Result<Option<JobRecord>, RepositoryError> {
        self.inner.fetch(id)
    }

    fn fetch_by_token(&self, public_token: &str) -> Result<Option<JobRecord>, RepositoryError> {
        let found = self.inner.fetch_by_token(public_token)?;
        let callback = self
            .after_token_lookup
            .lock()
            .expect("callback mutex poisoned")
            .take();
        if let Some(callback) = callback {
            callback();
        }
        Ok(found)
    }

    fn list_for_recruiter(
        &self,
        recruiter_id: &ActorId,
    ) -> Result<Vec<JobRecord>, RepositoryError> {
        self.inner.list_for_recruiter(recruiter_id)
    }

    fn remove(&self, id: &JobId) -> Result<Option<JobRecord>, RepositoryError> {
        self.inner.remove(id)
    }
}

#[derive(Default, Clone)]
pub(super) struct MemoryApplications {
    pub(super) records: Arc<Mutex<HashMap<ApplicationId, ApplicationRecord>>>,
}

impl ApplicationRepository for MemoryApplications {
    fn insert(&self, record: ApplicationRecord) -> Result<ApplicationRecord, RepositoryError> {
        let mut guard = self.records.lock().expect("application mutex poisoned");
        let email_key = record.candidate.email_key();
        let duplicate = guard.values().any(|existing| {
            existing.job_id == record.job_id && existing.candidate.email_key() == email_key
        });
        if duplicate || guard.contains_key(&record.application_id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(record.application_id.clone(), record.clone());
        Ok(record)
    }

    fn fetch(&self, id: &ApplicationId) -> Result<Option<ApplicationRecord>, RepositoryError> {
        let guard = self.records.lock().expect("application mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn compare_and_swap(
        &self,
        mut record: ApplicationRecord,
        expected_version: u64,
    ) -> Result<ApplicationRecord, RepositoryError> {
        let mut guard = self.records.lock().expect("application mutex poisoned");
        let stored = guard
            .get(&record.application_id)
            .ok_or(RepositoryError::NotFound)?;
        let found = stored.tracker.version();
        if found != expected_version {
            return Err(RepositoryError::VersionMismatch {
                expected: expected_version,
                found,
            });
        }
        record.tracker = record.tracker.with_version(expected_version + 1);
        guard.insert(record.application_id.clone(), record.clone());
        Ok(record)
    }

    fn remove(&self, id: &ApplicationId) -> Result<Option<ApplicationRecord>, RepositoryError> {
        let mut guard = self.records.lock().expect("application mutex poisoned");
        Ok(guard.remove(id))
    }

    fn list_for_job(&self, job_id: &JobId) -> Result<Vec<ApplicationRecord>, RepositoryError> {
        let guard = self.records.lock().expect("application mutex poisoned");
        Ok(guard
            .values()
            .filter(|record| &record.job_id == job_id)
            .cloned()
            .collect())
    }
}

#[derive(Default, Clone)]
pub(super) struct MemoryAudit {
    scores: Arc<Mutex<Vec<(ApplicationId, Score)>>>,
    notes: Arc<Mutex<Vec<AuditNote>>>,
    offline: Arc<AtomicBool>,
}

impl MemoryAudit {
    /// While offline every append fails as unavailable.
    pub(super) fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn ensure_online(&self) -> Result<(), RepositoryError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable("audit log offline".to_string()));
        }
        Ok(())
    }

    pub(super) fn scores(&self) -> Vec<(ApplicationId, Score)> {
        self.scores.lock().expect("audit mutex poisoned").clone()
    }

    pub(super) fn notes(&self) -> Vec<AuditNote> {
        self.notes.lock().expect("audit mutex poisoned").clone()
    }
}

impl AuditLog for MemoryAudit {
    fn append_score(
        &self,
        application_id: &ApplicationId,
        score: &Score,
    ) -> Result<(), RepositoryError> {
        self.ensure_online()?;
        self.scores
            .lock()
            .expect("audit mutex poisoned")
            .push((application_id.clone(), score.clone()));
        Ok(())
    }

    fn append_note(&self, note: AuditNote) -> Result<(), RepositoryError> {
        self.ensure_online()?;
        self.notes.lock().expect("audit mutex poisoned").push(note);
        Ok(())
    }

    fn notes_for(&self, application_id: &ApplicationId) -> Result<Vec<AuditNote>, RepositoryError> {
        Ok(self
            .notes()
            .into_iter()
            .filter(|note| &note.application_id == application_id)
            .collect())
    }
}

/// Application store whose backing database is offline.
pub(super) struct UnavailableApplications;

impl ApplicationRepository for UnavailableApplications {
    fn insert(&self, _record: ApplicationRecord) -> Result<ApplicationRecord, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn fetch(&self, _id: &ApplicationId) -> Result<Option<ApplicationRecord>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn compare_and_swap(
        &self,
        _record: ApplicationRecord,
        _expected_version: u64,
    ) -> Result<ApplicationRecord, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn remove(&self, _id: &ApplicationId) -> Result<Option<ApplicationRecord>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn list_for_job(&self, _job_id: &JobId) -> Result<Vec<ApplicationRecord>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
