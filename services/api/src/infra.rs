use hiring_pipeline::pipeline::{
    ActorId, ApplicationId, ApplicationRecord, ApplicationRepository, AuditLog, AuditNote, JobId,
    JobRecord, JobRepository, RepositoryError, Score, StageSpec,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

fn lock<'a, T>(mutex: &'a Mutex<T>, store: &str) -> Result<MutexGuard<'a, T>, RepositoryError> {
    mutex
        .lock()
        .map_err(|_| RepositoryError::Unavailable(format!("{store} lock poisoned")))
}

#[derive(Default, Clone)]
pub(crate) struct InMemoryJobRepository {
    records: Arc<Mutex<HashMap<JobId, JobRecord>>>,
}

impl JobRepository for InMemoryJobRepository {
    fn insert(&self, record: JobRecord) -> Result<JobRecord, RepositoryError> {
        let mut guard = lock(&self.records, "job store")?;
        let token_taken = guard
            .values()
            .any(|existing| existing.posting.public_token == record.posting.public_token);
        if token_taken || guard.contains_key(&record.posting.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(record.posting.id.clone(), record.clone());
        Ok(record)
    }

    fn update(&self, record: JobRecord) -> Result<(), RepositoryError> {
        let mut guard = lock(&self.records, "job store")?;
        if guard.contains_key(&record.posting.id) {
            guard.insert(record.posting.id.clone(), record);
            Ok(())
        } else {
            Err(RepositoryError::NotFound)
        }
    }

    fn fetch(&self, id: &JobId) -> Result<Option<JobRecord>, RepositoryError> {
        let guard = lock(&self.records, "job store")?;
        Ok(guard.get(id).cloned())
    }

    fn fetch_by_token(&self, public_token: &str) -> Result<Option<JobRecord>, RepositoryError> {
        let guard = lock(&self.records, "job store")?;
        Ok(guard
            .values()
            .find(|record| record.posting.public_token == public_token)
            .cloned())
    }

    fn list_for_recruiter(
        &self,
        recruiter_id: &ActorId,
    ) -> Result<Vec<JobRecord>, RepositoryError> {
        let guard = lock(&self.records, "job store")?;
        Ok(guard
            .values()
            .filter(|record| &record.posting.recruiter_id == recruiter_id)
            .cloned()
            .collect())
    }

    fn remove(&self, id: &JobId) -> Result<Option<JobRecord>, RepositoryError> {
        Ok(lock(&self.records, "job store")?.remove(id))
    }
}

#[derive(Default)]
struct ApplicationTables {
    records: HashMap<ApplicationId, ApplicationRecord>,
    /// (job, candidate email key) pairs; one application per person per job.
    candidates: HashSet<(JobId, String)>,
}

#[derive(Default, Clone)]
pub(crate) struct InMemoryApplicationRepository {
    tables: Arc<Mutex<ApplicationTables>>,
}

impl ApplicationRepository for InMemoryApplicationRepository {
    fn insert(&self, record: ApplicationRecord) -> Result<ApplicationRecord, RepositoryError> {
        let mut guard = lock(&self.tables, "application store")?;
        let key = (record.job_id.clone(), record.candidate.email_key());
        if guard.candidates.contains(&key) || guard.records.contains_key(&record.application_id) {
            return Err(RepositoryError::Conflict);
        }
        guard.candidates.insert(key);
        guard
            .records
            .insert(record.application_id.clone(), record.clone());
        Ok(record)
    }

    fn fetch(&self, id: &ApplicationId) -> Result<Option<ApplicationRecord>, RepositoryError> {
        let guard = lock(&self.tables, "application store")?;
        Ok(guard.records.get(id).cloned())
    }

    fn compare_and_swap(
        &self,
        mut record: ApplicationRecord,
        expected_version: u64,
    ) -> Result<ApplicationRecord, RepositoryError> {
        let mut guard = lock(&self.tables, "application store")?;
        let found = guard
            .records
            .get(&record.application_id)
            .map(|stored| stored.tracker.version())
            .ok_or(RepositoryError::NotFound)?;
        if found != expected_version {
            return Err(RepositoryError::VersionMismatch {
                expected: expected_version,
                found,
            });
        }

        record.tracker = record.tracker.with_version(expected_version + 1);
        guard
            .records
            .insert(record.application_id.clone(), record.clone());
        Ok(record)
    }

    fn remove(&self, id: &ApplicationId) -> Result<Option<ApplicationRecord>, RepositoryError> {
        let mut guard = lock(&self.tables, "application store")?;
        let removed = guard.records.remove(id);
        if let Some(record) = &removed {
            guard
                .candidates
                .remove(&(record.job_id.clone(), record.candidate.email_key()));
        }
        Ok(removed)
    }

    fn list_for_job(&self, job_id: &JobId) -> Result<Vec<ApplicationRecord>, RepositoryError> {
        let guard = lock(&self.tables, "application store")?;
        let mut records: Vec<_> = guard
            .records
            .values()
            .filter(|record| &record.job_id == job_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| a.application_id.cmp(&b.application_id));
        Ok(records)
    }
}

#[derive(Default, Clone)]
pub(crate) struct InMemoryAuditLog {
    scores: Arc<Mutex<Vec<(ApplicationId, Score)>>>,
    notes: Arc<Mutex<Vec<AuditNote>>>,
}

impl InMemoryAuditLog {
    pub(crate) fn score_history(
        &self,
        application_id: &ApplicationId,
    ) -> Result<Vec<Score>, RepositoryError> {
        let guard = lock(&self.scores, "audit log")?;
        Ok(guard
            .iter()
            .filter(|(id, _)| id == application_id)
            .map(|(_, score)| score.clone())
            .collect())
    }
}

impl AuditLog for InMemoryAuditLog {
    fn append_score(
        &self,
        application_id: &ApplicationId,
        score: &Score,
    ) -> Result<(), RepositoryError> {
        lock(&self.scores, "audit log")?.push((application_id.clone(), score.clone()));
        Ok(())
    }

    fn append_note(&self, note: AuditNote) -> Result<(), RepositoryError> {
        lock(&self.notes, "audit log")?.push(note);
        Ok(())
    }

    fn notes_for(&self, application_id: &ApplicationId) -> Result<Vec<AuditNote>, RepositoryError> {
        let guard = lock(&self.notes, "audit log")?;
        Ok(guard
            .iter()
            .filter(|note| &note.application_id == application_id)
            .cloned()
            .collect())
    }
}

/// Read a JSON array of stage definitions from disk.
pub(crate) fn load_stage_specs(path: &Path) -> Result<Vec<StageSpec>, std::io::Error> {
    let raw = std::fs::read_to_string(path)?;
    serde_json::from_str(&raw).map_err(std::io::Error::from)
}
