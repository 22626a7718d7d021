use chrono::{DateTime, Utc};
use serde::Serialize;

use super::domain::{ActorId, ApplicationId, ApplicationRecord, JobId, PipelineStatus, StageId};
use super::registry::StageRegistry;
use super::repository::JobRecord;

/// How many of the newest applications the recruiter dashboard lists.
pub const RECENT_APPLICATION_LIMIT: usize = 5;

/// Number of active candidates currently sitting on a stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageOccupancy {
    pub stage_id: StageId,
    pub name: String,
    pub order: u32,
    pub active_candidates: usize,
}

/// Hiring funnel totals for one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineAnalytics {
    pub job_id: JobId,
    pub total_candidates: usize,
    pub active: usize,
    pub hired: usize,
    pub rejected: usize,
    /// Rejected share of all candidates, as a rounded percentage.
    pub rejection_rate: u32,
    pub stage_occupancy: Vec<StageOccupancy>,
}

impl PipelineAnalytics {
    pub fn from_records(
        job_id: JobId,
        registry: &StageRegistry,
        records: &[ApplicationRecord],
    ) -> Self {
        let count = |status: PipelineStatus| {
            records
                .iter()
                .filter(|record| record.tracker.status() == status)
                .count()
        };

        let total_candidates = records.len();
        let active = count(PipelineStatus::Active);
        let hired = count(PipelineStatus::Hired);
        let rejected = count(PipelineStatus::Rejected);

        let stage_occupancy = registry
            .stages()
            .iter()
            .map(|stage| StageOccupancy {
                stage_id: stage.id.clone(),
                name: stage.name.clone(),
                order: stage.order,
                active_candidates: records
                    .iter()
                    .filter(|record| {
                        record.tracker.status().is_active()
                            && record.tracker.current_stage_id() == Some(&stage.id)
                    })
                    .count(),
            })
            .collect();

        Self {
            job_id,
            total_candidates,
            active,
            hired,
            rejected,
            rejection_rate: rounded_percent(rejected, total_candidates),
            stage_occupancy,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecentApplication {
    pub application_id: ApplicationId,
    pub job_id: JobId,
    pub job_title: String,
    pub candidate_name: String,
    pub status: PipelineStatus,
    pub applied_at: DateTime<Utc>,
}

/// Totals across every posting a recruiter owns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecruiterAnalytics {
    pub recruiter_id: ActorId,
    pub total_jobs: usize,
    pub open_positions: usize,
    pub total_candidates: usize,
    pub hired: usize,
    pub rejected: usize,
    pub rejection_rate: u32,
    /// Newest first.
    pub recent_applications: Vec<RecentApplication>,
}

impl RecruiterAnalytics {
    pub fn from_jobs(recruiter_id: ActorId, jobs: &[(JobRecord, Vec<ApplicationRecord>)]) -> Self {
        let open_positions = jobs
            .iter()
            .filter(|(job, _)| job.posting.accepts_applications())
            .count();

        let mut recent: Vec<RecentApplication> = jobs
            .iter()
            .flat_map(|(job, records)| {
                records.iter().map(move |record| RecentApplication {
                    application_id: record.application_id.clone(),
                    job_id: job.posting.id.clone(),
                    job_title: job.posting.title.clone(),
                    candidate_name: record.candidate.full_name.clone(),
                    status: record.tracker.status(),
                    applied_at: record.tracker.applied_at(),
                })
            })
            .collect();
        recent.sort_by(|a, b| {
            b.applied_at
                .cmp(&a.applied_at)
                .then_with(|| b.application_id.cmp(&a.application_id))
        });

        let total_candidates = recent.len();
        let count = |status: PipelineStatus| {
            recent
                .iter()
                .filter(|application| application.status == status)
                .count()
        };
        let hired = count(PipelineStatus::Hired);
        let rejected = count(PipelineStatus::Rejected);
        recent.truncate(RECENT_APPLICATION_LIMIT);

        Self {
            recruiter_id,
            total_jobs: jobs.len(),
            open_positions,
            total_candidates,
            hired,
            rejected,
            rejection_rate: rounded_percent(rejected, total_candidates),
            recent_applications: recent,
        }
    }
}

fn rounded_percent(part: usize, total: usize) -> u32 {
    if total == 0 {
        return 0;
    }
    ((part * 100 + total / 2) / total) as u32
}
