use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::error;

use super::decision::Decision;
use super::domain::{
    ActorId, ApplicationId, CandidateSubmission, Conclusion, JobDetails, JobDraft, JobId,
    JobPosting, JobStatus, PipelineStatus, StageId,
};
use super::registry::{Stage, StageSpec};
use super::repository::{
    ApplicationRepository, ApplicationStatusView, AuditLog, JobRecord, JobRepository,
};
use super::service::{ErrorKind, PipelineService, PipelineServiceError, PipelineUpdate, ScoreRequest};

/// Header carrying the identity-provider subject of the acting recruiter or evaluator.
pub const ACTOR_HEADER: &str = "x-actor-id";

type SharedService<J, A, L> = Arc<PipelineService<J, A, L>>;

/// Router builder exposing recruiter and public endpoints for the hiring pipeline.
pub fn pipeline_router<J, A, L>(service: SharedService<J, A, L>) -> Router
where
    J: JobRepository + 'static,
    A: ApplicationRepository + 'static,
    L: AuditLog + 'static,
{
    Router::new()
        .route(
            "/api/v1/jobs",
            post(publish_handler::<J, A, L>).get(list_jobs_handler::<J, A, L>),
        )
        .route(
            "/api/v1/jobs/:job_id",
            get(job_handler::<J, A, L>)
                .put(update_job_handler::<J, A, L>)
                .delete(delete_job_handler::<J, A, L>),
        )
        .route(
            "/api/v1/jobs/:job_id/status",
            put(job_status_handler::<J, A, L>),
        )
        .route(
            "/api/v1/jobs/:job_id/stages",
            put(republish_handler::<J, A, L>),
        )
        .route(
            "/api/v1/jobs/:job_id/applications",
            get(job_applications_handler::<J, A, L>),
        )
        .route(
            "/api/v1/jobs/:job_id/analytics",
            get(analytics_handler::<J, A, L>),
        )
        .route(
            "/api/v1/applications",
            get(recruiter_applications_handler::<J, A, L>),
        )
        .route(
            "/api/v1/analytics",
            get(recruiter_analytics_handler::<J, A, L>),
        )
        .route(
            "/api/v1/public/jobs/:token/applications",
            post(submit_handler::<J, A, L>),
        )
        .route(
            "/api/v1/applications/:application_id",
            get(status_handler::<J, A, L>).delete(remove_handler::<J, A, L>),
        )
        .route(
            "/api/v1/applications/:application_id/scores",
            post(score_handler::<J, A, L>),
        )
        .route(
            "/api/v1/applications/:application_id/advance",
            post(advance_handler::<J, A, L>),
        )
        .route(
            "/api/v1/applications/:application_id/status",
            post(override_handler::<J, A, L>),
        )
        .route(
            "/api/v1/applications/:application_id/notes",
            post(add_note_handler::<J, A, L>).get(notes_handler::<J, A, L>),
        )
        .with_state(service)
}

#[derive(Debug, Deserialize)]
pub struct PublishJobRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub employment_type: Option<String>,
    #[serde(default)]
    pub salary_range: Option<String>,
    #[serde(default)]
    pub requirements: Option<String>,
    #[serde(default)]
    pub status: Option<JobStatus>,
    /// Omitted stages fall back to the standard three-stage pipeline.
    #[serde(default)]
    pub stages: Option<Vec<StageSpec>>,
}

/// Optional `?status=` filter on application listings.
#[derive(Debug, Default, Deserialize)]
pub struct ApplicationFilter {
    #[serde(default)]
    pub status: Option<PipelineStatus>,
}

#[derive(Debug, Deserialize)]
pub struct JobStatusRequest {
    pub status: JobStatus,
}

#[derive(Debug, Deserialize)]
pub struct StagesRequest {
    pub stages: Vec<StageSpec>,
}

#[derive(Debug, Deserialize)]
pub struct OverrideRequest {
    pub status: Conclusion,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct NoteRequest {
    pub note: String,
    #[serde(default)]
    pub stage_id: Option<StageId>,
}

#[derive(Debug, Serialize)]
struct JobView<'a> {
    #[serde(flatten)]
    posting: &'a JobPosting,
    revision: u32,
    stages: &'a [Stage],
}

impl<'a> From<&'a JobRecord> for JobView<'a> {
    fn from(record: &'a JobRecord) -> Self {
        Self {
            posting: &record.posting,
            revision: record.registry.revision(),
            stages: record.registry.stages(),
        }
    }
}

#[derive(Debug, Serialize)]
struct TransitionView<'a> {
    decision: &'a Decision,
    summary: String,
    application: &'a ApplicationStatusView,
}

impl<'a> From<&'a PipelineUpdate> for TransitionView<'a> {
    fn from(update: &'a PipelineUpdate) -> Self {
        Self {
            decision: &update.decision,
            summary: update.decision.summary(),
            application: &update.view,
        }
    }
}

impl IntoResponse for PipelineServiceError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let status = match kind {
            ErrorKind::Validation => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorKind::State | ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        };

        let message = match kind {
            ErrorKind::State => {
                error!(error = %self, "pipeline state violation");
                "the application cannot be changed in its current state".to_string()
            }
            ErrorKind::Unavailable => {
                error!(error = %self, "pipeline storage unavailable");
                "the hiring pipeline is temporarily unavailable".to_string()
            }
            _ => self.to_string(),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

fn acting_user(headers: &HeaderMap) -> Result<ActorId, Response> {
    headers
        .get(ACTOR_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ActorId::new)
        .ok_or_else(|| {
            let payload = json!({ "error": format!("missing {ACTOR_HEADER} header") });
            (StatusCode::UNAUTHORIZED, Json(payload)).into_response()
        })
}

pub(crate) async fn publish_handler<J, A, L>(
    State(service): State<SharedService<J, A, L>>,
    headers: HeaderMap,
    Json(request): Json<PublishJobRequest>,
) -> Response
where
    J: JobRepository + 'static,
    A: ApplicationRepository + 'static,
    L: AuditLog + 'static,
{
    let recruiter = match acting_user(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };

    let mut draft = JobDraft::new(request.title, request.description, recruiter);
    draft.location = request.location;
    draft.salary_range = request.salary_range;
    draft.requirements = request.requirements;
    if let Some(employment_type) = request.employment_type {
        draft.employment_type = employment_type;
    }
    if let Some(status) = request.status {
        draft.status = status;
    }

    match service.publish_job(draft, request.stages) {
        Ok(record) => (StatusCode::CREATED, Json(JobView::from(&record))).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn list_jobs_handler<J, A, L>(
    State(service): State<SharedService<J, A, L>>,
    headers: HeaderMap,
) -> Response
where
    J: JobRepository + 'static,
    A: ApplicationRepository + 'static,
    L: AuditLog + 'static,
{
    let recruiter = match acting_user(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };

    match service.list_jobs(&recruiter) {
        Ok(jobs) => {
            let views: Vec<JobView<'_>> = jobs.iter().map(JobView::from).collect();
            (StatusCode::OK, Json(views)).into_response()
        }
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn job_handler<J, A, L>(
    State(service): State<SharedService<J, A, L>>,
    Path(job_id): Path<String>,
    headers: HeaderMap,
) -> Response
where
    J: JobRepository + 'static,
    A: ApplicationRepository + 'static,
    L: AuditLog + 'static,
{
    if let Err(response) = acting_user(&headers) {
        return response;
    }

    match service.job(&JobId(job_id)) {
        Ok(record) => (StatusCode::OK, Json(JobView::from(&record))).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn update_job_handler<J, A, L>(
    State(service): State<SharedService<J, A, L>>,
    Path(job_id): Path<String>,
    headers: HeaderMap,
    Json(details): Json<JobDetails>,
) -> Response
where
    J: JobRepository + 'static,
    A: ApplicationRepository + 'static,
    L: AuditLog + 'static,
{
    if let Err(response) = acting_user(&headers) {
        return response;
    }

    match service.update_job(&JobId(job_id), details) {
        Ok(record) => (StatusCode::OK, Json(JobView::from(&record))).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn delete_job_handler<J, A, L>(
    State(service): State<SharedService<J, A, L>>,
    Path(job_id): Path<String>,
    headers: HeaderMap,
) -> Response
where
    J: JobRepository + 'static,
    A: ApplicationRepository + 'static,
    L: AuditLog + 'static,
{
    if let Err(response) = acting_user(&headers) {
        return response;
    }

    match service.delete_job(&JobId(job_id)) {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn job_status_handler<J, A, L>(
    State(service): State<SharedService<J, A, L>>,
    Path(job_id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<JobStatusRequest>,
) -> Response
where
    J: JobRepository + 'static,
    A: ApplicationRepository + 'static,
    L: AuditLog + 'static,
{
    if let Err(response) = acting_user(&headers) {
        return response;
    }

    match service.set_job_status(&JobId(job_id), request.status) {
        Ok(record) => (StatusCode::OK, Json(JobView::from(&record))).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn republish_handler<J, A, L>(
    State(service): State<SharedService<J, A, L>>,
    Path(job_id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<StagesRequest>,
) -> Response
where
    J: JobRepository + 'static,
    A: ApplicationRepository + 'static,
    L: AuditLog + 'static,
{
    if let Err(response) = acting_user(&headers) {
        return response;
    }

    match service.republish_stages(&JobId(job_id), request.stages) {
        Ok(registry) => (StatusCode::OK, Json(registry.as_ref())).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn analytics_handler<J, A, L>(
    State(service): State<SharedService<J, A, L>>,
    Path(job_id): Path<String>,
    headers: HeaderMap,
) -> Response
where
    J: JobRepository + 'static,
    A: ApplicationRepository + 'static,
    L: AuditLog + 'static,
{
    if let Err(response) = acting_user(&headers) {
        return response;
    }

    match service.analytics(&JobId(job_id)) {
        Ok(analytics) => (StatusCode::OK, Json(analytics)).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn job_applications_handler<J, A, L>(
    State(service): State<SharedService<J, A, L>>,
    Path(job_id): Path<String>,
    Query(filter): Query<ApplicationFilter>,
    headers: HeaderMap,
) -> Response
where
    J: JobRepository + 'static,
    A: ApplicationRepository + 'static,
    L: AuditLog + 'static,
{
    if let Err(response) = acting_user(&headers) {
        return response;
    }

    match service.list_applications(&JobId(job_id), filter.status) {
        Ok(views) => (StatusCode::OK, Json(views)).into_response(),
        Err(err) => err.into_response(),
    }
}

/// Every application across the acting recruiter's postings.
pub(crate) async fn recruiter_applications_handler<J, A, L>(
    State(service): State<SharedService<J, A, L>>,
    Query(filter): Query<ApplicationFilter>,
    headers: HeaderMap,
) -> Response
where
    J: JobRepository + 'static,
    A: ApplicationRepository + 'static,
    L: AuditLog + 'static,
{
    let recruiter = match acting_user(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };

    match service.recruiter_applications(&recruiter, filter.status) {
        Ok(listings) => (StatusCode::OK, Json(listings)).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn recruiter_analytics_handler<J, A, L>(
    State(service): State<SharedService<J, A, L>>,
    headers: HeaderMap,
) -> Response
where
    J: JobRepository + 'static,
    A: ApplicationRepository + 'static,
    L: AuditLog + 'static,
{
    let recruiter = match acting_user(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };

    match service.recruiter_analytics(&recruiter) {
        Ok(analytics) => (StatusCode::OK, Json(analytics)).into_response(),
        Err(err) => err.into_response(),
    }
}

/// Public intake; candidates are anonymous so no actor header is required.
pub(crate) async fn submit_handler<J, A, L>(
    State(service): State<SharedService<J, A, L>>,
    Path(token): Path<String>,
    Json(submission): Json<CandidateSubmission>,
) -> Response
where
    J: JobRepository + 'static,
    A: ApplicationRepository + 'static,
    L: AuditLog + 'static,
{
    let result = service
        .submit(&token, submission)
        .and_then(|record| service.status(&record.application_id));

    match result {
        Ok(view) => (StatusCode::CREATED, Json(view)).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn status_handler<J, A, L>(
    State(service): State<SharedService<J, A, L>>,
    Path(application_id): Path<String>,
    headers: HeaderMap,
) -> Response
where
    J: JobRepository + 'static,
    A: ApplicationRepository + 'static,
    L: AuditLog + 'static,
{
    if let Err(response) = acting_user(&headers) {
        return response;
    }

    match service.status(&ApplicationId(application_id)) {
        Ok(view) => (StatusCode::OK, Json(view)).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn remove_handler<J, A, L>(
    State(service): State<SharedService<J, A, L>>,
    Path(application_id): Path<String>,
    headers: HeaderMap,
) -> Response
where
    J: JobRepository + 'static,
    A: ApplicationRepository + 'static,
    L: AuditLog + 'static,
{
    if let Err(response) = acting_user(&headers) {
        return response;
    }

    match service.remove_application(&ApplicationId(application_id)) {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn score_handler<J, A, L>(
    State(service): State<SharedService<J, A, L>>,
    Path(application_id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<ScoreRequest>,
) -> Response
where
    J: JobRepository + 'static,
    A: ApplicationRepository + 'static,
    L: AuditLog + 'static,
{
    let evaluator = match acting_user(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };

    match service.record_score(&ApplicationId(application_id), request, evaluator) {
        Ok(update) => (StatusCode::OK, Json(TransitionView::from(&update))).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn advance_handler<J, A, L>(
    State(service): State<SharedService<J, A, L>>,
    Path(application_id): Path<String>,
    headers: HeaderMap,
) -> Response
where
    J: JobRepository + 'static,
    A: ApplicationRepository + 'static,
    L: AuditLog + 'static,
{
    let recruiter = match acting_user(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };

    match service.advance_manually(&ApplicationId(application_id), recruiter) {
        Ok(update) => (StatusCode::OK, Json(TransitionView::from(&update))).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn override_handler<J, A, L>(
    State(service): State<SharedService<J, A, L>>,
    Path(application_id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<OverrideRequest>,
) -> Response
where
    J: JobRepository + 'static,
    A: ApplicationRepository + 'static,
    L: AuditLog + 'static,
{
    let recruiter = match acting_user(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };

    match service.override_status(
        &ApplicationId(application_id),
        request.status,
        recruiter,
        request.reason,
    ) {
        Ok(update) => (StatusCode::OK, Json(TransitionView::from(&update))).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn add_note_handler<J, A, L>(
    State(service): State<SharedService<J, A, L>>,
    Path(application_id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<NoteRequest>,
) -> Response
where
    J: JobRepository + 'static,
    A: ApplicationRepository + 'static,
    L: AuditLog + 'static,
{
    let author = match acting_user(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };

    match service.add_note(
        &ApplicationId(application_id),
        author,
        request.stage_id,
        request.note,
    ) {
        Ok(note) => (StatusCode::CREATED, Json(note)).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn notes_handler<J, A, L>(
    State(service): State<SharedService<J, A, L>>,
    Path(application_id): Path<String>,
    headers: HeaderMap,
) -> Response
where
    J: JobRepository + 'static,
    A: ApplicationRepository + 'static,
    L: AuditLog + 'static,
{
    if let Err(response) = acting_user(&headers) {
        return response;
    }

    match service.notes(&ApplicationId(application_id)) {
        Ok(notes) => (StatusCode::OK, Json(notes)).into_response(),
        Err(err) => err.into_response(),
    }
}
