use crate::cli::parse_failure_policy;
use crate::infra::{
    load_stage_specs, InMemoryApplicationRepository, InMemoryAuditLog, InMemoryJobRepository,
};
use clap::Args;
use hiring_pipeline::error::AppError;
use hiring_pipeline::pipeline::{
    ActorId, ApplicationId, CandidateSubmission, Decision, DecisionPolicy, FailurePolicy,
    JobDraft, JobStatus, PipelineService, PipelineServiceError, RegistryId, ScoreRequest,
    StageRegistry, StageSpec,
};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// What a failing score does: reject (default) or retry.
    #[arg(long, value_parser = parse_failure_policy)]
    pub(crate) failure_policy: Option<FailurePolicy>,
    /// Optional JSON stage list to use instead of the demo pipeline.
    #[arg(long)]
    pub(crate) stages: Option<PathBuf>,
    /// Print each candidate's status payload as JSON.
    #[arg(long)]
    pub(crate) json: bool,
}

#[derive(Args, Debug)]
pub(crate) struct RegistryValidateArgs {
    /// Path to a JSON array of stage definitions
    pub(crate) path: PathBuf,
}

type DemoService =
    PipelineService<InMemoryJobRepository, InMemoryApplicationRepository, InMemoryAuditLog>;

pub(crate) fn run_registry_validate(args: RegistryValidateArgs) -> Result<(), AppError> {
    let specs = load_stage_specs(&args.path)?;
    let registry = StageRegistry::create(RegistryId::new("validation"), specs)
        .map_err(PipelineServiceError::from)?;

    println!(
        "{} is a valid pipeline with {} stage(s):",
        args.path.display(),
        registry.stages().len()
    );
    for stage in registry.stages() {
        println!(
            "  {}. {} (pass >= {}, {})",
            stage.order,
            stage.name,
            stage.pass_threshold,
            if stage.auto_advance {
                "auto-advance"
            } else {
                "recruiter advances"
            }
        );
    }
    Ok(())
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        failure_policy,
        stages,
        json,
    } = args;

    let policy = DecisionPolicy::new(failure_policy.unwrap_or_default());
    let audit = Arc::new(InMemoryAuditLog::default());
    let service: DemoService = PipelineService::new(
        Arc::new(InMemoryJobRepository::default()),
        Arc::new(InMemoryApplicationRepository::default()),
        audit.clone(),
        policy,
    );

    let specs = match stages {
        Some(path) => load_stage_specs(&path)?,
        None => demo_stages(),
    };

    let recruiter = ActorId::new("demo-recruiter");
    let mut draft = JobDraft::new(
        "Backend Engineer",
        "Own the services behind our hiring pipeline",
        recruiter,
    );
    draft.status = JobStatus::Open;
    draft.location = Some("Remote".to_string());
    draft.requirements = Some("Production Rust and a taste for well-typed workflows".to_string());
    let job = service.publish_job(draft, Some(specs))?;

    println!("Hiring pipeline demo");
    println!(
        "Published {} ({}) with failure policy '{}':",
        job.posting.title,
        job.posting.id,
        policy.on_failure.label()
    );
    for stage in job.registry.stages() {
        println!(
            "  {}. {} [{}] pass >= {}{}",
            stage.order,
            stage.name,
            stage.id,
            stage.pass_threshold,
            if stage.auto_advance { ", auto" } else { "" }
        );
    }

    let evaluator = ActorId::new("demo-interviewer");
    let candidates = [
        ("Ada Lovelace", "ada@example.com", [92, 88, 95]),
        ("Charles Babbage", "charles@example.com", [81, 62, 90]),
        ("Grace Hopper", "grace@example.com", [55, 97, 97]),
    ];

    for (name, email, scores) in candidates {
        let record = match service.submit(&job.posting.public_token, submission(name, email)) {
            Ok(record) => record,
            Err(err) => {
                println!("\n{name}: submission refused ({err})");
                continue;
            }
        };
        println!("\n{name} applied as {}", record.application_id);
        walk_candidate(&service, &record.application_id, &scores, &evaluator)?;

        let view = service.status(&record.application_id)?;
        println!("  final: {}", view.summary);
        let history = audit
            .score_history(&record.application_id)
            .map_err(PipelineServiceError::from)?;
        println!("  {} score(s) in the audit log", history.len());
        if json {
            match serde_json::to_string_pretty(&view) {
                Ok(payload) => println!("{payload}"),
                Err(err) => println!("  status payload unavailable: {err}"),
            }
        }
    }

    match service.submit(
        &job.posting.public_token,
        submission("Ada Lovelace", "ADA@example.com"),
    ) {
        Ok(record) => println!("\nUnexpected duplicate accepted: {}", record.application_id),
        Err(err) => println!("\nRepeat submission refused: {err}"),
    }

    let analytics = service.analytics(&job.posting.id)?;
    println!(
        "\nFunnel: {} candidates | {} active | {} hired | {} rejected | {}% rejection rate",
        analytics.total_candidates,
        analytics.active,
        analytics.hired,
        analytics.rejected,
        analytics.rejection_rate
    );
    for occupancy in &analytics.stage_occupancy {
        println!(
            "  {}: {} active candidate(s)",
            occupancy.name, occupancy.active_candidates
        );
    }

    let overview = service.recruiter_analytics(&job.posting.recruiter_id)?;
    println!(
        "\nRecruiter overview: {} open position(s), latest applications:",
        overview.open_positions
    );
    for recent in &overview.recent_applications {
        println!(
            "  {} for {} ({})",
            recent.candidate_name,
            recent.job_title,
            recent.status.label()
        );
    }

    Ok(())
}

fn walk_candidate(
    service: &DemoService,
    application_id: &ApplicationId,
    scores: &[i32],
    evaluator: &ActorId,
) -> Result<(), AppError> {
    let recruiter = ActorId::new("demo-recruiter");

    for value in scores {
        let record = service.get(application_id)?;
        let Some(stage_id) = record.tracker.current_stage_id().cloned() else {
            break;
        };
        if !record.tracker.status().is_active() {
            break;
        }

        let update = service.record_score(
            application_id,
            ScoreRequest {
                stage_id: stage_id.clone(),
                value: *value,
                feedback: None,
            },
            evaluator.clone(),
        )?;
        println!("  {stage_id} scored {value}: {}", update.decision.summary());

        let Decision::Hold(held) = &update.decision else {
            continue;
        };
        let job = service.job(&record.job_id)?;
        let passed = job
            .registry
            .stage(held)
            .zip(update.record.tracker.score_for(held))
            .map(|(stage, score)| stage.passes(score.value))
            .unwrap_or(false);
        if !passed {
            // Held on a failing score under the retry policy.
            break;
        }

        let advanced = service.advance_manually(application_id, recruiter.clone())?;
        println!("  recruiter: {}", advanced.decision.summary());
    }
    Ok(())
}

fn demo_stages() -> Vec<StageSpec> {
    vec![
        StageSpec::new("Application Review", 1, 60, true).with_id("review"),
        StageSpec::new("Phone Screen", 2, 70, false).with_id("phone"),
        StageSpec::new("Technical Interview", 3, 75, true).with_id("technical"),
    ]
}

fn submission(name: &str, email: &str) -> CandidateSubmission {
    CandidateSubmission {
        full_name: name.to_string(),
        email: email.to_string(),
        phone: None,
        resume_url: Some(format!(
            "https://files.example.com/resumes/{}.pdf",
            email.replace(['@', '.'], "-")
        )),
        linkedin_url: None,
    }
}
