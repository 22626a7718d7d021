use super::common::*;
use crate::pipeline::decision::{Decision, DecisionEngine, DecisionPolicy, FailurePolicy};
use crate::pipeline::domain::{ApplicationId, Conclusion, PipelineStatus, RegistryId};
use crate::pipeline::registry::{StageRegistry, StageSpec};
use crate::pipeline::tracker::{ApplicationTracker, TrackerError};

fn started(registry: &StageRegistry) -> ApplicationTracker {
    ApplicationTracker::start(registry, ApplicationId::new("app-1"), at(0)).expect("tracker starts")
}

fn engine() -> DecisionEngine {
    DecisionEngine::default()
}

#[test]
fn start_places_tracker_on_first_stage() {
    let registry = two_stage_registry();
    let tracker = started(&registry);
    assert_eq!(tracker.current_stage_id(), Some(&stage("A")));
    assert_eq!(tracker.status(), PipelineStatus::Active);
    assert!(tracker.scores().is_empty());
    assert_eq!(tracker.registry_id(), registry.id());
    assert_eq!(tracker.version(), 0);
}

#[test]
fn pass_then_fail_rejects_and_freezes_tracker() {
    let registry = two_stage_registry();
    let tracker = started(&registry);

    let first = tracker
        .record_score(&registry, &engine(), entry("A", 75, 1))
        .expect("score at A");
    assert_eq!(first.decision, Decision::Advance(stage("B")));
    assert_eq!(first.tracker.current_stage_id(), Some(&stage("B")));

    let second = first
        .tracker
        .record_score(&registry, &engine(), entry("B", 60, 2))
        .expect("score at B");
    assert_eq!(second.decision, Decision::Conclude(Conclusion::Rejected));
    assert_eq!(second.tracker.status(), PipelineStatus::Rejected);
    assert_eq!(second.tracker.current_stage_id(), Some(&stage("B")));

    match second
        .tracker
        .record_score(&registry, &engine(), entry("B", 95, 3))
    {
        Err(TrackerError::InactiveTracker {
            status: PipelineStatus::Rejected,
        }) => {}
        other => panic!("expected inactive tracker, got {other:?}"),
    }
}

#[test]
fn failing_first_stage_rejects_immediately() {
    let registry = two_stage_registry();
    let transition = started(&registry)
        .record_score(&registry, &engine(), entry("A", 65, 1))
        .expect("score recorded");
    assert_eq!(transition.tracker.status(), PipelineStatus::Rejected);
    assert_eq!(transition.tracker.current_stage_id(), Some(&stage("A")));
}

#[test]
fn passing_only_stage_hires() {
    let registry = single_stage_registry();
    let transition = started(&registry)
        .record_score(&registry, &engine(), entry("A", 90, 1))
        .expect("score recorded");
    assert_eq!(transition.decision, Decision::Conclude(Conclusion::Hired));
    assert_eq!(transition.tracker.status(), PipelineStatus::Hired);
}

#[test]
fn retry_policy_holds_then_accepts_superseding_score() {
    let registry = two_stage_registry();
    let engine = DecisionEngine::new(DecisionPolicy::new(FailurePolicy::Retry));

    let held = started(&registry)
        .record_score(&registry, &engine, entry("A", 50, 1))
        .expect("failing score recorded");
    assert_eq!(held.decision, Decision::Hold(stage("A")));
    assert_eq!(held.tracker.status(), PipelineStatus::Active);
    assert_eq!(held.tracker.current_stage_id(), Some(&stage("A")));

    let retried = held
        .tracker
        .record_score(&registry, &engine, entry("A", 72, 2))
        .expect("superseding score recorded");
    assert_eq!(retried.decision, Decision::Advance(stage("B")));
    assert_eq!(
        retried.tracker.score_for(&stage("A")).map(|s| s.value),
        Some(72)
    );
    assert_eq!(retried.tracker.scores().len(), 1);
}

#[test]
fn recording_identical_score_twice_is_idempotent() {
    let registry = StageRegistry::create(
        RegistryId::new("reg-hold"),
        vec![
            StageSpec::new("Screen", 1, 70, false).with_id("A"),
            StageSpec::new("Onsite", 2, 70, true).with_id("B"),
        ],
    )
    .expect("valid registry");

    let once = started(&registry)
        .record_score(&registry, &engine(), entry("A", 80, 1))
        .expect("first record");
    let twice = once
        .tracker
        .record_score(&registry, &engine(), entry("A", 80, 5))
        .expect("second record");

    assert_eq!(twice.tracker, once.tracker);
    assert_eq!(twice.decision, once.decision);
    assert_eq!(
        twice.tracker.score_for(&stage("A")).map(|s| s.recorded_at),
        Some(at(1))
    );
}

#[test]
fn scoring_future_stage_upserts_without_moving() {
    let registry = two_stage_registry();
    let first = started(&registry)
        .record_score(&registry, &engine(), entry("B", 30, 1))
        .expect("early score");
    assert_eq!(first.decision, Decision::NoChange);
    assert_eq!(first.tracker.current_stage_id(), Some(&stage("A")));

    let second = first
        .tracker
        .record_score(&registry, &engine(), entry("B", 85, 2))
        .expect("replacement score");
    assert_eq!(second.tracker.scores().len(), 1);
    assert_eq!(second.tracker.score_for(&stage("B")).map(|s| s.value), Some(85));
}

#[test]
fn invalid_input_leaves_tracker_untouched() {
    let registry = two_stage_registry();
    let tracker = started(&registry);

    match tracker.record_score(&registry, &engine(), entry("A", 101, 1)) {
        Err(TrackerError::InvalidScore(101)) => {}
        other => panic!("expected invalid score, got {other:?}"),
    }
    match tracker.record_score(&registry, &engine(), entry("A", -1, 1)) {
        Err(TrackerError::InvalidScore(-1)) => {}
        other => panic!("expected invalid score, got {other:?}"),
    }
    match tracker.record_score(&registry, &engine(), entry("Z", 50, 1)) {
        Err(TrackerError::UnknownStage(stage_id)) => assert_eq!(stage_id, stage("Z")),
        other => panic!("expected unknown stage, got {other:?}"),
    }

    assert_eq!(tracker, started(&registry));
}

#[test]
fn foreign_registry_is_refused() {
    let registry = two_stage_registry();
    let other = single_stage_registry();
    let tracker = started(&registry);

    match tracker.record_score(&other, &engine(), entry("A", 90, 1)) {
        Err(TrackerError::RegistryMismatch { expected, found }) => {
            assert_eq!(&expected, registry.id());
            assert_eq!(&found, other.id());
        }
        other => panic!("expected registry mismatch, got {other:?}"),
    }
}

#[test]
fn manual_advance_moves_forward_and_hires_on_last_stage() {
    let registry = two_stage_registry();
    let tracker = started(&registry);

    let advanced = tracker
        .advance_manually(&registry, recruiter(), at(3))
        .expect("advance from A");
    assert_eq!(advanced.decision, Decision::Advance(stage("B")));
    let note = advanced.note.as_ref().expect("advance is audited");
    assert_eq!(note.note, "manually advanced from Screen to Onsite");
    assert_eq!(note.stage_id, Some(stage("A")));
    assert_eq!(note.author, recruiter());

    let concluded = advanced
        .tracker
        .advance_manually(&registry, recruiter(), at(4))
        .expect("advance from last stage");
    assert_eq!(concluded.tracker.status(), PipelineStatus::Hired);
    assert_eq!(
        concluded.note.map(|n| n.note),
        Some("manually concluded final stage Onsite: hired".to_string())
    );
}

#[test]
fn override_concludes_with_reason_note() {
    let registry = two_stage_registry();
    let tracker = started(&registry);

    let transition = tracker
        .override_status(
            Conclusion::Rejected,
            recruiter(),
            Some("  withdrew  ".to_string()),
            at(2),
        )
        .expect("override applies");

    assert_eq!(transition.tracker.status(), PipelineStatus::Rejected);
    let note = transition.note.expect("override is audited");
    assert_eq!(note.note, "status overridden to rejected: withdrew");
    assert!(note.stage_id.is_none());

    match transition
        .tracker
        .override_status(Conclusion::Hired, recruiter(), None, at(3))
    {
        Err(TrackerError::InactiveTracker { .. }) => {}
        other => panic!("expected inactive tracker, got {other:?}"),
    }
}

#[test]
fn empty_registry_snapshot_cannot_be_loaded() {
    let empty = serde_json::json!({ "id": "reg-empty", "revision": 1, "stages": [] });
    assert!(serde_json::from_value::<StageRegistry>(empty).is_err());
}

#[test]
fn referenced_stages_cover_current_and_scored() {
    let registry = two_stage_registry();
    let transition = started(&registry)
        .record_score(&registry, &engine(), entry("A", 90, 1))
        .expect("score recorded");
    let referenced: Vec<_> = transition.tracker.referenced_stages().cloned().collect();
    assert!(referenced.contains(&stage("A")));
    assert!(referenced.contains(&stage("B")));
}

#[test]
fn stored_scores_outside_range_cannot_be_loaded() {
    let registry = two_stage_registry();
    let tracker = started(&registry)
        .record_score(&registry, &engine(), entry("A", 100, 1))
        .expect("score recorded")
        .tracker;

    let mut stored = serde_json::to_value(&tracker).expect("tracker serializes");
    let restored: ApplicationTracker =
        serde_json::from_value(stored.clone()).expect("in-range score loads");
    assert_eq!(restored, tracker);

    stored["scores"]["A"]["value"] = serde_json::json!(150);
    assert!(serde_json::from_value::<ApplicationTracker>(stored.clone()).is_err());

    stored["scores"]["A"]["value"] = serde_json::json!(-5);
    assert!(serde_json::from_value::<ApplicationTracker>(stored).is_err());
}
