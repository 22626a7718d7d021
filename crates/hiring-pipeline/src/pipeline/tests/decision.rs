use super::common::*;
use crate::pipeline::decision::{evaluate, Decision, DecisionEngine, DecisionPolicy, FailurePolicy};
use crate::pipeline::domain::{Conclusion, RegistryId, Score, ScoreSheet};
use crate::pipeline::registry::{StageRegistry, StageSpec};

fn sheet(scores: &[(&str, u8)]) -> ScoreSheet {
    scores
        .iter()
        .map(|(stage_id, value)| {
            (
                stage(stage_id),
                Score {
                    stage_id: stage(stage_id),
                    value: *value,
                    feedback: None,
                    recorded_at: at(0),
                    recorded_by: evaluator(),
                },
            )
        })
        .collect()
}

fn retry_engine() -> DecisionEngine {
    DecisionEngine::new(DecisionPolicy::new(FailurePolicy::Retry))
}

#[test]
fn no_score_on_current_stage_is_no_change() {
    let registry = two_stage_registry();
    let scores = sheet(&[("B", 95)]);
    assert_eq!(
        evaluate(&registry, &scores, Some(&stage("A"))),
        Decision::NoChange
    );
}

#[test]
fn missing_or_unknown_current_stage_is_no_change() {
    let registry = two_stage_registry();
    let scores = sheet(&[("A", 95)]);
    assert_eq!(evaluate(&registry, &scores, None), Decision::NoChange);
    assert_eq!(
        evaluate(&registry, &scores, Some(&stage("ghost"))),
        Decision::NoChange
    );
}

#[test]
fn passing_auto_stage_advances_to_next_order() {
    let registry = two_stage_registry();
    let scores = sheet(&[("A", 75)]);
    assert_eq!(
        evaluate(&registry, &scores, Some(&stage("A"))),
        Decision::Advance(stage("B"))
    );
}

#[test]
fn threshold_is_inclusive() {
    let registry = two_stage_registry();
    assert_eq!(
        evaluate(&registry, &sheet(&[("A", 70)]), Some(&stage("A"))),
        Decision::Advance(stage("B"))
    );
    assert_eq!(
        evaluate(&registry, &sheet(&[("A", 69)]), Some(&stage("A"))),
        Decision::Conclude(Conclusion::Rejected)
    );
}

#[test]
fn passing_final_auto_stage_concludes_hired() {
    let registry = single_stage_registry();
    assert_eq!(
        evaluate(&registry, &sheet(&[("A", 90)]), Some(&stage("A"))),
        Decision::Conclude(Conclusion::Hired)
    );
}

#[test]
fn passing_manual_stage_holds() {
    let registry = StageRegistry::create(
        RegistryId::new("reg-manual"),
        vec![
            StageSpec::new("Screen", 1, 70, false).with_id("A"),
            StageSpec::new("Onsite", 2, 70, true).with_id("B"),
        ],
    )
    .expect("valid registry");

    assert_eq!(
        evaluate(&registry, &sheet(&[("A", 99)]), Some(&stage("A"))),
        Decision::Hold(stage("A"))
    );
}

#[test]
fn failing_score_holds_under_retry_policy() {
    let registry = two_stage_registry();
    let decision = retry_engine().evaluate(&registry, &sheet(&[("A", 40)]), Some(&stage("A")));
    assert_eq!(decision, Decision::Hold(stage("A")));
}

#[test]
fn evaluation_is_deterministic() {
    let registry = two_stage_registry();
    let scores = sheet(&[("A", 88), ("B", 12)]);
    let first = evaluate(&registry, &scores, Some(&stage("B")));
    let second = evaluate(&registry, &scores, Some(&stage("B")));
    assert_eq!(first, second);
    assert_eq!(first, Decision::Conclude(Conclusion::Rejected));
}

#[test]
fn failure_policy_parses_aliases() {
    assert_eq!(FailurePolicy::parse(" Reject "), Some(FailurePolicy::Reject));
    assert_eq!(FailurePolicy::parse("retry"), Some(FailurePolicy::Retry));
    assert_eq!(FailurePolicy::parse("HOLD"), Some(FailurePolicy::Retry));
    assert_eq!(FailurePolicy::parse("maybe"), None);
}

#[test]
fn decision_serializes_with_kind_tag() {
    let advance = serde_json::to_value(Decision::Advance(stage("B"))).expect("serializes");
    assert_eq!(advance, serde_json::json!({ "kind": "advance", "value": "B" }));

    let none = serde_json::to_value(Decision::NoChange).expect("serializes");
    assert_eq!(none, serde_json::json!({ "kind": "no_change" }));
}
