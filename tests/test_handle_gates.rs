//! Suspend/resume through validation gates using only the public handle API.

mod test_support;

use reskin::engine::AnchorSet;
use reskin::{AnchoringOutcome, Config, GateKind, GateResponse, PhaseId, PhaseStatus, ReskinError};

use test_support::{project_with, screen_ids, stub};

fn expect_gate(outcome: &AnchoringOutcome) -> (String, GateKind, u8) {
    match outcome {
        AnchoringOutcome::AwaitingValidation { gate } => {
            (gate.gate_id.clone(), gate.kind, gate.slot)
        }
        other => panic!("expected a gate, got {other:?}"),
    }
}

#[tokio::test]
async fn run_suspends_at_gates_and_resumes_after_each_answer() {
    let project = project_with(&screen_ids(2), Config::minimal_for_testing(), stub());
    let handle = &project.handle;

    let report = handle.run().await.unwrap();
    assert!(report.summaries.is_empty());
    let halted = report.halted.expect("manual mode stops at the hero gate");
    let (gate_id, kind, slot) = expect_gate(&halted);
    assert_eq!((gate_id.as_str(), kind, slot), ("anchor-01", GateKind::HeroSelection, 1));
    assert_eq!(
        handle.manifest().unwrap().pending_gate.map(|g| g.gate_id),
        Some("anchor-01".to_string())
    );

    // Answers for another gate or an invalid candidate are refused
    let err = handle.resolve_gate("anchor-02", GateResponse::Approve).await.unwrap_err();
    assert!(matches!(err, ReskinError::Manifest(_)), "{err:?}");
    let err = handle
        .resolve_gate("anchor-01", GateResponse::Select { index: 9 })
        .await
        .unwrap_err();
    assert!(matches!(err, ReskinError::Manifest(_)), "{err:?}");

    let mut outcome = handle
        .resolve_gate("anchor-01", GateResponse::Select { index: 2 })
        .await
        .unwrap();
    let (gate_id, kind, slot) = expect_gate(&outcome);
    assert_eq!((gate_id.as_str(), kind, slot), ("anchor-02", GateKind::AnchorApproval, 2));

    // A rejection regenerates the same slot with the feedback recorded
    outcome = handle
        .resolve_gate(
            "anchor-02",
            GateResponse::Reject {
                feedback: "use the brand blue for primary buttons".to_string(),
            },
        )
        .await
        .unwrap();
    let (gate_id, _, slot) = expect_gate(&outcome);
    assert_eq!((gate_id.as_str(), slot), ("anchor-02", 2));
    let set = AnchorSet::load(handle.paths()).unwrap();
    let anchor = set.get(2).unwrap();
    assert!(!anchor.validated);
    assert_eq!(anchor.feedback, vec!["use the brand blue for primary buttons".to_string()]);

    let mut approvals = 0;
    while let AnchoringOutcome::AwaitingValidation { gate } = &outcome {
        let gate_id = gate.gate_id.clone();
        outcome = handle.resolve_gate(&gate_id, GateResponse::Approve).await.unwrap();
        approvals += 1;
        assert!(approvals <= 13, "more gates than anchor slots");
    }
    assert_eq!(outcome, AnchoringOutcome::AllValidated { validated: 14 });
    assert!(handle.manifest().unwrap().pending_gate.is_none());

    let report = handle.run().await.unwrap();
    assert!(report.halted.is_none());
    let phases: Vec<PhaseId> = report.summaries.iter().map(|s| s.phase).collect();
    assert_eq!(
        phases,
        vec![PhaseId::Anchoring, PhaseId::Propagation, PhaseId::States, PhaseId::Coherence]
    );
    let manifest = handle.manifest().unwrap();
    for phase in [PhaseId::Anchoring, PhaseId::Propagation, PhaseId::States, PhaseId::Coherence] {
        assert_eq!(manifest.status(phase), PhaseStatus::Complete);
    }
    assert!(handle.paths().style_config().is_file());
    assert!(manifest.style_config.is_some());
}

#[tokio::test]
async fn reopening_anchoring_drops_the_pending_gate_and_later_progress() {
    let project = project_with(&screen_ids(2), Config::minimal_for_testing(), stub());
    let handle = &project.handle;
    handle.run_anchoring().await.unwrap();
    assert!(handle.manifest().unwrap().pending_gate.is_some());

    let manifest = handle.reopen(PhaseId::Anchoring).unwrap();
    assert!(manifest.pending_gate.is_none());
    for phase in [PhaseId::Anchoring, PhaseId::Propagation, PhaseId::States, PhaseId::Coherence] {
        assert_eq!(manifest.status(phase), PhaseStatus::Pending);
    }
    assert_eq!(manifest.status(PhaseId::Audit), PhaseStatus::Complete);
}
