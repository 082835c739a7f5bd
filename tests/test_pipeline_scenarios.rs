//! End-to-end pipeline scenarios driven through the public `PipelineHandle`.
//!
//! Every test runs against its own temporary project with the stub backend or
//! a scripted backend layered over it; nothing touches the network.

mod test_support;

use std::sync::Arc;

use reskin::engine::reports::read_report;
use reskin::engine::{
    AnchorSet, CoherenceOutcome, CoherenceReport, PropagationReport, REGENERATION_STRENGTH,
};
use reskin::{Manifest, PhaseId, PhaseStatus, ReskinError, Viewport};
use reskin_manifest::{ManifestStore, PhaseUpdate};
use reskin_utils::error::PhaseError;

use test_support::{
    FailingScreenBackend, TableScorer, anchored_project, auto_config, project_with, screen_ids,
    stub,
};

#[test]
fn anchoring_cannot_start_while_audit_is_pending() {
    let mut manifest = Manifest::create("shop", "", Viewport::DESKTOP);
    manifest
        .transition(PhaseId::Capture, PhaseStatus::InProgress, Default::default())
        .unwrap();
    manifest
        .transition(PhaseId::Capture, PhaseStatus::Complete, Default::default())
        .unwrap();

    let gate = manifest.can_start(PhaseId::Anchoring);
    assert!(!gate.allowed);
    assert!(gate.reason.unwrap().contains("audit"));
}

#[tokio::test]
async fn anchoring_refuses_to_run_before_audit() {
    let project = project_with(&screen_ids(2), auto_config(), stub());
    project.handle.reopen(PhaseId::Audit).unwrap();

    let err = project.handle.run_anchoring().await.unwrap_err();
    assert!(matches!(
        err,
        ReskinError::Phase(PhaseError::DependencyNotSatisfied {
            phase: PhaseId::Anchoring,
            dependency: PhaseId::Audit,
            ..
        })
    ));
    assert_eq!(project.handle.manifest().unwrap().status(PhaseId::Anchoring), PhaseStatus::Pending);
}

#[tokio::test]
async fn completing_anchoring_with_an_unvalidated_slot_fails() {
    let project = project_with(&screen_ids(2), auto_config(), stub());
    let handle = &project.handle;
    handle.run_anchoring().await.unwrap();

    let mut set = AnchorSet::load(handle.paths()).unwrap();
    set.get_mut(5).unwrap().validated = false;
    set.save(handle.paths()).unwrap();

    let err = handle.complete_anchoring().unwrap_err();
    assert!(err.to_string().contains("expected 14 validated anchors"), "{err}");
    match err {
        ReskinError::Phase(PhaseError::AnchorsIncomplete {
            expected,
            found,
            unvalidated,
        }) => {
            assert_eq!(expected, 14);
            assert_eq!(found, 13);
            assert_eq!(unvalidated, vec![5]);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(!handle.paths().style_config().exists());
    assert!(handle.manifest().unwrap().style_config.is_none());
    assert_ne!(handle.manifest().unwrap().status(PhaseId::Anchoring), PhaseStatus::Complete);
}

#[tokio::test]
async fn propagation_resumes_at_the_first_uncommitted_batch() {
    let project = anchored_project(&screen_ids(12), auto_config(), stub()).await;

    // Two of three batches commit, then the process "crashes".
    let partial = project.handle.run_propagation_limited(Some(2)).await.unwrap();
    assert_eq!(partial.status, PhaseStatus::InProgress);
    let manifest = project.handle.manifest().unwrap();
    assert_eq!(manifest.phase(PhaseId::Propagation).batch_cursor, 2);
    let before: PropagationReport = read_report(&project.handle.paths().propagation_report())
        .unwrap()
        .unwrap();
    assert_eq!(before.screens.len(), 10);

    let restarted_backend = stub();
    let restarted = project.reopen_with(auto_config(), restarted_backend.clone());
    let summary = restarted.run_propagation().await.unwrap();

    assert_eq!(summary.status, PhaseStatus::Complete);
    assert_eq!(summary.items_total, 12);
    assert_eq!(restarted_backend.call_count(), 2, "only batch 3 may be generated");

    let after: PropagationReport = read_report(&restarted.paths().propagation_report())
        .unwrap()
        .unwrap();
    let batches: Vec<usize> = after.screens.iter().map(|s| s.batch).collect();
    assert_eq!(batches, vec![0, 0, 0, 0, 0, 1, 1, 1, 1, 1, 2, 2]);
    assert_eq!(&after.screens[..10], &before.screens[..]);
    assert_eq!(restarted.manifest().unwrap().phase(PhaseId::Propagation).batch_cursor, 3);
}

#[tokio::test]
async fn coherence_resumes_at_its_committed_pass() {
    let ids: Vec<String> = ["home", "dashboard", "orders", "settings"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let backend = stub();
    let project = anchored_project(&ids, auto_config(), backend.clone()).await;
    project.handle.run_propagation().await.unwrap();
    project.handle.skip(PhaseId::States).unwrap();

    // Passes 0 and 1 committed before the process stopped.
    let mut manifest = project.handle.manifest().unwrap();
    manifest
        .transition(PhaseId::Coherence, PhaseStatus::InProgress, PhaseUpdate::total(4))
        .unwrap();
    manifest.checkpoint(PhaseId::Coherence, 2, 2).unwrap();
    ManifestStore::new(project.handle.paths().clone())
        .save(&manifest)
        .unwrap();

    let mut config = auto_config();
    config.coherence.threshold = Some(99.0);
    config.coherence.max_passes = Some(2);
    let scorer = Arc::new(TableScorer::new(&[("home", 55.0, 55.0)]));
    let handle = project
        .reopen_with(config, backend.clone())
        .with_scorer(scorer.clone());
    let calls_before = backend.call_count();

    let report = handle.run_coherence().await.unwrap();

    let passes: Vec<u32> = report.passes.iter().map(|p| p.pass).collect();
    assert_eq!(passes, vec![2]);
    assert_eq!(report.outcome, CoherenceOutcome::Exhausted);
    assert!(report.regenerations.is_empty());
    assert_eq!(report.unresolved.len(), 1);
    assert_eq!(report.unresolved[0].item_id, "home");
    assert_eq!(backend.call_count(), calls_before, "the pass budget is already spent");
    assert_eq!(scorer.assessed.lock().unwrap().len(), 4);
    assert_eq!(handle.manifest().unwrap().status(PhaseId::Coherence), PhaseStatus::Complete);
}

#[tokio::test]
async fn coherence_regenerates_only_outliers_over_the_regeneration_threshold() {
    let ids: Vec<String> = ["home", "dashboard", "orders", "settings"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let backend = stub();
    let project = anchored_project(&ids, auto_config(), backend.clone()).await;
    project.handle.run_propagation().await.unwrap();
    project.handle.skip(PhaseId::States).unwrap();

    let scorer = Arc::new(TableScorer::new(&[
        ("home", 55.0, 0.0),
        ("orders", 40.0, 40.0),
        ("dashboard", 25.0, 25.0),
    ]));
    let handle = project
        .reopen_with(auto_config(), backend.clone())
        .with_scorer(scorer.clone());
    let calls_before = backend.call_count();

    let report: CoherenceReport = handle.run_coherence().await.unwrap();

    let first = &report.passes[0];
    assert_eq!(first.overall_score, 70.0);
    assert_eq!(first.outliers.len(), 2);
    assert_eq!(first.outliers.iter().filter(|o| o.regenerate).count(), 1);
    assert_eq!(first.regenerated, 1);

    assert_eq!(report.regenerations.len(), 1);
    assert_eq!(report.regenerations[0].item_id, "home");
    assert_eq!(report.regenerations[0].pass, 0);
    assert!(report.regenerations[0].success);
    assert_eq!(backend.call_count() - calls_before, 1);

    // The second pass scores home's regenerated image at the regeneration strength.
    let assessed = scorer.assessed.lock().unwrap().clone();
    assert_eq!(assessed.len(), 8);
    assert!(assessed[..4].iter().all(|(_, attempts, _)| *attempts == 1));
    let home_first = assessed[..4].iter().find(|(id, _, _)| id == "home").unwrap();
    assert_eq!(home_first.2, 0.65);
    assert!(assessed[4..].contains(&("home".to_string(), 2, REGENERATION_STRENGTH)));
    let orders_second = assessed[4..].iter().find(|(id, _, _)| id == "orders").unwrap();
    assert_eq!(orders_second.1, 1);
    assert_ne!(orders_second.2, REGENERATION_STRENGTH);

    assert_eq!(report.passes.len(), 2);
    assert_eq!(report.outcome, CoherenceOutcome::Stalled);
    assert_eq!(handle.manifest().unwrap().status(PhaseId::Coherence), PhaseStatus::Complete);
}

#[tokio::test]
async fn a_screen_failing_every_attempt_does_not_block_its_batch() {
    let backend = Arc::new(FailingScreenBackend::new("screen-03"));
    let project = anchored_project(&screen_ids(4), auto_config(), backend.clone()).await;

    let summary = project.handle.run_propagation().await.unwrap();
    assert_eq!(summary.status, PhaseStatus::Complete);
    assert_eq!(summary.succeeded, 3);
    assert_eq!(summary.failed, 1);

    let report: PropagationReport = read_report(&project.handle.paths().propagation_report())
        .unwrap()
        .unwrap();
    let failed = report.screens.iter().find(|s| s.screen_id == "screen-03").unwrap();
    assert!(!failed.success);
    assert_eq!(failed.attempts, 3);
    assert!(failed.cost > 0.0);
    assert!(failed.error.as_deref().unwrap_or_default().contains("503"));
    assert_eq!(*backend.failed_calls.lock().unwrap(), 3);

    // Same batch, all others restyled
    assert!(report.screens.iter().all(|s| s.batch == 0));
    assert!(
        report
            .screens
            .iter()
            .filter(|s| s.screen_id != "screen-03")
            .all(|s| s.success && s.attempts == 1)
    );
}
