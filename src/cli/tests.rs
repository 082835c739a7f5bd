//! CLI tests module
//!
//! Argument parsing and the status view built from project state.

use super::*;
use clap::Parser;

use reskin_utils::paths::with_isolated_home;
use reskin_utils::test_support::png_fixture;

use crate::{ApprovalMode, Config, PhaseId, PhaseStatus, PipelineHandle};

fn parse(args: &[&str]) -> Cli {
    Cli::try_parse_from(std::iter::once("reskin").chain(args.iter().copied())).unwrap()
}

#[test]
fn test_cli_definition_is_consistent() {
    build_cli().debug_assert();
}

#[test]
fn test_global_flags_after_subcommand() {
    let cli = parse(&[
        "run",
        "shop",
        "--dry-run",
        "--batch-size",
        "3",
        "--approval-mode",
        "auto",
        "--max-passes",
        "2",
        "--threshold",
        "80",
        "--force",
    ]);
    assert!(cli.dry_run);
    assert!(cli.force);
    assert_eq!(cli.batch_size, Some(3));
    assert_eq!(cli.approval_mode, Some(ApprovalMode::Auto));
    assert_eq!(cli.max_passes, Some(2));
    assert_eq!(cli.threshold, Some(80.0));
    assert!(matches!(cli.command, Commands::Run { ref id } if id == "shop"));
}

#[test]
fn test_gate_subcommands() {
    let cli = parse(&["gate", "select", "shop", "anchor-01", "2"]);
    match cli.command {
        Commands::Gate(GateCommands::Select { id, gate_id, index }) => {
            assert_eq!(id, "shop");
            assert_eq!(gate_id, "anchor-01");
            assert_eq!(index, 2);
        }
        other => panic!("unexpected command: {other:?}"),
    }

    let cli = parse(&["gate", "reject", "shop", "anchor-03", "--feedback", "more contrast"]);
    assert!(matches!(
        cli.command,
        Commands::Gate(GateCommands::Reject { ref feedback, .. }) if feedback == "more contrast"
    ));

    // Rejection without feedback is refused by the parser
    assert!(Cli::try_parse_from(["reskin", "gate", "reject", "shop", "anchor-03"]).is_err());
}

#[test]
fn test_phase_arguments_parse() {
    let cli = parse(&["reopen", "shop", "propagation"]);
    assert!(matches!(cli.command, Commands::Reopen { phase: PhaseId::Propagation, .. }));

    assert!(Cli::try_parse_from(["reskin", "skip", "shop", "review"]).is_err());
}

#[test]
fn test_regenerate_slot_is_range_checked() {
    let cli = parse(&["anchor", "shop", "--regenerate", "7"]);
    assert!(matches!(cli.command, Commands::Anchor { regenerate: Some(7), .. }));

    assert!(Cli::try_parse_from(["reskin", "anchor", "shop", "--regenerate", "15"]).is_err());
    assert!(Cli::try_parse_from(["reskin", "anchor", "shop", "--regenerate", "0"]).is_err());
}

#[test]
fn test_batched_phase_limits() {
    let cli = parse(&["propagate", "shop", "--max-batches", "1"]);
    match cli.command {
        Commands::Propagate(args) => {
            assert_eq!(args.id, "shop");
            assert_eq!(args.max_batches, Some(1));
        }
        other => panic!("unexpected command: {other:?}"),
    }
    assert_eq!(parse(&["states", "shop"]).command.operation(), "states");
}

#[test]
fn test_status_reflects_imported_captures() {
    let home = with_isolated_home();
    let inbox = home.utf8_path().join("inbox");
    std::fs::create_dir_all(&inbox).unwrap();
    std::fs::write(inbox.join("home.png"), png_fixture(1440, 900)).unwrap();
    std::fs::write(
        inbox.join("captures.json"),
        r#"{"screens": [{"id": "home", "name": "Home", "source_path": "home.png"}]}"#,
    )
    .unwrap();

    let handle = PipelineHandle::open("shop", Config::minimal_for_testing()).unwrap();
    handle.init("https://shop.example.test").unwrap();
    handle.import_captures(&inbox.join("captures.json")).unwrap();

    let status = build_status(&handle).unwrap();
    assert_eq!(status.project_id, "shop");
    assert_eq!(status.total_screens, 1);
    assert_eq!(status.current_phase, Some(PhaseId::Audit));
    assert_eq!(status.phases.len(), PhaseId::all().len());
    assert_eq!(status.phases[0].status, PhaseStatus::Complete);
    assert_eq!(status.validated_anchors, 0);
    assert_eq!(status.costs.total, 0.0);
    assert!(status.locked_by.is_none());

    let json = crate::emit_jcs(&status).unwrap();
    assert!(json.contains(r#""current_phase":"audit""#));
}
