//! Black-box tests of the `reskin` binary: exit codes and JSON status.

use std::path::Path;
use std::process::{Command, Output};

use tempfile::TempDir;

use reskin::ExitCode;
use reskin_utils::test_support::png_fixture;

struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let inbox = dir.path().join("inbox");
        std::fs::create_dir_all(&inbox).unwrap();
        for id in ["home", "orders"] {
            std::fs::write(inbox.join(format!("{id}.png")), png_fixture(1440, 900)).unwrap();
        }
        std::fs::write(
            inbox.join("captures.json"),
            r#"{"screens": [
                {"id": "home", "name": "Home", "source_path": "home.png"},
                {"id": "orders", "name": "Order list", "source_path": "orders.png"}
            ]}"#,
        )
        .unwrap();
        let audit = r#"{"screens": {"orders": ["Add column sorting"]}}"#;
        std::fs::write(inbox.join("audit.json"), audit).unwrap();
        Self { dir }
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Run the binary offline with an isolated home.
    fn reskin(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_reskin"))
            .args(args)
            .arg("--dry-run")
            .env("RESKIN_HOME", self.path().join("home"))
            .env_remove("RESKIN_LOG")
            .current_dir(self.path())
            .output()
            .unwrap()
    }

    fn status_json(&self) -> serde_json::Value {
        let output = self.reskin(&["status", "shop", "--json"]);
        assert!(output.status.success());
        serde_json::from_slice(&output.stdout).unwrap()
    }
}

fn code(output: &Output) -> i32 {
    output.status.code().unwrap_or(-1)
}

#[test]
fn manual_anchoring_exits_awaiting_validation_then_auto_run_completes() {
    let ws = Workspace::new();
    assert_eq!(code(&ws.reskin(&["init", "shop", "--source-url", "https://shop.example.test"])), 0);
    assert_eq!(code(&ws.reskin(&["import-captures", "shop", "inbox/captures.json"])), 0);
    assert_eq!(code(&ws.reskin(&["import-audit", "shop", "inbox/audit.json"])), 0);

    let anchored = ws.reskin(&["anchor", "shop"]);
    assert_eq!(code(&anchored), ExitCode::AWAITING_VALIDATION.as_i32());
    assert!(String::from_utf8_lossy(&anchored.stdout).contains("anchor-01"));

    let status = ws.status_json();
    assert_eq!(status["pending_gate"]["gate_id"], "anchor-01");
    assert_eq!(status["current_phase"], "anchoring");

    let selected = ws.reskin(&["gate", "select", "shop", "anchor-01", "1"]);
    assert_eq!(code(&selected), ExitCode::AWAITING_VALIDATION.as_i32());
    assert_eq!(ws.status_json()["pending_gate"]["gate_id"], "anchor-02");

    assert_eq!(code(&ws.reskin(&["reopen", "shop", "anchoring"])), 0);
    let run = ws.reskin(&["run", "shop", "--approval-mode", "auto"]);
    assert_eq!(code(&run), 0, "{}", String::from_utf8_lossy(&run.stderr));

    let status = ws.status_json();
    assert_eq!(status["validated_anchors"], 14);
    assert_eq!(status["current_phase"], "specs");
    let phases = status["phases"].as_array().unwrap();
    for row in &phases[2..6] {
        assert_eq!(row["status"], "complete", "{row}");
    }
    assert!(status["costs"]["total"].as_f64().unwrap() > 0.0);
}

#[test]
fn precondition_and_argument_errors_map_to_exit_codes() {
    let ws = Workspace::new();

    let missing = ws.reskin(&["status", "shop", "--json"]);
    assert_eq!(code(&missing), 0);
    assert_eq!(String::from_utf8_lossy(&missing.stdout).trim(), "{}");

    assert_eq!(code(&ws.reskin(&["propagate", "shop"])), ExitCode::PRECONDITION.as_i32());

    assert_eq!(code(&ws.reskin(&["init", "shop"])), 0);
    assert_eq!(code(&ws.reskin(&["init", "shop"])), ExitCode::PRECONDITION.as_i32());

    let early = ws.reskin(&["anchor", "shop"]);
    assert_eq!(code(&early), ExitCode::PRECONDITION.as_i32());
    assert!(String::from_utf8_lossy(&early.stderr).contains("capture"));

    assert_eq!(
        code(&ws.reskin(&["gate", "approve", "shop", "anchor-04"])),
        ExitCode::CLI_ARGS.as_i32()
    );
    assert_eq!(code(&ws.reskin(&["skip", "shop", "review"])), ExitCode::CLI_ARGS.as_i32());
}
