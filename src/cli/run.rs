//! CLI entry point and dispatch logic
//!
//! `run()` parses arguments, discovers the configuration, installs tracing,
//! creates the tokio runtime, dispatches to a command handler and prints every
//! error itself. main.rs only turns the returned code into a process exit.

use anyhow::Result;
use clap::Parser;

use super::args::{Cli, Commands, GateCommands};
use super::commands;

use crate::{CliArgs, Config, ExitCode, ReskinError};
use reskin_utils::logging::{LogFormat, init_tracing};
use reskin_utils::redaction::redact_credentials;

/// Main CLI execution function.
///
/// Returns `Ok(())` when the command finished with exit code 0 and
/// `Err(code)` otherwise, including a suspended validation gate.
pub fn run() -> Result<(), ExitCode> {
    let cli = Cli::parse();

    let cli_args = CliArgs {
        config_path: cli.config.clone(),
        verbose: Some(cli.verbose),
        viewport: cli.viewport.clone(),
        batch_size: cli.batch_size,
        approval_mode: cli.approval_mode,
        max_passes: cli.max_passes,
        threshold: cli.threshold,
        budget: cli.budget,
        dry_run: cli.dry_run,
    };

    let config = match Config::discover(&cli_args) {
        Ok(config) => config,
        Err(err) => {
            match err.downcast_ref::<ReskinError>() {
                Some(reskin_err) => {
                    eprintln!("✗ Configuration error\n\n{}", reskin_err.display_for_user());
                }
                None => eprintln!(
                    "✗ Configuration error: {}",
                    redact_credentials(&err.to_string())
                ),
            }
            return Err(ExitCode::CLI_ARGS);
        }
    };

    let verbose = cli.verbose || config.defaults.verbose.unwrap_or(false);
    let format = if cli.log_json { LogFormat::Json } else { LogFormat::Compact };
    if let Err(e) = init_tracing(verbose, format) {
        eprintln!("✗ Failed to initialize logging: {e}");
        return Err(ExitCode::INTERNAL);
    }

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("✗ Failed to create async runtime: {e}");
            return Err(ExitCode::INTERNAL);
        }
    };

    let operation = cli.command.operation();
    let force = cli.force;

    let result = rt.block_on(async {
        match cli.command {
            Commands::Init { id, source_url } => {
                commands::execute_init_command(&id, source_url.as_deref(), force, &config)
            }
            Commands::ImportCaptures { id, document } => {
                commands::execute_import_captures_command(&id, &document, force, &config)
            }
            Commands::ImportAudit { id, document } => {
                commands::execute_import_audit_command(&id, &document, force, &config)
            }
            Commands::Record { id, phase } => {
                commands::execute_record_command(&id, phase, force, &config)
            }
            Commands::Anchor { id, regenerate } => {
                commands::execute_anchor_command(&id, regenerate, force, &config).await
            }
            Commands::Gate(gate_cmd) => match gate_cmd {
                GateCommands::Show { id, json } => {
                    commands::execute_gate_show_command(&id, json, &config)
                }
                GateCommands::Select { id, gate_id, index } => {
                    commands::execute_gate_response_command(
                        &id,
                        &gate_id,
                        crate::GateResponse::Select { index },
                        force,
                        &config,
                    )
                    .await
                }
                GateCommands::Approve { id, gate_id } => {
                    commands::execute_gate_response_command(
                        &id,
                        &gate_id,
                        crate::GateResponse::Approve,
                        force,
                        &config,
                    )
                    .await
                }
                GateCommands::Reject { id, gate_id, feedback } => {
                    commands::execute_gate_response_command(
                        &id,
                        &gate_id,
                        crate::GateResponse::Reject { feedback },
                        force,
                        &config,
                    )
                    .await
                }
            },
            Commands::CompleteAnchoring { id } => {
                commands::execute_complete_anchoring_command(&id, force, &config)
            }
            Commands::Propagate(args) => {
                commands::execute_propagate_command(
                    &args.id,
                    args.max_batches,
                    force,
                    &config,
                )
                .await
            }
            Commands::States(args) => {
                commands::execute_states_command(&args.id, args.max_batches, force, &config).await
            }
            Commands::Coherence { id } => {
                commands::execute_coherence_command(&id, force, &config).await
            }
            Commands::Run { id } => commands::execute_run_command(&id, force, &config).await,
            Commands::Status { id, json } => commands::execute_status_command(&id, json, &config),
            Commands::Skip { id, phase } => {
                commands::execute_skip_command(&id, phase, force, &config)
            }
            Commands::Reopen { id, phase } => {
                commands::execute_reopen_command(&id, phase, force, &config)
            }
        }
    });

    match result {
        Ok(code) if code.is_success() => Ok(()),
        Ok(code) => Err(code),
        Err(error) => Err(report_error(&error, operation)),
    }
}

/// Print `error` for the user and pick the exit code.
fn report_error(error: &anyhow::Error, operation: &str) -> ExitCode {
    if let Some(reskin_error) = error.downcast_ref::<ReskinError>() {
        eprintln!("✗ {operation} failed\n\n{}", reskin_error.display_for_user());
        return reskin_error.to_exit_code();
    }

    eprintln!("✗ Unexpected error: {}", redact_credentials(&format!("{error:#}")));
    if let Some(suggestions) = enhance_error_context(error) {
        eprintln!("\n  Suggestions:");
        for (i, suggestion) in suggestions.iter().enumerate() {
            eprintln!("    {}. {}", i + 1, suggestion);
        }
    }
    eprintln!("\n  Run with --verbose for more detailed output");
    ExitCode::INTERNAL
}

/// Suggestions for common failures that are not reskin errors.
fn enhance_error_context(error: &anyhow::Error) -> Option<Vec<String>> {
    let error_str = format!("{error:#}");

    if error_str.contains("Permission denied") {
        Some(vec![
            "Check file and directory permissions".to_string(),
            "Ensure RESKIN_HOME points at a writable location".to_string(),
        ])
    } else if error_str.contains("No such file or directory") {
        Some(vec![
            "Verify the specified paths exist".to_string(),
            "Check that you're running from the correct directory".to_string(),
        ])
    } else {
        None
    }
}
