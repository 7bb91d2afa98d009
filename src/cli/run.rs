//! CLI dispatch: builds the runtime and orchestrator, runs the requested
//! command, and maps every outcome to an exit code. All output happens
//! here or below; `main` only exits.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use crossterm::style::Color;

use crate::command::SystemRunner;
use crate::config::WorkflowConfig;
use crate::error::OrchestratorError;
use crate::executor::ClaudeExecutor;
use crate::exit_codes::{codes, exit_code_for};
use crate::logging::init_tracing;
use crate::orchestrator::Orchestrator;

use super::args::{Cli, Commands};
use crate::orchestrator::style;

pub fn run() -> i32 {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // clap renders help/version on stdout with success.
            let _ = e.print();
            return if e.use_stderr() { codes::USAGE } else { codes::SUCCESS };
        }
    };

    if let Err(e) = init_tracing(cli.verbose) {
        eprintln!("warning: failed to initialize logging: {e}");
    }

    let config = config_from_cli(&cli);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("failed to create async runtime: {e}");
            return codes::WORKFLOW_FAILED;
        }
    };

    runtime.block_on(dispatch(cli, config))
}

fn config_from_cli(cli: &Cli) -> WorkflowConfig {
    let mut config = WorkflowConfig {
        base_dir: cli.base_dir.clone(),
        repo_dir: cli.repo.clone(),
        claude_path: cli.claude_path.clone(),
        dangerously_skip_permissions: cli.dangerously_skip_permissions,
        planning_timeout: Duration::from_secs(cli.timeout_planning),
        implementation_timeout: Duration::from_secs(cli.timeout_implementation),
        refactoring_timeout: Duration::from_secs(cli.timeout_refactoring),
        pr_split_timeout: Duration::from_secs(cli.timeout_pr_split),
        verbose: cli.verbose,
        ..WorkflowConfig::default()
    };
    config.ci.overall_timeout = Duration::from_secs(cli.ci_timeout);
    config.ci.e2e_ignore_pattern = cli.e2e_ignore_pattern.clone();
    config.split.enabled = !cli.no_split;
    config.split.max_lines = cli.max_lines;
    config.split.max_files = cli.max_files;
    config
}

async fn dispatch(cli: Cli, config: WorkflowConfig) -> i32 {
    let runner = Arc::new(SystemRunner::new());
    let mut executor = match &config.claude_path {
        Some(path) => ClaudeExecutor::with_path(path.clone()),
        None => ClaudeExecutor::new(),
    };
    executor = executor.skip_permissions(config.dangerously_skip_permissions);

    let orchestrator = match Orchestrator::new(config, runner, Arc::new(executor)) {
        Ok(orchestrator) => orchestrator,
        Err(e) => {
            eprintln!("✗ {e}");
            return exit_code_for(&e);
        }
    };

    // Ctrl-C cancels the running command; dropping the future kills child
    // processes and state stays resumable.
    let command = run_command(&orchestrator, cli.command);
    tokio::select! {
        code = command => code,
        _ = tokio::signal::ctrl_c() => {
            eprintln!("\n✗ cancelled, state saved; resume with claude-workflow resume");
            codes::CANCELLED
        }
    }
}

async fn run_command(orchestrator: &Orchestrator, command: Commands) -> i32 {
    let result: Result<(), OrchestratorError> = match command {
        Commands::Start {
            name,
            description,
            workflow_type,
        } => orchestrator
            .start(&name, &description, workflow_type)
            .await
            .map(|_| ()),

        Commands::Resume { name } => orchestrator.resume(&name).await.map(|_| ()),

        Commands::List => match orchestrator.list() {
            Ok(workflows) => {
                if workflows.is_empty() {
                    println!("no workflows");
                } else {
                    for info in workflows {
                        println!(
                            "{:<24} {:<10} {:<16} {}",
                            info.name,
                            info.workflow_type,
                            info.current_phase,
                            info.created_at.format("%Y-%m-%d %H:%M")
                        );
                    }
                }
                Ok(())
            }
            Err(e) => Err(e),
        },

        Commands::Status { name } => match orchestrator.status(&name) {
            Ok(state) => {
                println!("{:<14} {}", "Workflow:", state.name);
                println!("{:<14} {}", "Type:", state.workflow_type);
                println!("{:<14} {}", "Phase:", state.current_phase);
                if let Some(worktree) = &state.worktree_path {
                    println!("{:<14} {}", "Worktree:", worktree);
                }
                if let Some(pr) = state.pr_number {
                    println!("{:<14} #{}", "PR:", pr);
                }
                if let Some(session) = &state.session_id {
                    println!(
                        "{:<14} {} (reused {}x)",
                        "Session:", session, state.session_reuse_count
                    );
                }
                for (phase, ps) in &state.phases {
                    println!(
                        "  {:<16} {:?} ({} attempts)",
                        phase.as_str(),
                        ps.status,
                        ps.attempts
                    );
                }
                if let Some(error) = &state.last_error {
                    println!(
                        "{:<14} {} in {} (recoverable: {})",
                        "Last error:", error.message, error.phase, error.recoverable
                    );
                }
                Ok(())
            }
            Err(e) => Err(e),
        },

        Commands::Delete { name, force } => {
            if !force && !confirm_on_terminal(&format!("Delete workflow '{name}'?")) {
                println!("aborted");
                return codes::SUCCESS;
            }
            orchestrator.delete(&name).await
        }

        Commands::Clean { force } => match orchestrator.clean(force).await {
            Ok(removed) => {
                for path in &removed {
                    println!(
                        "{} removed {}",
                        style("✓", Color::Green, false),
                        path
                    );
                }
                println!("cleaned {} worktree(s)", removed.len());
                Ok(())
            }
            Err(e) => Err(e),
        },
    };

    match result {
        Ok(()) => codes::SUCCESS,
        Err(e) => {
            eprintln!("✗ {e}");
            exit_code_for(&e)
        }
    }
}

fn confirm_on_terminal(question: &str) -> bool {
    print!("{question} [y/N]: ");
    if std::io::stdout().flush().is_err() {
        return false;
    }
    let mut line = String::new();
    if std::io::stdin().read_line(&mut line).is_err() {
        return false;
    }
    matches!(line.trim().to_lowercase().as_str(), "y" | "yes")
}
