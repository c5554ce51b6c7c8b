//! Waypoint CLI.
//!
//! Reads `.waypoint/` under `--root` and prints decisions, reports, or the
//! outcome of a recorded loop. Exit codes are listed in [`waypoint::exit_codes`].

use std::io::Read;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use serde::Serialize;

use waypoint::exit_codes;
use waypoint::io::paths::WorkspacePaths;
use waypoint::io::smoke::ShellSmokeRunner;
use waypoint::next::NextOptions;
use waypoint::{dag, feedback, logging, next, record, status, validate};

#[derive(Parser)]
#[command(
    name = "waypoint",
    version,
    about = "Deterministic dispatcher for checkpoint-driven agent loops"
)]
struct Cli {
    /// Repository root containing `.waypoint/`.
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    /// Output format.
    #[arg(long, global = true, value_enum, default_value_t = Format::Text)]
    format: Format,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    #[value(alias = "ascii")]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Summarize the current checkpoint, issues, flags, and documents.
    Status {
        /// Include CONTEXT.md in the report.
        #[arg(long)]
        with_context: bool,
    },
    /// Recommend the next role and prompt.
    Next {
        /// Overlay a workflow defined in config.toml.
        #[arg(long)]
        workflow: Option<String>,
        /// Also list up to N READY checkpoints that could run in parallel.
        #[arg(long)]
        parallel: Option<usize>,
        /// Run demo commands before recommending review (`--run-gates=false` to skip).
        #[arg(
            long,
            action = ArgAction::Set,
            num_args = 0..=1,
            default_value_t = true,
            default_missing_value = "true"
        )]
        run_gates: bool,
    },
    /// Check invariants between STATE.md and PLAN.md.
    Validate {
        /// Treat every finding as an error and exit non-zero.
        #[arg(long)]
        strict: bool,
    },
    /// Print the checkpoint dependency graph.
    Dag,
    /// Record a LOOP_RESULT line and apply its state transition.
    LoopResult {
        /// Text containing a `LOOP_RESULT: {...}` line.
        #[arg(long, conflicts_with = "file")]
        line: Option<String>,
        /// Read the text from a file instead (stdin when neither is given).
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Move a DONE checkpoint to the next ready one.
    Advance,
    /// Sync FEEDBACK.md with the issue list.
    Feedback {
        #[command(subcommand)]
        action: FeedbackAction,
        /// Report what would change without writing.
        #[arg(long, global = true)]
        dry_run: bool,
    },
}

#[derive(Subcommand)]
enum FeedbackAction {
    /// Turn pending entries into agent-owned issues.
    Inject,
    /// Archive entries whose issues are resolved.
    Ack,
}

fn main() {
    logging::init();
    let cli = Cli::parse();
    let code = match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            if record::rejection(&err).is_some() {
                exit_codes::RECORD_REJECTED
            } else {
                exit_codes::ERROR
            }
        }
    };
    std::process::exit(code);
}

fn emit<T: Serialize>(format: Format, value: &T, text: impl FnOnce(&T) -> String) -> Result<()> {
    match format {
        Format::Json => {
            let json = serde_json::to_string_pretty(value).context("serialize output")?;
            println!("{json}");
        }
        Format::Text => print!("{}", text(value)),
    }
    Ok(())
}

fn run(cli: Cli) -> Result<i32> {
    let paths = WorkspacePaths::new(&cli.root);
    let format = cli.format;
    match cli.command {
        Command::Status { with_context } => {
            let report = status::status_report(&paths, with_context)?;
            emit(format, &report, status::StatusReport::render_text)?;
        }
        Command::Next {
            workflow,
            parallel,
            run_gates,
        } => {
            let options = NextOptions {
                workflow,
                parallel,
                run_gates,
            };
            let decision = next::next_decision(&paths, &options, &ShellSmokeRunner)?;
            emit(format, &decision, next::render_text)?;
        }
        Command::Validate { strict } => {
            let report = validate::validate_workspace(&paths, strict)?;
            emit(format, &report, validate::render_text)?;
            if !report.ok {
                return Ok(exit_codes::VALIDATION_FAILED);
            }
        }
        Command::Dag => {
            let report = dag::dag_report(&paths)?;
            emit(format, &report, dag::DagReport::render_ascii)?;
        }
        Command::LoopResult { line, file } => {
            let text = match (line, file) {
                (Some(line), _) => line,
                (None, Some(file)) => std::fs::read_to_string(&file)
                    .with_context(|| format!("read {}", file.display()))?,
                (None, None) => {
                    let mut buf = String::new();
                    std::io::stdin()
                        .read_to_string(&mut buf)
                        .context("read stdin")?;
                    buf
                }
            };
            let summary = record::record_loop_result(&paths, &text, chrono::Utc::now())?;
            emit(format, &summary, |summary| {
                let mut out = format!(
                    "recorded {} {}\n",
                    summary.loop_kind.as_str(),
                    summary.result.as_str()
                );
                for effect in &summary.effects {
                    out.push_str(&format!("  {effect}\n"));
                }
                out
            })?;
        }
        Command::Advance => {
            let summary = record::advance_workspace(&paths)?;
            emit(format, &summary, |summary| {
                format!("advanced {} -> {}\n", summary.from, summary.to)
            })?;
        }
        Command::Feedback { action, dry_run } => {
            let summary = match action {
                FeedbackAction::Inject => feedback::inject(&paths, dry_run)?,
                FeedbackAction::Ack => feedback::ack(&paths, dry_run, chrono::Utc::now())?,
            };
            emit(format, &summary, feedback::render_text)?;
        }
    }
    Ok(exit_codes::OK)
}
