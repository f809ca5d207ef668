//! Thin `clap` front-end over `do-memory-core`: parses the command surface
//! of `spec.md` §6 into a [`do_memory_core::HookEvent`], opens the store,
//! dispatches, and prints the result — mirroring the teacher's
//! `memory-cli/src/main.rs` thin-dispatch-to-library-function shape.

mod errors;
mod output;

use clap::{Parser, Subcommand};
use do_memory_core::{validator::Validator, Config, HookEvent, Store};
use output::{Output, OutputFormat};

#[derive(Parser)]
#[command(name = "memory-hook")]
#[command(about = "Hook-invoked front-end for the self-learning memory store")]
#[command(version)]
struct Cli {
    /// Output format.
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Human)]
    format: OutputFormat,

    /// Enable debug-level logging.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// A new agent session is starting.
    SessionStart {
        /// Invoking agent name.
        #[arg(default_value = "setup-agent")]
        agent: String,
    },
    /// A command is about to run.
    PreCommand {
        /// The command about to be executed.
        command: String,
    },
    /// A file edit just completed.
    PostEdit {
        /// Path of the edited file.
        path: String,
        /// Mark the edit as failed.
        #[arg(long)]
        failed: bool,
    },
    /// A shell command just completed.
    PostCommand {
        /// The command that ran.
        command: String,
        /// Mark the command as failed.
        #[arg(long)]
        failed: bool,
    },
    /// The agent session is ending.
    SessionEnd,
    /// Force a consolidation pass.
    Consolidate,
    /// Seed memories from a host-provided file listing.
    Pretrain {
        /// Files to seed, one memory per file.
        files: Vec<String>,
    },
    /// Re-compute embeddings for rows at the wrong dimension.
    ReEmbed,
    /// Run health checks and exit with a machine-checkable code.
    Validate,
    /// Run the same health checks as `validate`, printed verbosely.
    Diagnose,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    tracing_subscriber::fmt().with_max_level(level).init();

    let exit_code = run(cli).await;
    std::process::exit(exit_code);
}

async fn run(cli: Cli) -> i32 {
    let cfg = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(err) => return errors::report(&err),
    };

    let store = match Store::open(&cfg).await {
        Ok(store) => store,
        Err(err) => return errors::report(&err),
    };

    match cli.command {
        Commands::Validate => {
            let report = match Validator::new(&store, &cfg).run().await {
                Ok(report) => report,
                Err(err) => return errors::report(&err),
            };
            let healthy = report.is_healthy();
            if let Err(err) = report.print(cli.format) {
                eprintln!("error: {err}");
                return 1;
            }
            i32::from(!healthy)
        }
        Commands::Diagnose => {
            let report = match Validator::new(&store, &cfg).run().await {
                Ok(report) => report,
                Err(err) => return errors::report(&err),
            };
            let healthy = report.is_healthy();
            output::print_diagnose(&report);
            i32::from(!healthy)
        }
        command => {
            let event = to_event(command);
            match do_memory_core::dispatch(&store, &cfg, event).await {
                Ok(outcome) => {
                    if let Err(err) = outcome.print(cli.format) {
                        eprintln!("error: {err}");
                        return 1;
                    }
                    0
                }
                Err(err) => errors::report(&err),
            }
        }
    }
}

fn to_event(command: Commands) -> HookEvent {
    match command {
        Commands::SessionStart { agent } => HookEvent::SessionStart { agent },
        Commands::PreCommand { command } => HookEvent::PreCommand { command },
        Commands::PostEdit { path, failed } => HookEvent::PostEdit { path, success: !failed },
        Commands::PostCommand { command, failed } => HookEvent::PostCommand { command, success: !failed },
        Commands::SessionEnd => HookEvent::SessionEnd,
        Commands::Consolidate => HookEvent::Consolidate,
        Commands::Pretrain { files } => HookEvent::Pretrain { files },
        Commands::ReEmbed => HookEvent::ReEmbed,
        Commands::Validate | Commands::Diagnose => unreachable!("handled before to_event"),
    }
}
