//! Command-line entry point: drives a [`junction::coordinator::Coordinator`]
//! from the shell, the way this crate's message routing layer exposed its
//! own `clap`-derived CLI over a long-running runtime.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use junction::config::RuntimeConfig;
use junction::coordinator::Coordinator;
use junction::message::MessageOptions;
use junction::subsystem::AcceptOptions;
use junction::time_provider::production_time_provider;
use serde_json::Value;
use tracing::error;

#[derive(Parser)]
#[command(name = "junction-cli", about = "Drive a junction runtime from the shell")]
struct Cli {
    /// Use the development config preset instead of production.
    #[arg(long)]
    dev: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Subsystem registry operations.
    Subsystems {
        #[command(subcommand)]
        action: SubsystemsAction,
    },
    /// Sends one message and prints the result envelope as JSON.
    Send {
        /// Message path, e.g. `canvas://query/get`.
        path: String,
        /// Message body, as a JSON literal.
        body: String,
    },
    /// Scheduler controls.
    Scheduler {
        #[command(subcommand)]
        action: SchedulerAction,
    },
}

#[derive(Subcommand)]
enum SubsystemsAction {
    /// Lists every registered subsystem's name.
    List,
}

#[derive(Subcommand)]
enum SchedulerAction {
    /// Starts the background tick loop.
    Start,
    /// Stops the background tick loop.
    Stop,
}

#[tokio::main]
async fn main() -> ExitCode {
    junction::observability::init_tracing();
    let cli = Cli::parse();

    let config = if cli.dev {
        RuntimeConfig::development()
    } else {
        RuntimeConfig::production()
    };
    let coordinator = Coordinator::bootstrap(config, production_time_provider());

    match run(&coordinator, cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            error!("{message}");
            ExitCode::FAILURE
        }
    }
}

async fn run(coordinator: &Coordinator, command: Command) -> Result<(), String> {
    match command {
        Command::Subsystems { action } => match action {
            SubsystemsAction::List => {
                for name in coordinator.subsystem_names().await {
                    println!("{name}");
                }
                Ok(())
            }
        },
        Command::Send { path, body } => {
            let body: Value = serde_json::from_str(&body).map_err(|e| format!("invalid JSON body: {e}"))?;
            let result = coordinator
                .send(path, body, MessageOptions::default(), AcceptOptions::default())
                .await;
            let rendered = serde_json::to_string_pretty(&result).map_err(|e| e.to_string())?;
            println!("{rendered}");
            Ok(())
        }
        Command::Scheduler { action } => match action {
            SchedulerAction::Start => {
                coordinator.start_scheduler().await;
                println!("scheduler started");
                Ok(())
            }
            SchedulerAction::Stop => {
                coordinator.stop_scheduler().await;
                println!("scheduler stopped");
                Ok(())
            }
        },
    }
}
