//! AgChat - AI Agent Chat
//!
//! Command-line driver for the session layer. `chat` reads one message per
//! stdin line and prints session events as JSON lines on stdout; logs go to
//! stderr.

use agchat::cli::CliClient;
use agchat::logging::init_logging;
use agchat::{AgChatResult, AppConfig, LaunchParams, Launcher, SessionEvent, SessionRegistry};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

#[derive(Parser)]
#[command(name = "agchat", version, about = "Chat with an agent CLI per project")]
struct Cli {
    /// Configuration file (defaults to the user config)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Interactive session: one message per stdin line, events as JSON lines
    Chat {
        #[command(flatten)]
        project: ProjectArgs,
        /// Project id used for the session
        #[arg(long, default_value = "default")]
        id: String,
    },
    /// Single non-interactive turn
    Ask {
        #[command(flatten)]
        project: ProjectArgs,
        /// Continue the previous conversation
        #[arg(long)]
        resume: bool,
        message: String,
    },
    /// Show the logged-in account
    Whoami,
    /// Log in to the CLI
    Login,
    /// Log out of the CLI
    Logout,
    /// Print the command an interactive session would run
    Which {
        #[command(flatten)]
        project: ProjectArgs,
    },
}

#[derive(clap::Args)]
struct ProjectArgs {
    /// Project directory (defaults to the current directory)
    #[arg(long)]
    path: Option<PathBuf>,
    /// Agent to chat with
    #[arg(long, default_value = "")]
    agent: String,
}

impl ProjectArgs {
    fn launch_params(&self) -> LaunchParams {
        let path = self
            .path
            .clone()
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."));
        LaunchParams::new(path, self.agent.clone())
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => AppConfig::load_from_file(path),
        None => AppConfig::load(),
    };
    let config = match config {
        Ok(config) => config,
        Err(e) => {
            eprintln!("agchat: {e}");
            return ExitCode::FAILURE;
        }
    };
    init_logging(&config.logging, config.log_dir());

    match run(cli.command, &config).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            tracing::error!(error = %e, "agchat failed");
            eprintln!("agchat: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Command, config: &AppConfig) -> AgChatResult<bool> {
    match command {
        Command::Chat { project, id } => chat(config, &id, &project.launch_params()).await,
        Command::Ask {
            project,
            resume,
            message,
        } => {
            let client = CliClient::new(Launcher::new(config));
            let response = client
                .ask(&project.launch_params().resume(resume), &message)
                .await?;
            println!("{response}");
            Ok(true)
        }
        Command::Whoami => {
            let status = CliClient::new(Launcher::new(config)).auth_status().await;
            print_json(&status);
            Ok(status.logged_in)
        }
        Command::Login => {
            let report = CliClient::new(Launcher::new(config)).login().await;
            print_json(&report);
            Ok(report.success)
        }
        Command::Logout => {
            let report = CliClient::new(Launcher::new(config)).logout().await;
            print_json(&report);
            Ok(report.success)
        }
        Command::Which { project } => {
            print_json(&Launcher::new(config).interactive(&project.launch_params()));
            Ok(true)
        }
    }
}

async fn chat(config: &AppConfig, project_id: &str, launch: &LaunchParams) -> AgChatResult<bool> {
    let (registry, mut events) = SessionRegistry::from_config(config);
    registry.warm(project_id, launch).await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let message = line.trim();
        if message.is_empty() {
            continue;
        }

        if let Err(e) = registry
            .initiate(project_id, &launch.project_path, &launch.agent_id, message)
            .await
        {
            print_json(&SessionEvent::Error {
                project_id: project_id.to_string(),
                message: e.to_string(),
            });
            continue;
        }

        if !wait_for_done(&mut events).await {
            break;
        }
    }

    registry.stop(None).await;
    Ok(true)
}

/// Print events until the turn's `Done`; `false` if the channel closed
async fn wait_for_done(events: &mut mpsc::UnboundedReceiver<SessionEvent>) -> bool {
    while let Some(event) = events.recv().await {
        print_json(&event);
        if event.is_done() {
            return true;
        }
    }
    false
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string(value) {
        Ok(json) => println!("{json}"),
        Err(e) => tracing::error!(error = %e, "Failed to serialize output"),
    }
}
