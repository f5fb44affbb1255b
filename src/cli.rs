//! One-shot CLI invocations
//!
//! Runs the agent CLI to completion for account commands (`whoami`, `login`,
//! `logout`) and for single non-interactive chat turns.

use crate::error::{CliError, CliResult};
use crate::launcher::{CommandSpec, LaunchParams, Launcher};
use crate::session::{CompletionReason, ResponseExtractor, TurnFailure};
use crate::terminal::{StreamNormalizer, StripNormalizer};
use serde::Serialize;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, instrument, warn};

/// Captured result of a finished CLI process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliOutput {
    /// `None` when terminated by a signal
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CliOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Result of `whoami`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthStatus {
    pub logged_in: bool,
    pub user: Option<String>,
    /// Cleaned CLI output, or the failure reason
    pub detail: String,
}

impl AuthStatus {
    pub fn from_output(output: &CliOutput) -> Self {
        let stdout = clean(&output.stdout);
        if output.success() && !stdout.is_empty() {
            let user = stdout.lines().next().map(|line| line.trim().to_string());
            return Self {
                logged_in: true,
                user,
                detail: stdout,
            };
        }

        let stderr = clean(&output.stderr);
        Self {
            logged_in: false,
            user: None,
            detail: if stderr.is_empty() { stdout } else { stderr },
        }
    }
}

/// Result of `login` / `logout`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandReport {
    pub success: bool,
    pub message: String,
}

impl CommandReport {
    pub fn from_output(output: &CliOutput) -> Self {
        let stdout = clean(&output.stdout);
        let message = if stdout.is_empty() {
            clean(&output.stderr)
        } else {
            stdout
        };
        Self {
            success: output.success(),
            message,
        }
    }
}

fn clean(text: &str) -> String {
    crate::terminal::strip_terminal(text).trim().to_string()
}

/// Runs the agent CLI as a one-shot process
#[derive(Debug, Clone)]
pub struct CliClient {
    launcher: Launcher,
}

impl CliClient {
    pub fn new(launcher: Launcher) -> Self {
        Self { launcher }
    }

    pub fn launcher(&self) -> &Launcher {
        &self.launcher
    }

    /// Run `spec` to completion and capture its output
    #[instrument(skip_all, fields(program = %spec.program))]
    pub async fn run(&self, spec: &CommandSpec) -> CliResult<CliOutput> {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &spec.cwd {
            cmd.current_dir(cwd);
        }
        for (key, value) in &spec.env {
            cmd.env(key, value);
        }

        let output = cmd.output().await.map_err(|e| CliError::SpawnFailed {
            program: spec.program.clone(),
            reason: e.to_string(),
        })?;

        let output = CliOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        debug!(code = ?output.code, stdout_len = output.stdout.len(), "CLI finished");
        Ok(output)
    }

    /// Run a plain subcommand
    pub async fn run_subcommand(&self, args: &[&str]) -> CliResult<CliOutput> {
        self.run(&self.launcher.subcommand(args)).await
    }

    /// Whether the CLI has a logged-in account. Never fails; a CLI that
    /// cannot be started counts as logged out.
    pub async fn auth_status(&self) -> AuthStatus {
        match self.run_subcommand(&["whoami"]).await {
            Ok(output) => AuthStatus::from_output(&output),
            Err(e) => {
                warn!(error = %e, "whoami failed");
                AuthStatus {
                    logged_in: false,
                    user: None,
                    detail: e.to_string(),
                }
            }
        }
    }

    pub async fn login(&self) -> CommandReport {
        self.report(&["login"]).await
    }

    pub async fn logout(&self) -> CommandReport {
        self.report(&["logout"]).await
    }

    async fn report(&self, args: &[&str]) -> CommandReport {
        match self.run_subcommand(args).await {
            Ok(output) => CommandReport::from_output(&output),
            Err(e) => CommandReport {
                success: false,
                message: e.to_string(),
            },
        }
    }

    /// Run one non-interactive chat turn and extract the response
    pub async fn ask(&self, params: &LaunchParams, message: &str) -> CliResult<String> {
        let output = self.run(&self.launcher.single_turn(params, message)).await?;
        extract_single_turn(&output, message)
    }
}

/// Pass a finished single-turn run through the session extraction pipeline
pub fn extract_single_turn(output: &CliOutput, message: &str) -> CliResult<String> {
    let mut normalizer = StripNormalizer::new();
    let mut extractor = ResponseExtractor::new();
    extractor.begin(message);

    let text = normalizer.feed(output.stdout.as_bytes());
    let outcome = extractor
        .feed(&text)
        .or_else(|| extractor.finish(CompletionReason::ProcessExit { code: output.code }));

    let Some(outcome) = outcome else {
        return Err(CliError::EmptyResponse);
    };
    match (outcome.response, outcome.failure) {
        (Some(response), _) => Ok(response),
        (None, Some(TurnFailure::AbnormalExit { code })) => Err(CliError::Failed {
            code,
            stderr: clean(&output.stderr),
        }),
        (None, _) => Err(CliError::EmptyResponse),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn output(code: Option<i32>, stdout: &str, stderr: &str) -> CliOutput {
        CliOutput {
            code,
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
        }
    }

    #[test]
    fn test_auth_status() {
        let status = AuthStatus::from_output(&output(Some(0), "\x1b[1mme@example.com\x1b[0m\nBuilder ID\n", ""));
        assert!(status.logged_in);
        assert_eq!(status.user.as_deref(), Some("me@example.com"));

        let status = AuthStatus::from_output(&output(Some(0), "  \n", ""));
        assert!(!status.logged_in);

        let status = AuthStatus::from_output(&output(Some(1), "", "Not logged in\n"));
        assert!(!status.logged_in);
        assert_eq!(status.detail, "Not logged in");
    }

    #[test]
    fn test_command_report() {
        let report = CommandReport::from_output(&output(Some(0), "Logged out\n", ""));
        assert_eq!(
            report,
            CommandReport {
                success: true,
                message: "Logged out".to_string()
            }
        );

        let report = CommandReport::from_output(&output(Some(2), "", "error: no browser\n"));
        assert!(!report.success);
        assert_eq!(report.message, "error: no browser");
    }

    #[test]
    fn test_extract_single_turn() {
        let stdout = "\x1b[38;5;141m> \x1b[0mHere are the files:\na.txt\nb.txt\n\n ▸ Time: 2s\n";
        let response = extract_single_turn(&output(Some(0), stdout, ""), "list files").unwrap();
        assert_eq!(response, "Here are the files:\na.txt\nb.txt");

        let response = extract_single_turn(&output(Some(0), "just text", ""), "q").unwrap();
        assert_eq!(response, "just text");
    }

    #[test]
    fn test_extract_single_turn_failures() {
        let err = extract_single_turn(&output(Some(1), "", "boom\n"), "q").unwrap_err();
        assert!(matches!(err, CliError::Failed { code: 1, ref stderr } if stderr == "boom"));

        let err = extract_single_turn(&output(Some(0), "Model: x\n", ""), "q").unwrap_err();
        assert!(matches!(err, CliError::EmptyResponse));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_captures_output() {
        let client = CliClient::new(Launcher::with_resolved(
            &crate::config::AppConfig::default(),
            "sh",
            "/usr/bin:/bin",
        ));
        let spec = CommandSpec::new("sh").arg("-c").arg("echo out; echo err >&2; exit 4");
        let output = client.run(&spec).await.unwrap();
        assert_eq!(output.code, Some(4));
        assert_eq!(output.stdout, "out\n");
        assert_eq!(output.stderr, "err\n");

        let err = client
            .run(&CommandSpec::new("/nonexistent/agchat-cli"))
            .await
            .unwrap_err();
        assert!(matches!(err, CliError::SpawnFailed { .. }));
    }
}
