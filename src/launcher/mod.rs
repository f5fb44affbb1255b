//! Process launcher
//!
//! Builds the command descriptor for the agent CLI: executable, arguments,
//! working directory and environment. Either the CLI is executed directly or,
//! when it lives behind a bridge shell, through `<bridge> -e bash -c`.
//! Constructing a descriptor has no side effects; spawning is the
//! [`Spawner`](crate::infrastructure::spawn::Spawner)'s job.

pub mod bridge;
pub mod resolve;

use crate::config::{AppConfig, BridgeConfig};
use bridge::{bridge_script, to_bridge_path, BridgeArg};
use resolve::{augmented_path, candidate_paths, extra_search_dirs, resolve_cli_path, CLI_PATH_ENV};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Everything needed to start a CLI process
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: Vec<(String, String)>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Environment value set on this descriptor
    pub fn env_value(&self, key: &str) -> Option<&str> {
        self.env
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Per-project launch parameters supplied by the host application
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchParams {
    pub project_path: PathBuf,
    pub agent_id: String,
    /// Continue the CLI's previous conversation for this directory
    pub resume: bool,
}

impl LaunchParams {
    pub fn new(project_path: impl Into<PathBuf>, agent_id: impl Into<String>) -> Self {
        Self {
            project_path: project_path.into(),
            agent_id: agent_id.into(),
            resume: false,
        }
    }

    pub fn resume(mut self, resume: bool) -> Self {
        self.resume = resume;
        self
    }
}

/// Builds [`CommandSpec`]s for the agent CLI
#[derive(Debug, Clone)]
pub struct Launcher {
    cli_path: String,
    path_var: String,
    bridge: BridgeConfig,
    bridge_enabled: bool,
}

impl Launcher {
    /// Resolve the CLI install and search path from the live environment
    pub fn new(config: &AppConfig) -> Self {
        let home = dirs::home_dir();
        let env_override = std::env::var(CLI_PATH_ENV).ok();
        let override_path = config.cli_path_override();

        let candidates = candidate_paths(
            &config.cli.binary,
            override_path.as_deref(),
            env_override.as_deref(),
            home.as_deref(),
        );
        let cli_path = resolve_cli_path(&candidates, &config.cli.binary, |path| path.exists());

        let extra = extra_search_dirs(home.as_deref(), &config.cli.extra_search_dirs);
        let path_var = augmented_path(std::env::var_os("PATH").as_deref(), &extra)
            .to_string_lossy()
            .into_owned();

        Self::with_resolved(config, cli_path, path_var)
    }

    /// Launcher with an already resolved CLI path and `PATH` value
    pub fn with_resolved(
        config: &AppConfig,
        cli_path: impl Into<String>,
        path_var: impl Into<String>,
    ) -> Self {
        Self {
            cli_path: cli_path.into(),
            path_var: path_var.into(),
            bridge: config.bridge.clone(),
            bridge_enabled: config.bridge.mode.is_enabled(),
        }
    }

    /// Force the bridge on or off regardless of the host platform
    pub fn with_bridge(mut self, enabled: bool) -> Self {
        self.bridge_enabled = enabled;
        self
    }

    pub fn cli_path(&self) -> &str {
        &self.cli_path
    }

    pub fn uses_bridge(&self) -> bool {
        self.bridge_enabled
    }

    /// Long-lived conversational session
    pub fn interactive(&self, params: &LaunchParams) -> CommandSpec {
        let mut args = vec![BridgeArg::Plain("chat")];
        push_agent(&mut args, &params.agent_id);
        if params.resume {
            args.push(BridgeArg::Plain("--resume"));
        }
        self.build(Some(&params.project_path), &args)
    }

    /// Run one message to completion and exit
    pub fn single_turn(&self, params: &LaunchParams, message: &str) -> CommandSpec {
        let mut args = vec![BridgeArg::Plain("chat"), BridgeArg::Plain("--no-interactive")];
        push_agent(&mut args, &params.agent_id);
        if params.resume {
            args.push(BridgeArg::Plain("--resume"));
        }
        args.push(BridgeArg::Encoded(message));
        self.build(Some(&params.project_path), &args)
    }

    /// Plain subcommand such as `whoami`, run outside any project
    pub fn subcommand(&self, args: &[&str]) -> CommandSpec {
        let args: Vec<BridgeArg<'_>> = args.iter().map(|arg| BridgeArg::Plain(arg)).collect();
        self.build(None, &args)
    }

    fn build(&self, cwd: Option<&Path>, args: &[BridgeArg<'_>]) -> CommandSpec {
        let spec = if self.bridge_enabled {
            let bridge_cwd =
                cwd.map(|dir| to_bridge_path(&dir.to_string_lossy(), &self.bridge.mount_root));
            let script = bridge_script(bridge_cwd.as_deref(), &self.bridge.cli_path, args);
            CommandSpec::new(&self.bridge.program)
                .arg("-e")
                .arg("bash")
                .arg("-c")
                .arg(script)
        } else {
            let mut spec = CommandSpec::new(&self.cli_path).env("PATH", &self.path_var);
            spec.args = args
                .iter()
                .map(|arg| match arg {
                    BridgeArg::Plain(value) | BridgeArg::Encoded(value) => value.to_string(),
                })
                .collect();
            if let Some(dir) = cwd {
                spec = spec.cwd(dir);
            }
            spec
        };

        spec.env("LANG", "C.UTF-8").env("TERM", "xterm-256color")
    }
}

fn push_agent<'a>(args: &mut Vec<BridgeArg<'a>>, agent_id: &'a str) {
    if !agent_id.trim().is_empty() {
        args.push(BridgeArg::Plain("--agent"));
        args.push(BridgeArg::Plain(agent_id));
    }
}
