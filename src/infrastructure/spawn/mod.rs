//! Process spawning
//!
//! A [`Spawner`] turns a [`CommandSpec`] into a running process exposed as a
//! [`ProcessHandle`]: an input sender, an ordered stream of [`ProcessEvent`]s
//! and a kill switch. Output chunks are delivered in arrival order and
//! `Exited` is always the last event.

mod pipe;
mod pty;

pub use pipe::PipeSpawner;
pub use pty::PtySpawner;

use crate::error::SessionResult;
use crate::launcher::CommandSpec;
use crate::terminal::StreamNormalizer;
use tokio::sync::mpsc;

/// Event produced by a running process
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEvent {
    /// Raw output bytes (stdout and stderr interleaved for pipes)
    Output(Vec<u8>),
    /// Process ended; `None` when killed by a signal or the status is unknown
    Exited { code: Option<i32> },
}

/// Terminates a running process
pub trait ProcessControl: Send {
    fn kill(&mut self) -> std::io::Result<()>;
}

/// A running process
pub struct ProcessHandle {
    pub pid: Option<u32>,
    pub input: mpsc::UnboundedSender<Vec<u8>>,
    pub events: mpsc::UnboundedReceiver<ProcessEvent>,
    pub control: Box<dyn ProcessControl>,
    /// Terminator that submits one line of input
    pub line_ending: &'static str,
    /// Normalizer suited to this transport
    pub normalizer: Box<dyn StreamNormalizer>,
}

impl std::fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("pid", &self.pid)
            .field("line_ending", &self.line_ending)
            .finish_non_exhaustive()
    }
}

/// Starts processes
pub trait Spawner: Send + Sync {
    /// Start `spec`. Must be called from within a tokio runtime.
    fn spawn(&self, spec: &CommandSpec) -> SessionResult<ProcessHandle>;
}
