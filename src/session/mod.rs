//! Interactive CLI sessions
//!
//! One long-lived CLI process per project. The [`SessionRegistry`] owns the
//! project → session map; each session runs as its own tokio task
//! ([`actor`]) that feeds process output through the normalizer and the
//! [`ResponseExtractor`] and reports [`SessionEvent`]s.

mod actor;
pub mod extractor;
pub mod registry;

pub use extractor::{
    assemble_response, CompletionReason, ExtractorState, ResponseExtractor, TurnFailure,
    TurnOutcome,
};
pub use registry::{SessionInfo, SessionRegistry};

use crate::config::SessionConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Caller-chosen project identifier; one session per project
pub type ProjectId = String;

/// Event reported to the host application
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Final response text of a turn
    Output { project_id: ProjectId, text: String },
    /// The turn failed
    Error {
        project_id: ProjectId,
        message: String,
    },
    /// The turn is over; exactly one per accepted message
    Done { project_id: ProjectId },
}

impl SessionEvent {
    pub fn project_id(&self) -> &str {
        match self {
            SessionEvent::Output { project_id, .. }
            | SessionEvent::Error { project_id, .. }
            | SessionEvent::Done { project_id } => project_id,
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, SessionEvent::Done { .. })
    }
}

/// Timer settings for a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTimings {
    /// Wait for the first content line of a response
    pub response_timeout: Duration,
    /// Same, for the first message after the process started
    pub first_response_timeout: Duration,
    /// Quiet period that ends a streaming response
    pub idle_flush: Duration,
}

impl Default for SessionTimings {
    fn default() -> Self {
        Self::from(&SessionConfig::default())
    }
}

impl From<&SessionConfig> for SessionTimings {
    fn from(config: &SessionConfig) -> Self {
        Self {
            response_timeout: config.response_timeout(),
            first_response_timeout: config.first_response_timeout(),
            idle_flush: config.idle_flush(),
        }
    }
}
