//! AgChat Library
//!
//! Per-project interactive sessions with an agent CLI:
//! - Process launching, directly or through a bridge shell
//! - Terminal output normalization (ANSI stripping, CR overwrites)
//! - Noise classification and response extraction
//! - A session registry that turns each message into output/error/done events

pub mod classify;
pub mod cli;
pub mod config;
pub mod error;
pub mod infrastructure;
pub mod launcher;
pub mod logging;
pub mod session;
pub mod terminal;

pub use config::AppConfig;
pub use error::{AgChatError, AgChatResult, SessionError, SessionResult};
pub use launcher::{CommandSpec, LaunchParams, Launcher};
pub use session::{ProjectId, SessionEvent, SessionInfo, SessionRegistry};
