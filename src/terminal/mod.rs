//! Terminal output normalization
//!
//! Turns raw CLI output (ANSI styling, OSC titles, cursor movement, CR
//! overwrites) into plain text that the noise classifier can work on
//! line by line.
//!
//! Two strategies are provided:
//! - [`StripNormalizer`]: drops every control sequence; used for piped stdio.
//! - [`TtyLineRenderer`]: emulates cursor overwrites on the current line; used
//!   when the CLI runs on a pseudo-terminal.

pub mod strip;
pub mod tty;

pub use strip::{strip_terminal, StripNormalizer};
pub use tty::TtyLineRenderer;

/// A per-session output normalizer.
///
/// Implementations may keep parser state between chunks so that escape
/// sequences and UTF-8 characters split across reads are handled.
pub trait StreamNormalizer: Send {
    /// Feed a raw chunk and return the text that is ready for classification.
    fn feed(&mut self, chunk: &[u8]) -> String;

    /// Release anything held back (e.g. an unterminated line).
    fn flush(&mut self) -> String {
        String::new()
    }

    /// Drop all buffered state.
    fn reset(&mut self);
}
