//! Response extractor
//!
//! Finite state machine that turns normalized CLI output into one response
//! per submitted message:
//!
//! ```text
//! Idle -> AwaitingStart -> Streaming -> Completing -> Idle
//!              |                                      ^
//!              +------------ start timeout -----------+
//! ```
//!
//! The extractor is synchronous and owns no timers. The session task decides
//! when the start timeout or the idle flush fires and calls
//! [`ResponseExtractor::start_timeout`] / [`ResponseExtractor::finish`].

use crate::classify::{
    classify_line, is_exact_echo, is_rule_line, split_timing_marker, LineClass,
};
use crate::error::SessionError;
use crate::terminal::strip_terminal;
use once_cell::sync::Lazy;
use regex::Regex;

/// Three or more consecutive newlines (optionally with whitespace between)
static EXCESS_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n(?:[ \t]*\n){2,}").unwrap());

/// Extractor state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractorState {
    /// No message in flight
    Idle,
    /// Message sent, waiting for the first content line
    AwaitingStart,
    /// Content is being accumulated
    Streaming,
    /// A termination condition was observed; the response is being assembled
    Completing,
}

impl ExtractorState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractorState::Idle => "idle",
            ExtractorState::AwaitingStart => "awaiting-start",
            ExtractorState::Streaming => "streaming",
            ExtractorState::Completing => "completing",
        }
    }

    /// Whether a message is in flight
    pub fn is_busy(&self) -> bool {
        !matches!(self, ExtractorState::Idle)
    }
}

/// What ended a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionReason {
    /// The trailing "Time: Ns" marker
    TimingMarker,
    /// The CLI closed its output / exited
    ProcessExit { code: Option<i32> },
    /// No output for the idle window
    IdleFlush,
    /// No content before the start timeout
    StartTimeout { waited_secs: u64 },
}

/// Why a turn produced no usable response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnFailure {
    NoResponse { waited_secs: u64 },
    /// The timing marker arrived before any content
    Unanswered,
    AbnormalExit { code: i32 },
    Empty,
}

impl TurnFailure {
    pub fn into_error(self) -> SessionError {
        match self {
            TurnFailure::NoResponse { waited_secs } => SessionError::NoResponseTimeout {
                timeout_secs: waited_secs,
            },
            TurnFailure::Unanswered => SessionError::NoResponse,
            TurnFailure::AbnormalExit { code } => SessionError::AbnormalExit { code },
            TurnFailure::Empty => SessionError::EmptyResponse,
        }
    }
}

/// Result of a completed turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnOutcome {
    pub response: Option<String>,
    pub failure: Option<TurnFailure>,
    pub reason: CompletionReason,
}

/// Incremental response extractor for one session
#[derive(Debug)]
pub struct ResponseExtractor {
    state: ExtractorState,
    last_message: Option<String>,
    fragments: Vec<String>,
    /// Text after the last newline, not yet classified
    partial: String,
}

impl Default for ResponseExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseExtractor {
    pub fn new() -> Self {
        Self {
            state: ExtractorState::Idle,
            last_message: None,
            fragments: Vec::new(),
            partial: String::new(),
        }
    }

    pub fn state(&self) -> ExtractorState {
        self.state
    }

    pub fn last_message(&self) -> Option<&str> {
        self.last_message.as_deref()
    }

    /// Fragments accumulated so far in the current turn
    pub fn fragments(&self) -> &[String] {
        &self.fragments
    }

    fn transition(&mut self, to: ExtractorState) {
        tracing::trace!(from = self.state.as_str(), to = to.as_str(), "Extractor transition");
        self.state = to;
    }

    /// Start a turn. Returns `false` (and changes nothing) if one is in flight.
    pub fn begin(&mut self, message: &str) -> bool {
        if self.state.is_busy() {
            return false;
        }
        self.fragments.clear();
        self.partial.clear();
        self.last_message = Some(message.to_string());
        self.transition(ExtractorState::AwaitingStart);
        true
    }

    /// Feed normalized text. Returns the outcome if this text ended the turn.
    ///
    /// Output arriving while idle (startup splash, the prompt redrawn after an
    /// answer) is discarded.
    pub fn feed(&mut self, text: &str) -> Option<TurnOutcome> {
        if !self.state.is_busy() {
            return None;
        }

        self.partial.push_str(text);
        while let Some(newline) = self.partial.find('\n') {
            let line: String = self.partial.drain(..=newline).collect();
            if let Some(outcome) = self.process_line(line.trim_end_matches('\n')) {
                return Some(outcome);
            }
        }
        None
    }

    /// End the turn because the stream went quiet or closed.
    ///
    /// The held partial line is classified first. An idle flush while still
    /// waiting for the first content line keeps the turn open and returns
    /// `None`; the start timeout handles that case.
    pub fn finish(&mut self, reason: CompletionReason) -> Option<TurnOutcome> {
        if !self.state.is_busy() {
            return None;
        }

        let partial = std::mem::take(&mut self.partial);
        if !partial.is_empty() {
            if let Some(outcome) = self.process_line(&partial) {
                return Some(outcome);
            }
        }

        if reason == CompletionReason::IdleFlush && self.state == ExtractorState::AwaitingStart {
            return None;
        }
        Some(self.complete(reason))
    }

    /// The start timeout fired. Only meaningful while awaiting the first line.
    pub fn start_timeout(&mut self, waited_secs: u64) -> Option<TurnOutcome> {
        if self.state != ExtractorState::AwaitingStart {
            return None;
        }
        Some(self.complete(CompletionReason::StartTimeout { waited_secs }))
    }

    fn process_line(&mut self, line: &str) -> Option<TurnOutcome> {
        if let Some(before) = split_timing_marker(line) {
            if !before.trim().is_empty() {
                self.accept_line(before);
            }
            return Some(self.complete(CompletionReason::TimingMarker));
        }
        self.accept_line(line);
        None
    }

    fn accept_line(&mut self, line: &str) {
        match self.state {
            ExtractorState::AwaitingStart => {
                if is_rule_line(line.trim()) {
                    return;
                }
                if let LineClass::Content(text) = classify_line(line, self.last_message.as_deref()) {
                    self.fragments.push(text);
                    self.transition(ExtractorState::Streaming);
                }
            }
            ExtractorState::Streaming => match classify_line(line, None) {
                LineClass::Content(text) => {
                    let echoed = self
                        .last_message
                        .as_deref()
                        .is_some_and(|message| is_exact_echo(&text, message));
                    if !echoed {
                        self.fragments.push(text);
                    }
                }
                LineClass::Blank => self.fragments.push(String::new()),
                _ => {}
            },
            ExtractorState::Idle | ExtractorState::Completing => {}
        }
    }

    fn complete(&mut self, reason: CompletionReason) -> TurnOutcome {
        let awaiting = self.state == ExtractorState::AwaitingStart;
        self.transition(ExtractorState::Completing);

        let text = assemble_response(&self.fragments);
        let exit_code = match reason {
            CompletionReason::ProcessExit { code: Some(code) } if code != 0 => Some(code),
            _ => None,
        };

        let (response, failure) = match (text.is_empty(), reason, exit_code) {
            (true, CompletionReason::StartTimeout { waited_secs }, _) => {
                (None, Some(TurnFailure::NoResponse { waited_secs }))
            }
            (true, CompletionReason::TimingMarker, _) if awaiting => {
                (None, Some(TurnFailure::Unanswered))
            }
            (true, _, Some(code)) => (None, Some(TurnFailure::AbnormalExit { code })),
            (true, _, None) => (None, Some(TurnFailure::Empty)),
            (false, _, Some(code)) => (
                Some(format!("{text}\n\n[warning] CLI exited with code {code}")),
                None,
            ),
            (false, _, None) => (Some(text), None),
        };

        tracing::debug!(
            reason = ?reason,
            fragments = self.fragments.len(),
            failed = failure.is_some(),
            "Turn completed"
        );

        self.fragments.clear();
        self.partial.clear();
        self.transition(ExtractorState::Idle);

        TurnOutcome {
            response,
            failure,
            reason,
        }
    }
}

/// Join fragments into the final response text.
///
/// Control sequences are stripped again, runs of blank lines are collapsed
/// to one, a leading "> " continuation marker is removed and the result is
/// trimmed.
pub fn assemble_response(fragments: &[String]) -> String {
    let joined = strip_terminal(&fragments.join("\n"));
    let collapsed = EXCESS_BLANK_LINES.replace_all(&joined, "\n\n");
    let trimmed = collapsed.trim();
    let without_marker = trimmed.strip_prefix("> ").unwrap_or(trimmed);
    without_marker.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn streaming(message: &str) -> ResponseExtractor {
        let mut extractor = ResponseExtractor::new();
        assert!(extractor.begin(message));
        extractor
    }

    #[test]
    fn test_idle_discards_output() {
        let mut extractor = ResponseExtractor::new();
        assert_eq!(extractor.feed("Welcome to the CLI\n[agent] > "), None);
        assert_eq!(extractor.state(), ExtractorState::Idle);
        assert_eq!(extractor.finish(CompletionReason::IdleFlush), None);
    }

    #[test]
    fn test_awaiting_start_ignores_noise() {
        let mut extractor = streaming("list files");
        extractor.feed("╭────╮\n│ Did you know? │\n╰────╯\nModel: gpt-x\n⠋ Thinking...\n\n");
        assert_eq!(extractor.state(), ExtractorState::AwaitingStart);
        assert!(extractor.fragments().is_empty());

        extractor.feed("[agent] > list files\n");
        assert_eq!(extractor.state(), ExtractorState::AwaitingStart);

        extractor.feed("> a.txt\n");
        assert_eq!(extractor.state(), ExtractorState::Streaming);
        assert_eq!(extractor.fragments(), &["> a.txt".to_string()]);
    }

    #[test]
    fn test_rules_dropped_only_before_content() {
        let mut extractor = streaming("show the table");
        extractor.feed("────────────\n┌──────┐\n");
        assert_eq!(extractor.state(), ExtractorState::AwaitingStart);

        extractor.feed("Results:\n┌─────┬─────┐\n│ a   │ 1   │\n└─────┴─────┘\n");
        let outcome = extractor.finish(CompletionReason::IdleFlush).unwrap();
        assert_eq!(
            outcome.response.as_deref(),
            Some("Results:\n┌─────┬─────┐\n└─────┴─────┘")
        );
    }

    #[test]
    fn test_timing_marker_ends_turn() {
        let mut extractor = streaming("hi there");
        extractor.feed("> First line\n");
        let outcome = extractor.feed("Hello there Time: 3s\n").expect("turn should end");
        assert_eq!(outcome.reason, CompletionReason::TimingMarker);
        assert_eq!(outcome.response.as_deref(), Some("First line\nHello there"));
        assert_eq!(outcome.failure, None);
        assert_eq!(extractor.state(), ExtractorState::Idle);
    }

    #[test]
    fn test_marker_line_split_mid_chunk() {
        let mut extractor = streaming("q");
        extractor.feed("answer");
        assert_eq!(extractor.feed(" text"), None);
        let outcome = extractor.feed("\n▸ Time: 1s\n[agent] > ").unwrap();
        assert_eq!(outcome.response.as_deref(), Some("answer text"));
        // Prompt redraw after the marker is not part of the next turn
        assert!(extractor.fragments().is_empty());
    }

    #[test]
    fn test_idle_flush_keeps_partial_line() {
        let mut extractor = streaming("q");
        extractor.feed("line one\nline two without newline");
        let outcome = extractor.finish(CompletionReason::IdleFlush).unwrap();
        assert_eq!(
            outcome.response.as_deref(),
            Some("line one\nline two without newline")
        );
        assert_eq!(outcome.failure, None);
    }

    #[test]
    fn test_idle_flush_while_awaiting_keeps_waiting() {
        let mut extractor = streaming("q");
        extractor.feed("⠋ Thinking...");
        assert_eq!(extractor.finish(CompletionReason::IdleFlush), None);
        assert_eq!(extractor.state(), ExtractorState::AwaitingStart);
    }

    #[test]
    fn test_timing_marker_before_content_is_no_response() {
        let mut extractor = streaming("list files");
        let outcome = extractor
            .feed("[agent] > list files\n▸ Time: 2s\n")
            .expect("marker should end the turn");
        assert_eq!(outcome.reason, CompletionReason::TimingMarker);
        assert_eq!(outcome.response, None);
        assert_eq!(outcome.failure, Some(TurnFailure::Unanswered));
        assert_eq!(
            outcome.failure.map(|f| f.into_error().to_string()).as_deref(),
            Some("No response from CLI")
        );
        assert_eq!(extractor.state(), ExtractorState::Idle);

        // Text before the marker is the whole response
        let mut extractor = streaming("hi");
        let outcome = extractor.feed("Hello there Time: 3s\n").unwrap();
        assert_eq!(outcome.response.as_deref(), Some("Hello there"));
        assert_eq!(outcome.failure, None);
    }

    #[test]
    fn test_start_timeout() {
        let mut extractor = streaming("q");
        extractor.feed("Model: gpt-x\n");
        let outcome = extractor.start_timeout(30).unwrap();
        assert_eq!(outcome.response, None);
        assert_eq!(outcome.failure, Some(TurnFailure::NoResponse { waited_secs: 30 }));
        assert_eq!(extractor.state(), ExtractorState::Idle);

        // No-op once streaming
        let mut extractor = streaming("q");
        extractor.feed("content\n");
        assert_eq!(extractor.start_timeout(30), None);
    }

    #[test]
    fn test_busy_begin_is_rejected_without_side_effects() {
        let mut extractor = streaming("first");
        extractor.feed("partial answer\n");
        assert!(!extractor.begin("second"));
        assert_eq!(extractor.last_message(), Some("first"));
        assert_eq!(extractor.fragments(), &["partial answer".to_string()]);
    }

    #[test]
    fn test_process_exit_outcomes() {
        let mut extractor = streaming("q");
        extractor.feed("partial\n");
        let outcome = extractor
            .finish(CompletionReason::ProcessExit { code: Some(1) })
            .unwrap();
        assert_eq!(
            outcome.response.as_deref(),
            Some("partial\n\n[warning] CLI exited with code 1")
        );
        assert_eq!(outcome.failure, None);

        let mut extractor = streaming("q");
        let outcome = extractor
            .finish(CompletionReason::ProcessExit { code: Some(127) })
            .unwrap();
        assert_eq!(outcome.failure, Some(TurnFailure::AbnormalExit { code: 127 }));

        let mut extractor = streaming("q");
        let outcome = extractor
            .finish(CompletionReason::ProcessExit { code: Some(0) })
            .unwrap();
        assert_eq!(outcome.failure, Some(TurnFailure::Empty));
    }

    #[test]
    fn test_echo_suppressed_while_streaming_only_when_exact() {
        let mut extractor = streaming("ok");
        extractor.feed("Sure.\nok\nok, done\n");
        let outcome = extractor.finish(CompletionReason::IdleFlush).unwrap();
        assert_eq!(outcome.response.as_deref(), Some("Sure.\nok, done"));
    }

    #[test]
    fn test_assemble_response() {
        let fragments: Vec<String> = ["> Hello", "", "", "", "world\x1b[0m", ""]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(assemble_response(&fragments), "Hello\n\nworld");
        assert_eq!(assemble_response(&[]), "");
    }
}
