//! Control sequence stripping
//!
//! Uses vte to walk the byte stream so that CSI, OSC (BEL or ST terminated),
//! DCS and plain ESC sequences are recognized the same way a terminal would
//! recognize them. Only printable characters, newlines and tabs survive.

use super::StreamNormalizer;
use vte::{Params, Parser, Perform};

/// Strip all terminal control sequences from `input`.
///
/// `\r\n` becomes `\n`, lone `\r` is dropped and NBSP becomes a plain space.
/// The output contains no control characters other than `\n` and `\t`, so
/// applying this function twice gives the same result as applying it once.
/// A sequence left unterminated at the end of `input` is dropped.
pub fn strip_terminal(input: &str) -> String {
    let mut text = PlainText::with_capacity(input.len());
    let mut parser = Parser::new();
    for byte in input.as_bytes() {
        parser.advance(&mut text, *byte);
    }
    text.out
}

/// Streaming variant of [`strip_terminal`].
///
/// Keeps the vte parser between chunks, so a sequence split across two reads
/// is still consumed instead of leaking its tail into the output.
pub struct StripNormalizer {
    parser: Parser,
}

impl StripNormalizer {
    pub fn new() -> Self {
        Self {
            parser: Parser::new(),
        }
    }
}

impl Default for StripNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamNormalizer for StripNormalizer {
    fn feed(&mut self, chunk: &[u8]) -> String {
        let mut text = PlainText::with_capacity(chunk.len());
        for byte in chunk {
            self.parser.advance(&mut text, *byte);
        }
        text.out
    }

    fn reset(&mut self) {
        self.parser = Parser::new();
    }
}

struct PlainText {
    out: String,
}

impl PlainText {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            out: String::with_capacity(capacity),
        }
    }
}

impl Perform for PlainText {
    fn print(&mut self, c: char) {
        match c {
            '\u{a0}' => self.out.push(' '),
            // C1 controls can arrive as UTF-8 encoded code points
            c if c.is_control() => {}
            c => self.out.push(c),
        }
    }

    fn execute(&mut self, byte: u8) {
        match byte {
            b'\n' => self.out.push('\n'),
            b'\t' => self.out.push('\t'),
            _ => {}
        }
    }

    fn hook(&mut self, _params: &Params, _intermediates: &[u8], _ignore: bool, _action: char) {}

    fn put(&mut self, _byte: u8) {}

    fn unhook(&mut self) {}

    fn osc_dispatch(&mut self, _params: &[&[u8]], _bell_terminated: bool) {}

    fn csi_dispatch(&mut self, _params: &Params, _intermediates: &[u8], _ignore: bool, _action: char) {}

    fn esc_dispatch(&mut self, _intermediates: &[u8], _ignore: bool, _byte: u8) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_strips_sgr_colors() {
        assert_eq!(strip_terminal("\x1b[1;32mgreen\x1b[0m text"), "green text");
        assert_eq!(strip_terminal("\x1b[38;2;255;0;0mrgb\x1b[m"), "rgb");
    }

    #[test]
    fn test_strips_cursor_and_mode_sequences() {
        assert_eq!(strip_terminal("\x1b[2K\x1b[1Gline"), "line");
        assert_eq!(strip_terminal("\x1b[?25lhidden\x1b[?25h"), "hidden");
        assert_eq!(strip_terminal("\x1b[?2004h\x1b=ready\x1b>"), "ready");
    }

    #[test]
    fn test_strips_osc_sequences() {
        assert_eq!(strip_terminal("\x1b]0;kiro - chat\x07hello"), "hello");
        assert_eq!(strip_terminal("\x1b]8;;http://x\x1b\\link\x1b]8;;\x1b\\"), "link");
    }

    #[test]
    fn test_newline_normalization() {
        assert_eq!(strip_terminal("a\r\nb\r\n"), "a\nb\n");
        assert_eq!(strip_terminal("50%\r100%"), "50%100%");
        assert_eq!(strip_terminal("tab\there"), "tab\there");
    }

    #[test]
    fn test_nbsp_and_control_chars() {
        assert_eq!(strip_terminal("a\u{a0}b"), "a b");
        assert_eq!(strip_terminal("bell\x07\x08\x0b\x0c\x7fend"), "bellend");
        assert_eq!(strip_terminal("c1\u{9b}x"), "c1x");
    }

    #[test]
    fn test_truncated_sequence_is_dropped() {
        assert_eq!(strip_terminal("text\x1b[38;5"), "text");
        assert_eq!(strip_terminal("text\x1b]0;unterminated title"), "text");
        assert_eq!(strip_terminal("\x1b"), "");
    }

    #[test]
    fn test_idempotent() {
        let inputs = [
            "\x1b[31m안녕하세요\x1b[0m\r\n",
            "⠋ Thinking...\r⠙ Thinking...\r\x1b[2K> Hello",
            "\x1b]0;t\x1b\\plain\u{a0}text\t\x1b[?1049h",
            "\u{1b}[\u{1b}]\u{7}\r\r\n\n",
        ];
        for input in inputs {
            let once = strip_terminal(input);
            assert_eq!(strip_terminal(&once), once, "input: {input:?}");
        }
    }

    #[test]
    fn test_streaming_keeps_state_across_chunks() {
        let mut normalizer = StripNormalizer::new();
        let mut out = normalizer.feed(b"before\x1b[3");
        out.push_str(&normalizer.feed(b"1mred\x1b[0m"));
        assert_eq!(out, "beforered");
    }

    #[test]
    fn test_streaming_split_utf8() {
        let bytes = "한글".as_bytes();
        let mut normalizer = StripNormalizer::new();
        let mut out = normalizer.feed(&bytes[..2]);
        out.push_str(&normalizer.feed(&bytes[2..]));
        assert_eq!(out, "한글");
    }
}
