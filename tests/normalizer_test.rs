//! Normalizer and classifier behaviour on captured CLI output
//!
//! Run with: cargo test --test normalizer_test

use agchat::classify::{classify_line, LineClass};
use agchat::terminal::{strip_terminal, StreamNormalizer, StripNormalizer, TtyLineRenderer};
use pretty_assertions::assert_eq;

/// Startup screen and one answer as emitted by the CLI on a terminal
const CAPTURE: &str = concat!(
    "\x1b]0;kiro\x07\x1b[?25l\x1b[?2004h",
    "\x1b[38;5;141m⣴⣶⣦⡀⠀⣴⣶⣦\x1b[0m\r\n",
    "╭─────────────── Did you know? ───────────────╮\r\n",
    "│ Use /prompts to reuse common instructions  │\r\n",
    "╰─────────────────────────────────────────────╯\r\n",
    "\r\n",
    "Model: claude-sonnet-4\r\n",
    "\r\n",
    "\x1b[1m[agent] > \x1b[0mlist files\r\n",
    "⠋ Thinking...\r⠙ Thinking...\r\x1b[2K",
    "\x1b[38;5;10m> \x1b[0mHere are the files:\r\n",
    "- a.txt\r\n",
    "- b.txt\r\n",
    "\r\n",
    " \x1b[38;5;8m▸ Time: 2s\x1b[0m\r\n",
);

fn content_lines(text: &str, message: &str) -> Vec<String> {
    text.lines()
        .filter_map(|line| match classify_line(line, Some(message)) {
            LineClass::Content(content) => Some(content),
            _ => None,
        })
        .collect()
}

#[test]
fn test_strip_is_idempotent_on_capture() {
    let once = strip_terminal(CAPTURE);
    assert_eq!(strip_terminal(&once), once);
    assert!(!once.contains('\x1b'));
    assert!(!once.contains('\r'));
}

#[test]
fn test_strip_is_idempotent_on_malformed_input() {
    let inputs = [
        "\x1b[",
        "\x1b[38;5",
        "\x1b]0;unterminated title",
        "plain \x1b",
        "\x1b\x1b[[m]]",
        "\u{9b}31mC1 CSI",
        "tab\there\u{7}bell",
    ];
    for input in inputs {
        let once = strip_terminal(input);
        assert_eq!(strip_terminal(&once), once, "input {input:?}");
    }
}

#[test]
fn test_tty_capture_yields_only_the_answer() {
    let mut renderer = TtyLineRenderer::new();
    let text = renderer.feed(CAPTURE.as_bytes()) + &renderer.flush();
    assert_eq!(
        content_lines(&text, "list files"),
        vec!["> Here are the files:", "- a.txt", "- b.txt"]
    );
}

#[test]
fn test_tty_and_strip_agree_on_chunked_input() {
    let mut tty = TtyLineRenderer::new();
    let mut strip = StripNormalizer::new();
    let answer = "\x1b[32m답변\x1b[0m: 첫 줄\r\n둘째 줄\r\n";

    let mut tty_out = String::new();
    let mut strip_out = String::new();
    // Split inside escape sequences and multi-byte characters
    for chunk in answer.as_bytes().chunks(3) {
        tty_out.push_str(&tty.feed(chunk));
        strip_out.push_str(&strip.feed(chunk));
    }
    tty_out.push_str(&tty.flush());
    strip_out.push_str(&strip.flush());

    assert_eq!(tty_out, "답변: 첫 줄\n둘째 줄\n");
    assert_eq!(strip_out, tty_out);
}
