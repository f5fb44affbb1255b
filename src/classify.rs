//! Noise classification for normalized CLI output lines
//!
//! The CLI decorates its answers with spinners, box-drawing banners, a model
//! line, a trailing timing marker and the echoed prompt. Everything here works
//! on one normalized line at a time and never looks across line boundaries.

use once_cell::sync::Lazy;
use regex::Regex;

// ========== Patterns ==========

/// Braille spinner frames, optionally followed by the "Thinking..." label
static SPINNER_ONLY_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?:[⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏](?:\s*Thinking(?:\.\.\.|…))?\s*)+$").unwrap()
});

/// Spinner fragments glued into a content line after `\r` was dropped
static INLINE_SPINNER_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:\s*[⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏]\s*Thinking(?:\.\.\.|…))+").unwrap());

/// Input prompt, e.g. "[agent] > "
static PROMPT_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*!?\s*\[[^\]\n]{1,64}\]\s*>\s?").unwrap());

/// Prompt glyph with nothing after it
static BARE_PROMPT_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(?:!?>|❯)$").unwrap());

/// Rounded splash box: top, bottom and side borders
static BOX_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[╭╰│]").unwrap());

/// Other box-drawing rules and corners. Answers may draw tables with these,
/// so they only count as noise before the first content line.
static RULE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[╮╯┃─━═┌┐└┘├┤┬┴┼║╔╗╚╝]").unwrap());

/// Heavy braille blocks used by the ASCII-art logo
static LOGO_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[⣴⣶⣦⣿⡇⡆⢿⠟⠿]").unwrap());

static TIP_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^did you know\?").unwrap());

static WELCOME_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^welcome to\b").unwrap());

static MODEL_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^model:\s*\S").unwrap());

/// Tool-usage hints printed around the splash screen
static HINT_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:use\s+/\w+|type\s+/\w+|/\w+\s+(?:to|for)\b|ctrl\s*\+\s*\w|tip:)").unwrap()
});

/// Trailing "Time: 3s" marker that ends every answer
static TIMING_MARKER_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:▸\s*)?Time:\s*\d+(?:\.\d+)?s\s*$").unwrap());

// ========== Types ==========

/// Classification of a single normalized output line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineClass {
    /// Nothing but whitespace
    Blank,
    /// Spinner frames with the "Thinking..." label
    Spinner,
    /// Splash, tips, model line, status line, decorative borders
    Banner,
    /// Bare prompt or an echo of the submitted message
    PromptEcho,
    /// Assistant text, with prompt prefix and inline spinner fragments removed
    Content(String),
}

impl LineClass {
    pub fn is_noise(&self) -> bool {
        matches!(self, LineClass::Spinner | LineClass::Banner | LineClass::PromptEcho)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            LineClass::Blank => "blank",
            LineClass::Spinner => "spinner",
            LineClass::Banner => "banner",
            LineClass::PromptEcho => "prompt-echo",
            LineClass::Content(_) => "content",
        }
    }
}

// ========== Classifier ==========

/// Classify one normalized line.
///
/// `last_message` enables echo suppression using [`is_echo`] (containment in
/// either direction).
pub fn classify_line(line: &str, last_message: Option<&str>) -> LineClass {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return LineClass::Blank;
    }
    if is_spinner_only(trimmed) {
        return LineClass::Spinner;
    }
    if BARE_PROMPT_PATTERN.is_match(trimmed) {
        return LineClass::PromptEcho;
    }

    let candidate = match PROMPT_PATTERN.find(line) {
        Some(prompt) => {
            let rest = line[prompt.end()..].trim();
            if rest.is_empty() {
                return LineClass::PromptEcho;
            }
            rest
        }
        None => {
            if is_banner(trimmed) {
                return LineClass::Banner;
            }
            line.trim_end()
        }
    };

    let candidate = strip_inline_spinner(candidate);
    if candidate.trim().is_empty() {
        return LineClass::Spinner;
    }

    if let Some(message) = last_message {
        if is_echo(&candidate, message) {
            return LineClass::PromptEcho;
        }
    }

    LineClass::Content(candidate.trim_end().to_string())
}

pub fn is_spinner_only(line: &str) -> bool {
    SPINNER_ONLY_PATTERN.is_match(line)
}

/// Whether a trimmed line is decoration rather than content
pub fn is_banner(trimmed: &str) -> bool {
    let trimmed = trimmed.trim_start_matches('▸').trim_start();
    BOX_PATTERN.is_match(trimmed)
        || LOGO_PATTERN.is_match(trimmed)
        || TIP_PATTERN.is_match(trimmed)
        || WELCOME_PATTERN.is_match(trimmed)
        || MODEL_PATTERN.is_match(trimmed)
        || HINT_PATTERN.is_match(trimmed)
        || is_timing_line(trimmed)
}

/// Whether a trimmed line starts with a box-drawing rule or corner outside
/// the splash box set
pub fn is_rule_line(trimmed: &str) -> bool {
    RULE_PATTERN.is_match(trimmed)
}

fn is_timing_line(trimmed: &str) -> bool {
    TIMING_MARKER_PATTERN
        .find(trimmed)
        .is_some_and(|m| m.start() == 0)
}

/// Remove the prompt prefix ("[agent] > ") if present
pub fn strip_prompt(line: &str) -> &str {
    match PROMPT_PATTERN.find(line) {
        Some(prompt) => &line[prompt.end()..],
        None => line,
    }
}

fn strip_inline_spinner(line: &str) -> String {
    INLINE_SPINNER_PATTERN.replace_all(line, "").into_owned()
}

/// Split a line at the trailing timing marker.
///
/// Returns the text before the marker when the line ends with one.
pub fn split_timing_marker(line: &str) -> Option<&str> {
    TIMING_MARKER_PATTERN
        .find(line)
        .map(|marker| &line[..marker.start()])
}

// ========== Echo detection ==========

/// Reduce text to lowercase alphanumerics (Unicode-aware) for echo comparison
pub fn normalize_for_echo(value: &str) -> String {
    value
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Whether `line` repeats `message`, possibly partially or garbled.
///
/// Equal normalized forms, or one containing the other, count as an echo.
/// Short messages can therefore hide real output that happens to contain
/// them.
pub fn is_echo(line: &str, message: &str) -> bool {
    let line = normalize_for_echo(line);
    let message = normalize_for_echo(message);
    if line.is_empty() || message.is_empty() {
        return false;
    }
    line == message || line.contains(&message) || message.contains(&line)
}

/// Strict variant of [`is_echo`]: only equal normalized forms match
pub fn is_exact_echo(line: &str, message: &str) -> bool {
    let line = normalize_for_echo(strip_prompt(line));
    !line.is_empty() && line == normalize_for_echo(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_spinner_lines() {
        assert_eq!(classify_line("⠋ Thinking...", None), LineClass::Spinner);
        assert_eq!(
            classify_line("⠋ Thinking...⠙ Thinking...⠹ Thinking...", None),
            LineClass::Spinner
        );
        assert_eq!(classify_line("  ⠼  ", None), LineClass::Spinner);
    }

    #[test]
    fn test_inline_spinner_removed_from_content() {
        assert_eq!(
            classify_line("⠋ Thinking...⠙ Thinking...> Here you go", None),
            LineClass::Content("> Here you go".to_string())
        );
    }

    #[test]
    fn test_banner_lines() {
        let fixtures = [
            "╭──────────────────────────╮",
            "│ Did you know? You can use /compact │",
            "╰──────────────────────────╯",
            "Did you know? Agents can be switched with /agent",
            "Welcome to Kiro!",
            "Model: gpt-x",
            "model: claude-sonnet-4",
            "▸ Time: 12s",
            "Time: 3s",
            "Use /help for a list of commands",
            "ctrl + j for new lines",
            "⣴⣶⣦⡀⠀⣴⣶⣦",
        ];
        for line in fixtures {
            let class = classify_line(line, None);
            assert!(class.is_noise(), "{line:?} classified as {class:?}");
        }
    }

    #[test]
    fn test_table_rules_are_content() {
        for line in ["──────────", "├──────┼──────┤", "┌─ src ─┐"] {
            assert!(is_rule_line(line), "{line:?}");
            assert!(
                matches!(classify_line(line, None), LineClass::Content(_)),
                "{line:?}"
            );
        }
        assert!(!is_rule_line("│ cell │"));
        assert!(!is_rule_line("plain"));
    }

    #[test]
    fn test_prompt_lines() {
        assert_eq!(classify_line("[agent] > ", None), LineClass::PromptEcho);
        assert_eq!(classify_line("[pm_agent] >", None), LineClass::PromptEcho);
        assert_eq!(classify_line("!> ", None), LineClass::PromptEcho);
        assert_eq!(classify_line(">", None), LineClass::PromptEcho);
        assert_eq!(
            classify_line("[agent] > 안녕하세요", Some("안녕하세요")),
            LineClass::PromptEcho
        );
    }

    #[test]
    fn test_prompt_with_reply_keeps_reply() {
        assert_eq!(
            classify_line("[agent] > Sure, here it is", Some("list files")),
            LineClass::Content("Sure, here it is".to_string())
        );
    }

    #[test]
    fn test_content_lines() {
        assert_eq!(
            classify_line("a.txt", Some("list files")),
            LineClass::Content("a.txt".to_string())
        );
        assert_eq!(
            classify_line("    indented code  ", None),
            LineClass::Content("    indented code".to_string())
        );
        assert_eq!(classify_line("   ", None), LineClass::Blank);
    }

    #[test]
    fn test_echo_normalization() {
        assert_eq!(normalize_for_echo("List  Files!"), "listfiles");
        assert_eq!(normalize_for_echo("안녕 하세요?"), "안녕하세요");
        assert!(is_echo("list fi", "list files"));
        assert!(is_echo("> LIST FILES", "list files"));
        assert!(!is_echo("a.txt", "list files"));
        assert!(!is_echo("---", "list files"));
    }

    #[test]
    fn test_exact_echo() {
        assert!(is_exact_echo("[agent] > List files", "list files"));
        assert!(!is_exact_echo("list files in src", "list files"));
    }

    #[test]
    fn test_timing_marker_split() {
        assert_eq!(split_timing_marker("Hello there Time: 3s"), Some("Hello there "));
        assert_eq!(split_timing_marker("▸ Time: 2.5s  "), Some(""));
        assert_eq!(split_timing_marker("Time: 5s is the limit"), None);
        assert_eq!(split_timing_marker("plain"), None);
    }
}
