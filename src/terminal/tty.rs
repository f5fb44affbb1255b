//! Single-line terminal renderer
//!
//! When the CLI runs on a pseudo-terminal it redraws spinners and status text
//! in place with `\r`, backspace and erase-in-line. Stripping those sequences
//! would glue every redraw together, so this renderer keeps a cell buffer for
//! the current line and applies the cursor movement instead. A line is
//! released only once its newline arrives.

use super::StreamNormalizer;
use unicode_width::UnicodeWidthChar;
use vte::{Params, Parser, Perform};

/// Tab stop interval
const TAB_WIDTH: usize = 8;

/// Furthest column cursor movement may reach past the drawn text
const MAX_COLUMNS: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cell {
    Char(char),
    /// Right half of a double-width character
    Spacer,
}

/// The line currently being drawn plus finished lines not yet handed out
#[derive(Debug, Default)]
struct LineScreen {
    cells: Vec<Cell>,
    cursor: usize,
    completed: String,
}

impl LineScreen {
    fn render(&self) -> String {
        let line: String = self
            .cells
            .iter()
            .filter_map(|cell| match cell {
                Cell::Char(c) => Some(*c),
                Cell::Spacer => None,
            })
            .collect();
        line.trim_end().to_string()
    }

    fn commit_line(&mut self) {
        let line = self.render();
        self.completed.push_str(&line);
        self.completed.push('\n');
        self.cells.clear();
        self.cursor = 0;
    }

    /// Move the cursor, never beyond the drawn text or `MAX_COLUMNS`
    fn move_to(&mut self, col: usize) {
        self.cursor = col.min(self.cells.len().max(MAX_COLUMNS));
    }

    fn pad_to(&mut self, len: usize) {
        if self.cells.len() < len {
            self.cells.resize(len, Cell::Char(' '));
        }
    }

    /// Blank out the other half of a wide character about to be overwritten
    fn clear_wide_at(&mut self, col: usize) {
        match self.cells.get(col) {
            Some(Cell::Spacer) if col > 0 => self.cells[col - 1] = Cell::Char(' '),
            Some(Cell::Char(_)) => {
                if let Some(Cell::Spacer) = self.cells.get(col + 1) {
                    self.cells[col + 1] = Cell::Char(' ');
                }
            }
            _ => {}
        }
    }

    fn put_char(&mut self, c: char, width: usize) {
        self.pad_to(self.cursor + width);
        self.clear_wide_at(self.cursor);
        if width == 2 {
            self.clear_wide_at(self.cursor + 1);
        }
        self.cells[self.cursor] = Cell::Char(c);
        if width == 2 {
            self.cells[self.cursor + 1] = Cell::Spacer;
        }
        self.cursor += width;
    }

    fn erase_in_line(&mut self, mode: u16) {
        match mode {
            0 => self.cells.truncate(self.cursor),
            1 => {
                let end = (self.cursor + 1).min(self.cells.len());
                for cell in &mut self.cells[..end] {
                    *cell = Cell::Char(' ');
                }
            }
            2 => self.cells.clear(),
            _ => {}
        }
    }
}

fn first_param(params: &Params) -> u16 {
    params
        .iter()
        .next()
        .and_then(|param| param.first())
        .copied()
        .unwrap_or(0)
}

impl Perform for LineScreen {
    fn print(&mut self, c: char) {
        let c = if c == '\u{a0}' { ' ' } else { c };
        if c.is_control() {
            return;
        }
        match c.width() {
            Some(width @ 1..=2) => self.put_char(c, width),
            // Zero-width marks have no cell of their own
            _ => {}
        }
    }

    fn execute(&mut self, byte: u8) {
        match byte {
            b'\n' => self.commit_line(),
            b'\r' => self.cursor = 0,
            b'\x08' => self.cursor = self.cursor.saturating_sub(1),
            b'\t' => {
                self.move_to((self.cursor / TAB_WIDTH + 1) * TAB_WIDTH);
                self.pad_to(self.cursor);
            }
            _ => {}
        }
    }

    fn hook(&mut self, _params: &Params, _intermediates: &[u8], _ignore: bool, _action: char) {}

    fn put(&mut self, _byte: u8) {}

    fn unhook(&mut self) {}

    fn osc_dispatch(&mut self, _params: &[&[u8]], _bell_terminated: bool) {}

    fn csi_dispatch(&mut self, params: &Params, intermediates: &[u8], _ignore: bool, action: char) {
        // Private modes (CSI ? ...) never touch the line contents
        if !intermediates.is_empty() {
            return;
        }

        let n = first_param(params);
        let count = usize::from(n.max(1));
        match action {
            'K' => self.erase_in_line(n),
            'C' => self.move_to(self.cursor.saturating_add(count)),
            'D' => self.cursor = self.cursor.saturating_sub(count),
            'G' => self.move_to(count - 1),
            // Erase in display: the current line goes with it
            'J' if n == 2 => {
                self.cells.clear();
                self.cursor = 0;
            }
            _ => {}
        }
    }

    fn esc_dispatch(&mut self, _intermediates: &[u8], _ignore: bool, _byte: u8) {}
}

/// Normalizer for pseudo-terminal output.
///
/// `feed` returns only completed lines (each terminated by `\n`); the line
/// under the cursor is held until its newline arrives or [`flush`] is called.
///
/// [`flush`]: StreamNormalizer::flush
pub struct TtyLineRenderer {
    parser: Parser,
    screen: LineScreen,
}

impl TtyLineRenderer {
    pub fn new() -> Self {
        Self {
            parser: Parser::new(),
            screen: LineScreen::default(),
        }
    }

    /// The current, not yet terminated line as it would appear on screen
    pub fn pending_line(&self) -> String {
        self.screen.render()
    }
}

impl StreamNormalizer for TtyLineRenderer {
    fn feed(&mut self, chunk: &[u8]) -> String {
        for byte in chunk {
            self.parser.advance(&mut self.screen, *byte);
        }
        std::mem::take(&mut self.screen.completed)
    }

    fn flush(&mut self) -> String {
        let mut out = std::mem::take(&mut self.screen.completed);
        out.push_str(&self.screen.render());
        self.screen.cells.clear();
        self.screen.cursor = 0;
        out
    }

    fn reset(&mut self) {
        self.parser = Parser::new();
        self.screen = LineScreen::default();
    }
}

impl Default for TtyLineRenderer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn render(input: &str) -> String {
        let mut renderer = TtyLineRenderer::new();
        let mut out = renderer.feed(input.as_bytes());
        out.push_str(&renderer.flush());
        out
    }

    #[test]
    fn test_carriage_return_overwrites() {
        assert_eq!(render("⠋ Thinking...\r> Hello\x1b[K\n"), "> Hello\n");
        assert_eq!(render("50%\r100%\n"), "100%\n");
    }

    #[test]
    fn test_spinner_redraws_collapse() {
        let input = "⠋ Thinking...\r⠙ Thinking...\r⠹ Thinking...\r\x1b[2K";
        assert_eq!(render(input), "");
    }

    #[test]
    fn test_backspace_moves_left() {
        assert_eq!(render("abc\x08\x08X\n"), "aXc\n");
        assert_eq!(render("ab\x08 \x08\n"), "a\n");
    }

    #[test]
    fn test_partial_line_held_until_newline() {
        let mut renderer = TtyLineRenderer::new();
        assert_eq!(renderer.feed(b"first\nsec"), "first\n");
        assert_eq!(renderer.pending_line(), "sec");
        assert_eq!(renderer.feed(b"ond\n"), "second\n");
        assert_eq!(renderer.flush(), "");
    }

    #[test]
    fn test_wide_characters() {
        assert_eq!(render("안녕\x1b[2Db\n"), "안b\n");
        assert_eq!(render("ab\x1b[1G한\n"), "한\n");
    }

    #[test]
    fn test_cursor_forward_pads() {
        assert_eq!(render("a\x1b[3Cb\n"), "a   b\n");
        assert_eq!(render("a\tb\n"), "a       b\n");
    }

    #[test]
    fn test_cursor_movement_is_bounded() {
        let mut renderer = TtyLineRenderer::new();
        let flood = "\x1b[65535C".repeat(1000) + "x";
        renderer.feed(flood.as_bytes());
        assert_eq!(renderer.pending_line().chars().count(), MAX_COLUMNS + 1);

        let mut renderer = TtyLineRenderer::new();
        renderer.feed(b"\x1b[9999Gy");
        assert_eq!(renderer.pending_line().chars().count(), MAX_COLUMNS + 1);

        // Long drawn lines keep their cursor range
        let long = "a".repeat(MAX_COLUMNS + 10);
        let expected = format!("{}baaaa\n", "a".repeat(MAX_COLUMNS + 5));
        assert_eq!(render(&format!("{long}\x1b[5Db\n")), expected);
    }

    #[test]
    fn test_colors_ignored() {
        assert_eq!(render("\x1b[32m> \x1b[0mok\r\n"), "> ok\n");
    }
}
