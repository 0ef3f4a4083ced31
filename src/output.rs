//! Thread-safe, position-indexed multi-line progress output.
//!
//! Each container gets its own line in the terminal. When stdout is a tty,
//! the manager repositions the cursor to update a line in place; otherwise
//! (piped output, CI logs) it falls back to committing a new plain line per
//! update, the way the upstream tool degrades for non-interactive use.

use std::io::{self, Write};
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

struct Lines {
    committed: Vec<String>,
    cursor_row: usize,
}

pub struct OutputManager {
    lines: Mutex<Lines>,
    next_position: AtomicUsize,
    interactive: bool,
}

impl OutputManager {
    pub fn new() -> Self {
        Self {
            lines: Mutex::new(Lines { committed: Vec::new(), cursor_row: 0 }),
            next_position: AtomicUsize::new(0),
            interactive: is_tty(),
        }
    }

    /// Reserve the next line position and return a formatter bound to it.
    pub fn formatter(self: &std::sync::Arc<Self>, prefix: impl Into<String>) -> OutputFormatter {
        let position = self.next_position.fetch_add(1, Ordering::SeqCst);
        {
            let mut lines = self.lines.lock();
            while lines.committed.len() <= position {
                lines.committed.push(String::new());
            }
        }
        OutputFormatter {
            manager: self.clone(),
            position,
            prefix: prefix.into(),
        }
    }

    fn render_line(&self, position: usize, prefix: &str, text: &str) {
        let line = format!("{}: {}", prefix, strip_ansi(text));
        let mut lines = self.lines.lock();
        lines.committed[position] = line.clone();

        if self.interactive {
            let mut stdout = io::stdout();
            let rows_up = lines.cursor_row.saturating_sub(position);
            if rows_up > 0 {
                let _ = write!(stdout, "\x1b[{}A", rows_up);
            } else if position > lines.cursor_row {
                let _ = write!(stdout, "{}", "\n".repeat(position - lines.cursor_row));
            }
            let _ = write!(stdout, "\r\x1b[K{}", line);
            let rows_down = lines.committed.len().saturating_sub(1).saturating_sub(position);
            if rows_down > 0 {
                let _ = write!(stdout, "\x1b[{}B", rows_down);
            }
            let _ = writeln!(stdout);
            lines.cursor_row = lines.committed.len();
            let _ = stdout.flush();
        } else {
            println!("{}", line);
        }
    }
}

impl Default for OutputManager {
    fn default() -> Self {
        Self::new()
    }
}

fn is_tty() -> bool {
    use std::io::IsTerminal;
    io::stdout().is_terminal()
}

fn strip_ansi(input: &str) -> String {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\x1b' {
            while let Some(&next) = chars.peek() {
                chars.next();
                if next.is_ascii_alphabetic() {
                    break;
                }
            }
        } else {
            output.push(c);
        }
    }
    output
}

/// A per-container handle into an [`OutputManager`]: `pending` reports an
/// in-progress step, `commit` finalizes the line with a terminal result.
pub struct OutputFormatter {
    manager: std::sync::Arc<OutputManager>,
    position: usize,
    prefix: String,
}

impl OutputFormatter {
    pub fn pending(&self, text: &str) {
        self.manager.render_line(self.position, &self.prefix, text);
    }

    pub fn commit(&self, text: &str) {
        self.manager.render_line(self.position, &self.prefix, text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn formatters_get_distinct_positions() {
        let manager = Arc::new(OutputManager::new());
        let a = manager.formatter("a");
        let b = manager.formatter("b");
        assert_ne!(a.position, b.position);
    }

    #[test]
    fn strip_ansi_removes_escape_sequences() {
        assert_eq!(strip_ansi("\x1b[32mgreen\x1b[0m"), "green");
    }
}
