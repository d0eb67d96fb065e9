//! Line editor: keystroke-to-buffer translation with cursor
//! tracking under terminal auto-wrap, paste handling, and tab completion.

/// The terminal contract the editor is driven against: consumed, not
/// owned. A real implementation bridges to an xterm-like widget; `StdioTerminal`
/// in `src/bin/lifo.rs` bridges to a raw stdio TTY.
pub trait Terminal: Send + Sync {
    fn cols(&self) -> usize;
    fn write(&self, s: &str);
    fn clear(&self);
}

/// Completion result shape the completion engine returns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompletionResult {
    pub completions: Vec<String>,
    pub replacement_start: usize,
    pub replacement_end: usize,
    pub common_prefix: String,
}

/// A completion engine receives the current line/cursor/environment and
/// returns every candidate plus the replacement span.
pub trait CompletionEngine: Send + Sync {
    fn complete(&self, line: &str, cursor: usize) -> CompletionResult;
}

/// Editable command-line buffer with wrap-aware cursor tracking.
pub struct LineEditor {
    pub buffer: String,
    pub cursor: usize,
    screen_cursor_row: usize,
    raw_mode: bool,
    paste_queue: Vec<String>,
    completion_streak: u32,
}

impl Default for LineEditor {
    fn default() -> Self {
        Self::new()
    }
}

impl LineEditor {
    pub fn new() -> Self {
        Self {
            buffer: String::new(),
            cursor: 0,
            screen_cursor_row: 0,
            raw_mode: false,
            paste_queue: Vec::new(),
            completion_streak: 0,
        }
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
        self.cursor = 0;
        self.screen_cursor_row = 0;
        self.completion_streak = 0;
    }

    pub fn insert(&mut self, text: &str) {
        self.buffer.insert_str(self.cursor, text);
        self.cursor += text.len();
    }

    /// Backspace at column 0 is a no-op; no bell is required by spec.
    pub fn backspace(&mut self) -> bool {
        if self.cursor == 0 {
            return false;
        }
        let prev = self.buffer[..self.cursor]
            .char_indices()
            .last()
            .map(|(i, _)| i)
            .unwrap_or(0);
        self.buffer.replace_range(prev..self.cursor, "");
        self.cursor = prev;
        true
    }

    pub fn delete_forward(&mut self) -> bool {
        if self.cursor >= self.buffer.len() {
            return false;
        }
        let next = self.buffer[self.cursor..]
            .char_indices()
            .nth(1)
            .map(|(i, _)| self.cursor + i)
            .unwrap_or(self.buffer.len());
        self.buffer.replace_range(self.cursor..next, "");
        true
    }

    pub fn move_left(&mut self) {
        if self.cursor > 0 {
            self.cursor = self.buffer[..self.cursor]
                .char_indices()
                .last()
                .map(|(i, _)| i)
                .unwrap_or(0);
        }
    }

    pub fn move_right(&mut self) {
        if self.cursor < self.buffer.len() {
            self.cursor = self.buffer[self.cursor..]
                .char_indices()
                .nth(1)
                .map(|(i, _)| self.cursor + i)
                .unwrap_or(self.buffer.len());
        }
    }

    pub fn move_home(&mut self) {
        self.cursor = 0;
    }

    pub fn move_end(&mut self) {
        self.cursor = self.buffer.len();
    }

    /// Ctrl-U: clear from start of buffer to cursor.
    pub fn clear_to_start(&mut self) {
        self.buffer.replace_range(0..self.cursor, "");
        self.cursor = 0;
    }

    /// Computes the redraw sequence: move up
    /// `screen_cursor_row` rows, `\r`, clear to end of screen, reprint
    /// `prompt + buffer`, then reposition the cursor to its wrapped row/col.
    pub fn redraw_sequence(&mut self, prompt: &str, cols: usize) -> String {
        let mut out = String::new();
        if self.screen_cursor_row > 0 {
            out.push_str(&format!("\x1b[{}A", self.screen_cursor_row));
        }
        out.push('\r');
        out.push_str("\x1b[J");
        out.push_str(prompt);
        out.push_str(&self.buffer);

        let total_len = prompt.chars().count() + self.buffer.chars().count();
        let cursor_abs = prompt.chars().count() + self.buffer[..self.cursor].chars().count();

        let end_row = wrapped_row(total_len, cols);
        let cursor_row = wrapped_row(cursor_abs, cols);
        let cursor_col = cursor_abs - cursor_row * cols;

        if end_row > cursor_row {
            out.push_str(&format!("\x1b[{}A", end_row - cursor_row));
        }
        out.push('\r');
        if cursor_col > 0 {
            out.push_str(&format!("\x1b[{}C", cursor_col));
        }

        self.screen_cursor_row = cursor_row;
        out
    }

    /// Feed pasted/typed input. If it's multi-line, only the first line is
    /// appended to the live buffer; the rest is queued for sequential
    /// execution (drained by the caller after each returned line completes).
    pub fn feed(&mut self, data: &str) -> Option<String> {
        if data.len() > 1 && (data.contains('\n') || data.contains('\r')) {
            let mut lines: Vec<String> = data.split(['\n', '\r']).map(str::to_string).collect();
            if lines.is_empty() {
                return None;
            }
            let first = lines.remove(0);
            self.insert(&first);
            self.paste_queue.extend(lines);
            None
        } else {
            self.insert(data);
            None
        }
    }

    pub fn drain_paste_queue(&mut self) -> Option<String> {
        if self.paste_queue.is_empty() {
            None
        } else {
            Some(self.paste_queue.remove(0))
        }
    }

    pub fn enter_raw_mode(&mut self) {
        self.raw_mode = true;
    }

    pub fn exit_raw_mode(&mut self) {
        self.raw_mode = false;
    }

    pub fn is_raw_mode(&self) -> bool {
        self.raw_mode
    }

    /// Apply the completion policy: zero candidates bells, one
    /// inserts (with a trailing space, or `/` for a directory-looking entry),
    /// many with a longer common prefix extends to it, many without
    /// extension prints the list only on the second consecutive Tab.
    pub fn apply_completion(&mut self, result: &CompletionResult) -> CompletionOutcome {
        match result.completions.len() {
            0 => {
                self.completion_streak = 0;
                CompletionOutcome::Bell
            }
            1 => {
                self.completion_streak = 0;
                let candidate = &result.completions[0];
                let suffix = if candidate.ends_with('/') { "" } else { " " };
                self.replace_span(result.replacement_start, result.replacement_end, candidate);
                self.insert(suffix);
                CompletionOutcome::Inserted
            }
            _ => {
                let current = &self.buffer[result.replacement_start..result.replacement_end];
                if result.common_prefix.len() > current.len() {
                    self.completion_streak = 0;
                    self.replace_span(result.replacement_start, result.replacement_end, &result.common_prefix);
                    CompletionOutcome::Inserted
                } else {
                    self.completion_streak += 1;
                    if self.completion_streak >= 2 {
                        self.completion_streak = 0;
                        CompletionOutcome::ShowList(result.completions.clone())
                    } else {
                        CompletionOutcome::Bell
                    }
                }
            }
        }
    }

    fn replace_span(&mut self, start: usize, end: usize, replacement: &str) {
        self.buffer.replace_range(start..end, replacement);
        self.cursor = start + replacement.len();
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionOutcome {
    Bell,
    Inserted,
    ShowList(Vec<String>),
}

fn wrapped_row(len: usize, cols: usize) -> usize {
    if cols == 0 {
        return 0;
    }
    if len > 0 && len % cols == 0 {
        len / cols - 1
    } else {
        len / cols
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_backspace() {
        let mut e = LineEditor::new();
        e.insert("hello");
        assert_eq!(e.buffer, "hello");
        assert!(e.backspace());
        assert_eq!(e.buffer, "hell");
    }

    #[test]
    fn backspace_at_column_zero_is_noop() {
        let mut e = LineEditor::new();
        assert!(!e.backspace());
        assert_eq!(e.buffer, "");
    }

    #[test]
    fn paste_with_newlines_queues_remaining_lines() {
        let mut e = LineEditor::new();
        e.feed("one\ntwo\nthree");
        assert_eq!(e.buffer, "one");
        assert_eq!(e.drain_paste_queue(), Some("two".to_string()));
        assert_eq!(e.drain_paste_queue(), Some("three".to_string()));
        assert_eq!(e.drain_paste_queue(), None);
    }

    #[test]
    fn completion_with_one_candidate_inserts_with_space() {
        let mut e = LineEditor::new();
        e.insert("ec");
        let result = CompletionResult {
            completions: vec!["echo".to_string()],
            replacement_start: 0,
            replacement_end: 2,
            common_prefix: "echo".to_string(),
        };
        let outcome = e.apply_completion(&result);
        assert_eq!(outcome, CompletionOutcome::Inserted);
        assert_eq!(e.buffer, "echo ");
    }

    #[test]
    fn completion_with_zero_candidates_bells() {
        let mut e = LineEditor::new();
        let result = CompletionResult::default();
        assert_eq!(e.apply_completion(&result), CompletionOutcome::Bell);
    }

    #[test]
    fn completion_shows_list_on_second_tab() {
        let mut e = LineEditor::new();
        e.insert("e");
        let result = CompletionResult {
            completions: vec!["echo".to_string(), "export".to_string()],
            replacement_start: 0,
            replacement_end: 1,
            common_prefix: "e".to_string(),
        };
        assert_eq!(e.apply_completion(&result), CompletionOutcome::Bell);
        match e.apply_completion(&result) {
            CompletionOutcome::ShowList(list) => assert_eq!(list.len(), 2),
            other => panic!("expected ShowList, got {other:?}"),
        }
    }

    #[test]
    fn wrapped_row_handles_boundary() {
        assert_eq!(wrapped_row(80, 80), 0);
        assert_eq!(wrapped_row(81, 80), 1);
        assert_eq!(wrapped_row(160, 80), 1);
    }
}
