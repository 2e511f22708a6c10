use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
#[cfg(unix)]
use std::os::fd::AsRawFd;

use anyhow::Result;
use crossterm::{
    cursor,
    event::{self, Event, KeyCode, KeyEvent, KeyModifiers},
    queue,
    style::Print,
    terminal::{self, ClearType},
};

use super::buffer::LineBuffer;
use super::completer::{insertion_for, Completer};
use super::config::ReadlineConfig;
use super::hinter::Hinter;
use super::history::History;

/// Control flow for key event handling
enum ControlFlow {
    Continue,
    Submit,
    Eof,
}

/// Calculate the visible width of a string, excluding ANSI escape sequences.
///
/// ANSI codes like `\x1b[1;32m` (colors, bold, etc.) don't take up space on
/// the terminal, but are counted by `.chars().count()`. This function strips
/// them to get the actual display width.
pub fn visible_width(s: &str) -> usize {
    let mut count = 0;
    let mut chars = s.chars();

    while let Some(ch) = chars.next() {
        if ch == '\x1b' {
            if chars.as_str().starts_with('[') {
                // CSI sequence: skip until the command letter
                chars.next(); // consume '['
                for c in chars.by_ref() {
                    if c.is_ascii_alphabetic() {
                        break;
                    }
                }
            } else {
                // Simple escape sequence, skip next char
                chars.next();
            }
        } else {
            count += 1;
        }
    }

    count
}

/// Line editor: one `read_line` call reads one line with editing, history
/// navigation, and completion.
///
/// Each call runs a fresh editing session: keystrokes mutate the line
/// buffer until Enter submits it (`Ok(Some(line))`) or end-of-input arrives
/// on an empty buffer (`Ok(None)`, distinct from an accepted empty line).
/// When stdin is not a terminal, or input has been redirected with
/// [`LineEditor::set_input`], the editor degrades to plain buffered reading
/// with the prompt still written.
pub struct LineEditor {
    buffer: LineBuffer,
    history_pos: Option<usize>,
    saved_buffer: Option<String>,
    config: ReadlineConfig,
    hinter: Hinter,
    completer: Completer,
    input: Option<BufReader<File>>,
    output: Option<File>,
}

impl LineEditor {
    pub fn new(config: ReadlineConfig, hinter: Hinter) -> Self {
        Self {
            buffer: LineBuffer::new(),
            history_pos: None,
            saved_buffer: None,
            config,
            hinter,
            completer: Completer::new(),
            input: None,
            output: None,
        }
    }

    /// The completion engine, for registering a generator and configuring
    /// word-break characters.
    pub fn completer(&self) -> &Completer {
        &self.completer
    }

    pub fn completer_mut(&mut self) -> &mut Completer {
        &mut self.completer
    }

    /// Read-only view of the in-progress line, for context-sensitive
    /// completion logic.
    pub fn buffer(&self) -> &LineBuffer {
        &self.buffer
    }

    /// Redirect input to `file`. Keeps the current reader when the
    /// descriptor is unchanged; replacing it would discard bytes already
    /// buffered but not yet consumed.
    pub fn set_input(&mut self, file: File) {
        #[cfg(unix)]
        if self
            .input
            .as_ref()
            .is_some_and(|r| r.get_ref().as_raw_fd() == file.as_raw_fd())
        {
            return;
        }
        self.input = Some(BufReader::new(file));
    }

    /// Read from stdin again.
    pub fn clear_input(&mut self) {
        self.input = None;
    }

    /// Redirect prompt and echo output to `file`. Rebinds only when the
    /// descriptor differs from the currently bound one.
    pub fn set_output(&mut self, file: File) {
        #[cfg(unix)]
        if self
            .output
            .as_ref()
            .is_some_and(|f| f.as_raw_fd() == file.as_raw_fd())
        {
            return;
        }
        self.output = Some(file);
    }

    /// Write to stdout again.
    pub fn clear_output(&mut self) {
        self.output = None;
    }

    /// Read one line. `Ok(None)` signals end of input with nothing typed.
    pub fn read_line(&mut self, prompt: &str, history: &History) -> Result<Option<String>> {
        if self.input.is_some() || !crossterm::tty::IsTty::is_tty(&io::stdin()) {
            return self.read_line_plain(prompt);
        }
        terminal::enable_raw_mode()?;
        let result = self.read_line_raw(prompt, history);
        let _ = terminal::disable_raw_mode();
        result
    }

    /// Plain reading for redirected input and non-interactive stdin
    /// (pipes, tests).
    fn read_line_plain(&mut self, prompt: &str) -> Result<Option<String>> {
        self.write_out(prompt)?;

        let mut line = String::new();
        let n = match self.input.as_mut() {
            Some(reader) => reader.read_line(&mut line)?,
            None => io::stdin().lock().read_line(&mut line)?,
        };
        if n == 0 {
            return Ok(None);
        }

        // Trim the newline but preserve leading/trailing spaces
        if line.ends_with('\n') {
            line.pop();
            if line.ends_with('\r') {
                line.pop();
            }
        }

        Ok(Some(line))
    }

    fn read_line_raw(&mut self, prompt: &str, history: &History) -> Result<Option<String>> {
        self.buffer.clear();
        self.history_pos = None;
        self.saved_buffer = None;

        self.render(prompt, history)?;

        loop {
            match event::read()? {
                Event::Key(key_event) => match self.handle_key(key_event, history) {
                    ControlFlow::Continue => {
                        self.render(prompt, history)?;
                    }
                    ControlFlow::Submit => {
                        // Leave the edited line on screen (raw mode needs \r\n)
                        self.write_out("\r\n")?;
                        return Ok(Some(self.buffer.text().to_string()));
                    }
                    ControlFlow::Eof => {
                        self.write_out("\r\n")?;
                        return Ok(None);
                    }
                },
                // Redraw after a resize; queued keystrokes stay pending on
                // the same event stream.
                Event::Resize(_, _) => {
                    self.render(prompt, history)?;
                }
                _ => {}
            }
        }
    }

    fn handle_key(&mut self, key: KeyEvent, history: &History) -> ControlFlow {
        match (key.code, key.modifiers) {
            // Enter - submit line
            (KeyCode::Enter, _) => ControlFlow::Submit,

            // Ctrl-C - clear line, or EOF if empty
            (KeyCode::Char('c'), KeyModifiers::CONTROL) => {
                if self.buffer.is_empty() {
                    ControlFlow::Eof
                } else {
                    self.buffer.clear();
                    self.history_pos = None;
                    ControlFlow::Continue
                }
            }

            // Ctrl-D - EOF if empty, else delete char at cursor
            (KeyCode::Char('d'), KeyModifiers::CONTROL) => {
                if self.buffer.is_empty() {
                    ControlFlow::Eof
                } else {
                    self.buffer.delete();
                    ControlFlow::Continue
                }
            }

            // Ctrl-A - move to start of line
            (KeyCode::Char('a'), KeyModifiers::CONTROL) | (KeyCode::Home, _) => {
                self.buffer.move_home();
                ControlFlow::Continue
            }

            // Ctrl-E - move to end of line
            (KeyCode::Char('e'), KeyModifiers::CONTROL) | (KeyCode::End, _) => {
                self.buffer.move_end();
                ControlFlow::Continue
            }

            // Ctrl-U - clear line before cursor
            (KeyCode::Char('u'), KeyModifiers::CONTROL) => {
                self.buffer.kill_to_start();
                ControlFlow::Continue
            }

            // Ctrl-K - clear line after cursor
            (KeyCode::Char('k'), KeyModifiers::CONTROL) => {
                self.buffer.kill_to_end();
                ControlFlow::Continue
            }

            // Ctrl-W - delete word before cursor
            (KeyCode::Char('w'), KeyModifiers::CONTROL) => {
                self.buffer.delete_word();
                ControlFlow::Continue
            }

            // Arrow Up - previous history
            (KeyCode::Up, _) => {
                self.history_prev(history);
                ControlFlow::Continue
            }

            // Arrow Down - next history
            (KeyCode::Down, _) => {
                self.history_next(history);
                ControlFlow::Continue
            }

            // Arrow Left - move cursor left
            (KeyCode::Left, _) => {
                self.buffer.move_left();
                ControlFlow::Continue
            }

            // Arrow Right - accept hint at end of line, else move right
            (KeyCode::Right, _) => {
                if self.buffer.at_end() && self.config.enable_hints {
                    if let Some(hint) = self.hinter.hint(self.buffer.text(), history) {
                        self.buffer.insert_str(&hint);
                        return ControlFlow::Continue;
                    }
                }
                self.buffer.move_right();
                ControlFlow::Continue
            }

            // Backspace - delete char before cursor
            (KeyCode::Backspace, _) => {
                self.buffer.backspace();
                ControlFlow::Continue
            }

            // Delete - delete char at cursor
            (KeyCode::Delete, _) => {
                self.buffer.delete();
                ControlFlow::Continue
            }

            // Tab - run a completion session on the partial word
            (KeyCode::Tab, _) => {
                if self.config.enable_completion {
                    self.complete();
                } else {
                    self.buffer.insert('\t');
                }
                ControlFlow::Continue
            }

            // Regular character - insert at cursor
            (KeyCode::Char(c), KeyModifiers::NONE | KeyModifiers::SHIFT) => {
                self.buffer.insert(c);
                ControlFlow::Continue
            }

            // Ignore other key combinations
            _ => ControlFlow::Continue,
        }
    }

    /// One completion trigger: extract the partial word, run the generator
    /// session, and apply the outcome (sole candidate verbatim, or the
    /// common prefix when it extends the word). With several candidates and
    /// no longer prefix the line is left as typed; the candidate list stays
    /// queryable on the completer.
    fn complete(&mut self) {
        let breaks = self.completer.word_break_chars().to_string();
        let word = self.buffer.word(&breaks).to_string();
        let candidates = self.completer.complete_word(&word);
        if let Some(insertion) = insertion_for(&word, &candidates) {
            self.buffer.replace_word(&breaks, &insertion);
        }
    }

    fn history_prev(&mut self, history: &History) {
        if history.is_empty() {
            return;
        }

        // Save current line on first history navigation
        if self.history_pos.is_none() {
            self.saved_buffer = Some(self.buffer.text().to_string());
        }

        let new_pos = match self.history_pos {
            None => history.len() - 1,
            Some(pos) if pos > 0 => pos - 1,
            Some(_) => return, // Already at oldest
        };

        self.history_pos = Some(new_pos);
        if let Ok(line) = history.get(new_pos as isize) {
            self.buffer.set(line.to_string());
        }
    }

    fn history_next(&mut self, history: &History) {
        match self.history_pos {
            None => {} // Not in history navigation
            Some(pos) if pos + 1 < history.len() => {
                let new_pos = pos + 1;
                self.history_pos = Some(new_pos);
                if let Ok(line) = history.get(new_pos as isize) {
                    self.buffer.set(line.to_string());
                }
            }
            Some(_) => {
                // Reached newest, restore the saved line
                self.history_pos = None;
                if let Some(saved) = self.saved_buffer.take() {
                    self.buffer.set(saved);
                }
            }
        }
    }

    fn write_out(&mut self, s: &str) -> Result<()> {
        match self.output.as_mut() {
            Some(file) => {
                file.write_all(s.as_bytes())?;
                file.flush()?;
            }
            None => {
                let mut stdout = io::stdout();
                stdout.write_all(s.as_bytes())?;
                stdout.flush()?;
            }
        }
        Ok(())
    }

    fn render(&mut self, prompt: &str, history: &History) -> Result<()> {
        let hint = if self.config.enable_hints && self.buffer.at_end() {
            self.hinter
                .hint(self.buffer.text(), history)
                .map(|h| self.hinter.paint(&h))
        } else {
            None
        };
        let cursor_col = visible_width(prompt) + self.buffer.cursor_chars();

        match self.output.as_mut() {
            Some(file) => render_to(file, prompt, self.buffer.text(), hint, cursor_col),
            None => render_to(&mut io::stdout(), prompt, self.buffer.text(), hint, cursor_col),
        }
    }
}

fn render_to(
    out: &mut impl Write,
    prompt: &str,
    line: &str,
    hint: Option<String>,
    cursor_col: usize,
) -> Result<()> {
    queue!(
        out,
        cursor::MoveToColumn(0),
        terminal::Clear(ClearType::CurrentLine),
        Print(prompt),
        Print(line),
    )?;
    if let Some(hint) = hint {
        queue!(out, Print(hint))?;
    }
    queue!(out, cursor::MoveToColumn(cursor_col as u16))?;
    out.flush()?;
    Ok(())
}

impl Drop for LineEditor {
    fn drop(&mut self) {
        // Ensure raw mode is disabled
        let _ = terminal::disable_raw_mode();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::ColorConfig;

    fn create_test_editor() -> LineEditor {
        let config = ReadlineConfig::default();
        let hinter = Hinter::new(ColorConfig::default());
        LineEditor::new(config, hinter)
    }

    fn create_test_history() -> History {
        let mut history = History::new();
        history.add("echo first");
        history.add("echo second");
        history.add("echo third");
        history
    }

    fn press(editor: &mut LineEditor, history: &History, code: KeyCode) -> ControlFlow {
        editor.handle_key(KeyEvent::new(code, KeyModifiers::NONE), history)
    }

    fn press_ctrl(editor: &mut LineEditor, history: &History, c: char) -> ControlFlow {
        editor.handle_key(KeyEvent::new(KeyCode::Char(c), KeyModifiers::CONTROL), history)
    }

    fn type_str(editor: &mut LineEditor, history: &History, s: &str) {
        for c in s.chars() {
            press(editor, history, KeyCode::Char(c));
        }
    }

    #[test]
    fn test_editor_initialization() {
        let editor = create_test_editor();
        assert_eq!(editor.buffer().text(), "");
        assert_eq!(editor.buffer().cursor(), 0);
        assert_eq!(editor.history_pos, None);
        assert_eq!(editor.saved_buffer, None);
    }

    #[test]
    fn test_typing_inserts_at_cursor() {
        let mut editor = create_test_editor();
        let history = History::new();

        type_str(&mut editor, &history, "hllo");
        press(&mut editor, &history, KeyCode::Home);
        press(&mut editor, &history, KeyCode::Right);
        press(&mut editor, &history, KeyCode::Char('e'));

        assert_eq!(editor.buffer().text(), "hello");
        assert_eq!(editor.buffer().cursor(), 2);
    }

    #[test]
    fn test_handle_key_enter() {
        let mut editor = create_test_editor();
        let history = History::new();

        type_str(&mut editor, &history, "test command");
        assert!(matches!(
            press(&mut editor, &history, KeyCode::Enter),
            ControlFlow::Submit
        ));
    }

    #[test]
    fn test_ctrl_c_clears_buffer() {
        let mut editor = create_test_editor();
        let history = History::new();

        type_str(&mut editor, &history, "test command");
        let flow = press_ctrl(&mut editor, &history, 'c');

        assert_eq!(editor.buffer().text(), "");
        assert!(matches!(flow, ControlFlow::Continue));
    }

    #[test]
    fn test_ctrl_c_on_empty_is_eof() {
        let mut editor = create_test_editor();
        let history = History::new();

        assert!(matches!(
            press_ctrl(&mut editor, &history, 'c'),
            ControlFlow::Eof
        ));
    }

    #[test]
    fn test_ctrl_d_on_empty_is_eof() {
        let mut editor = create_test_editor();
        let history = History::new();

        assert!(matches!(
            press_ctrl(&mut editor, &history, 'd'),
            ControlFlow::Eof
        ));
    }

    #[test]
    fn test_ctrl_d_deletes_at_cursor() {
        let mut editor = create_test_editor();
        let history = History::new();

        type_str(&mut editor, &history, "hello");
        press(&mut editor, &history, KeyCode::Home);
        press(&mut editor, &history, KeyCode::Right);
        press(&mut editor, &history, KeyCode::Right);
        let flow = press_ctrl(&mut editor, &history, 'd');

        assert_eq!(editor.buffer().text(), "helo");
        assert!(matches!(flow, ControlFlow::Continue));
    }

    #[test]
    fn test_ctrl_a_and_ctrl_e() {
        let mut editor = create_test_editor();
        let history = History::new();

        type_str(&mut editor, &history, "hello");
        press_ctrl(&mut editor, &history, 'a');
        assert_eq!(editor.buffer().cursor(), 0);
        press_ctrl(&mut editor, &history, 'e');
        assert_eq!(editor.buffer().cursor(), 5);
    }

    #[test]
    fn test_ctrl_u_clears_before_cursor() {
        let mut editor = create_test_editor();
        let history = History::new();

        type_str(&mut editor, &history, "hello world");
        for _ in 0..5 {
            press(&mut editor, &history, KeyCode::Left);
        }
        press_ctrl(&mut editor, &history, 'u');

        assert_eq!(editor.buffer().text(), "world");
        assert_eq!(editor.buffer().cursor(), 0);
    }

    #[test]
    fn test_ctrl_k_clears_after_cursor() {
        let mut editor = create_test_editor();
        let history = History::new();

        type_str(&mut editor, &history, "hello world");
        for _ in 0..6 {
            press(&mut editor, &history, KeyCode::Left);
        }
        press_ctrl(&mut editor, &history, 'k');

        assert_eq!(editor.buffer().text(), "hello");
    }

    #[test]
    fn test_ctrl_w_deletes_word() {
        let mut editor = create_test_editor();
        let history = History::new();

        type_str(&mut editor, &history, "echo hello world");
        press_ctrl(&mut editor, &history, 'w');

        assert_eq!(editor.buffer().text(), "echo hello ");
    }

    #[test]
    fn test_backspace_and_delete() {
        let mut editor = create_test_editor();
        let history = History::new();

        type_str(&mut editor, &history, "hello");
        press(&mut editor, &history, KeyCode::Backspace);
        assert_eq!(editor.buffer().text(), "hell");

        press(&mut editor, &history, KeyCode::Home);
        press(&mut editor, &history, KeyCode::Delete);
        assert_eq!(editor.buffer().text(), "ell");
    }

    #[test]
    fn test_history_prev_navigation() {
        let mut editor = create_test_editor();
        let history = create_test_history();

        press(&mut editor, &history, KeyCode::Up);
        assert_eq!(editor.buffer().text(), "echo third");
        assert_eq!(editor.history_pos, Some(2));
        assert_eq!(editor.buffer().cursor(), 10); // Cursor at end

        press(&mut editor, &history, KeyCode::Up);
        assert_eq!(editor.buffer().text(), "echo second");

        press(&mut editor, &history, KeyCode::Up);
        assert_eq!(editor.buffer().text(), "echo first");
        assert_eq!(editor.history_pos, Some(0));

        // Should not go past the oldest
        press(&mut editor, &history, KeyCode::Up);
        assert_eq!(editor.buffer().text(), "echo first");
        assert_eq!(editor.history_pos, Some(0));
    }

    #[test]
    fn test_history_next_navigation() {
        let mut editor = create_test_editor();
        let history = create_test_history();

        for _ in 0..3 {
            press(&mut editor, &history, KeyCode::Up);
        }
        assert_eq!(editor.buffer().text(), "echo first");

        press(&mut editor, &history, KeyCode::Down);
        assert_eq!(editor.buffer().text(), "echo second");

        press(&mut editor, &history, KeyCode::Down);
        assert_eq!(editor.buffer().text(), "echo third");

        // Moving past the newest restores the in-progress line
        press(&mut editor, &history, KeyCode::Down);
        assert_eq!(editor.buffer().text(), "");
        assert_eq!(editor.history_pos, None);
    }

    #[test]
    fn test_history_saves_current_buffer() {
        let mut editor = create_test_editor();
        let history = create_test_history();

        type_str(&mut editor, &history, "incomplete command");

        press(&mut editor, &history, KeyCode::Up);
        assert_eq!(editor.saved_buffer, Some("incomplete command".to_string()));
        assert_eq!(editor.buffer().text(), "echo third");

        press(&mut editor, &history, KeyCode::Down);
        assert_eq!(editor.buffer().text(), "incomplete command");
        assert_eq!(editor.history_pos, None);
    }

    #[test]
    fn test_history_with_empty_history() {
        let mut editor = create_test_editor();
        let history = History::new();

        press(&mut editor, &history, KeyCode::Up);
        assert_eq!(editor.buffer().text(), "");
        press(&mut editor, &history, KeyCode::Down);
        assert_eq!(editor.buffer().text(), "");
        assert_eq!(editor.history_pos, None);
    }

    #[test]
    fn test_tab_single_candidate_replaces_word() {
        let mut editor = create_test_editor();
        let history = History::new();
        editor
            .completer_mut()
            .set_generator(|_, state| match state {
                0 => "checkout".to_string(),
                _ => String::new(),
            });

        type_str(&mut editor, &history, "git ch");
        press(&mut editor, &history, KeyCode::Tab);

        assert_eq!(editor.buffer().text(), "git checkout");
        assert_eq!(editor.buffer().cursor(), 12);
    }

    #[test]
    fn test_tab_inserts_common_prefix() {
        let mut editor = create_test_editor();
        let history = History::new();
        editor
            .completer_mut()
            .set_generator(|_, state| match state {
                0 => "checkout".to_string(),
                1 => "cherry-pick".to_string(),
                _ => String::new(),
            });

        type_str(&mut editor, &history, "git ch");
        press(&mut editor, &history, KeyCode::Tab);

        // Completes up to the shared prefix; the full list stays available.
        assert_eq!(editor.buffer().text(), "git che");
        assert_eq!(editor.completer().last_candidates().len(), 2);
    }

    #[test]
    fn test_tab_no_candidates_with_override_leaves_line() {
        let mut editor = create_test_editor();
        let history = History::new();
        let handled = editor.completer().handled_override();
        editor.completer_mut().set_generator(move |_, _| {
            handled.set(true);
            String::new()
        });

        type_str(&mut editor, &history, "nothing here");
        press(&mut editor, &history, KeyCode::Tab);

        assert_eq!(editor.buffer().text(), "nothing here");
    }

    #[test]
    fn test_tab_generator_receives_partial_word() {
        let mut editor = create_test_editor();
        let history = History::new();
        editor.completer_mut().set_generator(|text, state| {
            assert_eq!(text, "ch");
            if state == 0 {
                "checkout".to_string()
            } else {
                String::new()
            }
        });

        type_str(&mut editor, &history, "git ch");
        press(&mut editor, &history, KeyCode::Tab);
        assert_eq!(editor.buffer().text(), "git checkout");
    }

    #[test]
    fn test_tab_with_completion_disabled_inserts_tab() {
        let config = ReadlineConfig {
            enable_completion: false,
            ..ReadlineConfig::default()
        };
        let mut editor = LineEditor::new(config, Hinter::new(ColorConfig::default()));
        let history = History::new();

        type_str(&mut editor, &history, "test");
        press(&mut editor, &history, KeyCode::Tab);

        assert_eq!(editor.buffer().text(), "test\t");
    }

    #[test]
    fn test_right_at_end_accepts_hint() {
        let mut editor = create_test_editor();
        let mut history = History::new();
        history.add("echo hello world");

        type_str(&mut editor, &history, "echo h");
        press(&mut editor, &history, KeyCode::Right);

        assert_eq!(editor.buffer().text(), "echo hello world");
    }

    #[test]
    fn test_right_mid_line_just_moves() {
        let mut editor = create_test_editor();
        let mut history = History::new();
        history.add("echo hello");

        type_str(&mut editor, &history, "echo h");
        press(&mut editor, &history, KeyCode::Left);
        press(&mut editor, &history, KeyCode::Right);

        assert_eq!(editor.buffer().text(), "echo h");
        assert_eq!(editor.buffer().cursor(), 6);
    }

    #[test]
    fn test_visible_width_plain_text() {
        assert_eq!(visible_width("hello"), 5);
        assert_eq!(visible_width("> "), 2);
        assert_eq!(visible_width(""), 0);
    }

    #[test]
    fn test_visible_width_with_ansi_codes() {
        assert_eq!(visible_width("\x1b[1;32mhello\x1b[0m"), 5);
        assert_eq!(visible_width("\x1b[1;32m~/project\x1b[0m/> "), 12);
    }

    #[test]
    fn test_visible_width_multiple_ansi_codes() {
        assert_eq!(visible_width("\x1b[1m\x1b[32mhello\x1b[0m"), 5);
        assert_eq!(visible_width("\x1b[1;31merror:\x1b[0m test"), 11);
    }
}
