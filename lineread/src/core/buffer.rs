/// In-progress input line plus cursor offset.
///
/// The cursor is a byte offset into `text` and is always kept on a char
/// boundary. The editor owns the buffer exclusively; the completion engine
/// and application callbacks only see the read-only query surface.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineBuffer {
    text: String,
    cursor: usize,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// The line gathered so far.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Cursor position as a byte offset into `text()`.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Cursor position counted in chars, for terminal column math.
    pub fn cursor_chars(&self) -> usize {
        self.text[..self.cursor].chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn clear(&mut self) {
        self.text.clear();
        self.cursor = 0;
    }

    /// Replace the whole line and put the cursor at the end.
    pub fn set(&mut self, text: String) {
        self.cursor = text.len();
        self.text = text;
    }

    /// Consume the buffer, returning the finished line.
    pub fn take(&mut self) -> String {
        self.cursor = 0;
        std::mem::take(&mut self.text)
    }

    pub fn insert(&mut self, ch: char) {
        self.text.insert(self.cursor, ch);
        self.cursor += ch.len_utf8();
    }

    pub fn insert_str(&mut self, s: &str) {
        self.text.insert_str(self.cursor, s);
        self.cursor += s.len();
    }

    /// Delete the char before the cursor. Returns false at start of line.
    pub fn backspace(&mut self) -> bool {
        match self.prev_char_start() {
            Some(start) => {
                self.text.remove(start);
                self.cursor = start;
                true
            }
            None => false,
        }
    }

    /// Delete the char under the cursor. Returns false at end of line.
    pub fn delete(&mut self) -> bool {
        if self.cursor < self.text.len() {
            self.text.remove(self.cursor);
            true
        } else {
            false
        }
    }

    pub fn move_left(&mut self) {
        if let Some(start) = self.prev_char_start() {
            self.cursor = start;
        }
    }

    pub fn move_right(&mut self) {
        if let Some(ch) = self.text[self.cursor..].chars().next() {
            self.cursor += ch.len_utf8();
        }
    }

    pub fn move_home(&mut self) {
        self.cursor = 0;
    }

    pub fn move_end(&mut self) {
        self.cursor = self.text.len();
    }

    pub fn at_end(&self) -> bool {
        self.cursor == self.text.len()
    }

    /// Delete everything before the cursor (Ctrl-U).
    pub fn kill_to_start(&mut self) {
        self.text.drain(..self.cursor);
        self.cursor = 0;
    }

    /// Delete everything from the cursor on (Ctrl-K).
    pub fn kill_to_end(&mut self) {
        self.text.truncate(self.cursor);
    }

    /// Delete the word before the cursor (Ctrl-W): trailing whitespace
    /// first, then the word itself.
    pub fn delete_word(&mut self) {
        let before = &self.text[..self.cursor];
        let word_end = before.trim_end_matches(char::is_whitespace).len();
        let word_start = self.text[..word_end]
            .char_indices()
            .rev()
            .take_while(|(_, c)| !c.is_whitespace())
            .last()
            .map_or(word_end, |(i, _)| i);
        self.text.drain(word_start..self.cursor);
        self.cursor = word_start;
    }

    /// Byte offset where the partial word under completion begins: just
    /// past the last break character strictly before the cursor.
    pub fn word_start(&self, break_chars: &str) -> usize {
        self.text[..self.cursor]
            .char_indices()
            .rev()
            .find(|(_, c)| break_chars.contains(*c))
            .map_or(0, |(i, c)| i + c.len_utf8())
    }

    /// The partial word between the last break character and the cursor.
    pub fn word(&self, break_chars: &str) -> &str {
        &self.text[self.word_start(break_chars)..self.cursor]
    }

    /// Replace the partial word with `replacement`, leaving the cursor at
    /// the end of the inserted text.
    pub fn replace_word(&mut self, break_chars: &str, replacement: &str) {
        let start = self.word_start(break_chars);
        self.text.replace_range(start..self.cursor, replacement);
        self.cursor = start + replacement.len();
    }

    fn prev_char_start(&self) -> Option<usize> {
        self.text[..self.cursor]
            .char_indices()
            .next_back()
            .map(|(i, _)| i)
    }
}
