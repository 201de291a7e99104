//! Editor engine collaborator
//!
//! The host only needs something that holds lines, a cursor and reacts to
//! keys. [`LineBuffer`] is the minimal engine the binary ships with.

/// One decoded input key
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Key {
    Char(char),
    Enter,
    Backspace,
    Escape,
    Tab,
    /// A `<Name>` key this engine has no meaning for
    Special(String),
}

impl Key {
    /// Keys that dismiss the startup pager
    pub fn is_continue(&self) -> bool {
        matches!(self, Key::Enter | Key::Char(' '))
    }
}

/// Decode an input string: plain characters plus `<Name>` key notation
///
/// A `<` that does not start a complete key name is taken literally.
pub fn parse_keys(input: &str) -> Vec<Key> {
    let mut keys = Vec::new();
    let mut rest = input;

    while let Some(ch) = rest.chars().next() {
        if ch == '<' {
            if let Some(end) = rest[1..].find(['>', '<']) {
                let end = end + 1;
                if rest.as_bytes()[end] == b'>' && end > 1 {
                    keys.push(named_key(&rest[1..end]));
                    rest = &rest[end + 1..];
                    continue;
                }
            }
        }

        keys.push(match ch {
            '\r' | '\n' => Key::Enter,
            '\t' => Key::Tab,
            '\x1b' => Key::Escape,
            '\x08' | '\x7f' => Key::Backspace,
            c => Key::Char(c),
        });
        rest = &rest[ch.len_utf8()..];
    }

    keys
}

fn named_key(name: &str) -> Key {
    match name.to_ascii_lowercase().as_str() {
        "cr" | "enter" | "return" | "nl" => Key::Enter,
        "bs" | "backspace" => Key::Backspace,
        "esc" => Key::Escape,
        "tab" => Key::Tab,
        "space" => Key::Char(' '),
        "lt" => Key::Char('<'),
        "gt" => Key::Char('>'),
        _ => Key::Special(name.to_string()),
    }
}

/// What the host needs from an editing engine
pub trait Editor: Send {
    fn lines(&self) -> &[String];

    /// `(line, column)`, column counted in characters
    fn cursor(&self) -> (usize, usize);

    /// Replace the buffer with `text`
    fn load(&mut self, text: &str);

    /// Add a line after the last one
    fn append_line(&mut self, text: &str);

    fn feed(&mut self, key: &Key);
}

const TAB_STOP: usize = 4;

/// Plain line buffer with insert-mode editing at the cursor
#[derive(Debug, Clone)]
pub struct LineBuffer {
    lines: Vec<String>,
    cursor: (usize, usize),
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl LineBuffer {
    pub fn new() -> Self {
        Self {
            lines: vec![String::new()],
            cursor: (0, 0),
        }
    }

    fn is_empty(&self) -> bool {
        self.lines.len() == 1 && self.lines[0].is_empty()
    }

    /// Byte offset of the cursor within its line
    fn cursor_byte(&self) -> usize {
        let line = &self.lines[self.cursor.0];
        line.char_indices()
            .nth(self.cursor.1)
            .map_or(line.len(), |(i, _)| i)
    }

    fn insert(&mut self, ch: char) {
        let at = self.cursor_byte();
        self.lines[self.cursor.0].insert(at, ch);
        self.cursor.1 += 1;
    }

    fn split_line(&mut self) {
        let at = self.cursor_byte();
        let tail = self.lines[self.cursor.0].split_off(at);
        self.lines.insert(self.cursor.0 + 1, tail);
        self.cursor = (self.cursor.0 + 1, 0);
    }

    fn backspace(&mut self) {
        let (row, col) = self.cursor;
        if col > 0 {
            let line = &mut self.lines[row];
            if let Some((at, _)) = line.char_indices().nth(col - 1) {
                line.remove(at);
            }
            self.cursor.1 -= 1;
        } else if row > 0 {
            let current = self.lines.remove(row);
            let previous = &mut self.lines[row - 1];
            let joined_at = previous.chars().count();
            previous.push_str(&current);
            self.cursor = (row - 1, joined_at);
        }
    }
}

impl Editor for LineBuffer {
    fn lines(&self) -> &[String] {
        &self.lines
    }

    fn cursor(&self) -> (usize, usize) {
        self.cursor
    }

    fn load(&mut self, text: &str) {
        self.lines = text.lines().map(String::from).collect();
        if self.lines.is_empty() {
            self.lines.push(String::new());
        }
        self.cursor = (0, 0);
    }

    fn append_line(&mut self, text: &str) {
        if self.is_empty() {
            self.lines[0] = text.to_string();
        } else {
            self.lines.push(text.to_string());
        }
    }

    fn feed(&mut self, key: &Key) {
        match key {
            Key::Char(ch) => self.insert(*ch),
            Key::Enter => self.split_line(),
            Key::Backspace => self.backspace(),
            Key::Tab => {
                let pad = TAB_STOP - self.cursor.1 % TAB_STOP;
                for _ in 0..pad {
                    self.insert(' ');
                }
            }
            Key::Escape => {}
            Key::Special(name) => {
                tracing::trace!(key = %name, "Ignoring unmapped key");
            }
        }
    }
}
