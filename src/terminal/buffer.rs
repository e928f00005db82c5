use std::collections::VecDeque;

/// Bounded scrollback of rendered terminal lines.
///
/// Output arrives in arbitrary chunks; a line is complete once its `\n`
/// arrives, and the unterminated tail is kept as the partial line. Multi-byte
/// characters split across chunks are reassembled.
#[derive(Debug, Clone)]
pub struct LineBuffer {
    lines: VecDeque<String>,
    partial: String,
    /// Incomplete UTF-8 sequence carried into the next chunk
    pending: Vec<u8>,
    capacity: usize,
}

impl LineBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: VecDeque::new(),
            partial: String::new(),
            pending: Vec::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn push(&mut self, data: &[u8]) {
        let mut bytes = std::mem::take(&mut self.pending);
        bytes.extend_from_slice(data);

        let mut rest: &[u8] = &bytes;
        loop {
            match std::str::from_utf8(rest) {
                Ok(text) => {
                    self.push_str(text);
                    break;
                }
                Err(e) => {
                    let (valid, after) = rest.split_at(e.valid_up_to());
                    self.push_str(std::str::from_utf8(valid).unwrap_or_default());
                    match e.error_len() {
                        Some(len) => {
                            self.push_char(char::REPLACEMENT_CHARACTER);
                            rest = &after[len..];
                        }
                        None => {
                            self.pending = after.to_vec();
                            break;
                        }
                    }
                }
            }
        }
        self.evict();
    }

    fn push_str(&mut self, text: &str) {
        for ch in text.chars() {
            self.push_char(ch);
        }
    }

    fn push_char(&mut self, ch: char) {
        if ch == '\n' {
            if self.partial.ends_with('\r') {
                self.partial.pop();
            }
            self.lines.push_back(std::mem::take(&mut self.partial));
        } else {
            self.partial.push(ch);
        }
    }

    fn evict(&mut self) {
        while self.lines.len() > self.capacity {
            self.lines.pop_front();
        }
    }

    /// Completed lines plus the partial one, oldest first.
    pub fn lines(&self) -> Vec<String> {
        let mut out: Vec<String> = self.lines.iter().cloned().collect();
        if !self.partial.is_empty() {
            out.push(self.partial.clone());
        }
        out
    }

    pub fn partial(&self) -> &str {
        &self.partial
    }

    pub fn len(&self) -> usize {
        self.lines.len() + usize::from(!self.partial.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        self.lines.clear();
        self.partial.clear();
        self.pending.clear();
    }
}
