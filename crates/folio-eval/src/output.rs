//! Render output buffer with the runtime half of lone-line merging.
//!
//! Output is written into a stack of floors, one per nested scope (directive
//! body, block, function call). An emission whose value turns out empty is
//! merged like a static directive: when it is alone on its line, the
//! indentation before it is retracted and the rest of the line after it is
//! dropped. Retraction never reaches below the current floor.

use folio_types::whitespace;

#[derive(Debug, Default)]
struct Floor {
    buf: String,
    /// Whether the floor began at the start of a line.
    line_start: bool,
    /// An empty emission is alone on the left and waits for what follows.
    pending: bool,
}

impl Floor {
    fn new(line_start: bool) -> Self {
        Self {
            buf: String::new(),
            line_start,
            pending: false,
        }
    }

    /// Whether the next write lands at the start of a line.
    fn at_line_start(&self) -> bool {
        if self.buf.is_empty() {
            self.line_start
        } else {
            self.buf.ends_with('\n')
        }
    }

    fn retract(&mut self) {
        let keep = self.buf.len() - whitespace::trailing_horizontal(&self.buf);
        self.buf.truncate(keep);
    }

    fn settle_at_end(&mut self) {
        if std::mem::take(&mut self.pending) {
            self.retract();
        }
    }
}

/// The output of one render.
#[derive(Debug)]
pub struct Output {
    floors: Vec<Floor>,
}

impl Output {
    pub fn new() -> Self {
        Self {
            floors: vec![Floor::new(true)],
        }
    }

    fn top(&mut self) -> &mut Floor {
        if self.floors.is_empty() {
            self.floors.push(Floor::new(true));
        }
        let last = self.floors.len() - 1;
        &mut self.floors[last]
    }

    /// Append text, completing a pending merge first.
    pub fn push_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        let floor = self.top();
        let mut text = text;
        if std::mem::take(&mut floor.pending) {
            if let Some(len) = whitespace::line_lead(text, false) {
                floor.retract();
                text = &text[len..];
            }
        }
        floor.buf.push_str(text);
    }

    /// Record an emission that produced nothing.
    pub fn mark_empty(&mut self) {
        let floor = self.top();
        if whitespace::left_alone(&floor.buf, floor.line_start) {
            floor.pending = true;
        }
    }

    /// Start a nested scope that continues the current line.
    pub fn open(&mut self) {
        let line_start = self.top().at_line_start();
        self.floors.push(Floor::new(line_start));
    }

    /// End a nested scope and append its text to the enclosing one.
    pub fn close(&mut self) {
        if self.floors.len() < 2 {
            return;
        }
        if let Some(mut floor) = self.floors.pop() {
            floor.settle_at_end();
            let parent = self.top();
            if !floor.buf.is_empty() {
                parent.pending = false;
                parent.buf.push_str(&floor.buf);
            }
        }
    }

    /// Start a detached scope whose text is captured instead of emitted.
    pub fn open_capture(&mut self) {
        self.floors.push(Floor::new(true));
    }

    /// End a detached scope and return its text.
    pub fn capture(&mut self) -> String {
        if self.floors.len() < 2 {
            return String::new();
        }
        match self.floors.pop() {
            Some(mut floor) => {
                floor.settle_at_end();
                floor.buf
            }
            None => String::new(),
        }
    }

    /// Text of the current scope so far.
    pub fn current(&self) -> &str {
        self.floors.last().map_or("", |f| f.buf.as_str())
    }

    /// Close every scope and return the whole output.
    pub fn finish(mut self) -> String {
        while self.floors.len() > 1 {
            self.close();
        }
        let mut floor = self.floors.pop().unwrap_or_default();
        floor.settle_at_end();
        floor.buf
    }
}

impl Default for Output {
    fn default() -> Self {
        Self::new()
    }
}
