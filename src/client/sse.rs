//! Incremental parser for SSE byte streams.
//!
//! Transport chunks rarely line up with frame boundaries, so the parser
//! buffers raw bytes and dispatches a frame per blank line. `\n`, `\r\n`,
//! and bare `\r` line endings are all accepted, a lone trailing `\r` is held
//! back until the next chunk decides whether it was half of a `\r\n`, and
//! multi-byte UTF-8 split across chunks survives because decoding happens
//! per completed line. `id:` and `retry:` fields are ignored.

/// One dispatched frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SseFrame {
    /// Frame that contained only comment lines (the relay's heartbeats).
    Comment(String),
    /// Frame with an optional `event:` name and newline-joined `data:` lines.
    Message { event: Option<String>, data: String },
}

/// Accumulates bytes fed by [`FrameParser::push`] and emits complete frames.
#[derive(Debug, Default)]
pub struct FrameParser {
    buffer: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
    comments: Vec<String>,
}

impl FrameParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one transport chunk, returning every frame it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buffer.extend_from_slice(chunk);
        let mut frames = Vec::new();
        while let Some(line) = self.take_line() {
            if let Some(frame) = self.handle_line(&line) {
                frames.push(frame);
            }
        }
        frames
    }

    /// Extract the next complete line from the buffer, normalizing the
    /// terminator away. Returns `None` when no full line is buffered yet.
    fn take_line(&mut self) -> Option<String> {
        let (end, consumed) = self.find_line_end()?;
        let line = String::from_utf8_lossy(&self.buffer[..end]).into_owned();
        self.buffer.drain(..consumed);
        Some(line)
    }

    fn find_line_end(&self) -> Option<(usize, usize)> {
        for (i, &byte) in self.buffer.iter().enumerate() {
            match byte {
                b'\n' => return Some((i, i + 1)),
                b'\r' => {
                    // A \r at the buffer edge may be half of a \r\n.
                    if i + 1 == self.buffer.len() {
                        return None;
                    }
                    let consumed = if self.buffer[i + 1] == b'\n' {
                        i + 2
                    } else {
                        i + 1
                    };
                    return Some((i, consumed));
                }
                _ => {}
            }
        }
        None
    }

    fn handle_line(&mut self, line: &str) -> Option<SseFrame> {
        if line.is_empty() {
            return self.dispatch();
        }
        if let Some(comment) = line.strip_prefix(':') {
            self.comments
                .push(comment.strip_prefix(' ').unwrap_or(comment).to_string());
            return None;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            _ => {}
        }
        None
    }

    /// Blank line: dispatch whatever the frame accumulated.
    fn dispatch(&mut self) -> Option<SseFrame> {
        let event = self.event.take();
        let data = std::mem::take(&mut self.data);
        let comments = std::mem::take(&mut self.comments);

        if event.is_some() || !data.is_empty() {
            Some(SseFrame::Message {
                event,
                data: data.join("\n"),
            })
        } else if !comments.is_empty() {
            Some(SseFrame::Comment(comments.join("\n")))
        } else {
            None
        }
    }
}
