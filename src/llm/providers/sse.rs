//! Server-Sent Events (SSE) parser for provider streaming responses.
//!
//! Converts a byte stream into [`SseEvent`]s. Handles multi-line `data:`
//! fields, event types, comment lines, and the `[DONE]` sentinel.
//!
//! Lines are buffered as raw bytes and only decoded once complete, so a
//! network chunk boundary inside a multi-byte character never corrupts the
//! payload.
//!
//! ```text
//! event: message
//! data: {"key": "value"}
//!
//! data: [DONE]
//! ```

/// A parsed Server-Sent Event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// The event type (from `event:` field). `None` if not specified.
    pub event_type: Option<String>,
    /// The data payload. Multiple data lines are joined with `\n`.
    pub data: String,
    /// The event ID (from `id:` field). `None` if not specified.
    pub id: Option<String>,
}

impl SseEvent {
    /// Whether this event is the `[DONE]` sentinel.
    pub fn is_done(&self) -> bool {
        self.data.trim() == "[DONE]"
    }
}

#[derive(Debug, Default)]
struct EventBuilder {
    event_type: Option<String>,
    data_lines: Vec<String>,
    id: Option<String>,
}

impl EventBuilder {
    fn has_data(&self) -> bool {
        !self.data_lines.is_empty()
    }

    fn build(&mut self) -> SseEvent {
        let event = SseEvent {
            event_type: self.event_type.take(),
            data: self.data_lines.join("\n"),
            id: self.id.take(),
        };
        self.data_lines.clear();
        event
    }

    /// Returns an event when a blank line closes one that carries data.
    fn process_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.has_data().then(|| self.build());
        }

        if line.starts_with(':') {
            return None;
        }

        if let Some((field, value)) = parse_field(line) {
            match field {
                "data" => self.data_lines.push(value.to_string()),
                "event" => self.event_type = Some(value.to_string()),
                "id" => self.id = Some(value.to_string()),
                _ => {}
            }
        }

        None
    }
}

/// Split `field:value`, dropping one leading space from the value.
fn parse_field(line: &str) -> Option<(&str, &str)> {
    let (field, value) = line.split_once(':')?;
    Some((field, value.strip_prefix(' ').unwrap_or(value)))
}

/// Parse a complete SSE text into events.
pub fn parse_sse_text(text: &str) -> Vec<SseEvent> {
    let mut builder = EventBuilder::default();
    let mut events: Vec<SseEvent> = text
        .lines()
        .filter_map(|line| builder.process_line(line))
        .collect();

    if builder.has_data() {
        events.push(builder.build());
    }

    events
}

/// Incremental SSE parser fed with raw network chunks.
#[derive(Debug, Default)]
pub struct SseLineParser {
    line_buffer: Vec<u8>,
    builder: EventBuilder,
}

impl SseLineParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a chunk of bytes, returning events completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        let mut events = Vec::new();

        for &byte in chunk {
            if byte == b'\n' {
                let raw = std::mem::take(&mut self.line_buffer);
                if let Some(event) = self.process_raw_line(&raw) {
                    events.push(event);
                }
            } else {
                self.line_buffer.push(byte);
            }
        }

        events
    }

    /// Emit any trailing event at end of stream.
    pub fn flush(&mut self) -> Option<SseEvent> {
        if !self.line_buffer.is_empty() {
            let raw = std::mem::take(&mut self.line_buffer);
            if let Some(event) = self.process_raw_line(&raw) {
                return Some(event);
            }
        }

        self.builder.has_data().then(|| self.builder.build())
    }

    fn process_raw_line(&mut self, raw: &[u8]) -> Option<SseEvent> {
        let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
        let line = String::from_utf8_lossy(raw);
        self.builder.process_line(&line)
    }
}
