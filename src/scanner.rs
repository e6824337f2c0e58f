//! Incremental extraction of events from a partially received answer.
//!
//! The model streams its drawing envelope token by token. [`EventScanner`]
//! tracks JSON nesting over the growing buffer and hands back each event
//! object as soon as its closing brace arrives, without waiting for the rest
//! of the document. Prose and code fences before the answer are ignored,
//! including bracketed prose: a root value that closes without holding an
//! `events` list or the strategy is dropped and scanning resumes after it.
//! Anything after the answer closes is ignored.

use serde_json::Value;
use tracing::{trace, warn};

use crate::response::STRATEGY_KEY;

/// Something the scanner recognised in the stream.
#[derive(Debug, Clone, PartialEq)]
pub enum ScanItem {
    /// The strategy text, once its string value is complete.
    Strategy(String),
    /// One complete event object.
    Event(Value),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Object,
    Array,
}

#[derive(Debug)]
struct Container {
    kind: Kind,
    /// Byte offset of the opening bracket.
    start: usize,
    /// Key awaiting its value, for objects.
    key: Option<String>,
    expect_key: bool,
}

/// Streaming JSON scanner yielding events in emission order.
///
/// ```
/// use sketch_tutor::scanner::{EventScanner, ScanItem};
///
/// let mut scanner = EventScanner::new();
/// assert!(scanner.push(r#"{"events":[{"type":"th"#).is_empty());
/// let items = scanner.push(r#"ink"}]}"#);
/// assert!(matches!(&items[..], [ScanItem::Event(_)]));
/// assert!(scanner.is_complete());
/// ```
#[derive(Debug, Default)]
pub struct EventScanner {
    buf: String,
    pos: usize,
    stack: Vec<Container>,
    in_string: bool,
    escaped: bool,
    string_start: usize,
    complete: bool,
    /// The current root looks like the answer envelope.
    root_matched: bool,
    events: usize,
}

impl EventScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the root value has been closed.
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Number of events emitted so far.
    pub fn events_emitted(&self) -> usize {
        self.events
    }

    /// Everything received so far.
    pub fn text(&self) -> &str {
        &self.buf
    }

    /// Appends a chunk and returns the items it completed.
    pub fn push(&mut self, chunk: &str) -> Vec<ScanItem> {
        self.buf.push_str(chunk);
        let mut out = Vec::new();
        while self.pos < self.buf.len() && !self.complete {
            let i = self.pos;
            let b = self.buf.as_bytes()[i];
            self.pos += 1;

            if self.in_string {
                if self.escaped {
                    self.escaped = false;
                } else if b == b'\\' {
                    self.escaped = true;
                } else if b == b'"' {
                    self.in_string = false;
                    self.end_string(i, &mut out);
                }
                continue;
            }

            if self.stack.is_empty() {
                match b {
                    b'{' => self.open(Kind::Object, i),
                    b'[' => self.open(Kind::Array, i),
                    _ => {}
                }
                continue;
            }

            match b {
                b'"' => {
                    self.in_string = true;
                    self.string_start = i;
                }
                b'{' => self.open(Kind::Object, i),
                b'[' => self.open(Kind::Array, i),
                b'}' | b']' => self.close(i, &mut out),
                b',' => {
                    if let Some(top) = self.stack.last_mut() {
                        if top.kind == Kind::Object {
                            top.expect_key = true;
                            top.key = None;
                        }
                    }
                }
                _ => {}
            }
        }
        out
    }

    fn open(&mut self, kind: Kind, start: usize) {
        if self.stack.is_empty() {
            self.root_matched = false;
        }
        self.stack.push(Container {
            kind,
            start,
            key: None,
            expect_key: kind == Kind::Object,
        });
    }

    fn end_string(&mut self, end: usize, out: &mut Vec<ScanItem>) {
        let depth = self.stack.len();
        let Some(top) = self.stack.last_mut() else {
            return;
        };
        if top.kind != Kind::Object {
            return;
        }
        let raw = &self.buf[self.string_start..=end];
        if top.expect_key {
            top.key = serde_json::from_str::<String>(raw).ok();
            top.expect_key = false;
            if depth == 1 && matches!(top.key.as_deref(), Some("events" | STRATEGY_KEY)) {
                self.root_matched = true;
            }
        } else if depth == 1 && top.key.as_deref() == Some(STRATEGY_KEY) {
            match serde_json::from_str::<String>(raw) {
                Ok(strategy) => out.push(ScanItem::Strategy(strategy)),
                Err(e) => warn!(error = %e, "unreadable strategy string"),
            }
        }
    }

    fn close(&mut self, end: usize, out: &mut Vec<ScanItem>) {
        let Some(closed) = self.stack.pop() else {
            return;
        };
        if self.stack.is_empty() {
            if self.root_matched {
                self.complete = true;
                trace!(events = self.events, "root value closed");
            } else {
                trace!(
                    skipped = end + 1 - closed.start,
                    "skipping bracketed text before the answer"
                );
            }
            return;
        }
        if closed.kind == Kind::Object && self.in_event_list() {
            let raw = &self.buf[closed.start..=end];
            match serde_json::from_str::<Value>(raw) {
                Ok(event) => {
                    self.events += 1;
                    self.root_matched = true;
                    out.push(ScanItem::Event(event));
                }
                Err(e) => warn!(error = %e, "skipping unparsable streamed event"),
            }
        }
    }

    /// Whether the innermost open container is the event list.
    fn in_event_list(&self) -> bool {
        match self.stack.as_slice() {
            [list] => list.kind == Kind::Array,
            [root, list] => {
                root.kind == Kind::Object
                    && root.key.as_deref() == Some("events")
                    && list.kind == Kind::Array
            }
            _ => false,
        }
    }
}
