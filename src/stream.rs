//! Streaming generation: a driver task feeding a cancellable change stream.
//!
//! The driver reads model tokens, runs them through an [`EventScanner`],
//! decodes every completed event and forwards the resulting changes over an
//! unbounded channel. [`ChangeStream`] is the consumer side and
//! [`CancelHandle`] stops both.

use futures::task::AtomicWaker;
use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tracing::{debug, trace, warn};

use crate::abort_guard::AbortGuard;
use crate::change::Change;
use crate::decoder;
use crate::error::AiError;
use crate::llm_client::{ChatRequest, LLMClient};
use crate::prompt::Prompt;
use crate::scanner::{EventScanner, ScanItem};

const RUNNING: u8 = 0;
const COMPLETED: u8 = 1;
const CANCELLED: u8 = 2;
const FAILED: u8 = 3;

/// Where a [`ChangeStream`] is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Not polled yet; the model has not been called.
    Idle,
    /// Waiting for the model to produce the next event.
    AwaitingChunk,
    /// A change was just handed to the consumer.
    Yielded,
    Completed,
    Cancelled,
    Failed,
}

impl StreamState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            StreamState::Completed | StreamState::Cancelled | StreamState::Failed
        )
    }
}

/// Message from the driver task to the consumer.
#[derive(Debug)]
enum Frame {
    Strategy(String),
    Change { change: Change, event_index: usize },
    Done,
    Failed(AiError),
}

struct Shared {
    phase: AtomicU8,
    driver: Mutex<Option<AbortGuard>>,
    waker: AtomicWaker,
}

impl Shared {
    fn new() -> Self {
        Self {
            phase: AtomicU8::new(RUNNING),
            driver: Mutex::new(None),
            waker: AtomicWaker::new(),
        }
    }

    /// Moves from running to `to`; false if another outcome won.
    fn settle(&self, to: u8) -> bool {
        self.phase
            .compare_exchange(RUNNING, to, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn phase(&self) -> u8 {
        self.phase.load(Ordering::Acquire)
    }

    fn stop_driver(&self) {
        let guard = self
            .driver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        drop(guard);
    }

    fn cancel(&self) -> bool {
        if !self.settle(CANCELLED) {
            return false;
        }
        self.stop_driver();
        self.waker.wake();
        true
    }
}

/// Stops a running [`ChangeStream`] from anywhere.
///
/// Cancelling is idempotent. Once the consumer has observed completion it is
/// a no-op; otherwise it wins over a completion that has not been observed
/// yet. Changes already applied stay applied.
#[derive(Clone)]
pub struct CancelHandle {
    shared: Arc<Shared>,
}

impl CancelHandle {
    /// Cancels the stream. Returns whether this call did the cancelling.
    pub fn cancel(&self) -> bool {
        let cancelled = self.shared.cancel();
        if cancelled {
            debug!("change stream cancelled");
        }
        cancelled
    }

    pub fn is_cancelled(&self) -> bool {
        self.shared.phase() == CANCELLED
    }

    /// Whether the stream reached any final outcome.
    pub fn is_settled(&self) -> bool {
        self.shared.phase() != RUNNING
    }
}

impl std::fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelHandle")
            .field("phase", &self.shared.phase())
            .finish()
    }
}

struct Launch {
    llm: Arc<dyn LLMClient>,
    request: ChatRequest,
    prompt: Prompt,
}

/// Lazy, finite stream of changes decoded from a streaming model answer.
///
/// The model is called on first poll. Changes arrive in model emission
/// order and the stream cannot be restarted. Dropping it cancels the model
/// call.
pub struct ChangeStream {
    shared: Arc<Shared>,
    launch: Option<Result<Launch, AiError>>,
    rx: Option<UnboundedReceiver<Frame>>,
    state: StreamState,
    strategy: Option<String>,
    event_index: Option<usize>,
}

impl ChangeStream {
    /// Prepares a stream for `prompt`; nothing runs until it is polled.
    pub fn new(
        llm: Arc<dyn LLMClient>,
        request: Result<ChatRequest, AiError>,
        prompt: Prompt,
    ) -> (Self, CancelHandle) {
        let shared = Arc::new(Shared::new());
        let stream = Self {
            shared: shared.clone(),
            launch: Some(request.map(|request| Launch {
                llm,
                request,
                prompt,
            })),
            rx: None,
            state: StreamState::Idle,
            strategy: None,
            event_index: None,
        };
        (stream, CancelHandle { shared })
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Strategy text, once the model has written it.
    pub fn strategy(&self) -> Option<&str> {
        self.strategy.as_deref()
    }

    /// Index of the event the last yielded change came from.
    pub fn event_index(&self) -> Option<usize> {
        self.event_index
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            shared: self.shared.clone(),
        }
    }

    /// Spawns the driver on first use. Returns an error to yield, if any.
    fn start(&mut self) -> Option<AiError> {
        let launch = self.launch.take()?;
        let launch = match launch {
            Ok(launch) => launch,
            Err(e) => return Some(e),
        };
        let (tx, rx) = unbounded_channel();
        let handle = tokio::spawn(drive_event_stream(
            launch.llm,
            launch.request,
            launch.prompt,
            tx,
        ));
        *self
            .shared
            .driver
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(AbortGuard::new(handle));
        // A cancel that raced the spawn found no driver to stop.
        if self.shared.phase() == CANCELLED {
            self.shared.stop_driver();
        }
        self.rx = Some(rx);
        None
    }

    fn finish(&mut self, state: StreamState) {
        self.state = state;
        self.rx = None;
        self.shared.stop_driver();
    }
}

impl Stream for ChangeStream {
    type Item = Result<Change, AiError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.state.is_terminal() {
            return Poll::Ready(None);
        }
        this.shared.waker.register(cx.waker());
        if this.shared.phase() == CANCELLED {
            this.finish(StreamState::Cancelled);
            return Poll::Ready(None);
        }
        if let Some(err) = this.start() {
            this.shared.settle(FAILED);
            this.finish(StreamState::Failed);
            return Poll::Ready(Some(Err(err)));
        }
        let Some(rx) = this.rx.as_mut() else {
            this.finish(StreamState::Cancelled);
            return Poll::Ready(None);
        };

        loop {
            match rx.poll_recv(cx) {
                Poll::Ready(Some(Frame::Strategy(strategy))) => {
                    trace!(%strategy, "strategy received");
                    this.strategy = Some(strategy);
                }
                Poll::Ready(Some(Frame::Change {
                    change,
                    event_index,
                })) => {
                    this.state = StreamState::Yielded;
                    this.event_index = Some(event_index);
                    return Poll::Ready(Some(Ok(change)));
                }
                Poll::Ready(Some(Frame::Done)) => {
                    let state = if this.shared.settle(COMPLETED) {
                        StreamState::Completed
                    } else {
                        StreamState::Cancelled
                    };
                    this.finish(state);
                    return Poll::Ready(None);
                }
                Poll::Ready(Some(Frame::Failed(err))) => {
                    if this.shared.settle(FAILED) {
                        this.finish(StreamState::Failed);
                        return Poll::Ready(Some(Err(err)));
                    }
                    this.finish(StreamState::Cancelled);
                    return Poll::Ready(None);
                }
                Poll::Ready(None) => {
                    if this.shared.settle(FAILED) {
                        this.finish(StreamState::Failed);
                        return Poll::Ready(Some(Err(AiError::Interrupted)));
                    }
                    this.finish(StreamState::Cancelled);
                    return Poll::Ready(None);
                }
                Poll::Pending => {
                    this.state = StreamState::AwaitingChunk;
                    return Poll::Pending;
                }
            }
        }
    }
}

impl Drop for ChangeStream {
    fn drop(&mut self) {
        if !self.state.is_terminal() {
            self.shared.cancel();
        }
    }
}

impl std::fmt::Debug for ChangeStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeStream")
            .field("state", &self.state)
            .field("strategy", &self.strategy)
            .field("event_index", &self.event_index)
            .finish()
    }
}

/// Calls the model and forwards decoded changes until the answer ends.
async fn drive_event_stream(
    llm: Arc<dyn LLMClient>,
    request: ChatRequest,
    prompt: Prompt,
    tx: UnboundedSender<Frame>,
) {
    let start = std::time::Instant::now();
    debug!("LLM stream START");
    let mut tokens = match llm.chat_stream(&request).await {
        Ok(tokens) => tokens,
        Err(e) => {
            warn!(error = %e, "model call failed");
            let _ = tx.send(Frame::Failed(AiError::Model(e)));
            return;
        }
    };

    let mut scanner = EventScanner::new();
    let mut index = 0;
    while let Some(tok) = tokens.next().await {
        let tok = match tok {
            Ok(tok) => tok,
            Err(e) => {
                warn!(error = %e, events = index, "model stream failed");
                let _ = tx.send(Frame::Failed(AiError::Model(e)));
                return;
            }
        };
        trace!(token = %tok.text, "stream token");
        for item in scanner.push(&tok.text) {
            let sent = match item {
                ScanItem::Strategy(strategy) => tx.send(Frame::Strategy(strategy)).is_ok(),
                ScanItem::Event(event) => {
                    let event_index = index;
                    index += 1;
                    decoder::decode_at(&prompt, event_index, &event)
                        .into_iter()
                        .all(|change| {
                            tx.send(Frame::Change {
                                change,
                                event_index,
                            })
                            .is_ok()
                        })
                }
            };
            if !sent {
                debug!("change stream consumer gone; stopping");
                return;
            }
        }
    }

    if !scanner.is_complete() {
        warn!(events = index, "model answer ended before the event list closed");
    }
    debug!(full = %scanner.text(), "llm full response");
    debug!(events = index, elapsed = ?start.elapsed(), "LLM stream END");
    let _ = tx.send(Frame::Done);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{ChunkedLLM, FailingLLM};
    use std::time::Duration;

    const ANSWER: &str = r#"{"long_description_of_strategy":"two boxes","events":[
        {"type":"create","intent":"first","shape":{"type":"rectangle","shapeId":"a","x":0,"y":0,"width":10,"height":10}},
        {"type":"think","text":"halfway"},
        {"type":"create","intent":"second","shape":{"type":"arrow","shapeId":"b","x1":0,"y1":0,"x2":5,"y2":5,"fromId":"a"}}
    ]}"#;

    fn open(llm: impl LLMClient + 'static) -> (ChangeStream, CancelHandle) {
        ChangeStream::new(
            Arc::new(llm),
            Ok(ChatRequest::default()),
            Prompt::default(),
        )
    }

    #[tokio::test]
    async fn yields_changes_in_emission_order() {
        let (mut stream, handle) = open(ChunkedLLM::new(ANSWER, 7));
        assert_eq!(stream.state(), StreamState::Idle);
        let mut seen = Vec::new();
        while let Some(change) = stream.next().await {
            let change = change.unwrap();
            seen.push((stream.event_index().unwrap(), change.target().to_string()));
        }
        assert_eq!(
            seen,
            vec![
                (0, "shape:a".to_string()),
                (2, "shape:b".to_string()),
                (2, "binding:b-start".to_string()),
            ]
        );
        assert_eq!(stream.strategy(), Some("two boxes"));
        assert_eq!(stream.state(), StreamState::Completed);
        assert!(!handle.cancel());
        assert_eq!(stream.state(), StreamState::Completed);
    }

    #[tokio::test]
    async fn cancel_is_idempotent_and_ends_stream() {
        let llm = ChunkedLLM::new(ANSWER, 4).with_delay(Duration::from_millis(5));
        let (mut stream, handle) = open(llm);
        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.target(), "shape:a");
        assert!(handle.cancel());
        assert!(!handle.cancel());
        assert!(stream.next().await.is_none());
        assert_eq!(stream.state(), StreamState::Cancelled);
        assert!(handle.is_cancelled());
    }

    #[tokio::test]
    async fn cancel_before_first_poll_never_calls_model() {
        let (mut stream, handle) = open(FailingLLM::upfront());
        handle.cancel();
        assert!(stream.next().await.is_none());
        assert_eq!(stream.state(), StreamState::Cancelled);
    }

    #[tokio::test]
    async fn transport_error_fails_stream_after_partial_output() {
        let partial = r#"{"events":[{"type":"move","shapeId":"a","x":1,"y":2},"#;
        let (mut stream, _handle) = open(FailingLLM::mid_stream(partial));
        assert!(stream.next().await.unwrap().is_ok());
        let err = stream.next().await.unwrap().unwrap_err();
        assert!(matches!(err, AiError::Model(_)));
        assert!(stream.next().await.is_none());
        assert_eq!(stream.state(), StreamState::Failed);
    }

    #[tokio::test]
    async fn request_error_is_yielded_once() {
        let (mut stream, _handle) = ChangeStream::new(
            Arc::new(ChunkedLLM::new("", 1)),
            Err(AiError::Template("bad".into())),
            Prompt::default(),
        );
        assert!(matches!(stream.next().await, Some(Err(AiError::Template(_)))));
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn dropping_stream_cancels() {
        let llm = ChunkedLLM::new(ANSWER, 2).with_delay(Duration::from_millis(5));
        let (mut stream, handle) = open(llm);
        let _ = stream.next().await;
        drop(stream);
        assert!(handle.is_cancelled());
    }
}
