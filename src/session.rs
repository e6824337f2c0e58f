//! Conversation transcript bound to one canvas document.
//!
//! A [`Session`] owns the document and runs at most one assistant turn at a
//! time. Each turn snapshots the canvas, asks the service for help, applies
//! whatever changes come back and keeps the assistant message up to date
//! while it does.
//!
//! A streaming turn stays pending until [`Session::run_stream`] consumes its
//! stream. A stream dropped without being run cancels itself, and the next
//! turn then closes the abandoned reply as cancelled instead of reporting
//! [`AiError::Busy`].

use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::applier::{self, ApplyReport};
use crate::change::Change;
use crate::decoder;
use crate::document::Document;
use crate::error::AiError;
use crate::prompt::{Bounds, Prompt};
use crate::response::AiResponse;
use crate::service::AiService;
use crate::snapshot::encode_prompt;
use crate::stream::{CancelHandle, ChangeStream, StreamState};

/// Placeholder shown while the assistant is working.
pub const THINKING: &str = "Thinking…";
/// Content of a finished drawing turn.
pub const DONE: &str = "Done ✅";
const CANCELLED: &str = "Cancelled.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageState {
    Pending,
    Done,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseType {
    Chat,
    Drawing,
}

/// One entry of the transcript.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMessage {
    pub id: Uuid,
    pub role: Role,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_type: Option<ResponseType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<String>,
    /// Intent label of every event that changed the canvas, in order.
    pub intents: Vec<String>,
    pub state: MessageState,
    pub created_at: DateTime<Utc>,
}

impl SessionMessage {
    fn new(role: Role, content: impl Into<String>, state: MessageState) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content: content.into(),
            response_type: None,
            strategy: None,
            intents: Vec::new(),
            state,
            created_at: Utc::now(),
        }
    }
}

/// How a turn ended.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutcome {
    pub response_type: ResponseType,
    pub report: ApplyReport,
    pub cancelled: bool,
}

pub struct Session<D: Document> {
    document: D,
    messages: Vec<SessionMessage>,
    pending: Option<usize>,
    /// Handle of the stream started for the pending turn, if any.
    stream: Option<CancelHandle>,
    viewport: Bounds,
}

impl<D: Document> Session<D> {
    pub fn new(document: D) -> Self {
        Self {
            document,
            messages: Vec::new(),
            pending: None,
            stream: None,
            viewport: Bounds::DEFAULT_FRAME,
        }
    }

    /// Sets the visible frame used for later snapshots.
    pub fn set_viewport(&mut self, viewport: Bounds) {
        self.viewport = viewport;
    }

    /// Read access to the canvas document.
    pub fn document(&self) -> &D {
        &self.document
    }

    pub fn messages(&self) -> &[SessionMessage] {
        &self.messages
    }

    pub fn is_busy(&self) -> bool {
        self.pending.is_some()
    }

    fn pending_mut(&mut self) -> Option<&mut SessionMessage> {
        self.pending.and_then(|i| self.messages.get_mut(i))
    }

    /// Records the user message and a pending assistant reply, then
    /// snapshots the canvas.
    ///
    /// Fails with [`AiError::Busy`] while another turn is pending.
    pub fn begin_turn(&mut self, message: &str) -> Result<Prompt, AiError> {
        if self.stream.as_ref().is_some_and(CancelHandle::is_settled) {
            debug!("closing reply of a stream that was never run");
            self.cancel_pending();
        }
        if self.is_busy() {
            return Err(AiError::Busy);
        }
        self.messages
            .push(SessionMessage::new(Role::User, message, MessageState::Done));
        self.messages.push(SessionMessage::new(
            Role::Assistant,
            THINKING,
            MessageState::Pending,
        ));
        self.pending = Some(self.messages.len() - 1);
        Ok(encode_prompt(&self.document, message, self.viewport, None))
    }

    /// Resolves the pending reply to an error message.
    pub fn fail_turn(&mut self, error: &AiError) {
        if let Some(msg) = self.pending_mut() {
            msg.state = MessageState::Failed;
            msg.content = format!("Sorry, something went wrong: {error}");
        }
        self.pending = None;
        self.stream = None;
    }

    /// Marks the pending reply as cancelled; applied changes stay.
    pub fn cancel_pending(&mut self) {
        if let Some(msg) = self.pending_mut() {
            msg.state = MessageState::Cancelled;
            if msg.content == THINKING {
                msg.content = CANCELLED.to_string();
            }
        }
        self.pending = None;
        self.stream = None;
    }

    fn set_response_type(&mut self, response_type: ResponseType) {
        if let Some(msg) = self.pending_mut() {
            msg.response_type = Some(response_type);
        }
    }

    fn record_strategy(&mut self, strategy: &str) {
        if let Some(msg) = self.pending_mut() {
            if msg.strategy.is_none() && !strategy.is_empty() {
                msg.strategy = Some(strategy.to_string());
            }
        }
    }

    fn record_intent(&mut self, intent: &str) {
        if intent.is_empty() {
            return;
        }
        if let Some(msg) = self.pending_mut() {
            if msg.intents.last().map(String::as_str) != Some(intent) {
                msg.intents.push(intent.to_string());
            }
        }
    }

    fn finish(&mut self, content: String) {
        if let Some(msg) = self.pending_mut() {
            msg.state = MessageState::Done;
            msg.content = content;
        }
        self.pending = None;
        self.stream = None;
    }

    fn apply_change(&mut self, report: &mut ApplyReport, change: &Change) -> bool {
        let index = report.applied + report.failures.len();
        let single = applier::apply(&mut self.document, std::slice::from_ref(change));
        report.applied += single.applied;
        report
            .failures
            .extend(single.failures.into_iter().map(|mut f| {
                f.index = index;
                f
            }));
        single.applied > 0
    }

    /// Runs a unified turn: one call that either chats or draws.
    pub async fn submit_process(
        &mut self,
        service: &dyn AiService,
        message: &str,
    ) -> Result<TurnOutcome, AiError> {
        let prompt = self.begin_turn(message)?;
        let response = match service.process_response(&prompt).await {
            Ok(response) => response,
            Err(e) => {
                self.fail_turn(&e);
                return Err(e);
            }
        };

        let mut report = ApplyReport::default();
        match response {
            AiResponse::Chat { content } => {
                self.set_response_type(ResponseType::Chat);
                self.finish(content);
                Ok(TurnOutcome {
                    response_type: ResponseType::Chat,
                    report,
                    cancelled: false,
                })
            }
            AiResponse::Drawing { strategy, events } => {
                self.set_response_type(ResponseType::Drawing);
                self.record_strategy(&strategy);
                for (i, event) in events.iter().enumerate() {
                    let mut changed = false;
                    for change in decoder::decode_at(&prompt, i, event) {
                        changed |= self.apply_change(&mut report, &change);
                    }
                    if changed {
                        let intent = event.get("intent").and_then(|v| v.as_str()).unwrap_or("");
                        self.record_intent(intent);
                    }
                }
                info!(
                    applied = report.applied,
                    failed = report.failures.len(),
                    "drawing turn finished"
                );
                self.finish(DONE.to_string());
                Ok(TurnOutcome {
                    response_type: ResponseType::Drawing,
                    report,
                    cancelled: false,
                })
            }
        }
    }

    /// Starts a streaming turn; drive it with [`Session::run_stream`].
    pub fn begin_stream(
        &mut self,
        service: &dyn AiService,
        message: &str,
    ) -> Result<(ChangeStream, CancelHandle), AiError> {
        let prompt = self.begin_turn(message)?;
        self.set_response_type(ResponseType::Drawing);
        let (stream, handle) = service.stream(prompt);
        self.stream = Some(handle.clone());
        Ok((stream, handle))
    }

    /// Applies changes as they arrive until the stream ends.
    pub async fn run_stream(&mut self, mut stream: ChangeStream) -> Result<TurnOutcome, AiError> {
        let mut report = ApplyReport::default();
        while let Some(item) = stream.next().await {
            if let Some(strategy) = stream.strategy() {
                let strategy = strategy.to_string();
                self.record_strategy(&strategy);
            }
            match item {
                Ok(change) => {
                    if self.apply_change(&mut report, &change) {
                        self.record_intent(change.description());
                    }
                }
                Err(e) => {
                    warn!(error = %e, applied = report.applied, "streaming turn failed");
                    self.fail_turn(&e);
                    return Err(e);
                }
            }
        }
        if let Some(strategy) = stream.strategy() {
            let strategy = strategy.to_string();
            self.record_strategy(&strategy);
        }

        let cancelled = stream.state() == StreamState::Cancelled;
        if cancelled {
            debug!(applied = report.applied, "streaming turn cancelled");
            self.cancel_pending();
        } else {
            self.finish(DONE.to_string());
        }
        Ok(TurnOutcome {
            response_type: ResponseType::Drawing,
            report,
            cancelled,
        })
    }

    /// Runs a streaming turn to completion.
    pub async fn submit_stream(
        &mut self,
        service: &dyn AiService,
        message: &str,
    ) -> Result<TurnOutcome, AiError> {
        let (stream, _handle) = self.begin_stream(service, message)?;
        self.run_stream(stream).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::InMemoryDocument;
    use crate::service::CanvasAiService;
    use crate::test_helpers::{ChunkedLLM, FailingLLM};
    use std::sync::Arc;
    use std::time::Duration;

    fn session() -> Session<InMemoryDocument> {
        Session::new(InMemoryDocument::new())
    }

    fn service(reply: &str) -> CanvasAiService {
        CanvasAiService::new(Arc::new(ChunkedLLM::new(reply, 9)))
    }

    #[test]
    fn second_turn_is_rejected_while_pending() {
        let mut s = session();
        s.begin_turn("one").unwrap();
        assert!(matches!(s.begin_turn("two"), Err(AiError::Busy)));
        assert_eq!(s.messages().len(), 2);
        assert_eq!(s.messages()[1].content, THINKING);
    }

    #[tokio::test]
    async fn failure_never_leaves_thinking() {
        let mut s = session();
        let svc = CanvasAiService::new(Arc::new(FailingLLM::upfront()));
        assert!(s.submit_process(&svc, "hi").await.is_err());
        let reply = &s.messages()[1];
        assert_eq!(reply.state, MessageState::Failed);
        assert_ne!(reply.content, THINKING);
        assert!(!s.is_busy());
    }

    #[tokio::test]
    async fn chat_turn_leaves_document_alone() {
        let mut s = session();
        let outcome = s
            .submit_process(&service(r#"{"responseType":"chat","content":"Paris."}"#), "capital?")
            .await
            .unwrap();
        assert_eq!(outcome.response_type, ResponseType::Chat);
        assert_eq!(s.document().version(), 0);
        let reply = &s.messages()[1];
        assert_eq!(reply.content, "Paris.");
        assert_eq!(reply.state, MessageState::Done);
    }

    #[tokio::test]
    async fn drawing_turn_records_strategy_and_intents() {
        let answer = r#"{"responseType":"drawing","long_description_of_strategy":"box then arrow","events":[
            {"type":"create","intent":"box","shape":{"type":"rectangle","shapeId":"b","x":0,"y":0,"width":50,"height":50}},
            {"type":"move","intent":"ghost move","shapeId":"nope","x":1,"y":1},
            {"type":"create","intent":"arrow","shape":{"type":"arrow","shapeId":"a","x1":60,"y1":25,"x2":120,"y2":25,"fromId":"b"}}
        ]}"#;
        let mut s = session();
        let outcome = s.submit_process(&service(answer), "draw").await.unwrap();
        assert_eq!(outcome.report.applied, 3);
        assert_eq!(outcome.report.failures.len(), 1);
        let reply = &s.messages()[1];
        assert_eq!(reply.strategy.as_deref(), Some("box then arrow"));
        assert_eq!(reply.intents, ["box", "arrow"]);
        assert_eq!(reply.content, DONE);
        assert_eq!(s.document().binding_count(), 1);
    }

    #[tokio::test]
    async fn streaming_turn_applies_as_it_goes() {
        let answer = r#"{"long_description_of_strategy":"two notes","events":[
            {"type":"create","intent":"first","shape":{"type":"note","shapeId":"n1","x":0,"y":0,"text":"a"}},
            {"type":"create","intent":"second","shape":{"type":"note","shapeId":"n2","x":300,"y":0,"text":"b"}}
        ]}"#;
        let mut s = session();
        let outcome = s.submit_stream(&service(answer), "notes").await.unwrap();
        assert!(!outcome.cancelled);
        assert_eq!(s.document().shape_count(), 2);
        let reply = &s.messages()[1];
        assert_eq!(reply.intents, ["first", "second"]);
        assert_eq!(reply.strategy.as_deref(), Some("two notes"));
        assert_eq!(reply.state, MessageState::Done);
    }

    #[tokio::test]
    async fn cancelled_stream_keeps_applied_changes() {
        let answer = r#"{"events":[
            {"type":"create","shape":{"type":"note","shapeId":"n1","x":0,"y":0}},
            {"type":"create","shape":{"type":"note","shapeId":"n2","x":300,"y":0}}
        ]}"#;
        let llm = ChunkedLLM::new(answer, 8).with_delay(Duration::from_millis(2));
        let svc = CanvasAiService::new(Arc::new(llm));
        let mut s = session();
        let (mut stream, handle) = s.begin_stream(&svc, "notes").unwrap();
        let first = stream.next().await.unwrap().unwrap();
        applier::apply(&mut s.document, &[first]);
        handle.cancel();
        let outcome = s.run_stream(stream).await.unwrap();
        assert!(outcome.cancelled);
        assert_eq!(s.document().shape_count(), 1);
        assert_eq!(s.messages()[1].state, MessageState::Cancelled);
        assert!(!s.is_busy());
    }

    #[tokio::test]
    async fn dropped_stream_does_not_block_the_next_turn() {
        let llm = ChunkedLLM::new(r#"{"events":[]}"#, 4).with_delay(Duration::from_millis(5));
        let svc = CanvasAiService::new(Arc::new(llm));
        let mut s = session();
        let (stream, handle) = s.begin_stream(&svc, "first").unwrap();
        assert!(matches!(s.begin_turn("too soon"), Err(AiError::Busy)));
        drop(stream);
        drop(handle);

        let chat = service(r#"{"responseType":"chat","content":"ok"}"#);
        assert!(s.submit_process(&chat, "second").await.is_ok());
        assert_eq!(s.messages()[1].state, MessageState::Cancelled);
        assert_eq!(s.messages()[1].content, CANCELLED);
        assert_eq!(s.messages()[3].content, "ok");
        assert!(!s.is_busy());
    }
}
