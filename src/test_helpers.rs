#![cfg(test)]

use async_trait::async_trait;
use futures::stream;
use std::sync::Mutex;
use std::time::Duration;

use crate::llm_client::{BoxError, ChatRequest, LLMClient, LLMTokenStream, Token};

/// [`LLMClient`] that returns a fixed reply split into fixed-size chunks.
#[derive(Clone)]
pub struct ChunkedLLM {
    pub reply: String,
    pub chunk: usize,
    pub delay: Option<Duration>,
}

impl ChunkedLLM {
    pub fn new(reply: impl Into<String>, chunk: usize) -> Self {
        Self {
            reply: reply.into(),
            chunk: chunk.max(1),
            delay: None,
        }
    }

    /// Sleeps before every chunk.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn chunks(&self) -> Vec<String> {
        let chars: Vec<char> = self.reply.chars().collect();
        chars
            .chunks(self.chunk)
            .map(|c| c.iter().collect())
            .collect()
    }
}

#[async_trait]
impl LLMClient for ChunkedLLM {
    async fn chat_stream(&self, _request: &ChatRequest) -> Result<LLMTokenStream, BoxError> {
        let chunks = self.chunks();
        let delay = self.delay;
        let s = async_stream::stream! {
            for text in chunks {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                yield Ok(Token { text });
            }
        };
        Ok(Box::pin(s))
    }
}

/// [`LLMClient`] that fails, either before streaming or after a prefix.
#[derive(Clone)]
pub struct FailingLLM {
    prefix: Option<String>,
}

impl FailingLLM {
    pub fn upfront() -> Self {
        Self { prefix: None }
    }

    pub fn mid_stream(prefix: impl Into<String>) -> Self {
        Self {
            prefix: Some(prefix.into()),
        }
    }
}

#[async_trait]
impl LLMClient for FailingLLM {
    async fn chat_stream(&self, _request: &ChatRequest) -> Result<LLMTokenStream, BoxError> {
        let Some(prefix) = self.prefix.clone() else {
            return Err("connection refused".into());
        };
        let items: Vec<Result<Token, BoxError>> = vec![
            Ok(Token { text: prefix }),
            Err("connection reset".into()),
        ];
        Ok(Box::pin(stream::iter(items)))
    }
}

/// [`LLMClient`] that records requests and answers with a fixed reply.
#[derive(Default)]
pub struct RecordingLLM {
    pub reply: String,
    pub requests: Mutex<Vec<ChatRequest>>,
}

impl RecordingLLM {
    pub fn new(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn last_request(&self) -> Option<ChatRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl LLMClient for RecordingLLM {
    async fn chat_stream(&self, request: &ChatRequest) -> Result<LLMTokenStream, BoxError> {
        self.requests.lock().unwrap().push(request.clone());
        let reply = self.reply.clone();
        Ok(Box::pin(stream::once(async move { Ok(Token { text: reply }) })))
    }
}
