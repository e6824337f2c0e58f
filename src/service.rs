//! The generation orchestrator: every way of asking the model for help.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::abort_guard::AbortGuard;
use crate::change::GenerateResult;
use crate::decoder;
use crate::error::AiError;
use crate::instructions::{self, DRAWING_SYSTEM_PROMPT, SYSTEM_PROMPT};
use crate::llm_client::{self, BoxError, ChatRequest, LLMClient, spawn_llm_task};
use crate::prompt::Prompt;
use crate::response::{self, AiResponse, ProcessedResponse};
use crate::stream::{CancelHandle, ChangeStream};
use crate::text_util::{clean_title, truncate_words};

fn default_max_words() -> usize {
    5
}

/// Request for a short conversation title.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TitleRequest {
    pub question: String,
    #[serde(default = "default_max_words")]
    pub max_words: usize,
}

impl TitleRequest {
    pub fn new(question: impl Into<String>, max_words: usize) -> Self {
        Self {
            question: question.into(),
            max_words,
        }
    }

    /// Title used until, or instead of, the model's answer.
    pub fn fallback(&self) -> String {
        truncate_words(&self.question, self.max_words)
    }
}

/// A title that is usable immediately and may improve once the model answers.
pub struct PendingTitle {
    fallback: String,
    max_words: usize,
    task: Option<AbortGuard<Result<String, BoxError>>>,
}

impl PendingTitle {
    /// A title that will never change.
    pub fn ready(title: String) -> Self {
        Self {
            max_words: title.split_whitespace().count(),
            fallback: title,
            task: None,
        }
    }

    /// The fallback title.
    pub fn provisional(&self) -> &str {
        &self.fallback
    }

    /// Waits for the model; falls back on failure or an empty answer.
    ///
    /// The result never has more than the requested number of words.
    pub async fn resolve(self) -> String {
        let Some(task) = self.task else {
            return self.fallback;
        };
        let raw = match task.await {
            Some(Ok(Ok(raw))) => raw,
            Some(Ok(Err(e))) => {
                warn!(error = %e, "title generation failed; using fallback");
                return self.fallback;
            }
            Some(Err(e)) => {
                warn!(error = %e, "title task failed; using fallback");
                return self.fallback;
            }
            None => return self.fallback,
        };
        let title = truncate_words(&clean_title(&raw), self.max_words);
        if title.is_empty() {
            debug!("model returned an empty title; using fallback");
            return self.fallback;
        }
        title
    }
}

/// Operation modes offered to the canvas.
#[async_trait]
pub trait AiService: Send + Sync {
    /// One model call, decoded into the full set of changes.
    async fn generate(&self, prompt: &Prompt) -> Result<GenerateResult, AiError>;

    /// Starts a title request; the fallback is available at once.
    fn generate_title(&self, request: TitleRequest) -> PendingTitle;

    /// Streams changes as the model writes them.
    fn stream(&self, prompt: Prompt) -> (ChangeStream, CancelHandle);

    /// One model call, classified as chat or drawing.
    async fn process_response(&self, prompt: &Prompt) -> Result<AiResponse, AiError>;

    /// Unified mode: classification and decoding in one step.
    async fn process(&self, prompt: &Prompt) -> Result<ProcessedResponse, AiError> {
        Ok(match self.process_response(prompt).await? {
            AiResponse::Chat { content } => ProcessedResponse::Chat { content },
            AiResponse::Drawing { strategy, events } => ProcessedResponse::Drawing {
                result: GenerateResult {
                    changes: decoder::decode_all(prompt, &events),
                },
                strategy,
                events,
            },
        })
    }
}

/// Models used by [`CanvasAiService`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ServiceSettings {
    /// Model for drawing and chat; `None` uses the client's default.
    pub model: Option<String>,
    /// Model for titles; `None` uses the client's default.
    pub title_model: Option<String>,
    pub temperature: Option<f32>,
}

/// [`AiService`] backed by a single [`LLMClient`].
#[derive(Clone)]
pub struct CanvasAiService {
    llm: Arc<dyn LLMClient>,
    settings: ServiceSettings,
}

impl CanvasAiService {
    pub fn new(llm: Arc<dyn LLMClient>) -> Self {
        Self::with_settings(llm, ServiceSettings::default())
    }

    pub fn with_settings(llm: Arc<dyn LLMClient>, settings: ServiceSettings) -> Self {
        Self { llm, settings }
    }

    fn request(&self, prompt: &Prompt, system: &str, json: bool) -> Result<ChatRequest, AiError> {
        let mut req = instructions::prompt_request(prompt, system, json)?;
        req.model = self.settings.model.clone();
        req.temperature = self.settings.temperature;
        Ok(req)
    }

    async fn call(&self, request: &ChatRequest) -> Result<String, AiError> {
        llm_client::complete(self.llm.as_ref(), request)
            .await
            .map_err(|e| {
                error!(error = %e, "model call failed");
                AiError::Model(e)
            })
    }
}

#[async_trait]
impl AiService for CanvasAiService {
    async fn generate(&self, prompt: &Prompt) -> Result<GenerateResult, AiError> {
        let request = self.request(prompt, &DRAWING_SYSTEM_PROMPT, true)?;
        let text = self.call(&request).await?;
        let events = response::parse_events(&text)?;
        let changes = decoder::decode_all(prompt, &events);
        debug!(events = events.len(), changes = changes.len(), "generated changes");
        Ok(GenerateResult { changes })
    }

    fn generate_title(&self, request: TitleRequest) -> PendingTitle {
        let fallback = request.fallback();
        let mut chat = match instructions::title_request(&request.question, request.max_words) {
            Ok(chat) => chat,
            Err(e) => {
                warn!(error = %e, "could not build title request");
                return PendingTitle::ready(fallback);
            }
        };
        chat.model = self.settings.title_model.clone();
        PendingTitle {
            fallback,
            max_words: request.max_words,
            task: Some(AbortGuard::new(spawn_llm_task(self.llm.clone(), chat))),
        }
    }

    fn stream(&self, prompt: Prompt) -> (ChangeStream, CancelHandle) {
        // Streaming parses the envelope itself, so JSON mode is left off.
        let request = self.request(&prompt, &DRAWING_SYSTEM_PROMPT, false);
        ChangeStream::new(self.llm.clone(), request, prompt)
    }

    async fn process_response(&self, prompt: &Prompt) -> Result<AiResponse, AiError> {
        let request = self.request(prompt, &SYSTEM_PROMPT, true)?;
        let text = self.call(&request).await?;
        let res = response::classify(&text);
        if let Err(e) = &res {
            error!(error = %e, "unusable model response");
        }
        res
    }
}
