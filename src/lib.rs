//! Core of the `sketch-tutor` canvas assistant.
//!
//! The crate turns a canvas into a [`Prompt`], asks a language model for help
//! and turns the answer into [`Change`]s a [`Document`] can apply. Chat answers
//! are told apart from drawings by [`response::classify`]; drawings can also be
//! streamed change by change through [`ChangeStream`].

pub mod abort_guard;
pub mod applier;
pub mod args;
pub mod change;
pub mod config;
pub mod decoder;
pub mod document;
pub mod error;
pub mod event;
pub mod instructions;
pub mod llm_client;
pub mod logger;
pub mod ollama_llm;
pub mod openai_llm;
pub mod prompt;
pub mod response;
pub mod scanner;
pub mod server;
pub mod service;
pub mod session;
pub mod shape;
pub mod shutdown;
pub mod snapshot;
pub mod stream;
#[cfg(test)]
mod test_helpers;
pub mod text_util;

pub use abort_guard::AbortGuard;
pub use applier::{ApplyFailure, ApplyReport, apply};
pub use change::{Change, GenerateResult};
pub use config::{Config, Provider};
pub use document::{Document, DocumentError, InMemoryDocument, RasterImage};
pub use error::AiError;
pub use event::SimpleEvent;
pub use instructions::render_template;
pub use llm_client::{BoxError, ChatRequest, LLMClient, LLMTokenStream, Token, spawn_llm_task};
pub use ollama_llm::OllamaLLM;
pub use openai_llm::OpenAiLLM;
pub use prompt::{Bounds, CanvasContent, ProcessRequest, Prompt};
pub use response::{AiResponse, ProcessedResponse};
pub use service::{AiService, CanvasAiService, PendingTitle, ServiceSettings, TitleRequest};
pub use session::Session;
pub use shape::{BindingId, BindingRecord, ShapeId, ShapePatch, ShapeProps, ShapeRecord};
pub use shutdown::shutdown_signal;
pub use snapshot::encode_prompt;
pub use stream::{CancelHandle, ChangeStream, StreamState};
