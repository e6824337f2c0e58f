use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use std::sync::Arc;

/// Error type crossing the model boundary.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A fragment of model output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub text: String,
}

/// Stream of tokens produced by a model.
pub type LLMTokenStream = BoxStream<'static, Result<Token, BoxError>>;

/// One chat turn sent to a model.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatRequest {
    pub system: String,
    pub user: String,
    /// Images as data URLs or bare base64.
    pub images: Vec<String>,
    /// Ask the provider to constrain output to a JSON object.
    pub json: bool,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    /// Overrides the client's default model.
    pub model: Option<String>,
}

/// Common interface for chat-based LLMs.
#[async_trait]
pub trait LLMClient: Send + Sync {
    /// Streams text fragments in response to `request`.
    async fn chat_stream(&self, request: &ChatRequest) -> Result<LLMTokenStream, BoxError>;
}

/// Collects the full answer, failing on the first stream error.
pub async fn complete(llm: &dyn LLMClient, request: &ChatRequest) -> Result<String, BoxError> {
    let mut stream = llm.chat_stream(request).await?;
    let mut out = String::new();
    while let Some(tok) = stream.next().await {
        out.push_str(&tok?.text);
    }
    tracing::debug!(%out, "llm full response");
    Ok(out)
}

/// Spawn a task that collects the entire response from `llm` into a `String`.
///
/// # Examples
/// ```
/// use std::sync::Arc;
/// use async_trait::async_trait;
/// use futures::stream;
/// use sketch_tutor::{spawn_llm_task, BoxError, ChatRequest, LLMClient, LLMTokenStream, Token};
/// struct Dummy;
/// #[async_trait]
/// impl LLMClient for Dummy {
///     async fn chat_stream(&self, _: &ChatRequest) -> Result<LLMTokenStream, BoxError> {
///         let stream = stream::once(async { Ok(Token { text: "hello ".into() }) });
///         Ok(Box::pin(stream))
///     }
/// }
/// # tokio_test::block_on(async {
/// let handle = spawn_llm_task(Arc::new(Dummy), ChatRequest::default());
/// let text = handle.await.unwrap().unwrap();
/// assert_eq!(text.trim(), "hello");
/// # });
/// ```
pub fn spawn_llm_task(
    llm: Arc<dyn LLMClient>,
    request: ChatRequest,
) -> tokio::task::JoinHandle<Result<String, BoxError>> {
    tokio::spawn(async move { complete(llm.as_ref(), &request).await })
}

/// Splits a `data:<mime>;base64,<payload>` URL down to its payload.
pub(crate) fn base64_payload(image: &str) -> &str {
    match image.strip_prefix("data:") {
        Some(rest) => rest.split_once(',').map(|(_, data)| data).unwrap_or(rest),
        None => image,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{ChunkedLLM, FailingLLM};

    #[tokio::test]
    async fn complete_joins_chunks() {
        let llm = ChunkedLLM::new("hello world", 3);
        let text = complete(&llm, &ChatRequest::default()).await.unwrap();
        assert_eq!(text, "hello world");
    }

    #[tokio::test]
    async fn complete_propagates_stream_error() {
        let llm = FailingLLM::mid_stream("partial");
        assert!(complete(&llm, &ChatRequest::default()).await.is_err());
    }

    #[test]
    fn strips_data_url_prefix() {
        assert_eq!(base64_payload("data:image/png;base64,AAAA"), "AAAA");
        assert_eq!(base64_payload("AAAA"), "AAAA");
    }
}
