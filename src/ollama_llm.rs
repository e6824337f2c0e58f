use async_trait::async_trait;
use futures::StreamExt;
use ollama_rs::{
    Ollama,
    generation::{
        chat::{ChatMessage, ChatMessageResponseStream, request::ChatMessageRequest},
        images::Image,
        parameters::FormatType,
    },
    models::ModelOptions,
};
use url::Url;

use crate::llm_client::{BoxError, ChatRequest, LLMClient, LLMTokenStream, Token, base64_payload};

/// Build a chat request for the given model.
fn build_request(model: &str, request: &ChatRequest) -> ChatMessageRequest {
    let mut user = ChatMessage::user(request.user.clone());
    if !request.images.is_empty() {
        let images = request
            .images
            .iter()
            .map(|img| Image::from_base64(base64_payload(img)))
            .collect();
        user = user.with_images(images);
    }
    let mut messages = Vec::with_capacity(2);
    if !request.system.is_empty() {
        messages.push(ChatMessage::system(request.system.clone()));
    }
    messages.push(user);

    let mut options = ModelOptions::default();
    if let Some(temperature) = request.temperature {
        tracing::trace!(%temperature, "llm temperature");
        options = options.temperature(temperature);
    }
    if let Some(max) = request.max_tokens {
        options = options.num_predict(max as i32);
    }
    let model = request.model.as_deref().unwrap_or(model);
    let mut req = ChatMessageRequest::new(model.to_string(), messages).options(options);
    if request.json {
        req = req.format(FormatType::Json);
    }
    req
}

/// Map an Ollama response stream into a [`LLMTokenStream`].
fn map_stream(stream: ChatMessageResponseStream) -> LLMTokenStream {
    let mapped = stream.map(|res| match res {
        Ok(resp) => {
            let tok = resp.message.content;
            tracing::trace!(%tok, "llm token");
            Ok(Token { text: tok })
        }
        Err(e) => {
            tracing::error!(?e, "ollama stream error");
            Err(BoxError::from(format!("ollama stream error: {e:?}")))
        }
    });
    Box::pin(mapped)
}

/// [`LLMClient`] implementation backed by [`Ollama`].
#[derive(Clone)]
pub struct OllamaLLM {
    client: Ollama,
    model: String,
}

impl OllamaLLM {
    /// Creates a new Ollama-backed client.
    pub fn new(client: Ollama, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }

    /// Connects to the server at `base_url` using `http`.
    pub fn from_url(
        base_url: &str,
        http: reqwest::Client,
        model: impl Into<String>,
    ) -> Result<Self, BoxError> {
        let url = Url::parse(base_url)?;
        let host = format!(
            "{}://{}",
            url.scheme(),
            url.host_str().ok_or("ollama url has no host")?
        );
        let port = url.port_or_known_default().ok_or("ollama url has no port")?;
        let client = Ollama::builder()
            .host(host.as_str())
            .port(port)
            .reqwest_client(http)
            .build();
        Ok(Self::new(client, model))
    }

    /// Returns the configured model name.
    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl LLMClient for OllamaLLM {
    async fn chat_stream(&self, request: &ChatRequest) -> Result<LLMTokenStream, BoxError> {
        let req = build_request(&self.model, request);
        tracing::debug!(model = %self.model, json = request.json, images = request.images.len(), "ollama chat request");
        let stream = self.client.send_chat_messages_stream(req).await?;
        Ok(map_stream(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use reqwest::Client;

    const BODY: &str = concat!(
        "{\"model\":\"m\",\"created_at\":\"n\",\"message\":{\"role\":\"assistant\",\"content\":\"he\"},\"done\":false}\n",
        "{\"model\":\"m\",\"created_at\":\"n\",\"message\":{\"role\":\"assistant\",\"content\":\"llo\"},\"done\":true}"
    );

    fn llm_for(server: &MockServer) -> OllamaLLM {
        let http = Client::builder()
            .pool_max_idle_per_host(10)
            .build()
            .unwrap();
        OllamaLLM::from_url(&server.base_url(), http, "m").unwrap()
    }

    #[tokio::test]
    async fn yields_all_tokens() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/chat");
                then.status(200).body(BODY);
            })
            .await;

        let llm = llm_for(&server);
        let req = ChatRequest {
            user: "hi".into(),
            ..ChatRequest::default()
        };
        let mut stream = llm.chat_stream(&req).await.unwrap();
        let mut collected = String::new();
        while let Some(tok) = stream.next().await {
            collected.push_str(&tok.unwrap().text);
        }
        assert_eq!(collected, "hello");
    }

    #[tokio::test]
    async fn sends_json_format_images_and_model_override() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/chat")
                    .body_contains("\"format\":\"json\"")
                    .body_contains("\"images\":[\"AAAA\"]")
                    .body_contains("\"model\":\"vision\"");
                then.status(200).body(BODY);
            })
            .await;

        let llm = llm_for(&server);
        let req = ChatRequest {
            system: "sys".into(),
            user: "draw".into(),
            images: vec!["data:image/png;base64,AAAA".into()],
            json: true,
            model: Some("vision".into()),
            ..ChatRequest::default()
        };
        let mut stream = llm.chat_stream(&req).await.unwrap();
        while stream.next().await.is_some() {}
        mock.assert_async().await;
    }

    #[test]
    fn rejects_url_without_host() {
        assert!(OllamaLLM::from_url("not a url", Client::new(), "m").is_err());
    }
}
