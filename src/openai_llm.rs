use async_stream::stream;
use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, trace};

use crate::llm_client::{BoxError, ChatRequest, LLMClient, LLMTokenStream, Token};

#[derive(Deserialize)]
struct Chunk {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    #[serde(default)]
    delta: Delta,
}

#[derive(Deserialize, Default)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}

/// Chat client for OpenAI-compatible `/v1/chat/completions` endpoints.
#[derive(Clone, Debug)]
pub struct OpenAiLLM {
    http: reqwest::Client,
    /// Base URL such as `https://api.openai.com`.
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl OpenAiLLM {
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            api_key,
            model: model.into(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn body(&self, request: &ChatRequest) -> Value {
        let mut messages = Vec::with_capacity(2);
        if !request.system.is_empty() {
            messages.push(json!({ "role": "system", "content": request.system }));
        }
        let user = if request.images.is_empty() {
            json!(request.user)
        } else {
            let mut parts = vec![json!({ "type": "text", "text": request.user })];
            parts.extend(request.images.iter().map(|url| {
                let url = if url.starts_with("data:") || url.starts_with("http") {
                    url.clone()
                } else {
                    format!("data:image/png;base64,{url}")
                };
                json!({ "type": "image_url", "image_url": { "url": url } })
            }));
            Value::Array(parts)
        };
        messages.push(json!({ "role": "user", "content": user }));

        let mut body = json!({
            "model": request.model.as_deref().unwrap_or(&self.model),
            "messages": messages,
            "stream": true,
        });
        if let Some(max) = request.max_tokens {
            body["max_tokens"] = json!(max);
        }
        if let Some(temperature) = request.temperature {
            body["temperature"] = json!(temperature);
        }
        if request.json {
            body["response_format"] = json!({ "type": "json_object" });
        }
        body
    }
}

/// Extracts the token carried by one SSE line, if any.
///
/// Returns `Err(())` on the `[DONE]` sentinel.
fn parse_line(line: &str) -> Result<Option<String>, ()> {
    let Some(data) = line.strip_prefix("data:") else {
        return Ok(None);
    };
    let data = data.trim();
    if data == "[DONE]" {
        return Err(());
    }
    match serde_json::from_str::<Chunk>(data) {
        Ok(chunk) => Ok(chunk
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.delta.content)
            .filter(|c| !c.is_empty())),
        Err(e) => {
            debug!(target = "llm", error = %e, %data, "unreadable completion chunk");
            Ok(None)
        }
    }
}

#[async_trait]
impl LLMClient for OpenAiLLM {
    async fn chat_stream(&self, request: &ChatRequest) -> Result<LLMTokenStream, BoxError> {
        let url = format!(
            "{}/v1/chat/completions",
            self.base_url.trim_end_matches('/')
        );
        let body = self.body(request);
        trace!(target = "llm", %url, "openai prompt");
        let mut req = self.http.post(url).json(&body);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(format!("completion request failed with {status}: {text}").into());
        }

        let mut bytes = resp.bytes_stream();
        let out = stream! {
            let mut pending: Vec<u8> = Vec::new();
            'read: while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(b) => b,
                    Err(e) => {
                        yield Err(BoxError::from(e));
                        break;
                    }
                };
                pending.extend_from_slice(&chunk);
                while let Some(nl) = pending.iter().position(|b| *b == b'\n') {
                    let line: Vec<u8> = pending.drain(..=nl).collect();
                    let line = String::from_utf8_lossy(&line);
                    match parse_line(line.trim_end()) {
                        Ok(Some(text)) => {
                            trace!(target = "llm", token = %text, "stream token");
                            yield Ok(Token { text });
                        }
                        Ok(None) => {}
                        Err(()) => break 'read,
                    }
                }
            }
        };
        Ok(Box::pin(out))
    }
}
