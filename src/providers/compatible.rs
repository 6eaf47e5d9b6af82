//! OpenAI-compatible provider.
//!
//! Talks to the Responses API (`/v1/responses`) first. Endpoints that answer
//! 404 there are retried once through `/v1/chat/completions`, which most
//! self-hosted gateways still expose.

use crate::providers::traits::Provider;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com";

pub struct OpenAiCompatibleProvider {
    pub(crate) name: String,
    pub(crate) base_url: String,
    pub(crate) api_key: Option<String>,
    client: Client,
}

impl OpenAiCompatibleProvider {
    pub fn new(name: &str, base_url: &str, api_key: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.map(ToString::to_string),
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(120))
                .connect_timeout(std::time::Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }

    fn path_ends_with(&self, suffix: &str) -> bool {
        if let Ok(url) = reqwest::Url::parse(&self.base_url) {
            return url.path().trim_end_matches('/').ends_with(suffix);
        }

        self.base_url.trim_end_matches('/').ends_with(suffix)
    }

    fn has_explicit_api_path(&self) -> bool {
        let Ok(url) = reqwest::Url::parse(&self.base_url) else {
            return false;
        };

        let path = url.path().trim_end_matches('/');
        !path.is_empty() && path != "/"
    }

    /// Full Responses API URL. A base that already names `/responses` is used as is.
    fn responses_url(&self) -> String {
        if self.path_ends_with("/responses") {
            return self.base_url.clone();
        }

        let normalized_base = self.base_url.trim_end_matches('/');

        if let Some(prefix) = normalized_base.strip_suffix("/chat/completions") {
            return format!("{prefix}/responses");
        }

        // Bases with their own API path (`/v1`, `/openai`) get the suffix directly.
        if self.has_explicit_api_path() {
            format!("{normalized_base}/responses")
        } else {
            format!("{normalized_base}/v1/responses")
        }
    }

    /// Full chat completions URL, derived the same way as [`Self::responses_url`].
    fn chat_completions_url(&self) -> String {
        if self.path_ends_with("/chat/completions") {
            return self.base_url.clone();
        }

        let normalized_base = self.base_url.trim_end_matches('/');

        if let Some(prefix) = normalized_base.strip_suffix("/responses") {
            return format!("{prefix}/chat/completions");
        }

        if self.has_explicit_api_path() {
            format!("{normalized_base}/chat/completions")
        } else {
            format!("{normalized_base}/v1/chat/completions")
        }
    }

    fn api_key(&self) -> anyhow::Result<&str> {
        self.api_key.as_deref().ok_or_else(|| {
            anyhow::anyhow!(
                "{} API key not set. Set OPENAI_API_KEY or provider.api_key in config.toml.",
                self.name
            )
        })
    }
}

// ── Responses API ────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ResponsesRequest {
    model: String,
    input: Vec<InputMessage>,
    max_output_tokens: u32,
}

#[derive(Debug, Serialize)]
struct InputMessage {
    role: &'static str,
    content: String,
}

fn input_messages(system_prompt: Option<&str>, message: &str) -> Vec<InputMessage> {
    let mut input = Vec::with_capacity(2);
    if let Some(system) = system_prompt {
        input.push(InputMessage {
            role: "system",
            content: system.to_string(),
        });
    }
    input.push(InputMessage {
        role: "user",
        content: message.to_string(),
    });
    input
}

#[derive(Debug, Deserialize)]
struct ResponsesResponse {
    #[serde(default)]
    output: Vec<ResponsesOutput>,
    #[serde(default)]
    output_text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponsesOutput {
    #[serde(default)]
    content: Vec<ResponsesContent>,
}

#[derive(Debug, Deserialize)]
struct ResponsesContent {
    #[serde(rename = "type")]
    kind: Option<String>,
    text: Option<String>,
}

/// First text that is not blank, returned byte-for-byte.
fn first_nonempty(text: Option<&str>) -> Option<String> {
    text.filter(|value| !value.trim().is_empty())
        .map(ToString::to_string)
}

fn extract_responses_text(response: &ResponsesResponse) -> Option<String> {
    if let Some(text) = first_nonempty(response.output_text.as_deref()) {
        return Some(text);
    }

    let contents = || response.output.iter().flat_map(|item| item.content.iter());

    contents()
        .filter(|content| content.kind.as_deref() == Some("output_text"))
        .find_map(|content| first_nonempty(content.text.as_deref()))
        .or_else(|| contents().find_map(|content| first_nonempty(content.text.as_deref())))
}

// ── Chat completions fallback ────────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<InputMessage>,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ApiChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiCompatibleProvider {
    async fn chat_via_completions(
        &self,
        api_key: &str,
        system_prompt: Option<&str>,
        message: &str,
        model: &str,
        max_output_tokens: u32,
    ) -> anyhow::Result<String> {
        let request = ChatRequest {
            model: model.to_string(),
            messages: input_messages(system_prompt, message),
            max_tokens: max_output_tokens,
        };

        let response = self
            .client
            .post(self.chat_completions_url())
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(super::api_error(&self.name, response).await);
        }

        let chat_response: ApiChatResponse = response.json().await?;

        chat_response
            .choices
            .into_iter()
            .find_map(|c| first_nonempty(c.message.content.as_deref()))
            .ok_or_else(|| anyhow::anyhow!("No response from {}", self.name))
    }
}

#[async_trait]
impl Provider for OpenAiCompatibleProvider {
    async fn chat_with_system(
        &self,
        system_prompt: Option<&str>,
        message: &str,
        model: &str,
        max_output_tokens: u32,
    ) -> anyhow::Result<String> {
        let api_key = self.api_key()?;

        let request = ResponsesRequest {
            model: model.to_string(),
            input: input_messages(system_prompt, message),
            max_output_tokens,
        };

        let response = self
            .client
            .post(self.responses_url())
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            if status == reqwest::StatusCode::NOT_FOUND {
                tracing::debug!(
                    provider = %self.name,
                    "Responses API unavailable, falling back to chat completions"
                );
                return self
                    .chat_via_completions(api_key, system_prompt, message, model, max_output_tokens)
                    .await
                    .map_err(|completions_err| {
                        anyhow::anyhow!(
                            "{} API error ({status}): responses unavailable; chat completions fallback failed: {completions_err}",
                            self.name
                        )
                    });
            }
            return Err(super::api_error(&self.name, response).await);
        }

        let responses: ResponsesResponse = response.json().await?;

        extract_responses_text(&responses)
            .ok_or_else(|| anyhow::anyhow!("No response from {} Responses API", self.name))
    }

    fn name(&self) -> &str {
        &self.name
    }
}
