use async_trait::async_trait;
use futures::stream::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{end_on_error, http_client, parse_method, send_checked, sse, FortuneService, ReportStream, Settings};
use crate::errors::{OracleError, OracleResult};
use crate::prompt;
use crate::wire::{FortuneMethod, UserInfo};

const API_VERSION: &str = "2023-06-01";

pub struct AnthropicService {
    settings: Settings,
    api_key: String,
    client: Client,
}

impl AnthropicService {
    pub fn new(settings: Settings, api_key: String) -> OracleResult<Self> {
        let client = http_client(&settings)?;
        Ok(Self { settings, api_key, client })
    }

    fn post(&self, body: &MsgRequest<'_>) -> reqwest::RequestBuilder {
        self.client
            .post(self.settings.url("v1/messages"))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(body)
    }
}

#[derive(Serialize)]
struct MsgRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<Msg<'a>>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Serialize)]
struct Msg<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MsgResponse {
    content: Vec<Block>,
}

#[derive(Deserialize)]
struct Block {
    #[serde(default)]
    text: String,
    #[serde(default)]
    r#type: String,
}

/// The subset of stream events that matter for text output.
#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamEvent {
    ContentBlockDelta { delta: Delta },
    Error { error: EventError },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct Delta {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct EventError {
    #[serde(default)]
    message: String,
}

#[async_trait]
impl FortuneService for AnthropicService {
    async fn select_method(&self, wish: &str) -> OracleResult<FortuneMethod> {
        let system = prompt::system_prompt_method_inline_schema(self.settings.language.as_deref());
        let user = prompt::user_prompt_method(wish);
        let body = MsgRequest {
            model: &self.settings.method_model,
            max_tokens: self.settings.max_tokens,
            system: &system,
            messages: vec![Msg { role: "user", content: &user }],
            stream: false,
        };
        tracing::debug!(model = %self.settings.method_model, "anthropic: selecting method");

        let resp = send_checked(self.post(&body), "Anthropic").await?;
        let text = resp.text().await?;
        let parsed: MsgResponse = serde_json::from_str(&text)
            .map_err(|e| OracleError::Provider(format!("anthropic response parse error: {}", e)))?;

        let content = parsed
            .content
            .into_iter()
            .find(|b| b.r#type == "text" || !b.text.is_empty())
            .map(|b| b.text)
            .ok_or_else(|| OracleError::Provider("anthropic: empty content".into()))?;
        parse_method(&content)
    }

    async fn stream_report(
        &self,
        wish: &str,
        method: &FortuneMethod,
        info: &UserInfo,
    ) -> OracleResult<ReportStream> {
        let system = prompt::system_prompt_report(method, self.settings.language.as_deref());
        let user = prompt::user_prompt_report(wish, method, info);
        let body = MsgRequest {
            model: &self.settings.report_model,
            max_tokens: self.settings.max_tokens,
            system: &system,
            messages: vec![Msg { role: "user", content: &user }],
            stream: true,
        };
        tracing::info!(model = %self.settings.report_model, method = %method.name, "anthropic: streaming report");

        let resp = send_checked(self.post(&body), "Anthropic").await?;

        let chunks = sse::data_payloads(sse::lines(resp.bytes_stream())).filter_map(|payload| async move {
            let payload = match payload {
                Ok(p) => p,
                Err(e) => return Some(Err(e)),
            };
            match serde_json::from_str::<StreamEvent>(&payload) {
                Ok(StreamEvent::ContentBlockDelta { delta }) => (!delta.text.is_empty()).then(|| Ok(delta.text)),
                Ok(StreamEvent::Error { error }) => Some(Err(OracleError::Stream(error.message))),
                Ok(StreamEvent::Other) => None,
                Err(e) => {
                    tracing::warn!(
                        "anthropic: failed to parse SSE event: {}. Data: {}",
                        e,
                        payload.chars().take(200).collect::<String>()
                    );
                    None
                }
            }
        });
        Ok(end_on_error(chunks))
    }
}
