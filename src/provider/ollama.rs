use async_trait::async_trait;
use futures::stream::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{end_on_error, http_client, parse_method, send_checked, sse, FortuneService, ReportStream, Settings};
use crate::errors::{OracleError, OracleResult};
use crate::prompt;
use crate::wire::{FortuneMethod, UserInfo};

/// Local Ollama server. Streams newline-delimited JSON rather than SSE.
pub struct OllamaService {
    settings: Settings,
    client: Client,
}

impl OllamaService {
    pub fn new(settings: Settings) -> OracleResult<Self> {
        let client = http_client(&settings)?;
        Ok(Self { settings, client })
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Msg>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'a str>,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
}

#[derive(Serialize)]
struct Msg {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    message: Option<MsgOut>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct MsgOut {
    #[serde(default)]
    content: String,
}

fn to_messages(system: String, user: String) -> Vec<Msg> {
    vec![
        Msg { role: "system".into(), content: system },
        Msg { role: "user".into(), content: user },
    ]
}

#[async_trait]
impl FortuneService for OllamaService {
    async fn select_method(&self, wish: &str) -> OracleResult<FortuneMethod> {
        let url = self.settings.url("api/chat");
        let body = ChatRequest {
            model: &self.settings.method_model,
            messages: to_messages(
                prompt::system_prompt_method_inline_schema(self.settings.language.as_deref()),
                prompt::user_prompt_method(wish),
            ),
            stream: false,
            format: Some("json"),
            options: OllamaOptions { temperature: 0.7 },
        };
        tracing::debug!(%url, model = %self.settings.method_model, "ollama: selecting method");

        let resp = send_checked(self.client.post(&url).json(&body), "Ollama").await?;
        let text = resp.text().await?;

        // Fall back to the raw body when it is not the usual chat envelope.
        let content = match serde_json::from_str::<ChatResponse>(&text) {
            Ok(ChatResponse { error: Some(err), .. }) => return Err(OracleError::Provider(err)),
            Ok(ChatResponse { message: Some(m), .. }) => m.content,
            _ => text,
        };
        parse_method(&content)
    }

    async fn stream_report(
        &self,
        wish: &str,
        method: &FortuneMethod,
        info: &UserInfo,
    ) -> OracleResult<ReportStream> {
        let url = self.settings.url("api/chat");
        let body = ChatRequest {
            model: &self.settings.report_model,
            messages: to_messages(
                prompt::system_prompt_report(method, self.settings.language.as_deref()),
                prompt::user_prompt_report(wish, method, info),
            ),
            stream: true,
            format: None,
            options: OllamaOptions { temperature: 0.9 },
        };
        tracing::info!(model = %self.settings.report_model, method = %method.name, "ollama: streaming report");

        let resp = send_checked(self.client.post(&url).json(&body), "Ollama").await?;

        let chunks = sse::lines(resp.bytes_stream()).filter_map(|line| async move {
            let line = match line {
                Ok(l) if l.trim().is_empty() => return None,
                Ok(l) => l,
                Err(e) => return Some(Err(e)),
            };
            match serde_json::from_str::<ChatResponse>(&line) {
                Ok(ChatResponse { error: Some(err), .. }) => Some(Err(OracleError::Stream(err))),
                Ok(ChatResponse { message: Some(m), .. }) => (!m.content.is_empty()).then(|| Ok(m.content)),
                Ok(_) => None,
                Err(e) => {
                    tracing::warn!("ollama: skipping unparseable line: {}", e);
                    None
                }
            }
        });
        Ok(end_on_error(chunks))
    }
}
