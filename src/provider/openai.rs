use async_trait::async_trait;
use futures::stream::StreamExt;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use super::{end_on_error, http_client, parse_method, send_checked, sse, FortuneService, ReportStream, Settings};
use crate::errors::{OracleError, OracleResult};
use crate::prompt;
use crate::wire::{FortuneMethod, UserInfo};

/// Chat-completions provider. Method selection uses JSON mode; the report
/// is read from the SSE delta stream.
pub struct OpenAIService {
    settings: Settings,
    api_key: String,
    client: Client,
}

impl OpenAIService {
    pub fn new(settings: Settings, api_key: String) -> OracleResult<Self> {
        let client = http_client(&settings)?;
        Ok(Self { settings, api_key, client })
    }
}

#[derive(Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChunkChoice {
    delta: ChunkDelta,
}

#[derive(Deserialize)]
struct ChatChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    error: Option<ChunkError>,
}

#[derive(Deserialize)]
struct ChunkError {
    message: String,
}

#[async_trait]
impl FortuneService for OpenAIService {
    async fn select_method(&self, wish: &str) -> OracleResult<FortuneMethod> {
        let body = json!({
            "model": self.settings.method_model,
            "messages": [
                { "role": "system", "content": prompt::system_prompt_method_inline_schema(self.settings.language.as_deref()) },
                { "role": "user", "content": prompt::user_prompt_method(wish) }
            ],
            "temperature": 0.7,
            // Force a valid JSON object in the response.
            "response_format": { "type": "json_object" }
        });
        tracing::debug!(model = %self.settings.method_model, "openai: selecting method");

        let resp = send_checked(
            self.client
                .post(self.settings.url("v1/chat/completions"))
                .bearer_auth(&self.api_key)
                .json(&body),
            "OpenAI",
        )
        .await?;
        let text = resp.text().await?;

        let parsed: ChatResponse = serde_json::from_str(&text)
            .map_err(|e| OracleError::Provider(format!("failed to parse OpenAI response: {e}\nRaw: {text}")))?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        parse_method(&content)
    }

    async fn stream_report(
        &self,
        wish: &str,
        method: &FortuneMethod,
        info: &UserInfo,
    ) -> OracleResult<ReportStream> {
        let body = json!({
            "model": self.settings.report_model,
            "messages": [
                { "role": "system", "content": prompt::system_prompt_report(method, self.settings.language.as_deref()) },
                { "role": "user", "content": prompt::user_prompt_report(wish, method, info) }
            ],
            "max_tokens": self.settings.max_tokens,
            "stream": true
        });
        tracing::info!(model = %self.settings.report_model, method = %method.name, "openai: streaming report");

        let resp = send_checked(
            self.client
                .post(self.settings.url("v1/chat/completions"))
                .bearer_auth(&self.api_key)
                .json(&body),
            "OpenAI",
        )
        .await?;

        let chunks = sse::data_payloads(sse::lines(resp.bytes_stream())).filter_map(|payload| async move {
            let payload = match payload {
                Ok(p) => p,
                Err(e) => return Some(Err(e)),
            };
            match serde_json::from_str::<ChatChunk>(&payload) {
                Ok(ChatChunk { error: Some(err), .. }) => Some(Err(OracleError::Stream(err.message))),
                Ok(chunk) => {
                    let text: String = chunk
                        .choices
                        .into_iter()
                        .filter_map(|c| c.delta.content)
                        .collect();
                    (!text.is_empty()).then(|| Ok(text))
                }
                Err(e) => {
                    tracing::warn!("openai: skipping unparseable chunk: {}", e);
                    None
                }
            }
        });
        Ok(end_on_error(chunks))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream::TryStreamExt;
    use std::time::Duration;

    fn settings(base: &str) -> Settings {
        Settings {
            api_base: base.to_string(),
            method_model: "gpt-mini".into(),
            report_model: "gpt-big".into(),
            timeout: Duration::from_secs(5),
            max_tokens: 2048,
            thinking_budget: 0,
            language: None,
        }
    }

    fn method() -> FortuneMethod {
        FortuneMethod { name: "Matrix Astrology".into(), description: String::new(), required_fields: vec![] }
    }

    #[tokio::test]
    async fn test_select_method_uses_json_mode() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .match_header("authorization", "Bearer sk-test")
            .match_body(mockito::Matcher::PartialJsonString(
                r#"{"model":"gpt-mini","response_format":{"type":"json_object"}}"#.to_string(),
            ))
            .with_status(200)
            .with_body(
                r#"{"choices":[{"message":{"content":"{\"name\":\"Matrix Astrology\",\"description\":\"d\",\"required_fields\":[{\"name\":\"sign\",\"label\":\"Sign\",\"type\":\"select\",\"options\":[\"Aries\",\"Leo\"]}]}"}}]}"#,
            )
            .create_async()
            .await;

        let svc = OpenAIService::new(settings(&server.url()), "sk-test".into()).unwrap();
        let m = svc.select_method("love").await.unwrap();

        mock.assert_async().await;
        assert_eq!(m.name, "Matrix Astrology");
        assert_eq!(m.required_fields.len(), 1);
    }

    #[tokio::test]
    async fn test_select_method_with_empty_content_is_schema_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_body(r#"{"choices":[{"message":{"content":null}}]}"#)
            .create_async()
            .await;

        let svc = OpenAIService::new(settings(&server.url()), "k".into()).unwrap();
        let err = svc.select_method("love").await.unwrap_err();
        assert!(matches!(err, OracleError::Schema(_)));
    }

    #[tokio::test]
    async fn test_stream_report_concatenates_deltas() {
        let mut server = mockito::Server::new_async().await;
        let body = concat!(
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"## Data \"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"Snapshot\"}}]}\n\n",
            "data: [DONE]\n\n",
        );
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .match_body(mockito::Matcher::PartialJsonString(r#"{"stream":true,"model":"gpt-big"}"#.to_string()))
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body(body)
            .create_async()
            .await;

        let svc = OpenAIService::new(settings(&server.url()), "k".into()).unwrap();
        let chunks: Vec<String> = svc
            .stream_report("love", &method(), &UserInfo::default())
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(chunks, vec!["## Data ", "Snapshot"]);
    }

    #[tokio::test]
    async fn test_stream_report_rejected_before_first_chunk() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(429)
            .with_body("rate limited")
            .create_async()
            .await;

        let svc = OpenAIService::new(settings(&server.url()), "k".into()).unwrap();
        let err = svc.stream_report("love", &method(), &UserInfo::default()).await.err().unwrap();
        assert!(err.to_string().contains("429"));
    }
}
