use async_trait::async_trait;
use futures::stream::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{end_on_error, http_client, parse_method, send_checked, sse, FortuneService, ReportStream, Settings};
use crate::errors::{OracleError, OracleResult};
use crate::prompt;
use crate::wire::{FortuneMethod, UserInfo};

pub struct GeminiService {
    settings: Settings,
    api_key: String,
    client: Client,
}

impl GeminiService {
    pub fn new(settings: Settings, api_key: String) -> OracleResult<Self> {
        let client = http_client(&settings)?;
        Ok(Self { settings, api_key, client })
    }

    fn endpoint(&self, model: &str, action: &str) -> String {
        self.settings.url(&format!("v1beta/models/{}:{}", model, action))
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    system_instruction: Content<'a>,
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    parts: Vec<PartIn<'a>>,
}

#[derive(Serialize)]
struct PartIn<'a> {
    text: &'a str,
}

#[derive(Serialize, Default)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_schema: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    thinking_config: Option<ThinkingConfig>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ThinkingConfig {
    thinking_budget: u32,
}

#[derive(Deserialize, Default)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Deserialize, Default)]
struct Candidate {
    #[serde(default)]
    content: Option<ContentOut>,
}

#[derive(Deserialize, Default)]
struct ContentOut {
    #[serde(default)]
    parts: Vec<PartOut>,
}

#[derive(Deserialize, Default)]
struct PartOut {
    #[serde(default)]
    text: String,
    #[serde(default)]
    thought: bool,
}

#[derive(Deserialize)]
struct ApiError {
    #[serde(default)]
    message: String,
}

impl GenerateResponse {
    /// Answer text of the first candidate, without thought summaries.
    fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|c| c.parts.iter().filter(|p| !p.thought).map(|p| p.text.as_str()).collect())
            .unwrap_or_default()
    }
}

fn request<'a>(system: &'a str, user: &'a str, generation_config: GenerationConfig) -> GenerateRequest<'a> {
    GenerateRequest {
        system_instruction: Content { role: None, parts: vec![PartIn { text: system }] },
        contents: vec![Content { role: Some("user"), parts: vec![PartIn { text: user }] }],
        generation_config,
    }
}

#[async_trait]
impl FortuneService for GeminiService {
    async fn select_method(&self, wish: &str) -> OracleResult<FortuneMethod> {
        let system = prompt::system_prompt_method(self.settings.language.as_deref());
        let user = prompt::user_prompt_method(wish);
        let body = request(
            &system,
            &user,
            GenerationConfig {
                response_mime_type: Some("application/json"),
                response_schema: Some(prompt::method_schema()),
                ..Default::default()
            },
        );
        let url = self.endpoint(&self.settings.method_model, "generateContent");
        tracing::debug!(%url, model = %self.settings.method_model, "gemini: selecting method");

        let resp = send_checked(
            self.client.post(&url).header("x-goog-api-key", &self.api_key).json(&body),
            "Gemini",
        )
        .await?;
        let text = resp.text().await?;
        let parsed: GenerateResponse = serde_json::from_str(&text)
            .map_err(|e| OracleError::Provider(format!("gemini response parse error: {}", e)))?;
        if let Some(err) = parsed.error {
            return Err(OracleError::Provider(err.message));
        }
        let content = parsed.text();
        if content.trim().is_empty() {
            return Err(OracleError::Provider("gemini: empty content".into()));
        }
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
        let thinking_config = (self.settings.thinking_budget > 0)
            .then(|| ThinkingConfig { thinking_budget: self.settings.thinking_budget });
        let body = request(&system, &user, GenerationConfig { thinking_config, ..Default::default() });
        let url = self.endpoint(&self.settings.report_model, "streamGenerateContent");
        tracing::info!(model = %self.settings.report_model, method = %method.name, "gemini: streaming report");

        let resp = send_checked(
            self.client
                .post(&url)
                .query(&[("alt", "sse")])
                .header("x-goog-api-key", &self.api_key)
                .json(&body),
            "Gemini",
        )
        .await?;

        let chunks = sse::data_payloads(sse::lines(resp.bytes_stream())).filter_map(|payload| async move {
            let payload = match payload {
                Ok(p) => p,
                Err(e) => return Some(Err(e)),
            };
            match serde_json::from_str::<GenerateResponse>(&payload) {
                Ok(GenerateResponse { error: Some(err), .. }) => Some(Err(OracleError::Stream(err.message))),
                Ok(event) => {
                    let text = event.text();
                    (!text.is_empty()).then(|| Ok(text))
                }
                Err(e) => {
                    tracing::warn!("gemini: skipping unparseable event: {}", e);
                    None
                }
            }
        });
        Ok(end_on_error(chunks))
    }
}
