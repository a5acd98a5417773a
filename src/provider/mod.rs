use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures::future;
use futures::stream::{BoxStream, Stream, StreamExt};
use reqwest::{RequestBuilder, Response};
use std::time::Duration;

use crate::cli::ProviderKind;
use crate::config::Config;
use crate::errors::{OracleError, OracleResult};
use crate::wire::{FortuneMethod, UserInfo};

pub mod anthropic;
pub mod gemini;
pub mod ollama;
pub mod openai;
pub mod sse;

/// Report text as it is generated. Forward-only; an `Err` item is the last one.
pub type ReportStream = BoxStream<'static, OracleResult<String>>;

#[async_trait]
pub trait FortuneService: Send + Sync {
    /// Picks an analysis method for the wish.
    async fn select_method(&self, wish: &str) -> OracleResult<FortuneMethod>;

    /// Starts generating the report. Errors may come from the call itself
    /// or as items of the returned stream.
    async fn stream_report(
        &self,
        wish: &str,
        method: &FortuneMethod,
        info: &UserInfo,
    ) -> OracleResult<ReportStream>;
}

pub type DynService = Box<dyn FortuneService + Send + Sync>;

/// Provider-independent knobs, resolved from [`Config`].
#[derive(Debug, Clone)]
pub struct Settings {
    pub api_base: String,
    pub method_model: String,
    pub report_model: String,
    pub timeout: Duration,
    pub max_tokens: u32,
    pub thinking_budget: u32,
    pub language: Option<String>,
}

impl Settings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            api_base: cfg.api_base(),
            method_model: cfg.method_model(),
            report_model: cfg.report_model(),
            timeout: Duration::from_secs(cfg.timeout_secs),
            max_tokens: cfg.max_tokens,
            thinking_budget: cfg.thinking_budget,
            language: cfg.language.clone(),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.api_base.trim_end_matches('/'), path.trim_start_matches('/'))
    }
}

pub fn make_service(cfg: &Config) -> Result<DynService> {
    let settings = Settings::from_config(cfg);
    let service: DynService = match cfg.provider {
        ProviderKind::Gemini => Box::new(gemini::GeminiService::new(settings, api_key(&["GEMINI_API_KEY", "API_KEY"])?)?),
        ProviderKind::OpenAI => Box::new(openai::OpenAIService::new(settings, api_key(&["OPENAI_API_KEY"])?)?),
        ProviderKind::Anthropic => {
            Box::new(anthropic::AnthropicService::new(settings, api_key(&["ANTHROPIC_API_KEY"])?)?)
        }
        ProviderKind::Ollama => Box::new(ollama::OllamaService::new(settings)?),
    };
    Ok(service)
}

/// First non-empty env var among `names`.
fn api_key(names: &[&str]) -> Result<String> {
    names
        .iter()
        .find_map(|n| std::env::var(n).ok().filter(|v| !v.trim().is_empty()))
        .ok_or_else(|| anyhow!("{} env var is not set", names.join(" or ")))
}

/// Boxes a report stream, ending it right after its first `Err` item.
pub(crate) fn end_on_error<S>(chunks: S) -> ReportStream
where
    S: Stream<Item = OracleResult<String>> + Send + 'static,
{
    chunks
        .scan(false, |failed, item| {
            if *failed {
                return future::ready(None);
            }
            *failed = item.is_err();
            future::ready(Some(item))
        })
        .boxed()
}

pub(crate) fn http_client(settings: &Settings) -> OracleResult<reqwest::Client> {
    Ok(reqwest::Client::builder().timeout(settings.timeout).build()?)
}

/// Sends the request and turns a non-success status into a provider error
/// carrying the body.
pub(crate) async fn send_checked(req: RequestBuilder, provider: &str) -> OracleResult<Response> {
    let resp = req.send().await?;
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    tracing::error!(provider, %status, "request rejected");
    Err(OracleError::Provider(format!("{} API error ({}): {}", provider, status, body.trim())))
}

/// Parses a method from model output: strict JSON first, then the first
/// JSON object embedded in the text.
pub(crate) fn parse_method(content: &str) -> OracleResult<FortuneMethod> {
    let method = match serde_json::from_str::<FortuneMethod>(content.trim()) {
        Ok(m) => m,
        Err(strict_err) => extract_first_json_object(content)
            .and_then(|obj| serde_json::from_str::<FortuneMethod>(&obj).ok())
            .ok_or_else(|| {
                OracleError::Schema(format!(
                    "model did not return a valid method ({}).\n--- content start ---\n{}\n--- content end ---",
                    strict_err, content
                ))
            })?,
    };
    if method.name.trim().is_empty() {
        return Err(OracleError::Schema("method has no name".into()));
    }
    if let Some(f) = method.required_fields.iter().find(|f| f.name.trim().is_empty()) {
        return Err(OracleError::Schema(format!("field {:?} has no name", f.label)));
    }
    Ok(method)
}

/// Extracts the first top-level JSON object substring from a string.
/// Braces inside string literals are ignored.
fn extract_first_json_object(s: &str) -> Option<String> {
    let mut start = None;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, b) in s.bytes().enumerate() {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' if start.is_some() => in_string = true,
            b'{' => {
                if start.is_none() {
                    start = Some(i);
                }
                depth += 1;
            }
            b'}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    return start.map(|st| s[st..=i].to_string());
                }
            }
            _ => {}
        }
    }
    None
}
