use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[value(alias = "google")]
    Gemini,
    #[value(name = "openai", alias = "open-ai")]
    #[serde(rename = "openai")]
    OpenAI,
    Anthropic,
    Ollama,
}

#[derive(Parser, Debug)]
#[command(name = "oracle_nexus", version, about = "Ask the 2077 oracle: pick a divination engine for your wish and stream its report")]
pub struct Args {
    /// The wish to analyse. Asked interactively when omitted.
    #[arg(long)]
    pub wish: Option<String>,

    /// Prefill a method field, e.g. `--field birthdate=2024-01-01T00:00`.
    #[arg(long = "field", value_name = "NAME=VALUE", value_parser = parse_field)]
    pub fields: Vec<(String, String)>,

    #[arg(long, value_enum)]
    pub provider: Option<ProviderKind>,

    /// Model used to pick the method.
    #[arg(long)]
    pub method_model: Option<String>,

    /// Model used to write the report.
    #[arg(long)]
    pub report_model: Option<String>,

    /// Override the provider's base URL.
    #[arg(long)]
    pub api_base: Option<String>,

    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Language the oracle answers in (default Traditional Chinese, empty for none).
    #[arg(long)]
    pub language: Option<String>,

    /// TOML file with defaults; flags win over it.
    #[arg(long)]
    pub config: Option<String>,

    #[arg(long, default_value_t = false)]
    pub debug: bool,

    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[arg(long, default_value_t = false)]
    pub no_progress: bool,
}

fn parse_field(s: &str) -> Result<(String, String), String> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got {:?}", s))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("empty field name in {:?}", s));
    }
    Ok((name.to_string(), value.to_string()))
}
