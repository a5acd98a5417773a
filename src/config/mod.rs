use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::cli::{Args, ProviderKind};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub provider: ProviderKind,
    /// Falls back to the provider's default when unset.
    pub method_model: Option<String>,
    pub report_model: Option<String>,
    pub api_base: Option<String>,
    pub timeout_secs: u64,
    pub max_tokens: u32,
    /// Gemini only.
    pub thinking_budget: u32,
    /// Report language. An empty string leaves it to the model.
    pub language: Option<String>,
    pub progress: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Gemini,
            method_model: None,
            report_model: None,
            api_base: None,
            timeout_secs: 300,
            max_tokens: 4096,
            thinking_budget: 4000,
            language: Some("Traditional Chinese".into()),
            progress: true,
        }
    }
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("invalid config {}", path.display()))
    }

    /// Config file (if any) with command-line flags layered on top.
    pub fn load(args: &Args) -> Result<Self> {
        let mut cfg = match &args.config {
            Some(p) => Self::from_file(Path::new(p))?,
            None => Self::default(),
        };
        cfg.apply_args(args);
        if cfg.api_base.is_none() && cfg.provider == ProviderKind::Ollama {
            cfg.api_base = std::env::var("OLLAMA_URL").ok().filter(|u| !u.trim().is_empty());
        }
        Ok(cfg)
    }

    fn apply_args(&mut self, args: &Args) {
        if let Some(p) = args.provider {
            self.provider = p;
        }
        if let Some(m) = &args.method_model {
            self.method_model = Some(m.clone());
        }
        if let Some(m) = &args.report_model {
            self.report_model = Some(m.clone());
        }
        if let Some(b) = &args.api_base {
            self.api_base = Some(b.clone());
        }
        if let Some(t) = args.timeout_secs {
            self.timeout_secs = t;
        }
        if let Some(l) = &args.language {
            self.language = Some(l.clone());
        }
        if args.no_progress {
            self.progress = false;
        }
    }

    pub fn api_base(&self) -> String {
        self.api_base.clone().unwrap_or_else(|| {
            match self.provider {
                ProviderKind::Gemini => "https://generativelanguage.googleapis.com",
                ProviderKind::OpenAI => "https://api.openai.com",
                ProviderKind::Anthropic => "https://api.anthropic.com",
                ProviderKind::Ollama => "http://localhost:11434",
            }
            .to_string()
        })
    }

    pub fn method_model(&self) -> String {
        self.method_model.clone().unwrap_or_else(|| {
            match self.provider {
                ProviderKind::Gemini => "gemini-3-flash-preview",
                ProviderKind::OpenAI => "gpt-4.1-mini",
                ProviderKind::Anthropic => "claude-haiku-4-5",
                ProviderKind::Ollama => "llama3.1",
            }
            .to_string()
        })
    }

    pub fn report_model(&self) -> String {
        self.report_model.clone().unwrap_or_else(|| {
            match self.provider {
                ProviderKind::Gemini => "gemini-3-pro-preview",
                ProviderKind::OpenAI => "gpt-4.1",
                ProviderKind::Anthropic => "claude-sonnet-4-5",
                ProviderKind::Ollama => "llama3.1",
            }
            .to_string()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::io::Write;

    #[test]
    fn test_defaults_follow_provider() {
        let cfg = Config::default();
        assert_eq!(cfg.provider, ProviderKind::Gemini);
        assert_eq!(cfg.method_model(), "gemini-3-flash-preview");
        assert_eq!(cfg.report_model(), "gemini-3-pro-preview");
        assert_eq!(cfg.api_base(), "https://generativelanguage.googleapis.com");
        assert_eq!(cfg.language.as_deref(), Some("Traditional Chinese"));
    }

    #[test]
    fn test_file_then_flags() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "provider = \"openai\"\nreport_model = \"gpt-4o\"\ntimeout_secs = 30\nlanguage = \"Japanese\""
        )
        .unwrap();
        let path = file.path().to_string_lossy().to_string();
        let args = Args::try_parse_from(["oracle_nexus", "--config", path.as_str(), "--timeout-secs", "90"]).unwrap();

        let cfg = Config::load(&args).unwrap();
        assert_eq!(cfg.provider, ProviderKind::OpenAI);
        assert_eq!(cfg.report_model(), "gpt-4o");
        assert_eq!(cfg.method_model(), "gpt-4.1-mini");
        assert_eq!(cfg.timeout_secs, 90);
        assert_eq!(cfg.language.as_deref(), Some("Japanese"));
        assert!(cfg.progress);
    }

    #[test]
    fn test_blank_language_flag_turns_language_off() {
        let args = Args::try_parse_from(["oracle_nexus", "--language", ""]).unwrap();
        let cfg = Config::load(&args).unwrap();
        assert_eq!(cfg.language.as_deref(), Some(""));
        assert!(!crate::prompt::system_prompt_method(cfg.language.as_deref()).contains("Respond in"));
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "provider = \"crystal-ball\"").unwrap();
        let err = Config::from_file(file.path()).unwrap_err();
        assert!(err.to_string().contains("invalid config"));
    }
}
