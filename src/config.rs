//! Runtime configuration
//!
//! Settings are read from the process environment (optionally seeded from a
//! `.env` file by the binary). Every value has a default so the pipeline runs
//! against the deterministic backend with no configuration at all.

use crate::error::{DuiError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_SCHEMA_PREFIX: &str = "DUI";
pub const DEFAULT_VIEW: &str = "v_caseheaders";

/// Which text-generation backend to construct at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Mock,
    OpenAi,
    /// Gemini through Google's OpenAI-compatible endpoint
    Gemini,
    Ollama,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Mock => "mock",
            BackendKind::OpenAi => "openai",
            BackendKind::Gemini => "gemini",
            BackendKind::Ollama => "ollama",
        }
    }
}

impl FromStr for BackendKind {
    type Err = DuiError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "" | "mock" | "stub" => Ok(BackendKind::Mock),
            "openai" => Ok(BackendKind::OpenAi),
            "gemini" | "google" => Ok(BackendKind::Gemini),
            "ollama" | "local" => Ok(BackendKind::Ollama),
            other => Err(DuiError::Config(format!(
                "Unknown AI_MODEL_TYPE '{}' (expected mock, openai, gemini or ollama)",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendSettings {
    pub kind: BackendKind,
    pub model: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub base_url: String,
    pub timeout_secs: u64,
    /// Substitute the deterministic backend when the primary one is rate limited
    pub fallback_on_rate_limit: bool,
}

impl BackendSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Switch to another backend kind, resetting model and URL to its defaults.
    pub fn switch_kind(&mut self, kind: BackendKind) {
        if kind == self.kind {
            return;
        }
        self.kind = kind;
        self.model = Self::default_model(kind).to_string();
        self.base_url = Self::default_base_url(kind).to_string();
    }

    fn default_model(kind: BackendKind) -> &'static str {
        match kind {
            BackendKind::Mock => "stub",
            BackendKind::OpenAi => "gpt-4",
            BackendKind::Gemini => "gemini-2.0-flash",
            BackendKind::Ollama => "llama3.1:8b",
        }
    }

    fn default_base_url(kind: BackendKind) -> &'static str {
        match kind {
            BackendKind::OpenAi => "https://api.openai.com/v1",
            BackendKind::Gemini => "https://generativelanguage.googleapis.com/v1beta/openai",
            BackendKind::Ollama => "http://127.0.0.1:11434",
            BackendKind::Mock => "",
        }
    }
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            kind: BackendKind::Mock,
            model: Self::default_model(BackendKind::Mock).to_string(),
            api_key: None,
            base_url: String::new(),
            timeout_secs: 30,
            fallback_on_rate_limit: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub backend: BackendSettings,
    /// Directory holding the restructured schema cache
    pub data_dir: PathBuf,
    /// Consolidated view schema document produced by the offline analysis
    pub schema_source: PathBuf,
    /// Optional database analysis document used for summary statistics
    pub analysis_source: Option<PathBuf>,
    pub schema_prefix: String,
    pub default_view: String,
    /// SQLite database used by the optional execution path
    pub sqlite_path: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            backend: BackendSettings::default(),
            data_dir: PathBuf::from("data"),
            schema_source: PathBuf::from("metadata/dui_view_schema.json"),
            analysis_source: None,
            schema_prefix: DEFAULT_SCHEMA_PREFIX.to_string(),
            default_view: DEFAULT_VIEW.to_string(),
            sqlite_path: None,
        }
    }
}

impl Settings {
    /// Build settings from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as `from_env` but reads values through `lookup`, which keeps the
    /// parsing testable without touching the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Settings::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let kind = match non_empty("AI_MODEL_TYPE") {
            Some(raw) => raw.parse::<BackendKind>()?,
            None => BackendKind::Mock,
        };

        let timeout_secs = match non_empty("DUI_BACKEND_TIMEOUT_SECS") {
            Some(raw) => raw.trim().parse::<u64>().map_err(|e| {
                DuiError::Config(format!("Invalid DUI_BACKEND_TIMEOUT_SECS '{}': {}", raw, e))
            })?,
            None => defaults.backend.timeout_secs,
        };

        let fallback_on_rate_limit = match non_empty("DUI_FALLBACK_ON_RATE_LIMIT") {
            Some(raw) => parse_bool(&raw).ok_or_else(|| {
                DuiError::Config(format!("Invalid DUI_FALLBACK_ON_RATE_LIMIT '{}'", raw))
            })?,
            None => defaults.backend.fallback_on_rate_limit,
        };

        let base_url = match kind {
            BackendKind::Ollama => non_empty("OLLAMA_URL").or_else(|| non_empty("AI_BASE_URL")),
            _ => non_empty("AI_BASE_URL"),
        }
        .unwrap_or_else(|| BackendSettings::default_base_url(kind).to_string());

        let api_key = match kind {
            BackendKind::Gemini => non_empty("AI_API_KEY")
                .or_else(|| non_empty("GEMINI_API_KEY"))
                .or_else(|| non_empty("GOOGLE_API_KEY")),
            _ => non_empty("AI_API_KEY").or_else(|| non_empty("OPENAI_API_KEY")),
        };

        let backend = BackendSettings {
            kind,
            model: non_empty("AI_MODEL_NAME")
                .unwrap_or_else(|| BackendSettings::default_model(kind).to_string()),
            api_key,
            base_url,
            timeout_secs,
            fallback_on_rate_limit,
        };

        Ok(Settings {
            backend,
            data_dir: non_empty("DUI_DATA_DIR").map(PathBuf::from).unwrap_or(defaults.data_dir),
            schema_source: non_empty("DUI_SCHEMA_SOURCE")
                .map(PathBuf::from)
                .unwrap_or(defaults.schema_source),
            analysis_source: non_empty("DUI_ANALYSIS_SOURCE").map(PathBuf::from),
            schema_prefix: non_empty("DUI_SCHEMA_PREFIX").unwrap_or(defaults.schema_prefix),
            default_view: non_empty("DUI_DEFAULT_VIEW").unwrap_or(defaults.default_view),
            sqlite_path: non_empty("DUI_SQLITE_PATH").map(PathBuf::from),
        })
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_without_environment() {
        let settings = Settings::from_lookup(|_| None).unwrap();
        assert_eq!(settings.backend.kind, BackendKind::Mock);
        assert_eq!(settings.backend.timeout_secs, 30);
        assert!(settings.backend.fallback_on_rate_limit);
        assert_eq!(settings.schema_prefix, "DUI");
        assert_eq!(settings.default_view, "v_caseheaders");
        assert!(settings.sqlite_path.is_none());
    }

    #[test]
    fn test_openai_settings() {
        let settings = Settings::from_lookup(lookup_from(&[
            ("AI_MODEL_TYPE", "OpenAI"),
            ("OPENAI_API_KEY", "sk-test"),
            ("DUI_BACKEND_TIMEOUT_SECS", "5"),
            ("DUI_FALLBACK_ON_RATE_LIMIT", "no"),
        ]))
        .unwrap();

        assert_eq!(settings.backend.kind, BackendKind::OpenAi);
        assert_eq!(settings.backend.model, "gpt-4");
        assert_eq!(settings.backend.api_key.as_deref(), Some("sk-test"));
        assert_eq!(settings.backend.base_url, "https://api.openai.com/v1");
        assert_eq!(settings.backend.timeout(), Duration::from_secs(5));
        assert!(!settings.backend.fallback_on_rate_limit);
    }

    #[test]
    fn test_ollama_uses_ollama_url() {
        let settings = Settings::from_lookup(lookup_from(&[
            ("AI_MODEL_TYPE", "ollama"),
            ("OLLAMA_URL", "http://gpu-box:11434"),
        ]))
        .unwrap();
        assert_eq!(settings.backend.kind, BackendKind::Ollama);
        assert_eq!(settings.backend.base_url, "http://gpu-box:11434");
    }

    #[test]
    fn test_gemini_settings() {
        let settings = Settings::from_lookup(lookup_from(&[
            ("AI_MODEL_TYPE", "gemini"),
            ("GEMINI_API_KEY", "g-test"),
            ("OPENAI_API_KEY", "sk-ignored"),
        ]))
        .unwrap();
        assert_eq!(settings.backend.kind, BackendKind::Gemini);
        assert_eq!(settings.backend.model, "gemini-2.0-flash");
        assert_eq!(settings.backend.api_key.as_deref(), Some("g-test"));
        assert_eq!(
            settings.backend.base_url,
            "https://generativelanguage.googleapis.com/v1beta/openai"
        );
        assert_eq!("Google".parse::<BackendKind>().unwrap(), BackendKind::Gemini);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(Settings::from_lookup(lookup_from(&[("AI_MODEL_TYPE", "watsonx")])).is_err());
        assert!(
            Settings::from_lookup(lookup_from(&[("DUI_BACKEND_TIMEOUT_SECS", "soon")])).is_err()
        );
    }

    #[test]
    fn test_switch_kind_resets_backend_defaults() {
        let mut backend = BackendSettings::default();
        backend.switch_kind(BackendKind::Ollama);
        assert_eq!(backend.model, "llama3.1:8b");
        assert_eq!(backend.base_url, "http://127.0.0.1:11434");

        backend.model = "custom".to_string();
        backend.switch_kind(BackendKind::Ollama);
        assert_eq!(backend.model, "custom");
    }
}
