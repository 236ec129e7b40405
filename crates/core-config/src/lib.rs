//! Configuration loading and parsing.
//!
//! Parses `redpen.toml` (or an override path provided by the binary). Two
//! sections, both optional, every key defaulted:
//!
//! ```toml
//! [session]
//! compare_threshold = 100   # new graphemes required before a streaming re-diff
//! timeout_ms = 30000        # overall budget for one correction stream
//! settle_delay_ms = 500     # grace delay between end of stream and final diff
//! trim_settled = true       # trim outer whitespace before the final diff
//!
//! [service]
//! endpoint = "https://api.openai.com/v1/chat/completions"
//! model = "gpt-4o-mini"
//! temperature = 0.7
//! max_tokens = 1000
//! api_key_env = "OPENAI_API_KEY"
//! ```
//!
//! Raw values are kept as parsed; [`Config::session_settings`] clamps them into
//! the effective [`SessionSettings`] and logs every clamp on target `config`.
//! Unknown keys are ignored. A file that fails to parse falls back to defaults
//! with a warning so a typo never blocks a correction.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::io::ErrorKind;
use std::time::Duration;
use std::{fs, path::PathBuf};
use tracing::{debug, info, warn};

pub const CONFIG_FILE_NAME: &str = "redpen.toml";

pub const DEFAULT_SYSTEM_PROMPT: &str = "\
你是一名專業的台灣繁體中文雜誌編輯，幫我檢查給定內容的錯字及語句文法。請特別注意以下規則：
1. 中文與英文之間，中文與數字之間應有空格，例如 FLAC，JPEG，Google Search Console 。
2. 以下情況不需調整：
   - 括弧內的說明，例如（圖一）、（加入產品圖示）。
   - 阿拉伯數字不用調整成中文。
   - 英文不一定要翻成中文。
   - emoji 或特殊符號是為了增加閱讀體驗，也不必調整。
3. 請保留原文的段落和換行格式
4. 請不要使用額外的 Markdown 語法。
5. 請仔細審視給定的文字，將冗詞語法錯誤進行修改。
6. 返回文字不要帶有 <text> 標籤。";

pub const DEFAULT_USER_TEMPLATE: &str =
    "請將以下文字複寫，只需改錯字及語句不通順的地方。\n\n<text>\n{text}\n</text>";

const TEXT_PLACEHOLDER: &str = "{text}";

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct SessionConfig {
    #[serde(default = "SessionConfig::default_compare_threshold")]
    pub compare_threshold: usize,
    #[serde(default = "SessionConfig::default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "SessionConfig::default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    #[serde(default = "SessionConfig::default_trim_settled")]
    pub trim_settled: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            compare_threshold: Self::default_compare_threshold(),
            timeout_ms: Self::default_timeout_ms(),
            settle_delay_ms: Self::default_settle_delay_ms(),
            trim_settled: Self::default_trim_settled(),
        }
    }
}

impl SessionConfig {
    const fn default_compare_threshold() -> usize {
        100
    }
    const fn default_timeout_ms() -> u64 {
        30_000
    }
    const fn default_settle_delay_ms() -> u64 {
        500
    }
    const fn default_trim_settled() -> bool {
        true
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ServiceConfig {
    pub endpoint: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Environment variable holding the bearer token.
    pub api_key_env: String,
    pub system_prompt: String,
    /// User message template; `{text}` is replaced by the selected text.
    pub user_template: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            model: "gpt-4o-mini".to_string(),
            temperature: 0.7,
            max_tokens: 1000,
            api_key_env: "OPENAI_API_KEY".to_string(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            user_template: DEFAULT_USER_TEMPLATE.to_string(),
        }
    }
}

impl ServiceConfig {
    /// Build the user message for `text`. A template without the placeholder gets the text
    /// appended after a blank line.
    pub fn user_message(&self, text: &str) -> String {
        if self.user_template.contains(TEXT_PLACEHOLDER) {
            self.user_template.replace(TEXT_PLACEHOLDER, text)
        } else {
            format!("{}\n\n{}", self.user_template, text)
        }
    }

    /// Temperature clamped to the range the chat API accepts.
    pub fn effective_temperature(&self) -> f32 {
        let clamped = if self.temperature.is_finite() {
            self.temperature.clamp(0.0, 2.0)
        } else {
            ServiceConfig::default().temperature
        };
        if clamped != self.temperature {
            info!(
                target: "config",
                raw = self.temperature,
                clamped,
                "service_temperature_clamped"
            );
        }
        clamped
    }
}

#[derive(Debug, Deserialize, Default, Clone, PartialEq)]
pub struct ConfigFile {
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub service: ServiceConfig,
}

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub raw: Option<String>,    // original file string (optional)
    pub file: ConfigFile,       // parsed (or default) data
    pub path: Option<PathBuf>,  // where `raw` came from
}

/// Effective per-session knobs after clamping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    pub compare_threshold: usize,
    pub timeout: Duration,
    /// Zero disables the grace delay.
    pub settle_delay: Duration,
    pub trim_settled: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Config::default().session_settings()
    }
}

/// Config path following platform conventions: `./redpen.toml` first, then the user config
/// directory (`$XDG_CONFIG_HOME/redpen/redpen.toml`, `~/Library/Application Support/...`).
pub fn discover() -> PathBuf {
    let local = PathBuf::from(CONFIG_FILE_NAME);
    if local.exists() {
        return local;
    }
    if let Some(dir) = dirs::config_dir() {
        return dir.join("redpen").join(CONFIG_FILE_NAME);
    }
    local
}

pub fn load_from(path: Option<PathBuf>) -> Result<Config> {
    let path = path.unwrap_or_else(discover);
    let content = match fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!(target: "config", path = %path.display(), "config_missing_using_defaults");
            return Ok(Config::default());
        }
        Err(e) => {
            return Err(e).with_context(|| format!("reading config {}", path.display()));
        }
    };
    match toml::from_str::<ConfigFile>(&content) {
        Ok(file) => {
            info!(target: "config", path = %path.display(), size_bytes = content.len(), "config_loaded");
            Ok(Config {
                raw: Some(content),
                file,
                path: Some(path),
            })
        }
        Err(e) => {
            warn!(target: "config", path = %path.display(), error = %e, "config_parse_failed_using_defaults");
            Ok(Config::default())
        }
    }
}

impl Config {
    /// Clamp raw session values into effective settings.
    pub fn session_settings(&self) -> SessionSettings {
        let raw = &self.file.session;
        let compare_threshold = raw.compare_threshold.max(1);
        if compare_threshold != raw.compare_threshold {
            info!(
                target: "config",
                raw = raw.compare_threshold,
                clamped = compare_threshold,
                "session_compare_threshold_clamped"
            );
        }
        let timeout_ms = raw.timeout_ms.max(1);
        if timeout_ms != raw.timeout_ms {
            info!(
                target: "config",
                raw = raw.timeout_ms,
                clamped = timeout_ms,
                "session_timeout_clamped"
            );
        }
        SessionSettings {
            compare_threshold,
            timeout: Duration::from_millis(timeout_ms),
            settle_delay: Duration::from_millis(raw.settle_delay_ms),
            trim_settled: raw.trim_settled,
        }
    }

    /// Command-line override for the streaming re-diff threshold.
    pub fn override_compare_threshold(&mut self, threshold: usize) {
        debug!(target: "config", threshold, "session_compare_threshold_override");
        self.file.session.compare_threshold = threshold;
    }

    /// API key from the configured environment variable. Empty values count as missing.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.file.service.api_key_env)
            .ok()
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty())
    }
}
