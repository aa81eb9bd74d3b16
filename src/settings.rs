use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::error::{Result, TallyError};
use crate::models::Roster;

pub const API_KEY_ENV: &str = "GEMINI_API_KEY";
pub const OPENAI_KEY_ENV: &str = "OPENAI_API_KEY";

/// Which hosted model reads the receipts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    Gemini,
    #[value(name = "openai")]
    OpenAi,
}

impl Provider {
    pub fn key_env(&self) -> &'static str {
        match self {
            Self::Gemini => API_KEY_ENV,
            Self::OpenAi => OPENAI_KEY_ENV,
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Gemini => "gemini",
            Self::OpenAi => "openai",
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub provider: Provider,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub openai_api_key: String,
    #[serde(default = "default_openai_model")]
    pub openai_model: String,
    #[serde(default = "default_openai_base_url")]
    pub openai_base_url: String,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default)]
    pub template_path: String,
    #[serde(default = "default_roster")]
    pub roster: Vec<String>,
    #[serde(default = "default_initials")]
    pub initials: BTreeMap<String, String>,
}

fn default_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_base_url() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}

fn default_openai_model() -> String {
    "gpt-4o".to_string()
}

fn default_openai_base_url() -> String {
    "https://api.openai.com".to_string()
}

fn default_workers() -> usize {
    4
}

fn default_roster() -> Vec<String> {
    [
        "최종화", "김종곤", "박종철", "조경현", "최홍영", "김호선", "박다혜", "강윤영",
        "박상현", "정지은", "김민주", "유호정", "최윤선", "권익준", "김익현", "김호연",
        "이한울", "장수현", "장현조", "최창원", "김동빈", "박성진",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_initials() -> BTreeMap<String, String> {
    [
        ("IH", "이인호"),
        ("DH", "이동혁"),
        ("SK", "양상관"),
        ("JH", "조준호"),
        ("HB", "안형범"),
        ("KY", "손근영"),
        ("HS", "오형석"),
        ("YJ", "석영진"),
        ("GH", "이관희"),
        ("JY", "박주연"),
    ]
    .iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            provider: Provider::default(),
            api_key: String::new(),
            model: default_model(),
            base_url: default_base_url(),
            openai_api_key: String::new(),
            openai_model: default_openai_model(),
            openai_base_url: default_openai_base_url(),
            workers: default_workers(),
            template_path: String::new(),
            roster: default_roster(),
            initials: default_initials(),
        }
    }
}

impl Settings {
    pub fn roster(&self) -> Roster {
        Roster::new(self.roster.clone(), self.initials.clone())
    }

    /// Stored key for the selected provider.
    pub fn stored_key(&self) -> &str {
        match self.provider {
            Provider::Gemini => &self.api_key,
            Provider::OpenAi => &self.openai_api_key,
        }
    }

    pub fn set_stored_key(&mut self, key: &str) {
        match self.provider {
            Provider::Gemini => self.api_key = key.to_string(),
            Provider::OpenAi => self.openai_api_key = key.to_string(),
        }
    }

    /// Model name for the selected provider.
    pub fn active_model(&self) -> &str {
        match self.provider {
            Provider::Gemini => &self.model,
            Provider::OpenAi => &self.openai_model,
        }
    }

    pub fn set_active_model(&mut self, model: &str) {
        match self.provider {
            Provider::Gemini => self.model = model.to_string(),
            Provider::OpenAi => self.openai_model = model.to_string(),
        }
    }

    /// The configured template workbook, if one has been set.
    pub fn template(&self) -> Option<PathBuf> {
        let raw = self.template_path.trim();
        (!raw.is_empty()).then(|| shellexpand_path(raw))
    }
}

fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("receipt-tally")
}

fn settings_path() -> PathBuf {
    config_dir().join("settings.json")
}

pub fn load_settings() -> Settings {
    let path = settings_path();
    if path.exists() {
        let content = std::fs::read_to_string(&path).unwrap_or_default();
        serde_json::from_str(&content).unwrap_or_default()
    } else {
        Settings::default()
    }
}

pub fn save_settings(settings: &Settings) -> Result<()> {
    let dir = config_dir();
    std::fs::create_dir_all(&dir)?;
    let json = serde_json::to_string_pretty(settings)
        .map_err(|e| TallyError::Settings(e.to_string()))?;
    std::fs::write(settings_path(), format!("{json}\n"))?;
    Ok(())
}

pub fn settings_location() -> PathBuf {
    settings_path()
}

/// Expand a leading `~` and make the path absolute when it exists.
pub fn shellexpand_path(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix('~') {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest.trim_start_matches('/'));
        }
    }
    std::fs::canonicalize(path).unwrap_or_else(|_| PathBuf::from(path))
}

/// Resolve the API key for the selected provider: explicit flag, then
/// `GEMINI_API_KEY` or `OPENAI_API_KEY`, then the settings file, then an
/// interactive prompt.
pub fn resolve_api_key(flag: Option<&str>, settings: &Settings) -> Result<Zeroizing<String>> {
    if let Some(key) = flag.filter(|k| !k.trim().is_empty()) {
        return Ok(Zeroizing::new(key.trim().to_string()));
    }
    if let Ok(key) = std::env::var(settings.provider.key_env()) {
        if !key.trim().is_empty() {
            return Ok(Zeroizing::new(key.trim().to_string()));
        }
    }
    if !settings.stored_key().trim().is_empty() {
        return Ok(Zeroizing::new(settings.stored_key().trim().to_string()));
    }
    let entered = Zeroizing::new(rpassword::prompt_password(format!(
        "{} API key: ",
        settings.provider
    ))?);
    if entered.trim().is_empty() {
        return Err(TallyError::Settings("An API key is required.".to_string()));
    }
    Ok(Zeroizing::new(entered.trim().to_string()))
}
