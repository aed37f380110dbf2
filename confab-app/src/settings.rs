//! Persistent application settings (JSON file in the data directory).

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct AppSettings {
    /// Service API key. The `GEMINI_API_KEY` environment variable wins.
    pub api_key: Option<String>,
    /// Service endpoint override, mostly for testing against a fake.
    pub endpoint: Option<String>,
    pub default_model: String,
    pub default_voice: String,
    pub default_system_prompt: String,
    /// ISO 639-1 code used for new conversations.
    pub default_language: String,
    /// Database location; `None` puts it next to the settings file.
    pub database_path: Option<PathBuf>,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint: None,
            default_model: confab_core::session::DEFAULT_MODEL.into(),
            default_voice: confab_core::session::DEFAULT_VOICE.into(),
            default_system_prompt: confab_core::session::DEFAULT_SYSTEM_PROMPT.into(),
            default_language: "en".into(),
            database_path: None,
        }
    }
}

impl AppSettings {
    pub fn normalize(&mut self) {
        self.api_key = self
            .api_key
            .as_ref()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());
        self.endpoint = self
            .endpoint
            .as_ref()
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty());
        if self.default_model.trim().is_empty() {
            self.default_model = confab_core::session::DEFAULT_MODEL.into();
        }
        if self.default_voice.trim().is_empty() {
            self.default_voice = confab_core::session::DEFAULT_VOICE.into();
        }
        if self.default_system_prompt.trim().is_empty() {
            self.default_system_prompt = confab_core::session::DEFAULT_SYSTEM_PROMPT.into();
        }
        if self.default_language.trim().is_empty() {
            self.default_language = "en".into();
        }
    }

    /// Environment first, settings file second.
    pub fn resolve_api_key(&self) -> Option<String> {
        std::env::var("GEMINI_API_KEY")
            .ok()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .or_else(|| self.api_key.clone())
    }

    pub fn database_path(&self, settings_path: &Path) -> PathBuf {
        self.database_path.clone().unwrap_or_else(|| {
            settings_path
                .parent()
                .unwrap_or_else(|| Path::new("."))
                .join("conversations.db")
        })
    }
}

/// `$CONFAB_DIR/settings.json`, falling back to `~/.confab/settings.json`.
pub fn default_settings_path() -> PathBuf {
    if let Some(dir) = std::env::var_os("CONFAB_DIR") {
        return PathBuf::from(dir).join("settings.json");
    }
    let home = std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    home.join(".confab").join("settings.json")
}

/// Missing or unreadable file yields defaults — a broken settings file must
/// never keep the app from starting.
pub fn load_settings(path: &Path) -> AppSettings {
    let mut settings = match fs::read_to_string(path) {
        Ok(raw) => match serde_json::from_str::<AppSettings>(&raw) {
            Ok(settings) => settings,
            Err(e) => {
                warn!("settings file unparseable ({e}), using defaults");
                AppSettings::default()
            }
        },
        Err(_) => AppSettings::default(),
    };
    settings.normalize();
    settings
}

pub fn save_settings(path: &Path, settings: &AppSettings) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_string_pretty(settings)?)?;
    Ok(())
}
