use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::PathBuf;
use thiserror::Error;

use crate::engine::ListOptions;
use crate::list::{CodecOptions, SortMode, ViewOptions};
use crate::store::hass::DEFAULT_POLL_INTERVAL;
use crate::utils::paths::get_config_path;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("listId is required: set it under [card] in the config file or pass --list")]
    MissingListId,
    #[error("store setting `{0}` is required for this backend")]
    MissingStoreSetting(&'static str),
}

/// Where item notes are persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotesMode {
    /// After ` // ` inside the summary
    #[default]
    Summary,
    /// In the store's separate description field
    Description,
}

/// A colour option: either a CSS colour or `"none"` to disable it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ColorSetting {
    Disabled,
    Value(String),
}

impl From<String> for ColorSetting {
    fn from(s: String) -> Self {
        if s.trim().eq_ignore_ascii_case("none") {
            ColorSetting::Disabled
        } else {
            ColorSetting::Value(s)
        }
    }
}

impl From<ColorSetting> for String {
    fn from(color: ColorSetting) -> Self {
        match color {
            ColorSetting::Disabled => "none".to_string(),
            ColorSetting::Value(v) => v,
        }
    }
}

impl fmt::Display for ColorSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColorSetting::Disabled => write!(f, "none"),
            ColorSetting::Value(v) => write!(f, "{}", v),
        }
    }
}

/// Per-list settings, with the key names the dashboard card uses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardConfig {
    #[serde(default)]
    pub list_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default)]
    pub sort_mode: SortMode,

    #[serde(default = "default_true")]
    pub show_categories: bool,

    #[serde(default = "default_true")]
    pub show_category_badges: bool,

    #[serde(default)]
    pub show_category_headers: bool,

    #[serde(default = "default_true")]
    pub show_notes: bool,

    #[serde(default)]
    pub notes_mode: NotesMode,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_color: Option<ColorSetting>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_color: Option<ColorSetting>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_color: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon_color: Option<String>,
}

fn default_true() -> bool {
    true
}

impl Default for CardConfig {
    fn default() -> Self {
        Self {
            list_id: String::new(),
            title: None,
            sort_mode: SortMode::default(),
            show_categories: true,
            show_category_badges: true,
            show_category_headers: false,
            show_notes: true,
            notes_mode: NotesMode::default(),
            active_color: None,
            completed_color: None,
            text_color: None,
            icon_color: None,
        }
    }
}

impl CardConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.list_id.trim().is_empty() {
            return Err(ConfigError::MissingListId);
        }
        Ok(())
    }

    pub fn codec_options(&self) -> CodecOptions {
        CodecOptions {
            categories: self.show_categories,
            notes_in_summary: self.notes_mode == NotesMode::Summary,
        }
    }

    pub fn view_options(&self) -> ViewOptions {
        ViewOptions {
            sort_mode: self.sort_mode,
            group_by_category: self.show_categories,
        }
    }

    /// Validated engine options for this list.
    pub fn list_options(&self) -> Result<ListOptions, ConfigError> {
        self.validate()?;
        Ok(ListOptions {
            list_id: self.list_id.trim().to_string(),
            codec: self.codec_options(),
            view: self.view_options(),
        })
    }

    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or("Shopping List")
    }
}

/// Which backend holds the list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum StoreConfig {
    Sqlite {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        path: Option<PathBuf>,
    },
    HomeAssistant {
        #[serde(default)]
        url: String,
        #[serde(default)]
        token: String,
        #[serde(default = "default_poll_interval_secs")]
        poll_interval_secs: u64,
    },
    Memory,
}

fn default_poll_interval_secs() -> u64 {
    DEFAULT_POLL_INTERVAL.as_secs()
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig::Sqlite { path: None }
    }
}

impl StoreConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let StoreConfig::HomeAssistant { url, token, .. } = self {
            if url.trim().is_empty() {
                return Err(ConfigError::MissingStoreSetting("url"));
            }
            if token.trim().is_empty() {
                return Err(ConfigError::MissingStoreSetting("token"));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub card: CardConfig,

    #[serde(default)]
    pub store: StoreConfig,
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = get_config_path()?;

        if !config_path.exists() {
            return Ok(Config::default());
        }

        let content = fs::read_to_string(&config_path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let config_path = get_config_path()?;

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(&config_path, content)?;

        Ok(())
    }
}
