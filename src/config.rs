use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use anyhow::{Context, Result, anyhow};

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:5000";

/// Whether network-dependent behaviour is replaced by local stand-ins
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Mock,
    Live,
}

impl Mode {
    pub fn is_mock(&self) -> bool {
        *self == Mode::Mock
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Mode::Mock => "mock",
            Mode::Live => "live",
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct Config {
    pub base_url: Option<String>,
    pub mock: Option<bool>,
    /// Audio command, program first. The file path is appended as the last argument.
    pub player: Option<Vec<String>>,
}

/// Fully resolved runtime settings
#[derive(Debug, Clone)]
pub struct Settings {
    pub base_url: String,
    pub mode: Mode,
    pub player: Vec<String>,
    pub cache_dir: PathBuf,
    pub state_path: PathBuf,
    pub log_path: PathBuf,
}

/// Command-line overrides, highest precedence
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub base_url: Option<String>,
    pub mode: Option<Mode>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::get_config_path()?)
    }

    /// A missing file is the default config; an unreadable one is an error.
    pub fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            return Ok(Self::new());
        }

        let config_content = fs::read_to_string(config_path)?;
        let config: Config = serde_json::from_str(&config_content)
            .with_context(|| format!("malformed config at {}", config_path.display()))?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::get_config_path()?;

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let config_content = serde_json::to_string_pretty(self)?;
        fs::write(&config_path, config_content)?;
        Ok(())
    }

    /// Layer environment variables and CLI overrides on top of the file values.
    pub fn resolve(&self, overrides: &Overrides) -> Result<Settings> {
        let base_url = overrides
            .base_url
            .clone()
            .or_else(|| std::env::var("CHATDECK_BASE_URL").ok())
            .or_else(|| self.base_url.clone())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        // Mock stays on unless something explicitly turns it off
        let mode = overrides.mode.unwrap_or_else(|| {
            let mock = env_bool("CHATDECK_MOCK").or(self.mock).unwrap_or(true);
            if mock { Mode::Mock } else { Mode::Live }
        });

        let player = self
            .player
            .clone()
            .filter(|p| !p.is_empty())
            .unwrap_or_else(default_player);

        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow!("Could not determine cache directory"))?
            .join("chatdeck");

        Ok(Settings {
            base_url: base_url.trim_end_matches('/').to_string(),
            mode,
            player,
            log_path: cache_dir.join("chatdeck.log"),
            cache_dir,
            state_path: Self::get_config_dir()?.join("session.json"),
        })
    }

    fn get_config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("chatdeck"))
    }

    fn get_config_path() -> Result<PathBuf> {
        Ok(Self::get_config_dir()?.join("config.json"))
    }
}

fn default_player() -> Vec<String> {
    if cfg!(target_os = "macos") {
        vec!["afplay".to_string()]
    } else {
        ["ffplay", "-nodisp", "-autoexit", "-loglevel", "quiet"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }
}

/// Parse a boolean environment variable. Unset or unrecognised values yield `None`.
pub fn env_bool(key: &str) -> Option<bool> {
    let value = std::env::var(key).ok()?;
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
