//! Configuration loading and management

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::hotkey::KeyCode;

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the Unix domain socket for IPC
    pub socket_path: PathBuf,

    /// Directory for runtime data
    pub data_dir: PathBuf,

    pub backend: BackendConfig,

    pub voice: VoiceConfig,
}

/// Remote assistant services
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BackendConfig {
    pub base_url: String,
    /// Prepended to structured command endpoints
    pub command_prefix: String,
    pub timeout_ms: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".to_string(),
            command_prefix: "/api".to_string(),
            timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct VoiceConfig {
    pub wake_word: String,
    pub wake_word_enabled: bool,
    /// DOM-style key code, e.g. `Space` or `F9`
    pub hotkey: String,
    pub language: String,
    pub voice: Option<String>,
    pub rate: f32,
    pub pitch: f32,
    pub restart_cooldown_ms: u64,
    pub speak_responses: bool,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            wake_word: "hey neurotrain".to_string(),
            wake_word_enabled: true,
            hotkey: "Space".to_string(),
            language: "en-US".to_string(),
            voice: None,
            rate: 0.95,
            pitch: 1.0,
            restart_cooldown_ms: 500,
            speak_responses: true,
        }
    }
}

impl VoiceConfig {
    pub fn hotkey(&self) -> Result<KeyCode> {
        self.hotkey
            .parse()
            .with_context(|| format!("invalid hotkey {:?}", self.hotkey))
    }
}

/// On-disk overlay, every field optional
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    socket_path: Option<PathBuf>,
    backend: BackendConfig,
    voice: VoiceConfig,
}

impl Config {
    /// Load configuration from environment, defaults and the config file
    pub fn load() -> Result<Self> {
        let home = std::env::var("HOME")?;
        let data_dir = PathBuf::from(&home)
            .join(".local")
            .join("share")
            .join("neurotrain");

        let file = match config_file_path() {
            Some(path) if path.exists() => Self::read_file(&path)?,
            _ => FileConfig::default(),
        };

        let mut config = Self::from_parts(data_dir, file)?;
        if let Ok(url) = std::env::var("NEUROTRAIN_BACKEND_URL") {
            config.backend.base_url = url;
        }
        Ok(config)
    }

    fn read_file(path: &Path) -> Result<FileConfig> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let file = toml::from_str(&raw)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        debug!(path = %path.display(), "config file loaded");
        Ok(file)
    }

    fn from_parts(data_dir: PathBuf, file: FileConfig) -> Result<Self> {
        // fail early on a bad hotkey rather than at first key press
        file.voice.hotkey()?;

        let socket_path = file
            .socket_path
            .unwrap_or_else(|| data_dir.join("daemon.sock"));

        Ok(Self {
            socket_path,
            data_dir,
            backend: file.backend,
            voice: file.voice,
        })
    }

    /// Ensure data directory exists
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        Ok(())
    }
}

fn config_file_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("NEUROTRAIN_CONFIG") {
        return Some(PathBuf::from(path));
    }
    dirs::config_dir().map(|dir| dir.join("neurotrain").join("config.toml"))
}
