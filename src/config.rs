use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

pub const ENV_STORE_URL: &str = "NILPLAYER_STORE_URL";
pub const ENV_STORE_KEY: &str = "NILPLAYER_STORE_KEY";
pub const ENV_DISABLE_URL_VALIDATION: &str = "NILPLAYER_DISABLE_URL_VALIDATION";

/// Shortest period a safeguard timer may run at
const MIN_SAFEGUARD_PERIOD_SECS: u64 = 1;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub playback: PlaybackConfig,

    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub safeguards: SafeguardConfig,

    #[serde(default)]
    pub local: LocalConfig,
}

/// Remote progress table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub base_url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_progress_table")]
    pub progress_table: String,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_retries")]
    pub max_retries: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackConfig {
    /// Minimum spacing between periodic progress saves
    #[serde(default = "default_report_interval")]
    pub report_interval_secs: u64,

    #[serde(default = "default_native_mime")]
    pub native_manifest_mime: String,

    #[serde(default)]
    pub disable_url_validation: bool,

    /// How long resume resolution waits for the signed-in user to be confirmed
    #[serde(default = "default_identity_wait")]
    pub identity_wait_secs: u64,
}

/// Tuning handed to the adaptive streaming engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_true")]
    pub enable_worker: bool,

    #[serde(default = "default_true")]
    pub low_latency: bool,

    #[serde(default = "default_back_buffer")]
    pub back_buffer_secs: u32,

    #[serde(default = "default_max_buffer")]
    pub max_buffer_secs: u32,

    #[serde(default = "default_max_max_buffer")]
    pub max_max_buffer_secs: u32,

    #[serde(default = "default_load_timeout")]
    pub fragment_timeout_ms: u64,

    #[serde(default = "default_load_timeout")]
    pub manifest_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafeguardConfig {
    #[serde(default = "default_watermark_period")]
    pub watermark_period_secs: u64,

    #[serde(default = "default_watermark_visible")]
    pub watermark_visible_secs: u64,

    #[serde(default = "default_capture_probe_period")]
    pub capture_probe_period_secs: u64,

    #[serde(default = "default_capture_hint")]
    pub capture_label_hint: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LocalConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl Config {
    /// Load from the default location, then apply environment overrides
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path()?)?;
        config.apply_env();
        Ok(config)
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        if config_path.exists() {
            debug!("Loading config from {:?}", config_path);
            let contents =
                fs::read_to_string(config_path).context("Failed to read config file")?;
            let config: Config =
                toml::from_str(&contents).context("Failed to parse config file")?;
            info!("Config loaded successfully");
            Ok(config)
        } else {
            info!("No config file found, using defaults");
            let config = Config::default();
            if let Err(e) = config.save_to(config_path) {
                warn!("Could not write default config: {:#}", e);
            }
            Ok(config)
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(config_path, contents).context("Failed to write config file")?;

        debug!("Config saved to {:?}", config_path);
        Ok(())
    }

    fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(ENV_STORE_URL) {
            self.store.base_url = url;
        }
        if let Some(key) = lookup(ENV_STORE_KEY) {
            self.store.api_key = Some(key);
        }
        if let Some(flag) = lookup(ENV_DISABLE_URL_VALIDATION) {
            self.playback.disable_url_validation = flag.eq_ignore_ascii_case("true");
        }
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().context("Failed to get config directory")?;
        Ok(config_dir.join("nilplayer").join("config.toml"))
    }

    /// Local key-value file, from config or the platform data directory
    pub fn local_store_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.local.path {
            return Ok(path.clone());
        }
        let data_dir = dirs::data_dir().context("Failed to get data directory")?;
        Ok(data_dir.join("nilplayer").join("local.json"))
    }
}

impl StoreConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl PlaybackConfig {
    pub fn report_interval(&self) -> Duration {
        Duration::from_secs(self.report_interval_secs)
    }

    pub fn identity_wait(&self) -> Duration {
        Duration::from_secs(self.identity_wait_secs)
    }
}

impl EngineConfig {
    /// Engine library defaults, used when an engine is rebuilt after a fatal error.
    /// A zero back buffer leaves eviction to the engine.
    pub fn recovery() -> Self {
        Self {
            back_buffer_secs: 0,
            max_max_buffer_secs: 600,
            manifest_timeout_ms: 10_000,
            ..Self::default()
        }
    }
}

impl SafeguardConfig {
    pub fn watermark_period(&self) -> Duration {
        Duration::from_secs(self.watermark_period_secs.max(MIN_SAFEGUARD_PERIOD_SECS))
    }

    pub fn watermark_visible(&self) -> Duration {
        Duration::from_secs(self.watermark_visible_secs)
    }

    pub fn capture_probe_period(&self) -> Duration {
        Duration::from_secs(self.capture_probe_period_secs.max(MIN_SAFEGUARD_PERIOD_SECS))
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_key: None,
            progress_table: default_progress_table(),
            timeout_secs: default_timeout(),
            max_retries: default_retries(),
        }
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            report_interval_secs: default_report_interval(),
            native_manifest_mime: default_native_mime(),
            disable_url_validation: false,
            identity_wait_secs: default_identity_wait(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            enable_worker: default_true(),
            low_latency: default_true(),
            back_buffer_secs: default_back_buffer(),
            max_buffer_secs: default_max_buffer(),
            max_max_buffer_secs: default_max_max_buffer(),
            fragment_timeout_ms: default_load_timeout(),
            manifest_timeout_ms: default_load_timeout(),
        }
    }
}

impl Default for SafeguardConfig {
    fn default() -> Self {
        Self {
            watermark_period_secs: default_watermark_period(),
            watermark_visible_secs: default_watermark_visible(),
            capture_probe_period_secs: default_capture_probe_period(),
            capture_label_hint: default_capture_hint(),
        }
    }
}

// Default value functions
fn default_progress_table() -> String { "nilplayer_progress".to_string() }
fn default_timeout() -> u64 { 30 }
fn default_retries() -> u32 { 3 }
fn default_report_interval() -> u64 { 5 }
fn default_native_mime() -> String { "application/vnd.apple.mpegurl".to_string() }
fn default_identity_wait() -> u64 { 5 }
fn default_true() -> bool { true }
fn default_back_buffer() -> u32 { 60 }
fn default_max_buffer() -> u32 { 30 }
fn default_max_max_buffer() -> u32 { 60 }
fn default_load_timeout() -> u64 { 20_000 }
fn default_watermark_period() -> u64 { 10 }
fn default_watermark_visible() -> u64 { 3 }
fn default_capture_probe_period() -> u64 { 5 }
fn default_capture_hint() -> String { "Screen".to_string() }
