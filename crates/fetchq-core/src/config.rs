use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::fetch::LoadPriority;
use crate::scheduler::AdmissionPolicy;

/// Leak detection for finished-but-unreleased requests (optional section in config.toml).
/// Only consulted by debug builds; release builds never run the sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeakCheckConfig {
    /// Turn the sweep off even in debug builds.
    pub enabled: bool,
    /// Seconds to wait after the scheduler goes idle before warning.
    pub grace_secs: f64,
}

impl Default for LeakCheckConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            grace_secs: 5.0,
        }
    }
}

/// libcurl transfer settings (optional section in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurlConfig {
    pub connect_timeout_secs: u64,
    /// Whole-transfer timeout in seconds (None = no limit).
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Receive-rate cap in bytes/s for `low` priority transfers; `below_normal`
    /// gets twice this. None leaves every priority unthrottled.
    #[serde(default)]
    pub low_priority_max_recv_bytes_per_sec: Option<u64>,
}

impl Default for CurlConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 15,
            timeout_secs: None,
            low_priority_max_recv_bytes_per_sec: None,
        }
    }
}

/// Global configuration loaded from `~/.config/fetchq/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchqConfig {
    /// Maximum number of transfers running at once.
    pub max_active_transfers: usize,
    /// Which queued request is admitted next: "lifo" (newest first) or "fifo".
    #[serde(default)]
    pub admission_policy: AdmissionPolicy,
    /// Start in serialized mode: one request at a time, from admission to release.
    #[serde(default)]
    pub serialized: bool,
    /// Length of one scheduler tick in milliseconds (at least 1).
    pub tick_interval_ms: u64,
    /// Priority hint passed through to the fetch primitive.
    #[serde(default)]
    pub load_priority: LoadPriority,
    #[serde(default)]
    pub leak_check: Option<LeakCheckConfig>,
    #[serde(default)]
    pub curl: Option<CurlConfig>,
}

impl Default for FetchqConfig {
    fn default() -> Self {
        Self {
            max_active_transfers: 5,
            admission_policy: AdmissionPolicy::Lifo,
            serialized: false,
            tick_interval_ms: 16,
            load_priority: LoadPriority::Normal,
            leak_check: None,
            curl: None,
        }
    }
}

impl FetchqConfig {
    /// Leak-check settings, falling back to built-in defaults when the section is missing.
    pub fn leak_check_or_default(&self) -> LeakCheckConfig {
        self.leak_check.clone().unwrap_or_default()
    }

    pub fn curl_or_default(&self) -> CurlConfig {
        self.curl.clone().unwrap_or_default()
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("fetchq")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Render a config as it would be written to `config.toml`.
pub fn to_toml_string(cfg: &FetchqConfig) -> Result<String> {
    Ok(toml::to_string_pretty(cfg)?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<FetchqConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = FetchqConfig::default();
        let toml = to_toml_string(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)
        .with_context(|| format!("read config {}", path.display()))?;
    let cfg: FetchqConfig =
        toml::from_str(&data).with_context(|| format!("parse config {}", path.display()))?;
    Ok(cfg)
}
