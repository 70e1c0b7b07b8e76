use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Which fetcher resolves metadata and streams data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchBackend {
    /// `yt-dlp` subprocess; understands media site URLs.
    #[default]
    Ytdlp,
    /// Plain HTTP(S) via libcurl for direct links.
    Http,
}

/// `[ytdlp]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct YtDlpConfig {
    /// Executable name or path.
    pub path: PathBuf,
    /// Format selector passed as `-f` (e.g. "bestaudio").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    pub extra_args: Vec<String>,
}

impl Default for YtDlpConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("yt-dlp"),
            format: None,
            extra_args: Vec::new(),
        }
    }
}

/// `[ffmpeg]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FfmpegConfig {
    pub path: PathBuf,
    /// Value for `-loglevel`.
    pub log_level: String,
    /// Inserted between the input and the output path.
    pub extra_args: Vec<String>,
}

impl Default for FfmpegConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("ffmpeg"),
            log_level: "error".to_string(),
            extra_args: Vec::new(),
        }
    }
}

/// `[http]` section, used by the direct-link backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub connect_timeout_secs: u64,
    /// Abort when below 1 KiB/s for this many seconds.
    pub low_speed_time_secs: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 30,
            low_speed_time_secs: 60,
            user_agent: None,
        }
    }
}

/// Global configuration loaded from `~/.config/bulkdl/config.toml`.
///
/// Every field has a default so a partial file is valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BulkConfig {
    /// Concurrent workers when the command line does not say.
    pub workers: usize,
    /// Re-download items whose destination already exists.
    pub overwrite: bool,
    pub backend: FetchBackend,
    pub ytdlp: YtDlpConfig,
    pub ffmpeg: FfmpegConfig,
    pub http: HttpConfig,
}

impl Default for BulkConfig {
    fn default() -> Self {
        Self {
            workers: 5,
            overwrite: false,
            backend: FetchBackend::default(),
            ytdlp: YtDlpConfig::default(),
            ffmpeg: FfmpegConfig::default(),
            http: HttpConfig::default(),
        }
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("bulkdl")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<BulkConfig> {
    load_or_init_at(&config_path()?)
}

/// Same as [`load_or_init`] for an explicit path.
pub fn load_or_init_at(path: &Path) -> Result<BulkConfig> {
    if !path.exists() {
        let default_cfg = BulkConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, toml)
            .with_context(|| format!("failed to write default config: {}", path.display()))?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(path)
        .with_context(|| format!("failed to read config: {}", path.display()))?;
    let cfg: BulkConfig =
        toml::from_str(&data).with_context(|| format!("invalid config: {}", path.display()))?;
    Ok(cfg)
}
