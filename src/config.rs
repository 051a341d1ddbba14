//! Cache roots and request settings, loaded from a CONL (or JSON) file

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "config.conl";

/// Seconds to wait after every network request
const DEFAULT_REQUEST_DELAY_SECS: u64 = 2;

fn default_request_delay() -> u64 {
    DEFAULT_REQUEST_DELAY_SECS
}

/// Keys used only by the JSON export pipeline (`country_json_root`) are ignored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Snapshots that look like real pages, one directory per date
    pub country_html_root: PathBuf,
    /// Snapshots rejected by the blacklist filter, same layout
    pub country_html_blacklist: PathBuf,
    /// Cached archive calendars, one file per page and year
    pub country_html_yearly_summaries: PathBuf,
    /// Weekly `YYYY-MM-DD_factbook.json` files read by `series`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weekly_json_root: Option<PathBuf>,
    #[serde(default = "default_request_delay")]
    pub request_delay_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            country_html_root: PathBuf::from("data/pages"),
            country_html_blacklist: PathBuf::from("data/blacklist"),
            country_html_yearly_summaries: PathBuf::from("data/yearly_summaries"),
            weekly_json_root: None,
            request_delay_secs: DEFAULT_REQUEST_DELAY_SECS,
        }
    }
}

impl Config {
    /// Load the config file. `.json` files are read as JSON, everything else as CONL.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;

        let is_json = path.extension().map_or(false, |e| e == "json");
        let config: Config = if is_json {
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse config: {}", path.display()))?
        } else {
            serde_conl::from_str(&content)
                .with_context(|| format!("Failed to parse config: {}", path.display()))?
        };

        log::debug!("Loaded config from {}: {:?}", path.display(), config);
        Ok(config)
    }

    /// Write a default CONL config, refusing to replace an existing file
    pub fn write_default(path: &Path) -> Result<Config> {
        if path.exists() {
            bail!("Config {} already exists, not overwriting", path.display());
        }
        let config = Config::default();
        let conl = serde_conl::to_string(&config).context("Failed to serialize config")?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, conl)
            .with_context(|| format!("Failed to write config: {}", path.display()))?;
        Ok(config)
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_secs(self.request_delay_secs)
    }
}
