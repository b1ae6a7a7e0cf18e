//! Configuration for reprotrack.
//!
//! Settings live in `~/.reprotrack/config.toml`. Every section is optional;
//! a missing file yields the defaults.
//!
//! ```toml
//! [ledger]
//! path = "${HOME}/herd/ledger.db"
//! busy_timeout_ms = 5000
//!
//! [maintenance]
//! embryo_shelf_life_days = 8
//! run_daily_expiry = true
//!
//! [transfer]
//! tag_probe_attempts = 10
//! auto_restore_session = true
//!
//! [logging]
//! filter = "reprotrack=debug,info"
//! file = "${HOME}/.reprotrack/reprotrack.log"
//! ```

mod logging;

pub use logging::init_logging;

use serde::Deserialize;
use std::{env, path::Path, path::PathBuf, time::Duration};
use thiserror::Error;

pub const DEFAULT_SHELF_LIFE_DAYS: u32 = 8;
pub const DEFAULT_TAG_PROBE_ATTEMPTS: u32 = 10;
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_LOG_FILTER: &str = "info";

// Default value function for serde (bool::default() is false, so only true needs a fn)
const fn default_true() -> bool {
    true
}

#[derive(Debug, Default, Deserialize)]
pub struct ReprotrackConfig {
    pub ledger: Option<LedgerConfig>,
    pub maintenance: Option<MaintenanceConfig>,
    pub transfer: Option<TransferConfig>,
    pub logging: Option<LoggingConfig>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config at {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl ConfigError {
    pub fn path(&self) -> &PathBuf {
        match self {
            ConfigError::Read { path, .. } | ConfigError::Parse { path, .. } => path,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct LedgerConfig {
    /// SQLite database file. `${VAR}` references are expanded.
    pub path: Option<String>,
    pub busy_timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct MaintenanceConfig {
    /// Fresh embryos older than this many days past fertilization are discarded.
    pub embryo_shelf_life_days: Option<u32>,
    #[serde(default = "default_true")]
    pub run_daily_expiry: bool,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            embryo_shelf_life_days: None,
            run_daily_expiry: true,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TransferConfig {
    /// Numbered suffixes tried after the bare `-MOVddmm` tag collides.
    pub tag_probe_attempts: Option<u32>,
    /// Offer the last open transfer session when the app starts.
    #[serde(default = "default_true")]
    pub auto_restore_session: bool,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            tag_probe_attempts: None,
            auto_restore_session: true,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive; `RUST_LOG` wins when set.
    pub filter: Option<String>,
    /// Write logs to this file instead of stderr.
    pub file: Option<String>,
}

impl LoggingConfig {
    #[must_use]
    pub fn filter(&self) -> &str {
        self.filter
            .as_deref()
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .unwrap_or(DEFAULT_LOG_FILTER)
    }

    #[must_use]
    pub fn file_path(&self) -> Option<PathBuf> {
        self.file
            .as_deref()
            .map(expand_env_vars)
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from)
    }
}

/// Expand `${VAR}` references. Unknown variables expand to the empty string
/// and an unclosed `${` is kept verbatim.
pub fn expand_env_vars(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let var = &after[..end];
                if !var.is_empty() {
                    out.push_str(&env::var(var).unwrap_or_default());
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);

    out
}

impl ReprotrackConfig {
    /// Load the user config. `Ok(None)` when there is no home dir or no file.
    pub fn load() -> Result<Option<Self>, ConfigError> {
        let path = match config_path() {
            Some(path) => path,
            None => return Ok(None),
        };
        if !path.exists() {
            return Ok(None);
        }
        Self::load_from(&path).map(Some)
    }

    /// Like [`Self::load`], but falls back to defaults on any failure.
    #[must_use]
    pub fn load_or_default() -> Self {
        Self::load().ok().flatten().unwrap_or_default()
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!("Failed to read config at {:?}: {}", path, err);
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source: err,
                });
            }
        };

        match toml::from_str(&content) {
            Ok(config) => Ok(config),
            Err(err) => {
                tracing::warn!("Failed to parse config at {:?}: {}", path, err);
                Err(ConfigError::Parse {
                    path: path.to_path_buf(),
                    source: err,
                })
            }
        }
    }

    #[must_use]
    pub fn path() -> Option<PathBuf> {
        config_path()
    }

    /// Ledger database location; defaults to `~/.reprotrack/ledger.db`.
    #[must_use]
    pub fn ledger_path(&self) -> Option<PathBuf> {
        let configured = self
            .ledger
            .as_ref()
            .and_then(|ledger| ledger.path.as_deref())
            .map(expand_env_vars)
            .filter(|p| !p.trim().is_empty());

        match configured {
            Some(path) => Some(PathBuf::from(path)),
            None => data_dir().map(|dir| dir.join("ledger.db")),
        }
    }

    #[must_use]
    pub fn busy_timeout(&self) -> Duration {
        let ms = self
            .ledger
            .as_ref()
            .and_then(|ledger| ledger.busy_timeout_ms)
            .unwrap_or(DEFAULT_BUSY_TIMEOUT_MS);
        Duration::from_millis(ms)
    }

    #[must_use]
    pub fn embryo_shelf_life_days(&self) -> u32 {
        self.maintenance
            .as_ref()
            .and_then(|m| m.embryo_shelf_life_days)
            .filter(|days| *days > 0)
            .unwrap_or(DEFAULT_SHELF_LIFE_DAYS)
    }

    #[must_use]
    pub fn run_daily_expiry(&self) -> bool {
        self.maintenance
            .as_ref()
            .is_none_or(|m| m.run_daily_expiry)
    }

    #[must_use]
    pub fn tag_probe_attempts(&self) -> u32 {
        self.transfer
            .as_ref()
            .and_then(|t| t.tag_probe_attempts)
            .unwrap_or(DEFAULT_TAG_PROBE_ATTEMPTS)
    }

    #[must_use]
    pub fn auto_restore_session(&self) -> bool {
        self.transfer.as_ref().is_none_or(|t| t.auto_restore_session)
    }
}

fn data_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".reprotrack"))
}

#[must_use]
pub fn config_path() -> Option<PathBuf> {
    data_dir().map(|dir| dir.join("config.toml"))
}
