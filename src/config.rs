//! Environment-driven runtime settings.
//!
//! | Variable | Default |
//! |---|---|
//! | `ONCOGUARD_DB_PATH` | `oncoguard.db` |
//! | `ONCOGUARD_MODEL_PATH` | `models` |
//! | `ONCOGUARD_LOG_MODE` | `auto` (`file` when `ONCOGUARD_LOG_FILE` is set, else `stdout`) |
//! | `ONCOGUARD_LOG_FILE` | `oncoguard.log` when logging to a file |
//! | `ONCOGUARD_ITEMS_PER_PAGE` | `10` |
//! | `ONCOGUARD_UPGRADE_LEGACY_DIGESTS` | `false` |
//! | `ONCOGUARD_ALLOW_UNVERIFIED_MODEL` | `false`, honoured in debug builds only |

use std::path::PathBuf;

use crate::adapters::xgboost::ManifestPolicy;

pub const DB_PATH_ENV: &str = "ONCOGUARD_DB_PATH";
pub const MODEL_PATH_ENV: &str = "ONCOGUARD_MODEL_PATH";
pub const LOG_MODE_ENV: &str = "ONCOGUARD_LOG_MODE";
pub const LOG_FILE_ENV: &str = "ONCOGUARD_LOG_FILE";
pub const ITEMS_PER_PAGE_ENV: &str = "ONCOGUARD_ITEMS_PER_PAGE";
pub const UPGRADE_LEGACY_DIGESTS_ENV: &str = "ONCOGUARD_UPGRADE_LEGACY_DIGESTS";
#[cfg(debug_assertions)]
pub const ALLOW_UNVERIFIED_MODEL_ENV: &str = "ONCOGUARD_ALLOW_UNVERIFIED_MODEL";

pub const DEFAULT_ITEMS_PER_PAGE: usize = 10;

/// Where log output goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogTarget {
    Stdout,
    File(PathBuf),
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_path: PathBuf,
    pub model_path: PathBuf,
    pub log_target: LogTarget,
    pub items_per_page: usize,
    /// Re-hash legacy SHA-256 credentials with Argon2id on successful login.
    pub upgrade_legacy_digests: bool,
    pub allow_unverified_model: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("oncoguard.db"),
            model_path: PathBuf::from("models"),
            log_target: LogTarget::Stdout,
            items_per_page: DEFAULT_ITEMS_PER_PAGE,
            upgrade_legacy_digests: false,
            allow_unverified_model: false,
        }
    }
}

fn parse_bool(value: Option<String>) -> bool {
    value
        .map(|v| matches!(v.trim(), "1" | "true" | "TRUE" | "yes" | "YES"))
        .unwrap_or(false)
}

impl AppConfig {
    /// Read settings from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read settings through `lookup`. Unparseable values fall back to
    /// defaults with a warning.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let log_file = non_empty(LOG_FILE_ENV).map(PathBuf::from);
        let log_target = match non_empty(LOG_MODE_ENV).as_deref() {
            Some("file") => LogTarget::File(log_file.unwrap_or_else(|| PathBuf::from("oncoguard.log"))),
            Some("stdout") => LogTarget::Stdout,
            _ => log_file.map_or(LogTarget::Stdout, LogTarget::File),
        };

        let items_per_page = match non_empty(ITEMS_PER_PAGE_ENV) {
            Some(raw) => match raw.trim().parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => {
                    tracing::warn!("Ignoring invalid {ITEMS_PER_PAGE_ENV}={raw:?}");
                    defaults.items_per_page
                }
            },
            None => defaults.items_per_page,
        };

        #[cfg(debug_assertions)]
        let allow_unverified_model = parse_bool(lookup(ALLOW_UNVERIFIED_MODEL_ENV));
        #[cfg(not(debug_assertions))]
        let allow_unverified_model = false;

        Self {
            db_path: non_empty(DB_PATH_ENV).map_or(defaults.db_path, PathBuf::from),
            model_path: non_empty(MODEL_PATH_ENV).map_or(defaults.model_path, PathBuf::from),
            log_target,
            items_per_page,
            upgrade_legacy_digests: parse_bool(lookup(UPGRADE_LEGACY_DIGESTS_ENV)),
            allow_unverified_model,
        }
    }

    #[must_use]
    pub fn manifest_policy(&self) -> ManifestPolicy {
        if self.allow_unverified_model {
            ManifestPolicy::AllowMissing
        } else {
            ManifestPolicy::Required
        }
    }
}
