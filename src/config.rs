use std::env;
use std::path::PathBuf;

use crate::aggregate::TieBreak;

pub const DEFAULT_LEDGER_FILE: &str = "attendance-ledger.json";
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Where the ledger records live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backend {
    Postgres { url: String },
    File { path: PathBuf },
}

/// Runtime configuration assembled from the environment and CLI overrides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub backend: Backend,
    pub log_filter: String,
    pub tie_break: TieBreak,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("LEDGER_TIE_BREAK is invalid: {0}")]
    InvalidTieBreak(String),
}

impl AppConfig {
    /// Reads `DATABASE_URL`, `LEDGER_FILE`, `LEDGER_LOG` and `LEDGER_TIE_BREAK`.
    /// An explicit `file` wins over both storage variables.
    pub fn load(file: Option<PathBuf>) -> Result<Self, ConfigError> {
        let var = |name: &str| {
            env::var(name)
                .ok()
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let backend = match (file, var("DATABASE_URL")) {
            (Some(path), _) => Backend::File { path },
            (None, Some(url)) => Backend::Postgres { url },
            (None, None) => Backend::File {
                path: var("LEDGER_FILE")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_LEDGER_FILE)),
            },
        };

        let tie_break = match var("LEDGER_TIE_BREAK") {
            Some(raw) => raw.parse().map_err(ConfigError::InvalidTieBreak)?,
            None => TieBreak::default(),
        };

        Ok(Self {
            backend,
            log_filter: var("LEDGER_LOG").unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string()),
            tie_break,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, OnceLock};

    fn env_guard() -> &'static Mutex<()> {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        GUARD.get_or_init(|| Mutex::new(()))
    }

    fn reset_env() {
        env::remove_var("DATABASE_URL");
        env::remove_var("LEDGER_FILE");
        env::remove_var("LEDGER_LOG");
        env::remove_var("LEDGER_TIE_BREAK");
    }

    #[test]
    fn load_uses_defaults_when_env_missing() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        let config = AppConfig::load(None).expect("config loads with defaults");
        assert_eq!(
            config.backend,
            Backend::File {
                path: PathBuf::from(DEFAULT_LEDGER_FILE)
            }
        );
        assert_eq!(config.log_filter, "info");
        assert_eq!(config.tie_break, TieBreak::LastEvaluated);
    }

    #[test]
    fn database_url_selects_postgres_unless_file_given() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("DATABASE_URL", "postgres://localhost/ledger");
        env::set_var("LEDGER_TIE_BREAK", "first");

        let config = AppConfig::load(None).expect("config loads");
        assert_eq!(
            config.backend,
            Backend::Postgres {
                url: "postgres://localhost/ledger".to_string()
            }
        );
        assert_eq!(config.tie_break, TieBreak::FirstEvaluated);

        let config = AppConfig::load(Some(PathBuf::from("local.json"))).expect("config loads");
        assert_eq!(
            config.backend,
            Backend::File {
                path: PathBuf::from("local.json")
            }
        );
        reset_env();
    }

    #[test]
    fn rejects_unknown_tie_break() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("LEDGER_TIE_BREAK", "coin-flip");
        assert!(matches!(
            AppConfig::load(None),
            Err(ConfigError::InvalidTieBreak(_))
        ));
        reset_env();
    }
}
