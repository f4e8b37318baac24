//! Environment-variable configuration (§6, §13)
//!
//! Deliberately minimal: the spec's Out-of-scope list excludes
//! "configuration loading" as a feature, so this reads exactly the
//! closed set of environment variables and applies the documented
//! defaults rather than layering CLI/TOML/file resolution on top.

use crate::{Error, Result};

/// Detection pipeline configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub acoustid_api_key: Option<String>,
    pub audd_api_key: Option<String>,
    pub audd_enabled: bool,
    pub acoustid_enabled: bool,
    pub external_detection_enabled: bool,
    pub database_url: String,
    pub max_concurrent: usize,
    pub interval_seconds: u64,
    pub fpcalc_path: Option<String>,
}

impl Config {
    /// Load configuration from the process environment.
    ///
    /// `DATABASE_URL` is the only variable without a usable default;
    /// everything else falls back to the values documented in §4.9/§6.
    pub fn from_env() -> Result<Self> {
        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| Error::Config("DATABASE_URL must be set".to_string()))?;

        Ok(Self {
            acoustid_api_key: non_empty_env("ACOUSTID_API_KEY"),
            audd_api_key: non_empty_env("AUDD_API_KEY"),
            audd_enabled: bool_env("AUDD_ENABLED", true),
            acoustid_enabled: bool_env("ACOUSTID_ENABLED", true),
            external_detection_enabled: bool_env("EXTERNAL_DETECTION_ENABLED", true),
            database_url,
            max_concurrent: usize_env("MAX_CONCURRENT", 5)?,
            interval_seconds: u64_env("INTERVAL_SECONDS", 60)?,
            fpcalc_path: non_empty_env("FPCALC_PATH"),
        })
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn bool_env(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(v) => matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

fn usize_env(key: &str, default: usize) -> Result<usize> {
    match std::env::var(key) {
        Ok(v) => v
            .trim()
            .parse::<usize>()
            .map_err(|e| Error::Config(format!("{key} must be a positive integer: {e}"))),
        Err(_) => Ok(default),
    }
}

fn u64_env(key: &str, default: u64) -> Result<u64> {
    match std::env::var(key) {
        Ok(v) => v
            .trim()
            .parse::<u64>()
            .map_err(|e| Error::Config(format!("{key} must be a positive integer: {e}"))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_all() {
        for key in [
            "ACOUSTID_API_KEY",
            "AUDD_API_KEY",
            "AUDD_ENABLED",
            "ACOUSTID_ENABLED",
            "EXTERNAL_DETECTION_ENABLED",
            "DATABASE_URL",
            "MAX_CONCURRENT",
            "INTERVAL_SECONDS",
            "FPCALC_PATH",
        ] {
            std::env::remove_var(key);
        }
    }

    #[test]
    #[serial]
    fn missing_database_url_is_an_error() {
        clear_all();
        assert!(Config::from_env().is_err());
    }

    #[test]
    #[serial]
    fn defaults_apply_when_unset() {
        clear_all();
        std::env::set_var("DATABASE_URL", "sqlite::memory:");
        let cfg = Config::from_env().unwrap();
        assert_eq!(cfg.max_concurrent, 5);
        assert_eq!(cfg.interval_seconds, 60);
        assert!(cfg.audd_enabled);
        assert!(cfg.acoustid_enabled);
        assert!(cfg.external_detection_enabled);
        assert!(cfg.acoustid_api_key.is_none());
        std::env::remove_var("DATABASE_URL");
    }

    #[test]
    #[serial]
    fn empty_api_key_is_treated_as_absent() {
        clear_all();
        std::env::set_var("DATABASE_URL", "sqlite::memory:");
        std::env::set_var("ACOUSTID_API_KEY", "   ");
        let cfg = Config::from_env().unwrap();
        assert!(cfg.acoustid_api_key.is_none());
        std::env::remove_var("DATABASE_URL");
        std::env::remove_var("ACOUSTID_API_KEY");
    }

    #[test]
    #[serial]
    fn bool_env_accepts_common_spellings() {
        clear_all();
        std::env::set_var("DATABASE_URL", "sqlite::memory:");
        std::env::set_var("AUDD_ENABLED", "false");
        let cfg = Config::from_env().unwrap();
        assert!(!cfg.audd_enabled);
        std::env::remove_var("DATABASE_URL");
        std::env::remove_var("AUDD_ENABLED");
    }
}
