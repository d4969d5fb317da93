use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use camino::Utf8PathBuf;
use directories::BaseDirs;
use serde::{Deserialize, Serialize};

use crate::error::PesuError;

pub const DEFAULT_BASE_URL: &str = "https://www.pesuacademy.com/Academy";
pub const DEFAULT_STAFF_URL: &str = "https://staff.pes.edu";
pub const SESSION_ENV: &str = "PESU_SESSION";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub staff_url: Option<String>,
    #[serde(default)]
    pub store_dir: Option<String>,
    #[serde(default)]
    pub output_dir: Option<String>,
    #[serde(default)]
    pub sync_interval_secs: Option<u64>,
    #[serde(default)]
    pub fetch_concurrency: Option<usize>,
    #[serde(default)]
    pub download_concurrency: Option<usize>,
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
    #[serde(default)]
    pub max_retries: Option<usize>,
    #[serde(default)]
    pub tree_max_age_hours: Option<u64>,
    #[serde(default)]
    pub program_prefixes: Option<Vec<String>>,
    #[serde(default)]
    pub university_wide_prefixes: Option<Vec<String>>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub base_url: String,
    pub staff_url: String,
    pub store_dir: Utf8PathBuf,
    pub output_dir: Utf8PathBuf,
    pub sync_interval: Duration,
    pub fetch_concurrency: usize,
    pub download_concurrency: usize,
    pub request_timeout: Duration,
    pub max_retries: usize,
    pub tree_max_age: Option<chrono::Duration>,
    pub subject_filter: SubjectFilterConfig,
}

/// Code prefixes that decide which portal subjects belong to a student.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectFilterConfig {
    pub program_prefixes: Vec<String>,
    pub university_wide_prefixes: Vec<String>,
}

impl Default for SubjectFilterConfig {
    fn default() -> Self {
        Self {
            program_prefixes: vec!["UE".to_string()],
            university_wide_prefixes: vec!["UZ".to_string(), "UQ".to_string()],
        }
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Reads `pesu-sync.json` (or the given path). A missing default file is not
    /// an error: every field has a default.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, PesuError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from("pesu-sync.json"),
        };

        if path.is_none() && !config_path.exists() {
            return Self::resolve_config(Config::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| PesuError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| PesuError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, PesuError> {
        let base_url = http_url("base_url", config.base_url, DEFAULT_BASE_URL)?;
        let staff_url = http_url("staff_url", config.staff_url, DEFAULT_STAFF_URL)?;

        let store_dir = match config.store_dir {
            Some(dir) => Utf8PathBuf::from(dir),
            None => default_store_dir()?,
        };
        let output_dir = Utf8PathBuf::from(config.output_dir.unwrap_or_else(|| ".".to_string()));

        let fetch_concurrency = non_zero("fetch_concurrency", config.fetch_concurrency, 5)?;
        let download_concurrency =
            non_zero("download_concurrency", config.download_concurrency, 5)?;
        let interval_secs = non_zero(
            "sync_interval_secs",
            config.sync_interval_secs.map(|v| v as usize),
            60,
        )?;
        let timeout_secs = non_zero(
            "request_timeout_secs",
            config.request_timeout_secs.map(|v| v as usize),
            30,
        )?;

        let defaults = SubjectFilterConfig::default();
        let subject_filter = SubjectFilterConfig {
            program_prefixes: config
                .program_prefixes
                .map(normalize_prefixes)
                .unwrap_or(defaults.program_prefixes),
            university_wide_prefixes: config
                .university_wide_prefixes
                .map(normalize_prefixes)
                .unwrap_or(defaults.university_wide_prefixes),
        };

        Ok(ResolvedConfig {
            base_url,
            staff_url,
            store_dir,
            output_dir,
            sync_interval: Duration::from_secs(interval_secs as u64),
            fetch_concurrency,
            download_concurrency,
            request_timeout: Duration::from_secs(timeout_secs as u64),
            max_retries: config.max_retries.unwrap_or(0),
            tree_max_age: config.tree_max_age_hours.map(max_age).transpose()?,
            subject_filter,
        })
    }
}

/// The portal session token from the environment, if set.
pub fn session_from_env() -> Option<String> {
    std::env::var(SESSION_ENV)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn default_store_dir() -> Result<Utf8PathBuf, PesuError> {
    BaseDirs::new()
        .and_then(|dirs| {
            Utf8PathBuf::from_path_buf(dirs.home_dir().join(".cache").join("pesu-sync")).ok()
        })
        .ok_or_else(|| PesuError::Filesystem("unable to resolve cache directory".to_string()))
}

fn http_url(field: &str, value: Option<String>, default: &str) -> Result<String, PesuError> {
    let url = value
        .map(|url| url.trim_end_matches('/').to_string())
        .unwrap_or_else(|| default.to_string());
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(PesuError::ConfigParse(format!(
            "{field} must be an http(s) URL: {url}"
        )));
    }
    Ok(url)
}

fn max_age(hours: u64) -> Result<chrono::Duration, PesuError> {
    i64::try_from(hours)
        .ok()
        .and_then(chrono::Duration::try_hours)
        .ok_or_else(|| PesuError::ConfigParse(format!("tree_max_age_hours out of range: {hours}")))
}

fn non_zero(field: &str, value: Option<usize>, default: usize) -> Result<usize, PesuError> {
    match value {
        Some(0) => Err(PesuError::ConfigParse(format!("{field} must be at least 1"))),
        Some(value) => Ok(value),
        None => Ok(default),
    }
}

fn normalize_prefixes(prefixes: Vec<String>) -> Vec<String> {
    prefixes
        .into_iter()
        .map(|prefix| prefix.trim().to_uppercase())
        .filter(|prefix| !prefix.is_empty())
        .collect()
}
