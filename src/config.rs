use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::sync::CalendarBinding;
use crate::todoist::retry::RetryPolicy;

/// Config file looked up relative to the working directory.
pub const LOCAL_CONFIG_PATH: &str = "configs/configs.toml";

/// Runtime configuration, built once at startup and passed by reference.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub todoist_api_token: Option<String>,
    pub google_access_token: Option<String>,

    #[serde(default = "default_project")]
    pub default_project: String,
    #[serde(default = "default_label")]
    pub label: String,
    #[serde(default = "default_completed_label")]
    pub completed_label: String,
    #[serde(default = "default_task_prefix")]
    pub task_prefix: String,
    #[serde(default = "default_task_suffix")]
    pub task_suffix: String,

    #[serde(default = "default_days_to_fetch")]
    pub days_to_fetch: u32,
    #[serde(default = "default_keep_running")]
    pub keep_running: bool,
    /// Seconds between two runs.
    #[serde(default = "default_run_every")]
    pub run_every: u64,

    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    /// Seconds between two attempts of a failed remote call.
    #[serde(default = "default_retry_delay")]
    pub retry_delay: u64,

    #[serde(default = "default_log_level")]
    pub log_level: String,
    pub database_path: Option<PathBuf>,

    #[serde(default)]
    pub calendars: Vec<CalendarBinding>,
}

fn default_project() -> String {
    "Events".into()
}
fn default_label() -> String {
    "Event".into()
}
fn default_completed_label() -> String {
    "Done".into()
}
fn default_task_prefix() -> String {
    "* 🗓️ ```".into()
}
fn default_task_suffix() -> String {
    "```".into()
}
fn default_days_to_fetch() -> u32 {
    7
}
fn default_keep_running() -> bool {
    true
}
fn default_run_every() -> u64 {
    300
}
fn default_retry_attempts() -> u32 {
    15
}
fn default_retry_delay() -> u64 {
    60
}
fn default_log_level() -> String {
    "info".into()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            todoist_api_token: None,
            google_access_token: None,
            default_project: default_project(),
            label: default_label(),
            completed_label: default_completed_label(),
            task_prefix: default_task_prefix(),
            task_suffix: default_task_suffix(),
            days_to_fetch: default_days_to_fetch(),
            keep_running: default_keep_running(),
            run_every: default_run_every(),
            retry_attempts: default_retry_attempts(),
            retry_delay: default_retry_delay(),
            log_level: default_log_level(),
            database_path: None,
            calendars: Vec::new(),
        }
    }
}

/// Where a [`Config`] was read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    File(PathBuf),
    Environment,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::File(path) => write!(f, "{}", path.display()),
            ConfigSource::Environment => write!(f, "the environment"),
        }
    }
}

impl Config {
    /// Load configuration from wherever [`Config::locate`] points.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        Self::load_from(&Self::locate(explicit))
    }

    /// Where configuration comes from.
    ///
    /// An explicit path is used as given and must exist. Without one,
    /// `configs/configs.toml` and then `~/.caltasks/config.toml` are tried;
    /// when neither exists the process environment is used instead.
    pub fn locate(explicit: Option<&Path>) -> ConfigSource {
        if let Some(path) = explicit {
            return ConfigSource::File(path.to_path_buf());
        }
        let candidates = [Some(PathBuf::from(LOCAL_CONFIG_PATH)), home_config_path()];
        candidates
            .into_iter()
            .flatten()
            .find(|path| path.is_file())
            .map_or(ConfigSource::Environment, ConfigSource::File)
    }

    pub fn load_from(source: &ConfigSource) -> Result<Self> {
        match source {
            ConfigSource::File(path) => Self::from_file(path),
            ConfigSource::Environment => Self::from_env_map(&std::env::vars().collect()),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(text).map_err(|e| Error::Config(format!("invalid config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Build a config from environment-style `KEY=value` pairs.
    ///
    /// Keys are the upper-cased config keys (`TODOIST_API_TOKEN`, `RUN_EVERY`,
    /// ...). `CALENDARS` holds `project_id=calendar_id` pairs separated by commas.
    pub fn from_env_map(vars: &HashMap<String, String>) -> Result<Self> {
        let get = |key: &str| vars.get(key).filter(|v| !v.is_empty()).cloned();
        let defaults = Config::default();

        let config = Config {
            todoist_api_token: get("TODOIST_API_TOKEN"),
            google_access_token: get("GOOGLE_ACCESS_TOKEN"),
            default_project: get("DEFAULT_PROJECT").unwrap_or(defaults.default_project),
            label: get("LABEL").unwrap_or(defaults.label),
            completed_label: get("COMPLETED_LABEL").unwrap_or(defaults.completed_label),
            task_prefix: get("TASK_PREFIX").unwrap_or(defaults.task_prefix),
            task_suffix: get("TASK_SUFFIX").unwrap_or(defaults.task_suffix),
            days_to_fetch: parse_var(vars, "DAYS_TO_FETCH")?.unwrap_or(defaults.days_to_fetch),
            keep_running: parse_var(vars, "KEEP_RUNNING")?.unwrap_or(defaults.keep_running),
            run_every: parse_var(vars, "RUN_EVERY")?.unwrap_or(defaults.run_every),
            retry_attempts: parse_var(vars, "RETRY_ATTEMPTS")?
                .unwrap_or(defaults.retry_attempts),
            retry_delay: parse_var(vars, "RETRY_DELAY")?.unwrap_or(defaults.retry_delay),
            log_level: get("LOG_LEVEL").unwrap_or(defaults.log_level),
            database_path: get("DATABASE_PATH").map(PathBuf::from),
            calendars: match get("CALENDARS") {
                Some(raw) => parse_calendar_pairs(&raw)?,
                None => Vec::new(),
            },
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.run_every == 0 {
            return Err(Error::Config("run_every must be at least 1 second".into()));
        }
        if self.retry_attempts == 0 {
            return Err(Error::Config("retry_attempts must be at least 1".into()));
        }
        if self.days_to_fetch == 0 {
            return Err(Error::Config("days_to_fetch must be at least 1".into()));
        }
        Ok(())
    }

    /// The Todoist token, which is mandatory before any run can start.
    pub fn require_todoist_token(&self) -> Result<&str> {
        self.todoist_api_token
            .as_deref()
            .ok_or_else(|| Error::Config("Todoist token not set (todoist_api_token)".into()))
    }

    pub fn require_google_token(&self) -> Result<&str> {
        self.google_access_token
            .as_deref()
            .ok_or_else(|| Error::Config("Google access token not set (google_access_token)".into()))
    }

    pub fn run_interval(&self) -> Duration {
        Duration::from_secs(self.run_every)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::fixed(self.retry_attempts, Duration::from_secs(self.retry_delay))
    }
}

fn home_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".caltasks").join("config.toml"))
}

fn parse_var<T: std::str::FromStr>(vars: &HashMap<String, String>, key: &str) -> Result<Option<T>> {
    match vars.get(key).filter(|v| !v.is_empty()) {
        Some(raw) => raw
            .trim()
            .to_lowercase()
            .parse::<T>()
            .map(Some)
            .map_err(|_| Error::Config(format!("invalid value for {key}: {raw}"))),
        None => Ok(None),
    }
}

fn parse_calendar_pairs(raw: &str) -> Result<Vec<CalendarBinding>> {
    raw.split(',')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (project_id, calendar_id) = pair.split_once('=').ok_or_else(|| {
                Error::Config(format!("invalid calendar binding '{pair}', expected project_id=calendar_id"))
            })?;
            Ok(CalendarBinding {
                project_id: project_id.trim().to_string(),
                calendar_id: calendar_id.trim().to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_toml() {
        let config = Config::from_toml_str("todoist_api_token = \"abc\"").unwrap();
        assert_eq!(config.default_project, "Events");
        assert_eq!(config.label, "Event");
        assert_eq!(config.completed_label, "Done");
        assert_eq!(config.task_prefix, "* 🗓️ ```");
        assert_eq!(config.task_suffix, "```");
        assert_eq!(config.days_to_fetch, 7);
        assert!(config.keep_running);
        assert_eq!(config.run_every, 300);
        assert_eq!(config.retry_attempts, 15);
        assert_eq!(config.retry_delay, 60);
        assert!(config.calendars.is_empty());
    }

    #[test]
    fn test_toml_with_calendars() {
        let config = Config::from_toml_str(
            r#"
            todoist_api_token = "abc"
            keep_running = false
            run_every = 60

            [[calendars]]
            project_id = "p1"
            calendar_id = "me@example.com"
            "#,
        )
        .unwrap();
        assert!(!config.keep_running);
        assert_eq!(config.run_every, 60);
        assert_eq!(config.calendars.len(), 1);
        assert_eq!(config.calendars[0].calendar_id, "me@example.com");
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = Config::from_toml_str("run_every = \"soon\"").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_zero_interval_rejected() {
        let err = Config::from_toml_str("run_every = 0").unwrap_err();
        assert!(err.to_string().contains("run_every"));
    }

    #[test]
    fn test_env_map() {
        let vars: HashMap<String, String> = [
            ("TODOIST_API_TOKEN", "tok"),
            ("KEEP_RUNNING", "False"),
            ("DAYS_TO_FETCH", "14"),
            ("CALENDARS", "p1=a@example.com, p2=b@example.com"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let config = Config::from_env_map(&vars).unwrap();
        assert_eq!(config.require_todoist_token().unwrap(), "tok");
        assert!(!config.keep_running);
        assert_eq!(config.days_to_fetch, 14);
        assert_eq!(config.calendars.len(), 2);
        assert_eq!(config.calendars[1].project_id, "p2");
        assert_eq!(config.calendars[1].calendar_id, "b@example.com");
    }

    #[test]
    fn test_env_map_bad_number() {
        let vars: HashMap<String, String> =
            [("RUN_EVERY".to_string(), "often".to_string())].into_iter().collect();
        assert!(Config::from_env_map(&vars).is_err());
    }

    #[test]
    fn test_missing_token_is_fatal() {
        let config = Config::default();
        assert!(matches!(config.require_todoist_token(), Err(Error::Config(_))));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "todoist_api_token = \"xyz\"\nlabel = \"Meeting\"\n").unwrap();
        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.label, "Meeting");
        assert_eq!(config.todoist_api_token.as_deref(), Some("xyz"));
    }

    #[test]
    fn test_explicit_path_is_the_source() {
        let path = Path::new("/nonexistent/caltasks.toml");
        let source = Config::locate(Some(path));
        assert_eq!(source, ConfigSource::File(path.to_path_buf()));
        assert_eq!(source.to_string(), "/nonexistent/caltasks.toml");
        assert!(matches!(Config::load_from(&source), Err(Error::Config(_))));
        assert_eq!(ConfigSource::Environment.to_string(), "the environment");
    }
}
