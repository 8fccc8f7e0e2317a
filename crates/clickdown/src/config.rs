//! Run configuration
//!
//! Everything the engine needs is carried by an explicit [`ExtractConfig`]
//! handed to it at construction. Values come from a YAML file, then
//! environment variables, then whatever the caller sets directly.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.clickup.com/api/v2";
pub const ENV_API_KEY: &str = "CLICKUP_API_KEY";
pub const ENV_TEAM_ID: &str = "CLICKDOWN_TEAM_ID";
pub const ENV_LIST_ID: &str = "CLICKDOWN_LIST_ID";

/// Budget used by `--time-sliced` runs: leaves a margin below a typical
/// five minute host limit to persist the checkpoint.
pub const DEFAULT_SLICE_BUDGET_SECS: u64 = 280;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config YAML {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// What to extract
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionRoot {
    /// Every list of every space under a team
    Workspace { team_id: String },
    /// One list
    SingleList { list_id: String },
}

impl ExtractionRoot {
    pub fn id(&self) -> &str {
        match self {
            ExtractionRoot::Workspace { team_id } => team_id,
            ExtractionRoot::SingleList { list_id } => list_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Ceiling on attempts for generic (non-429) failures
    pub max_attempts: u32,
    /// Backoff before retry `n` is `base_delay_secs * n`
    pub base_delay_secs: u64,
    /// Fixed wait after a 429
    pub rate_limit_cooldown_secs: u64,
    /// Separate ceiling for 429 cooldowns, never charged to `max_attempts`
    pub max_rate_limit_waits: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_secs: 2,
            rate_limit_cooldown_secs: 5,
            max_rate_limit_waits: 20,
        }
    }
}

impl RetryPolicy {
    pub fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_secs(self.base_delay_secs.saturating_mul(u64::from(attempt)))
    }

    pub fn rate_limit_cooldown(&self) -> Duration {
        Duration::from_secs(self.rate_limit_cooldown_secs)
    }
}

/// Labels used when rendering custom field values
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Locale {
    pub yes: String,
    pub no: String,
    /// chrono `strftime` pattern for date fields
    pub date_format: String,
}

impl Default for Locale {
    fn default() -> Self {
        Self {
            yes: "Yes".to_string(),
            no: "No".to_string(),
            date_format: "%d/%m/%Y".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractConfig {
    pub api_key: String,
    pub base_url: String,
    /// `root: {workspace: {team_id: ..}}` or `root: {single_list: {list_id: ..}}`
    #[serde(with = "serde_yaml::with::singleton_map_recursive")]
    pub root: Option<ExtractionRoot>,
    pub retry: RetryPolicy,
    pub page_size: usize,
    pub max_pages_per_list: u32,
    /// `None` runs continuously; `Some` suspends once the budget is spent
    pub time_budget_secs: Option<u64>,
    pub resume_delay_secs: u64,
    pub request_timeout_secs: u64,
    pub folderless_label: String,
    pub description_limit: usize,
    pub locale: Locale,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            root: None,
            retry: RetryPolicy::default(),
            page_size: 100,
            max_pages_per_list: 50,
            time_budget_secs: None,
            resume_delay_secs: 45,
            request_timeout_secs: 30,
            folderless_label: "(no folder)".to_string(),
            description_limit: 5000,
            locale: Locale::default(),
        }
    }
}

impl ExtractConfig {
    pub fn new(api_key: impl Into<String>, root: ExtractionRoot) -> Self {
        Self {
            api_key: api_key.into(),
            root: Some(root),
            ..Self::default()
        }
    }

    /// Load from a YAML file. Missing keys take their defaults.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;

        serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Apply `CLICKUP_API_KEY`, `CLICKDOWN_TEAM_ID` and `CLICKDOWN_LIST_ID`
    pub fn apply_env(mut self) -> Self {
        if let Some(key) = non_empty_env(ENV_API_KEY) {
            self.api_key = key;
        }
        if let Some(team_id) = non_empty_env(ENV_TEAM_ID) {
            self.root = Some(ExtractionRoot::Workspace { team_id });
        }
        if let Some(list_id) = non_empty_env(ENV_LIST_ID) {
            self.root = Some(ExtractionRoot::SingleList { list_id });
        }
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_key.trim().is_empty() {
            return Err(ConfigError::Invalid(format!(
                "api_key is empty (set it in the config file or {})",
                ENV_API_KEY
            )));
        }
        match &self.root {
            None => {
                return Err(ConfigError::Invalid(
                    "no extraction root: configure a team_id or a list_id".to_string(),
                ))
            }
            Some(root) if root.id().trim().is_empty() => {
                return Err(ConfigError::Invalid("extraction root id is empty".to_string()))
            }
            Some(_) => {}
        }
        if self.page_size == 0 {
            return Err(ConfigError::Invalid("page_size must be positive".to_string()));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "retry.max_attempts must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn root(&self) -> Result<&ExtractionRoot, ConfigError> {
        self.root
            .as_ref()
            .ok_or_else(|| ConfigError::Invalid("no extraction root configured".to_string()))
    }

    pub fn time_budget(&self) -> Option<Duration> {
        self.time_budget_secs.map(Duration::from_secs)
    }

    pub fn resume_delay(&self) -> Duration {
        Duration::from_secs(self.resume_delay_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    #[test]
    fn test_yaml_with_partial_keys() {
        let yaml = r#"
api_key: pk_123
root:
  workspace:
    team_id: "9001"
retry:
  max_attempts: 5
time_budget_secs: 120
"#;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(yaml.as_bytes()).unwrap();

        let config = ExtractConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.api_key, "pk_123");
        assert_eq!(
            config.root,
            Some(ExtractionRoot::Workspace {
                team_id: "9001".to_string()
            })
        );
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.rate_limit_cooldown_secs, 5);
        assert_eq!(config.time_budget(), Some(Duration::from_secs(120)));
        assert_eq!(config.page_size, 100);
        config.validate().unwrap();
    }

    #[test]
    fn test_yaml_single_list_root_round_trips() {
        let config: ExtractConfig =
            serde_yaml::from_str("root:\n  single_list:\n    list_id: \"901\"\n").unwrap();
        assert_eq!(
            config.root,
            Some(ExtractionRoot::SingleList {
                list_id: "901".to_string()
            })
        );

        let yaml = serde_yaml::to_string(&config).unwrap();
        assert!(yaml.contains("single_list:"));
        let reparsed: ExtractConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(reparsed.root, config.root);

        let rootless: ExtractConfig = serde_yaml::from_str("api_key: pk\n").unwrap();
        assert_eq!(rootless.root, None);
    }

    #[test]
    fn test_validate_rejects_missing_pieces() {
        let mut config = ExtractConfig::default();
        assert!(config.validate().is_err());

        config.api_key = "pk".to_string();
        assert!(config.validate().is_err());

        config.root = Some(ExtractionRoot::SingleList {
            list_id: " ".to_string(),
        });
        assert!(config.validate().is_err());

        config.root = Some(ExtractionRoot::SingleList {
            list_id: "42".to_string(),
        });
        config.validate().unwrap();
    }

    #[test]
    fn test_backoff_grows_with_attempt() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_secs(2));
        assert_eq!(policy.backoff(2), Duration::from_secs(4));
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        // SAFETY: serialized with every other test touching the environment
        unsafe {
            std::env::set_var(ENV_API_KEY, "pk_env");
            std::env::set_var(ENV_LIST_ID, "777");
        }
        let config = ExtractConfig::default().apply_env();
        unsafe {
            std::env::remove_var(ENV_API_KEY);
            std::env::remove_var(ENV_LIST_ID);
        }

        assert_eq!(config.api_key, "pk_env");
        assert_eq!(
            config.root,
            Some(ExtractionRoot::SingleList {
                list_id: "777".to_string()
            })
        );
    }
}
