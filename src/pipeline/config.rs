//! Application configuration.
//!
//! Loaded once at startup from a YAML file (by default
//! `config/config.yaml` under the working directory) and read-only afterwards.
//!
//! ```yaml
//! REDIS_INSTANCES:
//!   - r-bp1abc
//!   - r-bp1def
//! CALL_ALI_INTERVAL: 60
//! EXPORT_FILE_PATH: /data/redis-analysis
//! ALI_ACCESS_KEY: LTAI...
//! ALI_ACCESS_SECRET: ...
//! GITLAB_URL: https://gitlab.example.com
//! GITLAB_ACCESS_TOKEN: glpat-...
//! GITLAB_PROJECT_ID: 42
//! GITLAB_ISSUE_IID: 7
//! RESULT_UPLOAD_MARKDOWN_MAP:
//!   - LABEL: redis01
//!     PREFIX: r-bp1abc_topprefix
//!     BIGKEY: r-bp1abc_topbigmem
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::cache::cache_key;
use crate::export::ResultKind;

/// Default location of the configuration file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/config.yaml";

const DEFAULT_EXPORT_PATH: &str = "/tmp";
const DEFAULT_DAS_ENDPOINT: &str = "das.cn-shanghai.aliyuncs.com";
const DEFAULT_KVSTORE_ENDPOINT: &str = "r-kvstore.cn-shenzhen.aliyuncs.com";

/// Environment variables that override secrets from the file.
const SECRET_OVERRIDES: [&str; 3] = ["ALI_ACCESS_KEY", "ALI_ACCESS_SECRET", "GITLAB_ACCESS_TOKEN"];

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("Failed to read config file '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid YAML for this schema.
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// One line of the summary report: a label and the cache keys it shows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct ReportEntry {
    pub label: String,
    /// Cache key of the top-prefix table reference.
    pub prefix: String,
    /// Cache key of the top-bigmem table reference.
    pub bigkey: String,
}

impl ReportEntry {
    pub fn new(label: impl Into<String>, prefix: impl Into<String>, bigkey: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            prefix: prefix.into(),
            bigkey: bigkey.into(),
        }
    }

    /// Entry for an instance, labelled with its id.
    pub fn for_instance(instance_id: &str) -> Self {
        Self::new(
            instance_id,
            cache_key(instance_id, ResultKind::TopPrefix),
            cache_key(instance_id, ResultKind::TopBigMem),
        )
    }
}

/// Configuration for the analysis run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct AppConfig {
    // Analysis settings
    /// Redis instance ids to analyze.
    #[serde(default)]
    pub redis_instances: Vec<String>,
    /// Seconds between job status polls. Zero means the default.
    #[serde(default)]
    pub call_ali_interval: u64,
    /// Directory receiving the CSV exports.
    #[serde(default = "default_export_path")]
    pub export_file_path: PathBuf,

    // Aliyun settings
    #[serde(default)]
    pub ali_access_key: String,
    #[serde(default)]
    pub ali_access_secret: String,
    #[serde(default = "default_das_endpoint")]
    pub ali_das_endpoint: String,
    #[serde(default = "default_kvstore_endpoint")]
    pub ali_kvstore_endpoint: String,

    // GitLab settings
    #[serde(default)]
    pub gitlab_url: String,
    #[serde(default)]
    pub gitlab_access_token: String,
    #[serde(default)]
    pub gitlab_project_id: u64,
    #[serde(default)]
    pub gitlab_issue_iid: u64,

    // Report settings
    /// Summary lines, in order. Empty means one line per instance.
    #[serde(default)]
    pub result_upload_markdown_map: Vec<ReportEntry>,
}

fn default_export_path() -> PathBuf {
    PathBuf::from(DEFAULT_EXPORT_PATH)
}

fn default_das_endpoint() -> String {
    DEFAULT_DAS_ENDPOINT.to_string()
}

fn default_kvstore_endpoint() -> String {
    DEFAULT_KVSTORE_ENDPOINT.to_string()
}

impl AppConfig {
    /// Loads, overrides from the environment, and validates a config file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file cannot be read or parsed, or if the
    /// resulting configuration is invalid.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let mut config = Self::from_yaml_str(&content)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;

        tracing::info!(
            path = %path.display(),
            instances = config.redis_instances.len(),
            "Config loaded"
        );
        Ok(config)
    }

    /// Parses a YAML document without validating it.
    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        let mut config: AppConfig = serde_yaml::from_str(content)?;
        if config.export_file_path.as_os_str().is_empty() {
            config.export_file_path = default_export_path();
        }
        Ok(config)
    }

    /// Replaces secrets with non-empty values returned by `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        for key in SECRET_OVERRIDES {
            let Some(value) = lookup(key).filter(|v| !v.trim().is_empty()) else {
                continue;
            };
            match key {
                "ALI_ACCESS_KEY" => self.ali_access_key = value,
                "ALI_ACCESS_SECRET" => self.ali_access_secret = value,
                "GITLAB_ACCESS_TOKEN" => self.gitlab_access_token = value,
                _ => {}
            }
        }
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` if any values are invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.redis_instances.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "REDIS_INSTANCES must list at least one instance".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for instance in &self.redis_instances {
            if instance.trim().is_empty() {
                return Err(ConfigError::ValidationFailed(
                    "REDIS_INSTANCES contains an empty instance id".to_string(),
                ));
            }
            if !seen.insert(instance.as_str()) {
                return Err(ConfigError::ValidationFailed(format!(
                    "REDIS_INSTANCES lists '{}' more than once",
                    instance
                )));
            }
        }

        let required = [
            ("ALI_ACCESS_KEY", self.ali_access_key.as_str()),
            ("ALI_ACCESS_SECRET", self.ali_access_secret.as_str()),
            ("GITLAB_URL", self.gitlab_url.as_str()),
            ("GITLAB_ACCESS_TOKEN", self.gitlab_access_token.as_str()),
        ];
        for (key, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::ValidationFailed(format!("{} must be set", key)));
            }
        }

        if self.gitlab_project_id == 0 || self.gitlab_issue_iid == 0 {
            return Err(ConfigError::ValidationFailed(
                "GITLAB_PROJECT_ID and GITLAB_ISSUE_IID must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Configured poll interval. Zero is passed through; the poller replaces it.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.call_ali_interval)
    }

    /// Summary report lines, falling back to one line per instance.
    pub fn report_entries(&self) -> Vec<ReportEntry> {
        if self.result_upload_markdown_map.is_empty() {
            self.redis_instances
                .iter()
                .map(|id| ReportEntry::for_instance(id))
                .collect()
        } else {
            self.result_upload_markdown_map.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const SAMPLE: &str = r#"
REDIS_INSTANCES:
  - r-bp1abc
  - r-bp1def
CALL_ALI_INTERVAL: 30
EXPORT_FILE_PATH: /data/exports
ALI_ACCESS_KEY: key-id
ALI_ACCESS_SECRET: key-secret
GITLAB_URL: https://gitlab.example.com
GITLAB_ACCESS_TOKEN: glpat-token
GITLAB_PROJECT_ID: 42
GITLAB_ISSUE_IID: 7
RESULT_UPLOAD_MARKDOWN_MAP:
  - LABEL: redis01
    PREFIX: r-bp1abc_topprefix
    BIGKEY: r-bp1abc_topbigmem
"#;

    #[test]
    fn test_parse_sample() {
        let config = AppConfig::from_yaml_str(SAMPLE).expect("parse");

        assert_eq!(config.redis_instances, vec!["r-bp1abc", "r-bp1def"]);
        assert_eq!(config.poll_interval(), Duration::from_secs(30));
        assert_eq!(config.export_file_path, PathBuf::from("/data/exports"));
        assert_eq!(config.ali_das_endpoint, DEFAULT_DAS_ENDPOINT);
        assert_eq!(config.ali_kvstore_endpoint, DEFAULT_KVSTORE_ENDPOINT);
        assert_eq!(config.gitlab_project_id, 42);
        assert_eq!(
            config.report_entries(),
            vec![ReportEntry::new("redis01", "r-bp1abc_topprefix", "r-bp1abc_topbigmem")]
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_defaults_for_missing_keys() {
        let config = AppConfig::from_yaml_str("REDIS_INSTANCES: [r-1]\nEXPORT_FILE_PATH: \"\"\n")
            .expect("parse");

        assert_eq!(config.call_ali_interval, 0);
        assert_eq!(config.export_file_path, PathBuf::from("/tmp"));
        assert_eq!(
            config.report_entries(),
            vec![ReportEntry::new("r-1", "r-1_topprefix", "r-1_topbigmem")]
        );
    }

    #[test]
    fn test_validate_rejects_bad_instances() {
        let mut config = AppConfig::from_yaml_str(SAMPLE).expect("parse");

        config.redis_instances = vec![];
        assert!(matches!(config.validate(), Err(ConfigError::ValidationFailed(_))));

        config.redis_instances = vec!["r-1".to_string(), "r-1".to_string()];
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("more than once"));

        config.redis_instances = vec!["  ".to_string()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_requires_credentials() {
        let mut config = AppConfig::from_yaml_str(SAMPLE).expect("parse");
        config.ali_access_secret.clear();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("ALI_ACCESS_SECRET"));

        let mut config = AppConfig::from_yaml_str(SAMPLE).expect("parse");
        config.gitlab_issue_iid = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_apply_overrides() {
        let mut config = AppConfig::from_yaml_str(SAMPLE).expect("parse");
        let env: HashMap<&str, &str> = [("ALI_ACCESS_SECRET", "from-env"), ("GITLAB_ACCESS_TOKEN", " ")]
            .into_iter()
            .collect();

        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.ali_access_key, "key-id");
        assert_eq!(config.ali_access_secret, "from-env");
        assert_eq!(config.gitlab_access_token, "glpat-token");
    }

    #[test]
    fn test_load_missing_file() {
        let err = AppConfig::load(Path::new("/definitely/not/here.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, SAMPLE).expect("write config");

        let config = AppConfig::load(&path).expect("load");
        assert_eq!(config.redis_instances.len(), 2);
    }

    #[test]
    fn test_invalid_yaml() {
        let err = AppConfig::from_yaml_str("REDIS_INSTANCES: {not: [a list").unwrap_err();
        assert!(matches!(err, ConfigError::Yaml(_)));
    }
}
