//! Orchestrator configuration.
//!
//! Resolved in the order compiled defaults → optional TOML file →
//! `ORCHESTRATOR_*` environment variables (later wins), validated with the
//! `validator` crate before use.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use validator::Validate;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file at {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse TOML config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("config validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("failed to parse environment variable {key}: {message}")]
    EnvParse { key: String, message: String },
}

/// Resolved orchestrator settings (§5, §6, §9's `MAX_RETRIES`).
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Safety bound on the correction retry loop.
    #[validate(range(min = 1))]
    pub max_retries: u32,

    /// Deadline for a single LLM gateway call, in seconds.
    #[validate(range(min = 1))]
    pub llm_deadline_secs: u64,

    /// Deadline for a single inspector invocation, in seconds.
    #[validate(range(min = 1))]
    pub inspector_deadline_secs: u64,

    /// Maximum accepted upload size, in bytes.
    #[validate(range(min = 1))]
    pub max_upload_bytes: u64,

    /// Maximum number of files accepted in one `upload` call.
    #[validate(range(min = 1))]
    pub max_upload_files: usize,

    /// Allowed upload file extensions, without the leading dot.
    pub allowed_extensions: Vec<String>,

    /// Root directory under which `{session_id}/input` and
    /// `{session_id}/output` are staged.
    pub staging_root: PathBuf,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_retries: crate::state::MAX_RETRIES,
            llm_deadline_secs: 30,
            inspector_deadline_secs: 600,
            max_upload_bytes: 5 * 1024 * 1024 * 1024,
            max_upload_files: 10,
            allowed_extensions: vec![
                "bin".into(),
                "dat".into(),
                "continuous".into(),
                "h5".into(),
                "nwb".into(),
                "meta".into(),
                "xml".into(),
                "oebin".into(),
            ],
            staging_root: PathBuf::from("./staging"),
        }
    }
}

impl OrchestratorConfig {
    pub fn llm_deadline(&self) -> Duration {
        Duration::from_secs(self.llm_deadline_secs)
    }

    pub fn inspector_deadline(&self) -> Duration {
        Duration::from_secs(self.inspector_deadline_secs)
    }

    /// Primary-data-file extensions for the composition rule of §6: at most
    /// one such file per upload unless a recognized companion set matches.
    pub fn is_primary_data_extension(ext: &str) -> bool {
        matches!(ext, "bin" | "dat" | "continuous" | "h5" | "nwb")
    }
}

/// Builder for [`OrchestratorConfig`], resolving defaults → file → env.
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    base: OrchestratorConfig,
}

impl ConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            base: OrchestratorConfig::default(),
        }
    }

    /// Overrides `base` with a TOML file's contents. Only fields present in
    /// the file are overridden; absent fields keep their current value.
    pub fn with_file(mut self, path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        self.base = merge_toml(self.base, &content)?;
        Ok(self)
    }

    /// Applies `ORCHESTRATOR_*` environment variable overrides, loading a
    /// `.env` file first if present.
    pub fn with_env(mut self) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        if let Ok(v) = std::env::var("ORCHESTRATOR_MAX_RETRIES") {
            self.base.max_retries = parse_env("ORCHESTRATOR_MAX_RETRIES", &v)?;
        }
        if let Ok(v) = std::env::var("ORCHESTRATOR_LLM_DEADLINE_SECS") {
            self.base.llm_deadline_secs = parse_env("ORCHESTRATOR_LLM_DEADLINE_SECS", &v)?;
        }
        if let Ok(v) = std::env::var("ORCHESTRATOR_INSPECTOR_DEADLINE_SECS") {
            self.base.inspector_deadline_secs = parse_env("ORCHESTRATOR_INSPECTOR_DEADLINE_SECS", &v)?;
        }
        if let Ok(v) = std::env::var("ORCHESTRATOR_MAX_UPLOAD_BYTES") {
            self.base.max_upload_bytes = parse_env("ORCHESTRATOR_MAX_UPLOAD_BYTES", &v)?;
        }
        if let Ok(v) = std::env::var("ORCHESTRATOR_MAX_UPLOAD_FILES") {
            self.base.max_upload_files = parse_env("ORCHESTRATOR_MAX_UPLOAD_FILES", &v)?;
        }
        if let Ok(v) = std::env::var("ORCHESTRATOR_STAGING_ROOT") {
            self.base.staging_root = PathBuf::from(v);
        }

        Ok(self)
    }

    pub fn build(self) -> Result<OrchestratorConfig, ConfigError> {
        self.base.validate()?;
        Ok(self.base)
    }
}

fn merge_toml(base: OrchestratorConfig, content: &str) -> Result<OrchestratorConfig, ConfigError> {
    #[derive(Deserialize, Default)]
    #[serde(default)]
    struct Overrides {
        max_retries: Option<u32>,
        llm_deadline_secs: Option<u64>,
        inspector_deadline_secs: Option<u64>,
        max_upload_bytes: Option<u64>,
        max_upload_files: Option<usize>,
        allowed_extensions: Option<Vec<String>>,
        staging_root: Option<PathBuf>,
    }

    let overrides: Overrides = toml::from_str(content)?;
    Ok(OrchestratorConfig {
        max_retries: overrides.max_retries.unwrap_or(base.max_retries),
        llm_deadline_secs: overrides.llm_deadline_secs.unwrap_or(base.llm_deadline_secs),
        inspector_deadline_secs: overrides.inspector_deadline_secs.unwrap_or(base.inspector_deadline_secs),
        max_upload_bytes: overrides.max_upload_bytes.unwrap_or(base.max_upload_bytes),
        max_upload_files: overrides.max_upload_files.unwrap_or(base.max_upload_files),
        allowed_extensions: overrides.allowed_extensions.unwrap_or(base.allowed_extensions),
        staging_root: overrides.staging_root.unwrap_or(base.staging_root),
    })
}

fn parse_env<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, ConfigError> {
    raw.parse().map_err(|_| ConfigError::EnvParse {
        key: key.to_string(),
        message: format!("could not parse {raw:?}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        let config = ConfigBuilder::new().build().unwrap();
        assert_eq!(config.max_retries, crate::state::MAX_RETRIES);
        assert!(config.allowed_extensions.contains(&"bin".to_string()));
    }

    #[test]
    fn file_overrides_only_named_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("orchestrator.toml");
        std::fs::write(&path, "max_retries = 3\n").unwrap();
        let config = ConfigBuilder::new().with_file(&path).unwrap().build().unwrap();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.max_upload_files, OrchestratorConfig::default().max_upload_files);
    }

    #[test]
    fn zero_max_retries_fails_validation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("orchestrator.toml");
        std::fs::write(&path, "max_retries = 0\n").unwrap();
        let result = ConfigBuilder::new().with_file(&path).unwrap().build();
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn primary_data_extension_matches_spec_set() {
        assert!(OrchestratorConfig::is_primary_data_extension("bin"));
        assert!(OrchestratorConfig::is_primary_data_extension("continuous"));
        assert!(!OrchestratorConfig::is_primary_data_extension("meta"));
    }
}
