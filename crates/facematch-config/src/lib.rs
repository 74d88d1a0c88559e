use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

pub use facematch_core::faces::{DEFAULT_SIGNATURE_DIM, DEFAULT_STORE_TIMEOUT, DEFAULT_TOLERANCE};

pub const PRIMARY_CONFIG_PATH: &str = "/etc/facematch/config.toml";
pub const SECONDARY_CONFIG_PATH: &str = "/usr/local/etc/facematch/config.toml";
pub const DEFAULT_JITTERS: u32 = 1;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyStoreSetting {
    #[default]
    Reject,
    Unmatched,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionModelSetting {
    #[default]
    Hog,
    Cnn,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub tolerance: Option<f64>,
    pub signature_dim: Option<usize>,
    pub store_dir: Option<PathBuf>,
    pub store_timeout_millis: Option<u64>,
    pub empty_store_policy: Option<EmptyStoreSetting>,
    pub detection_model: Option<DetectionModelSetting>,
    pub jitters: Option<u32>,
    pub landmark_model: Option<PathBuf>,
    pub encoder_model: Option<PathBuf>,
    pub cnn_model: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConfig {
    pub tolerance: f64,
    pub signature_dim: usize,
    /// `None` defers to the store's own resolution (environment, then system default).
    pub store_dir: Option<PathBuf>,
    pub store_timeout: Duration,
    pub empty_store_policy: EmptyStoreSetting,
    pub detection_model: DetectionModelSetting,
    pub jitters: u32,
    pub landmark_model: Option<PathBuf>,
    pub encoder_model: Option<PathBuf>,
    pub cnn_model: Option<PathBuf>,
}

impl ResolvedConfig {
    pub fn from_raw(raw: ConfigFile) -> Self {
        Self {
            tolerance: raw.tolerance.unwrap_or(DEFAULT_TOLERANCE),
            signature_dim: raw.signature_dim.unwrap_or(DEFAULT_SIGNATURE_DIM),
            store_dir: raw.store_dir,
            store_timeout: raw
                .store_timeout_millis
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_STORE_TIMEOUT),
            empty_store_policy: raw.empty_store_policy.unwrap_or_default(),
            detection_model: raw.detection_model.unwrap_or_default(),
            jitters: raw.jitters.unwrap_or(DEFAULT_JITTERS),
            landmark_model: raw.landmark_model,
            encoder_model: raw.encoder_model,
            cnn_model: raw.cnn_model,
        }
    }

    fn validate(&self, path: &Path) -> Result<(), ConfigError> {
        if !self.tolerance.is_finite() || self.tolerance <= 0.0 {
            return Err(ConfigError::Invalid {
                path: path.to_path_buf(),
                message: format!("tolerance must be a positive number, found {}", self.tolerance),
            });
        }
        if self.signature_dim == 0 {
            return Err(ConfigError::Invalid {
                path: path.to_path_buf(),
                message: "signature_dim must be greater than zero".into(),
            });
        }
        if self.store_timeout.is_zero() {
            return Err(ConfigError::Invalid {
                path: path.to_path_buf(),
                message: "store_timeout_millis must be greater than zero".into(),
            });
        }
        Ok(())
    }
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self::from_raw(ConfigFile::default())
    }
}

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub contents: ConfigFile,
    pub source: PathBuf,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfigWithSource {
    pub resolved: ResolvedConfig,
    pub source: Option<PathBuf>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },
    #[error("invalid configuration in {path}: {message}")]
    Invalid { path: PathBuf, message: String },
}

fn default_sources() -> [PathBuf; 2] {
    [
        PathBuf::from(PRIMARY_CONFIG_PATH),
        PathBuf::from(SECONDARY_CONFIG_PATH),
    ]
}

pub fn load_config() -> Result<Option<LoadedConfig>, ConfigError> {
    load_from_paths(&default_sources())
}

pub fn load_resolved_config() -> Result<ResolvedConfigWithSource, ConfigError> {
    load_resolved_from_paths(&default_sources())
}

/// First existing file wins; missing files are skipped.
pub fn load_from_paths(paths: &[PathBuf]) -> Result<Option<LoadedConfig>, ConfigError> {
    for path in paths {
        match fs::read_to_string(path) {
            Ok(contents) => {
                let parsed =
                    toml::from_str::<ConfigFile>(&contents).map_err(|err| ConfigError::Parse {
                        path: path.clone(),
                        message: err.to_string(),
                    })?;
                return Ok(Some(LoadedConfig {
                    contents: parsed,
                    source: path.clone(),
                }));
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
            Err(err) => {
                return Err(ConfigError::Read {
                    path: path.clone(),
                    source: err,
                })
            }
        }
    }

    Ok(None)
}

pub fn load_resolved_from_paths(
    paths: &[PathBuf],
) -> Result<ResolvedConfigWithSource, ConfigError> {
    match load_from_paths(paths)? {
        Some(entry) => {
            let resolved = ResolvedConfig::from_raw(entry.contents);
            resolved.validate(&entry.source)?;
            Ok(ResolvedConfigWithSource {
                resolved,
                source: Some(entry.source),
            })
        }
        None => Ok(ResolvedConfigWithSource {
            resolved: ResolvedConfig::default(),
            source: None,
        }),
    }
}
