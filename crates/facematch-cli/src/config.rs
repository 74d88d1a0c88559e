use std::env;
use std::path::PathBuf;

use facematch_config::{DetectionModelSetting, EmptyStoreSetting, ResolvedConfig};
use facematch_core::faces::{
    resolve_store_dir as core_resolve_store_dir, DetectionModel, EmptyStorePolicy, FaceModelPaths,
    RegistrySettings, StoreKey,
};

use crate::errors::{AppError, AppResult};

pub const STORE_KEY_ENV: &str = "FACEMATCH_STORE_KEY";

pub fn registry_settings(config: &ResolvedConfig) -> RegistrySettings {
    RegistrySettings::default()
        .with_tolerance(config.tolerance)
        .with_signature_dim(config.signature_dim)
        .with_store_timeout(config.store_timeout)
        .with_empty_store_policy(match config.empty_store_policy {
            EmptyStoreSetting::Reject => EmptyStorePolicy::Reject,
            EmptyStoreSetting::Unmatched => EmptyStorePolicy::Unmatched,
        })
}

/// Command-line tolerance wins over the configured one.
pub fn apply_tolerance(
    settings: RegistrySettings,
    tolerance: Option<f64>,
) -> AppResult<RegistrySettings> {
    match tolerance {
        None => Ok(settings),
        Some(value) if value.is_finite() && value > 0.0 => Ok(settings.with_tolerance(value)),
        Some(value) => Err(AppError::InvalidTolerance(value)),
    }
}

pub fn detection_model(config: &ResolvedConfig) -> DetectionModel {
    match config.detection_model {
        DetectionModelSetting::Hog => DetectionModel::Hog,
        DetectionModelSetting::Cnn => DetectionModel::Cnn,
    }
}

pub fn model_paths(config: &ResolvedConfig) -> FaceModelPaths {
    FaceModelPaths {
        landmark: config.landmark_model.clone(),
        encoder: config.encoder_model.clone(),
        cnn: config.cnn_model.clone(),
    }
}

/// `--store-dir`, then the config file, then the store's own fallbacks.
pub fn resolve_store_dir(cli_value: Option<PathBuf>, config: &ResolvedConfig) -> PathBuf {
    let preferred = cli_value.or_else(|| config.store_dir.clone());
    core_resolve_store_dir(preferred.as_deref())
}

pub fn store_key_from_env() -> AppResult<Option<StoreKey>> {
    parse_store_key(env::var(STORE_KEY_ENV).ok())
}

fn parse_store_key(value: Option<String>) -> AppResult<Option<StoreKey>> {
    match value.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(encoded) => StoreKey::from_base64(encoded)
            .map(Some)
            .map_err(|err| AppError::InvalidStoreKey {
                env: STORE_KEY_ENV,
                message: err.to_string(),
            }),
    }
}
