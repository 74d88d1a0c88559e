use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use facematch_config::ConfigError;
use facematch_core::errors::{
    ErrorKind, ExtractionError, MatchingError, RegistrationError, StoreError,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Registration(#[from] RegistrationError),
    #[error(transparent)]
    Matching(#[from] MatchingError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
    #[error("failed to read image {path}: {source}")]
    InputRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid store key in ${env}: {message}")]
    InvalidStoreKey { env: &'static str, message: String },
    #[error("invalid tolerance {0}: expected a positive number")]
    InvalidTolerance(f64),
    #[error("face extractor unavailable: {0}")]
    ExtractorUnavailable(String),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AppError {
    /// Registry classification for errors that came out of the core.
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Registration(err) => err.kind(),
            AppError::Matching(err) => err.kind(),
            AppError::Extraction(err) => err.kind(),
            AppError::Store(_) => ErrorKind::StoreUnavailable,
            AppError::InputRead { .. }
            | AppError::InvalidTolerance(_)
            | AppError::InvalidStoreKey { .. } => ErrorKind::BadInput,
            AppError::Config(_)
            | AppError::ExtractorUnavailable(_)
            | AppError::Io(_)
            | AppError::Serialization(_) => ErrorKind::Internal,
        }
    }

    pub fn exit_code(&self) -> ExitCode {
        match self {
            AppError::Config(_) => ExitCode::from(2),
            AppError::ExtractorUnavailable(_) => ExitCode::from(2),
            AppError::Extraction(
                ExtractionError::MissingModel { .. } | ExtractionError::ModelLoad { .. },
            ) => ExitCode::from(2),
            AppError::Io(_) | AppError::Serialization(_) => ExitCode::from(1),
            _ => match self.kind() {
                ErrorKind::BadInput | ErrorKind::DecodeError => ExitCode::from(2),
                ErrorKind::NoFaceFound
                | ErrorKind::MultipleFacesFound
                | ErrorKind::NoKnownFaces => ExitCode::from(3),
                ErrorKind::StoreUnavailable => ExitCode::from(4),
                ErrorKind::Internal => ExitCode::from(1),
            },
        }
    }

    pub fn human_message(&self) -> String {
        self.to_string()
    }
}

pub type AppResult<T> = Result<T, AppError>;
