use std::io;
use std::path::PathBuf;
use std::time::Duration;

use image::ImageError;
use serde::Serialize;
use thiserror::Error;

/// Transport-agnostic classification shared by every error the core returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    BadInput,
    DecodeError,
    NoFaceFound,
    MultipleFacesFound,
    NoKnownFaces,
    StoreUnavailable,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::BadInput => "bad_input",
            ErrorKind::DecodeError => "decode_error",
            ErrorKind::NoFaceFound => "no_face_found",
            ErrorKind::MultipleFacesFound => "multiple_faces_found",
            ErrorKind::NoKnownFaces => "no_known_faces",
            ErrorKind::StoreUnavailable => "store_unavailable",
            ErrorKind::Internal => "internal",
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read signature record {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write signature record {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("signature record {path} is invalid: {message}")]
    InvalidRecord { path: PathBuf, message: String },

    #[error("signature record {path} is encrypted and requires a store key")]
    EncryptedRecordRequiresKey { path: PathBuf },

    #[error("signature store encryption error: {0}")]
    Encryption(String),

    #[error("signature store call timed out after {0:?}")]
    Timeout(Duration),

    #[error("signature store call was cancelled")]
    Cancelled,

    #[error("signature store backend failure: {0}")]
    Backend(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("image payload is empty")]
    EmptyImage,

    #[error("image payload is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("failed to decode image: {0}")]
    Decode(#[from] ImageError),

    #[error("missing {kind} model; configure {key} or set ${env}")]
    MissingModel {
        kind: &'static str,
        key: &'static str,
        env: &'static str,
    },

    #[error("failed to load model {path}: {message}")]
    ModelLoad { path: PathBuf, message: String },

    #[error("feature extractor failed: {0}")]
    Backend(String),
}

impl ExtractionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExtractionError::EmptyImage => ErrorKind::BadInput,
            ExtractionError::Base64(_) | ExtractionError::Decode(_) => ErrorKind::DecodeError,
            ExtractionError::MissingModel { .. }
            | ExtractionError::ModelLoad { .. }
            | ExtractionError::Backend(_) => ErrorKind::Internal,
        }
    }
}

#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("invalid registration request: {0}")]
    BadInput(String),

    #[error("bad image data: {0}")]
    BadImage(#[source] ExtractionError),

    #[error("expected exactly one face, found 0")]
    NoFaceFound,

    #[error("expected exactly one face, found {count}")]
    MultipleFacesFound { count: usize },

    #[error("signature store unavailable: {0}")]
    StoreUnavailable(#[source] StoreError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl RegistrationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RegistrationError::BadInput(_) => ErrorKind::BadInput,
            RegistrationError::BadImage(source) => source.kind(),
            RegistrationError::NoFaceFound => ErrorKind::NoFaceFound,
            RegistrationError::MultipleFacesFound { .. } => ErrorKind::MultipleFacesFound,
            RegistrationError::StoreUnavailable(_) => ErrorKind::StoreUnavailable,
            RegistrationError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Only store failures are worth retrying; everything else fails the same way again.
    /// A timed-out write may still have committed, which a retry simply overwrites.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RegistrationError::StoreUnavailable(_))
    }
}

#[derive(Debug, Error)]
pub enum MatchingError {
    #[error("invalid match request: {0}")]
    BadInput(String),

    #[error("bad image data: {0}")]
    BadImage(#[source] ExtractionError),

    #[error("no known faces found; register faces first")]
    NoKnownFaces,

    #[error("signature store unavailable: {0}")]
    StoreUnavailable(#[source] StoreError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl MatchingError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            MatchingError::BadInput(_) => ErrorKind::BadInput,
            MatchingError::BadImage(source) => source.kind(),
            MatchingError::NoKnownFaces => ErrorKind::NoKnownFaces,
            MatchingError::StoreUnavailable(_) => ErrorKind::StoreUnavailable,
            MatchingError::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, MatchingError::StoreUnavailable(_))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bad_image_kind_follows_the_extraction_cause() {
        let decode = RegistrationError::BadImage(ExtractionError::Decode(ImageError::IoError(
            io::Error::new(io::ErrorKind::InvalidData, "truncated"),
        )));
        assert_eq!(decode.kind(), ErrorKind::DecodeError);

        let empty = MatchingError::BadImage(ExtractionError::EmptyImage);
        assert_eq!(empty.kind(), ErrorKind::BadInput);

        let backend = MatchingError::BadImage(ExtractionError::Backend("model crashed".into()));
        assert_eq!(backend.kind(), ErrorKind::Internal);
    }

    #[test]
    fn only_store_failures_are_retryable() {
        let store = RegistrationError::StoreUnavailable(StoreError::Timeout(Duration::from_secs(1)));
        assert!(store.is_retryable());
        assert!(!RegistrationError::NoFaceFound.is_retryable());
        assert!(!MatchingError::NoKnownFaces.is_retryable());
    }
}
