use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::errors::RegistrationError;
use crate::faces::extractor::{FacePipeline, FeatureExtractor, ImageDecoder};
use crate::faces::settings::RegistrySettings;
use crate::faces::store::{with_store_timeout, SignatureStore};

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RegisteredIdentity {
    pub identity_id: String,
    pub signature_len: usize,
    pub registered_at: DateTime<Utc>,
}

/// Enrolls identities from images that contain exactly one face.
pub struct RegistrationService<S: ?Sized, E: ?Sized, D: ?Sized> {
    store: Arc<S>,
    faces: FacePipeline<E, D>,
    settings: RegistrySettings,
}

impl<S, E, D> RegistrationService<S, E, D>
where
    S: SignatureStore + ?Sized,
    E: FeatureExtractor + ?Sized + 'static,
    D: ImageDecoder + ?Sized + 'static,
{
    pub fn new(store: Arc<S>, faces: FacePipeline<E, D>, settings: RegistrySettings) -> Self {
        Self {
            store,
            faces,
            settings,
        }
    }

    /// Stores the single face in `image` under `identity_id`, replacing any earlier signature.
    ///
    /// Zero or several faces are always rejected and leave the store untouched.
    pub async fn register(
        &self,
        identity_id: &str,
        image: &[u8],
    ) -> Result<RegisteredIdentity, RegistrationError> {
        validate_identity_id(identity_id)?;
        if image.is_empty() {
            return Err(RegistrationError::BadInput("image payload is empty".into()));
        }

        let faces = self
            .faces
            .detect(image)
            .await
            .map_err(RegistrationError::BadImage)?;

        let face = match faces.as_slice() {
            [face] => face,
            [] => {
                warn!(identity = %identity_id, "registration rejected: no face found");
                return Err(RegistrationError::NoFaceFound);
            }
            many => {
                warn!(
                    identity = %identity_id,
                    count = many.len(),
                    "registration rejected: multiple faces found"
                );
                return Err(RegistrationError::MultipleFacesFound { count: many.len() });
            }
        };

        self.ensure_signature(&face.signature)?;

        let record = with_store_timeout(
            self.settings.store_timeout,
            self.store.put(identity_id, &face.signature),
        )
        .await
        .map_err(RegistrationError::StoreUnavailable)?;

        info!(
            identity = %record.identity_id,
            signature_len = record.signature.len(),
            "registered face signature"
        );

        Ok(RegisteredIdentity {
            identity_id: record.identity_id,
            signature_len: record.signature.len(),
            registered_at: record.registered_at,
        })
    }

    /// Removes every trace of `identity_id`. Returns whether it was registered.
    pub async fn unregister(&self, identity_id: &str) -> Result<bool, RegistrationError> {
        unregister_identity(self.store.as_ref(), identity_id, self.settings.store_timeout).await
    }

    fn ensure_signature(&self, signature: &[f64]) -> Result<(), RegistrationError> {
        let expected = self.settings.signature_dim;
        let message = if signature.len() != expected {
            format!(
                "extractor produced a signature of length {} (expected {expected})",
                signature.len()
            )
        } else if signature.iter().any(|value| !value.is_finite()) {
            "extractor produced a non-finite signature value".to_string()
        } else {
            return Ok(());
        };

        error!(%message, "signature invariant violated");
        Err(RegistrationError::Internal(message))
    }
}

/// Deletes the record for `identity_id`; no extractor is involved.
pub async fn unregister_identity<S>(
    store: &S,
    identity_id: &str,
    timeout: Duration,
) -> Result<bool, RegistrationError>
where
    S: SignatureStore + ?Sized,
{
    validate_identity_id(identity_id)?;
    let removed = with_store_timeout(timeout, store.delete(identity_id))
        .await
        .map_err(RegistrationError::StoreUnavailable)?;
    if removed {
        info!(identity = %identity_id, "removed face signature");
    }
    Ok(removed)
}

/// Longest accepted identity id in bytes; every store backend can key on ids up to this size.
pub const MAX_IDENTITY_ID_BYTES: usize = 128;

pub fn validate_identity_id(identity_id: &str) -> Result<(), RegistrationError> {
    if identity_id.trim().is_empty() {
        return Err(RegistrationError::BadInput(
            "identity id cannot be empty".into(),
        ));
    }
    if identity_id.len() > MAX_IDENTITY_ID_BYTES {
        return Err(RegistrationError::BadInput(format!(
            "identity id is {} bytes long (at most {MAX_IDENTITY_ID_BYTES} allowed)",
            identity_id.len()
        )));
    }
    Ok(())
}
