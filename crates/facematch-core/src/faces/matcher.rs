use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error};

use crate::errors::MatchingError;
use crate::faces::extractor::{
    BoundingBox, DetectedFace, FacePipeline, FeatureExtractor, ImageDecoder,
};
use crate::faces::settings::{EmptyStorePolicy, RegistrySettings};
use crate::faces::store::{with_store_timeout, SignatureRecord, SignatureStore};

/// Outcome for one detected face, in detector order.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MatchResult {
    pub region: BoundingBox,
    pub matched_identity_id: Option<String>,
    /// Full-precision distance to the nearest stored signature; `None` when nothing was stored.
    pub distance: Option<f64>,
}

impl MatchResult {
    /// Distance rounded to four decimals for display.
    pub fn display_distance(&self) -> Option<f64> {
        self.distance
            .map(|distance| (distance * 10_000.0).round() / 10_000.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Nearest<'a> {
    pub record: &'a SignatureRecord,
    pub distance: f64,
}

/// L2 norm of the element-wise difference.
pub fn euclidean_distance(lhs: &[f64], rhs: &[f64]) -> f64 {
    lhs.iter()
        .zip(rhs.iter())
        .map(|(l, r)| (l - r) * (l - r))
        .sum::<f64>()
        .sqrt()
}

/// Closest stored record. Equidistant records resolve to the first one in `known`.
pub fn find_nearest<'a>(known: &'a [SignatureRecord], query: &[f64]) -> Option<Nearest<'a>> {
    let mut best: Option<Nearest<'a>> = None;
    for record in known {
        let distance = euclidean_distance(&record.signature, query);
        match best {
            Some(current) if distance >= current.distance => {}
            _ => best = Some(Nearest { record, distance }),
        }
    }
    best
}

/// Scores every face against `known`. Pure; `known` is one snapshot of the store.
pub fn match_signatures(
    faces: &[DetectedFace],
    known: &[SignatureRecord],
    settings: &RegistrySettings,
) -> Result<Vec<MatchResult>, MatchingError> {
    let expected = settings.signature_dim;
    for record in known {
        let problem = if record.signature.len() != expected {
            format!("has length {} (expected {expected})", record.signature.len())
        } else if !is_finite(&record.signature) {
            "contains a non-finite value".to_string()
        } else {
            continue;
        };
        let message = format!("stored signature for '{}' {problem}", record.identity_id);
        error!(%message, "signature store integrity violated");
        return Err(MatchingError::Internal(message));
    }

    if known.is_empty() && settings.empty_store_policy == EmptyStorePolicy::Reject {
        return Err(MatchingError::NoKnownFaces);
    }

    let mut results = Vec::with_capacity(faces.len());
    for (index, face) in faces.iter().enumerate() {
        if face.signature.len() != expected {
            let message = format!(
                "detected face #{index} has a signature of length {} (expected {expected})",
                face.signature.len()
            );
            error!(%message, "signature invariant violated");
            return Err(MatchingError::Internal(message));
        }
        if !is_finite(&face.signature) {
            let message = format!("detected face #{index} has a non-finite signature value");
            error!(%message, "signature invariant violated");
            return Err(MatchingError::Internal(message));
        }

        let nearest = find_nearest(known, &face.signature);
        let matched_identity_id = nearest
            .filter(|nearest| nearest.distance < settings.tolerance)
            .map(|nearest| nearest.record.identity_id.clone());
        let distance = nearest.map(|nearest| nearest.distance);

        debug!(
            face = index,
            identity = ?matched_identity_id,
            ?distance,
            "scored detected face"
        );
        results.push(MatchResult {
            region: face.region.clone(),
            matched_identity_id,
            distance,
        });
    }

    Ok(results)
}

fn is_finite(signature: &[f64]) -> bool {
    signature.iter().all(|value| value.is_finite())
}

/// Identifies every face in a query image against the registered signatures.
pub struct MatchingEngine<S: ?Sized, E: ?Sized, D: ?Sized> {
    store: Arc<S>,
    faces: FacePipeline<E, D>,
    settings: RegistrySettings,
}

impl<S, E, D> MatchingEngine<S, E, D>
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

    /// One result per detected face; the store is read once regardless of face count.
    pub async fn match_image(&self, image: &[u8]) -> Result<Vec<MatchResult>, MatchingError> {
        if image.is_empty() {
            return Err(MatchingError::BadInput("image payload is empty".into()));
        }

        let faces = self
            .faces
            .detect(image)
            .await
            .map_err(MatchingError::BadImage)?;
        if faces.is_empty() {
            debug!("no faces detected in query image");
            return Ok(Vec::new());
        }

        let known = with_store_timeout(self.settings.store_timeout, self.store.list())
            .await
            .map_err(MatchingError::StoreUnavailable)?;
        debug!(
            faces = faces.len(),
            known = known.len(),
            "matching detected faces"
        );

        match_signatures(&faces, &known, &self.settings)
    }
}
