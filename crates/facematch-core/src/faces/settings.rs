use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_TOLERANCE: f64 = 0.6;
pub const DEFAULT_SIGNATURE_DIM: usize = 128;
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(5);

/// What matching does when the store holds no signatures at all.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyStorePolicy {
    /// Fail the whole request with `NoKnownFaces`.
    #[default]
    Reject,
    /// Report every detected face with no identity and no distance.
    Unmatched,
}

/// Knobs shared by registration and matching.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistrySettings {
    /// Maximum Euclidean distance (exclusive) for a match. Smaller is stricter.
    pub tolerance: f64,
    /// Fixed length of every signature produced by the extractor in use.
    pub signature_dim: usize,
    pub empty_store_policy: EmptyStorePolicy,
    /// Upper bound on any single signature store call.
    pub store_timeout: Duration,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_TOLERANCE,
            signature_dim: DEFAULT_SIGNATURE_DIM,
            empty_store_policy: EmptyStorePolicy::default(),
            store_timeout: DEFAULT_STORE_TIMEOUT,
        }
    }
}

impl RegistrySettings {
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_empty_store_policy(mut self, policy: EmptyStorePolicy) -> Self {
        self.empty_store_policy = policy;
        self
    }

    pub fn with_signature_dim(mut self, signature_dim: usize) -> Self {
        self.signature_dim = signature_dim;
        self
    }

    pub fn with_store_timeout(mut self, store_timeout: Duration) -> Self {
        self.store_timeout = store_timeout;
        self
    }
}
