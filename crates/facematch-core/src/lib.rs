//! Face signature registry and nearest-neighbour identity matching.
//!
//! Registration accepts an image that must contain exactly one face and stores its
//! signature under an externally assigned identity. Matching scores every face found in
//! a query image against all stored signatures and reports the closest identity when it
//! falls under the configured tolerance.

pub mod errors;
pub mod faces;

pub use errors::{
    ErrorKind, ExtractionError, MatchingError, RegistrationError, StoreError, StoreResult,
};
