pub mod extractor;
pub mod matcher;
pub mod registration;
pub mod settings;
pub mod store;

pub use extractor::{
    decode_base64_image, BoundingBox, DetectedFace, DetectionModel, EnvModelPathResolver,
    FaceModelPaths, FacePipeline, FeatureExtractor, ImageDecoder, ModelPathResolver,
    ResolvedModelPaths, RgbImageDecoder,
};

#[cfg(feature = "dlib")]
pub use extractor::DlibExtractor;

pub use matcher::{
    euclidean_distance, find_nearest, match_signatures, MatchResult, MatchingEngine, Nearest,
};

pub use registration::{
    unregister_identity, validate_identity_id, RegisteredIdentity, RegistrationService,
    MAX_IDENTITY_ID_BYTES,
};

pub use settings::{
    EmptyStorePolicy, RegistrySettings, DEFAULT_SIGNATURE_DIM, DEFAULT_STORE_TIMEOUT,
    DEFAULT_TOLERANCE,
};

pub use store::{
    resolve_store_dir, with_store_timeout, FilesystemSignatureStore, MemorySignatureStore,
    SignatureRecord, SignatureStore, StoreKey,
};
