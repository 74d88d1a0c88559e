use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use facematch_config::ResolvedConfig;
use facematch_core::faces::{
    unregister_identity, with_store_timeout, FacePipeline, FeatureExtractor,
    FilesystemSignatureStore, MatchResult, MatchingEngine, RegisteredIdentity,
    RegistrationService, RegistrySettings, RgbImageDecoder, SignatureRecord, SignatureStore,
};
use tracing::{debug, info};

use crate::config;
use crate::errors::{AppError, AppResult};

/// What a command needs opened before it can run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OpenOptions {
    pub store_dir: Option<PathBuf>,
    pub tolerance: Option<f64>,
    pub needs_extractor: bool,
}

/// Registry operations the commands are written against.
#[async_trait]
pub trait RegistryBackend: Send + Sync {
    async fn register(&self, identity_id: &str, image: &[u8]) -> AppResult<RegisteredIdentity>;
    async fn match_image(&self, image: &[u8]) -> AppResult<Vec<MatchResult>>;
    async fn list(&self) -> AppResult<Vec<SignatureRecord>>;
    async fn remove(&self, identity_id: &str) -> AppResult<bool>;
}

pub type DynFacePipeline = FacePipeline<dyn FeatureExtractor, RgbImageDecoder>;

/// Filesystem store plus, when available, the face extraction pipeline.
pub struct LocalRegistry {
    store: Arc<FilesystemSignatureStore>,
    faces: Option<DynFacePipeline>,
    settings: RegistrySettings,
}

impl LocalRegistry {
    pub fn new(
        store: FilesystemSignatureStore,
        faces: Option<DynFacePipeline>,
        settings: RegistrySettings,
    ) -> Self {
        Self {
            store: Arc::new(store),
            faces,
            settings,
        }
    }

    fn pipeline(&self) -> AppResult<DynFacePipeline> {
        self.faces.clone().ok_or_else(|| {
            AppError::ExtractorUnavailable("registry was opened without a face extractor".into())
        })
    }
}

#[async_trait]
impl RegistryBackend for LocalRegistry {
    async fn register(&self, identity_id: &str, image: &[u8]) -> AppResult<RegisteredIdentity> {
        let service = RegistrationService::new(
            Arc::clone(&self.store),
            self.pipeline()?,
            self.settings.clone(),
        );
        Ok(service.register(identity_id, image).await?)
    }

    async fn match_image(&self, image: &[u8]) -> AppResult<Vec<MatchResult>> {
        let engine = MatchingEngine::new(
            Arc::clone(&self.store),
            self.pipeline()?,
            self.settings.clone(),
        );
        Ok(engine.match_image(image).await?)
    }

    async fn list(&self) -> AppResult<Vec<SignatureRecord>> {
        Ok(with_store_timeout(self.settings.store_timeout, self.store.list()).await?)
    }

    async fn remove(&self, identity_id: &str) -> AppResult<bool> {
        Ok(unregister_identity(self.store.as_ref(), identity_id, self.settings.store_timeout).await?)
    }
}

/// Loads configuration and opens the on-disk registry.
pub fn open_local(options: &OpenOptions) -> AppResult<Arc<dyn RegistryBackend>> {
    let loaded = facematch_config::load_resolved_config()?;
    match &loaded.source {
        Some(path) => debug!(config = %path.display(), "loaded configuration"),
        None => info!("no configuration file found; using built-in defaults"),
    }
    let registry = open_local_with(options, &loaded.resolved, build_extractor)?;
    Ok(Arc::new(registry))
}

pub fn open_local_with<F>(
    options: &OpenOptions,
    resolved: &ResolvedConfig,
    extractor: F,
) -> AppResult<LocalRegistry>
where
    F: FnOnce(&ResolvedConfig) -> AppResult<Arc<dyn FeatureExtractor>>,
{
    let settings = config::apply_tolerance(config::registry_settings(resolved), options.tolerance)?;
    let dir = config::resolve_store_dir(options.store_dir.clone(), resolved);
    debug!(store = %dir.display(), "opening signature store");

    let mut store = FilesystemSignatureStore::new(dir);
    if let Some(key) = config::store_key_from_env()? {
        store = store.with_key(key);
    }

    let faces = if options.needs_extractor {
        Some(FacePipeline::new(extractor(resolved)?, Arc::new(RgbImageDecoder)))
    } else {
        None
    };

    Ok(LocalRegistry::new(store, faces, settings))
}

#[cfg(feature = "dlib")]
pub fn build_extractor(resolved: &ResolvedConfig) -> AppResult<Arc<dyn FeatureExtractor>> {
    use facematch_core::faces::{DlibExtractor, EnvModelPathResolver, ModelPathResolver};

    let paths = EnvModelPathResolver
        .resolve(&config::model_paths(resolved), config::detection_model(resolved))?;
    debug!(
        landmark = %paths.landmark.display(),
        encoder = %paths.encoder.display(),
        "loading dlib models"
    );
    Ok(Arc::new(DlibExtractor::new(&paths, resolved.jitters)?))
}

#[cfg(not(feature = "dlib"))]
pub fn build_extractor(_resolved: &ResolvedConfig) -> AppResult<Arc<dyn FeatureExtractor>> {
    Err(AppError::ExtractorUnavailable(
        "facematch was built without the `dlib` feature".into(),
    ))
}
