use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use facematch_cli::cli::{
    ImageArgs, ListArgs, MatchArgs, OutputMode, RegisterArgs, RemoveArgs, StoreArgs,
};
use facematch_cli::commands::{
    CommandHandler, ListHandler, MatchHandler, RegisterHandler, RemoveHandler,
};
use facematch_cli::errors::{AppError, AppResult};
use facematch_cli::registry::{OpenOptions, RegistryBackend};
use facematch_core::errors::{MatchingError, RegistrationError, StoreError};
use facematch_core::faces::{BoundingBox, MatchResult, RegisteredIdentity, SignatureRecord};

/// Records calls and replays canned outcomes.
#[derive(Default)]
struct StubBackend {
    calls: Mutex<Vec<String>>,
    fail_register: bool,
    empty_store: bool,
}

#[async_trait]
impl RegistryBackend for StubBackend {
    async fn register(&self, identity_id: &str, image: &[u8]) -> AppResult<RegisteredIdentity> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("register:{identity_id}:{}", image.len()));
        if self.fail_register {
            return Err(RegistrationError::MultipleFacesFound { count: 2 }.into());
        }
        Ok(RegisteredIdentity {
            identity_id: identity_id.into(),
            signature_len: 128,
            registered_at: Utc::now(),
        })
    }

    async fn match_image(&self, image: &[u8]) -> AppResult<Vec<MatchResult>> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("match:{}", image.len()));
        if self.empty_store {
            return Err(MatchingError::NoKnownFaces.into());
        }
        Ok(vec![MatchResult {
            region: BoundingBox {
                left: 0,
                top: 0,
                right: 8,
                bottom: 8,
            },
            matched_identity_id: Some("alice".into()),
            distance: Some(0.2),
        }])
    }

    async fn list(&self) -> AppResult<Vec<SignatureRecord>> {
        self.calls.lock().unwrap().push("list".into());
        Ok(vec![SignatureRecord::new("alice", &[0.0; 128])])
    }

    async fn remove(&self, identity_id: &str) -> AppResult<bool> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("remove:{identity_id}"));
        Err(StoreError::Backend("disk detached".into()).into())
    }
}

fn opener(
    backend: Arc<StubBackend>,
    seen: Arc<Mutex<Vec<OpenOptions>>>,
) -> impl Fn(&OpenOptions) -> AppResult<Arc<dyn RegistryBackend>> + Send + Sync + 'static {
    move |options| {
        seen.lock().unwrap().push(options.clone());
        Ok(Arc::clone(&backend) as Arc<dyn RegistryBackend>)
    }
}

fn image_args() -> ImageArgs {
    ImageArgs {
        image: PathBuf::from("face.png"),
        base64: false,
    }
}

fn fake_image(_args: &ImageArgs) -> AppResult<Vec<u8>> {
    Ok(vec![0u8; 16])
}

#[tokio::test]
async fn register_handler_registers_and_renders() {
    let backend = Arc::new(StubBackend::default());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let rendered = Arc::new(Mutex::new(Vec::new()));

    let handler = RegisterHandler::with_dependencies(
        RegisterArgs {
            identity: "alice".into(),
            image: image_args(),
            store: StoreArgs {
                store_dir: Some(PathBuf::from("/tmp/faces")),
            },
        },
        opener(Arc::clone(&backend), Arc::clone(&seen)),
        fake_image,
        {
            let rendered = Arc::clone(&rendered);
            move |outcome, _mode| {
                rendered.lock().unwrap().push(outcome.identity_id.clone());
                Ok(())
            }
        },
    );

    let code = handler.execute(OutputMode::Json, false).await.unwrap();
    assert_eq!(code, ExitCode::SUCCESS);
    assert_eq!(*rendered.lock().unwrap(), vec!["alice".to_string()]);
    assert_eq!(*backend.calls.lock().unwrap(), vec!["register:alice:16"]);

    let options = seen.lock().unwrap();
    assert_eq!(options.len(), 1);
    assert!(options[0].needs_extractor);
    assert_eq!(options[0].store_dir, Some(PathBuf::from("/tmp/faces")));
}

#[tokio::test]
async fn register_handler_surfaces_rejections_without_rendering() {
    let backend = Arc::new(StubBackend {
        fail_register: true,
        ..StubBackend::default()
    });
    let handler = RegisterHandler::with_dependencies(
        RegisterArgs {
            identity: "alice".into(),
            image: image_args(),
            store: StoreArgs::default(),
        },
        opener(backend, Arc::new(Mutex::new(Vec::new()))),
        fake_image,
        |_outcome, _mode| panic!("render should not run"),
    );

    let err = handler.execute(OutputMode::Human, false).await.unwrap_err();
    assert!(matches!(
        err,
        AppError::Registration(RegistrationError::MultipleFacesFound { count: 2 })
    ));
    assert_eq!(err.exit_code(), ExitCode::from(3));
}

#[tokio::test]
async fn unreadable_image_fails_before_the_registry_is_opened() {
    let handler = RegisterHandler::with_dependencies(
        RegisterArgs {
            identity: "alice".into(),
            image: ImageArgs {
                image: PathBuf::from("/nonexistent/facematch/face.png"),
                base64: false,
            },
            store: StoreArgs::default(),
        },
        |_options: &OpenOptions| -> AppResult<Arc<dyn RegistryBackend>> {
            panic!("registry should not be opened")
        },
        facematch_cli::input::read_image,
        |_outcome, _mode| panic!("render should not run"),
    );

    let err = handler.execute(OutputMode::Human, false).await.unwrap_err();
    assert!(matches!(err, AppError::InputRead { .. }));
    assert_eq!(err.exit_code(), ExitCode::from(2));
}

#[tokio::test]
async fn match_handler_passes_tolerance_and_renders_results() {
    let backend = Arc::new(StubBackend::default());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let rendered = Arc::new(Mutex::new(0usize));

    let handler = MatchHandler::with_dependencies(
        MatchArgs {
            image: image_args(),
            tolerance: Some(0.4),
            store: StoreArgs::default(),
        },
        opener(Arc::clone(&backend), Arc::clone(&seen)),
        fake_image,
        {
            let rendered = Arc::clone(&rendered);
            move |results, _mode| {
                assert_eq!(results[0].matched_identity_id.as_deref(), Some("alice"));
                *rendered.lock().unwrap() += results.len();
                Ok(())
            }
        },
    );

    let code = handler.execute(OutputMode::Json, true).await.unwrap();
    assert_eq!(code, ExitCode::SUCCESS);
    assert_eq!(*rendered.lock().unwrap(), 1);
    assert_eq!(seen.lock().unwrap()[0].tolerance, Some(0.4));
}

#[tokio::test]
async fn match_handler_renders_the_same_results_at_any_verbosity() {
    let backend = Arc::new(StubBackend::default());
    let rendered = Arc::new(Mutex::new(Vec::new()));
    let handler = MatchHandler::with_dependencies(
        MatchArgs {
            image: image_args(),
            tolerance: None,
            store: StoreArgs::default(),
        },
        opener(Arc::clone(&backend), Arc::new(Mutex::new(Vec::new()))),
        fake_image,
        {
            let rendered = Arc::clone(&rendered);
            move |results: &[MatchResult], _mode| {
                rendered.lock().unwrap().push(results.to_vec());
                Ok(())
            }
        },
    );

    let quiet = handler.execute(OutputMode::Human, false).await.unwrap();
    let verbose = handler.execute(OutputMode::Human, true).await.unwrap();
    assert_eq!(quiet, verbose);

    let rendered = rendered.lock().unwrap();
    assert_eq!(rendered.len(), 2);
    assert_eq!(rendered[0], rendered[1]);
    assert_eq!(*backend.calls.lock().unwrap(), vec!["match:16", "match:16"]);
}

#[tokio::test]
async fn match_handler_reports_empty_registry() {
    let backend = Arc::new(StubBackend {
        empty_store: true,
        ..StubBackend::default()
    });
    let handler = MatchHandler::with_dependencies(
        MatchArgs {
            image: image_args(),
            tolerance: None,
            store: StoreArgs::default(),
        },
        opener(backend, Arc::new(Mutex::new(Vec::new()))),
        fake_image,
        |_results, _mode| panic!("render should not run"),
    );

    let err = handler.execute(OutputMode::Json, false).await.unwrap_err();
    assert_eq!(err.kind().as_str(), "no_known_faces");
    assert_eq!(err.exit_code(), ExitCode::from(3));
}

#[tokio::test]
async fn list_handler_opens_without_extractor() {
    let backend = Arc::new(StubBackend::default());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let handler = ListHandler::with_dependencies(
        ListArgs::default(),
        opener(Arc::clone(&backend), Arc::clone(&seen)),
        |records, _mode| {
            assert_eq!(records.len(), 1);
            assert_eq!(records[0].identity_id, "alice");
            Ok(())
        },
    );

    let code = handler.execute(OutputMode::Human, false).await.unwrap();
    assert_eq!(code, ExitCode::SUCCESS);
    assert!(!seen.lock().unwrap()[0].needs_extractor);
    assert_eq!(*backend.calls.lock().unwrap(), vec!["list"]);
}

#[tokio::test]
async fn remove_handler_maps_store_failures_to_exit_four() {
    let backend = Arc::new(StubBackend::default());
    let handler = RemoveHandler::with_dependencies(
        RemoveArgs {
            identity: "alice".into(),
            store: StoreArgs::default(),
        },
        opener(Arc::clone(&backend), Arc::new(Mutex::new(Vec::new()))),
        |_identity, _removed, _mode| panic!("render should not run"),
    );

    let err = handler.execute(OutputMode::Human, false).await.unwrap_err();
    assert!(matches!(err, AppError::Store(_)));
    assert_eq!(err.exit_code(), ExitCode::from(4));
    assert_eq!(*backend.calls.lock().unwrap(), vec!["remove:alice"]);
}
