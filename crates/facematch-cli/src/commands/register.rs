use std::any::Any;
use std::process::ExitCode;
use std::sync::Arc;

use async_trait::async_trait;
use facematch_core::faces::RegisteredIdentity;

use crate::cli::{ImageArgs, OutputMode, RegisterArgs};
use crate::commands::{BackendOpener, CommandHandler};
use crate::errors::AppResult;
use crate::input;
use crate::output::render_register;
use crate::registry::{self, OpenOptions, RegistryBackend};

pub struct RegisterHandler {
    args: RegisterArgs,
    open: Box<BackendOpener>,
    read_image: Box<dyn Fn(&ImageArgs) -> AppResult<Vec<u8>> + Send + Sync>,
    render: Box<dyn Fn(&RegisteredIdentity, OutputMode) -> AppResult<()> + Send + Sync>,
}

impl RegisterHandler {
    pub fn new(args: RegisterArgs) -> Self {
        Self::with_dependencies(args, registry::open_local, input::read_image, render_register)
    }

    pub fn with_dependencies(
        args: RegisterArgs,
        open: impl Fn(&OpenOptions) -> AppResult<Arc<dyn RegistryBackend>> + Send + Sync + 'static,
        read_image: impl Fn(&ImageArgs) -> AppResult<Vec<u8>> + Send + Sync + 'static,
        render: impl Fn(&RegisteredIdentity, OutputMode) -> AppResult<()> + Send + Sync + 'static,
    ) -> Self {
        Self {
            args,
            open: Box::new(open),
            read_image: Box::new(read_image),
            render: Box::new(render),
        }
    }
}

#[async_trait]
impl CommandHandler for RegisterHandler {
    async fn execute(&self, mode: OutputMode, _verbose: bool) -> AppResult<ExitCode> {
        let image = (self.read_image)(&self.args.image)?;
        let backend = (self.open)(&OpenOptions {
            store_dir: self.args.store.store_dir.clone(),
            tolerance: None,
            needs_extractor: true,
        })?;
        let outcome = backend.register(&self.args.identity, &image).await?;
        (self.render)(&outcome, mode)?;
        Ok(ExitCode::SUCCESS)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
