use std::any::Any;
use std::process::ExitCode;
use std::sync::Arc;

use async_trait::async_trait;

use crate::cli::{OutputMode, RemoveArgs};
use crate::commands::{BackendOpener, CommandHandler};
use crate::errors::AppResult;
use crate::output::render_remove;
use crate::registry::{self, OpenOptions, RegistryBackend};

pub struct RemoveHandler {
    args: RemoveArgs,
    open: Box<BackendOpener>,
    render: Box<dyn Fn(&str, bool, OutputMode) -> AppResult<()> + Send + Sync>,
}

impl RemoveHandler {
    pub fn new(args: RemoveArgs) -> Self {
        Self::with_dependencies(args, registry::open_local, render_remove)
    }

    pub fn with_dependencies(
        args: RemoveArgs,
        open: impl Fn(&OpenOptions) -> AppResult<Arc<dyn RegistryBackend>> + Send + Sync + 'static,
        render: impl Fn(&str, bool, OutputMode) -> AppResult<()> + Send + Sync + 'static,
    ) -> Self {
        Self {
            args,
            open: Box::new(open),
            render: Box::new(render),
        }
    }
}

#[async_trait]
impl CommandHandler for RemoveHandler {
    /// Removing an unknown identity still succeeds; the output says nothing was removed.
    async fn execute(&self, mode: OutputMode, _verbose: bool) -> AppResult<ExitCode> {
        let backend = (self.open)(&OpenOptions {
            store_dir: self.args.store.store_dir.clone(),
            ..OpenOptions::default()
        })?;
        let removed = backend.remove(&self.args.identity).await?;
        (self.render)(&self.args.identity, removed, mode)?;
        Ok(ExitCode::SUCCESS)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
