use std::any::Any;
use std::process::ExitCode;
use std::sync::Arc;

use async_trait::async_trait;
use facematch_core::faces::SignatureRecord;

use crate::cli::{ListArgs, OutputMode};
use crate::commands::{BackendOpener, CommandHandler};
use crate::errors::AppResult;
use crate::output::render_list;
use crate::registry::{self, OpenOptions, RegistryBackend};

pub struct ListHandler {
    args: ListArgs,
    open: Box<BackendOpener>,
    render: Box<dyn Fn(&[SignatureRecord], OutputMode) -> AppResult<()> + Send + Sync>,
}

impl ListHandler {
    pub fn new(args: ListArgs) -> Self {
        Self::with_dependencies(args, registry::open_local, render_list)
    }

    pub fn with_dependencies(
        args: ListArgs,
        open: impl Fn(&OpenOptions) -> AppResult<Arc<dyn RegistryBackend>> + Send + Sync + 'static,
        render: impl Fn(&[SignatureRecord], OutputMode) -> AppResult<()> + Send + Sync + 'static,
    ) -> Self {
        Self {
            args,
            open: Box::new(open),
            render: Box::new(render),
        }
    }
}

#[async_trait]
impl CommandHandler for ListHandler {
    async fn execute(&self, mode: OutputMode, _verbose: bool) -> AppResult<ExitCode> {
        let backend = (self.open)(&OpenOptions {
            store_dir: self.args.store.store_dir.clone(),
            ..OpenOptions::default()
        })?;
        let records = backend.list().await?;
        (self.render)(&records, mode)?;
        Ok(ExitCode::SUCCESS)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
