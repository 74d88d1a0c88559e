use std::any::Any;
use std::process::ExitCode;
use std::sync::Arc;

use async_trait::async_trait;
use facematch_core::faces::MatchResult;
use tracing::debug;

use crate::cli::{ImageArgs, MatchArgs, OutputMode};
use crate::commands::{BackendOpener, CommandHandler};
use crate::errors::AppResult;
use crate::input;
use crate::output::render_match;
use crate::registry::{self, OpenOptions, RegistryBackend};

pub struct MatchHandler {
    args: MatchArgs,
    open: Box<BackendOpener>,
    read_image: Box<dyn Fn(&ImageArgs) -> AppResult<Vec<u8>> + Send + Sync>,
    render: Box<dyn Fn(&[MatchResult], OutputMode) -> AppResult<()> + Send + Sync>,
}

impl MatchHandler {
    pub fn new(args: MatchArgs) -> Self {
        Self::with_dependencies(args, registry::open_local, input::read_image, render_match)
    }

    pub fn with_dependencies(
        args: MatchArgs,
        open: impl Fn(&OpenOptions) -> AppResult<Arc<dyn RegistryBackend>> + Send + Sync + 'static,
        read_image: impl Fn(&ImageArgs) -> AppResult<Vec<u8>> + Send + Sync + 'static,
        render: impl Fn(&[MatchResult], OutputMode) -> AppResult<()> + Send + Sync + 'static,
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
impl CommandHandler for MatchHandler {
    async fn execute(&self, mode: OutputMode, _verbose: bool) -> AppResult<ExitCode> {
        let image = (self.read_image)(&self.args.image)?;
        let backend = (self.open)(&OpenOptions {
            store_dir: self.args.store.store_dir.clone(),
            tolerance: self.args.tolerance,
            needs_extractor: true,
        })?;
        let results = backend.match_image(&image).await?;
        let matched = results
            .iter()
            .filter(|result| result.matched_identity_id.is_some())
            .count();
        debug!(faces = results.len(), matched, "match complete");
        (self.render)(&results, mode)?;
        Ok(ExitCode::SUCCESS)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
