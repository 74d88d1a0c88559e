use std::any::Any;
use std::process::ExitCode;
use std::sync::Arc;

use async_trait::async_trait;

use crate::cli::{Commands, OutputMode};
use crate::errors::AppResult;
use crate::registry::{OpenOptions, RegistryBackend};

#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn execute(&self, mode: OutputMode, verbose: bool) -> AppResult<ExitCode>;
    fn as_any(&self) -> &dyn Any;
}

/// Opens the registry a command runs against; swapped out in tests.
pub type BackendOpener =
    dyn Fn(&OpenOptions) -> AppResult<Arc<dyn RegistryBackend>> + Send + Sync;

mod list;
mod matching;
mod register;
mod remove;

pub use list::ListHandler;
pub use matching::MatchHandler;
pub use register::RegisterHandler;
pub use remove::RemoveHandler;

impl From<Commands> for Box<dyn CommandHandler> {
    fn from(command: Commands) -> Self {
        match command {
            Commands::Register(args) => Box::new(RegisterHandler::new(args)),
            Commands::Match(args) => Box::new(MatchHandler::new(args)),
            Commands::List(args) => Box::new(ListHandler::new(args)),
            Commands::Remove(args) => Box::new(RemoveHandler::new(args)),
        }
    }
}
