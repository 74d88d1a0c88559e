use std::path::PathBuf;

use facematch_cli::cli::{
    Commands, ImageArgs, ListArgs, MatchArgs, RegisterArgs, RemoveArgs, StoreArgs,
};
use facematch_cli::commands::{
    CommandHandler, ListHandler, MatchHandler, RegisterHandler, RemoveHandler,
};

fn sample_image_args() -> ImageArgs {
    ImageArgs {
        image: PathBuf::from("face.png"),
        base64: false,
    }
}

fn assert_dispatch<T: 'static>(command: Commands)
where
    T: CommandHandler,
{
    let handler: Box<dyn CommandHandler> = command.into();
    assert!(handler.as_any().is::<T>());
}

#[test]
fn register_command_dispatches_register_handler() {
    assert_dispatch::<RegisterHandler>(Commands::Register(RegisterArgs {
        identity: "alice".into(),
        image: sample_image_args(),
        store: StoreArgs::default(),
    }));
}

#[test]
fn match_command_dispatches_match_handler() {
    assert_dispatch::<MatchHandler>(Commands::Match(MatchArgs {
        image: sample_image_args(),
        tolerance: None,
        store: StoreArgs::default(),
    }));
}

#[test]
fn list_command_dispatches_list_handler() {
    assert_dispatch::<ListHandler>(Commands::List(ListArgs::default()));
}

#[test]
fn remove_command_dispatches_remove_handler() {
    assert_dispatch::<RemoveHandler>(Commands::Remove(RemoveArgs {
        identity: "alice".into(),
        store: StoreArgs::default(),
    }));
}
