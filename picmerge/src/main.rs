use std::path::PathBuf;

use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use thiserror::Error;
use tracing::{debug, error};

use picmerge_core::{
    catalog::SortMode,
    error::AppError,
    event::Message,
    session::{Session, Settings},
};

#[derive(Debug, Error)]
pub enum Error {
    #[error("Initialization error")]
    Initialization,
}

#[tokio::main]
async fn main() {
    let logpath = match get_logging_path() {
        Ok(it) => it,
        Err(_) => return,
    };

    let logfile = tracing_appender::rolling::daily(logpath, "log");
    tracing_subscriber::fmt()
        .compact()
        .with_writer(logfile)
        .init();

    debug!("starting application");

    let matches = cli().get_matches();

    let mut settings = Settings::default();
    map_args_to_settings(&matches, &mut settings);

    let root = matches
        .get_one::<PathBuf>("root")
        .cloned()
        .expect("root argument is required");

    let merge_names: Vec<String> = matches
        .get_many::<String>("merge")
        .map(|names| names.cloned().collect())
        .unwrap_or_default();

    let session = Session::new(settings);
    match drive(session, root, merge_names).await {
        Ok(()) => {
            debug!("closing application");
        }
        Err(err) => {
            error!("closing application with error: {:?}", err);
            eprintln!("Error: {}", err);
            std::process::exit(1);
        }
    }
}

fn cli() -> Command {
    Command::new("picmerge")
        .about("picmerge - preview a folder's image subfolders and merge them into one")
        .args([
            // NOTE: arguments
            Arg::new("root")
                .action(ArgAction::Set)
                .required(true)
                .value_parser(value_parser!(PathBuf))
                .help("root folder whose immediate subfolders are listed"),
            // NOTE: options
            Arg::new("merge")
                .long("merge")
                .action(ArgAction::Append)
                .value_name("NAME")
                .help("subfolder name to merge; pass multiple times to merge several"),
            Arg::new("alphabetical")
                .long("alphabetical")
                .action(ArgAction::SetTrue)
                .default_value("false")
                .help("sort subfolders alphabetically instead of naturally"),
            Arg::new("keep-empty-sources")
                .long("keep-empty-sources")
                .action(ArgAction::SetTrue)
                .default_value("false")
                .help("keep emptied source folders behind after a merge"),
        ])
}

fn map_args_to_settings(args: &ArgMatches, settings: &mut Settings) {
    if args.get_flag("alphabetical") {
        settings.sort = SortMode::Alphabetical;
    }

    if args.get_flag("keep-empty-sources") {
        settings.delete_empty_sources = false;
    }
}

async fn drive(
    mut session: Session,
    root: PathBuf,
    merge_names: Vec<String>,
) -> Result<(), AppError> {
    session.select_root(root).await?;

    let mut pending_merge = !merge_names.is_empty();
    while let Some(envelope) = session.next_envelope().await {
        for message in session.handle(envelope).await {
            print_message(&message);
        }

        if !session.is_idle() {
            continue;
        }

        if pending_merge {
            pending_merge = false;
            for name in &merge_names {
                if !session.catalog.set_checked_by_name(name, true) {
                    eprintln!("No subfolder named '{}' found.", name);
                }
            }

            session.merge_checked().await?;
            continue;
        }

        break;
    }

    println!();
    for entry in session.catalog.entries() {
        match &entry.preview {
            Some(preview) => println!("{}  (preview: {})", entry.display_name, preview.display()),
            None => println!("{}", entry.display_name),
        }
    }

    session.shutdown().await;

    Ok(())
}

fn print_message(message: &Message) {
    match message {
        Message::Progress(text) => println!("{}", text),
        Message::Error(text) => eprintln!("Error: {}", text),
        Message::ImageBatch(paths) => println!("  ...{} images", paths.len()),
        Message::PreviewFound(folder, image) => {
            debug!("preview for {:?}: {:?}", folder, image);
        }
        Message::SubfoldersFound(paths) => {
            debug!("subfolders listed: {:?}", paths);
        }
        Message::TaskFinished(kind, success) => {
            debug!("task {:?} finished (success: {})", kind, success);
        }
    }
}

fn get_logging_path() -> Result<PathBuf, Error> {
    let cache_dir = match dirs::cache_dir() {
        Some(it) => it,
        None => return Err(Error::Initialization),
    };

    Ok(cache_dir.join("picmerge/logs/"))
}
