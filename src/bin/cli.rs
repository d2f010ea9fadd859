//! devart CLI
//!
//! Monitors run until interrupted; downloaders run once and stay silent on success.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use devart_sync::{
    config::{self, load_all},
    error::Result,
    models::{Config, MonitorConfig},
    pipeline::{
        self, CommandNotifier, Dispatcher, MessageChecker, NotesOptions, PollCycle, Schedule,
        SentNotesChecker,
    },
    services::DevArtClient,
    storage::{GalleryRepository, LocalStorage, NotesRepository, connect},
};

/// devart - deviantART account monitors and downloaders
#[derive(Parser, Debug)]
#[command(
    name = "devart",
    version,
    about = "Watches a deviantART account and mirrors its deviations and notes"
)]
struct Cli {
    /// Directory holding config.toml and credentials.toml
    #[arg(short, long)]
    config_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Notify about new comments, replies, unread notes and watched deviations
    Check {
        /// Run a single cycle and exit
        #[arg(long)]
        once: bool,
    },

    /// Notify when sent notes get read
    SentNotes {
        /// Run a single cycle and exit
        #[arg(long)]
        once: bool,
    },

    /// Mirror the gallery into the deviations database
    Deviations,

    /// Mirror note folders and notes into the notes database
    Notes {
        /// Audit every folder's full note list
        #[arg(short, long)]
        fsck: bool,
    },

    /// Validate configuration files
    Validate,
}

impl Command {
    /// Commands whose progress is worth seeing by default.
    fn is_chatty(&self) -> bool {
        matches!(
            self,
            Command::Check { .. } | Command::SentNotes { .. } | Command::Validate
        )
    }
}

/// Initialize logging; `RUST_LOG` takes precedence.
fn init_logging(verbose: bool, chatty: bool) {
    let level = match (verbose, chatty) {
        (true, _) => "debug",
        (false, true) => "info",
        (false, false) => "warn",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

fn dispatcher(monitor: &MonitorConfig, section: &str, name: &str) -> Result<Dispatcher> {
    let notifier = CommandNotifier::new(monitor.require_command(section)?.to_vec())?;
    let mut dispatcher = Dispatcher::new(Box::new(notifier), monitor.whitelist.clone(), name);
    if !monitor.failure_command.is_empty() {
        let failure = CommandNotifier::new(monitor.failure_command.clone())?;
        dispatcher = dispatcher.with_failure_notifier(Box::new(failure));
    }
    Ok(dispatcher)
}

fn schedule(monitor: &MonitorConfig, once: bool) -> Schedule {
    Schedule {
        interval: monitor.poll_interval(),
        once,
        parse_failure_limit: monitor.parse_failure_limit,
    }
}

async fn monitor<C: PollCycle>(mut cycle: C, schedule: Schedule) -> Result<()> {
    log::info!(
        "{} monitor started, polling every {}s",
        cycle.name(),
        schedule.interval.as_secs()
    );
    pipeline::run_monitor(&mut cycle, &schedule).await
}

/// Configuration plus a client for the configured account.
fn session(config_dir: &Path) -> Result<(Config, DevArtClient)> {
    let (config, credentials) = load_all(config_dir)?;
    let client = DevArtClient::new(&config.client, credentials)?;
    Ok((config, client))
}

async fn run(command: Command, config_dir: &Path) -> Result<()> {
    match command {
        Command::Check { once } => {
            let (config, client) = session(config_dir)?;
            let dispatcher = dispatcher(&config.check, "check", "check")?;
            let store = LocalStorage::new(config.state.resolve_directory()?, "check");
            let _lock = store.lock()?;
            let checker = MessageChecker::new(client, store, dispatcher);
            monitor(checker, schedule(&config.check, once)).await
        }

        Command::SentNotes { once } => {
            let (config, client) = session(config_dir)?;
            let dispatcher = dispatcher(&config.sent_notes, "sent_notes", "sent-notes")?;
            let store = LocalStorage::new(config.state.resolve_directory()?, "sent-notes");
            let _lock = store.lock()?;
            let checker = SentNotesChecker::new(client, store, dispatcher);
            monitor(checker, schedule(&config.sent_notes, once)).await
        }

        Command::Deviations => {
            let (config, mut client) = session(config_dir)?;
            let pool = connect(&config.deviations.resolved_database_path()).await?;
            let repository = GalleryRepository::new(pool.clone());
            let result = pipeline::run_deviations(&mut client, &repository).await;
            pool.close().await;
            result.map(|summary| log::debug!("{:?}", summary))
        }

        Command::Notes { fsck } => {
            let (config, mut client) = session(config_dir)?;
            let pool = connect(&config.notes.resolved_database_path()).await?;
            let repository = NotesRepository::new(pool.clone());
            let options = NotesOptions {
                fsck,
                ignored_folders: config.notes.ignored_folders.clone(),
            };
            let result = pipeline::run_notes(&mut client, &repository, &options).await;
            pool.close().await;
            result.map(|summary| log::debug!("{:?}", summary))
        }

        Command::Validate => {
            let report = pipeline::run_validate(config_dir).await?;
            if !report.warnings.is_empty() {
                log::warn!("{} warning(s)", report.warnings.len());
            }
            Ok(())
        }
    }
}

/// Main entry point for the CLI application.
#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.command.is_chatty());

    let config_dir = match config::resolve_config_dir(cli.config_dir.as_deref()) {
        Ok(dir) => dir,
        Err(e) => {
            log::error!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    log::debug!("Using configuration from {}", config_dir.display());

    match run(cli.command, &config_dir).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
