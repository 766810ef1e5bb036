use anyhow::{bail, Context, Result};
use clap::Parser;
use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::fmt;

use ip_tracker::cli::{Args, Command};
use ip_tracker::config::{Settings, SettingsFile};
use ip_tracker::dao::HistoryStore;
use ip_tracker::model::LookupStatus;
use ip_tracker::service::{GeoService, Session};
use ip_tracker::terminal::{self, ConsolePresenter, HISTORY_PREVIEW_ROWS};

fn main() -> Result<()> {
    let args = Args::parse();
    let settings_file = args.load_settings_file()?;
    let settings = args.merge_with_config(settings_file.settings());

    init_logging(&settings.log_path(), args.verbose);

    if let Err(e) = run(&args, settings_file, settings) {
        error!("{:#}", e);
        return Err(e);
    }
    Ok(())
}

fn open_log_file(path: &Path) -> std::io::Result<File> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    OpenOptions::new().create(true).append(true).open(path)
}

/// Warnings and errors go to stderr (everything with --verbose); the log
/// file keeps the lookup audit trail at INFO.
fn init_logging(log_path: &Path, verbose: bool) {
    let console_level = if verbose { LevelFilter::DEBUG } else { LevelFilter::WARN };
    let file_level = if verbose { LevelFilter::DEBUG } else { LevelFilter::INFO };

    let console_layer = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(console_level);

    let (file_layer, file_error) = match open_log_file(log_path) {
        Ok(file) => {
            let layer = fmt::layer()
                .with_ansi(false)
                .with_target(false)
                .with_writer(Mutex::new(file))
                .with_filter(file_level);
            (Some(layer), None)
        }
        Err(e) => (None, Some(e)),
    };

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .init();

    if let Some(e) = file_error {
        warn!("Could not open log file {}: {}", log_path.display(), e);
    }
}

fn run(args: &Args, mut settings_file: SettingsFile, settings: Settings) -> Result<()> {
    let command = args.command();

    // Settings never touch the store or the network. Only the file's own
    // values are edited, so one-off flags stay out of it.
    if let Command::Settings { set } = &command {
        if !set.is_empty() {
            settings_file.apply(set)?;
            info!("Settings saved to {}", settings_file.path().display());
        }
        print!("{}", toml::to_string_pretty(settings_file.settings())?);
        return Ok(());
    }

    let db_path = settings.database_path();
    let store = HistoryStore::open(&db_path)
        .with_context(|| format!("Failed to open history database {}", db_path.display()))?;

    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.enable_all().thread_name("ip-lookup");
    if let Some(workers) = settings.worker_threads {
        builder.worker_threads(workers.max(1));
    }
    let runtime = builder.build().context("Failed to start lookup runtime")?;

    let dispatcher = GeoService::new(
        &settings.endpoint,
        settings.request_timeout(),
        runtime.handle().clone(),
    )?;
    info!(
        "IP tracker starting: endpoint={}, timeout={}s, db={} ({} records)",
        settings.endpoint,
        settings.timeout_secs,
        db_path.display(),
        store.count()?
    );

    let mut session = Session::new(store, dispatcher, &settings);
    let outcome = run_command(command, &mut session, &mut settings_file);

    session.metrics().print_summary();
    drop(session);
    runtime.shutdown_timeout(Duration::from_secs(1));
    outcome
}

fn run_command(
    command: Command,
    session: &mut Session,
    settings_file: &mut SettingsFile,
) -> Result<()> {
    match command {
        Command::Lookup { ip } => {
            let mut presenter = ConsolePresenter::stdout(0);
            let status = terminal::run_once(session, &ip, &mut presenter)?;
            if status != LookupStatus::Success {
                bail!("Lookup for {} ended with {}", ip, status);
            }
        }
        Command::History { limit } => {
            let records = session.history()?;
            println!("{}", terminal::render_history(&records, limit));
        }
        Command::Clear => {
            let mut presenter = ConsolePresenter::stdout(0);
            session.clear(&mut presenter)?;
        }
        Command::Export { path } => {
            let mut presenter = ConsolePresenter::stdout(0);
            session.export(path.as_deref(), &mut presenter)?;
        }
        Command::Interactive => {
            let mut presenter = ConsolePresenter::stdout(HISTORY_PREVIEW_ROWS);
            terminal::run_interactive(session, settings_file, &mut presenter)?;
        }
        Command::Settings { .. } => {}
    }
    Ok(())
}
