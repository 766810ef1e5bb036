//! Console front end: a [`Presenter`] that prints to a writer, plus the
//! stdin-driven interactive loop.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread;
use std::time::Instant;
use tracing::{debug, warn};

use crate::config::{Settings, SettingsFile};
use crate::error::{Result, TrackerError};
use crate::i18n::Locale;
use crate::model::{HistoryRecord, LookupStatus};
use crate::service::{Presenter, ResultNotification, Session, SubmitOutcome};

/// Rows shown after each history change in interactive mode.
pub const HISTORY_PREVIEW_ROWS: usize = 5;

const HELP: &str = "\
Commands:
  <ip> | lookup <ip>     look up an IPv4 address
  history [n]            show stored lookups, newest first
  clear                  delete the history
  export [path]          write the history as CSV
  lang [en|fa|zh]        show or change the status language
  refresh off|<minutes>  auto-refresh the last address (1-60 minutes)
  cancel                 cancel the lookup in progress
  help                   show this message
  quit                   exit";

pub struct ConsolePresenter<W: Write> {
    out: W,
    preview_rows: usize,
}

impl ConsolePresenter<io::Stdout> {
    pub fn stdout(preview_rows: usize) -> Self {
        Self::new(io::stdout(), preview_rows)
    }
}

impl<W: Write> ConsolePresenter<W> {
    pub fn new(out: W, preview_rows: usize) -> Self {
        Self { out, preview_rows }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn emit(&mut self, text: &str) {
        if let Err(e) = writeln!(self.out, "{}", text).and_then(|_| self.out.flush()) {
            debug!("Console write failed: {}", e);
        }
    }
}

impl<W: Write> Presenter for ConsolePresenter<W> {
    fn result_ready(&mut self, notification: &ResultNotification) {
        self.emit(&notification.text);
    }

    fn history_changed(&mut self, records: &[HistoryRecord]) {
        if self.preview_rows == 0 {
            return;
        }
        let table = render_history(records, Some(self.preview_rows));
        self.emit(&table);
    }

    fn status(&mut self, message: &str) {
        self.emit(&format!("[{}]", message));
    }

    fn busy(&mut self, _busy: bool) {}
}

/// Format records as a fixed-width table, at most `limit` rows.
pub fn render_history(records: &[HistoryRecord], limit: Option<usize>) -> String {
    let shown = limit.unwrap_or(records.len()).min(records.len());
    let mut table = format!(
        "{:<15} {:<20} {:<20} {:>10} {:>11}  {}",
        "IP Address", "Country", "City", "Latitude", "Longitude", "Timestamp"
    );
    for record in &records[..shown] {
        table.push_str(&format!(
            "\n{:<15} {:<20} {:<20} {:>10.4} {:>11.4}  {}",
            record.ip,
            record.country,
            record.city,
            record.latitude,
            record.longitude,
            record.formatted_timestamp()
        ));
    }
    if shown < records.len() {
        table.push_str(&format!("\n... {} more", records.len() - shown));
    }
    table
}

/// Tick `session` on its own cadence until the outstanding lookup resolves.
pub fn wait_for_result(session: &mut Session, presenter: &mut dyn Presenter) -> LookupStatus {
    loop {
        if let Some(status) = session.tick(presenter) {
            return status;
        }
        thread::sleep(session.next_wakeup(Instant::now()));
    }
}

/// Look up one address and wait for its result.
pub fn run_once(session: &mut Session, ip: &str, presenter: &mut dyn Presenter) -> Result<LookupStatus> {
    match session.submit(ip, presenter) {
        SubmitOutcome::Empty => Err(TrackerError::Validation("no IP address given".to_string())),
        _ => Ok(wait_for_result(session, presenter)),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReplCommand {
    Lookup(String),
    History(Option<usize>),
    Clear,
    Export(Option<PathBuf>),
    Language(Option<String>),
    /// `None` turns auto-refresh off
    Refresh(Option<u32>),
    Cancel,
    /// Recognized command with an unusable argument
    Invalid(String),
    Help,
    Quit,
}

impl ReplCommand {
    /// Parse one input line. Anything unrecognized is treated as an address.
    pub fn parse(line: &str) -> Option<ReplCommand> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };
        let arg = (!rest.is_empty()).then(|| rest.to_string());

        let command = match word.to_ascii_lowercase().as_str() {
            "lookup" => ReplCommand::Lookup(rest.to_string()),
            "history" => ReplCommand::History(rest.parse().ok()),
            "clear" => ReplCommand::Clear,
            "export" => ReplCommand::Export(arg.map(PathBuf::from)),
            "lang" | "language" => ReplCommand::Language(arg),
            "refresh" if rest.eq_ignore_ascii_case("off") => ReplCommand::Refresh(None),
            "refresh" => match rest.parse() {
                Ok(minutes) => ReplCommand::Refresh(Some(minutes)),
                Err(_) => ReplCommand::Invalid(format!(
                    "Usage: refresh off|<minutes>, got: {:?}",
                    rest
                )),
            },
            "cancel" => ReplCommand::Cancel,
            "help" | "?" => ReplCommand::Help,
            "quit" | "exit" | "q" => ReplCommand::Quit,
            _ => ReplCommand::Lookup(line.to_string()),
        };
        Some(command)
    }
}

/// Send each line of `reader` to `lines` until input ends, a read fails or
/// the receiving side hangs up.
pub fn forward_lines<R: BufRead>(reader: R, lines: Sender<String>) {
    for line in reader.lines() {
        let Ok(line) = line else { break };
        if lines.send(line).is_err() {
            break;
        }
    }
}

/// Interactive loop. Stdin is read on its own thread so this thread only
/// ever waits with a timeout bounded by the session's next wakeup.
pub fn run_interactive<W: Write>(
    session: &mut Session,
    settings_file: &mut SettingsFile,
    presenter: &mut ConsolePresenter<W>,
) -> Result<()> {
    let (line_tx, line_rx) = mpsc::channel::<String>();
    thread::Builder::new()
        .name("stdin-reader".to_string())
        .spawn(move || forward_lines(io::stdin().lock(), line_tx))?;

    presenter.emit(HELP);
    session.refresh_history(presenter);
    session.ready(presenter);

    loop {
        match line_rx.recv_timeout(session.next_wakeup(Instant::now())) {
            Ok(line) => {
                let Some(command) = ReplCommand::parse(&line) else {
                    continue;
                };
                if command == ReplCommand::Quit {
                    break;
                }
                handle_command(command, session, settings_file, presenter);
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                debug!("stdin closed");
                if !session.is_idle() {
                    wait_for_result(session, presenter);
                }
                break;
            }
        }
        session.tick(presenter);
    }

    if session.cancel() {
        wait_for_result(session, presenter);
    }
    Ok(())
}

fn handle_command<W: Write>(
    command: ReplCommand,
    session: &mut Session,
    settings_file: &mut SettingsFile,
    presenter: &mut ConsolePresenter<W>,
) {
    match command {
        ReplCommand::Lookup(ip) => {
            session.submit(&ip, presenter);
        }
        ReplCommand::History(limit) => match session.history() {
            Ok(records) => presenter.emit(&render_history(&records, limit)),
            Err(e) => presenter.status(&e.to_string()),
        },
        ReplCommand::Clear => {
            let _ = session.clear(presenter);
        }
        ReplCommand::Export(path) => {
            let _ = session.export(path.as_deref(), presenter);
        }
        ReplCommand::Language(None) => {
            let names: Vec<String> = Locale::ALL
                .iter()
                .map(|l| format!("{} ({})", l, l.code()))
                .collect();
            presenter.emit(&format!("{} | {}", session.locale(), names.join(", ")));
        }
        ReplCommand::Language(Some(name)) => match name.parse::<Locale>() {
            Ok(locale) => {
                session.set_locale(locale);
                let mut next = settings_file.settings().clone();
                next.language = locale;
                save_settings(settings_file, next);
                presenter.emit(&locale.to_string());
            }
            Err(e) => presenter.status(&e.to_string()),
        },
        ReplCommand::Refresh(minutes) => {
            let mut next = settings_file.settings().clone();
            match minutes {
                Some(minutes) => {
                    if let Err(e) = next.set(&format!("refresh_interval_minutes={}", minutes)) {
                        presenter.status(&e.to_string());
                        return;
                    }
                    next.auto_refresh = true;
                }
                None => next.auto_refresh = false,
            }
            session.set_auto_refresh(next.refresh_interval());
            match next.refresh_interval() {
                Some(_) => presenter.emit(&format!(
                    "Auto-refresh every {} min",
                    next.refresh_interval_minutes
                )),
                None => presenter.emit("Auto-refresh off"),
            }
            save_settings(settings_file, next);
        }
        ReplCommand::Cancel => {
            if !session.cancel() {
                presenter.emit("Nothing to cancel");
            }
        }
        ReplCommand::Invalid(message) => presenter.status(&message),
        ReplCommand::Help => presenter.emit(HELP),
        ReplCommand::Quit => {}
    }
}

fn save_settings(settings_file: &mut SettingsFile, settings: Settings) {
    if let Err(e) = settings_file.store(settings) {
        warn!(
            "Failed to save settings to {}: {}",
            settings_file.path().display(),
            e
        );
    }
}
