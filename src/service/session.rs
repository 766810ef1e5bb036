//! The interactive-side controller.
//!
//! A [`Session`] is built once at startup and owns everything the
//! interactive thread touches: the history store, the result channel's
//! receiving end, the poller and the per-lookup state machine. It is driven
//! by calling [`Session::tick`] on a fixed cadence and reports back through
//! a [`Presenter`].
//!
//! ```text
//! Idle -> Validating -> Invalid -> Idle
//!                    -> Dispatched -> Persisting -> Idle   (success)
//!                                  -> Idle                 (failure)
//! ```

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::config::Settings;
use crate::dao::HistoryStore;
use crate::error::Result;
use crate::i18n::{self, Locale, MessageId};
use crate::metrics::LookupMetrics;
use crate::model::{
    GeoLocation, HistoryRecord, LookupRequest, LookupResult, LookupStatus, NetworkErrorKind,
    NewHistoryEntry, QueryOrder,
};
use crate::service::channel::{result_channel, ResultPoller, ResultReceiver, ResultSender};
use crate::service::export_service::export_csv;
use crate::service::geo_service::{GeoService, LookupHandle};
use crate::service::validator::validate;

/// Notifications the core sends to whatever renders it.
pub trait Presenter {
    /// A lookup reached its terminal result.
    fn result_ready(&mut self, notification: &ResultNotification);

    /// The stored history changed; `records` is newest first.
    fn history_changed(&mut self, records: &[HistoryRecord]);

    /// One-line status message, already localized.
    fn status(&mut self, message: &str);

    /// Show or hide the busy indicator. While busy, submission is disabled.
    fn busy(&mut self, busy: bool);
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResultNotification {
    pub ip: String,
    pub status: LookupStatus,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupState {
    Idle,
    Validating,
    /// Rejected input, its `ValidationError` not yet delivered
    Invalid,
    Dispatched,
    Persisting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Blank input, nothing happened
    Empty,
    /// Another lookup is still outstanding
    Busy,
    Rejected,
    Dispatched,
}

#[derive(Debug)]
struct AutoRefresh {
    interval: Option<Duration>,
    next_due: Option<Instant>,
}

impl AutoRefresh {
    fn new(interval: Option<Duration>, now: Instant) -> Self {
        Self {
            interval,
            next_due: interval.map(|i| now + i),
        }
    }

    /// True once per elapsed interval; reschedules itself.
    fn poll_due(&mut self, now: Instant) -> bool {
        match (self.interval, self.next_due) {
            (Some(interval), Some(due)) if now >= due => {
                self.next_due = Some(now + interval);
                true
            }
            _ => false,
        }
    }

    fn time_until_due(&self, now: Instant) -> Option<Duration> {
        self.next_due.map(|due| due.saturating_duration_since(now))
    }
}

pub struct Session {
    store: HistoryStore,
    dispatcher: GeoService,
    sender: ResultSender,
    receiver: ResultReceiver,
    poller: ResultPoller,
    state: LookupState,
    in_flight: Option<LookupHandle>,
    locale: Locale,
    export_path: PathBuf,
    last_ip: Option<String>,
    auto_refresh: AutoRefresh,
}

impl Session {
    pub fn new(store: HistoryStore, dispatcher: GeoService, settings: &Settings) -> Self {
        let (sender, receiver) = result_channel();
        Self {
            store,
            dispatcher,
            sender,
            receiver,
            poller: ResultPoller::new(settings.poll_interval()),
            state: LookupState::Idle,
            in_flight: None,
            locale: settings.language,
            export_path: settings.export_path(),
            last_ip: None,
            auto_refresh: AutoRefresh::new(settings.refresh_interval(), Instant::now()),
        }
    }

    pub fn state(&self) -> LookupState {
        self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state == LookupState::Idle
    }

    pub fn locale(&self) -> Locale {
        self.locale
    }

    pub fn set_locale(&mut self, locale: Locale) {
        self.locale = locale;
    }

    pub fn set_auto_refresh(&mut self, interval: Option<Duration>) {
        self.auto_refresh = AutoRefresh::new(interval, Instant::now());
    }

    pub fn poll_interval(&self) -> Duration {
        self.poller.interval()
    }

    pub fn metrics(&self) -> &LookupMetrics {
        self.dispatcher.metrics()
    }

    /// Show the idle status line.
    pub fn ready(&self, presenter: &mut dyn Presenter) {
        presenter.status(self.message(MessageId::Ready));
    }

    fn message(&self, id: MessageId) -> &'static str {
        i18n::text(self.locale, id)
    }

    /// Start a lookup for `input`. Invalid input never reaches the network,
    /// but its `ValidationError` still travels through the result channel.
    pub fn submit(&mut self, input: &str, presenter: &mut dyn Presenter) -> SubmitOutcome {
        let ip = input.trim();
        if ip.is_empty() {
            return SubmitOutcome::Empty;
        }
        if self.state != LookupState::Idle {
            presenter.status(self.message(MessageId::LookupInProgress));
            return SubmitOutcome::Busy;
        }

        self.state = LookupState::Validating;
        let request = LookupRequest::new(ip);
        presenter.busy(true);
        presenter.status(self.message(MessageId::LookingUp));
        self.poller.arm(Instant::now());

        if validate(ip) {
            self.last_ip = Some(ip.to_string());
            debug!("Dispatching lookup for {}", ip);
            self.in_flight = Some(self.dispatcher.dispatch(request, self.sender.clone()));
            self.state = LookupState::Dispatched;
            SubmitOutcome::Dispatched
        } else {
            self.dispatcher.reject(request, &self.sender);
            self.state = LookupState::Invalid;
            SubmitOutcome::Rejected
        }
    }

    /// Drain at most one result if a poll tick is due.
    pub fn poll(&mut self, presenter: &mut dyn Presenter) -> Option<LookupStatus> {
        let result = self.poller.tick(Instant::now(), &mut self.receiver)?;
        Some(self.complete(result, presenter))
    }

    /// One step of the interactive loop: poll, then run auto-refresh if due.
    pub fn tick(&mut self, presenter: &mut dyn Presenter) -> Option<LookupStatus> {
        let status = self.poll(presenter);

        if self.auto_refresh.poll_due(Instant::now()) {
            if !self.is_idle() {
                debug!("Auto-refresh skipped: lookup in flight");
            } else if let Some(ip) = self.last_ip.clone() {
                debug!("Auto-refresh lookup for {}", ip);
                self.submit(&ip, presenter);
            }
        }

        status
    }

    /// How long the interactive loop may wait before calling `tick` again.
    pub fn next_wakeup(&self, now: Instant) -> Duration {
        let mut wait = self.poller.interval();
        if let Some(until_tick) = self.poller.time_until_tick(now) {
            wait = wait.min(until_tick);
        }
        if let Some(until_refresh) = self.auto_refresh.time_until_due(now) {
            wait = wait.min(until_refresh);
        }
        wait
    }

    /// Cancel the outstanding lookup, if any. Its result still arrives.
    pub fn cancel(&mut self) -> bool {
        match &self.in_flight {
            Some(handle) if !handle.is_finished() => {
                handle.cancel();
                true
            }
            _ => false,
        }
    }

    fn complete(&mut self, result: LookupResult, presenter: &mut dyn Presenter) -> LookupStatus {
        self.in_flight = None;
        presenter.busy(false);

        let status = result.status();
        presenter.result_ready(&ResultNotification {
            ip: result.ip().to_string(),
            status,
            text: result.display_text(),
        });
        presenter.status(self.message(status.into()));

        match &result {
            LookupResult::Success(location) => {
                info!("Successful lookup for IP: {}", location.ip);
                self.state = LookupState::Persisting;
                self.persist(location, presenter);
            }
            LookupResult::ValidationError { ip, .. } => {
                error!("Invalid IP address entered: {}", ip);
            }
            LookupResult::NetworkError {
                ip,
                kind: NetworkErrorKind::ProviderRejected,
                ..
            } => {
                error!("Failed lookup for IP: {}", ip);
            }
            LookupResult::NetworkError { ip, message, .. } => {
                error!("Network error during lookup for IP: {} - {}", ip, message);
            }
        }

        self.state = LookupState::Idle;
        status
    }

    fn persist(&mut self, location: &GeoLocation, presenter: &mut dyn Presenter) {
        match self.store.insert(&NewHistoryEntry::from(location)) {
            Ok(record) => {
                debug!("Saved history record {} for {}", record.id, record.ip);
                self.refresh_history(presenter);
            }
            Err(e) => {
                warn!("Failed to save lookup for {} to history: {}", location.ip, e);
                presenter.status(&i18n::format(self.locale, MessageId::HistorySaveFailed, &e));
            }
        }
    }

    /// Push the current history (newest first) to the presenter.
    pub fn refresh_history(&mut self, presenter: &mut dyn Presenter) {
        match self.store.query_all(QueryOrder::RecencyDesc) {
            Ok(records) => presenter.history_changed(&records),
            Err(e) => warn!("Failed to load history: {}", e),
        }
    }

    pub fn history(&self) -> Result<Vec<HistoryRecord>> {
        self.store.query_all(QueryOrder::RecencyDesc)
    }

    pub fn clear(&mut self, presenter: &mut dyn Presenter) -> Result<usize> {
        match self.store.clear() {
            Ok(removed) => {
                info!("History cleared ({} records)", removed);
                presenter.history_changed(&[]);
                presenter.status(self.message(MessageId::HistoryCleared));
                Ok(removed)
            }
            Err(e) => {
                error!("Failed to clear history: {}", e);
                presenter.status(&e.to_string());
                Err(e)
            }
        }
    }

    /// Export to `path`, or to the configured export path when `None`.
    pub fn export(&mut self, path: Option<&Path>, presenter: &mut dyn Presenter) -> Result<PathBuf> {
        let path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.export_path.clone());

        match export_csv(&self.store, &path) {
            Ok(written) => {
                info!("History exported to {}", written.display());
                presenter.status(&i18n::format(
                    self.locale,
                    MessageId::ExportSuccess,
                    written.display(),
                ));
                Ok(written)
            }
            Err(e) => {
                error!("Export failed: {}", e);
                presenter.status(&i18n::format(self.locale, MessageId::ExportFailed, &e));
                Err(e)
            }
        }
    }
}
