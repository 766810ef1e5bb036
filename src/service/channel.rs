//! Cross-thread delivery of lookup results.
//!
//! Lookup tasks push terminal results into an unbounded channel; the
//! interactive thread drains it with a timer-driven [`ResultPoller`], so
//! neither side ever blocks on the other. Worst-case delivery latency is one
//! poll interval.

use std::time::{Duration, Instant};
use tokio::sync::mpsc;

use crate::model::LookupResult;

/// Create a connected sender/receiver pair.
pub fn result_channel() -> (ResultSender, ResultReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ResultSender { tx }, ResultReceiver { rx })
}

/// Producer half. Cheap to clone; each lookup task holds one.
#[derive(Clone, Debug)]
pub struct ResultSender {
    tx: mpsc::UnboundedSender<LookupResult>,
}

impl ResultSender {
    /// Enqueue a result without blocking. Returns `false` if the receiver is gone.
    pub fn push(&self, result: LookupResult) -> bool {
        self.tx.send(result).is_ok()
    }
}

/// Consumer half, owned by the interactive thread.
#[derive(Debug)]
pub struct ResultReceiver {
    rx: mpsc::UnboundedReceiver<LookupResult>,
}

impl ResultReceiver {
    pub fn try_pop(&mut self) -> Option<LookupResult> {
        self.rx.try_recv().ok()
    }
}

/// One-shot periodic poller, armed when a lookup is dispatched.
#[derive(Debug)]
pub struct ResultPoller {
    interval: Duration,
    next_tick: Option<Instant>,
}

impl ResultPoller {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_tick: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn arm(&mut self, now: Instant) {
        self.next_tick = Some(now + self.interval);
    }

    pub fn disarm(&mut self) {
        self.next_tick = None;
    }

    pub fn is_armed(&self) -> bool {
        self.next_tick.is_some()
    }

    /// Time left until the next tick is due, if armed.
    pub fn time_until_tick(&self, now: Instant) -> Option<Duration> {
        self.next_tick.map(|due| due.saturating_duration_since(now))
    }

    /// Run a tick if one is due. A popped result disarms the poller;
    /// an empty channel reschedules it one interval later.
    pub fn tick(&mut self, now: Instant, receiver: &mut ResultReceiver) -> Option<LookupResult> {
        let due = self.next_tick?;
        if now < due {
            return None;
        }

        match receiver.try_pop() {
            Some(result) => {
                self.next_tick = None;
                Some(result)
            }
            None => {
                self.next_tick = Some(now + self.interval);
                None
            }
        }
    }
}
