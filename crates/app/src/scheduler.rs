//! Timer scheduler: turns rule schedules into `TIMER` events.
//!
//! One ticker task per distinct schedule sleeps until the next fire instant
//! and queues an [`Event::timer`]. A single worker drains the queue and
//! hands each event to the sink, so timer firings reach the rule engine
//! through the same dispatch path as bus traffic.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use homebus_domain::rule::Event;
use homebus_domain::schedule::Schedule;
use homebus_domain::time::now;

use crate::ports::ScheduleRegistrar;

const QUEUE_CAPACITY: usize = 64;

/// Owns the ticker tasks and the queue worker.
#[derive(Default)]
pub struct TimerScheduler {
    schedules: Vec<Schedule>,
    seen: HashSet<Schedule>,
    tickers: Vec<JoinHandle<()>>,
    worker: Option<JoinHandle<()>>,
}

impl ScheduleRegistrar for TimerScheduler {
    fn register(&mut self, schedule: Schedule) {
        if self.seen.insert(schedule.clone()) {
            tracing::debug!(%schedule, "schedule registered");
            self.schedules.push(schedule);
        }
    }
}

impl TimerScheduler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registered schedules, in registration order.
    #[must_use]
    pub fn schedules(&self) -> &[Schedule] {
        &self.schedules
    }

    /// Spawn the tickers and the worker feeding `sink`.
    ///
    /// `sink` runs on the blocking pool, one firing at a time.
    ///
    /// Calling `start` on a running scheduler is a no-op.
    pub fn start<F>(&mut self, sink: F)
    where
        F: Fn(Event) + Send + Sync + 'static,
    {
        if self.worker.is_some() {
            return;
        }
        let (sender, mut receiver) = mpsc::channel::<Event>(QUEUE_CAPACITY);

        self.tickers = self
            .schedules
            .iter()
            .cloned()
            .map(|schedule| tokio::spawn(run_ticker(schedule, sender.clone())))
            .collect();
        // only the tickers hold senders, so the worker ends once they are gone
        drop(sender);

        let sink = Arc::new(sink);
        self.worker = Some(tokio::spawn(async move {
            while let Some(event) = receiver.recv().await {
                let sink = Arc::clone(&sink);
                if let Err(err) = tokio::task::spawn_blocking(move || sink(event)).await {
                    tracing::error!(error = %err, "timer dispatch aborted");
                }
            }
        }));
        tracing::info!(schedules = self.schedules.len(), "timer scheduler started");
    }

    /// Stop the tickers, then wait for already-queued firings to be handled.
    pub async fn shutdown(&mut self) {
        for ticker in self.tickers.drain(..) {
            ticker.abort();
            // the ticker only yields `Cancelled` here; its sender is dropped either way
            let _ = ticker.await;
        }
        if let Some(worker) = self.worker.take()
            && let Err(err) = worker.await
        {
            tracing::error!(error = %err, "timer worker aborted");
        }
        tracing::info!("timer scheduler stopped");
    }
}

async fn run_ticker(schedule: Schedule, sender: mpsc::Sender<Event>) {
    loop {
        let current = now();
        let Some(next) = schedule.next_after(current) else {
            tracing::warn!(%schedule, "schedule never fires again");
            return;
        };
        let wait = (next - current).to_std().unwrap_or_default();
        tokio::time::sleep(wait).await;

        tracing::debug!(%schedule, "schedule fired");
        if sender.send(Event::timer(schedule.clone())).await.is_err() {
            return;
        }
    }
}
