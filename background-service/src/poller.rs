//! Periodic alert polling.
//!
//! Once per interval the poller reads every alert definition from the store,
//! keeps those whose minute schedule matches the current minute of the hour,
//! fetches their pages one after another and raises a status event for each
//! keyword match and each failed fetch.

use crate::clock::{Clock, SystemClock};
use crate::subscriber::{ChannelSubscriber, StatusSubscriber};
use chrono::Timelike;
use deskalert_core::{
    AlertDefinition, AlertStore, ContentFetcher, CoreError, FetchError, KeywordFilter,
    MinuteSchedule, PollerSettings, StatusEvent,
};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollerConfig {
    /// Pause between the end of one cycle and the start of the next.
    pub interval: Duration,
    /// Upper bound on a single fetch.
    pub fetch_timeout: Duration,
    pub skip_disabled: bool,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            fetch_timeout: Duration::from_secs(30),
            skip_disabled: false,
        }
    }
}

impl From<&PollerSettings> for PollerConfig {
    fn from(settings: &PollerSettings) -> Self {
        Self {
            interval: settings.interval(),
            fetch_timeout: settings.fetch_timeout(),
            skip_disabled: settings.skip_disabled,
        }
    }
}

/// Outcome of one pass over the alert definitions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub minute: u32,
    pub loaded: usize,
    pub due: usize,
    pub matches: usize,
    pub fetch_errors: usize,
    pub skipped_unparsable: usize,
    pub skipped_disabled: usize,
    pub store_failed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Default)]
struct Subscribers {
    next_id: u64,
    entries: Vec<(SubscriptionId, Arc<dyn StatusSubscriber>)>,
}

/// Everything a cycle needs, shared between the handle and the loop task.
#[derive(Clone)]
struct CycleRunner {
    store: Arc<dyn AlertStore>,
    fetcher: Arc<dyn ContentFetcher>,
    clock: Arc<dyn Clock>,
    config: PollerConfig,
    subscribers: Arc<RwLock<Subscribers>>,
}

impl CycleRunner {
    async fn run_cycle(&self) -> CycleReport {
        let minute = self.clock.now().minute();
        let mut report = CycleReport {
            minute,
            ..CycleReport::default()
        };

        let definitions = match self.store.list_all().await {
            Ok(definitions) => definitions,
            Err(e) => {
                error!(error = %e, "Failed to load alert definitions, skipping cycle");
                report.store_failed = true;
                return report;
            }
        };
        report.loaded = definitions.len();

        for definition in &definitions {
            self.process_definition(definition, minute, &mut report)
                .await;
        }

        debug!(
            minute = report.minute,
            loaded = report.loaded,
            due = report.due,
            matches = report.matches,
            fetch_errors = report.fetch_errors,
            "Alert cycle finished"
        );
        report
    }

    async fn process_definition(
        &self,
        definition: &AlertDefinition,
        minute: u32,
        report: &mut CycleReport,
    ) {
        if self.config.skip_disabled && !definition.enabled {
            report.skipped_disabled += 1;
            return;
        }

        let schedule = match definition.schedule_minutes.parse::<MinuteSchedule>() {
            Ok(schedule) => schedule,
            Err(e) => {
                warn!(
                    alert_id = definition.id,
                    schedule = %definition.schedule_minutes,
                    "Ignoring alert with unparsable schedule: {}",
                    e
                );
                report.skipped_unparsable += 1;
                return;
            }
        };
        if !schedule.is_due(minute) {
            return;
        }
        report.due += 1;

        let content = match self.fetch(&definition.url).await {
            Ok(body) => body,
            Err(e) => {
                report.fetch_errors += 1;
                warn!(alert_id = definition.id, url = %definition.url, "Fetch failed: {}", e);
                self.emit(StatusEvent::fetch_error(
                    definition.id,
                    &definition.url,
                    &e,
                    self.clock.now(),
                ));
                String::new()
            }
        };

        let filter = KeywordFilter::new(&definition.keywords);
        if let Some(keyword) = filter.find_match(&content) {
            report.matches += 1;
            debug!(alert_id = definition.id, keyword, "Keyword matched");
            self.emit(StatusEvent::keyword_match(
                definition.id,
                &definition.url,
                self.clock.now(),
            ));
        }
    }

    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        match tokio::time::timeout(self.config.fetch_timeout, self.fetcher.fetch(url)).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::timed_out(self.config.fetch_timeout)),
        }
    }

    fn emit(&self, event: StatusEvent) {
        info!("{}", event.message);
        // Snapshot so a subscriber may (un)subscribe from inside its callback
        let subscribers: Vec<Arc<dyn StatusSubscriber>> = self
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .iter()
            .map(|(_, s)| Arc::clone(s))
            .collect();
        for subscriber in subscribers {
            let delivered = panic::catch_unwind(AssertUnwindSafe(|| subscriber.on_status(&event)));
            if delivered.is_err() {
                error!(alert_id = ?event.alert_id, "Status subscriber panicked");
            }
        }
    }
}

/// Held by the loop task so the counters stay right however the task ends.
struct LoopGuard {
    generation: u64,
    current_generation: Arc<AtomicU64>,
    running: Arc<AtomicBool>,
    live_loops: Arc<AtomicUsize>,
}

impl Drop for LoopGuard {
    fn drop(&mut self) {
        self.live_loops.fetch_sub(1, Ordering::SeqCst);
        if std::thread::panicking()
            && self.current_generation.load(Ordering::SeqCst) == self.generation
        {
            self.running.store(false, Ordering::SeqCst);
            error!(generation = self.generation, "Alert poller loop panicked");
        }
    }
}

/// Start/stop handle for the background polling loop.
pub struct AlertPoller {
    runner: CycleRunner,
    running: Arc<AtomicBool>,
    generation: Arc<AtomicU64>,
    live_loops: Arc<AtomicUsize>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl AlertPoller {
    pub fn new(
        store: Arc<dyn AlertStore>,
        fetcher: Arc<dyn ContentFetcher>,
        config: PollerConfig,
    ) -> Self {
        Self {
            runner: CycleRunner {
                store,
                fetcher,
                clock: Arc::new(SystemClock),
                config,
                subscribers: Arc::new(RwLock::new(Subscribers::default())),
            },
            running: Arc::new(AtomicBool::new(false)),
            generation: Arc::new(AtomicU64::new(0)),
            live_loops: Arc::new(AtomicUsize::new(0)),
            handle: Mutex::new(None),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.runner.clock = clock;
        self
    }

    pub fn config(&self) -> &PollerConfig {
        &self.runner.config
    }

    pub fn subscribe(&self, subscriber: Arc<dyn StatusSubscriber>) -> SubscriptionId {
        let mut subscribers = self
            .runner
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        subscribers.next_id += 1;
        let id = SubscriptionId(subscribers.next_id);
        subscribers.entries.push((id, subscriber));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self
            .runner
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = subscribers.entries.len();
        subscribers.entries.retain(|(entry_id, _)| *entry_id != id);
        subscribers.entries.len() != before
    }

    /// Subscribes a fresh channel and returns its receiving end.
    pub fn status_channel(&self) -> mpsc::UnboundedReceiver<StatusEvent> {
        let (subscriber, receiver) = ChannelSubscriber::new();
        self.subscribe(Arc::new(subscriber));
        receiver
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Number of loop tasks that have not exited yet. Briefly 2 right after a
    /// stop/start pair, until the old loop wakes and notices it was replaced.
    pub fn live_loops(&self) -> usize {
        self.live_loops.load(Ordering::SeqCst)
    }

    /// Runs a single cycle on the caller's task.
    pub async fn run_cycle(&self) -> CycleReport {
        self.runner.run_cycle().await
    }

    /// Launches the polling loop. The first cycle runs immediately. Calling
    /// this while already running does nothing. Must be called from within a
    /// Tokio runtime.
    pub fn start(&self) -> Result<(), CoreError> {
        if self.running.swap(true, Ordering::SeqCst) {
            debug!("Alert poller already running");
            return Ok(());
        }

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                return Err(CoreError::Internal {
                    message: format!("alert poller needs a Tokio runtime: {}", e),
                });
            }
        };

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let runner = self.runner.clone();
        let running = Arc::clone(&self.running);
        let current_generation = Arc::clone(&self.generation);
        let live_loops = Arc::clone(&self.live_loops);

        live_loops.fetch_add(1, Ordering::SeqCst);
        let guard = LoopGuard {
            generation,
            current_generation: Arc::clone(&current_generation),
            running: Arc::clone(&running),
            live_loops,
        };
        let handle = runtime.spawn(async move {
            let _guard = guard;
            info!(generation, interval = ?runner.config.interval, "Alert poller started");
            loop {
                runner.run_cycle().await;
                tokio::time::sleep(runner.config.interval).await;

                // Cooperative stop: only checked between cycles
                if !running.load(Ordering::SeqCst)
                    || current_generation.load(Ordering::SeqCst) != generation
                {
                    break;
                }
            }
            info!(generation, "Alert poller stopped");
        });

        *self.handle.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
        Ok(())
    }

    /// Asks the loop to exit after its current cycle and sleep. Returns
    /// without waiting for it.
    pub fn stop(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            info!("Alert poller stop requested");
        } else {
            debug!("Alert poller already stopped");
        }
    }

    /// Stops the loop and waits for it to exit.
    pub async fn shutdown(&self) {
        self.stop();
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!("Alert poller task failed: {}", e);
            }
        }
    }
}

impl Drop for AlertPoller {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }
}
