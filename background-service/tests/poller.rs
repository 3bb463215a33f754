use async_trait::async_trait;
use background_service::{AlertPoller, ManualClock, PollerConfig, StatusLog};
use deskalert_core::{
    AlertDefinition, AlertStore, ContentFetcher, CoreError, DatabaseError, FetchError,
    StatusEvent, StatusKind,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};

#[derive(Default)]
struct TestStore {
    alerts: Mutex<Vec<AlertDefinition>>,
    failures_left: AtomicUsize,
    calls: AtomicUsize,
}

impl TestStore {
    fn with(alerts: Vec<AlertDefinition>) -> Arc<Self> {
        Arc::new(Self {
            alerts: Mutex::new(alerts),
            ..Self::default()
        })
    }

    fn replace(&self, alerts: Vec<AlertDefinition>) {
        *self.alerts.lock().unwrap() = alerts;
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AlertStore for TestStore {
    async fn list_all(&self) -> Result<Vec<AlertDefinition>, CoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(CoreError::Database(DatabaseError::DatabaseLocked));
        }
        Ok(self.alerts.lock().unwrap().clone())
    }
}

#[derive(Default)]
struct TestFetcher {
    responses: HashMap<String, Result<String, FetchError>>,
    delay: Option<Duration>,
    requested: Mutex<Vec<String>>,
}

impl TestFetcher {
    fn with(responses: Vec<(&str, Result<&str, FetchError>)>) -> Arc<Self> {
        Arc::new(Self {
            responses: responses
                .into_iter()
                .map(|(url, r)| (url.to_string(), r.map(String::from)))
                .collect(),
            ..Self::default()
        })
    }

    fn requested(&self) -> Vec<String> {
        self.requested.lock().unwrap().clone()
    }
}

#[async_trait]
impl ContentFetcher for TestFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        self.requested.lock().unwrap().push(url.to_string());
        if let Some(delay) = self.delay {
            sleep(delay).await;
        }
        self.responses
            .get(url)
            .cloned()
            .unwrap_or_else(|| Err(FetchError::HttpStatus { status_code: 404 }))
    }
}

fn alert(id: i64, url: &str, keywords: &[&str], minutes: &str) -> AlertDefinition {
    AlertDefinition {
        id,
        name: format!("alert {id}"),
        url: url.to_string(),
        keywords: keywords.iter().map(|k| k.to_string()).collect(),
        schedule_minutes: minutes.to_string(),
        enabled: true,
    }
}

fn fast_config() -> PollerConfig {
    PollerConfig {
        interval: Duration::from_millis(20),
        fetch_timeout: Duration::from_secs(2),
        skip_disabled: false,
    }
}

fn poller_at(
    minute: u32,
    store: Arc<TestStore>,
    fetcher: Arc<TestFetcher>,
    config: PollerConfig,
) -> (AlertPoller, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::at_minute(minute).unwrap());
    let poller = AlertPoller::new(store, fetcher, config).with_clock(clock.clone());
    (poller, clock)
}

fn drain(receiver: &mut mpsc::UnboundedReceiver<StatusEvent>) -> Vec<StatusEvent> {
    let mut events = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        events.push(event);
    }
    events
}

async fn next_event(receiver: &mut mpsc::UnboundedReceiver<StatusEvent>) -> StatusEvent {
    timeout(Duration::from_secs(5), receiver.recv())
        .await
        .expect("event within timeout")
        .expect("channel open")
}

#[tokio::test]
async fn test_deal_scenario() {
    let store = TestStore::with(vec![alert(1, "http://x", &["deal"], "0,30")]);
    let fetcher = TestFetcher::with(vec![("http://x", Ok("Big Deal Today"))]);
    let (poller, clock) = poller_at(30, store, fetcher.clone(), PollerConfig::default());
    let mut events = poller.status_channel();

    let report = poller.run_cycle().await;
    assert_eq!(report.due, 1);
    assert_eq!(report.matches, 1);

    let events_at_30 = drain(&mut events);
    assert_eq!(events_at_30.len(), 1);
    assert_eq!(events_at_30[0].kind, StatusKind::KeywordMatch);
    assert_eq!(
        events_at_30[0].message,
        "Keyword match found for URL: http://x"
    );

    clock.set_minute(31);
    let report = poller.run_cycle().await;
    assert_eq!(report.due, 0);
    assert!(drain(&mut events).is_empty());
    assert_eq!(fetcher.requested(), vec!["http://x"]);
}

#[tokio::test]
async fn test_single_minute_schedule_selects_only_that_minute() {
    for m in [0u32, 1, 29, 59] {
        let store = TestStore::with(vec![alert(1, "http://x", &["deal"], &m.to_string())]);
        let fetcher = TestFetcher::with(vec![("http://x", Ok("deal"))]);
        let (poller, clock) = poller_at(0, store, fetcher, PollerConfig::default());

        for current in 0..60u32 {
            clock.set_minute(current);
            let report = poller.run_cycle().await;
            assert_eq!(report.due == 1, current == m, "m={m} current={current}");
        }
    }
}

#[tokio::test]
async fn test_duplicate_minutes_fire_once() {
    let store = TestStore::with(vec![alert(1, "http://x", &["deal"], "5,5,5")]);
    let fetcher = TestFetcher::with(vec![("http://x", Ok("deal"))]);
    let (poller, _clock) = poller_at(5, store, fetcher.clone(), PollerConfig::default());
    let mut events = poller.status_channel();

    let report = poller.run_cycle().await;
    assert_eq!(report.due, 1);
    assert_eq!(fetcher.requested().len(), 1);
    assert_eq!(drain(&mut events).len(), 1);
}

#[tokio::test]
async fn test_empty_and_unparsable_schedules_never_fire() {
    let store = TestStore::with(vec![
        alert(1, "http://empty", &["deal"], ""),
        alert(2, "http://bad", &["deal"], "every hour"),
        alert(3, "http://range", &["deal"], "0,61"),
    ]);
    let fetcher = TestFetcher::with(vec![]);
    let (poller, clock) = poller_at(0, store, fetcher.clone(), PollerConfig::default());

    for current in [0u32, 1, 30, 59] {
        clock.set_minute(current);
        let report = poller.run_cycle().await;
        assert_eq!(report.loaded, 3);
        assert_eq!(report.due, 0);
        assert_eq!(report.skipped_unparsable, 2);
    }
    assert!(fetcher.requested().is_empty());
}

#[tokio::test]
async fn test_case_insensitive_keyword_match() {
    let store = TestStore::with(vec![
        alert(1, "http://hello", &["world"], "10"),
        alert(2, "http://hello", &["xyz"], "10"),
    ]);
    let fetcher = TestFetcher::with(vec![("http://hello", Ok("Hello World"))]);
    let (poller, _clock) = poller_at(10, store, fetcher, PollerConfig::default());
    let mut events = poller.status_channel();

    let report = poller.run_cycle().await;
    assert_eq!(report.due, 2);
    assert_eq!(report.matches, 1);

    let events = drain(&mut events);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].alert_id, Some(1));
}

#[tokio::test]
async fn test_fetch_failure_does_not_block_other_alerts() {
    let store = TestStore::with(vec![
        alert(1, "http://a", &["deal"], "7"),
        alert(2, "http://b", &["deal"], "7"),
    ]);
    let fetcher = TestFetcher::with(vec![
        (
            "http://a",
            Err(FetchError::Network {
                reason: "connection refused".to_string(),
            }),
        ),
        ("http://b", Ok("a good deal")),
    ]);
    let (poller, _clock) = poller_at(7, store, fetcher, PollerConfig::default());
    let mut events = poller.status_channel();

    let report = poller.run_cycle().await;
    assert_eq!(report.fetch_errors, 1);
    assert_eq!(report.matches, 1);

    let events = drain(&mut events);
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].kind, StatusKind::FetchError);
    assert_eq!(
        events[0].message,
        "Error fetching URL http://a: Network failure: connection refused"
    );
    assert_eq!(events[1].kind, StatusKind::KeywordMatch);
    assert_eq!(events[1].url, "http://b");
}

#[tokio::test]
async fn test_hanging_fetch_is_bounded() {
    let store = TestStore::with(vec![alert(1, "http://slow", &["deal"], "3")]);
    let fetcher = Arc::new(TestFetcher {
        responses: HashMap::from([("http://slow".to_string(), Ok("deal".to_string()))]),
        delay: Some(Duration::from_secs(30)),
        ..TestFetcher::default()
    });
    let config = PollerConfig {
        fetch_timeout: Duration::from_millis(50),
        ..PollerConfig::default()
    };
    let (poller, _clock) = poller_at(3, store, fetcher, config);
    let mut events = poller.status_channel();

    let report = timeout(Duration::from_secs(5), poller.run_cycle())
        .await
        .expect("cycle finishes despite hanging fetch");
    assert_eq!(report.fetch_errors, 1);
    assert_eq!(report.matches, 0);

    let events = drain(&mut events);
    assert_eq!(events.len(), 1);
    assert!(events[0].message.starts_with("Error fetching URL http://slow"));
}

#[tokio::test]
async fn test_disabled_alerts_polled_unless_configured() {
    let mut disabled = alert(1, "http://x", &["deal"], "20");
    disabled.enabled = false;
    let fetcher = TestFetcher::with(vec![("http://x", Ok("deal"))]);

    let (poller, _clock) = poller_at(
        20,
        TestStore::with(vec![disabled.clone()]),
        fetcher.clone(),
        PollerConfig::default(),
    );
    assert_eq!(poller.run_cycle().await.matches, 1);

    let config = PollerConfig {
        skip_disabled: true,
        ..PollerConfig::default()
    };
    let (poller, _clock) = poller_at(20, TestStore::with(vec![disabled]), fetcher, config);
    let report = poller.run_cycle().await;
    assert_eq!(report.skipped_disabled, 1);
    assert_eq!(report.matches, 0);
}

#[tokio::test]
async fn test_each_cycle_reads_a_fresh_snapshot() {
    let store = TestStore::with(vec![alert(1, "http://x", &["deal"], "9")]);
    let fetcher = TestFetcher::with(vec![("http://x", Ok("deal")), ("http://y", Ok("deal"))]);
    let (poller, _clock) = poller_at(9, store.clone(), fetcher.clone(), PollerConfig::default());

    poller.run_cycle().await;
    store.replace(vec![alert(2, "http://y", &["deal"], "9")]);
    poller.run_cycle().await;

    assert_eq!(store.calls(), 2);
    assert_eq!(fetcher.requested(), vec!["http://x", "http://y"]);
}

#[tokio::test]
async fn test_start_and_stop_are_idempotent() {
    let store = TestStore::with(vec![]);
    let fetcher = TestFetcher::with(vec![]);
    let config = PollerConfig {
        interval: Duration::from_secs(3600),
        ..fast_config()
    };
    let (poller, _clock) = poller_at(0, store.clone(), fetcher, config);

    assert!(!poller.is_running());
    poller.stop();
    assert!(!poller.is_running());

    poller.start().unwrap();
    poller.start().unwrap();
    assert!(poller.is_running());

    // First cycle runs without an initial delay; the second start added no loop
    sleep(Duration::from_millis(100)).await;
    assert_eq!(store.calls(), 1);
    assert_eq!(poller.live_loops(), 1);

    poller.stop();
    poller.stop();
    assert!(!poller.is_running());
}

#[tokio::test]
async fn test_loop_keeps_running_after_store_failure() {
    let store = TestStore::with(vec![alert(1, "http://x", &["deal"], "40")]);
    store.failures_left.store(1, Ordering::SeqCst);
    let fetcher = TestFetcher::with(vec![("http://x", Ok("deal"))]);
    let (poller, _clock) = poller_at(40, store.clone(), fetcher, fast_config());
    let mut events = poller.status_channel();

    poller.start().unwrap();
    let event = next_event(&mut events).await;
    assert_eq!(event.message, "Keyword match found for URL: http://x");
    assert!(store.calls() >= 2);

    poller.shutdown().await;
    assert!(!poller.is_running());
    assert_eq!(poller.live_loops(), 0);
}

#[tokio::test]
async fn test_restart_leaves_a_single_loop() {
    let store = TestStore::with(vec![]);
    let fetcher = TestFetcher::with(vec![]);
    let config = PollerConfig {
        interval: Duration::from_millis(30),
        ..fast_config()
    };
    let (poller, _clock) = poller_at(0, store, fetcher, config);

    poller.start().unwrap();
    poller.stop();
    poller.start().unwrap();
    assert!(poller.is_running());

    // The replaced loop notices after its sleep and exits
    sleep(Duration::from_millis(200)).await;
    assert_eq!(poller.live_loops(), 1);

    poller.shutdown().await;
    assert_eq!(poller.live_loops(), 0);
}

#[tokio::test]
async fn test_subscribers_receive_events_in_order() {
    let store = TestStore::with(vec![
        alert(1, "http://a", &["deal"], "15"),
        alert(2, "http://b", &["deal"], "15"),
        alert(3, "http://c", &["deal"], "15"),
    ]);
    let fetcher = TestFetcher::with(vec![
        ("http://a", Ok("deal")),
        ("http://c", Ok("deal")),
    ]);
    let (poller, _clock) = poller_at(15, store, fetcher, PollerConfig::default());

    let log = Arc::new(StatusLog::new(10));
    poller.subscribe(log.clone());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    poller.subscribe(Arc::new(move |event: &StatusEvent| {
        sink.lock().unwrap().push(event.alert_id);
    }));

    poller.run_cycle().await;

    assert_eq!(*seen.lock().unwrap(), vec![Some(1), Some(2), Some(3)]);
    assert_eq!(
        log.messages(),
        vec![
            "Keyword match found for URL: http://a",
            "Error fetching URL http://b: Unexpected HTTP status 404",
            "Keyword match found for URL: http://c",
        ]
    );
}

#[tokio::test]
async fn test_panicking_subscriber_does_not_stop_the_loop() {
    let store = TestStore::with(vec![alert(1, "http://x", &["deal"], "25")]);
    let fetcher = TestFetcher::with(vec![("http://x", Ok("deal"))]);
    let (poller, _clock) = poller_at(25, store.clone(), fetcher, fast_config());

    poller.subscribe(Arc::new(|_: &StatusEvent| {
        panic!("subscriber failure");
    }));
    let mut events = poller.status_channel();

    poller.start().unwrap();
    for _ in 0..3 {
        let event = next_event(&mut events).await;
        assert_eq!(event.kind, StatusKind::KeywordMatch);
    }
    assert!(store.calls() >= 3);
    assert!(poller.is_running());
    assert_eq!(poller.live_loops(), 1);

    poller.shutdown().await;
    assert_eq!(poller.live_loops(), 0);
}

#[tokio::test]
async fn test_stop_lets_the_in_flight_cycle_finish() {
    let store = TestStore::with(vec![alert(1, "http://slow", &["deal"], "35")]);
    let fetcher = Arc::new(TestFetcher {
        responses: HashMap::from([("http://slow".to_string(), Ok("deal".to_string()))]),
        delay: Some(Duration::from_millis(200)),
        ..TestFetcher::default()
    });
    let config = PollerConfig {
        interval: Duration::from_millis(300),
        ..fast_config()
    };
    let (poller, _clock) = poller_at(35, store.clone(), fetcher.clone(), config);
    let mut events = poller.status_channel();

    poller.start().unwrap();
    sleep(Duration::from_millis(50)).await;
    assert_eq!(fetcher.requested(), vec!["http://slow"]);

    poller.stop();
    assert!(!poller.is_running());

    // The pending fetch completes and its match is still reported
    let event = next_event(&mut events).await;
    assert_eq!(event.message, "Keyword match found for URL: http://slow");
    assert_eq!(poller.live_loops(), 1);

    // The loop exits after its sleep without starting another cycle
    sleep(Duration::from_millis(600)).await;
    assert_eq!(poller.live_loops(), 0);
    assert_eq!(store.calls(), 1);
    assert!(drain(&mut events).is_empty());
}
