//! Background loop driving one watch.
//!
//! Each watch owns one task. The task multiplexes two cadences onto a single
//! sequential loop:
//!
//! - credential renewal, armed for the remaining credential lifetime;
//! - change polling, every `poll_interval`.
//!
//! At most one of renew, probe or notify runs at a time, so callbacks for a
//! watch are delivered in detection order and never overlap. Errors inside the
//! loop are logged and the loop carries on; only cancellation ends it.

use super::handle::{WatchHandle, WatchSnapshot};
use crate::core::{ConfigKey, Fingerprint, has_changed};
use crate::error::Result;
use crate::remote::{ConfigBackend, ProbeOutcome};
use arc_swap::ArcSwap;
use std::future::pending;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior, interval_at, sleep_until};
use tracing::{debug, error, info, trace, warn};

#[cfg(feature = "metrics")]
use crate::metrics::WatchMetrics;

/// Default client-side poll cadence.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Callback invoked with the new content after each detected change.
pub type WatchCallback = Box<dyn FnMut(String) + Send + 'static>;

/// Tuning for a watch loop.
#[derive(Clone)]
pub struct WatchOptions {
    /// Time between probes; independent of the server's long-poll hold
    pub poll_interval: Duration,
    /// Optional metrics sink
    #[cfg(feature = "metrics")]
    pub metrics: Option<WatchMetrics>,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            #[cfg(feature = "metrics")]
            metrics: None,
        }
    }
}

impl WatchOptions {
    /// Set the poll interval.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Record loop activity into `metrics`.
    #[cfg(feature = "metrics")]
    pub fn with_metrics(mut self, metrics: WatchMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }
}

/// Register a watch on `key` against any [`ConfigBackend`].
///
/// Fetches the current content first; that failure is returned to the caller
/// and no task is started. On success the content's fingerprint becomes the
/// baseline and a background task starts probing for changes. `callback` is
/// not invoked for the initial content.
///
/// # Errors
///
/// Returns whatever error the initial fetch produced.
pub async fn spawn_watch<B, F>(
    backend: Arc<B>,
    key: ConfigKey,
    options: WatchOptions,
    callback: F,
) -> Result<WatchHandle>
where
    B: ConfigBackend + ?Sized + 'static,
    F: FnMut(String) + Send + 'static,
{
    let content = backend.fetch(&key).await?;
    let fingerprint = Fingerprint::of(&content);
    info!(
        backend = %backend.name(),
        namespace = %key.namespace,
        group = %key.group,
        data_id = %key.data_id,
        fingerprint = %fingerprint,
        "watch registered"
    );

    let snapshot = Arc::new(ArcSwap::from_pointee(WatchSnapshot {
        content,
        fingerprint: fingerprint.clone(),
    }));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let task = WatchTask {
        backend,
        key: key.clone(),
        last_fingerprint: fingerprint,
        callback: Box::new(callback),
        snapshot: Arc::clone(&snapshot),
        options,
    };
    let join = tokio::spawn(task.run(shutdown_rx));

    Ok(WatchHandle::new(key, snapshot, shutdown_tx, join))
}

#[derive(Debug, Clone, Copy)]
enum Tick {
    Renew,
    Poll,
}

struct WatchTask<B: ?Sized> {
    backend: Arc<B>,
    key: ConfigKey,
    last_fingerprint: Fingerprint,
    callback: WatchCallback,
    snapshot: Arc<ArcSwap<WatchSnapshot>>,
    options: WatchOptions,
}

impl<B: ConfigBackend + ?Sized> WatchTask<B> {
    async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let period = self.options.poll_interval;
        let mut poll = interval_at(Instant::now() + period, period);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut renew_at = self.next_renewal().await;

        loop {
            let tick = tokio::select! {
                biased;
                _ = cancelled(&mut shutdown) => break,
                _ = sleep_until_some(renew_at) => Tick::Renew,
                _ = poll.tick() => Tick::Poll,
            };

            // Cancellation also abandons whatever request the step is awaiting.
            let finished = tokio::select! {
                biased;
                _ = cancelled(&mut shutdown) => false,
                _ = self.step(tick, &mut renew_at) => true,
            };
            if !finished {
                break;
            }
        }

        debug!(data_id = %self.key.data_id, "watch stopped");
    }

    async fn step(&mut self, tick: Tick, renew_at: &mut Option<Instant>) {
        match tick {
            Tick::Renew => *renew_at = self.renew().await,
            Tick::Poll => self.poll_once().await,
        }
    }

    async fn renew(&mut self) -> Option<Instant> {
        match self.backend.renew_credentials().await {
            Ok(()) => debug!(backend = %self.backend.name(), "credentials renewed"),
            Err(e) => {
                // The next request re-attempts the login on its own.
                error!(
                    backend = %self.backend.name(),
                    data_id = %self.key.data_id,
                    error = %e,
                    "scheduled credential renewal failed"
                );
                #[cfg(feature = "metrics")]
                if let Some(metrics) = &self.options.metrics {
                    metrics.record_renewal_failure();
                }
            }
        }
        self.next_renewal().await
    }

    /// Deadline of the next renewal; a spent lifetime retries after one poll interval.
    async fn next_renewal(&mut self) -> Option<Instant> {
        let remaining = self.backend.credentials_valid_for().await?;
        let delay = if remaining.is_zero() {
            self.options.poll_interval
        } else {
            remaining
        };
        Some(Instant::now() + delay)
    }

    async fn poll_once(&mut self) {
        #[cfg(feature = "metrics")]
        let timer = self.options.metrics.as_ref().map(|m| m.start_probe());

        let outcome = self.backend.probe(&self.key, &self.last_fingerprint).await;

        #[cfg(feature = "metrics")]
        if let (Some(metrics), Some(timer)) = (&self.options.metrics, timer) {
            match &outcome {
                Ok(o) => metrics.record_probe_success(timer, *o == ProbeOutcome::Changed),
                Err(_) => metrics.record_probe_failure(timer),
            }
        }

        match outcome {
            Ok(ProbeOutcome::Unchanged) => {
                trace!(data_id = %self.key.data_id, "no change reported");
            }
            Ok(ProbeOutcome::Changed) => self.notify().await,
            Err(e) => {
                error!(
                    namespace = %self.key.namespace,
                    group = %self.key.group,
                    data_id = %self.key.data_id,
                    error = %e,
                    "change probe failed"
                );
            }
        }
    }

    async fn notify(&mut self) {
        let content = match self.backend.fetch(&self.key).await {
            Ok(content) => content,
            Err(e) => {
                // Keeping the old fingerprint makes the next probe report the change again.
                error!(
                    namespace = %self.key.namespace,
                    group = %self.key.group,
                    data_id = %self.key.data_id,
                    error = %e,
                    "fetch after change failed"
                );
                #[cfg(feature = "metrics")]
                if let Some(metrics) = &self.options.metrics {
                    metrics.record_refetch_failure();
                }
                return;
            }
        };

        let fingerprint = Fingerprint::of(&content);
        if !has_changed(&self.last_fingerprint, &fingerprint) {
            warn!(
                data_id = %self.key.data_id,
                fingerprint = %fingerprint,
                "change reported but content is identical"
            );
            return;
        }

        info!(
            namespace = %self.key.namespace,
            group = %self.key.group,
            data_id = %self.key.data_id,
            fingerprint = %self.last_fingerprint,
            new_fingerprint = %fingerprint,
            "config changed"
        );
        self.last_fingerprint = fingerprint.clone();
        self.snapshot.store(Arc::new(WatchSnapshot {
            content: content.clone(),
            fingerprint,
        }));
        (self.callback)(content);

        #[cfg(feature = "metrics")]
        if let Some(metrics) = &self.options.metrics {
            metrics.record_notification();
        }
    }
}

/// Resolves once cancellation is requested; never resolves if the handle was dropped.
async fn cancelled(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            pending::<()>().await;
        }
    }
}

async fn sleep_until_some(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NacosError;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc;
    use tokio::time::{sleep, timeout};

    /// Scripted backend; unscripted probes report `Unchanged`.
    #[derive(Default)]
    struct FakeBackend {
        fetches: Mutex<VecDeque<Result<String>>>,
        probes: Mutex<VecDeque<Result<ProbeOutcome>>>,
        renewals: Mutex<VecDeque<Result<()>>>,
        probed_fingerprints: Mutex<Vec<Fingerprint>>,
        valid_for: Option<Duration>,
        hang_probes: bool,
        fetch_calls: AtomicUsize,
        probe_calls: AtomicUsize,
        renew_calls: AtomicUsize,
    }

    impl FakeBackend {
        fn with_fetches(self, fetches: Vec<Result<String>>) -> Self {
            *self.fetches.lock().unwrap() = fetches.into();
            self
        }

        fn with_probes(self, probes: Vec<Result<ProbeOutcome>>) -> Self {
            *self.probes.lock().unwrap() = probes.into();
            self
        }

        fn with_renewals(mut self, valid_for: Duration, renewals: Vec<Result<()>>) -> Self {
            self.valid_for = Some(valid_for);
            *self.renewals.lock().unwrap() = renewals.into();
            self
        }
    }

    #[async_trait]
    impl ConfigBackend for FakeBackend {
        async fn fetch(&self, _key: &ConfigKey) -> Result<String> {
            self.fetch_calls.fetch_add(1, Ordering::SeqCst);
            self.fetches
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(NacosError::Transport("no scripted fetch".to_string())))
        }

        async fn probe(&self, _key: &ConfigKey, fingerprint: &Fingerprint) -> Result<ProbeOutcome> {
            self.probe_calls.fetch_add(1, Ordering::SeqCst);
            self.probed_fingerprints
                .lock()
                .unwrap()
                .push(fingerprint.clone());
            if self.hang_probes {
                pending::<()>().await;
            }
            let next = self.probes.lock().unwrap().pop_front();
            next.unwrap_or(Ok(ProbeOutcome::Unchanged))
        }

        async fn renew_credentials(&self) -> Result<()> {
            self.renew_calls.fetch_add(1, Ordering::SeqCst);
            let next = self.renewals.lock().unwrap().pop_front();
            next.unwrap_or(Ok(()))
        }

        async fn credentials_valid_for(&self) -> Option<Duration> {
            self.valid_for
        }

        fn name(&self) -> String {
            "fake".to_string()
        }
    }

    fn key() -> ConfigKey {
        ConfigKey::new("pay-dev", "DEFAULT_GROUP", "test")
    }

    async fn start(
        backend: Arc<FakeBackend>,
    ) -> (WatchHandle, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = spawn_watch(backend, key(), WatchOptions::default(), move |content| {
            let _ = tx.send(content);
        })
        .await
        .unwrap();
        (handle, rx)
    }

    #[tokio::test(start_paused = true)]
    async fn test_change_on_fourth_cycle_notifies_once() {
        let backend = Arc::new(
            FakeBackend::default()
                .with_fetches(vec![Ok("123".to_string()), Ok("456".to_string())])
                .with_probes(vec![
                    Ok(ProbeOutcome::Unchanged),
                    Ok(ProbeOutcome::Unchanged),
                    Ok(ProbeOutcome::Unchanged),
                    Ok(ProbeOutcome::Changed),
                ]),
        );
        let (handle, mut rx) = start(Arc::clone(&backend)).await;
        assert_eq!(handle.fingerprint(), Fingerprint::of("123"));

        let content = timeout(Duration::from_secs(120), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(content, "456");
        assert_eq!(backend.probe_calls.load(Ordering::SeqCst), 4);
        assert_eq!(handle.fingerprint(), Fingerprint::of("456"));
        assert_eq!(handle.snapshot().content, "456");

        // Later probes carry the new fingerprint and nothing else is delivered.
        sleep(Duration::from_secs(60)).await;
        assert!(rx.try_recv().is_err());
        let seen = backend.probed_fingerprints.lock().unwrap().clone();
        assert_eq!(seen[0], Fingerprint::of("123"));
        assert_eq!(seen.last(), Some(&Fingerprint::of("456")));

        handle.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_reported_change_never_notifies() {
        let backend =
            Arc::new(FakeBackend::default().with_fetches(vec![Ok("123".to_string())]));
        let (handle, mut rx) = start(Arc::clone(&backend)).await;

        sleep(Duration::from_secs(1000)).await;
        assert!(rx.try_recv().is_err());
        assert!(backend.probe_calls.load(Ordering::SeqCst) >= 90);
        assert_eq!(backend.fetch_calls.load(Ordering::SeqCst), 1);
        assert!(handle.is_running());

        handle.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_error_does_not_end_watch() {
        let backend = Arc::new(
            FakeBackend::default()
                .with_fetches(vec![Ok("123".to_string()), Ok("456".to_string())])
                .with_probes(vec![
                    Err(NacosError::Transport("connection reset".to_string())),
                    Ok(ProbeOutcome::Changed),
                ]),
        );
        let (handle, mut rx) = start(Arc::clone(&backend)).await;

        let content = timeout(Duration::from_secs(60), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(content, "456");
        assert_eq!(backend.probe_calls.load(Ordering::SeqCst), 2);

        handle.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_refetch_keeps_previous_fingerprint() {
        let backend = Arc::new(
            FakeBackend::default()
                .with_fetches(vec![
                    Ok("123".to_string()),
                    Err(NacosError::server(500, "busy")),
                    Ok("456".to_string()),
                ])
                .with_probes(vec![Ok(ProbeOutcome::Changed), Ok(ProbeOutcome::Changed)]),
        );
        let (handle, mut rx) = start(Arc::clone(&backend)).await;

        let content = timeout(Duration::from_secs(60), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(content, "456");

        let seen = backend.probed_fingerprints.lock().unwrap().clone();
        assert_eq!(seen[0], Fingerprint::of("123"));
        assert_eq!(seen[1], Fingerprint::of("123"));
        assert!(rx.try_recv().is_err());

        handle.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_identical_content_is_not_delivered() {
        let backend = Arc::new(
            FakeBackend::default()
                .with_fetches(vec![Ok("123".to_string()), Ok("123".to_string())])
                .with_probes(vec![Ok(ProbeOutcome::Changed)]),
        );
        let (handle, mut rx) = start(Arc::clone(&backend)).await;

        sleep(Duration::from_secs(30)).await;
        assert_eq!(backend.fetch_calls.load(Ordering::SeqCst), 2);
        assert!(rx.try_recv().is_err());
        assert_eq!(handle.fingerprint(), Fingerprint::of("123"));

        handle.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_renewal_failure_keeps_polling() {
        let mut probes: Vec<Result<ProbeOutcome>> =
            (0..5).map(|_| Ok(ProbeOutcome::Unchanged)).collect();
        probes.push(Ok(ProbeOutcome::Changed));
        let backend = Arc::new(
            FakeBackend::default()
                .with_fetches(vec![Ok("123".to_string()), Ok("456".to_string())])
                .with_probes(probes)
                .with_renewals(
                    Duration::from_secs(25),
                    vec![Err(NacosError::Auth("login rejected".to_string()))],
                ),
        );
        let (handle, mut rx) = start(Arc::clone(&backend)).await;

        let content = timeout(Duration::from_secs(120), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(content, "456");
        assert!(backend.renew_calls.load(Ordering::SeqCst) >= 2);
        assert!(handle.is_running());

        handle.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_renewal_without_expiring_credentials() {
        let backend =
            Arc::new(FakeBackend::default().with_fetches(vec![Ok("123".to_string())]));
        let (handle, _rx) = start(Arc::clone(&backend)).await;

        sleep(Duration::from_secs(300)).await;
        assert_eq!(backend.renew_calls.load(Ordering::SeqCst), 0);

        handle.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_initial_fetch_failure_is_returned() {
        let backend = Arc::new(
            FakeBackend::default().with_fetches(vec![Err(NacosError::NotFound("test".to_string()))]),
        );
        let result = spawn_watch(
            backend.clone(),
            key(),
            WatchOptions::default(),
            |_content: String| {
                panic!("callback must not run");
            },
        )
        .await;

        assert!(matches!(result, Err(NacosError::NotFound(_))));
        sleep(Duration::from_secs(60)).await;
        assert_eq!(backend.probe_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_abandons_in_flight_probe() {
        let backend = Arc::new(FakeBackend {
            hang_probes: true,
            ..FakeBackend::default().with_fetches(vec![Ok("123".to_string())])
        });
        let (handle, _rx) = start(Arc::clone(&backend)).await;

        sleep(Duration::from_secs(15)).await;
        assert_eq!(backend.probe_calls.load(Ordering::SeqCst), 1);

        timeout(Duration::from_secs(1), handle.stop())
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_handle_keeps_watching() {
        let backend = Arc::new(
            FakeBackend::default()
                .with_fetches(vec![Ok("123".to_string()), Ok("456".to_string())])
                .with_probes(vec![Ok(ProbeOutcome::Unchanged), Ok(ProbeOutcome::Changed)]),
        );
        let (handle, mut rx) = start(Arc::clone(&backend)).await;
        drop(handle);

        let content = timeout(Duration::from_secs(60), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(content, "456");
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_poll_interval() {
        let backend =
            Arc::new(FakeBackend::default().with_fetches(vec![Ok("123".to_string())]));
        let handle = spawn_watch(
            Arc::clone(&backend),
            key(),
            WatchOptions::default().with_poll_interval(Duration::from_secs(1)),
            |_| {},
        )
        .await
        .unwrap();

        sleep(Duration::from_millis(10_500)).await;
        assert_eq!(backend.probe_calls.load(Ordering::SeqCst), 10);

        handle.stop().await.unwrap();
    }
}
