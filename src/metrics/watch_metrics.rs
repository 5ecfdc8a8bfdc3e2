//! Watch metrics tracking using OpenTelemetry.

use opentelemetry::metrics::{Counter, Gauge, Histogram, Meter};
use std::sync::Arc;
use std::time::Instant;

/// Metrics collector for watch operations.
///
/// Cloning is cheap; every watch registered through one client shares the
/// same instruments.
///
/// # Examples
///
/// ```rust,no_run
/// use nacos_watch::metrics::WatchMetrics;
/// use opentelemetry::global;
///
/// let meter = global::meter("nacos-watch");
/// let metrics = WatchMetrics::new(meter);
///
/// let timer = metrics.start_probe();
/// // ... long-poll ...
/// metrics.record_probe_success(timer, false);
/// ```
#[derive(Clone)]
pub struct WatchMetrics {
    probe_attempts: Counter<u64>,
    probe_failures: Counter<u64>,
    probe_duration: Histogram<f64>,
    changes_detected: Counter<u64>,
    notifications: Counter<u64>,
    refetch_failures: Counter<u64>,
    renewal_failures: Counter<u64>,
    seconds_since_change: Gauge<i64>,
    last_change: Arc<parking_lot::Mutex<Instant>>,
}

impl WatchMetrics {
    /// Create a new metrics collector with the provided meter.
    pub fn new(meter: Meter) -> Self {
        let probe_attempts = meter
            .u64_counter("nacos_watch.probe.attempts")
            .with_description("Total number of long-poll probes")
            .build();

        let probe_failures = meter
            .u64_counter("nacos_watch.probe.failures")
            .with_description("Number of probes that ended in an error")
            .build();

        let probe_duration = meter
            .f64_histogram("nacos_watch.probe.duration")
            .with_description("Time the server held each probe in seconds")
            .with_unit("s")
            .build();

        let changes_detected = meter
            .u64_counter("nacos_watch.changes.detected")
            .with_description("Number of probes reporting a change")
            .build();

        let notifications = meter
            .u64_counter("nacos_watch.notifications")
            .with_description("Number of callbacks delivered")
            .build();

        let refetch_failures = meter
            .u64_counter("nacos_watch.refetch.failures")
            .with_description("Number of failed fetches after a detected change")
            .build();

        let renewal_failures = meter
            .u64_counter("nacos_watch.renewal.failures")
            .with_description("Number of failed scheduled credential renewals")
            .build();

        let seconds_since_change = meter
            .i64_gauge("nacos_watch.change.age")
            .with_description("Time since the last delivered change in seconds")
            .with_unit("s")
            .build();

        Self {
            probe_attempts,
            probe_failures,
            probe_duration,
            changes_detected,
            notifications,
            refetch_failures,
            renewal_failures,
            seconds_since_change,
            last_change: Arc::new(parking_lot::Mutex::new(Instant::now())),
        }
    }

    /// Start timing a probe.
    pub fn start_probe(&self) -> Instant {
        self.probe_attempts.add(1, &[]);
        Instant::now()
    }

    /// Record a probe that returned an outcome.
    pub fn record_probe_success(&self, start: Instant, changed: bool) {
        self.probe_duration.record(start.elapsed().as_secs_f64(), &[]);
        if changed {
            self.changes_detected.add(1, &[]);
        }
        self.update_change_age();
    }

    /// Record a probe that failed.
    pub fn record_probe_failure(&self, start: Instant) {
        self.probe_duration.record(start.elapsed().as_secs_f64(), &[]);
        self.probe_failures.add(1, &[]);
    }

    /// Record a failed fetch after a detected change.
    pub fn record_refetch_failure(&self) {
        self.refetch_failures.add(1, &[]);
    }

    /// Record a delivered callback.
    pub fn record_notification(&self) {
        self.notifications.add(1, &[]);
        *self.last_change.lock() = Instant::now();
        self.seconds_since_change.record(0, &[]);
    }

    /// Record a failed scheduled renewal.
    pub fn record_renewal_failure(&self) {
        self.renewal_failures.add(1, &[]);
    }

    /// Refresh the age gauge.
    pub fn update_change_age(&self) {
        let age_secs = self.last_change.lock().elapsed().as_secs() as i64;
        self.seconds_since_change.record(age_secs, &[]);
    }
}
