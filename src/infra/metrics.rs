//! Lock-free metrics collection and periodic reporting
//!
//! Uses atomics for hot-path operations to avoid mutex contention.
//! All counter updates are lock-free; reporting swaps the periodic counters.
//!
//! NOTE: All atomics use Relaxed ordering intentionally. These are statistical
//! counters only and must not be used for coordination.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Prometheus-style exponential bucket boundaries (microseconds)
/// Buckets: ≤100, ≤200, ≤400, ≤800, ≤1600, ≤3200, ≤6400, ≤12800, ≤25600, ≤51200, >51200
pub const METRICS_BUCKET_BOUNDS: [u64; 10] =
    [100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600, 51200];
pub const METRICS_NUM_BUCKETS: usize = 11;

/// Compute bucket index for a latency value using binary search
#[inline]
fn bucket_index(latency_us: u64) -> usize {
    METRICS_BUCKET_BOUNDS.partition_point(|&bound| bound < latency_us)
}

/// Update an atomic max value using compare-and-swap loop
#[inline]
fn update_atomic_max(atomic_max: &AtomicU64, new_value: u64) {
    let mut current_max = atomic_max.load(Ordering::Relaxed);
    while new_value > current_max {
        match atomic_max.compare_exchange_weak(
            current_max,
            new_value,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(actual) => current_max = actual,
        }
    }
}

/// Swap all buckets to zero and return their values
#[inline]
fn swap_buckets(buckets: &[AtomicU64; METRICS_NUM_BUCKETS]) -> [u64; METRICS_NUM_BUCKETS] {
    let mut result = [0u64; METRICS_NUM_BUCKETS];
    for (i, bucket) in buckets.iter().enumerate() {
        result[i] = bucket.swap(0, Ordering::Relaxed);
    }
    result
}

/// Compute percentile from histogram buckets
/// Returns the upper bound of the bucket containing the percentile
fn percentile_from_buckets(buckets: &[u64; METRICS_NUM_BUCKETS], percentile: f64) -> u64 {
    let total: u64 = buckets.iter().sum();
    if total == 0 {
        return 0;
    }

    let target = (total as f64 * percentile) as u64;
    let mut cumulative = 0u64;

    // Upper bounds for each bucket (last bucket uses 2x the previous bound)
    const BUCKET_UPPER_BOUNDS: [u64; METRICS_NUM_BUCKETS] =
        [100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600, 51200, 102400];

    for (i, &count) in buckets.iter().enumerate() {
        cumulative += count;
        if cumulative >= target {
            return BUCKET_UPPER_BOUNDS[i];
        }
    }
    BUCKET_UPPER_BOUNDS[METRICS_NUM_BUCKETS - 1]
}

/// Lock-free metrics collector
pub struct Metrics {
    /// Total signals ever processed (monotonic)
    signals_total: AtomicU64,
    /// Signals since last report (reset on report)
    signals_since_report: AtomicU64,
    /// Sum of processing latencies in microseconds (reset on report)
    latency_sum_us: AtomicU64,
    /// Max processing latency in microseconds (reset on report)
    latency_max_us: AtomicU64,
    /// Signal processing latency histogram (reset on report)
    latency_buckets: [AtomicU64; METRICS_NUM_BUCKETS],
    entered_total: AtomicU64,
    exited_total: AtomicU64,
    failures_total: AtomicU64,
    /// Enter/exit signals for regions not in the registry
    unknown_region_total: AtomicU64,
    position_updates_total: AtomicU64,
    location_errors_total: AtomicU64,
    /// Signals dropped because the monitor channel was full
    signals_dropped: AtomicU64,
    /// Render notifications dropped because the renderer lagged
    render_dropped: AtomicU64,
    /// Add requests rejected by the registry or the platform
    region_rejections_total: AtomicU64,
    /// Currently monitored regions (gauge)
    regions_monitored: AtomicU64,
    /// Last report time (only accessed from reporter)
    last_report_time: parking_lot::Mutex<Instant>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            signals_total: AtomicU64::new(0),
            signals_since_report: AtomicU64::new(0),
            latency_sum_us: AtomicU64::new(0),
            latency_max_us: AtomicU64::new(0),
            latency_buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            entered_total: AtomicU64::new(0),
            exited_total: AtomicU64::new(0),
            failures_total: AtomicU64::new(0),
            unknown_region_total: AtomicU64::new(0),
            position_updates_total: AtomicU64::new(0),
            location_errors_total: AtomicU64::new(0),
            signals_dropped: AtomicU64::new(0),
            render_dropped: AtomicU64::new(0),
            region_rejections_total: AtomicU64::new(0),
            regions_monitored: AtomicU64::new(0),
            last_report_time: parking_lot::Mutex::new(Instant::now()),
        }
    }

    /// Record a processed signal with its handling latency
    #[inline]
    pub fn record_signal_processed(&self, latency_us: u64) {
        self.signals_total.fetch_add(1, Ordering::Relaxed);
        self.signals_since_report.fetch_add(1, Ordering::Relaxed);
        self.latency_sum_us.fetch_add(latency_us, Ordering::Relaxed);
        update_atomic_max(&self.latency_max_us, latency_us);
        self.latency_buckets[bucket_index(latency_us)].fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_entered(&self) {
        self.entered_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_exited(&self) {
        self.exited_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_monitoring_failure(&self) {
        self.failures_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_unknown_region(&self) {
        self.unknown_region_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_position_update(&self) {
        self.position_updates_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_location_error(&self) {
        self.location_errors_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_signal_dropped(&self) {
        self.signals_dropped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_render_dropped(&self) {
        self.render_dropped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_region_rejected(&self) {
        self.region_rejections_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn set_regions_monitored(&self, count: usize) {
        self.regions_monitored.store(count as u64, Ordering::Relaxed);
    }

    pub fn signals_total(&self) -> u64 {
        self.signals_total.load(Ordering::Relaxed)
    }

    pub fn unknown_region_total(&self) -> u64 {
        self.unknown_region_total.load(Ordering::Relaxed)
    }

    pub fn signals_dropped(&self) -> u64 {
        self.signals_dropped.load(Ordering::Relaxed)
    }

    pub fn render_dropped(&self) -> u64 {
        self.render_dropped.load(Ordering::Relaxed)
    }

    pub fn regions_monitored(&self) -> u64 {
        self.regions_monitored.load(Ordering::Relaxed)
    }

    /// Produce a summary and reset the periodic counters
    pub fn report(&self, event_log_size: usize) -> MetricsSummary {
        let signals_count = self.signals_since_report.swap(0, Ordering::Relaxed);
        let latency_sum = self.latency_sum_us.swap(0, Ordering::Relaxed);
        let max_latency = self.latency_max_us.swap(0, Ordering::Relaxed);
        let lat_buckets = swap_buckets(&self.latency_buckets);

        let elapsed = {
            let mut last = self.last_report_time.lock();
            let elapsed = last.elapsed();
            *last = Instant::now();
            elapsed
        };

        let signals_per_sec = if elapsed.as_secs_f64() > 0.0 {
            signals_count as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };
        let avg_latency = if signals_count > 0 { latency_sum / signals_count } else { 0 };

        MetricsSummary {
            signals_total: self.signals_total.load(Ordering::Relaxed),
            signals_per_sec,
            avg_latency_us: avg_latency,
            max_latency_us: max_latency,
            lat_buckets,
            lat_p50_us: percentile_from_buckets(&lat_buckets, 0.50),
            lat_p99_us: percentile_from_buckets(&lat_buckets, 0.99),
            entered_total: self.entered_total.load(Ordering::Relaxed),
            exited_total: self.exited_total.load(Ordering::Relaxed),
            failures_total: self.failures_total.load(Ordering::Relaxed),
            unknown_region_total: self.unknown_region_total.load(Ordering::Relaxed),
            position_updates_total: self.position_updates_total.load(Ordering::Relaxed),
            location_errors_total: self.location_errors_total.load(Ordering::Relaxed),
            signals_dropped: self.signals_dropped.load(Ordering::Relaxed),
            render_dropped: self.render_dropped.load(Ordering::Relaxed),
            region_rejections_total: self.region_rejections_total.load(Ordering::Relaxed),
            regions_monitored: self.regions_monitored.load(Ordering::Relaxed),
            event_log_size,
        }
    }
}

/// Point-in-time metrics snapshot
#[derive(Debug, Clone)]
pub struct MetricsSummary {
    pub signals_total: u64,
    pub signals_per_sec: f64,
    pub avg_latency_us: u64,
    pub max_latency_us: u64,
    pub lat_buckets: [u64; METRICS_NUM_BUCKETS],
    pub lat_p50_us: u64,
    pub lat_p99_us: u64,
    pub entered_total: u64,
    pub exited_total: u64,
    pub failures_total: u64,
    pub unknown_region_total: u64,
    pub position_updates_total: u64,
    pub location_errors_total: u64,
    pub signals_dropped: u64,
    pub render_dropped: u64,
    pub region_rejections_total: u64,
    pub regions_monitored: u64,
    pub event_log_size: usize,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            signals_total = %self.signals_total,
            signals_per_sec = format!("{:.1}", self.signals_per_sec),
            avg_latency_us = %self.avg_latency_us,
            max_latency_us = %self.max_latency_us,
            p99_us = %self.lat_p99_us,
            entered = %self.entered_total,
            exited = %self.exited_total,
            failures = %self.failures_total,
            unknown_region = %self.unknown_region_total,
            regions = %self.regions_monitored,
            events = %self.event_log_size,
            "metrics"
        );
    }
}
