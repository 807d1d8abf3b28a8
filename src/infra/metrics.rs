//! Lock-free metrics collection and periodic reporting
//!
//! The controller tick records into atomics without locking. The periodic
//! report swaps its window counters to zero; `snapshot()` reads without
//! resetting and backs the Prometheus endpoint.
//!
//! All atomics use Relaxed ordering: these are statistics only, never read
//! back into control decisions.

use crate::domain::types::{CrossingEvent, Direction, DoorState, OccupancyCount, PersonKind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Prometheus-style exponential bucket boundaries (microseconds)
/// Buckets: ≤100, ≤200, ≤400, ≤800, ≤1600, ≤3200, ≤6400, ≤12800, ≤25600, ≤51200, >51200
const BUCKET_BOUNDS: [u64; 10] = [100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600, 51200];
const NUM_BUCKETS: usize = 11;

/// Compute bucket index for a latency value using binary search
#[inline]
fn bucket_index(latency_us: u64) -> usize {
    BUCKET_BOUNDS.partition_point(|&bound| bound < latency_us)
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
fn swap_buckets(buckets: &[AtomicU64; NUM_BUCKETS]) -> [u64; NUM_BUCKETS] {
    let mut result = [0u64; NUM_BUCKETS];
    for (i, bucket) in buckets.iter().enumerate() {
        result[i] = bucket.swap(0, Ordering::Relaxed);
    }
    result
}

/// Load all bucket values without resetting
#[inline]
fn load_buckets(buckets: &[AtomicU64; NUM_BUCKETS]) -> [u64; NUM_BUCKETS] {
    let mut result = [0u64; NUM_BUCKETS];
    for (i, bucket) in buckets.iter().enumerate() {
        result[i] = bucket.load(Ordering::Relaxed);
    }
    result
}

/// Compute percentile from histogram buckets
/// Returns the upper bound of the bucket containing the percentile
fn percentile_from_buckets(buckets: &[u64; NUM_BUCKETS], percentile: f64) -> u64 {
    let total: u64 = buckets.iter().sum();
    if total == 0 {
        return 0;
    }

    let target = (total as f64 * percentile) as u64;
    let mut cumulative = 0u64;

    // Upper bounds for each bucket (last bucket uses 2x the previous bound)
    const BUCKET_UPPER_BOUNDS: [u64; NUM_BUCKETS] =
        [100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600, 51200, 102400];

    for (i, &count) in buckets.iter().enumerate() {
        cumulative += count;
        if cumulative >= target {
            return BUCKET_UPPER_BOUNDS[i];
        }
    }
    BUCKET_UPPER_BOUNDS[NUM_BUCKETS - 1]
}

/// Lock-free metrics collector
///
/// All recording operations are lock-free using atomics.
/// The `report()` method atomically swaps counters to get a consistent snapshot.
pub struct Metrics {
    /// Total controller ticks (monotonic)
    ticks_total: AtomicU64,
    /// Ticks since last report (reset on report)
    ticks_since_report: AtomicU64,
    /// Sum of tick latencies in microseconds (reset on report)
    tick_latency_sum_us: AtomicU64,
    /// Max tick latency in microseconds (reset on report)
    tick_latency_max_us: AtomicU64,
    /// Tick latency histogram buckets (reset on report)
    tick_latency_buckets: [AtomicU64; NUM_BUCKETS],
    /// Cumulative tick latency histogram for Prometheus (never reset)
    tick_latency_buckets_total: [AtomicU64; NUM_BUCKETS],
    tick_latency_sum_total_us: AtomicU64,
    /// Crossings, indexed by `crossing_index`
    crossings: [AtomicU64; 4],
    /// Occupancy resets after the no-motion timeout
    presence_resets_total: AtomicU64,
    /// Sensor payloads accepted / rejected
    signal_updates_total: AtomicU64,
    signal_rejected_total: AtomicU64,
    /// Alone episodes that crossed the alert threshold
    child_alone_alerts_total: AtomicU64,
    notifications_sent: AtomicU64,
    notifications_dropped: AtomicU64,
    status_dropped: AtomicU64,
    actuator_cmds_sent: AtomicU64,
    actuator_cmds_dropped: AtomicU64,
    actuator_cmds_failed: AtomicU64,
    /// Actuator queue delay histogram (time from enqueue to worker pickup)
    actuator_queue_delay_buckets: [AtomicU64; NUM_BUCKETS],
    actuator_queue_delay_sum_us: AtomicU64,
    actuator_queue_delay_max_us: AtomicU64,
    /// Actuator send latency histogram (time spent in the actuator call)
    actuator_latency_buckets: [AtomicU64; NUM_BUCKETS],
    actuator_latency_max_us: AtomicU64,
    /// Gauges
    adults: AtomicU64,
    children: AtomicU64,
    door_state: AtomicU64,
    actuator_on: AtomicU64,
    /// Last report time (only accessed from reporter, not atomic)
    last_report_time: parking_lot::Mutex<Instant>,
}

#[inline]
fn crossing_index(event: CrossingEvent) -> usize {
    match (event.person, event.direction) {
        (PersonKind::Adult, Direction::Entering) => 0,
        (PersonKind::Adult, Direction::Exiting) => 1,
        (PersonKind::Child, Direction::Entering) => 2,
        (PersonKind::Child, Direction::Exiting) => 3,
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            ticks_total: AtomicU64::new(0),
            ticks_since_report: AtomicU64::new(0),
            tick_latency_sum_us: AtomicU64::new(0),
            tick_latency_max_us: AtomicU64::new(0),
            tick_latency_buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            tick_latency_buckets_total: std::array::from_fn(|_| AtomicU64::new(0)),
            tick_latency_sum_total_us: AtomicU64::new(0),
            crossings: std::array::from_fn(|_| AtomicU64::new(0)),
            presence_resets_total: AtomicU64::new(0),
            signal_updates_total: AtomicU64::new(0),
            signal_rejected_total: AtomicU64::new(0),
            child_alone_alerts_total: AtomicU64::new(0),
            notifications_sent: AtomicU64::new(0),
            notifications_dropped: AtomicU64::new(0),
            status_dropped: AtomicU64::new(0),
            actuator_cmds_sent: AtomicU64::new(0),
            actuator_cmds_dropped: AtomicU64::new(0),
            actuator_cmds_failed: AtomicU64::new(0),
            actuator_queue_delay_buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            actuator_queue_delay_sum_us: AtomicU64::new(0),
            actuator_queue_delay_max_us: AtomicU64::new(0),
            actuator_latency_buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            actuator_latency_max_us: AtomicU64::new(0),
            adults: AtomicU64::new(0),
            children: AtomicU64::new(0),
            door_state: AtomicU64::new(DoorState::Free.code()),
            actuator_on: AtomicU64::new(0),
            last_report_time: parking_lot::Mutex::new(Instant::now()),
        }
    }

    /// Record one controller tick with its processing latency (lock-free)
    #[inline]
    pub fn record_tick(&self, latency_us: u64) {
        self.ticks_total.fetch_add(1, Ordering::Relaxed);
        self.ticks_since_report.fetch_add(1, Ordering::Relaxed);
        self.tick_latency_sum_us.fetch_add(latency_us, Ordering::Relaxed);
        self.tick_latency_sum_total_us.fetch_add(latency_us, Ordering::Relaxed);

        let bucket = bucket_index(latency_us);
        self.tick_latency_buckets[bucket].fetch_add(1, Ordering::Relaxed);
        self.tick_latency_buckets_total[bucket].fetch_add(1, Ordering::Relaxed);

        update_atomic_max(&self.tick_latency_max_us, latency_us);
    }

    #[inline]
    pub fn ticks_total(&self) -> u64 {
        self.ticks_total.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn record_crossing(&self, event: CrossingEvent) {
        self.crossings[crossing_index(event)].fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn crossings(&self, person: PersonKind, direction: Direction) -> u64 {
        self.crossings[crossing_index(CrossingEvent::new(person, direction))]
            .load(Ordering::Relaxed)
    }

    #[inline]
    pub fn record_presence_reset(&self) {
        self.presence_resets_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn presence_resets_total(&self) -> u64 {
        self.presence_resets_total.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn record_signal_update(&self) {
        self.signal_updates_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_signal_rejected(&self) {
        self.signal_rejected_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_child_alone_alert(&self) {
        self.child_alone_alerts_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn child_alone_alerts_total(&self) -> u64 {
        self.child_alone_alerts_total.load(Ordering::Relaxed)
    }

    /// Record a notification published by the notifier
    #[inline]
    pub fn record_notification_sent(&self) {
        self.notifications_sent.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a notification dropped due to channel full (lock-free)
    #[inline]
    pub fn record_notification_dropped(&self) {
        self.notifications_dropped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn notifications_dropped(&self) -> u64 {
        self.notifications_dropped.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn record_status_dropped(&self) {
        self.status_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an actuator command accepted by the actuator (lock-free)
    #[inline]
    pub fn record_actuator_cmd_sent(&self, latency_us: u64) {
        self.actuator_cmds_sent.fetch_add(1, Ordering::Relaxed);
        let bucket = bucket_index(latency_us);
        self.actuator_latency_buckets[bucket].fetch_add(1, Ordering::Relaxed);
        update_atomic_max(&self.actuator_latency_max_us, latency_us);
    }

    #[inline]
    pub fn actuator_cmds_sent(&self) -> u64 {
        self.actuator_cmds_sent.load(Ordering::Relaxed)
    }

    /// Record an actuator command dropped due to channel full (lock-free)
    #[inline]
    pub fn record_actuator_cmd_dropped(&self) {
        self.actuator_cmds_dropped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn actuator_cmds_dropped(&self) -> u64 {
        self.actuator_cmds_dropped.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn record_actuator_cmd_failed(&self) {
        self.actuator_cmds_failed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn actuator_cmds_failed(&self) -> u64 {
        self.actuator_cmds_failed.load(Ordering::Relaxed)
    }

    /// Record actuator command queue delay (time from enqueue to worker pickup)
    #[inline]
    pub fn record_actuator_queue_delay(&self, delay_us: u64) {
        let bucket = bucket_index(delay_us);
        self.actuator_queue_delay_buckets[bucket].fetch_add(1, Ordering::Relaxed);
        self.actuator_queue_delay_sum_us.fetch_add(delay_us, Ordering::Relaxed);
        update_atomic_max(&self.actuator_queue_delay_max_us, delay_us);
    }

    #[inline]
    pub fn set_occupancy(&self, count: OccupancyCount) {
        self.adults.store(u64::from(count.adults), Ordering::Relaxed);
        self.children.store(u64::from(count.children), Ordering::Relaxed);
    }

    #[inline]
    pub fn set_door_state(&self, state: DoorState) {
        self.door_state.store(state.code(), Ordering::Relaxed);
    }

    #[inline]
    pub fn set_actuator_on(&self, is_on: bool) {
        self.actuator_on.store(u64::from(is_on), Ordering::Relaxed);
    }

    /// Point-in-time counters and gauges for the Prometheus endpoint
    ///
    /// Unlike `report()` this never resets anything.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            ticks_total: self.ticks_total.load(Ordering::Relaxed),
            tick_lat_buckets_total: load_buckets(&self.tick_latency_buckets_total),
            tick_latency_sum_total_us: self.tick_latency_sum_total_us.load(Ordering::Relaxed),
            adult_entries: self.crossings[0].load(Ordering::Relaxed),
            adult_exits: self.crossings[1].load(Ordering::Relaxed),
            child_entries: self.crossings[2].load(Ordering::Relaxed),
            child_exits: self.crossings[3].load(Ordering::Relaxed),
            presence_resets_total: self.presence_resets_total.load(Ordering::Relaxed),
            signal_updates_total: self.signal_updates_total.load(Ordering::Relaxed),
            signal_rejected_total: self.signal_rejected_total.load(Ordering::Relaxed),
            child_alone_alerts_total: self.child_alone_alerts_total.load(Ordering::Relaxed),
            notifications_sent: self.notifications_sent.load(Ordering::Relaxed),
            notifications_dropped: self.notifications_dropped.load(Ordering::Relaxed),
            status_dropped: self.status_dropped.load(Ordering::Relaxed),
            actuator_cmds_sent: self.actuator_cmds_sent.load(Ordering::Relaxed),
            actuator_cmds_dropped: self.actuator_cmds_dropped.load(Ordering::Relaxed),
            actuator_cmds_failed: self.actuator_cmds_failed.load(Ordering::Relaxed),
            adults: self.adults.load(Ordering::Relaxed),
            children: self.children.load(Ordering::Relaxed),
            door_state: self.door_state.load(Ordering::Relaxed),
            actuator_on: self.actuator_on.load(Ordering::Relaxed) != 0,
        }
    }

    /// Calculate and return metrics summary, then reset periodic counters
    ///
    /// This is the only method that resets counters. It uses atomic swap
    /// to get a consistent snapshot while allowing concurrent updates.
    pub fn report(&self) -> MetricsSummary {
        let ticks_count = self.ticks_since_report.swap(0, Ordering::Relaxed);
        let latency_sum = self.tick_latency_sum_us.swap(0, Ordering::Relaxed);
        let max_latency = self.tick_latency_max_us.swap(0, Ordering::Relaxed);
        let lat_buckets = swap_buckets(&self.tick_latency_buckets);

        let queue_delay_buckets = swap_buckets(&self.actuator_queue_delay_buckets);
        let queue_delay_sum = self.actuator_queue_delay_sum_us.swap(0, Ordering::Relaxed);
        let queue_delay_max = self.actuator_queue_delay_max_us.swap(0, Ordering::Relaxed);
        let queue_delay_count: u64 = queue_delay_buckets.iter().sum();
        let queue_delay_avg =
            if queue_delay_count > 0 { queue_delay_sum / queue_delay_count } else { 0 };

        let actuator_lat_buckets = swap_buckets(&self.actuator_latency_buckets);
        let actuator_lat_max = self.actuator_latency_max_us.swap(0, Ordering::Relaxed);

        let elapsed = {
            let mut last = self.last_report_time.lock();
            let elapsed = last.elapsed();
            *last = Instant::now();
            elapsed
        };

        let ticks_per_sec = if elapsed.as_secs_f64() > 0.0 {
            ticks_count as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };

        let avg_latency = if ticks_count > 0 { latency_sum / ticks_count } else { 0 };

        MetricsSummary {
            totals: self.snapshot(),
            ticks_per_sec,
            avg_tick_latency_us: avg_latency,
            max_tick_latency_us: max_latency,
            tick_lat_p50_us: percentile_from_buckets(&lat_buckets, 0.50),
            tick_lat_p99_us: percentile_from_buckets(&lat_buckets, 0.99),
            tick_lat_buckets: lat_buckets,
            actuator_queue_delay_avg_us: queue_delay_avg,
            actuator_queue_delay_max_us: queue_delay_max,
            actuator_queue_delay_p99_us: percentile_from_buckets(&queue_delay_buckets, 0.99),
            actuator_lat_max_us: actuator_lat_max,
            actuator_lat_p99_us: percentile_from_buckets(&actuator_lat_buckets, 0.99),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Number of histogram buckets (exported for Prometheus formatting)
pub const METRICS_NUM_BUCKETS: usize = NUM_BUCKETS;

/// Exported bucket bounds for Prometheus formatting
pub const METRICS_BUCKET_BOUNDS: [u64; 10] = BUCKET_BOUNDS;

/// Monotonic counters and gauges at one instant
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsSnapshot {
    pub ticks_total: u64,
    /// Cumulative tick latency histogram (same bounds as the periodic one)
    pub tick_lat_buckets_total: [u64; NUM_BUCKETS],
    pub tick_latency_sum_total_us: u64,
    pub adult_entries: u64,
    pub adult_exits: u64,
    pub child_entries: u64,
    pub child_exits: u64,
    pub presence_resets_total: u64,
    pub signal_updates_total: u64,
    pub signal_rejected_total: u64,
    pub child_alone_alerts_total: u64,
    pub notifications_sent: u64,
    pub notifications_dropped: u64,
    pub status_dropped: u64,
    pub actuator_cmds_sent: u64,
    pub actuator_cmds_dropped: u64,
    pub actuator_cmds_failed: u64,
    pub adults: u64,
    pub children: u64,
    /// Door state code (0=free, 1=check_low, 2=check_high, 3=occupied_child, 4=occupied_adult)
    pub door_state: u64,
    pub actuator_on: bool,
}

#[derive(Debug)]
pub struct MetricsSummary {
    pub totals: MetricsSnapshot,
    pub ticks_per_sec: f64,
    pub avg_tick_latency_us: u64,
    pub max_tick_latency_us: u64,
    pub tick_lat_p50_us: u64,
    pub tick_lat_p99_us: u64,
    /// Tick latency histogram buckets
    /// Bounds: ≤100, ≤200, ≤400, ≤800, ≤1600, ≤3200, ≤6400, ≤12800, ≤25600, ≤51200, >51200 µs
    pub tick_lat_buckets: [u64; NUM_BUCKETS],
    pub actuator_queue_delay_avg_us: u64,
    pub actuator_queue_delay_max_us: u64,
    pub actuator_queue_delay_p99_us: u64,
    pub actuator_lat_max_us: u64,
    pub actuator_lat_p99_us: u64,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            ticks_total = %self.totals.ticks_total,
            ticks_per_sec = format!("{:.1}", self.ticks_per_sec),
            avg_tick_us = %self.avg_tick_latency_us,
            max_tick_us = %self.max_tick_latency_us,
            p99_tick_us = %self.tick_lat_p99_us,
            adults = %self.totals.adults,
            children = %self.totals.children,
            actuator_on = %self.totals.actuator_on,
            actuator_cmds = %self.totals.actuator_cmds_sent,
            actuator_failed = %self.totals.actuator_cmds_failed,
            actuator_p99_us = %self.actuator_lat_p99_us,
            notifications = %self.totals.notifications_sent,
            dropped = %(self.totals.notifications_dropped + self.totals.actuator_cmds_dropped),
            "metrics"
        );
    }
}
