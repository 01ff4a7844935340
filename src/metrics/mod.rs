//! Process-lifetime autofill metrics.
//!
//! `MetricsCollector` is a cheap, cloneable handle: the engine records into
//! it and the host keeps a clone to read snapshots. Every operation is a
//! counter or ring update under a short lock. Memory stays bounded: latency
//! rings hold [`MAX_LATENCY_SAMPLES`] values and the per-app and per-domain
//! tables hold [`MAX_TRACKED_SOURCES`] keys each.

mod types;

pub use types::{LatencySummary, LatencyWindow, MetricsSnapshot, MAX_LATENCY_SAMPLES};

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Distinct apps (and, separately, domains) counted before the least
/// requested one is dropped to make room.
pub const MAX_TRACKED_SOURCES: usize = 256;

fn bump_source(counts: &mut BTreeMap<String, u64>, source: &str) {
    if let Some(count) = counts.get_mut(source) {
        *count += 1;
        return;
    }
    if counts.len() >= MAX_TRACKED_SOURCES {
        let rarest = counts
            .iter()
            .min_by_key(|(_, count)| **count)
            .map(|(key, _)| key.clone());
        if let Some(rarest) = rarest {
            counts.remove(&rarest);
        }
    }
    counts.insert(source.to_string(), 1);
}

#[derive(Debug, Default)]
struct MetricsState {
    total_requests: u64,
    successful_fills: u64,
    failed_fills: u64,
    cancelled_requests: u64,
    exact_matches: u64,
    fuzzy_matches: u64,
    no_matches: u64,
    response_times: LatencyWindow,
    matching_times: LatencyWindow,
    filling_times: LatencyWindow,
    source_apps: BTreeMap<String, u64>,
    source_domains: BTreeMap<String, u64>,
    error_types: BTreeMap<String, u64>,
}

impl MetricsState {
    fn success_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.successful_fills as f64 / self.total_requests as f64 * 100.0
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MetricsCollector {
    inner: Arc<Mutex<MetricsState>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request(&self, package_name: &str, domain: Option<&str>) {
        let total = {
            let mut state = self.inner.lock();
            state.total_requests += 1;
            bump_source(&mut state.source_apps, package_name);
            if let Some(domain) = domain.filter(|d| !d.is_empty()) {
                bump_source(&mut state.source_domains, domain);
            }
            state.total_requests
        };

        debug!(
            target: "autofill::performance",
            package = package_name,
            domain = domain.unwrap_or("N/A"),
            total_requests = total,
            "request recorded"
        );
    }

    /// A request that produced matches. A zero matching time is not recorded.
    pub fn record_success(&self, response_ms: u64, matching_ms: u64) {
        let rate = {
            let mut state = self.inner.lock();
            state.successful_fills += 1;
            state.response_times.push(response_ms);
            if matching_ms > 0 {
                state.matching_times.push(matching_ms);
            }
            state.success_rate()
        };

        info!(
            target: "autofill::performance",
            response_ms,
            success_rate = rate,
            "fill succeeded"
        );
    }

    /// Time the platform layer spent filling the form with a chosen match.
    /// The engine stops at ranking, so this is reported by the host.
    pub fn record_fill_time(&self, filling_ms: u64) {
        if filling_ms > 0 {
            self.inner.lock().filling_times.push(filling_ms);
        }
    }

    pub fn record_failure(&self, error_kind: &str) {
        let failures = {
            let mut state = self.inner.lock();
            state.failed_fills += 1;
            *state.error_types.entry(error_kind.to_string()).or_default() += 1;
            state.failed_fills
        };

        warn!(
            target: "autofill::performance",
            error_kind,
            total_failures = failures,
            "fill failed"
        );
    }

    pub fn record_cancellation(&self) {
        let cancelled = {
            let mut state = self.inner.lock();
            state.cancelled_requests += 1;
            state.cancelled_requests
        };
        debug!(target: "autofill::performance", total_cancellations = cancelled, "request cancelled");
    }

    pub fn record_exact_match(&self) {
        self.inner.lock().exact_matches += 1;
    }

    pub fn record_fuzzy_match(&self) {
        self.inner.lock().fuzzy_matches += 1;
    }

    pub fn record_no_match(&self) {
        let none = {
            let mut state = self.inner.lock();
            state.no_matches += 1;
            state.no_matches
        };
        debug!(target: "autofill::matching", total_no_matches = none, "no matching credential");
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let state = self.inner.lock();
        MetricsSnapshot {
            total_requests: state.total_requests,
            successful_fills: state.successful_fills,
            failed_fills: state.failed_fills,
            cancelled_requests: state.cancelled_requests,
            exact_matches: state.exact_matches,
            fuzzy_matches: state.fuzzy_matches,
            no_matches: state.no_matches,
            success_rate: state.success_rate(),
            response: state.response_times.summary(),
            matching: state.matching_times.summary(),
            filling: state.filling_times.summary(),
            source_apps: state.source_apps.clone(),
            source_domains: state.source_domains.clone(),
            error_types: state.error_types.clone(),
        }
    }

    pub fn format_stats(&self) -> String {
        self.snapshot().format_stats()
    }

    pub fn reset(&self) {
        *self.inner.lock() = MetricsState::default();
        info!(target: "autofill::performance", "metrics reset");
    }
}

/// Measures one operation and logs its duration when finished.
#[derive(Debug)]
pub struct PerformanceTracker {
    operation: &'static str,
    started: Instant,
}

impl PerformanceTracker {
    pub fn start(operation: &'static str) -> Self {
        Self {
            operation,
            started: Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    pub fn finish(self) -> u64 {
        let duration_ms = self.elapsed_ms();
        debug!(
            target: "autofill::performance",
            operation = self.operation,
            duration_ms,
            "operation finished"
        );
        duration_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_request_counts_sources() {
        let metrics = MetricsCollector::new();
        metrics.record_request("com.example.app", Some("example.com"));
        metrics.record_request("com.example.app", None);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_requests, 2);
        assert_eq!(snapshot.source_apps.get("com.example.app"), Some(&2));
        assert_eq!(snapshot.source_domains.get("example.com"), Some(&1));
        assert_eq!(snapshot.source_domains.len(), 1);
    }

    #[test]
    fn test_record_success_keeps_nonzero_series() {
        let metrics = MetricsCollector::new();
        metrics.record_success(100, 50);
        metrics.record_success(200, 0);
        metrics.record_fill_time(30);
        metrics.record_fill_time(0);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.successful_fills, 2);
        assert_eq!(snapshot.response.count, 2);
        assert_eq!(snapshot.matching.count, 1);
        assert_eq!(snapshot.filling.count, 1);
        assert_eq!(snapshot.response.mean_ms, 150.0);
    }

    #[test]
    fn test_source_tables_stay_bounded() {
        let metrics = MetricsCollector::new();
        metrics.record_request("com.busy", Some("busy.com"));
        metrics.record_request("com.busy", Some("busy.com"));
        for i in 0..(MAX_TRACKED_SOURCES + 20) {
            metrics.record_request(&format!("com.app{i}"), Some(&format!("site{i}.com")));
        }

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_requests, MAX_TRACKED_SOURCES as u64 + 22);
        assert_eq!(snapshot.source_apps.len(), MAX_TRACKED_SOURCES);
        assert_eq!(snapshot.source_domains.len(), MAX_TRACKED_SOURCES);
        assert_eq!(snapshot.source_apps.get("com.busy"), Some(&2));
        assert_eq!(snapshot.source_domains.get("busy.com"), Some(&2));
        assert!(snapshot.source_apps.contains_key(&format!("com.app{}", MAX_TRACKED_SOURCES + 19)));
    }

    #[test]
    fn test_failures_grouped_by_kind() {
        let metrics = MetricsCollector::new();
        metrics.record_failure("DatabaseError");
        metrics.record_failure("TimeoutError");
        metrics.record_failure("DatabaseError");

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.failed_fills, 3);
        assert_eq!(snapshot.error_types.get("DatabaseError"), Some(&2));
        assert_eq!(snapshot.error_types.get("TimeoutError"), Some(&1));
    }

    #[test]
    fn test_success_rate() {
        let metrics = MetricsCollector::new();
        for _ in 0..10 {
            metrics.record_request("com.example", None);
        }
        for _ in 0..7 {
            metrics.record_success(100, 0);
        }
        for _ in 0..3 {
            metrics.record_failure("UnknownError");
        }

        assert!((metrics.snapshot().success_rate - 70.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_clones_share_state_and_reset() {
        let metrics = MetricsCollector::new();
        let handle = metrics.clone();
        handle.record_cancellation();
        handle.record_exact_match();
        handle.record_fuzzy_match();
        handle.record_no_match();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.cancelled_requests, 1);
        assert_eq!(snapshot.exact_matches, 1);
        assert_eq!(snapshot.fuzzy_matches, 1);
        assert_eq!(snapshot.no_matches, 1);

        metrics.reset();
        assert_eq!(handle.snapshot(), MetricsSnapshot::default());
    }

    #[test]
    fn test_latency_window_drops_oldest() {
        let mut window = LatencyWindow::default();
        for sample in 0..(MAX_LATENCY_SAMPLES as u64 + 5) {
            window.push(sample);
        }

        assert_eq!(window.len(), MAX_LATENCY_SAMPLES);
        assert_eq!(window.min(), 5);
        assert_eq!(window.max(), MAX_LATENCY_SAMPLES as u64 + 4);
    }

    #[test]
    fn test_percentiles_interpolate() {
        let mut window = LatencyWindow::with_capacity(10);
        for sample in [10, 20, 30, 40, 50] {
            window.push(sample);
        }

        assert_eq!(window.percentile(50.0), 30.0);
        assert_eq!(window.percentile(95.0), 48.0);
        assert_eq!(window.percentile(100.0), 50.0);
        assert_eq!(window.percentile(0.0), 10.0);
        assert_eq!(LatencyWindow::default().percentile(95.0), 0.0);
    }

    #[test]
    fn test_format_stats_lists_top_sources() {
        let metrics = MetricsCollector::new();
        metrics.record_request("com.a", Some("a.com"));
        metrics.record_request("com.b", Some("a.com"));
        metrics.record_failure("DatabaseError");

        let report = metrics.format_stats();
        assert!(report.contains("Total requests: 2"));
        assert!(report.contains("Top apps:"));
        assert!(report.contains("  a.com: 2"));
        assert!(report.contains("  DatabaseError: 1"));
    }
}
