use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

/// Latency samples kept per series; the oldest sample is dropped first.
pub const MAX_LATENCY_SAMPLES: usize = 1_000;

/// Capped ring of latency samples in milliseconds.
#[derive(Debug, Clone, PartialEq)]
pub struct LatencyWindow {
    samples: VecDeque<u64>,
    capacity: usize,
}

impl Default for LatencyWindow {
    fn default() -> Self {
        Self::with_capacity(MAX_LATENCY_SAMPLES)
    }
}

impl LatencyWindow {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, sample_ms: u64) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample_ms);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn samples(&self) -> impl Iterator<Item = u64> + '_ {
        self.samples.iter().copied()
    }

    pub fn mean(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.samples.iter().sum::<u64>() as f64 / self.samples.len() as f64
    }

    pub fn min(&self) -> u64 {
        self.samples.iter().copied().min().unwrap_or(0)
    }

    pub fn max(&self) -> u64 {
        self.samples.iter().copied().max().unwrap_or(0)
    }

    /// Percentile in `[0, 100]`, linearly interpolated over a sorted copy.
    pub fn percentile(&self, percentile: f64) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let mut sorted: Vec<u64> = self.samples.iter().copied().collect();
        sorted.sort_unstable();

        let rank = (percentile.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
        let lower = rank.floor() as usize;
        let upper = rank.ceil() as usize;
        let weight = rank - lower as f64;
        sorted[lower] as f64 + (sorted[upper] as f64 - sorted[lower] as f64) * weight
    }

    pub fn summary(&self) -> LatencySummary {
        LatencySummary {
            count: self.samples.len(),
            mean_ms: self.mean(),
            min_ms: self.min(),
            max_ms: self.max(),
            p95_ms: self.percentile(95.0),
            p99_ms: self.percentile(99.0),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencySummary {
    pub count: usize,
    pub mean_ms: f64,
    pub min_ms: u64,
    pub max_ms: u64,
    pub p95_ms: f64,
    pub p99_ms: f64,
}

/// Point-in-time copy of every counter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub successful_fills: u64,
    pub failed_fills: u64,
    pub cancelled_requests: u64,
    pub exact_matches: u64,
    pub fuzzy_matches: u64,
    pub no_matches: u64,
    /// Percentage of requests that produced a fill, 0-100
    pub success_rate: f64,
    pub response: LatencySummary,
    pub matching: LatencySummary,
    pub filling: LatencySummary,
    pub source_apps: BTreeMap<String, u64>,
    pub source_domains: BTreeMap<String, u64>,
    pub error_types: BTreeMap<String, u64>,
}

impl MetricsSnapshot {
    /// Multi-line human readable report.
    pub fn format_stats(&self) -> String {
        let mut out = String::new();
        out.push_str("=== Autofill statistics ===\n");
        out.push_str(&format!("Total requests: {}\n", self.total_requests));
        out.push_str(&format!("Success rate: {:.2}%\n", self.success_rate));
        out.push_str(&format!(
            "Succeeded: {} | Failed: {} | Cancelled: {}\n\n",
            self.successful_fills, self.failed_fills, self.cancelled_requests
        ));

        out.push_str("Response time:\n");
        out.push_str(&format!("  mean: {:.1} ms\n", self.response.mean_ms));
        out.push_str(&format!("  p95: {:.1} ms\n", self.response.p95_ms));
        out.push_str(&format!("  p99: {:.1} ms\n", self.response.p99_ms));
        out.push_str(&format!("  max: {} ms\n", self.response.max_ms));
        out.push_str(&format!("  min: {} ms\n\n", self.response.min_ms));

        out.push_str("Matching:\n");
        out.push_str(&format!("  exact: {}\n", self.exact_matches));
        out.push_str(&format!("  fuzzy: {}\n", self.fuzzy_matches));
        out.push_str(&format!("  none: {}\n", self.no_matches));

        append_top(&mut out, "Top apps", &self.source_apps, 5);
        append_top(&mut out, "Top domains", &self.source_domains, 5);
        append_top(&mut out, "Error kinds", &self.error_types, usize::MAX);
        out
    }
}

fn append_top(out: &mut String, heading: &str, counts: &BTreeMap<String, u64>, limit: usize) {
    if counts.is_empty() {
        return;
    }
    let mut sorted: Vec<(&String, &u64)> = counts.iter().collect();
    sorted.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));

    out.push_str(&format!("\n{heading}:\n"));
    for (name, count) in sorted.into_iter().take(limit) {
        out.push_str(&format!("  {name}: {count}\n"));
    }
}
