//! Telemetry collection for backend call latency.
//!
//! The session samples every Nth call and records how long it spent waiting
//! for the connection lock and how long the request/reply exchange took.
//! Samples are summarized at unmount.
//!
//! # Example
//!
//! ```rust,ignore
//! use nefs_bridge::telemetry::CallCollector;
//!
//! let collector = CallCollector::new();
//! // ... run filesystem operations with a trace rate set ...
//! collector.print_summary();
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Collects and aggregates sampled call timings.
#[derive(Debug, Clone)]
pub struct CallCollector {
    calls: Arc<Mutex<Vec<CollectedCall>>>,
}

/// One sampled call.
#[derive(Debug, Clone)]
pub struct CollectedCall {
    pub unique: u64,
    pub op_name: String,
    /// Time spent waiting for the session lock.
    pub wait_ns: u64,
    /// Time the lock was held: request write plus reply read.
    pub wire_ns: u64,
}

impl Default for CallCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl CallCollector {
    /// Create a new call collector.
    pub fn new() -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Record a sampled call.
    pub fn record(&self, unique: u64, op_name: &str, wait: Duration, wire: Duration) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(CollectedCall {
                unique,
                op_name: op_name.to_string(),
                wait_ns: wait.as_nanos() as u64,
                wire_ns: wire.as_nanos() as u64,
            });
        }
    }

    /// Get the number of collected calls.
    pub fn len(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or(0)
    }

    /// Check if no calls have been collected.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clear all collected calls.
    pub fn clear(&self) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.clear();
        }
    }

    /// Compute latency summary statistics.
    pub fn summary(&self) -> Option<CallSummary> {
        let calls = self.calls.lock().ok()?;
        if calls.is_empty() {
            return None;
        }

        let mut total: Vec<u64> = Vec::with_capacity(calls.len());
        let mut wait: Vec<u64> = Vec::with_capacity(calls.len());
        let mut wire: Vec<u64> = Vec::with_capacity(calls.len());

        // op_name -> (total latencies, wire latencies)
        let mut by_op: HashMap<String, (Vec<u64>, Vec<u64>)> = HashMap::new();

        for call in calls.iter() {
            let t = call.wait_ns + call.wire_ns;
            total.push(t);
            wait.push(call.wait_ns);
            wire.push(call.wire_ns);

            let entry = by_op
                .entry(call.op_name.clone())
                .or_insert_with(|| (Vec::new(), Vec::new()));
            entry.0.push(t);
            entry.1.push(call.wire_ns);
        }

        // Sorted by count descending
        let mut by_operation: Vec<OperationStats> = by_op
            .into_iter()
            .map(|(op_name, (mut totals, mut wires))| OperationStats {
                op_name,
                count: totals.len(),
                total: compute_stats(&mut totals),
                wire: compute_stats(&mut wires),
            })
            .collect();
        by_operation.sort_by(|a, b| b.count.cmp(&a.count).then(a.op_name.cmp(&b.op_name)));

        Some(CallSummary {
            count: total.len(),
            total: compute_stats(&mut total),
            lock_wait: compute_stats(&mut wait),
            wire: compute_stats(&mut wire),
            by_operation,
        })
    }

    /// Print a summary of collected calls to stderr.
    pub fn print_summary(&self) {
        match self.summary() {
            Some(summary) => summary.print(),
            None => eprintln!("[telemetry] No calls collected"),
        }
    }

    /// Get JSON representation of the summary.
    pub fn summary_json(&self) -> Option<String> {
        let summary = self.summary()?;
        serde_json::to_string_pretty(&summary).ok()
    }
}

/// Statistics for a latency metric.
#[derive(Debug, Clone, serde::Serialize)]
pub struct LatencyStats {
    /// Number of samples
    pub count: usize,
    /// Minimum latency in nanoseconds
    pub min_ns: u64,
    /// Maximum latency in nanoseconds
    pub max_ns: u64,
    /// Mean latency in nanoseconds
    pub mean_ns: u64,
    /// Median (p50) latency in nanoseconds
    pub p50_ns: u64,
    /// 90th percentile latency in nanoseconds
    pub p90_ns: u64,
    /// 99th percentile latency in nanoseconds
    pub p99_ns: u64,
}

/// Summary of call latencies.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CallSummary {
    pub count: usize,
    /// Lock wait plus wire time.
    pub total: LatencyStats,
    /// Time queued behind other callers on the single connection.
    pub lock_wait: LatencyStats,
    /// Request write plus reply read, including backend processing.
    pub wire: LatencyStats,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub by_operation: Vec<OperationStats>,
}

/// Statistics for one backend operation (get_attr, read_dir, open, pread).
#[derive(Debug, Clone, serde::Serialize)]
pub struct OperationStats {
    pub op_name: String,
    pub count: usize,
    pub total: LatencyStats,
    pub wire: LatencyStats,
}

fn fmt_us(ns: u64) -> String {
    let us = ns as f64 / 1000.0;
    if us >= 1000.0 {
        format!("{:.1}ms", us / 1000.0)
    } else {
        format!("{:.1}µs", us)
    }
}

impl CallSummary {
    /// Print summary to stderr.
    pub fn print(&self) {
        eprintln!();
        eprintln!("Backend call latency ({} sampled calls)", self.count);
        eprintln!(
            "  {:12} {:>9} {:>9} {:>9} {:>9} {:>9}",
            "Phase", "min", "p50", "p90", "p99", "max"
        );
        for (label, stats) in [
            ("total", &self.total),
            ("lock_wait", &self.lock_wait),
            ("wire", &self.wire),
        ] {
            eprintln!(
                "  {:12} {:>9} {:>9} {:>9} {:>9} {:>9}",
                label,
                fmt_us(stats.min_ns),
                fmt_us(stats.p50_ns),
                fmt_us(stats.p90_ns),
                fmt_us(stats.p99_ns),
                fmt_us(stats.max_ns),
            );
        }

        if !self.by_operation.is_empty() {
            eprintln!();
            eprintln!("Per-Operation Latency (sorted by count):");
            eprintln!(
                "  {:12} {:>8} {:>10} {:>10} {:>10} {:>10}",
                "Operation", "Count", "p50 Total", "p99 Total", "p50 wire", "p99 wire"
            );
            for op in &self.by_operation {
                eprintln!(
                    "  {:12} {:>8} {:>10} {:>10} {:>10} {:>10}",
                    op.op_name,
                    op.count,
                    fmt_us(op.total.p50_ns),
                    fmt_us(op.total.p99_ns),
                    fmt_us(op.wire.p50_ns),
                    fmt_us(op.wire.p99_ns)
                );
            }
        }
    }
}

/// Compute statistics from a vector of latencies (in nanoseconds).
fn compute_stats(values: &mut [u64]) -> LatencyStats {
    if values.is_empty() {
        return LatencyStats {
            count: 0,
            min_ns: 0,
            max_ns: 0,
            mean_ns: 0,
            p50_ns: 0,
            p90_ns: 0,
            p99_ns: 0,
        };
    }

    values.sort_unstable();

    let count = values.len();
    let sum: u64 = values.iter().sum();

    let percentile = |p: f64| -> u64 {
        let idx = ((count as f64 * p) as usize)
            .saturating_sub(1)
            .min(count - 1);
        values[idx]
    };

    LatencyStats {
        count,
        min_ns: values[0],
        max_ns: values[count - 1],
        mean_ns: sum / count as u64,
        p50_ns: percentile(0.50),
        p90_ns: percentile(0.90),
        p99_ns: percentile(0.99),
    }
}
