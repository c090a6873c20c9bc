use parking_lot::RwLock;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// How an insight request ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightOutcome {
    /// Model text returned verbatim
    Model,
    /// Model answered with no text; default sentence used
    EmptyFallback,
    /// Request failed; failure sentence used
    ErrorFallback,
}

/// Metrics collector for conversions and insight calls.
///
/// Thread-safe and cheap to clone; clones share the same counters.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    conversions_completed: AtomicUsize,
    conversions_failed: AtomicUsize,
    bytes_in: AtomicU64,
    bytes_out: AtomicU64,
    conversion_latency_ms: RwLock<Vec<u64>>,

    insight_model: AtomicUsize,
    insight_empty: AtomicUsize,
    insight_failed: AtomicUsize,
    insight_latency_ms: RwLock<Vec<u64>>,

    batches_processed: AtomicUsize,

    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner {
                conversions_completed: AtomicUsize::new(0),
                conversions_failed: AtomicUsize::new(0),
                bytes_in: AtomicU64::new(0),
                bytes_out: AtomicU64::new(0),
                conversion_latency_ms: RwLock::new(Vec::new()),
                insight_model: AtomicUsize::new(0),
                insight_empty: AtomicUsize::new(0),
                insight_failed: AtomicUsize::new(0),
                insight_latency_ms: RwLock::new(Vec::new()),
                batches_processed: AtomicUsize::new(0),
                start_time: Instant::now(),
            }),
        }
    }

    // Conversion Metrics
    pub fn record_conversion(&self, success: bool, duration: Duration, bytes_in: u64, bytes_out: u64) {
        if success {
            self.inner.conversions_completed.fetch_add(1, Ordering::Relaxed);
            self.inner.bytes_out.fetch_add(bytes_out, Ordering::Relaxed);
        } else {
            self.inner.conversions_failed.fetch_add(1, Ordering::Relaxed);
        }
        self.inner.bytes_in.fetch_add(bytes_in, Ordering::Relaxed);
        self.inner
            .conversion_latency_ms
            .write()
            .push(duration.as_millis() as u64);
    }

    // Insight Metrics
    pub fn record_insight(&self, outcome: InsightOutcome, duration: Duration) {
        let counter = match outcome {
            InsightOutcome::Model => &self.inner.insight_model,
            InsightOutcome::EmptyFallback => &self.inner.insight_empty,
            InsightOutcome::ErrorFallback => &self.inner.insight_failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        self.inner
            .insight_latency_ms
            .write()
            .push(duration.as_millis() as u64);
    }

    // Batch Metrics
    pub fn record_batch_processed(&self) {
        self.inner.batches_processed.fetch_add(1, Ordering::Relaxed);
    }

    // Get snapshot for reporting
    pub fn snapshot(&self) -> MetricsSnapshot {
        let conversion_latency = self.inner.conversion_latency_ms.read();
        let conversion_avg = avg(&conversion_latency);
        let conversion_p95 = percentile(&conversion_latency, 0.95);
        drop(conversion_latency);

        let insight_latency = self.inner.insight_latency_ms.read();
        let insight_avg = avg(&insight_latency);
        let insight_p95 = percentile(&insight_latency, 0.95);
        drop(insight_latency);

        MetricsSnapshot {
            conversions_completed: self.inner.conversions_completed.load(Ordering::Relaxed),
            conversions_failed: self.inner.conversions_failed.load(Ordering::Relaxed),
            bytes_in: self.inner.bytes_in.load(Ordering::Relaxed),
            bytes_out: self.inner.bytes_out.load(Ordering::Relaxed),
            conversion_avg_ms: conversion_avg,
            conversion_p95_ms: conversion_p95,
            insight_model: self.inner.insight_model.load(Ordering::Relaxed),
            insight_empty_fallback: self.inner.insight_empty.load(Ordering::Relaxed),
            insight_error_fallback: self.inner.insight_failed.load(Ordering::Relaxed),
            insight_avg_ms: insight_avg,
            insight_p95_ms: insight_p95,
            batches_processed: self.inner.batches_processed.load(Ordering::Relaxed),
            uptime_seconds: self.inner.start_time.elapsed().as_secs(),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time view of the collected metrics
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub conversions_completed: usize,
    pub conversions_failed: usize,
    pub bytes_in: u64,
    pub bytes_out: u64,
    pub conversion_avg_ms: u64,
    pub conversion_p95_ms: u64,
    pub insight_model: usize,
    pub insight_empty_fallback: usize,
    pub insight_error_fallback: usize,
    pub insight_avg_ms: u64,
    pub insight_p95_ms: u64,
    pub batches_processed: usize,
    pub uptime_seconds: u64,
}

fn avg(values: &[u64]) -> u64 {
    if values.is_empty() {
        0
    } else {
        values.iter().sum::<u64>() / values.len() as u64
    }
}

fn percentile(values: &[u64], p: f64) -> u64 {
    if values.is_empty() {
        return 0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    let index = ((sorted.len() as f64 - 1.0) * p).round() as usize;
    sorted[index.min(sorted.len() - 1)]
}
