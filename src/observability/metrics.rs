//! Thread-safe metrics collection system
//!
//! Atomic counters for high-frequency events and mutex-protected sample
//! buffers for latency percentiles, covering submissions, the classifier
//! and upload staging.

use crate::error::FailureKind;
use once_cell::sync::Lazy;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Global metrics collector instance
pub static METRICS: Lazy<MetricsCollector> = Lazy::new(MetricsCollector::new);

/// Get reference to global metrics collector
pub fn metrics() -> &'static MetricsCollector {
    &METRICS
}

const MAX_SAMPLES: usize = 1000;

/// Thread-safe metrics collector using atomics and mutexes
pub struct MetricsCollector {
    // Submission metrics
    submissions_received: AtomicU64,
    submissions_in_flight: AtomicU64,
    submissions_completed: AtomicU64,
    failed_missing_input: AtomicU64,
    failed_classification: AtomicU64,
    failed_resolution: AtomicU64,
    escalations_routed: AtomicU64,
    unresolved_escalations: AtomicU64,

    // Classifier metrics
    classifications: AtomicU64,
    classification_failures: AtomicU64,
    classifier_healthy: AtomicBool,
    last_classifier_check: AtomicU64,

    // Upload staging
    uploads_staged: AtomicU64,
    uploads_removed: AtomicU64,

    // Latency samples in milliseconds
    submission_times: Mutex<Vec<u64>>,
    classification_times: Mutex<Vec<u64>>,

    // Lifecycle
    service_state: Mutex<String>,
    uptime_start: AtomicU64,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            submissions_received: AtomicU64::new(0),
            submissions_in_flight: AtomicU64::new(0),
            submissions_completed: AtomicU64::new(0),
            failed_missing_input: AtomicU64::new(0),
            failed_classification: AtomicU64::new(0),
            failed_resolution: AtomicU64::new(0),
            escalations_routed: AtomicU64::new(0),
            unresolved_escalations: AtomicU64::new(0),
            classifications: AtomicU64::new(0),
            classification_failures: AtomicU64::new(0),
            classifier_healthy: AtomicBool::new(false),
            last_classifier_check: AtomicU64::new(0),
            uploads_staged: AtomicU64::new(0),
            uploads_removed: AtomicU64::new(0),
            submission_times: Mutex::new(Vec::new()),
            classification_times: Mutex::new(Vec::new()),
            service_state: Mutex::new("initializing".to_string()),
            uptime_start: AtomicU64::new(current_timestamp()),
        }
    }

    // Submission metrics
    pub fn submission_received(&self) {
        self.submissions_received.fetch_add(1, Ordering::Relaxed);
        self.submissions_in_flight.fetch_add(1, Ordering::Relaxed);
    }

    pub fn submission_completed(&self, duration: Duration, escalated: bool) {
        self.submissions_completed.fetch_add(1, Ordering::Relaxed);
        self.finish_in_flight();
        if escalated {
            self.escalations_routed.fetch_add(1, Ordering::Relaxed);
        }
        record_sample(&self.submission_times, duration);
    }

    pub fn submission_failed(&self, kind: FailureKind, duration: Duration) {
        let counter = match kind {
            FailureKind::MissingInput => &self.failed_missing_input,
            FailureKind::ClassificationFailed => &self.failed_classification,
            FailureKind::ResolutionFailed => &self.failed_resolution,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        self.finish_in_flight();
        record_sample(&self.submission_times, duration);
    }

    pub fn unresolved_escalation(&self) {
        self.unresolved_escalations.fetch_add(1, Ordering::Relaxed);
    }

    fn finish_in_flight(&self) {
        // Saturating so a reset mid-request cannot wrap the gauge
        let _ = self
            .submissions_in_flight
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| {
                Some(n.saturating_sub(1))
            });
    }

    // Classifier metrics
    pub fn classification_finished(&self, duration: Duration, success: bool) {
        self.classifications.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.classification_failures.fetch_add(1, Ordering::Relaxed);
        }
        record_sample(&self.classification_times, duration);
    }

    pub fn update_classifier_health(&self, healthy: bool) {
        self.classifier_healthy.store(healthy, Ordering::Relaxed);
        self.last_classifier_check
            .store(current_timestamp(), Ordering::Relaxed);
    }

    // Upload staging
    pub fn upload_staged(&self) {
        self.uploads_staged.fetch_add(1, Ordering::Relaxed);
    }

    pub fn upload_removed(&self) {
        self.uploads_removed.fetch_add(1, Ordering::Relaxed);
    }

    // Lifecycle
    pub fn set_service_state(&self, state: &str) {
        if let Ok(mut current) = self.service_state.lock() {
            *current = state.to_string();
        }
    }

    pub fn uptime_start(&self) -> u64 {
        self.uptime_start.load(Ordering::Relaxed)
    }

    /// Reset all metrics (useful for testing)
    pub fn reset(&self) {
        for counter in [
            &self.submissions_received,
            &self.submissions_in_flight,
            &self.submissions_completed,
            &self.failed_missing_input,
            &self.failed_classification,
            &self.failed_resolution,
            &self.escalations_routed,
            &self.unresolved_escalations,
            &self.classifications,
            &self.classification_failures,
            &self.last_classifier_check,
            &self.uploads_staged,
            &self.uploads_removed,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        self.classifier_healthy.store(false, Ordering::Relaxed);
        self.uptime_start
            .store(current_timestamp(), Ordering::Relaxed);
        for samples in [&self.submission_times, &self.classification_times] {
            if let Ok(mut samples) = samples.lock() {
                samples.clear();
            }
        }
        self.set_service_state("initializing");
    }

    pub fn get_metrics(&self) -> MetricsSnapshot {
        let now = current_timestamp();
        let submission_latency = latency_summary(&self.submission_times);
        let classification_latency = latency_summary(&self.classification_times);

        let failed_missing_input = self.failed_missing_input.load(Ordering::Relaxed);
        let failed_classification = self.failed_classification.load(Ordering::Relaxed);
        let failed_resolution = self.failed_resolution.load(Ordering::Relaxed);

        MetricsSnapshot {
            submissions: SubmissionMetrics {
                received: self.submissions_received.load(Ordering::Relaxed),
                in_flight: self.submissions_in_flight.load(Ordering::Relaxed),
                completed: self.submissions_completed.load(Ordering::Relaxed),
                failed: failed_missing_input + failed_classification + failed_resolution,
                failed_missing_input,
                failed_classification,
                failed_resolution,
                escalations_routed: self.escalations_routed.load(Ordering::Relaxed),
                unresolved_escalations: self.unresolved_escalations.load(Ordering::Relaxed),
                latency: submission_latency,
            },
            classifier: ClassifierMetrics {
                calls: self.classifications.load(Ordering::Relaxed),
                failures: self.classification_failures.load(Ordering::Relaxed),
                healthy: self.classifier_healthy.load(Ordering::Relaxed),
                last_health_check: self.last_classifier_check.load(Ordering::Relaxed),
                latency: classification_latency,
            },
            uploads: UploadMetrics {
                staged: self.uploads_staged.load(Ordering::Relaxed),
                removed: self.uploads_removed.load(Ordering::Relaxed),
            },
            lifecycle: LifecycleMetrics {
                current_state: self
                    .service_state
                    .lock()
                    .map(|s| s.clone())
                    .unwrap_or_else(|_| "unknown".to_string()),
                uptime_seconds: now.saturating_sub(self.uptime_start.load(Ordering::Relaxed)),
            },
            timestamp: now,
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Serialize)]
pub struct MetricsSnapshot {
    pub submissions: SubmissionMetrics,
    pub classifier: ClassifierMetrics,
    pub uploads: UploadMetrics,
    pub lifecycle: LifecycleMetrics,
    pub timestamp: u64,
}

#[derive(Debug, Serialize)]
pub struct SubmissionMetrics {
    pub received: u64,
    pub in_flight: u64,
    pub completed: u64,
    pub failed: u64,
    pub failed_missing_input: u64,
    pub failed_classification: u64,
    pub failed_resolution: u64,
    pub escalations_routed: u64,
    pub unresolved_escalations: u64,
    pub latency: LatencySummary,
}

#[derive(Debug, Serialize)]
pub struct ClassifierMetrics {
    pub calls: u64,
    pub failures: u64,
    pub healthy: bool,
    pub last_health_check: u64,
    pub latency: LatencySummary,
}

#[derive(Debug, Serialize)]
pub struct UploadMetrics {
    pub staged: u64,
    pub removed: u64,
}

#[derive(Debug, Serialize)]
pub struct LifecycleMetrics {
    pub current_state: String,
    pub uptime_seconds: u64,
}

#[derive(Debug, Default, Serialize)]
pub struct LatencySummary {
    pub avg_ms: f64,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
}

fn record_sample(samples: &Mutex<Vec<u64>>, duration: Duration) {
    if let Ok(mut samples) = samples.lock() {
        samples.push(duration.as_millis() as u64);
        if samples.len() > MAX_SAMPLES {
            samples.remove(0);
        }
    }
}

fn latency_summary(samples: &Mutex<Vec<u64>>) -> LatencySummary {
    let Ok(samples) = samples.lock() else {
        return LatencySummary::default();
    };
    if samples.is_empty() {
        return LatencySummary::default();
    }

    let mut sorted = samples.clone();
    sorted.sort_unstable();

    LatencySummary {
        avg_ms: sorted.iter().sum::<u64>() as f64 / sorted.len() as f64,
        p50_ms: percentile(&sorted, 50.0),
        p95_ms: percentile(&sorted, 95.0),
        p99_ms: percentile(&sorted, 99.0),
    }
}

fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn percentile(sorted_data: &[u64], percentile: f64) -> f64 {
    if sorted_data.is_empty() {
        return 0.0;
    }

    let len = sorted_data.len();
    let index = (percentile / 100.0) * (len - 1) as f64;

    if index.fract() == 0.0 {
        sorted_data[index as usize] as f64
    } else {
        let lower_value = sorted_data[index.floor() as usize] as f64;
        let upper_value = sorted_data[index.ceil() as usize] as f64;

        lower_value + (upper_value - lower_value) * index.fract()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_submission_metrics() {
        let collector = MetricsCollector::new();

        collector.submission_received();
        collector.submission_completed(Duration::from_millis(120), true);
        collector.submission_received();
        collector.submission_failed(FailureKind::ResolutionFailed, Duration::from_millis(40));

        let metrics = collector.get_metrics();
        assert_eq!(metrics.submissions.received, 2);
        assert_eq!(metrics.submissions.completed, 1);
        assert_eq!(metrics.submissions.failed, 1);
        assert_eq!(metrics.submissions.failed_resolution, 1);
        assert_eq!(metrics.submissions.escalations_routed, 1);
        assert_eq!(metrics.submissions.in_flight, 0);
        assert!(metrics.submissions.latency.avg_ms > 70.0);
    }

    #[test]
    fn test_classifier_metrics() {
        let collector = MetricsCollector::new();

        collector.classification_finished(Duration::from_millis(300), true);
        collector.classification_finished(Duration::from_millis(100), false);
        collector.update_classifier_health(true);

        let metrics = collector.get_metrics();
        assert_eq!(metrics.classifier.calls, 2);
        assert_eq!(metrics.classifier.failures, 1);
        assert!(metrics.classifier.healthy);
        assert!(metrics.classifier.last_health_check > 0);
        assert_eq!(metrics.classifier.latency.avg_ms, 200.0);
    }

    #[test]
    fn test_in_flight_never_wraps() {
        let collector = MetricsCollector::new();
        collector.submission_failed(FailureKind::MissingInput, Duration::ZERO);

        assert_eq!(collector.get_metrics().submissions.in_flight, 0);
    }

    #[test]
    fn test_thread_safety() {
        let collector = Arc::new(MetricsCollector::new());

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let collector = Arc::clone(&collector);
                thread::spawn(move || {
                    for _ in 0..100 {
                        collector.submission_received();
                        collector.upload_staged();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let metrics = collector.get_metrics();
        assert_eq!(metrics.submissions.received, 1000);
        assert_eq!(metrics.uploads.staged, 1000);
    }

    #[test]
    fn test_percentile_calculation() {
        let data = vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10];

        let p50 = percentile(&data, 50.0);
        let p95 = percentile(&data, 95.0);

        assert!((p50 - 5.5).abs() < 0.1, "P50: expected ~5.5, got {p50}");
        assert!((p95 - 9.5).abs() < 0.1, "P95: expected ~9.5, got {p95}");
        assert_eq!(percentile(&data, 0.0), 1.0);
        assert_eq!(percentile(&data, 100.0), 10.0);
        assert_eq!(percentile(&[], 50.0), 0.0);
    }

    #[test]
    fn test_sample_buffer_is_bounded() {
        let collector = MetricsCollector::new();
        for i in 0..1500 {
            collector.classification_finished(Duration::from_millis(i), true);
        }

        assert_eq!(collector.classification_times.lock().unwrap().len(), MAX_SAMPLES);
    }

    #[test]
    fn test_reset_functionality() {
        let collector = MetricsCollector::new();

        collector.submission_received();
        collector.upload_staged();
        collector.set_service_state("running");
        collector.reset();

        let metrics = collector.get_metrics();
        assert_eq!(metrics.submissions.received, 0);
        assert_eq!(metrics.uploads.staged, 0);
        assert_eq!(metrics.lifecycle.current_state, "initializing");
    }
}
