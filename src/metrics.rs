//! Prediction metrics and statistics tracking for the classification service.

use crate::types::PredictionStatus;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::info;

/// Metrics collector for served predictions
pub struct PredictionMetrics {
    /// Total predictions served (any status)
    pub predictions: AtomicU64,
    pub successes: AtomicU64,
    pub warnings: AtomicU64,
    pub errors: AtomicU64,
    /// Predictions that used test-time augmentation
    pub tta_predictions: AtomicU64,
    /// Winning class counts
    class_counts: RwLock<HashMap<String, u64>>,
    /// Request processing times (in microseconds)
    processing_times: RwLock<Vec<u64>>,
    /// Per-model request times (in microseconds), decode and TTA included
    model_request_times: RwLock<HashMap<String, Vec<u64>>>,
    /// Winning probability histogram, 0.1 wide
    confidence_buckets: RwLock<[u64; 10]>,
    start_time: Instant,
}

impl PredictionMetrics {
    pub fn new() -> Self {
        Self {
            predictions: AtomicU64::new(0),
            successes: AtomicU64::new(0),
            warnings: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            tta_predictions: AtomicU64::new(0),
            class_counts: RwLock::new(HashMap::new()),
            processing_times: RwLock::new(Vec::with_capacity(1000)),
            model_request_times: RwLock::new(HashMap::new()),
            confidence_buckets: RwLock::new([0; 10]),
            start_time: Instant::now(),
        }
    }

    /// Record one served prediction
    pub fn record_prediction(
        &self,
        model: &str,
        duration: Duration,
        status: PredictionStatus,
        label: Option<&str>,
        probability: f64,
        tta: bool,
    ) {
        self.predictions.fetch_add(1, Ordering::Relaxed);
        if tta {
            self.tta_predictions.fetch_add(1, Ordering::Relaxed);
        }

        let counter = match status {
            PredictionStatus::Success => &self.successes,
            PredictionStatus::Warning => &self.warnings,
            PredictionStatus::Error => &self.errors,
        };
        counter.fetch_add(1, Ordering::Relaxed);

        let micros = duration.as_micros() as u64;
        if let Ok(mut times) = self.processing_times.write() {
            times.push(micros);
            // Keep only the most recent samples
            if times.len() > 10000 {
                times.drain(0..5000);
            }
        }

        if let Ok(mut times) = self.model_request_times.write() {
            let samples = times.entry(model.to_string()).or_default();
            samples.push(micros);
            if samples.len() > 1000 {
                samples.drain(0..500);
            }
        }

        if status == PredictionStatus::Error {
            return;
        }

        if let Some(label) = label {
            if let Ok(mut counts) = self.class_counts.write() {
                *counts.entry(label.to_string()).or_insert(0) += 1;
            }
        }

        let bucket = (probability.clamp(0.0, 1.0) * 10.0).min(9.0) as usize;
        if let Ok(mut buckets) = self.confidence_buckets.write() {
            buckets[bucket] += 1;
        }
    }

    /// Get processing time statistics
    pub fn processing_stats(&self) -> ProcessingStats {
        let times = self.processing_times.read().unwrap_or_else(|e| e.into_inner());
        ProcessingStats::from_samples(&times)
    }

    /// Per-model request time statistics
    pub fn model_stats(&self) -> BTreeMap<String, ModelStats> {
        let times = self.model_request_times.read().unwrap_or_else(|e| e.into_inner());

        times
            .iter()
            .filter(|(_, samples)| !samples.is_empty())
            .map(|(model, samples)| {
                let stats = ProcessingStats::from_samples(samples);
                (
                    model.clone(),
                    ModelStats {
                        calls: stats.count,
                        mean_us: stats.mean_us,
                        p50_us: stats.p50_us,
                        p99_us: stats.p99_us,
                    },
                )
            })
            .collect()
    }

    /// Predictions per second since startup
    pub fn throughput(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.predictions.load(Ordering::Relaxed) as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn confidence_distribution(&self) -> [u64; 10] {
        *self.confidence_buckets.read().unwrap_or_else(|e| e.into_inner())
    }

    pub fn class_counts(&self) -> BTreeMap<String, u64> {
        self.class_counts
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect()
    }

    /// Point-in-time copy of every metric
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            uptime_secs: self.start_time.elapsed().as_secs(),
            predictions: self.predictions.load(Ordering::Relaxed),
            successes: self.successes.load(Ordering::Relaxed),
            warnings: self.warnings.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            tta_predictions: self.tta_predictions.load(Ordering::Relaxed),
            throughput: self.throughput(),
            processing: self.processing_stats(),
            models: self.model_stats(),
            classes: self.class_counts(),
            confidence_distribution: self.confidence_distribution(),
        }
    }

    /// Print summary statistics
    pub fn print_summary(&self) {
        let snapshot = self.snapshot();
        let warning_rate = if snapshot.predictions > 0 {
            (snapshot.warnings as f64 / snapshot.predictions as f64) * 100.0
        } else {
            0.0
        };

        info!("╔══════════════════════════════════════════════════════════════╗");
        info!("║            SACCHARUM VISION - METRICS SUMMARY                ║");
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!(
            "║ Predictions: {:>8}  │  Throughput: {:>8.2} req/s          ║",
            snapshot.predictions, snapshot.throughput
        );
        info!(
            "║ Success: {:>6}  Warning: {:>6} ({:>5.1}%)  Error: {:>6}     ║",
            snapshot.successes, snapshot.warnings, warning_rate, snapshot.errors
        );
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!(
            "║ Processing Time (ms): mean={:>6.1} p50={:>6.1} p95={:>6.1} p99={:>6.1} ║",
            snapshot.processing.mean_us as f64 / 1000.0,
            snapshot.processing.p50_us as f64 / 1000.0,
            snapshot.processing.p95_us as f64 / 1000.0,
            snapshot.processing.p99_us as f64 / 1000.0
        );
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!("║ Detected Classes:                                            ║");
        for (label, count) in &snapshot.classes {
            info!("║   {:10}: {:>6}                                          ║", label, count);
        }
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!("║ Confidence Distribution:                                     ║");
        let total: u64 = snapshot.confidence_distribution.iter().sum();
        for (i, &count) in snapshot.confidence_distribution.iter().enumerate() {
            let pct = if total > 0 { (count as f64 / total as f64) * 100.0 } else { 0.0 };
            let bar: String = "█".repeat(((pct / 2.0) as usize).min(20));
            info!(
                "║   {:.1}-{:.1}: {:>6} ({:>5.1}%) {}",
                i as f64 / 10.0,
                (i + 1) as f64 / 10.0,
                count,
                pct,
                bar
            );
        }
        info!("╚══════════════════════════════════════════════════════════════╝");

        if !snapshot.models.is_empty() {
            info!("Model Request Times (ms):");
            for (model, stats) in &snapshot.models {
                info!(
                    "  {}: mean={:.1} p50={:.1} p99={:.1} (calls={})",
                    model,
                    stats.mean_us as f64 / 1000.0,
                    stats.p50_us as f64 / 1000.0,
                    stats.p99_us as f64 / 1000.0,
                    stats.calls
                );
            }
        }
    }
}

impl Default for PredictionMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Processing time statistics
#[derive(Debug, Default, Clone, Serialize)]
pub struct ProcessingStats {
    pub count: u64,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
}

impl ProcessingStats {
    fn from_samples(samples: &[u64]) -> Self {
        if samples.is_empty() {
            return Self::default();
        }

        let mut sorted = samples.to_vec();
        sorted.sort_unstable();

        let count = sorted.len();
        let sum: u64 = sorted.iter().sum();
        let percentile = |p: f64| sorted[((count as f64 * p) as usize).min(count - 1)];

        Self {
            count: count as u64,
            mean_us: sum / count as u64,
            p50_us: sorted[count / 2],
            p95_us: percentile(0.95),
            p99_us: percentile(0.99),
            max_us: sorted[count - 1],
        }
    }
}

/// Per-model request statistics
#[derive(Debug, Clone, Serialize)]
pub struct ModelStats {
    pub calls: u64,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p99_us: u64,
}

/// Serializable view served by the metrics endpoint
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub uptime_secs: u64,
    pub predictions: u64,
    pub successes: u64,
    pub warnings: u64,
    pub errors: u64,
    pub tta_predictions: u64,
    pub throughput: f64,
    pub processing: ProcessingStats,
    pub models: BTreeMap<String, ModelStats>,
    pub classes: BTreeMap<String, u64>,
    pub confidence_distribution: [u64; 10],
}

/// Periodic metrics summary in the logs
pub struct MetricsReporter {
    metrics: Arc<PredictionMetrics>,
    interval_secs: u64,
}

impl MetricsReporter {
    pub fn new(metrics: Arc<PredictionMetrics>, interval_secs: u64) -> Self {
        Self {
            metrics,
            interval_secs,
        }
    }

    /// Start the periodic reporting task; an interval of 0 disables it
    pub async fn start(self) {
        if self.interval_secs == 0 {
            return;
        }

        let mut interval = tokio::time::interval(Duration::from_secs(self.interval_secs));
        // The first tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            self.metrics.print_summary();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_recording() {
        let metrics = PredictionMetrics::new();

        metrics.record_prediction("ResNet50", Duration::from_millis(40), PredictionStatus::Success, Some("Rust"), 0.91, true);
        metrics.record_prediction("ResNet50", Duration::from_millis(60), PredictionStatus::Warning, Some("Mosaic"), 0.42, false);
        metrics.record_prediction("MobileNetV2", Duration::from_millis(10), PredictionStatus::Error, None, 0.0, false);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.predictions, 3);
        assert_eq!(snapshot.successes, 1);
        assert_eq!(snapshot.warnings, 1);
        assert_eq!(snapshot.errors, 1);
        assert_eq!(snapshot.tta_predictions, 1);
        assert_eq!(snapshot.classes.get("Rust"), Some(&1));
        assert_eq!(snapshot.models["ResNet50"].calls, 2);
        assert_eq!(snapshot.models["MobileNetV2"].calls, 1);
    }

    #[test]
    fn test_model_stats_track_request_durations() {
        let metrics = PredictionMetrics::new();

        metrics.record_prediction("ResNet50", Duration::from_millis(20), PredictionStatus::Success, Some("Rust"), 0.9, true);
        metrics.record_prediction("ResNet50", Duration::from_millis(40), PredictionStatus::Success, Some("Rust"), 0.9, true);

        let stats = &metrics.model_stats()["ResNet50"];
        assert_eq!(stats.calls, 2);
        assert_eq!(stats.mean_us, 30_000);
        assert_eq!(stats.p99_us, 40_000);
    }

    #[test]
    fn test_confidence_buckets() {
        let metrics = PredictionMetrics::new();

        metrics.record_prediction("ResNet50", Duration::ZERO, PredictionStatus::Success, Some("Rust"), 1.0, false);
        metrics.record_prediction("ResNet50", Duration::ZERO, PredictionStatus::Warning, Some("Rust"), 0.35, false);
        metrics.record_prediction("ResNet50", Duration::ZERO, PredictionStatus::Error, None, 0.0, false);

        let buckets = metrics.confidence_distribution();
        assert_eq!(buckets[9], 1);
        assert_eq!(buckets[3], 1);
        assert_eq!(buckets.iter().sum::<u64>(), 2);
    }

    #[test]
    fn test_processing_stats() {
        let samples: Vec<u64> = (1..=100).collect();
        let stats = ProcessingStats::from_samples(&samples);

        assert_eq!(stats.count, 100);
        assert_eq!(stats.mean_us, 50);
        assert_eq!(stats.p50_us, 51);
        assert_eq!(stats.p99_us, 100);
        assert_eq!(stats.max_us, 100);
        assert_eq!(ProcessingStats::from_samples(&[]).count, 0);
    }

    #[test]
    fn test_snapshot_serializes() {
        let metrics = PredictionMetrics::new();
        metrics.record_prediction("EfficientNetB0", Duration::from_millis(5), PredictionStatus::Success, Some("Healthy"), 0.8, false);

        let value = serde_json::to_value(metrics.snapshot()).unwrap();
        assert_eq!(value["predictions"], 1);
        assert_eq!(value["classes"]["Healthy"], 1);
        assert_eq!(value["confidence_distribution"].as_array().unwrap().len(), 10);
    }
}
