//! Trim-quality metrics for Preflight.
//!
//! The [`MetricsRegistry`] is process-wide shared state holding the latest
//! compress-ratio / semantic-retention pair. It is constructed once at
//! startup and passed by `Arc` to its writer (the context trimmer) and its
//! reader (the gateway metrics endpoints) — no ambient global.
//!
//! A Missing retention value stays Missing end-to-end: `NaN` in the
//! Prometheus text exposition, `null` in the JSON form. It is never
//! substituted with 0.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// One trim observation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricSample {
    /// Post-trim tokens divided by pre-trim tokens, in (0, 1].
    pub compress_ratio: f64,

    /// Cosine similarity of pre-/post-trim embeddings, in [-1, 1].
    /// `None` marks a Missing measurement (scorer disabled or failed).
    pub retention: Option<f64>,

    /// When the trim happened.
    pub timestamp: DateTime<Utc>,
}

impl MetricSample {
    pub fn new(compress_ratio: f64, retention: Option<f64>) -> Self {
        Self {
            compress_ratio,
            retention,
            timestamp: Utc::now(),
        }
    }
}

/// Point-in-time copy of the registry state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub compress_ratio: f64,
    pub semantic_retention: Option<f64>,
}

/// Collects runtime metrics for the operational endpoints.
///
/// Writes are last-write-wins per logical series; a snapshot is always an
/// internally consistent pair — never a compress ratio from one run paired
/// with a retention from another. One mutex guards the whole pair, held
/// only for the copy.
pub struct MetricsRegistry {
    latest: Mutex<Option<MetricSample>>,
}

impl MetricsRegistry {
    /// Create an empty registry. Until the first `record`, snapshots report
    /// a compress ratio of 1.0 and Missing retention.
    pub fn new() -> Self {
        Self {
            latest: Mutex::new(None),
        }
    }

    /// Record the latest trim observation, replacing the previous one
    /// atomically.
    pub fn record(&self, sample: MetricSample) {
        let mut latest = self.latest.lock().unwrap_or_else(|e| e.into_inner());
        *latest = Some(sample);
    }

    /// Get a consistent copy of the current state.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let latest = self.latest.lock().unwrap_or_else(|e| e.into_inner());
        match latest.as_ref() {
            Some(sample) => MetricsSnapshot {
                compress_ratio: sample.compress_ratio,
                semantic_retention: sample.retention,
            },
            None => MetricsSnapshot {
                compress_ratio: 1.0,
                semantic_retention: None,
            },
        }
    }

    /// Render the Prometheus text exposition. Missing retention is `NaN`.
    pub fn export_prometheus(&self) -> String {
        let snapshot = self.snapshot();
        let retention = match snapshot.semantic_retention {
            Some(value) => format_gauge(value),
            None => "NaN".to_string(),
        };
        let lines = [
            "# HELP compress_ratio Ratio of tokens kept after trimming.".to_string(),
            "# TYPE compress_ratio gauge".to_string(),
            format!("compress_ratio {}", format_gauge(snapshot.compress_ratio)),
            "# HELP semantic_retention Semantic retention score for trimmed context.".to_string(),
            "# TYPE semantic_retention gauge".to_string(),
            format!("semantic_retention {retention}"),
        ];
        let mut out = lines.join("\n");
        out.push('\n');
        out
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn format_gauge(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else {
        format!("{value}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn empty_registry_reports_nan_retention() {
        let registry = MetricsRegistry::new();
        let payload = registry.export_prometheus();
        let lines: Vec<&str> = payload.trim().lines().collect();
        assert_eq!(*lines.last().unwrap(), "semantic_retention NaN");
        assert!(lines.contains(&"compress_ratio 1"));
    }

    #[test]
    fn missing_retention_stays_nan_after_record() {
        let registry = MetricsRegistry::new();
        registry.record(MetricSample::new(0.5, None));

        let payload = registry.export_prometheus();
        assert!(payload.contains("compress_ratio 0.5"));
        assert!(payload.trim().ends_with("semantic_retention NaN"));

        // JSON form of the same state: null, not 0.
        let json = serde_json::to_value(registry.snapshot()).unwrap();
        assert!(json["semantic_retention"].is_null());
        assert_eq!(json["compress_ratio"], 0.5);
    }

    #[test]
    fn present_retention_exported() {
        let registry = MetricsRegistry::new();
        registry.record(MetricSample::new(0.75, Some(0.931)));
        let payload = registry.export_prometheus();
        assert!(payload.contains("semantic_retention 0.931"));
    }

    #[test]
    fn last_write_wins() {
        let registry = MetricsRegistry::new();
        registry.record(MetricSample::new(0.9, Some(0.99)));
        registry.record(MetricSample::new(0.4, None));
        let snapshot = registry.snapshot();
        assert_eq!(snapshot.compress_ratio, 0.4);
        assert!(snapshot.semantic_retention.is_none());
    }

    #[test]
    fn snapshot_never_tears_under_concurrent_writers() {
        // Writers always record matched pairs; every observed snapshot must
        // be one of those pairs.
        let registry = Arc::new(MetricsRegistry::new());
        let mut handles = Vec::new();

        for i in 0..4u32 {
            let reg = registry.clone();
            handles.push(std::thread::spawn(move || {
                let ratio = f64::from(i + 1) / 10.0;
                for _ in 0..500 {
                    reg.record(MetricSample::new(ratio, Some(ratio)));
                }
            }));
        }

        for _ in 0..2000 {
            let snap = registry.snapshot();
            if let Some(retention) = snap.semantic_retention {
                assert_eq!(snap.compress_ratio, retention, "torn snapshot");
            }
        }

        for handle in handles {
            handle.join().unwrap();
        }
    }
}
