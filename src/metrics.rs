// Numan Thabit 2026
// metrics.rs - Prometheus registry for handshake and scheduler counters

use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Registry};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),
}

#[derive(Debug, Clone)]
pub struct Metrics {
    registry: Registry,
    pub handshake_attempts: IntCounter,
    pub handshake_success: IntCounter,
    pub handshake_seconds: Histogram,
    pub fallback_legacy: IntCounter,
    pub fallback_encrypted_retry: IntCounter,
    pub discarded: IntCounterVec,
    pub active_connections: IntGauge,
    pub queue_depth: IntGauge,
}

impl Metrics {
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new_custom(Some("btmse".into()), None)?;

        macro_rules! register_counter {
            ($name:expr, $help:expr) => {{
                let counter = IntCounter::new($name, $help)?;
                registry.register(Box::new(counter.clone()))?;
                counter
            }};
        }

        macro_rules! register_counter_vec {
            ($name:expr, $help:expr, $labels:expr) => {{
                let counter = IntCounterVec::new(prometheus::Opts::new($name, $help), $labels)?;
                registry.register(Box::new(counter.clone()))?;
                counter
            }};
        }

        macro_rules! register_gauge {
            ($name:expr, $help:expr) => {{
                let gauge = IntGauge::new($name, $help)?;
                registry.register(Box::new(gauge.clone()))?;
                gauge
            }};
        }

        macro_rules! register_histogram {
            ($name:expr, $help:expr, $buckets:expr) => {{
                let opts = HistogramOpts::new($name, $help).buckets($buckets.to_vec());
                let hist = Histogram::with_opts(opts)?;
                registry.register(Box::new(hist.clone()))?;
                hist
            }};
        }

        let handshake_attempts =
            register_counter!("handshake_attempts", "Encrypted handshake attempts started");
        let handshake_success = register_counter!(
            "handshake_success",
            "Encrypted handshakes that reached hand-off"
        );
        let handshake_seconds = register_histogram!(
            "handshake_seconds",
            "Wall time from attempt start to hand-off",
            &[0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
        );
        let fallback_legacy = register_counter!(
            "fallback_legacy",
            "Failed attempts retried with the legacy handshake"
        );
        let fallback_encrypted_retry = register_counter!(
            "fallback_encrypted_retry",
            "Failed attempts replaced with a fresh encrypted attempt"
        );
        let discarded = register_counter_vec!(
            "discarded_total",
            "Commands discarded before success, by reason",
            &["reason"]
        );
        let active_connections = register_gauge!(
            "active_connections",
            "Connection attempts currently holding a swarm slot"
        );
        let queue_depth = register_gauge!("queue_depth", "Commands queued in the scheduler");

        Ok(Self {
            registry,
            handshake_attempts,
            handshake_success,
            handshake_seconds,
            fallback_legacy,
            fallback_encrypted_retry,
            discarded,
            active_connections,
            queue_depth,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn gather(&self) -> Vec<prometheus::proto::MetricFamily> {
        self.registry.gather()
    }
}
