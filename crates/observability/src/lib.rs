use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::OnceCell;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

static TRACING_INIT: OnceCell<()> = OnceCell::new();

/// Process-wide pipeline counters. Each increment is mirrored to the `metrics`
/// facade so an installed exporter sees the same numbers.
#[derive(Debug, Default)]
pub struct AppMetrics {
    requests_total: AtomicU64,
    detection_cache_hits_total: AtomicU64,
    translation_cache_hits_total: AtomicU64,
    engine_fallbacks_total: AtomicU64,
    low_quality_translations_total: AtomicU64,
    passthrough_translations_total: AtomicU64,
    escalations_total: AtomicU64,
    location_unresolved_total: AtomicU64,
    cancelled_turns_total: AtomicU64,
    total_latency_millis: AtomicU64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub requests_total: u64,
    pub detection_cache_hits_total: u64,
    pub translation_cache_hits_total: u64,
    pub engine_fallbacks_total: u64,
    pub low_quality_translations_total: u64,
    pub passthrough_translations_total: u64,
    pub escalations_total: u64,
    pub location_unresolved_total: u64,
    pub cancelled_turns_total: u64,
    pub avg_latency_millis: f64,
}

impl AppMetrics {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn inc_request(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("tabi_requests_total").increment(1);
    }

    pub fn inc_detection_cache_hit(&self) {
        self.detection_cache_hits_total
            .fetch_add(1, Ordering::Relaxed);
        metrics::counter!("tabi_detection_cache_hits_total").increment(1);
    }

    pub fn inc_translation_cache_hit(&self) {
        self.translation_cache_hits_total
            .fetch_add(1, Ordering::Relaxed);
        metrics::counter!("tabi_translation_cache_hits_total").increment(1);
    }

    pub fn inc_engine_fallback(&self) {
        self.engine_fallbacks_total.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("tabi_engine_fallbacks_total").increment(1);
    }

    pub fn inc_low_quality(&self) {
        self.low_quality_translations_total
            .fetch_add(1, Ordering::Relaxed);
        metrics::counter!("tabi_low_quality_translations_total").increment(1);
    }

    pub fn inc_passthrough(&self) {
        self.passthrough_translations_total
            .fetch_add(1, Ordering::Relaxed);
        metrics::counter!("tabi_passthrough_translations_total").increment(1);
    }

    pub fn inc_escalation(&self) {
        self.escalations_total.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("tabi_escalations_total").increment(1);
    }

    pub fn inc_location_unresolved(&self) {
        self.location_unresolved_total
            .fetch_add(1, Ordering::Relaxed);
        metrics::counter!("tabi_location_unresolved_total").increment(1);
    }

    pub fn inc_cancelled(&self) {
        self.cancelled_turns_total.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("tabi_cancelled_turns_total").increment(1);
    }

    pub fn observe_latency(&self, duration: Duration) {
        self.total_latency_millis
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
        metrics::histogram!("tabi_turn_latency_seconds").record(duration.as_secs_f64());
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let requests = self.requests_total.load(Ordering::Relaxed);
        let latency = self.total_latency_millis.load(Ordering::Relaxed);

        MetricsSnapshot {
            requests_total: requests,
            detection_cache_hits_total: self.detection_cache_hits_total.load(Ordering::Relaxed),
            translation_cache_hits_total: self
                .translation_cache_hits_total
                .load(Ordering::Relaxed),
            engine_fallbacks_total: self.engine_fallbacks_total.load(Ordering::Relaxed),
            low_quality_translations_total: self
                .low_quality_translations_total
                .load(Ordering::Relaxed),
            passthrough_translations_total: self
                .passthrough_translations_total
                .load(Ordering::Relaxed),
            escalations_total: self.escalations_total.load(Ordering::Relaxed),
            location_unresolved_total: self.location_unresolved_total.load(Ordering::Relaxed),
            cancelled_turns_total: self.cancelled_turns_total.load(Ordering::Relaxed),
            avg_latency_millis: if requests == 0 {
                0.0
            } else {
                latency as f64 / requests as f64
            },
        }
    }
}

pub fn init_tracing(service_name: &str) {
    TRACING_INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "{}=info,tabi_agents=info,tabi_language=info,tabi_location=info",
                service_name
            ))
        });

        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(true)
            .with_span_list(true)
            .init();
    });
}
