use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

use crate::error::{ApiError, Result};

pub struct Metrics {
    registry: Registry,
    pub chat_turns: IntCounterVec,
    pub upstream_failures: IntCounterVec,
    pub dishes_indexed: IntCounter,
}

impl Metrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let chat_turns = IntCounterVec::new(
            Opts::new("food_surgeon_chat_turns_total", "Chat turns by outcome"),
            &["outcome"],
        )
        .map_err(internal)?;
        let upstream_failures = IntCounterVec::new(
            Opts::new(
                "food_surgeon_upstream_failures_total",
                "Failed calls to external services",
            ),
            &["service"],
        )
        .map_err(internal)?;
        let dishes_indexed = IntCounter::new(
            "food_surgeon_dishes_indexed_total",
            "Dishes upserted into the vector index",
        )
        .map_err(internal)?;

        registry
            .register(Box::new(chat_turns.clone()))
            .map_err(internal)?;
        registry
            .register(Box::new(upstream_failures.clone()))
            .map_err(internal)?;
        registry
            .register(Box::new(dishes_indexed.clone()))
            .map_err(internal)?;

        Ok(Self {
            registry,
            chat_turns,
            upstream_failures,
            dishes_indexed,
        })
    }

    pub fn record_outcome(&self, outcome: &str) {
        self.chat_turns.with_label_values(&[outcome]).inc();
    }

    pub fn record_failure(&self, err: &ApiError) {
        if let Some(service) = err.upstream() {
            self.upstream_failures.with_label_values(&[service]).inc();
        }
    }

    pub fn encode(&self) -> Result<(Vec<u8>, String)> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(internal)?;
        Ok((buffer, encoder.format_type().to_string()))
    }
}

fn internal(err: prometheus::Error) -> ApiError {
    ApiError::InternalError(format!("metrics: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_includes_recorded_counters() {
        let metrics = Metrics::new().unwrap();
        metrics.record_outcome("dishes");
        metrics.record_failure(&ApiError::StoreError("down".into()));
        metrics.record_failure(&ApiError::BadRequest("ignored".into()));

        let (body, content_type) = metrics.encode().unwrap();
        let text = String::from_utf8(body).unwrap();

        assert!(content_type.starts_with("text/plain"));
        assert!(text.contains("food_surgeon_chat_turns_total{outcome=\"dishes\"} 1"));
        assert!(text.contains("food_surgeon_upstream_failures_total{service=\"store\"} 1"));
        assert!(!text.contains("service=\"bad_request\""));
    }
}
