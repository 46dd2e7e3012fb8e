//! Metrics and observability utilities
//!
//! Prometheus-style metric names with a shared prefix. Recording is a no-op
//! until a recorder (e.g. the Prometheus exporter in the gateway) is installed.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};

/// Metrics prefix for all Inocua metrics
pub const METRICS_PREFIX: &str = "inocua";

/// Buckets for external model latency (in seconds)
pub const EXTERNAL_CALL_BUCKETS: &[f64] = &[
    0.050,  // 50ms
    0.100,  // 100ms
    0.250,  // 250ms
    0.500,  // 500ms
    1.000,  // 1s
    2.000,  // 2s
    5.000,  // 5s
    10.00,  // 10s
    30.00,  // 30s
];

/// Register all metric descriptions
pub fn register_metrics() {
    describe_counter!(
        format!("{}_chat_responses_total", METRICS_PREFIX),
        Unit::Count,
        "Chat responses by mode (links, answer, clarify, decline, unavailable)"
    );

    describe_histogram!(
        format!("{}_chat_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "End-to-end arbitration latency in seconds"
    );

    describe_histogram!(
        format!("{}_retrieval_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Retrieval latency (embedding + scoring) in seconds"
    );

    describe_gauge!(
        format!("{}_retrieval_max_score", METRICS_PREFIX),
        Unit::Count,
        "Highest cosine similarity observed by the last retrieval"
    );

    describe_counter!(
        format!("{}_embedding_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total embedding API requests"
    );

    describe_histogram!(
        format!("{}_embedding_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Embedding generation latency in seconds"
    );

    describe_counter!(
        format!("{}_completion_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total chat completion API requests"
    );

    describe_histogram!(
        format!("{}_completion_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Chat completion latency in seconds"
    );

    describe_counter!(
        format!("{}_rerank_fallbacks_total", METRICS_PREFIX),
        Unit::Count,
        "Reranks that fell back to the retrieval order"
    );

    describe_gauge!(
        format!("{}_corpus_chunks", METRICS_PREFIX),
        Unit::Count,
        "Chunks held by the in-memory store"
    );

    tracing::info!("Metrics registered");
}

/// Record one arbitration outcome
pub fn record_chat(duration_secs: f64, mode: &str) {
    counter!(
        format!("{}_chat_responses_total", METRICS_PREFIX),
        "mode" => mode.to_string()
    )
    .increment(1);

    histogram!(
        format!("{}_chat_duration_seconds", METRICS_PREFIX),
        "mode" => mode.to_string()
    )
    .record(duration_secs);
}

/// Record a retrieval pass
pub fn record_retrieval(duration_secs: f64, max_score: f32) {
    histogram!(format!("{}_retrieval_duration_seconds", METRICS_PREFIX)).record(duration_secs);
    gauge!(format!("{}_retrieval_max_score", METRICS_PREFIX)).set(max_score as f64);
}

/// Helper to record embedding metrics
pub fn record_embedding(duration_secs: f64, model: &str, success: bool) {
    record_external("embedding", duration_secs, model, success);
}

/// Helper to record completion metrics
pub fn record_completion(duration_secs: f64, model: &str, success: bool) {
    record_external("completion", duration_secs, model, success);
}

fn record_external(kind: &str, duration_secs: f64, model: &str, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_{}_requests_total", METRICS_PREFIX, kind),
        "model" => model.to_string(),
        "status" => status
    )
    .increment(1);

    if success {
        histogram!(
            format!("{}_{}_duration_seconds", METRICS_PREFIX, kind),
            "model" => model.to_string()
        )
        .record(duration_secs);
    }
}

/// Count a rerank that could not use the model's selection
pub fn record_rerank_fallback(reason: &'static str) {
    counter!(
        format!("{}_rerank_fallbacks_total", METRICS_PREFIX),
        "reason" => reason
    )
    .increment(1);
}

/// Publish the size of the loaded corpus
pub fn record_corpus(chunks: usize) {
    gauge!(format!("{}_corpus_chunks", METRICS_PREFIX)).set(chunks as f64);
}
