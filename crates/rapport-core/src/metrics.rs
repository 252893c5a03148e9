//! Metric names shared by the session and server crates.
//!
//! Recording happens through the `metrics` facade at the call site; the
//! Prometheus recorder is installed by the server.

/// WebSocket connections opened (counter, labels: role).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// Open WebSocket connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// Broadcast messages dropped on full client queues (counter).
pub const WS_BROADCAST_DROPS_TOTAL: &str = "ws_broadcast_drops_total";
/// Clients disconnected for falling behind (counter).
pub const WS_SLOW_DISCONNECTS_TOTAL: &str = "ws_slow_disconnects_total";
/// Live session actors (gauge).
pub const SESSIONS_ACTIVE: &str = "sessions_active";
/// Utterances run through the pipeline (counter).
pub const UTTERANCES_PROCESSED_TOTAL: &str = "utterances_processed_total";
/// Analyzer contributions skipped (counter, labels: analyzer).
pub const ANALYZER_FAILURES_TOTAL: &str = "analyzer_failures_total";
/// Coaching prompts displayed (counter, labels: `prompt_type`).
pub const COACHING_PROMPTS_TOTAL: &str = "coaching_prompts_total";
/// Persistence appends that exhausted their retries (counter).
pub const PERSISTENCE_FAILURES_TOTAL: &str = "persistence_failures_total";
/// Time to analyze and fan out one utterance (histogram).
pub const UTTERANCE_PIPELINE_SECONDS: &str = "utterance_pipeline_seconds";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_prometheus_safe() {
        for name in [
            WS_CONNECTIONS_TOTAL,
            WS_CONNECTIONS_ACTIVE,
            WS_BROADCAST_DROPS_TOTAL,
            WS_SLOW_DISCONNECTS_TOTAL,
            SESSIONS_ACTIVE,
            UTTERANCES_PROCESSED_TOTAL,
            ANALYZER_FAILURES_TOTAL,
            COACHING_PROMPTS_TOTAL,
            PERSISTENCE_FAILURES_TOTAL,
            UTTERANCE_PIPELINE_SECONDS,
        ] {
            assert!(name.chars().all(|c| c.is_ascii_lowercase() || c == '_'), "{name}");
        }
    }
}
