//! Application configuration loaded from environment variables.

use std::time::Duration;

/// Server and pipeline configuration with sensible defaults.
///
/// Every tunable the core depends on is externally settable; no core
/// logic depends on a specific value. Environment variables:
/// - `HOST` — bind address (default: `"0.0.0.0"`)
/// - `PORT` — listen port (default: `3000`)
/// - `RUST_LOG` — tracing filter directive (default: `"info"`)
/// - `LOCK_WAIT_SECS` — bounded wait for keyed locks (default: `3`)
/// - `LOCK_SWEEP_SECS` — idle lock entry sweep interval (default: `60`)
/// - `TICKET_TTL_SECS` — admission ticket TTL (default: `3600`)
/// - `ISSUANCE_BATCH_SIZE` — tickets granted per coupon per pass (default: `10`)
/// - `ISSUANCE_POLL_MS` — issuance worker interval (default: `100`)
/// - `RESERVATION_TTL_MINUTES` — stock hold TTL (default: `15`)
/// - `RESERVATION_SWEEP_SECS` — expiry sweep interval (default: `30`)
/// - `SEQUENCER_LANES` — checkout partitions (default: `8`)
/// - `SEQUENCER_LANE_CAPACITY` — buffered requests per lane (default: `256`)
/// - `RELAY_BATCH_SIZE` — outbox events per poll (default: `50`)
/// - `RELAY_POLL_MS` — outbox relay interval (default: `200`)
/// - `RELAY_MAX_RETRIES` — attempts before dead-lettering (default: `5`)
/// - `RELAY_BASE_DELAY_MS` — first retry backoff (default: `500`)
/// - `DLQ_ALERT_THRESHOLD` — dead letters before alerting (default: `10`)
/// - `DLQ_POLL_SECS` — dead-letter monitor interval (default: `60`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,

    pub lock_wait: Duration,
    pub lock_sweep_every: Duration,

    pub ticket_ttl: Duration,
    pub issuance_batch_size: usize,
    pub issuance_poll: Duration,

    pub reservation_ttl_minutes: i64,
    pub reservation_sweep_every: Duration,

    pub sequencer_lanes: usize,
    pub sequencer_lane_capacity: usize,

    pub relay_batch_size: usize,
    pub relay_poll: Duration,
    pub relay_max_retries: u32,
    pub relay_base_delay: Duration,

    pub dlq_alert_threshold: u64,
    pub dlq_poll: Duration,
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Loads configuration from environment variables, falling back to
    /// defaults.
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env_parse("PORT", 3000),
            log_level: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),

            lock_wait: Duration::from_secs(env_parse("LOCK_WAIT_SECS", 3)),
            lock_sweep_every: Duration::from_secs(env_parse("LOCK_SWEEP_SECS", 60)),

            ticket_ttl: Duration::from_secs(env_parse("TICKET_TTL_SECS", 3600)),
            issuance_batch_size: env_parse("ISSUANCE_BATCH_SIZE", 10),
            issuance_poll: Duration::from_millis(env_parse("ISSUANCE_POLL_MS", 100)),

            reservation_ttl_minutes: env_parse("RESERVATION_TTL_MINUTES", 15),
            reservation_sweep_every: Duration::from_secs(env_parse("RESERVATION_SWEEP_SECS", 30)),

            sequencer_lanes: env_parse("SEQUENCER_LANES", 8),
            sequencer_lane_capacity: env_parse("SEQUENCER_LANE_CAPACITY", 256),

            relay_batch_size: env_parse("RELAY_BATCH_SIZE", 50),
            relay_poll: Duration::from_millis(env_parse("RELAY_POLL_MS", 200)),
            relay_max_retries: env_parse("RELAY_MAX_RETRIES", 5),
            relay_base_delay: Duration::from_millis(env_parse("RELAY_BASE_DELAY_MS", 500)),

            dlq_alert_threshold: env_parse("DLQ_ALERT_THRESHOLD", 10),
            dlq_poll: Duration::from_secs(env_parse("DLQ_POLL_SECS", 60)),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            lock_wait: Duration::from_secs(3),
            lock_sweep_every: Duration::from_secs(60),
            ticket_ttl: Duration::from_secs(3600),
            issuance_batch_size: 10,
            issuance_poll: Duration::from_millis(100),
            reservation_ttl_minutes: 15,
            reservation_sweep_every: Duration::from_secs(30),
            sequencer_lanes: 8,
            sequencer_lane_capacity: 256,
            relay_batch_size: 50,
            relay_poll: Duration::from_millis(200),
            relay_max_retries: 5,
            relay_base_delay: Duration::from_millis(500),
            dlq_alert_threshold: 10,
            dlq_poll: Duration::from_secs(60),
        }
    }
}
