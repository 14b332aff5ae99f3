use once_cell::sync::Lazy;
use std::{env, time::Duration};

/// Holds all tunables, read-once from ENV with fallbacks.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Base URL of the backend serving `/env`, `/auth/token` and `/auth/refresh`.
    pub backend_url: String,
    /// A token is only handed out while `now < expires_at - refresh_margin`.
    pub refresh_margin: Duration,
    /// How long the authorization reentrancy guard stays set.
    pub auth_reentry_delay: Duration,
    /// Progress indicator refresh while a local track is active.
    pub progress_poll_interval: Duration,
    /// Remote "current playback" reconciliation period.
    pub background_poll_interval: Duration,
    pub verifier_length: usize,
    pub request_timeout: Duration,
    /// Display name the playback SDK registers the local device under.
    pub local_device_name: String,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            backend_url: "http://localhost:8000".to_string(),
            refresh_margin: Duration::from_secs(5 * 60),
            auth_reentry_delay: Duration::from_millis(2_000),
            progress_poll_interval: Duration::from_millis(500),
            background_poll_interval: Duration::from_secs(30),
            verifier_length: 64,
            request_timeout: Duration::from_secs(10),
            local_device_name: "Shadowfy".to_string(),
        }
    }
}

impl Settings {
    pub fn from_env() -> Self {
        // optionally load .env
        let _ = dotenvy::dotenv();

        let defaults = Settings::default();

        // helper to parse usize
        fn parse_usize(var: &str, default: usize) -> usize {
            env::var(var)
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default)
        }

        // helper to parse seconds into Duration
        fn parse_secs(var: &str, default: Duration) -> Duration {
            env::var(var)
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(default)
        }

        // helper to parse millis into Duration
        fn parse_millis(var: &str, default: Duration) -> Duration {
            env::var(var)
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_millis)
                .unwrap_or(default)
        }

        Settings {
            backend_url: env::var("SHADOWFY_BACKEND_URL").unwrap_or(defaults.backend_url),
            refresh_margin: parse_secs("REFRESH_MARGIN_SECS", defaults.refresh_margin),
            auth_reentry_delay: parse_millis("AUTH_REENTRY_DELAY_MS", defaults.auth_reentry_delay),
            progress_poll_interval: parse_millis(
                "PROGRESS_POLL_MS",
                defaults.progress_poll_interval,
            ),
            background_poll_interval: parse_secs(
                "BACKGROUND_POLL_SECS",
                defaults.background_poll_interval,
            ),
            verifier_length: parse_usize("VERIFIER_LENGTH", defaults.verifier_length).max(1),
            request_timeout: parse_secs("REQUEST_TIMEOUT_SECS", defaults.request_timeout),
            local_device_name: env::var("LOCAL_DEVICE_NAME").unwrap_or(defaults.local_device_name),
        }
    }
}

/// Global settings instance
pub static SETTINGS: Lazy<Settings> = Lazy::new(Settings::from_env);
