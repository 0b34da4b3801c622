//! Configuration for the session core.
//!
//! All values come from defaults, builder methods, or environment variables
//! (`PORTCULLIS_*`); there is no config-file loading here. Durations are
//! stored as plain integer fields so the structs stay serde-friendly, with
//! accessor methods returning `chrono::Duration` for call sites.

pub mod session;

use serde::{Deserialize, Serialize};

// Re-export commonly used types
pub use session::{CleanupSettings, KeySettings, SessionSettings};

/// Complete configuration for the session core
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CoreConfig {
    /// Session and token validity
    #[serde(default)]
    pub session: SessionSettings,

    /// Signing-key rotation
    #[serde(default)]
    pub keys: KeySettings,

    /// Background cleanup
    #[serde(default)]
    pub cleanup: CleanupSettings,

    /// API keys accepted by the HTTP gate; empty disables the gate
    #[serde(default)]
    pub api_keys: Vec<String>,
}

impl CoreConfig {
    /// Create from environment variables, falling back to defaults for
    /// anything unset or unparseable
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(v) = std::env::var("PORTCULLIS_ACCESS_TOKEN_VALIDITY") {
            config.session.access_token_validity_secs =
                v.parse().unwrap_or(config.session.access_token_validity_secs);
        }
        if let Ok(v) = std::env::var("PORTCULLIS_REFRESH_TOKEN_VALIDITY") {
            config.session.refresh_token_validity_secs =
                v.parse().unwrap_or(config.session.refresh_token_validity_secs);
        }
        if let Ok(v) = std::env::var("PORTCULLIS_ROTATION_RACE_WINDOW") {
            config.session.rotation_race_window_secs =
                v.parse().unwrap_or(config.session.rotation_race_window_secs);
        }
        if let Ok(v) = std::env::var("PORTCULLIS_LEGACY_SIGNING_SECRET") {
            config.session.legacy_signing_secret = v;
        }
        if let Ok(v) = std::env::var("PORTCULLIS_DYNAMIC_KEY_INTERVAL") {
            config.keys.dynamic_key_rotation_interval_secs = v
                .parse()
                .unwrap_or(config.keys.dynamic_key_rotation_interval_secs);
        }
        if let Ok(v) = std::env::var("PORTCULLIS_KEY_RETENTION") {
            config.keys.dynamic_key_verification_retention_secs = v
                .parse()
                .unwrap_or(config.keys.dynamic_key_verification_retention_secs);
        }
        if let Ok(v) = std::env::var("PORTCULLIS_CLEANUP_INTERVAL") {
            config.cleanup.interval_secs = v.parse().unwrap_or(config.cleanup.interval_secs);
        }
        if let Ok(v) = std::env::var("PORTCULLIS_PAST_TOKEN_RETENTION") {
            config.cleanup.past_token_retention_secs =
                v.parse().unwrap_or(config.cleanup.past_token_retention_secs);
        }
        if let Ok(v) = std::env::var("PORTCULLIS_API_KEYS") {
            config.api_keys = v
                .split(',')
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty())
                .collect();
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_config_default_has_no_api_keys() {
        let config = CoreConfig::default();
        assert!(config.api_keys.is_empty());
        assert!(config.cleanup.enabled);
    }

    #[test]
    fn test_core_config_round_trips_through_json() {
        let config = CoreConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: CoreConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(
            back.session.access_token_validity_secs,
            config.session.access_token_validity_secs
        );
        assert_eq!(back.keys.dynamic_key_rotation_interval_secs, 604_800);
    }
}
