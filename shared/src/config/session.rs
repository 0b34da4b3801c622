//! Session, signing-key, and cleanup settings

use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Session and token validity configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionSettings {
    /// Access token validity in seconds
    pub access_token_validity_secs: i64,

    /// Refresh token (and session) validity in seconds
    pub refresh_token_validity_secs: i64,

    /// Window after a rotation during which a replay of the just-retired
    /// refresh token is treated as a benign race instead of theft, in seconds
    pub rotation_race_window_secs: i64,

    /// Symmetric secret for legacy (V1) access tokens
    pub legacy_signing_secret: String,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            access_token_validity_secs: 3_600,      // 1 hour
            refresh_token_validity_secs: 8_640_000, // 100 days
            rotation_race_window_secs: 300,         // 5 minutes
            legacy_signing_secret: String::from("portcullis-dev-secret-change-in-production"),
        }
    }
}

impl SessionSettings {
    /// Set access token validity in minutes
    pub fn with_access_validity_minutes(mut self, minutes: i64) -> Self {
        self.access_token_validity_secs = minutes * 60;
        self
    }

    /// Set refresh token validity in days
    pub fn with_refresh_validity_days(mut self, days: i64) -> Self {
        self.refresh_token_validity_secs = days * 86_400;
        self
    }

    /// Set the benign-race window in seconds
    pub fn with_race_window_secs(mut self, secs: i64) -> Self {
        self.rotation_race_window_secs = secs;
        self
    }

    /// Check if using the default legacy secret (security warning)
    pub fn is_using_default_secret(&self) -> bool {
        self.legacy_signing_secret == "portcullis-dev-secret-change-in-production"
    }

    pub fn access_token_validity(&self) -> Duration {
        Duration::seconds(self.access_token_validity_secs)
    }

    pub fn refresh_token_validity(&self) -> Duration {
        Duration::seconds(self.refresh_token_validity_secs)
    }

    pub fn rotation_race_window(&self) -> Duration {
        Duration::seconds(self.rotation_race_window_secs)
    }
}

/// Signing-key rotation configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct KeySettings {
    /// How often a new dynamic signing key is minted, in seconds
    pub dynamic_key_rotation_interval_secs: i64,

    /// How long a superseded dynamic key keeps verifying tokens, in seconds.
    /// Must comfortably exceed the access token validity so tokens signed
    /// just before a rotation still verify after it.
    pub dynamic_key_verification_retention_secs: i64,
}

impl Default for KeySettings {
    fn default() -> Self {
        Self {
            dynamic_key_rotation_interval_secs: 604_800,        // 7 days
            dynamic_key_verification_retention_secs: 1_209_600, // 14 days
        }
    }
}

impl KeySettings {
    /// Set the dynamic key rotation interval in hours
    pub fn with_rotation_interval_hours(mut self, hours: i64) -> Self {
        self.dynamic_key_rotation_interval_secs = hours * 3_600;
        self
    }

    /// Set the verification retention in hours
    pub fn with_verification_retention_hours(mut self, hours: i64) -> Self {
        self.dynamic_key_verification_retention_secs = hours * 3_600;
        self
    }

    pub fn rotation_interval(&self) -> Duration {
        Duration::seconds(self.dynamic_key_rotation_interval_secs)
    }

    pub fn verification_retention(&self) -> Duration {
        Duration::seconds(self.dynamic_key_verification_retention_secs)
    }
}

/// Background cleanup configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CleanupSettings {
    /// Interval between sweep runs, in seconds
    pub interval_secs: u64,

    /// How long past-token rows are retained once their session is gone, in
    /// seconds. Must exceed the rotation race window or theft detection loses
    /// the history it needs.
    pub past_token_retention_secs: i64,

    /// Per-sweep timeout, in seconds
    pub sweep_timeout_secs: u64,

    /// Whether the background task runs at all
    pub enabled: bool,
}

impl Default for CleanupSettings {
    fn default() -> Self {
        Self {
            interval_secs: 43_200,              // 12 hours
            past_token_retention_secs: 604_800, // 7 days
            sweep_timeout_secs: 30,
            enabled: true,
        }
    }
}

impl CleanupSettings {
    /// Set the sweep interval in hours
    pub fn with_interval_hours(mut self, hours: u64) -> Self {
        self.interval_secs = hours * 3_600;
        self
    }

    /// Set past-token retention in days
    pub fn with_retention_days(mut self, days: i64) -> Self {
        self.past_token_retention_secs = days * 86_400;
        self
    }

    pub fn past_token_retention(&self) -> Duration {
        Duration::seconds(self.past_token_retention_secs)
    }
}
