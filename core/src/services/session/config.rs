//! Configuration for the session service.

use portcullis_shared::config::{CoreConfig, KeySettings, SessionSettings};

/// Configuration for the session service
#[derive(Debug, Clone)]
pub struct SessionServiceConfig {
    /// Token validities, rotation race window, and the legacy signing secret
    pub session: SessionSettings,
    /// Dynamic signing key rotation and verification retention
    pub keys: KeySettings,
    /// Attempt budget for the optimistic refresh rotation loop
    pub max_atomic_attempts: u32,
}

impl Default for SessionServiceConfig {
    fn default() -> Self {
        Self {
            session: SessionSettings::default(),
            keys: KeySettings::default(),
            max_atomic_attempts: 10,
        }
    }
}

impl From<&CoreConfig> for SessionServiceConfig {
    fn from(config: &CoreConfig) -> Self {
        Self {
            session: config.session.clone(),
            keys: config.keys.clone(),
            ..Self::default()
        }
    }
}
