//! Shared helpers for store integration tests.

use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use uuid::Uuid;

use portcullis_core::domain::entities::{PastTokenRecord, SessionRecord};

/// Current time truncated to millisecond precision, matching what the
/// SQLite backend stores; keeps round-trip equality assertions exact
pub fn now_millis() -> DateTime<Utc> {
    DateTime::from_timestamp_millis(Utc::now().timestamp_millis()).expect("timestamp in range")
}

pub fn session_record(user_id: &str, now: DateTime<Utc>) -> SessionRecord {
    SessionRecord {
        session_handle: Uuid::new_v4().to_string(),
        user_id: user_id.to_string(),
        refresh_token_hash2: format!("hash2-{}", Uuid::new_v4()),
        user_data_in_database: json!({"notes": "server side"}),
        user_data_in_jwt: json!({"role": "user"}),
        created_at: now,
        expires_at: now + Duration::days(100),
    }
}

pub fn past_token_record(
    session_handle: &str,
    parent_hash2: &str,
    created_at: DateTime<Utc>,
) -> PastTokenRecord {
    PastTokenRecord {
        refresh_token_hash2: format!("hash2-{}", Uuid::new_v4()),
        session_handle: session_handle.to_string(),
        parent_refresh_token_hash2: parent_hash2.to_string(),
        created_at,
    }
}
