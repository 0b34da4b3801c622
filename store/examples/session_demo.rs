//! Walks a session through its whole life against the SQLite backend:
//! create, verify, rotate the refresh token, regenerate claims, revoke.
//!
//! Run with: cargo run --example session_demo

use std::sync::Arc;

use anyhow::Result;
use serde_json::json;

use portcullis_core::domain::entities::TokenVersion;
use portcullis_core::services::{CreateSessionParams, SessionService, SessionServiceConfig};
use portcullis_shared::clock::SystemClock;
use portcullis_store::SqliteSessionStore;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let store = Arc::new(SqliteSessionStore::in_memory().await?);
    let service = SessionService::new(
        store,
        SessionServiceConfig::default(),
        Arc::new(SystemClock),
    );

    let created = service
        .create_session(
            CreateSessionParams::new("demo-user")
                .with_jwt_data(json!({"role": "admin"}))
                .with_anti_csrf(true),
        )
        .await?;
    println!("created session {}", created.session.handle);
    println!("  access token expires at {}", created.access_token.expiry);

    let verified = service
        .get_session(
            &created.access_token.token,
            created.anti_csrf_token.as_deref(),
            true,
            false,
        )
        .await?;
    println!("verified as {}", verified.session.user_id);

    let refreshed = service
        .refresh_session(
            &created.refresh_token.token,
            created.anti_csrf_token.as_deref(),
            true,
            TokenVersion::V2,
        )
        .await?;
    println!("rotated refresh token for {}", refreshed.session.handle);

    let regenerated = service
        .regenerate_token(
            &refreshed.access_token.token,
            Some(json!({"role": "admin", "beta": true})),
        )
        .await?;
    println!("claims now {}", regenerated.session.user_data_in_jwt);

    let revoked = service.revoke_all_sessions_for_user("demo-user").await?;
    println!("revoked {} session(s)", revoked.len());

    Ok(())
}
