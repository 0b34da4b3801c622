//! Unit tests for refresh-token rotation: the happy chain, racing devices,
//! replay classification, and theft detection.

use std::sync::Arc;

use chrono::Duration;
use serde_json::json;

use portcullis_shared::clock::ManualClock;

use crate::domain::entities::TokenVersion;
use crate::errors::SessionError;
use crate::repositories::{MockSessionStore, SessionStore};
use crate::services::session::{CreateSessionParams, SessionService, SessionServiceConfig};

fn service_fixture() -> (
    Arc<MockSessionStore>,
    Arc<ManualClock>,
    SessionService<MockSessionStore>,
) {
    let store = Arc::new(MockSessionStore::new());
    let clock = Arc::new(ManualClock::starting_now());
    let service = SessionService::new(
        store.clone(),
        SessionServiceConfig::default(),
        clock.clone(),
    );
    (store, clock, service)
}

async fn refresh(
    service: &SessionService<MockSessionStore>,
    token: &str,
) -> Result<crate::domain::value_objects::RefreshedSession, SessionError> {
    service
        .refresh_session(token, None, false, TokenVersion::V2)
        .await
}

#[tokio::test]
async fn test_refresh_rotates_through_a_chain() {
    let (store, _clock, service) = service_fixture();

    let created = service
        .create_session(CreateSessionParams::new("user-1").with_jwt_data(json!({"k": 1})))
        .await
        .unwrap();

    let first = refresh(&service, &created.refresh_token.token).await.unwrap();
    let second = refresh(&service, &first.refresh_token.token).await.unwrap();
    let third = refresh(&service, &second.refresh_token.token).await.unwrap();

    assert_eq!(third.session.handle, created.session.handle);
    assert_eq!(third.session.user_data_in_jwt, json!({"k": 1}));

    let tokens = [
        &created.refresh_token.token,
        &first.refresh_token.token,
        &second.refresh_token.token,
        &third.refresh_token.token,
    ];
    for (i, a) in tokens.iter().enumerate() {
        for b in tokens.iter().skip(i + 1) {
            assert_ne!(a, b);
        }
    }

    // Origin row plus one per rotation
    assert_eq!(store.count_past_tokens().await.unwrap(), 4);

    // Each hop also mints a fresh access token that verifies
    let verified = service
        .get_session(&third.access_token.token, None, false, false)
        .await
        .unwrap();
    assert_eq!(verified.session.user_id, "user-1");
}

#[tokio::test]
async fn test_refresh_rejects_garbage_and_tampering() {
    let (_store, _clock, service) = service_fixture();

    let created = service
        .create_session(CreateSessionParams::new("user-1"))
        .await
        .unwrap();

    // Not even token-shaped
    let err = refresh(&service, "garbage").await.unwrap_err();
    assert!(matches!(err, SessionError::InvalidRefreshTokenFormat { .. }));

    // Unknown wire version
    let versioned = created.refresh_token.token.replace(".V1", ".V9");
    let err = refresh(&service, &versioned).await.unwrap_err();
    assert!(matches!(err, SessionError::InvalidRefreshTokenFormat { .. }));

    // Right shape, undecryptable body
    let mut tampered = created.refresh_token.token.clone();
    let flipped = if tampered.starts_with('A') { "B" } else { "A" };
    tampered.replace_range(0..1, flipped);
    let err = refresh(&service, &tampered).await.unwrap_err();
    assert!(matches!(err, SessionError::Unauthorised { .. }));
}

#[tokio::test]
async fn test_refresh_of_revoked_session_is_unauthorised() {
    let (_store, _clock, service) = service_fixture();

    let created = service
        .create_session(CreateSessionParams::new("user-1"))
        .await
        .unwrap();
    service
        .revoke_sessions(&[created.session.handle.clone()])
        .await
        .unwrap();

    let err = refresh(&service, &created.refresh_token.token).await.unwrap_err();
    assert!(matches!(err, SessionError::Unauthorised { .. }));
}

#[tokio::test]
async fn test_refresh_of_expired_session_is_unauthorised() {
    let (_store, clock, service) = service_fixture();

    let created = service
        .create_session(CreateSessionParams::new("user-1"))
        .await
        .unwrap();

    // Default session lifetime is 100 days
    clock.advance(Duration::days(101));

    let err = refresh(&service, &created.refresh_token.token).await.unwrap_err();
    assert!(matches!(err, SessionError::Unauthorised { .. }));
}

#[tokio::test]
async fn test_replay_within_race_window_gets_parallel_token() {
    let (_store, _clock, service) = service_fixture();

    let created = service
        .create_session(CreateSessionParams::new("user-1"))
        .await
        .unwrap();

    let winner = refresh(&service, &created.refresh_token.token).await.unwrap();
    // The losing device replays the same token right away
    let loser = refresh(&service, &created.refresh_token.token).await.unwrap();

    assert_ne!(winner.refresh_token.token, loser.refresh_token.token);

    // Both lineages continue: the winner rotates normally, the loser's
    // parallel token is promoted when it shows up
    let winner_next = refresh(&service, &winner.refresh_token.token).await.unwrap();
    assert_eq!(winner_next.session.handle, created.session.handle);
}

#[tokio::test]
async fn test_parallel_token_promotes_then_rotates() {
    let (_store, _clock, service) = service_fixture();

    let created = service
        .create_session(CreateSessionParams::new("user-1"))
        .await
        .unwrap();

    let winner = refresh(&service, &created.refresh_token.token).await.unwrap();
    let loser = refresh(&service, &created.refresh_token.token).await.unwrap();

    // The losing device carries on with its parallel token: it gets
    // promoted to the head of the chain and rotates normally
    let continued = refresh(&service, &loser.refresh_token.token).await.unwrap();
    assert_eq!(continued.session.handle, created.session.handle);

    // That promotion retired the winner's lineage
    let err = refresh(&service, &winner.refresh_token.token).await.unwrap_err();
    assert!(matches!(err, SessionError::Unauthorised { .. }));
}

#[tokio::test]
async fn test_replay_outside_race_window_is_theft() {
    let (_store, clock, service) = service_fixture();

    let created = service
        .create_session(CreateSessionParams::new("user-1"))
        .await
        .unwrap();
    refresh(&service, &created.refresh_token.token).await.unwrap();

    // Default window is five minutes
    clock.advance(Duration::seconds(301));

    let err = refresh(&service, &created.refresh_token.token).await.unwrap_err();
    assert!(matches!(err, SessionError::Unauthorised { .. }));
}

#[tokio::test]
async fn test_replay_of_a_grandparent_is_theft_even_inside_window() {
    let (_store, _clock, service) = service_fixture();

    let created = service
        .create_session(CreateSessionParams::new("user-1"))
        .await
        .unwrap();

    let first = refresh(&service, &created.refresh_token.token).await.unwrap();
    refresh(&service, &first.refresh_token.token).await.unwrap();

    // The chain has moved two steps; only the immediate parent of the
    // current token is excused by the race window
    let err = refresh(&service, &created.refresh_token.token).await.unwrap_err();
    assert!(matches!(err, SessionError::Unauthorised { .. }));
}

#[tokio::test]
async fn test_concurrent_refreshes_of_the_same_token_both_succeed() {
    let (_store, _clock, service) = service_fixture();

    let created = service
        .create_session(CreateSessionParams::new("user-1"))
        .await
        .unwrap();
    let token = created.refresh_token.token.clone();

    let (a, b) = tokio::join!(refresh(&service, &token), refresh(&service, &token));

    let a = a.unwrap();
    let b = b.unwrap();
    assert_ne!(a.refresh_token.token, b.refresh_token.token);
    assert_eq!(a.session.handle, b.session.handle);
}

#[tokio::test]
async fn test_refresh_enforces_anti_csrf_binding() {
    let (_store, _clock, service) = service_fixture();

    let created = service
        .create_session(CreateSessionParams::new("user-1").with_anti_csrf(true))
        .await
        .unwrap();
    let anti_csrf = created.anti_csrf_token.clone().expect("value issued");

    // Wrong value is rejected outright, not with a try-refresh hint
    let err = service
        .refresh_session(
            &created.refresh_token.token,
            Some("not-it"),
            true,
            TokenVersion::V2,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::Unauthorised { .. }));

    // The right value rotates and hands out a fresh anti-CSRF token
    let refreshed = service
        .refresh_session(
            &created.refresh_token.token,
            Some(&anti_csrf),
            true,
            TokenVersion::V2,
        )
        .await
        .unwrap();
    assert!(refreshed.anti_csrf_token.is_some());
    assert_ne!(refreshed.anti_csrf_token, created.anti_csrf_token);
}

#[tokio::test]
async fn test_refresh_demanding_anti_csrf_on_unbound_session_fails() {
    let (_store, _clock, service) = service_fixture();

    let created = service
        .create_session(CreateSessionParams::new("user-1"))
        .await
        .unwrap();

    let err = service
        .refresh_session(
            &created.refresh_token.token,
            Some("anything"),
            true,
            TokenVersion::V2,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::Unauthorised { .. }));
}
