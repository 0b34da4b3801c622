//! Unit tests for the access token codec.

use std::sync::Arc;

use chrono::Duration;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::json;

use portcullis_shared::clock::ManualClock;
use portcullis_shared::config::KeySettings;
use portcullis_shared::Clock;

use crate::domain::entities::{AccessTokenClaims, KeyKind, TokenVersion};
use crate::errors::TokenError;
use crate::repositories::MockSessionStore;
use crate::services::signing_key::{material, SigningKeyStore};
use crate::services::token::{AccessTokenCodec, AccessTokenInput};

const LEGACY_SECRET: &str = "test-legacy-secret";

fn codec_fixture() -> (
    Arc<MockSessionStore>,
    Arc<ManualClock>,
    AccessTokenCodec<MockSessionStore>,
) {
    let store = Arc::new(MockSessionStore::new());
    let clock = Arc::new(ManualClock::starting_now());
    let keys = Arc::new(SigningKeyStore::new(
        store.clone(),
        KeySettings::default(),
        clock.clone(),
    ));
    let codec = AccessTokenCodec::new(
        keys,
        Duration::hours(1),
        LEGACY_SECRET.to_string(),
        clock.clone(),
    );
    (store, clock, codec)
}

fn input(handle: &str) -> AccessTokenInput {
    AccessTokenInput {
        session_handle: handle.to_string(),
        user_id: "user-1".to_string(),
        user_data: json!({"role": "admin"}),
        anti_csrf_token: None,
        lmrt: 1_000,
        expiry_override: None,
    }
}

/// Swap one character of a base64 section while keeping it valid base64
fn corrupt_section(token: &str, section: usize) -> String {
    let mut parts: Vec<String> = token.split('.').map(str::to_string).collect();
    let target = &mut parts[section];
    let original = target.chars().next().unwrap();
    let replacement = if original == 'B' { 'C' } else { 'B' };
    target.replace_range(0..1, &replacement.to_string());
    parts.join(".")
}

#[tokio::test]
async fn test_v2_token_round_trip() {
    let (_store, _clock, codec) = codec_fixture();

    let (bundle, minted_claims) = codec
        .create(TokenVersion::V2, false, input("handle-1"))
        .await
        .unwrap();
    assert_eq!(bundle.token.split('.').count(), 3);
    assert_eq!(bundle.expiry, minted_claims.expiry_time);

    let verified = codec.verify(&bundle.token).await.unwrap();
    assert_eq!(verified.claims, minted_claims);
    assert_eq!(verified.claims.ver, TokenVersion::V2);
    assert!(!verified.key_superseded);
}

#[tokio::test]
async fn test_v1_token_round_trip_under_legacy_secret() {
    let (_store, _clock, codec) = codec_fixture();

    let (bundle, _) = codec
        .create(TokenVersion::V1, false, input("handle-1"))
        .await
        .unwrap();
    let header = jsonwebtoken::decode_header(&bundle.token).unwrap();
    assert_eq!(header.alg, Algorithm::HS256);
    assert!(header.kid.is_none(), "legacy tokens carry no key id");

    let verified = codec.verify(&bundle.token).await.unwrap();
    assert_eq!(verified.claims.ver, TokenVersion::V1);
    assert!(!verified.key_superseded);
}

#[tokio::test]
async fn test_static_key_tokens_name_a_static_kid() {
    let (_store, _clock, codec) = codec_fixture();

    let (bundle, _) = codec
        .create(TokenVersion::V2, true, input("handle-1"))
        .await
        .unwrap();
    let header = jsonwebtoken::decode_header(&bundle.token).unwrap();
    assert!(header.kid.unwrap().starts_with("s-"));
}

#[tokio::test]
async fn test_expired_token_is_rejected_but_tolerated_by_regeneration_path() {
    let (_store, clock, codec) = codec_fixture();

    let (bundle, _) = codec
        .create(TokenVersion::V2, false, input("handle-1"))
        .await
        .unwrap();
    clock.advance(Duration::hours(1) + Duration::seconds(1));

    let strict = codec.verify(&bundle.token).await;
    assert!(matches!(strict, Err(TokenError::Expired)));

    let tolerant = codec.verify_ignoring_expiry(&bundle.token).await.unwrap();
    assert_eq!(tolerant.claims.session_handle, "handle-1");
}

#[tokio::test]
async fn test_expiry_override_pins_the_deadline() {
    let (_store, clock, codec) = codec_fixture();

    let pinned = clock.now_millis() + 5_000;
    let (bundle, claims) = codec
        .create(
            TokenVersion::V2,
            false,
            AccessTokenInput {
                expiry_override: Some(pinned),
                ..input("handle-1")
            },
        )
        .await
        .unwrap();
    assert_eq!(claims.expiry_time, pinned);
    assert_eq!(bundle.expiry, pinned);
}

#[tokio::test]
async fn test_tampered_payload_fails_signature_check() {
    let (_store, _clock, codec) = codec_fixture();

    let (bundle, _) = codec
        .create(TokenVersion::V2, false, input("handle-1"))
        .await
        .unwrap();
    let tampered = corrupt_section(&bundle.token, 1);

    let result = codec.verify(&tampered).await;
    assert!(matches!(
        result,
        Err(TokenError::InvalidSignature) | Err(TokenError::Malformed { .. })
    ));
}

#[tokio::test]
async fn test_garbage_is_malformed() {
    let (_store, _clock, codec) = codec_fixture();
    let result = codec.verify("definitely not a jwt").await;
    assert!(matches!(result, Err(TokenError::Malformed { .. })));
}

#[tokio::test]
async fn test_unknown_kid_is_rejected() {
    let (_store, _clock, codec) = codec_fixture();

    // A key that was never inserted into the store
    let ghost = material::generate_key_record(KeyKind::Dynamic, 0, chrono::Utc::now());
    let claims = AccessTokenClaims {
        session_handle: "handle-1".to_string(),
        user_id: "user-1".to_string(),
        user_data: json!({}),
        expiry_time: i64::MAX,
        time_created: 0,
        lmrt: 0,
        anti_csrf_token: None,
        ver: TokenVersion::V2,
    };
    let mut header = Header::new(Algorithm::EdDSA);
    header.kid = Some(ghost.key_id.clone());
    let token = encode(&header, &claims, &material::encoding_key(&ghost).unwrap()).unwrap();

    let result = codec.verify(&token).await;
    assert!(matches!(result, Err(TokenError::UnknownSigningKey { .. })));
}

#[tokio::test]
async fn test_version_claim_must_match_signature_algorithm() {
    let (_store, _clock, codec) = codec_fixture();

    // HS256-signed token claiming to be V2
    let claims = AccessTokenClaims {
        session_handle: "handle-1".to_string(),
        user_id: "user-1".to_string(),
        user_data: json!({}),
        expiry_time: i64::MAX,
        time_created: 0,
        lmrt: 0,
        anti_csrf_token: None,
        ver: TokenVersion::V2,
    };
    let token = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(LEGACY_SECRET.as_bytes()),
    )
    .unwrap();

    let result = codec.verify(&token).await;
    assert!(matches!(result, Err(TokenError::Malformed { .. })));
}

#[tokio::test]
async fn test_key_superseded_after_rotation_interval() {
    let (_store, clock, codec) = codec_fixture();

    let (bundle, _) = codec
        .create(TokenVersion::V2, false, input("handle-1"))
        .await
        .unwrap();

    // Next rotation bucket, still inside the verification retention window;
    // the token itself is long expired by now, hence the tolerant path
    clock.advance(KeySettings::default().rotation_interval() + Duration::minutes(1));
    let verified = codec.verify_ignoring_expiry(&bundle.token).await.unwrap();
    assert!(verified.key_superseded);
}
