//! Session API request and response types
//!
//! The status vocabulary is closed: `OK`, `UNAUTHORISED`, `TRY_REFRESH_TOKEN`.
//! Auth-state outcomes at the verify/refresh routes travel inside a 200 body
//! via [`ResponseStatus`], never as 4xx codes; 401 is reserved for the API-key
//! gate and 500 for storage failures.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Closed response status vocabulary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResponseStatus {
    Ok,
    Unauthorised,
    TryRefreshToken,
}

/// A minted token as it appears on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPayload {
    /// The token string itself
    pub token: String,

    /// Expiry as epoch milliseconds
    pub expiry: i64,

    /// Creation instant as epoch milliseconds
    pub created_time: i64,
}

/// Session identity returned alongside tokens
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfoPayload {
    /// Opaque session handle, stable across refreshes
    pub handle: String,

    /// Subject the session belongs to
    pub user_id: String,

    /// Claims embedded in every access token for this session
    #[serde(rename = "userDataInJWT")]
    pub user_data_in_jwt: Value,
}

/// Body of `POST /recipe/session`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    pub user_id: String,

    #[serde(rename = "userDataInJWT", default)]
    pub user_data_in_jwt: Option<Value>,

    #[serde(default)]
    pub user_data_in_database: Option<Value>,

    #[serde(default)]
    pub enable_anti_csrf: Option<bool>,

    #[serde(default)]
    pub use_dynamic_signing_key: Option<bool>,
}

/// Body of `POST /recipe/session/verify`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifySessionRequest {
    pub access_token: String,

    #[serde(default)]
    pub anti_csrf_token: Option<String>,

    pub do_anti_csrf_check: bool,

    #[serde(default)]
    pub check_database: Option<bool>,
}

/// Body of `POST /recipe/session/refresh`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshSessionRequest {
    pub refresh_token: String,

    #[serde(default)]
    pub anti_csrf_token: Option<String>,

    pub enable_anti_csrf: bool,
}

/// Body of `PUT /recipe/session/regenerate`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegenerateTokenRequest {
    pub access_token: String,

    #[serde(rename = "userDataInJWT", default)]
    pub user_data_in_jwt: Option<Value>,
}

/// Body of `POST /recipe/session/remove`
///
/// Exactly one of the two fields is expected; handles win when both are set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevokeSessionRequest {
    #[serde(default)]
    pub session_handles: Option<Vec<String>>,

    #[serde(default)]
    pub user_id: Option<String>,
}

/// Response for the create/verify/refresh/regenerate routes
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub status: ResponseStatus,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<SessionInfoPayload>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<TokenPayload>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<TokenPayload>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_refresh_token: Option<TokenPayload>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub anti_csrf_token: Option<String>,

    /// Human-readable reason on non-OK statuses
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl SessionResponse {
    /// Successful response carrying a session payload
    pub fn ok(session: SessionInfoPayload) -> Self {
        Self {
            status: ResponseStatus::Ok,
            session: Some(session),
            access_token: None,
            refresh_token: None,
            id_refresh_token: None,
            anti_csrf_token: None,
            message: None,
        }
    }

    /// Attach the access token
    pub fn with_access_token(mut self, token: TokenPayload) -> Self {
        self.access_token = Some(token);
        self
    }

    /// Attach the refresh and id-refresh tokens
    pub fn with_refresh_tokens(mut self, refresh: TokenPayload, id_refresh: TokenPayload) -> Self {
        self.refresh_token = Some(refresh);
        self.id_refresh_token = Some(id_refresh);
        self
    }

    /// Attach the anti-CSRF token
    pub fn with_anti_csrf_token(mut self, token: Option<String>) -> Self {
        self.anti_csrf_token = token;
        self
    }

    /// Session is gone; client must log in again
    pub fn unauthorised(message: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Unauthorised,
            session: None,
            access_token: None,
            refresh_token: None,
            id_refresh_token: None,
            anti_csrf_token: None,
            message: Some(message.into()),
        }
    }

    /// Access token unusable; client should call refresh and retry
    pub fn try_refresh_token(message: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::TryRefreshToken,
            session: None,
            access_token: None,
            refresh_token: None,
            id_refresh_token: None,
            anti_csrf_token: None,
            message: Some(message.into()),
        }
    }
}

/// Response for `POST /recipe/session/remove`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevokedSessionsResponse {
    pub status: ResponseStatus,
    pub session_handles_revoked: Vec<String>,
}

/// Response for `GET /recipe/session/user`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionHandlesResponse {
    pub status: ResponseStatus,
    pub session_handles: Vec<String>,
}
