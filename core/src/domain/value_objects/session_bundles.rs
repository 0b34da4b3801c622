//! Result bundles returned by the session service operations.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use portcullis_shared::types::{SessionInfoPayload, SessionResponse, TokenPayload};

use crate::domain::entities::{AccessTokenClaims, SessionRecord, TokenBundle};

/// Session identity as handed back to callers.
///
/// Carries only what the client is allowed to see; the server-side data blob
/// never leaves the store through this type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub handle: String,
    pub user_id: String,
    pub user_data_in_jwt: Value,
}

impl From<&SessionRecord> for SessionSummary {
    fn from(record: &SessionRecord) -> Self {
        Self {
            handle: record.session_handle.clone(),
            user_id: record.user_id.clone(),
            user_data_in_jwt: record.user_data_in_jwt.clone(),
        }
    }
}

impl From<&AccessTokenClaims> for SessionSummary {
    fn from(claims: &AccessTokenClaims) -> Self {
        Self {
            handle: claims.session_handle.clone(),
            user_id: claims.user_id.clone(),
            user_data_in_jwt: claims.user_data.clone(),
        }
    }
}

impl From<&SessionSummary> for SessionInfoPayload {
    fn from(summary: &SessionSummary) -> Self {
        Self {
            handle: summary.handle.clone(),
            user_id: summary.user_id.clone(),
            user_data_in_jwt: summary.user_data_in_jwt.clone(),
        }
    }
}

fn token_payload(bundle: &TokenBundle) -> TokenPayload {
    TokenPayload {
        token: bundle.token.clone(),
        expiry: bundle.expiry,
        created_time: bundle.created_time,
    }
}

/// Everything minted when a session is created.
#[derive(Debug, Clone, PartialEq)]
pub struct CreatedSession {
    pub session: SessionSummary,
    pub access_token: TokenBundle,
    pub refresh_token: TokenBundle,
    pub id_refresh_token: TokenBundle,
    pub anti_csrf_token: Option<String>,
}

impl CreatedSession {
    /// Shapes the bundle into the wire response
    pub fn into_response(self) -> SessionResponse {
        SessionResponse::ok((&self.session).into())
            .with_access_token(token_payload(&self.access_token))
            .with_refresh_tokens(
                token_payload(&self.refresh_token),
                token_payload(&self.id_refresh_token),
            )
            .with_anti_csrf_token(self.anti_csrf_token)
    }
}

/// Everything minted when a refresh token is rotated.
#[derive(Debug, Clone, PartialEq)]
pub struct RefreshedSession {
    pub session: SessionSummary,
    pub access_token: TokenBundle,
    pub refresh_token: TokenBundle,
    pub id_refresh_token: TokenBundle,
    pub anti_csrf_token: Option<String>,
}

impl RefreshedSession {
    /// Shapes the bundle into the wire response
    pub fn into_response(self) -> SessionResponse {
        SessionResponse::ok((&self.session).into())
            .with_access_token(token_payload(&self.access_token))
            .with_refresh_tokens(
                token_payload(&self.refresh_token),
                token_payload(&self.id_refresh_token),
            )
            .with_anti_csrf_token(self.anti_csrf_token)
    }
}

/// Outcome of verifying an access token.
#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedSession {
    pub session: SessionSummary,
    /// Present only when the token was re-signed under the current signing
    /// key; the client should replace its stored token
    pub access_token: Option<TokenBundle>,
}

impl VerifiedSession {
    /// Shapes the outcome into the wire response
    pub fn into_response(self) -> SessionResponse {
        let response = SessionResponse::ok((&self.session).into());
        match self.access_token {
            Some(token) => response.with_access_token(token_payload(&token)),
            None => response,
        }
    }
}

/// Outcome of regenerating the token-embedded claims.
#[derive(Debug, Clone, PartialEq)]
pub struct RegeneratedSession {
    pub session: SessionSummary,
    /// `None` when the presented token had already expired; the session row
    /// was still updated
    pub access_token: Option<TokenBundle>,
}

impl RegeneratedSession {
    /// Shapes the outcome into the wire response
    pub fn into_response(self) -> SessionResponse {
        let response = SessionResponse::ok((&self.session).into());
        match self.access_token {
            Some(token) => response.with_access_token(token_payload(&token)),
            None => response,
        }
    }
}
