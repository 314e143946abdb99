//! The persisted token record and the provider's token response.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

/// Body returned by the provider's token endpoint for both the
/// authorization-code and the refresh-token grants.
///
/// Only `access_token` is guaranteed; the provider may omit the rest, most
/// notably `refresh_token` on some refresh responses.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
    /// Provider fields this crate does not model
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TokenResponse {
    /// Response carrying nothing but an access token.
    pub fn with_access_token(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            token_type: None,
            scope: None,
            expires_in: None,
            extra: Map::new(),
        }
    }
}

impl std::fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenResponse")
            .field("access_token", &mask(&self.access_token))
            .field("refresh_token", &self.refresh_token.as_deref().map(mask))
            .field("token_type", &self.token_type)
            .field("scope", &self.scope)
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// OAuth credential persisted to the credential file.
///
/// Owned by [`CredentialStore`](crate::CredentialStore) and only changed by a
/// successful authorization or refresh. Unknown fields read from the file are
/// kept in `extra` and written back untouched.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scope: Vec<String>,
    /// Lifetime of `access_token` in seconds, as reported by the provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
    /// When `access_token` was issued or last confirmed valid
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub obtained_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Credential {
    /// Build the initial credential from an authorization-code exchange.
    pub fn from_response(response: TokenResponse, now: DateTime<Utc>) -> Self {
        Self {
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            token_type: response.token_type,
            scope: response.scope.unwrap_or_default(),
            expires_in: response.expires_in,
            obtained_at: Some(now),
            extra: response.extra,
        }
    }

    /// Merge a token response into this credential.
    ///
    /// Fields present in the response override the stored ones, absent fields are
    /// retained. A refresh response without `refresh_token` therefore keeps the
    /// previously stored refresh token.
    pub fn merge(&mut self, response: TokenResponse, now: DateTime<Utc>) {
        self.access_token = response.access_token;
        self.obtained_at = Some(now);

        if let Some(refresh_token) = response.refresh_token {
            self.refresh_token = Some(refresh_token);
        }
        if let Some(token_type) = response.token_type {
            self.token_type = Some(token_type);
        }
        if let Some(scope) = response.scope {
            self.scope = scope;
        }
        if let Some(expires_in) = response.expires_in {
            self.expires_in = Some(expires_in);
        }
        for (key, value) in response.extra {
            self.extra.insert(key, value);
        }
    }

    /// Record that the provider confirmed the access token is still valid.
    pub fn confirm_valid(&mut self, expires_in: u64, now: DateTime<Utc>) {
        self.expires_in = Some(expires_in);
        self.obtained_at = Some(now);
    }

    /// Instant at which the access token stops being valid, if known.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        let obtained_at = self.obtained_at?;
        let expires_in = i64::try_from(self.expires_in?).ok()?;
        obtained_at.checked_add_signed(ChronoDuration::seconds(expires_in))
    }

    /// Whether the access token is known to stay valid for at least `margin`.
    ///
    /// Returns `false` when the expiry cannot be determined.
    pub fn is_fresh(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        let Some(expires_at) = self.expires_at() else {
            return false;
        };
        let margin = ChronoDuration::from_std(margin).unwrap_or_else(|_| ChronoDuration::zero());
        now + margin < expires_at
    }

    /// True when a refresh grant can be attempted.
    pub fn can_refresh(&self) -> bool {
        self.refresh_token.as_deref().is_some_and(|t| !t.is_empty())
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &mask(&self.access_token))
            .field("refresh_token", &self.refresh_token.as_deref().map(mask))
            .field("token_type", &self.token_type)
            .field("scope", &self.scope)
            .field("expires_in", &self.expires_in)
            .field("obtained_at", &self.obtained_at)
            .finish()
    }
}

fn mask(secret: &str) -> String {
    if secret.len() <= 6 {
        "***".into()
    } else {
        format!("{}***", &secret[..3])
    }
}
