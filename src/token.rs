// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::time::{Duration, Instant};

use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::AuthError;
use crate::http::{ApiRequest, HttpClient};

/// Safety window before actual expiry during which a proactive refresh runs
const EXPIRY_SKEW: Duration = Duration::from_secs(60);

/// Fallback lifetime when the token endpoint omits `expires_in`
const DEFAULT_EXPIRES_IN: u64 = 3600;

/// OAuth client credentials plus the long-lived refresh token obtained
/// through the one-time authorization bootstrap.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
}

/// A short-lived access token and the instant it stops being usable
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub value: String,
    pub expires_at: Instant,
}

impl AccessToken {
    /// True when the token should be replaced before its next use
    pub fn needs_refresh(&self, now: Instant) -> bool {
        now + EXPIRY_SKEW >= self.expires_at
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Option<u64>,
}

/// Owns the access-token lifecycle for the playlist API.
///
/// The cached token never leaves the playlist adapter boundary; it is
/// superseded on every refresh.
pub struct TokenManager<C> {
    http: C,
    token_url: String,
    credentials: Credentials,
    current: Mutex<Option<AccessToken>>,
}

impl<C> TokenManager<C> {
    pub fn new(http: C, token_url: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            http,
            token_url: token_url.into(),
            credentials,
            current: Mutex::new(None),
        }
    }

    #[cfg(test)]
    pub(crate) async fn seed(&self, token: AccessToken) {
        *self.current.lock().await = Some(token);
    }
}

impl<C: HttpClient> TokenManager<C> {
    /// Returns a token valid for at least the skew margin, refreshing it
    /// against the token endpoint when the cached one is stale.
    pub async fn get_valid_token(&self) -> Result<AccessToken, AuthError> {
        let mut current = self.current.lock().await;

        if let Some(token) = current.as_ref() {
            if !token.needs_refresh(Instant::now()) {
                return Ok(token.clone());
            }
        }

        let token = self.refresh().await?;
        *current = Some(token.clone());
        Ok(token)
    }

    /// Forces the next `get_valid_token` call to refresh regardless of
    /// expiry. Called after the API rejects a token downstream.
    pub async fn invalidate(&self) {
        *self.current.lock().await = None;
    }

    async fn refresh(&self) -> Result<AccessToken, AuthError> {
        if self.credentials.refresh_token.is_empty() {
            return Err(AuthError::MissingRefreshToken);
        }

        debug!("refreshing access token");
        let request = ApiRequest::post(&self.token_url)
            .basic(&self.credentials.client_id, &self.credentials.client_secret)
            .form(vec![
                ("grant_type".into(), "refresh_token".into()),
                ("refresh_token".into(), self.credentials.refresh_token.clone()),
            ]);

        let response = self.http.execute(request).await?;
        if !response.is_success() {
            return Err(AuthError::RefreshRejected {
                status: response.status,
            });
        }

        let payload: TokenResponse = serde_json::from_slice(&response.body)?;
        let expires_in = payload.expires_in.unwrap_or(DEFAULT_EXPIRES_IN);
        info!(expires_in, "access token refreshed");

        Ok(AccessToken {
            value: payload.access_token,
            expires_at: Instant::now() + Duration::from_secs(expires_in),
        })
    }
}
