// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::{info, warn};
use url::form_urlencoded;

use crate::error::{AuthError, SyncError, TransportError};
use crate::http::{ApiRequest, ApiResponse, HttpClient};
use crate::token::TokenManager;

/// Maximum number of track IDs per write request
const WRITE_CHUNK: usize = 100;

/// Page size when listing playlist members
const PAGE_SIZE: usize = 100;

const SEARCH_LIMIT: usize = 5;

const TRACK_URI_PREFIX: &str = "spotify:track:";

/// Mutable playlist capability: membership reads, metadata search, and
/// batch writes. Every operation requires a valid access token.
#[async_trait]
pub trait PlaylistApi: Send + Sync {
    /// Verifies credentials by obtaining a usable access token
    async fn authenticate(&self) -> Result<(), SyncError>;

    /// Returns every member's track ID, concatenated across pages
    async fn list_items(&self, playlist_id: &str) -> Result<Vec<String>, SyncError>;

    /// Resolves title/artist metadata to a playlist-native track ID
    async fn search(&self, title: &str, artist: &str) -> Result<Option<String>, SyncError>;

    async fn add_items(&self, playlist_id: &str, ids: &[String]) -> Result<(), SyncError>;

    async fn remove_items(&self, playlist_id: &str, ids: &[String]) -> Result<(), SyncError>;
}

/// Playlist adapter over the web API, with transparent token refresh
pub struct WebPlaylistApi<C> {
    http: C,
    tokens: TokenManager<C>,
    base_url: String,
}

impl<C> WebPlaylistApi<C> {
    pub fn new(http: C, tokens: TokenManager<C>, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            http,
            tokens,
            base_url,
        }
    }
}

impl<C: HttpClient> WebPlaylistApi<C> {
    /// Executes a token-bearing request.
    ///
    /// On an unauthorized response the cached token is invalidated and the
    /// same request retried exactly once; a second rejection is fatal for
    /// the run. Non-auth failures surface immediately.
    async fn execute_authorized(&self, request: ApiRequest) -> Result<ApiResponse, SyncError> {
        let mut retried = false;
        loop {
            let token = self.tokens.get_valid_token().await?;
            let response = self.http.execute(request.clone().bearer(token.value)).await?;

            if response.status == 401 {
                if retried {
                    return Err(AuthError::TokenRejected.into());
                }
                warn!(url = %request.url, "access token rejected, forcing refresh");
                self.tokens.invalidate().await;
                retried = true;
                continue;
            }

            if !response.is_success() {
                return Err(TransportError::UnexpectedStatus {
                    url: request.url.clone(),
                    status: response.status,
                }
                .into());
            }

            return Ok(response);
        }
    }

    async fn search_once(&self, query: &str) -> Result<Option<String>, SyncError> {
        let params: String = form_urlencoded::Serializer::new(String::new())
            .append_pair("q", query)
            .append_pair("type", "track")
            .append_pair("limit", &SEARCH_LIMIT.to_string())
            .finish();
        let url = format!("{}/search?{}", self.base_url, params);

        let response = self.execute_authorized(ApiRequest::get(&url)).await?;
        let payload = response.json(&url)?;

        Ok(payload
            .pointer("/tracks/items/0/id")
            .and_then(Value::as_str)
            .map(String::from))
    }

    fn track_uris(ids: &[String]) -> Vec<String> {
        ids.iter()
            .map(|id| format!("{TRACK_URI_PREFIX}{id}"))
            .collect()
    }
}

#[async_trait]
impl<C: HttpClient> PlaylistApi for WebPlaylistApi<C> {
    async fn authenticate(&self) -> Result<(), SyncError> {
        self.tokens.get_valid_token().await?;
        info!("playlist API authenticated");
        Ok(())
    }

    async fn list_items(&self, playlist_id: &str) -> Result<Vec<String>, SyncError> {
        let mut ids = Vec::new();
        let mut offset = 0;

        // A short page signals the end of the list
        loop {
            let url = format!(
                "{}/playlists/{}/tracks?offset={}&limit={}&fields=items(track(id)),total",
                self.base_url, playlist_id, offset, PAGE_SIZE
            );
            let response = self.execute_authorized(ApiRequest::get(&url)).await?;
            let payload = response.json(&url)?;

            let items = payload
                .get("items")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();

            for item in &items {
                if let Some(id) = item.pointer("/track/id").and_then(Value::as_str) {
                    ids.push(id.to_string());
                }
            }

            if items.len() < PAGE_SIZE {
                break;
            }
            offset += PAGE_SIZE;
        }

        Ok(ids)
    }

    async fn search(&self, title: &str, artist: &str) -> Result<Option<String>, SyncError> {
        let strict = format!("track:{title} artist:{artist}");
        if let Some(id) = self.search_once(&strict).await? {
            return Ok(Some(id));
        }

        // Strict field query found nothing; retry as free text
        let lenient = format!("{title} {artist}");
        self.search_once(&lenient).await
    }

    async fn add_items(&self, playlist_id: &str, ids: &[String]) -> Result<(), SyncError> {
        if ids.is_empty() {
            return Ok(());
        }

        let url = format!("{}/playlists/{}/tracks", self.base_url, playlist_id);
        for chunk in ids.chunks(WRITE_CHUNK) {
            let body = json!({ "uris": Self::track_uris(chunk) });
            self.execute_authorized(ApiRequest::post(&url).json(body))
                .await?;
        }

        info!(count = ids.len(), playlist_id, "added tracks to playlist");
        Ok(())
    }

    async fn remove_items(&self, playlist_id: &str, ids: &[String]) -> Result<(), SyncError> {
        if ids.is_empty() {
            return Ok(());
        }

        let url = format!("{}/playlists/{}/tracks", self.base_url, playlist_id);
        for chunk in ids.chunks(WRITE_CHUNK) {
            let tracks: Vec<Value> = Self::track_uris(chunk)
                .into_iter()
                .map(|uri| json!({ "uri": uri }))
                .collect();
            self.execute_authorized(ApiRequest::delete(&url).json(json!({ "tracks": tracks })))
                .await?;
        }

        info!(count = ids.len(), playlist_id, "removed tracks from playlist");
        Ok(())
    }
}
