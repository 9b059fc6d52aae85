// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use async_trait::async_trait;
use tracing::{debug, info};

use crate::error::FeedError;
use crate::http::{ApiRequest, HttpClient};

use super::parse::{Track, parse_tracks};

/// Read-only source of recently-played tracks
#[async_trait]
pub trait TrackSource: Send + Sync {
    /// Fetches the station's recent plays, most recent first, truncated to
    /// `limit` entries.
    async fn get_recent_tracks(&self, station: &str, limit: usize)
    -> Result<Vec<Track>, FeedError>;
}

/// Track source backed by the public station feed API
pub struct RadioFeed<C> {
    http: C,
    base_url: String,
}

impl<C> RadioFeed<C> {
    pub fn new(http: C, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { http, base_url }
    }
}

#[async_trait]
impl<C: HttpClient> TrackSource for RadioFeed<C> {
    async fn get_recent_tracks(
        &self,
        station: &str,
        limit: usize,
    ) -> Result<Vec<Track>, FeedError> {
        let url = format!("{}/station/{}", self.base_url, station);
        debug!(station, "fetching station feed");

        let response = self.http.execute(ApiRequest::get(&url)).await?;
        if !response.is_success() {
            return Err(FeedError::BadStatus {
                status: response.status,
            });
        }

        let tracks = parse_tracks(&response.body, limit)?;
        info!(station, count = tracks.len(), "fetched station feed");
        Ok(tracks)
    }
}
