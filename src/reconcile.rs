// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::error::SyncError;
use crate::feed::Track;
use crate::playlist::PlaylistApi;

/// How the playlist is brought in line with a feed snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum ReconcilePolicy {
    /// Add feed tracks that are missing; never remove existing members
    #[default]
    Additive,
    /// Clear the playlist first, then add every matched feed track
    Rebuild,
}

/// Counters and diagnostics for one completed sync run
#[derive(Debug, Clone, Serialize)]
pub struct SyncResult {
    pub success: bool,
    pub timestamp: DateTime<Utc>,
    pub tracks_found: usize,
    pub tracks_matched: usize,
    pub tracks_added: usize,
    pub tracks_skipped: usize,
    /// Display forms of feed tracks with no resolvable playlist match
    pub tracks_failed: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SyncResult {
    fn new() -> Self {
        Self {
            success: false,
            timestamp: Utc::now(),
            tracks_found: 0,
            tracks_matched: 0,
            tracks_added: 0,
            tracks_skipped: 0,
            tracks_failed: Vec::new(),
            error: None,
        }
    }

    pub(crate) fn failed(message: String) -> Self {
        Self {
            error: Some(message),
            ..Self::new()
        }
    }
}

/// Converges the playlist towards the feed snapshot with the minimal set
/// of writes for the chosen policy.
///
/// Feed tracks are resolved to playlist-native IDs in feed order; a track
/// with no match lands in `tracks_failed` and the run still succeeds. An
/// empty snapshot short-circuits without touching the playlist.
pub async fn reconcile(
    target: &dyn PlaylistApi,
    playlist_id: &str,
    tracks: &[Track],
    policy: ReconcilePolicy,
) -> Result<SyncResult, SyncError> {
    let mut result = SyncResult::new();
    result.tracks_found = tracks.len();

    if tracks.is_empty() {
        result.success = true;
        return Ok(result);
    }

    let existing = target.list_items(playlist_id).await?;
    if policy == ReconcilePolicy::Rebuild && !existing.is_empty() {
        info!(count = existing.len(), "clearing existing playlist members");
        target.remove_items(playlist_id, &existing).await?;
    }
    let existing: HashSet<String> = existing.into_iter().collect();

    let mut to_add: Vec<String> = Vec::new();
    for track in tracks {
        match target.search(&track.title, track.primary_artist()).await? {
            Some(id) => {
                result.tracks_matched += 1;
                let already_member =
                    policy == ReconcilePolicy::Additive && existing.contains(&id);
                if already_member || to_add.contains(&id) {
                    result.tracks_skipped += 1;
                } else {
                    to_add.push(id);
                }
            }
            None => {
                warn!(track = %track, "no playlist match for feed track");
                result.tracks_failed.push(track.to_string());
            }
        }
    }

    if !to_add.is_empty() {
        target.add_items(playlist_id, &to_add).await?;
        result.tracks_added = to_add.len();
    }

    result.success = true;
    info!(
        found = result.tracks_found,
        matched = result.tracks_matched,
        added = result.tracks_added,
        skipped = result.tracks_skipped,
        unmatched = result.tracks_failed.len(),
        "reconciliation complete"
    );
    Ok(result)
}
