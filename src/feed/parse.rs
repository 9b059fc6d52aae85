// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::error::FeedError;

/// A single recently-played entry from the station feed
#[derive(Debug, Clone, Serialize)]
pub struct Track {
    pub title: String,
    pub artists: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,
}

impl Track {
    pub fn primary_artist(&self) -> &str {
        self.artists
            .first()
            .map(String::as_str)
            .unwrap_or("Unknown Artist")
    }

    pub fn artist_string(&self) -> String {
        self.artists.join(", ")
    }
}

impl std::fmt::Display for Track {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} - {}", self.title, self.artist_string())
    }
}

/// Parse a station feed payload into tracks, most recent first.
///
/// Parsing is defensive: a malformed entry is skipped with a warning and an
/// unparseable timestamp is dropped from its entry, never failing the fetch.
pub fn parse_tracks(payload: &[u8], limit: usize) -> Result<Vec<Track>, FeedError> {
    let value: Value = serde_json::from_slice(payload)?;
    let results = value
        .get("results")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let mut tracks = Vec::new();
    for entry in results.iter().take(limit) {
        match parse_entry(entry) {
            Some(track) => tracks.push(track),
            None => warn!("skipping malformed feed entry"),
        }
    }
    Ok(tracks)
}

fn parse_entry(entry: &Value) -> Option<Track> {
    let data = entry.get("track")?.as_object()?;

    let title = data
        .get("title")
        .and_then(Value::as_str)
        .unwrap_or("Unknown")
        .to_string();

    let artists = data
        .get("artists")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(String::from)
                .collect()
        })
        .unwrap_or_default();

    let timestamp = entry
        .get("timestamp")
        .and_then(Value::as_str)
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map(|dt| dt.with_timezone(&Utc));

    let source_id = data.get("id").and_then(Value::as_str).map(String::from);
    let album = data.get("album").and_then(Value::as_str).map(String::from);

    Some(Track {
        title,
        artists,
        timestamp,
        source_id,
        album,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_FEED: &str = r#"{
      "results": [
        {
          "timestamp": "2024-01-15T18:30:00Z",
          "track": {
            "id": "abc123",
            "title": "Gravity",
            "artists": ["John Mayer"],
            "album": "Continuum"
          }
        },
        {
          "timestamp": "2024-01-15T18:26:00Z",
          "track": {
            "id": "def456",
            "title": "Free Fallin'",
            "artists": ["Tom Petty", "The Heartbreakers"]
          }
        }
      ]
    }"#;

    #[test]
    fn parses_tracks_in_feed_order() {
        let tracks = parse_tracks(SAMPLE_FEED.as_bytes(), 50).unwrap();

        assert_eq!(tracks.len(), 2);
        assert_eq!(tracks[0].title, "Gravity");
        assert_eq!(tracks[0].artists, vec!["John Mayer"]);
        assert_eq!(tracks[0].source_id, Some("abc123".to_string()));
        assert_eq!(tracks[0].album, Some("Continuum".to_string()));
        assert!(tracks[0].timestamp.is_some());
        assert_eq!(tracks[1].title, "Free Fallin'");
    }

    #[test]
    fn respects_limit() {
        let tracks = parse_tracks(SAMPLE_FEED.as_bytes(), 1).unwrap();
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].title, "Gravity");
    }

    #[test]
    fn skips_malformed_entries() {
        let payload = r#"{
          "results": [
            {"track": "not an object"},
            {"no_track_key": true},
            {"track": {"title": "Kept", "artists": ["A"]}}
          ]
        }"#;

        let tracks = parse_tracks(payload.as_bytes(), 50).unwrap();

        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].title, "Kept");
    }

    #[test]
    fn bad_timestamp_is_dropped_not_fatal() {
        let payload = r#"{
          "results": [
            {"timestamp": "yesterday-ish", "track": {"title": "T", "artists": ["A"]}}
          ]
        }"#;

        let tracks = parse_tracks(payload.as_bytes(), 50).unwrap();

        assert_eq!(tracks.len(), 1);
        assert!(tracks[0].timestamp.is_none());
    }

    #[test]
    fn missing_results_key_yields_empty_list() {
        let tracks = parse_tracks(b"{}", 50).unwrap();
        assert!(tracks.is_empty());
    }

    #[test]
    fn invalid_json_is_an_error() {
        assert!(matches!(
            parse_tracks(b"<html>", 50),
            Err(FeedError::MalformedPayload(_))
        ));
    }

    #[test]
    fn primary_artist_falls_back_to_sentinel() {
        let track = Track {
            title: "T".into(),
            artists: vec![],
            timestamp: None,
            source_id: None,
            album: None,
        };
        assert_eq!(track.primary_artist(), "Unknown Artist");
    }

    #[test]
    fn display_joins_artists() {
        let track = Track {
            title: "Free Fallin'".into(),
            artists: vec!["Tom Petty".into(), "The Heartbreakers".into()],
            timestamp: None,
            source_id: None,
            album: None,
        };
        assert_eq!(
            track.to_string(),
            "Free Fallin' - Tom Petty, The Heartbreakers"
        );
    }
}
