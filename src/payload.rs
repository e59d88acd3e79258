//! Scrobble payload projection
//!
//! Builds the request payload for the scrobbling service from a playing item.
//! Fields the item cannot resolve are left out entirely, because the service
//! treats a missing field differently from an empty one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::track::MediaItem;

/// Request payload shared by "now playing" and scrobble submissions
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrobblePayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub track: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub album_artist: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub track_number: Option<String>,

    /// MusicBrainz recording id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mbid: Option<String>,

    /// Whole seconds since the Unix epoch
    pub timestamp: String,
}

impl ScrobblePayload {
    /// Form parameters in service naming, absent fields omitted
    #[must_use]
    pub fn to_params(&self) -> Vec<(&'static str, String)> {
        let optional = [
            ("track", &self.track),
            ("artist", &self.artist),
            ("album", &self.album),
            ("albumArtist", &self.album_artist),
            ("trackNumber", &self.track_number),
            ("mbid", &self.mbid),
        ];

        optional
            .into_iter()
            .filter_map(|(key, value)| value.clone().map(|v| (key, v)))
            .chain(std::iter::once(("timestamp", self.timestamp.clone())))
            .collect()
    }

    /// Short label for log lines
    #[must_use]
    pub fn label(&self) -> String {
        format!(
            "{} - {}",
            self.artist.as_deref().unwrap_or("Unknown"),
            self.track.as_deref().unwrap_or("Unknown")
        )
    }
}

/// Resolve the metadata of `item` into a payload stamped with `captured_at`.
///
/// The async accessors are awaited concurrently. Pure with respect to the
/// caller's state, so it can run for several items at once.
pub async fn project(item: &dyn MediaItem, captured_at: DateTime<Utc>) -> ScrobblePayload {
    let (track, artist, album, album_artist, mbid) = tokio::join!(
        item.title(),
        item.artist_name(),
        item.album_title(),
        item.album_artist_name(),
        item.external_id(),
    );

    ScrobblePayload {
        track,
        artist,
        album,
        album_artist,
        track_number: item.track_number().map(|n| n.to_string()),
        mbid,
        timestamp: captured_at.timestamp().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::track::Track;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).single().expect("valid timestamp")
    }

    #[tokio::test]
    async fn test_project_full_track() {
        let track = Track {
            title: Some("Teardrop".to_string()),
            artist: Some("Massive Attack".to_string()),
            album: Some("Mezzanine".to_string()),
            album_artist: Some("Massive Attack".to_string()),
            track_number: Some(3),
            musicbrainz_track_id: Some("b1a9c0e9-d987-4042-ae91-78d6a3267d69".to_string()),
            ..Track::default()
        };

        let payload = project(&track, at(1_700_000_000)).await;
        assert_eq!(payload.track.as_deref(), Some("Teardrop"));
        assert_eq!(payload.album_artist.as_deref(), Some("Massive Attack"));
        assert_eq!(payload.track_number.as_deref(), Some("3"));
        assert_eq!(payload.timestamp, "1700000000");
    }

    #[tokio::test]
    async fn test_project_omits_unknown_fields() {
        let track = Track {
            title: Some("Untitled".to_string()),
            ..Track::default()
        };

        let payload = project(&track, at(42)).await;
        let json = serde_json::to_value(&payload).expect("serializable");
        let object = json.as_object().expect("object");

        assert_eq!(object.len(), 2);
        assert_eq!(object["track"], "Untitled");
        assert_eq!(object["timestamp"], "42");
        assert!(!object.contains_key("artist"));
        assert!(!object.contains_key("mbid"));
    }

    #[tokio::test]
    async fn test_project_keeps_empty_strings() {
        // Only unknown values are dropped; normalising blanks is the source's job.
        let track = Track {
            album: Some(String::new()),
            ..Track::default()
        };
        let payload = project(&track, at(0)).await;
        assert_eq!(payload.album.as_deref(), Some(""));
    }

    #[test]
    fn test_serialized_names_are_camel_case() {
        let payload = ScrobblePayload {
            album_artist: Some("A".to_string()),
            track_number: Some("1".to_string()),
            timestamp: "1".to_string(),
            ..ScrobblePayload::default()
        };
        let json = serde_json::to_string(&payload).expect("serializable");
        assert_eq!(json, r#"{"albumArtist":"A","trackNumber":"1","timestamp":"1"}"#);
    }

    #[test]
    fn test_to_params_skips_absent_fields() {
        let payload = ScrobblePayload {
            track: Some("T".to_string()),
            artist: Some("A".to_string()),
            timestamp: "99".to_string(),
            ..ScrobblePayload::default()
        };
        let params = payload.to_params();
        assert_eq!(
            params,
            vec![
                ("track", "T".to_string()),
                ("artist", "A".to_string()),
                ("timestamp", "99".to_string()),
            ]
        );
        assert_eq!(payload.label(), "A - T");
    }
}
