//! MPRIS metadata parsing

use std::collections::HashMap;
use zbus::zvariant::OwnedValue;

use crate::track::Track;
use crate::types::Microseconds;

use super::{extract, extract_first_text, extract_text};

/// Parse MPRIS metadata into a Track.
///
/// Blank strings, non-positive lengths and non-positive track numbers are
/// treated as unknown.
pub fn parse_metadata(metadata: &HashMap<String, OwnedValue>) -> Track {
    let text = |key: &str| metadata.get(key).and_then(extract_text);
    let first = |key: &str| metadata.get(key).and_then(extract_first_text);

    Track {
        track_id: text("mpris:trackid"),
        title: text("xesam:title"),
        // Artist lists: only the first entry is submitted
        artist: first("xesam:artist"),
        album: text("xesam:album"),
        album_artist: first("xesam:albumArtist"),
        track_number: metadata
            .get("xesam:trackNumber")
            .and_then(extract::<i32>)
            .filter(|n| *n > 0),
        duration: metadata
            .get("mpris:length")
            .and_then(extract::<i64>)
            .filter(|us| *us > 0)
            .map(Microseconds::new),
        musicbrainz_track_id: text("xesam:musicBrainzTrackID"),
    }
}
