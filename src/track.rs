//! Playing items and playback state
//!
//! The tracker only ever sees a playing item through [`MediaItem`], so the
//! MPRIS snapshot ([`Track`]) is one implementation among possible others.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::Microseconds;

/// Accessor for the metadata of a playing item.
///
/// Text fields may need I/O to resolve, so they are async. `None` means the
/// value is unknown.
#[async_trait]
pub trait MediaItem: Send + Sync + fmt::Debug {
    /// Track title
    async fn title(&self) -> Option<String>;

    /// Name of the track artist
    async fn artist_name(&self) -> Option<String>;

    /// Title of the album the track belongs to
    async fn album_title(&self) -> Option<String>;

    /// Name of the album artist
    async fn album_artist_name(&self) -> Option<String>;

    /// External identifier (MusicBrainz recording id)
    async fn external_id(&self) -> Option<String>;

    /// Position of the track on its album
    fn track_number(&self) -> Option<u32>;

    /// Track length in seconds
    fn duration_seconds(&self) -> Option<f64>;

    /// Short human-readable label for log lines
    fn label(&self) -> String;
}

/// Shared reference to a playing item
pub type ItemRef = Arc<dyn MediaItem>;

/// Player state as reported by the media player
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlaybackState {
    Playing,
    Paused,
    Stopped,
}

impl PlaybackState {
    /// Parse an MPRIS `PlaybackStatus` value
    #[must_use]
    pub fn from_mpris(status: &str) -> Option<Self> {
        match status {
            "Playing" => Some(Self::Playing),
            "Paused" => Some(Self::Paused),
            "Stopped" => Some(Self::Stopped),
            _ => None,
        }
    }

    /// Anything other than `Playing` counts as not listening
    #[must_use]
    pub const fn is_playing(self) -> bool {
        matches!(self, Self::Playing)
    }
}

/// What the player is doing right now
#[derive(Debug, Clone)]
pub struct NowPlaying {
    pub item: ItemRef,
    pub state: PlaybackState,
}

/// Reads the currently active item from the host player.
#[async_trait]
pub trait PlaybackContext: Send + Sync {
    /// Current item and playback state, or `None` when nothing is loaded
    async fn snapshot(&self) -> Result<Option<NowPlaying>>;
}

/// Track metadata from MPRIS
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Track {
    /// `mpris:trackid`, unique per playlist entry
    pub track_id: Option<String>,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub album_artist: Option<String>,
    pub track_number: Option<i32>,
    pub duration: Option<Microseconds>,
    pub musicbrainz_track_id: Option<String>,
}

impl Track {
    /// Whether `other` is the same playlist entry.
    ///
    /// Players refresh `Metadata` for cosmetic reasons (artwork loaded, rating
    /// changed), so identity is the track id when both sides have one and the
    /// title/artist/album triple otherwise.
    #[must_use]
    pub fn is_same_entry(&self, other: &Self) -> bool {
        match (&self.track_id, &other.track_id) {
            (Some(a), Some(b)) => a == b,
            _ => {
                self.title == other.title
                    && self.artist == other.artist
                    && self.album == other.album
            }
        }
    }

    /// Whether the snapshot carries anything worth tracking
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.artist.is_none() && self.track_id.is_none()
    }
}

#[async_trait]
impl MediaItem for Track {
    async fn title(&self) -> Option<String> {
        self.title.clone()
    }

    async fn artist_name(&self) -> Option<String> {
        self.artist.clone()
    }

    async fn album_title(&self) -> Option<String> {
        self.album.clone()
    }

    async fn album_artist_name(&self) -> Option<String> {
        self.album_artist.clone()
    }

    async fn external_id(&self) -> Option<String> {
        self.musicbrainz_track_id.clone()
    }

    fn track_number(&self) -> Option<u32> {
        self.track_number.and_then(|n| u32::try_from(n).ok())
    }

    fn duration_seconds(&self) -> Option<f64> {
        self.duration
            .filter(|d| d.get() > 0)
            .map(Microseconds::as_secs_f64)
    }

    fn label(&self) -> String {
        format!(
            "{} - {}",
            self.artist.as_deref().unwrap_or("Unknown"),
            self.title.as_deref().unwrap_or("Unknown")
        )
    }
}
