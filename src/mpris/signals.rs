//! Translation of MPRIS signals into player events
//!
//! Kept free of D-Bus I/O so the transition rules can be tested directly.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::PlayerConfig;
use crate::track::{PlaybackState, Track};
use crate::tracker::PlayerEvent;
use crate::types::Microseconds;

use super::MPRIS_PREFIX;

/// A seek below this position restarts the current track.
const RESTART_POSITION: Microseconds = Microseconds::from_secs(2);

/// Seeks this soon after a transition belong to that transition.
const RESTART_DEBOUNCE: Duration = Duration::from_secs(2);

/// Player currently being followed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Followed {
    /// Well-known name, e.g. `org.mpris.MediaPlayer2.spotify`
    pub name: String,
    /// Unique connection name, e.g. `:1.500`, used as signal sender
    pub owner: String,
}

/// Outcome of a `NameOwnerChanged` signal
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OwnerChange {
    /// A matching player appeared and is now followed
    Followed(String),
    /// The followed player went away
    Lost(PlayerEvent),
    Ignored,
}

/// Stateful signal filter for the followed player
#[derive(Debug)]
pub struct SignalTranslator {
    players: PlayerConfig,
    followed: Option<Followed>,
    last_track: Option<Track>,
    last_transition: Option<Instant>,
}

impl SignalTranslator {
    pub fn new(players: PlayerConfig, followed: Option<Followed>) -> Self {
        Self {
            players,
            followed,
            last_track: None,
            last_transition: None,
        }
    }

    /// Player currently followed
    pub fn followed(&self) -> Option<&Followed> {
        self.followed.as_ref()
    }

    /// Remember the track already reported through the playback context, so
    /// its next metadata refresh is not taken for a transition
    pub fn seed(&mut self, track: Option<Track>, now: Instant) {
        self.last_track = track.filter(|t| !t.is_empty());
        self.last_transition = self.last_track.as_ref().map(|_| now);
    }

    fn is_followed(&self, sender: &str) -> bool {
        self.followed.as_ref().is_some_and(|f| f.owner == sender)
    }

    /// `Metadata` changed
    pub fn on_metadata(&mut self, sender: &str, track: Track, now: Instant) -> Option<PlayerEvent> {
        if !self.is_followed(sender) || track.is_empty() {
            return None;
        }

        let is_new = self
            .last_track
            .as_ref()
            .map_or(true, |last| !last.is_same_entry(&track));

        if !is_new {
            // Cosmetic refresh; keep the latest copy for restarts
            self.last_track = Some(track);
            return None;
        }

        self.last_track = Some(track.clone());
        self.last_transition = Some(now);
        Some(PlayerEvent::TrackChanged(Arc::new(track)))
    }

    /// `PlaybackStatus` changed
    pub fn on_status(&self, sender: &str, status: &str) -> Option<PlayerEvent> {
        if !self.is_followed(sender) {
            return None;
        }
        PlaybackState::from_mpris(status).map(PlayerEvent::PlaybackStateChanged)
    }

    /// `Seeked` signal: a jump back to the start is a new listen of the same
    /// track, which is how players report "repeat one"
    pub fn on_seeked(
        &mut self,
        sender: &str,
        position: Microseconds,
        now: Instant,
    ) -> Option<PlayerEvent> {
        if !self.is_followed(sender) || position >= RESTART_POSITION {
            return None;
        }

        let debounced = self
            .last_transition
            .is_some_and(|at| now.saturating_duration_since(at) < RESTART_DEBOUNCE);
        if debounced {
            return None;
        }

        let track = self.last_track.clone()?;
        self.last_transition = Some(now);
        Some(PlayerEvent::TrackChanged(Arc::new(track)))
    }

    /// `NameOwnerChanged` from the bus daemon
    pub fn on_owner_changed(&mut self, name: &str, old_owner: &str, new_owner: &str) -> OwnerChange {
        if !name.starts_with(MPRIS_PREFIX) || !self.players.allows(name) {
            return OwnerChange::Ignored;
        }

        let vanished = new_owner.is_empty() && !old_owner.is_empty();
        let appeared = !new_owner.is_empty() && old_owner.is_empty();

        if vanished && self.followed.as_ref().is_some_and(|f| f.name == name) {
            self.followed = None;
            self.last_track = None;
            self.last_transition = None;
            return OwnerChange::Lost(PlayerEvent::PlaybackStateChanged(PlaybackState::Stopped));
        }

        if appeared && self.followed.is_none() {
            self.followed = Some(Followed {
                name: name.to_string(),
                owner: new_owner.to_string(),
            });
            return OwnerChange::Followed(name.to_string());
        }

        OwnerChange::Ignored
    }
}
