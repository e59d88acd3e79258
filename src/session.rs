//! Listening-session accounting
//!
//! [`SessionAccumulator`] holds everything known about the current listen:
//! the item, the open playback segment, the accumulated listening time and
//! whether the listen has been scrobbled. It is owned by the tracker's event
//! loop and mutated only from there, so it needs no locking.
//!
//! All operations take the current instant explicitly. The event loop passes
//! `Instant::now()`, tests pass constructed instants.

use std::time::Instant;

use tracing::debug;

use crate::track::{ItemRef, NowPlaying};
use crate::types::{ListenId, Milliseconds};

/// Listening time after which any track with a known length qualifies.
pub const DEFAULT_MIN_PLAYED: Milliseconds = Milliseconds::from_secs(240);

/// Fraction of the track length after which it qualifies.
pub const DEFAULT_MIN_FRACTION: f64 = 0.5;

/// Scrobble eligibility rule.
///
/// A listen qualifies once it reaches `min_played` OR `min_fraction` of the
/// track length. The length must be known for either condition to apply.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrobbleRule {
    pub min_played: Milliseconds,
    pub min_fraction: f64,
}

impl Default for ScrobbleRule {
    fn default() -> Self {
        Self {
            min_played: DEFAULT_MIN_PLAYED,
            min_fraction: DEFAULT_MIN_FRACTION,
        }
    }
}

impl ScrobbleRule {
    /// Evaluate the rule for `played` against a track of `duration_seconds`.
    #[must_use]
    pub fn is_satisfied(&self, played: Milliseconds, duration_seconds: Option<f64>) -> bool {
        let Some(duration_seconds) = duration_seconds else {
            return false;
        };

        let long_enough = played >= self.min_played;
        let fraction_reached =
            played.get() as f64 >= duration_seconds * self.min_fraction * 1000.0;

        long_enough || fraction_reached
    }
}

/// Snapshot of a listen that qualified for a scrobble.
///
/// Detached submission tasks work from this snapshot only and never touch the
/// accumulator.
#[derive(Debug, Clone)]
pub struct Retired {
    pub item: ItemRef,
    pub listen: ListenId,
    pub played: Milliseconds,
}

/// State of the current listen
#[derive(Debug)]
pub struct SessionAccumulator {
    current: Option<ItemRef>,
    listen: ListenId,
    segment_start: Option<Instant>,
    played: Milliseconds,
    scrobbled: bool,
}

impl SessionAccumulator {
    /// Start accounting from what the player reports at startup.
    ///
    /// A segment is opened only if the player is already playing.
    #[must_use]
    pub fn new(initial: Option<NowPlaying>, now: Instant) -> Self {
        let (current, segment_start) = match initial {
            Some(NowPlaying { item, state }) => {
                let start = state.is_playing().then_some(now);
                (Some(item), start)
            }
            None => (None, None),
        };

        Self {
            current,
            listen: ListenId::new(),
            segment_start,
            played: Milliseconds::default(),
            scrobbled: false,
        }
    }

    /// Item of the current listen
    #[must_use]
    pub fn current(&self) -> Option<&ItemRef> {
        self.current.as_ref()
    }

    /// Id of the current listen
    #[must_use]
    pub const fn listen(&self) -> ListenId {
        self.listen
    }

    /// Whether a playback segment is open
    #[must_use]
    pub const fn is_segment_open(&self) -> bool {
        self.segment_start.is_some()
    }

    /// Listening time accumulated from closed segments
    #[must_use]
    pub const fn played(&self) -> Milliseconds {
        self.played
    }

    /// Whether the current listen has been scrobbled
    #[must_use]
    pub const fn is_scrobbled(&self) -> bool {
        self.scrobbled
    }

    /// Listening time including the open segment, without closing it
    #[must_use]
    pub fn played_at(&self, now: Instant) -> Milliseconds {
        self.played + self.open_segment_length(now)
    }

    /// Playback resumed.
    ///
    /// A second `Playing` notification without a pause in between keeps the
    /// segment that is already open.
    pub fn resume(&mut self, now: Instant) {
        if self.segment_start.is_none() {
            self.segment_start = Some(now);
        }
    }

    /// Playback paused or stopped. Idempotent.
    pub fn pause(&mut self, now: Instant) {
        self.close_segment(now);
    }

    /// Whether the accumulated time qualifies the current listen
    #[must_use]
    pub fn is_eligible(&self, rule: &ScrobbleRule) -> bool {
        match &self.current {
            Some(item) if !self.scrobbled => {
                rule.is_satisfied(self.played, item.duration_seconds())
            }
            _ => false,
        }
    }

    /// Retire the current listen and start a new one for `incoming`.
    ///
    /// Closes the open segment, evaluates the outgoing listen, then resets all
    /// state for the incoming item with a segment open from `now`. Returns
    /// the outgoing listen when it qualifies for a scrobble.
    pub fn retire(
        &mut self,
        incoming: ItemRef,
        now: Instant,
        rule: &ScrobbleRule,
    ) -> Option<Retired> {
        let outgoing = self.take_eligible(now, rule);

        self.current = Some(incoming);
        self.listen = ListenId::new();
        self.played = Milliseconds::default();
        self.segment_start = Some(now);
        self.scrobbled = false;

        outgoing
    }

    /// Evaluate the current listen without starting a new one.
    ///
    /// The open segment is folded into the total first, and a new segment is
    /// started at `now` if playback was live, so repeated calls never count
    /// the same interval twice.
    pub fn take_eligible(&mut self, now: Instant, rule: &ScrobbleRule) -> Option<Retired> {
        let was_open = self.close_segment(now);
        if was_open {
            self.segment_start = Some(now);
        }

        if !self.is_eligible(rule) {
            if let Some(item) = &self.current {
                debug!(
                    "Not scrobbling {} ({} played, scrobbled: {})",
                    item.label(),
                    self.played,
                    self.scrobbled
                );
            }
            return None;
        }

        self.current.clone().map(|item| Retired {
            item,
            listen: self.listen,
            played: self.played,
        })
    }

    /// Record a successful scrobble for `listen`.
    ///
    /// Returns false when `listen` is no longer the current listen, in which
    /// case nothing changes.
    pub fn mark_scrobbled(&mut self, listen: ListenId) -> bool {
        if listen != self.listen {
            return false;
        }
        self.scrobbled = true;
        true
    }

    /// Fold the open segment into the total. Returns whether one was open.
    fn close_segment(&mut self, now: Instant) -> bool {
        let elapsed = self.open_segment_length(now);
        let was_open = self.segment_start.take().is_some();
        self.played += elapsed;
        was_open
    }

    fn open_segment_length(&self, now: Instant) -> Milliseconds {
        self.segment_start
            .map(|start| Milliseconds::from_duration(now.saturating_duration_since(start)))
            .unwrap_or_default()
    }
}
