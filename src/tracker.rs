//! Playback event handling and scrobble submission
//!
//! The [`Tracker`] owns the [`SessionAccumulator`] and is driven by a single
//! event loop, so every mutation of the session happens on one task in
//! arrival order. Handlers finish all session bookkeeping synchronously and
//! only then spawn the network calls; those tasks see nothing but their own
//! snapshot and report back through the loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};

use crate::client::ScrobbleClient;
use crate::error::Result;
use crate::payload;
use crate::session::{Retired, ScrobbleRule, SessionAccumulator};
use crate::track::{ItemRef, NowPlaying, PlaybackState};
use crate::types::ListenId;

/// How long in-flight submissions may take to finish at shutdown
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Events delivered by the media player
#[derive(Debug, Clone)]
pub enum PlayerEvent {
    /// The active item changed, including a restart of the same item
    TrackChanged(ItemRef),
    /// Playback started, paused or stopped
    PlaybackStateChanged(PlaybackState),
}

/// Items compare by identity: the same reference, not equal metadata
impl PartialEq for PlayerEvent {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::PlaybackStateChanged(a), Self::PlaybackStateChanged(b)) => a == b,
            (Self::TrackChanged(a), Self::TrackChanged(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Eq for PlayerEvent {}

/// Result reported by a finished submission task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Submission {
    NowPlaying,
    Scrobble { listen: ListenId, succeeded: bool },
}

/// Cloneable handle that asks a running tracker to stop
#[derive(Debug, Clone)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    /// Stop the tracker.
    ///
    /// This method is synchronous as it only sets an atomic flag.
    pub fn stop(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Scrobble tracker for one player
pub struct Tracker {
    session: SessionAccumulator,
    rule: ScrobbleRule,
    client: Arc<dyn ScrobbleClient>,
    in_flight: JoinSet<Submission>,
    running: Arc<AtomicBool>,
    submit_on_exit: bool,
}

impl Tracker {
    /// Create a tracker starting from the player's current state
    pub fn new(
        client: Arc<dyn ScrobbleClient>,
        rule: ScrobbleRule,
        initial: Option<NowPlaying>,
        now: Instant,
    ) -> Self {
        if let Some(playing) = &initial {
            info!(
                "Starting with {} ({:?})",
                playing.item.label(),
                playing.state
            );
        }

        Self {
            session: SessionAccumulator::new(initial, now),
            rule,
            client,
            in_flight: JoinSet::new(),
            running: Arc::new(AtomicBool::new(true)),
            submit_on_exit: false,
        }
    }

    /// Evaluate the current listen when the tracker stops
    #[must_use]
    pub fn with_submit_on_exit(mut self, submit_on_exit: bool) -> Self {
        self.submit_on_exit = submit_on_exit;
        self
    }

    /// Current session state
    #[must_use]
    pub const fn session(&self) -> &SessionAccumulator {
        &self.session
    }

    /// Handle for stopping [`Tracker::run`] from another task
    #[must_use]
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle(Arc::clone(&self.running))
    }

    /// Dispatch a player event
    pub fn handle_event(&mut self, event: PlayerEvent, now: Instant) {
        match event {
            PlayerEvent::TrackChanged(item) => self.on_track_transition(item, now),
            PlayerEvent::PlaybackStateChanged(state) => self.on_playback_state(state, now),
        }
    }

    /// Convert playing/paused intervals into listening time
    pub fn on_playback_state(&mut self, state: PlaybackState, now: Instant) {
        if state.is_playing() {
            self.session.resume(now);
        } else {
            self.session.pause(now);
        }

        debug!(
            "Playback {:?}, {} listened so far",
            state,
            self.session.played_at(now)
        );
    }

    /// Retire the outgoing listen and announce the incoming item.
    ///
    /// The session is evaluated and reset before anything is spawned, so the
    /// scrobble always carries the outgoing item's metadata and later events
    /// already see the new listen.
    pub fn on_track_transition(&mut self, incoming: ItemRef, now: Instant) {
        info!("Track changed: {}", incoming.label());

        if let Some(retired) = self.session.retire(Arc::clone(&incoming), now, &self.rule) {
            self.spawn_scrobble(retired);
        }

        self.spawn_now_playing(incoming);
    }

    /// Wait for every in-flight submission and record the results
    pub async fn settle(&mut self) {
        while let Some(result) = self.in_flight.join_next().await {
            self.record(result);
        }
    }

    /// Run until the event source closes or [`StopHandle::stop`] is called
    pub async fn run(&mut self, mut events: mpsc::Receiver<PlayerEvent>) -> Result<()> {
        info!("Tracker running (scrobbling via {})", self.client.name());

        let mut tick = tokio::time::interval(Duration::from_secs(1));

        loop {
            // Check if we should stop
            if !self.running.load(Ordering::SeqCst) {
                break;
            }

            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => self.handle_event(event, Instant::now()),
                    None => {
                        info!("Event source closed, stopping...");
                        break;
                    }
                },
                Some(result) = self.in_flight.join_next(), if !self.in_flight.is_empty() => {
                    self.record(result);
                }
                _ = tick.tick() => {
                    // Periodic stop-flag check
                }
            }
        }

        self.finalize().await;
        Ok(())
    }

    fn spawn_scrobble(&mut self, retired: Retired) {
        let Retired {
            item,
            listen,
            played,
        } = retired;
        let client = Arc::clone(&self.client);

        info!("Scrobbling {} ({} played)", item.label(), played);

        self.in_flight.spawn(async move {
            let payload = payload::project(item.as_ref(), Utc::now()).await;
            let succeeded = match client.scrobble(&payload).await {
                Ok(response) => {
                    debug!(
                        "{} accepted {} / ignored {} for {}",
                        client.name(),
                        response.accepted,
                        response.ignored,
                        payload.label()
                    );
                    true
                }
                Err(e) => {
                    error!("Failed to scrobble {} to {}: {}", item.label(), client.name(), e);
                    false
                }
            };
            Submission::Scrobble { listen, succeeded }
        });
    }

    fn spawn_now_playing(&mut self, item: ItemRef) {
        let client = Arc::clone(&self.client);

        self.in_flight.spawn(async move {
            let payload = payload::project(item.as_ref(), Utc::now()).await;
            if let Err(e) = client.update_now_playing(&payload).await {
                error!(
                    "Failed to update now playing for {} on {}: {}",
                    item.label(),
                    client.name(),
                    e
                );
            }
            Submission::NowPlaying
        });
    }

    fn record(&mut self, result: std::result::Result<Submission, JoinError>) {
        match result {
            Ok(Submission::Scrobble {
                listen,
                succeeded: true,
            }) => {
                if !self.session.mark_scrobbled(listen) {
                    debug!("Scrobble for listen {} finished after the track changed", listen);
                }
            }
            Ok(Submission::Scrobble { .. } | Submission::NowPlaying) => {}
            Err(e) => error!("Submission task failed: {}", e),
        }
    }

    /// Optionally submit the current listen, then let in-flight work finish
    async fn finalize(&mut self) {
        if self.submit_on_exit {
            if let Some(retired) = self.session.take_eligible(Instant::now(), &self.rule) {
                info!("Submitting final listen before exit");
                self.spawn_scrobble(retired);
            }
        }

        if tokio::time::timeout(SHUTDOWN_GRACE, self.settle()).await.is_err() {
            warn!(
                "{} submissions still in flight after {}, giving up on them",
                self.in_flight.len(),
                humantime::format_duration(SHUTDOWN_GRACE)
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::client::ScrobbleResponse;
    use crate::error::Error;
    use crate::payload::ScrobblePayload;
    use crate::track::Track;
    use crate::types::{Microseconds, Milliseconds};

    /// Records submissions and optionally fails them
    #[derive(Default)]
    struct RecordingClient {
        now_playing: Mutex<Vec<ScrobblePayload>>,
        scrobbles: Mutex<Vec<ScrobblePayload>>,
        fail_scrobble: bool,
        fail_now_playing: bool,
    }

    impl RecordingClient {
        fn scrobbled_tracks(&self) -> Vec<String> {
            self.scrobbles
                .lock()
                .unwrap()
                .iter()
                .filter_map(|p| p.track.clone())
                .collect()
        }

        fn announced_tracks(&self) -> Vec<String> {
            self.now_playing
                .lock()
                .unwrap()
                .iter()
                .filter_map(|p| p.track.clone())
                .collect()
        }
    }

    #[async_trait]
    impl ScrobbleClient for RecordingClient {
        fn name(&self) -> &str {
            "recording"
        }

        async fn update_now_playing(&self, payload: &ScrobblePayload) -> Result<()> {
            self.now_playing.lock().unwrap().push(payload.clone());
            if self.fail_now_playing {
                return Err(Error::other("now playing rejected"));
            }
            Ok(())
        }

        async fn scrobble(&self, payload: &ScrobblePayload) -> Result<ScrobbleResponse> {
            self.scrobbles.lock().unwrap().push(payload.clone());
            if self.fail_scrobble {
                return Err(Error::api(11, "Service Offline"));
            }
            Ok(ScrobbleResponse {
                accepted: 1,
                ignored: 0,
            })
        }
    }

    fn item(title: &str, duration_secs: Option<i64>) -> ItemRef {
        Arc::new(Track {
            title: Some(title.to_string()),
            artist: Some("Artist".to_string()),
            duration: duration_secs.map(Microseconds::from_secs),
            ..Track::default()
        })
    }

    fn playing(item: ItemRef) -> Option<NowPlaying> {
        Some(NowPlaying {
            item,
            state: PlaybackState::Playing,
        })
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn tracker(client: &Arc<RecordingClient>, initial: Option<NowPlaying>, t0: Instant) -> Tracker {
        let client: Arc<dyn ScrobbleClient> = Arc::clone(client) as Arc<dyn ScrobbleClient>;
        Tracker::new(client, ScrobbleRule::default(), initial, t0)
    }

    #[tokio::test]
    async fn test_transition_scrobbles_outgoing_track() {
        let client = Arc::new(RecordingClient::default());
        let t0 = Instant::now();
        let mut tracker = tracker(&client, playing(item("A", Some(300))), t0);

        tracker.on_track_transition(item("B", Some(180)), t0 + ms(200_000));
        assert_eq!(tracker.session().played(), Milliseconds::default());
        assert!(tracker.session().is_segment_open());

        tracker.settle().await;
        assert_eq!(client.scrobbled_tracks(), vec!["A".to_string()]);
        assert_eq!(client.announced_tracks(), vec!["B".to_string()]);
        assert!(!tracker.session().is_scrobbled());
    }

    #[tokio::test]
    async fn test_pause_time_is_not_counted() {
        let client = Arc::new(RecordingClient::default());
        let t0 = Instant::now();
        let mut tracker = tracker(&client, playing(item("A", Some(300))), t0);

        // 100s + 50s around a 10 minute pause: exactly half of A
        tracker.on_playback_state(PlaybackState::Paused, t0 + ms(100_000));
        tracker.on_playback_state(PlaybackState::Playing, t0 + ms(700_000));
        tracker.on_track_transition(item("B", None), t0 + ms(750_000));
        tracker.settle().await;

        assert_eq!(client.scrobbled_tracks(), vec!["A".to_string()]);
    }

    #[tokio::test]
    async fn test_short_listen_is_not_scrobbled() {
        let client = Arc::new(RecordingClient::default());
        let t0 = Instant::now();
        let mut tracker = tracker(&client, playing(item("A", Some(300))), t0);

        tracker.on_track_transition(item("B", Some(300)), t0 + ms(149_999));
        tracker.settle().await;

        assert!(client.scrobbled_tracks().is_empty());
        assert_eq!(client.announced_tracks(), vec!["B".to_string()]);
    }

    #[tokio::test]
    async fn test_unknown_duration_is_never_scrobbled() {
        let client = Arc::new(RecordingClient::default());
        let t0 = Instant::now();
        let mut tracker = tracker(&client, playing(item("A", None)), t0);

        tracker.on_track_transition(item("B", Some(300)), t0 + ms(500_000));
        tracker.settle().await;

        assert!(client.scrobbled_tracks().is_empty());
    }

    #[tokio::test]
    async fn test_repeat_one_scrobbles_each_full_listen() {
        let client = Arc::new(RecordingClient::default());
        let t0 = Instant::now();
        let song = item("Loop", Some(100));
        let mut tracker = tracker(&client, playing(Arc::clone(&song)), t0);

        tracker.on_track_transition(Arc::clone(&song), t0 + ms(100_000));
        tracker.on_track_transition(Arc::clone(&song), t0 + ms(200_000));
        // Skipped after 10s: too short
        tracker.on_track_transition(item("Next", Some(100)), t0 + ms(210_000));
        tracker.settle().await;

        assert_eq!(client.scrobbled_tracks(), vec!["Loop".to_string(), "Loop".to_string()]);
        assert_eq!(client.announced_tracks().len(), 3);
    }

    #[tokio::test]
    async fn test_failed_scrobble_is_dropped_without_retry() {
        let client = Arc::new(RecordingClient {
            fail_scrobble: true,
            ..RecordingClient::default()
        });
        let t0 = Instant::now();
        let mut tracker = tracker(&client, playing(item("A", Some(300))), t0);

        tracker.on_track_transition(item("B", Some(300)), t0 + ms(200_000));
        tracker.on_track_transition(item("C", Some(300)), t0 + ms(201_000));
        tracker.settle().await;

        assert_eq!(client.scrobbled_tracks(), vec!["A".to_string()]);
        assert!(!tracker.session().is_scrobbled());
    }

    #[tokio::test]
    async fn test_now_playing_failure_does_not_affect_scrobbling() {
        let client = Arc::new(RecordingClient {
            fail_now_playing: true,
            ..RecordingClient::default()
        });
        let t0 = Instant::now();
        let mut tracker = tracker(&client, playing(item("A", Some(300))), t0);

        tracker.on_track_transition(item("B", Some(300)), t0 + ms(10_000));
        tracker.on_track_transition(item("C", Some(300)), t0 + ms(170_000));
        tracker.settle().await;

        assert_eq!(client.scrobbled_tracks(), vec!["B".to_string()]);
        assert_eq!(client.announced_tracks(), vec!["B".to_string(), "C".to_string()]);
    }

    #[tokio::test]
    async fn test_startup_without_playback_context() {
        let client = Arc::new(RecordingClient::default());
        let t0 = Instant::now();
        let mut tracker = tracker(&client, None, t0);

        tracker.on_playback_state(PlaybackState::Playing, t0);
        tracker.on_track_transition(item("A", Some(10)), t0 + ms(600_000));
        tracker.settle().await;

        assert!(client.scrobbled_tracks().is_empty());
        assert_eq!(client.announced_tracks(), vec!["A".to_string()]);
    }

    #[tokio::test]
    async fn test_run_processes_events_until_source_closes() {
        let client = Arc::new(RecordingClient::default());
        let rule = ScrobbleRule {
            min_played: Milliseconds::new(0),
            min_fraction: 0.5,
        };
        let mut tracker = Tracker::new(client.clone(), rule, None, Instant::now());

        let (tx, rx) = mpsc::channel(8);
        tx.send(PlayerEvent::TrackChanged(item("A", Some(300))))
            .await
            .unwrap();
        tx.send(PlayerEvent::PlaybackStateChanged(PlaybackState::Paused))
            .await
            .unwrap();
        tx.send(PlayerEvent::TrackChanged(item("B", Some(300))))
            .await
            .unwrap();
        drop(tx);

        tracker.run(rx).await.unwrap();

        assert_eq!(client.scrobbled_tracks(), vec!["A".to_string()]);
        assert_eq!(client.announced_tracks(), vec!["A".to_string(), "B".to_string()]);
    }

    #[tokio::test]
    async fn test_submit_on_exit_marks_current_listen() {
        let client = Arc::new(RecordingClient::default());
        let rule = ScrobbleRule {
            min_played: Milliseconds::new(0),
            min_fraction: 0.5,
        };
        let mut tracker = Tracker::new(client.clone(), rule, playing(item("A", Some(300))), Instant::now())
            .with_submit_on_exit(true);

        let (tx, rx) = mpsc::channel(1);
        drop(tx);
        tracker.run(rx).await.unwrap();

        assert_eq!(client.scrobbled_tracks(), vec!["A".to_string()]);
        assert!(tracker.session().is_scrobbled());
    }

    #[tokio::test]
    async fn test_stop_handle_ends_run() {
        let client = Arc::new(RecordingClient::default());
        let mut tracker = tracker(&client, None, Instant::now());
        let (_tx, rx) = mpsc::channel(1);

        tracker.stop_handle().stop();
        tracker.run(rx).await.unwrap();

        assert!(client.scrobbled_tracks().is_empty());
        assert!(client.announced_tracks().is_empty());
    }
}
