//! Scrobbling service clients
//!
//! The tracker talks to the remote service only through [`ScrobbleClient`].

mod dry_run;
mod lastfm;

pub use dry_run::DryRunClient;
pub use lastfm::LastFmClient;

use async_trait::async_trait;

use crate::error::Result;
use crate::payload::ScrobblePayload;

/// Outcome of an accepted scrobble request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScrobbleResponse {
    /// Scrobbles the service recorded
    pub accepted: u32,
    /// Scrobbles the service filtered out (spam rules, bad timestamps)
    pub ignored: u32,
}

impl ScrobbleResponse {
    /// Whether the service recorded the scrobble
    #[must_use]
    pub const fn is_accepted(&self) -> bool {
        self.accepted > 0
    }
}

/// Remote scrobbling API
#[async_trait]
pub trait ScrobbleClient: Send + Sync {
    /// Service name for log lines
    fn name(&self) -> &str;

    /// Announce the track that just started
    async fn update_now_playing(&self, payload: &ScrobblePayload) -> Result<()>;

    /// Submit a finished listen
    async fn scrobble(&self, payload: &ScrobblePayload) -> Result<ScrobbleResponse>;
}
