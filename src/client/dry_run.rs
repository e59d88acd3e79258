//! Client that logs submissions instead of sending them

use async_trait::async_trait;
use tracing::info;

use super::{ScrobbleClient, ScrobbleResponse};
use crate::error::Result;
use crate::payload::ScrobblePayload;

/// Logs every payload and reports scrobbles as accepted.
///
/// Used with `--dry-run` and when no service is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct DryRunClient;

#[async_trait]
impl ScrobbleClient for DryRunClient {
    fn name(&self) -> &str {
        "dry-run"
    }

    async fn update_now_playing(&self, payload: &ScrobblePayload) -> Result<()> {
        info!("[dry-run] Now playing: {}", payload.label());
        Ok(())
    }

    async fn scrobble(&self, payload: &ScrobblePayload) -> Result<ScrobbleResponse> {
        info!(
            "[dry-run] Scrobble: {} at {}",
            payload.label(),
            payload.timestamp
        );
        Ok(ScrobbleResponse {
            accepted: 1,
            ignored: 0,
        })
    }
}
