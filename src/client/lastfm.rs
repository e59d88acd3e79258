//! Last.fm API client
//!
//! Implements `track.updateNowPlaying` and `track.scrobble` of the Last.fm
//! 2.0 web service. Both are signed write calls authenticated with a session
//! key obtained out of band.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::{ScrobbleClient, ScrobbleResponse};
use crate::config::LastFmConfig;
use crate::error::{Error, Result};
use crate::payload::ScrobblePayload;

/// Error body returned by the Last.fm API, with or without a 2xx status
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: i64,
    message: String,
}

/// Last.fm client bound to one authenticated session
pub struct LastFmClient {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
    api_secret: String,
    session_key: String,
}

impl LastFmClient {
    /// Build a client from validated configuration
    pub fn new(config: &LastFmConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            api_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
            api_secret: config.api_secret.clone(),
            session_key: config.session_key.clone(),
        })
    }

    /// Issue a signed POST for `method` and return the response body
    async fn call(&self, method: &str, payload: &ScrobblePayload) -> Result<Value> {
        if payload.artist.is_none() || payload.track.is_none() {
            return Err(Error::InvalidMetadata(format!(
                "{method} requires artist and track, got {}",
                payload.label()
            )));
        }

        let mut params: BTreeMap<&str, String> = payload.to_params().into_iter().collect();
        params.insert("method", method.to_string());
        params.insert("api_key", self.api_key.clone());
        params.insert("sk", self.session_key.clone());

        let signature = sign(&params, &self.api_secret);
        params.insert("api_sig", signature);
        params.insert("format", "json".to_string());

        debug!("Last.fm call: method={}, track={}", method, payload.label());

        let response = self.http.post(&self.api_url).form(&params).send().await?;
        let status = response.status();
        let body = response.text().await?;

        parse_body(status, &body)
    }
}

#[async_trait]
impl ScrobbleClient for LastFmClient {
    fn name(&self) -> &str {
        "Last.fm"
    }

    async fn update_now_playing(&self, payload: &ScrobblePayload) -> Result<()> {
        self.call("track.updateNowPlaying", payload).await?;
        info!("Last.fm: Now playing updated ({})", payload.label());
        Ok(())
    }

    async fn scrobble(&self, payload: &ScrobblePayload) -> Result<ScrobbleResponse> {
        let body = self.call("track.scrobble", payload).await?;
        let response = parse_scrobble_counts(&body);

        if response.is_accepted() {
            info!("Last.fm: Scrobbled {}", payload.label());
        } else {
            warn!(
                "Last.fm: Scrobble of {} was ignored ({} ignored)",
                payload.label(),
                response.ignored
            );
        }
        Ok(response)
    }
}

/// Compute `api_sig`: md5 over the key-sorted `key + value` pairs followed by
/// the shared secret. `format` and `callback` are never signed.
fn sign(params: &BTreeMap<&str, String>, secret: &str) -> String {
    let mut base: String = params
        .iter()
        .filter(|(key, _)| !matches!(**key, "format" | "callback"))
        .map(|(key, value)| format!("{key}{value}"))
        .collect();
    base.push_str(secret);

    format!("{:x}", md5::compute(base.as_bytes()))
}

/// Map a response to JSON, turning service error bodies into `Error::Api`
fn parse_body(status: reqwest::StatusCode, body: &str) -> Result<Value> {
    if let Ok(api_error) = serde_json::from_str::<ApiErrorBody>(body) {
        return Err(Error::api(api_error.error, api_error.message));
    }

    if !status.is_success() {
        return Err(Error::other(format!("Last.fm HTTP error ({status}): {body}")));
    }

    Ok(serde_json::from_str(body)?)
}

/// Read `scrobbles.@attr.accepted/ignored`; Last.fm sends them as numbers or
/// numeric strings depending on the endpoint version.
fn parse_scrobble_counts(body: &Value) -> ScrobbleResponse {
    let count = |pointer: &str| {
        body.pointer(pointer)
            .and_then(|v| match v {
                Value::Number(n) => n.as_u64(),
                Value::String(s) => s.parse().ok(),
                _ => None,
            })
            .and_then(|n| u32::try_from(n).ok())
            .unwrap_or(0)
    };

    ScrobbleResponse {
        accepted: count("/scrobbles/@attr/accepted"),
        ignored: count("/scrobbles/@attr/ignored"),
    }
}
