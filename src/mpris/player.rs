//! MPRIS player monitoring

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use zbus::fdo::DBusProxy;
use zbus::message::Type as MessageType;
use zbus::names::InterfaceName;
use zbus::zvariant::OwnedValue;
use zbus::{Connection, MatchRule, MessageStream};

use crate::config::PlayerConfig;
use crate::error::{Error, Result};
use crate::track::{NowPlaying, PlaybackContext, PlaybackState};
use crate::tracker::PlayerEvent;
use crate::types::Microseconds;

use super::signals::{Followed, OwnerChange, SignalTranslator};
use super::{extract, extract_text, parse_metadata, MPRIS_PATH, MPRIS_PLAYER_IFACE, MPRIS_PREFIX};

/// Times out D-Bus calls to prevent hangs from misbehaving players.
const DBUS_TIMEOUT: Duration = Duration::from_secs(5);

/// Event source and playback context backed by one MPRIS player
pub struct MprisSource {
    connection: Connection,
    players: PlayerConfig,
    followed: Option<Followed>,
}

impl MprisSource {
    /// Connect to the session bus and pick the first matching player
    pub async fn connect(players: PlayerConfig) -> Result<Self> {
        let connection = Connection::session().await?;

        let mut source = Self {
            connection,
            players,
            followed: None,
        };
        source.discover().await?;

        Ok(source)
    }

    /// Well-known name of the followed player
    pub fn player_name(&self) -> Option<&str> {
        self.followed.as_ref().map(|f| f.name.as_str())
    }

    /// Discover existing MPRIS players
    async fn discover(&mut self) -> Result<()> {
        let dbus = DBusProxy::new(&self.connection).await?;
        let names = dbus.list_names().await?;

        for name in names {
            let name_str = name.as_str();
            if !name_str.starts_with(MPRIS_PREFIX) || !self.players.allows(name_str) {
                continue;
            }

            let bus_name = name_str
                .try_into()
                .map_err(|e| Error::other(format!("Invalid bus name: {e}")))?;
            let owner = dbus.get_name_owner(bus_name).await?;

            info!("Following player: {}", name_str);
            self.followed = Some(Followed {
                name: name_str.to_string(),
                owner: owner.as_str().to_string(),
            });
            return Ok(());
        }

        info!("No matching player found, waiting for one to appear...");
        Ok(())
    }

    /// Forward player signals into `tx` until the bus or the receiver closes
    pub async fn listen(self, tx: mpsc::Sender<PlayerEvent>) -> Result<()> {
        let rule = MatchRule::builder().msg_type(MessageType::Signal).build();
        let mut stream = MessageStream::for_match_rule(rule, &self.connection, Some(100)).await?;

        let mut translator = SignalTranslator::new(self.players.clone(), self.followed.clone());
        if let Some(followed) = &self.followed {
            let track = fetch_metadata(&self.connection, &followed.name)
                .await
                .map(|m| parse_metadata(&m))
                .ok();
            translator.seed(track, Instant::now());
        }

        while let Some(msg) = stream.next().await {
            let Ok(msg) = msg else {
                continue;
            };

            for event in handle_message(&msg, &self.connection, &mut translator).await {
                if tx.send(event).await.is_err() {
                    debug!("Event receiver closed, stopping MPRIS listener");
                    return Ok(());
                }
            }
        }

        Ok(())
    }
}

#[async_trait]
impl PlaybackContext for MprisSource {
    async fn snapshot(&self) -> Result<Option<NowPlaying>> {
        let Some(followed) = &self.followed else {
            return Ok(None);
        };

        let track = parse_metadata(&fetch_metadata(&self.connection, &followed.name).await?);
        if track.is_empty() {
            return Ok(None);
        }

        let state = fetch_playback_status(&self.connection, &followed.name)
            .await
            .map(|status| PlaybackState::from_mpris(&status).unwrap_or(PlaybackState::Stopped))?;

        Ok(Some(NowPlaying {
            item: Arc::new(track),
            state,
        }))
    }
}

/// Translate one D-Bus signal into zero or more player events
async fn handle_message(
    msg: &zbus::Message,
    connection: &Connection,
    translator: &mut SignalTranslator,
) -> Vec<PlayerEvent> {
    let header = msg.header();
    let interface = header.interface().map(|i| i.as_str().to_string());
    let member = header.member().map(|m| m.as_str().to_string());
    let sender = header.sender().map(|s| s.as_str().to_string()).unwrap_or_default();
    let now = Instant::now();

    match (interface.as_deref(), member.as_deref()) {
        // Player appear/disappear
        (Some("org.freedesktop.DBus"), Some("NameOwnerChanged")) => {
            let Ok((name, old_owner, new_owner)) =
                msg.body().deserialize::<(String, String, String)>()
            else {
                return Vec::new();
            };

            match translator.on_owner_changed(&name, &old_owner, &new_owner) {
                OwnerChange::Followed(name) => {
                    info!("Following player: {}", name);
                    initial_events(connection, &name, translator, now).await
                }
                OwnerChange::Lost(event) => {
                    info!("Player {} disappeared", name);
                    vec![event]
                }
                OwnerChange::Ignored => Vec::new(),
            }
        }

        (Some("org.freedesktop.DBus.Properties"), Some("PropertiesChanged")) => {
            let Ok((iface, changed, _invalidated)) = msg
                .body()
                .deserialize::<(String, HashMap<String, OwnedValue>, Vec<String>)>()
            else {
                return Vec::new();
            };
            if iface != MPRIS_PLAYER_IFACE {
                return Vec::new();
            }

            let mut events = Vec::new();

            // Track first: a status change in the same signal belongs to the new track
            if let Some(metadata) = changed.get("Metadata") {
                match HashMap::<String, OwnedValue>::try_from(metadata.clone()) {
                    Ok(map) => events.extend(translator.on_metadata(&sender, parse_metadata(&map), now)),
                    Err(e) => debug!("Unreadable metadata from {}: {}", sender, e),
                }
            }

            if let Some(status) = changed.get("PlaybackStatus").and_then(extract_text) {
                events.extend(translator.on_status(&sender, &status));
            }

            events
        }

        (Some(MPRIS_PLAYER_IFACE), Some("Seeked")) => msg
            .body()
            .deserialize::<i64>()
            .ok()
            .and_then(|position| translator.on_seeked(&sender, Microseconds::new(position), now))
            .into_iter()
            .collect(),

        _ => Vec::new(),
    }
}

/// Events describing a newly followed player's current state
async fn initial_events(
    connection: &Connection,
    name: &str,
    translator: &mut SignalTranslator,
    now: Instant,
) -> Vec<PlayerEvent> {
    let Some(owner) = translator.followed().map(|f| f.owner.clone()) else {
        return Vec::new();
    };

    let mut events = Vec::new();

    match fetch_metadata(connection, name).await {
        Ok(metadata) => events.extend(translator.on_metadata(&owner, parse_metadata(&metadata), now)),
        Err(e) => warn!("Failed to read metadata of {}: {}", name, e),
    }

    match fetch_playback_status(connection, name).await {
        Ok(status) => events.extend(translator.on_status(&owner, &status)),
        Err(e) => warn!("Failed to read playback status of {}: {}", name, e),
    }

    events
}

/// Read one property of the MPRIS player interface
async fn fetch_property(connection: &Connection, name: &str, property: &str) -> Result<OwnedValue> {
    let proxy = tokio::time::timeout(DBUS_TIMEOUT, async {
        zbus::fdo::PropertiesProxy::builder(connection)
            .destination(name)?
            .path(MPRIS_PATH)?
            .build()
            .await
    })
    .await
    .map_err(|_| Error::other("D-Bus proxy build timed out"))??;

    let iface = InterfaceName::try_from(MPRIS_PLAYER_IFACE)
        .map_err(|e| Error::InvalidMetadata(e.to_string()))?;

    let value = tokio::time::timeout(DBUS_TIMEOUT, proxy.get(iface, property))
        .await
        .map_err(|_| Error::other(format!("D-Bus {property} fetch timed out")))??;

    Ok(value)
}

/// Get player metadata via D-Bus
async fn fetch_metadata(connection: &Connection, name: &str) -> Result<HashMap<String, OwnedValue>> {
    let metadata = fetch_property(connection, name, "Metadata").await?;

    HashMap::<String, OwnedValue>::try_from(metadata)
        .map_err(|_| Error::InvalidMetadata("Failed to parse metadata".into()))
}

/// Get playback status via D-Bus
async fn fetch_playback_status(connection: &Connection, name: &str) -> Result<String> {
    let status = fetch_property(connection, name, "PlaybackStatus").await?;

    extract(&status).ok_or_else(|| Error::InvalidMetadata("Failed to get status".into()))
}
