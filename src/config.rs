//! Configuration management for mpris-scrobbler

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::session::{ScrobbleRule, DEFAULT_MIN_FRACTION};
use crate::types::Milliseconds;

/// Default Last.fm API endpoint
pub const LASTFM_API_URL: &str = "https://ws.audioscrobbler.com/2.0/";

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Scrobble rule and submission behaviour
    pub scrobble: ScrobbleConfig,

    /// Last.fm credentials
    pub lastfm: LastFmConfig,

    /// Player filtering
    pub players: PlayerConfig,
}

/// General application settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
}

/// Scrobbling behaviour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrobbleConfig {
    /// Listening time in seconds after which a track always qualifies
    pub min_play_seconds: u64,

    /// Fraction of the track length after which it qualifies (0.0-1.0)
    pub min_play_percent: f64,

    /// Evaluate and submit the current listen when the daemon stops
    pub submit_on_exit: bool,

    /// Log submissions instead of sending them
    pub dry_run: bool,
}

/// Last.fm API settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LastFmConfig {
    pub enabled: bool,
    pub api_key: String,
    pub api_secret: String,
    pub session_key: String,
    pub api_url: String,

    /// Request timeout in seconds
    pub timeout_seconds: u64,
}

/// Player filtering configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Whitelist of player names (empty = all players)
    pub whitelist: Vec<String>,

    /// Blacklist of player names
    pub blacklist: Vec<String>,
}

// Default implementations

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

impl Default for ScrobbleConfig {
    fn default() -> Self {
        Self {
            min_play_seconds: 240,
            min_play_percent: DEFAULT_MIN_FRACTION,
            submit_on_exit: false,
            dry_run: false,
        }
    }
}

impl Default for LastFmConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: String::new(),
            api_secret: String::new(),
            session_key: String::new(),
            api_url: LASTFM_API_URL.to_string(),
            timeout_seconds: 10,
        }
    }
}

impl ScrobbleConfig {
    /// Eligibility rule described by this section
    #[must_use]
    pub fn rule(&self) -> ScrobbleRule {
        let secs = i64::try_from(self.min_play_seconds).unwrap_or(i64::MAX / 1000);
        ScrobbleRule {
            min_played: Milliseconds::from_secs(secs),
            min_fraction: self.min_play_percent,
        }
    }
}

impl PlayerConfig {
    /// Check if a player should be followed.
    ///
    /// `name` may be a full MPRIS bus name or just the player id.
    #[must_use]
    pub fn allows(&self, name: &str) -> bool {
        let player_id = name.strip_prefix(crate::mpris::MPRIS_PREFIX).unwrap_or(name);

        // Check blacklist first
        if self.blacklist.iter().any(|p| player_id.contains(p)) {
            return false;
        }

        // If whitelist is empty, track all
        if self.whitelist.is_empty() {
            return true;
        }

        self.whitelist.iter().any(|p| player_id.contains(p))
    }
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    /// Save configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Get the default configuration file path
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| Error::config("Could not determine config directory"))?;
        Ok(config_dir.join("mpris-scrobbler").join("config.toml"))
    }

    /// Validate configuration values.
    ///
    /// Call this after loading to ensure all values are within acceptable ranges.
    pub fn validate(&self) -> Result<()> {
        let percent = self.scrobble.min_play_percent;
        if !(percent > 0.0 && percent <= 1.0) {
            return Err(Error::config(format!(
                "min_play_percent must be greater than 0.0 and at most 1.0, got {percent}"
            )));
        }

        if self.scrobble.min_play_seconds == 0 || self.scrobble.min_play_seconds > 3600 {
            return Err(Error::config(format!(
                "min_play_seconds must be between 1 and 3600, got {}",
                self.scrobble.min_play_seconds
            )));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.to_lowercase().as_str()) {
            return Err(Error::config(format!(
                "log_level must be one of {:?}, got '{}'",
                valid_levels, self.general.log_level
            )));
        }

        if self.lastfm.enabled {
            for (field, value) in [
                ("api_key", &self.lastfm.api_key),
                ("api_secret", &self.lastfm.api_secret),
                ("session_key", &self.lastfm.session_key),
            ] {
                if value.trim().is_empty() {
                    return Err(Error::config(format!(
                        "lastfm.{field} is required when Last.fm is enabled"
                    )));
                }
            }

            if self.lastfm.api_url.is_empty() {
                return Err(Error::config("lastfm.api_url must not be empty"));
            }
            if self.lastfm.timeout_seconds == 0 {
                return Err(Error::config("lastfm.timeout_seconds must be greater than 0"));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enabled_lastfm() -> Config {
        let mut config = Config::default();
        config.lastfm.enabled = true;
        config.lastfm.api_key = "key".to_string();
        config.lastfm.api_secret = "secret".to_string();
        config.lastfm.session_key = "session".to_string();
        config
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_default_rule_matches_lastfm_rules() {
        let rule = Config::default().scrobble.rule();
        assert_eq!(rule, ScrobbleRule::default());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [scrobble]
            min_play_seconds = 120

            [players]
            whitelist = ["spotify"]
            "#,
        )
        .expect("valid toml");

        assert_eq!(config.scrobble.min_play_seconds, 120);
        assert!((config.scrobble.min_play_percent - 0.5).abs() < f64::EPSILON);
        assert_eq!(config.lastfm.api_url, LASTFM_API_URL);
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.players.whitelist, vec!["spotify".to_string()]);
    }

    #[test]
    fn test_validate_rejects_bad_percent() {
        for percent in [0.0, -0.1, 1.5] {
            let mut config = Config::default();
            config.scrobble.min_play_percent = percent;
            assert!(config.validate().is_err(), "percent {percent} accepted");
        }
    }

    #[test]
    fn test_validate_rejects_unknown_log_level() {
        let mut config = Config::default();
        config.general.log_level = "loud".to_string();
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_validate_requires_lastfm_credentials_when_enabled() {
        assert!(enabled_lastfm().validate().is_ok());

        let mut config = enabled_lastfm();
        config.lastfm.session_key = "  ".to_string();
        let err = config.validate().expect_err("missing session key");
        assert!(err.to_string().contains("session_key"));
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("config.toml");

        let mut config = enabled_lastfm();
        config.scrobble.submit_on_exit = true;
        config.players.blacklist = vec!["firefox".to_string()];
        config.save_to(&path).expect("saved");

        let loaded = Config::load_from(&path).expect("loaded");
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_player_filter() {
        let players = PlayerConfig {
            whitelist: vec![],
            blacklist: vec!["firefox".to_string(), "chromium".to_string()],
        };
        assert!(players.allows("org.mpris.MediaPlayer2.spotify"));
        assert!(!players.allows("org.mpris.MediaPlayer2.firefox.instance_1_42"));

        let players = PlayerConfig {
            whitelist: vec!["mpd".to_string()],
            blacklist: vec![],
        };
        assert!(players.allows("org.mpris.MediaPlayer2.mpd"));
        assert!(!players.allows("org.mpris.MediaPlayer2.vlc"));
    }
}
