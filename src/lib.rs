//! # MPRIS Scrobbler
//!
//! Last.fm scrobbling for Linux media players.
//!
//! This crate provides:
//! - MPRIS D-Bus monitoring of one media player
//! - Listening-time accounting across pauses, skips and repeats
//! - Scrobble eligibility (half the track or four minutes)
//! - Last.fm "now playing" and scrobble submission

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod client;
pub mod config;
pub mod error;
pub mod mpris;
pub mod payload;
pub mod session;
pub mod track;
pub mod tracker;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use tracker::{PlayerEvent, Tracker};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "mpris-scrobbler";
