//! Domain-specific newtypes for type safety.
//!
//! Listening time is accumulated in milliseconds while MPRIS reports track
//! lengths in microseconds; keeping them apart prevents mixing up units when
//! the scrobble threshold is evaluated. `derive_more` supplies the arithmetic.

use std::fmt;
use std::ops::{AddAssign, Sub};
use std::time::Duration;

use derive_more::{Add as DeriveAdd, From, Into};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Macros for reducing boilerplate
// ============================================================================

/// Generates common methods for numeric newtypes.
macro_rules! impl_newtype_common {
    ($type:ty) => {
        impl $type {
            /// Create a new instance.
            #[must_use]
            pub const fn new(value: i64) -> Self {
                Self(value)
            }

            /// Get the inner value.
            #[must_use]
            pub const fn get(self) -> i64 {
                self.0
            }

            /// Check if the value is zero.
            #[must_use]
            pub const fn is_zero(self) -> bool {
                self.0 == 0
            }
        }

        impl Sub for $type {
            type Output = Self;

            fn sub(self, rhs: Self) -> Self::Output {
                Self(self.0 - rhs.0)
            }
        }

        impl AddAssign for $type {
            fn add_assign(&mut self, rhs: Self) {
                self.0 = self.0.saturating_add(rhs.0);
            }
        }
    };
}

// ============================================================================
// Milliseconds
// ============================================================================

/// A duration in milliseconds.
///
/// Used for accumulated listening time and scrobble thresholds.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    DeriveAdd,
    From,
    Into,
)]
#[serde(transparent)]
pub struct Milliseconds(pub i64);

impl_newtype_common!(Milliseconds);

impl Milliseconds {
    /// Convert to seconds as a floating point value.
    #[must_use]
    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 / 1000.0
    }

    /// Create from seconds.
    #[must_use]
    pub const fn from_secs(secs: i64) -> Self {
        Self(secs * 1000)
    }

    /// Create from a wall-clock duration, saturating at `i64::MAX`.
    #[must_use]
    pub fn from_duration(duration: Duration) -> Self {
        Self(i64::try_from(duration.as_millis()).unwrap_or(i64::MAX))
    }
}

impl fmt::Display for Milliseconds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let total_seconds = self.0 / 1000;
        let hours = total_seconds / 3600;
        let minutes = (total_seconds % 3600) / 60;
        let seconds = total_seconds % 60;

        match (hours, minutes) {
            (0, 0) => write!(f, "{seconds}s"),
            (0, _) => write!(f, "{minutes}m {seconds}s"),
            _ => write!(f, "{hours}h {minutes}m {seconds}s"),
        }
    }
}

// ============================================================================
// Microseconds
// ============================================================================

/// A duration in microseconds, as carried by `mpris:length` and `Seeked`.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    DeriveAdd,
    From,
    Into,
)]
#[serde(transparent)]
pub struct Microseconds(pub i64);

impl_newtype_common!(Microseconds);

impl Microseconds {
    /// Convert to seconds as a floating point value.
    #[must_use]
    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 / 1_000_000.0
    }

    /// Convert to milliseconds.
    #[must_use]
    pub const fn to_milliseconds(self) -> Milliseconds {
        Milliseconds(self.0 / 1000)
    }

    /// Create from seconds.
    #[must_use]
    pub const fn from_secs(secs: i64) -> Self {
        Self(secs * 1_000_000)
    }
}

impl fmt::Display for Microseconds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.to_milliseconds().fmt(f)
    }
}

// ============================================================================
// ListenId
// ============================================================================

/// Identifies one listen: the span between two track transitions.
///
/// A fresh id is allocated on every transition, including a repeat of the
/// same track, so results of submissions started for an earlier listen can be
/// told apart from the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, From, Serialize, Deserialize)]
pub struct ListenId(Uuid);

impl ListenId {
    /// Allocate a new random listen id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ListenId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ListenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

// ============================================================================
// Tests
// ============================================================================
