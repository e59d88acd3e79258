//! MPRIS D-Bus event source
//!
//! Follows one MPRIS-compatible media player via D-Bus signals and turns
//! them into [`PlayerEvent`](crate::tracker::PlayerEvent)s.
//! Uses async event-driven architecture (not polling).

mod metadata;
mod player;
mod signals;

pub use metadata::parse_metadata;
pub use player::MprisSource;

use zbus::zvariant::{OwnedValue, Value};

/// MPRIS D-Bus constants
pub const MPRIS_PREFIX: &str = "org.mpris.MediaPlayer2.";
pub const MPRIS_PATH: &str = "/org/mpris/MediaPlayer2";
pub const MPRIS_PLAYER_IFACE: &str = "org.mpris.MediaPlayer2.Player";

/// Trait for extracting typed values from D-Bus variants
pub trait ExtractValue: Sized {
    /// Extract a value from a D-Bus variant, looking through nested variants
    fn extract_from(value: &Value<'_>) -> Option<Self>;
}

impl ExtractValue for String {
    fn extract_from(value: &Value<'_>) -> Option<Self> {
        match value {
            Value::Str(s) => Some(s.to_string()),
            // mpris:trackid is an object path
            Value::ObjectPath(p) => Some(p.to_string()),
            Value::Value(inner) => Self::extract_from(inner),
            _ => None,
        }
    }
}

impl ExtractValue for Vec<String> {
    fn extract_from(value: &Value<'_>) -> Option<Self> {
        match value {
            Value::Array(arr) => {
                let strings: Vec<_> = arr.iter().filter_map(String::extract_from).collect();
                (!strings.is_empty()).then_some(strings)
            }
            Value::Value(inner) => Self::extract_from(inner),
            _ => None,
        }
    }
}

/// Macro to implement `ExtractValue` for integer types with D-Bus variant fallbacks
macro_rules! impl_extract_int {
    ($target:ty, [$($variant:ident => $conv:expr),+ $(,)?]) => {
        impl ExtractValue for $target {
            fn extract_from(value: &Value<'_>) -> Option<Self> {
                match value {
                    $(Value::$variant(v) => $conv(*v),)+
                    Value::Value(inner) => Self::extract_from(inner),
                    _ => None,
                }
            }
        }
    };
}

impl_extract_int!(i64, [
    I64 => Some,
    I32 => |v| Some(i64::from(v)),
    U64 => |v| i64::try_from(v).ok(),
    U32 => |v| Some(i64::from(v)),
    I16 => |v| Some(i64::from(v)),
    U16 => |v| Some(i64::from(v)),
]);

impl_extract_int!(i32, [
    I32 => Some,
    I64 => |v| i32::try_from(v).ok(),
    U32 => |v| i32::try_from(v).ok(),
    I16 => |v| Some(i32::from(v)),
    U16 => |v| Some(i32::from(v)),
]);

/// Convenience function to extract a value using the ExtractValue trait
pub fn extract<T: ExtractValue>(value: &OwnedValue) -> Option<T> {
    T::extract_from(value)
}

/// Extract a string, treating blank strings as unknown
pub fn extract_text(value: &OwnedValue) -> Option<String> {
    String::extract_from(value).filter(|s| !s.trim().is_empty())
}

/// Extract the first non-blank element of a string array, falling back to a
/// single string
pub fn extract_first_text(value: &OwnedValue) -> Option<String> {
    match Vec::<String>::extract_from(value) {
        Some(arr) => arr.into_iter().find(|s| !s.trim().is_empty()),
        None => extract_text(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owned(value: Value<'_>) -> OwnedValue {
        value.try_to_owned().expect("ownable value")
    }

    #[test]
    fn test_extract_string_and_object_path() {
        assert_eq!(extract::<String>(&owned(Value::from("abc"))).as_deref(), Some("abc"));

        let path = zbus::zvariant::ObjectPath::try_from("/org/mpd/Track/7").expect("valid path");
        assert_eq!(
            extract::<String>(&owned(Value::from(path))).as_deref(),
            Some("/org/mpd/Track/7")
        );
    }

    #[test]
    fn test_extract_integers_across_widths() {
        assert_eq!(extract::<i64>(&owned(Value::from(42u32))), Some(42));
        assert_eq!(extract::<i64>(&owned(Value::from(-3i32))), Some(-3));
        assert_eq!(extract::<i32>(&owned(Value::from(7i64))), Some(7));
        assert_eq!(extract::<i32>(&owned(Value::from(i64::MAX))), None);
        assert_eq!(extract::<i64>(&owned(Value::from("12"))), None);
    }

    #[test]
    fn test_extract_first_text_skips_blanks() {
        let artists = owned(Value::from(vec!["", "Boards of Canada", "Other"]));
        assert_eq!(extract_first_text(&artists).as_deref(), Some("Boards of Canada"));

        assert_eq!(extract_first_text(&owned(Value::from("Solo"))).as_deref(), Some("Solo"));
        assert_eq!(extract_first_text(&owned(Value::from("   "))), None);
    }
}
