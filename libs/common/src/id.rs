use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Identifier of a chat room.
///
/// The backend uses numeric ids while UI callers tend to pass whatever they
/// have at hand, so every id is normalized to its trimmed string form. Two
/// ids are equal when those forms are equal.
///
/// # Examples
/// ```
/// use chat_common::RoomId;
///
/// assert_eq!(RoomId::from(42), RoomId::from("42"));
/// assert_eq!(RoomId::from("42").as_number(), Some(42));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RoomId(String);

impl RoomId {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        let trimmed = id.trim();
        if trimmed.len() == id.len() {
            Self(id)
        } else {
            Self(trimmed.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The numeric form of the id, as the send endpoint expects it.
    pub fn as_number(&self) -> Option<i64> {
        self.0.parse().ok()
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for RoomId {
    fn from(id: String) -> Self {
        Self::new(id)
    }
}

impl From<&str> for RoomId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<&String> for RoomId {
    fn from(id: &String) -> Self {
        Self::new(id.as_str())
    }
}

impl From<&RoomId> for RoomId {
    fn from(id: &RoomId) -> Self {
        id.clone()
    }
}

macro_rules! room_id_from_int {
    ($($t:ty),*) => {
        $(
            impl From<$t> for RoomId {
                fn from(id: $t) -> Self {
                    Self(id.to_string())
                }
            }
        )*
    };
}

room_id_from_int!(i32, i64, u32, u64, usize);

/// Serialized as a JSON number when numeric, otherwise as a string.
impl Serialize for RoomId {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        match self.as_number() {
            Some(n) if n.to_string() == self.0 => s.serialize_i64(n),
            _ => s.serialize_str(&self.0),
        }
    }
}

/// Accepts both `42` and `"42"`.
impl<'de> Deserialize<'de> for RoomId {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Int(i64),
            Str(String),
        }

        Ok(match Raw::deserialize(d)? {
            Raw::Int(n) => Self::from(n),
            Raw::Str(s) => Self::new(s),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_and_string_forms_are_equal() {
        assert_eq!(RoomId::from(7_u64), RoomId::from("7"));
        assert_eq!(RoomId::from(7_i32), RoomId::from(String::from("7")));
        assert_ne!(RoomId::from(7), RoomId::from("07"));
    }

    #[test]
    fn non_numeric_id_has_no_number() {
        assert_eq!(RoomId::from("lobby").as_number(), None);
    }

    #[test]
    fn surrounding_whitespace_is_trimmed() {
        let id = RoomId::from(" 12 ");
        assert_eq!(id, RoomId::from(12));
        assert_eq!(id.as_str(), "12");
        assert_eq!(id.as_number(), Some(12));
    }

    #[test]
    fn deserializes_from_number_or_string() {
        let a: RoomId = serde_json::from_str("42").unwrap();
        let b: RoomId = serde_json::from_str("\"42\"").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn serializes_numeric_ids_as_numbers() {
        assert_eq!(serde_json::to_string(&RoomId::from("42")).unwrap(), "42");
        assert_eq!(serde_json::to_string(&RoomId::from("lobby")).unwrap(), "\"lobby\"");
        assert_eq!(serde_json::to_string(&RoomId::from("007")).unwrap(), "\"007\"");
    }
}
