use crate::error::RoomIdError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Room identifier of the form `word-word`, each word two or more lowercase
/// ASCII letters.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoomId(String);

impl RoomId {
    pub fn parse(raw: &str) -> Result<Self, RoomIdError> {
        if raw.is_empty() {
            return Err(RoomIdError::Empty);
        }

        let mut segments = raw.split('-');
        let valid = matches!(
            (segments.next(), segments.next(), segments.next()),
            (Some(first), Some(second), None) if is_word(first) && is_word(second)
        );

        if valid {
            Ok(Self(raw.to_owned()))
        } else {
            Err(RoomIdError::Malformed(raw.to_owned()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn is_word(segment: &str) -> bool {
    segment.len() >= 2 && segment.bytes().all(|b| b.is_ascii_lowercase())
}

impl FromStr for RoomId {
    type Err = RoomIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for RoomId {
    type Error = RoomIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<RoomId> for String {
    fn from(id: RoomId) -> Self {
        id.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
