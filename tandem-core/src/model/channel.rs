use crate::utils::CONTROL_CHANNEL_LABEL;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const IMAGE_PREFIX: &str = "IMAGE-";
const FILTER_PREFIX: &str = "FILTER-";

/// Display filters a peer can announce for its outgoing video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoFilter {
    #[default]
    None,
    Grayscale,
    Sepia,
    Noir,
    Psychedelic,
}

impl VideoFilter {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Grayscale => "grayscale",
            Self::Sepia => "sepia",
            Self::Noir => "noir",
            Self::Psychedelic => "psychedelic",
        }
    }
}

impl FromStr for VideoFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Self::None),
            "grayscale" => Ok(Self::Grayscale),
            "sepia" => Ok(Self::Sepia),
            "noir" => Ok(Self::Noir),
            "psychedelic" => Ok(Self::Psychedelic),
            other => Err(format!("unknown filter '{other}'")),
        }
    }
}

impl fmt::Display for VideoFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a data channel is for, decoded from its label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelLabel {
    Control,
    Image(String),
    Filter(VideoFilter),
    Unknown(String),
}

impl ChannelLabel {
    pub fn parse(label: &str) -> Self {
        if label == CONTROL_CHANNEL_LABEL {
            return Self::Control;
        }
        if let Some(name) = label.strip_prefix(IMAGE_PREFIX) {
            return Self::Image(name.to_owned());
        }
        if let Some(filter) = label.strip_prefix(FILTER_PREFIX) {
            if let Ok(filter) = filter.parse() {
                return Self::Filter(filter);
            }
        }
        Self::Unknown(label.to_owned())
    }
}

impl fmt::Display for ChannelLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Control => f.write_str(CONTROL_CHANNEL_LABEL),
            Self::Image(name) => write!(f, "{IMAGE_PREFIX}{name}"),
            Self::Filter(filter) => write!(f, "{FILTER_PREFIX}{filter}"),
            Self::Unknown(label) => f.write_str(label),
        }
    }
}
