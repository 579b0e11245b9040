//! Synthesis voice catalog entries.

use serde::{Deserialize, Serialize};

/// A synthesis voice offered by the text-to-speech engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceInfo {
    /// Engine identifier, e.g. `en-US-AriaNeural`.
    pub name: String,
    /// Locale derived from the identifier, e.g. `en-US`.
    pub locale: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
}

impl VoiceInfo {
    /// Builds an entry from an engine identifier, deriving the locale from
    /// its first two dash-separated segments.
    pub fn from_name(name: impl Into<String>, gender: Option<String>) -> Self {
        let name = name.into();
        let locale = name.splitn(3, '-').take(2).collect::<Vec<_>>().join("-");
        Self {
            name,
            locale,
            gender,
        }
    }
}

/// Response body of the voice catalog endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceCatalog {
    pub voices: Vec<VoiceInfo>,
    pub default: String,
}
