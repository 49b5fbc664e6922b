use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

macro_rules! name_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn is_blank(&self) -> bool {
                self.0.trim().is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

name_newtype!(SessionKey);
name_newtype!(ParticipantName);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

pub const DEFAULT_DOCUMENT: &str = "// start code here";

/// Author used for membership notices in a session transcript.
pub const SYSTEM_AUTHOR: &str = "System";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LanguageMode {
    #[default]
    Javascript,
    Python,
    Java,
    Cpp,
}

impl LanguageMode {
    pub const ALL: [LanguageMode; 4] = [
        LanguageMode::Javascript,
        LanguageMode::Python,
        LanguageMode::Java,
        LanguageMode::Cpp,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            LanguageMode::Javascript => "javascript",
            LanguageMode::Python => "python",
            LanguageMode::Java => "java",
            LanguageMode::Cpp => "cpp",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|mode| mode.as_str().eq_ignore_ascii_case(value.trim()))
    }
}

impl fmt::Display for LanguageMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub author: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl TranscriptEntry {
    pub fn chat(author: &ParticipantName, text: impl Into<String>) -> Self {
        Self {
            author: author.0.clone(),
            text: text.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self {
            author: SYSTEM_AUTHOR.to_string(),
            text: text.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn joined(name: &ParticipantName) -> Self {
        Self::system(format!("{name} joined the room"))
    }

    pub fn left(name: &ParticipantName) -> Self {
        Self::system(format!("{name} left the room"))
    }

    pub fn is_system(&self) -> bool {
        self.author == SYSTEM_AUTHOR
    }
}
