use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use super::task::{ParseEnumError, normalize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentKind {
    Human,
    Bot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Working,
    Idle,
    Offline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrustLevel {
    Owner,
    Trusted,
    Restricted,
    Readonly,
}

impl AgentKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Human => "human",
            Self::Bot => "bot",
        }
    }
}

impl AgentStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Working => "working",
            Self::Idle => "idle",
            Self::Offline => "offline",
        }
    }
}

impl TrustLevel {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::Trusted => "trusted",
            Self::Restricted => "restricted",
            Self::Readonly => "readonly",
        }
    }
}

/// A participant registered in the roster.
///
/// `working_on` is informational only; claim state lives on the task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    pub name: String,
    pub kind: AgentKind,
    pub roles: Vec<String>,
    pub status: AgentStatus,
    pub working_on: Option<String>,
    pub last_active: Option<DateTime<Utc>>,
    pub trust: TrustLevel,
}

impl Agent {
    pub fn new(name: impl AsRef<str>, kind: AgentKind) -> Self {
        Self {
            name: normalize_agent_name(name.as_ref()),
            kind,
            roles: Vec::new(),
            status: AgentStatus::Idle,
            working_on: None,
            last_active: None,
            trust: TrustLevel::Trusted,
        }
    }
}

/// Canonical agent handle: trimmed, with a single leading `@`.
#[must_use]
pub fn normalize_agent_name(raw: &str) -> String {
    let trimmed = raw.trim().trim_start_matches('@');
    if trimmed.is_empty() {
        return String::new();
    }
    format!("@{trimmed}")
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for TrustLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentKind {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "human" | "person" => Ok(Self::Human),
            "bot" | "agent" | "ai" => Ok(Self::Bot),
            _ => Err(ParseEnumError {
                expected: "agent type",
                got: s.to_string(),
            }),
        }
    }
}

impl FromStr for AgentStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "working" | "active" | "busy" => Ok(Self::Working),
            "idle" | "available" => Ok(Self::Idle),
            "offline" | "away" => Ok(Self::Offline),
            _ => Err(ParseEnumError {
                expected: "agent status",
                got: s.to_string(),
            }),
        }
    }
}

impl FromStr for TrustLevel {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "owner" => Ok(Self::Owner),
            "trusted" => Ok(Self::Trusted),
            "restricted" => Ok(Self::Restricted),
            "readonly" | "read_only" => Ok(Self::Readonly),
            _ => Err(ParseEnumError {
                expected: "trust level",
                got: s.to_string(),
            }),
        }
    }
}
