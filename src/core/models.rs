use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::errors::AdminConfigError;

/// Value of an admin configuration flag.
///
/// `AllOff` is allow-list mode: the flag is off for everyone except the
/// users listed on the configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Allow {
    AllOn,
    AllOff,
}

impl Allow {
    pub const ALL: [Allow; 2] = [Allow::AllOn, Allow::AllOff];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Allow::AllOn => "AllOn",
            Allow::AllOff => "AllOff",
        }
    }

    #[must_use]
    pub fn is_allow_list(self) -> bool {
        self == Allow::AllOff
    }
}

impl fmt::Display for Allow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Allow {
    type Err = AdminConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Allow::ALL
            .into_iter()
            .find(|v| v.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| AdminConfigError::InvalidFlagValue(s.to_string()))
    }
}

impl Serialize for Allow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Allow {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// An admin configuration flag as seen by callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminConfig {
    #[serde(default)]
    pub config_id: Uuid,
    pub flag_name: String,
    pub flag_value: Allow,
    #[serde(default)]
    pub flag_description: String,
    #[serde(rename = "userId", default, skip_serializing_if = "Option::is_none")]
    pub user_ids: Option<Vec<String>>,
}

impl AdminConfig {
    #[must_use]
    pub fn new(flag_name: impl Into<String>, flag_value: Allow) -> Self {
        Self {
            config_id: Uuid::nil(),
            flag_name: flag_name.into(),
            flag_value,
            flag_description: String::new(),
            user_ids: None,
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.flag_description = description.into();
        self
    }

    #[must_use]
    pub fn with_user_ids<I, S>(mut self, user_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.user_ids = Some(user_ids.into_iter().map(Into::into).collect());
        self
    }

    /// User ids that belong in chunk storage; empty unless in allow-list mode.
    #[must_use]
    pub fn allowed_user_ids(&self) -> &[String] {
        match (&self.user_ids, self.flag_value.is_allow_list()) {
            (Some(ids), true) => ids,
            _ => &[],
        }
    }
}
