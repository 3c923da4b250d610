//! The "group and name" identity of a project.
//!
//! Keys are written as `group:name`, the same coordinate form build tools use
//! for modules. That text form is also how keys appear in persisted files.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{AccrualError, Result};

/// Identity of one project's configuration bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupAndName {
    group: String,
    name: String,
}

impl GroupAndName {
    /// Create a key from its two parts.
    ///
    /// Both parts must be non-empty, and the group may not contain `:` since
    /// that would make the text form ambiguous.
    pub fn new(group: impl Into<String>, name: impl Into<String>) -> Result<Self> {
        let group = group.into();
        let name = name.into();

        if group.is_empty() {
            return Err(AccrualError::invalid_argument("group must not be empty"));
        }
        if name.is_empty() {
            return Err(AccrualError::invalid_argument("name must not be empty"));
        }
        if group.contains(':') {
            return Err(AccrualError::invalid_argument(format!(
                "group must not contain ':': {}",
                group
            )));
        }

        Ok(Self { group, name })
    }

    /// Parse a key from `group:name`.
    pub fn parse(text: &str) -> Result<Self> {
        let (group, name) = text.split_once(':').ok_or_else(|| {
            AccrualError::invalid_argument(format!("expected group:name, got '{}'", text))
        })?;
        Self::new(group, name)
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for GroupAndName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.group, self.name)
    }
}

impl FromStr for GroupAndName {
    type Err = AccrualError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for GroupAndName {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for GroupAndName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::parse(&text).map_err(serde::de::Error::custom)
    }
}
