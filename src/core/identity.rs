//! Identity atoms
//!
//! ProjectId: host project identifier
//! RecordId: host record identifier (digits-only string)

use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::{CoreError, InvalidId};

/// Host project identifier.
///
/// Projects are owned by the host platform; the core only ever receives
/// ids it did not mint.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectId(u64);

impl ProjectId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Debug for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ProjectId({})", self.0)
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Host record identifier.
///
/// The host stores record ids as strings but only ever assigns numeric
/// ones; every inbound id is validated as digits-only before any store
/// access.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    /// Parse and validate a record id string.
    pub fn parse(s: impl Into<String>) -> Result<Self, CoreError> {
        let s = s.into();
        if s.is_empty() {
            return Err(InvalidId::Record {
                raw: s,
                reason: "empty".into(),
            }
            .into());
        }
        if !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(InvalidId::Record {
                raw: s,
                reason: "must be numeric".into(),
            }
            .into());
        }
        Ok(Self(s))
    }

    pub(crate) fn from_number(n: u64) -> Self {
        Self(n.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_number(&self) -> u64 {
        // digits-only by construction
        self.0.parse().unwrap_or(0)
    }
}

impl fmt::Debug for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecordId({:?})", self.0)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_id_parse_valid() {
        let id = RecordId::parse("42").unwrap();
        assert_eq!(id.as_str(), "42");
        assert_eq!(id.as_number(), 42);
    }

    #[test]
    fn record_id_rejects_empty() {
        assert!(RecordId::parse("").is_err());
    }

    #[test]
    fn record_id_rejects_non_numeric() {
        assert!(RecordId::parse("12a").is_err());
        assert!(RecordId::parse("12; --").is_err());
        assert!(RecordId::parse("-1").is_err());
    }
}
