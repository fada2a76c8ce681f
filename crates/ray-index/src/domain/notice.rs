//! # Notice
//!
//! An immutable change event destined for the index.
//!
//! A notice *sets* the value of each listed attribute for its target entity,
//! replacing whatever value an earlier notice gave it. An empty value clears
//! the attribute for that target.

use crate::domain::errors::IndexError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Seconds since the Unix epoch.
pub type Timestamp = u64;

/// Identifier of the indexed entity (e.g. a message number). Zero is
/// reserved.
pub type Target = u64;

/// Longest attribute name, in bytes.
pub const MAX_ATTRIBUTE_LEN: usize = u16::MAX as usize;

/// Longest attribute value, in bytes.
pub const MAX_VALUE_LEN: usize = u32::MAX as usize;

/// Immutable change event.
///
/// Attributes live in a `BTreeMap` so that two notices with the same content
/// always encode to the same bytes, which is what makes stash keys stable.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Notice {
    attributes: BTreeMap<String, String>,
    target: Target,
    timestamp: Timestamp,
}

impl Notice {
    /// Create a notice about `target` at `timestamp` with no attributes.
    pub fn new(target: Target, timestamp: Timestamp) -> Self {
        Self {
            attributes: BTreeMap::new(),
            target,
            timestamp,
        }
    }

    /// Builder-style method to set one attribute value.
    pub fn with(mut self, attribute: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(attribute.into(), value.into());
        self
    }

    pub fn attributes(&self) -> &BTreeMap<String, String> {
        &self.attributes
    }

    pub fn target(&self) -> Target {
        self.target
    }

    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    /// Check that the notice fits the posting format.
    ///
    /// Target zero is reserved and attribute names are stored with a 16-bit
    /// length. Stashes refuse notices failing this check, since they would
    /// make every build containing them fail its audit.
    pub fn validate(&self) -> Result<(), IndexError> {
        let reason = if self.target == 0 {
            Some("target 0 is reserved".to_string())
        } else if let Some(name) = self.attributes.keys().find(|a| a.len() > MAX_ATTRIBUTE_LEN) {
            Some(format!(
                "attribute name is {} bytes, limit is {}",
                name.len(),
                MAX_ATTRIBUTE_LEN
            ))
        } else if let Some(value) = self.attributes.values().find(|v| v.len() > MAX_VALUE_LEN) {
            Some(format!("value is {} bytes, limit is {}", value.len(), MAX_VALUE_LEN))
        } else {
            None
        };
        match reason {
            Some(reason) => Err(IndexError::InvalidNotice {
                notice: format!("#{}@{}", self.target, self.timestamp),
                reason,
            }),
            None => Ok(()),
        }
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}@{}", self.target, self.timestamp)?;
        for (attribute, value) in &self.attributes {
            write!(f, " {}={:?}", attribute, value)?;
        }
        Ok(())
    }
}
