//! Shared primitive keys and the fixed common field names.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Revision number distinguishing successive submissions of one observation.
pub type Revision = u64;
/// String-serialized submission timestamp, the second half of a group key.
pub type TimestampKey = String;

/// Team number field.
pub const TEAM: &str = "team";
/// Match number field.
pub const MATCH: &str = "match";
/// Alliance color field.
pub const ALLIANCE: &str = "alliance";
/// No-show flag field.
pub const NO_SHOW: &str = "noShow";
/// Free-text comments field.
pub const COMMENTS: &str = "comments";
/// Revision number field.
pub const REVISION: &str = "revision";
/// Submission timestamp field.
pub const TIMESTAMP: &str = "timestamp";
/// Free-text recorder name field.
pub const RECORDER_NAME: &str = "recorderName";

/// Fields every record carries regardless of the game, in export order.
pub const COMMON_FIELDS: [&str; 8] = [
    TEAM,
    MATCH,
    ALLIANCE,
    NO_SHOW,
    COMMENTS,
    REVISION,
    TIMESTAMP,
    RECORDER_NAME,
];

/// Fields quoted unconditionally in the CSV export.
pub const FREE_TEXT_FIELDS: [&str; 2] = [COMMENTS, RECORDER_NAME];

/// Resolved label of the field device that submitted a record.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Source(String);

impl Source {
    /// Wraps a device label.
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    /// Returns the label text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Source {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for Source {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl std::borrow::Borrow<str> for Source {
    fn borrow(&self) -> &str {
        &self.0
    }
}
