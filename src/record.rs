//! Observation records and value rendering.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::{MATCH, REVISION, Revision, TEAM, TIMESTAMP, TimestampKey};

/// Untyped field map as delivered by the transport.
pub type RawRecord = Map<String, Value>;

/// One immutable observation payload, keyed by field name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    fields: Map<String, Value>,
}

impl Record {
    /// Wraps a raw field map.
    pub fn new(fields: RawRecord) -> Self {
        Self { fields }
    }

    /// Returns the raw value of `field`, if present.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Returns `field` rendered as export text, if present.
    pub fn rendered(&self, field: &str) -> Option<String> {
        self.get(field).map(render_value)
    }

    /// Returns the full field map.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Timestamp rendered as a group key.
    pub fn timestamp_key(&self) -> Option<TimestampKey> {
        self.get(TIMESTAMP).and_then(timestamp_key)
    }

    /// Revision parsed as an integer.
    pub fn revision(&self) -> Option<Revision> {
        self.get(REVISION).and_then(parse_revision)
    }

    /// Team id as text.
    pub fn team(&self) -> Option<String> {
        self.rendered(TEAM).filter(|t| !t.is_empty())
    }

    /// Match number, when it parses as a positive integer.
    pub fn match_number(&self) -> Option<u32> {
        self.rendered(MATCH)
            .and_then(|m| m.trim().parse::<u32>().ok())
            .filter(|m| *m > 0)
    }
}

impl From<RawRecord> for Record {
    fn from(value: RawRecord) -> Self {
        Self::new(value)
    }
}

/// Renders a JSON value as a single export cell.
pub fn render_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

/// Converts a timestamp value into its group key.
pub fn timestamp_key(value: &Value) -> Option<TimestampKey> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Parses a revision given either as a JSON integer or a string of digits.
pub fn parse_revision(value: &Value) -> Option<Revision> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => parse_revision_key(s),
        _ => None,
    }
}

/// Parses a revision key as stored in the snapshot.
pub fn parse_revision_key(s: &str) -> Option<Revision> {
    let s = s.trim();
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn renders_scalars_plainly() {
        assert_eq!(render_value(&json!("118")), "118");
        assert_eq!(render_value(&json!(118)), "118");
        assert_eq!(render_value(&json!(true)), "true");
        assert_eq!(render_value(&Value::Null), "");
        assert_eq!(render_value(&json!([1, 2])), "[1,2]");
    }

    #[test]
    fn revisions_must_be_non_negative_integers() {
        assert_eq!(parse_revision(&json!(3)), Some(3));
        assert_eq!(parse_revision(&json!("12")), Some(12));
        assert_eq!(parse_revision(&json!("1.5")), None);
        assert_eq!(parse_revision(&json!(-1)), None);
        assert_eq!(parse_revision(&json!("two")), None);
        assert_eq!(parse_revision(&json!("")), None);
    }

    #[test]
    fn numeric_and_string_timestamps_key_the_same() {
        assert_eq!(timestamp_key(&json!(1000)), Some("1000".to_string()));
        assert_eq!(timestamp_key(&json!("1000")), Some("1000".to_string()));
        assert_eq!(timestamp_key(&json!(null)), None);
    }

    #[test]
    fn match_number_rejects_garbage() {
        let rec = Record::new(json!({"match": "7", "team": 118}).as_object().cloned().unwrap());
        assert_eq!(rec.match_number(), Some(7));
        assert_eq!(rec.team().as_deref(), Some("118"));

        let rec = Record::new(json!({"match": "qf1"}).as_object().cloned().unwrap());
        assert_eq!(rec.match_number(), None);
        assert_eq!(rec.team(), None);
    }
}
