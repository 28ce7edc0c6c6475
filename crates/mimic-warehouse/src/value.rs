//! Typed scalar values exchanged with the warehouse.

use std::fmt;

use serde::{Deserialize, Serialize, Serializer};
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime, UtcOffset};

/// Parameter and column types understood by the record service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ScalarType {
    Int64,
    String,
    Timestamp,
}

impl ScalarType {
    /// Name used by the warehouse for this type.
    pub fn as_str(&self) -> &'static str {
        match self {
            ScalarType::Int64 => "INT64",
            ScalarType::String => "STRING",
            ScalarType::Timestamp => "TIMESTAMP",
        }
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single typed value: a bound parameter or a result cell.
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarValue {
    Null,
    Int64(i64),
    String(String),
    Timestamp(OffsetDateTime),
}

impl ScalarValue {
    /// Type of the value, `None` for null.
    pub fn scalar_type(&self) -> Option<ScalarType> {
        match self {
            ScalarValue::Null => None,
            ScalarValue::Int64(_) => Some(ScalarType::Int64),
            ScalarValue::String(_) => Some(ScalarType::String),
            ScalarValue::Timestamp(_) => Some(ScalarType::Timestamp),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, ScalarValue::Null)
    }

    /// Textual literal form used on the wire, `None` for null.
    pub fn to_literal(&self) -> Option<String> {
        match self {
            ScalarValue::Null => None,
            ScalarValue::Int64(v) => Some(v.to_string()),
            ScalarValue::String(v) => Some(v.clone()),
            ScalarValue::Timestamp(ts) => Some(format_timestamp(ts)),
        }
    }
}

impl Serialize for ScalarValue {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            ScalarValue::Null => serializer.serialize_none(),
            ScalarValue::Int64(v) => serializer.serialize_i64(*v),
            ScalarValue::String(v) => serializer.serialize_str(v),
            ScalarValue::Timestamp(ts) => {
                let formatted = ts.format(&Rfc3339).map_err(serde::ser::Error::custom)?;
                serializer.serialize_str(&formatted)
            }
        }
    }
}

/// Formats a timestamp as RFC 3339 in UTC (`1980-01-01T00:00:00Z`).
pub fn format_timestamp(ts: &OffsetDateTime) -> String {
    ts.to_offset(UtcOffset::UTC)
        .format(&Rfc3339)
        .unwrap_or_else(|_| ts.unix_timestamp().to_string())
}

/// Parses a timestamp literal accepted by the warehouse.
///
/// Accepts RFC 3339 (`1980-01-01T00:00:00Z`), the engine-native form
/// (`1980-01-01 00:00:00[.ffffff][ UTC|+HH:MM]`) and a bare date
/// (`1980-01-01`, midnight UTC). The result is normalized to UTC.
pub fn parse_timestamp(raw: &str) -> Option<OffsetDateTime> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(ts) = OffsetDateTime::parse(trimmed, &Rfc3339) {
        return Some(ts.to_offset(UtcOffset::UTC));
    }

    let body = trimmed.strip_suffix(" UTC").unwrap_or(trimmed);
    if let Some((date, rest)) = body.split_once(' ') {
        let candidate = format!("{date}T{rest}");
        if let Ok(ts) = OffsetDateTime::parse(&candidate, &Rfc3339) {
            return Some(ts.to_offset(UtcOffset::UTC));
        }
        return OffsetDateTime::parse(&format!("{candidate}Z"), &Rfc3339)
            .ok()
            .map(|ts| ts.to_offset(UtcOffset::UTC));
    }

    Date::parse(body, format_description!("[year]-[month]-[day]"))
        .ok()
        .map(|date| date.midnight().assume_utc())
}
