//! Source adapters.
//!
//! Each adapter turns one upstream payload shape into strict [`RawRecord`]s.
//! A record that lacks a required field is skipped with a [`ShapeError`]; the
//! rest of the batch goes through.

pub mod beacon;
pub mod taostats;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use thiserror::Error;

use super::client::SourceError;
use crate::types::models::RawRecord;

#[derive(Error, Debug, PartialEq)]
pub enum ShapeError {
    #[error("record is not a JSON object")]
    NotObject,
    #[error("missing field {0}")]
    Missing(&'static str),
    #[error("field {field} is not a number: {value}")]
    NotNumeric { field: &'static str, value: String },
}

/// Normalized records of one window plus what went wrong while fetching them.
#[derive(Debug, Default)]
pub struct SourceWindow {
    pub records: Vec<RawRecord>,
    pub pages: u32,
    pub skipped: u32,
    pub error: Option<SourceError>,
}

pub(crate) fn normalize_items<F>(label: &str, items: &[Value], mut normalize: F) -> (Vec<RawRecord>, u32)
where
    F: FnMut(&Map<String, Value>) -> Result<RawRecord, ShapeError>,
{
    let mut records = Vec::with_capacity(items.len());
    let mut skipped = 0;
    for item in items {
        let result = match item {
            Value::Object(obj) => normalize(obj),
            _ => Err(ShapeError::NotObject),
        };
        match result {
            Ok(record) => records.push(record),
            Err(e) => {
                skipped += 1;
                tracing::warn!("{}: skipping record: {}", label, e);
            }
        }
    }
    (records, skipped)
}

/// Reads a number sent either as a JSON number or a numeric string.
pub(crate) fn opt_number(obj: &Map<String, Value>, field: &'static str) -> Result<Option<f64>, ShapeError> {
    match obj.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => Ok(n.as_f64()),
        Some(Value::String(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ShapeError::NotNumeric { field, value: s.clone() }),
        Some(other) => Err(ShapeError::NotNumeric { field, value: other.to_string() }),
    }
}

pub(crate) fn number(obj: &Map<String, Value>, field: &'static str) -> Result<f64, ShapeError> {
    opt_number(obj, field)?.ok_or(ShapeError::Missing(field))
}

pub(crate) fn opt_integer(obj: &Map<String, Value>, field: &'static str) -> Result<Option<u64>, ShapeError> {
    match obj.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_u64()
            .map(Some)
            .ok_or_else(|| ShapeError::NotNumeric { field, value: n.to_string() }),
        Some(Value::String(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ShapeError::NotNumeric { field, value: s.clone() }),
        Some(other) => Err(ShapeError::NotNumeric { field, value: other.to_string() }),
    }
}

pub(crate) fn integer(obj: &Map<String, Value>, field: &'static str) -> Result<u64, ShapeError> {
    opt_integer(obj, field)?.ok_or(ShapeError::Missing(field))
}

pub(crate) fn opt_timestamp(obj: &Map<String, Value>, field: &str) -> Option<DateTime<Utc>> {
    match obj.get(field)? {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok(),
        Value::Number(n) => n.as_i64().and_then(|secs| DateTime::from_timestamp(secs, 0)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_numbers_accept_strings() {
        let o = obj(json!({"a": 1.5, "b": "2500000000", "c": null, "d": "x", "e": [1]}));
        assert_eq!(number(&o, "a").unwrap(), 1.5);
        assert_eq!(number(&o, "b").unwrap(), 2_500_000_000.0);
        assert_eq!(opt_number(&o, "c").unwrap(), None);
        assert_eq!(number(&o, "c").unwrap_err(), ShapeError::Missing("c"));
        assert!(matches!(number(&o, "d"), Err(ShapeError::NotNumeric { field: "d", .. })));
        assert!(matches!(number(&o, "e"), Err(ShapeError::NotNumeric { .. })));
        assert_eq!(integer(&o, "b").unwrap(), 2_500_000_000);
        assert!(integer(&o, "a").is_err());
    }

    #[test]
    fn test_timestamps() {
        let o = obj(json!({"t": "2025-02-01T23:59:00Z", "n": 1_700_000_000, "bad": "yesterday"}));
        assert_eq!(opt_timestamp(&o, "t").unwrap().timestamp(), 1_738_454_340);
        assert_eq!(opt_timestamp(&o, "n").unwrap().timestamp(), 1_700_000_000);
        assert!(opt_timestamp(&o, "bad").is_none());
        assert!(opt_timestamp(&o, "missing").is_none());
    }

    #[test]
    fn test_normalize_items_skips_bad_records() {
        let items = vec![json!({"v": 1}), json!("junk"), json!({"w": 2})];
        let (records, skipped) = normalize_items("test", &items, |o| {
            number(o, "v")?;
            Ok(RawRecord {
                subject: crate::types::models::SubjectId::Validator(1),
                block: None,
                timestamp: None,
                values: crate::types::models::RecordValues::Beacon {
                    balance: 0,
                    effective_balance: 0,
                    epoch: 0,
                    week: None,
                    week_end: None,
                },
            })
        });
        assert_eq!(records.len(), 1);
        assert_eq!(skipped, 2);
    }
}
