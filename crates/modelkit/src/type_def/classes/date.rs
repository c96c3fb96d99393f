use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use crate::error::EntityError;
use crate::guard::JsonStack;
use crate::model::Model;
use crate::type_def::{TypeParams, TypeVariant};
use crate::value::{date_to_iso, render_value, Value};

/// Instants in time, serialized as ISO-8601 strings with milliseconds.
///
/// Accepts dates, epoch milliseconds, RFC 3339 timestamps, naive
/// `YYYY-MM-DDTHH:MM:SS` timestamps (read as UTC) and `YYYY-MM-DD` dates.
#[derive(Debug, Default)]
pub struct DateType;

pub fn construct(_params: &mut TypeParams, _key: &str) -> Result<Box<dyn TypeVariant>, EntityError> {
    Ok(Box::new(DateType))
}

/// Parse the textual forms accepted by date fields.
pub fn parse_date(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(d) = DateTime::parse_from_rfc3339(text) {
        return Some(d.with_timezone(&Utc));
    }
    if let Ok(d) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(d.and_utc());
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|d| d.and_utc())
}

impl TypeVariant for DateType {
    fn prepare(&self, value: Value, key: &str, _model: &Model) -> Result<Value, EntityError> {
        if matches!(value, Value::Null | Value::Date(_)) {
            return Ok(value);
        }
        let parsed = match &value {
            Value::Number(ms) if ms.is_finite() => DateTime::from_timestamp_millis(*ms as i64),
            Value::String(s) => parse_date(s),
            _ => None,
        };
        parsed.map(Value::Date).ok_or_else(|| EntityError::InvalidTypeValue {
            key: key.to_string(),
            expected: "date".to_string(),
            invalid_value: render_value(&value),
        })
    }

    fn to_json(&self, value: &Value, stack: &mut JsonStack) -> Result<serde_json::Value, EntityError> {
        match value {
            Value::Date(d) => Ok(serde_json::Value::String(date_to_iso(d))),
            other => super::any::value_to_json(other, stack),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guard::JsonStack;
    use crate::type_def::{create_type, TypeDecl};
    use chrono::TimeZone;

    #[test]
    fn test_parse_forms() {
        let expected = Utc.with_ymd_and_hms(2020, 3, 4, 0, 0, 0).unwrap();
        assert_eq!(parse_date("2020-03-04"), Some(expected));
        assert_eq!(parse_date("2020-03-04T00:00:00Z"), Some(expected));
        assert_eq!(parse_date("2020-03-04T02:00:00+02:00"), Some(expected));
        assert_eq!(parse_date("2020-03-04T00:00:00.000"), Some(expected));
        assert_eq!(parse_date("yesterday"), None);
    }

    #[test]
    fn test_prepare_epoch_millis_and_json() {
        let ty = create_type(TypeDecl::from("date"), "at").unwrap();
        let out = ty
            .prepare(Value::from(86_400_000), "at", &Model::detached())
            .unwrap();
        assert_eq!(
            ty.to_json(&out, &mut JsonStack::new()).unwrap(),
            serde_json::json!("1970-01-02T00:00:00.000Z")
        );
    }

    #[test]
    fn test_rejects_garbage() {
        let ty = create_type(TypeDecl::from("date"), "at").unwrap();
        let err = ty.prepare(Value::from(true), "at", &Model::detached()).unwrap_err();
        assert!(matches!(err, EntityError::InvalidTypeValue { .. }));
    }
}
