//! Typed extraction helpers for wire JSON.
//!
//! Every JSON message part on the wire is a small, flat object. These
//! helpers pull typed scalars out of a parsed [`serde_json::Value`] with
//! explicit required/optional semantics: `require_*` returns an error naming
//! the missing or ill-typed field, `optional_*` and the `pointer_*` family
//! return `None` and let the caller apply a default.

use serde_json::Value;

use crate::error::{Result, StreamError};

/// Parse a message part as a JSON object.
pub fn parse_object(data: &[u8]) -> Result<Value> {
    let value: Value = serde_json::from_slice(data)?;
    if !value.is_object() {
        return Err(StreamError::protocol(
            "message part",
            "expected a JSON object at the top level",
        ));
    }
    Ok(value)
}

/// Check the mandatory `htype` discriminator of a descriptor part.
pub fn expect_htype(obj: &Value, expected: &str) -> Result<()> {
    let htype = require_str(obj, "htype")?;
    if htype != expected {
        return Err(StreamError::protocol(
            "message part",
            format!("expected htype \"{}\", received \"{}\"", expected, htype),
        ));
    }
    Ok(())
}

pub fn require_i64(obj: &Value, field: &str) -> Result<i64> {
    obj.get(field)
        .and_then(Value::as_i64)
        .ok_or_else(|| StreamError::missing_field(field))
}

pub fn require_f64(obj: &Value, field: &str) -> Result<f64> {
    obj.get(field)
        .and_then(Value::as_f64)
        .ok_or_else(|| StreamError::missing_field(field))
}

pub fn require_str<'a>(obj: &'a Value, field: &str) -> Result<&'a str> {
    obj.get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| StreamError::missing_field(field))
}

pub fn optional_i64(obj: &Value, field: &str) -> Option<i64> {
    obj.get(field).and_then(Value::as_i64)
}

/// Look up an integer by JSON pointer (`/a/b/c`).
pub fn pointer_i64(obj: &Value, pointer: &str) -> Option<i64> {
    obj.pointer(pointer).and_then(Value::as_i64)
}

/// Look up a boolean by JSON pointer.
pub fn pointer_bool(obj: &Value, pointer: &str) -> Option<bool> {
    obj.pointer(pointer).and_then(Value::as_bool)
}

/// Look up a string by JSON pointer.
pub fn pointer_str<'a>(obj: &'a Value, pointer: &str) -> Option<&'a str> {
    obj.pointer(pointer).and_then(Value::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn required_fields_extract_or_name_the_field() {
        let obj = json!({"series": 12, "rate": 1.5, "name": "eiger"});

        assert_eq!(require_i64(&obj, "series").unwrap(), 12);
        assert_eq!(require_f64(&obj, "rate").unwrap(), 1.5);
        // Integers coerce to floats, not the other way around.
        assert_eq!(require_f64(&obj, "series").unwrap(), 12.0);
        assert_eq!(require_str(&obj, "name").unwrap(), "eiger");

        let err = require_i64(&obj, "frame").unwrap_err();
        assert!(err.to_string().contains("frame"));
        // Wrong type reads the same as missing.
        assert!(require_i64(&obj, "name").is_err());
    }

    #[test]
    fn optional_fields_return_none() {
        let obj = json!({"series": 12});
        assert_eq!(optional_i64(&obj, "series"), Some(12));
        assert_eq!(optional_i64(&obj, "frame"), None);
    }

    #[test]
    fn pointer_lookups() {
        let obj = json!({"archiver": {"source": {"workers": 4, "url": "tcp://x:1", "spin": true}}});
        assert_eq!(pointer_i64(&obj, "/archiver/source/workers"), Some(4));
        assert_eq!(pointer_str(&obj, "/archiver/source/url"), Some("tcp://x:1"));
        assert_eq!(pointer_bool(&obj, "/archiver/source/spin"), Some(true));
        assert_eq!(pointer_i64(&obj, "/archiver/sink/workers"), None);
    }

    #[test]
    fn parse_object_rejects_non_objects() {
        assert!(parse_object(b"{\"a\":1}").is_ok());
        assert!(parse_object(b"[1,2]").is_err());
        assert!(parse_object(b"not json").is_err());
    }

    #[test]
    fn htype_validation() {
        let obj = json!({"htype": "dheader-1.0"});
        assert!(expect_htype(&obj, "dheader-1.0").is_ok());

        let err = expect_htype(&obj, "dimage-1.0").unwrap_err();
        assert!(err.to_string().contains("dheader-1.0"));
        assert!(err.to_string().contains("dimage-1.0"));

        assert!(expect_htype(&json!({}), "dheader-1.0").is_err());
    }
}
