//! Type conversion of raw values into field kinds
//!
//! [`convert`] is a pure function: it never looks at schema policy
//! (required/default/hidden), only at the target kind and the runtime type of
//! the value. Sequences are converted element by element.

use chrono::{TimeZone, Utc};

use crate::error::ConversionError;
use crate::schema::{FieldKind, ForceCase};
use crate::value::{Record, Value};

/// Convert `value` to `kind`, folding case afterwards for string targets
pub fn convert(
    kind: FieldKind,
    value: &Value,
    force_case: Option<ForceCase>,
) -> Result<Value, ConversionError> {
    match value {
        Value::Array(items) => items
            .iter()
            .map(|item| convert(kind, item, force_case))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Value::Null => Err(ConversionError::new(kind, "null", "cannot convert empty value")),
        _ => match kind {
            FieldKind::Integer => to_integer(value),
            FieldKind::Float => to_float(value),
            FieldKind::Boolean => to_boolean(value),
            FieldKind::Date => to_date(value),
            FieldKind::String => to_string(value, force_case),
            FieldKind::Object => to_object(value),
            FieldKind::Schema => to_record(value),
        },
    }
}

/// Replace dates with their epoch-millisecond wire representation
pub fn to_wire(value: Value) -> Value {
    match value {
        Value::Date(date) => Value::Integer(date.timestamp_millis()),
        Value::Array(items) => Value::Array(items.into_iter().map(to_wire).collect()),
        other => other,
    }
}

fn unsupported(target: FieldKind, value: &Value) -> ConversionError {
    ConversionError::new(target, value.type_name(), "unsupported conversion")
}

fn to_integer(value: &Value) -> Result<Value, ConversionError> {
    match value {
        Value::Integer(i) => Ok(Value::Integer(*i)),
        Value::Float(f) => float_to_i64(*f).map(Value::Integer).ok_or_else(|| {
            ConversionError::new(FieldKind::Integer, "float", format!("{} is out of range", f))
        }),
        Value::String(s) => parse_integer_prefix(s).map(Value::Integer),
        Value::Date(date) => Ok(Value::Integer(date.timestamp_millis())),
        other => Err(unsupported(FieldKind::Integer, other)),
    }
}

/// Round half away from zero, rejecting values outside the i64 range
fn float_to_i64(f: f64) -> Option<i64> {
    if !f.is_finite() {
        return None;
    }
    let rounded = f.round();
    // i64::MAX is not representable; 2^63 is the first value past it
    if rounded < i64::MIN as f64 || rounded >= i64::MAX as f64 {
        return None;
    }
    Some(rounded as i64)
}

/// Base-10 parse of the leading sign and digits, ignoring whatever follows
fn parse_integer_prefix(s: &str) -> Result<i64, ConversionError> {
    let trimmed = s.trim_start();
    let (sign, rest) = match trimmed.as_bytes().first() {
        Some(b'-') => ("-", &trimmed[1..]),
        Some(b'+') => ("", &trimmed[1..]),
        _ => ("", trimmed),
    };
    let digits_len = rest.bytes().take_while(u8::is_ascii_digit).count();
    if digits_len == 0 {
        return Err(ConversionError::new(
            FieldKind::Integer,
            "string",
            format!("'{}' is not a base-10 integer", s),
        ));
    }
    format!("{}{}", sign, &rest[..digits_len])
        .parse::<i64>()
        .map_err(|e| {
            ConversionError::new(FieldKind::Integer, "string", format!("'{}': {}", s, e))
        })
}

/// Length of the longest float literal at the start of `s`: optional sign,
/// digits with an optional fraction, then an optional exponent
fn float_prefix_len(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    let digits_from = |at: usize| bytes[at..].iter().take_while(|b| b.is_ascii_digit()).count();

    let mut end = match bytes.first() {
        Some(b'+') | Some(b'-') => 1,
        _ => 0,
    };
    let int_digits = digits_from(end);
    end += int_digits;

    let mut frac_digits = 0;
    if bytes.get(end) == Some(&b'.') {
        frac_digits = digits_from(end + 1);
        if int_digits > 0 || frac_digits > 0 {
            end += 1 + frac_digits;
        }
    }
    if int_digits == 0 && frac_digits == 0 {
        return None;
    }

    if let Some(b'e') | Some(b'E') = bytes.get(end) {
        let sign_len = match bytes.get(end + 1) {
            Some(b'+') | Some(b'-') => 1,
            _ => 0,
        };
        let exp_digits = digits_from(end + 1 + sign_len);
        if exp_digits > 0 {
            end += 1 + sign_len + exp_digits;
        }
    }
    Some(end)
}

/// Float parse of the leading literal, ignoring whatever follows
fn parse_float_prefix(s: &str) -> Result<f64, ConversionError> {
    let trimmed = s.trim_start();
    float_prefix_len(trimmed)
        .and_then(|len| trimmed[..len].parse::<f64>().ok())
        .filter(|f| f.is_finite())
        .ok_or_else(|| {
            ConversionError::new(
                FieldKind::Float,
                "string",
                format!("'{}' does not start with a finite float literal", s),
            )
        })
}

fn to_float(value: &Value) -> Result<Value, ConversionError> {
    match value {
        Value::Integer(i) => Ok(Value::Float(*i as f64)),
        Value::Float(f) => Ok(Value::Float(*f)),
        Value::String(s) => parse_float_prefix(s).map(Value::Float),
        other => Err(unsupported(FieldKind::Float, other)),
    }
}

fn to_boolean(value: &Value) -> Result<Value, ConversionError> {
    let invalid = |found: &'static str, shown: String| {
        ConversionError::new(FieldKind::Boolean, found, format!("expected 0 or 1, got {}", shown))
    };
    match value {
        Value::Bool(b) => Ok(Value::Bool(*b)),
        Value::String(s) => match s.as_str() {
            "true" | "1" => Ok(Value::Bool(true)),
            "false" | "0" => Ok(Value::Bool(false)),
            _ => Err(ConversionError::new(
                FieldKind::Boolean,
                "string",
                format!("expected \"true\", \"false\", \"1\" or \"0\", got '{}'", s),
            )),
        },
        Value::Integer(1) => Ok(Value::Bool(true)),
        Value::Integer(0) => Ok(Value::Bool(false)),
        Value::Integer(i) => Err(invalid("integer", i.to_string())),
        Value::Float(f) if *f == 1.0 => Ok(Value::Bool(true)),
        Value::Float(f) if *f == 0.0 => Ok(Value::Bool(false)),
        Value::Float(f) => Err(invalid("float", f.to_string())),
        other => Err(unsupported(FieldKind::Boolean, other)),
    }
}

fn to_date(value: &Value) -> Result<Value, ConversionError> {
    let millis = match value {
        Value::Date(date) => return Ok(Value::Date(*date)),
        Value::Integer(i) => *i,
        Value::Float(f) if f.fract() == 0.0 => float_to_i64(*f).ok_or_else(|| {
            ConversionError::new(FieldKind::Date, "float", format!("{} is out of range", f))
        })?,
        Value::Float(f) => {
            return Err(ConversionError::new(
                FieldKind::Date,
                "float",
                format!("{} is not a whole number of milliseconds", f),
            ))
        }
        other => return Err(unsupported(FieldKind::Date, other)),
    };
    Utc.timestamp_millis_opt(millis)
        .single()
        .map(Value::Date)
        .ok_or_else(|| {
            ConversionError::new(
                FieldKind::Date,
                value.type_name(),
                format!("{} ms is outside the representable date range", millis),
            )
        })
}

fn to_string(value: &Value, force_case: Option<ForceCase>) -> Result<Value, ConversionError> {
    let s = match value {
        Value::String(s) => s.clone(),
        Value::Integer(i) => i.to_string(),
        Value::Float(f) => f.to_string(),
        Value::Bool(b) => b.to_string(),
        other => return Err(unsupported(FieldKind::String, other)),
    };
    Ok(Value::String(match force_case {
        Some(case) => case.apply(&s),
        None => s,
    }))
}

fn to_object(value: &Value) -> Result<Value, ConversionError> {
    match value {
        Value::Object(record) => Ok(Value::Object(record.clone())),
        Value::String(s) => match serde_json::from_str::<serde_json::Value>(s) {
            Ok(json @ serde_json::Value::Object(_)) => Ok(Value::from(json)),
            Ok(_) => Err(ConversionError::new(
                FieldKind::Object,
                "string",
                "JSON literal is not an object",
            )),
            Err(e) => Err(ConversionError::new(FieldKind::Object, "string", e.to_string())),
        },
        other => Err(unsupported(FieldKind::Object, other)),
    }
}

fn to_record(value: &Value) -> Result<Value, ConversionError> {
    as_record(value).map(|record| Value::Object(record.clone()))
}

/// Shape check for schema fields; the record itself is filtered elsewhere
pub(crate) fn as_record(value: &Value) -> Result<&Record, ConversionError> {
    match value {
        Value::Object(record) => Ok(record),
        Value::Null => Err(ConversionError::new(
            FieldKind::Schema,
            "null",
            "cannot convert empty value",
        )),
        other => Err(ConversionError::new(
            FieldKind::Schema,
            other.type_name(),
            "expected a record",
        )),
    }
}
