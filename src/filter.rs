//! Schema-driven filtering of records
//!
//! Walks a [`FilterSchema`] against an input record and builds a new record
//! holding only the schema's visible fields, converted to their declared kinds.
//!
//! Per field, in order:
//! 1. absent and `null` inputs are both treated as missing
//! 2. sequence fields wrap a bare value into a one-element array, scalar
//!    fields reject arrays
//! 3. missing values take the field default, if any
//! 4. required fields that are still missing fail the call
//! 5. missing optional fields and hidden fields are left out of the output
//! 6. the value is converted (or filtered through the nested schema)
//!
//! Nested schema fields that are not required never fail the outer call: a
//! nested failure degrades the field to an empty array (sequence fields) or
//! leaves it out (scalar fields).

use serde::de::DeserializeOwned;
use std::sync::Arc;

use crate::config::FilterOptions;
use crate::convert::{as_record, convert, to_wire};
use crate::error::{ConversionError, FilterError, Result};
use crate::schema::{FieldEntry, FieldKind, FieldSpec, FilterSchema};
use crate::value::{Record, Value};

/// Filter a single record
pub fn filter_one(data: &Record, schema: &FilterSchema, options: &FilterOptions) -> Result<Record> {
    filter_record(data, schema, options, 0)
}

/// Filter every record with the same schema; the first failure aborts the call
pub fn filter_many(
    data: &[Record],
    schema: &FilterSchema,
    options: &FilterOptions,
) -> Result<Vec<Record>> {
    data.iter()
        .enumerate()
        .map(|(i, record)| {
            filter_one(record, schema, options).map_err(|e| e.within(&format!("[{}]", i)))
        })
        .collect()
}

/// Filter a record, or an array of records, held in an untyped value
pub fn filter_value(data: &Value, schema: &FilterSchema, options: &FilterOptions) -> Result<Value> {
    match data {
        Value::Object(record) => filter_one(record, schema, options).map(Value::Object),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                let path = format!("[{}]", i);
                let record = as_record(item).map_err(|source| FilterError::Conversion {
                    field: path.clone(),
                    source,
                })?;
                filter_one(record, schema, options)
                    .map(Value::Object)
                    .map_err(|e| e.within(&path))
            })
            .collect::<Result<Vec<_>>>()
            .map(Value::Array),
        other => Err(FilterError::Shape {
            field: "$".to_string(),
            message: format!("expected a record or an array of records, got {}", other.type_name()),
        }),
    }
}

/// Filter a record and deserialize the result into `T`
///
/// Dates reach `T` as RFC 3339 strings, or as epoch milliseconds when
/// `serialize_dates_as_wire_values` is set.
pub fn filter_into<T: DeserializeOwned>(
    data: &Record,
    schema: &FilterSchema,
    options: &FilterOptions,
) -> Result<T> {
    let filtered = filter_one(data, schema, options)?;
    let json = serde_json::to_value(&filtered)?;
    Ok(serde_json::from_value(json)?)
}

/// A schema bundled with the options it is applied with
#[derive(Debug, Clone)]
pub struct SchemaFilter {
    schema: Arc<FilterSchema>,
    options: FilterOptions,
}

impl SchemaFilter {
    pub fn new(schema: impl Into<Arc<FilterSchema>>) -> Self {
        Self {
            schema: schema.into(),
            options: FilterOptions::default(),
        }
    }

    pub fn with_options(mut self, options: FilterOptions) -> Self {
        self.options = options;
        self
    }

    pub fn schema(&self) -> &FilterSchema {
        &self.schema
    }

    pub fn options(&self) -> &FilterOptions {
        &self.options
    }

    pub fn filter_one(&self, data: &Record) -> Result<Record> {
        filter_one(data, &self.schema, &self.options)
    }

    pub fn filter_many(&self, data: &[Record]) -> Result<Vec<Record>> {
        filter_many(data, &self.schema, &self.options)
    }

    pub fn filter_value(&self, data: &Value) -> Result<Value> {
        filter_value(data, &self.schema, &self.options)
    }

    pub fn filter_into<T: DeserializeOwned>(&self, data: &Record) -> Result<T> {
        filter_into(data, &self.schema, &self.options)
    }
}

/// Result of filtering a nested schema field
enum Nested {
    Filtered(Value),
    /// An optional nested field failed; `fallback` replaces it in the output
    Degraded {
        fallback: Option<Value>,
        cause: FilterError,
    },
}

fn filter_record(
    data: &Record,
    schema: &FilterSchema,
    options: &FilterOptions,
    depth: usize,
) -> Result<Record> {
    if depth > options.max_depth {
        return Err(FilterError::DepthExceeded {
            limit: options.max_depth,
        });
    }

    let mut out = Record::new();
    for (name, entry) in schema.iter() {
        if let Some(value) = filter_field(name, entry, data.get(name), options, depth)? {
            out.insert(name.to_string(), value);
        }
    }

    tracing::trace!(depth, fields = out.len(), "filtered record");
    Ok(out)
}

fn filter_field(
    name: &str,
    entry: &FieldEntry,
    raw: Option<&Value>,
    options: &FilterOptions,
    depth: usize,
) -> Result<Option<Value>> {
    let spec = entry.spec();

    let resolved = match raw.filter(|value| !value.is_null()) {
        Some(value) => Some(normalize_shape(name, entry, value.clone())?),
        None => spec
            .default
            .clone()
            .map(|default| normalize_shape(name, entry, default))
            .transpose()?,
    };

    let Some(value) = resolved else {
        if spec.required {
            return Err(FilterError::RequiredField {
                field: name.to_string(),
            });
        }
        return Ok(None);
    };

    if spec.hidden {
        return Ok(None);
    }

    let conversion_failed = |source: ConversionError| FilterError::Conversion {
        field: name.to_string(),
        source,
    };

    match spec.kind {
        FieldKind::Schema => match resolve_nested(name, entry, &value, options, depth)? {
            Nested::Filtered(filtered) => Ok(Some(filtered)),
            Nested::Degraded { fallback, cause } => {
                tracing::debug!(field = name, error = %cause, "optional nested field degraded");
                Ok(fallback)
            }
        },
        FieldKind::String => {
            let converted = convert(FieldKind::String, &value, spec.force_case)
                .map_err(conversion_failed)?;
            check_pattern(name, spec, &converted)?;
            Ok(Some(converted))
        }
        FieldKind::Date => {
            let converted = convert(FieldKind::Date, &value, None).map_err(conversion_failed)?;
            if options.serialize_dates_as_wire_values {
                Ok(Some(to_wire(converted)))
            } else {
                Ok(Some(converted))
            }
        }
        kind => convert(kind, &value, None)
            .map(Some)
            .map_err(conversion_failed),
    }
}

fn normalize_shape(name: &str, entry: &FieldEntry, value: Value) -> Result<Value> {
    match (entry.is_sequence(), value) {
        (true, Value::Array(items)) => Ok(Value::Array(items)),
        (true, single) => Ok(Value::Array(vec![single])),
        (false, Value::Array(_)) => Err(FilterError::Shape {
            field: name.to_string(),
            message: "scalar field received a sequence".to_string(),
        }),
        (false, single) => Ok(single),
    }
}

fn check_pattern(name: &str, spec: &FieldSpec, converted: &Value) -> Result<()> {
    let Some(pattern) = &spec.pattern else {
        return Ok(());
    };
    match converted {
        Value::String(s) if !pattern.is_match(s) => Err(FilterError::Match {
            field: name.to_string(),
            value: s.clone(),
            pattern: pattern.as_str().to_string(),
        }),
        Value::Array(items) => items
            .iter()
            .try_for_each(|item| check_pattern(name, spec, item)),
        _ => Ok(()),
    }
}

fn resolve_nested(
    name: &str,
    entry: &FieldEntry,
    value: &Value,
    options: &FilterOptions,
    depth: usize,
) -> Result<Nested> {
    let spec = entry.spec();
    let sub = spec.filter.as_deref().ok_or_else(|| {
        FilterError::Schema(format!("schema type requires a nested filter [key: {}]", name))
    })?;

    match filter_nested(name, sub, value, options, depth) {
        Ok(filtered) => Ok(Nested::Filtered(filtered)),
        Err(e @ FilterError::DepthExceeded { .. }) => Err(e),
        Err(e) if spec.required => Err(e),
        Err(cause) => Ok(Nested::Degraded {
            fallback: entry.is_sequence().then(|| Value::Array(Vec::new())),
            cause,
        }),
    }
}

fn filter_nested(
    name: &str,
    sub: &FilterSchema,
    value: &Value,
    options: &FilterOptions,
    depth: usize,
) -> Result<Value> {
    let filter_at = |path: &str, item: &Value| -> Result<Value> {
        let record = as_record(item).map_err(|source| FilterError::Conversion {
            field: path.to_string(),
            source,
        })?;
        filter_record(record, sub, options, depth + 1)
            .map(Value::Object)
            .map_err(|e| e.within(path))
    };

    match value {
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, item)| filter_at(&format!("{}[{}]", name, i), item))
            .collect::<Result<Vec<_>>>()
            .map(Value::Array),
        single => filter_at(name, single),
    }
}
