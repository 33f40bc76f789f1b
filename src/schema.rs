//! Filter schema types and structures
//!
//! A [`FilterSchema`] maps output field names to [`FieldEntry`] values. Each
//! entry wraps a [`FieldSpec`] either as a scalar field or as a sequence of the
//! wrapped spec. Schemas are validated once when they are built and are
//! immutable afterwards, so one instance can be shared by any number of
//! concurrent filter calls.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::convert::convert;
use crate::error::{FilterError, Result};
use crate::value::Value;

/// Target kind of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Integer,
    Float,
    String,
    Boolean,
    Date,
    /// Free-form structured value, kept as-is
    Object,
    /// Structured value filtered through a nested schema
    Schema,
}

impl FieldKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::Integer => "integer",
            FieldKind::Float => "float",
            FieldKind::String => "string",
            FieldKind::Boolean => "boolean",
            FieldKind::Date => "date",
            FieldKind::Object => "object",
            FieldKind::Schema => "schema",
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Case folding applied to string fields after conversion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ForceCase {
    Upper,
    Lower,
}

impl ForceCase {
    pub fn apply(&self, s: &str) -> String {
        match self {
            ForceCase::Upper => s.to_uppercase(),
            ForceCase::Lower => s.to_lowercase(),
        }
    }
}

/// Specification of a single output field
#[derive(Debug, Clone)]
pub struct FieldSpec {
    /// Kind the input value is converted to
    pub kind: FieldKind,
    /// Fail when the field resolves to nothing after default substitution
    pub required: bool,
    /// Read and checked, but never written to output
    pub hidden: bool,
    /// Substituted when the input value is absent or null
    pub default: Option<Value>,
    /// Nested schema, only for [`FieldKind::Schema`]
    pub filter: Option<Arc<FilterSchema>>,
    /// Pattern the final string must satisfy, only for [`FieldKind::String`]
    pub pattern: Option<Regex>,
    /// Case folding, only for [`FieldKind::String`]
    pub force_case: Option<ForceCase>,
}

impl FieldSpec {
    pub fn new(kind: FieldKind) -> Self {
        Self {
            kind,
            required: false,
            hidden: false,
            default: None,
            filter: None,
            pattern: None,
            force_case: None,
        }
    }

    pub fn integer() -> Self {
        Self::new(FieldKind::Integer)
    }

    pub fn float() -> Self {
        Self::new(FieldKind::Float)
    }

    pub fn string() -> Self {
        Self::new(FieldKind::String)
    }

    pub fn boolean() -> Self {
        Self::new(FieldKind::Boolean)
    }

    pub fn date() -> Self {
        Self::new(FieldKind::Date)
    }

    pub fn object() -> Self {
        Self::new(FieldKind::Object)
    }

    /// A field filtered through a nested schema
    pub fn schema(filter: impl Into<Arc<FilterSchema>>) -> Self {
        Self {
            filter: Some(filter.into()),
            ..Self::new(FieldKind::Schema)
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn matching(mut self, pattern: Regex) -> Self {
        self.pattern = Some(pattern);
        self
    }

    pub fn force_case(mut self, case: ForceCase) -> Self {
        self.force_case = Some(case);
        self
    }

    fn validate(&self, name: &str, is_sequence: bool) -> Result<()> {
        if self.kind != FieldKind::String {
            if self.pattern.is_some() {
                return Err(FilterError::Schema(format!(
                    "can only match with string type [key: {}]",
                    name
                )));
            }
            if self.force_case.is_some() {
                return Err(FilterError::Schema(format!(
                    "forceCase requires string type [key: {}]",
                    name
                )));
            }
        }

        match (self.kind, &self.filter) {
            (FieldKind::Schema, None) => {
                return Err(FilterError::Schema(format!(
                    "schema type requires a nested filter [key: {}]",
                    name
                )));
            }
            (kind, Some(_)) if kind != FieldKind::Schema => {
                return Err(FilterError::Schema(format!(
                    "nested filter requires schema type, got {} [key: {}]",
                    kind, name
                )));
            }
            _ => {}
        }

        let default = match &self.default {
            Some(default) => default,
            None => return Ok(()),
        };
        match default {
            Value::Null => Err(FilterError::Schema(format!(
                "default must not be null [key: {}]",
                name
            ))),
            Value::Array(_) if !is_sequence => Err(FilterError::Schema(format!(
                "scalar field cannot have a sequence default [key: {}]",
                name
            ))),
            _ => convert(self.kind, default, self.force_case)
                .map(|_| ())
                .map_err(|e| {
                    FilterError::Schema(format!("invalid default [key: {}]: {}", name, e))
                }),
        }
    }
}

/// A schema entry: one value of the spec, or a sequence of them
#[derive(Debug, Clone)]
pub enum FieldEntry {
    Scalar(FieldSpec),
    Sequence(FieldSpec),
}

impl FieldEntry {
    pub fn spec(&self) -> &FieldSpec {
        match self {
            FieldEntry::Scalar(spec) | FieldEntry::Sequence(spec) => spec,
        }
    }

    pub fn is_sequence(&self) -> bool {
        matches!(self, FieldEntry::Sequence(_))
    }
}

/// A validated, immutable mapping of output field names to field entries
#[derive(Debug, Clone, Default)]
pub struct FilterSchema {
    fields: BTreeMap<String, FieldEntry>,
}

impl FilterSchema {
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }

    pub fn get(&self, name: &str) -> Option<&FieldEntry> {
        self.fields.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldEntry)> {
        self.fields.iter().map(|(name, entry)| (name.as_str(), entry))
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Build a schema from a JSON schema document
    pub fn from_json(document: &serde_json::Value) -> Result<Self> {
        let document: SchemaDocument = serde_json::from_value(document.clone())?;
        Self::from_document(document)
    }

    pub fn from_json_str(s: &str) -> Result<Self> {
        let document: SchemaDocument = serde_json::from_str(s)?;
        Self::from_document(document)
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let document: SchemaDocument = toml::from_str(s)?;
        Self::from_document(document)
    }

    /// Load a schema document from disk; `.toml` files are read as TOML,
    /// everything else as JSON
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Self::from_toml_str(&content),
            _ => Self::from_json_str(&content),
        }
    }

    fn from_document(document: SchemaDocument) -> Result<Self> {
        let mut builder = Self::builder();
        for (name, entry) in document {
            builder = match entry {
                EntryDocument::Scalar(field) => {
                    let spec = field.into_spec(&name)?;
                    builder.field(name, spec)
                }
                EntryDocument::Sequence(mut fields) => {
                    if fields.len() != 1 {
                        return Err(FilterError::Schema(format!(
                            "sequence field must wrap exactly one spec, got {} [key: {}]",
                            fields.len(),
                            name
                        )));
                    }
                    let spec = fields.remove(0).into_spec(&name)?;
                    builder.sequence(name, spec)
                }
            };
        }
        builder.build()
    }
}

/// Collects field entries and validates them into a [`FilterSchema`]
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    fields: BTreeMap<String, FieldEntry>,
    duplicates: Vec<String>,
}

impl SchemaBuilder {
    /// Add a scalar field
    pub fn field(self, name: impl Into<String>, spec: FieldSpec) -> Self {
        self.insert(name.into(), FieldEntry::Scalar(spec))
    }

    /// Add a field holding a sequence of values of `spec`
    pub fn sequence(self, name: impl Into<String>, spec: FieldSpec) -> Self {
        self.insert(name.into(), FieldEntry::Sequence(spec))
    }

    fn insert(mut self, name: String, entry: FieldEntry) -> Self {
        if self.fields.contains_key(&name) {
            self.duplicates.push(name);
        } else {
            self.fields.insert(name, entry);
        }
        self
    }

    pub fn build(self) -> Result<FilterSchema> {
        if let Some(name) = self.duplicates.first() {
            return Err(FilterError::Schema(format!("duplicate field [key: {}]", name)));
        }
        for (name, entry) in &self.fields {
            entry.spec().validate(name, entry.is_sequence())?;
        }
        Ok(FilterSchema { fields: self.fields })
    }
}

// Serialized schema documents

type SchemaDocument = BTreeMap<String, EntryDocument>;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum EntryDocument {
    Sequence(Vec<FieldDocument>),
    Scalar(FieldDocument),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct FieldDocument {
    #[serde(rename = "type")]
    kind: FieldKind,
    #[serde(default)]
    required: bool,
    #[serde(default)]
    hidden: bool,
    #[serde(default)]
    default: Option<serde_json::Value>,
    #[serde(default)]
    filter: Option<SchemaDocument>,
    #[serde(default, rename = "match")]
    pattern: Option<String>,
    #[serde(default)]
    force_case: Option<ForceCase>,
}

impl FieldDocument {
    fn into_spec(self, name: &str) -> Result<FieldSpec> {
        let pattern = self
            .pattern
            .map(|p| {
                Regex::new(&p).map_err(|e| {
                    FilterError::Schema(format!("invalid match pattern [key: {}]: {}", name, e))
                })
            })
            .transpose()?;
        let filter = self
            .filter
            .map(|nested| FilterSchema::from_document(nested).map(Arc::new))
            .transpose()?;
        let default = self
            .default
            .map(|default| default_value(default, name))
            .transpose()?;

        Ok(FieldSpec {
            kind: self.kind,
            required: self.required,
            hidden: self.hidden,
            default,
            filter,
            pattern,
            force_case: self.force_case,
        })
    }
}

/// Key under which the `toml` deserializer hands datetimes to a
/// self-describing value
const TOML_DATETIME_KEY: &str = "$__toml_private_datetime";

/// Document default as a [`Value`]; TOML datetimes become dates instead of
/// one-key objects
fn default_value(default: serde_json::Value, name: &str) -> Result<Value> {
    if let serde_json::Value::Object(map) = &default {
        if let (1, Some(datetime)) = (map.len(), map.get(TOML_DATETIME_KEY)) {
            let text = datetime.as_str().unwrap_or_default();
            return DateTime::parse_from_rfc3339(text)
                .map(|date| Value::Date(date.with_timezone(&Utc)))
                .map_err(|e| {
                    FilterError::Schema(format!(
                        "default datetime '{}' needs a UTC offset [key: {}]: {}",
                        text, name, e
                    ))
                });
        }
    }
    Ok(Value::from(default))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builder_collects_fields() {
        let schema = FilterSchema::builder()
            .field("email", FieldSpec::string().required().force_case(ForceCase::Lower))
            .sequence("names", FieldSpec::string())
            .build()
            .unwrap();

        assert_eq!(schema.len(), 2);
        assert!(schema.get("names").unwrap().is_sequence());
        assert!(!schema.get("email").unwrap().is_sequence());
        assert_eq!(schema.field_names().collect::<Vec<_>>(), vec!["email", "names"]);
    }

    #[test]
    fn test_match_requires_string() {
        let result = FilterSchema::builder()
            .field("count", FieldSpec::integer().matching(Regex::new("^1").unwrap()))
            .build();
        assert!(matches!(result, Err(FilterError::Schema(_))));
    }

    #[test]
    fn test_force_case_requires_string() {
        let result = FilterSchema::builder()
            .field("flag", FieldSpec::boolean().force_case(ForceCase::Upper))
            .build();
        assert!(matches!(result, Err(FilterError::Schema(_))));
    }

    #[test]
    fn test_schema_kind_requires_filter() {
        let result = FilterSchema::builder()
            .field("sub", FieldSpec::new(FieldKind::Schema))
            .build();
        assert!(matches!(result, Err(FilterError::Schema(_))));
    }

    #[test]
    fn test_filter_requires_schema_kind() {
        let mut spec = FieldSpec::object();
        spec.filter = Some(Arc::new(FilterSchema::default()));
        let result = FilterSchema::builder().field("sub", spec).build();
        assert!(matches!(result, Err(FilterError::Schema(_))));
    }

    #[test]
    fn test_duplicate_field_rejected() {
        let result = FilterSchema::builder()
            .field("a", FieldSpec::string())
            .field("a", FieldSpec::integer())
            .build();
        assert!(matches!(result, Err(FilterError::Schema(_))));
    }

    #[test]
    fn test_scalar_field_rejects_sequence_default() {
        let result = FilterSchema::builder()
            .field("a", FieldSpec::string().with_default(vec![Value::from("x")]))
            .build();
        assert!(matches!(result, Err(FilterError::Schema(_))));

        let ok = FilterSchema::builder()
            .sequence("a", FieldSpec::string().with_default(vec![Value::from("x")]))
            .build();
        assert!(ok.is_ok());
    }

    #[test]
    fn test_default_must_convert_to_kind() {
        let result = FilterSchema::builder()
            .field("n", FieldSpec::integer().with_default("abc"))
            .build();
        let err = result.unwrap_err();
        assert!(matches!(err, FilterError::Schema(ref msg) if msg.contains("[key: n]")));

        let result = FilterSchema::builder()
            .sequence("n", FieldSpec::integer().with_default(vec![Value::from(1_i64), "x".into()]))
            .build();
        assert!(matches!(result, Err(FilterError::Schema(_))));

        let result = FilterSchema::from_json(&json!({"n": {"type": "integer", "default": "abc"}}));
        assert!(matches!(result, Err(FilterError::Schema(_))));

        let ok = FilterSchema::builder()
            .field("n", FieldSpec::integer().with_default("42"))
            .field("at", FieldSpec::date().with_default(0_i64))
            .build();
        assert!(ok.is_ok());
    }

    #[test]
    fn test_from_json_document() {
        let schema = FilterSchema::from_json(&json!({
            "email": {"type": "string", "required": true, "forceCase": "lower", "match": "@"},
            "roles": [{"type": "schema", "required": true, "filter": {
                "name": {"type": "string", "required": true, "forceCase": "upper"}
            }}],
            "active": {"type": "boolean", "default": true},
            "secret": {"type": "string", "hidden": true}
        }))
        .unwrap();

        let email = schema.get("email").unwrap().spec();
        assert_eq!(email.kind, FieldKind::String);
        assert!(email.required);
        assert_eq!(email.force_case, Some(ForceCase::Lower));
        assert!(email.pattern.as_ref().unwrap().is_match("a@b"));

        let roles = schema.get("roles").unwrap();
        assert!(roles.is_sequence());
        assert_eq!(roles.spec().filter.as_ref().unwrap().len(), 1);

        assert_eq!(schema.get("active").unwrap().spec().default, Some(Value::Bool(true)));
        assert!(schema.get("secret").unwrap().spec().hidden);
    }

    #[test]
    fn test_from_json_rejects_unknown_type() {
        let result = FilterSchema::from_json(&json!({"a": {"type": "uuid"}}));
        assert!(matches!(result, Err(FilterError::Json(_))));
    }

    #[test]
    fn test_from_json_rejects_multi_element_sequence() {
        let result = FilterSchema::from_json(&json!({
            "a": [{"type": "string"}, {"type": "integer"}]
        }));
        assert!(matches!(result, Err(FilterError::Schema(_))));
    }

    #[test]
    fn test_from_json_rejects_bad_regex() {
        let result = FilterSchema::from_json(&json!({"a": {"type": "string", "match": "("}}));
        assert!(matches!(result, Err(FilterError::Schema(_))));
    }

    #[test]
    fn test_from_toml_document() {
        let schema = FilterSchema::from_toml_str(
            r#"
            names = [{ type = "string", required = true }]

            [email]
            type = "string"
            forceCase = "lower"
            "#,
        )
        .unwrap();

        assert!(schema.get("names").unwrap().is_sequence());
        assert_eq!(
            schema.get("email").unwrap().spec().force_case,
            Some(ForceCase::Lower)
        );
    }

    #[test]
    fn test_toml_datetime_default_is_a_date() {
        let schema = FilterSchema::from_toml_str(
            r#"
            [since]
            type = "date"
            default = 1979-05-27T07:32:00Z
            "#,
        )
        .unwrap();

        let expected = DateTime::parse_from_rfc3339("1979-05-27T07:32:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(
            schema.get("since").unwrap().spec().default,
            Some(Value::Date(expected))
        );
    }

    #[test]
    fn test_toml_local_datetime_default_rejected() {
        let result = FilterSchema::from_toml_str(
            r#"
            [since]
            type = "date"
            default = 1979-05-27T07:32:00
            "#,
        );
        assert!(matches!(result, Err(FilterError::Schema(_))));
    }

    #[test]
    fn test_schema_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<FilterSchema>();
    }
}
