//! Schema Filter
//!
//! A declarative sanitizer for untyped records crossing a trust boundary.
//! A [`FilterSchema`] describes the output shape; filtering an input record
//! produces a new record that holds only the schema's fields, each converted
//! to its declared kind, defaulted, optionally redacted, and recursively
//! filtered through nested schemas.
//!
//! ## Features
//!
//! - **Whitelisting**: keys not named by the schema never reach the output
//! - **Type Coercion**: strings, numbers, and raw objects are converted to the
//!   declared field kind
//! - **Redaction**: hidden fields are checked but never written
//! - **Nested Schemas**: sub-records and sequences of sub-records, with optional
//!   relations degrading instead of failing the whole call
//! - **Wire Values**: dates can be emitted as epoch milliseconds
//!
//! ## Example
//!
//! ```
//! use schema_filter::{filter_one, FieldSpec, FilterOptions, FilterSchema, ForceCase, Value};
//!
//! let schema = FilterSchema::builder()
//!     .field("email", FieldSpec::string().required().force_case(ForceCase::Lower))
//!     .field("passwordHash", FieldSpec::string().required().hidden())
//!     .build()
//!     .unwrap();
//!
//! let input = Value::from(serde_json::json!({
//!     "email": "Some.NASTY@BUG.com",
//!     "passwordHash": "xxyyzz",
//!     "isAdmin": true
//! }));
//! let record = input.as_object().unwrap();
//!
//! let output = filter_one(record, &schema, &FilterOptions::default()).unwrap();
//! assert_eq!(output["email"], Value::from("some.nasty@bug.com"));
//! assert_eq!(output.len(), 1);
//! ```

pub mod config;
pub mod convert;
pub mod error;
pub mod filter;
pub mod schema;
pub mod value;

pub use config::{FilterConfig, FilterOptions};
pub use convert::{convert, to_wire};
pub use error::{ConversionError, FilterError, Result};
pub use filter::{filter_into, filter_many, filter_one, filter_value, SchemaFilter};
pub use schema::{FieldEntry, FieldKind, FieldSpec, FilterSchema, ForceCase, SchemaBuilder};
pub use value::{Record, Value};
