//! Core types shared by the compiler, the store adapters and the entity facade.
//!
//! This module defines the scalar value model used for filter operands, the
//! document type records travel in, and the error taxonomy every operation
//! reports through.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value as JsonValue};

/// A stored record: field name to JSON value, in insertion order.
pub type Document = Map<String, JsonValue>;

/// Scalar operand of a filter condition.
///
/// Entities are flat mappings of scalars; arrays only appear as `in`/`notIn`
/// operand lists, which are `Vec<Value>`.
///
/// # Example
///
/// ```rust
/// use lumadb_nosql::core::{FieldType, Value};
///
/// assert_eq!(Value::from(42).field_type(), FieldType::Number);
/// assert_eq!(Value::from("Sam").field_type(), FieldType::String);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Boolean value
    Bool(bool),
    /// 64-bit signed integer
    Integer(i64),
    /// 64-bit floating point
    Float(f64),
    /// UTF-8 string
    String(String),
    /// UTC instant, stored as an RFC 3339 string
    Timestamp(DateTime<Utc>),
}

impl Value {
    /// The field type this operand implies
    #[must_use]
    pub fn field_type(&self) -> FieldType {
        match self {
            Value::Bool(_) => FieldType::Boolean,
            Value::Integer(_) | Value::Float(_) => FieldType::Number,
            Value::String(_) => FieldType::String,
            Value::Timestamp(_) => FieldType::DateTime,
        }
    }

    /// Try to get as string
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Whether this value can be represented in a store at all
    #[must_use]
    pub fn is_finite(&self) -> bool {
        match self {
            Value::Float(f) => f.is_finite(),
            _ => true,
        }
    }

    /// Convert to the JSON form stored in documents
    #[must_use]
    pub fn to_json(&self) -> JsonValue {
        match self {
            Value::Bool(b) => JsonValue::Bool(*b),
            Value::Integer(i) => JsonValue::Number((*i).into()),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            Value::String(s) => JsonValue::String(s.clone()),
            Value::Timestamp(t) => JsonValue::String(format_timestamp(t)),
        }
    }

    /// Parse a scalar JSON operand. Returns `None` for null, arrays and objects.
    #[must_use]
    pub fn from_json(value: &JsonValue) -> Option<Value> {
        match value {
            JsonValue::Bool(b) => Some(Value::Bool(*b)),
            JsonValue::Number(n) => n
                .as_i64()
                .map(Value::Integer)
                .or_else(|| n.as_f64().map(Value::Float)),
            JsonValue::String(s) => Some(Value::String(s.clone())),
            JsonValue::Null | JsonValue::Array(_) | JsonValue::Object(_) => None,
        }
    }

    /// Literal rendering for explain output: numbers and booleans bare,
    /// strings and timestamps quoted.
    #[must_use]
    pub fn to_literal(&self) -> String {
        match self {
            Value::Bool(b) => b.to_string(),
            Value::Integer(i) => i.to_string(),
            Value::Float(_) => self.to_json().to_string(),
            Value::String(s) => JsonValue::String(s.clone()).to_string(),
            Value::Timestamp(t) => JsonValue::String(format_timestamp(t)).to_string(),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(i64::from(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Integer(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Timestamp(v)
    }
}

/// Field type inferred from filter operands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    String,
    Number,
    Boolean,
    DateTime,
}

impl FieldType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
            FieldType::DateTime => "datetime",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// RFC 3339, millisecond precision, `Z` suffix
#[must_use]
pub fn format_timestamp(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Store family an adapter talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    /// Partition/sort-key store with expression attributes
    Dynamodb,
    /// SQL-queryable document store
    Cosmos,
}

impl Backend {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Backend::Dynamodb => "dynamodb",
            Backend::Cosmos => "cosmos",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifier rule: non-empty, no whitespace.
pub fn validate_identifier(id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(NoSqlError::InvalidArgument("id must not be empty".into()));
    }
    if id.chars().any(char::is_whitespace) {
        return Err(NoSqlError::InvalidArgument(format!(
            "id must not contain whitespace: {:?}",
            id
        )));
    }
    Ok(())
}

/// Failure reported by a store client.
///
/// Clients map their transport/service errors onto these variants; the
/// adapters decide which of them mean "record missing" for a given call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Addressed record (or table/container) does not exist
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// A condition expression evaluated to false
    #[error("Conditional check failed: {0}")]
    ConditionalCheckFailed(String),

    /// A record with the same id already exists
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Request rate exceeded
    #[error("Throttled: {0}")]
    Throttled(String),

    /// Any other service, network or auth failure
    #[error("Service error: {0}")]
    Service(String),
}

/// Errors surfaced by every bridge operation.
#[derive(Debug, thiserror::Error)]
pub enum NoSqlError {
    /// Malformed `take`, payload or identifier
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Empty or non-object filter condition, bad operand shape
    #[error("Malformed filter on `{field}`: {reason}")]
    MalformedFilter { field: String, reason: String },

    /// Operator not recognized for the field's inferred type
    #[error("Unsupported operator `{operator}` on {field_type} field `{field}`")]
    UnsupportedOperator {
        field: String,
        operator: String,
        field_type: String,
    },

    /// No record matches the given id
    #[error("Record not found: {0}")]
    NotFound(String),

    /// A record with the given id already exists
    #[error("Record already exists: {0}")]
    AlreadyExists(String),

    /// Cursor string failed to decode
    #[error("Invalid cursor: {0}")]
    InvalidCursor(String),

    /// Store returned a shape that cannot be normalized
    #[error("Backend contract violation: {0}")]
    BackendContractViolation(String),

    /// The store call itself failed
    #[error("Backend failure: {0}")]
    BackendFailure(#[source] StoreError),

    /// Operation exceeded its timeout
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// Operation was cancelled by the caller
    #[error("Operation cancelled")]
    Cancelled,
}

/// Fieldless discriminant of [`NoSqlError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidArgument,
    MalformedFilter,
    UnsupportedOperator,
    NotFound,
    AlreadyExists,
    InvalidCursor,
    BackendContractViolation,
    BackendFailure,
    Timeout,
    Cancelled,
}

impl NoSqlError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            NoSqlError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            NoSqlError::MalformedFilter { .. } => ErrorKind::MalformedFilter,
            NoSqlError::UnsupportedOperator { .. } => ErrorKind::UnsupportedOperator,
            NoSqlError::NotFound(_) => ErrorKind::NotFound,
            NoSqlError::AlreadyExists(_) => ErrorKind::AlreadyExists,
            NoSqlError::InvalidCursor(_) => ErrorKind::InvalidCursor,
            NoSqlError::BackendContractViolation(_) => ErrorKind::BackendContractViolation,
            NoSqlError::BackendFailure(_) => ErrorKind::BackendFailure,
            NoSqlError::Timeout(_) => ErrorKind::Timeout,
            NoSqlError::Cancelled => ErrorKind::Cancelled,
        }
    }

    pub(crate) fn malformed(field: &str, reason: impl Into<String>) -> Self {
        NoSqlError::MalformedFilter {
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn unsupported(field: &str, operator: &str, field_type: impl fmt::Display) -> Self {
        NoSqlError::UnsupportedOperator {
            field: field.to_string(),
            operator: operator.to_string(),
            field_type: field_type.to_string(),
        }
    }
}

impl From<StoreError> for NoSqlError {
    fn from(e: StoreError) -> Self {
        NoSqlError::BackendFailure(e)
    }
}

/// Result alias for bridge operations
pub type Result<T> = std::result::Result<T, NoSqlError>;
