//! Request descriptors: `where`, `select` and `orderBy`.
//!
//! Operators form a closed set ([`Operator`]) and every condition carries a
//! typed operand ([`Condition`]), so compilers match exhaustively instead of
//! branching on operator strings. The `from_json` constructors are the entry
//! point for dynamic callers and report malformed input with the same error
//! kinds validation uses.

use std::fmt;
use std::str::FromStr;

use serde_json::Value as JsonValue;

use crate::core::{Document, FieldType, NoSqlError, Result, Value};

/// Recognized filter operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Equals,
    Not,
    Contains,
    StartsWith,
    EndsWith,
    In,
    NotIn,
    Lt,
    Lte,
    Gt,
    Gte,
}

impl Operator {
    /// Wire name used in JSON filters
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Operator::Equals => "equals",
            Operator::Not => "not",
            Operator::Contains => "contains",
            Operator::StartsWith => "startsWith",
            Operator::EndsWith => "endsWith",
            Operator::In => "in",
            Operator::NotIn => "notIn",
            Operator::Lt => "lt",
            Operator::Lte => "lte",
            Operator::Gt => "gt",
            Operator::Gte => "gte",
        }
    }

    /// Whether the operator is recognized for a field of type `ty`.
    ///
    /// Range comparisons are accepted on every type and passed through.
    #[must_use]
    pub fn supports(self, ty: FieldType) -> bool {
        match self {
            Operator::Equals | Operator::Not => true,
            Operator::Lt | Operator::Lte | Operator::Gt | Operator::Gte => true,
            Operator::Contains | Operator::StartsWith | Operator::EndsWith => {
                ty == FieldType::String
            }
            Operator::In | Operator::NotIn => ty != FieldType::Boolean,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operator {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s {
            "equals" => Operator::Equals,
            "not" => Operator::Not,
            "contains" => Operator::Contains,
            "startsWith" => Operator::StartsWith,
            "endsWith" => Operator::EndsWith,
            "in" => Operator::In,
            "notIn" => Operator::NotIn,
            "lt" => Operator::Lt,
            "lte" => Operator::Lte,
            "gt" => Operator::Gt,
            "gte" => Operator::Gte,
            _ => return Err(()),
        })
    }
}

/// One operator with its operand
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Equals(Value),
    Not(Value),
    Contains(String),
    StartsWith(String),
    /// Compiled as a substring test; neither store has a suffix primitive.
    EndsWith(String),
    In(Vec<Value>),
    NotIn(Vec<Value>),
    Lt(Value),
    Lte(Value),
    Gt(Value),
    Gte(Value),
}

impl Condition {
    #[must_use]
    pub fn operator(&self) -> Operator {
        match self {
            Condition::Equals(_) => Operator::Equals,
            Condition::Not(_) => Operator::Not,
            Condition::Contains(_) => Operator::Contains,
            Condition::StartsWith(_) => Operator::StartsWith,
            Condition::EndsWith(_) => Operator::EndsWith,
            Condition::In(_) => Operator::In,
            Condition::NotIn(_) => Operator::NotIn,
            Condition::Lt(_) => Operator::Lt,
            Condition::Lte(_) => Operator::Lte,
            Condition::Gt(_) => Operator::Gt,
            Condition::Gte(_) => Operator::Gte,
        }
    }

    /// Type implied by the operand, if any
    fn implied_type(&self) -> Option<FieldType> {
        match self {
            Condition::Equals(v) | Condition::Not(v) => Some(v.field_type()),
            Condition::Contains(_) | Condition::StartsWith(_) | Condition::EndsWith(_) => {
                Some(FieldType::String)
            }
            Condition::In(values) | Condition::NotIn(values) => {
                values.first().map(Value::field_type)
            }
            Condition::Lt(_) | Condition::Lte(_) | Condition::Gt(_) | Condition::Gte(_) => None,
        }
    }

    fn operands(&self) -> Vec<&Value> {
        match self {
            Condition::Equals(v)
            | Condition::Not(v)
            | Condition::Lt(v)
            | Condition::Lte(v)
            | Condition::Gt(v)
            | Condition::Gte(v) => vec![v],
            Condition::In(values) | Condition::NotIn(values) => values.iter().collect(),
            Condition::Contains(_) | Condition::StartsWith(_) | Condition::EndsWith(_) => {
                Vec::new()
            }
        }
    }

    /// Build a condition from a JSON operand
    pub fn from_json(field: &str, operator: Operator, operand: &JsonValue) -> Result<Self> {
        let scalar = |operand: &JsonValue| {
            Value::from_json(operand).ok_or_else(|| {
                NoSqlError::malformed(
                    field,
                    format!("`{}` expects a scalar operand, got {}", operator, operand),
                )
            })
        };
        let text = |operand: &JsonValue| match operand {
            JsonValue::String(s) => Ok(s.clone()),
            JsonValue::Null | JsonValue::Array(_) | JsonValue::Object(_) => Err(
                NoSqlError::malformed(field, format!("`{}` expects a string operand", operator)),
            ),
            other => {
                let ty = Value::from_json(other).map_or(FieldType::String, |v| v.field_type());
                Err(NoSqlError::unsupported(field, operator.as_str(), ty))
            }
        };
        let list = |operand: &JsonValue| match operand {
            JsonValue::Array(items) => items.iter().map(&scalar).collect::<Result<Vec<_>>>(),
            _ => Err(NoSqlError::malformed(
                field,
                format!("`{}` expects an array operand", operator),
            )),
        };

        Ok(match operator {
            Operator::Equals => Condition::Equals(scalar(operand)?),
            Operator::Not => Condition::Not(scalar(operand)?),
            Operator::Contains => Condition::Contains(text(operand)?),
            Operator::StartsWith => Condition::StartsWith(text(operand)?),
            Operator::EndsWith => Condition::EndsWith(text(operand)?),
            Operator::In => Condition::In(list(operand)?),
            Operator::NotIn => Condition::NotIn(list(operand)?),
            Operator::Lt => Condition::Lt(scalar(operand)?),
            Operator::Lte => Condition::Lte(scalar(operand)?),
            Operator::Gt => Condition::Gt(scalar(operand)?),
            Operator::Gte => Condition::Gte(scalar(operand)?),
        })
    }
}

/// Case-sensitivity of substring and prefix matching
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum QueryMode {
    #[default]
    Sensitive,
    Insensitive,
}

impl FromStr for QueryMode {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("sensitive") || s.eq_ignore_ascii_case("default") {
            Ok(QueryMode::Sensitive)
        } else if s.eq_ignore_ascii_case("insensitive") {
            Ok(QueryMode::Insensitive)
        } else {
            Err(())
        }
    }
}

/// All conditions on one field, AND-ed in insertion order.
///
/// ```rust
/// use lumadb_nosql::filter::{FieldFilter, QueryMode};
///
/// let filter = FieldFilter::new()
///     .starts_with("Sa")
///     .ends_with("lyn")
///     .mode(QueryMode::Insensitive);
/// assert_eq!(filter.conditions().len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldFilter {
    conditions: Vec<Condition>,
    mode: QueryMode,
}

impl FieldFilter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    #[must_use]
    pub fn equals(self, value: impl Into<Value>) -> Self {
        self.condition(Condition::Equals(value.into()))
    }

    #[must_use]
    pub fn not(self, value: impl Into<Value>) -> Self {
        self.condition(Condition::Not(value.into()))
    }

    #[must_use]
    pub fn contains(self, value: impl Into<String>) -> Self {
        self.condition(Condition::Contains(value.into()))
    }

    #[must_use]
    pub fn starts_with(self, value: impl Into<String>) -> Self {
        self.condition(Condition::StartsWith(value.into()))
    }

    #[must_use]
    pub fn ends_with(self, value: impl Into<String>) -> Self {
        self.condition(Condition::EndsWith(value.into()))
    }

    #[must_use]
    pub fn is_in<V: Into<Value>>(self, values: impl IntoIterator<Item = V>) -> Self {
        self.condition(Condition::In(values.into_iter().map(Into::into).collect()))
    }

    #[must_use]
    pub fn not_in<V: Into<Value>>(self, values: impl IntoIterator<Item = V>) -> Self {
        self.condition(Condition::NotIn(values.into_iter().map(Into::into).collect()))
    }

    #[must_use]
    pub fn lt(self, value: impl Into<Value>) -> Self {
        self.condition(Condition::Lt(value.into()))
    }

    #[must_use]
    pub fn lte(self, value: impl Into<Value>) -> Self {
        self.condition(Condition::Lte(value.into()))
    }

    #[must_use]
    pub fn gt(self, value: impl Into<Value>) -> Self {
        self.condition(Condition::Gt(value.into()))
    }

    #[must_use]
    pub fn gte(self, value: impl Into<Value>) -> Self {
        self.condition(Condition::Gte(value.into()))
    }

    #[must_use]
    pub fn mode(mut self, mode: QueryMode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub fn insensitive(self) -> Self {
        self.mode(QueryMode::Insensitive)
    }

    #[must_use]
    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    #[must_use]
    pub fn query_mode(&self) -> QueryMode {
        self.mode
    }

    /// Field type inferred from the first typed operand
    #[must_use]
    pub fn inferred_type(&self) -> Option<FieldType> {
        self.conditions.iter().find_map(Condition::implied_type)
    }

    /// Check the conditions against the field's inferred type.
    pub fn validate(&self, field: &str) -> Result<()> {
        if self.conditions.is_empty() {
            return Err(NoSqlError::malformed(field, "filter condition has no operators"));
        }

        let ty = self.inferred_type();
        for condition in &self.conditions {
            let operator = condition.operator();
            if let Some(ty) = ty {
                if !operator.supports(ty) {
                    return Err(NoSqlError::unsupported(field, operator.as_str(), ty));
                }
            }

            if let Condition::In(values) | Condition::NotIn(values) = condition {
                if values.is_empty() {
                    return Err(NoSqlError::malformed(
                        field,
                        format!("`{}` requires at least one value", operator),
                    ));
                }
            }

            for operand in condition.operands() {
                if !operand.is_finite() {
                    return Err(NoSqlError::malformed(field, "non-finite number operand"));
                }
                let is_comparison = matches!(
                    operator,
                    Operator::Lt | Operator::Lte | Operator::Gt | Operator::Gte
                );
                if let (Some(ty), false) = (ty, is_comparison) {
                    if operand.field_type() != ty {
                        return Err(NoSqlError::malformed(
                            field,
                            format!(
                                "`{}` operand is {} but the field is filtered as {}",
                                operator,
                                operand.field_type(),
                                ty
                            ),
                        ));
                    }
                }
            }
        }

        Ok(())
    }

    /// Parse one field's JSON condition object
    pub fn from_json(field: &str, value: &JsonValue) -> Result<Self> {
        let object = value
            .as_object()
            .ok_or_else(|| NoSqlError::malformed(field, "filter condition must be an object"))?;

        let mut filter = FieldFilter::new();
        for (key, operand) in object {
            if key == "mode" {
                let mode = operand
                    .as_str()
                    .and_then(|s| s.parse::<QueryMode>().ok())
                    .ok_or_else(|| {
                        NoSqlError::malformed(
                            field,
                            format!("mode must be SENSITIVE or INSENSITIVE, got {}", operand),
                        )
                    })?;
                filter.mode = mode;
                continue;
            }

            let operator: Operator = key.parse().map_err(|()| {
                let ty = filter
                    .inferred_type()
                    .map_or_else(|| "untyped".to_string(), |t| t.to_string());
                NoSqlError::unsupported(field, key, ty)
            })?;
            filter.conditions.push(Condition::from_json(field, operator, operand)?);
        }

        Ok(filter)
    }
}

/// Field name to filter, AND-ed across fields in insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WhereClause {
    fields: Vec<(String, FieldFilter)>,
}

impl WhereClause {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field; re-adding a field replaces its filter in place.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, filter: FieldFilter) -> Self {
        self.insert(name, filter);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, filter: FieldFilter) {
        let name = name.into();
        match self.fields.iter_mut().find(|(existing, _)| *existing == name) {
            Some((_, slot)) => *slot = filter,
            None => self.fields.push((name, filter)),
        }
    }

    /// Remove a field, returning its filter
    pub fn remove(&mut self, name: &str) -> Option<FieldFilter> {
        let index = self.fields.iter().position(|(existing, _)| existing == name)?;
        Some(self.fields.remove(index).1)
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&FieldFilter> {
        self.fields
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, filter)| filter)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldFilter)> {
        self.fields.iter().map(|(name, filter)| (name.as_str(), filter))
    }

    /// Validate every field filter
    pub fn validate(&self) -> Result<()> {
        for (name, filter) in &self.fields {
            if name.is_empty() {
                return Err(NoSqlError::malformed(name, "field name must not be empty"));
            }
            filter.validate(name)?;
        }
        Ok(())
    }

    /// Parse a JSON `where` object. `null` means no filter.
    pub fn from_json(value: &JsonValue) -> Result<Self> {
        match value {
            JsonValue::Null => Ok(Self::new()),
            JsonValue::Object(fields) => {
                let mut clause = Self::new();
                for (name, condition) in fields {
                    clause.insert(name.clone(), FieldFilter::from_json(name, condition)?);
                }
                Ok(clause)
            }
            other => Err(NoSqlError::InvalidArgument(format!(
                "where must be an object, got {}",
                other
            ))),
        }
    }
}

/// Field projection. Empty or all-false selects every field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectSpec {
    fields: Vec<(String, bool)>,
}

impl SelectSpec {
    /// Wildcard selection
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Select exactly these fields
    #[must_use]
    pub fn fields<S: Into<String>>(names: impl IntoIterator<Item = S>) -> Self {
        let mut spec = Self::default();
        for name in names {
            spec = spec.set(name, true);
        }
        spec
    }

    #[must_use]
    pub fn set(mut self, name: impl Into<String>, include: bool) -> Self {
        let name = name.into();
        match self.fields.iter_mut().find(|(existing, _)| *existing == name) {
            Some((_, slot)) => *slot = include,
            None => self.fields.push((name, include)),
        }
        self
    }

    /// Selected fields in insertion order, or `None` for the wildcard
    #[must_use]
    pub fn selected(&self) -> Option<Vec<&str>> {
        let selected: Vec<&str> = self
            .fields
            .iter()
            .filter(|(_, include)| *include)
            .map(|(name, _)| name.as_str())
            .collect();
        if selected.is_empty() {
            None
        } else {
            Some(selected)
        }
    }

    #[must_use]
    pub fn is_wildcard(&self) -> bool {
        self.selected().is_none()
    }

    /// Keep only the selected fields, in selection order
    #[must_use]
    pub fn project(&self, document: Document) -> Document {
        let Some(selected) = self.selected() else {
            return document;
        };
        let mut document = document;
        let mut projected = Document::new();
        for name in selected {
            if let Some(value) = document.remove(name) {
                projected.insert(name.to_string(), value);
            }
        }
        projected
    }

    /// Parse a JSON `select` object of booleans
    pub fn from_json(value: &JsonValue) -> Result<Self> {
        match value {
            JsonValue::Null => Ok(Self::all()),
            JsonValue::Object(fields) => {
                let mut spec = Self::all();
                for (name, include) in fields {
                    let include = include.as_bool().ok_or_else(|| {
                        NoSqlError::InvalidArgument(format!(
                            "select.{} must be a boolean, got {}",
                            name, include
                        ))
                    })?;
                    spec = spec.set(name.clone(), include);
                }
                Ok(spec)
            }
            other => Err(NoSqlError::InvalidArgument(format!(
                "select must be an object, got {}",
                other
            ))),
        }
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

impl FromStr for SortOrder {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("asc") {
            Ok(SortOrder::Asc)
        } else if s.eq_ignore_ascii_case("desc") {
            Ok(SortOrder::Desc)
        } else {
            Err(())
        }
    }
}

/// Sort keys; earlier entries take precedence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderSpec {
    keys: Vec<(String, SortOrder)>,
}

impl OrderSpec {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn asc(self, field: impl Into<String>) -> Self {
        self.by(field, SortOrder::Asc)
    }

    #[must_use]
    pub fn desc(self, field: impl Into<String>) -> Self {
        self.by(field, SortOrder::Desc)
    }

    #[must_use]
    pub fn by(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        let field = field.into();
        match self.keys.iter_mut().find(|(existing, _)| *existing == field) {
            Some((_, slot)) => *slot = order,
            None => self.keys.push((field, order)),
        }
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, SortOrder)> {
        self.keys.iter().map(|(field, order)| (field.as_str(), *order))
    }

    /// Parse a JSON `orderBy` object of `"ASC"`/`"DESC"` values
    pub fn from_json(value: &JsonValue) -> Result<Self> {
        match value {
            JsonValue::Null => Ok(Self::new()),
            JsonValue::Object(keys) => {
                let mut spec = Self::new();
                for (field, order) in keys {
                    let order = order
                        .as_str()
                        .and_then(|s| s.parse::<SortOrder>().ok())
                        .ok_or_else(|| {
                            NoSqlError::InvalidArgument(format!(
                                "orderBy.{} must be ASC or DESC, got {}",
                                field, order
                            ))
                        })?;
                    spec = spec.by(field.clone(), order);
                }
                Ok(spec)
            }
            other => Err(NoSqlError::InvalidArgument(format!(
                "orderBy must be an object, got {}",
                other
            ))),
        }
    }
}
