//! Expression-attribute dialect for DynamoDB.
//!
//! Every attribute is referenced through a `#n{i}` alias and every operand
//! through a `:v{i}` value. One alias exists per distinct field, shared by
//! the projection, key condition, filter, update and condition expressions
//! of a request.

use std::collections::HashMap;

use serde_json::Value as JsonValue;

use crate::compiler::{Dialect, QueryCompiler};
use crate::dynamodb::translator::value_to_attribute;
use crate::filter::SelectSpec;

/// Largest `IN` operand list DynamoDB accepts
pub const MAX_IN_OPERANDS: usize = 100;

fn alias_in(names: &mut Vec<String>, field: &str) -> String {
    let index = match names.iter().position(|name| name == field) {
        Some(index) => index,
        None => {
            names.push(field.to_string());
            names.len() - 1
        }
    };
    format!("#n{}", index)
}

/// DynamoDB syntax with its attribute-name alias table
#[derive(Debug, Default)]
pub struct DynamoDialect {
    names: Vec<String>,
}

impl DynamoDialect {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Alias for `field`, reusing an existing one
    pub fn alias(&mut self, field: &str) -> String {
        alias_in(&mut self.names, field)
    }

    /// `ProjectionExpression` for a select, `None` for the wildcard
    pub fn projection(&mut self, select: &SelectSpec) -> Option<String> {
        let selected = select.selected()?;
        let aliases: Vec<String> = selected.into_iter().map(|field| self.alias(field)).collect();
        Some(aliases.join(", "))
    }
}

impl Dialect for DynamoDialect {
    fn attribute(&mut self, field: &str) -> String {
        self.alias(field)
    }

    fn placeholder(&self, index: usize) -> String {
        format!(":v{}", index)
    }

    fn contains_fn(&self) -> &'static str {
        "contains"
    }

    fn starts_with_fn(&self) -> &'static str {
        "begins_with"
    }

    fn not_equal(&self) -> &'static str {
        "<>"
    }

    /// DynamoDB has no lower-case function; insensitive tests OR together
    /// the operand's casings, so they match whatever the case-sensitive
    /// test matches.
    fn lower(&self, _attribute: &str) -> Option<String> {
        None
    }

    fn max_in_list(&self) -> Option<usize> {
        Some(MAX_IN_OPERANDS)
    }
}

/// Finished alias and value tables of one request.
///
/// Built once compilation is done; values bound afterwards continue the
/// same counter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExpressionAttributes {
    names: Vec<String>,
    values: Vec<JsonValue>,
}

impl ExpressionAttributes {
    pub fn from_compiler(compiler: QueryCompiler<DynamoDialect>) -> Self {
        let (dialect, params) = compiler.into_parts();
        Self {
            names: dialect.names,
            values: params.iter().map(value_to_attribute).collect(),
        }
    }

    pub fn alias(&mut self, field: &str) -> String {
        alias_in(&mut self.names, field)
    }

    /// Bind an already typed attribute value
    pub fn bind(&mut self, attribute: JsonValue) -> String {
        self.values.push(attribute);
        format!(":v{}", self.values.len() - 1)
    }

    /// `ExpressionAttributeNames`, `None` when no alias was used
    #[must_use]
    pub fn names(&self) -> Option<HashMap<String, String>> {
        if self.names.is_empty() {
            return None;
        }
        Some(
            self.names
                .iter()
                .enumerate()
                .map(|(i, name)| (format!("#n{}", i), name.clone()))
                .collect(),
        )
    }

    /// `ExpressionAttributeValues`, `None` when nothing was bound
    #[must_use]
    pub fn values(&self) -> Option<HashMap<String, JsonValue>> {
        if self.values.is_empty() {
            return None;
        }
        Some(
            self.values
                .iter()
                .enumerate()
                .map(|(i, value)| (format!(":v{}", i), value.clone()))
                .collect(),
        )
    }
}
