//! Cosmos SQL query builder.
//!
//! Queries always address the container through the `c` alias and bind every
//! operand as an `@p{i}` parameter.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::compiler::{Dialect, Fragment, QueryCompiler};
use crate::core::{Result, Value};
use crate::filter::{Condition, OrderSpec, QueryMode, SelectSpec, WhereClause};

/// Words that cannot follow `c.` unbracketed
const RESERVED: &[&str] = &[
    "and", "array", "as", "asc", "between", "by", "desc", "distinct", "escape", "exists", "false",
    "for", "from", "group", "in", "join", "like", "limit", "not", "null", "offset", "or", "order",
    "select", "top", "true", "udf", "undefined", "value", "where",
];

fn is_plain_identifier(field: &str) -> bool {
    let mut chars = field.chars();
    let starts_well = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    starts_well
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !RESERVED.iter().any(|word| word.eq_ignore_ascii_case(field))
}

/// Property path on the `c` alias: `c.name` or `c["first name"]`
#[must_use]
pub fn property_path(field: &str) -> String {
    if is_plain_identifier(field) {
        format!("c.{}", field)
    } else {
        format!("c[{}]", JsonValue::String(field.to_string()))
    }
}

/// Cosmos SQL syntax
#[derive(Debug, Clone, Copy, Default)]
pub struct CosmosDialect;

impl Dialect for CosmosDialect {
    fn attribute(&mut self, field: &str) -> String {
        property_path(field)
    }

    fn placeholder(&self, index: usize) -> String {
        format!("@p{}", index)
    }

    fn contains_fn(&self) -> &'static str {
        "CONTAINS"
    }

    fn starts_with_fn(&self) -> &'static str {
        "STARTSWITH"
    }

    fn lower(&self, attribute: &str) -> Option<String> {
        Some(format!("LOWER({})", attribute))
    }
}

/// Named query parameter, serialized as the REST API expects
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqlParameter {
    pub name: String,
    pub value: JsonValue,
}

/// Parameterized query text
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SqlQuerySpec {
    pub query: String,
    pub parameters: Vec<SqlParameter>,
}

/// A compiled query and its literal rendering for logs
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    pub spec: SqlQuerySpec,
    pub explain: String,
}

/// Projection list for a select, `*` for the wildcard.
///
/// A bracketed path would come back under a generated `$n` name, so any
/// such field falls back to `*` and the caller projects the result.
#[must_use]
pub fn construct_field_selection(select: Option<&SelectSpec>) -> String {
    let Some(selected) = select.and_then(SelectSpec::selected) else {
        return "*".to_string();
    };
    if !selected.iter().all(|field| is_plain_identifier(field)) {
        return "*".to_string();
    }
    selected
        .iter()
        .map(|field| property_path(field))
        .collect::<Vec<_>>()
        .join(", ")
}

fn order_clause(order_by: &OrderSpec) -> Option<String> {
    if order_by.is_empty() {
        return None;
    }
    let keys: Vec<String> = order_by
        .iter()
        .map(|(field, order)| format!("{} {}", property_path(field), order.as_str()))
        .collect();
    Some(keys.join(", "))
}

fn finish(
    compiler: &QueryCompiler<CosmosDialect>,
    select: &SelectSpec,
    filter: Option<&Fragment>,
    order_by: &OrderSpec,
) -> CompiledQuery {
    let head = format!("SELECT {} FROM c", construct_field_selection(Some(select)));
    let mut query = head.clone();
    let mut explain = head;
    if let Some(filter) = filter {
        query.push_str(" WHERE ");
        query.push_str(&compiler.render(filter));
        explain.push_str(" WHERE ");
        explain.push_str(&compiler.explain(filter));
    }
    if let Some(order) = order_clause(order_by) {
        query.push_str(" ORDER BY ");
        query.push_str(&order);
        explain.push_str(" ORDER BY ");
        explain.push_str(&order);
    }

    let parameters = compiler
        .params()
        .iter()
        .enumerate()
        .map(|(i, value)| SqlParameter {
            name: compiler.dialect().placeholder(i),
            value: value.to_json(),
        })
        .collect();

    CompiledQuery {
        spec: SqlQuerySpec { query, parameters },
        explain,
    }
}

/// Compile a `findMany` request
pub fn compile_find_many(
    filter: &WhereClause,
    select: &SelectSpec,
    order_by: &OrderSpec,
) -> Result<CompiledQuery> {
    let mut compiler = QueryCompiler::new(CosmosDialect);
    let fragment = compiler.compile_where(filter)?;
    Ok(finish(&compiler, select, fragment.as_ref(), order_by))
}

/// Compile a single-record lookup keyed by id
pub fn compile_find_by_id(id: &str, select: &SelectSpec) -> Result<CompiledQuery> {
    let mut compiler = QueryCompiler::new(CosmosDialect);
    let fragment = compiler.compile_condition(
        "id",
        &Condition::Equals(Value::from(id)),
        QueryMode::Sensitive,
    )?;
    Ok(finish(&compiler, select, Some(&fragment), &OrderSpec::new()))
}
