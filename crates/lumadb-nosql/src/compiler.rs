//! Predicate compiler and clause assembler shared by both backends.
//!
//! A [`Dialect`] supplies the operator-to-syntax mapping; [`QueryCompiler`]
//! walks a [`WhereClause`] and produces [`Fragment`]s. Operands are always
//! bound as parameters. A fragment keeps text and parameter slots apart, so
//! it renders both the executable text (placeholders) and an explain text
//! with literals inlined.

use crate::core::{NoSqlError, Result, Value};
use crate::filter::{Condition, FieldFilter, QueryMode, WhereClause};

/// Operator-to-syntax mapping of one query language
pub trait Dialect {
    /// Reference to a stored attribute. May register an alias.
    fn attribute(&mut self, field: &str) -> String;

    /// Placeholder name for the parameter at `index`
    fn placeholder(&self, index: usize) -> String;

    /// Substring test function
    fn contains_fn(&self) -> &'static str;

    /// Prefix test function
    fn starts_with_fn(&self) -> &'static str;

    /// Inequality token
    fn not_equal(&self) -> &'static str {
        "!="
    }

    /// Lower-case an attribute reference for case-insensitive matching.
    /// `None` when the language has no lower-case function; insensitive
    /// string tests then try the common casings of the operand instead.
    fn lower(&self, attribute: &str) -> Option<String>;

    /// Largest operand list accepted by `IN`
    fn max_in_list(&self) -> Option<usize> {
        None
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Piece {
    Text(String),
    Param(usize),
}

/// Compiled expression text with parameter slots
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fragment {
    pieces: Vec<Piece>,
}

impl Fragment {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fragment holding plain text only
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        let mut fragment = Self::new();
        fragment.push_text(text);
        fragment
    }

    pub fn push_text(&mut self, text: impl Into<String>) {
        let text = text.into();
        if text.is_empty() {
            return;
        }
        match self.pieces.last_mut() {
            Some(Piece::Text(last)) => last.push_str(&text),
            _ => self.pieces.push(Piece::Text(text)),
        }
    }

    pub fn push_param(&mut self, index: usize) {
        self.pieces.push(Piece::Param(index));
    }

    pub fn append(&mut self, other: Fragment) {
        for piece in other.pieces {
            match piece {
                Piece::Text(text) => self.push_text(text),
                Piece::Param(index) => self.push_param(index),
            }
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pieces.is_empty()
    }

    /// Parameter indices in order of appearance
    pub fn params(&self) -> impl Iterator<Item = usize> + '_ {
        self.pieces.iter().filter_map(|piece| match piece {
            Piece::Param(index) => Some(*index),
            Piece::Text(_) => None,
        })
    }

    /// Render with each parameter slot replaced by `slot(index)`
    pub fn render(&self, slot: impl Fn(usize) -> String) -> String {
        let mut out = String::new();
        for piece in &self.pieces {
            match piece {
                Piece::Text(text) => out.push_str(text),
                Piece::Param(index) => out.push_str(&slot(*index)),
            }
        }
        out
    }

    /// Join fragments with `separator`
    #[must_use]
    pub fn join(fragments: Vec<Fragment>, separator: &str) -> Fragment {
        let mut joined = Fragment::new();
        for (i, fragment) in fragments.into_iter().enumerate() {
            if i > 0 {
                joined.push_text(separator);
            }
            joined.append(fragment);
        }
        joined
    }
}

/// Compiles filters over one dialect, owning the bound parameters of a
/// single request.
#[derive(Debug)]
pub struct QueryCompiler<D> {
    dialect: D,
    params: Vec<Value>,
}

impl<D: Dialect> QueryCompiler<D> {
    pub fn new(dialect: D) -> Self {
        Self {
            dialect,
            params: Vec::new(),
        }
    }

    pub fn dialect(&self) -> &D {
        &self.dialect
    }

    pub fn dialect_mut(&mut self) -> &mut D {
        &mut self.dialect
    }

    /// Bound parameters; a parameter's index is its position.
    pub fn params(&self) -> &[Value] {
        &self.params
    }

    pub fn into_parts(self) -> (D, Vec<Value>) {
        (self.dialect, self.params)
    }

    /// Bind a value, returning its slot. Indices never repeat.
    pub fn bind(&mut self, value: Value) -> usize {
        self.params.push(value);
        self.params.len() - 1
    }

    /// Executable text
    pub fn render(&self, fragment: &Fragment) -> String {
        fragment.render(|index| self.dialect.placeholder(index))
    }

    /// Text with literals in place of placeholders, for logs
    pub fn explain(&self, fragment: &Fragment) -> String {
        fragment.render(|index| {
            self.params
                .get(index)
                .map_or_else(|| self.dialect.placeholder(index), Value::to_literal)
        })
    }

    /// Validate and compile a whole `where` clause.
    ///
    /// Returns `None` for an empty clause (match everything). Predicates are
    /// AND-ed across all fields and all operators in insertion order.
    pub fn compile_where(&mut self, clause: &WhereClause) -> Result<Option<Fragment>> {
        clause.validate()?;

        let mut predicates = Vec::new();
        for (field, filter) in clause.iter() {
            predicates.extend(self.compile_field(field, filter)?);
        }

        if predicates.is_empty() {
            Ok(None)
        } else {
            Ok(Some(Fragment::join(predicates, " AND ")))
        }
    }

    /// Compile every condition of one field
    pub fn compile_field(&mut self, field: &str, filter: &FieldFilter) -> Result<Vec<Fragment>> {
        filter
            .conditions()
            .iter()
            .map(|condition| self.compile_condition(field, condition, filter.query_mode()))
            .collect()
    }

    /// Compile one operator and operand into one boolean expression
    pub fn compile_condition(
        &mut self,
        field: &str,
        condition: &Condition,
        mode: QueryMode,
    ) -> Result<Fragment> {
        let attribute = self.dialect.attribute(field);

        let fragment = match condition {
            Condition::Equals(value) => self.comparison(&attribute, "=", value),
            Condition::Not(value) => {
                let op = self.dialect.not_equal();
                self.comparison(&attribute, op, value)
            }
            Condition::Lt(value) => self.comparison(&attribute, "<", value),
            Condition::Lte(value) => self.comparison(&attribute, "<=", value),
            Condition::Gt(value) => self.comparison(&attribute, ">", value),
            Condition::Gte(value) => self.comparison(&attribute, ">=", value),
            Condition::Contains(text) | Condition::EndsWith(text) => {
                let function = self.dialect.contains_fn();
                self.string_function(function, &attribute, text, mode)
            }
            Condition::StartsWith(text) => {
                let function = self.dialect.starts_with_fn();
                self.string_function(function, &attribute, text, mode)
            }
            Condition::In(values) => self.membership(field, &attribute, values)?,
            Condition::NotIn(values) => {
                let mut fragment = Fragment::text("NOT (");
                fragment.append(self.membership(field, &attribute, values)?);
                fragment.push_text(")");
                fragment
            }
        };

        Ok(fragment)
    }

    fn comparison(&mut self, attribute: &str, op: &str, value: &Value) -> Fragment {
        let index = self.bind(value.clone());
        let mut fragment = Fragment::text(format!("{} {} ", attribute, op));
        fragment.push_param(index);
        fragment
    }

    fn string_function(
        &mut self,
        function: &str,
        attribute: &str,
        operand: &str,
        mode: QueryMode,
    ) -> Fragment {
        match (mode, self.dialect.lower(attribute)) {
            (QueryMode::Sensitive, _) => self.call(function, attribute, operand.to_string()),
            (QueryMode::Insensitive, Some(lowered)) => {
                self.call(function, &lowered, operand.to_lowercase())
            }
            (QueryMode::Insensitive, None) => {
                let calls: Vec<Fragment> = case_variants(operand)
                    .into_iter()
                    .map(|variant| self.call(function, attribute, variant))
                    .collect();
                if calls.len() == 1 {
                    return Fragment::join(calls, "");
                }
                let mut fragment = Fragment::text("(");
                fragment.append(Fragment::join(calls, " OR "));
                fragment.push_text(")");
                fragment
            }
        }
    }

    fn call(&mut self, function: &str, target: &str, operand: String) -> Fragment {
        let index = self.bind(Value::String(operand));
        let mut fragment = Fragment::text(format!("{}({}, ", function, target));
        fragment.push_param(index);
        fragment.push_text(")");
        fragment
    }

    fn membership(&mut self, field: &str, attribute: &str, values: &[Value]) -> Result<Fragment> {
        if values.is_empty() {
            return Err(NoSqlError::malformed(field, "`in` requires at least one value"));
        }
        if let Some(max) = self.dialect.max_in_list() {
            if values.len() > max {
                return Err(NoSqlError::malformed(
                    field,
                    format!("`in` accepts at most {} values, got {}", max, values.len()),
                ));
            }
        }

        let mut fragment = Fragment::text(format!("{} IN (", attribute));
        for (i, value) in values.iter().enumerate() {
            if i > 0 {
                fragment.push_text(", ");
            }
            let index = self.bind(value.clone());
            fragment.push_param(index);
        }
        fragment.push_text(")");
        Ok(fragment)
    }
}

/// Operand as given, lower-cased, upper-cased and capitalized, without
/// duplicates
fn case_variants(operand: &str) -> Vec<String> {
    let lower = operand.to_lowercase();
    let mut rest = lower.chars();
    let capitalized: String = rest
        .next()
        .map(|first| first.to_uppercase().chain(rest).collect())
        .unwrap_or_default();

    let mut variants: Vec<String> = Vec::with_capacity(4);
    for variant in [operand.to_string(), lower.clone(), operand.to_uppercase(), capitalized] {
        if !variants.contains(&variant) {
            variants.push(variant);
        }
    }
    variants
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ErrorKind;
    use crate::filter::FieldFilter;

    struct Plain;

    impl Dialect for Plain {
        fn attribute(&mut self, field: &str) -> String {
            field.to_string()
        }

        fn placeholder(&self, index: usize) -> String {
            format!("${}", index)
        }

        fn contains_fn(&self) -> &'static str {
            "HAS"
        }

        fn starts_with_fn(&self) -> &'static str {
            "PREFIX"
        }

        fn lower(&self, attribute: &str) -> Option<String> {
            Some(format!("low({})", attribute))
        }

        fn max_in_list(&self) -> Option<usize> {
            Some(3)
        }
    }

    fn compile(clause: &WhereClause) -> (String, String, Vec<Value>) {
        let mut compiler = QueryCompiler::new(Plain);
        let fragment = compiler.compile_where(clause).unwrap().unwrap();
        let text = compiler.render(&fragment);
        let explain = compiler.explain(&fragment);
        (text, explain, compiler.into_parts().1)
    }

    #[test]
    fn test_empty_where_matches_all() {
        let mut compiler = QueryCompiler::new(Plain);
        assert!(compiler.compile_where(&WhereClause::new()).unwrap().is_none());
        assert!(compiler.params().is_empty());
    }

    #[test]
    fn test_and_across_fields_and_operators() {
        let clause = WhereClause::new()
            .field("lastName", FieldFilter::new().equals("Smith"))
            .field("age", FieldFilter::new().gte(18).lt(65));
        let (text, explain, params) = compile(&clause);

        assert_eq!(text, "lastName = $0 AND age >= $1 AND age < $2");
        assert_eq!(explain, r#"lastName = "Smith" AND age >= 18 AND age < 65"#);
        assert_eq!(params.len(), 3);
    }

    #[test]
    fn test_insensitive_prefix_and_suffix() {
        let clause = WhereClause::new().field(
            "firstName",
            FieldFilter::new().starts_with("Sa").ends_with("LYN").insensitive(),
        );
        let (text, explain, _) = compile(&clause);

        assert_eq!(text, "PREFIX(low(firstName), $0) AND HAS(low(firstName), $1)");
        assert_eq!(
            explain,
            r#"PREFIX(low(firstName), "sa") AND HAS(low(firstName), "lyn")"#
        );
    }

    struct NoLower;

    impl Dialect for NoLower {
        fn attribute(&mut self, field: &str) -> String {
            field.to_string()
        }

        fn placeholder(&self, index: usize) -> String {
            format!("${}", index)
        }

        fn contains_fn(&self) -> &'static str {
            "HAS"
        }

        fn starts_with_fn(&self) -> &'static str {
            "PREFIX"
        }

        fn lower(&self, _attribute: &str) -> Option<String> {
            None
        }
    }

    #[test]
    fn test_insensitive_without_lower_tries_casings() {
        let mut compiler = QueryCompiler::new(NoLower);
        let clause = WhereClause::new()
            .field("firstName", FieldFilter::new().starts_with("sA").insensitive());
        let fragment = compiler.compile_where(&clause).unwrap().unwrap();

        assert_eq!(
            compiler.render(&fragment),
            "(PREFIX(firstName, $0) OR PREFIX(firstName, $1) OR PREFIX(firstName, $2) OR PREFIX(firstName, $3))"
        );
        assert_eq!(
            compiler.params(),
            &[
                Value::from("sA"),
                Value::from("sa"),
                Value::from("SA"),
                Value::from("Sa")
            ]
        );
    }

    #[test]
    fn test_case_variants_skip_duplicates() {
        assert_eq!(case_variants("sam"), vec!["sam", "SAM", "Sam"]);
        assert_eq!(case_variants("42"), vec!["42"]);
        assert_eq!(case_variants("élan"), vec!["élan", "ÉLAN", "Élan"]);
    }

    #[test]
    fn test_in_renders_unquoted_numbers() {
        let clause = WhereClause::new().field("age", FieldFilter::new().is_in([25, 30, 35]));
        let (text, explain, _) = compile(&clause);

        assert_eq!(text, "age IN ($0, $1, $2)");
        assert_eq!(explain, "age IN (25, 30, 35)");
    }

    #[test]
    fn test_not_in_and_not() {
        let clause = WhereClause::new()
            .field("status", FieldFilter::new().not_in(["a", "b"]))
            .field("active", FieldFilter::new().not(false));
        let (text, _, _) = compile(&clause);

        assert_eq!(text, "NOT (status IN ($0, $1)) AND active != $2");
    }

    #[test]
    fn test_in_list_limit() {
        let clause = WhereClause::new().field("age", FieldFilter::new().is_in([1, 2, 3, 4]));
        let mut compiler = QueryCompiler::new(Plain);
        let err = compiler.compile_where(&clause).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedFilter);
    }

    #[test]
    fn test_invalid_clause_is_rejected_before_binding() {
        let clause = WhereClause::new()
            .field("name", FieldFilter::new().equals("a"))
            .field("age", FieldFilter::new());
        let mut compiler = QueryCompiler::new(Plain);
        let err = compiler.compile_where(&clause).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedFilter);
        assert!(compiler.params().is_empty());
    }

    #[test]
    fn test_placeholders_are_monotonic() {
        let mut compiler = QueryCompiler::new(Plain);
        let first = compiler.bind(Value::from(1));
        let clause = WhereClause::new().field("a", FieldFilter::new().equals(2));
        let fragment = compiler.compile_where(&clause).unwrap().unwrap();

        assert_eq!(first, 0);
        assert_eq!(fragment.params().collect::<Vec<_>>(), vec![1]);
    }
}
