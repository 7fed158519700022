//! Expression parser and evaluator for the in-memory stores.
//!
//! Understands the subset of DynamoDB expression syntax and Cosmos SQL the
//! adapters emit, plus the usual hand-written forms (`BETWEEN`, `OR`,
//! unaliased attribute names, literals).

use std::cmp::Ordering;
use std::collections::HashMap;

use serde_json::Value as JsonValue;

use crate::core::{Document, StoreError};

type EvalResult<T> = std::result::Result<T, StoreError>;

fn invalid(reason: impl Into<String>) -> StoreError {
    StoreError::Service(format!("ValidationException: {}", reason.into()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Name(String),
    Placeholder(String),
    Str(String),
    Number(JsonValue),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Dot,
    Star,
    Op(CmpOp),
}

fn read_string(chars: &mut std::iter::Peekable<std::str::Chars<'_>>, quote: char) -> EvalResult<String> {
    let mut out = String::new();
    loop {
        match chars.next() {
            None => return Err(invalid("unterminated string literal")),
            Some(c) if c == quote => return Ok(out),
            Some('\\') => match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some('r') => out.push('\r'),
                Some('u') => {
                    let hex: String = chars.by_ref().take(4).collect();
                    let code = u32::from_str_radix(&hex, 16)
                        .ok()
                        .and_then(char::from_u32)
                        .ok_or_else(|| invalid(format!("bad escape \\u{}", hex)))?;
                    out.push(code);
                }
                Some(other) => out.push(other),
                None => return Err(invalid("unterminated escape")),
            },
            Some(c) => out.push(c),
        }
    }
}

fn tokenize(text: &str) -> EvalResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = text.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' | ')' | '[' | ']' | ',' | '.' | '*' => {
                chars.next();
                tokens.push(match c {
                    '(' => Token::LParen,
                    ')' => Token::RParen,
                    '[' => Token::LBracket,
                    ']' => Token::RBracket,
                    ',' => Token::Comma,
                    '.' => Token::Dot,
                    _ => Token::Star,
                });
            }
            '=' => {
                chars.next();
                tokens.push(Token::Op(CmpOp::Eq));
            }
            '!' => {
                chars.next();
                if chars.next() != Some('=') {
                    return Err(invalid("expected `!=`"));
                }
                tokens.push(Token::Op(CmpOp::Ne));
            }
            '<' => {
                chars.next();
                let op = match chars.peek() {
                    Some('=') => CmpOp::Le,
                    Some('>') => CmpOp::Ne,
                    _ => CmpOp::Lt,
                };
                if op != CmpOp::Lt {
                    chars.next();
                }
                tokens.push(Token::Op(op));
            }
            '>' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::Op(CmpOp::Ge));
                } else {
                    tokens.push(Token::Op(CmpOp::Gt));
                }
            }
            '"' | '\'' => {
                chars.next();
                tokens.push(Token::Str(read_string(&mut chars, c)?));
            }
            '#' | ':' | '@' => {
                chars.next();
                let mut name = c.to_string();
                while let Some(&n) = chars.peek() {
                    if n.is_alphanumeric() || n == '_' {
                        name.push(n);
                        chars.next();
                    } else {
                        break;
                    }
                }
                if name.len() == 1 {
                    return Err(invalid(format!("dangling `{}`", c)));
                }
                tokens.push(if c == '#' {
                    Token::Name(name)
                } else {
                    Token::Placeholder(name)
                });
            }
            c if c.is_ascii_digit() || c == '-' => {
                let mut number = String::new();
                while let Some(&n) = chars.peek() {
                    if n.is_ascii_digit() || matches!(n, '.' | 'e' | 'E' | '+' | '-') {
                        number.push(n);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let value: JsonValue = serde_json::from_str(&number)
                    .map_err(|_| invalid(format!("bad number {}", number)))?;
                tokens.push(Token::Number(value));
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut ident = String::new();
                while let Some(&n) = chars.peek() {
                    if n.is_alphanumeric() || n == '_' {
                        ident.push(n);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(ident));
            }
            other => return Err(invalid(format!("unexpected character `{}`", other))),
        }
    }

    Ok(tokens)
}

/// A value position in an expression
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Operand {
    Path(String),
    Param(String),
    Literal(JsonValue),
    Lower(Box<Operand>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Function {
    BeginsWith,
    Contains,
    EndsWith,
    Exists,
    NotExists,
}

impl Function {
    fn lookup(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "begins_with" | "startswith" => Some(Function::BeginsWith),
            "contains" => Some(Function::Contains),
            "endswith" => Some(Function::EndsWith),
            "attribute_exists" | "is_defined" => Some(Function::Exists),
            "attribute_not_exists" => Some(Function::NotExists),
            _ => None,
        }
    }
}

/// Boolean expression tree
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Compare(Operand, CmpOp, Operand),
    In(Operand, Vec<Operand>),
    Between(Operand, Operand, Operand),
    Call(Function, Vec<Operand>),
}

impl Operand {
    fn collect_paths<'a>(&'a self, paths: &mut Vec<&'a str>) {
        match self {
            Operand::Path(path) => paths.push(path),
            Operand::Lower(inner) => inner.collect_paths(paths),
            Operand::Param(_) | Operand::Literal(_) => {}
        }
    }
}

impl Expr {
    /// Attribute paths the expression reads
    pub(crate) fn paths(&self) -> Vec<&str> {
        let mut paths = Vec::new();
        self.collect_paths(&mut paths);
        paths
    }

    fn collect_paths<'a>(&'a self, paths: &mut Vec<&'a str>) {
        match self {
            Expr::And(left, right) | Expr::Or(left, right) => {
                left.collect_paths(paths);
                right.collect_paths(paths);
            }
            Expr::Not(inner) => inner.collect_paths(paths),
            Expr::Compare(left, _, right) => {
                left.collect_paths(paths);
                right.collect_paths(paths);
            }
            Expr::In(operand, list) => {
                operand.collect_paths(paths);
                list.iter().for_each(|item| item.collect_paths(paths));
            }
            Expr::Between(value, low, high) => {
                for operand in [value, low, high] {
                    operand.collect_paths(paths);
                }
            }
            Expr::Call(_, args) => args.iter().for_each(|arg| arg.collect_paths(paths)),
        }
    }
}

/// Parsed `SELECT ... FROM c [WHERE ...] [ORDER BY ...]`
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SelectQuery {
    /// `None` for `*`
    pub projection: Option<Vec<String>>,
    pub filter: Option<Expr>,
    /// Field and ascending flag
    pub order: Vec<(String, bool)>,
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    names: Option<&'a HashMap<String, String>>,
}

impl<'a> Parser<'a> {
    fn new(text: &str, names: Option<&'a HashMap<String, String>>) -> EvalResult<Self> {
        Ok(Self {
            tokens: tokenize(text)?,
            pos: 0,
            names,
        })
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn at_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Token::Ident(ident)) if ident.eq_ignore_ascii_case(keyword))
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.at_keyword(keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> EvalResult<()> {
        if self.eat_keyword(keyword) {
            Ok(())
        } else {
            Err(invalid(format!("expected {}", keyword)))
        }
    }

    fn expect(&mut self, token: &Token) -> EvalResult<()> {
        match self.next() {
            Some(ref found) if found == token => Ok(()),
            found => Err(invalid(format!("expected {:?}, found {:?}", token, found))),
        }
    }

    fn expect_end(&self) -> EvalResult<()> {
        match self.peek() {
            None => Ok(()),
            Some(token) => Err(invalid(format!("unexpected trailing {:?}", token))),
        }
    }

    fn expr(&mut self) -> EvalResult<Expr> {
        let mut left = self.and()?;
        while self.eat_keyword("OR") {
            let right = self.and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and(&mut self) -> EvalResult<Expr> {
        let mut left = self.unary()?;
        while self.eat_keyword("AND") {
            let right = self.unary()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn unary(&mut self) -> EvalResult<Expr> {
        if self.eat_keyword("NOT") {
            return Ok(Expr::Not(Box::new(self.unary()?)));
        }
        self.primary()
    }

    fn primary(&mut self) -> EvalResult<Expr> {
        if self.peek() == Some(&Token::LParen) {
            self.pos += 1;
            let inner = self.expr()?;
            self.expect(&Token::RParen)?;
            return Ok(inner);
        }

        if let (Some(Token::Ident(name)), Some(Token::LParen)) = (self.peek(), self.peek_at(1)) {
            if let Some(function) = Function::lookup(name) {
                self.pos += 2;
                let args = self.operand_list()?;
                return Ok(Expr::Call(function, args));
            }
        }

        let left = self.operand()?;
        if self.eat_keyword("IN") {
            self.expect(&Token::LParen)?;
            let values = self.operand_list()?;
            return Ok(Expr::In(left, values));
        }
        if self.eat_keyword("BETWEEN") {
            let low = self.operand()?;
            self.expect_keyword("AND")?;
            let high = self.operand()?;
            return Ok(Expr::Between(left, low, high));
        }
        match self.next() {
            Some(Token::Op(op)) => {
                let right = self.operand()?;
                Ok(Expr::Compare(left, op, right))
            }
            other => Err(invalid(format!("expected comparison, found {:?}", other))),
        }
    }

    /// Operands up to and including the closing parenthesis
    fn operand_list(&mut self) -> EvalResult<Vec<Operand>> {
        let mut operands = vec![self.operand()?];
        while self.peek() == Some(&Token::Comma) {
            self.pos += 1;
            operands.push(self.operand()?);
        }
        self.expect(&Token::RParen)?;
        Ok(operands)
    }

    fn path(&mut self) -> EvalResult<String> {
        match self.operand()? {
            Operand::Path(field) => Ok(field),
            other => Err(invalid(format!("expected attribute path, found {:?}", other))),
        }
    }

    fn operand(&mut self) -> EvalResult<Operand> {
        match self.next() {
            Some(Token::Name(alias)) => self
                .names
                .and_then(|names| names.get(&alias))
                .map(|field| Operand::Path(field.clone()))
                .ok_or_else(|| invalid(format!("undefined attribute name {}", alias))),
            Some(Token::Placeholder(name)) => Ok(Operand::Param(name)),
            Some(Token::Str(s)) => Ok(Operand::Literal(JsonValue::String(s))),
            Some(Token::Number(n)) => Ok(Operand::Literal(n)),
            Some(Token::Ident(ident)) => {
                if ident.eq_ignore_ascii_case("LOWER") && self.peek() == Some(&Token::LParen) {
                    self.pos += 1;
                    let inner = self.operand()?;
                    self.expect(&Token::RParen)?;
                    return Ok(Operand::Lower(Box::new(inner)));
                }
                match self.peek() {
                    Some(Token::Dot) => {
                        self.pos += 1;
                        match self.next() {
                            Some(Token::Ident(field)) => Ok(Operand::Path(field)),
                            other => Err(invalid(format!("expected property, found {:?}", other))),
                        }
                    }
                    Some(Token::LBracket) => {
                        self.pos += 1;
                        let field = match self.next() {
                            Some(Token::Str(field)) => field,
                            other => {
                                return Err(invalid(format!(
                                    "expected quoted property, found {:?}",
                                    other
                                )))
                            }
                        };
                        self.expect(&Token::RBracket)?;
                        Ok(Operand::Path(field))
                    }
                    _ => Ok(match ident.to_ascii_lowercase().as_str() {
                        "true" => Operand::Literal(JsonValue::Bool(true)),
                        "false" => Operand::Literal(JsonValue::Bool(false)),
                        "null" => Operand::Literal(JsonValue::Null),
                        _ => Operand::Path(ident),
                    }),
                }
            }
            other => Err(invalid(format!("expected operand, found {:?}", other))),
        }
    }
}

/// Parse a filter, key condition or condition expression
pub(crate) fn parse_condition(
    text: &str,
    names: Option<&HashMap<String, String>>,
) -> EvalResult<Expr> {
    let mut parser = Parser::new(text, names)?;
    let expr = parser.expr()?;
    parser.expect_end()?;
    Ok(expr)
}

/// Parse a comma-separated attribute list (`ProjectionExpression`)
pub(crate) fn parse_paths(
    text: &str,
    names: Option<&HashMap<String, String>>,
) -> EvalResult<Vec<String>> {
    let mut parser = Parser::new(text, names)?;
    let mut paths = vec![parser.path()?];
    while parser.peek() == Some(&Token::Comma) {
        parser.pos += 1;
        paths.push(parser.path()?);
    }
    parser.expect_end()?;
    Ok(paths)
}

/// Parse `SET a = :v, b = :w`
pub(crate) fn parse_set(
    text: &str,
    names: Option<&HashMap<String, String>>,
) -> EvalResult<Vec<(String, Operand)>> {
    let mut parser = Parser::new(text, names)?;
    parser.expect_keyword("SET")?;
    let mut assignments = Vec::new();
    loop {
        let field = parser.path()?;
        parser.expect(&Token::Op(CmpOp::Eq))?;
        let value = parser.operand()?;
        assignments.push((field, value));
        if parser.peek() == Some(&Token::Comma) {
            parser.pos += 1;
        } else {
            break;
        }
    }
    parser.expect_end()?;
    Ok(assignments)
}

/// Parse a Cosmos `SELECT` over a single container alias
pub(crate) fn parse_select(text: &str) -> EvalResult<SelectQuery> {
    let mut parser = Parser::new(text, None)?;
    parser.expect_keyword("SELECT")?;

    let projection = if parser.peek() == Some(&Token::Star) {
        parser.pos += 1;
        None
    } else {
        let mut fields = vec![parser.path()?];
        while parser.peek() == Some(&Token::Comma) {
            parser.pos += 1;
            fields.push(parser.path()?);
        }
        Some(fields)
    };

    parser.expect_keyword("FROM")?;
    match parser.next() {
        Some(Token::Ident(_)) => {}
        other => return Err(invalid(format!("expected container alias, found {:?}", other))),
    }

    let filter = if parser.eat_keyword("WHERE") {
        Some(parser.expr()?)
    } else {
        None
    };

    let mut order = Vec::new();
    if parser.eat_keyword("ORDER") {
        parser.expect_keyword("BY")?;
        loop {
            let field = parser.path()?;
            let ascending = if parser.eat_keyword("DESC") {
                false
            } else {
                parser.eat_keyword("ASC");
                true
            };
            order.push((field, ascending));
            if parser.peek() == Some(&Token::Comma) {
                parser.pos += 1;
            } else {
                break;
            }
        }
    }

    parser.expect_end()?;
    Ok(SelectQuery {
        projection,
        filter,
        order,
    })
}

fn type_rank(value: Option<&JsonValue>) -> u8 {
    match value {
        None => 0,
        Some(JsonValue::Null) => 1,
        Some(JsonValue::Bool(_)) => 2,
        Some(JsonValue::Number(_)) => 3,
        Some(JsonValue::String(_)) => 4,
        Some(JsonValue::Array(_)) => 5,
        Some(JsonValue::Object(_)) => 6,
    }
}

/// Ordering of two values of the same scalar type
fn compare_values(a: &JsonValue, b: &JsonValue) -> Option<Ordering> {
    match (a, b) {
        (JsonValue::Number(x), JsonValue::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (JsonValue::String(x), JsonValue::String(y)) => Some(x.cmp(y)),
        (JsonValue::Bool(x), JsonValue::Bool(y)) => Some(x.cmp(y)),
        (JsonValue::Null, JsonValue::Null) => Some(Ordering::Equal),
        (x, y) if x == y => Some(Ordering::Equal),
        _ => None,
    }
}

/// Total order used by `ORDER BY`: missing, null, bool, number, string
pub(crate) fn sort_order(a: Option<&JsonValue>, b: Option<&JsonValue>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => compare_values(x, y)
            .unwrap_or_else(|| type_rank(a).cmp(&type_rank(b))),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

/// Values an expression is evaluated against
pub(crate) struct Scope<'a> {
    pub document: &'a Document,
    pub params: &'a HashMap<String, JsonValue>,
}

impl Scope<'_> {
    pub(crate) fn resolve(&self, operand: &Operand) -> EvalResult<Option<JsonValue>> {
        match operand {
            Operand::Path(field) => Ok(self.document.get(field).cloned()),
            Operand::Param(name) => self
                .params
                .get(name)
                .cloned()
                .map(Some)
                .ok_or_else(|| invalid(format!("undefined value {}", name))),
            Operand::Literal(value) => Ok(Some(value.clone())),
            Operand::Lower(inner) => Ok(match self.resolve(inner)? {
                Some(JsonValue::String(s)) => Some(JsonValue::String(s.to_lowercase())),
                _ => None,
            }),
        }
    }

    pub(crate) fn eval(&self, expr: &Expr) -> EvalResult<bool> {
        Ok(match expr {
            Expr::And(left, right) => self.eval(left)? && self.eval(right)?,
            Expr::Or(left, right) => self.eval(left)? || self.eval(right)?,
            Expr::Not(inner) => !self.eval(inner)?,
            Expr::Compare(left, op, right) => {
                let (Some(a), Some(b)) = (self.resolve(left)?, self.resolve(right)?) else {
                    return Ok(false);
                };
                let ordering = compare_values(&a, &b);
                match op {
                    CmpOp::Eq => ordering == Some(Ordering::Equal),
                    CmpOp::Ne => ordering != Some(Ordering::Equal),
                    CmpOp::Lt => ordering == Some(Ordering::Less),
                    CmpOp::Le => matches!(ordering, Some(Ordering::Less | Ordering::Equal)),
                    CmpOp::Gt => ordering == Some(Ordering::Greater),
                    CmpOp::Ge => matches!(ordering, Some(Ordering::Greater | Ordering::Equal)),
                }
            }
            Expr::In(left, candidates) => {
                let Some(value) = self.resolve(left)? else {
                    return Ok(false);
                };
                let mut found = false;
                for candidate in candidates {
                    if let Some(candidate) = self.resolve(candidate)? {
                        if compare_values(&value, &candidate) == Some(Ordering::Equal) {
                            found = true;
                        }
                    }
                }
                found
            }
            Expr::Between(value, low, high) => {
                let (Some(v), Some(lo), Some(hi)) =
                    (self.resolve(value)?, self.resolve(low)?, self.resolve(high)?)
                else {
                    return Ok(false);
                };
                matches!(compare_values(&v, &lo), Some(Ordering::Greater | Ordering::Equal))
                    && matches!(compare_values(&v, &hi), Some(Ordering::Less | Ordering::Equal))
            }
            Expr::Call(function, args) => self.call(*function, args)?,
        })
    }

    fn call(&self, function: Function, args: &[Operand]) -> EvalResult<bool> {
        match (function, args) {
            (Function::Exists, [Operand::Path(field)]) => Ok(self.document.contains_key(field)),
            (Function::NotExists, [Operand::Path(field)]) => {
                Ok(!self.document.contains_key(field))
            }
            (Function::BeginsWith | Function::Contains | Function::EndsWith, [target, operand]) => {
                let (Some(target), Some(operand)) = (self.resolve(target)?, self.resolve(operand)?)
                else {
                    return Ok(false);
                };
                Ok(match (function, &target, &operand) {
                    (Function::BeginsWith, JsonValue::String(t), JsonValue::String(o)) => {
                        t.starts_with(o.as_str())
                    }
                    (Function::EndsWith, JsonValue::String(t), JsonValue::String(o)) => {
                        t.ends_with(o.as_str())
                    }
                    (Function::Contains, JsonValue::String(t), JsonValue::String(o)) => {
                        t.contains(o.as_str())
                    }
                    (Function::Contains, JsonValue::Array(items), _) => items.contains(&operand),
                    _ => false,
                })
            }
            (function, args) => Err(invalid(format!(
                "bad arguments to {:?}: {:?}",
                function, args
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn document(value: JsonValue) -> Document {
        value.as_object().unwrap().clone()
    }

    fn eval(text: &str, doc: &Document, params: &HashMap<String, JsonValue>) -> bool {
        let names: HashMap<String, String> =
            [("#n0".to_string(), "name".to_string()), ("#n1".to_string(), "age".to_string())]
                .into_iter()
                .collect();
        let expr = parse_condition(text, Some(&names)).unwrap();
        Scope {
            document: doc,
            params,
        }
        .eval(&expr)
        .unwrap()
    }

    #[test]
    fn test_dynamodb_expressions() {
        let doc = document(json!({"name": "Samantha", "age": 30}));
        let params: HashMap<String, JsonValue> = [
            (":v0".to_string(), json!("Sam")),
            (":v1".to_string(), json!(18)),
            (":v2".to_string(), json!(40)),
        ]
        .into_iter()
        .collect();

        assert!(eval("begins_with(#n0, :v0) AND #n1 >= :v1", &doc, &params));
        assert!(eval("#n1 BETWEEN :v1 AND :v2", &doc, &params));
        assert!(eval("NOT (#n1 IN (:v1, :v2))", &doc, &params));
        assert!(!eval("#n1 <> #n1", &doc, &params));
        assert!(eval("attribute_exists(#n0) AND attribute_not_exists(missing)", &doc, &params));
        assert!(!eval("contains(#n0, :v1)", &doc, &params));
    }

    #[test]
    fn test_cosmos_expressions() {
        let doc = document(json!({"firstName": "Samantha", "first name": "x", "active": true}));
        let params: HashMap<String, JsonValue> =
            [("@p0".to_string(), json!("sa")), ("@p1".to_string(), json!("THA"))]
                .into_iter()
                .collect();

        assert!(eval(
            "STARTSWITH(LOWER(c.firstName), @p0) AND CONTAINS(LOWER(c.firstName), LOWER(@p1))",
            &doc,
            &params
        ));
        assert!(eval("c.active = false OR c.active = true", &doc, &params));
        assert!(eval(r#"c["first name"] = "x""#, &doc, &params));
        assert!(!eval("c.missing != 1", &doc, &params));
    }

    #[test]
    fn test_select_parsing() {
        let query = parse_select(
            "SELECT c.lastName, c.age FROM c WHERE c.age > @p0 ORDER BY c.age DESC, c.lastName",
        )
        .unwrap();
        assert_eq!(
            query.projection,
            Some(vec!["lastName".to_string(), "age".to_string()])
        );
        assert!(query.filter.is_some());
        assert_eq!(
            query.order,
            vec![("age".to_string(), false), ("lastName".to_string(), true)]
        );

        let query = parse_select("SELECT * FROM c").unwrap();
        assert_eq!(query.projection, None);
        assert!(query.filter.is_none());
    }

    #[test]
    fn test_set_and_paths() {
        let names: HashMap<String, String> =
            [("#n0".to_string(), "name".to_string())].into_iter().collect();
        let set = parse_set("SET #n0 = :v0, age = :v1", Some(&names)).unwrap();
        assert_eq!(set[0], ("name".to_string(), Operand::Param(":v0".to_string())));
        assert_eq!(set[1].0, "age");

        let paths = parse_paths("#n0, age", Some(&names)).unwrap();
        assert_eq!(paths, vec!["name".to_string(), "age".to_string()]);
    }

    #[test]
    fn test_syntax_errors() {
        assert!(parse_condition("#n0 = ", None).is_err());
        assert!(parse_condition("a = :v0 extra", None).is_err());
        assert!(parse_select("SELECT FROM c").is_err());
        assert!(parse_condition("'open", None).is_err());
    }

    #[test]
    fn test_sort_order() {
        assert_eq!(sort_order(None, Some(&json!(1))), Ordering::Less);
        assert_eq!(sort_order(Some(&json!(2)), Some(&json!(10))), Ordering::Less);
        assert_eq!(sort_order(Some(&json!("b")), Some(&json!("a"))), Ordering::Greater);
        assert_eq!(sort_order(Some(&json!(1)), Some(&json!("a"))), Ordering::Less);
    }
}
