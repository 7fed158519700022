//! DynamoDB JSON format translator
//!
//! Converts between DynamoDB's attribute value format (`{"S": "..."}`,
//! `{"N": "..."}`, ...) and the plain JSON documents entities travel in.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::{json, Map, Value as JsonValue};

use crate::core::{format_timestamp, Document, NoSqlError, Result, Value};

/// A DynamoDB item: attribute name to typed attribute value
pub type Item = Map<String, JsonValue>;

/// Convert a plain document to a DynamoDB item
#[must_use]
pub fn document_to_item(document: &Document) -> Item {
    document
        .iter()
        .map(|(name, value)| (name.clone(), json_to_attribute(value)))
        .collect()
}

/// Convert a DynamoDB item to a plain document
pub fn item_to_document(item: &Item) -> Result<Document> {
    let mut document = Document::new();
    for (name, attr_value) in item {
        document.insert(name.clone(), attribute_to_json(attr_value)?);
    }
    Ok(document)
}

/// Typed attribute value for a filter operand
#[must_use]
pub fn value_to_attribute(value: &Value) -> JsonValue {
    match value {
        Value::Bool(b) => json!({"BOOL": b}),
        Value::Integer(i) => json!({"N": i.to_string()}),
        Value::Float(f) => json!({"N": f.to_string()}),
        Value::String(s) => json!({"S": s}),
        Value::Timestamp(t) => json!({"S": format_timestamp(t)}),
    }
}

/// Convert a plain JSON value to DynamoDB attribute value format
#[must_use]
pub fn json_to_attribute(value: &JsonValue) -> JsonValue {
    match value {
        JsonValue::Null => json!({"NULL": true}),
        JsonValue::Bool(b) => json!({"BOOL": b}),
        JsonValue::Number(n) => json!({"N": n.to_string()}),
        JsonValue::String(s) => json!({"S": s}),
        JsonValue::Array(items) => {
            let items: Vec<JsonValue> = items.iter().map(json_to_attribute).collect();
            json!({"L": items})
        }
        JsonValue::Object(map) => {
            let items: Map<String, JsonValue> = map
                .iter()
                .map(|(k, v)| (k.clone(), json_to_attribute(v)))
                .collect();
            json!({"M": items})
        }
    }
}

fn violation(reason: impl Into<String>) -> NoSqlError {
    NoSqlError::BackendContractViolation(reason.into())
}

fn parse_number(n: &str) -> Result<JsonValue> {
    // Try integer first, then float
    if let Ok(i) = n.parse::<i64>() {
        return Ok(JsonValue::from(i));
    }
    n.parse::<f64>()
        .ok()
        .and_then(serde_json::Number::from_f64)
        .map(JsonValue::Number)
        .ok_or_else(|| violation(format!("Invalid number: {}", n)))
}

/// Parse a DynamoDB attribute value into plain JSON.
///
/// Binary values stay base64 strings; sets become arrays.
pub fn attribute_to_json(attr: &JsonValue) -> Result<JsonValue> {
    let obj = attr
        .as_object()
        .ok_or_else(|| violation("Attribute value must be an object"))?;

    // DynamoDB uses single-key objects like {"S": "value"} or {"N": "123"}
    let Some((type_key, type_val)) = obj.iter().next() else {
        return Err(violation("Empty attribute value"));
    };
    if obj.len() != 1 {
        return Err(violation("Attribute value must have exactly one type key"));
    }

    match type_key.as_str() {
        "S" => type_val
            .as_str()
            .map(|s| JsonValue::String(s.to_string()))
            .ok_or_else(|| violation("S value must be a string")),
        "N" => {
            let n = type_val
                .as_str()
                .ok_or_else(|| violation("N value must be a string"))?;
            parse_number(n)
        }
        "BOOL" => type_val
            .as_bool()
            .map(JsonValue::Bool)
            .ok_or_else(|| violation("BOOL value must be a boolean")),
        "NULL" => Ok(JsonValue::Null),
        "B" => {
            let b64 = type_val
                .as_str()
                .ok_or_else(|| violation("B value must be a base64 string"))?;
            STANDARD
                .decode(b64)
                .map_err(|e| violation(format!("Invalid base64: {}", e)))?;
            Ok(JsonValue::String(b64.to_string()))
        }
        "L" => {
            let arr = type_val
                .as_array()
                .ok_or_else(|| violation("L value must be an array"))?;
            let values: Result<Vec<JsonValue>> = arr.iter().map(attribute_to_json).collect();
            Ok(JsonValue::Array(values?))
        }
        "M" => {
            let map = type_val
                .as_object()
                .ok_or_else(|| violation("M value must be an object"))?;
            Ok(JsonValue::Object(item_to_document(map)?))
        }
        "SS" | "BS" => {
            let arr = type_val
                .as_array()
                .ok_or_else(|| violation(format!("{} value must be an array", type_key)))?;
            let strings: Result<Vec<JsonValue>> = arr
                .iter()
                .map(|v| {
                    v.as_str()
                        .map(|s| JsonValue::String(s.to_string()))
                        .ok_or_else(|| violation(format!("{} items must be strings", type_key)))
                })
                .collect();
            Ok(JsonValue::Array(strings?))
        }
        "NS" => {
            let arr = type_val
                .as_array()
                .ok_or_else(|| violation("NS value must be an array"))?;
            let numbers: Result<Vec<JsonValue>> = arr
                .iter()
                .map(|v| {
                    v.as_str()
                        .ok_or_else(|| violation("NS items must be number strings"))
                        .and_then(parse_number)
                })
                .collect();
            Ok(JsonValue::Array(numbers?))
        }
        _ => Err(violation(format!("Unknown type: {}", type_key))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ErrorKind;

    #[test]
    fn test_parse_string_value() {
        let value = attribute_to_json(&json!({"S": "hello"})).unwrap();
        assert_eq!(value, json!("hello"));
    }

    #[test]
    fn test_parse_number_value() {
        assert_eq!(attribute_to_json(&json!({"N": "42"})).unwrap(), json!(42));
        assert_eq!(attribute_to_json(&json!({"N": "3.5"})).unwrap(), json!(3.5));
        let err = attribute_to_json(&json!({"N": "forty"})).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BackendContractViolation);
    }

    #[test]
    fn test_parse_sets() {
        assert_eq!(
            attribute_to_json(&json!({"SS": ["a", "b"]})).unwrap(),
            json!(["a", "b"])
        );
        assert_eq!(
            attribute_to_json(&json!({"NS": ["1", "2.5"]})).unwrap(),
            json!([1, 2.5])
        );
    }

    #[test]
    fn test_parse_binary_keeps_base64() {
        assert_eq!(
            attribute_to_json(&json!({"B": "aGVsbG8="})).unwrap(),
            json!("aGVsbG8=")
        );
        assert!(attribute_to_json(&json!({"B": "%%%"})).is_err());
    }

    #[test]
    fn test_untyped_value_is_violation() {
        let err = attribute_to_json(&json!("plain")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BackendContractViolation);
        assert!(attribute_to_json(&json!({})).is_err());
        assert!(attribute_to_json(&json!({"X": 1})).is_err());
    }

    #[test]
    fn test_document_roundtrip() {
        let document = json!({
            "id": "u1",
            "age": 30,
            "score": 9.5,
            "active": true,
            "nickname": null,
            "tags": ["a", "b"],
            "address": {"city": "Lagos"}
        });
        let document = document.as_object().unwrap().clone();

        let item = document_to_item(&document);
        assert_eq!(item["age"], json!({"N": "30"}));
        assert_eq!(item["address"], json!({"M": {"city": {"S": "Lagos"}}}));
        assert_eq!(item_to_document(&item).unwrap(), document);
    }

    #[test]
    fn test_operand_attributes() {
        assert_eq!(value_to_attribute(&Value::from("x")), json!({"S": "x"}));
        assert_eq!(value_to_attribute(&Value::from(25)), json!({"N": "25"}));
        assert_eq!(value_to_attribute(&Value::from(false)), json!({"BOOL": false}));
    }
}
