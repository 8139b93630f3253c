//! Parameter schema and validation helpers shared by the simulators.

use std::fmt;

use num::bigint::BigUint;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::bignum::parse_decimal;

/// A problem with one submitted parameter
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// Every problem found while validating one parameter set
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(pub Vec<FieldError>);

impl FieldErrors {
    pub fn single(field: &str, message: impl Into<String>) -> Self {
        Self(vec![FieldError {
            field: field.to_string(),
            message: message.into(),
        }])
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|e| e.field.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, e) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}: {}", e.field, e.message)?;
        }
        Ok(())
    }
}

impl std::error::Error for FieldErrors {}

/// JSON type expected for a parameter
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterKind {
    Integer,
    /// Arbitrary-precision integer, as a JSON number or decimal string
    BigInteger,
    String,
    Boolean,
    IntegerList,
}

/// Schema entry for one parameter, as shown to callers
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ParameterSpec {
    pub name: &'static str,
    pub kind: ParameterKind,
    pub required: bool,
    pub default: Option<Value>,
    pub description: &'static str,
}

/// Reads typed fields out of a JSON parameter object, collecting errors
pub(crate) struct ParamReader<'a> {
    fields: Option<&'a Map<String, Value>>,
    errors: Vec<FieldError>,
}

impl<'a> ParamReader<'a> {
    pub fn new(raw: &'a Value) -> Self {
        let mut reader = Self {
            fields: None,
            errors: Vec::new(),
        };
        match raw {
            Value::Object(map) => reader.fields = Some(map),
            Value::Null => {}
            _ => reader.reject("parameters", "must be a JSON object"),
        }
        reader
    }

    // null counts as absent
    fn get(&self, field: &str) -> Option<&'a Value> {
        self.fields
            .and_then(|m| m.get(field))
            .filter(|v| !v.is_null())
    }

    pub fn reject(&mut self, field: &str, message: impl Into<String>) {
        self.errors.push(FieldError {
            field: field.to_string(),
            message: message.into(),
        });
    }

    pub fn reject_unknown(&mut self, known: &[&str]) {
        let unknown: Vec<String> = self
            .fields
            .map(|m| {
                m.keys()
                    .filter(|k| !known.contains(&k.as_str()))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        for field in unknown {
            self.reject(&field, "unknown parameter");
        }
    }

    pub fn u64_or(&mut self, field: &str, default: u64) -> u64 {
        match self.get(field) {
            None => default,
            Some(v) => match v.as_u64() {
                Some(n) => n,
                None => {
                    self.reject(field, "must be a non-negative integer");
                    default
                }
            },
        }
    }

    pub fn bool_or(&mut self, field: &str, default: bool) -> bool {
        match self.get(field) {
            None => default,
            Some(Value::Bool(b)) => *b,
            Some(_) => {
                self.reject(field, "must be a boolean");
                default
            }
        }
    }

    pub fn opt_string(&mut self, field: &str) -> Option<String> {
        match self.get(field)? {
            Value::String(s) => Some(s.clone()),
            _ => {
                self.reject(field, "must be a string");
                None
            }
        }
    }

    pub fn opt_biguint(&mut self, field: &str) -> Option<BigUint> {
        let parsed = match self.get(field)? {
            Value::Number(n) => n.as_u64().map(BigUint::from),
            Value::String(s) => parse_decimal(s.trim()),
            _ => None,
        };
        if parsed.is_none() {
            self.reject(
                field,
                "must be a non-negative integer or a decimal string",
            );
        }
        parsed
    }

    pub fn opt_index_list(&mut self, field: &str) -> Option<Vec<usize>> {
        let parsed = match self.get(field)? {
            Value::Array(items) => items
                .iter()
                .map(|v| v.as_u64().map(|n| n as usize))
                .collect::<Option<Vec<_>>>(),
            _ => None,
        };
        if parsed.is_none() {
            self.reject(field, "must be a list of non-negative integers");
        }
        parsed
    }

    pub fn finish<T>(self, value: T) -> Result<T, FieldErrors> {
        if self.errors.is_empty() {
            Ok(value)
        } else {
            Err(FieldErrors(self.errors))
        }
    }
}
