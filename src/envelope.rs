//! The single message exchanged between [`crate::client::ProxyClient`] and the
//! proxy service.
//!
//! The client always reaches the service with a `POST` and the request it
//! actually wants made is described by the JSON body:
//!
//! ```json
//! { "url": "https://api.openai.com/v1/models", "method": "GET",
//!   "headers": { "Content-Type": "application/json" }, "key": "..." }
//! ```
//!
//! `body` is optional and only forwarded for `POST`.

use std::collections::BTreeMap;
use std::fmt;

use reqwest::header::{HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum EnvelopeMethod {
    #[default]
    Get,
    Post,
}

impl EnvelopeMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            EnvelopeMethod::Get => "GET",
            EnvelopeMethod::Post => "POST",
        }
    }

    pub fn to_http(self) -> reqwest::Method {
        match self {
            EnvelopeMethod::Get => reqwest::Method::GET,
            EnvelopeMethod::Post => reqwest::Method::POST,
        }
    }
}

impl fmt::Display for EnvelopeMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ProxyEnvelope {
    pub url: String,
    pub method: EnvelopeMethod,
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    pub key: String,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    pub path: Vec<String>,
    pub expected: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub received: Option<String>,
    pub message: String,
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.path.is_empty() {
            true => write!(f, "<root>: {}", self.message),
            false => write!(f, "{}: {}", self.path.join("."), self.message),
        }
    }
}

#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationErrors {
    fn root(expected: &str, message: String) -> Self {
        ValidationErrors {
            issues: vec![ValidationIssue {
                path: Vec::new(),
                expected: expected.to_string(),
                received: None,
                message,
            }],
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use itertools::Itertools;
        write!(f, "{}", self.issues.iter().join("; "))
    }
}

enum Shape {
    Text,
    AbsoluteUrl,
    OneOf(&'static [&'static str]),
    HeaderRecord,
}

struct Field {
    name: &'static str,
    required: bool,
    shape: Shape,
}

const ENVELOPE_FIELDS: &[Field] = &[
    Field { name: "url", required: true, shape: Shape::AbsoluteUrl },
    Field { name: "method", required: true, shape: Shape::OneOf(&["GET", "POST"]) },
    Field { name: "headers", required: true, shape: Shape::HeaderRecord },
    Field { name: "body", required: false, shape: Shape::Text },
    Field { name: "key", required: true, shape: Shape::Text },
];

impl ProxyEnvelope {
    /// Parses a raw request body, reporting every shape violation at once.
    pub fn parse(raw: &[u8]) -> Result<Self, ValidationErrors> {
        let text = std::str::from_utf8(raw).map_err(|error| {
            ValidationErrors::root("UTF-8 text", format!("Request body is not UTF-8: {error}"))
        })?;
        let value: Value = serde_json::from_str(text).map_err(|error| {
            ValidationErrors::root("JSON", format!("Malformed JSON: {error}"))
        })?;
        let object = match value {
            Value::Object(ref object) => object,
            ref other => {
                return Err(ValidationErrors {
                    issues: vec![ValidationIssue {
                        path: Vec::new(),
                        expected: "object".to_string(),
                        received: Some(type_name(other).to_string()),
                        message: format!("Expected object, received {}", type_name(other)),
                    }],
                })
            }
        };

        let issues = check_fields(object);
        if !issues.is_empty() {
            return Err(ValidationErrors { issues });
        }

        serde_json::from_value(value)
            .map_err(|error| ValidationErrors::root("envelope", error.to_string()))
    }
}

fn check_fields(object: &Map<String, Value>) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    for field in ENVELOPE_FIELDS {
        match object.get(field.name) {
            None if field.required => issues.push(ValidationIssue {
                path: vec![field.name.to_string()],
                expected: expected(&field.shape),
                received: Some("undefined".to_string()),
                message: "Required".to_string(),
            }),
            None => {}
            Some(value) => check_shape(field.name, &field.shape, value, &mut issues),
        }
    }
    issues
}

fn check_shape(name: &str, shape: &Shape, value: &Value, issues: &mut Vec<ValidationIssue>) {
    let mismatch = |issues: &mut Vec<ValidationIssue>, message: String| {
        issues.push(ValidationIssue {
            path: vec![name.to_string()],
            expected: expected(shape),
            received: Some(type_name(value).to_string()),
            message,
        })
    };

    match (shape, value) {
        (Shape::Text, Value::String(_)) => {}
        (Shape::AbsoluteUrl, Value::String(url)) => {
            if let Err(error) = reqwest::Url::parse(url) {
                mismatch(issues, format!("Invalid absolute URL: {error}"));
            }
        }
        (Shape::OneOf(allowed), Value::String(literal)) => {
            if !allowed.contains(&literal.as_str()) {
                mismatch(
                    issues,
                    format!("Invalid literal \"{literal}\", expected {}", expected(shape)),
                );
            }
        }
        (Shape::HeaderRecord, Value::Object(entries)) => {
            for (header, value) in entries {
                check_header(name, header, value, issues);
            }
        }
        _ => mismatch(
            issues,
            format!("Expected {}, received {}", expected(shape), type_name(value)),
        ),
    }
}

fn check_header(record: &str, header: &str, value: &Value, issues: &mut Vec<ValidationIssue>) {
    let path = vec![record.to_string(), header.to_string()];
    if HeaderName::from_bytes(header.as_bytes()).is_err() {
        issues.push(ValidationIssue {
            path: path.clone(),
            expected: "HTTP header name".to_string(),
            received: None,
            message: format!("\"{header}\" is not a valid HTTP header name"),
        });
    }
    match value {
        Value::String(text) if HeaderValue::from_str(text).is_ok() => {}
        Value::String(_) => issues.push(ValidationIssue {
            path,
            expected: "HTTP header value".to_string(),
            received: Some("string".to_string()),
            message: "Header value contains characters not allowed in HTTP".to_string(),
        }),
        other => issues.push(ValidationIssue {
            path,
            expected: "string".to_string(),
            received: Some(type_name(other).to_string()),
            message: format!("Expected string, received {}", type_name(other)),
        }),
    }
}

fn expected(shape: &Shape) -> String {
    match shape {
        Shape::Text => "string".to_string(),
        Shape::AbsoluteUrl => "absolute URL".to_string(),
        Shape::OneOf(allowed) => allowed
            .iter()
            .map(|literal| format!("\"{literal}\""))
            .collect::<Vec<_>>()
            .join(" | "),
        Shape::HeaderRecord => "record<string, string>".to_string(),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
