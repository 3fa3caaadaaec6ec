//! Model-reply handling: strict JSON parsing and the optional schema check.
//!
//! Parsing is unforgiving. [`parse_json_reply`] accepts a JSON document and
//! nothing else; it is used for models with a native JSON mode.
//! [`parse_model_output`] additionally tolerates a single outer Markdown code
//! fence (```` ```json ... ``` ````), which chat models without a JSON mode
//! habitually add. Everything else fails with
//! [`MenuError::ModelResponseMalformed`]; no attempt is made to repair or
//! default the reply.
//!
//! ## Schema rules
//!
//! [`check_schema`] is advisory and only runs when
//! [`SchemaCheck`](crate::config::SchemaCheck) is not `Off`. It reports:
//!
//! 1. the top level is not an object
//! 2. `menu_summary` missing or not a string
//! 3. `products` missing or not an array
//! 4. a product that is not an object, or whose `name` is missing or not a string
//! 5. a product `description` / `price` / `brand` present but not a string
//! 6. `brand_percentages` missing or not an object
//! 7. a percentage that is not a non-negative number
//! 8. percentages that do not sum to 100 ± 1

use crate::error::MenuError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::fmt;

/// How many characters of a bad reply are kept for the error message.
const SNIPPET_CHARS: usize = 120;

/// Allowed slack on the brand percentage total.
const PERCENT_TOLERANCE: f64 = 1.0;

static RE_OUTER_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^\s*```(?:json|JSON)?[ \t]*\r?\n(.*?)\r?\n?```\s*$").unwrap());

/// Parse a chat model's reply as JSON, unwrapping one outer code fence.
///
/// A well-formed reply is returned exactly as the model produced it; keys
/// are neither added nor removed and their order is kept.
pub fn parse_model_output(raw: &str) -> Result<Value, MenuError> {
    parse_body(unwrap_fence(raw), raw)
}

/// Parse the reply strictly as JSON, with no fence handling at all.
pub fn parse_json_reply(raw: &str) -> Result<Value, MenuError> {
    parse_body(raw, raw)
}

fn parse_body(body: &str, raw: &str) -> Result<Value, MenuError> {
    serde_json::from_str(body).map_err(|e| MenuError::ModelResponseMalformed {
        detail: e.to_string(),
        snippet: snippet(raw),
    })
}

/// Strip one outer code fence, if the whole reply is wrapped in one.
fn unwrap_fence(raw: &str) -> &str {
    match RE_OUTER_FENCE.captures(raw).and_then(|c| c.get(1)) {
        Some(inner) => inner.as_str(),
        None => raw,
    }
}

fn snippet(raw: &str) -> String {
    let trimmed = raw.trim();
    let mut s: String = trimmed.chars().take(SNIPPET_CHARS).collect();
    if trimmed.chars().count() > SNIPPET_CHARS {
        s.push('…');
    }
    s
}

/// One schema rule a reply broke.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaIssue {
    /// JSON-pointer-ish location, e.g. `products[2].name`.
    pub path: String,
    pub message: String,
}

impl fmt::Display for SchemaIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

fn issue(path: impl Into<String>, message: impl Into<String>) -> SchemaIssue {
    SchemaIssue {
        path: path.into(),
        message: message.into(),
    }
}

/// Check a parsed reply against the menu shape. Empty means it conforms.
pub fn check_schema(value: &Value) -> Vec<SchemaIssue> {
    let mut issues = Vec::new();

    let Some(obj) = value.as_object() else {
        issues.push(issue("$", "top level is not an object"));
        return issues;
    };

    match obj.get("menu_summary") {
        Some(Value::String(_)) => {}
        Some(_) => issues.push(issue("menu_summary", "not a string")),
        None => issues.push(issue("menu_summary", "missing")),
    }

    match obj.get("products") {
        Some(Value::Array(products)) => {
            for (i, product) in products.iter().enumerate() {
                check_product(i, product, &mut issues);
            }
        }
        Some(_) => issues.push(issue("products", "not an array")),
        None => issues.push(issue("products", "missing")),
    }

    match obj.get("brand_percentages") {
        Some(Value::Object(map)) => {
            let mut total = 0.0;
            let mut all_numeric = true;
            for (brand, pct) in map {
                match pct.as_f64() {
                    Some(p) if p >= 0.0 => total += p,
                    _ => {
                        all_numeric = false;
                        issues.push(issue(
                            format!("brand_percentages.{brand}"),
                            "not a non-negative number",
                        ));
                    }
                }
            }
            if all_numeric && !map.is_empty() && (total - 100.0).abs() > PERCENT_TOLERANCE {
                issues.push(issue(
                    "brand_percentages",
                    format!("percentages sum to {total}, expected 100"),
                ));
            }
        }
        Some(_) => issues.push(issue("brand_percentages", "not an object")),
        None => issues.push(issue("brand_percentages", "missing")),
    }

    issues
}

fn check_product(i: usize, product: &Value, issues: &mut Vec<SchemaIssue>) {
    let path = format!("products[{i}]");
    let Some(p) = product.as_object() else {
        issues.push(issue(path, "not an object"));
        return;
    };
    match p.get("name") {
        Some(Value::String(_)) => {}
        Some(_) => issues.push(issue(format!("{path}.name"), "not a string")),
        None => issues.push(issue(format!("{path}.name"), "missing")),
    }
    for field in ["description", "price", "brand"] {
        match p.get(field) {
            None | Some(Value::String(_)) => {}
            Some(_) => issues.push(issue(format!("{path}.{field}"), "not a string")),
        }
    }
}
