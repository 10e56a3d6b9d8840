//! Query strings in Rally's boolean grammar.
//!
//! Rally queries are `Attribute OPERATOR "Value"` triples joined with `AND` or
//! `OR`. Every combination step parenthesizes the whole accumulated expression:
//!
//! ```text
//! QueryString -> ( AttributePath SPACE Operator SPACE Value )
//!              | ( QueryString SPACE BooleanOperator SPACE QueryString )
//! ```
//!
//! so three triples render as `(((a) AND (b)) AND (c))`, never as a flat list.

use super::{ConnectorError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Joiner {
    And,
    Or,
}

impl Joiner {
    fn as_str(self) -> &'static str {
        match self {
            Joiner::And => "AND",
            Joiner::Or => "OR",
        }
    }
}

/// Build the encoded query value for a flat list of attribute/operator/value tokens.
pub fn build(tokens: &[&str]) -> Result<String> {
    encode(&expression(tokens)?)
}

/// Build the encoded query value matching any of `values`.
pub fn build_or(attribute: &str, operator: &str, values: &[&str]) -> Result<String> {
    encode(&or_expression(attribute, operator, values)?)
}

/// The un-encoded `AND` expression for `tokens`.
pub fn expression(tokens: &[&str]) -> Result<String> {
    if tokens.is_empty() || tokens.len() % 3 != 0 {
        return Err(ConnectorError::InvalidQuery(format!(
            "expected attribute/operator/value triples, got {} tokens",
            tokens.len()
        )));
    }
    let segments: Vec<String> = tokens
        .chunks(3)
        .map(|t| comparison(t[0], t[1], t[2]))
        .collect();
    let expr = combine(&segments, Joiner::And);
    tracing::debug!(query = %expr, "built query");
    Ok(expr)
}

/// The un-encoded `OR` expression comparing `attribute` against each value.
pub fn or_expression(attribute: &str, operator: &str, values: &[&str]) -> Result<String> {
    if values.is_empty() {
        return Err(ConnectorError::InvalidQuery(format!(
            "no values to match against {attribute}"
        )));
    }
    let segments: Vec<String> = values
        .iter()
        .map(|v| comparison(attribute, operator, v))
        .collect();
    let expr = combine(&segments, Joiner::Or);
    tracing::debug!(query = %expr, "built query");
    Ok(expr)
}

fn comparison(attribute: &str, operator: &str, value: &str) -> String {
    format!("{attribute} {operator} \"{value}\"")
}

fn combine(segments: &[String], joiner: Joiner) -> String {
    let mut expr = String::new();
    for _ in segments {
        expr.push('(');
    }
    let mut iter = segments.iter();
    if let Some(first) = iter.next() {
        expr.push_str(first);
        expr.push(')');
    }
    for segment in iter {
        expr.push_str(&format!(" {} ({segment}))", joiner.as_str()));
    }
    expr
}

/// Percent-encode an expression for use as the `query` parameter.
pub fn encode(expr: &str) -> Result<String> {
    if let Some(c) = expr.chars().find(|c| c.is_control()) {
        return Err(ConnectorError::QueryEncoding {
            query: expr.to_string(),
            reason: format!("control character {c:?} cannot be carried by the query grammar"),
        });
    }
    Ok(urlencoding::encode(expr).into_owned())
}
