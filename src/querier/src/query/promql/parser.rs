//! PromQL parser wrapper
//!
//! Wraps the promql-parser crate with our error type and adds the static
//! type checks the transpiler needs, since InfluxQL has no notion of
//! scalar vs. vector.

use promql_parser::label::MatchOp;
use promql_parser::parser::{self, Expr, VectorSelector};

use super::error::PromQLError;
use super::types::{METRIC_NAME_LABEL, ValueKind};

/// Parse a PromQL query string into an AST expression
///
/// # Examples
/// ```ignore
/// use querier::query::promql::parser::parse;
///
/// let expr = parse("http_requests_total{job=\"api\"}").unwrap();
/// let expr = parse("sum by (job)(rate(http_requests_total[5m]))").unwrap();
/// ```
pub fn parse(query: &str) -> Result<Expr, PromQLError> {
    parser::parse(query).map_err(|e| PromQLError::ParseError(e.to_string()))
}

/// Parse the selector of a label-values request
///
/// Only a bare series selector (`metric{label="x"}`) is accepted.
pub fn parse_label_selector(query: &str) -> Result<VectorSelector, PromQLError> {
    match parse(query)? {
        Expr::VectorSelector(vs) => Ok(vs),
        other => Err(PromQLError::ParseError(format!(
            "label values query must be a series selector, got {}",
            value_kind(&other)
        ))),
    }
}

/// True when the expression is made of number literals only, so it can be
/// folded locally without touching the store.
pub fn yields_float(expr: &Expr) -> bool {
    match expr {
        Expr::NumberLiteral(_) => true,
        Expr::Paren(paren) => yields_float(&paren.expr),
        Expr::Unary(unary) => yields_float(&unary.expr),
        Expr::Binary(bin) => yields_float(&bin.lhs) && yields_float(&bin.rhs),
        _ => false,
    }
}

/// Static PromQL type of an expression
pub fn value_kind(expr: &Expr) -> ValueKind {
    match expr {
        Expr::NumberLiteral(_) => ValueKind::Scalar,
        Expr::StringLiteral(_) => ValueKind::String,
        Expr::MatrixSelector(_) | Expr::Subquery(_) => ValueKind::Matrix,
        Expr::VectorSelector(_) | Expr::Aggregate(_) | Expr::Extension(_) => ValueKind::Vector,
        Expr::Paren(paren) => value_kind(&paren.expr),
        Expr::Unary(unary) => value_kind(&unary.expr),
        Expr::Binary(bin) => {
            if value_kind(&bin.lhs) == ValueKind::Scalar && value_kind(&bin.rhs) == ValueKind::Scalar
            {
                ValueKind::Scalar
            } else {
                ValueKind::Vector
            }
        }
        Expr::Call(call) => match call.func.name {
            "scalar" | "time" | "pi" => ValueKind::Scalar,
            _ => ValueKind::Vector,
        },
    }
}

/// Extract the metric name from a vector selector
///
/// Falls back to an exact `__name__` matcher when the selector has no
/// bare name.
pub fn metric_name(vs: &VectorSelector) -> Option<&str> {
    if let Some(name) = vs.name.as_deref() {
        return Some(name);
    }
    vs.matchers
        .matchers
        .iter()
        .find(|m| m.name == METRIC_NAME_LABEL && matches!(m.op, MatchOp::Equal))
        .map(|m| m.value.as_str())
}

/// Pattern of a `__name__=~"..."` matcher, used when the selector has no
/// exact metric name.
pub fn metric_name_pattern(vs: &VectorSelector) -> Option<&str> {
    vs.matchers
        .matchers
        .iter()
        .find(|m| m.name == METRIC_NAME_LABEL && matches!(m.op, MatchOp::Re(_)))
        .map(|m| m.value.as_str())
}
