//! PromQL → InfluxQL transpiler
//!
//! The PromQL AST is walked recursively and every node is mapped to one
//! InfluxQL [`Node`]. Vector-valued nodes become SELECT statements whose last
//! field is the value under construction; each enclosing PromQL node either
//! rewrites that field in place or wraps the statement in a sub-query.
//!
//! ```text
//! topk(3, cpu)  =>  SELECT *::tag, top(last, 3) FROM (SELECT *::tag, last(value) FROM cpu GROUP BY *)
//! ```
//!
//! The time bound of the query is collected while visiting selectors and
//! applied once, to the outermost statement, together with the timezone.
//! See <https://docs.influxdata.com/influxdb/v1.8/query_language/explore-data/#improve-performance-of-time-bound-subqueries>.

mod aggregate;
mod binary;
mod call;
mod selector;
mod unary;

use std::time::Duration;

use chrono::{DateTime, Utc};
use promql_parser::parser::Expr;

use common::config::PromQLConfig;

use super::error::PromQLError;
use super::parser::value_kind;
use super::types::ValueKind;
use crate::query::command::Command;
use crate::query::influxql::ast::{self, Dimension, Field, Literal, Node, Statement};

/// Translates one PromQL expression for one [`Command`]
///
/// A transpiler carries per-call state and is consumed by
/// [`Transpiler::transpile`].
pub struct Transpiler<'a> {
    command: &'a Command,
    features: PromQLConfig,
    now: DateTime<Utc>,
    /// Range of the last matrix selector seen
    time_range: Duration,
    time_condition: Option<ast::Expr>,
    /// An aggregate already dropped the `*::tag` projection
    tag_dropped: bool,
}

impl<'a> Transpiler<'a> {
    pub fn new(command: &'a Command) -> Self {
        Self {
            command,
            features: PromQLConfig::default(),
            now: Utc::now(),
            time_range: Duration::ZERO,
            time_condition: None,
            tag_dropped: false,
        }
    }

    pub fn with_features(mut self, features: &PromQLConfig) -> Self {
        self.features = features.clone();
        self
    }

    /// Pins the wall-clock fallback used when the command carries no time
    pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    pub fn transpile(mut self, expr: &Expr) -> Result<Node, PromQLError> {
        if self.command.start.is_some() {
            let kind = value_kind(expr);
            if !matches!(kind, ValueKind::Scalar | ValueKind::Vector) {
                return Err(PromQLError::transpile(format!(
                    "invalid expression type \"{kind}\" for range query, must be Scalar or instant Vector"
                )));
            }
        }

        let mut node = self.transpile_expr(expr)?;
        if let Node::Statement(statement) = &mut node {
            if let Statement::Select(select) = statement {
                if self.command.is_graph() {
                    let interval = if self.time_range.is_zero() {
                        self.command.step
                    } else {
                        self.time_range
                    };
                    if !interval.is_zero() {
                        select.dimensions.push(Dimension::time(interval));
                    }
                }
            }
            if let Some(time_condition) = self.time_condition.take() {
                statement.apply_time_condition(time_condition);
            }
            statement.set_location(self.command.timezone);
        }
        Ok(node)
    }

    fn transpile_expr(&mut self, expr: &Expr) -> Result<Node, PromQLError> {
        match expr {
            Expr::Paren(paren) => self.transpile_expr(&paren.expr).map(parenthesize),
            Expr::Unary(unary) => self.transpile_unary(unary),
            Expr::NumberLiteral(num) => Ok(Node::Expr(ast::Expr::number(num.val))),
            Expr::StringLiteral(s) => Ok(Node::Expr(ast::Expr::Literal(Literal::String(
                s.val.clone(),
            )))),
            Expr::VectorSelector(vs) => self.transpile_vector_selector(vs),
            Expr::MatrixSelector(ms) => self.transpile_matrix_selector(ms),
            Expr::Aggregate(agg) => self.transpile_aggregate(agg),
            Expr::Binary(bin) => self.transpile_binary(bin),
            Expr::Call(call) => self.transpile_call(call),
            Expr::Subquery(_) => Err(PromQLError::unsupported("subquery expression")),
            Expr::Extension(_) => Err(PromQLError::unsupported("extension expression")),
        }
    }
}

/// Groups an arithmetic expression; calls, literals and references already
/// bind as one operand.
fn group(expr: ast::Expr) -> ast::Expr {
    match expr {
        ast::Expr::Binary(_) => ast::Expr::paren(expr),
        other => other,
    }
}

/// Applies a PromQL paren to the value under construction
fn parenthesize(node: Node) -> Node {
    match node {
        Node::Expr(expr) => Node::Expr(group(expr)),
        Node::Statement(Statement::Select(mut select)) => {
            if let Some(field) = select.fields.pop() {
                select.fields.push(Field::new(group(field.expr)));
            }
            select.into()
        }
        other => other,
    }
}

fn into_expr(node: Node) -> Result<ast::Expr, PromQLError> {
    match node {
        Node::Expr(expr) => Ok(expr),
        Node::Statement(statement) => Err(PromQLError::transpile(format!(
            "expected an expression, got statement: {statement}"
        ))),
    }
}
