use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use promql_parser::label::{MatchOp, Matcher};
use promql_parser::parser::{AtModifier, MatrixSelector, Offset, VectorSelector};

use super::Transpiler;
use crate::query::command::DataType;
use crate::query::influxql::ast::{
    self, Dimension, Field, Literal, Measurement, Node, Operator, SelectStatement,
    ShowTagValuesStatement, Source,
};
use crate::query::promql::error::PromQLError;
use crate::query::promql::parser::{metric_name, metric_name_pattern};
use crate::query::promql::types::METRIC_NAME_LABEL;
use common::config::DEFAULT_VALUE_FIELD_KEY;

fn to_delta(d: Duration) -> Result<TimeDelta, PromQLError> {
    TimeDelta::from_std(d)
        .map_err(|e| PromQLError::transpile(format!("duration {d:?} out of range: {e}")))
}

fn time_ref() -> ast::Expr {
    ast::Expr::var("time")
}

fn time_literal(t: DateTime<Utc>) -> ast::Expr {
    ast::Expr::Literal(Literal::Time(t))
}

impl Transpiler<'_> {
    /// Effective time bounds of a selector
    ///
    /// `end` is the selector's `@` time, else `Command.end`, else
    /// `Command.evaluation`, else now; the selector offset is then
    /// subtracted. `start` is `Command.start`, or `end - range` below a
    /// matrix selector.
    pub(super) fn find_start_end(
        &self,
        vs: &VectorSelector,
    ) -> Result<(Option<DateTime<Utc>>, DateTime<Utc>), PromQLError> {
        let mut end = self
            .command
            .end
            .or(self.command.evaluation)
            .unwrap_or(self.now);
        let mut start = self.command.start;

        if let Some(at) = &vs.at {
            if !self.features.enable_at_modifier {
                return Err(PromQLError::transpile("@ modifier is disabled"));
            }
            match at {
                AtModifier::Start => {
                    if let Some(s) = start {
                        end = s;
                    }
                }
                AtModifier::End => {}
                AtModifier::At(t) => end = DateTime::<Utc>::from(*t),
            }
        }

        match &vs.offset {
            Some(Offset::Pos(d)) => end -= to_delta(*d)?,
            Some(Offset::Neg(d)) => {
                if !self.features.enable_negative_offset {
                    return Err(PromQLError::transpile("negative offset is disabled"));
                }
                end += to_delta(*d)?;
            }
            None => {}
        }

        if !self.time_range.is_zero() && start.is_none() {
            start = Some(end - to_delta(self.time_range)?);
        }
        Ok((start, end))
    }

    /// `time <= end [AND time >= start]`
    pub(super) fn time_condition(
        &self,
        vs: &VectorSelector,
    ) -> Result<ast::Expr, PromQLError> {
        let (start, end) = self.find_start_end(vs)?;
        let mut condition = ast::Expr::binary(Operator::Lte, time_ref(), time_literal(end));
        if let Some(start) = start {
            condition = ast::Expr::and(
                condition,
                ast::Expr::binary(Operator::Gte, time_ref(), time_literal(start)),
            );
        }
        Ok(condition)
    }

    pub(super) fn transpile_vector_selector(
        &mut self,
        vs: &VectorSelector,
    ) -> Result<Node, PromQLError> {
        self.time_condition = Some(self.time_condition(vs)?);
        let tag_condition = tag_condition(&vs.matchers.matchers)?;
        if !vs.matchers.or_matchers.is_empty() {
            return Err(PromQLError::unsupported("`or` label matchers"));
        }
        let source = measurement_source(vs)?;

        if self.command.data_type == Some(DataType::LabelValues) {
            let mut statement = ShowTagValuesStatement::with_key(
                self.command.database.clone(),
                self.command.label_name.clone().unwrap_or_default(),
            );
            statement.sources = vec![source];
            statement.condition = tag_condition;
            return Ok(Node::Statement(ast::Statement::ShowTagValues(statement)));
        }

        let value_field_key = self
            .command
            .value_field_key
            .as_deref()
            .filter(|key| !key.is_empty())
            .unwrap_or(DEFAULT_VALUE_FIELD_KEY);
        let raw_values = !self.time_range.is_zero()
            || (self.command.start.is_some()
                && matches!(self.command.data_type, None | Some(DataType::Table)));
        let value_field = if raw_values {
            ast::Expr::var(value_field_key)
        } else {
            ast::Expr::call("last", vec![ast::Expr::var(value_field_key)])
        };

        Ok(SelectStatement {
            fields: vec![Field::tag_wildcard(), Field::new(value_field)],
            sources: vec![source],
            condition: tag_condition,
            dimensions: vec![Dimension::all()],
            location: None,
        }
        .into())
    }

    pub(super) fn transpile_matrix_selector(
        &mut self,
        ms: &MatrixSelector,
    ) -> Result<Node, PromQLError> {
        if !ms.range.is_zero() {
            self.time_range = ms.range;
        }
        self.transpile_vector_selector(&ms.vs)
    }
}

fn measurement_source(vs: &VectorSelector) -> Result<Source, PromQLError> {
    if let Some(name) = metric_name(vs) {
        return Ok(Source::measurement(name));
    }
    if let Some(pattern) = metric_name_pattern(vs) {
        if let Literal::Regex(re) = Literal::anchored_regex(pattern)? {
            return Ok(Source::Measurement(Measurement::Regex(re)));
        }
    }
    Err(PromQLError::transpile(
        "vector selector must contain an exact or regex metric name",
    ))
}

/// ANDs one predicate per label matcher, skipping the metric name and
/// empty values
fn tag_condition(matchers: &[Matcher]) -> Result<Option<ast::Expr>, PromQLError> {
    let mut condition: Option<ast::Expr> = None;
    for matcher in matchers {
        if matcher.name == METRIC_NAME_LABEL || matcher.value.is_empty() {
            continue;
        }
        let tag = ast::Expr::var(matcher.name.clone());
        let predicate = match &matcher.op {
            MatchOp::Equal => ast::Expr::binary(
                Operator::Eq,
                tag,
                ast::Expr::Literal(Literal::String(matcher.value.clone())),
            ),
            MatchOp::NotEqual => ast::Expr::binary(
                Operator::Neq,
                tag,
                ast::Expr::Literal(Literal::String(matcher.value.clone())),
            ),
            MatchOp::Re(_) => ast::Expr::binary(
                Operator::EqRegex,
                tag,
                ast::Expr::Literal(regex_literal(&matcher.value)?),
            ),
            MatchOp::NotRe(_) => ast::Expr::binary(
                Operator::NeqRegex,
                tag,
                ast::Expr::Literal(regex_literal(&matcher.value)?),
            ),
        };
        condition = Some(match condition {
            Some(existing) => ast::Expr::and(existing, predicate),
            None => predicate,
        });
    }
    Ok(condition)
}

fn regex_literal(pattern: &str) -> Result<Literal, PromQLError> {
    Literal::anchored_regex(pattern)
        .map_err(|e| PromQLError::InvalidMatcher(format!("regular expression syntax error: {e}")))
}
