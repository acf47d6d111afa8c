//! Converts InfluxDB statement results into Prometheus values
//!
//! Rows grouped by tag (`GROUP BY *`) arrive as one series per tag set and
//! map 1:1 onto Prometheus series. Rows of an untagged table may interleave
//! several label sets; they are regrouped so every series owns one
//! contiguous list of points, in order of first appearance.

use std::collections::{HashMap, HashSet};

use chrono::DateTime;
use promql_parser::parser::Expr;
use serde_json::Value;

use super::error::PromQLError;
use super::parser::value_kind;
use super::types::{METRIC_NAME_LABEL, Metric, Point, PromValue, RunResult, Sample, Series, ValueKind};
use crate::query::command::Command;
use crate::query::influxql::client::{Row, StatementResult};

fn reshape_error(msg: impl Into<String>) -> PromQLError {
    PromQLError::ReshapeError(msg.into())
}

/// Builds the Prometheus value for `expr` out of the store's results
pub fn reshape(
    results: &[StatementResult],
    expr: &Expr,
    command: &Command,
    max_samples: usize,
) -> Result<RunResult, PromQLError> {
    let Some(result) = first_result(results)? else {
        return Ok(RunResult::empty());
    };

    let mut series = Vec::new();
    for row in &result.series {
        if row.tags.is_empty() {
            series.extend(group_by_series(row)?);
        } else {
            series.push(tagged_series(row)?);
        }
    }

    let total: usize = series.iter().map(|s| s.points.len()).sum();
    if total > max_samples {
        return Err(reshape_error(format!(
            "query processing would load too many samples into memory ({total} > {max_samples})"
        )));
    }

    let value = match value_kind(expr) {
        ValueKind::Matrix => into_matrix(series),
        ValueKind::Vector if command.is_graph() => into_matrix(series),
        ValueKind::Vector => into_vector(series)?,
        kind => {
            return Err(reshape_error(format!(
                "unsupported PromQL value type: {kind}"
            )));
        }
    };
    Ok(RunResult::new(value))
}

/// Collects the tag values of a SHOW TAG VALUES response
///
/// Values are de-duplicated across series, keeping first-seen order.
pub fn label_values(results: &[StatementResult]) -> Result<RunResult, PromQLError> {
    let Some(result) = first_result(results)? else {
        return Ok(RunResult::empty());
    };

    let mut seen = HashSet::new();
    let mut values = Vec::new();
    for row in &result.series {
        for columns in &row.values {
            let Some(value) = columns.get(1) else {
                continue;
            };
            let value = label_text(value);
            if seen.insert(value.clone()) {
                values.push(value);
            }
        }
    }
    Ok(RunResult::new(PromValue::LabelValues(values)))
}

fn first_result(results: &[StatementResult]) -> Result<Option<&StatementResult>, PromQLError> {
    match results.first() {
        None => Ok(None),
        Some(StatementResult {
            error: Some(error), ..
        }) if !error.is_empty() => Err(reshape_error(error.clone())),
        Some(result) => Ok(Some(result)),
    }
}

fn tagged_series(row: &Row) -> Result<Series, PromQLError> {
    let mut metric = Metric::default();
    for (name, value) in &row.tags {
        metric = metric.with_label(name, value);
    }
    metric = metric.with_label(METRIC_NAME_LABEL, &row.name);

    let points = row
        .values
        .iter()
        .map(|columns| point(columns))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Series { metric, points })
}

/// Two passes over an untagged table: accumulate points per label set, then
/// emit each label set the first time it shows up in the rows.
fn group_by_series(row: &Row) -> Result<Vec<Series>, PromQLError> {
    let metrics: Vec<Metric> = row.values.iter().map(|columns| row_metric(row, columns)).collect();

    let mut by_metric: HashMap<Metric, Series> = HashMap::new();
    for (metric, columns) in metrics.iter().zip(&row.values) {
        let point = point(columns)?;
        by_metric
            .entry(metric.clone())
            .or_insert_with(|| Series {
                metric: metric.clone(),
                points: Vec::new(),
            })
            .points
            .push(point);
    }

    let mut series = Vec::with_capacity(by_metric.len());
    for metric in &metrics {
        if let Some(s) = by_metric.remove(metric) {
            series.push(s);
        }
    }
    Ok(series)
}

/// Label set of one row: the columns between time and value, plus the
/// measurement name
fn row_metric(row: &Row, columns: &[Value]) -> Metric {
    let mut metric = Metric::default();
    let last = columns.len().saturating_sub(1);
    for (i, value) in columns.iter().enumerate() {
        if i == 0 || i == last || value.is_null() {
            continue;
        }
        if let Some(name) = row.columns.get(i) {
            metric = metric.with_label(name, &label_text(value));
        }
    }
    metric.with_label(METRIC_NAME_LABEL, &row.name)
}

fn label_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn point(columns: &[Value]) -> Result<Point, PromQLError> {
    let t = match columns.first() {
        Some(Value::String(text)) => DateTime::parse_from_rfc3339(text)
            .map_err(|e| reshape_error(format!("parse time fail: {e}")))?
            .timestamp_millis(),
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .ok_or_else(|| reshape_error(format!("parse time fail: {n}")))?,
        Some(other) => return Err(reshape_error(format!("parse time fail: {other}"))),
        None => return Err(reshape_error("parse time fail: empty row")),
    };
    // Null and non-numeric values read as zero
    let v = columns.last().and_then(Value::as_f64).unwrap_or(0.0);
    Ok(Point { t, v })
}

fn into_matrix(mut series: Vec<Series>) -> PromValue {
    for s in &mut series {
        s.points.sort_by_key(|p| p.t);
    }
    series.sort_by(|a, b| a.metric.cmp(&b.metric));
    PromValue::Matrix(series)
}

fn into_vector(series: Vec<Series>) -> Result<PromValue, PromQLError> {
    let mut samples = Vec::with_capacity(series.len());
    for s in series {
        let [point] = s.points.as_slice() else {
            return Err(reshape_error(
                "expected exactly one output point for every series for vector result",
            ));
        };
        samples.push(Sample {
            metric: s.metric,
            point: *point,
        });
    }
    Ok(PromValue::Vector(samples))
}
