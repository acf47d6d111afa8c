//! Runs one PromQL command end to end
//!
//! parse → transpile → (fold locally | query InfluxDB) → reshape. The work
//! happens on a background task raced against the query context; whichever
//! finishes first decides the outcome and a late result is dropped.

use std::sync::{Arc, Weak};

use chrono::Utc;
use promql_parser::parser::Expr;
use tokio::sync::oneshot;
use tokio::time::{Instant, sleep_until};

use common::config::Configuration;

use super::error::PromQLError;
use super::evaluator::eval_float;
use super::parser::{parse, parse_label_selector, yields_float};
use super::reshape;
use super::transpiler::Transpiler;
use super::types::{Point, PromValue, RunResult};
use crate::query::command::{Command, QueryContext};
use crate::query::error::QuerierError;
use crate::query::influxql::ast::{self, Literal, Node, ShowTagValuesStatement, Statement};
use crate::query::influxql::client::{InfluxClient, QueryResponse, StoreError};
use crate::query::pool::RunnerPool;

/// Reusable runner for PromQL query commands
///
/// Runners are checked out of a [`RunnerPool`], which overwrites every
/// field on checkout, and handed back with [`QueryCommandRunner::recycle`].
#[derive(Default)]
pub struct QueryCommandRunner {
    client: Option<Arc<dyn InfluxClient>>,
    config: Arc<Configuration>,
    pool: Weak<RunnerPool>,
}

impl QueryCommandRunner {
    pub fn new(client: Arc<dyn InfluxClient>, config: Arc<Configuration>) -> Self {
        Self {
            client: Some(client),
            config,
            pool: Weak::new(),
        }
    }

    pub(crate) fn reset(
        &mut self,
        client: Option<Arc<dyn InfluxClient>>,
        config: Arc<Configuration>,
        pool: Weak<RunnerPool>,
    ) {
        self.client = client;
        self.config = config;
        self.pool = pool;
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    /// Returns the runner to the pool it was checked out of
    pub fn recycle(self: Box<Self>) {
        if let Some(pool) = self.pool.upgrade() {
            pool.recycle(self);
        }
    }

    pub async fn run(&self, ctx: &QueryContext, command: Command) -> Result<RunResult, QuerierError> {
        if ctx.is_cancelled() {
            return Err(QuerierError::Cancelled);
        }
        if ctx.deadline_exceeded() {
            return Err(QuerierError::DeadlineExceeded);
        }

        let timeout = Instant::now() + self.config.query.timeout;
        let deadline = ctx.deadline.map_or(timeout, |d| d.min(timeout));

        let job = QueryJob {
            client: self.client.clone(),
            config: Arc::clone(&self.config),
            command,
        };
        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            // The receiver is gone once the caller timed out
            let _ = tx.send(job.execute().await);
        });

        tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => Err(QuerierError::Cancelled),
            _ = sleep_until(deadline) => Err(QuerierError::DeadlineExceeded),
            received = rx => match received {
                Ok(result) => result,
                Err(e) => Err(QuerierError::TaskFailed(e.to_string())),
            },
        }
    }
}

/// Fills what `command` leaves to configuration: the database and the
/// field holding sample values
pub fn apply_defaults(command: &mut Command, config: &Configuration) {
    if command.database.is_empty() {
        command.database = config.influxdb.database.clone();
    }
    if command.value_field_key.is_none() {
        command.value_field_key = Some(config.query.value_field_key.clone());
    }
}

/// The InfluxQL for one command
#[derive(Debug)]
pub struct Translation {
    /// Parsed PromQL; absent for a label values request without a selector
    pub expr: Option<Expr>,
    pub node: Node,
}

/// Parses and transpiles `command` without touching the store
///
/// A label values request with an empty selector lists the label across
/// the whole database.
pub fn translate(command: &Command, config: &Configuration) -> Result<Translation, QuerierError> {
    if command.cmd.trim().is_empty() && command.is_label_values() {
        let statement = ShowTagValuesStatement::with_key(
            command.database.clone(),
            command.label_name.clone().unwrap_or_default(),
        );
        return Ok(Translation {
            expr: None,
            node: Node::Statement(Statement::ShowTagValues(statement)),
        });
    }

    let expr = if command.is_label_values() {
        parse_label_selector(&command.cmd).map(Expr::VectorSelector)
    } else {
        parse(&command.cmd)
    }
    .map_err(QuerierError::Parse)?;

    let node = Transpiler::new(command)
        .with_features(&config.promql)
        .transpile(&expr)
        .map_err(QuerierError::Transpile)?;
    Ok(Translation {
        expr: Some(expr),
        node,
    })
}

/// Owned state of one background execution
struct QueryJob {
    client: Option<Arc<dyn InfluxClient>>,
    config: Arc<Configuration>,
    command: Command,
}

impl QueryJob {
    fn log_level(&self) -> log::Level {
        if self.config.query.verbose {
            log::Level::Info
        } else {
            log::Level::Debug
        }
    }

    async fn execute(mut self) -> Result<RunResult, QuerierError> {
        apply_defaults(&mut self.command, &self.config);
        let Translation { expr, node } = translate(&self.command, &self.config)?;
        let text = node.to_string();
        log::log!(
            self.log_level(),
            "PromQL: {} => InfluxQL: {text}",
            self.command.cmd
        );

        let Some(expr) = expr else {
            let response = self.query_store(&text).await?;
            return reshape::label_values(&response.results).map_err(QuerierError::Reshape);
        };

        match node {
            Node::Expr(_) if yields_float(&expr) => Ok(RunResult::new(PromValue::Scalar(Point {
                t: self.timestamp(),
                v: eval_float(&expr),
            }))),
            Node::Expr(ast::Expr::Literal(Literal::String(v))) => {
                Ok(RunResult::new(PromValue::String {
                    t: self.timestamp(),
                    v,
                }))
            }
            Node::Expr(_) => Err(QuerierError::Transpile(PromQLError::unsupported(
                "expression that yields neither a statement nor a literal",
            ))),
            Node::Statement(statement) => {
                let response = self.query_store(&text).await?;
                match statement {
                    Statement::ShowTagValues(_) => reshape::label_values(&response.results),
                    Statement::Select(_) => reshape::reshape(
                        &response.results,
                        &expr,
                        &self.command,
                        self.config.query.max_samples,
                    ),
                }
                .map_err(QuerierError::Reshape)
            }
        }
    }

    /// Time a locally computed value is reported at, in milliseconds
    fn timestamp(&self) -> i64 {
        self.command
            .evaluation
            .or(self.command.end)
            .unwrap_or_else(Utc::now)
            .timestamp_millis()
    }

    async fn query_store(&self, text: &str) -> Result<QueryResponse, StoreError> {
        let client = self.client.as_ref().ok_or(StoreError::NotConfigured)?;
        let response = client.query(text, &self.command.database, "").await?;
        log::log!(
            self.log_level(),
            "InfluxDB response for {text}: {} statement result(s), {} series",
            response.results.len(),
            response.results.iter().map(|r| r.series.len()).sum::<usize>()
        );
        match response.error {
            Some(error) if !error.is_empty() => Err(StoreError::Remote(error)),
            _ => Ok(response),
        }
    }
}
