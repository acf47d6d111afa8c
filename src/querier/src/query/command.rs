//! Query commands and the context they run under

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// How the caller is going to present the result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Table,
    Graph,
    LabelValues,
}

/// One PromQL query to translate and run
#[derive(Debug, Clone, Default)]
pub struct Command {
    /// Raw PromQL text. May be empty for label-values requests.
    pub cmd: String,
    pub database: String,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub timezone: Option<Tz>,
    pub evaluation: Option<DateTime<Utc>>,
    /// Resolution of GRAPH queries
    pub step: Duration,
    pub data_type: Option<DataType>,
    /// Field holding sample values, `value` when unset
    pub value_field_key: Option<String>,
    /// Label whose values a label-values request asks for
    pub label_name: Option<String>,
}

impl Command {
    pub fn new(cmd: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            cmd: cmd.into(),
            database: database.into(),
            ..Default::default()
        }
    }

    pub fn is_label_values(&self) -> bool {
        self.data_type == Some(DataType::LabelValues)
    }

    pub fn is_graph(&self) -> bool {
        self.data_type == Some(DataType::Graph)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Query,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    PromQL,
}

/// Key under which runner pools are registered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommandType {
    pub operation: Operation,
    pub dialect: Dialect,
}

impl CommandType {
    pub const PROMQL_QUERY: CommandType = CommandType {
        operation: Operation::Query,
        dialect: Dialect::PromQL,
    };
}

impl fmt::Display for CommandType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}/{:?}", self.operation, self.dialect)
    }
}

/// Cancellation and deadline of one query
#[derive(Debug, Clone, Default)]
pub struct QueryContext {
    pub cancel: CancellationToken,
    pub deadline: Option<Instant>,
}

impl QueryContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            cancel: CancellationToken::new(),
            deadline: Some(deadline),
        }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn deadline_exceeded(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}
