//! PromQL to InfluxQL query translation and execution
//!
//! A [`Command`] carries one PromQL expression plus its time bounds. The
//! [`InfluxDbAdaptor`] checks a runner out of the [`RunnerRegistry`],
//! which transpiles the expression, runs the derived InfluxQL against
//! InfluxDB 1.x and reshapes the rows into Prometheus values.

pub mod query;

pub use query::command::{Command, CommandType, DataType, QueryContext};
pub use query::error::QuerierError;
pub use query::influxql::client::{HttpInfluxClient, InfluxClient, QueryResponse, StoreError};
pub use query::promql::runner::QueryCommandRunner;
pub use query::promql::types::{PromValue, RunResult};
pub use query::registry::{InfluxDbAdaptor, RunnerRegistry};
