use crate::query::influxql::client::StoreError;
use crate::query::promql::error::PromQLError;

#[derive(Debug, thiserror::Error)]
pub enum QuerierError {
    #[error("parse: {0}")]
    Parse(PromQLError),
    #[error("transpile: {0}")]
    Transpile(PromQLError),
    #[error("execute: {0}")]
    Execute(#[from] StoreError),
    #[error("reshape: {0}")]
    Reshape(PromQLError),
    #[error("context deadline exceeded")]
    DeadlineExceeded,
    #[error("context canceled")]
    Cancelled,
    #[error("no runner registered for {0}")]
    UnsupportedCommand(String),
    #[error("query task failed: {0}")]
    TaskFailed(String),
}

impl QuerierError {
    /// True for the two ways a query can be cut short by its context
    pub fn is_context_error(&self) -> bool {
        matches!(self, Self::DeadlineExceeded | Self::Cancelled)
    }
}
