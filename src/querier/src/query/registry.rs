//! Runner registry and the InfluxDB adaptor built on it

use std::collections::HashMap;
use std::sync::Arc;

use common::config::Configuration;

use crate::query::command::{Command, CommandType, QueryContext};
use crate::query::error::QuerierError;
use crate::query::influxql::client::InfluxClient;
use crate::query::pool::RunnerPool;
use crate::query::promql::types::RunResult;

/// Runner pools keyed by command type
///
/// Built once at startup and shared by reference.
#[derive(Default)]
pub struct RunnerRegistry {
    pools: HashMap<CommandType, Arc<RunnerPool>>,
}

impl RunnerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every command type this crate can run
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(CommandType::PROMQL_QUERY, RunnerPool::new());
        registry
    }

    /// Registers `pool`, replacing any pool already registered for `command_type`
    pub fn register(&mut self, command_type: CommandType, pool: Arc<RunnerPool>) {
        if self.pools.insert(command_type, pool).is_some() {
            log::warn!("Replaced runner pool for {command_type}");
        }
    }

    pub fn get(&self, command_type: CommandType) -> Option<Arc<RunnerPool>> {
        self.pools.get(&command_type).cloned()
    }
}

/// Runs PromQL commands against one InfluxDB
pub struct InfluxDbAdaptor {
    registry: Arc<RunnerRegistry>,
    client: Arc<dyn InfluxClient>,
    config: Arc<Configuration>,
}

impl InfluxDbAdaptor {
    pub fn new(
        registry: Arc<RunnerRegistry>,
        client: Arc<dyn InfluxClient>,
        config: Arc<Configuration>,
    ) -> Self {
        Self {
            registry,
            client,
            config,
        }
    }

    /// Checks a runner out, runs `command` and hands the runner back
    pub async fn query(&self, ctx: &QueryContext, command: Command) -> Result<RunResult, QuerierError> {
        let command_type = CommandType::PROMQL_QUERY;
        let pool = self
            .registry
            .get(command_type)
            .ok_or_else(|| QuerierError::UnsupportedCommand(command_type.to_string()))?;

        let runner = pool.build(Some(Arc::clone(&self.client)), Arc::clone(&self.config));
        let result = runner.run(ctx, command).await;
        runner.recycle();
        result
    }
}
