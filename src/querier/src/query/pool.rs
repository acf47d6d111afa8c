//! Free-list of reusable command runners

use std::sync::Arc;

use crossbeam::queue::SegQueue;

use common::config::Configuration;

use crate::query::influxql::client::InfluxClient;
use crate::query::promql::runner::QueryCommandRunner;

/// Lock-free pool of [`QueryCommandRunner`]s
///
/// A recycled runner keeps whatever it last held until the next
/// [`RunnerPool::build`], which overwrites every field.
#[derive(Default)]
pub struct RunnerPool {
    idle: SegQueue<Box<QueryCommandRunner>>,
}

impl RunnerPool {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Checks out a runner bound to `client` and `config`
    pub fn build(
        self: &Arc<Self>,
        client: Option<Arc<dyn InfluxClient>>,
        config: Arc<Configuration>,
    ) -> Box<QueryCommandRunner> {
        let mut runner = self.idle.pop().unwrap_or_default();
        runner.reset(client, config, Arc::downgrade(self));
        runner
    }

    pub fn recycle(&self, runner: Box<QueryCommandRunner>) {
        self.idle.push(runner);
    }

    /// Runners currently waiting for reuse
    pub fn idle(&self) -> usize {
        self.idle.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::influxql::client::MockInfluxClient;
    use std::time::Duration;

    #[test]
    fn test_recycled_runner_is_reused() {
        let pool = RunnerPool::new();
        let runner = pool.build(None, Arc::new(Configuration::default()));
        let first: *const QueryCommandRunner = &*runner;
        runner.recycle();
        assert_eq!(pool.idle(), 1);

        let runner = pool.build(None, Arc::new(Configuration::default()));
        assert_eq!(pool.idle(), 0);
        assert!(std::ptr::eq(first, &*runner));
    }

    #[test]
    fn test_build_overwrites_previous_state() {
        let pool = RunnerPool::new();
        let mut slow = Configuration::default();
        slow.query.timeout = Duration::from_secs(600);
        let client: Arc<dyn InfluxClient> = Arc::new(MockInfluxClient::new());
        pool.build(Some(client), Arc::new(slow)).recycle();

        let runner = pool.build(None, Arc::new(Configuration::default()));
        assert_eq!(runner.config().query.timeout, Duration::from_secs(120));
    }

    #[test]
    fn test_runner_outliving_its_pool() {
        let pool = RunnerPool::new();
        let runner = pool.build(None, Arc::new(Configuration::default()));
        drop(pool);
        // nothing to return to
        runner.recycle();
    }
}
