pub mod command;
pub mod error;
pub mod influxql;
pub mod pool;
pub mod promql;
pub mod registry;
