//! PromQL support: parsing, transpiling to InfluxQL, and running queries
//!
//! ```text
//! PromQL String → Parser → AST (Expr) → Transpiler → InfluxQL → InfluxDB → Reshaper → RunResult
//! ```
//!
//! Expressions made only of numbers never reach the store; they are folded
//! by [`evaluator::eval_float`].
//!
//! # Supported Features
//!
//! ## Selectors
//! - Instant vector selectors: `metric_name{label="value"}`
//! - Range vector selectors: `metric_name[5m]`
//! - Label matchers: `=`, `!=`, `=~`, `!~`
//! - Offset modifier: `metric offset 5m`
//! - @ modifier: `metric @ 1609459200`
//!
//! ## Aggregations
//! - `sum`, `avg`, `min`, `max`, `count`, `stddev`
//! - `topk`, `bottomk`, `quantile`
//! - Grouping with `by`
//!
//! ## Functions
//! - Rate functions: `rate`, `irate`, `increase`, `delta`, `idelta`, `deriv`
//! - Aggregation over time: `avg_over_time`, `sum_over_time`, etc.
//! - Math functions: `abs`, `ceil`, `floor`, `round`, `sqrt`, etc.
//!
//! Vector-to-vector operators, `without` and subqueries have no InfluxQL
//! counterpart and are rejected.

pub mod error;
pub mod evaluator;
pub mod parser;
pub mod reshape;
pub mod runner;
pub mod transpiler;
pub mod types;
