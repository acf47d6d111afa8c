//! InfluxQL side of the translation: the statement tree the transpiler builds
//! and the HTTP client that executes it.

pub mod ast;
pub mod client;
