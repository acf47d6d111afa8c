//! PromQL-specific error types

use std::fmt;

/// Errors that can occur while parsing, transpiling or reshaping a PromQL query
#[derive(Debug, Clone, PartialEq)]
pub enum PromQLError {
    /// Error parsing the PromQL query syntax
    ParseError(String),
    /// PromQL construct with no InfluxQL counterpart
    UnsupportedFeature(String),
    /// Error building the InfluxQL statement
    TranspileError(String),
    /// Invalid label matcher
    InvalidMatcher(String),
    /// Function not found or invalid arguments
    FunctionError { name: String, reason: String },
    /// InfluxDB response could not be turned into a PromQL result
    ReshapeError(String),
}

impl std::error::Error for PromQLError {}

impl fmt::Display for PromQLError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ParseError(msg) => write!(f, "PromQL parse error: {msg}"),
            Self::UnsupportedFeature(feature) => {
                write!(f, "Unsupported PromQL feature: {feature}")
            }
            Self::TranspileError(msg) => write!(f, "{msg}"),
            Self::InvalidMatcher(msg) => write!(f, "Invalid label matcher: {msg}"),
            Self::FunctionError { name, reason } => {
                write!(f, "Function '{name}' error: {reason}")
            }
            Self::ReshapeError(msg) => write!(f, "{msg}"),
        }
    }
}

impl PromQLError {
    pub(crate) fn unsupported(feature: impl Into<String>) -> Self {
        Self::UnsupportedFeature(feature.into())
    }

    pub(crate) fn transpile(msg: impl Into<String>) -> Self {
        Self::TranspileError(msg.into())
    }

    pub(crate) fn function(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::FunctionError {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

impl From<regex::Error> for PromQLError {
    fn from(err: regex::Error) -> Self {
        Self::InvalidMatcher(err.to_string())
    }
}
