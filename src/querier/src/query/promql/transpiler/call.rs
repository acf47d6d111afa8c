use promql_parser::parser::Call;

use super::Transpiler;
use super::aggregate::{FunctionClass, InfluxFunction};
use crate::query::influxql::ast::Node;
use crate::query::promql::error::PromQLError;
use crate::query::promql::evaluator::eval_float;
use crate::query::promql::parser::yields_float;

/// InfluxQL counterpart of a PromQL function, and whether its scalar
/// argument is passed along
fn call_function(name: &str) -> Option<(InfluxFunction, bool)> {
    use FunctionClass::*;
    let mapping = match name {
        "sum_over_time" => (InfluxFunction::new("sum", Aggregate), false),
        "avg_over_time" => (InfluxFunction::new("mean", Aggregate), false),
        "count_over_time" => (InfluxFunction::new("count", Aggregate), false),
        "stddev_over_time" => (InfluxFunction::new("stddev", Aggregate), false),
        "max_over_time" => (InfluxFunction::new("max", Selector), false),
        "min_over_time" => (InfluxFunction::new("min", Selector), false),
        "last_over_time" => (InfluxFunction::new("last", Selector), false),
        "quantile_over_time" => (InfluxFunction::percentile(), true),
        "rate" | "irate" => (InfluxFunction::new("non_negative_derivative", Transform), false),
        "deriv" => (InfluxFunction::new("derivative", Transform), false),
        "delta" | "idelta" => (InfluxFunction::new("difference", Transform), false),
        "increase" => (InfluxFunction::new("non_negative_difference", Transform), false),
        "abs" => (InfluxFunction::new("abs", Transform), false),
        "ceil" => (InfluxFunction::new("ceil", Transform), false),
        "floor" => (InfluxFunction::new("floor", Transform), false),
        "exp" => (InfluxFunction::new("exp", Transform), false),
        "sqrt" => (InfluxFunction::new("sqrt", Transform), false),
        "round" => (InfluxFunction::new("round", Transform), false),
        "ln" => (InfluxFunction::new("ln", Transform), false),
        "log2" => (InfluxFunction::new("log2", Transform), false),
        "log10" => (InfluxFunction::new("log10", Transform), false),
        "acos" => (InfluxFunction::new("acos", Transform), false),
        "asin" => (InfluxFunction::new("asin", Transform), false),
        "atan" => (InfluxFunction::new("atan", Transform), false),
        "cos" => (InfluxFunction::new("cos", Transform), false),
        "sin" => (InfluxFunction::new("sin", Transform), false),
        "tan" => (InfluxFunction::new("tan", Transform), false),
        _ => return None,
    };
    Some(mapping)
}

impl Transpiler<'_> {
    pub(super) fn transpile_call(&mut self, call: &Call) -> Result<Node, PromQLError> {
        let name = call.func.name;
        let (function, takes_parameter) =
            call_function(name).ok_or_else(|| PromQLError::function(name, "not supported"))?;

        let (scalars, vectors): (Vec<_>, Vec<_>) =
            call.args.args.iter().partition(|arg| yields_float(arg));
        let [vector] = vectors.as_slice() else {
            return Err(PromQLError::function(
                name,
                format!("expected one vector argument, got {}", vectors.len()),
            ));
        };

        let parameter = match (takes_parameter, scalars.as_slice()) {
            (true, [param]) => Some(eval_float(param)),
            (false, []) => None,
            (true, _) => {
                return Err(PromQLError::function(name, "expected one scalar argument"));
            }
            (false, _) => {
                return Err(PromQLError::function(name, "scalar arguments are not supported"));
            }
        };

        let node = self.transpile_expr(vector)?;
        let select = self.apply_function(node, &function, parameter)?;
        Ok(select.into())
    }
}
