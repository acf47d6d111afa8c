use promql_parser::parser::token::{self, TokenId};
use promql_parser::parser::{AggregateExpr, LabelModifier};

use super::Transpiler;
use crate::query::influxql::ast::{self, Dimension, Field, Literal, Node, SelectStatement, Statement};
use crate::query::promql::error::PromQLError;
use crate::query::promql::evaluator::eval_float;
use crate::query::promql::parser::yields_float;

/// InfluxQL function families
///
/// Aggregates collapse every series of a group into one row, so the
/// `*::tag` projection has to be dropped next to them
/// ("mixing aggregate and non-aggregate queries is not supported").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum FunctionClass {
    Aggregate,
    Selector,
    Transform,
}

/// An InfluxQL function a PromQL operator or function maps to
#[derive(Debug, Clone, Copy)]
pub(super) struct InfluxFunction {
    pub name: &'static str,
    pub class: FunctionClass,
    /// Render the parameter as an integer (`top`, `bottom`)
    pub integer_parameter: bool,
    /// Factor between the PromQL parameter and the InfluxQL one
    pub parameter_scale: f64,
}

impl InfluxFunction {
    pub(super) const fn new(name: &'static str, class: FunctionClass) -> Self {
        Self {
            name,
            class,
            integer_parameter: false,
            parameter_scale: 1.0,
        }
    }

    /// `percentile`, whose N lies in [0, 100] where PromQL's φ lies in [0, 1]
    pub(super) const fn percentile() -> Self {
        Self {
            parameter_scale: 100.0,
            ..Self::new("percentile", FunctionClass::Selector)
        }
    }

    const fn with_integer_parameter(mut self) -> Self {
        self.integer_parameter = true;
        self
    }

    fn drops_tags(&self) -> bool {
        self.class == FunctionClass::Aggregate
    }
}

fn aggregate_function(id: TokenId) -> Option<InfluxFunction> {
    use FunctionClass::*;
    let function = match id {
        token::T_SUM => InfluxFunction::new("sum", Aggregate),
        token::T_AVG => InfluxFunction::new("mean", Aggregate),
        token::T_COUNT => InfluxFunction::new("count", Aggregate),
        token::T_STDDEV => InfluxFunction::new("stddev", Aggregate),
        token::T_MAX => InfluxFunction::new("max", Selector),
        token::T_MIN => InfluxFunction::new("min", Selector),
        token::T_TOPK => InfluxFunction::new("top", Selector).with_integer_parameter(),
        token::T_BOTTOMK => InfluxFunction::new("bottom", Selector).with_integer_parameter(),
        token::T_QUANTILE => InfluxFunction::percentile(),
        _ => return None,
    };
    Some(function)
}

impl Transpiler<'_> {
    pub(super) fn transpile_aggregate(&mut self, a: &AggregateExpr) -> Result<Node, PromQLError> {
        let node = self.transpile_expr(&a.expr).map_err(|e| {
            PromQLError::transpile(format!("error transpiling aggregate sub-expression: {e}"))
        })?;

        let grouping: &[String] = match &a.modifier {
            Some(LabelModifier::Exclude(_)) => {
                return Err(PromQLError::unsupported("aggregate grouping with `without`"));
            }
            Some(LabelModifier::Include(labels)) => labels.labels.as_slice(),
            None => &[],
        };

        let function = aggregate_function(a.op.id())
            .ok_or_else(|| PromQLError::unsupported(format!("aggregation {}", a.op)))?;

        let parameter = match &a.param {
            Some(param) if !yields_float(param) => {
                return Err(PromQLError::unsupported(
                    "aggregate parameter that does not yield a float",
                ));
            }
            Some(param) => Some(eval_float(param)),
            None => None,
        };

        // without `by` the aggregate spans every series
        let mut select = self.apply_function(node, &function, parameter)?;
        select.dimensions = grouping.iter().map(Dimension::tag).collect();
        Ok(select.into())
    }

    /// Applies `function` to the value under construction
    ///
    /// A statement whose last field already is a call gets wrapped in a
    /// sub-query, since InfluxQL cannot nest aggregates and selectors.
    /// Otherwise the fields are rewritten in place.
    pub(super) fn apply_function(
        &mut self,
        node: Node,
        function: &InfluxFunction,
        parameter: Option<f64>,
    ) -> Result<SelectStatement, PromQLError> {
        let mut select = match node {
            Node::Statement(Statement::Select(select)) => select,
            Node::Statement(Statement::ShowTagValues(_)) | Node::Expr(_) => {
                return Err(PromQLError::function(
                    function.name,
                    "argument does not select a series",
                ));
            }
        };
        let field = select
            .fields
            .pop()
            .ok_or_else(|| PromQLError::transpile("statement has no field to aggregate"))?;

        let argument = if matches!(field.expr, ast::Expr::Call(_)) {
            let name = field.name();
            select.fields.push(field);
            select = SelectStatement::wrapping(select);
            ast::Expr::var(name)
        } else {
            field.expr
        };

        let mut args = vec![argument];
        if let Some(value) = parameter {
            args.push(ast::Expr::Literal(if function.integer_parameter {
                Literal::Integer(value as i64)
            } else {
                Literal::Number(value * function.parameter_scale)
            }));
        }

        select.fields.clear();
        if function.drops_tags() {
            self.tag_dropped = true;
        } else {
            select.fields.push(Field::tag_wildcard());
        }
        select
            .fields
            .push(Field::new(ast::Expr::call(function.name, args)));
        Ok(select)
    }
}
