use promql_parser::parser::token::{self, TokenId};
use promql_parser::parser::BinaryExpr;

use super::{Transpiler, into_expr};
use crate::query::influxql::ast::{self, Field, Node, Operator, SelectStatement, Statement};
use crate::query::promql::error::PromQLError;
use crate::query::promql::parser::yields_float;

/// Which operand of the PromQL expression the table came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Left,
    Right,
}

fn arith_op(id: TokenId) -> Option<Operator> {
    match id {
        token::T_ADD => Some(Operator::Add),
        token::T_SUB => Some(Operator::Sub),
        token::T_MUL => Some(Operator::Mul),
        token::T_DIV => Some(Operator::Div),
        token::T_MOD => Some(Operator::Mod),
        _ => None,
    }
}

fn comparison_op(id: TokenId) -> Option<Operator> {
    match id {
        token::T_EQLC => Some(Operator::Eq),
        token::T_NEQ => Some(Operator::Neq),
        token::T_GTR => Some(Operator::Gt),
        token::T_LSS => Some(Operator::Lt),
        token::T_GTE => Some(Operator::Gte),
        token::T_LTE => Some(Operator::Lte),
        _ => None,
    }
}

/// Orders the table operand and the parameter back into PromQL's order
fn ordered(side: Side, table: ast::Expr, parameter: ast::Expr) -> (ast::Expr, ast::Expr) {
    match side {
        Side::Left => (table, parameter),
        Side::Right => (parameter, table),
    }
}

fn select_mut(statement: &mut Statement) -> Result<&mut SelectStatement, PromQLError> {
    match statement {
        Statement::Select(select) => Ok(select),
        Statement::ShowTagValues(_) => Err(PromQLError::unsupported(
            "binary operation on a label values statement",
        )),
    }
}

fn take_last_field(select: &mut SelectStatement) -> Result<ast::Expr, PromQLError> {
    select
        .fields
        .pop()
        .map(|field| field.expr)
        .ok_or_else(|| PromQLError::transpile("statement has no field to operate on"))
}

impl Transpiler<'_> {
    pub(super) fn transpile_binary(&mut self, b: &BinaryExpr) -> Result<Node, PromQLError> {
        let lhs = self.transpile_expr(&b.lhs).map_err(|e| {
            PromQLError::transpile(format!(
                "unable to transpile left-hand side of binary operation: {e}"
            ))
        })?;
        let rhs = self.transpile_expr(&b.rhs).map_err(|e| {
            PromQLError::transpile(format!(
                "unable to transpile right-hand side of binary operation: {e}"
            ))
        })?;
        let id = b.op.id();

        match (yields_float(&b.lhs), yields_float(&b.rhs)) {
            (true, true) => {
                let (lhs, rhs) = (into_expr(lhs)?, into_expr(rhs)?);
                if let Some(op) = arith_op(id) {
                    return Ok(Node::Expr(ast::Expr::binary(op, lhs, rhs)));
                }
                if id == token::T_POW {
                    return Ok(Node::Expr(ast::Expr::call("pow", vec![lhs, rhs])));
                }
                if let Some(op) = comparison_op(id) {
                    let return_bool = b.modifier.as_ref().is_some_and(|m| m.return_bool);
                    if !return_bool {
                        return Err(PromQLError::transpile(
                            "scalar-to-scalar binary op is missing 'bool' modifier",
                        ));
                    }
                    return Ok(Node::Expr(ast::Expr::binary(op, lhs, rhs)));
                }
                Err(PromQLError::unsupported(format!(
                    "scalar-to-scalar binary op {}",
                    b.op
                )))
            }
            (true, false) => self.transpile_scalar_table(b, rhs, lhs, Side::Right),
            (false, true) => self.transpile_scalar_table(b, lhs, rhs, Side::Left),
            (false, false) => Err(PromQLError::unsupported(
                "vector-to-vector binary operation",
            )),
        }
    }

    fn transpile_scalar_table(
        &mut self,
        b: &BinaryExpr,
        table: Node,
        parameter: Node,
        side: Side,
    ) -> Result<Node, PromQLError> {
        let id = b.op.id();
        let parameter = into_expr(parameter)?;

        let mut statement = match table {
            Node::Statement(statement) => statement,
            Node::Expr(expr) => {
                let (lhs, rhs) = ordered(side, expr, parameter);
                return if let Some(op) = arith_op(id).or_else(|| comparison_op(id)) {
                    Ok(Node::Expr(ast::Expr::binary(op, lhs, rhs)))
                } else if id == token::T_POW {
                    Ok(Node::Expr(ast::Expr::call("pow", vec![lhs, rhs])))
                } else {
                    Err(PromQLError::unsupported(format!(
                        "scalar-to-vector binary op {}",
                        b.op
                    )))
                };
            }
        };

        if let Some(op) = arith_op(id) {
            let select = select_mut(&mut statement)?;
            let field = take_last_field(select)?;
            let (lhs, rhs) = ordered(side, field, parameter);
            let expr = ast::Expr::binary(op, lhs, rhs);
            select.fields.push(Field::new(expr));
            return Ok(Node::Statement(statement));
        }

        if id == token::T_POW {
            let select = select_mut(&mut statement)?;
            let field = take_last_field(select)?;
            let (lhs, rhs) = ordered(side, field, parameter);
            let expr = ast::Expr::call("pow", vec![lhs, rhs]);
            select.fields.push(Field::new(expr));
            return Ok(Node::Statement(statement));
        }

        if let Some(op) = comparison_op(id) {
            return self.filter_by_comparison(statement, op, parameter, side);
        }

        Err(PromQLError::unsupported(format!(
            "scalar-to-vector binary op {}",
            b.op
        )))
    }

    /// Wraps the statement in a sub-query and expresses the comparison as
    /// the outer WHERE condition.
    fn filter_by_comparison(
        &self,
        statement: Statement,
        op: Operator,
        parameter: ast::Expr,
        side: Side,
    ) -> Result<Node, PromQLError> {
        let inner = match statement {
            Statement::Select(select) => select,
            Statement::ShowTagValues(_) => {
                return Err(PromQLError::unsupported(
                    "comparison on a label values statement",
                ));
            }
        };
        let field_name = inner
            .last_field()
            .map(Field::name)
            .ok_or_else(|| PromQLError::transpile("statement has no field to compare"))?;

        let mut outer = SelectStatement::wrapping(inner);
        if !self.tag_dropped {
            outer.fields.push(Field::tag_wildcard());
        }
        let value = ast::Expr::var(field_name);
        outer.fields.push(Field::new(value.clone()));
        let (lhs, rhs) = ordered(side, value, parameter);
        outer.condition = Some(ast::Expr::binary(op, lhs, rhs));
        Ok(outer.into())
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{evaluation_command, transpile, transpile_node};
    use super::*;

    #[test]
    fn test_scalar_vector_arithmetic() {
        let command = evaluation_command();
        let cases = [
            (
                "5 * go_gc_duration_seconds_count",
                "SELECT *::tag, 5.000 * last(value) FROM go_gc_duration_seconds_count GROUP BY *",
            ),
            (
                "5 * rate(go_gc_duration_seconds_count[1m])",
                "SELECT *::tag, 5.000 * non_negative_derivative(value) FROM go_gc_duration_seconds_count GROUP BY *",
            ),
            (
                "5 * 6 * go_gc_duration_seconds_count",
                "SELECT *::tag, 5.000 * 6.000 * last(value) FROM go_gc_duration_seconds_count GROUP BY *",
            ),
            (
                "5 * (go_gc_duration_seconds_count - 6)",
                "SELECT *::tag, 5.000 * (last(value) - 6.000) FROM go_gc_duration_seconds_count GROUP BY *",
            ),
            (
                "(5 * go_gc_duration_seconds_count) - 6",
                "SELECT *::tag, (5.000 * last(value)) - 6.000 FROM go_gc_duration_seconds_count GROUP BY *",
            ),
            (
                "2 * (go_gc_duration_seconds_count * 3 - 1)",
                "SELECT *::tag, 2.000 * (last(value) * 3.000 - 1.000) FROM go_gc_duration_seconds_count GROUP BY *",
            ),
            (
                "((go_gc_duration_seconds_count + 1)) / 2",
                "SELECT *::tag, (last(value) + 1.000) / 2.000 FROM go_gc_duration_seconds_count GROUP BY *",
            ),
            (
                "go_gc_duration_seconds_count * 0.0001",
                "SELECT *::tag, last(value) * 0.0001 FROM go_gc_duration_seconds_count GROUP BY *",
            ),
            (
                "go_gc_duration_seconds_count / 2",
                "SELECT *::tag, last(value) / 2.000 FROM go_gc_duration_seconds_count GROUP BY *",
            ),
        ];
        for (query, expected) in cases {
            assert_eq!(transpile_node(&command, query).unwrap(), expected, "{query}");
        }
    }

    #[test]
    fn test_pow_uses_call_syntax() {
        let command = evaluation_command();
        assert_eq!(
            transpile_node(&command, "go_gc_duration_seconds_count ^ 3 ^ 4").unwrap(),
            "SELECT *::tag, pow(last(value), pow(3.000, 4.000)) FROM go_gc_duration_seconds_count GROUP BY *"
        );
        assert_eq!(
            transpile_node(&command, "2 ^ go_gc_duration_seconds_count").unwrap(),
            "SELECT *::tag, pow(2.000, last(value)) FROM go_gc_duration_seconds_count GROUP BY *"
        );
    }

    #[test]
    fn test_comparison_wraps_in_subquery() {
        let command = evaluation_command();
        assert_eq!(
            transpile_node(&command, "5 > go_gc_duration_seconds_count").unwrap(),
            "SELECT *::tag, last FROM (SELECT *::tag, last(value) FROM go_gc_duration_seconds_count GROUP BY *) WHERE 5.000 > last"
        );
        assert_eq!(
            transpile(&command, "5 > go_gc_duration_seconds_count").unwrap(),
            "SELECT *::tag, last FROM (SELECT *::tag, last(value) FROM go_gc_duration_seconds_count GROUP BY *) WHERE time <= '2023-01-06T07:00:00Z' AND 5.000 > last"
        );
        assert_eq!(
            transpile_node(&command, "go_gc_duration_seconds_count <= 2").unwrap(),
            "SELECT *::tag, last FROM (SELECT *::tag, last(value) FROM go_gc_duration_seconds_count GROUP BY *) WHERE last <= 2.000"
        );
    }

    #[test]
    fn test_comparison_after_tag_dropping_aggregate() {
        let command = evaluation_command();
        assert_eq!(
            transpile_node(&command, "sum(go_gc_duration_seconds_count) > 10").unwrap(),
            "SELECT sum FROM (SELECT sum(last) FROM (SELECT *::tag, last(value) FROM go_gc_duration_seconds_count GROUP BY *)) WHERE sum > 10.000"
        );
    }

    #[test]
    fn test_scalar_scalar() {
        let command = evaluation_command();
        assert_eq!(transpile_node(&command, "1 + 2 * 3").unwrap(), "1.000 + 2.000 * 3.000");
        assert_eq!(transpile_node(&command, "2 ^ 3").unwrap(), "pow(2.000, 3.000)");
        assert_eq!(transpile_node(&command, "1 == bool 2").unwrap(), "1.000 = 2.000");
        assert_eq!(
            transpile_node(&command, "2 * (3 * 4 - 1)").unwrap(),
            "2.000 * (3.000 * 4.000 - 1.000)"
        );
        assert_eq!(transpile_node(&command, "(2) * 3").unwrap(), "2.000 * 3.000");
    }

    #[test]
    fn test_vector_vector_not_supported() {
        let command = evaluation_command();
        let err = transpile_node(&command, "go_goroutines + go_threads").unwrap_err();
        assert!(matches!(err, PromQLError::UnsupportedFeature(_)));
    }

    #[test]
    fn test_side_errors_are_wrapped() {
        let command = evaluation_command();
        let err = transpile_node(&command, "predict_linear(go_goroutines[5m], 60) * 2").unwrap_err();
        assert!(err
            .to_string()
            .starts_with("unable to transpile left-hand side of binary operation"));
    }
}
