use promql_parser::parser::UnaryExpr;

use super::{Transpiler, group};
use crate::query::influxql::ast::{self, Field, Literal, Node, Operator, Statement};
use crate::query::promql::error::PromQLError;

fn minus_one() -> ast::Expr {
    ast::Expr::Literal(Literal::Integer(-1))
}

impl Transpiler<'_> {
    /// Negation; unary `+` never reaches the AST
    pub(super) fn transpile_unary(&mut self, u: &UnaryExpr) -> Result<Node, PromQLError> {
        let node = self.transpile_expr(&u.expr).map_err(|e| {
            PromQLError::transpile(format!(
                "error transpiling expression in unary expression: {e}"
            ))
        })?;

        match node {
            Node::Expr(ast::Expr::Literal(Literal::Number(v))) => {
                Ok(Node::Expr(ast::Expr::number(-v)))
            }
            Node::Expr(ast::Expr::Literal(Literal::Integer(v))) => {
                Ok(Node::Expr(ast::Expr::Literal(Literal::Integer(-v))))
            }
            Node::Expr(expr) => Ok(Node::Expr(ast::Expr::binary(
                Operator::Mul,
                minus_one(),
                group(expr),
            ))),
            Node::Statement(Statement::Select(mut select)) => {
                let field = select
                    .fields
                    .pop()
                    .ok_or_else(|| PromQLError::transpile("statement has no field to negate"))?;
                let negated = ast::Expr::binary(Operator::Mul, minus_one(), group(field.expr));
                select.fields.push(Field::new(negated));
                Ok(select.into())
            }
            Node::Statement(Statement::ShowTagValues(_)) => Err(PromQLError::unsupported(
                "unary expression on a label values statement",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{evaluation_command, transpile_node};

    #[test]
    fn test_negated_selectors() {
        let command = evaluation_command();
        let cases = [
            (
                "-go_gc_duration_seconds_count",
                "SELECT *::tag, -1 * last(value) FROM go_gc_duration_seconds_count GROUP BY *",
            ),
            (
                "-(3 * go_gc_duration_seconds_count)",
                "SELECT *::tag, -1 * (3.000 * last(value)) FROM go_gc_duration_seconds_count GROUP BY *",
            ),
            (
                "-(go_gc_duration_seconds_count - 1)",
                "SELECT *::tag, -1 * (last(value) - 1.000) FROM go_gc_duration_seconds_count GROUP BY *",
            ),
            (
                "-abs(go_gc_duration_seconds_count)",
                "SELECT *::tag, -1 * abs(last) FROM (SELECT *::tag, last(value) FROM go_gc_duration_seconds_count GROUP BY *)",
            ),
        ];
        for (query, expected) in cases {
            assert_eq!(transpile_node(&command, query).unwrap(), expected, "{query}");
        }
    }

    #[test]
    fn test_negated_literals() {
        let command = evaluation_command();
        assert_eq!(transpile_node(&command, "-(5)").unwrap(), "-5.000");
        assert_eq!(
            transpile_node(&command, "-(1 + 2)").unwrap(),
            "-1 * (1.000 + 2.000)"
        );
    }
}
