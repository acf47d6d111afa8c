//! Local folding of selector-free PromQL expressions
//!
//! Nodes outside number/binary/unary/paren, and binary operators other than
//! arithmetic, fold to `0` instead of failing.

use promql_parser::parser::token;
use promql_parser::parser::Expr;

/// Fold `expr` to a single float without touching the store
pub fn eval_float(expr: &Expr) -> f64 {
    match expr {
        Expr::NumberLiteral(num) => num.val,
        Expr::Paren(paren) => eval_float(&paren.expr),
        Expr::Unary(unary) => -eval_float(&unary.expr),
        Expr::Binary(bin) => {
            let lhs = eval_float(&bin.lhs);
            let rhs = eval_float(&bin.rhs);
            match bin.op.id() {
                token::T_ADD => lhs + rhs,
                token::T_SUB => lhs - rhs,
                token::T_MUL => lhs * rhs,
                token::T_DIV => lhs / rhs,
                // fmod semantics: the sign follows the dividend
                token::T_MOD => lhs % rhs,
                token::T_POW => lhs.powf(rhs),
                _ => 0.0,
            }
        }
        _ => 0.0,
    }
}
