use crate::ast::*;

/// Render a single expression on one line, re-parseable as mallow source.
pub fn format_expr(expr: &ExprKind) -> String {
    let mut out = String::new();
    fmt_expr(&mut out, expr);
    out
}

fn binop_level(op: BinOp) -> u8 {
    match op {
        BinOp::And | BinOp::Or => 1,
        BinOp::Equals | BinOp::NotEquals => 2,
        BinOp::GreaterThan | BinOp::LessThan => 3,
        BinOp::Add | BinOp::Subtract => 4,
        BinOp::Multiply | BinOp::Divide | BinOp::Modulo => 5,
    }
}

/// Expressions that extend as far right as possible must be wrapped when used as operands.
fn is_open_ended(expr: &ExprKind) -> bool {
    matches!(expr, ExprKind::If { .. } | ExprKind::Lambda { .. } | ExprKind::Apply { .. })
}

fn fmt_operand(out: &mut String, expr: &ExprKind, parent: Option<(u8, bool)>) {
    let wrap = match (expr, parent) {
        (e, _) if is_open_ended(e) => true,
        (ExprKind::Infix { op, .. }, Some((level, is_right))) => {
            let own = binop_level(*op);
            own < level || (own == level && is_right)
        }
        (ExprKind::Infix { .. }, None) => true,
        _ => false,
    };
    if wrap {
        out.push('(');
        fmt_expr(out, expr);
        out.push(')');
    } else {
        fmt_expr(out, expr);
    }
}

fn fmt_expr(out: &mut String, expr: &ExprKind) {
    match expr {
        ExprKind::Integer { value } => out.push_str(&value.to_string()),
        ExprKind::Text { value } => {
            out.push('"');
            out.push_str(value);
            out.push('"');
        }
        ExprKind::Bool { value } => out.push_str(if *value { "true" } else { "false" }),
        ExprKind::Nil => out.push_str("nil"),
        ExprKind::Ident { name } => out.push_str(name),
        ExprKind::Prefix { op, operand } => {
            out.push_str(op.symbol());
            if *op == UnaryOp::Not {
                out.push(' ');
            }
            fmt_operand(out, operand, None);
        }
        ExprKind::Infix { op, left, right } => {
            let level = binop_level(*op);
            fmt_operand(out, left, Some((level, false)));
            out.push(' ');
            out.push_str(op.symbol());
            out.push(' ');
            fmt_operand(out, right, Some((level, true)));
        }
        ExprKind::If { condition, consequence, alternative } => {
            out.push_str("if ");
            fmt_expr(out, condition);
            out.push_str(" then ");
            fmt_expr(out, consequence);
            if let Some(alt) = alternative {
                out.push_str(" else ");
                fmt_expr(out, alt);
            }
        }
        ExprKind::Lambda { param, body } => {
            out.push_str("lambda ");
            out.push_str(param);
            out.push_str(" . ");
            fmt_expr(out, body);
        }
        ExprKind::Apply { function, argument } => {
            if matches!(function.node, ExprKind::Infix { .. } | ExprKind::Prefix { .. })
                || is_open_ended(&function.node)
            {
                out.push('(');
                fmt_expr(out, function);
                out.push(')');
            } else {
                fmt_expr(out, function);
            }
            out.push_str(" | ");
            fmt_expr(out, argument);
        }
    }
}
