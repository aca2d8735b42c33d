//! Constructors for assembling syntax trees by hand.
//!
//! [`func`] numbers statements the way a parser would (one line each, starting
//! below the `def` line, indented by nesting depth) so diagnostics carry
//! positions even for hand-built trees.

use super::*;

pub fn int(v: i64) -> Expr {
    Expr::new(ExprKind::Constant(Literal::Int(v)))
}

pub fn real(v: f64) -> Expr {
    Expr::new(ExprKind::Constant(Literal::Real(v)))
}

pub fn boolean(v: bool) -> Expr {
    Expr::new(ExprKind::Constant(Literal::Bool(v)))
}

pub fn string(v: &str) -> Expr {
    Expr::new(ExprKind::Constant(Literal::Str(v.to_string())))
}

pub fn name(id: &str) -> Expr {
    Expr::new(ExprKind::Name(id.to_string()))
}

pub fn binop(op: BinOp, lhs: Expr, rhs: Expr) -> Expr {
    Expr::new(ExprKind::BinOp {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    })
}

pub fn add(lhs: Expr, rhs: Expr) -> Expr {
    binop(BinOp::Add, lhs, rhs)
}

pub fn sub(lhs: Expr, rhs: Expr) -> Expr {
    binop(BinOp::Sub, lhs, rhs)
}

pub fn mul(lhs: Expr, rhs: Expr) -> Expr {
    binop(BinOp::Mul, lhs, rhs)
}

pub fn div(lhs: Expr, rhs: Expr) -> Expr {
    binop(BinOp::Div, lhs, rhs)
}

pub fn rem(lhs: Expr, rhs: Expr) -> Expr {
    binop(BinOp::Mod, lhs, rhs)
}

pub fn unary(op: UnaryOp, operand: Expr) -> Expr {
    Expr::new(ExprKind::UnaryOp {
        op,
        operand: Box::new(operand),
    })
}

pub fn neg(operand: Expr) -> Expr {
    unary(UnaryOp::Neg, operand)
}

pub fn not(operand: Expr) -> Expr {
    unary(UnaryOp::Not, operand)
}

pub fn cmp(op: CmpOp, lhs: Expr, rhs: Expr) -> Expr {
    Expr::new(ExprKind::Compare {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    })
}

pub fn lt(lhs: Expr, rhs: Expr) -> Expr {
    cmp(CmpOp::Lt, lhs, rhs)
}

pub fn le(lhs: Expr, rhs: Expr) -> Expr {
    cmp(CmpOp::LtE, lhs, rhs)
}

pub fn gt(lhs: Expr, rhs: Expr) -> Expr {
    cmp(CmpOp::Gt, lhs, rhs)
}

pub fn eq(lhs: Expr, rhs: Expr) -> Expr {
    cmp(CmpOp::Eq, lhs, rhs)
}

pub fn and(lhs: Expr, rhs: Expr) -> Expr {
    Expr::new(ExprKind::BoolOp {
        op: BoolOp::And,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    })
}

pub fn or(lhs: Expr, rhs: Expr) -> Expr {
    Expr::new(ExprKind::BoolOp {
        op: BoolOp::Or,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    })
}

pub fn call(func: &str, args: Vec<Expr>) -> Expr {
    call_kw(func, args, Vec::new())
}

pub fn call_kw(func: &str, args: Vec<Expr>, keywords: Vec<(&str, Expr)>) -> Expr {
    Expr::new(ExprKind::Call {
        func: Box::new(name(func)),
        args,
        keywords: keywords
            .into_iter()
            .map(|(k, value)| Keyword {
                name: k.to_string(),
                value,
                span: Span::UNKNOWN,
            })
            .collect(),
    })
}

/// `value[index]`
pub fn index(value: Expr, idx: Expr) -> Expr {
    Expr::new(ExprKind::Subscript {
        value: Box::new(value),
        index: Box::new(Index::Single(idx)),
    })
}

/// `value[lower:upper]`
pub fn slice(value: Expr, lower: Option<Expr>, upper: Option<Expr>) -> Expr {
    Expr::new(ExprKind::Subscript {
        value: Box::new(value),
        index: Box::new(Index::Slice { lower, upper }),
    })
}

pub fn unsupported_expr(construct: &str) -> Expr {
    Expr::new(ExprKind::Unsupported {
        construct: construct.to_string(),
    })
}

pub fn assign(target: Expr, value: Expr) -> Stmt {
    Stmt::new(StmtKind::Assign { target, value })
}

/// `target op= value`
pub fn aug(target: Expr, op: BinOp, value: Expr) -> Stmt {
    Stmt::new(StmtKind::AugAssign { target, op, value })
}

pub fn expr(e: Expr) -> Stmt {
    Stmt::new(StmtKind::Expr(e))
}

/// `var(name=Type, ...)`
pub fn var(decls: Vec<(&str, Expr)>) -> Stmt {
    expr(call_kw("var", Vec::new(), decls))
}

pub fn if_(test: Expr, body: Vec<Stmt>, orelse: Vec<Stmt>) -> Stmt {
    Stmt::new(StmtKind::If { test, body, orelse })
}

/// `for target in range(args...): body`
pub fn for_range(target: &str, args: Vec<Expr>, body: Vec<Stmt>) -> Stmt {
    Stmt::new(StmtKind::For {
        target: target.to_string(),
        target_span: Span::UNKNOWN,
        iter: call("range", args),
        body,
    })
}

pub fn while_(test: Expr, body: Vec<Stmt>) -> Stmt {
    Stmt::new(StmtKind::While { test, body })
}

pub fn ret(value: Expr) -> Stmt {
    Stmt::new(StmtKind::Return(Some(value)))
}

pub fn ret_void() -> Stmt {
    Stmt::new(StmtKind::Return(None))
}

pub fn pass() -> Stmt {
    Stmt::new(StmtKind::Pass)
}

pub fn unsupported_stmt(construct: &str) -> Stmt {
    Stmt::new(StmtKind::Unsupported {
        construct: construct.to_string(),
    })
}

/// `def name(params...): body`, with positions filled in.
pub fn func(fname: &str, params: &[&str], body: Vec<Stmt>) -> FunctionDef {
    let params = params
        .iter()
        .map(|p| Param {
            name: p.to_string(),
            span: Span::new(1, 0),
        })
        .collect();
    let mut def = FunctionDef::new(fname, params, body);
    number_lines(&mut def);
    def
}

/// Assign a line to every statement lacking one, in source order, and let
/// expressions without a position inherit their statement's.
pub fn number_lines(def: &mut FunctionDef) {
    let mut line = def.span.line.max(1);
    number_block(&mut def.body, &mut line, 1);
}

fn number_block(stmts: &mut [Stmt], line: &mut u32, depth: u32) {
    for stmt in stmts {
        *line += 1;
        if !stmt.span.is_known() {
            stmt.span = Span::new(*line, depth * 4);
        }
        let span = stmt.span;
        match &mut stmt.kind {
            StmtKind::Assign { target, value } | StmtKind::AugAssign { target, value, .. } => {
                fill_expr(target, span);
                fill_expr(value, span);
            }
            StmtKind::Expr(e) | StmtKind::Return(Some(e)) => fill_expr(e, span),
            StmtKind::If { test, body, orelse } => {
                fill_expr(test, span);
                number_block(body, line, depth + 1);
                if !orelse.is_empty() {
                    // the `else:` line
                    *line += 1;
                    number_block(orelse, line, depth + 1);
                }
            }
            StmtKind::For { target_span, iter, body, .. } => {
                if !target_span.is_known() {
                    *target_span = Span::new(span.line, span.col + 4);
                }
                fill_expr(iter, span);
                number_block(body, line, depth + 1);
            }
            StmtKind::While { test, body } => {
                fill_expr(test, span);
                number_block(body, line, depth + 1);
            }
            StmtKind::Return(None) | StmtKind::Pass | StmtKind::Unsupported { .. } => {}
        }
    }
}

fn fill_expr(e: &mut Expr, span: Span) {
    if !e.span.is_known() {
        e.span = span;
    }
    let span = e.span;
    match &mut e.kind {
        ExprKind::BinOp { lhs, rhs, .. }
        | ExprKind::Compare { lhs, rhs, .. }
        | ExprKind::BoolOp { lhs, rhs, .. } => {
            fill_expr(lhs, span);
            fill_expr(rhs, span);
        }
        ExprKind::UnaryOp { operand, .. } => fill_expr(operand, span),
        ExprKind::Call { func, args, keywords } => {
            fill_expr(func, span);
            for a in args {
                fill_expr(a, span);
            }
            for k in keywords {
                if !k.span.is_known() {
                    k.span = span;
                }
                fill_expr(&mut k.value, span);
            }
        }
        ExprKind::Subscript { value, index } => {
            fill_expr(value, span);
            match index.as_mut() {
                Index::Single(i) => fill_expr(i, span),
                Index::Slice { lower, upper } => {
                    if let Some(l) = lower {
                        fill_expr(l, span);
                    }
                    if let Some(u) = upper {
                        fill_expr(u, span);
                    }
                }
            }
        }
        ExprKind::Constant(_) | ExprKind::Name(_) | ExprKind::Unsupported { .. } => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_numbering() {
        let def = func(
            "f",
            &["n"],
            vec![
                assign(name("x"), int(0)),
                if_(
                    lt(name("n"), int(1)),
                    vec![ret(int(1))],
                    vec![ret(name("x"))],
                ),
            ],
        );
        assert_eq!(def.body[0].span, Span::new(2, 4));
        assert_eq!(def.body[1].span, Span::new(3, 4));
        match &def.body[1].kind {
            StmtKind::If { test, body, orelse } => {
                assert_eq!(test.span, Span::new(3, 4));
                assert_eq!(body[0].span, Span::new(4, 8));
                // line 5 is `else:`
                assert_eq!(orelse[0].span, Span::new(6, 8));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_explicit_positions_survive() {
        let def = func("g", &[], vec![ret(name("y").at(2, 11)).at(2, 4)]);
        match &def.body[0].kind {
            StmtKind::Return(Some(e)) => assert_eq!(e.span, Span::new(2, 11)),
            other => panic!("unexpected {:?}", other),
        }
    }
}
