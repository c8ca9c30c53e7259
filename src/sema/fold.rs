use crate::ast::{BinOp, Expr, FuncDecl, Stmt, UnaryOp};

/// Fold integer binary operations over literal operands. Division and
/// modulo by zero are left alone; the analyser has already reported them.
pub fn fold_func(decl: &mut FuncDecl) {
    if let Some(body) = &mut decl.body {
        for stmt in body {
            fold_stmt(stmt);
        }
    }
}

pub fn fold_expr(expr: &mut Expr) {
    // Children first so nested constant subtrees collapse upward.
    match expr {
        Expr::Unary(_, e, _) | Expr::Cast(_, e, _) | Expr::CStr(e, _) | Expr::Member(e, _, _)
        | Expr::Arrow(e, _, _) => fold_expr(e),
        Expr::Binary(_, l, r, _) | Expr::Assign(l, r, _) | Expr::Index(l, r, _) => {
            fold_expr(l);
            fold_expr(r);
        }
        Expr::Call(callee, args, _) => {
            fold_expr(callee);
            for a in args {
                fold_expr(a);
            }
        }
        Expr::ArrayLit(items, _) => {
            for i in items {
                fold_expr(i);
            }
        }
        Expr::Lambda(_, body, _) => {
            for s in body {
                fold_stmt(s);
            }
        }
        _ => {}
    }

    let Expr::Binary(op, l, r, pos) = expr else {
        return;
    };
    let (Some(lv), Some(rv)) = (literal_int(l), literal_int(r)) else {
        return;
    };
    let folded = match op {
        BinOp::Add => lv.checked_add(rv),
        BinOp::Sub => lv.checked_sub(rv),
        BinOp::Mul => lv.checked_mul(rv),
        BinOp::Div if rv != 0 => Some(lv / rv),
        BinOp::Mod if rv != 0 => Some(lv % rv),
        BinOp::Eq => Some((lv == rv) as i128),
        BinOp::Ne => Some((lv != rv) as i128),
        BinOp::Lt => Some((lv < rv) as i128),
        BinOp::Le => Some((lv <= rv) as i128),
        BinOp::Gt => Some((lv > rv) as i128),
        BinOp::Ge => Some((lv >= rv) as i128),
        BinOp::BitAnd => Some(lv & rv),
        BinOp::BitOr => Some(lv | rv),
        BinOp::BitXor => Some(lv ^ rv),
        BinOp::Shl if (0..64).contains(&rv) => lv.checked_shl(rv as u32),
        BinOp::Shr if (0..64).contains(&rv) => lv.checked_shr(rv as u32),
        _ => None,
    };
    // Only fold results that still fit the 64-bit literal domain.
    let folded = folded.filter(|v| v.unsigned_abs() <= u64::MAX as u128);
    if let Some(value) = folded {
        let pos = pos.clone();
        *expr = if value < 0 {
            Expr::Unary(
                UnaryOp::Neg,
                Box::new(Expr::Int(value.unsigned_abs() as u64, pos.clone())),
                pos,
            )
        } else {
            Expr::Int(value as u64, pos)
        };
    }
}

fn fold_stmt(stmt: &mut Stmt) {
    match stmt {
        Stmt::Block(body, _) => body.iter_mut().for_each(fold_stmt),
        Stmt::If {
            cond, then, els, ..
        } => {
            fold_expr(cond);
            then.iter_mut().for_each(fold_stmt);
            if let Some(els) = els {
                els.iter_mut().for_each(fold_stmt);
            }
        }
        Stmt::While { cond, body, .. } | Stmt::DoWhile { cond, body, .. } => {
            fold_expr(cond);
            body.iter_mut().for_each(fold_stmt);
        }
        Stmt::For {
            init,
            cond,
            step,
            body,
            ..
        } => {
            fold_stmt(init);
            fold_expr(cond);
            fold_expr(step);
            body.iter_mut().for_each(fold_stmt);
        }
        Stmt::Foreach { iter, body, .. } => {
            fold_expr(iter);
            body.iter_mut().for_each(fold_stmt);
        }
        Stmt::Return(Some(e), _) => fold_expr(e),
        Stmt::Return(None, _) => {}
        Stmt::Var { init, .. } => {
            if let Some(e) = init {
                fold_expr(e);
            }
        }
        Stmt::Expr(e) => fold_expr(e),
    }
}

/// Literal integer value of an expression, with unary minus folded in.
pub fn literal_int(expr: &Expr) -> Option<i128> {
    match expr {
        Expr::Int(v, _) => Some(*v as i128),
        Expr::Char(c, _) => Some(*c as i128),
        Expr::Unary(UnaryOp::Neg, inner, _) => match inner.as_ref() {
            Expr::Int(v, _) => Some(-(*v as i128)),
            _ => None,
        },
        _ => None,
    }
}
