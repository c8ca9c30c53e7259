use crate::ast::{Expr, FuncDecl, Item, MacroDecl, Stmt, TypeExpr};
use crate::error::Diagnostic;
use crate::include::NsItem;
use indexmap::{IndexMap, IndexSet};

const MAX_EXPANSION_DEPTH: u32 = 64;

// ----------------------------------------------------------------------------
// Macro expansion. Macros are expanded in place by substitution on the AST:
// parameter identifiers are replaced with argument sub-trees, and the body
// expression becomes the expansion's value. Expansion happens before symbol
// collection, so the expanded tree is resolved like hand-written code.
// ----------------------------------------------------------------------------

struct MacroTable {
    macros: IndexMap<String, MacroDecl>,
}

impl MacroTable {
    fn lookup(&self, path: &[String], ns: Option<&str>) -> Option<&MacroDecl> {
        if path.len() == 1 {
            if let Some(ns) = ns {
                if let Some(m) = self.macros.get(&format!("{ns}::{}", path[0])) {
                    return Some(m);
                }
            }
        }
        if let Some(m) = self.macros.get(&path.join("::")) {
            return Some(m);
        }
        if path.len() == 1 {
            let suffix = format!("::{}", path[0]);
            let mut hits = self.macros.iter().filter(|(k, _)| k.ends_with(&suffix));
            if let (Some((_, m)), None) = (hits.next(), hits.next()) {
                return Some(m);
            }
        }
        None
    }
}

pub fn expand_macros(items: Vec<NsItem>, diags: &mut Vec<Diagnostic>) -> Vec<NsItem> {
    let mut table = MacroTable {
        macros: IndexMap::new(),
    };
    let mut rest = Vec::new();
    for nsitem in items {
        match nsitem.item {
            Item::Macro(decl) => {
                let key = match &nsitem.namespace {
                    Some(ns) => format!("{ns}::{}", decl.name),
                    None => decl.name.clone(),
                };
                if table.macros.insert(key.clone(), decl).is_some() {
                    let pos = table.macros[&key].pos.clone();
                    diags.push(Diagnostic::error(
                        "E041",
                        pos,
                        format!("duplicate definition of '{key}'"),
                    ));
                }
            }
            item => rest.push(NsItem {
                namespace: nsitem.namespace,
                item,
            }),
        }
    }

    let mut hygiene = 0u32;
    for nsitem in &mut rest {
        let ns = nsitem.namespace.clone();
        match &mut nsitem.item {
            Item::Func(decl) => {
                if let Some(body) = &mut decl.body {
                    for stmt in body {
                        expand_stmt(stmt, &table, ns.as_deref(), 0, &mut hygiene, diags);
                    }
                }
            }
            Item::Global(decl) => {
                if let Some(init) = &mut decl.init {
                    expand_expr(init, &table, ns.as_deref(), 0, &mut hygiene, diags);
                }
            }
            _ => {}
        }
    }
    rest
}

fn expand_stmt(
    stmt: &mut Stmt,
    table: &MacroTable,
    ns: Option<&str>,
    depth: u32,
    hygiene: &mut u32,
    diags: &mut Vec<Diagnostic>,
) {
    match stmt {
        Stmt::Block(body, _) => {
            for s in body {
                expand_stmt(s, table, ns, depth, hygiene, diags);
            }
        }
        Stmt::If {
            cond, then, els, ..
        } => {
            expand_expr(cond, table, ns, depth, hygiene, diags);
            for s in then.iter_mut().chain(els.iter_mut().flatten()) {
                expand_stmt(s, table, ns, depth, hygiene, diags);
            }
        }
        Stmt::While { cond, body, .. } | Stmt::DoWhile { body, cond, .. } => {
            expand_expr(cond, table, ns, depth, hygiene, diags);
            for s in body {
                expand_stmt(s, table, ns, depth, hygiene, diags);
            }
        }
        Stmt::For {
            init,
            cond,
            step,
            body,
            ..
        } => {
            expand_stmt(init, table, ns, depth, hygiene, diags);
            expand_expr(cond, table, ns, depth, hygiene, diags);
            expand_expr(step, table, ns, depth, hygiene, diags);
            for s in body {
                expand_stmt(s, table, ns, depth, hygiene, diags);
            }
        }
        Stmt::Foreach { iter, body, .. } => {
            expand_expr(iter, table, ns, depth, hygiene, diags);
            for s in body {
                expand_stmt(s, table, ns, depth, hygiene, diags);
            }
        }
        Stmt::Return(Some(e), _) => expand_expr(e, table, ns, depth, hygiene, diags),
        Stmt::Return(None, _) => {}
        Stmt::Var { init, .. } => {
            if let Some(e) = init {
                expand_expr(e, table, ns, depth, hygiene, diags);
            }
        }
        Stmt::Expr(e) => expand_expr(e, table, ns, depth, hygiene, diags),
    }
}

fn expand_expr(
    expr: &mut Expr,
    table: &MacroTable,
    ns: Option<&str>,
    depth: u32,
    hygiene: &mut u32,
    diags: &mut Vec<Diagnostic>,
) {
    // Expand children first so macro arguments arrive fully expanded.
    for child in expr_children(expr) {
        expand_expr(child, table, ns, depth, hygiene, diags);
    }

    let Expr::Call(callee, args, pos) = expr else {
        return;
    };
    let Expr::Path(path, _) = callee.as_ref() else {
        return;
    };
    let Some(mac) = table.lookup(path, ns) else {
        return;
    };

    if depth >= MAX_EXPANSION_DEPTH {
        diags.push(Diagnostic::error(
            "E011",
            pos.clone(),
            format!("macro '{}' expands too deeply", mac.name),
        ));
        return;
    }
    if args.len() != mac.params.len() {
        diags.push(Diagnostic::error(
            "E011",
            pos.clone(),
            format!(
                "macro '{}' expects {} argument(s), got {}",
                mac.name,
                mac.params.len(),
                args.len()
            ),
        ));
        return;
    }

    let mut map: IndexMap<String, Expr> = IndexMap::new();
    for (param, arg) in mac.params.iter().zip(args.iter()) {
        map.insert(param.clone(), arg.clone());
    }

    // Rename lambda binders in the body that would capture identifiers free
    // in the arguments.
    let mut free = IndexSet::new();
    for arg in args.iter() {
        collect_free_idents(arg, &mut IndexSet::new(), &mut free);
    }
    let mut body = mac.body.clone();
    rename_colliding_binders(&mut body, &free, hygiene);

    substitute(&mut body, &map);
    expand_expr(&mut body, table, ns, depth + 1, hygiene, diags);
    *expr = body;
}

/// Replace parameter identifiers with argument sub-trees. Binders inside the
/// body (lambda parameters) shadow macro parameters of the same name.
fn substitute(expr: &mut Expr, map: &IndexMap<String, Expr>) {
    match expr {
        Expr::Path(path, _) if path.len() == 1 => {
            if let Some(arg) = map.get(&path[0]) {
                *expr = arg.clone();
            }
        }
        Expr::Lambda(params, body, _) => {
            let mut inner = map.clone();
            for p in params.iter() {
                inner.shift_remove(&p.name);
            }
            for stmt in body {
                substitute_stmt(stmt, &inner);
            }
        }
        _ => {
            for child in expr_children(expr) {
                substitute(child, map);
            }
        }
    }
}

fn substitute_stmt(stmt: &mut Stmt, map: &IndexMap<String, Expr>) {
    visit_stmt_exprs(stmt, &mut |e| substitute(e, map));
}

fn rename_colliding_binders(expr: &mut Expr, free: &IndexSet<String>, hygiene: &mut u32) {
    if let Expr::Lambda(params, body, _) = expr {
        for p in params.iter_mut() {
            if free.contains(&p.name) {
                let fresh = format!("{}__h{}", p.name, *hygiene);
                *hygiene += 1;
                for stmt in body.iter_mut() {
                    visit_stmt_exprs(stmt, &mut |e| rename_ident(e, &p.name, &fresh));
                }
                p.name = fresh;
            }
        }
        // Lambdas nested in the body may carry colliding binders too.
        for stmt in body.iter_mut() {
            visit_stmt_exprs(stmt, &mut |e| rename_colliding_binders(e, free, hygiene));
        }
        return;
    }
    for child in expr_children(expr) {
        rename_colliding_binders(child, free, hygiene);
    }
}

fn rename_ident(expr: &mut Expr, from: &str, to: &str) {
    match expr {
        Expr::Path(path, _) if path.len() == 1 && path[0] == from => {
            path[0] = to.to_string();
        }
        Expr::Lambda(params, body, _) => {
            // An inner binder of the same name shadows the rename.
            if params.iter().any(|p| p.name == from) {
                return;
            }
            for stmt in body {
                visit_stmt_exprs(stmt, &mut |e| rename_ident(e, from, to));
            }
        }
        _ => {
            for child in expr_children(expr) {
                rename_ident(child, from, to);
            }
        }
    }
}

// ----------------------------------------------------------------------------
// Lambda lifting. Each `fnct(params){...}` expression becomes a fresh,
// uniquely named top-level function; the expression site is replaced by a
// reference to it. Lambdas only see their own parameters and globals; a
// free variable that names an enclosing local is E021.
// ----------------------------------------------------------------------------

pub fn lift_lambdas(items: Vec<NsItem>, diags: &mut Vec<Diagnostic>) -> Vec<NsItem> {
    let mut lifter = Lifter {
        counter: 0,
        lifted: Vec::new(),
        diags,
    };
    let mut out = Vec::new();
    for mut nsitem in items {
        if let Item::Func(decl) = &mut nsitem.item {
            if let Some(body) = &mut decl.body {
                let mut visible: Vec<IndexSet<String>> = vec![IndexSet::new()];
                for p in &decl.params {
                    visible[0].insert(p.name.clone());
                }
                for stmt in body.iter_mut() {
                    lifter.lift_stmt(stmt, &mut visible);
                }
            }
        }
        out.push(nsitem);
    }
    out.extend(lifter.lifted);
    out
}

struct Lifter<'d> {
    counter: u32,
    lifted: Vec<NsItem>,
    diags: &'d mut Vec<Diagnostic>,
}

impl<'d> Lifter<'d> {
    fn lift_stmt(&mut self, stmt: &mut Stmt, visible: &mut Vec<IndexSet<String>>) {
        match stmt {
            Stmt::Block(body, _) => {
                visible.push(IndexSet::new());
                for s in body {
                    self.lift_stmt(s, visible);
                }
                visible.pop();
            }
            Stmt::If {
                cond, then, els, ..
            } => {
                self.lift_expr(cond, visible);
                visible.push(IndexSet::new());
                for s in then {
                    self.lift_stmt(s, visible);
                }
                visible.pop();
                if let Some(els) = els {
                    visible.push(IndexSet::new());
                    for s in els {
                        self.lift_stmt(s, visible);
                    }
                    visible.pop();
                }
            }
            Stmt::While { cond, body, .. } | Stmt::DoWhile { cond, body, .. } => {
                self.lift_expr(cond, visible);
                visible.push(IndexSet::new());
                for s in body {
                    self.lift_stmt(s, visible);
                }
                visible.pop();
            }
            Stmt::For {
                init,
                cond,
                step,
                body,
                ..
            } => {
                visible.push(IndexSet::new());
                self.lift_stmt(init, visible);
                self.lift_expr(cond, visible);
                self.lift_expr(step, visible);
                for s in body {
                    self.lift_stmt(s, visible);
                }
                visible.pop();
            }
            Stmt::Foreach {
                index,
                value,
                iter,
                body,
                ..
            } => {
                self.lift_expr(iter, visible);
                visible.push(IndexSet::new());
                let top = visible.last_mut().unwrap();
                top.insert(index.clone());
                top.insert(value.clone());
                for s in body {
                    self.lift_stmt(s, visible);
                }
                visible.pop();
            }
            Stmt::Return(Some(e), _) => self.lift_expr(e, visible),
            Stmt::Return(None, _) => {}
            Stmt::Var { name, init, .. } => {
                if let Some(e) = init {
                    self.lift_expr(e, visible);
                }
                visible.last_mut().unwrap().insert(name.clone());
            }
            Stmt::Expr(e) => self.lift_expr(e, visible),
        }
    }

    fn lift_expr(&mut self, expr: &mut Expr, visible: &mut Vec<IndexSet<String>>) {
        if let Expr::Lambda(params, body, pos) = expr {
            let pos = pos.clone();
            // Lift nested lambdas first; they only see this lambda's scope.
            let mut inner: Vec<IndexSet<String>> = vec![IndexSet::new()];
            for p in params.iter() {
                inner[0].insert(p.name.clone());
            }
            for stmt in body.iter_mut() {
                self.lift_stmt(stmt, &mut inner);
            }

            // Enclosing-scope captures are rejected.
            let mut bound: IndexSet<String> = params.iter().map(|p| p.name.clone()).collect();
            let mut free = IndexSet::new();
            for stmt in body.iter() {
                collect_free_stmt(stmt, &mut bound, &mut free);
            }
            for name in &free {
                if visible.iter().any(|scope| scope.contains(name)) {
                    self.diags.push(Diagnostic::error(
                        "E021",
                        pos.clone(),
                        format!(
                            "lambda captures enclosing local '{name}'; pass it as a parameter"
                        ),
                    ));
                }
            }

            let name = format!("__c5_lambda_{}", self.counter);
            self.counter += 1;
            let has_value_return = body.iter().any(stmt_returns_value);
            let ret = if has_value_return {
                TypeExpr::Int {
                    width: 64,
                    signed: true,
                }
            } else {
                TypeExpr::Void
            };
            let decl = FuncDecl {
                name: name.clone(),
                ret,
                params: std::mem::take(params),
                varargs: false,
                body: Some(std::mem::take(body)),
                pos: pos.clone(),
            };
            self.lifted.push(NsItem {
                namespace: None,
                item: Item::Func(decl),
            });
            *expr = Expr::Path(vec![name], pos.clone());
            return;
        }
        for child in expr_children(expr) {
            self.lift_expr(child, visible);
        }
    }
}

fn stmt_returns_value(stmt: &Stmt) -> bool {
    match stmt {
        Stmt::Return(Some(_), _) => true,
        Stmt::Return(None, _) => false,
        Stmt::Block(body, _) => body.iter().any(stmt_returns_value),
        Stmt::If { then, els, .. } => {
            then.iter().any(stmt_returns_value)
                || els.as_ref().map_or(false, |e| e.iter().any(stmt_returns_value))
        }
        Stmt::While { body, .. } | Stmt::DoWhile { body, .. } => {
            body.iter().any(stmt_returns_value)
        }
        Stmt::For { body, .. } | Stmt::Foreach { body, .. } => {
            body.iter().any(stmt_returns_value)
        }
        _ => false,
    }
}

// ----------------------------------------------------------------------------
// Shared AST walking helpers
// ----------------------------------------------------------------------------

/// Mutable references to the direct sub-expressions of `expr`. Lambda bodies
/// are intentionally excluded; the callers above handle binders themselves.
fn expr_children(expr: &mut Expr) -> Vec<&mut Expr> {
    match expr {
        Expr::Unary(_, e, _) | Expr::Cast(_, e, _) | Expr::CStr(e, _) | Expr::Member(e, _, _)
        | Expr::Arrow(e, _, _) => vec![e.as_mut()],
        Expr::Binary(_, l, r, _) | Expr::Assign(l, r, _) | Expr::Index(l, r, _) => {
            vec![l.as_mut(), r.as_mut()]
        }
        Expr::Call(callee, args, _) => {
            let mut v = vec![callee.as_mut()];
            v.extend(args.iter_mut());
            v
        }
        Expr::ArrayLit(items, _) => items.iter_mut().collect(),
        _ => Vec::new(),
    }
}

fn visit_stmt_exprs(stmt: &mut Stmt, f: &mut impl FnMut(&mut Expr)) {
    match stmt {
        Stmt::Block(body, _) => {
            for s in body {
                visit_stmt_exprs(s, f);
            }
        }
        Stmt::If {
            cond, then, els, ..
        } => {
            f(cond);
            for s in then.iter_mut().chain(els.iter_mut().flatten()) {
                visit_stmt_exprs(s, f);
            }
        }
        Stmt::While { cond, body, .. } | Stmt::DoWhile { cond, body, .. } => {
            f(cond);
            for s in body {
                visit_stmt_exprs(s, f);
            }
        }
        Stmt::For {
            init,
            cond,
            step,
            body,
            ..
        } => {
            visit_stmt_exprs(init, f);
            f(cond);
            f(step);
            for s in body {
                visit_stmt_exprs(s, f);
            }
        }
        Stmt::Foreach { iter, body, .. } => {
            f(iter);
            for s in body {
                visit_stmt_exprs(s, f);
            }
        }
        Stmt::Return(Some(e), _) => f(e),
        Stmt::Return(None, _) => {}
        Stmt::Var { init, .. } => {
            if let Some(e) = init {
                f(e);
            }
        }
        Stmt::Expr(e) => f(e),
    }
}

fn collect_free_idents(expr: &Expr, bound: &mut IndexSet<String>, free: &mut IndexSet<String>) {
    match expr {
        Expr::Path(path, _) if path.len() == 1 => {
            if !bound.contains(&path[0]) {
                free.insert(path[0].clone());
            }
        }
        Expr::Lambda(params, body, _) => {
            let mut inner = bound.clone();
            inner.extend(params.iter().map(|p| p.name.clone()));
            for stmt in body {
                collect_free_stmt(stmt, &mut inner, free);
            }
        }
        Expr::Unary(_, e, _) | Expr::Cast(_, e, _) | Expr::CStr(e, _) | Expr::Member(e, _, _)
        | Expr::Arrow(e, _, _) => collect_free_idents(e, bound, free),
        Expr::Binary(_, l, r, _) | Expr::Assign(l, r, _) | Expr::Index(l, r, _) => {
            collect_free_idents(l, bound, free);
            collect_free_idents(r, bound, free);
        }
        Expr::Call(callee, args, _) => {
            collect_free_idents(callee, bound, free);
            for a in args {
                collect_free_idents(a, bound, free);
            }
        }
        Expr::ArrayLit(items, _) => {
            for i in items {
                collect_free_idents(i, bound, free);
            }
        }
        _ => {}
    }
}

fn collect_free_stmt(stmt: &Stmt, bound: &mut IndexSet<String>, free: &mut IndexSet<String>) {
    match stmt {
        Stmt::Block(body, _) => {
            let mut inner = bound.clone();
            for s in body {
                collect_free_stmt(s, &mut inner, free);
            }
        }
        Stmt::If {
            cond, then, els, ..
        } => {
            collect_free_idents(cond, bound, free);
            let mut inner = bound.clone();
            for s in then {
                collect_free_stmt(s, &mut inner, free);
            }
            if let Some(els) = els {
                let mut inner = bound.clone();
                for s in els {
                    collect_free_stmt(s, &mut inner, free);
                }
            }
        }
        Stmt::While { cond, body, .. } | Stmt::DoWhile { cond, body, .. } => {
            collect_free_idents(cond, bound, free);
            let mut inner = bound.clone();
            for s in body {
                collect_free_stmt(s, &mut inner, free);
            }
        }
        Stmt::For {
            init,
            cond,
            step,
            body,
            ..
        } => {
            let mut inner = bound.clone();
            collect_free_stmt(init, &mut inner, free);
            collect_free_idents(cond, &mut inner, free);
            collect_free_idents(step, &mut inner, free);
            for s in body {
                collect_free_stmt(s, &mut inner, free);
            }
        }
        Stmt::Foreach {
            index,
            value,
            iter,
            body,
            ..
        } => {
            collect_free_idents(iter, bound, free);
            let mut inner = bound.clone();
            inner.insert(index.clone());
            inner.insert(value.clone());
            for s in body {
                collect_free_stmt(s, &mut inner, free);
            }
        }
        Stmt::Return(Some(e), _) => collect_free_idents(e, bound, free),
        Stmt::Return(None, _) => {}
        Stmt::Var { name, init, .. } => {
            if let Some(e) = init {
                collect_free_idents(e, bound, free);
            }
            bound.insert(name.clone());
        }
        Stmt::Expr(e) => collect_free_idents(e, bound, free),
    }
}
