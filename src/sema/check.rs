use crate::ast::{BinOp, Expr, FuncDecl, Item, Stmt, UnaryOp};
use crate::error::Diagnostic;
use crate::include::NsItem;
use crate::sema::{fold, resolve_type, Analysis, FuncUnit, Resolved};
use crate::token::Pos;
use crate::types::Type;
use indexmap::{IndexMap, IndexSet};

/// Walk every function body: resolve identifiers, type expressions bottom-up,
/// enforce const/width/signedness rules, and rewrite local names to be unique
/// within their function so code generation can key frame slots by name.
pub fn check_units(
    items: Vec<NsItem>,
    analysis: &mut Analysis,
    diags: &mut Vec<Diagnostic>,
) -> Vec<FuncUnit> {
    check_globals(analysis, diags);
    let analysis: &Analysis = analysis;

    let mut units = Vec::new();
    for nsitem in items {
        let ns = nsitem.namespace;
        let Item::Func(mut decl) = nsitem.item else {
            continue;
        };
        if decl.body.is_none() {
            continue;
        }
        let qualified = match &ns {
            Some(ns) => format!("{ns}::{}", decl.name),
            None => decl.name.clone(),
        };
        let Some(sym) = analysis.funcs.get(&qualified) else {
            continue;
        };

        let mut checker = Checker {
            analysis,
            diags,
            ns: ns.clone(),
            ret: sym.ret.clone(),
            scopes: Vec::new(),
            locals: IndexMap::new(),
            used: IndexSet::new(),
            decl_pos: IndexMap::new(),
            rename: 0,
        };
        checker.check_func(&mut decl, &sym.params.clone());
        let locals = checker.finish();

        units.push(FuncUnit {
            name: qualified.clone(),
            linkage: sym.linkage.clone(),
            namespace: ns,
            locals,
            decl,
        });
    }
    units
}

/// Global initialisers must fold down to literals; they are emitted as data
/// directives, not code.
fn check_globals(analysis: &mut Analysis, diags: &mut Vec<Diagnostic>) {
    let keys: Vec<String> = analysis.globals.keys().cloned().collect();
    for key in keys {
        let (ty, pos, mut init) = {
            let sym = &mut analysis.globals[&key];
            (sym.ty.clone(), sym.pos.clone(), sym.init.take())
        };
        if ty == Type::Void {
            diags.push(Diagnostic::error(
                "E003",
                pos.clone(),
                format!("global '{key}' cannot have type void"),
            ));
        }
        if let Some(e) = &mut init {
            fold::fold_expr(e);
            check_literal_binding(e, &ty, diags);
            let constant = matches!(
                e,
                Expr::Int(_, _)
                    | Expr::Float(_, _)
                    | Expr::Char(_, _)
                    | Expr::Str(_, _)
                    | Expr::Unary(UnaryOp::Neg, _, _)
            );
            if !constant {
                diags.push(Diagnostic::error(
                    "E014",
                    e.pos().clone(),
                    format!("initialiser of global '{key}' must be a constant"),
                ));
            }
        }
        analysis.globals[&key].init = init;
    }
}

/// Integer literals bound to a typed slot must satisfy its signed or
/// unsigned range (E023); a 64-bit float literal bound to a 32-bit float
/// slot narrows with W006.
fn check_literal_binding(expr: &Expr, target: &Type, diags: &mut Vec<Diagnostic>) {
    if let Type::Int { width, signed } = target {
        if let Some(value) = fold::literal_int(expr) {
            let (lo, hi) = if *signed {
                (-(1i128 << (width - 1)), (1i128 << (width - 1)) - 1)
            } else {
                (0, (1i128 << width) - 1)
            };
            if value < lo || value > hi {
                diags.push(Diagnostic::error(
                    "E023",
                    expr.pos().clone(),
                    format!("literal {value} out of range [{lo},{hi}] for {target}"),
                ));
            }
        }
    }
    if let (Type::Float { width: 32 }, Expr::Float(_, pos)) = (target, expr) {
        diags.push(Diagnostic::warning(
            "W006",
            pos.clone(),
            "64-bit float literal narrowed to float<32>",
        ));
    }
}

struct Local {
    unique: String,
    ty: Type,
    is_const: bool,
}

struct Checker<'a> {
    analysis: &'a Analysis,
    diags: &'a mut Vec<Diagnostic>,
    ns: Option<String>,
    ret: Type,
    scopes: Vec<IndexMap<String, Local>>,
    /// Unique local name -> type, in declaration order (parameters first).
    locals: IndexMap<String, Type>,
    used: IndexSet<String>,
    decl_pos: IndexMap<String, Pos>,
    rename: u32,
}

impl<'a> Checker<'a> {
    fn error(&mut self, code: &'static str, pos: &Pos, message: impl Into<String>) {
        self.diags.push(Diagnostic::error(code, pos.clone(), message));
    }

    fn check_func(&mut self, decl: &mut FuncDecl, params: &[(String, Type)]) {
        let mut top = IndexMap::new();
        for (name, ty) in params {
            top.insert(
                name.clone(),
                Local {
                    unique: name.clone(),
                    ty: ty.clone(),
                    is_const: false,
                },
            );
            self.locals.insert(name.clone(), ty.clone());
        }
        self.scopes.push(top);
        let body = decl.body.as_mut().unwrap();
        for stmt in body {
            self.check_stmt(stmt);
        }
        self.scopes.pop();
    }

    fn finish(self) -> IndexMap<String, Type> {
        // Unused-local warnings, parameters and loop variables excluded.
        for (unique, pos) in &self.decl_pos {
            if !self.used.contains(unique) {
                let name = unique.split('.').next().unwrap();
                self.diags.push(Diagnostic::warning(
                    "W001",
                    pos.clone(),
                    format!("variable '{name}' is never used"),
                ));
            }
        }
        self.locals
    }

    fn resolve_ty(&mut self, te: &crate::ast::TypeExpr, pos: &Pos) -> Type {
        resolve_type(te, self.ns.as_deref(), self.analysis, pos, self.diags)
    }

    // ------------------------------------------------------------------
    // Scope handling
    // ------------------------------------------------------------------

    fn declare(&mut self, name: &str, ty: Type, is_const: bool, pos: &Pos, warn: bool) -> String {
        if self.scopes.last().unwrap().contains_key(name) {
            self.error("E041", pos, format!("duplicate definition of '{name}'"));
        }
        let unique = if self.locals.contains_key(name) {
            self.rename += 1;
            format!("{name}.{}", self.rename)
        } else {
            name.to_string()
        };
        self.locals.insert(unique.clone(), ty.clone());
        if warn {
            self.decl_pos.insert(unique.clone(), pos.clone());
        }
        self.scopes.last_mut().unwrap().insert(
            name.to_string(),
            Local {
                unique: unique.clone(),
                ty,
                is_const,
            },
        );
        unique
    }

    fn find_local(&self, name: &str) -> Option<&Local> {
        self.scopes.iter().rev().find_map(|s| s.get(name))
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn check_block(&mut self, body: &mut Vec<Stmt>) {
        self.scopes.push(IndexMap::new());
        for stmt in body {
            self.check_stmt(stmt);
        }
        self.scopes.pop();
    }

    fn check_stmt(&mut self, stmt: &mut Stmt) {
        match stmt {
            Stmt::Block(body, _) => self.check_block(body),
            Stmt::If {
                cond, then, els, ..
            } => {
                self.expect_scalar(cond);
                self.check_block(then);
                if let Some(els) = els {
                    self.check_block(els);
                }
            }
            Stmt::While { cond, body, .. } | Stmt::DoWhile { cond, body, .. } => {
                self.expect_scalar(cond);
                self.check_block(body);
            }
            Stmt::For {
                init,
                cond,
                step,
                body,
                ..
            } => {
                self.scopes.push(IndexMap::new());
                self.check_stmt(init);
                self.expect_scalar(cond);
                self.type_expr(step);
                for s in body {
                    self.check_stmt(s);
                }
                self.scopes.pop();
            }
            Stmt::Foreach {
                index,
                value,
                iter,
                body,
                pos,
            } => {
                let iter_ty = self.type_expr(iter);
                let elem = match &iter_ty {
                    Type::Array(elem) => (**elem).clone(),
                    _ => {
                        let pos = iter.pos().clone();
                        self.error(
                            "E014",
                            &pos,
                            format!("foreach needs an array<T>, got {iter_ty}"),
                        );
                        Type::int(64)
                    }
                };
                self.scopes.push(IndexMap::new());
                let iu = self.declare(index, Type::int(64), false, pos, false);
                let vu = self.declare(value, elem, false, pos, false);
                self.used.insert(iu.clone());
                self.used.insert(vu.clone());
                *index = iu;
                *value = vu;
                for s in body {
                    self.check_stmt(s);
                }
                self.scopes.pop();
            }
            Stmt::Return(expr, pos) => {
                let ret = self.ret.clone();
                match (expr, ret) {
                    (Some(e), Type::Void) => {
                        self.type_expr(e);
                        let pos = pos.clone();
                        self.error("E014", &pos, "void function returns a value");
                    }
                    (None, ret) if ret != Type::Void => {
                        let pos = pos.clone();
                        self.error("E014", &pos, format!("missing return value of type {ret}"));
                    }
                    (Some(e), ret) => self.check_init(e, &ret),
                    (None, _) => {}
                }
            }
            Stmt::Var {
                name,
                ty,
                is_const,
                init,
                pos,
            } => {
                let resolved = self.resolve_ty(ty, pos);
                if resolved == Type::Void {
                    let pos = pos.clone();
                    self.error("E003", &pos, format!("variable '{name}' cannot be void"));
                }
                if let Some(e) = init {
                    self.check_init(e, &resolved);
                }
                let unique = self.declare(name, resolved, *is_const, pos, true);
                *name = unique;
            }
            Stmt::Expr(e) => {
                self.type_expr(e);
            }
        }
    }

    fn expect_scalar(&mut self, e: &mut Expr) {
        let ty = self.type_expr(e);
        if !ty.is_scalar() {
            let pos = e.pos().clone();
            self.error("E014", &pos, format!("condition must be scalar, got {ty}"));
        }
    }

    /// Type an initialiser or right-hand side against an expected type.
    /// Array literals are only legal here.
    fn check_init(&mut self, e: &mut Expr, target: &Type) {
        if let Expr::ArrayLit(items, pos) = e {
            match target {
                Type::Array(elem) => {
                    let elem = (**elem).clone();
                    for item in items {
                        self.check_init(item, &elem);
                    }
                }
                Type::Struct(key) => {
                    let fields: Vec<Type> = self.analysis.types.structs[key]
                        .fields
                        .values()
                        .map(|f| f.ty.clone())
                        .collect();
                    if fields.len() != items.len() {
                        let pos = pos.clone();
                        self.error(
                            "E011",
                            &pos,
                            format!(
                                "initialiser for '{key}' expects {} value(s), got {}",
                                fields.len(),
                                items.len()
                            ),
                        );
                    }
                    for (item, fty) in items.iter_mut().zip(fields) {
                        self.check_init(item, &fty);
                    }
                }
                _ => {
                    let pos = pos.clone();
                    self.error("E014", &pos, "array literal not allowed here");
                    for item in items {
                        self.type_expr(item);
                    }
                }
            }
            return;
        }

        let ty = self.type_expr(e);
        check_literal_binding(e, target, self.diags);

        // A union value must be cast down to a variant before use in a
        // variant-typed slot; there is no runtime tag to do it implicitly.
        if matches!(ty, Type::Union(_)) && !matches!(target, Type::Union(_)) {
            let pos = e.pos().clone();
            self.error(
                "E022",
                &pos,
                format!("cannot use {ty} where {target} is required without a cast"),
            );
            return;
        }

        if !self.compatible_strict(target, &ty, e) {
            let pos = e.pos().clone();
            self.error("E014", &pos, format!("expected {target}, got {ty}"));
        }
    }

    /// Implicit conversion rules: integer widths interconvert with
    /// sign-driven extension, pointers match on pointee or void*, floats and
    /// integers never mix without a cast (except literal binding).
    fn compatible(&self, l: &Type, r: &Type) -> bool {
        if l == r {
            return true;
        }
        match (l, r) {
            (Type::Int { .. } | Type::Char | Type::Enum(_), Type::Int { .. } | Type::Char | Type::Enum(_)) => true,
            (Type::Float { .. }, Type::Float { .. }) => true,
            // int literals bind to float slots; the checker sees the literal
            (Type::Float { .. }, Type::Int { .. }) => true,
            (
                Type::Ptr {
                    pointee: lp,
                    pointee_const: lc,
                },
                Type::Ptr {
                    pointee: rp,
                    pointee_const: rc,
                },
            ) => {
                // Assigning away const-ness needs a cast.
                if *rc && !lc {
                    return false;
                }
                **lp == Type::Void || **rp == Type::Void || lp == rp
            }
            (Type::Union(key), r) => self
                .analysis
                .types
                .unions
                .get(key)
                .map_or(false, |u| u.variants.contains(r)),
            (Type::Int { width: 64, .. }, Type::Func(_, _)) => true,
            (Type::Func(_, _), Type::Func(_, _)) => true,
            _ => false,
        }
    }

    fn compatible_strict(&self, l: &Type, r: &Type, rhs: &Expr) -> bool {
        // Float slots accept only float expressions unless the rhs is an
        // integer literal.
        if let (Type::Float { .. }, Type::Int { .. }) = (l, r) {
            return fold::literal_int(rhs).is_some();
        }
        self.compatible(l, r)
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    fn type_expr(&mut self, e: &mut Expr) -> Type {
        match e {
            Expr::Int(_, _) => Type::int(64),
            Expr::Float(_, _) => Type::Float { width: 64 },
            Expr::Char(_, _) => Type::Char,
            Expr::Str(_, _) => Type::Str,
            Expr::ArrayLit(items, pos) => {
                let pos = pos.clone();
                self.error("E014", &pos, "array literal only allowed in initialisers");
                for item in items {
                    self.type_expr(item);
                }
                Type::int(64)
            }
            Expr::Path(path, pos) => {
                if path.len() == 1 {
                    if let Some(local) = self.find_local(&path[0]) {
                        let unique = local.unique.clone();
                        let ty = local.ty.clone();
                        self.used.insert(unique.clone());
                        path[0] = unique;
                        return ty;
                    }
                }
                match self.analysis.lookup_value(path, self.ns.as_deref()) {
                    Some(Resolved::Global(_, sym)) => sym.ty.clone(),
                    Some(Resolved::Func(_, sym)) => Type::Func(
                        sym.params.iter().map(|(_, t)| t.clone()).collect(),
                        Box::new(sym.ret.clone()),
                    ),
                    Some(Resolved::EnumConst(_)) => Type::int(32),
                    None => {
                        let pos = pos.clone();
                        let name = path.join("::");
                        self.error("E005", &pos, format!("undefined symbol '{name}'"));
                        Type::int(64)
                    }
                }
            }
            Expr::Unary(op, inner, pos) => {
                let op = *op;
                let pos = pos.clone();
                self.type_unary(op, inner, &pos)
            }
            Expr::Binary(op, l, r, pos) => {
                let op = *op;
                let pos = pos.clone();
                self.type_binary(op, l, r, &pos)
            }
            Expr::Assign(l, r, pos) => {
                let pos = pos.clone();
                self.type_assign(l, r, &pos)
            }
            Expr::Call(callee, args, pos) => {
                let pos = pos.clone();
                self.type_call(callee, args, &pos)
            }
            Expr::Index(base, index, pos) => {
                let base_ty = self.type_expr(base);
                let idx_ty = self.type_expr(index);
                if !idx_ty.is_integer() {
                    let ipos = index.pos().clone();
                    self.error("E014", &ipos, format!("index must be integer, got {idx_ty}"));
                }
                match base_ty {
                    Type::Array(elem) => *elem,
                    Type::Str => Type::Char,
                    Type::Ptr { pointee, .. } => *pointee,
                    other => {
                        let pos = pos.clone();
                        self.error("E014", &pos, format!("cannot index into {other}"));
                        Type::int(64)
                    }
                }
            }
            Expr::Member(base, field, pos) => {
                let base_ty = self.type_expr(base);
                let field = field.clone();
                let pos = pos.clone();
                self.type_member(&base_ty, &field, &pos, false)
            }
            Expr::Arrow(base, field, pos) => {
                let base_ty = self.type_expr(base);
                let field = field.clone();
                let pos = pos.clone();
                match base_ty {
                    Type::Ptr { pointee, .. } => self.type_member(&pointee, &field, &pos, true),
                    other => {
                        self.error(
                            "E012",
                            &pos,
                            format!("'->' needs a pointer to struct, got {other}"),
                        );
                        Type::int(64)
                    }
                }
            }
            Expr::Cast(te, inner, pos) => {
                let pos = pos.clone();
                let te = te.clone();
                let target = self.resolve_ty(&te, &pos);
                let source = self.type_expr(inner);
                if !cast_allowed(&target, &source, &self.analysis.types) {
                    self.error("E014", &pos, format!("cannot cast {source} to {target}"));
                }
                target
            }
            Expr::CStr(inner, pos) => {
                let ty = self.type_expr(inner);
                if ty != Type::Str {
                    let pos = pos.clone();
                    self.error("E014", &pos, format!("c_str expects a string, got {ty}"));
                }
                Type::ptr(Type::Char)
            }
            Expr::Lambda(_, _, pos) => {
                // Lambdas are lifted before checking; reaching one here means
                // it sat in an illegal position (e.g. a global initialiser).
                let pos = pos.clone();
                self.error("E014", &pos, "lambda not allowed here");
                Type::int(64)
            }
        }
    }

    fn type_unary(&mut self, op: UnaryOp, inner: &mut Expr, pos: &Pos) -> Type {
        match op {
            UnaryOp::Neg => {
                let ty = self.type_expr(inner);
                if !ty.is_integer() && !ty.is_float() {
                    self.error("E014", pos, format!("cannot negate {ty}"));
                }
                ty
            }
            UnaryOp::Not => {
                self.type_expr(inner);
                Type::int(64)
            }
            UnaryOp::BitNot => {
                let ty = self.type_expr(inner);
                if !ty.is_integer() {
                    self.error("E014", pos, format!("'~' needs an integer, got {ty}"));
                }
                ty
            }
            UnaryOp::Deref => {
                let ty = self.type_expr(inner);
                match ty {
                    Type::Ptr { pointee, .. } => *pointee,
                    other => {
                        self.error("E013", pos, format!("cannot dereference {other}"));
                        Type::int(64)
                    }
                }
            }
            UnaryOp::Addr => {
                if !is_lvalue(inner) {
                    self.error("E019", pos, "cannot take the address of this expression");
                }
                let is_const = self.const_root(inner);
                let ty = self.type_expr(inner);
                Type::Ptr {
                    pointee: Box::new(ty),
                    pointee_const: is_const,
                }
            }
            UnaryOp::PreInc => {
                if !is_lvalue(inner) {
                    self.error("E019", pos, "'++' needs an assignable target");
                } else if self.const_root(inner) {
                    self.error("E042", pos, "cannot modify a const value");
                }
                let ty = self.type_expr(inner);
                if !ty.is_integer() && !ty.is_pointer() {
                    self.error("E014", pos, format!("'++' needs an integer, got {ty}"));
                }
                ty
            }
        }
    }

    fn type_binary(&mut self, op: BinOp, l: &mut Expr, r: &mut Expr, pos: &Pos) -> Type {
        let lt = self.type_expr(l);
        let rt = self.type_expr(r);

        // Static division by zero.
        if matches!(op, BinOp::Div | BinOp::Mod) && fold::literal_int(r) == Some(0) {
            self.error("E004", pos, "division by zero");
        }

        // Strings accept only + (concat) and - (remove-first-occurrence).
        if lt == Type::Str || rt == Type::Str {
            if lt == Type::Str && rt == Type::Str && matches!(op, BinOp::Add | BinOp::Sub) {
                return Type::Str;
            }
            if matches!(op, BinOp::Eq | BinOp::Ne) && lt == rt {
                return Type::int(64);
            }
            self.error(
                "E017",
                pos,
                format!("operator '{}' not defined for strings", op.symbol()),
            );
            return Type::Str;
        }

        // Pointer arithmetic: p +/- n scales by element size; p - p of the
        // same pointee divides by it.
        match (&lt, &rt) {
            (Type::Ptr { .. }, t) if t.is_integer() && matches!(op, BinOp::Add | BinOp::Sub) => {
                return lt;
            }
            (t, Type::Ptr { .. }) if t.is_integer() && op == BinOp::Add => {
                return rt;
            }
            (Type::Ptr { pointee: lp, .. }, Type::Ptr { pointee: rp, .. }) => {
                if op == BinOp::Sub && lp == rp {
                    return Type::int(64);
                }
                if matches!(op, BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge) {
                    return Type::int(64);
                }
                self.error("E014", pos, "invalid pointer operation");
                return Type::int(64);
            }
            _ => {}
        }

        match op {
            BinOp::And | BinOp::Or => Type::int(64),
            BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
                if !self.numeric_pair(&lt, &rt) {
                    self.error(
                        "E014",
                        pos,
                        format!("cannot compare {lt} with {rt} without a cast"),
                    );
                }
                Type::int(64)
            }
            BinOp::Shl | BinOp::Shr | BinOp::BitAnd | BinOp::BitOr | BinOp::BitXor => {
                if !lt.is_integer() || !rt.is_integer() {
                    self.error("E014", pos, format!("bitwise operator needs integers, got {lt} and {rt}"));
                }
                lt
            }
            _ => {
                if lt.is_float() && rt.is_float() {
                    let width = float_width(&lt).max(float_width(&rt));
                    Type::Float { width }
                } else if lt.is_integer() && rt.is_integer() {
                    self.merge_ints(&lt, &rt)
                } else if (lt.is_float() && fold::literal_int(r).is_some())
                    || (rt.is_float() && fold::literal_int(l).is_some())
                {
                    // Literal binding lets an integer literal join a float op.
                    if lt.is_float() {
                        lt
                    } else {
                        rt
                    }
                } else {
                    self.error(
                        "E014",
                        pos,
                        format!("operands {lt} and {rt} need an explicit cast"),
                    );
                    Type::int(64)
                }
            }
        }
    }

    fn numeric_pair(&self, l: &Type, r: &Type) -> bool {
        (l.is_integer() && r.is_integer()) || (l.is_float() && r.is_float())
    }

    /// Integer result widening: widest width wins, unsignedness is sticky.
    fn merge_ints(&self, l: &Type, r: &Type) -> Type {
        let width = int_width(l).max(int_width(r));
        let signed = !(l.is_unsigned() || r.is_unsigned());
        Type::Int { width, signed }
    }

    fn type_assign(&mut self, l: &mut Expr, r: &mut Expr, pos: &Pos) -> Type {
        if !is_lvalue(l) {
            self.error("E019", pos, "left side of assignment is not assignable");
            self.type_expr(r);
            return self.type_expr(l);
        }
        if self.const_root(l) {
            self.error("E042", pos, "cannot assign to a const value");
        }
        let l_ty = match l {
            Expr::Unary(UnaryOp::Deref, inner, dpos) => {
                let inner_ty = self.type_expr(inner);
                match inner_ty {
                    Type::Ptr {
                        pointee,
                        pointee_const,
                    } => {
                        if pointee_const {
                            let dpos = dpos.clone();
                            self.error("E042", &dpos, "cannot assign through a pointer to const");
                        }
                        *pointee
                    }
                    other => {
                        let dpos = dpos.clone();
                        self.error("E013", &dpos, format!("cannot dereference {other}"));
                        Type::int(64)
                    }
                }
            }
            _ => self.type_expr(l),
        };
        self.peek_init(r, &l_ty);
        l_ty
    }

    fn peek_init(&mut self, r: &mut Expr, target: &Type) -> Type {
        if matches!(r, Expr::ArrayLit(_, _)) {
            // Array literals appear in initialisers only.
            let pos = r.pos().clone();
            self.error("E014", &pos, "array literal only allowed in initialisers");
            return target.clone();
        }
        let ty = self.type_expr(r);
        check_literal_binding(r, target, self.diags);
        if matches!(ty, Type::Union(_)) && !matches!(target, Type::Union(_)) {
            let pos = r.pos().clone();
            self.error(
                "E022",
                &pos,
                format!("cannot use {ty} where {target} is required without a cast"),
            );
        } else if !self.compatible_strict(target, &ty, r) {
            let pos = r.pos().clone();
            self.error("E014", &pos, format!("expected {target}, got {ty}"));
        }
        ty
    }

    fn type_member(&mut self, base: &Type, field: &str, pos: &Pos, through_ptr: bool) -> Type {
        let key = match base {
            Type::Struct(key) => key.clone(),
            // One implicit indirection: struct values travel as pointers.
            Type::Ptr { pointee, .. } if !through_ptr => match pointee.as_ref() {
                Type::Struct(key) => key.clone(),
                other => {
                    self.error("E012", pos, format!("no member '{field}' on {other}"));
                    return Type::int(64);
                }
            },
            Type::Union(_) => {
                self.error(
                    "E022",
                    pos,
                    format!("cast the union to a variant before accessing '{field}'"),
                );
                return Type::int(64);
            }
            other => {
                self.error("E012", pos, format!("no member '{field}' on {other}"));
                return Type::int(64);
            }
        };
        match self.analysis.types.structs[&key].fields.get(field) {
            Some(f) => f.ty.clone(),
            None => {
                self.error("E012", pos, format!("'{key}' has no field '{field}'"));
                Type::int(64)
            }
        }
    }

    fn type_call(&mut self, callee: &mut Expr, args: &mut [Expr], pos: &Pos) -> Type {
        // array<T> method calls: a.push(v), a.pop(), a.length(), a.clear()
        if let Expr::Member(base, method, _) = callee {
            let base_ty = self.type_expr(base);
            if let Type::Array(elem) = base_ty {
                return self.type_array_method(method, &elem, args, pos);
            }
            // Fall through is not meaningful for other member calls.
            self.error(
                "E012",
                pos,
                format!("'{method}' is not a method of {base_ty}"),
            );
            for a in args {
                self.type_expr(a);
            }
            return Type::int(64);
        }

        // Direct call of a named function, or an indirect call through a
        // function-typed value.
        if let Expr::Path(path, _) = callee {
            if !(path.len() == 1 && self.find_local(&path[0]).is_some()) {
                if let Some(Resolved::Func(_, sym)) = self
                    .analysis
                    .lookup_value(path, self.ns.as_deref())
                {
                    let params: Vec<Type> = sym.params.iter().map(|(_, t)| t.clone()).collect();
                    let ret = sym.ret.clone();
                    let varargs = sym.varargs;
                    let name = path.join("::");
                    self.check_args(&name, &params, varargs, args, pos);
                    return ret;
                }
            }
        }

        let callee_ty = self.type_expr(callee);
        match callee_ty {
            Type::Func(params, ret) => {
                self.check_args("function value", &params, false, args, pos);
                *ret
            }
            // Untyped function value in an integer slot: arguments are
            // unchecked, the result defaults to int.
            ty if ty.is_integer() => {
                for a in args.iter_mut() {
                    self.type_expr(a);
                }
                Type::int(64)
            }
            other => {
                self.error("E006", pos, format!("{other} is not callable"));
                for a in args.iter_mut() {
                    self.type_expr(a);
                }
                Type::int(64)
            }
        }
    }

    fn check_args(
        &mut self,
        name: &str,
        params: &[Type],
        varargs: bool,
        args: &mut [Expr],
        pos: &Pos,
    ) {
        if varargs {
            if args.len() < params.len() {
                self.error(
                    "E011",
                    pos,
                    format!("'{name}' expects at least {} argument(s)", params.len()),
                );
            }
        } else if args.len() != params.len() {
            self.error(
                "E011",
                pos,
                format!(
                    "'{name}' expects {} argument(s), got {}",
                    params.len(),
                    args.len()
                ),
            );
        }
        for (arg, param) in args.iter_mut().zip(params.iter()) {
            let ty = self.type_expr(arg);
            check_literal_binding(arg, param, self.diags);
            if !self.compatible_strict(param, &ty, arg) {
                let apos = arg.pos().clone();
                self.error(
                    "E014",
                    &apos,
                    format!("argument of type {ty} where {param} is expected"),
                );
            }
        }
        // Extra variadic arguments are typed but unchecked.
        for arg in args.iter_mut().skip(params.len()) {
            self.type_expr(arg);
        }
    }

    fn check_method_arity(&mut self, method: &str, want: usize, got: usize, pos: &Pos) {
        if got != want {
            self.error(
                "E011",
                pos,
                format!("'{method}' expects {want} argument(s), got {got}"),
            );
        }
    }

    fn type_array_method(
        &mut self,
        method: &str,
        elem: &Type,
        args: &mut [Expr],
        pos: &Pos,
    ) -> Type {
        let got = args.len();
        match method {
            "push" => {
                self.check_method_arity(method, 1, got, pos);
                if let Some(arg) = args.first_mut() {
                    if matches!(arg, Expr::ArrayLit(_, _)) && matches!(elem, Type::Struct(_)) {
                        let elem = elem.clone();
                        self.check_init(arg, &elem);
                    } else {
                        let ty = self.type_expr(arg);
                        check_literal_binding(arg, elem, self.diags);
                        if !self.compatible_strict(elem, &ty, arg) {
                            let apos = arg.pos().clone();
                            self.error(
                                "E014",
                                &apos,
                                format!("cannot push {ty} into array<{elem}>"),
                            );
                        }
                    }
                }
                Type::Void
            }
            "pop" => {
                self.check_method_arity(method, 0, got, pos);
                elem.clone()
            }
            "length" => {
                self.check_method_arity(method, 0, got, pos);
                Type::int(64)
            }
            "clear" => {
                self.check_method_arity(method, 0, got, pos);
                Type::Void
            }
            _ => {
                self.error("E012", pos, format!("array<T> has no method '{method}'"));
                Type::int(64)
            }
        }
    }

    /// Does the lvalue chain of `e` root at a const symbol?
    fn const_root(&self, e: &Expr) -> bool {
        match e {
            Expr::Path(path, _) => {
                if path.len() == 1 {
                    if let Some(local) = self.find_local(&path[0]) {
                        return local.is_const;
                    }
                }
                match self.analysis.lookup_value(path, self.ns.as_deref()) {
                    Some(Resolved::Global(_, sym)) => sym.is_const,
                    _ => false,
                }
            }
            Expr::Member(base, _, _) | Expr::Index(base, _, _) => self.const_root(base),
            Expr::Unary(UnaryOp::Deref, inner, _) => match inner.as_ref() {
                Expr::Unary(UnaryOp::Addr, target, _) => self.const_root(target),
                _ => false,
            },
            _ => false,
        }
    }
}

fn is_lvalue(e: &Expr) -> bool {
    matches!(
        e,
        Expr::Path(_, _)
            | Expr::Index(_, _, _)
            | Expr::Member(_, _, _)
            | Expr::Arrow(_, _, _)
            | Expr::Unary(UnaryOp::Deref, _, _)
    )
}

fn int_width(ty: &Type) -> u32 {
    match ty {
        Type::Int { width, .. } => *width,
        Type::Char => 8,
        Type::Enum(_) => 32,
        _ => 64,
    }
}

fn float_width(ty: &Type) -> u32 {
    match ty {
        Type::Float { width } => *width,
        _ => 64,
    }
}

fn cast_allowed(target: &Type, source: &Type, types: &crate::types::TypeTable) -> bool {
    let numeric =
        |t: &Type| t.is_integer() || t.is_float();
    if numeric(target) && numeric(source) {
        return true;
    }
    match (target, source) {
        (Type::Ptr { .. }, Type::Ptr { .. }) => true,
        (Type::Ptr { .. }, Type::Int { width: 64, .. })
        | (Type::Int { width: 64, .. }, Type::Ptr { .. }) => true,
        (Type::Ptr { pointee, .. }, Type::Str) if **pointee == Type::Char => true,
        (Type::Str, Type::Ptr { pointee, .. }) if **pointee == Type::Char => true,
        // Union variant punning is the declared discrimination story;
        // scalars are accepted too since there is no runtime tag to check.
        (t, Type::Union(key)) => {
            t.is_scalar()
                || types
                    .unions
                    .get(key)
                    .map_or(false, |u| u.variants.contains(t))
        }
        (Type::Union(key), s) => {
            s.is_scalar()
                || types
                    .unions
                    .get(key)
                    .map_or(false, |u| u.variants.contains(s))
        }
        (Type::Int { width: 64, .. }, Type::Func(_, _)) => true,
        (Type::Func(_, _), Type::Int { width: 64, .. }) => true,
        _ => false,
    }
}
