use super::{Addr, CodeGen, INT_ARG_REGS, SSE_ARG_REGS};
use crate::ast::{BinOp, Expr, TypeExpr, UnaryOp};
use crate::sema::Resolved;
use crate::types::{AbiClass, Type};

enum CallTarget {
    Direct { label: String, plt: bool },
    /// Scratch slot holding the function address.
    Indirect(i32),
}

impl<'a> CodeGen<'a> {
    fn mov_imm(&mut self, value: u64) {
        if value > i32::MAX as u64 {
            self.emit(format!("movabs ${value}, %rax"));
        } else {
            self.emit(format!("mov ${value}, %rax"));
        }
    }

    fn spill(&mut self, ty: &Type) -> i32 {
        let slot = self.alloc_scratch();
        match ty {
            Type::Float { width: 32 } => self.emit(format!("movss %xmm0, {slot}(%rbp)")),
            Type::Float { .. } => self.emit(format!("movsd %xmm0, {slot}(%rbp)")),
            _ => self.emit(format!("movq %rax, {slot}(%rbp)")),
        }
        slot
    }

    fn reload(&mut self, slot: i32, ty: &Type) {
        match ty {
            Type::Float { width: 32 } => self.emit(format!("movss {slot}(%rbp), %xmm0")),
            Type::Float { .. } => self.emit(format!("movsd {slot}(%rbp), %xmm0")),
            _ => self.emit(format!("movq {slot}(%rbp), %rax")),
        }
    }

    /// The result of every expression lands in %rax (integers, pointers,
    /// aggregate addresses) or %xmm0 (floats).
    pub fn gen_expr(&mut self, expr: &Expr) -> Type {
        match expr {
            Expr::Int(v, _) => {
                self.mov_imm(*v);
                Type::int(64)
            }
            Expr::Float(v, _) => {
                let label = self.float_label(*v);
                self.emit(format!("movsd {label}(%rip), %xmm0"));
                Type::Float { width: 64 }
            }
            Expr::Char(c, _) => {
                self.emit(format!("mov ${}, %rax", *c as u32));
                Type::Char
            }
            Expr::Str(s, _) => {
                let label = self.string_label(s);
                self.emit(format!("lea {label}(%rip), %rax"));
                Type::Str
            }
            Expr::Path(path, _) => self.gen_path(path),
            Expr::Unary(op, inner, _) => self.gen_unary(*op, inner),
            Expr::Binary(op, l, r, _) => self.gen_binary(*op, l, r),
            Expr::Assign(l, r, _) => self.gen_assign(l, r),
            Expr::Call(callee, args, _) => self.gen_call(callee, args),
            Expr::Index(_, _, _) | Expr::Member(_, _, _) | Expr::Arrow(_, _, _) => {
                let (addr, ty) = self.get_lvalue(expr);
                self.load_place(&addr, ty)
            }
            Expr::Cast(te, inner, _) => self.gen_cast(te, inner),
            Expr::CStr(inner, _) => {
                self.gen_expr(inner);
                Type::ptr(Type::Char)
            }
            // Rejected during analysis; nothing meaningful to emit.
            Expr::ArrayLit(_, _) | Expr::Lambda(_, _, _) => Type::int(64),
        }
    }

    /// Load a place as a value: scalars load sized and sign-correct,
    /// aggregates yield their address.
    fn load_place(&mut self, addr: &Addr, ty: Type) -> Type {
        match &ty {
            Type::Struct(_) => {
                self.emit(format!("lea {}, %rax", addr.fmt()));
                Type::ptr(ty)
            }
            Type::Union(_) | Type::Array(_) => {
                self.emit(format!("lea {}, %rax", addr.fmt()));
                ty
            }
            _ => {
                self.load_scalar(addr, &ty);
                ty
            }
        }
    }

    fn gen_path(&mut self, path: &[String]) -> Type {
        if path.len() == 1 {
            if let Some((off, ty)) = self.locals.get(&path[0]).cloned() {
                return self.load_place(&Addr::Frame(off), ty);
            }
        }
        match self.env.lookup_value(path, self.current_ns.as_deref()) {
            Some(Resolved::Global(_, sym)) => {
                let addr = Addr::Global(sym.linkage.clone(), 0);
                let ty = sym.ty.clone();
                self.load_place(&addr, ty)
            }
            Some(Resolved::Func(_, sym)) => {
                let label = sym.linkage.clone();
                let params: Vec<Type> = sym.params.iter().map(|(_, t)| t.clone()).collect();
                let ret = sym.ret.clone();
                if sym.defined {
                    self.emit(format!("lea {label}(%rip), %rax"));
                } else {
                    self.emit(format!("mov {label}@GOTPCREL(%rip), %rax"));
                }
                Type::Func(params, Box::new(ret))
            }
            Some(Resolved::EnumConst(value)) => {
                self.emit(format!("mov ${value}, %rax"));
                Type::int(32)
            }
            None => Type::int(64),
        }
    }

    // ------------------------------------------------------------------
    // Lvalues. Computed addresses land in %r11; the address register is
    // only live until the next sub-expression is evaluated, so callers
    // spill around nested evaluation.
    // ------------------------------------------------------------------

    pub fn get_lvalue(&mut self, expr: &Expr) -> (Addr, Type) {
        match expr {
            Expr::Path(path, _) => {
                if path.len() == 1 {
                    if let Some((off, ty)) = self.locals.get(&path[0]).cloned() {
                        return (Addr::Frame(off), ty);
                    }
                }
                match self.env.lookup_value(path, self.current_ns.as_deref()) {
                    Some(Resolved::Global(_, sym)) => {
                        (Addr::Global(sym.linkage.clone(), 0), sym.ty.clone())
                    }
                    _ => (Addr::R11(0), Type::int(64)),
                }
            }
            Expr::Member(base, field, _) => {
                let (base_addr, base_ty) = if is_place(base) {
                    let (addr, ty) = self.get_lvalue(base);
                    match ty {
                        // A pointer-to-struct base dereferences implicitly.
                        Type::Ptr { pointee, .. } => {
                            self.emit(format!("mov {}, %r11", addr.fmt()));
                            (Addr::R11(0), *pointee)
                        }
                        ty => (addr, ty),
                    }
                } else {
                    let ty = self.gen_expr(base);
                    self.emit("mov %rax, %r11");
                    let ty = match ty {
                        Type::Ptr { pointee, .. } => *pointee,
                        ty => ty,
                    };
                    (Addr::R11(0), ty)
                };
                self.field_addr(base_addr, &base_ty, field)
            }
            Expr::Arrow(base, field, _) => {
                let ty = self.gen_expr(base);
                self.emit("mov %rax, %r11");
                let pointee = match ty {
                    Type::Ptr { pointee, .. } => *pointee,
                    ty => ty,
                };
                self.field_addr(Addr::R11(0), &pointee, field)
            }
            Expr::Index(base, index, _) => self.index_addr(base, index),
            Expr::Unary(UnaryOp::Deref, inner, _) => {
                let ty = self.gen_expr(inner);
                self.emit("mov %rax, %r11");
                let pointee = match ty {
                    Type::Ptr { pointee, .. } => *pointee,
                    _ => Type::int(64),
                };
                (Addr::R11(0), pointee)
            }
            // Not an lvalue; analysis already rejected it.
            other => {
                let ty = self.gen_expr(other);
                self.emit("mov %rax, %r11");
                (Addr::R11(0), ty)
            }
        }
    }

    fn field_addr(&mut self, base: Addr, base_ty: &Type, field: &str) -> (Addr, Type) {
        let Type::Struct(key) = base_ty else {
            return (base, Type::int(64));
        };
        let info = &self.env.types.structs[key];
        match info.fields.get(field) {
            Some(f) => (base.offset(f.offset as i32), f.ty.clone()),
            None => (base, Type::int(64)),
        }
    }

    /// Element address: load the data pointer into %r11, evaluate the
    /// index, scale by the element size, add.
    fn index_addr(&mut self, base: &Expr, index: &Expr) -> (Addr, Type) {
        let elem;
        if is_place(base) {
            let (addr, ty) = self.get_lvalue(base);
            match ty {
                Type::Array(e) => {
                    // data pointer sits at offset 0 of the header
                    self.emit(format!("mov {}, %r11", addr.fmt()));
                    elem = *e;
                }
                Type::Str => {
                    self.emit(format!("mov {}, %r11", addr.fmt()));
                    elem = Type::Char;
                }
                Type::Ptr { pointee, .. } => {
                    self.emit(format!("mov {}, %r11", addr.fmt()));
                    elem = *pointee;
                }
                _ => {
                    self.emit(format!("lea {}, %r11", addr.fmt()));
                    elem = Type::int(64);
                }
            }
        } else {
            let ty = self.gen_expr(base);
            self.emit("mov %rax, %r11");
            match ty {
                Type::Array(e) => {
                    // value is the header address
                    self.emit("mov (%r11), %r11");
                    elem = *e;
                }
                Type::Str => elem = Type::Char,
                Type::Ptr { pointee, .. } => elem = *pointee,
                _ => elem = Type::int(64),
            }
        }

        let size = elem.size(&self.env.types).max(1);
        let slot = self.alloc_scratch();
        self.emit(format!("mov %r11, {slot}(%rbp)"));
        self.gen_expr(index);
        self.emit(format!("mov {slot}(%rbp), %r11"));
        self.free_scratch(1);
        if size != 1 {
            self.emit(format!("imul ${size}, %rax"));
        }
        self.emit("add %rax, %r11");
        (Addr::R11(0), elem)
    }

    // ------------------------------------------------------------------
    // Unary operators
    // ------------------------------------------------------------------

    fn gen_unary(&mut self, op: UnaryOp, inner: &Expr) -> Type {
        match op {
            UnaryOp::Neg => {
                let ty = self.gen_expr(inner);
                match &ty {
                    Type::Float { width: 32 } => {
                        self.emit("xorps %xmm1, %xmm1");
                        self.emit("subss %xmm0, %xmm1");
                        self.emit("movaps %xmm1, %xmm0");
                    }
                    Type::Float { .. } => {
                        self.emit("xorpd %xmm1, %xmm1");
                        self.emit("subsd %xmm0, %xmm1");
                        self.emit("movapd %xmm1, %xmm0");
                    }
                    _ => self.emit("neg %rax"),
                }
                ty
            }
            UnaryOp::Not => {
                self.gen_expr(inner);
                self.emit("cmp $0, %rax");
                self.emit("sete %al");
                self.emit("movzbq %al, %rax");
                Type::int(64)
            }
            UnaryOp::BitNot => {
                let ty = self.gen_expr(inner);
                self.emit("not %rax");
                ty
            }
            UnaryOp::Deref => {
                let ty = self.gen_expr(inner);
                let pointee = match ty {
                    Type::Ptr { pointee, .. } => *pointee,
                    _ => Type::int(64),
                };
                if pointee.is_scalar() {
                    self.emit("mov %rax, %r11");
                    self.load_scalar(&Addr::R11(0), &pointee);
                    pointee
                } else if matches!(pointee, Type::Struct(_)) {
                    // struct values travel as their address
                    Type::ptr(pointee)
                } else {
                    pointee
                }
            }
            UnaryOp::Addr => {
                let (addr, ty) = self.get_lvalue(inner);
                self.emit(format!("lea {}, %rax", addr.fmt()));
                Type::ptr(ty)
            }
            UnaryOp::PreInc => {
                let (addr, ty) = self.get_lvalue(inner);
                let step = match &ty {
                    Type::Ptr { pointee, .. } => pointee.size(&self.env.types).max(1),
                    _ => 1,
                };
                self.load_scalar(&addr, &ty);
                self.emit(format!("add ${step}, %rax"));
                self.store_scalar(&addr, &ty);
                ty
            }
        }
    }

    // ------------------------------------------------------------------
    // Binary operators. The right operand is evaluated first and spilled
    // to a scratch slot; the left lands in %rax/%xmm0 and the right is
    // reloaded into %rcx/%xmm1.
    // ------------------------------------------------------------------

    fn gen_binary(&mut self, op: BinOp, l: &Expr, r: &Expr) -> Type {
        if matches!(op, BinOp::And | BinOp::Or) {
            return self.gen_logical(op, l, r);
        }

        let rt = self.gen_expr(r);
        let slot = self.spill(&rt);
        let lt = self.gen_expr(l);

        // String arithmetic runs through the runtime helpers.
        if lt == Type::Str && rt == Type::Str && matches!(op, BinOp::Add | BinOp::Sub) {
            self.emit(format!("movq {slot}(%rbp), %rsi"));
            self.free_scratch(1);
            self.emit("mov %rax, %rdi");
            if op == BinOp::Add {
                self.set_str_concat_used();
                self.emit("call __c5_str_concat");
            } else {
                self.set_str_remove_used();
                self.emit("call __c5_str_remove");
            }
            return Type::Str;
        }
        if lt == Type::Str && rt == Type::Str {
            // == and != compare pointers; everything else was rejected.
            self.emit(format!("movq {slot}(%rbp), %rcx"));
            self.free_scratch(1);
            self.emit("cmp %rcx, %rax");
            self.emit(format!("set{} %al", int_cc(op, false)));
            self.emit("movzbq %al, %rax");
            return Type::int(64);
        }

        if lt.is_float() || rt.is_float() {
            return self.gen_float_binary(op, &lt, &rt, slot);
        }

        // Integer and pointer path: right operand into %rcx.
        self.emit(format!("movq {slot}(%rbp), %rcx"));
        self.free_scratch(1);

        // Pointer arithmetic scales by the element size.
        let elem_size = |ty: &Type, env: &crate::sema::Analysis| match ty {
            Type::Ptr { pointee, .. } => match pointee.as_ref() {
                Type::Void => 1,
                p => p.size(&env.types).max(1),
            },
            _ => 1,
        };
        match (&lt, &rt) {
            (Type::Ptr { .. }, Type::Ptr { .. }) if op == BinOp::Sub => {
                let scale = elem_size(&lt, self.env);
                self.emit("sub %rcx, %rax");
                if scale > 1 {
                    self.emit("cqo");
                    self.emit(format!("mov ${scale}, %rcx"));
                    self.emit("idiv %rcx");
                }
                return Type::int(64);
            }
            (Type::Ptr { .. }, t) if t.is_integer() && matches!(op, BinOp::Add | BinOp::Sub) => {
                let scale = elem_size(&lt, self.env);
                if scale > 1 {
                    self.emit(format!("imul ${scale}, %rcx"));
                }
                self.emit(if op == BinOp::Add {
                    "add %rcx, %rax"
                } else {
                    "sub %rcx, %rax"
                });
                return lt;
            }
            (t, Type::Ptr { .. }) if t.is_integer() && op == BinOp::Add => {
                let scale = elem_size(&rt, self.env);
                if scale > 1 {
                    self.emit(format!("imul ${scale}, %rax"));
                }
                self.emit("add %rcx, %rax");
                return rt;
            }
            _ => {}
        }

        let unsigned = lt.is_unsigned() || rt.is_unsigned() || lt.is_pointer();
        match op {
            BinOp::Add => self.emit("add %rcx, %rax"),
            BinOp::Sub => self.emit("sub %rcx, %rax"),
            BinOp::Mul => self.emit("imul %rcx, %rax"),
            BinOp::Div | BinOp::Mod => {
                if unsigned {
                    self.emit("xor %edx, %edx");
                    self.emit("div %rcx");
                } else {
                    self.emit("cqo");
                    self.emit("idiv %rcx");
                }
                if op == BinOp::Mod {
                    self.emit("mov %rdx, %rax");
                }
            }
            BinOp::BitAnd => self.emit("and %rcx, %rax"),
            BinOp::BitOr => self.emit("or %rcx, %rax"),
            BinOp::BitXor => self.emit("xor %rcx, %rax"),
            BinOp::Shl => self.emit("shl %cl, %rax"),
            BinOp::Shr => {
                if lt.is_unsigned() {
                    self.emit("shr %cl, %rax");
                } else {
                    self.emit("sar %cl, %rax");
                }
            }
            BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
                self.emit("cmp %rcx, %rax");
                self.emit(format!("set{} %al", int_cc(op, unsigned)));
                self.emit("movzbq %al, %rax");
                return Type::int(64);
            }
            BinOp::And | BinOp::Or => unreachable!(),
        }

        if matches!(op, BinOp::Shl | BinOp::Shr) {
            return lt;
        }
        merge_int_types(&lt, &rt)
    }

    fn gen_float_binary(&mut self, op: BinOp, lt: &Type, rt: &Type, slot: i32) -> Type {
        // Operands of equal 32-bit width stay single precision; anything
        // mixed is computed in double.
        let single = matches!(
            (lt, rt),
            (Type::Float { width: 32 }, Type::Float { width: 32 })
        );
        let suffix = if single { "ss" } else { "sd" };

        // Left operand normalisation.
        if lt.is_integer() {
            self.emit(format!("cvtsi2{suffix}q %rax, %xmm0"));
        } else if matches!(lt, Type::Float { width: 32 }) && !single {
            self.emit("cvtss2sd %xmm0, %xmm0");
        }

        // Reload and normalise the right operand.
        match rt {
            Type::Float { width: 32 } => {
                self.emit(format!("movss {slot}(%rbp), %xmm1"));
                if !single {
                    self.emit("cvtss2sd %xmm1, %xmm1");
                }
            }
            Type::Float { .. } => self.emit(format!("movsd {slot}(%rbp), %xmm1")),
            _ => {
                self.emit(format!("movq {slot}(%rbp), %rcx"));
                self.emit(format!("cvtsi2{suffix}q %rcx, %xmm1"));
            }
        }
        self.free_scratch(1);

        match op {
            BinOp::Add => self.emit(format!("add{suffix} %xmm1, %xmm0")),
            BinOp::Sub => self.emit(format!("sub{suffix} %xmm1, %xmm0")),
            BinOp::Mul => self.emit(format!("mul{suffix} %xmm1, %xmm0")),
            BinOp::Div => self.emit(format!("div{suffix} %xmm1, %xmm0")),
            BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
                let ucomi = if single { "ucomiss" } else { "ucomisd" };
                self.emit(format!("{ucomi} %xmm1, %xmm0"));
                self.emit(format!("set{} %al", float_cc(op)));
                self.emit("movzbq %al, %rax");
                return Type::int(64);
            }
            _ => {}
        }
        Type::Float {
            width: if single { 32 } else { 64 },
        }
    }

    fn gen_logical(&mut self, op: BinOp, l: &Expr, r: &Expr) -> Type {
        let short = self.next_label(if op == BinOp::And { "and_false" } else { "or_true" });
        let end = self.next_label("logic_end");
        let jump = if op == BinOp::And { "je" } else { "jne" };

        self.gen_expr(l);
        self.emit("cmp $0, %rax");
        self.emit(format!("{jump} {short}"));
        self.gen_expr(r);
        self.emit("cmp $0, %rax");
        self.emit(format!("{jump} {short}"));
        let (taken, fallthrough) = if op == BinOp::And { (1, 0) } else { (0, 1) };
        self.emit(format!("mov ${taken}, %rax"));
        self.emit(format!("jmp {end}"));
        self.emit_label(&short);
        self.emit(format!("mov ${fallthrough}, %rax"));
        self.emit_label(&end);
        Type::int(64)
    }

    // ------------------------------------------------------------------
    // Assignment
    // ------------------------------------------------------------------

    fn gen_assign(&mut self, l: &Expr, r: &Expr) -> Type {
        // Storing a cast-to-union writes the variant's bytes directly.
        if let Expr::Cast(te, inner, pos) = r {
            let target = crate::sema::resolve_type(
                te,
                self.current_ns.as_deref(),
                self.env,
                pos,
                &mut Vec::new(),
            );
            if matches!(target, Type::Union(_)) {
                let vt = self.gen_expr(inner);
                let slot = self.spill(&vt);
                let (addr, _) = self.get_lvalue(l);
                self.reload(slot, &vt);
                self.free_scratch(1);
                self.store_scalar(&addr, &vt);
                return target;
            }
        }

        let rt = self.gen_expr(r);
        match &rt {
            // Aggregates: %rax holds the source address, copy by size.
            Type::Union(_) | Type::Array(_) => {
                let size = rt.size(&self.env.types);
                let slot = self.spill(&Type::int(64));
                let (addr, lt) = self.get_lvalue(l);
                self.emit(format!("lea {}, %rdi", addr.fmt()));
                self.emit(format!("movq {slot}(%rbp), %rsi"));
                self.free_scratch(1);
                self.emit(format!("mov ${size}, %rdx"));
                self.emit("call memcpy@PLT");
                lt
            }
            Type::Ptr { pointee, .. } if matches!(pointee.as_ref(), Type::Struct(_)) => {
                let slot = self.spill(&Type::int(64));
                let (addr, lt) = self.get_lvalue(l);
                if matches!(lt, Type::Struct(_)) {
                    let size = lt.size(&self.env.types);
                    self.emit(format!("lea {}, %rdi", addr.fmt()));
                    self.emit(format!("movq {slot}(%rbp), %rsi"));
                    self.free_scratch(1);
                    self.emit(format!("mov ${size}, %rdx"));
                    self.emit("call memcpy@PLT");
                } else {
                    // storing a struct pointer into a pointer slot
                    self.reload(slot, &rt);
                    self.free_scratch(1);
                    self.store_scalar(&addr, &lt);
                }
                lt
            }
            _ => {
                let slot = self.spill(&rt);
                let (addr, lt) = self.get_lvalue(l);
                self.reload(slot, &rt);
                self.free_scratch(1);
                self.convert_scalar(&rt, &lt);
                self.store_scalar(&addr, &lt);
                lt
            }
        }
    }

    // ------------------------------------------------------------------
    // Casts
    // ------------------------------------------------------------------

    fn gen_cast(&mut self, te: &TypeExpr, inner: &Expr) -> Type {
        let target = crate::sema::resolve_type(
            te,
            self.current_ns.as_deref(),
            self.env,
            inner.pos(),
            &mut Vec::new(),
        );
        let source = self.gen_expr(inner);

        match (&target, &source) {
            // Union pun: reinterpret the stored bytes as the variant.
            (t, Type::Union(_)) => {
                if t.is_scalar() {
                    self.emit("mov %rax, %r11");
                    self.load_scalar(&Addr::R11(0), t);
                }
                if matches!(t, Type::Struct(_)) {
                    return Type::ptr(target);
                }
                return target;
            }
            (Type::Union(_), _) => return target,
            (Type::Float { width: tw }, Type::Float { width: sw }) => {
                if *tw == 32 && *sw == 64 {
                    self.emit("cvtsd2ss %xmm0, %xmm0");
                } else if *tw == 64 && *sw == 32 {
                    self.emit("cvtss2sd %xmm0, %xmm0");
                }
            }
            (Type::Float { width }, s) if s.is_integer() => {
                if *width == 32 {
                    self.emit("cvtsi2ssq %rax, %xmm0");
                } else {
                    self.emit("cvtsi2sdq %rax, %xmm0");
                }
            }
            (t, Type::Float { width }) if t.is_integer() => {
                if *width == 32 {
                    self.emit("cvttss2si %xmm0, %rax");
                } else {
                    self.emit("cvttsd2si %xmm0, %rax");
                }
            }
            (t, s) if t.is_integer() && s.is_integer() => {
                // Re-extend to the target width so later comparisons see
                // the truncated value.
                let unsigned = t.is_unsigned();
                match t.size(&self.env.types) {
                    1 => self.emit(if unsigned {
                        "movzbq %al, %rax"
                    } else {
                        "movsbq %al, %rax"
                    }),
                    2 => self.emit(if unsigned {
                        "movzwq %ax, %rax"
                    } else {
                        "movswq %ax, %rax"
                    }),
                    4 => self.emit(if unsigned {
                        "mov %eax, %eax"
                    } else {
                        "movslq %eax, %rax"
                    }),
                    _ => {}
                }
            }
            // Pointer, string and function casts are representation no-ops.
            _ => {}
        }
        target
    }

    // ------------------------------------------------------------------
    // Calls
    // ------------------------------------------------------------------

    fn gen_call(&mut self, callee: &Expr, args: &[Expr]) -> Type {
        if let Expr::Member(base, method, _) = callee {
            return self.gen_array_method(base, method, args);
        }

        let mut scratch_used = 0i32;
        let (target, ret, varargs) = match callee {
            Expr::Path(path, _)
                if !(path.len() == 1 && self.locals.contains_key(&path[0])) =>
            {
                match self.env.lookup_value(path, self.current_ns.as_deref()) {
                    Some(Resolved::Func(_, sym)) => (
                        CallTarget::Direct {
                            label: sym.linkage.clone(),
                            plt: !sym.defined,
                        },
                        sym.ret.clone(),
                        sym.varargs,
                    ),
                    _ => {
                        let ty = self.gen_expr(callee);
                        let slot = self.spill(&Type::int(64));
                        scratch_used += 1;
                        (CallTarget::Indirect(slot), ret_of(ty), false)
                    }
                }
            }
            _ => {
                let ty = self.gen_expr(callee);
                let slot = self.spill(&Type::int(64));
                scratch_used += 1;
                (CallTarget::Indirect(slot), ret_of(ty), false)
            }
        };

        // Evaluate every argument left to right into scratch slots.
        struct ArgVal {
            slot: i32,
            ty: Type,
            class: AbiClass,
        }
        let mut vals = Vec::new();
        for arg in args {
            let ty = self.gen_expr(arg);
            let class = ty.abi_class();
            let slot = match class {
                AbiClass::Sse => self.spill(&ty),
                // integer values and aggregate addresses both sit in %rax
                _ => self.spill(&Type::int(64)),
            };
            scratch_used += 1;
            vals.push(ArgVal { slot, ty, class });
        }

        // Register assignment: integers and pointers take the next integer
        // register, floats the next SSE register, arrays three integer
        // registers; the rest goes to the stack right-to-left.
        enum Place {
            IntReg(usize),
            SseReg(usize),
            Triple(usize),
            Stack,
        }
        let mut int_idx = 0usize;
        let mut sse_idx = 0usize;
        let mut placements: Vec<Place> = Vec::new();
        let mut stack_slots = 0usize;
        for val in vals.iter() {
            match val.class {
                AbiClass::Sse => {
                    if sse_idx < SSE_ARG_REGS.len() {
                        placements.push(Place::SseReg(sse_idx));
                        sse_idx += 1;
                    } else {
                        placements.push(Place::Stack);
                        stack_slots += 1;
                    }
                }
                AbiClass::ArrayTriple => {
                    if int_idx + 3 <= INT_ARG_REGS.len() {
                        placements.push(Place::Triple(int_idx));
                        int_idx += 3;
                    } else {
                        placements.push(Place::Stack);
                        stack_slots += 3;
                    }
                }
                AbiClass::Integer => {
                    if int_idx < INT_ARG_REGS.len() {
                        placements.push(Place::IntReg(int_idx));
                        int_idx += 1;
                    } else {
                        placements.push(Place::Stack);
                        stack_slots += 1;
                    }
                }
            }
        }

        // Stack arguments, pushed right-to-left, padded so the call site
        // stays 16-byte aligned.
        let pad = stack_slots % 2 == 1;
        if pad {
            self.emit("sub $8, %rsp");
        }
        for (i, val) in vals.iter().enumerate().rev() {
            if !matches!(placements[i], Place::Stack) {
                continue;
            }
            if val.class == AbiClass::ArrayTriple {
                self.emit(format!("movq {}(%rbp), %r10", val.slot));
                self.emit("pushq 16(%r10)");
                self.emit("pushq 8(%r10)");
                self.emit("pushq (%r10)");
            } else {
                self.emit(format!("movq {}(%rbp), %rax", val.slot));
                self.emit("push %rax");
            }
        }

        for (i, val) in vals.iter().enumerate() {
            match placements[i] {
                Place::Stack => {}
                Place::IntReg(reg) => {
                    self.emit(format!("movq {}(%rbp), {}", val.slot, INT_ARG_REGS[reg]));
                }
                Place::SseReg(reg) => {
                    let xmm = SSE_ARG_REGS[reg];
                    if matches!(val.ty, Type::Float { width: 32 }) {
                        self.emit(format!("movss {}(%rbp), {xmm}", val.slot));
                        if varargs {
                            // Variadic C promotes float to double.
                            self.emit(format!("cvtss2sd {xmm}, {xmm}"));
                        }
                    } else {
                        self.emit(format!("movsd {}(%rbp), {xmm}", val.slot));
                    }
                }
                Place::Triple(reg) => {
                    self.emit(format!("movq {}(%rbp), %r10", val.slot));
                    self.emit(format!("mov (%r10), {}", INT_ARG_REGS[reg]));
                    self.emit(format!("mov 8(%r10), {}", INT_ARG_REGS[reg + 1]));
                    self.emit(format!("mov 16(%r10), {}", INT_ARG_REGS[reg + 2]));
                }
            }
        }

        if varargs {
            // %al carries the number of SSE registers used.
            let sse_count = vals
                .iter()
                .filter(|v| v.class == AbiClass::Sse)
                .count()
                .min(SSE_ARG_REGS.len());
            self.emit(format!("mov ${sse_count}, %eax"));
        }

        match &target {
            CallTarget::Direct { label, plt } => {
                if *plt {
                    self.emit(format!("call {label}@PLT"));
                } else {
                    self.emit(format!("call {label}"));
                }
            }
            CallTarget::Indirect(slot) => {
                self.emit(format!("movq {}(%rbp), %r10", slot));
                self.emit("call *%r10");
            }
        }

        let stack_bytes = 8 * stack_slots as i32 + if pad { 8 } else { 0 };
        if stack_bytes > 0 {
            self.emit(format!("add ${stack_bytes}, %rsp"));
        }
        self.free_scratch(scratch_used);
        ret
    }

    /// `array<T>` methods expand to calls against the small runtime:
    /// `__c5_arr_push(&a, &v, sizeof T)`, `__c5_arr_pop(&a, sizeof T)`,
    /// `__c5_arr_len(&a)`, `__c5_arr_clear(&a)`.
    fn gen_array_method(&mut self, base: &Expr, method: &str, args: &[Expr]) -> Type {
        self.set_arr_used();
        // Element type comes from the array's declared type.
        let elem = self.static_array_elem(base);
        let elem_size = elem.size(&self.env.types).max(1);

        match method {
            "push" => {
                let value = &args[0];
                // Value first; computing the array address afterwards keeps
                // %r11 live only across the final lea.
                let value_slot;
                let value_is_addr;
                match value {
                    Expr::ArrayLit(fields, _) => {
                        // struct literal built in a scratch block
                        let Type::Struct(key) = &elem else {
                            return Type::Void;
                        };
                        let key = key.clone();
                        let block = self.alloc_scratch_block(elem_size);
                        self.gen_struct_literal(Addr::Frame(block), &key, fields);
                        value_slot = block;
                        value_is_addr = false; // slot IS the value storage
                    }
                    _ => {
                        let vt = self.gen_expr(value);
                        match vt {
                            // struct value: %rax already holds its address
                            Type::Ptr { ref pointee, .. }
                                if matches!(pointee.as_ref(), Type::Struct(_))
                                    && matches!(elem, Type::Struct(_)) =>
                            {
                                value_slot = self.spill(&Type::int(64));
                                value_is_addr = true;
                            }
                            _ => {
                                let vt2 = vt.clone();
                                self.convert_scalar(&vt2, &elem);
                                // store the converted value in elem width
                                let slot = self.alloc_scratch();
                                self.store_scalar(&Addr::Frame(slot), &elem);
                                value_slot = slot;
                                value_is_addr = false;
                            }
                        }
                    }
                }

                let (addr, _) = self.get_lvalue(base);
                self.emit(format!("lea {}, %rdi", addr.fmt()));
                if value_is_addr {
                    self.emit(format!("movq {value_slot}(%rbp), %rsi"));
                } else {
                    self.emit(format!("lea {value_slot}(%rbp), %rsi"));
                }
                self.emit(format!("mov ${elem_size}, %rdx"));
                self.emit("call __c5_arr_push");
                self.free_scratch_all_of(value_slot, elem_size, value_is_addr);
                Type::Void
            }
            "pop" => {
                let (addr, _) = self.get_lvalue(base);
                self.emit(format!("lea {}, %rdi", addr.fmt()));
                self.emit(format!("mov ${elem_size}, %rsi"));
                self.emit("call __c5_arr_pop");
                if elem.is_scalar() {
                    self.emit("mov %rax, %r11");
                    self.load_scalar(&Addr::R11(0), &elem);
                    elem
                } else if matches!(elem, Type::Struct(_)) {
                    // the popped element stays addressable past the length
                    Type::ptr(elem)
                } else {
                    elem
                }
            }
            "length" => {
                let (addr, _) = self.get_lvalue(base);
                self.emit(format!("lea {}, %rdi", addr.fmt()));
                self.emit("call __c5_arr_len");
                Type::int(64)
            }
            "clear" => {
                let (addr, _) = self.get_lvalue(base);
                self.emit(format!("lea {}, %rdi", addr.fmt()));
                self.emit("call __c5_arr_clear");
                Type::Void
            }
            _ => Type::Void,
        }
    }

    /// Declared element type of an array-typed place, without emitting code.
    fn static_array_elem(&self, base: &Expr) -> Type {
        match base {
            Expr::Path(path, _) if path.len() == 1 => {
                if let Some((_, Type::Array(elem))) = self.locals.get(&path[0]) {
                    return (**elem).clone();
                }
                if let Some(Resolved::Global(_, sym)) =
                    self.env.lookup_value(path, self.current_ns.as_deref())
                {
                    if let Type::Array(elem) = &sym.ty {
                        return (**elem).clone();
                    }
                }
                Type::int(64)
            }
            Expr::Member(inner, field, _) => {
                let base_ty = self.static_place_type(inner);
                let key = match base_ty {
                    Some(Type::Struct(key)) => key,
                    Some(Type::Ptr { pointee, .. }) => match *pointee {
                        Type::Struct(key) => key,
                        _ => return Type::int(64),
                    },
                    _ => return Type::int(64),
                };
                match self.env.types.structs[&key].fields.get(field) {
                    Some(f) => match &f.ty {
                        Type::Array(elem) => (**elem).clone(),
                        _ => Type::int(64),
                    },
                    None => Type::int(64),
                }
            }
            _ => Type::int(64),
        }
    }

    fn static_place_type(&self, e: &Expr) -> Option<Type> {
        match e {
            Expr::Path(path, _) if path.len() == 1 => {
                self.locals.get(&path[0]).map(|(_, t)| t.clone())
            }
            _ => None,
        }
    }

    /// A block of consecutive scratch slots large enough for `bytes`.
    fn alloc_scratch_block(&mut self, bytes: u32) -> i32 {
        let slots = bytes.div_ceil(8).max(1) as i32;
        let mut lowest = 0;
        for _ in 0..slots {
            lowest = self.alloc_scratch();
        }
        lowest
    }

    fn free_scratch_all_of(&mut self, _slot: i32, bytes: u32, was_addr: bool) {
        if was_addr {
            self.free_scratch(1);
        } else {
            self.free_scratch(bytes.div_ceil(8).max(1) as i32);
        }
    }
}

/// Expressions whose address can be computed without evaluating them into
/// a register first.
fn is_place(e: &Expr) -> bool {
    matches!(
        e,
        Expr::Path(_, _)
            | Expr::Index(_, _, _)
            | Expr::Member(_, _, _)
            | Expr::Unary(UnaryOp::Deref, _, _)
    )
}

fn ret_of(ty: Type) -> Type {
    match ty {
        Type::Func(_, ret) => *ret,
        _ => Type::int(64),
    }
}

fn int_cc(op: BinOp, unsigned: bool) -> &'static str {
    match (op, unsigned) {
        (BinOp::Eq, _) => "e",
        (BinOp::Ne, _) => "ne",
        (BinOp::Lt, false) => "l",
        (BinOp::Le, false) => "le",
        (BinOp::Gt, false) => "g",
        (BinOp::Ge, false) => "ge",
        (BinOp::Lt, true) => "b",
        (BinOp::Le, true) => "be",
        (BinOp::Gt, true) => "a",
        (BinOp::Ge, true) => "ae",
        _ => "e",
    }
}

fn float_cc(op: BinOp) -> &'static str {
    match op {
        BinOp::Eq => "e",
        BinOp::Ne => "ne",
        BinOp::Lt => "b",
        BinOp::Le => "be",
        BinOp::Gt => "a",
        BinOp::Ge => "ae",
        _ => "e",
    }
}

fn merge_int_types(l: &Type, r: &Type) -> Type {
    if l.is_pointer() {
        return l.clone();
    }
    if r.is_pointer() {
        return r.clone();
    }
    let width = |t: &Type| match t {
        Type::Int { width, .. } => *width,
        Type::Char => 8,
        Type::Enum(_) => 32,
        _ => 64,
    };
    Type::Int {
        width: width(l).max(width(r)),
        signed: !(l.is_unsigned() || r.is_unsigned()),
    }
}
