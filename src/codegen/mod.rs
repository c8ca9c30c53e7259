mod expr;
mod peephole;
mod runtime;

use crate::ast::{Expr, Stmt, UnaryOp};
use crate::sema::{Analysis, FuncUnit};
use crate::types::{AbiClass, Type};
use indexmap::IndexMap;

pub const INT_ARG_REGS: [&str; 6] = ["%rdi", "%rsi", "%rdx", "%rcx", "%r8", "%r9"];
pub const SSE_ARG_REGS: [&str; 8] = [
    "%xmm0", "%xmm1", "%xmm2", "%xmm3", "%xmm4", "%xmm5", "%xmm6", "%xmm7",
];

/// A memory operand the generator can address directly.
#[derive(Debug, Clone)]
pub enum Addr {
    /// off(%rbp)
    Frame(i32),
    /// name+off(%rip)
    Global(String, i32),
    /// off(%r11), the address register for computed lvalues
    R11(i32),
}

impl Addr {
    pub fn fmt(&self) -> String {
        match self {
            Addr::Frame(off) => format!("{off}(%rbp)"),
            Addr::Global(name, 0) => format!("{name}(%rip)"),
            Addr::Global(name, off) => format!("{name}+{off}(%rip)"),
            Addr::R11(0) => "(%r11)".to_string(),
            Addr::R11(off) => format!("{off}(%r11)"),
        }
    }

    pub fn offset(&self, delta: i32) -> Addr {
        match self {
            Addr::Frame(off) => Addr::Frame(off + delta),
            Addr::Global(name, off) => Addr::Global(name.clone(), off + delta),
            Addr::R11(off) => Addr::R11(off + delta),
        }
    }
}

pub struct CodeGen<'a> {
    pub env: &'a Analysis,
    rodata: Vec<String>,
    data: Vec<String>,
    text: Vec<String>,
    strings: IndexMap<String, String>,
    floats: IndexMap<u64, String>,
    label_count: u32,

    // Per-function state
    pub locals: IndexMap<String, (i32, Type)>,
    pub current_ns: Option<String>,
    frame_locals: i32,
    scratch_depth: i32,
    scratch_max: i32,
    current_ret: Type,
    is_main: bool,

    uses_str_concat: bool,
    uses_str_remove: bool,
    uses_arr: bool,
}

impl<'a> CodeGen<'a> {
    pub fn new(env: &'a Analysis) -> Self {
        CodeGen {
            env,
            rodata: Vec::new(),
            data: Vec::new(),
            text: Vec::new(),
            strings: IndexMap::new(),
            floats: IndexMap::new(),
            label_count: 0,
            locals: IndexMap::new(),
            current_ns: None,
            frame_locals: 0,
            scratch_depth: 0,
            scratch_max: 0,
            current_ret: Type::Void,
            is_main: false,
            uses_str_concat: false,
            uses_str_remove: false,
            uses_arr: false,
        }
    }

    pub fn emit(&mut self, line: impl Into<String>) {
        self.text.push(format!("    {}", line.into()));
    }

    pub fn emit_label(&mut self, label: &str) {
        self.text.push(format!("{label}:"));
    }

    pub fn next_label(&mut self, stem: &str) -> String {
        self.label_count += 1;
        format!(".L{}_{}", stem, self.label_count)
    }

    pub fn set_str_concat_used(&mut self) {
        self.uses_str_concat = true;
    }

    pub fn set_str_remove_used(&mut self) {
        self.uses_str_remove = true;
    }

    pub fn set_arr_used(&mut self) {
        self.uses_arr = true;
    }

    // ------------------------------------------------------------------
    // Scratch slots: expression spills live below the locals in the frame,
    // sized by a per-function high-water mark, so %rsp stays 16-byte
    // aligned at every call site.
    // ------------------------------------------------------------------

    pub fn alloc_scratch(&mut self) -> i32 {
        self.scratch_depth += 1;
        self.scratch_max = self.scratch_max.max(self.scratch_depth);
        -(self.frame_locals + 8 * self.scratch_depth)
    }

    pub fn free_scratch(&mut self, n: i32) {
        self.scratch_depth -= n;
    }

    // ------------------------------------------------------------------
    // Literal pools
    // ------------------------------------------------------------------

    /// String literals live in .data, each labelled `.LC<n>`, carrying an
    /// 8-byte length prefix before the NUL-terminated bytes.
    pub fn string_label(&mut self, value: &str) -> String {
        if let Some(label) = self.strings.get(value) {
            return label.clone();
        }
        let label = format!(".LC{}", self.strings.len());
        self.strings.insert(value.to_string(), label.clone());
        self.data.push("    .align 8".to_string());
        self.data.push(format!("    .quad {}", value.len()));
        self.data.push(format!("{label}:"));
        self.data
            .push(format!("    .string \"{}\"", escape_asm(value)));
        label
    }

    pub fn float_label(&mut self, value: f64) -> String {
        let bits = value.to_bits();
        if let Some(label) = self.floats.get(&bits) {
            return label.clone();
        }
        let label = format!(".LCF{}", self.floats.len());
        self.floats.insert(bits, label.clone());
        self.rodata.push("    .align 8".to_string());
        self.rodata.push(format!("{label}:"));
        self.rodata.push(format!("    .double {value:?}"));
        label
    }

    // ------------------------------------------------------------------
    // Top level
    // ------------------------------------------------------------------

    pub fn generate(mut self) -> String {
        self.gen_globals();

        let units: Vec<&FuncUnit> = self.env.units.iter().collect();
        for unit in units {
            self.gen_func(unit);
        }

        let mut out = Vec::new();
        if !self.rodata.is_empty() {
            out.push(".section .rodata".to_string());
            out.append(&mut self.rodata);
        }
        if !self.data.is_empty() {
            out.push(".section .data".to_string());
            out.append(&mut self.data);
        }
        out.push(".text".to_string());
        let text = peephole::optimize(std::mem::take(&mut self.text));
        out.extend(text);

        if self.uses_str_concat {
            out.push(runtime::STR_CONCAT.to_string());
        }
        if self.uses_str_remove {
            out.push(runtime::STR_REMOVE.to_string());
        }
        if self.uses_arr {
            out.push(runtime::ARRAY_RUNTIME.to_string());
        }

        out.push(".section .note.GNU-stack,\"\",@progbits".to_string());
        out.join("\n") + "\n"
    }

    /// Globals: const bindings go to .rodata, the rest to .data, string
    /// literal pointers via their `.LC<n>` labels.
    fn gen_globals(&mut self) {
        let globals: Vec<(String, crate::sema::GlobalSym)> = self
            .env
            .globals
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        for (_, sym) in globals {
            let size = sym.ty.size(&self.env.types).max(1);
            let mut lines = Vec::new();
            lines.push(format!(".globl {}", sym.linkage));
            lines.push(format!("    .align {}", sym.ty.align(&self.env.types)));
            lines.push(format!("{}:", sym.linkage));
            match &sym.init {
                Some(Expr::Int(v, _)) => lines.push(data_directive(size, &format!("{v}"))),
                Some(Expr::Unary(UnaryOp::Neg, inner, _)) => {
                    if let Expr::Int(v, _) = inner.as_ref() {
                        lines.push(data_directive(size, &format!("-{v}")));
                    } else {
                        lines.push(format!("    .zero {size}"));
                    }
                }
                Some(Expr::Char(c, _)) => lines.push(data_directive(size, &format!("{}", *c as u32))),
                Some(Expr::Float(v, _)) => {
                    if size == 4 {
                        lines.push(format!("    .float {v:?}"));
                    } else {
                        lines.push(format!("    .double {v:?}"));
                    }
                }
                Some(Expr::Str(s, _)) => {
                    let label = self.string_label(s);
                    lines.push(format!("    .quad {label}"));
                }
                _ => lines.push(format!("    .zero {size}")),
            }
            if sym.is_const {
                self.rodata.extend(lines);
            } else {
                self.data.extend(lines);
            }
        }
    }

    // ------------------------------------------------------------------
    // Functions
    // ------------------------------------------------------------------

    fn gen_func(&mut self, unit: &FuncUnit) {
        let sym = &self.env.funcs[&unit.name];
        self.current_ns = unit.namespace.clone();
        self.current_ret = sym.ret.clone();
        self.is_main = unit.linkage == "main";
        self.scratch_depth = 0;
        self.scratch_max = 0;

        // Frame layout: every local gets a negative offset from %rbp,
        // parameters first so they are addressable uniformly.
        self.locals = IndexMap::new();
        let mut offset = 0i32;
        for (name, ty) in &unit.locals {
            let size = ty.size(&self.env.types).max(1) as i32;
            let align = ty.align(&self.env.types) as i32;
            offset -= size;
            offset -= offset.rem_euclid(align);
            self.locals.insert(name.clone(), (offset, ty.clone()));
        }
        self.frame_locals = -offset;

        // Body goes to a side buffer; the frame size is only known after
        // the scratch high-water mark is.
        let outer = std::mem::take(&mut self.text);
        self.spill_params(sym);
        for stmt in unit.decl.body.as_ref().unwrap() {
            self.gen_stmt(stmt);
        }
        if self.is_main {
            self.emit("mov $0, %eax");
        }
        self.emit("leave");
        self.emit("ret");
        let body = std::mem::replace(&mut self.text, outer);

        let frame = align16(self.frame_locals + 8 * self.scratch_max);
        self.text.push(format!(".globl {}", unit.linkage));
        self.text.push(format!(".type {}, @function", unit.linkage));
        self.text.push(format!("{}:", unit.linkage));
        self.emit("push %rbp");
        self.emit("mov %rsp, %rbp");
        if frame > 0 {
            self.emit(format!("sub ${frame}, %rsp"));
        }
        self.text.extend(body);
    }

    /// Parameters arrive in ABI registers and are spilled to their own
    /// frame slots on entry.
    fn spill_params(&mut self, sym: &crate::sema::FuncSym) {
        let mut int_idx = 0usize;
        let mut sse_idx = 0usize;
        let mut stack_off = 16i32;
        for (name, ty) in &sym.params {
            let off = self.locals[name.as_str()].0;
            match ty.abi_class() {
                AbiClass::ArrayTriple => {
                    if int_idx + 3 <= INT_ARG_REGS.len() {
                        for k in 0..3 {
                            let reg = INT_ARG_REGS[int_idx];
                            int_idx += 1;
                            self.emit(format!("mov {reg}, {}(%rbp)", off + 8 * k));
                        }
                    } else {
                        for k in 0..3 {
                            self.emit(format!("mov {stack_off}(%rbp), %rax"));
                            stack_off += 8;
                            self.emit(format!("mov %rax, {}(%rbp)", off + 8 * k));
                        }
                    }
                }
                AbiClass::Sse => {
                    let mov = if matches!(ty, Type::Float { width: 32 }) {
                        "movss"
                    } else {
                        "movsd"
                    };
                    if sse_idx < SSE_ARG_REGS.len() {
                        let reg = SSE_ARG_REGS[sse_idx];
                        sse_idx += 1;
                        self.emit(format!("{mov} {reg}, {off}(%rbp)"));
                    } else {
                        self.emit(format!("mov {stack_off}(%rbp), %rax"));
                        stack_off += 8;
                        self.emit(format!("mov %rax, {off}(%rbp)"));
                    }
                }
                AbiClass::Integer => {
                    if int_idx < INT_ARG_REGS.len() {
                        let reg = INT_ARG_REGS[int_idx];
                        int_idx += 1;
                        self.emit(format!("mov {reg}, {off}(%rbp)"));
                    } else {
                        self.emit(format!("mov {stack_off}(%rbp), %rax"));
                        stack_off += 8;
                        self.emit(format!("mov %rax, {off}(%rbp)"));
                    }
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn gen_block(&mut self, body: &[Stmt]) {
        for stmt in body {
            self.gen_stmt(stmt);
        }
    }

    fn gen_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Block(body, _) => self.gen_block(body),
            Stmt::Expr(e) => {
                self.gen_expr(e);
            }
            Stmt::Var { name, init, .. } => self.gen_var_decl(name, init.as_ref()),
            Stmt::Return(expr, _) => self.gen_return(expr.as_ref()),
            Stmt::If {
                cond, then, els, ..
            } => {
                let end = self.next_label("end");
                self.gen_expr(cond);
                self.emit("cmp $0, %rax");
                match els {
                    Some(els) => {
                        let else_label = self.next_label("else");
                        self.emit(format!("je {else_label}"));
                        self.gen_block(then);
                        self.emit(format!("jmp {end}"));
                        self.emit_label(&else_label);
                        self.gen_block(els);
                    }
                    None => {
                        self.emit(format!("je {end}"));
                        self.gen_block(then);
                    }
                }
                self.emit_label(&end);
            }
            Stmt::While { cond, body, .. } => {
                let cond_label = self.next_label("while_cond");
                let end = self.next_label("while_end");
                self.emit_label(&cond_label);
                self.gen_expr(cond);
                self.emit("cmp $0, %rax");
                self.emit(format!("je {end}"));
                self.gen_block(body);
                self.emit(format!("jmp {cond_label}"));
                self.emit_label(&end);
            }
            Stmt::DoWhile { body, cond, .. } => {
                let start = self.next_label("do_start");
                self.emit_label(&start);
                self.gen_block(body);
                self.gen_expr(cond);
                self.emit("cmp $0, %rax");
                self.emit(format!("jne {start}"));
            }
            Stmt::For {
                init,
                cond,
                step,
                body,
                ..
            } => {
                let cond_label = self.next_label("for_cond");
                let end = self.next_label("for_end");
                self.gen_stmt(init);
                self.emit_label(&cond_label);
                self.gen_expr(cond);
                self.emit("cmp $0, %rax");
                self.emit(format!("je {end}"));
                self.gen_block(body);
                self.gen_expr(step);
                self.emit(format!("jmp {cond_label}"));
                self.emit_label(&end);
            }
            Stmt::Foreach {
                index,
                value,
                iter,
                body,
                ..
            } => self.gen_foreach(index, value, iter, body),
        }
    }

    /// foreach(i, v in a) lowers to
    /// `i = 0; while (i < len(a)) { v = a[i]; <body>; i = i + 1; }`
    /// with `v` rebound each iteration.
    fn gen_foreach(&mut self, index: &str, value: &str, iter: &Expr, body: &[Stmt]) {
        self.set_arr_used();
        let i_off = self.locals[index].0;
        let (v_off, v_ty) = self.locals[value].clone();
        let elem_size = v_ty.size(&self.env.types).max(1);

        let cond_label = self.next_label("foreach_cond");
        let end = self.next_label("foreach_end");

        self.emit(format!("movq $0, {i_off}(%rbp)"));
        self.emit_label(&cond_label);
        let (addr, _) = self.get_lvalue(iter);
        self.emit(format!("lea {}, %rdi", addr.fmt()));
        self.emit("call __c5_arr_len");
        self.emit(format!("mov {i_off}(%rbp), %rcx"));
        self.emit("cmp %rax, %rcx");
        self.emit(format!("jge {end}"));

        // v = a[i]
        let (addr, _) = self.get_lvalue(iter);
        self.emit(format!("mov {}, %r11", addr.fmt()));
        self.emit(format!("mov {i_off}(%rbp), %rax"));
        self.emit(format!("imul ${elem_size}, %rax"));
        self.emit("add %rax, %r11");
        if v_ty.is_scalar() {
            self.load_scalar(&Addr::R11(0), &v_ty);
            self.store_scalar(&Addr::Frame(v_off), &v_ty);
        } else {
            self.emit(format!("lea {v_off}(%rbp), %rdi"));
            self.emit("mov %r11, %rsi");
            self.emit(format!("mov ${elem_size}, %rdx"));
            self.emit("call memcpy@PLT");
        }

        self.gen_block(body);
        self.emit(format!("incq {i_off}(%rbp)"));
        self.emit(format!("jmp {cond_label}"));
        self.emit_label(&end);
    }

    fn gen_var_decl(&mut self, name: &str, init: Option<&Expr>) {
        let (off, ty) = self.locals[name].clone();

        // Arrays declared without an initialiser start empty.
        if matches!(ty, Type::Array(_)) && init.is_none() {
            self.emit(format!("movq $0, {off}(%rbp)"));
            self.emit(format!("movq $0, {}(%rbp)", off + 8));
            self.emit(format!("movq $0, {}(%rbp)", off + 16));
            return;
        }
        let Some(init) = init else {
            return;
        };

        match (&ty, init) {
            (Type::Array(elem), Expr::ArrayLit(items, _)) => {
                self.gen_array_literal(off, elem, items);
            }
            (Type::Struct(key), Expr::ArrayLit(items, _)) => {
                let key = key.clone();
                self.gen_struct_literal(Addr::Frame(off), &key, items);
            }
            (Type::Array(_), Expr::Call(_, _, _)) => {
                // Array returns travel in %rax/%rdx/%rcx.
                self.gen_expr(init);
                self.emit(format!("mov %rax, {off}(%rbp)"));
                self.emit(format!("mov %rdx, {}(%rbp)", off + 8));
                self.emit(format!("mov %rcx, {}(%rbp)", off + 16));
            }
            (Type::Array(_), _) => {
                self.gen_expr(init);
                self.emit(format!("lea {off}(%rbp), %rdi"));
                self.emit("mov %rax, %rsi");
                self.emit("mov $24, %rdx");
                self.emit("call memcpy@PLT");
            }
            (Type::Struct(_) | Type::Union(_), _) => {
                let size = ty.size(&self.env.types);
                self.gen_expr(init);
                self.emit(format!("lea {off}(%rbp), %rdi"));
                self.emit("mov %rax, %rsi");
                self.emit(format!("mov ${size}, %rdx"));
                self.emit("call memcpy@PLT");
            }
            _ => {
                let value_ty = self.gen_expr(init);
                self.convert_scalar(&value_ty, &ty);
                self.store_scalar(&Addr::Frame(off), &ty);
            }
        }
    }

    /// Array literals lower to a malloc plus element-wise stores.
    fn gen_array_literal(&mut self, off: i32, elem: &Type, items: &[Expr]) {
        let elem_size = elem.size(&self.env.types).max(1);
        let count = items.len();
        let alloc = (count as u32 * elem_size).max(1);
        self.emit(format!("mov ${alloc}, %rdi"));
        self.emit("call malloc@PLT");
        self.emit(format!("mov %rax, {off}(%rbp)"));
        self.emit(format!("movq ${count}, {}(%rbp)", off + 8));
        self.emit(format!("movq ${count}, {}(%rbp)", off + 16));

        for (i, item) in items.iter().enumerate() {
            let elem_off = (i as u32 * elem_size) as i32;
            match (elem, item) {
                (Type::Struct(key), Expr::ArrayLit(fields, _)) => {
                    let key = key.clone();
                    // Build the struct in place inside the array buffer.
                    let info = &self.env.types.structs[&key];
                    let field_list: Vec<(Type, i32)> = info
                        .fields
                        .values()
                        .map(|f| (f.ty.clone(), f.offset as i32))
                        .collect();
                    for (value, (fty, foff)) in fields.iter().zip(field_list) {
                        let value_ty = self.gen_expr(value);
                        self.convert_scalar(&value_ty, &fty);
                        self.emit(format!("mov {off}(%rbp), %r11"));
                        self.store_scalar(&Addr::R11(elem_off + foff), &fty);
                    }
                }
                _ => {
                    let value_ty = self.gen_expr(item);
                    self.convert_scalar(&value_ty, elem);
                    self.emit(format!("mov {off}(%rbp), %r11"));
                    self.store_scalar(&Addr::R11(elem_off), elem);
                }
            }
        }
    }

    /// Struct literal: field-wise stores at the field offsets.
    pub fn gen_struct_literal(&mut self, base: Addr, key: &str, items: &[Expr]) {
        let field_list: Vec<(Type, i32)> = self.env.types.structs[key]
            .fields
            .values()
            .map(|f| (f.ty.clone(), f.offset as i32))
            .collect();
        for (value, (fty, foff)) in items.iter().zip(field_list) {
            let value_ty = self.gen_expr(value);
            self.convert_scalar(&value_ty, &fty);
            self.store_scalar(&base.offset(foff), &fty);
        }
    }

    fn gen_return(&mut self, expr: Option<&Expr>) {
        if let Some(expr) = expr {
            let ty = self.gen_expr(expr);
            if let Type::Array(_) = ty {
                // The 24-byte header returns as a %rax/%rdx/%rcx triple; a
                // call result already sits in those registers.
                if !matches!(expr, Expr::Call(_, _, _)) {
                    self.emit("mov %rax, %r11");
                    self.emit("mov 16(%r11), %rcx");
                    self.emit("mov 8(%r11), %rdx");
                    self.emit("mov (%r11), %rax");
                }
            } else {
                let ret = self.current_ret.clone();
                self.convert_scalar(&ty, &ret);
            }
        } else if self.is_main {
            self.emit("mov $0, %eax");
        }
        self.emit("leave");
        self.emit("ret");
    }

    // ------------------------------------------------------------------
    // Sized loads and stores
    // ------------------------------------------------------------------

    /// Loads honour the declared signedness of the source type: signed
    /// sub-quad loads sign-extend, unsigned ones zero-extend.
    pub fn load_scalar(&mut self, addr: &Addr, ty: &Type) {
        let a = addr.fmt();
        match ty {
            Type::Float { width: 32 } => self.emit(format!("movss {a}, %xmm0")),
            Type::Float { .. } => self.emit(format!("movsd {a}, %xmm0")),
            _ => {
                let unsigned = ty.is_unsigned();
                match ty.size(&self.env.types) {
                    1 => {
                        if unsigned {
                            self.emit(format!("movzbq {a}, %rax"));
                        } else {
                            self.emit(format!("movsbq {a}, %rax"));
                        }
                    }
                    2 => {
                        if unsigned {
                            self.emit(format!("movzwq {a}, %rax"));
                        } else {
                            self.emit(format!("movswq {a}, %rax"));
                        }
                    }
                    4 => {
                        if unsigned {
                            // movl zero-extends into the full register
                            self.emit(format!("movl {a}, %eax"));
                        } else {
                            self.emit(format!("movslq {a}, %rax"));
                        }
                    }
                    _ => self.emit(format!("mov {a}, %rax")),
                }
            }
        }
    }

    /// Stores use the size-suffixed form matching the declared type.
    pub fn store_scalar(&mut self, addr: &Addr, ty: &Type) {
        let a = addr.fmt();
        match ty {
            Type::Float { width: 32 } => self.emit(format!("movss %xmm0, {a}")),
            Type::Float { .. } => self.emit(format!("movsd %xmm0, {a}")),
            _ => match ty.size(&self.env.types) {
                1 => self.emit(format!("movb %al, {a}")),
                2 => self.emit(format!("movw %ax, {a}")),
                4 => self.emit(format!("movl %eax, {a}")),
                _ => self.emit(format!("movq %rax, {a}")),
            },
        }
    }

    /// Bridge a computed value to the slot type: float width changes and
    /// integer-literal-to-float binding.
    pub fn convert_scalar(&mut self, from: &Type, to: &Type) {
        match (from, to) {
            (Type::Float { width: 64 }, Type::Float { width: 32 }) => {
                self.emit("cvtsd2ss %xmm0, %xmm0");
            }
            (Type::Float { width: 32 }, Type::Float { width: 64 }) => {
                self.emit("cvtss2sd %xmm0, %xmm0");
            }
            (f, Type::Float { width }) if f.is_integer() => {
                if *width == 32 {
                    self.emit("cvtsi2ssq %rax, %xmm0");
                } else {
                    self.emit("cvtsi2sdq %rax, %xmm0");
                }
            }
            _ => {}
        }
    }
}

fn align16(n: i32) -> i32 {
    (n + 15) & !15
}

fn data_directive(size: u32, value: &str) -> String {
    match size {
        1 => format!("    .byte {value}"),
        2 => format!("    .short {value}"),
        4 => format!("    .long {value}"),
        _ => format!("    .quad {value}"),
    }
}

/// Escape a string literal for a GAS `.string` directive.
fn escape_asm(value: &str) -> String {
    let mut out = String::new();
    for byte in value.bytes() {
        match byte {
            b'\\' => out.push_str("\\\\"),
            b'"' => out.push_str("\\\""),
            b'\n' => out.push_str("\\n"),
            b'\t' => out.push_str("\\t"),
            b'\r' => out.push_str("\\r"),
            0x20..=0x7e => out.push(byte as char),
            _ => out.push_str(&format!("\\{byte:03o}")),
        }
    }
    out
}

/// Compile a checked translation unit to a GAS listing.
pub fn generate(env: &Analysis) -> String {
    CodeGen::new(env).generate()
}
