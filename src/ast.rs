use crate::token::Pos;
use itertools::Itertools;
use std::fmt;

#[derive(Debug, Clone)]
pub struct Program(pub Vec<Item>); // program = { include | decl }

#[derive(Debug, Clone)]
pub enum Item {
    Include(String, Pos),   // "include" "<" name ">"
    Func(FuncDecl),         // [sign]? type ident "(" params ")" ( ";" | block )
    Struct(StructDecl),     // "struct" ident "{" { type ident ";" } "}" ";"
    Enum(EnumDecl),         // "enum" ident "{" ident { "," ident } "}" ";"
    Union(UnionDecl),       // "type" ident "{" type { "," type } "}" ";"
    Global(GlobalDecl),     // "let" [ "const" ] type ident [ "=" expr ] ";"
    Macro(MacroDecl),       // "macro" ident "(" idents ")" "{" expr "}"
}

#[derive(Debug, Clone)]
pub struct FuncDecl {
    pub name: String,
    pub ret: TypeExpr,
    pub params: Vec<Param>,
    pub varargs: bool,
    /// `None` for a prototype.
    pub body: Option<Vec<Stmt>>,
    pub pos: Pos,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub ty: TypeExpr,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct StructDecl {
    pub name: String,
    pub fields: Vec<(TypeExpr, String)>,
    pub pos: Pos,
}

#[derive(Debug, Clone)]
pub struct EnumDecl {
    pub name: String,
    pub variants: Vec<String>,
    pub pos: Pos,
}

#[derive(Debug, Clone)]
pub struct UnionDecl {
    pub name: String,
    pub variants: Vec<TypeExpr>,
    pub pos: Pos,
}

#[derive(Debug, Clone)]
pub struct GlobalDecl {
    pub name: String,
    pub ty: TypeExpr,
    pub is_const: bool,
    pub init: Option<Expr>,
    pub pos: Pos,
}

#[derive(Debug, Clone)]
pub struct MacroDecl {
    pub name: String,
    pub params: Vec<String>,
    pub body: Expr,
    pub pos: Pos,
}

/// Syntactic type as written in the source. Resolution into a semantic
/// [`Type`](crate::types::Type) happens during analysis.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeExpr {
    Int { width: u32, signed: bool }, // "int" [ "<" INT ">" ]
    Float { width: u32 },             // "float" [ "<" INT ">" ]
    Char,                             // "char"
    Str,                              // "string"
    Void,                             // "void"
    Array(Box<TypeExpr>),             // "array" "<" type ">"
    Named(Vec<String>),               // ident [ "::" ident ]
    Ptr(Box<TypeExpr>),               // type "*"
}

#[derive(Debug, Clone)]
pub enum Stmt {
    Block(Vec<Stmt>, Pos),
    If {
        cond: Expr,
        then: Vec<Stmt>,
        els: Option<Vec<Stmt>>,
        pos: Pos,
    },
    While {
        cond: Expr,
        body: Vec<Stmt>,
        pos: Pos,
    },
    DoWhile {
        body: Vec<Stmt>,
        cond: Expr,
        pos: Pos,
    },
    For {
        init: Box<Stmt>,
        cond: Expr,
        step: Expr,
        body: Vec<Stmt>,
        pos: Pos,
    },
    // foreach "(" ident "," ident "in" expr ")" block
    Foreach {
        index: String,
        value: String,
        iter: Expr,
        body: Vec<Stmt>,
        pos: Pos,
    },
    Return(Option<Expr>, Pos),
    Var {
        name: String,
        ty: TypeExpr,
        is_const: bool,
        init: Option<Expr>,
        pos: Pos,
    },
    Expr(Expr),
}

#[derive(Debug, Clone)]
pub enum Expr {
    Int(u64, Pos),
    Float(f64, Pos),
    Char(char, Pos),
    Str(String, Pos),
    /// Identifier, optionally namespace-qualified: `x`, `ns::x`, `ns::Enum::V`.
    Path(Vec<String>, Pos),
    Unary(UnaryOp, Box<Expr>, Pos),
    Binary(BinOp, Box<Expr>, Box<Expr>, Pos),
    Assign(Box<Expr>, Box<Expr>, Pos),
    Call(Box<Expr>, Vec<Expr>, Pos),
    Index(Box<Expr>, Box<Expr>, Pos),
    Member(Box<Expr>, String, Pos),
    Arrow(Box<Expr>, String, Pos),
    Cast(TypeExpr, Box<Expr>, Pos),   // cast "<" type ">" "(" expr ")"
    CStr(Box<Expr>, Pos),             // c_str "(" expr ")"
    ArrayLit(Vec<Expr>, Pos),         // "{" [ expr { "," expr } ] "}"
    Lambda(Vec<Param>, Vec<Stmt>, Pos), // fnct "(" params ")" block
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,    // '-'
    Not,    // '!'
    BitNot, // '~'
    Deref,  // '*'
    Addr,   // '&'
    PreInc, // '++'
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add, // '+'
    Sub, // '-'
    Mul, // '*'
    Div, // '/'
    Mod, // '%'
    Eq,  // '=='
    Ne,  // '!='
    Lt,  // '<'
    Le,  // '<='
    Gt,  // '>'
    Ge,  // '>='
    And, // '&&'
    Or,  // '||'
    BitAnd, // '&'
    BitOr,  // '|'
    BitXor, // '^'
    Shl,    // '<<'
    Shr,    // '>>'
}

impl Expr {
    pub fn pos(&self) -> &Pos {
        match self {
            Expr::Int(_, p)
            | Expr::Float(_, p)
            | Expr::Char(_, p)
            | Expr::Str(_, p)
            | Expr::Path(_, p)
            | Expr::Unary(_, _, p)
            | Expr::Binary(_, _, _, p)
            | Expr::Assign(_, _, p)
            | Expr::Call(_, _, p)
            | Expr::Index(_, _, p)
            | Expr::Member(_, _, p)
            | Expr::Arrow(_, _, p)
            | Expr::Cast(_, _, p)
            | Expr::CStr(_, p)
            | Expr::ArrayLit(_, p)
            | Expr::Lambda(_, _, p) => p,
        }
    }
}

impl Stmt {
    pub fn pos(&self) -> &Pos {
        match self {
            Stmt::Block(_, p)
            | Stmt::If { pos: p, .. }
            | Stmt::While { pos: p, .. }
            | Stmt::DoWhile { pos: p, .. }
            | Stmt::For { pos: p, .. }
            | Stmt::Foreach { pos: p, .. }
            | Stmt::Return(_, p)
            | Stmt::Var { pos: p, .. } => p,
            Stmt::Expr(e) => e.pos(),
        }
    }
}

// ----------------------------------------------------------------------------
// Pretty printing. Printing a parsed program and re-lexing it yields the
// original token sequence (up to whitespace), which the parser tests rely on.
// ----------------------------------------------------------------------------

impl fmt::Display for TypeExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeExpr::Int { width, signed } => {
                if !signed {
                    write!(f, "unsigned ")?;
                }
                write!(f, "int<{width}>")
            }
            TypeExpr::Float { width } => write!(f, "float<{width}>"),
            TypeExpr::Char => write!(f, "char"),
            TypeExpr::Str => write!(f, "string"),
            TypeExpr::Void => write!(f, "void"),
            TypeExpr::Array(elem) => write!(f, "array<{elem}>"),
            TypeExpr::Named(path) => write!(f, "{}", path.join("::")),
            TypeExpr::Ptr(inner) => write!(f, "{inner}*"),
        }
    }
}

impl BinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "%",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::And => "&&",
            BinOp::Or => "||",
            BinOp::BitAnd => "&",
            BinOp::BitOr => "|",
            BinOp::BitXor => "^",
            BinOp::Shl => "<<",
            BinOp::Shr => ">>",
        }
    }
}

impl UnaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOp::Neg => "-",
            UnaryOp::Not => "!",
            UnaryOp::BitNot => "~",
            UnaryOp::Deref => "*",
            UnaryOp::Addr => "&",
            UnaryOp::PreInc => "++",
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Int(v, _) => write!(f, "{v}"),
            Expr::Float(v, _) => {
                if v.fract() == 0.0 {
                    write!(f, "{v:.1}")
                } else {
                    write!(f, "{v}")
                }
            }
            Expr::Char(c, _) => write!(f, "'{}'", c.escape_default()),
            Expr::Str(s, _) => write!(f, "\"{}\"", s.escape_default()),
            Expr::Path(path, _) => write!(f, "{}", path.join("::")),
            Expr::Unary(op, e, _) => write!(f, "{}({e})", op.symbol()),
            Expr::Binary(op, l, r, _) => write!(f, "({l} {} {r})", op.symbol()),
            Expr::Assign(l, r, _) => write!(f, "{l} = {r}"),
            Expr::Call(callee, args, _) => {
                write!(f, "{callee}({})", args.iter().join(", "))
            }
            Expr::Index(base, idx, _) => write!(f, "{base}[{idx}]"),
            Expr::Member(base, field, _) => write!(f, "{base}.{field}"),
            Expr::Arrow(base, field, _) => write!(f, "{base}->{field}"),
            Expr::Cast(ty, e, _) => write!(f, "cast<{ty}>({e})"),
            Expr::CStr(e, _) => write!(f, "c_str({e})"),
            Expr::ArrayLit(items, _) => write!(f, "{{{}}}", items.iter().join(", ")),
            Expr::Lambda(params, body, _) => {
                write!(
                    f,
                    "fnct({})",
                    params.iter().map(|p| format!("{} {}", p.ty, p.name)).join(", ")
                )?;
                write!(f, " {{ ")?;
                for stmt in body {
                    write!(f, "{stmt} ")?;
                }
                write!(f, "}}")
            }
        }
    }
}

fn write_block(f: &mut fmt::Formatter<'_>, body: &[Stmt]) -> fmt::Result {
    write!(f, "{{ ")?;
    for stmt in body {
        write!(f, "{stmt} ")?;
    }
    write!(f, "}}")
}

impl fmt::Display for Stmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stmt::Block(body, _) => write_block(f, body),
            Stmt::If {
                cond, then, els, ..
            } => {
                write!(f, "if ({cond}) ")?;
                write_block(f, then)?;
                if let Some(els) = els {
                    write!(f, " else ")?;
                    write_block(f, els)?;
                }
                Ok(())
            }
            Stmt::While { cond, body, .. } => {
                write!(f, "while ({cond}) ")?;
                write_block(f, body)
            }
            Stmt::DoWhile { body, cond, .. } => {
                write!(f, "do ")?;
                write_block(f, body)?;
                write!(f, " while ({cond});")
            }
            Stmt::For {
                init,
                cond,
                step,
                body,
                ..
            } => {
                write!(f, "for ({init} {cond}; {step}) ")?;
                write_block(f, body)
            }
            Stmt::Foreach {
                index,
                value,
                iter,
                body,
                ..
            } => {
                write!(f, "foreach ({index}, {value} in {iter}) ")?;
                write_block(f, body)
            }
            Stmt::Return(Some(e), _) => write!(f, "return {e};"),
            Stmt::Return(None, _) => write!(f, "return;"),
            Stmt::Var {
                name,
                ty,
                is_const,
                init,
                ..
            } => {
                if *is_const {
                    write!(f, "const ")?;
                }
                write!(f, "{ty} {name}")?;
                if let Some(init) = init {
                    write!(f, " = {init}")?;
                }
                write!(f, ";")
            }
            Stmt::Expr(e) => write!(f, "{e};"),
        }
    }
}

impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Item::Include(name, _) => write!(f, "include <{name}>"),
            Item::Func(func) => {
                write!(
                    f,
                    "{} {}({}",
                    func.ret,
                    func.name,
                    func.params
                        .iter()
                        .map(|p| format!("{} {}", p.ty, p.name))
                        .join(", ")
                )?;
                if func.varargs {
                    if func.params.is_empty() {
                        write!(f, "...")?;
                    } else {
                        write!(f, ", ...")?;
                    }
                }
                write!(f, ")")?;
                match &func.body {
                    Some(body) => {
                        write!(f, " ")?;
                        write_block(f, body)
                    }
                    None => write!(f, ";"),
                }
            }
            Item::Struct(s) => {
                write!(f, "struct {} {{ ", s.name)?;
                for (ty, name) in &s.fields {
                    write!(f, "{ty} {name}; ")?;
                }
                write!(f, "}};")
            }
            Item::Enum(e) => {
                write!(f, "enum {} {{ {} }};", e.name, e.variants.iter().join(", "))
            }
            Item::Union(u) => {
                write!(f, "type {} {{ {} }};", u.name, u.variants.iter().join(", "))
            }
            Item::Global(g) => {
                write!(f, "let ")?;
                if g.is_const {
                    write!(f, "const ")?;
                }
                write!(f, "{} {}", g.ty, g.name)?;
                if let Some(init) = &g.init {
                    write!(f, " = {init}")?;
                }
                write!(f, ";")
            }
            Item::Macro(m) => {
                write!(
                    f,
                    "macro {}({}) {{ {} }}",
                    m.name,
                    m.params.iter().join(", "),
                    m.body
                )
            }
        }
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for item in &self.0 {
            writeln!(f, "{item}")?;
        }
        Ok(())
    }
}
