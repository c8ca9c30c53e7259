use crate::ast::*;
use crate::error::ParseError;
use crate::token::{Token, TokenKind, TokenKind::*};

pub struct Parser<'t> {
    tokens: &'t [Token],
    pos: usize,
    errors: Vec<ParseError>,
}

// ----------------------------------------------------------------------------
// Helpers
// ----------------------------------------------------------------------------

impl<'t> Parser<'t> {
    pub fn new(tokens: &'t [Token]) -> Self {
        Parser {
            tokens,
            pos: 0,
            errors: Vec::new(),
        }
    }

    fn skip_comments(&mut self) {
        while matches!(self.tokens.get(self.pos).map(|t| &t.kind), Some(Comment(_))) {
            self.pos += 1;
        }
    }

    /// Peek: watch next token without consuming it
    fn peek(&mut self) -> Option<&Token> {
        self.skip_comments();
        self.tokens.get(self.pos)
    }

    /// Peek the nth non-comment token ahead of the cursor
    fn peek_nth(&self, n: usize) -> Option<&Token> {
        self.tokens[self.pos..]
            .iter()
            .filter(|t| !matches!(t.kind, Comment(_)))
            .nth(n)
    }

    /// Next: consume next token and return it
    fn next(&mut self) -> Option<Token> {
        self.skip_comments();
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    /// Check next token matches a condition
    fn check_if<F: Fn(&Token) -> bool>(&mut self, cond: F) -> bool {
        self.peek().map_or(false, cond)
    }

    /// Consume the next token if it matches a condition
    fn consume_if<F: Fn(&Token) -> bool>(&mut self, cond: F) -> Option<Token> {
        if self.check_if(&cond) {
            self.next()
        } else {
            None
        }
    }

    /// Consume until the next token matches a condition
    fn consume_until<F: Fn(&Token) -> bool>(&mut self, cond: F) {
        while let Some(token) = self.peek() {
            if cond(token) {
                return;
            }
            self.next();
        }
    }

    /// Next token must match a condition
    fn expect_tobe<F: Fn(&Token) -> bool>(&mut self, cond: F) -> Result<Token, ParseError> {
        match self.peek().cloned() {
            Some(token) if cond(&token) => {
                self.next();
                Ok(token)
            }
            Some(token) => Err(ParseError::UnexpectedToken(token.text, token.pos)),
            None => Err(ParseError::UnexpectedEof),
        }
    }

    fn here(&mut self) -> crate::token::Pos {
        self.peek()
            .map(|t| t.pos.clone())
            .unwrap_or_else(crate::token::Pos::builtin)
    }

    fn error(&mut self, e: ParseError) {
        self.errors.push(e);
    }
}

macro_rules! check {
    ($parser:expr, $kind:pat) => {
        $parser.check_if(|token| matches!(&token.kind, $kind))
    };
}

macro_rules! expect {
    ($parser:expr, $kind:pat) => {
        $parser.expect_tobe(|token| matches!(&token.kind, $kind))
    };
}

macro_rules! optional {
    ($parser:expr, $trigger:pat, $following:expr) => {
        if check!($parser, $trigger) {
            expect!($parser, $trigger)?;
            Some($following)
        } else {
            None
        }
    };
    ($parser:expr, $trigger:pat) => {
        $parser.consume_if(|token| matches!(&token.kind, $trigger))
    };
}

/// Skip to the next statement terminator and consume it, so the next
/// declaration or statement starts clean.
macro_rules! recover {
    ($parser:expr) => {{
        $parser.consume_until(|token| matches!(&token.kind, Semicolon | RCurly));
        $parser.next();
    }};
}

macro_rules! repeat {
    // Without delimiter: { element } terminal
    ($parser:expr, $elem:expr, $terminal:pat) => {{
        let mut items = Vec::new();
        while !check!($parser, $terminal) {
            if $parser.peek().is_none() {
                return Err(ParseError::UnexpectedEof);
            }
            items.push($elem?);
        }
        items
    }};

    // With delimiter: [ element { delimiter element } ] terminal
    ($parser:expr, $elem:expr, $delimiter:pat, $terminal:pat) => {{
        let mut items = Vec::new();
        if !check!($parser, $terminal) {
            items.push($elem?);
            while check!($parser, $delimiter) {
                expect!($parser, $delimiter)?;
                items.push($elem?);
            }
        }
        items
    }};
}

// ----------------------------------------------------------------------------
// Declarations
// ----------------------------------------------------------------------------

impl<'t> Parser<'t> {
    pub fn parse(mut self) -> (Program, Vec<ParseError>) {
        let mut items = Vec::new();
        while self.peek().is_some() {
            match self.parse_item() {
                Ok(item) => items.push(item),
                Err(err) => {
                    self.error(err);
                    recover!(self);
                }
            }
        }
        (Program(items), self.errors)
    }

    /// decl = include | struct-decl | enum-decl | type-decl | global-var | macro-decl | fn-decl
    fn parse_item(&mut self) -> Result<Item, ParseError> {
        match self.peek().map(|t| t.kind.clone()) {
            Some(KwInclude) => self.parse_include(),
            Some(KwStruct) => self.parse_struct(),
            Some(KwEnum) => self.parse_enum(),
            Some(KwType) => self.parse_union(),
            Some(KwLet) => self.parse_global(),
            Some(KwMacro) => self.parse_macro(),
            Some(_) => self.parse_func(),
            None => Err(ParseError::UnexpectedEof),
        }
    }

    /// include = "include" "<" ident [ "." ident ] ">"
    fn parse_include(&mut self) -> Result<Item, ParseError> {
        let pos = self.here();
        expect!(self, KwInclude)?;
        expect!(self, LAngle)?;
        let mut name = self.parse_ident()?;
        if optional!(self, Period).is_some() {
            name.push('.');
            name.push_str(&self.parse_ident()?);
        }
        expect!(self, RAngle)?;
        Ok(Item::Include(name, pos))
    }

    /// struct-decl = "struct" ident "{" { type ident ";" } "}" ";"
    fn parse_struct(&mut self) -> Result<Item, ParseError> {
        let pos = self.here();
        expect!(self, KwStruct)?;
        let name = self.parse_ident()?;
        expect!(self, LCurly)?;
        let fields = repeat!(self, self.parse_field(), RCurly);
        expect!(self, RCurly)?;
        expect!(self, Semicolon)?;
        Ok(Item::Struct(StructDecl { name, fields, pos }))
    }

    fn parse_field(&mut self) -> Result<(TypeExpr, String), ParseError> {
        let ty = self.parse_type()?;
        let name = self.parse_ident()?;
        expect!(self, Semicolon)?;
        Ok((ty, name))
    }

    /// enum-decl = "enum" ident "{" ident { "," ident } "}" ";"
    fn parse_enum(&mut self) -> Result<Item, ParseError> {
        let pos = self.here();
        expect!(self, KwEnum)?;
        let name = self.parse_ident()?;
        expect!(self, LCurly)?;
        let variants = repeat!(self, self.parse_ident(), Comma, RCurly);
        expect!(self, RCurly)?;
        expect!(self, Semicolon)?;
        Ok(Item::Enum(EnumDecl {
            name,
            variants,
            pos,
        }))
    }

    /// type-decl = "type" ident "{" type { "," type } "}" ";"
    fn parse_union(&mut self) -> Result<Item, ParseError> {
        let pos = self.here();
        expect!(self, KwType)?;
        let name = self.parse_ident()?;
        expect!(self, LCurly)?;
        let variants = repeat!(self, self.parse_type(), Comma, RCurly);
        expect!(self, RCurly)?;
        expect!(self, Semicolon)?;
        Ok(Item::Union(UnionDecl {
            name,
            variants,
            pos,
        }))
    }

    /// global-var = "let" [ "const" ] type ident [ "=" expr ] ";"
    fn parse_global(&mut self) -> Result<Item, ParseError> {
        let pos = self.here();
        expect!(self, KwLet)?;
        let is_const = optional!(self, KwConst).is_some();
        let ty = self.parse_type()?;
        let name = self.parse_ident()?;
        let init = optional!(self, Equal, self.parse_expr()?);
        expect!(self, Semicolon)?;
        Ok(Item::Global(GlobalDecl {
            name,
            ty,
            is_const,
            init,
            pos,
        }))
    }

    /// macro-decl = "macro" ident "(" [ ident { "," ident } ] ")" "{" expr "}"
    fn parse_macro(&mut self) -> Result<Item, ParseError> {
        let pos = self.here();
        expect!(self, KwMacro)?;
        let name = self.parse_ident()?;
        expect!(self, LParen)?;
        let params = repeat!(self, self.parse_ident(), Comma, RParen);
        expect!(self, RParen)?;
        expect!(self, LCurly)?;
        let body = self.parse_expr()?;
        expect!(self, RCurly)?;
        Ok(Item::Macro(MacroDecl {
            name,
            params,
            body,
            pos,
        }))
    }

    /// fn-decl = type ident "(" [ param { "," param } ] [ "," "..." ] ")" ( ";" | block )
    fn parse_func(&mut self) -> Result<Item, ParseError> {
        let pos = self.here();
        let ret = self.parse_type()?;
        let name = self.parse_ident()?;
        expect!(self, LParen)?;
        let mut params = Vec::new();
        let mut varargs = false;
        if !check!(self, RParen) {
            loop {
                if optional!(self, Ellipsis).is_some() {
                    varargs = true;
                    break;
                }
                let ty = self.parse_type()?;
                let pname = self.parse_ident()?;
                params.push(Param { ty, name: pname });
                if optional!(self, Comma).is_none() {
                    break;
                }
            }
        }
        expect!(self, RParen)?;
        let body = if optional!(self, Semicolon).is_some() {
            None
        } else {
            Some(self.parse_block()?)
        };
        Ok(Item::Func(FuncDecl {
            name,
            ret,
            params,
            varargs,
            body,
            pos,
        }))
    }
}

// ----------------------------------------------------------------------------
// Types
// ----------------------------------------------------------------------------

const PRIMITIVE_NAMES: &[&str] = &["int", "float", "char", "string", "void", "array"];

impl<'t> Parser<'t> {
    /// type = [ "signed" | "unsigned" ] base-type { "*" }
    /// base-type = "int" [ "<" INT ">" ] | "float" [ "<" INT ">" ] | "char"
    ///           | "string" | "void" | "array" "<" type ">" | ident [ "::" ident ]
    fn parse_type(&mut self) -> Result<TypeExpr, ParseError> {
        let sign = if optional!(self, KwSigned).is_some() {
            Some(true)
        } else if optional!(self, KwUnsigned).is_some() {
            Some(false)
        } else {
            None
        };

        let name = self.parse_ident()?;
        let mut ty = match name.as_str() {
            "int" => TypeExpr::Int {
                width: self.parse_width(64)?,
                signed: sign.unwrap_or(true),
            },
            "float" => TypeExpr::Float {
                width: self.parse_width(64)?,
            },
            "char" => TypeExpr::Char,
            "string" => TypeExpr::Str,
            "void" => TypeExpr::Void,
            "array" => {
                expect!(self, LAngle)?;
                let elem = self.parse_type()?;
                expect!(self, RAngle)?;
                TypeExpr::Array(Box::new(elem))
            }
            _ => {
                let mut path = vec![name];
                if optional!(self, ColonColon).is_some() {
                    path.push(self.parse_ident()?);
                }
                TypeExpr::Named(path)
            }
        };

        while optional!(self, Star).is_some() {
            ty = TypeExpr::Ptr(Box::new(ty));
        }
        Ok(ty)
    }

    /// Optional "<" INT ">" width suffix on int/float.
    fn parse_width(&mut self, default: u32) -> Result<u32, ParseError> {
        if optional!(self, LAngle).is_none() {
            return Ok(default);
        }
        let token = expect!(self, Int(_))?;
        let width = match token.kind {
            Int(w @ (8 | 16 | 32 | 64)) => w as u32,
            _ => return Err(ParseError::UnexpectedToken(token.text, token.pos)),
        };
        expect!(self, RAngle)?;
        Ok(width)
    }

    fn parse_ident(&mut self) -> Result<String, ParseError> {
        let token = expect!(self, Ident(_))?;
        match token.kind {
            Ident(name) => Ok(name),
            _ => unreachable!(),
        }
    }
}

// ----------------------------------------------------------------------------
// Statements
// ----------------------------------------------------------------------------

impl<'t> Parser<'t> {
    fn parse_block(&mut self) -> Result<Vec<Stmt>, ParseError> {
        expect!(self, LCurly)?;
        let stmts = repeat!(self, self.parse_stmt(), RCurly);
        expect!(self, RCurly)?;
        Ok(stmts)
    }

    /// Looks ahead to decide whether the statement at the cursor is a
    /// variable declaration: `[const] [signed|unsigned] type ident ...`.
    fn starts_decl(&mut self) -> bool {
        match self.peek().map(|t| t.kind.clone()) {
            Some(KwConst | KwSigned | KwUnsigned) => true,
            Some(Ident(name)) => {
                if PRIMITIVE_NAMES.contains(&name.as_str()) {
                    // `cast<...>` and `c_str(...)` are expressions, everything
                    // else named like a primitive opens a declaration
                    return true;
                }
                // ident [ "::" ident ] { "*" } ident
                let mut n = 1;
                if matches!(self.peek_nth(n).map(|t| &t.kind), Some(ColonColon)) {
                    if !matches!(self.peek_nth(n + 1).map(|t| &t.kind), Some(Ident(_))) {
                        return false;
                    }
                    n += 2;
                }
                while matches!(self.peek_nth(n).map(|t| &t.kind), Some(Star)) {
                    n += 1;
                }
                matches!(self.peek_nth(n).map(|t| &t.kind), Some(Ident(_)))
            }
            _ => false,
        }
    }

    /// stmt = block | if | while | do-while | for | foreach | return | var-decl | expr ";"
    fn parse_stmt(&mut self) -> Result<Stmt, ParseError> {
        let pos = self.here();
        match self.peek().map(|t| t.kind.clone()) {
            Some(LCurly) => Ok(Stmt::Block(self.parse_block()?, pos)),
            Some(KwIf) => self.parse_if(),
            Some(KwWhile) => self.parse_while(),
            Some(KwDo) => self.parse_do_while(),
            Some(KwFor) => self.parse_for(),
            Some(KwForeach) => self.parse_foreach(),
            Some(KwReturn) => self.parse_return(),
            Some(_) if self.starts_decl() => self.parse_var_decl(),
            Some(_) => {
                let expr = self.parse_expr()?;
                expect!(self, Semicolon)?;
                Ok(Stmt::Expr(expr))
            }
            None => Err(ParseError::UnexpectedEof),
        }
    }

    /// var-decl = [ "const" ] type ident [ "=" expr ] ";"
    fn parse_var_decl(&mut self) -> Result<Stmt, ParseError> {
        let pos = self.here();
        let is_const = optional!(self, KwConst).is_some();
        let ty = self.parse_type()?;
        let name = self.parse_ident()?;
        let init = optional!(self, Equal, self.parse_expr()?);
        expect!(self, Semicolon)?;
        Ok(Stmt::Var {
            name,
            ty,
            is_const,
            init,
            pos,
        })
    }

    /// if = "if" "(" expr ")" block [ "else" ( if | block ) ]
    fn parse_if(&mut self) -> Result<Stmt, ParseError> {
        let pos = self.here();
        expect!(self, KwIf)?;
        expect!(self, LParen)?;
        let cond = self.parse_expr()?;
        expect!(self, RParen)?;
        let then = self.parse_block()?;
        let els = if optional!(self, KwElse).is_some() {
            if check!(self, KwIf) {
                Some(vec![self.parse_if()?])
            } else {
                Some(self.parse_block()?)
            }
        } else {
            None
        };
        Ok(Stmt::If {
            cond,
            then,
            els,
            pos,
        })
    }

    /// while = "while" "(" expr ")" block
    fn parse_while(&mut self) -> Result<Stmt, ParseError> {
        let pos = self.here();
        expect!(self, KwWhile)?;
        expect!(self, LParen)?;
        let cond = self.parse_expr()?;
        expect!(self, RParen)?;
        let body = self.parse_block()?;
        Ok(Stmt::While { cond, body, pos })
    }

    /// do-while = "do" block "while" "(" expr ")" ";"
    fn parse_do_while(&mut self) -> Result<Stmt, ParseError> {
        let pos = self.here();
        expect!(self, KwDo)?;
        let body = self.parse_block()?;
        expect!(self, KwWhile)?;
        expect!(self, LParen)?;
        let cond = self.parse_expr()?;
        expect!(self, RParen)?;
        expect!(self, Semicolon)?;
        Ok(Stmt::DoWhile { body, cond, pos })
    }

    /// for = "for" "(" stmt expr ";" expr ")" block
    fn parse_for(&mut self) -> Result<Stmt, ParseError> {
        let pos = self.here();
        expect!(self, KwFor)?;
        expect!(self, LParen)?;
        let init = Box::new(self.parse_stmt()?);
        let cond = self.parse_expr()?;
        expect!(self, Semicolon)?;
        let step = self.parse_expr()?;
        expect!(self, RParen)?;
        let body = self.parse_block()?;
        Ok(Stmt::For {
            init,
            cond,
            step,
            body,
            pos,
        })
    }

    /// foreach = "foreach" "(" ident "," ident "in" expr ")" block
    fn parse_foreach(&mut self) -> Result<Stmt, ParseError> {
        let pos = self.here();
        expect!(self, KwForeach)?;
        expect!(self, LParen)?;
        let index = self.parse_ident()?;
        expect!(self, Comma)?;
        let value = self.parse_ident()?;
        expect!(self, KwIn)?;
        let iter = self.parse_expr()?;
        expect!(self, RParen)?;
        let body = self.parse_block()?;
        Ok(Stmt::Foreach {
            index,
            value,
            iter,
            body,
            pos,
        })
    }

    /// return = "return" [ expr ] ";"
    fn parse_return(&mut self) -> Result<Stmt, ParseError> {
        let pos = self.here();
        expect!(self, KwReturn)?;
        let expr = if check!(self, Semicolon) {
            None
        } else {
            Some(self.parse_expr()?)
        };
        expect!(self, Semicolon)?;
        Ok(Stmt::Return(expr, pos))
    }
}

// ----------------------------------------------------------------------------
// Expressions. Precedence climbing; lowest to highest:
// `=`, `||`, `&&`, `| ^ &`, `== !=`, `< <= > >=`, `<< >>`, `+ -`, `* / %`,
// unary, postfix.
// ----------------------------------------------------------------------------

fn binary_op(kind: &TokenKind) -> Option<(BinOp, u8)> {
    match kind {
        PipePipe => Some((BinOp::Or, 1)),
        AmpAmp => Some((BinOp::And, 2)),
        Pipe => Some((BinOp::BitOr, 3)),
        Caret => Some((BinOp::BitXor, 3)),
        Amp => Some((BinOp::BitAnd, 3)),
        EqualEqual => Some((BinOp::Eq, 4)),
        ExclEqual => Some((BinOp::Ne, 4)),
        LAngle => Some((BinOp::Lt, 5)),
        LAngleEqual => Some((BinOp::Le, 5)),
        RAngle => Some((BinOp::Gt, 5)),
        RAngleEqual => Some((BinOp::Ge, 5)),
        LAngleLAngle => Some((BinOp::Shl, 6)),
        RAngleRAngle => Some((BinOp::Shr, 6)),
        Plus => Some((BinOp::Add, 7)),
        Minus => Some((BinOp::Sub, 7)),
        Star => Some((BinOp::Mul, 8)),
        Slash => Some((BinOp::Div, 8)),
        Percent => Some((BinOp::Mod, 8)),
        _ => None,
    }
}

fn compound_op(kind: &TokenKind) -> Option<BinOp> {
    match kind {
        PlusEqual => Some(BinOp::Add),
        MinusEqual => Some(BinOp::Sub),
        StarEqual => Some(BinOp::Mul),
        SlashEqual => Some(BinOp::Div),
        PercentEqual => Some(BinOp::Mod),
        _ => None,
    }
}

impl<'t> Parser<'t> {
    /// expr = binary [ ( "=" | "+=" | "-=" | "*=" | "/=" | "%=" ) expr ]
    pub fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        let lhs = self.parse_binary(1)?;
        let pos = self.here();
        if optional!(self, Equal).is_some() {
            let rhs = self.parse_expr()?;
            return Ok(Expr::Assign(Box::new(lhs), Box::new(rhs), pos));
        }
        if let Some(op) = self.peek().and_then(|t| compound_op(&t.kind)) {
            self.next();
            let rhs = self.parse_expr()?;
            // `a += b` desugars to `a = a + b`
            let sum = Expr::Binary(op, Box::new(lhs.clone()), Box::new(rhs), pos.clone());
            return Ok(Expr::Assign(Box::new(lhs), Box::new(sum), pos));
        }
        Ok(lhs)
    }

    fn parse_binary(&mut self, min_bp: u8) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_unary()?;
        while let Some((op, bp)) = self.peek().and_then(|t| binary_op(&t.kind)) {
            if bp < min_bp {
                break;
            }
            let pos = self.here();
            self.next();
            let rhs = self.parse_binary(bp + 1)?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs), pos);
        }
        Ok(lhs)
    }

    /// unary = ( "!" | "~" | "-" | "*" | "&" | "++" ) unary | postfix
    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        let pos = self.here();
        let op = match self.peek().map(|t| &t.kind) {
            Some(Excl) => Some(UnaryOp::Not),
            Some(Tilde) => Some(UnaryOp::BitNot),
            Some(Minus) => Some(UnaryOp::Neg),
            Some(Star) => Some(UnaryOp::Deref),
            Some(Amp) => Some(UnaryOp::Addr),
            Some(PlusPlus) => Some(UnaryOp::PreInc),
            _ => None,
        };
        if let Some(op) = op {
            self.next();
            let target = self.parse_unary()?;
            return Ok(Expr::Unary(op, Box::new(target), pos));
        }
        self.parse_postfix()
    }

    /// postfix = primary { "(" args ")" | "[" expr "]" | "." ident | "->" ident }
    fn parse_postfix(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_primary()?;
        loop {
            let pos = self.here();
            if optional!(self, LParen).is_some() {
                let args = repeat!(self, self.parse_expr(), Comma, RParen);
                expect!(self, RParen)?;
                expr = Expr::Call(Box::new(expr), args, pos);
                continue;
            }
            if optional!(self, LBracket).is_some() {
                let index = self.parse_expr()?;
                expect!(self, RBracket)?;
                expr = Expr::Index(Box::new(expr), Box::new(index), pos);
                continue;
            }
            if optional!(self, Period).is_some() {
                let field = self.parse_ident()?;
                expr = Expr::Member(Box::new(expr), field, pos);
                continue;
            }
            if optional!(self, Arrow).is_some() {
                let field = self.parse_ident()?;
                expr = Expr::Arrow(Box::new(expr), field, pos);
                continue;
            }
            break;
        }
        Ok(expr)
    }

    /// primary = "(" expr ")" | literal | array-lit | lambda | cast | c_str
    ///         | ident { "::" ident }
    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        let pos = self.here();
        match self.peek().map(|t| t.kind.clone()) {
            Some(LParen) => {
                expect!(self, LParen)?;
                let inner = self.parse_expr()?;
                expect!(self, RParen)?;
                Ok(inner)
            }
            Some(Int(v)) => {
                self.next();
                Ok(Expr::Int(v, pos))
            }
            Some(Float(v)) => {
                self.next();
                Ok(Expr::Float(v, pos))
            }
            Some(Char(c)) => {
                self.next();
                Ok(Expr::Char(c, pos))
            }
            Some(Str(s)) => {
                self.next();
                Ok(Expr::Str(s, pos))
            }
            Some(LCurly) => {
                expect!(self, LCurly)?;
                let items = repeat!(self, self.parse_expr(), Comma, RCurly);
                expect!(self, RCurly)?;
                Ok(Expr::ArrayLit(items, pos))
            }
            Some(KwFnct) => self.parse_lambda(),
            Some(Ident(name)) if name == "cast" && matches!(self.peek_nth(1).map(|t| &t.kind), Some(LAngle)) => {
                self.next();
                expect!(self, LAngle)?;
                let ty = self.parse_type()?;
                expect!(self, RAngle)?;
                expect!(self, LParen)?;
                let inner = self.parse_expr()?;
                expect!(self, RParen)?;
                Ok(Expr::Cast(ty, Box::new(inner), pos))
            }
            Some(Ident(name)) if name == "c_str" && matches!(self.peek_nth(1).map(|t| &t.kind), Some(LParen)) => {
                self.next();
                expect!(self, LParen)?;
                let inner = self.parse_expr()?;
                expect!(self, RParen)?;
                Ok(Expr::CStr(Box::new(inner), pos))
            }
            Some(Ident(_)) => {
                let mut path = vec![self.parse_ident()?];
                while optional!(self, ColonColon).is_some() {
                    path.push(self.parse_ident()?);
                }
                Ok(Expr::Path(path, pos))
            }
            Some(_) => {
                let token = self.next().unwrap();
                Err(ParseError::UnexpectedToken(token.text, token.pos))
            }
            None => Err(ParseError::UnexpectedEof),
        }
    }

    /// lambda = "fnct" "(" [ param { "," param } ] ")" block
    fn parse_lambda(&mut self) -> Result<Expr, ParseError> {
        let pos = self.here();
        expect!(self, KwFnct)?;
        expect!(self, LParen)?;
        let mut params = Vec::new();
        if !check!(self, RParen) {
            loop {
                let ty = self.parse_type()?;
                let name = self.parse_ident()?;
                params.push(Param { ty, name });
                if optional!(self, Comma).is_none() {
                    break;
                }
            }
        }
        expect!(self, RParen)?;
        let body = self.parse_block()?;
        Ok(Expr::Lambda(params, body, pos))
    }
}

/// Parse a full token stream into a program.
pub fn parse(tokens: &[Token]) -> (Program, Vec<ParseError>) {
    Parser::new(tokens).parse()
}
