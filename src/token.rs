use std::fmt;
use std::rc::Rc;

/// Source position of a token or AST node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pos {
    pub file: Rc<str>,
    pub line: u32,
    pub col: u32,
    /// Byte offset into the source buffer.
    pub offset: u32,
}

impl Pos {
    pub fn new(file: Rc<str>, line: u32, col: u32, offset: u32) -> Self {
        Pos {
            file,
            line,
            col,
            offset,
        }
    }

    /// Placeholder position for synthesised nodes (lifted lambdas, macro
    /// expansions keep the invocation site instead).
    pub fn builtin() -> Self {
        Pos {
            file: Rc::from("<builtin>"),
            line: 0,
            col: 0,
            offset: 0,
        }
    }
}

impl fmt::Display for Pos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.col)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Original lexeme as written in the source.
    pub text: String,
    pub pos: Pos,
}

impl Token {
    pub fn new(kind: TokenKind, text: impl Into<String>, pos: Pos) -> Self {
        Token {
            kind,
            text: text.into(),
            pos,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // Three character tokens
    Ellipsis, // '...'

    // Double character tokens
    ColonColon,   // '::'
    Arrow,        // '->'
    EqualEqual,   // '=='
    ExclEqual,    // '!='
    LAngleEqual,  // '<='
    RAngleEqual,  // '>='
    LAngleLAngle, // '<<'
    RAngleRAngle, // '>>'
    AmpAmp,       // '&&'
    PipePipe,     // '||'
    PlusEqual,    // '+='
    MinusEqual,   // '-='
    StarEqual,    // '*='
    SlashEqual,   // '/='
    PercentEqual, // '%='
    PlusPlus,     // '++'

    // Single character tokens
    Equal,     // '='
    Plus,      // '+'
    Minus,     // '-'
    Star,      // '*'
    Slash,     // '/'
    Percent,   // '%'
    Amp,       // '&'
    Pipe,      // '|'
    Caret,     // '^'
    Tilde,     // '~'
    Excl,      // '!'
    Colon,     // ':'
    Semicolon, // ';'
    Comma,     // ','
    Period,    // '.'
    LParen,    // '('
    RParen,    // ')'
    LBracket,  // '['
    RBracket,  // ']'
    LCurly,    // '{'
    RCurly,    // '}'
    LAngle,    // '<'
    RAngle,    // '>'

    // Keywords
    KwInclude,  // "include"
    KwIf,       // "if"
    KwElse,     // "else"
    KwWhile,    // "while"
    KwDo,       // "do"
    KwFor,      // "for"
    KwForeach,  // "foreach"
    KwIn,       // "in"
    KwReturn,   // "return"
    KwStruct,   // "struct"
    KwEnum,     // "enum"
    KwType,     // "type"
    KwLet,      // "let"
    KwConst,    // "const"
    KwMacro,    // "macro"
    KwSigned,   // "signed"
    KwUnsigned, // "unsigned"
    KwFnct,     // "fnct"

    // Identifier (type names like "int" or "array" stay identifiers; the
    // parser reassembles e.g. `int < 32 >` contextually)
    Ident(String),

    // Literals
    Int(u64),
    Float(f64),
    Char(char),
    Str(String),

    // Comment, skipped by the parser
    Comment(String),
}

impl TokenKind {
    #[inline]
    pub fn is_sign_specifier(&self) -> bool {
        matches!(self, TokenKind::KwSigned | TokenKind::KwUnsigned)
    }

    #[inline]
    pub fn is_compound_assign(&self) -> bool {
        matches!(
            self,
            TokenKind::PlusEqual
                | TokenKind::MinusEqual
                | TokenKind::StarEqual
                | TokenKind::SlashEqual
                | TokenKind::PercentEqual
        )
    }
}

pub fn keyword(s: &str) -> Option<TokenKind> {
    match s {
        "include" => Some(TokenKind::KwInclude),
        "if" => Some(TokenKind::KwIf),
        "else" => Some(TokenKind::KwElse),
        "while" => Some(TokenKind::KwWhile),
        "do" => Some(TokenKind::KwDo),
        "for" => Some(TokenKind::KwFor),
        "foreach" => Some(TokenKind::KwForeach),
        "in" => Some(TokenKind::KwIn),
        "return" => Some(TokenKind::KwReturn),
        "struct" => Some(TokenKind::KwStruct),
        "enum" => Some(TokenKind::KwEnum),
        "type" => Some(TokenKind::KwType),
        "let" => Some(TokenKind::KwLet),
        "const" => Some(TokenKind::KwConst),
        "macro" => Some(TokenKind::KwMacro),
        "signed" => Some(TokenKind::KwSigned),
        "unsigned" => Some(TokenKind::KwUnsigned),
        "fnct" => Some(TokenKind::KwFnct),
        _ => None,
    }
}
