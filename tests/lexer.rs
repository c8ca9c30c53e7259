use c5c::token::TokenKind::{self, *};

fn case(code: &str, expects: Vec<TokenKind>) {
    let tokens = c5c::lex("test.c5", code).unwrap();
    for (idx, token) in tokens.iter().enumerate() {
        println!("{idx:>2}: {:?} @ {}", token.kind, token.pos);
    }
    let kinds: Vec<TokenKind> = tokens.into_iter().map(|t| t.kind).collect();
    assert_eq!(kinds, expects);
}

#[test]
fn keywords_and_widths() {
    case(
        "let const int<32> x = 5;",
        vec![
            KwLet,
            KwConst,
            Ident("int".into()),
            LAngle,
            Int(32),
            RAngle,
            Ident("x".into()),
            Equal,
            Int(5),
            Semicolon,
        ],
    );
}

#[test]
fn operators() {
    case(
        "a && b || !c == d <= e >> 2",
        vec![
            Ident("a".into()),
            AmpAmp,
            Ident("b".into()),
            PipePipe,
            Excl,
            Ident("c".into()),
            EqualEqual,
            Ident("d".into()),
            LAngleEqual,
            Ident("e".into()),
            RAngleRAngle,
            Int(2),
        ],
    );
}

#[test]
fn compound_assignment_and_increment() {
    case(
        "x += 1; y++ ;",
        vec![
            Ident("x".into()),
            PlusEqual,
            Int(1),
            Semicolon,
            Ident("y".into()),
            PlusPlus,
            Semicolon,
        ],
    );
}

#[test]
fn namespace_and_arrow() {
    case(
        "std::printf(p->x);",
        vec![
            Ident("std".into()),
            ColonColon,
            Ident("printf".into()),
            LParen,
            Ident("p".into()),
            Arrow,
            Ident("x".into()),
            RParen,
            Semicolon,
        ],
    );
}

#[test]
fn string_escapes() {
    case(
        r#""Hello\n" "\t\\\"""#,
        vec![Str("Hello\n".into()), Str("\t\\\"".into())],
    );
}

#[test]
fn char_literals() {
    case(
        r"'a' '\n' '\0'",
        vec![Char('a'), Char('\n'), Char('\0')],
    );
}

#[test]
fn float_and_int_literals() {
    case(
        "3.14 42 0 1.0",
        vec![Float(3.14), Int(42), Int(0), Float(1.0)],
    );
}

#[test]
fn comments_are_tokens_the_parser_skips() {
    case(
        "x; // trailing note\n/* block\n spanning */ y;",
        vec![
            Ident("x".into()),
            Semicolon,
            Comment("trailing note".into()),
            Comment("block\n spanning".into()),
            Ident("y".into()),
            Semicolon,
        ],
    );
}

#[test]
fn ellipsis_vs_member_dot() {
    case(
        "f(a, ...); s.field",
        vec![
            Ident("f".into()),
            LParen,
            Ident("a".into()),
            Comma,
            Ellipsis,
            RParen,
            Semicolon,
            Ident("s".into()),
            Period,
            Ident("field".into()),
        ],
    );
}

// Adjacent tokens reconstruct the source: offset plus lexeme length equals
// the next token's offset once whitespace is skipped.
#[test]
fn offsets_are_contiguous() {
    let code = "x=x+21;";
    let tokens = c5c::lex("test.c5", code).unwrap();
    for pair in tokens.windows(2) {
        let end = pair[0].pos.offset as usize + pair[0].text.len();
        assert_eq!(end, pair[1].pos.offset as usize);
    }
}

#[test]
fn unknown_character_is_e001() {
    let err = c5c::lex("test.c5", "int x = @;").unwrap_err();
    assert!(err.to_string().contains("E001"));
}

#[test]
fn unterminated_string_is_e001() {
    let err = c5c::lex("test.c5", "\"no end").unwrap_err();
    assert!(err.to_string().contains("E001"));
    let err = c5c::lex("test.c5", "'x").unwrap_err();
    assert!(err.to_string().contains("E001"));
}

#[test]
fn positions_track_lines_and_columns() {
    let tokens = c5c::lex("test.c5", "a\n  b").unwrap();
    assert_eq!((tokens[0].pos.line, tokens[0].pos.col), (1, 0));
    assert_eq!((tokens[1].pos.line, tokens[1].pos.col), (2, 2));
}
