use c5c::ast::{BinOp, Expr, Item, Program, Stmt, TypeExpr};

fn parse_ok(code: &str) -> Program {
    let tokens = c5c::lex("test.c5", code).unwrap();
    let (program, errors) = c5c::parse(&tokens);
    assert!(errors.is_empty(), "unexpected parse errors: {errors:?}");
    program
}

fn parse_err(code: &str) -> Vec<c5c::error::ParseError> {
    let tokens = c5c::lex("test.c5", code).unwrap();
    let (_, errors) = c5c::parse(&tokens);
    assert!(!errors.is_empty(), "expected a parse error");
    errors
}

fn first_body(program: &Program) -> &Vec<Stmt> {
    for item in &program.0 {
        if let Item::Func(f) = item {
            if let Some(body) = &f.body {
                return body;
            }
        }
    }
    panic!("no function body in program");
}

#[test]
fn function_and_prototype() {
    let program = parse_ok(
        "int<32> add(int<32> a, int<32> b);\n\
         int<32> add(int<32> a, int<32> b) { return a + b; }",
    );
    assert_eq!(program.0.len(), 2);
    let Item::Func(proto) = &program.0[0] else {
        panic!()
    };
    assert!(proto.body.is_none());
    let Item::Func(def) = &program.0[1] else { panic!() };
    assert!(def.body.is_some());
    assert_eq!(def.params.len(), 2);
}

#[test]
fn varargs_prototype() {
    let program = parse_ok("int<32> printf(string fmt, ...);");
    let Item::Func(f) = &program.0[0] else { panic!() };
    assert!(f.varargs);
    assert_eq!(f.params.len(), 1);
    assert_eq!(f.params[0].ty, TypeExpr::Str);
}

#[test]
fn struct_enum_union_declarations() {
    let program = parse_ok(
        "struct Point { int<32> x; int<32> y; };\n\
         enum Color { RED, GREEN, BLUE };\n\
         type Value { int<32>, float<64>, char* };",
    );
    assert!(matches!(program.0[0], Item::Struct(_)));
    let Item::Enum(e) = &program.0[1] else { panic!() };
    assert_eq!(e.variants, vec!["RED", "GREEN", "BLUE"]);
    let Item::Union(u) = &program.0[2] else { panic!() };
    assert_eq!(u.variants.len(), 3);
    assert_eq!(
        u.variants[2],
        TypeExpr::Ptr(Box::new(TypeExpr::Char))
    );
}

#[test]
fn global_let_with_const() {
    let program = parse_ok("let const float<64> PI = 3.14159;\nlet int<32> counter = 0;");
    let Item::Global(pi) = &program.0[0] else { panic!() };
    assert!(pi.is_const);
    let Item::Global(counter) = &program.0[1] else { panic!() };
    assert!(!counter.is_const);
}

#[test]
fn include_directive() {
    let program = parse_ok("include <std.c5h>\nvoid main() { }");
    let Item::Include(name, _) = &program.0[0] else {
        panic!()
    };
    assert_eq!(name, "std.c5h");
}

#[test]
fn macro_declaration() {
    let program = parse_ok("macro square(x) { x * x }");
    let Item::Macro(m) = &program.0[0] else { panic!() };
    assert_eq!(m.params, vec!["x"]);
    assert!(matches!(m.body, Expr::Binary(BinOp::Mul, _, _, _)));
}

#[test]
fn precedence_ladder() {
    let program = parse_ok("void main() { x = 1 + 2 * 3 == 7 && 1 | 2; }");
    let body = first_body(&program);
    // || < && < (| ^ &) < == < relational < shift < additive < multiplicative
    let printed = format!("{}", body[0]);
    assert_eq!(printed, "x = (((1 + (2 * 3)) == 7) && (1 | 2));");
}

#[test]
fn compound_assign_desugars() {
    let program = parse_ok("void main() { x += 2; }");
    let body = first_body(&program);
    let Stmt::Expr(Expr::Assign(lhs, rhs, _)) = &body[0] else {
        panic!()
    };
    assert!(matches!(lhs.as_ref(), Expr::Path(p, _) if p == &vec!["x".to_string()]));
    assert!(matches!(rhs.as_ref(), Expr::Binary(BinOp::Add, _, _, _)));
}

#[test]
fn statement_forms() {
    let program = parse_ok(
        "void main() {\n\
           if (a) { b; } else if (c) { d; } else { e; }\n\
           while (x < 10) { x = x + 1; }\n\
           do { y; } while (z);\n\
           for (int<32> i = 0; i < 3; i = i + 1) { }\n\
           foreach (i, v in items) { }\n\
           return;\n\
         }",
    );
    let body = first_body(&program);
    assert!(matches!(body[0], Stmt::If { .. }));
    assert!(matches!(body[1], Stmt::While { .. }));
    assert!(matches!(body[2], Stmt::DoWhile { .. }));
    assert!(matches!(body[3], Stmt::For { .. }));
    assert!(matches!(body[4], Stmt::Foreach { .. }));
    assert!(matches!(body[5], Stmt::Return(None, _)));
}

#[test]
fn declaration_vs_expression_lookahead() {
    let program = parse_ok(
        "void main() {\n\
           Point p;\n\
           Point* q;\n\
           math::Vec v;\n\
           p.x = 1;\n\
           f(p);\n\
         }",
    );
    let body = first_body(&program);
    assert!(matches!(&body[0], Stmt::Var { name, .. } if name == "p"));
    assert!(matches!(&body[1], Stmt::Var { ty: TypeExpr::Ptr(_), .. }));
    assert!(matches!(&body[2], Stmt::Var { ty: TypeExpr::Named(path), .. }
        if path == &vec!["math".to_string(), "Vec".to_string()]));
    assert!(matches!(body[3], Stmt::Expr(Expr::Assign(_, _, _))));
    assert!(matches!(body[4], Stmt::Expr(Expr::Call(_, _, _))));
}

#[test]
fn array_literal_and_methods() {
    let program = parse_ok(
        "void main() {\n\
           array<int<32>> a = {10, 20, 30};\n\
           a.push(40);\n\
           int<32> last = a.pop();\n\
         }",
    );
    let body = first_body(&program);
    let Stmt::Var { ty, init, .. } = &body[0] else {
        panic!()
    };
    assert!(matches!(ty, TypeExpr::Array(_)));
    assert!(matches!(init, Some(Expr::ArrayLit(items, _)) if items.len() == 3));
}

#[test]
fn lambda_and_cast_and_cstr() {
    let program = parse_ok(
        "void main() {\n\
           int<64> f = fnct(int<32> a, int<32> b) { return a + b; };\n\
           int<32> n = cast<int<32>>(f(1, 2));\n\
           char* raw = c_str(s);\n\
         }",
    );
    let body = first_body(&program);
    let Stmt::Var { init: Some(Expr::Lambda(params, _, _)), .. } = &body[0] else {
        panic!()
    };
    assert_eq!(params.len(), 2);
    assert!(matches!(
        &body[1],
        Stmt::Var { init: Some(Expr::Cast(TypeExpr::Int { width: 32, .. }, _, _)), .. }
    ));
    assert!(matches!(
        &body[2],
        Stmt::Var { init: Some(Expr::CStr(_, _)), .. }
    ));
}

#[test]
fn pointer_and_address_operators() {
    let program = parse_ok("void main() { int<32>* p = &x; int<32> v = *p + p[1]; }");
    let body = first_body(&program);
    assert!(matches!(&body[0], Stmt::Var { .. }));
    assert!(matches!(&body[1], Stmt::Var { .. }));
}

#[test]
fn unexpected_token_is_e002() {
    let errors = parse_err("void main() { int<32> x = ; }");
    assert!(errors[0].to_string().contains("E002"));
}

#[test]
fn recovery_continues_after_bad_declaration() {
    let code = "int<32> broken( { ;\nvoid ok() { }";
    let tokens = c5c::lex("test.c5", code).unwrap();
    let (program, errors) = c5c::parse(&tokens);
    assert!(!errors.is_empty());
    // the parser resynchronises and still sees the following function
    assert!(program
        .0
        .iter()
        .any(|i| matches!(i, Item::Func(f) if f.name == "ok")));
}

// Pretty-printing a parse and re-parsing the print reaches a fixed point.
#[test]
fn pretty_print_round_trips() {
    let code = "struct P { int<32> x; };\n\
                let const int<32> K = 7;\n\
                int<32> add(int<32> a, int<32> b) { return a + b; }\n\
                void main() { int<32> t = add(K, 2); if (t > 3) { t = 0; } }";
    let first = format!("{}", parse_ok(code));
    let second = format!("{}", parse_ok(&first));
    assert_eq!(first, second);
}
