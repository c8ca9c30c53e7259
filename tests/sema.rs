use c5c::error::Severity;
use c5c::include::NsItem;
use c5c::sema::Options;
use c5c::{Analysis, Diagnostic};

fn units(sources: &[(Option<&str>, &str)]) -> Vec<NsItem> {
    let mut items = Vec::new();
    for (ns, code) in sources {
        let tokens = c5c::lex("test.c5", code).unwrap();
        let (program, errors) = c5c::parse(&tokens);
        assert!(errors.is_empty(), "parse failed: {errors:?}");
        for item in program.0 {
            items.push(NsItem {
                namespace: ns.map(str::to_string),
                item,
            });
        }
    }
    items
}

fn analyze_units(sources: &[(Option<&str>, &str)]) -> (Analysis, Vec<Diagnostic>) {
    c5c::analyze(units(sources), &Options { require_main: true })
}

fn analyze(code: &str) -> (Analysis, Vec<Diagnostic>) {
    analyze_units(&[(None, code)])
}

fn error_codes(diags: &[Diagnostic]) -> Vec<&'static str> {
    diags
        .iter()
        .filter(|d| d.severity == Severity::Error)
        .map(|d| d.code)
        .collect()
}

fn warning_codes(diags: &[Diagnostic]) -> Vec<&'static str> {
    diags
        .iter()
        .filter(|d| d.severity == Severity::Warning)
        .map(|d| d.code)
        .collect()
}

#[test]
fn literal_width_overflow_is_e023() {
    let (_, diags) = analyze("void main() { int<8> x = 300; x; }");
    assert_eq!(error_codes(&diags), vec!["E023"]);
    assert!(diags[0].message.contains("[-128,127]"));
}

#[test]
fn literal_width_boundaries_pass() {
    let (_, diags) = analyze(
        "void main() { int<8> lo = -128; int<8> hi = 127; unsigned int<8> u = 255; lo; hi; u; }",
    );
    assert!(error_codes(&diags).is_empty(), "{diags:?}");
}

#[test]
fn unsigned_width_overflow_is_e023() {
    let (_, diags) = analyze("void main() { unsigned int<8> x = 256; x; }");
    assert_eq!(error_codes(&diags), vec!["E023"]);
    assert!(diags[0].message.contains("[0,255]"));
}

#[test]
fn const_assignment_is_e042() {
    let (_, diags) = analyze("void main() { const int<32> x = 1; x = 2; }");
    assert_eq!(error_codes(&diags), vec!["E042"]);
}

#[test]
fn const_global_assignment_is_e042() {
    let (_, diags) = analyze("let const int<32> K = 9;\nvoid main() { K = 3; }");
    assert_eq!(error_codes(&diags), vec!["E042"]);
}

#[test]
fn compound_assignment_to_const_is_e042() {
    let (_, diags) = analyze("void main() { const int<32> x = 1; x += 1; }");
    assert_eq!(error_codes(&diags), vec!["E042"]);
}

#[test]
fn assignment_through_pointer_to_const_is_e042() {
    let (_, diags) = analyze("void main() { const int<32> x = 1; *&x = 5; }");
    assert!(error_codes(&diags).contains(&"E042"));
}

#[test]
fn duplicate_definition_is_e041() {
    let (_, diags) = analyze("void f() { }\nvoid f() { }\nvoid main() { f(); }");
    assert_eq!(error_codes(&diags), vec!["E041"]);

    let (_, diags) = analyze("void main() { int<32> a = 1; int<32> a = 2; a; }");
    assert_eq!(error_codes(&diags), vec!["E041"]);
}

#[test]
fn shadowing_in_nested_block_is_allowed() {
    let (_, diags) =
        analyze("void main() { int<32> a = 1; { int<32> a = 2; a; } a; }");
    assert!(error_codes(&diags).is_empty(), "{diags:?}");
}

#[test]
fn signature_mismatch_is_e030() {
    let (_, diags) = analyze(
        "int<32> f(int<32> a);\nvoid f(int<32> a) { }\nvoid main() { }",
    );
    assert!(error_codes(&diags).contains(&"E030"));
}

#[test]
fn prototype_reconciles_with_matching_definition() {
    let (_, diags) = analyze(
        "int<32> f(int<32> a);\nint<32> f(int<32> b) { return b; }\nvoid main() { f(1); }",
    );
    assert!(error_codes(&diags).is_empty(), "{diags:?}");
}

#[test]
fn float_narrowing_warns_w006() {
    let (_, diags) = analyze("void main() { float<32> f = 3.14; f; }");
    assert!(error_codes(&diags).is_empty(), "{diags:?}");
    assert!(warning_codes(&diags).contains(&"W006"));
}

#[test]
fn same_name_in_two_namespaces_coexists() {
    let (analysis, diags) = analyze_units(&[
        (Some("math"), "int<32> add(int<32> a, int<32> b);"),
        (Some("utils"), "int<32> add(int<32> a, int<32> b);"),
        (
            None,
            "void main() { math::add(1, 2); utils::add(3, 4); }",
        ),
    ]);
    assert!(error_codes(&diags).is_empty(), "{diags:?}");
    assert!(analysis.funcs.contains_key("math::add"));
    assert!(analysis.funcs.contains_key("utils::add"));
}

#[test]
fn definition_adopts_unique_header_prototype() {
    let (analysis, diags) = analyze_units(&[
        (Some("math"), "int<32> add(int<32> a, int<32> b);"),
        (
            None,
            "int<32> add(int<32> a, int<32> b) { return a + b; }\n\
             void main() { int<32> r = math::add(1, 2); r; }",
        ),
    ]);
    assert!(error_codes(&diags).is_empty(), "{diags:?}");
    let sym = &analysis.funcs["math::add"];
    assert!(sym.defined);
    assert_eq!(sym.linkage, "math__add");
    assert!(!analysis.funcs.contains_key("add"));
}

#[test]
fn undefined_prototype_links_unmangled() {
    let (analysis, diags) = analyze_units(&[
        (Some("std"), "int<32> printf(string fmt, ...);"),
        (None, "void main() { std::printf(\"hi\"); }"),
    ]);
    assert!(error_codes(&diags).is_empty(), "{diags:?}");
    assert_eq!(analysis.funcs["std::printf"].linkage, "printf");
}

#[test]
fn undefined_symbol_is_e005() {
    let (_, diags) = analyze("void main() { frobnicate(); }");
    assert!(error_codes(&diags).contains(&"E005"));
}

#[test]
fn unknown_type_is_e018() {
    let (_, diags) = analyze("void main() { Widget w; w; }");
    assert!(error_codes(&diags).contains(&"E018"));
}

#[test]
fn missing_main_is_e009() {
    let (_, diags) = analyze("void helper() { }");
    assert!(error_codes(&diags).contains(&"E009"));

    let (_, diags) = c5c::analyze(
        units(&[(None, "void helper() { }")]),
        &Options {
            require_main: false,
        },
    );
    assert!(!error_codes(&diags).contains(&"E009"));
}

#[test]
fn arity_mismatch_is_e011() {
    let (_, diags) = analyze(
        "int<32> f(int<32> a) { return a; }\nvoid main() { f(1, 2); }",
    );
    assert!(error_codes(&diags).contains(&"E011"));
}

#[test]
fn float_int_mix_needs_cast() {
    let (_, diags) = analyze(
        "void main() { float<64> f = 1.5; int<32> n = 2; float<64> r = f + n; r; }",
    );
    assert!(error_codes(&diags).contains(&"E014"));
}

#[test]
fn int_literal_binds_to_float_slot() {
    let (_, diags) = analyze("void main() { float<64> f = 3; f; }");
    assert!(error_codes(&diags).is_empty(), "{diags:?}");
}

#[test]
fn string_operators_restricted_e017() {
    let (_, diags) =
        analyze("void main() { string s = \"a\" * \"b\"; s; }");
    assert!(error_codes(&diags).contains(&"E017"));

    let (_, diags) = analyze(
        "void main() { string s = \"ab\" + \"cd\"; string t = s - \"b\"; t; }",
    );
    assert!(error_codes(&diags).is_empty(), "{diags:?}");
}

#[test]
fn void_variable_is_e003() {
    let (_, diags) = analyze("void main() { void v; }");
    assert!(error_codes(&diags).contains(&"E003"));
}

#[test]
fn literal_division_by_zero_is_e004() {
    let (_, diags) = analyze("void main() { int<32> x = 1 / 0; x; }");
    assert!(error_codes(&diags).contains(&"E004"));
}

#[test]
fn assignment_to_rvalue_is_e019() {
    let (_, diags) = analyze("void main() { 1 = 2; }");
    assert!(error_codes(&diags).contains(&"E019"));
}

#[test]
fn unknown_member_is_e012() {
    let (_, diags) = analyze(
        "struct P { int<32> x; };\nvoid main() { P p; int<32> y = p.nope; y; }",
    );
    assert!(error_codes(&diags).contains(&"E012"));
}

#[test]
fn struct_layout_and_sizes() {
    let (analysis, diags) = analyze(
        "struct Inner { char a; };\n\
         struct Outer { char c; Inner i; int<32> n; };\n\
         struct Empty { };\n\
         void main() { Outer o; o; }",
    );
    assert!(error_codes(&diags).is_empty(), "{diags:?}");
    assert_eq!(analysis.types.structs["Inner"].size, 1);
    let outer = &analysis.types.structs["Outer"];
    assert_eq!(outer.fields["c"].offset, 0);
    assert_eq!(outer.fields["i"].offset, 1);
    assert_eq!(outer.fields["n"].offset, 4);
    assert_eq!(outer.size, 8);
    assert_eq!(analysis.types.structs["Empty"].size, 0);
}

#[test]
fn union_type_sizes_to_largest_variant() {
    let (analysis, diags) = analyze(
        "type Value { int<32>, float<64>, char };\nvoid main() { Value v; v; }",
    );
    assert!(error_codes(&diags).is_empty(), "{diags:?}");
    assert_eq!(analysis.types.unions["Value"].size, 8);
}

#[test]
fn union_use_without_cast_is_e022() {
    let (_, diags) = analyze(
        "type Value { int<32>, float<64> };\n\
         void main() { Value v; v = cast<Value>(5); int<32> m = v; m; }",
    );
    assert_eq!(error_codes(&diags), vec!["E022"]);
}

#[test]
fn union_cast_to_variant_passes() {
    let (_, diags) = analyze(
        "type Value { int<32>, float<64> };\n\
         void main() { Value v; v = cast<Value>(5); int<32> n = cast<int<32>>(v); n; }",
    );
    assert!(error_codes(&diags).is_empty(), "{diags:?}");
}

#[test]
fn enum_constants_resolve() {
    let (_, diags) = analyze(
        "enum Color { RED, GREEN, BLUE };\n\
         void main() { int<32> c = Color::GREEN; c; }",
    );
    assert!(error_codes(&diags).is_empty(), "{diags:?}");
}

#[test]
fn foreach_infers_element_type() {
    let (_, diags) = analyze(
        "void main() { array<int<32>> a = {1, 2, 3}; foreach (i, v in a) { int<64> s = v; s; } }",
    );
    assert!(error_codes(&diags).is_empty(), "{diags:?}");
}

#[test]
fn foreach_over_non_array_is_rejected() {
    let (_, diags) = analyze("void main() { int<32> n = 3; foreach (i, v in n) { } }");
    assert!(error_codes(&diags).contains(&"E014"));
}

#[test]
fn lambda_lifts_cleanly() {
    let (analysis, diags) = analyze(
        "void main() { int<64> f = fnct(int<32> y) { return y + 1; }; f(3); }",
    );
    assert!(error_codes(&diags).is_empty(), "{diags:?}");
    assert!(analysis.funcs.keys().any(|k| k.starts_with("__c5_lambda_")));
}

#[test]
fn lambda_capturing_local_is_e021() {
    let (_, diags) = analyze(
        "void main() { int<32> x = 1; int<64> f = fnct(int<32> y) { return y + x; }; f(0); }",
    );
    assert!(error_codes(&diags).contains(&"E021"));
}

#[test]
fn lambda_may_use_globals_and_functions() {
    let (_, diags) = analyze(
        "let int<32> base = 10;\n\
         int<32> bump(int<32> n) { return n + 1; }\n\
         void main() { int<64> f = fnct(int<32> y) { return bump(y) + base; }; f(0); }",
    );
    assert!(error_codes(&diags).is_empty(), "{diags:?}");
}

#[test]
fn lambda_returning_lambda_lifts_both() {
    let (analysis, diags) = analyze(
        "void main() { int<64> outer = fnct() { return fnct(int<32> z) { return z; }; }; outer(); }",
    );
    assert!(error_codes(&diags).is_empty(), "{diags:?}");
    let lifted = analysis
        .funcs
        .keys()
        .filter(|k| k.starts_with("__c5_lambda_"))
        .count();
    assert_eq!(lifted, 2);
}

#[test]
fn macro_expands_at_call_site() {
    let (_, diags) = analyze(
        "macro square(x) { x * x }\nvoid main() { int<32> n = square(4); n; }",
    );
    assert!(error_codes(&diags).is_empty(), "{diags:?}");
}

#[test]
fn macro_argument_count_is_checked() {
    let (_, diags) = analyze(
        "macro square(x) { x * x }\nvoid main() { int<32> n = square(1, 2); n; }",
    );
    assert!(error_codes(&diags).contains(&"E011"));
}

#[test]
fn macro_parameter_shadows_outer_binding() {
    let (_, diags) = analyze(
        "macro twice(v) { v + v }\nvoid main() { int<32> v = 3; int<32> r = twice(v); r; }",
    );
    assert!(error_codes(&diags).is_empty(), "{diags:?}");
}

#[test]
fn unused_local_warns_w001() {
    let (_, diags) = analyze("void main() { int<32> unused = 1; }");
    assert!(warning_codes(&diags).contains(&"W001"));
}

#[test]
fn global_initialiser_must_be_constant() {
    let (_, diags) = analyze(
        "int<32> f() { return 1; }\nlet int<32> g = f();\nvoid main() { g; }",
    );
    assert!(error_codes(&diags).contains(&"E014"));
}

#[test]
fn folded_global_initialiser_passes() {
    let (analysis, diags) = analyze("let int<32> g = 2 + 3;\nvoid main() { g; }");
    assert!(error_codes(&diags).is_empty(), "{diags:?}");
    let init = analysis.globals["g"].init.as_ref().unwrap();
    assert!(matches!(init, c5c::ast::Expr::Int(5, _)));
}

#[test]
fn signed_unsigned_comparison_boundaries() {
    let (_, diags) = analyze(
        "void main() {\n\
           unsigned int<64> big = 18446744073709551615;\n\
           int<64> neg = -1;\n\
           if (big > 0) { }\n\
           if (neg < 0) { }\n\
         }",
    );
    assert!(error_codes(&diags).is_empty(), "{diags:?}");
}
