use c5c::error::Severity;
use c5c::include::NsItem;
use c5c::sema::Options;

fn compile_units(sources: &[(Option<&str>, &str)]) -> String {
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
    let (analysis, diags) = c5c::analyze(items, &Options { require_main: true });
    let errors: Vec<_> = diags
        .iter()
        .filter(|d| d.severity == Severity::Error)
        .collect();
    assert!(errors.is_empty(), "analysis failed: {errors:?}");
    c5c::generate(&analysis)
}

fn compile(code: &str) -> String {
    compile_units(&[(None, code)])
}

const STD_PRINTF: (Option<&str>, &str) = (Some("std"), "int<32> printf(string fmt, ...);");

#[test]
fn hello_world_shape() {
    let asm = compile_units(&[
        STD_PRINTF,
        (None, "void main() { std::printf(\"Hello, C5!\\n\"); }"),
    ]);
    assert!(asm.contains(".globl main"));
    assert!(asm.contains("main:"));
    // std:: imports link to their unmangled C names
    assert!(asm.contains("call printf@PLT"));
    assert!(asm.contains(".string \"Hello, C5!\\n\""));
    // string literals carry a length prefix in .data
    assert!(asm.contains(".section .data"));
    assert!(asm.contains(".quad 11"));
    // variadic calls report zero SSE registers in %al
    assert!(asm.contains("mov $0, %eax\n    call printf@PLT"));
    assert!(asm.contains(".section .note.GNU-stack,\"\",@progbits"));
}

#[test]
fn prologue_epilogue_and_zero_exit() {
    let asm = compile("void main() { int<32> x = 1; x; }");
    assert!(asm.contains("push %rbp"));
    assert!(asm.contains("mov %rsp, %rbp"));
    assert!(asm.contains("sub $"));
    // falling off the end of main returns 0
    assert!(asm.contains("mov $0, %eax"));
    assert!(asm.contains("leave"));
    assert!(asm.contains("ret"));
}

#[test]
fn namespaced_function_symbols() {
    let asm = compile_units(&[
        (Some("math"), "int<32> add(int<32> a, int<32> b);"),
        (
            None,
            "int<32> add(int<32> a, int<32> b) { return a + b; }\n\
             void main() { int<32> r = math::add(1, 2); r; }",
        ),
    ]);
    // adopted definition emits the namespaced symbol and is called directly
    assert!(asm.contains("math__add:"));
    assert!(asm.contains("call math__add"));
    assert!(!asm.contains("call math__add@PLT"));
}

#[test]
fn signedness_drives_extension() {
    let asm = compile(
        "void main() {\n\
           unsigned int<8> u = 200;\n\
           int<8> s = 100;\n\
           int<64> a = u;\n\
           int<64> b = s;\n\
           a; b;\n\
         }",
    );
    assert!(asm.contains("movzbq"));
    assert!(asm.contains("movsbq"));
}

#[test]
fn sixteen_bit_loads() {
    let asm = compile(
        "void main() { unsigned int<16> u = 40000; int<16> s = -300; int<64> a = u; int<64> b = s; a; b; }",
    );
    assert!(asm.contains("movzwq"));
    assert!(asm.contains("movswq"));
}

#[test]
fn pointer_arithmetic_scales_by_element_size() {
    let asm = compile(
        "void main() { int<32> x = 5; int<32>* p = &x; int<32>* q = p + 3; q; }",
    );
    assert!(asm.contains("imul $4, %rcx"));
}

#[test]
fn pointer_difference_divides_by_element_size() {
    let asm = compile(
        "void main() { int<32> x = 5; int<32>* p = &x; int<32>* q = p + 2; int<64> d = q - p; d; }",
    );
    assert!(asm.contains("idiv"));
}

#[test]
fn string_arithmetic_calls_the_runtime() {
    let asm = compile(
        "void main() { string s = \"Hello\" + \" World\"; s = s - \" Hello\"; s; }",
    );
    assert!(asm.contains("call __c5_str_concat"));
    assert!(asm.contains("call __c5_str_remove"));
    // helper bodies are appended on use
    assert!(asm.contains("__c5_str_concat:"));
    assert!(asm.contains("__c5_str_remove:"));
    assert!(asm.contains("call strstr@PLT"));
}

#[test]
fn unused_string_helpers_are_not_emitted() {
    let asm = compile("void main() { int<32> x = 1; x; }");
    assert!(!asm.contains("__c5_str_concat:"));
    assert!(!asm.contains("__c5_arr_push:"));
}

#[test]
fn array_literal_allocates_and_stores() {
    let asm = compile("void main() { array<int<32>> a = {10, 20, 30}; a; }");
    assert!(asm.contains("mov $12, %rdi"));
    assert!(asm.contains("call malloc@PLT"));
    assert!(asm.contains("movq $3,"));
}

#[test]
fn array_methods_expand_to_runtime_calls() {
    let asm = compile(
        "void main() {\n\
           array<int<32>> a = {1};\n\
           a.push(2);\n\
           int<32> last = a.pop();\n\
           int<64> n = a.length();\n\
           a.clear();\n\
           last; n;\n\
         }",
    );
    assert!(asm.contains("call __c5_arr_push"));
    assert!(asm.contains("call __c5_arr_pop"));
    assert!(asm.contains("call __c5_arr_len"));
    assert!(asm.contains("call __c5_arr_clear"));
    assert!(asm.contains("__c5_arr_push:"));
    assert!(asm.contains("call realloc@PLT"));
}

#[test]
fn foreach_lowers_to_counted_loop() {
    let asm = compile_units(&[
        STD_PRINTF,
        (
            None,
            "void main() {\n\
               array<int<32>> arr = {10, 20, 30};\n\
               foreach (i, v in arr) { std::printf(\"arr[%d]=%d\\n\", i, v); }\n\
             }",
        ),
    ]);
    assert!(asm.contains("call __c5_arr_len"));
    assert!(asm.contains("foreach_cond"));
    assert!(asm.contains("foreach_end"));
    assert!(asm.contains("incq"));
    // the bound check jumps past the body, so an empty array runs it zero times
    assert!(asm.contains("jge .Lforeach_end"));
}

#[test]
fn const_global_lands_in_rodata() {
    let asm = compile(
        "let const int<32> LIMIT = 7;\n\
         int<32> a() { return LIMIT; }\n\
         int<32> b() { return LIMIT + 1; }\n\
         void main() { a(); b(); }",
    );
    assert!(asm.contains(".section .rodata"));
    assert!(asm.contains("LIMIT:"));
    assert!(asm.contains(".long 7"));
    // shared by both functions through %rip-relative loads
    assert!(asm.matches("LIMIT(%rip)").count() >= 2);
}

#[test]
fn mutable_global_lands_in_data() {
    let asm = compile("let int<32> counter = 0;\nvoid main() { counter = 5; }");
    assert!(asm.contains(".section .data"));
    assert!(asm.contains("counter:"));
}

#[test]
fn float_literals_pool_in_rodata() {
    let asm = compile("void main() { float<64> h = 0.5; float<64> t = h + 0.5; t; }");
    assert!(asm.contains(".LCF0:"));
    assert!(asm.contains(".double 0.5"));
    assert!(asm.contains("movsd .LCF0(%rip), %xmm0"));
    assert!(asm.contains("addsd"));
}

#[test]
fn variadic_sse_count_in_al() {
    let asm = compile_units(&[
        STD_PRINTF,
        (None, "void main() { std::printf(\"%f\\n\", 3.14); }"),
    ]);
    assert!(asm.contains("mov $1, %eax\n    call printf@PLT"));
}

#[test]
fn lambda_lifts_to_top_level_function() {
    let asm = compile(
        "void main() { int<64> f = fnct(int<32> a, int<32> b) { return a + b; }; f(1, 2); }",
    );
    assert!(asm.contains("__c5_lambda_0:"));
    // the call goes through the variable
    assert!(asm.contains("call *%r10"));
}

#[test]
fn struct_member_access_uses_field_offsets() {
    let asm = compile(
        "struct Point { int<32> x; int<32> y; };\n\
         void main() { Point p; p.x = 1; p.y = 2; int<32> s = p.x + p.y; s; }",
    );
    // y at offset 4 in an 8-byte struct
    assert!(asm.contains("movl %eax,"));
    assert!(asm.contains("movslq"));
}

#[test]
fn enum_constants_are_immediates() {
    let asm = compile(
        "enum Color { RED, GREEN, BLUE };\n\
         void main() { int<32> c = Color::BLUE; c; }",
    );
    assert!(asm.contains("mov $2, %rax"));
}

#[test]
fn logical_ops_short_circuit() {
    let asm = compile("void main() { int<32> a = 1; int<32> b = 0; if (a && b) { } if (a || b) { } }");
    assert!(asm.contains("and_false"));
    assert!(asm.contains("or_true"));
}

#[test]
fn division_uses_cqo_idiv() {
    let asm = compile("void main() { int<32> a = 7; int<32> b = 2; int<32> q = a / b; int<32> r = a % b; q; r; }");
    assert!(asm.contains("cqo"));
    assert!(asm.contains("idiv %rcx"));
    assert!(asm.contains("mov %rdx, %rax"));
}

#[test]
fn unsigned_division_zero_extends() {
    let asm = compile(
        "void main() { unsigned int<64> a = 7; unsigned int<64> b = 2; unsigned int<64> q = a / b; q; }",
    );
    assert!(asm.contains("xor %edx, %edx"));
    assert!(asm.contains("div %rcx"));
}

#[test]
fn unsigned_comparison_uses_unsigned_condition_codes() {
    let asm = compile(
        "void main() { unsigned int<64> a = 1; unsigned int<64> b = 2; int<64> r = a < b; r; }",
    );
    assert!(asm.contains("setb %al"));
}

#[test]
fn c_str_passes_pointer_through() {
    let asm = compile_units(&[
        (Some("std"), "int<64> strlen(char* s);"),
        (
            None,
            "void main() { string s = \"abc\"; int<64> n = std::strlen(c_str(s)); n; }",
        ),
    ]);
    assert!(asm.contains("call strlen@PLT"));
}

#[test]
fn stack_arguments_beyond_six_integers() {
    let asm = compile_units(&[
        (
            None,
            "int<32> sum8(int<32> a, int<32> b, int<32> c, int<32> d, int<32> e, int<32> f, int<32> g, int<32> h) {\n\
               return a + h;\n\
             }\n\
             void main() { int<32> r = sum8(1, 2, 3, 4, 5, 6, 7, 8); r; }",
        ),
    ]);
    // two arguments overflow the six integer registers
    assert!(asm.contains("push %rax"));
    assert!(asm.contains("add $16, %rsp"));
    // and the callee reads them from above the saved frame pointer
    assert!(asm.contains("16(%rbp)"));
    assert!(asm.contains("24(%rbp)"));
}
