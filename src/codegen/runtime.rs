//! Hand-written GAS bodies for the string and array runtime, appended to
//! the emitted unit only when a compilation actually uses them.
//!
//! Strings are heap buffers reached by a pointer to NUL-terminated data
//! with an 8-byte length prefix at offset -8; every producer below keeps
//! both invariants so `c_str` can hand the data pointer to C unchanged.

/// `__c5_str_concat(a, b)` allocates a fresh string holding `a` then `b`.
/// Nothing is freed; strings outlive their expression.
pub const STR_CONCAT: &str = r#"
.globl __c5_str_concat
.type __c5_str_concat, @function
__c5_str_concat:
    push %rbp
    mov %rsp, %rbp
    push %r12
    push %r13
    push %r14
    push %r15
    mov %rdi, %r12
    mov %rsi, %r13
    mov -8(%r12), %r14
    mov -8(%r13), %rax
    lea 9(%r14,%rax), %rdi
    call malloc@PLT
    lea 8(%rax), %r15
    mov -8(%r13), %rax
    add %r14, %rax
    mov %rax, -8(%r15)
    mov %r15, %rdi
    mov %r12, %rsi
    mov %r14, %rdx
    call memcpy@PLT
    lea (%r15,%r14), %rdi
    mov %r13, %rsi
    mov -8(%r13), %rdx
    add $1, %rdx
    call memcpy@PLT
    mov %r15, %rax
    pop %r15
    pop %r14
    pop %r13
    pop %r12
    leave
    ret
"#;

/// `__c5_str_remove(a, b)` returns a fresh copy of `a` with the first
/// occurrence of `b` excised, or a plain copy when `b` does not occur.
pub const STR_REMOVE: &str = r#"
.globl __c5_str_remove
.type __c5_str_remove, @function
__c5_str_remove:
    push %rbp
    mov %rsp, %rbp
    sub $48, %rsp
    mov %rdi, -8(%rbp)
    mov %rsi, -16(%rbp)
    call strstr@PLT
    test %rax, %rax
    jz .Lc5_remove_copy
    mov -8(%rbp), %rdi
    sub %rdi, %rax
    mov %rax, -24(%rbp)
    mov -8(%rdi), %rax
    mov -16(%rbp), %rsi
    sub -8(%rsi), %rax
    mov %rax, -32(%rbp)
    lea 9(%rax), %rdi
    call malloc@PLT
    lea 8(%rax), %rcx
    mov %rcx, -40(%rbp)
    mov -32(%rbp), %rax
    mov %rax, -8(%rcx)
    mov %rcx, %rdi
    mov -8(%rbp), %rsi
    mov -24(%rbp), %rdx
    call memcpy@PLT
    mov -40(%rbp), %rdi
    add -24(%rbp), %rdi
    mov -8(%rbp), %rsi
    add -24(%rbp), %rsi
    mov -16(%rbp), %rcx
    add -8(%rcx), %rsi
    mov -32(%rbp), %rdx
    sub -24(%rbp), %rdx
    add $1, %rdx
    call memcpy@PLT
    mov -40(%rbp), %rax
    leave
    ret
.Lc5_remove_copy:
    mov -8(%rbp), %rsi
    mov -8(%rsi), %rax
    mov %rax, -32(%rbp)
    lea 9(%rax), %rdi
    call malloc@PLT
    lea 8(%rax), %rdi
    mov %rdi, -40(%rbp)
    mov -32(%rbp), %rax
    mov %rax, -8(%rdi)
    mov -8(%rbp), %rsi
    mov -32(%rbp), %rdx
    add $1, %rdx
    call memcpy@PLT
    mov -40(%rbp), %rax
    leave
    ret
"#;

/// The `array<T>` runtime. The header layout is
/// `{ T* data; int<64> length; int<64> capacity; }`; push grows the buffer
/// geometrically (4 minimum), pop returns a pointer to the popped slot,
/// which stays valid until the next push.
pub const ARRAY_RUNTIME: &str = r#"
.globl __c5_arr_len
.type __c5_arr_len, @function
__c5_arr_len:
    mov 8(%rdi), %rax
    ret
.globl __c5_arr_clear
.type __c5_arr_clear, @function
__c5_arr_clear:
    movq $0, 8(%rdi)
    ret
.globl __c5_arr_pop
.type __c5_arr_pop, @function
__c5_arr_pop:
    mov 8(%rdi), %rax
    sub $1, %rax
    mov %rax, 8(%rdi)
    imul %rsi, %rax
    add (%rdi), %rax
    ret
.globl __c5_arr_push
.type __c5_arr_push, @function
__c5_arr_push:
    push %rbp
    mov %rsp, %rbp
    push %r12
    push %r13
    push %r14
    sub $8, %rsp
    mov %rdi, %r12
    mov %rsi, %r13
    mov %rdx, %r14
    mov 8(%r12), %rax
    cmp 16(%r12), %rax
    jl .Lc5_push_store
    mov 16(%r12), %rsi
    shl $1, %rsi
    cmp $4, %rsi
    jge .Lc5_push_cap
    mov $4, %rsi
.Lc5_push_cap:
    mov %rsi, 16(%r12)
    imul %r14, %rsi
    mov (%r12), %rdi
    call realloc@PLT
    mov %rax, (%r12)
.Lc5_push_store:
    mov 8(%r12), %rax
    imul %r14, %rax
    add (%r12), %rax
    mov %rax, %rdi
    mov %r13, %rsi
    mov %r14, %rdx
    call memcpy@PLT
    incq 8(%r12)
    add $8, %rsp
    pop %r14
    pop %r13
    pop %r12
    leave
    ret
"#;
