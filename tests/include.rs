use c5c::Resolver;
use std::fs;
use std::path::PathBuf;

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("c5c-test-{}-{}", std::process::id(), name));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    dir
}

fn parse(code: &str) -> c5c::ast::Program {
    let tokens = c5c::lex("main.c5", code).unwrap();
    let (program, errors) = c5c::parse(&tokens);
    assert!(errors.is_empty(), "{errors:?}");
    program
}

#[test]
fn header_declarations_get_the_basename_namespace() {
    let dir = scratch_dir("basename");
    fs::write(dir.join("math.c5h"), "int<32> add(int<32> a, int<32> b);").unwrap();

    let program = parse("include <math.c5h>\nvoid main() { }");
    let mut resolver = Resolver::new(Vec::new());
    let items = resolver.expand(program, &dir).unwrap();

    let namespaces: Vec<Option<String>> =
        items.iter().map(|i| i.namespace.clone()).collect();
    assert_eq!(namespaces, vec![Some("math".to_string()), None]);
}

#[test]
fn nested_includes_resolve_beyond_three_levels() {
    let dir = scratch_dir("nested");
    fs::write(dir.join("a.c5h"), "include <b.c5h>\nint<32> fa();").unwrap();
    fs::write(dir.join("b.c5h"), "include <c.c5h>\nint<32> fb();").unwrap();
    fs::write(dir.join("c.c5h"), "include <d.c5h>\nint<32> fc();").unwrap();
    fs::write(dir.join("d.c5h"), "int<32> fd();").unwrap();

    let program = parse("include <a.c5h>\nvoid main() { }");
    let mut resolver = Resolver::new(Vec::new());
    let items = resolver.expand(program, &dir).unwrap();

    let namespaces: Vec<&str> = items
        .iter()
        .filter_map(|i| i.namespace.as_deref())
        .collect();
    // innermost headers surface first, each under its own basename
    assert_eq!(namespaces, vec!["d", "c", "b", "a"]);
}

#[test]
fn cyclic_includes_are_deduplicated() {
    let dir = scratch_dir("cycle");
    fs::write(dir.join("x.c5h"), "include <y.c5h>\nint<32> fx();").unwrap();
    fs::write(dir.join("y.c5h"), "include <x.c5h>\nint<32> fy();").unwrap();

    let program = parse("include <x.c5h>\nvoid main() { }");
    let mut resolver = Resolver::new(Vec::new());
    let items = resolver.expand(program, &dir).unwrap();

    let xs = items
        .iter()
        .filter(|i| i.namespace.as_deref() == Some("x"))
        .count();
    assert_eq!(xs, 1);
    let ys = items
        .iter()
        .filter(|i| i.namespace.as_deref() == Some("y"))
        .count();
    assert_eq!(ys, 1);
}

#[test]
fn missing_include_is_e010_with_search_trail() {
    let dir = scratch_dir("missing");
    let program = parse("include <nowhere.c5h>\nvoid main() { }");
    let mut resolver = Resolver::new(vec![PathBuf::from("extra/includes")]);
    let err = resolver.expand(program, &dir).unwrap_err();
    let message = err.to_string();
    assert!(message.contains("E010"), "{message}");
    assert!(message.contains("nowhere.c5h"));
    // the full search trail is reported, user -I paths included
    assert!(message.contains("extra/includes"));
    assert!(message.contains("c5include"));
}

#[test]
fn user_include_paths_take_priority_over_defaults() {
    let dir = scratch_dir("prio-src");
    let lib = scratch_dir("prio-lib");
    fs::write(lib.join("util.c5h"), "int<32> helper();").unwrap();

    let program = parse("include <util.c5h>\nvoid main() { }");
    let mut resolver = Resolver::new(vec![lib]);
    let items = resolver.expand(program, &dir).unwrap();
    assert!(items
        .iter()
        .any(|i| i.namespace.as_deref() == Some("util")));
}

#[test]
fn including_file_directory_is_searched_first() {
    let dir = scratch_dir("firstdir");
    let other = scratch_dir("firstdir-other");
    fs::write(dir.join("dup.c5h"), "int<32> local_one();").unwrap();
    fs::write(other.join("dup.c5h"), "int<32> other_one();").unwrap();

    let program = parse("include <dup.c5h>\nvoid main() { }");
    let mut resolver = Resolver::new(vec![other]);
    let items = resolver.expand(program, &dir).unwrap();
    let from_header: Vec<String> = items
        .iter()
        .filter(|i| i.namespace.is_some())
        .map(|i| format!("{}", i.item))
        .collect();
    assert!(from_header[0].contains("local_one"));
}
