//! Include Tests - Multi-File and Preprocessor Scenarios
//!
//! These tests exercise the source stack:
//! - Local and global includes
//! - Circular, duplicate and too deeply nested inclusion
//! - Conditional sections across files
//! - Meta entities for directives

mod common;

use tempfile::TempDir;

use common::*;
use idl::source::IncludeKind;
use idl::{parse_file, parse_str, ConstVariant, Environment, ErrorKind, MetaKind, Parser};

fn workspace() -> TempDir {
    tempfile::tempdir().expect("temporary directory")
}

#[test]
fn test_local_include() {
    init_logging();
    let dir = workspace();

    write_file(dir.path(), "types.idl", "struct Point { long x; long y; };\n");
    let main = write_file(
        dir.path(),
        "main.idl",
        "#include \"types.idl\"\nstruct Line { Point from; Point to; };\n",
    );

    let tree = parse_file(&main, &Environment::new()).expect("parse");
    assert_eq!(child_names(&tree, tree.root()), vec!["Point", "Line"]);

    let point = entity(&tree, "Point");
    let path = tree.source_path(point).expect("source path");
    assert!(path.ends_with("types.idl"));
    assert!(tree.source_path(entity(&tree, "Line")).unwrap().ends_with("main.idl"));

    assert_eq!(tree.sources().len(), 2);
    assert_eq!(tree.sources()[0].kind, IncludeKind::Source);
    assert_eq!(tree.sources()[1].kind, IncludeKind::LocalInclude);

    let metas = tree.metas();
    assert_eq!(metas.len(), 1);
    assert_eq!(tree.get(metas[0]).meta(), Some((MetaKind::IncludeLocal, "\"types.idl\"")));
}

#[test]
fn test_global_include() {
    init_logging();
    let dir = workspace();

    let shared = dir.path().join("shared");
    write_file(&shared, "base.idl", "module Base { const long Version = 3; };\n");
    let main = write_file(
        dir.path(),
        "main.idl",
        "#include <base.idl>\nconst long Next = Base::Version + 1;\n",
    );

    let env = Environment::new().with_include_dir(&shared);
    let tree = parse_file(&main, &env).expect("parse");
    assert_eq!(value(&tree, "Next"), ConstVariant::Int32(4));
    assert_eq!(tree.sources()[1].kind, IncludeKind::GlobalInclude);

    let meta = tree.get(tree.metas()[0]).meta().unwrap();
    assert_eq!(meta, (MetaKind::IncludeGlobal, "<base.idl>"));

    // Without the include directory the file cannot be found
    let err = parse_file(&main, &Environment::new()).unwrap_err();
    assert_eq!(err.description, "Include file not found.");
    assert_eq!(err.line, Some(1));
}

#[test]
fn test_nested_include_directories() {
    init_logging();
    let dir = workspace();

    write_file(dir.path(), "inc/inner.idl", "struct Inner { long a; };\n");
    write_file(dir.path(), "inc/outer.idl", "#include \"inner.idl\"\nstruct Outer { Inner i; };\n");
    let main = write_file(dir.path(), "main.idl", "#include \"inc/outer.idl\"\n");

    let tree = parse_file(&main, &Environment::new()).expect("parse");
    assert_eq!(child_names(&tree, tree.root()), vec!["Inner", "Outer"]);
    assert_eq!(tree.metas().len(), 2);
}

#[test]
fn test_circular_include() {
    init_logging();
    let dir = workspace();

    write_file(dir.path(), "b.idl", "#include \"a.idl\"\n");
    let a = write_file(dir.path(), "a.idl", "#include \"b.idl\"\nstruct A { long a; };\n");

    let err = parse_file(&a, &Environment::new()).unwrap_err();
    println!("Circular include error: {}", err);
    assert_eq!(err.kind, ErrorKind::Include);
    assert!(err.description.contains("circular inclusion of files?"));
    assert!(err.path.as_ref().unwrap().ends_with("b.idl"));
}

#[test]
fn test_duplicate_include() {
    init_logging();
    let dir = workspace();

    write_file(dir.path(), "types.idl", "struct Point { long x; };\n");
    let main = write_file(dir.path(), "main.idl", "#include \"types.idl\"\n#include \"types.idl\"\n");

    let err = parse_file(&main, &Environment::new()).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Include);
    assert!(err.description.contains("was included before"));
    assert_eq!(err.line, Some(2));
}

#[test]
fn test_include_depth_limit() {
    init_logging();
    let dir = workspace();

    write_file(dir.path(), "level2.idl", "struct Deep { long a; };\n");
    write_file(dir.path(), "level1.idl", "#include \"level2.idl\"\n");
    let main = write_file(dir.path(), "main.idl", "#include \"level1.idl\"\n");

    let env = Environment::new().with_max_include_depth(2);
    let err = parse_file(&main, &env).unwrap_err();
    assert_eq!(
        err.description,
        "Passed maximum amount of nested files - circular inclusion of files?"
    );

    let env = Environment::new().with_max_include_depth(3);
    assert!(parse_file(&main, &env).is_ok());
}

#[test]
fn test_missing_endif_in_include() {
    init_logging();
    let dir = workspace();

    write_file(dir.path(), "open.idl", "#ifdef ANYTHING\nstruct Hidden { long a; };\n");
    let main = write_file(dir.path(), "main.idl", "#include \"open.idl\"\nstruct Visible { long a; };\n");

    let err = parse_file(&main, &Environment::new()).unwrap_err();
    assert_eq!(err.description, "Missing '#endif' directive.");
    assert!(err.path.as_ref().unwrap().ends_with("open.idl"));
}

#[test]
fn test_conditional_sections() {
    init_logging();

    let code = r#"
#define LEVEL 2
#if LEVEL > 1 && defined(LEVEL)
struct Enabled { long a; };
#elif LEVEL == 1
struct Partial { long a; };
#else
struct Disabled { long a; };
#endif

#ifndef LEVEL
struct Missing { long a; };
#endif

#undef LEVEL
#ifdef LEVEL
struct Gone { long a; };
#endif
"#;
    let tree = parse(code);
    assert_eq!(child_names(&tree, tree.root()), vec!["Enabled"]);

    let kinds: Vec<MetaKind> = tree.metas().iter().map(|m| tree.get(*m).meta().unwrap().0).collect();
    assert_eq!(kinds, vec![MetaKind::Define, MetaKind::Undef]);
}

#[test]
fn test_predefined_macros() {
    init_logging();

    let code = "#if defined(FEATURE) && FEATURE >= 2\nconst long Mode = FEATURE;\n#endif\n";
    let env = Environment::new().with_define("FEATURE=2");
    let tree = parse_str(code, &env).unwrap();
    assert_eq!(value(&tree, "Mode"), ConstVariant::Int32(2));

    let tree = parse(code);
    assert!(tree.is_empty());
}

#[test]
fn test_macro_expansion_in_declarations() {
    init_logging();

    let tree = parse(
        r#"
#define FACTOR 4
#define SQUARE(x) ((x) * (x))
const long Area = SQUARE(FACTOR);
struct Grid { long cells[SQUARE(2)]; };
"#,
    );
    assert_eq!(value(&tree, "Area"), ConstVariant::Int32(16));
    let cells = tree.get(entity(&tree, "Grid::cells")).declaration().unwrap();
    assert_eq!(cells.array_sizes, vec![Some(4)]);

    let define = tree.get(tree.metas()[0]).meta().unwrap();
    assert_eq!(define, (MetaKind::Define, "FACTOR 4"));
}

#[test]
fn test_verbatim_metas() {
    init_logging();

    let code = "// Needed by the generated header\n#verbatim #include <cstdint>\n#verbatim_begin\nnamespace extra {}\nint value = 0;\n#verbatim_end\nstruct S { long a; };\n";
    let tree = parse(code);

    let metas = tree.metas();
    assert_eq!(metas.len(), 2);
    let verbatim = tree.get(metas[0]);
    assert_eq!(verbatim.meta(), Some((MetaKind::Verbatim, "#include <cstdint>")));
    assert_eq!(verbatim.comments, "Needed by the generated header");
    assert_eq!(
        tree.get(metas[1]).meta(),
        Some((MetaKind::VerbatimBlock, "namespace extra {}\nint value = 0;"))
    );
    assert_eq!(child_names(&tree, tree.root()), vec!["S"]);
}

#[test]
fn test_directive_errors() {
    init_logging();

    assert_eq!(parse_error("#endif\n"), "Unexpected '#endif' directive.");
    assert_eq!(parse_error("#else\n"), "Unexpected '#else' directive.");
    assert_eq!(parse_error("#if 1\n#else\n#else\n#endif\n"), "Duplicate '#else' directive.");
    assert_eq!(parse_error("#if 1\nstruct S { long a; };\n"), "Missing '#endif' directive.");
    assert_eq!(parse_error("#ifdef\n#endif\n"), "Definition name missing.");
    assert_eq!(parse_error("#include types.idl\n"), "Invalid symbol.");
    assert_eq!(parse_error("#include \"\"\n"), "No filename supplied.");
    assert_eq!(parse_error("#verbatim_begin\nno end\n"), "Missing '#verbatim_end' directive.");
    assert_eq!(parse_error("#pragma once\n"), "Unsupported preprocessor directive \"#pragma\" found.");
}

#[test]
fn test_lexical_check() {
    init_logging();

    let parser = Parser::with_code("struct S { long a; }; // fine\n", Environment::new()).unwrap();
    assert!(parser.lexical_check().is_ok());

    let parser = Parser::with_code("const string S = \"unterminated;\n", Environment::new()).unwrap();
    let err = parser.lexical_check().unwrap_err();
    assert_eq!(err.kind, ErrorKind::Lexer);
}
