//! Parse Tests - Entity Tree Scenarios
//!
//! These tests run complete IDL sources through the front end:
//! - Modules, reopening and scoped lookup
//! - Forward declarations and duplicate names
//! - Structs, unions, enums, typedefs and interfaces
//! - Comment attribution
//! - Structural hashing

mod common;

use common::*;
use idl::entity::{CommentFlags, DeclType, Direction};
use idl::{parse_str, ConstVariant, Environment, ErrorKind, Extension, Kind};

#[test]
fn test_empty_input() {
    init_logging();

    let tree = parse("");
    assert!(tree.is_empty());
    assert!(tree.children(tree.root()).is_empty());

    let tree = parse("// only a comment\n/* and another */\n");
    assert!(tree.is_empty());
}

#[test]
fn test_module_reopening() {
    init_logging();

    let tree = parse(
        r#"
module Geometry {
    struct Point { long x; long y; };
    const long Dimensions = 2;
};

module Geometry {
    struct Line { Point from; Point to; };
    const long Corners = Dimensions * 2;
};
"#,
    );

    let root = tree.root();
    assert_eq!(child_names(&tree, root), vec!["Geometry", "Geometry"]);
    assert_eq!(child_kinds(&tree, root), vec![Kind::Module, Kind::Module]);

    let point = entity(&tree, "Geometry::Point");
    let line = entity(&tree, "Geometry::Line");
    assert_eq!(tree.get(point).kind, Kind::Struct);
    assert_eq!(tree.scoped_name(line), "Geometry::Line");

    let from = tree.find(line, "from", false).expect("member");
    let decl = tree.get(from).declaration().expect("declaration");
    assert_eq!(decl.decl_type.base, DeclType::Struct);
    assert_eq!(decl.decl_type.definition, Some(point));

    assert_eq!(value(&tree, "Geometry::Corners"), ConstVariant::Int32(4));
}

#[test]
fn test_duplicate_names() {
    init_logging();

    let description = parse_error("struct S { long a; };\nstruct s { long b; };");
    assert_eq!(
        description,
        "An identifier with the same name exists already (case insensitive name checking)."
    );

    let description = parse_error("struct S { long a; long A; };");
    assert!(description.contains("exists already"));

    let err = parse_str("struct S { long a; };\nmodule S {};", &Environment::new()).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Duplicate);

    // Definitions and declarations live in separate namespaces
    let tree = parse("struct S { long a; };\nstruct T { S S; };");
    let t = entity(&tree, "T");
    assert_eq!(child_names(&tree, t), vec!["S"]);

    let env = Environment::new().with_extension(Extension::CaseSensitiveNames, true);
    let tree = parse_str("struct S { long a; };\nstruct s { long b; };", &env).unwrap();
    assert_eq!(child_names(&tree, tree.root()), vec!["S", "s"]);
}

#[test]
fn test_forward_declarations() {
    init_logging();

    let tree = parse(
        r#"
struct Node;
struct Node { long value; };
struct Node;
"#,
    );

    let root = tree.root();
    assert_eq!(tree.children(root).len(), 2);
    let forward = tree.children(root)[0];
    assert!(tree.get(forward).forward);

    let node = entity(&tree, "Node");
    assert!(!tree.get(node).forward);
    assert_eq!(tree.resolved_entity(forward), node);
}

#[test]
fn test_struct_members_and_arrays() {
    init_logging();

    let tree = parse(
        r#"
const long Size = 4;
struct Buffer {
    long data[Size * 2];
    octet flags[3];
    unsigned long long total;
    string<16> name;
};
"#,
    );

    let buffer = entity(&tree, "Buffer");
    assert_eq!(child_names(&tree, buffer), vec!["data", "flags", "total", "name"]);

    let data = tree.get(entity(&tree, "Buffer::data")).declaration().unwrap();
    assert_eq!(data.array_sizes, vec![Some(8)]);
    assert!(data.is_array());

    let total = tree.get(entity(&tree, "Buffer::total")).declaration().unwrap();
    assert_eq!(total.decl_type.base, DeclType::UnsignedLongLong);

    let name = tree.get(entity(&tree, "Buffer::name")).declaration().unwrap();
    assert_eq!(name.decl_type.base, DeclType::String);
    assert_eq!(name.decl_type.fixed_len, 16);
}

#[test]
fn test_multi_dimensional_arrays() {
    init_logging();

    let tree = parse("struct Matrix { double cells[2][3]; };");
    let cells = tree.get(entity(&tree, "Matrix::cells")).declaration().unwrap();
    assert_eq!(cells.array_sizes, vec![Some(2), Some(3)]);

    let description = parse_error_with("struct Matrix { double cells[2][3]; };", &Environment::strict());
    assert_eq!(description, "Multi-dimensional arrays are not allowed. Unexpected token '['.");

    let description = parse_error("struct S { long a[0]; };");
    assert_eq!(description, "The array size must be larger than zero.");
}

#[test]
fn test_anonymous_definitions() {
    init_logging();

    let tree = parse(
        r#"
struct Outer {
    struct { long a; } inner;
    struct { long b; };
};
"#,
    );

    let outer = entity(&tree, "Outer");
    assert_eq!(child_names(&tree, outer), vec!["struct_0", "inner", "struct_1", "var_0"]);

    let generated = entity(&tree, "Outer::var_0");
    assert!(tree.get(generated).anonymous);
    let decl = tree.get(generated).declaration().unwrap();
    assert_eq!(decl.decl_type.definition, Some(entity(&tree, "Outer::struct_1")));
    assert!(tree.get(entity(&tree, "Outer::struct_0")).anonymous);

    let description = parse_error("struct { long a; } x;");
    assert_eq!(description, "Unnamed definitions are not supported at root level.");
}

#[test]
fn test_enum_values() {
    init_logging();

    let tree = parse(
        r#"
enum Color { red, green = 5, blue, alpha = blue * 2 };
const Color Default = Color::green;
"#,
    );

    let color = entity(&tree, "Color");
    assert_eq!(child_names(&tree, color), vec!["red", "green", "blue", "alpha"]);
    assert_eq!(value(&tree, "Color::red"), ConstVariant::Int32(0));
    assert_eq!(value(&tree, "Color::green"), ConstVariant::Int32(5));
    assert_eq!(value(&tree, "Color::blue"), ConstVariant::Int32(6));
    assert_eq!(value(&tree, "Color::alpha"), ConstVariant::Int32(12));
    assert_eq!(value(&tree, "Default"), ConstVariant::Int32(5));

    let description = parse_error("enum E { a = 1, b = 1 };");
    assert_eq!(description, "The value for 'b' is already defined for another entry.");
}

#[test]
fn test_union_cases() {
    init_logging();

    let tree = parse(
        r#"
enum Shape { circle, square, triangle };
union Geometry switch (Shape) {
    case Shape::circle: double radius;
    case Shape::square:
    case Shape::triangle: long sides;
    default: boolean unknown;
};
"#,
    );

    let union = entity(&tree, "Geometry");
    assert_eq!(child_names(&tree, union), vec!["radius", "case_0", "sides", "unknown"]);
    assert!(child_kinds(&tree, union).iter().all(|kind| *kind == Kind::CaseEntry));

    let switch_type = tree.get(union).definition().unwrap().switch_type.clone().unwrap();
    assert_eq!(switch_type.base, DeclType::Enum);

    let sides = tree.get(entity(&tree, "Geometry::sides")).declaration().unwrap();
    assert_eq!(sides.case_values, vec![ConstVariant::Int32(2)]);
    let empty = tree.get(entity(&tree, "Geometry::case_0")).declaration().unwrap();
    assert_eq!(empty.case_values, vec![ConstVariant::Int32(1)]);
    let unknown = tree.get(entity(&tree, "Geometry::unknown")).declaration().unwrap();
    assert!(unknown.default_case);
    assert!(unknown.case_values.is_empty());
}

#[test]
fn test_union_errors() {
    init_logging();

    let description = parse_error(
        "union U switch (long) { case 1: long a; case 1: long b; };",
    );
    assert_eq!(description, "Duplicate switch case label found.");

    let description = parse_error(
        "union U switch (long) { default: long a; default: long b; };",
    );
    assert_eq!(description, "Duplicate default switch found.");

    let description = parse_error("union U switch (string) { case 1: long a; };");
    assert_eq!(description, "Expecting an integral or enum identifier type or variable.");

    let description = parse_error("union U { long a; };");
    assert_eq!(description, "Expecting a switch statement following the union identifier.");
}

#[test]
fn test_typedefs() {
    init_logging();

    let tree = parse(
        r#"
typedef sequence<long, 10> Numbers;
typedef map<string, Numbers> Index;
struct Table { Numbers values; Index index; };
"#,
    );

    let numbers = tree.get(entity(&tree, "Numbers")).declaration().unwrap();
    assert_eq!(numbers.decl_type.base, DeclType::Sequence);
    assert_eq!(numbers.decl_type.fixed_len, 10);
    assert_eq!(numbers.decl_type.value_type.as_ref().unwrap().base, DeclType::Long);

    let index = tree.get(entity(&tree, "Index")).declaration().unwrap();
    assert_eq!(index.decl_type.key_type.as_ref().unwrap().base, DeclType::String);

    let values = tree.get(entity(&tree, "Table::values")).declaration().unwrap();
    assert_eq!(values.decl_type.base, DeclType::Sequence);
    assert_eq!(values.decl_type.definition, Some(entity(&tree, "Numbers")));
}

#[test]
fn test_bitfields() {
    init_logging();

    let tree = parse("struct Flags { bitfield<8> b; bitfield<3, octet> small; };");

    let b = tree.get(entity(&tree, "Flags::b")).declaration().unwrap();
    assert_eq!(b.decl_type.base, DeclType::Bitfield);
    assert_eq!(b.decl_type.fixed_len, 8);
    assert!(b.decl_type.value_type.is_none());

    let small = tree.get(entity(&tree, "Flags::small")).declaration().unwrap();
    assert_eq!(small.decl_type.fixed_len, 3);
    assert_eq!(small.decl_type.value_type.as_ref().unwrap().base, DeclType::Octet);

    assert_eq!(
        parse_error("struct S { bitfield b; };"),
        "Expecting '<' defining the template section."
    );
    assert_eq!(
        parse_error("struct S { bitfield<0> b; };"),
        "Expecting a positive number for the amount of bits."
    );
    assert_eq!(parse_error("struct S { bitfield<65> b; };"), "A bitfield cannot hold more than 64 bits.");
    assert_eq!(
        parse_error("struct S { bitfield<4, float> b; };"),
        "Expecting an integral type for the bitfield."
    );
}

#[test]
fn test_interfaces() {
    init_logging();

    let tree = parse(
        r#"
exception Failed { string reason; };
interface Base { void ping(); };
interface Calculator : Base {
    readonly attribute long total;
    attribute long mode setraises(Failed);
    long add(in long a, inout long b) raises(Failed);
    void reset();
};
"#,
    );

    let calculator = entity(&tree, "Calculator");
    let base = entity(&tree, "Base");
    let failed = entity(&tree, "Failed");
    assert_eq!(tree.get(calculator).definition().unwrap().bases, vec![base]);
    assert_eq!(child_names(&tree, calculator), vec!["total", "mode", "add", "reset"]);

    let total = tree.get(entity(&tree, "Calculator::total")).declaration().unwrap();
    assert!(total.readonly);
    let mode = tree.get(entity(&tree, "Calculator::mode")).declaration().unwrap();
    assert_eq!(mode.set_raises, vec![failed]);

    let add = entity(&tree, "Calculator::add");
    assert_eq!(tree.get(add).kind, Kind::Operation);
    assert_eq!(tree.get(add).declaration().unwrap().raises, vec![failed]);
    let parameters = tree.parameters(add);
    assert_eq!(parameters.len(), 2);
    let b = tree.get(parameters[1]);
    assert_eq!(b.name, "b");
    assert_eq!(b.declaration().unwrap().direction, Some(Direction::InOut));

    // Inherited members are visible through the derived interface
    assert_eq!(tree.find(calculator, "ping", false), Some(entity(&tree, "Base::ping")));
}

#[test]
fn test_interface_errors() {
    init_logging();

    let description = parse_error("interface I { void f(); };\ninterface J : I { void f(); };");
    assert_eq!(description, "The name 'f' is already used by an inherited entity.");

    let description = parse_error("struct S { long a; };\ninterface I : S {};");
    assert_eq!(description, "Cannot inherit from different types.");

    let description = parse_error("interface I : Missing {};");
    assert_eq!(description, "Base not found.");

    let description = parse_error("interface I { void f(long a); };");
    assert_eq!(description, "Expecting a parameter direction 'in', 'out' or 'inout'.");

    let description = parse_error("struct S { void f(); };");
    assert_eq!(description, "Unexpected left bracket '('.");
}

#[test]
fn test_comment_attribution() {
    init_logging();

    let tree = parse(
        r#"
/// A point on the plane
struct Point
{
    long x; ///< Horizontal

    /// Vertical
    long y;
};
"#,
    );

    let point = tree.get(entity(&tree, "Point"));
    assert_eq!(point.comments, "A point on the plane");
    assert!(point.comment_flags.contains(CommentFlags::FORMAT_JAVADOC));

    let x = tree.get(entity(&tree, "Point::x"));
    assert_eq!(x.comments, "Horizontal");
    assert!(x.comment_flags.contains(CommentFlags::LOC_SUCCEEDING));

    let y = tree.get(entity(&tree, "Point::y"));
    assert_eq!(y.comments, "Vertical");
    assert!(!y.comment_flags.contains(CommentFlags::LOC_SUCCEEDING));
}

#[test]
fn test_detached_comment_is_ignored() {
    init_logging();

    let tree = parse("// Header comment\n\n\nstruct S { long a; };");
    assert!(tree.get(entity(&tree, "S")).comments.is_empty());
}

#[test]
fn test_keywords_as_names() {
    init_logging();

    let tree = parse("struct S { long in; };");
    assert!(tree.find(entity(&tree, "S"), "in", false).is_some());

    let description = parse_error_with("struct S { long in; };", &Environment::strict());
    assert_eq!(description, "The identifier cannot be a reserved keyword.");
}

#[test]
fn test_syntax_errors() {
    init_logging();

    let err = parse_str("struct S {\n    long x\n};", &Environment::new()).unwrap_err();
    assert_eq!(err.description, "Missing semicolon ';' following the declaration.");
    assert_eq!(err.line, Some(3));
    assert_eq!(err.to_string(), "(3): Missing semicolon ';' following the declaration.");

    assert_eq!(parse_error("};"), "Unexpected curly bracket '}'.");
    assert_eq!(parse_error("struct S { long a; "), "Expecting curly bracket '}'.");
    assert_eq!(
        parse_error("struct S { Unknown a; };"),
        "Could not find the definition of 'Unknown'."
    );
}

#[test]
fn test_hash_is_deterministic() {
    init_logging();

    let code = r#"
module M {
    struct Node { long value; sequence<Node> children; };
    interface Visitor { void visit(in Node node); };
};
"#;
    let first = parse(code);
    let second = parse(code);
    let changed = parse(&code.replace("long value", "short value"));

    let hash = |tree: &idl::EntityTree| tree.calc_hash(entity(tree, "M::Visitor"));
    assert_eq!(hash(&first), hash(&second));
    assert_ne!(hash(&first), hash(&changed));
    assert_eq!(first.calc_hash(first.root()), second.calc_hash(second.root()));

    let node = entity(&first, "M::Node");
    assert_eq!(first.id_hash(node), second.id_hash(entity(&second, "M::Node")));
    assert_ne!(first.id_hash(node), first.id_hash(entity(&first, "M::Visitor")));
}
