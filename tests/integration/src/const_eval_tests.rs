//! Constant Evaluation Tests
//!
//! These tests exercise typed constant folding through declarations:
//! - Operator precedence and integer promotion
//! - Range checked conversion to the declared type
//! - Forward and circular references between constants
//! - Compound, array and string initializers

mod common;

use common::*;
use idl::entity::ValueNode;
use idl::{ConstVariant, ErrorKind};

#[test]
fn test_arithmetic_and_precedence() {
    init_logging();

    let tree = parse(
        r#"
const long A = 2 + 3 * 4;
const long B = (2 + 3) * 4;
const long C = -7 / 2;
const long D = 7 % 3;
const long E = 1 << 4 | 1;
const unsigned long F = 0xFF & ~0x0F;
const long G = 010 + 0b101;
"#,
    );

    assert_eq!(value(&tree, "A"), ConstVariant::Int32(14));
    assert_eq!(value(&tree, "B"), ConstVariant::Int32(20));
    assert_eq!(value(&tree, "C"), ConstVariant::Int32(-3));
    assert_eq!(value(&tree, "D"), ConstVariant::Int32(1));
    assert_eq!(value(&tree, "E"), ConstVariant::Int32(17));
    assert_eq!(value(&tree, "F"), ConstVariant::UInt32(240));
    assert_eq!(value(&tree, "G"), ConstVariant::Int32(13));
}

#[test]
fn test_declared_types() {
    init_logging();

    let tree = parse(
        r#"
const short Small = 100;
const octet Byte = 255;
const long long Big = 4294967296;
const boolean Flag = 3 > 2 && TRUE;
const double Ratio = 1.5 * 2;
const float Half = 1 / 2.0;
const char Letter = 'A';
const string Greeting = "hello";
"#,
    );

    assert_eq!(value(&tree, "Small"), ConstVariant::Int16(100));
    assert_eq!(value(&tree, "Byte"), ConstVariant::UInt8(255));
    assert_eq!(value(&tree, "Big"), ConstVariant::Int64(4_294_967_296));
    assert_eq!(value(&tree, "Flag"), ConstVariant::Bool(true));
    assert_eq!(value(&tree, "Ratio"), ConstVariant::Double(3.0));
    assert_eq!(value(&tree, "Half"), ConstVariant::Float(0.5));
    assert_eq!(value(&tree, "Letter"), ConstVariant::Int8(65));
    assert_eq!(value(&tree, "Greeting"), ConstVariant::String("hello".to_string()));
}

#[test]
fn test_forward_references() {
    init_logging();

    let tree = parse(
        r#"
module Limits {
    const long Max = Min + Range;
    const long Min = 10;
    const long Range = 5;
};
const long Total = Limits::Max * 2;
"#,
    );

    assert_eq!(value(&tree, "Limits::Max"), ConstVariant::Int32(15));
    assert_eq!(value(&tree, "Total"), ConstVariant::Int32(30));
}

#[test]
fn test_compound_and_array_values() {
    init_logging();

    let tree = parse(
        r#"
struct Point { long x; long y; };
const Point Origin = { 1, 2 };
const long Sum = Origin.x + Origin.y;
const long Grid[2][2] = { { 1, 2 }, { 3, 4 } };
const long Corner = Grid[1][0];
const char Name[6] = "hello";
"#,
    );

    assert_eq!(value(&tree, "Origin.y"), ConstVariant::Int32(2));
    assert_eq!(value(&tree, "Sum"), ConstVariant::Int32(3));
    assert_eq!(value(&tree, "Grid[0][1]"), ConstVariant::Int32(2));
    assert_eq!(value(&tree, "Corner"), ConstVariant::Int32(3));
    assert_eq!(value(&tree, "Name[1]"), ConstVariant::Int8(101));

    match tree.find_value(tree.root(), "Name") {
        Some(ValueNode::Array(elements)) => assert_eq!(elements.len(), 5),
        other => panic!("unexpected value {:?}", other),
    }

    // A path that leads nowhere yields a false boolean
    assert_eq!(value(&tree, "Origin.z"), ConstVariant::Bool(false));
    assert_eq!(value(&tree, "Missing"), ConstVariant::Bool(false));
}

#[test]
fn test_dynamic_values() {
    init_logging();

    let tree = parse("struct Config { long count; long doubled = count * 2; };");
    let doubled = tree.find_value(tree.root(), "Config::doubled").expect("value");
    assert!(doubled.is_dynamic());
    assert!(doubled.constant().is_none());

    let description = parse_error("struct Config { long count; const long Limit = count; };");
    assert_eq!(description, "A const declaration requires a constant expression.");
}

#[test]
fn test_evaluation_errors() {
    init_logging();

    assert_eq!(parse_error("const long Z = 1 / 0;"), "Division by zero.");
    assert_eq!(
        parse_error("const octet O = 256;"),
        "Cannot cast to type, the value exceeds the maximum possible value of the target type."
    );
    assert_eq!(parse_error("const long M = 1 << 40;"), "The shift count is out of range.");
    assert_eq!(
        parse_error("const boolean B = TRUE & FALSE;"),
        "Cannot execute bitwise operations on a boolean."
    );
    assert_eq!(
        parse_error("const string S = \"a\" + \"b\";"),
        "The types of both operands are not compatible."
    );
    assert_eq!(
        parse_error("const long U = Unknown + 1;"),
        "Could not find the definition of 'Unknown'."
    );
    assert_eq!(
        parse_error("struct S { long a; };\nconst long V = S;"),
        "Expecting a value; 'S' is not a declaration."
    );
    assert_eq!(parse_error("const long K;"), "Expecting an assignment operator.");
}

#[test]
fn test_circular_reference() {
    init_logging();

    let err = idl::parse_str("const long P = Q;\nconst long Q = P;", &idl::Environment::new()).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Const);
    assert_eq!(err.description, "Circular referencing entity.");
}
