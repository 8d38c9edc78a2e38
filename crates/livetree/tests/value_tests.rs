//! Value conversions as seen through evaluated nodes

use livetree::value::format_float;
use livetree::*;
use pretty_assertions::assert_eq;

#[test]
fn test_string_to_int() {
    assert_eq!(Value::from("42").to_int().unwrap(), 42);
    assert_eq!(Value::from(" 42").to_int().unwrap(), 42);
    assert!(Value::from("42 ").to_int().is_err());
    assert!(Value::from("0x10").to_int().is_err());
}

#[test]
fn test_float_to_int_rounds() {
    assert_eq!(Value::Float(2.5).to_int().unwrap(), 3);
    assert_eq!(Value::Float(-0.4).to_int().unwrap(), 0);
    assert!(Value::Float(f64::NAN).to_int().is_err());
}

#[test]
fn test_float_rendering() {
    assert_eq!(Value::Float(2.0).to_string(), "2.0");
    assert_eq!(Value::Float(1.5).to_string(), "1.5");
    assert_eq!(Value::Float(0.125).to_string(), "0.125");
    assert_eq!(format_float(100.0), "100.0");
}

#[test]
fn test_coerce() {
    assert_eq!(
        Value::from("7").coerce(ValueType::Float).unwrap(),
        Value::Float(7.0)
    );
    assert_eq!(
        Value::Int(7).coerce(ValueType::String).unwrap(),
        Value::from("7")
    );
    assert!(Value::from("seven").coerce(ValueType::Int).is_err());
}

#[test]
fn test_node_conversions() {
    let mut scope = Scope::default();
    scope.define("n", "12").unwrap();
    scope.define("ratio", "${map 0:4 0:1 ${n}}").unwrap();
    scope.define("word", "twelve").unwrap();
    let root = scope.root();

    let n = root.get_child_ptr(&Path::parse("n").unwrap()).unwrap();
    assert_eq!(n.evaluate_int().unwrap(), 12);
    assert_eq!(n.evaluate_float().unwrap(), 12.0);

    let ratio = root.get_child_ptr(&Path::parse("ratio").unwrap()).unwrap();
    assert_eq!(ratio.evaluate_int().unwrap(), 1);
    assert_eq!(ratio.evaluate_string().unwrap(), "1.0");

    let word = root.get_child_ptr(&Path::parse("word").unwrap()).unwrap();
    match word.evaluate_int() {
        Err(EvalError::Conversion { value, target }) => {
            assert_eq!(value, "twelve");
            assert_eq!(target, "int");
        }
        other => panic!("Expected conversion error, got {:?}", other),
    }
}

#[test]
fn test_value_type_names() {
    assert_eq!(Value::Int(1).value_type(), ValueType::Int);
    assert_eq!(ValueType::Float.name(), "float");
    assert_eq!(Value::from("s").as_str(), Some("s"));
    assert_eq!(Value::Int(1).as_str(), None);
}
