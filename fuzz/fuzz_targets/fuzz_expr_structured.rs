#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use vireo_core::{ArrayRef, LifecycleFlags, ObjectRef, Scope, Value};
use vireo_expr::{BindingType, NoResources, parse};

#[derive(Arbitrary, Debug)]
enum Piece {
    Name(u8),
    Number(u16),
    Text(u8),
    Operator(u8),
    Open(u8),
    Close(u8),
    Parent,
}

const NAMES: &[&str] = &["a", "b", "items", "fn", "obj", "missing", "$this"];
const OPERATORS: &[&str] = &[
    "+", "-", "*", "/", "%", "&&", "||", "??", "?", ":", "===", "!=", "<", ">=", "!", ".", ",",
    "=", "|", "&", " in ", " of ", "typeof ", "void ", "instanceof ",
];
const OPEN: &[&str] = &["(", "[", "{", "`", "${"];
const CLOSE: &[&str] = &[")", "]", "}", "`"];

impl Piece {
    fn render(&self, out: &mut String) {
        match self {
            Piece::Name(i) => out.push_str(NAMES[usize::from(*i) % NAMES.len()]),
            Piece::Number(n) => out.push_str(&n.to_string()),
            Piece::Text(c) => {
                out.push('\'');
                out.push(char::from(b'a' + c % 26));
                out.push('\'');
            }
            Piece::Operator(i) => out.push_str(OPERATORS[usize::from(*i) % OPERATORS.len()]),
            Piece::Open(i) => out.push_str(OPEN[usize::from(*i) % OPEN.len()]),
            Piece::Close(i) => out.push_str(CLOSE[usize::from(*i) % CLOSE.len()]),
            Piece::Parent => out.push_str("$parent."),
        }
    }
}

fuzz_target!(|pieces: Vec<Piece>| {
    let mut source = String::new();
    for piece in pieces.iter().take(256) {
        piece.render(&mut source);
    }
    let Ok(expr) = parse(&source, BindingType::IS_PROPERTY) else {
        return;
    };

    let items = ArrayRef::from_values(vec![Value::from(1), Value::from("two")]);
    let model = ObjectRef::from_pairs([
        ("a", Value::from(3)),
        ("b", Value::Null),
        ("items", Value::Array(items)),
        ("obj", Value::Object(ObjectRef::new())),
    ]);
    let scope = Scope::new(Value::Object(model));
    let _ = expr.evaluate(LifecycleFlags::empty(), &scope, &NoResources);
    let _ = expr.evaluate(LifecycleFlags::MUST_EVALUATE, &scope, &NoResources);
});
