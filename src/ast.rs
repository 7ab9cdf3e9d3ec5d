//! This module defines the expression tree produced by the parser and the
//! runtime values it evaluates to. [`Expr`] renders back to source text
//! through `Display` (the code string), and [`Value`] renders to its inspect
//! string. Ergonomic helpers such as [`val`] and [`nil`] keep tests short.

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use crate::Error;
use crate::builtinops::BuiltinOp;
use crate::evaluator::Environment;
use crate::scanner::Position;

/// Signature shared by every callable value: built-ins and closures alike
pub type NativeFn = dyn Fn(&Environment, Vec<Value>) -> Result<Value, Error>;

/// A callable runtime value.
#[derive(Clone)]
pub struct Function {
    name: Option<Rc<str>>,
    func: Rc<NativeFn>,
}

impl Function {
    pub fn new(
        name: Option<&str>,
        func: impl Fn(&Environment, Vec<Value>) -> Result<Value, Error> + 'static,
    ) -> Self {
        Function {
            name: name.map(Rc::from),
            func: Rc::new(func),
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn call(&self, env: &Environment, args: Vec<Value>) -> Result<Value, Error> {
        (self.func)(env, args)
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "Function({name})"),
            None => write!(f, "Function(<anonymous>)"),
        }
    }
}

/// Functions are equal only when they are the same function object
impl PartialEq for Function {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.func, &other.func)
    }
}

/// Runtime value kinds, used in type and argument errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    Number,
    String,
    Bool,
    Nil,
    Pair,
    List,
    Map,
    Function,
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ValueType::Number => "number",
            ValueType::String => "string",
            ValueType::Bool => "bool",
            ValueType::Nil => "nil",
            ValueType::Pair => "pair",
            ValueType::List => "list",
            ValueType::Map => "map",
            ValueType::Function => "function",
        })
    }
}

/// Runtime values. Immutable once constructed.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(f64),
    String(String),
    Bool(bool),
    Nil,
    /// Cons cell with a left and right slot
    Pair(Box<Value>, Box<Value>),
    List(Vec<Value>),
    /// String keyed; iteration follows key order
    Map(BTreeMap<String, Value>),
    Function(Function),
}

impl Value {
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Number(_) => ValueType::Number,
            Value::String(_) => ValueType::String,
            Value::Bool(_) => ValueType::Bool,
            Value::Nil => ValueType::Nil,
            Value::Pair(..) => ValueType::Pair,
            Value::List(_) => ValueType::List,
            Value::Map(_) => ValueType::Map,
            Value::Function(_) => ValueType::Function,
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    pub fn pair(left: impl Into<Value>, right: impl Into<Value>) -> Self {
        Value::Pair(Box::new(left.into()), Box::new(right.into()))
    }
}

// From trait implementations for Value - enables .into() conversion
impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Function> for Value {
    fn from(f: Function) -> Self {
        Value::Function(f)
    }
}

macro_rules! impl_from_number {
    ($num_type:ty) => {
        impl From<$num_type> for Value {
            fn from(n: $num_type) -> Self {
                Value::Number(f64::from(n))
            }
        }
    };
}

impl_from_number!(f64);
impl_from_number!(f32);
impl_from_number!(i32);
impl_from_number!(u32);
impl_from_number!(i16);
impl_from_number!(u16);
impl_from_number!(i8);
impl_from_number!(u8);

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::List(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>, const N: usize> From<[T; N]> for Value {
    fn from(arr: [T; N]) -> Self {
        Value::List(arr.into_iter().map(Into::into).collect())
    }
}

impl<K: Into<String>, T: Into<Value>> FromIterator<(K, T)> for Value {
    fn from_iter<I: IntoIterator<Item = (K, T)>>(iter: I) -> Self {
        Value::Map(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Helper function for creating Values in tests
#[cfg_attr(not(test), expect(dead_code))]
pub(crate) fn val<T: Into<Value>>(value: T) -> Value {
    value.into()
}

#[cfg_attr(not(test), expect(dead_code))]
pub(crate) fn nil() -> Value {
    Value::Nil
}

/// Inspect string
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{n}"),
            Value::String(s) => write!(f, "\"{s}\""),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Nil => write!(f, "nil"),
            Value::Pair(left, right) => write!(f, "({left} . {right})"),
            Value::List(elements) => {
                write!(f, "[")?;
                for (i, elem) in elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{elem}")?;
                }
                write!(f, "]")
            }
            Value::Map(entries) => {
                write!(f, "{{")?;
                for (i, (key, value)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "\"{key}\": {value}")?;
                }
                write!(f, "}}")
            }
            Value::Function(func) => match func.name() {
                Some(name) => write!(f, "<func {name}>"),
                None => write!(f, "<func>"),
            },
        }
    }
}

/// Expression tree. Every node remembers where it came from.
#[derive(Debug, Clone)]
pub enum Expr {
    Identifier {
        name: String,
        pos: Position,
    },
    Number {
        value: f64,
        pos: Position,
    },
    String {
        value: String,
        pos: Position,
    },
    Bool {
        value: bool,
        pos: Position,
    },
    Nil {
        pos: Position,
    },
    /// A built-in referenced directly by an operator token
    FunctionLiteral {
        op: &'static BuiltinOp,
        pos: Position,
    },
    /// First element is the callee
    Call {
        exprs: Vec<Expr>,
        pos: Position,
    },
    If {
        condition: Box<Expr>,
        then_branch: Box<Expr>,
        else_branch: Box<Expr>,
        pos: Position,
    },
    Fn {
        params: Vec<String>,
        body: Arc<[Expr]>,
        pos: Position,
    },
    Let {
        name: String,
        value: Box<Expr>,
        pos: Position,
    },
}

impl Expr {
    pub fn pos(&self) -> &Position {
        match self {
            Expr::Identifier { pos, .. }
            | Expr::Number { pos, .. }
            | Expr::String { pos, .. }
            | Expr::Bool { pos, .. }
            | Expr::Nil { pos }
            | Expr::FunctionLiteral { pos, .. }
            | Expr::Call { pos, .. }
            | Expr::If { pos, .. }
            | Expr::Fn { pos, .. }
            | Expr::Let { pos, .. } => pos,
        }
    }

    /// Source text that parses back to an equivalent expression
    pub fn code_str(&self) -> String {
        self.to_string()
    }
}

fn write_spaced(f: &mut fmt::Formatter<'_>, exprs: &[Expr]) -> fmt::Result {
    for (i, expr) in exprs.iter().enumerate() {
        if i > 0 {
            write!(f, " ")?;
        }
        write!(f, "{expr}")?;
    }
    Ok(())
}

/// Code string
impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Identifier { name, .. } => write!(f, "{name}"),
            Expr::Number { value, .. } => write!(f, "{value}"),
            Expr::String { value, .. } => write!(f, "\"{value}\""),
            Expr::Bool { value, .. } => write!(f, "{value}"),
            Expr::Nil { .. } => write!(f, "nil"),
            Expr::FunctionLiteral { op, .. } => write!(f, "{}", op.name),
            Expr::Call { exprs, .. } => {
                write!(f, "(")?;
                write_spaced(f, exprs)?;
                write!(f, ")")
            }
            Expr::If {
                condition,
                then_branch,
                else_branch,
                ..
            } => write!(f, "(if {condition} {then_branch} {else_branch})"),
            Expr::Fn { params, body, .. } => {
                write!(f, "(fn ({})", params.join(" "))?;
                if !body.is_empty() {
                    write!(f, " ")?;
                    write_spaced(f, body)?;
                }
                write!(f, ")")
            }
            Expr::Let { name, value, .. } => write!(f, "(let {name} {value})"),
        }
    }
}

#[cfg(test)]
mod helper_function_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_helper_functions_data_driven() {
        // (helper_result, expected_value)
        let test_cases = vec![
            (val(42), Value::Number(42.0)),
            (val(-17), Value::Number(-17.0)),
            (val(2.5), Value::Number(2.5)),
            (val(255u8), Value::Number(255.0)),
            (val(true), Value::Bool(true)),
            (val("hello"), Value::String("hello".to_owned())),
            (val(""), Value::String(String::new())),
            (nil(), Value::Nil),
            (
                val([1, 2, 3]),
                Value::List(vec![
                    Value::Number(1.0),
                    Value::Number(2.0),
                    Value::Number(3.0),
                ]),
            ),
            (
                val(vec![val("a"), val(1), nil()]),
                Value::List(vec![
                    Value::String("a".to_owned()),
                    Value::Number(1.0),
                    Value::Nil,
                ]),
            ),
            (
                Value::pair(1, "x"),
                Value::Pair(
                    Box::new(Value::Number(1.0)),
                    Box::new(Value::String("x".to_owned())),
                ),
            ),
            (
                [("b", 2), ("a", 1)].into_iter().collect(),
                Value::Map(BTreeMap::from([
                    ("a".to_owned(), Value::Number(1.0)),
                    ("b".to_owned(), Value::Number(2.0)),
                ])),
            ),
        ];

        for (i, (actual, expected)) in test_cases.into_iter().enumerate() {
            assert_eq!(actual, expected, "test case #{}", i + 1);
        }
    }

    #[test]
    fn test_inspect_strings() {
        let add = Function::new(Some("listMap"), |_, _| Ok(Value::Nil));
        let anonymous = Function::new(None, |_, _| Ok(Value::Nil));
        let test_cases = vec![
            (val(3), "3"),
            (val(0.5), "0.5"),
            (val(-2), "-2"),
            (val("a b"), "\"a b\""),
            (val(true), "true"),
            (val(false), "false"),
            (nil(), "nil"),
            (Value::pair(1, nil()), "(1 . nil)"),
            (Value::pair(1, Value::pair(2, 3)), "(1 . (2 . 3))"),
            (val(["a", "b", "c"]), "[\"a\" \"b\" \"c\"]"),
            (val(Vec::<Value>::new()), "[]"),
            ([("x", 1), ("y", 2)].into_iter().collect(), "{\"x\": 1, \"y\": 2}"),
            (Value::Map(BTreeMap::new()), "{}"),
            (val(add), "<func listMap>"),
            (val(anonymous), "<func>"),
        ];

        for (value, expected) in test_cases {
            assert_eq!(value.to_string(), expected);
        }
    }

    #[test]
    fn test_value_types() {
        let f = Function::new(None, |_, _| Ok(Value::Nil));
        let test_cases = vec![
            (val(1), ValueType::Number, "number"),
            (val("s"), ValueType::String, "string"),
            (val(false), ValueType::Bool, "bool"),
            (nil(), ValueType::Nil, "nil"),
            (Value::pair(1, 2), ValueType::Pair, "pair"),
            (val([1]), ValueType::List, "list"),
            (Value::Map(BTreeMap::new()), ValueType::Map, "map"),
            (val(f), ValueType::Function, "function"),
        ];

        for (value, expected, name) in test_cases {
            assert_eq!(value.value_type(), expected);
            assert_eq!(expected.to_string(), name);
        }
    }

    #[test]
    fn test_function_identity() {
        let f = Function::new(Some("f"), |_, _| Ok(Value::Nil));
        let g = Function::new(Some("f"), |_, _| Ok(Value::Nil));
        assert_eq!(val(f.clone()), val(f.clone()));
        assert_ne!(val(f), val(g));
    }
}
