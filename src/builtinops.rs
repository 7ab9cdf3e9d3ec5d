//! Built-in operations registry.
//!
//! Every built-in lives in one read-only table. Operators (`+`, `<=`, ...)
//! are reached through operator tokens, which the parser resolves straight
//! to a [`BuiltinOp`]; named built-ins (`car`, `listMap`, ...) are the
//! bindings of the root environment frame.
//!
//! ```scheme
//! (+ 1 2 3)                              ; 6
//! (listFilter (list 1 2 3) (fn (x) (> x 1)))   ; [2 3]
//! (mapGet (map "a" 1) "a")               ; 1
//! ```
//!
//! ## Error Handling
//!
//! No built-in coerces its inputs:
//!
//! - **Type Safety**: arguments are validated by the [`ArgMapper`] before any
//!   work is done, so `(not 1)` is an argument error rather than `false`
//! - **Arity Checking**: missing and surplus arguments are both errors
//! - **Callbacks**: filter callbacks must answer `true`, `false` or `nil`
//!
//! Runtime failures such as an out-of-range `listGet` carry no position of
//! their own; the evaluator attaches the position of the calling expression.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::io::{self, Write};
use std::sync::LazyLock;

use crate::Error;
use crate::ast::{Function, Value};
use crate::evaluator::Environment;
use crate::evaluator::argmapper::{ArgMapper, FromArg};

/// Signature of every built-in body
pub type BuiltinFn = fn(&Environment, Vec<Value>) -> Result<Value, Error>;

/// How a built-in is spelled in source text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Syntax {
    /// An operator token such as `+` or `<=`
    Operator,
    /// A name bound in the root frame
    Identifier,
}

/// Definition of a built-in operation
#[derive(Clone)]
pub struct BuiltinOp {
    pub name: &'static str,
    pub syntax: Syntax,
    pub func: BuiltinFn,
}

impl fmt::Debug for BuiltinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuiltinOp")
            .field("name", &self.name)
            .field("syntax", &self.syntax)
            .finish_non_exhaustive()
    }
}

impl PartialEq for BuiltinOp {
    fn eq(&self, other: &Self) -> bool {
        // names are unique within the registry
        self.name == other.name
    }
}

impl BuiltinOp {
    /// Wrap this built-in as a runtime function value.
    pub fn to_function(&self) -> Function {
        Function::new(Some(self.name), self.func)
    }
}

//
// Builtin Function Implementations
//

// Left folds over one or more numbers
macro_rules! arithmetic {
    ($name:ident, $id:expr, $op:tt) => {
        fn $name(_: &Environment, args: Vec<Value>) -> Result<Value, Error> {
            let (first, rest) = ArgMapper::values($id, args)
                .read_number()
                .read_remaining::<f64>()
                .complete()?;
            Ok(Value::Number(rest.into_iter().fold(first, |acc, n| acc $op n)))
        }
    };
}

arithmetic!(builtin_add, "+", +);
arithmetic!(builtin_mul, "*", *);
// IEEE semantics: dividing by zero gives an infinity or NaN
arithmetic!(builtin_div, "/", /);

fn builtin_sub(_: &Environment, args: Vec<Value>) -> Result<Value, Error> {
    let (first, rest) = ArgMapper::values("-", args)
        .read_number()
        .read_remaining::<f64>()
        .complete()?;
    if rest.is_empty() {
        return Ok(Value::Number(-first));
    }
    Ok(Value::Number(rest.into_iter().fold(first, |acc, n| acc - n)))
}

// Exactly two numbers
macro_rules! numeric_comparison {
    ($name:ident, $id:expr, $op:tt) => {
        fn $name(_: &Environment, args: Vec<Value>) -> Result<Value, Error> {
            let (a, b) = ArgMapper::values($id, args)
                .read_number()
                .read_number()
                .complete()?;
            Ok(Value::Bool(a $op b))
        }
    };
}

numeric_comparison!(builtin_eq, "==", ==);
numeric_comparison!(builtin_lt, "<", <);
numeric_comparison!(builtin_gt, ">", >);
numeric_comparison!(builtin_le, "<=", <=);
numeric_comparison!(builtin_ge, ">=", >=);

// Every argument has already been evaluated by the time these run, so
// `and`/`or` never short-circuit evaluation
fn builtin_and(_: &Environment, args: Vec<Value>) -> Result<Value, Error> {
    let (first, rest) = ArgMapper::values("and", args)
        .read_bool()
        .read_remaining::<bool>()
        .complete()?;
    Ok(Value::Bool(first && rest.into_iter().all(|b| b)))
}

fn builtin_or(_: &Environment, args: Vec<Value>) -> Result<Value, Error> {
    let (first, rest) = ArgMapper::values("or", args)
        .read_bool()
        .read_remaining::<bool>()
        .complete()?;
    Ok(Value::Bool(first || rest.into_iter().any(|b| b)))
}

fn builtin_not(_: &Environment, args: Vec<Value>) -> Result<Value, Error> {
    let (b,) = ArgMapper::values("not", args).read_bool().complete()?;
    Ok(Value::Bool(!b))
}

fn builtin_concat(_: &Environment, args: Vec<Value>) -> Result<Value, Error> {
    let (parts,) = ArgMapper::values("concat", args)
        .read_remaining::<String>()
        .complete()?;
    Ok(Value::String(parts.concat()))
}

fn builtin_str_eq(_: &Environment, args: Vec<Value>) -> Result<Value, Error> {
    let (a, b) = ArgMapper::values("strEq", args)
        .read_string()
        .read_string()
        .complete()?;
    Ok(Value::Bool(a == b))
}

fn builtin_cons(_: &Environment, args: Vec<Value>) -> Result<Value, Error> {
    let (left, right) = ArgMapper::values("cons", args)
        .read_optional::<Value>()
        .read_optional::<Value>()
        .complete()?;
    Ok(Value::pair(
        left.unwrap_or(Value::Nil),
        right.unwrap_or(Value::Nil),
    ))
}

fn builtin_car(_: &Environment, args: Vec<Value>) -> Result<Value, Error> {
    let ((left, _),) = ArgMapper::values("car", args).read_pair().complete()?;
    Ok(left)
}

fn builtin_cdr(_: &Environment, args: Vec<Value>) -> Result<Value, Error> {
    let ((_, right),) = ArgMapper::values("cdr", args).read_pair().complete()?;
    Ok(right)
}

fn builtin_list(_: &Environment, args: Vec<Value>) -> Result<Value, Error> {
    Ok(Value::List(args))
}

fn builtin_list_get(_: &Environment, args: Vec<Value>) -> Result<Value, Error> {
    let (mut items, n) = ArgMapper::values("listGet", args)
        .read_list()
        .read_number()
        .complete()?;
    let index = n.floor();
    // written so that NaN falls through to the error
    if !(index >= 0.0 && index < items.len() as f64) {
        return Err(Error::eval(format!(
            "listGet index {n} out of bounds for list of length {}",
            items.len()
        )));
    }
    Ok(items.swap_remove(index as usize))
}

/// Interpret a filter callback's answer: `true` keeps, `false` and `nil` drop.
fn filter_verdict(function: &str, verdict: Value) -> Result<bool, Error> {
    match verdict {
        Value::Bool(keep) => Ok(keep),
        Value::Nil => Ok(false),
        other => Err(Error::eval(format!(
            "{function} callback must return a bool or nil, got {}",
            other.value_type()
        ))),
    }
}

fn builtin_list_filter(env: &Environment, args: Vec<Value>) -> Result<Value, Error> {
    let (items, callback) = ArgMapper::values("listFilter", args)
        .read_list()
        .read_function()
        .complete()?;
    let mut kept = Vec::new();
    for item in items {
        let verdict = callback.call(env, vec![item.clone()])?;
        if filter_verdict("listFilter", verdict)? {
            kept.push(item);
        }
    }
    Ok(Value::List(kept))
}

fn builtin_list_map(env: &Environment, args: Vec<Value>) -> Result<Value, Error> {
    let (items, callback) = ArgMapper::values("listMap", args)
        .read_list()
        .read_function()
        .complete()?;
    items
        .into_iter()
        .map(|item| callback.call(env, vec![item]))
        .collect::<Result<Vec<_>, _>>()
        .map(Value::List)
}

fn builtin_list_reduce(env: &Environment, args: Vec<Value>) -> Result<Value, Error> {
    let (init, items, callback) = ArgMapper::values("listReduce", args)
        .read_any()
        .read_list()
        .read_function()
        .complete()?;
    items
        .into_iter()
        .try_fold(init, |acc, item| callback.call(env, vec![acc, item]))
}

/// Anything `len` can measure
enum Measured {
    List(Vec<Value>),
    String(String),
    Map(BTreeMap<String, Value>),
}

impl FromArg for Measured {
    const EXPECTED: &'static str = "list, string or map";

    fn from_arg(value: Value) -> Result<Self, Value> {
        match value {
            Value::List(items) => Ok(Measured::List(items)),
            Value::String(s) => Ok(Measured::String(s)),
            Value::Map(entries) => Ok(Measured::Map(entries)),
            other => Err(other),
        }
    }
}

fn builtin_len(_: &Environment, args: Vec<Value>) -> Result<Value, Error> {
    let (measured,) = ArgMapper::values("len", args).read::<Measured>().complete()?;
    let len = match measured {
        Measured::List(items) => items.len(),
        Measured::String(s) => s.chars().count(),
        Measured::Map(entries) => entries.len(),
    };
    Ok(Value::Number(len as f64))
}

fn builtin_map(_: &Environment, args: Vec<Value>) -> Result<Value, Error> {
    let (values,) = ArgMapper::values("map", args)
        .read_remaining::<Value>()
        .complete()?;
    if values.len() % 2 != 0 {
        return Err(Error::argument(
            "map",
            values.len(),
            "a value for the last key",
            "nothing",
        ));
    }
    let mut entries = BTreeMap::new();
    let mut values = values.into_iter().enumerate();
    while let (Some((index, key)), Some((_, value))) = (values.next(), values.next()) {
        let key = String::from_arg(key).map_err(|other| {
            Error::argument("map", index, String::EXPECTED, other.value_type())
        })?;
        entries.insert(key, value);
    }
    Ok(Value::Map(entries))
}

fn builtin_map_get(_: &Environment, args: Vec<Value>) -> Result<Value, Error> {
    let (mut entries, key) = ArgMapper::values("mapGet", args)
        .read_map()
        .read_string()
        .complete()?;
    Ok(entries.remove(&key).unwrap_or(Value::Nil))
}

fn builtin_map_filter(env: &Environment, args: Vec<Value>) -> Result<Value, Error> {
    let (entries, callback) = ArgMapper::values("mapFilter", args)
        .read_map()
        .read_function()
        .complete()?;
    let mut kept = BTreeMap::new();
    for (key, value) in entries {
        let verdict = callback.call(env, vec![Value::String(key.clone()), value.clone()])?;
        if filter_verdict("mapFilter", verdict)? {
            kept.insert(key, value);
        }
    }
    Ok(Value::Map(kept))
}

fn builtin_map_map(env: &Environment, args: Vec<Value>) -> Result<Value, Error> {
    let (entries, callback) = ArgMapper::values("mapMap", args)
        .read_map()
        .read_function()
        .complete()?;
    entries
        .into_iter()
        .map(|(key, value)| {
            let mapped = callback.call(env, vec![Value::String(key.clone()), value])?;
            Ok((key, mapped))
        })
        .collect::<Result<BTreeMap<_, _>, Error>>()
        .map(Value::Map)
}

fn builtin_map_reduce(env: &Environment, args: Vec<Value>) -> Result<Value, Error> {
    let (init, entries, callback) = ArgMapper::values("mapReduce", args)
        .read_any()
        .read_map()
        .read_function()
        .complete()?;
    entries.into_iter().try_fold(init, |acc, (key, value)| {
        callback.call(env, vec![acc, Value::String(key), value])
    })
}

fn builtin_map_keys(_: &Environment, args: Vec<Value>) -> Result<Value, Error> {
    let (entries,) = ArgMapper::values("mapKeys", args).read_map().complete()?;
    Ok(Value::List(entries.into_keys().map(Value::String).collect()))
}

fn builtin_map_values(_: &Environment, args: Vec<Value>) -> Result<Value, Error> {
    let (entries,) = ArgMapper::values("mapValues", args).read_map().complete()?;
    Ok(Value::List(entries.into_values().collect()))
}

fn builtin_print(_: &Environment, args: Vec<Value>) -> Result<Value, Error> {
    write_line(&mut io::stdout().lock(), &args)?;
    Ok(Value::Nil)
}

/// Write the inspect strings of `values` separated by spaces, then a newline.
/// A closed stdout surfaces as an evaluation error rather than a panic.
fn write_line(out: &mut impl Write, values: &[Value]) -> Result<(), Error> {
    let line = values
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ");
    writeln!(out, "{line}").map_err(|e| Error::eval(format!("print failed: {e}")))
}

//
// Registry
//

const fn operator(name: &'static str, func: BuiltinFn) -> BuiltinOp {
    BuiltinOp {
        name,
        syntax: Syntax::Operator,
        func,
    }
}

const fn named(name: &'static str, func: BuiltinFn) -> BuiltinOp {
    BuiltinOp {
        name,
        syntax: Syntax::Identifier,
        func,
    }
}

/// Global registry of all built-in operations
static BUILTIN_OPS: &[BuiltinOp] = &[
    // Arithmetic
    operator("+", builtin_add),
    operator("-", builtin_sub),
    operator("*", builtin_mul),
    operator("/", builtin_div),
    // Comparison
    operator("==", builtin_eq),
    operator("<", builtin_lt),
    operator(">", builtin_gt),
    operator("<=", builtin_le),
    operator(">=", builtin_ge),
    // Logic
    named("and", builtin_and),
    named("or", builtin_or),
    named("not", builtin_not),
    // Strings
    named("concat", builtin_concat),
    named("strEq", builtin_str_eq),
    // Pairs
    named("cons", builtin_cons),
    named("car", builtin_car),
    named("cdr", builtin_cdr),
    // Lists
    named("list", builtin_list),
    named("listGet", builtin_list_get),
    named("listFilter", builtin_list_filter),
    named("listMap", builtin_list_map),
    named("listReduce", builtin_list_reduce),
    named("len", builtin_len),
    // Maps
    named("map", builtin_map),
    named("mapGet", builtin_map_get),
    named("mapFilter", builtin_map_filter),
    named("mapMap", builtin_map_map),
    named("mapReduce", builtin_map_reduce),
    named("mapKeys", builtin_map_keys),
    named("mapValues", builtin_map_values),
    // Misc
    named("print", builtin_print),
];

/// Lazy static map from operator token to BuiltinOp (private - use find_operator)
static OPERATORS: LazyLock<HashMap<&'static str, &'static BuiltinOp>> = LazyLock::new(|| {
    BUILTIN_OPS
        .iter()
        .filter(|op| op.syntax == Syntax::Operator)
        .map(|op| (op.name, op))
        .collect()
});

/// Lazy static map from name to BuiltinOp (private - use find_builtin)
static NAMED: LazyLock<HashMap<&'static str, &'static BuiltinOp>> = LazyLock::new(|| {
    BUILTIN_OPS
        .iter()
        .filter(|op| op.syntax == Syntax::Identifier)
        .map(|op| (op.name, op))
        .collect()
});

/// All built-in operations in registry order
pub fn builtin_ops() -> &'static [BuiltinOp] {
    BUILTIN_OPS
}

/// Find the built-in behind an operator token
pub fn find_operator(token: &str) -> Option<&'static BuiltinOp> {
    OPERATORS.get(token).copied()
}

/// Find a named built-in, as bound in the root frame
pub fn find_builtin(name: &str) -> Option<&'static BuiltinOp> {
    NAMED.get(name).copied()
}
