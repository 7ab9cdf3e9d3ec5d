//! Typed argument extraction for built-ins.
//!
//! An [`ArgMapper`] walks a built-in's arguments in order. Each `read_*`
//! call consumes one argument position (or, for [`ArgMapper::read_remaining`],
//! every position left) and appends the converted value to the mapper's
//! output tuple. The first failure is recorded and every later read becomes a
//! no-op; [`ArgMapper::complete`] then reports that failure, or rejects any
//! arguments nobody asked for.
//!
//! ```rust,ignore
//! let (list, callback) = ArgMapper::values("listMap", args)
//!     .read_list()
//!     .read_function()
//!     .complete()?;
//! ```
//!
//! Arguments come either from already evaluated values or from expressions
//! that are evaluated only when a read reaches them.

use std::collections::BTreeMap;

use crate::Error;
use crate::ast::{Expr, Function, Value};
use crate::evaluator::{Environment, eval};

// =====================================================================
// Conversions from runtime values
// =====================================================================

/// A Rust type that one argument position can be converted into.
pub trait FromArg: Sized {
    /// Name of the expected kind, used in argument errors
    const EXPECTED: &'static str;

    /// Convert the value, handing it back unchanged on a kind mismatch.
    fn from_arg(value: Value) -> Result<Self, Value>;
}

macro_rules! impl_from_arg {
    ($ty:ty, $kind:expr, $pattern:pat => $out:expr) => {
        impl FromArg for $ty {
            const EXPECTED: &'static str = $kind;

            fn from_arg(value: Value) -> Result<Self, Value> {
                match value {
                    $pattern => Ok($out),
                    other => Err(other),
                }
            }
        }
    };
}

impl_from_arg!(f64, "number", Value::Number(n) => n);
impl_from_arg!(String, "string", Value::String(s) => s);
impl_from_arg!(bool, "bool", Value::Bool(b) => b);
impl_from_arg!(Function, "function", Value::Function(f) => f);
impl_from_arg!((Value, Value), "pair", Value::Pair(left, right) => (*left, *right));
impl_from_arg!(Vec<Value>, "list", Value::List(items) => items);
impl_from_arg!(BTreeMap<String, Value>, "map", Value::Map(entries) => entries);

impl FromArg for Value {
    const EXPECTED: &'static str = "any value";

    fn from_arg(value: Value) -> Result<Self, Value> {
        Ok(value)
    }
}

// =====================================================================
// Output tuple building
// =====================================================================

/// Appends one element to a tuple: `()` becomes `(U,)`, `(A,)` becomes
/// `(A, U)`, and so on.
pub trait Append<U> {
    type Output;

    fn append(self, value: U) -> Self::Output;
}

impl<U> Append<U> for () {
    type Output = (U,);

    fn append(self, value: U) -> Self::Output {
        (value,)
    }
}

macro_rules! impl_append_for_arity {
    ($($name:ident),+) => {
        impl<$($name,)+ U> Append<U> for ($($name,)+) {
            type Output = ($($name,)+ U,);

            #[allow(non_snake_case)]
            fn append(self, value: U) -> Self::Output {
                let ($($name,)+) = self;
                ($($name,)+ value,)
            }
        }
    };
}

impl_append_for_arity!(A);
impl_append_for_arity!(A, B);
impl_append_for_arity!(A, B, C);
impl_append_for_arity!(A, B, C, D);

// =====================================================================
// Argument sources
// =====================================================================

enum ArgSource<'a> {
    Values(std::vec::IntoIter<Value>),
    Exprs {
        env: &'a Environment,
        exprs: std::slice::Iter<'a, Expr>,
    },
}

impl ArgSource<'_> {
    fn next(&mut self) -> Option<Result<Value, Error>> {
        match self {
            ArgSource::Values(values) => values.next().map(Ok),
            ArgSource::Exprs { env, exprs } => {
                let env = *env;
                exprs.next().map(|expr| eval(expr, env))
            }
        }
    }

    fn remaining(&self) -> usize {
        match self {
            ArgSource::Values(values) => values.len(),
            ArgSource::Exprs { exprs, .. } => exprs.len(),
        }
    }
}

struct Cursor<'a> {
    function: &'a str,
    source: ArgSource<'a>,
    /// Index of the next argument position
    index: usize,
}

impl Cursor<'_> {
    fn take<U: FromArg>(&mut self) -> Result<U, Error> {
        let index = self.index;
        let value = self
            .source
            .next()
            .ok_or_else(|| Error::argument(self.function, index, U::EXPECTED, "nothing"))??;
        self.index += 1;
        U::from_arg(value)
            .map_err(|v| Error::argument(self.function, index, U::EXPECTED, v.value_type()))
    }

    fn take_optional<U: FromArg>(&mut self) -> Result<Option<U>, Error> {
        if self.source.remaining() == 0 {
            return Ok(None);
        }
        self.take().map(Some)
    }

    fn take_remaining<U: FromArg>(&mut self) -> Result<Vec<U>, Error> {
        let mut out = Vec::with_capacity(self.source.remaining());
        while self.source.remaining() > 0 {
            out.push(self.take()?);
        }
        Ok(out)
    }
}

// =====================================================================
// The mapper
// =====================================================================

/// Fluent argument validator; see the module documentation.
pub struct ArgMapper<'a, T> {
    cursor: Cursor<'a>,
    state: Result<T, Error>,
}

impl<'a> ArgMapper<'a, ()> {
    /// Map already evaluated arguments.
    pub fn values(function: &'a str, values: Vec<Value>) -> Self {
        ArgMapper {
            cursor: Cursor {
                function,
                source: ArgSource::Values(values.into_iter()),
                index: 0,
            },
            state: Ok(()),
        }
    }

    /// Map argument expressions, evaluating each in `env` only when a read
    /// reaches it.
    pub fn exprs(function: &'a str, env: &'a Environment, exprs: &'a [Expr]) -> Self {
        ArgMapper {
            cursor: Cursor {
                function,
                source: ArgSource::Exprs {
                    env,
                    exprs: exprs.iter(),
                },
                index: 0,
            },
            state: Ok(()),
        }
    }
}

impl<'a, T> ArgMapper<'a, T> {
    fn step<U, F>(self, take: F) -> ArgMapper<'a, T::Output>
    where
        T: Append<U>,
        F: FnOnce(&mut Cursor<'a>) -> Result<U, Error>,
    {
        let ArgMapper { mut cursor, state } = self;
        let state = state.and_then(|acc| take(&mut cursor).map(|value| acc.append(value)));
        ArgMapper { cursor, state }
    }

    /// Read one argument of any [`FromArg`] type.
    pub fn read<U: FromArg>(self) -> ArgMapper<'a, T::Output>
    where
        T: Append<U>,
    {
        self.step(Cursor::take::<U>)
    }

    /// Read one argument if there is one left; yields `None` otherwise.
    pub fn read_optional<U: FromArg>(self) -> ArgMapper<'a, T::Output>
    where
        T: Append<Option<U>>,
    {
        self.step(Cursor::take_optional::<U>)
    }

    /// Read every argument left, each converted to `U`.
    pub fn read_remaining<U: FromArg>(self) -> ArgMapper<'a, T::Output>
    where
        T: Append<Vec<U>>,
    {
        self.step(Cursor::take_remaining::<U>)
    }

    pub fn read_number(self) -> ArgMapper<'a, T::Output>
    where
        T: Append<f64>,
    {
        self.read::<f64>()
    }

    pub fn read_string(self) -> ArgMapper<'a, T::Output>
    where
        T: Append<String>,
    {
        self.read::<String>()
    }

    pub fn read_bool(self) -> ArgMapper<'a, T::Output>
    where
        T: Append<bool>,
    {
        self.read::<bool>()
    }

    pub fn read_function(self) -> ArgMapper<'a, T::Output>
    where
        T: Append<Function>,
    {
        self.read::<Function>()
    }

    pub fn read_pair(self) -> ArgMapper<'a, T::Output>
    where
        T: Append<(Value, Value)>,
    {
        self.read::<(Value, Value)>()
    }

    pub fn read_list(self) -> ArgMapper<'a, T::Output>
    where
        T: Append<Vec<Value>>,
    {
        self.read::<Vec<Value>>()
    }

    pub fn read_map(self) -> ArgMapper<'a, T::Output>
    where
        T: Append<BTreeMap<String, Value>>,
    {
        self.read::<BTreeMap<String, Value>>()
    }

    pub fn read_any(self) -> ArgMapper<'a, T::Output>
    where
        T: Append<Value>,
    {
        self.read::<Value>()
    }

    /// Finish mapping: report the first recorded failure, or fail if any
    /// argument was left unread.
    pub fn complete(self) -> Result<T, Error> {
        let ArgMapper { cursor, state } = self;
        let out = state?;
        match cursor.source.remaining() {
            0 => Ok(out),
            left => Err(Error::argument(
                cursor.function,
                cursor.index,
                "no more arguments",
                format!("{left} more"),
            )),
        }
    }
}
