pub mod argmapper;

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

use tracing::{trace, warn};

use crate::ast::{Expr, Function, Value, ValueType};
use crate::builtinops::find_builtin;
use crate::scanner::Position;
use crate::{Error, MAX_EVAL_DEPTH};
use argmapper::ArgMapper;

#[derive(Debug)]
enum Bindings {
    /// The read-only built-in table
    Builtins,
    Local(RefCell<HashMap<String, Value>>),
}

#[derive(Debug)]
struct Frame {
    bindings: Bindings,
    parent: Option<Environment>,
}

/// One frame of the lexical environment chain.
///
/// Cloning is cheap and yields a handle to the same frame, so closures can
/// keep their defining frame alive after the call that created it returns.
#[derive(Debug, Clone)]
pub struct Environment(Rc<Frame>);

impl Environment {
    /// The parentless root frame holding the built-in library.
    pub fn builtins() -> Self {
        Environment(Rc::new(Frame {
            bindings: Bindings::Builtins,
            parent: None,
        }))
    }

    /// A new empty frame whose parent is this one.
    pub fn child(&self) -> Self {
        Environment(Rc::new(Frame {
            bindings: Bindings::Local(RefCell::new(HashMap::new())),
            parent: Some(self.clone()),
        }))
    }

    /// Bind `name` in this frame, replacing any earlier binding here.
    /// The built-in frame is read-only and ignores the request.
    pub fn define(&self, name: impl Into<String>, value: Value) {
        let name = name.into();
        match &self.0.bindings {
            Bindings::Local(map) => {
                map.borrow_mut().insert(name, value);
            }
            Bindings::Builtins => warn!(name = %name, "built-in frame is read-only; binding ignored"),
        }
    }

    /// Look `name` up starting at this frame and walking outwards.
    pub fn resolve(&self, name: &str) -> Option<Value> {
        let mut frame = Some(self);
        while let Some(env) = frame {
            match &env.0.bindings {
                Bindings::Local(map) => {
                    if let Some(value) = map.borrow().get(name) {
                        return Some(value.clone());
                    }
                }
                Bindings::Builtins => {
                    if let Some(op) = find_builtin(name) {
                        return Some(Value::Function(op.to_function()));
                    }
                }
            }
            frame = env.0.parent.as_ref();
        }
        None
    }

    /// Bindings made directly in this frame, sorted by name.
    pub fn bindings(&self) -> Vec<(String, Value)> {
        let Bindings::Local(map) = &self.0.bindings else {
            return Vec::new();
        };
        let mut result: Vec<_> = map
            .borrow()
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        result.sort_by(|a, b| a.0.cmp(&b.0));
        result
    }
}

/// A script frame whose parent is the built-in frame
pub fn create_global_env() -> Environment {
    Environment::builtins().child()
}

thread_local! {
    static EVAL_DEPTH: Cell<usize> = const { Cell::new(0) };
}

/// Counts one nested call evaluation for as long as it lives.
struct DepthGuard;

impl DepthGuard {
    fn enter(pos: &Position) -> Result<Self, Error> {
        EVAL_DEPTH.with(|depth| {
            let current = depth.get();
            if current >= MAX_EVAL_DEPTH {
                return Err(Error::eval_at(
                    format!("maximum evaluation depth exceeded (max: {MAX_EVAL_DEPTH})"),
                    pos,
                ));
            }
            depth.set(current + 1);
            Ok(DepthGuard)
        })
    }
}

impl Drop for DepthGuard {
    fn drop(&mut self) {
        EVAL_DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

// Stack growth for deep recursion: once less than the red zone is left, the
// evaluation continues on a freshly allocated segment
const STACK_RED_ZONE: usize = 128 * 1024;
const STACK_GROW_SIZE: usize = 4 * 1024 * 1024;

/// Evaluate one expression in `env`.
pub fn eval(expr: &Expr, env: &Environment) -> Result<Value, Error> {
    stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, || eval_inner(expr, env))
}

fn eval_inner(expr: &Expr, env: &Environment) -> Result<Value, Error> {
    match expr {
        Expr::Number { value, .. } => Ok(Value::Number(*value)),
        Expr::String { value, .. } => Ok(Value::String(value.clone())),
        Expr::Bool { value, .. } => Ok(Value::Bool(*value)),
        Expr::Nil { .. } => Ok(Value::Nil),
        Expr::FunctionLiteral { op, .. } => Ok(Value::Function(op.to_function())),

        // unknown names are nil, not an error
        Expr::Identifier { name, .. } => Ok(env.resolve(name).unwrap_or(Value::Nil)),

        Expr::Call { exprs, pos } => eval_call(exprs, pos, env),

        Expr::If {
            condition,
            then_branch,
            else_branch,
            ..
        } => match eval(condition, env)? {
            Value::Bool(true) => eval(then_branch, env),
            Value::Bool(false) => eval(else_branch, env),
            other => Err(Error::TypeError {
                expected: ValueType::Bool,
                actual: other.value_type(),
                pos: condition.pos().clone(),
            }),
        },

        Expr::Fn { params, body, .. } => Ok(Value::Function(make_closure(params, body, env))),

        Expr::Let { name, value, .. } => {
            let value = eval(value, env)?;
            env.define(name.as_str(), value.clone());
            Ok(value)
        }
    }
}

/// Evaluate top-level expressions in order, stopping at the first error.
pub fn eval_program(exprs: &[Expr], env: &Environment) -> Result<Vec<Value>, Error> {
    exprs.iter().map(|expr| eval(expr, env)).collect()
}

fn eval_call(exprs: &[Expr], pos: &Position, env: &Environment) -> Result<Value, Error> {
    let Some((callee, arg_exprs)) = exprs.split_first() else {
        return Ok(Value::Nil);
    };
    let _guard = DepthGuard::enter(pos)?;
    trace!(callee = %callee, pos = %pos, "call");

    let callee_value = match callee {
        Expr::Identifier { name, pos: at } => env.resolve(name).ok_or_else(|| {
            Error::eval_at(
                format!("undefined identifier '{name}' cannot be used as a function"),
                at,
            )
        })?,
        other => eval(other, env)?,
    };
    let function = match callee_value {
        Value::Function(function) => function,
        other => {
            return Err(Error::TypeError {
                expected: ValueType::Function,
                actual: other.value_type(),
                pos: callee.pos().clone(),
            });
        }
    };

    let name = function.name().unwrap_or("<anonymous>");
    let (args,) = ArgMapper::exprs(name, env, arg_exprs)
        .read_remaining::<Value>()
        .complete()?;
    function.call(env, args).map_err(|e| e.or_at(pos))
}

/// Build the function value for an `fn` expression evaluated in `env`.
fn make_closure(params: &[String], body: &Arc<[Expr]>, env: &Environment) -> Function {
    let captured = env.clone();
    let params = params.to_vec();
    let body = Arc::clone(body);
    Function::new(None, move |_caller, args| {
        if args.len() != params.len() {
            return Err(Error::eval(format!(
                "expected {} arguments in call; got {}",
                params.len(),
                args.len()
            )));
        }
        let frame = captured.child();
        for (param, arg) in params.iter().zip(args) {
            frame.define(param.as_str(), arg);
        }
        body.iter()
            .try_fold(Value::Nil, |_, expr| eval(expr, &frame))
    })
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::ast::{nil, val};
    use crate::parser::parse;
    use pretty_assertions::assert_eq;

    /// Test result variants for comprehensive testing
    #[derive(Debug)]
    enum TestResult {
        EvalResult(Value),           // Evaluation should succeed with this value
        Succeeds,                    // Evaluation should succeed; the value is not compared
        SpecificError(&'static str), // Evaluation should fail with error containing this string
        Error,                       // Evaluation should fail (any error)
    }
    use TestResult::*;

    /// Test environment containing test cases that share state
    struct TestEnvironment(Vec<(&'static str, TestResult)>);

    /// Micro-helper for success cases in comprehensive tests
    fn success<T: Into<Value>>(value: T) -> TestResult {
        EvalResult(val(value))
    }

    /// Macro for setup expressions whose value does not matter (like binding a function)
    macro_rules! test_setup {
        ($expr:expr) => {
            ($expr, Succeeds)
        };
    }

    /// Run tests in isolated environments with shared state
    fn run_tests_in_environment(test_environments: Vec<TestEnvironment>) {
        for (env_idx, TestEnvironment(test_cases)) in test_environments.iter().enumerate() {
            let env = create_global_env();

            for (test_idx, (input, expected)) in test_cases.iter().enumerate() {
                let test_id = format!("Environment #{} test #{}", env_idx + 1, test_idx + 1);
                execute_test_case(input, expected, &env, &test_id);
            }
        }
    }

    /// Execute a single test case; the value of the last top-level expression is compared
    fn execute_test_case(input: &str, expected: &TestResult, env: &Environment, test_id: &str) {
        let exprs = match parse("test.l", input) {
            Ok(exprs) => exprs,
            Err(parse_err) => {
                panic!("{test_id}: unexpected parse error for '{input}': {parse_err}");
            }
        };

        let result = eval_program(&exprs, env)
            .map(|values| values.last().cloned().unwrap_or(Value::Nil));
        match (result, expected) {
            (Ok(actual), EvalResult(expected_val)) => {
                assert_eq!(actual, *expected_val, "{test_id}: value mismatch for '{input}'");
            }
            (Ok(_), Succeeds) | (Err(_), Error) => {}
            (Err(e), SpecificError(expected_text)) => {
                let error_msg = format!("{e}");
                assert!(
                    error_msg.contains(expected_text),
                    "{test_id}: error should contain '{expected_text}', got: {error_msg}"
                );
            }
            (Ok(actual), Error) => {
                panic!("{test_id}: expected error, got {actual}");
            }
            (Ok(actual), SpecificError(expected_text)) => {
                panic!("{test_id}: expected error containing '{expected_text}', got {actual}");
            }
            (Err(err), EvalResult(_) | Succeeds) => {
                panic!("{test_id}: unexpected error for '{input}': {err}");
            }
        }
    }

    /// Each case runs in a fresh global environment
    fn run_comprehensive_tests(test_cases: Vec<(&str, TestResult)>) {
        for (i, (input, expected)) in test_cases.iter().enumerate() {
            let env = create_global_env();
            let test_id = format!("#{}", i + 1);
            execute_test_case(input, expected, &env, &test_id);
        }
    }

    #[test]
    fn test_comprehensive_operations_data_driven() {
        let test_cases = vec![
            // === LITERALS ===
            ("42", success(42)),
            ("-2.5", success(-2.5)),
            ("\"hello world\"", success("hello world")),
            ("\"\"", success("")),
            ("true", success(true)),
            ("false", success(false)),
            ("nil", EvalResult(nil())),
            // === IDENTIFIERS ===
            ("undefinedThing", EvalResult(nil())),
            ("car", Succeeds),
            // === CALLS ===
            ("()", EvalResult(nil())),
            ("(+ 1 2)", success(3)),
            ("(+ 1 (* 2 3) (- 10 4))", success(13)),
            ("(car (cons 1 2))", success(1)),
            ("(cdr (cons 1 2))", success(2)),
            (
                "(undefinedName 1 2)",
                SpecificError("undefined identifier 'undefinedName' cannot be used as a function"),
            ),
            ("(undefinedName 1 2)", SpecificError("at test.l:1:2")),
            ("(1 2)", SpecificError("Type error: expected function, got number at test.l:1:2")),
            ("(\"f\")", SpecificError("expected function, got string")),
            ("((list 1))", SpecificError("expected function, got list")),
            ("(nil)", SpecificError("expected function, got nil")),
            // arguments are evaluated before the call and left to right
            ("(list (let a 1) (let b (+ a 1)) b)", success([1, 2, 2])),
            ("(+ 1 (undefinedFn))", SpecificError("undefinedFn")),
            // === IF ===
            ("(if (== 1 2) 1 2)", success(2)),
            ("(if (== 1 1) 1 2)", success(1)),
            ("(if true 1)", success(1)),
            ("(if false 1)", EvalResult(nil())),
            ("(if true)", EvalResult(nil())),
            ("(if 1 2 3)", SpecificError("Type error: expected bool, got number at test.l:1:5")),
            ("(if nil 1 2)", SpecificError("expected bool, got nil")),
            ("(if \"true\" 1 2)", SpecificError("expected bool, got string")),
            // the branch not taken is never evaluated
            ("(if true 1 (undefinedFn))", success(1)),
            ("(if false (undefinedFn) 2)", success(2)),
            // and/or evaluate every argument
            ("(and false (undefinedFn))", SpecificError("undefinedFn")),
            ("(or true (undefinedFn))", SpecificError("undefinedFn")),
            // === FN ===
            ("((fn (x) (+ x x)) 5)", success(10)),
            ("((fn (a b) (- a b)) 10 4)", success(6)),
            ("((fn () 1 2 3))", success(3)),
            ("((fn ()))", EvalResult(nil())),
            ("(fn (x) x)", Succeeds),
            ("((fn (a b) a) 1)", SpecificError("expected 2 arguments in call; got 1")),
            ("((fn (a) a) 1 2)", SpecificError("expected 1 arguments in call; got 2")),
            ("((fn (a) a) 1 2)", SpecificError("at test.l:1:1")),
            ("((fn (f) (f 7)) (fn (n) (* n n)))", success(49)),
            // === LET ===
            ("(let y (+ 1 2))", success(3)),
            ("(let y (+ 1 2)) y", success(3)),
            ("(let f (fn (x) (* x 2))) (f 21)", success(42)),
            ("(let y (undefinedFn)) y", Error),
            // === SHADOWING ===
            ("((fn (x) (let x 2) x) 1)", success(2)),
            ("((fn (car) car) 5)", success(5)),
            ("(let list 3) list", success(3)),
            // === FUNCTION LITERALS ===
            ("(listReduce 0 (list 1 2 3) +)", success(6)),
            ("((fn (op) (op 6 3)) /)", success(2)),
        ];

        run_comprehensive_tests(test_cases);
    }

    #[test]
    fn test_shared_environment_sequences() {
        let test_environments = vec![
            // bindings persist across top-level expressions
            TestEnvironment(vec![
                ("(let y (+ 1 2))", success(3)),
                ("y", success(3)),
                ("(+ y 1)", success(4)),
            ]),
            // inner bindings never leak out of a call frame
            TestEnvironment(vec![
                ("(let x 10)", success(10)),
                ("((fn (x) (let x 2) x) 1)", success(2)),
                ("x", success(10)),
                ("(let n 1)", success(1)),
                test_setup!("(let setN (fn () (let n 5) n))"),
                ("(setN)", success(5)),
                ("n", success(1)),
            ]),
            // closures outlive the call that created their frame
            TestEnvironment(vec![
                test_setup!("(let makeAdder (fn (n) (fn (x) (+ x n))))"),
                test_setup!("(let add5 (makeAdder 5))"),
                test_setup!("(let add10 (makeAdder 10))"),
                ("(add5 1)", success(6)),
                ("(add10 1)", success(11)),
                ("(listMap (list 1 2 3) add5)", success([6, 7, 8])),
            ]),
            // names are resolved when a call runs, so recursion works
            TestEnvironment(vec![
                test_setup!("(let fact (fn (n) (if (<= n 1) 1 (* n (fact (- n 1))))))"),
                ("(fact 5)", success(120)),
                ("(fact 10)", success(3_628_800)),
                test_setup!("(let isEven (fn (n) (if (== n 0) true (isOdd (- n 1)))))"),
                test_setup!("(let isOdd (fn (n) (if (== n 0) false (isEven (- n 1)))))"),
                ("(isEven 10)", success(true)),
                ("(isOdd 7)", success(true)),
            ]),
            // built-ins are ordinary values
            TestEnvironment(vec![
                test_setup!("(let plus +)"),
                ("(plus 2 3)", success(5)),
                test_setup!("(let first car)"),
                ("(first (cons \"a\" \"b\"))", success("a")),
            ]),
        ];

        run_tests_in_environment(test_environments);
    }

    #[test]
    fn test_evaluation_depth_limit() {
        let depth_test_environments = vec![
            TestEnvironment(vec![
                test_setup!("(let down (fn (n) (if (== n 0) 0 (+ 1 (down (- n 1))))))"),
                ("(down 50)", success(50)),
                ("(down 500)", success(500)),
                ("(down 4000)", success(4000)),
                ("(down 6000)", SpecificError("maximum evaluation depth exceeded")),
                // the counter unwinds after a failure
                ("(down 50)", success(50)),
                test_setup!("(let forever (fn (n) (forever (+ n 1))))"),
                ("(forever 0)", SpecificError("depth")),
            ]),
            // walking a long cons chain recurses once per element
            TestEnvironment(vec![
                test_setup!("(let chain (fn (n) (if (== n 0) nil (cons n (chain (- n 1))))))"),
                test_setup!("(let walk (fn (p n) (if (== n 0) 0 (+ (car p) (walk (cdr p) (- n 1))))))"),
                ("(walk (chain 700) 700)", success(245_350)),
            ]),
        ];

        run_tests_in_environment(depth_test_environments);
    }

    #[test]
    fn test_code_string_round_trip() {
        let sources = [
            "(+ 1 2)",
            "(if (== 1 2) 1 2)",
            "(if (< 1 2) \"yes\")",
            "((fn (x) (+ x x)) 5)",
            "((fn (a b) (let c (* a b)) (- c 1)) 3 4)",
            "(car (cons 1 2))",
            "(list 1 \"two\" true nil (list -3.5))",
            "(map \"a\" 1 \"b\" (list 2))",
            "(listFilter (list 1 2 3 4) (fn (x) (> x 2)))",
            "(listReduce 0 (list 1 2 3) +)",
            "(mapKeys (map \"z\" 1 \"a\" 2))",
            "(cons 1 (cons 2 nil))",
            "(and true (not false))",
            "(concat \"a\" \"b\")",
        ];

        for source in sources {
            let exprs = parse("rt.l", source).unwrap();
            let first = eval_program(&exprs, &create_global_env()).unwrap();

            let code = exprs.iter().map(Expr::code_str).collect::<Vec<_>>().join(" ");
            let reparsed = parse("rt.l", &code).unwrap();
            let second = eval_program(&reparsed, &create_global_env()).unwrap();

            assert_eq!(first, second, "round trip changed the value of '{source}' (via '{code}')");
        }
    }

    #[test]
    fn test_environment_frames() {
        let root = Environment::builtins();
        root.define("x", val(1));
        assert_eq!(root.resolve("x"), None);
        assert!(matches!(root.resolve("listMap"), Some(Value::Function(_))));
        assert!(root.bindings().is_empty());

        let global = root.child();
        global.define("x", val(1));
        let inner = global.child();
        inner.define("x", val(2));
        inner.define("y", val(3));

        assert_eq!(inner.resolve("x"), Some(val(2)));
        assert_eq!(global.resolve("x"), Some(val(1)));
        assert_eq!(global.resolve("y"), None);
        assert_eq!(
            inner.bindings(),
            vec![("x".to_owned(), val(2)), ("y".to_owned(), val(3))]
        );

        // a local binding hides the built-in of the same name
        global.define("car", val("shadowed"));
        assert_eq!(inner.resolve("car"), Some(val("shadowed")));
        assert!(matches!(root.resolve("car"), Some(Value::Function(_))));
    }

    #[test]
    fn test_error_positions_from_builtins() {
        let env = create_global_env();
        let exprs = parse("pos.l", "(list 1)\n  (listGet (list 1) 5)").unwrap();
        let err = eval_program(&exprs, &env).unwrap_err();
        match err {
            crate::Error::EvalError { pos: Some(pos), .. } => {
                assert_eq!((pos.row, pos.col), (2, 3));
            }
            other => panic!("expected positioned eval error, got {other:?}"),
        }

        // argument errors name the built-in instead of a position
        let exprs = parse("pos.l", "(strEq \"a\" 1)").unwrap();
        let err = eval_program(&exprs, &env).unwrap_err();
        assert_eq!(err, crate::Error::argument("strEq", 1, "string", "number"));
    }

    #[test]
    fn test_program_stops_at_first_error() {
        let env = create_global_env();
        let exprs = parse("stop.l", "(let a 1) (car 5) (let b 2)").unwrap();
        assert!(eval_program(&exprs, &env).is_err());
        assert_eq!(env.resolve("a"), Some(val(1)));
        assert_eq!(env.resolve("b"), None);
    }
}
