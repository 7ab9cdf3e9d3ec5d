use minilisp::ast::Value;
use minilisp::builtinops::{Syntax, builtin_ops};
use minilisp::evaluator::{self, Environment};
use minilisp::parser::parse;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::panic;
use std::process;

fn main() {
    let result = panic::catch_unwind(|| {
        run_repl();
    });

    if let Err(panic_info) = result {
        eprintln!("The REPL encountered an unexpected error and must exit.");

        if let Some(msg) = panic_info.downcast_ref::<&str>() {
            eprintln!("Error: {msg}");
        } else if let Some(msg) = panic_info.downcast_ref::<String>() {
            eprintln!("Error: {msg}");
        } else {
            eprintln!("Error: Unknown panic occurred");
        }

        process::exit(1);
    }
}

fn run_repl() {
    println!("minilisp interactive evaluator");
    println!("Enter expressions like: (+ 1 2)");
    println!("Type :help for more commands, or Ctrl+C to exit.");
    println!();

    let mut rl = match DefaultEditor::new() {
        Ok(rl) => rl,
        Err(err) => {
            eprintln!("Could not initialize REPL: {err}");
            return;
        }
    };
    let env = evaluator::create_global_env();
    let mut line_no = 0;

    loop {
        match rl.readline("minilisp> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                line_no += 1;

                // Add the line to history
                let _ = rl.add_history_entry(line);

                // Handle special commands
                match line {
                    ":help" => {
                        print_help();
                        continue;
                    }
                    ":env" => {
                        print_environment(&env);
                        continue;
                    }
                    ":quit" | ":exit" => {
                        println!("Goodbye!");
                        break;
                    }
                    _ => {}
                }

                // Every line is its own source so positions point into it
                let source_name = format!("<repl:{line_no}>");
                let result = parse(&source_name, line)
                    .and_then(|exprs| evaluator::eval_program(&exprs, &env));

                match result {
                    Ok(values) => {
                        for value in values {
                            println!("{value}");
                        }
                    }
                    Err(e) => println!("Error: {e}"),
                }
            }

            Err(ReadlineError::Eof) | Err(ReadlineError::Interrupted) => {
                println!("Goodbye!");
                break;
            }
            Err(err) => {
                println!("Error: {err:?}");
                break;
            }
        }
    }
}

fn print_help() {
    println!("minilisp commands:");
    println!("  :help      - Show this help message");
    println!("  :env       - Show bindings made with let");
    println!("  :quit      - Exit the interpreter");
    println!("  :exit      - Exit the interpreter");
    println!("  Ctrl+C     - Exit the interpreter");
    println!();
    println!("Special forms:");
    println!("  (if cond then else)   (fn (a b) body...)   (let name value)");
    println!();

    let (operators, named): (Vec<_>, Vec<_>) = builtin_ops()
        .iter()
        .partition(|op| op.syntax == Syntax::Operator);
    let names = |ops: Vec<&minilisp::builtinops::BuiltinOp>| {
        ops.iter().map(|op| op.name).collect::<Vec<_>>().join(" ")
    };
    println!("Operators: {}", names(operators));
    println!("Built-ins: {}", names(named));
    println!();
    println!("Examples:");
    println!("  (let square (fn (x) (* x x)))");
    println!("  (listMap (list 1 2 3) square)");
    println!("  (mapGet (map \"a\" 1) \"a\")");
    println!();
}

fn print_environment(env: &Environment) {
    let bindings = env.bindings();

    if bindings.is_empty() {
        println!("No bindings yet.");
        return;
    }

    let (functions, values): (Vec<_>, Vec<_>) = bindings
        .into_iter()
        .partition(|(_, value)| matches!(value, Value::Function(_)));

    if !functions.is_empty() {
        println!("Functions ({}):", functions.len());
        // Print in columns for readability
        let mut col = 0;
        for (name, _) in functions {
            print!("  {name:<15}");
            col += 1;
            if col % 4 == 0 {
                println!();
            }
        }
        if col % 4 != 0 {
            println!();
        }
        println!();
    }

    if !values.is_empty() {
        println!("Values ({}):", values.len());
        for (name, value) in values {
            println!("  {name} = {value}");
        }
    }
}
