// minilisp command-line runner
// Parses a source file, evaluates every top-level expression in one script frame

use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use minilisp::evaluator::{create_global_env, eval};
use minilisp::parser::parse;

#[derive(Parser, Debug)]
#[command(name = "minilisp")]
#[command(about = "Run a minilisp source file")]
#[command(version)]
struct Args {
    /// Source file to run
    #[arg(value_name = "FILE")]
    file: PathBuf,

    /// Print the value of every top-level expression that is not nil
    #[arg(long)]
    show_vals: bool,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, value_name = "FILTER", default_value = "warn")]
    log_level: String,
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

fn run(args: &Args) -> anyhow::Result<()> {
    let display_name = args.file.display().to_string();
    let source = fs::read_to_string(&args.file)
        .with_context(|| format!("failed to read '{display_name}'"))?;

    let exprs = parse(&display_name, &source)
        .with_context(|| format!("Parse error in '{display_name}'"))?;

    let env = create_global_env();
    let mut out = io::stdout().lock();
    for expr in &exprs {
        let value =
            eval(expr, &env).with_context(|| format!("Execution error in '{display_name}'"))?;
        if args.show_vals && !value.is_nil() {
            writeln!(out, "{value}").context("failed to write to stdout")?;
        }
    }
    debug!(file = %display_name, count = exprs.len(), "finished");
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level);
    run(&args)
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;

    #[test]
    fn test_argument_parsing() {
        let args = Args::try_parse_from(["minilisp", "prog.l"]).unwrap();
        assert_eq!(args.file, PathBuf::from("prog.l"));
        assert!(!args.show_vals);
        assert_eq!(args.log_level, "warn");

        let args =
            Args::try_parse_from(["minilisp", "--show-vals", "--log-level", "debug", "prog.l"])
                .unwrap();
        assert!(args.show_vals);
        assert_eq!(args.log_level, "debug");

        // the file is required
        assert!(Args::try_parse_from(["minilisp"]).is_err());
        assert!(Args::try_parse_from(["minilisp", "a.l", "b.l"]).is_err());
        assert!(Args::try_parse_from(["minilisp", "--unknown", "a.l"]).is_err());
    }

    fn temp_source(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("minilisp-{}-{name}", std::process::id()));
        fs::write(&path, contents).unwrap();
        path
    }

    fn args_for(file: PathBuf) -> Args {
        Args {
            file,
            show_vals: true,
            log_level: "warn".to_owned(),
        }
    }

    #[test]
    fn test_run_reports_context() {
        let ok = temp_source("ok.l", "(let x 2)\n(* x 21)\n");
        assert!(run(&args_for(ok.clone())).is_ok());

        let bad_parse = temp_source("parse.l", "(+ 1");
        let err = run(&args_for(bad_parse.clone())).unwrap_err();
        assert!(err.to_string().starts_with("Parse error in '"), "{err}");
        assert!(format!("{err:#}").contains("unexpected end of input"), "{err:#}");

        let bad_eval = temp_source("eval.l", "(car 1)");
        let err = run(&args_for(bad_eval.clone())).unwrap_err();
        assert!(err.to_string().starts_with("Execution error in '"), "{err}");
        assert!(format!("{err:#}").contains("ArgumentError: 'car'"), "{err:#}");

        let missing = std::env::temp_dir().join("minilisp-does-not-exist.l");
        let err = run(&args_for(missing)).unwrap_err();
        assert!(err.to_string().starts_with("failed to read '"), "{err}");

        for path in [ok, bad_parse, bad_eval] {
            fs::remove_file(path).unwrap();
        }
    }
}
