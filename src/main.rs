//! schemelet command-line driver: loads program files, then runs an interactive REPL

use std::any::Any;
use std::io::{IsTerminal, Read};
use std::path::PathBuf;
use std::process::ExitCode;
use std::thread;

use anyhow::{Context, Result, bail};
use clap::Parser;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use schemelet::evaluator::{Environment, EvalConfig, create_global_env, eval_with_config};
use schemelet::loader::{load_file_with_config, run_forms};
use schemelet::scheme::{ParseConfig, needs_more_input, parse_program_with_config};
use schemelet::{Error, Procedure, Value};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// A small Scheme-like interpreter
#[derive(Parser, Debug)]
#[command(name = "schemelet", version, about)]
struct Args {
    /// Program files evaluated in order before the REPL starts
    files: Vec<PathBuf>,

    /// Exit after loading the files instead of starting the REPL
    #[arg(long)]
    no_repl: bool,

    /// Maximum nesting of evaluation before a DepthExceeded error
    #[arg(long, default_value_t = DEFAULT_MAX_DEPTH)]
    max_depth: usize,

    /// Stack size of the interpreter thread, in MiB
    #[arg(long, default_value_t = 256)]
    stack_mb: usize,

    /// Enable debug logging on stderr
    #[arg(short, long)]
    verbose: bool,
}

/// Deeper than the library default; the worker thread's stack is sized for it
const DEFAULT_MAX_DEPTH: usize = 10_000;

const PROMPT: &str = "schemelet> ";
const CONTINUATION_PROMPT: &str = "        ... ";

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let default_directive = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directive))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Run the interpreter on a worker thread so deep recursion has a predictable stack
fn run(args: Args) -> Result<()> {
    let stack_size = args
        .stack_mb
        .checked_mul(1024 * 1024)
        .with_context(|| format!("invalid --stack-mb: {}", args.stack_mb))?;
    debug!(stack_mb = args.stack_mb, "starting interpreter thread");

    let handle = thread::Builder::new()
        .name("schemelet-worker".to_owned())
        .stack_size(stack_size)
        .spawn(move || session(&args))
        .context("failed to start interpreter thread")?;

    match handle.join() {
        Ok(result) => result,
        Err(panic_info) => bail!(
            "the interpreter encountered an unexpected error: {}",
            panic_message(&*panic_info)
        ),
    }
}

fn panic_message(panic_info: &(dyn Any + Send)) -> &str {
    if let Some(msg) = panic_info.downcast_ref::<&str>() {
        *msg
    } else if let Some(msg) = panic_info.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "unknown panic"
    }
}

fn session(args: &Args) -> Result<()> {
    let config = EvalConfig {
        max_depth: args.max_depth,
    };
    let env = create_global_env();

    for path in &args.files {
        info!(path = %path.display(), "loading");
        match load_file_with_config(path, &env, &config) {
            Ok(_) => {}
            Err(Error::Quit) => return Ok(()),
            Err(e) => eprintln!("Error: {}: {e}", path.display()),
        }
    }

    if args.no_repl {
        return Ok(());
    }

    let stdin = std::io::stdin();
    if stdin.is_terminal() {
        run_repl(&env, &config)
    } else if args.files.is_empty() {
        let mut source = String::new();
        stdin
            .lock()
            .read_to_string(&mut source)
            .context("failed to read program from stdin")?;
        run_piped(&source, &env, &config);
        Ok(())
    } else {
        Ok(())
    }
}

/// Evaluate a program read from a pipe, printing each result like the REPL does
fn run_piped(source: &str, env: &Environment, config: &EvalConfig) {
    match run_forms(source, env, config, print_result) {
        Ok(_) | Err(Error::Quit) => {}
        Err(e) => eprintln!("Error: {e}"),
    }
}

fn print_result(value: &Value) {
    // define, display and friends produce nothing worth echoing
    if !matches!(value, Value::Unassigned) {
        println!("{value}");
    }
}

fn run_repl(env: &Environment, config: &EvalConfig) -> Result<()> {
    println!("schemelet {}", env!("CARGO_PKG_VERSION"));
    println!("Type :help for commands, or Ctrl+D to exit.");
    println!();

    let mut rl = DefaultEditor::new().context("could not initialize line editor")?;
    let parse_config = ParseConfig::default();
    let mut pending = String::new();

    loop {
        let prompt = if pending.is_empty() {
            PROMPT
        } else {
            CONTINUATION_PROMPT
        };

        let line = match rl.readline(prompt) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) if !pending.is_empty() => {
                // Ctrl-C abandons a half-typed expression
                pending.clear();
                continue;
            }
            Err(ReadlineError::Eof | ReadlineError::Interrupted) => break,
            Err(err) => return Err(err).context("failed to read input"),
        };

        if pending.is_empty() {
            match line.trim() {
                "" => continue,
                ":help" => {
                    print_help();
                    continue;
                }
                ":env" => {
                    print_environment(env);
                    continue;
                }
                ":quit" | ":exit" => break,
                _ => {}
            }
        }

        pending.push_str(&line);
        pending.push('\n');
        if needs_more_input(&pending, parse_config) {
            continue;
        }

        let _ = rl.add_history_entry(pending.trim_end());
        let input = std::mem::take(&mut pending);

        // Several forms may share one line; stop at the first failure
        for form in parse_program_with_config(&input, parse_config) {
            match form.and_then(|expr| eval_with_config(&expr, env, config)) {
                Ok(value) => print_result(&value),
                Err(Error::Quit) => {
                    println!("Goodbye!");
                    return Ok(());
                }
                Err(e) => {
                    eprintln!("Error: {e}");
                    break;
                }
            }
        }
    }

    println!("Goodbye!");
    Ok(())
}

fn print_help() {
    println!("Commands:");
    println!("  :help      - Show this help message");
    println!("  :env       - Show current environment bindings");
    println!("  :quit      - Exit the interpreter");
    println!("  :exit      - Exit the interpreter");
    println!("  Ctrl+D     - Exit the interpreter");
    println!();
    println!("An expression may span several lines; input is evaluated once its");
    println!("parentheses balance.");
    println!();
    println!("Special forms:");
    println!("  quote if define lambda set! begin let cond and or");
    println!();
    println!("Examples:");
    println!("  (define (fact n) (if (= n 0) 1 (* n (fact (- n 1)))))");
    println!("  (fact 20)");
    println!("  (cons 1 (list 2.5 \"three\"))");
    println!("  (load \"prelude.scm\")");
    println!();
}

fn print_environment(env: &Environment) {
    let bindings = env.get_all_bindings();

    if bindings.is_empty() {
        println!("Environment is empty.");
        return;
    }

    println!("Environment bindings ({} total):", bindings.len());
    println!();

    // Separate primitives from user-defined values
    let mut primitives = Vec::new();
    let mut user_defined = Vec::new();

    for (name, value) in bindings {
        match value {
            Value::Procedure(Procedure::Primitive(_)) => primitives.push(name),
            _ => user_defined.push((name, value)),
        }
    }

    if !primitives.is_empty() {
        println!("Primitive procedures ({}):", primitives.len());
        // Print in columns for readability
        let mut col = 0;
        for name in primitives {
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

    if !user_defined.is_empty() {
        println!("User-defined values ({}):", user_defined.len());
        for (name, value) in user_defined {
            println!("  {name} = {value}");
        }
    }
}
