//! Cinder CLI

use cinder::bytecode::disassemble;
use cinder::config::Config;
use cinder::error::{report_diagnostic, report_error, report_runtime_error, LineIndex};
use cinder::syntax::Span;
use cinder::vm::{install_standard_library, OutputSink, VmObserver, VmSnapshot};
use cinder::{CompileOutput, Suspension, Value, VirtualMachine};
use clap::{Parser, Subcommand};
use std::cell::RefCell;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tracing_subscriber::EnvFilter;

/// Config file picked up from the working directory when `--config` is absent
const DEFAULT_CONFIG: &str = "cinder.toml";

#[derive(Parser)]
#[command(name = "cinder", version, about = "Cinder - a small scripting language")]
struct Cli {
    /// Configuration file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Raise log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compile and run a source file
    Run {
        /// Source file to run
        file: PathBuf,
    },
    /// Report compile diagnostics without running
    Check {
        /// Source file to check
        file: PathBuf,
    },
    /// Print the compiled bytecode
    Disasm {
        /// Source file to compile
        file: PathBuf,
        /// Emit JSON instead of a listing
        #[arg(long)]
        json: bool,
    },
    /// Tokenize and dump tokens (debug)
    Tokens {
        /// Source file to tokenize
        file: PathBuf,
    },
    /// Parse and dump the syntax tree (debug)
    Tree {
        /// Source file to parse
        file: PathBuf,
    },
    /// Step through a program interactively
    Debug {
        /// Source file to debug
        file: PathBuf,
    },
    /// Start the interactive REPL
    Repl,
}

type CliResult = Result<bool, Box<dyn std::error::Error>>;

fn main() {
    let cli = Cli::parse();
    install_tracing(cli.verbose);

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Command::Run { file } => run_file(&file, &config),
        Command::Check { file } => check_file(&file),
        Command::Disasm { file, json } => disasm_file(&file, json),
        Command::Tokens { file } => tokenize_file(&file),
        Command::Tree { file } => tree_file(&file),
        Command::Debug { file } => debug_file(&file, &config),
        Command::Repl => start_repl(&config),
    };

    match result {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}

fn install_tracing(verbosity: u8) {
    let default = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_env("CINDER_LOG").unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn load_config(path: Option<&Path>) -> Result<Config, cinder::config::ConfigError> {
    match path {
        Some(path) => Config::load(path),
        None if Path::new(DEFAULT_CONFIG).exists() => Config::load(Path::new(DEFAULT_CONFIG)),
        None => Ok(Config::default()),
    }
}

/// Source text plus the name used in reports
struct SourceFile {
    name: String,
    text: String,
}

impl SourceFile {
    fn read(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| cinder::CompileError::io_error(format!("{}: {e}", path.display())))?;
        Ok(SourceFile {
            name: path.display().to_string(),
            text,
        })
    }

    /// Compile, reporting diagnostics; `None` when the program must not run
    fn compile(&self, foreign_names: &[String]) -> Option<CompileOutput> {
        let output = match cinder::compile_source(&self.text, foreign_names) {
            Ok(output) => output,
            Err(err) => {
                report_error(&self.name, &self.text, &err);
                return None;
            }
        };
        for diagnostic in &output.diagnostics {
            report_diagnostic(&self.name, &self.text, diagnostic);
        }
        output.is_runnable().then_some(output)
    }
}

fn new_vm(config: &Config) -> VirtualMachine {
    let mut vm = VirtualMachine::with_config(config.vm.clone());
    install_standard_library(&mut vm, OutputSink::Stdout);
    vm
}

/// Names of the standard library, for compile-only commands
fn stdlib_names() -> Vec<String> {
    new_vm(&Config::default()).foreign_names()
}

fn run_file(path: &Path, config: &Config) -> CliResult {
    let source = SourceFile::read(path)?;
    let mut vm = new_vm(config);
    let Some(output) = source.compile(&vm.foreign_names()) else {
        return Ok(false);
    };
    vm.load(output.instructions);

    let stdin = std::io::stdin();
    loop {
        match vm.continue_execution()? {
            Suspension::Halted(value) => return Ok(finish(&source, &value)),
            Suspension::AwaitingInput => {
                let line = read_line(&mut stdin.lock())?;
                vm.resume_with_input(Value::str(line))?;
            }
            Suspension::Progress | Suspension::SuspendedForDebug => {}
        }
    }
}

/// Report an unrecovered Error; true when the program ended normally
fn finish(source: &SourceFile, value: &Value) -> bool {
    match value.as_error() {
        Some(err) => {
            report_runtime_error(&source.name, &source.text, &err.message, err.location());
            false
        }
        None => true,
    }
}

fn read_line(input: &mut impl BufRead) -> std::io::Result<String> {
    let mut line = String::new();
    input.read_line(&mut line)?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

fn check_file(path: &Path) -> CliResult {
    let source = SourceFile::read(path)?;
    if source.compile(&stdlib_names()).is_none() {
        return Ok(false);
    }
    println!("✓ {} compiles cleanly", source.name);
    Ok(true)
}

fn disasm_file(path: &Path, json: bool) -> CliResult {
    let source = SourceFile::read(path)?;
    let Some(output) = source.compile(&stdlib_names()) else {
        return Ok(false);
    };
    if json {
        println!("{}", serde_json::to_string_pretty(&output.instructions)?);
    } else {
        print!("{}", disassemble(&output.instructions));
    }
    Ok(true)
}

fn tokenize_file(path: &Path) -> CliResult {
    let source = SourceFile::read(path)?;

    let tokens = cinder::lexer::tokenize(&source.text)?;
    for (tok, span) in &tokens {
        println!("{:?} @ {}..{}", tok, span.start, span.end);
    }

    Ok(true)
}

fn tree_file(path: &Path) -> CliResult {
    let source = SourceFile::read(path)?;
    let tokens = cinder::lexer::tokenize(&source.text)?;
    let parsed = cinder::parser::parse(&source.text, tokens);
    print!("{}", parsed.tree.dump(&source.text));
    for err in &parsed.errors {
        report_error(&source.name, &source.text, err);
    }
    Ok(parsed.errors.is_empty())
}

fn debug_file(path: &Path, config: &Config) -> CliResult {
    let source = SourceFile::read(path)?;
    let mut vm = new_vm(config);
    let Some(output) = source.compile(&vm.foreign_names()) else {
        return Ok(false);
    };
    vm.load(output.instructions);
    vm.enable_stepping();
    vm.set_observer(Rc::new(RefCell::new(VariablePrinter)));
    let lines = LineIndex::new(&source.text);

    println!("Enter = step, c = continue, v = variables, q = quit");
    let stdin = std::io::stdin();
    // Pause before the first statement
    let mut suspension = Suspension::SuspendedForDebug;
    loop {
        match suspension {
            Suspension::Halted(value) => {
                println!("=> {}", value.repr());
                return Ok(finish(&source, &value));
            }
            Suspension::AwaitingInput => {
                let line = read_line(&mut stdin.lock())?;
                vm.resume_with_input(Value::str(line))?;
                suspension = vm.step()?;
            }
            Suspension::Progress => suspension = vm.step()?,
            Suspension::SuspendedForDebug => {
                if let Some(span) = vm.current_span() {
                    show_location(&source.text, &lines, span);
                }
                let command = read_line(&mut stdin.lock())?;
                match command.trim() {
                    "" | "s" => suspension = vm.step()?,
                    "c" => suspension = vm.continue_execution()?,
                    "v" => vm.publish_snapshot(),
                    "q" => return Ok(true),
                    other => println!("unknown command {other:?}"),
                }
            }
        }
    }
}

fn show_location(text: &str, lines: &LineIndex, span: Span) {
    let pos = lines.position(span.start);
    let line_text = text.lines().nth(pos.line - 1).unwrap_or("");
    println!("{:>4} | {line_text}", pos.line);
}

/// Prints requested snapshots for the `v` debugger command
struct VariablePrinter;

impl VmObserver for VariablePrinter {
    fn snapshot_requested(&mut self, snapshot: &VmSnapshot) {
        let frames: Vec<String> = snapshot.call_stack.iter().map(|f| f.to_string()).collect();
        println!("  stack: {}", frames.join(" > "));
        for var in &snapshot.variables {
            println!("  {} = {} ({})", var.name, var.value, var.type_name);
        }
    }
}

fn start_repl(config: &Config) -> CliResult {
    let mut repl = cinder::repl::Repl::new(config)?;
    repl.run()?;
    Ok(true)
}
