//! REPL (Read-Eval-Print Loop) for Cinder
//!
//! [`Session`] holds the VM and evaluates submissions; [`Repl`] wraps it in a
//! rustyline editor. Globals persist between submissions.

use crate::compile_repl_source;
use crate::config::Config;
use crate::value::Value;
use crate::vm::{install_standard_library, OutputSink, Suspension, VirtualMachine};
use rustyline::error::ReadlineError;
use rustyline::{DefaultEditor, Result as RlResult};
use std::path::PathBuf;

/// What one submission produced
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Rendered value of a trailing expression
    Value(String),
    Nothing,
    /// A script called `input`; answer with [`Session::provide_input`]
    NeedsInput,
    Error(String),
}

/// REPL meta-command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Quit,
    Clear,
    Names,
    Unknown(String),
}

impl Command {
    pub fn parse(line: &str) -> Self {
        match line {
            ":quit" | ":q" | ":exit" => Command::Quit,
            ":help" | ":h" | ":?" => Command::Help,
            ":clear" => Command::Clear,
            ":names" => Command::Names,
            other => Command::Unknown(other.to_string()),
        }
    }
}

/// Evaluation state shared by every submission
pub struct Session {
    vm: VirtualMachine,
}

impl Session {
    pub fn new(config: &Config, sink: OutputSink) -> Self {
        let mut vm = VirtualMachine::with_config(config.vm.clone());
        install_standard_library(&mut vm, sink);
        // Start from an empty program so the first submission keeps globals
        vm.load(Vec::new());
        Session { vm }
    }

    pub fn vm(&self) -> &VirtualMachine {
        &self.vm
    }

    /// Names bound by earlier submissions
    pub fn global_names(&self) -> Vec<String> {
        self.vm.global_names()
    }

    pub fn eval(&mut self, input: &str) -> Reply {
        let source = terminate(input);
        let known = self.vm.global_names();
        let foreign = self.vm.foreign_names();
        let output = match compile_repl_source(&source, &foreign, &known) {
            Ok(output) => output,
            Err(err) => return Reply::Error(err.to_string()),
        };
        if !output.is_runnable() {
            let lines: Vec<String> = output.diagnostics.iter().map(|d| d.to_string()).collect();
            return Reply::Error(lines.join("\n"));
        }
        self.vm.load_repl(output.instructions);
        self.drive()
    }

    /// Answer a pending `input` call with one line of text
    pub fn provide_input(&mut self, line: &str) -> Reply {
        if let Err(err) = self.vm.resume_with_input(Value::str(line)) {
            return Reply::Error(err.to_string());
        }
        self.drive()
    }

    /// Run to completion; `debugger` statements do not pause the REPL
    fn drive(&mut self) -> Reply {
        loop {
            match self.vm.continue_execution() {
                Ok(Suspension::Halted(value)) => return render(value),
                Ok(Suspension::AwaitingInput) => return Reply::NeedsInput,
                Ok(Suspension::Progress | Suspension::SuspendedForDebug) => continue,
                Err(err) => return Reply::Error(format!("vm error: {err}")),
            }
        }
    }
}

fn render(value: Value) -> Reply {
    match value {
        Value::Nil => Reply::Nothing,
        Value::Error(err) => Reply::Error(format!("runtime error: {}", err.message)),
        other => Reply::Value(other.repr()),
    }
}

/// Let a bare expression be typed without its `;`
fn terminate(input: &str) -> String {
    let trimmed = input.trim_end();
    if trimmed.ends_with(';') || trimmed.ends_with('}') {
        trimmed.to_string()
    } else {
        format!("{trimmed};")
    }
}

/// REPL state
pub struct Repl {
    editor: DefaultEditor,
    session: Session,
    prompt: String,
    history_path: Option<PathBuf>,
}

impl Repl {
    /// Create a new REPL
    pub fn new(config: &Config) -> RlResult<Self> {
        let editor = DefaultEditor::new()?;
        let history = PathBuf::from(&config.repl.history_file);
        // Relative history files live in the home directory
        let history_path = if history.is_absolute() {
            Some(history)
        } else {
            dirs_home().map(|h| h.join(history))
        };

        let mut repl = Repl {
            editor,
            session: Session::new(config, OutputSink::Stdout),
            prompt: config.repl.prompt.clone(),
            history_path,
        };

        if let Some(ref path) = repl.history_path {
            let _ = repl.editor.load_history(path);
        }

        Ok(repl)
    }

    /// Run the REPL
    pub fn run(&mut self) -> RlResult<()> {
        println!("Cinder REPL v{}", env!("CARGO_PKG_VERSION"));
        println!("Type :help for help, :quit to exit.\n");

        loop {
            match self.editor.readline(&self.prompt) {
                Ok(line) => {
                    let line = line.trim();

                    if line.is_empty() {
                        continue;
                    }

                    let _ = self.editor.add_history_entry(line);

                    if line.starts_with(':') {
                        if self.handle_command(Command::parse(line)) {
                            break;
                        }
                        continue;
                    }

                    let reply = self.session.eval(line);
                    if !self.show(reply)? {
                        break;
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    println!("^C");
                    continue;
                }
                Err(ReadlineError::Eof) => {
                    println!("Goodbye!");
                    break;
                }
                Err(err) => {
                    eprintln!("Error: {err}");
                    break;
                }
            }
        }

        if let Some(ref path) = self.history_path {
            let _ = self.editor.save_history(path);
        }

        Ok(())
    }

    /// Print a reply, reading input lines while the script asks for them.
    /// Returns false when the user closed the input stream.
    fn show(&mut self, mut reply: Reply) -> RlResult<bool> {
        loop {
            match reply {
                Reply::Value(text) => println!("{text}"),
                Reply::Nothing => {}
                Reply::Error(message) => eprintln!("{message}"),
                Reply::NeedsInput => {
                    let line = match self.editor.readline("") {
                        Ok(line) => line,
                        Err(ReadlineError::Eof) => return Ok(false),
                        Err(ReadlineError::Interrupted) => String::new(),
                        Err(err) => return Err(err),
                    };
                    reply = self.session.provide_input(&line);
                    continue;
                }
            }
            return Ok(true);
        }
    }

    /// Handle a meta-command; true means quit
    fn handle_command(&mut self, command: Command) -> bool {
        match command {
            Command::Quit => {
                println!("Goodbye!");
                true
            }
            Command::Help => {
                print_help();
                false
            }
            Command::Clear => {
                print!("\x1B[2J\x1B[1;1H");
                false
            }
            Command::Names => {
                let names = self.session.global_names();
                if names.is_empty() {
                    println!("(no globals)");
                } else {
                    println!("{}", names.join(" "));
                }
                false
            }
            Command::Unknown(cmd) => {
                println!("Unknown command: {cmd}");
                println!("Type :help for help.");
                false
            }
        }
    }
}

fn print_help() {
    println!("Cinder REPL Commands:");
    println!("  :help, :h, :?   Show this help");
    println!("  :quit, :q       Exit the REPL");
    println!("  :clear          Clear the screen");
    println!("  :names          List global names");
    println!();
    println!("You can enter:");
    println!("  - Bindings: init x = 1;  change x = x + 1;");
    println!("  - Functions: func add(a, b) {{ return a + b; }}");
    println!("  - Expressions: add(1, 2)");
    println!();
    println!("Built-in functions:");
    println!("  print(..)       Print values separated by spaces");
    println!("  input(prompt)   Read a line");
    println!("  len(x) str(x) clone(x) range(..) error(msg)");
    println!("  i8 u8 i16 u16 i32 u32 f32 f64 int float");
}

/// Get home directory
fn dirs_home() -> Option<PathBuf> {
    #[cfg(windows)]
    {
        std::env::var("USERPROFILE").ok().map(PathBuf::from)
    }
    #[cfg(not(windows))]
    {
        std::env::var("HOME").ok().map(PathBuf::from)
    }
}
