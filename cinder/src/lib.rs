//! Cinder scripting language runtime
//!
//! Source text is tokenized, parsed into a concrete syntax tree, lowered to
//! flat bytecode and executed by a resumable stack VM.

pub mod bytecode;
pub mod compiler;
pub mod config;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod repl;
pub mod syntax;
pub mod util;
pub mod value;
pub mod vm;

pub use compiler::{compile, compile_repl, CompileOutput};
pub use config::Config;
pub use error::{CompileError, Result};
pub use syntax::Span;
pub use value::Value;
pub use vm::{Suspension, VirtualMachine, VmError, VmState};

use syntax::SyntaxTree;

/// Tokenize and parse, failing on the first lexer or syntax error
pub fn parse_source(source: &str) -> Result<SyntaxTree> {
    let tokens = lexer::tokenize(source)?;
    parser::parse(source, tokens).into_result()
}

/// Parse and compile a whole program
pub fn compile_source(source: &str, foreign_names: &[String]) -> Result<CompileOutput> {
    let tree = parse_source(source)?;
    compile(source, tree.cursor(), foreign_names)
}

/// Parse and compile one REPL submission against the globals seen so far
pub fn compile_repl_source(
    source: &str,
    foreign_names: &[String],
    known_names: &[String],
) -> Result<CompileOutput> {
    let tree = parse_source(source)?;
    compile_repl(source, tree.cursor(), foreign_names, known_names)
}
