//! Bytecode instruction set
//!
//! A program is a flat `Vec<Instruction>`. Jump targets and closure entries are
//! absolute indices into that vector.

use crate::syntax::Span;
use crate::value::{BinOp, Number, UnOp, Value};
use serde::Serialize;
use std::fmt;

/// Constant operand of `Push`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Immediate {
    Nil,
    Bool(bool),
    Number(Number),
    Str(String),
}

impl Immediate {
    pub fn to_value(&self) -> Value {
        match self {
            Immediate::Nil => Value::Nil,
            Immediate::Bool(b) => Value::Bool(*b),
            Immediate::Number(n) => Value::Number(*n),
            Immediate::Str(s) => Value::str(s),
        }
    }
}

impl fmt::Display for Immediate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Immediate::Nil => write!(f, "nil"),
            Immediate::Bool(b) => write!(f, "{b}"),
            Immediate::Number(n) => write!(f, "{n}:{}", n.kind().name()),
            Immediate::Str(s) => write!(f, "{s:?}"),
        }
    }
}

/// Opcode plus its operands
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "opcode", rename_all = "snake_case")]
pub enum Op {
    Push { value: Immediate },
    Pop,
    Load { name: String },
    /// Bind a duplicate in the current scope; `catch` lets an Error be bound
    Init { name: String, catch: bool },
    Store { name: String },
    /// Bind a List or Map without duplicating it
    Ref { name: String },
    Binary { op: BinOp },
    Unary { op: UnOp },
    MemberLoad { name: String },
    MemberStore { name: String },
    IndexLoad,
    IndexStore,
    Jump { target: usize },
    JumpIfFalse { target: usize },
    JumpIfTrue { target: usize },
    Call { argc: usize },
    CallForeign { name: String, argc: usize },
    Ret,
    MakeClosure { entry: usize, arity: usize, name: Option<String> },
    MakeList { len: usize },
    MakeTuple { len: usize },
    MakeMap { len: usize },
    GetIter,
    IterNext,
    EnterScope,
    ExitScope,
    Typeof,
    Debugger,
}

impl Op {
    pub fn name(&self) -> &'static str {
        match self {
            Op::Push { .. } => "push",
            Op::Pop => "pop",
            Op::Load { .. } => "load",
            Op::Init { .. } => "init",
            Op::Store { .. } => "store",
            Op::Ref { .. } => "ref",
            Op::Binary { .. } => "binary",
            Op::Unary { .. } => "unary",
            Op::MemberLoad { .. } => "member_load",
            Op::MemberStore { .. } => "member_store",
            Op::IndexLoad => "index_load",
            Op::IndexStore => "index_store",
            Op::Jump { .. } => "jump",
            Op::JumpIfFalse { .. } => "jump_if_false",
            Op::JumpIfTrue { .. } => "jump_if_true",
            Op::Call { .. } => "call",
            Op::CallForeign { .. } => "call_foreign",
            Op::Ret => "ret",
            Op::MakeClosure { .. } => "make_closure",
            Op::MakeList { .. } => "make_list",
            Op::MakeTuple { .. } => "make_tuple",
            Op::MakeMap { .. } => "make_map",
            Op::GetIter => "get_iter",
            Op::IterNext => "iter_next",
            Op::EnterScope => "enter_scope",
            Op::ExitScope => "exit_scope",
            Op::Typeof => "typeof",
            Op::Debugger => "debugger",
        }
    }

    /// Jump target, for the forward-patching pass
    pub fn target_mut(&mut self) -> Option<&mut usize> {
        match self {
            Op::Jump { target } | Op::JumpIfFalse { target } | Op::JumpIfTrue { target } => {
                Some(target)
            }
            _ => None,
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())?;
        match self {
            Op::Push { value } => write!(f, " {value}"),
            Op::Load { name }
            | Op::Store { name }
            | Op::Ref { name }
            | Op::MemberLoad { name }
            | Op::MemberStore { name } => write!(f, " {name}"),
            Op::Init { name, catch } => {
                write!(f, " {name}")?;
                if *catch {
                    write!(f, " catch")?;
                }
                Ok(())
            }
            Op::Binary { op } => write!(f, " {op}"),
            Op::Unary { op } => write!(f, " {op}"),
            Op::Jump { target } | Op::JumpIfFalse { target } | Op::JumpIfTrue { target } => {
                write!(f, " @{target}")
            }
            Op::Call { argc } => write!(f, " {argc}"),
            Op::CallForeign { name, argc } => write!(f, " {name} {argc}"),
            Op::MakeClosure { entry, arity, name } => {
                write!(f, " @{entry} {arity}")?;
                if let Some(name) = name {
                    write!(f, " {name}")?;
                }
                Ok(())
            }
            Op::MakeList { len } | Op::MakeTuple { len } | Op::MakeMap { len } => {
                write!(f, " {len}")
            }
            _ => Ok(()),
        }
    }
}

/// One instruction and the source span it executes on behalf of
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Instruction {
    #[serde(flatten)]
    pub op: Op,
    pub span: Span,
}

impl Instruction {
    pub fn new(op: Op, span: Span) -> Self {
        Self { op, span }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:<28} ; {}", self.op.to_string(), self.span)
    }
}

/// Numbered listing, one instruction per line
pub fn disassemble(code: &[Instruction]) -> String {
    let width = code.len().saturating_sub(1).to_string().len();
    let mut out = String::new();
    for (i, instruction) in code.iter().enumerate() {
        out.push_str(&format!("{i:>width$}  {instruction}\n"));
    }
    out
}
