//! Stack virtual machine
//!
//! Executes compiled [`Instruction`](crate::bytecode::Instruction) vectors with
//! call frames, lexical scope chains, closures and an iterator stack. Program
//! failures travel as `Value::Error` and unwind frame by frame; only broken
//! bytecode or API misuse surfaces as [`VmError`].

mod builtins;
mod error;
mod foreign;
mod frame;
mod machine;
mod observer;
mod scope;

pub use builtins::{install_standard_library, OutputSink};
pub use error::VmError;
pub use foreign::{CallContext, ForeignFn, ForeignRegistry};
pub use frame::{Frame, FrameInfo};
pub use machine::{Suspension, VirtualMachine, VmState};
pub use observer::{VariableInfo, VmObserver, VmSnapshot};
pub use scope::{child_scope, visible_bindings, Scope, ScopeRef};
