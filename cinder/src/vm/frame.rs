//! Call frames

use super::scope::ScopeRef;
use serde::Serialize;

/// Activation record of one call
#[derive(Debug, Clone)]
pub struct Frame {
    /// Innermost scope; replaced as blocks are entered and left
    pub scope: ScopeRef,
    /// Instruction index the caller resumes at
    pub return_address: usize,
    /// Operand stack length when the call started
    pub stack_base: usize,
    /// Iterator stack length when the call started
    pub iter_base: usize,
    pub name: String,
    /// Argument values rendered at call time, for display
    pub args: Vec<String>,
}

impl Frame {
    pub fn info(&self) -> FrameInfo {
        FrameInfo {
            name: self.name.clone(),
            args: self.args.clone(),
            return_address: self.return_address,
        }
    }
}

/// Display projection of a [`Frame`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FrameInfo {
    pub name: String,
    pub args: Vec<String>,
    pub return_address: usize,
}

impl std::fmt::Display for FrameInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.name, self.args.join(", "))
    }
}
