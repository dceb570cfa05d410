//! Host-fatal VM errors
//!
//! These signal broken bytecode or misuse of the VM API, never an ordinary
//! program failure; those travel as `Value::Error`.

use thiserror::Error;

/// Error that stops the VM outright
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VmError {
    #[error("operand stack underflow at instruction {ip}")]
    StackUnderflow { ip: usize },

    #[error("exited the outermost scope at instruction {ip}")]
    ScopeUnderflow { ip: usize },

    #[error("undefined variable '{name}' at instruction {ip}")]
    UndefinedVariable { name: String, ip: usize },

    #[error("iterator stack underflow at instruction {ip}")]
    IteratorUnderflow { ip: usize },

    #[error("jump target {target} out of range at instruction {ip}")]
    InvalidJump { target: usize, ip: usize },

    #[error("the VM is not awaiting input")]
    NotAwaitingInput,

    #[error("no program loaded")]
    NothingLoaded,
}

impl VmError {
    pub fn undefined_variable(name: &str, ip: usize) -> Self {
        VmError::UndefinedVariable {
            name: name.to_string(),
            ip,
        }
    }
}
