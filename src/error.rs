//! Error types for the virtual machine
//!
//! Script-level exceptions travel as values through [`crate::CallResult`]; the
//! variants here are the faults that abort a host-visible operation.

use crate::instruction::Opcode;
use thiserror::Error;

/// Faults surfaced to the host
#[derive(Debug, Clone, PartialEq, Error)]
pub enum VmError {
    #[error("register {index} is out of range (frame has {count} registers)")]
    InvalidRegister { index: usize, count: usize },

    #[error("constant {index} is out of range (pool has {count} entries)")]
    InvalidConstant { index: usize, count: usize },

    #[error("branch offset {offset} from byte {position} does not land on an instruction")]
    InvalidBranch { offset: i64, position: usize },

    #[error("sub-range of {length} bytes from byte {position} does not end on an instruction")]
    InvalidSubrange { length: usize, position: usize },

    #[error("malformed operands for {opcode:?}: {message}")]
    InvalidOperand { opcode: Opcode, message: String },

    #[error("opcode {0:?} is not implemented")]
    UnhandledOpcode(Opcode),

    #[error("the global execution context cannot be popped")]
    GlobalFramePop,

    #[error("uncaught exception: {message}")]
    UncaughtException { message: String },

    /// The VM was paused before an awaited call finished
    #[error("execution paused before the call completed")]
    Suspended,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl VmError {
    pub fn invalid_operand(opcode: Opcode, message: impl Into<String>) -> Self {
        VmError::InvalidOperand {
            opcode,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        VmError::Internal(message.into())
    }

    /// True for script exceptions that escaped to the VM boundary
    pub fn is_uncaught(&self) -> bool {
        matches!(self, VmError::UncaughtException { .. })
    }
}
