//! Stack-based bytecode virtual machine for ActionScript-style content
//!
//! The host decodes bytecode into [`Instruction`]s, wraps them in an
//! [`InstructionStream`] and hands them to a [`VirtualMachine`] as an
//! [`ExecutionContext`]. The VM steps one instruction at a time, parks call
//! results that are still running as continuations, fires intervals from the
//! host's clock and forwards stage opcodes to a [`DomHandler`].
//!
//! # Example
//!
//! ```
//! use avm::{Instruction, InstructionStream, Opcode, Operand, Value, VirtualMachine};
//!
//! let mut vm = VirtualMachine::default();
//! let stream = InstructionStream::new(vec![
//!     Instruction::new(
//!         Opcode::PushData,
//!         vec![Operand::String("answer".into()), Operand::Integer(40)],
//!         12,
//!     ),
//!     Instruction::new(Opcode::PushData, vec![Operand::Integer(2)], 6),
//!     Instruction::simple(Opcode::Add2),
//!     Instruction::simple(Opcode::SetVariable),
//! ]);
//! let this = Value::Object(vm.global_object().clone());
//! let ctx = vm.create_context("main", stream, this);
//! vm.push_context(ctx);
//! vm.execute_until_empty().unwrap();
//!
//! let answer = vm.global_object().get_value("answer");
//! assert_eq!(answer.map(|v| v.to_integer()), Some(42));
//! ```

pub mod builtins;
pub mod context;
pub mod continuation;
pub mod diagnostics;
pub mod dom;
pub mod error;
pub mod instruction;
mod interpreter;
pub mod object;
pub mod platform;
pub mod scope;
pub mod stream;
pub mod value;
pub mod vm;

pub use builtins::{ClassEntry, Registry};
pub use context::ExecutionContext;
pub use continuation::{CallResult, FrameId, Outcome, RecallCode, ResultKind};
pub use diagnostics::{
    DiagnosticLevel, DiagnosticRecord, DiagnosticsSink, MemoryDiagnostics, NoOpDiagnostics,
    TracingDiagnostics,
};
pub use dom::{DomHandler, NullDom};
pub use error::VmError;
pub use instruction::{Instruction, Opcode, Operand, PreloadFlags};
pub use object::{
    FunctionKind, FunctionVersion, NativeFn, NativeFunction, Object, ObjectKind, ObjectRef,
    Parameter, PropertyDescriptor, ScriptFunction,
};
pub use platform::{ManualClock, RandomProvider, TimeProvider};
pub use scope::{Scope, ScopeKind, SharedScope};
pub use stream::InstructionStream;
pub use value::{AvmString, CheapClone, Hint, Value};
pub use vm::{IntervalState, VirtualMachine, VmOptions};
