//! Call outcomes and recall codes
//!
//! A [`CallResult`] is what every call returns: either a settled completion or
//! `Executing(frame)`, meaning a script frame was pushed and its value arrives
//! later. Work that has to happen after the value is known is attached as a
//! chain of recall codes that the owning frame drains in order.

use std::collections::VecDeque;
use std::fmt;

use crate::error::VmError;
use crate::value::Value;
use crate::vm::VirtualMachine;

/// Identifies an execution context for result delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameId(pub u64);

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Completion state of a call or a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultKind {
    Executing,
    Normal,
    Return,
    Throw,
}

#[derive(Debug, Clone)]
pub enum Outcome {
    /// Waiting for the given frame to finish
    Executing(FrameId),
    Normal(Value),
    Return(Value),
    Throw(Value),
}

impl Outcome {
    pub fn kind(&self) -> ResultKind {
        match self {
            Outcome::Executing(_) => ResultKind::Executing,
            Outcome::Normal(_) => ResultKind::Normal,
            Outcome::Return(_) => ResultKind::Return,
            Outcome::Throw(_) => ResultKind::Throw,
        }
    }

    pub fn value(&self) -> Option<&Value> {
        match self {
            Outcome::Executing(_) => None,
            Outcome::Normal(v) | Outcome::Return(v) | Outcome::Throw(v) => Some(v),
        }
    }
}

/// Single-shot completion callback. Receives the settled value; `None` means
/// nothing is pushed on the owning frame.
pub type RecallCode =
    Box<dyn FnOnce(&mut VirtualMachine, Value) -> Result<Option<CallResult>, VmError>>;

pub struct CallResult {
    outcome: Outcome,
    recall: VecDeque<RecallCode>,
}

impl CallResult {
    pub fn new(outcome: Outcome) -> Self {
        Self {
            outcome,
            recall: VecDeque::new(),
        }
    }

    /// A value produced by a call
    pub fn returned(value: Value) -> Self {
        Self::new(Outcome::Return(value))
    }

    pub fn thrown(value: Value) -> Self {
        Self::new(Outcome::Throw(value))
    }

    /// Completion without a result; only meaningful for frames
    pub fn normal(value: Value) -> Self {
        Self::new(Outcome::Normal(value))
    }

    /// Pending on a pushed frame
    pub fn executing(frame: FrameId) -> Self {
        Self::new(Outcome::Executing(frame))
    }

    pub fn outcome(&self) -> &Outcome {
        &self.outcome
    }

    pub fn into_outcome(self) -> Outcome {
        self.outcome
    }

    pub fn kind(&self) -> ResultKind {
        self.outcome.kind()
    }

    pub fn value(&self) -> Option<&Value> {
        self.outcome.value()
    }

    pub fn is_executing(&self) -> bool {
        matches!(self.outcome, Outcome::Executing(_))
    }

    pub fn is_throw(&self) -> bool {
        matches!(self.outcome, Outcome::Throw(_))
    }

    /// Frame this result waits on
    pub fn awaits(&self) -> Option<FrameId> {
        match self.outcome {
            Outcome::Executing(id) => Some(id),
            _ => None,
        }
    }

    pub fn has_recall(&self) -> bool {
        !self.recall.is_empty()
    }

    /// Append a recall code to the chain
    pub fn then<F>(mut self, code: F) -> Self
    where
        F: FnOnce(&mut VirtualMachine, Value) -> Result<Option<CallResult>, VmError> + 'static,
    {
        self.recall.push_back(Box::new(code));
        self
    }

    /// Drop the eventual value instead of pushing it
    pub fn discard(self) -> Self {
        self.then(|_, _| Ok(None))
    }

    /// Fill in the completion of the awaited frame
    pub fn resolve(&mut self, completion: Outcome) {
        self.outcome = completion;
    }

    /// Run the recall chain against the settled outcome.
    ///
    /// Stops early on `Executing` (the chain resumes once that frame
    /// finishes) and on `Throw` (the remaining codes are abandoned). A code
    /// returning another result splices that result's own chain in front of
    /// the remaining codes.
    pub fn execute_recall(self, vm: &mut VirtualMachine) -> Result<Option<CallResult>, VmError> {
        let mut current = self;
        loop {
            let input = match &current.outcome {
                Outcome::Executing(_) | Outcome::Throw(_) => return Ok(Some(current)),
                Outcome::Normal(v) | Outcome::Return(v) => v.clone(),
            };
            let Some(code) = current.recall.pop_front() else {
                return Ok(Some(current));
            };
            match code(vm, input)? {
                Some(mut next) => {
                    next.recall.append(&mut current.recall);
                    current = next;
                }
                None if current.recall.is_empty() => return Ok(None),
                None => current.outcome = Outcome::Return(Value::Undefined),
            }
        }
    }
}

impl fmt::Debug for CallResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallResult")
            .field("outcome", &self.outcome)
            .field("recall", &self.recall.len())
            .finish()
    }
}

impl From<Value> for CallResult {
    fn from(value: Value) -> Self {
        CallResult::returned(value)
    }
}
