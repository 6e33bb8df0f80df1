//! Activation records
//!
//! An [`ExecutionContext`] is one call's live state: bindings, register file,
//! operand stack, constant pool, instruction cursor and the queue of pending
//! call results ("continuations") that must drain before the frame resumes.

use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use crate::continuation::{CallResult, FrameId, Outcome, ResultKind};
use crate::error::VmError;
use crate::instruction::{Opcode, PreloadFlags};
use crate::object::{FunctionVersion, ObjectRef, PropertyDescriptor, ScriptFunction};
use crate::scope::SharedScope;
use crate::stream::InstructionStream;
use crate::value::{AvmString, CheapClone, Value};
use crate::vm::VirtualMachine;

/// Native callable waiting to run as a queued activation
pub(crate) struct PendingCall {
    pub callable: Value,
    pub this: Value,
    pub args: Vec<Value>,
}

pub struct ExecutionContext {
    id: FrameId,
    name: AvmString,
    pub this_obj: Value,
    pub global_obj: ObjectRef,
    pub extern_obj: ObjectRef,
    pub root_obj: Option<ObjectRef>,
    pub scope: SharedScope,
    pub stream: InstructionStream,
    /// Index 0 is reserved
    registers: Vec<Value>,
    operand_stack: Vec<Value>,
    constants: Rc<[Value]>,
    global_constants: Rc<[Value]>,
    result: ResultKind,
    return_value: Option<Value>,
    continuation_queue: VecDeque<CallResult>,
    outermost: bool,
    pending_native: Option<PendingCall>,
}

impl ExecutionContext {
    /// A context over `stream`, bound to the VM's global, extern and root objects
    pub fn new(
        id: FrameId,
        name: impl Into<AvmString>,
        vm: &VirtualMachine,
        scope: SharedScope,
        stream: InstructionStream,
        this_obj: Value,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            this_obj,
            global_obj: vm.global_object().cheap_clone(),
            extern_obj: vm.extern_object().cheap_clone(),
            root_obj: vm.dom_root(),
            scope,
            stream,
            registers: vec![Value::Undefined; vm.options().default_register_count.max(1)],
            operand_stack: Vec::new(),
            constants: Rc::from(Vec::new()),
            global_constants: Rc::from(Vec::new()),
            result: ResultKind::Executing,
            return_value: None,
            continuation_queue: VecDeque::new(),
            outermost: false,
            pending_native: None,
        }
    }

    pub fn id(&self) -> FrameId {
        self.id
    }

    pub fn name(&self) -> &AvmString {
        &self.name
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // Result state
    // ═══════════════════════════════════════════════════════════════════════════════

    pub fn result(&self) -> ResultKind {
        self.result
    }

    pub fn is_executing(&self) -> bool {
        self.result == ResultKind::Executing
    }

    pub fn return_value(&self) -> Option<&Value> {
        self.return_value.as_ref()
    }

    /// Enter a terminal state
    pub fn finish(&mut self, kind: ResultKind, value: Value) {
        self.result = kind;
        self.return_value = Some(value);
        self.stream.invalidate();
    }

    /// Completion handed to whoever awaits this frame
    pub(crate) fn completion(&self) -> Outcome {
        let value = self.return_value.clone().unwrap_or_default();
        match self.result {
            ResultKind::Throw => Outcome::Throw(value),
            _ => Outcome::Return(value),
        }
    }

    pub fn is_outermost(&self) -> bool {
        self.outermost
    }

    pub fn set_outermost(&mut self, outermost: bool) {
        self.outermost = outermost;
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // Operand stack
    // ═══════════════════════════════════════════════════════════════════════════════

    pub fn push(&mut self, value: Value) {
        self.operand_stack.push(value);
    }

    /// Pop the top of the stack; an empty stack yields `Undefined` and a warning
    pub fn pop(&mut self, vm: &VirtualMachine) -> Value {
        match self.operand_stack.pop() {
            Some(value) => value,
            None => {
                vm.warn(format_args!("{}: pop from empty operand stack", self.name));
                Value::Undefined
            }
        }
    }

    pub fn peek(&self) -> Option<&Value> {
        self.operand_stack.last()
    }

    pub fn stack(&self) -> &[Value] {
        &self.operand_stack
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // Registers and constants
    // ═══════════════════════════════════════════════════════════════════════════════

    pub fn register_count(&self) -> usize {
        self.registers.len()
    }

    pub fn set_register_count(&mut self, count: usize) {
        self.registers = vec![Value::Undefined; count.max(1)];
    }

    pub fn register(&self, index: usize) -> Result<Value, VmError> {
        self.registers
            .get(index)
            .cloned()
            .ok_or(VmError::InvalidRegister {
                index,
                count: self.registers.len(),
            })
    }

    pub fn set_register(&mut self, index: usize, value: Value) -> Result<(), VmError> {
        let count = self.registers.len();
        let slot = self
            .registers
            .get_mut(index)
            .ok_or(VmError::InvalidRegister { index, count })?;
        *slot = value;
        Ok(())
    }

    pub fn constants(&self) -> &Rc<[Value]> {
        &self.constants
    }

    pub fn set_constants(&mut self, constants: Rc<[Value]>) {
        self.constants = constants;
    }

    pub fn global_constants(&self) -> &Rc<[Value]> {
        &self.global_constants
    }

    pub fn set_global_constants(&mut self, constants: Rc<[Value]>) {
        self.global_constants = constants;
    }

    pub fn constant(&self, index: usize) -> Result<Value, VmError> {
        self.constants
            .get(index)
            .cloned()
            .ok_or(VmError::InvalidConstant {
                index,
                count: self.constants.len(),
            })
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // Continuation queue
    // ═══════════════════════════════════════════════════════════════════════════════

    pub fn enqueue(&mut self, result: CallResult) {
        self.continuation_queue.push_back(result);
    }

    /// Queue ahead of everything already pending
    pub fn enqueue_front(&mut self, result: CallResult) {
        self.continuation_queue.push_front(result);
    }

    pub fn dequeue(&mut self) -> Option<CallResult> {
        self.continuation_queue.pop_front()
    }

    pub fn peek_continuation(&self) -> Option<&CallResult> {
        self.continuation_queue.front()
    }

    pub fn has_pending(&self) -> bool {
        !self.continuation_queue.is_empty()
    }

    pub fn pending_count(&self) -> usize {
        self.continuation_queue.len()
    }

    /// Queued result waiting on `frame`
    pub(crate) fn awaiting_mut(&mut self, frame: FrameId) -> Option<&mut CallResult> {
        self.continuation_queue
            .iter_mut()
            .find(|r| r.awaits() == Some(frame))
    }

    pub(crate) fn clear_continuations(&mut self) {
        self.continuation_queue.clear();
    }

    /// Hand a call result to this frame. Settled values with nothing queued
    /// ahead go straight onto the stack.
    pub fn push_result(&mut self, result: CallResult) {
        if self.continuation_queue.is_empty()
            && !result.has_recall()
            && result.kind() == ResultKind::Return
        {
            if let Outcome::Return(value) = result.into_outcome() {
                self.push(value);
            }
            return;
        }
        self.enqueue(result);
    }

    /// Run queued continuations front to back until one is still pending.
    pub fn drain_continuations(&mut self, vm: &mut VirtualMachine) -> Result<(), VmError> {
        while self.peek_continuation().is_some_and(|r| !r.is_executing()) {
            let Some(entry) = self.dequeue() else {
                break;
            };
            let Some(result) = entry.execute_recall(vm)? else {
                continue;
            };
            match result.kind() {
                ResultKind::Executing => {
                    self.enqueue_front(result);
                    break;
                }
                ResultKind::Throw => {
                    let value = result.value().cloned().unwrap_or_default();
                    return Err(vm.throw_error(value, self.name.as_str()));
                }
                ResultKind::Return => {
                    if let Outcome::Return(value) = result.into_outcome() {
                        self.push(value);
                    }
                }
                ResultKind::Normal => {
                    vm.warn(format_args!(
                        "{}: continuation settled without a result: {:?}",
                        self.name,
                        result.outcome()
                    ));
                }
            }
        }
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // Activation setup
    // ═══════════════════════════════════════════════════════════════════════════════

    fn declare_local(&self, name: impl Into<AvmString>, value: Value) {
        self.scope
            .put_on_local(name, PropertyDescriptor::data(value, true, true, false));
    }

    /// Bind arguments and preloaded values for a script function activation.
    ///
    /// Preloaded registers are filled from 1 in the order this, arguments,
    /// super, root, parent, global, extern.
    pub fn preload(
        &mut self,
        vm: &VirtualMachine,
        function: &ScriptFunction,
        args: &[Value],
    ) -> Result<(), VmError> {
        let arg = |i: usize| args.get(i).cloned().unwrap_or_default();

        if function.version == FunctionVersion::V1 {
            for (i, param) in function.params.iter().enumerate() {
                self.declare_local(param.name.cheap_clone(), arg(i));
            }
            return Ok(());
        }

        let flags = function.flags;
        let this = self.this_obj.clone();
        let this_object = this.as_object().cloned();
        let arguments = if flags.contains(PreloadFlags::PRELOAD_ARGUMENTS)
            || !flags.contains(PreloadFlags::SUPPRESS_ARGUMENTS)
        {
            Value::Object(vm.new_array(args.to_vec()))
        } else {
            Value::Undefined
        };
        let super_value = this_object
            .as_ref()
            .and_then(|o| o.prototype())
            .and_then(|p| p.prototype())
            .map(Value::Object)
            .unwrap_or(Value::Null);

        let preloads = [
            (PreloadFlags::PRELOAD_THIS, this.clone()),
            (PreloadFlags::PRELOAD_ARGUMENTS, arguments.clone()),
            (PreloadFlags::PRELOAD_SUPER, super_value.clone()),
            (
                PreloadFlags::PRELOAD_ROOT,
                self.root_obj.clone().map(Value::Object).unwrap_or_default(),
            ),
            (
                PreloadFlags::PRELOAD_PARENT,
                this_object
                    .as_ref()
                    .and_then(|o| o.parent())
                    .map(Value::Object)
                    .unwrap_or_default(),
            ),
            (
                PreloadFlags::PRELOAD_GLOBAL,
                Value::Object(self.global_obj.cheap_clone()),
            ),
            (
                PreloadFlags::PRELOAD_EXTERN,
                Value::Object(self.extern_obj.cheap_clone()),
            ),
        ];
        let mut register = 1;
        for (flag, value) in preloads {
            if flags.contains(flag) {
                self.set_register(register, value)?;
                register += 1;
            }
        }

        if !flags.contains(PreloadFlags::SUPPRESS_SUPER) {
            self.declare_local("super", super_value);
        }
        if !flags.contains(PreloadFlags::SUPPRESS_ARGUMENTS) {
            self.declare_local("arguments", arguments);
        }
        if !flags.contains(PreloadFlags::SUPPRESS_THIS) {
            self.declare_local("this", this);
        }

        for (i, param) in function.params.iter().enumerate() {
            if param.register > 0 {
                self.set_register(usize::from(param.register), arg(i))?;
            } else {
                self.declare_local(param.name.cheap_clone(), arg(i));
            }
        }
        Ok(())
    }

    pub(crate) fn set_pending_native(&mut self, call: PendingCall) {
        self.pending_native = Some(call);
    }

    pub(crate) fn take_pending_native(&mut self) -> Option<PendingCall> {
        self.pending_native.take()
    }

    /// Execute one instruction
    pub fn step(&mut self, vm: &mut VirtualMachine) -> Result<Option<Opcode>, VmError> {
        crate::interpreter::step(self, vm)
    }

    /// One-line summary for stack dumps
    pub fn describe(&self) -> String {
        format!(
            "{} {} [{:?}] at {} stack={} pending={}",
            self.id,
            self.name,
            self.result,
            self.stream
                .index()
                .map_or_else(|| "-".to_string(), |i| i.to_string()),
            self.operand_stack.len(),
            self.continuation_queue.len()
        )
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("result", &self.result)
            .field("index", &self.stream.index())
            .field("stack", &self.operand_stack)
            .field("pending", &self.continuation_queue.len())
            .field("outermost", &self.outermost)
            .finish()
    }
}
