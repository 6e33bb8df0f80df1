//! The virtual machine
//!
//! Owns the global object, the class registry, the call stack and the work
//! queue, and drives execution one instruction at a time. The bottom of the
//! call stack is a permanent global context; everything the host runs sits
//! above it.
//!
//! Stepping detaches the top context from the stack for the duration of the
//! step so instruction handlers can hold `&mut ExecutionContext` and
//! `&mut VirtualMachine` at once. Frames pushed during the step land above it
//! when it is reinserted.

mod calls;
mod intervals;
mod options;

pub use intervals::IntervalState;
pub use options::VmOptions;

use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use rustc_hash::{FxBuildHasher, FxHashMap, FxHashSet};

use crate::builtins::{self, Registry};
use crate::context::{ExecutionContext, PendingCall};
use crate::continuation::{CallResult, FrameId, Outcome};
use crate::diagnostics::{DiagnosticLevel, DiagnosticsSink};
use crate::dom::DomHandler;
use crate::error::VmError;
use crate::instruction::Opcode;
use crate::object::{
    FunctionKind, NativeFn, NativeFunction, Object, ObjectKind, ObjectRef, ScriptFunction,
};
use crate::platform::{RandomProvider, TimeProvider};
use crate::scope::{Scope, SharedScope};
use crate::stream::InstructionStream;
use crate::value::{AvmString, CheapClone, Value};

const GLOBAL_CONTEXT_NAME: &str = "Global Execution Context";

pub struct VirtualMachine {
    options: VmOptions,
    global_object: ObjectRef,
    extern_object: ObjectRef,
    global_scope: SharedScope,
    prototypes: FxHashMap<AvmString, ObjectRef>,
    constructors: FxHashMap<AvmString, ObjectRef>,
    /// Never empty once constructed; index 0 is the global context
    call_stack: Vec<ExecutionContext>,
    work_queue: VecDeque<ExecutionContext>,
    intervals: IndexMap<AvmString, IntervalState, FxBuildHasher>,
    next_interval_id: u32,
    dom: Option<Rc<dyn DomHandler>>,
    diagnostics: Rc<dyn DiagnosticsSink>,
    clock: Box<dyn TimeProvider>,
    random: Box<dyn RandomProvider>,
    paused: bool,
    pause_started: Option<u64>,
    last_tick: u64,
    started_at: u64,
    next_frame_id: u64,
    /// Breakpoint already paused on, so the resumed step runs it
    breakpoint_marker: Option<(FrameId, usize)>,
    last_uncaught: Option<Value>,
    /// Frames whose completion a host `invoke` is waiting for
    host_awaited: FxHashSet<FrameId>,
    host_results: FxHashMap<FrameId, Outcome>,
}

impl Default for VirtualMachine {
    fn default() -> Self {
        Self::new(VmOptions::default())
    }
}

impl VirtualMachine {
    pub fn new(mut options: VmOptions) -> Self {
        let registry = options.registry.take().unwrap_or_else(Registry::standard);
        let clock = options.take_time_provider();
        let random = options.take_random_provider();
        let diagnostics = options.diagnostics.cheap_clone();
        let dom = options.dom.take();
        let now = clock.now_millis();

        let object_proto = ObjectRef::new(Object::ordinary(None));
        let function_proto = ObjectRef::new(Object::function(
            Some(object_proto.cheap_clone()),
            FunctionKind::Native(NativeFunction {
                name: "",
                call: builtins::function::function_prototype,
            }),
        ));
        let global_object = ObjectRef::new(Object::new(
            "global",
            Some(object_proto.cheap_clone()),
            ObjectKind::Ordinary,
        ));
        // No prototype: misses must reach the DOM handler
        let extern_object = ObjectRef::new(Object::new("extern", None, ObjectKind::Extern));
        let global_scope = Scope::object(global_object.cheap_clone(), None);

        let mut vm = Self {
            options,
            global_object,
            extern_object,
            global_scope,
            prototypes: FxHashMap::default(),
            constructors: FxHashMap::default(),
            call_stack: Vec::new(),
            work_queue: VecDeque::new(),
            intervals: IndexMap::default(),
            next_interval_id: 1,
            dom,
            diagnostics,
            clock,
            random,
            paused: false,
            pause_started: None,
            last_tick: now,
            started_at: now,
            next_frame_id: 0,
            breakpoint_marker: None,
            last_uncaught: None,
            host_awaited: FxHashSet::default(),
            host_results: FxHashMap::default(),
        };
        vm.prototypes.insert(AvmString::from("Object"), object_proto);
        vm.prototypes.insert(AvmString::from("Function"), function_proto);
        vm.register_builtins(registry);

        let this = Value::Object(vm.global_object.cheap_clone());
        let mut global = vm.create_context(GLOBAL_CONTEXT_NAME, InstructionStream::default(), this);
        global.set_outermost(true);
        vm.call_stack.push(global);
        vm
    }

    fn register_builtins(&mut self, registry: Registry) {
        let object_proto = self.object_prototype();
        for class in registry.classes {
            let proto = match self.prototypes.get(class.name) {
                Some(existing) => existing.cheap_clone(),
                None => {
                    let parent = class
                        .parent
                        .and_then(|p| self.prototypes.get(p))
                        .cloned()
                        .unwrap_or_else(|| object_proto.cheap_clone());
                    ObjectRef::new(Object::new(class.name, Some(parent), ObjectKind::Ordinary))
                }
            };
            for (name, call) in class.prototype_methods {
                proto.set_hidden(name, Value::Object(self.new_native_function(name, call)));
            }
            for (name, value) in class.prototype_values {
                proto.set_hidden(name, value);
            }
            let constructor = self.new_native_function(class.name, class.constructor);
            for (name, call) in class.static_methods {
                constructor.set_hidden(name, Value::Object(self.new_native_function(name, call)));
            }
            constructor.set_hidden("prototype", Value::Object(proto.cheap_clone()));
            proto.set_hidden("constructor", Value::Object(constructor.cheap_clone()));

            self.global_object
                .set_hidden(class.name, Value::Object(constructor.cheap_clone()));
            self.prototypes.insert(AvmString::from(class.name), proto);
            self.constructors.insert(AvmString::from(class.name), constructor);
        }
        for (name, call) in registry.functions {
            let function = self.new_native_function(name, call);
            self.global_object.set_hidden(name, Value::Object(function));
        }
        for (name, value) in registry.variables {
            self.global_object.set_hidden(name, value);
        }
        self.global_object
            .set_hidden("_global", Value::Object(self.global_object.cheap_clone()));
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // Accessors
    // ═══════════════════════════════════════════════════════════════════════════════

    pub fn options(&self) -> &VmOptions {
        &self.options
    }

    pub fn global_object(&self) -> &ObjectRef {
        &self.global_object
    }

    pub fn extern_object(&self) -> &ObjectRef {
        &self.extern_object
    }

    pub fn global_scope(&self) -> &SharedScope {
        &self.global_scope
    }

    pub fn prototype(&self, class: &str) -> Option<ObjectRef> {
        self.prototypes.get(class).cloned()
    }

    pub fn constructor(&self, class: &str) -> Option<ObjectRef> {
        self.constructors.get(class).cloned()
    }

    pub fn object_prototype(&self) -> ObjectRef {
        self.prototype("Object")
            .unwrap_or_else(|| ObjectRef::new(Object::ordinary(None)))
    }

    pub fn dom_handler(&self) -> Option<Rc<dyn DomHandler>> {
        self.dom.clone()
    }

    pub fn set_dom_handler(&mut self, handler: Option<Rc<dyn DomHandler>>) {
        self.dom = handler;
    }

    /// Root stage object reported by the DOM handler
    pub fn dom_root(&self) -> Option<ObjectRef> {
        self.dom.as_ref().and_then(|d| d.root())
    }

    pub fn diagnostics(&self) -> &Rc<dyn DiagnosticsSink> {
        &self.diagnostics
    }

    /// Value of the most recent uncaught exception
    pub fn last_uncaught(&self) -> Option<&Value> {
        self.last_uncaught.as_ref()
    }

    pub fn now_millis(&self) -> u64 {
        self.clock.now_millis()
    }

    /// Milliseconds since the VM was created
    pub fn elapsed_millis(&self) -> u64 {
        self.clock.now_millis().saturating_sub(self.started_at)
    }

    pub(crate) fn random(&mut self) -> f64 {
        self.random.random()
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // Diagnostics
    // ═══════════════════════════════════════════════════════════════════════════════

    pub fn diagnostic(&self, level: DiagnosticLevel, args: fmt::Arguments<'_>) {
        if self.diagnostics.enabled(level) {
            self.diagnostics.write(level, &args.to_string());
        }
    }

    pub fn warn(&self, args: fmt::Arguments<'_>) {
        self.diagnostic(DiagnosticLevel::Warn, args);
    }

    pub fn info(&self, args: fmt::Arguments<'_>) {
        self.diagnostic(DiagnosticLevel::Info, args);
    }

    pub fn debug(&self, args: fmt::Arguments<'_>) {
        self.diagnostic(DiagnosticLevel::Debug, args);
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // Object creation
    // ═══════════════════════════════════════════════════════════════════════════════

    pub fn new_object(&self) -> ObjectRef {
        ObjectRef::new(Object::ordinary(Some(self.object_prototype())))
    }

    pub fn new_array(&self, elements: Vec<Value>) -> ObjectRef {
        let proto = self.prototype("Array").unwrap_or_else(|| self.object_prototype());
        ObjectRef::new(Object::array(Some(proto), elements))
    }

    pub fn new_native_function(&self, name: &'static str, call: NativeFn) -> ObjectRef {
        ObjectRef::new(Object::function(
            self.prototype("Function"),
            FunctionKind::Native(NativeFunction { name, call }),
        ))
    }

    /// Function object for a script function, with a fresh `prototype`
    /// object whose `constructor` points back at it.
    pub fn new_script_function(&self, function: ScriptFunction) -> ObjectRef {
        let object = ObjectRef::new(Object::function(
            self.prototype("Function"),
            FunctionKind::Script(Rc::new(function)),
        ));
        let proto = self.new_object();
        proto.set_hidden("constructor", Value::Object(object.cheap_clone()));
        object.set_hidden("prototype", Value::Object(proto));
        object
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // Contexts
    // ═══════════════════════════════════════════════════════════════════════════════

    fn next_frame_id(&mut self) -> FrameId {
        let id = FrameId(self.next_frame_id);
        self.next_frame_id += 1;
        id
    }

    /// A context over `stream` in the global scope, as used for DOM root scripts
    pub fn create_context(
        &mut self,
        name: impl Into<AvmString>,
        stream: InstructionStream,
        this_obj: Value,
    ) -> ExecutionContext {
        let id = self.next_frame_id();
        let mut ctx = ExecutionContext::new(
            id,
            name,
            self,
            self.global_scope.cheap_clone(),
            stream,
            this_obj,
        );
        ctx.set_register_count(self.options.global_register_count);
        ctx
    }

    /// Activation of a script function, with registers and locals preloaded
    pub(crate) fn create_activation(
        &mut self,
        function: &ScriptFunction,
        this: &Value,
        args: &[Value],
    ) -> Result<ExecutionContext, VmError> {
        let id = self.next_frame_id();
        let name = if function.name.is_empty() {
            AvmString::from("<anonymous>")
        } else {
            function.name.cheap_clone()
        };
        let scope = Scope::record(Some(function.scope.cheap_clone()));
        let mut ctx =
            ExecutionContext::new(id, name, self, scope, function.body.clone(), this.clone());
        ctx.set_register_count(function.register_count);
        ctx.set_constants(function.constants.cheap_clone());
        ctx.set_global_constants(function.global_constants.cheap_clone());
        ctx.preload(self, function, args)?;
        Ok(ctx)
    }

    pub fn push_context(&mut self, ctx: ExecutionContext) {
        self.call_stack.push(ctx);
    }

    pub fn pop_context(&mut self) -> Result<ExecutionContext, VmError> {
        if self.call_stack.len() <= 1 {
            return Err(VmError::GlobalFramePop);
        }
        self.call_stack.pop().ok_or(VmError::GlobalFramePop)
    }

    pub fn enqueue_context(&mut self, ctx: ExecutionContext) {
        self.work_queue.push_back(ctx);
    }

    pub fn current_context(&self) -> Option<&ExecutionContext> {
        self.call_stack.last()
    }

    pub fn current_context_mut(&mut self) -> Option<&mut ExecutionContext> {
        self.call_stack.last_mut()
    }

    pub fn call_depth(&self) -> usize {
        self.call_stack.len()
    }

    pub fn work_queue_len(&self) -> usize {
        self.work_queue.len()
    }

    pub fn contains_frame(&self, id: FrameId) -> bool {
        self.call_stack.iter().any(|c| c.id() == id)
    }

    /// Only the global frame is left, or the top frame is outermost
    pub fn is_current_global(&self) -> bool {
        self.call_stack.len() <= 1 || self.call_stack.last().is_some_and(|c| c.is_outermost())
    }

    /// Schedule `callable` to run once the current pass reaches the global frame
    pub fn enqueue_call(
        &mut self,
        callable: &Value,
        this: &Value,
        args: &[Value],
    ) -> Result<(), VmError> {
        let Some(function) = callable.as_object().and_then(|o| o.function()) else {
            self.warn(format_args!(
                "ignoring queued call of non-function {}",
                callable.to_display_string()
            ));
            return Ok(());
        };
        let ctx = match function {
            FunctionKind::Script(script) => self.create_activation(&script, this, args)?,
            FunctionKind::Native(native) => {
                let mut ctx =
                    self.create_context(native.name, InstructionStream::default(), this.clone());
                ctx.set_pending_native(PendingCall {
                    callable: callable.clone(),
                    this: this.clone(),
                    args: args.to_vec(),
                });
                ctx
            }
        };
        self.enqueue_context(ctx);
        Ok(())
    }

    /// Describe the call stack, top frame first
    pub fn dump_call_stack(&self) -> Vec<String> {
        self.call_stack.iter().rev().map(|c| c.describe()).collect()
    }

    /// Describe the work queue, next activation first
    pub fn dump_work_queue(&self) -> Vec<String> {
        self.work_queue.iter().map(|c| c.describe()).collect()
    }

    /// Run `f` on the top context while it is detached from the stack
    fn with_top_context<R>(
        &mut self,
        f: impl FnOnce(&mut ExecutionContext, &mut Self) -> Result<R, VmError>,
    ) -> Result<R, VmError> {
        let Some(mut ctx) = self.call_stack.pop() else {
            return Err(VmError::internal("call stack is empty"));
        };
        let depth = self.call_stack.len();
        let result = f(&mut ctx, self);
        let at = depth.min(self.call_stack.len());
        self.call_stack.insert(at, ctx);
        result
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // Stepping
    // ═══════════════════════════════════════════════════════════════════════════════

    /// Execute one instruction of the top frame, then pop finished frames and
    /// drain the continuations of the frames they expose.
    ///
    /// Returns the executed opcode, or `None` when nothing ran (only the
    /// global frame is left, or a breakpoint paused the VM).
    pub fn execute_once(&mut self, ignore_breakpoints: bool) -> Result<Option<Opcode>, VmError> {
        let result = self.execute_once_inner(ignore_breakpoints);
        if matches!(&result, Err(err) if err.is_uncaught()) {
            self.unwind_to_global();
        }
        result
    }

    fn execute_once_inner(&mut self, ignore_breakpoints: bool) -> Result<Option<Opcode>, VmError> {
        if self.call_stack.len() <= 1 {
            return Ok(None);
        }
        let Some(top) = self.call_stack.last() else {
            return Ok(None);
        };
        let here = top.stream.index().map(|i| (top.id(), i));
        let breakpoint = top.stream.current().is_some_and(|i| i.breakpoint);
        if breakpoint
            && !ignore_breakpoints
            && !self.options.ignore_breakpoints
            && self.breakpoint_marker != here
        {
            self.debug(format_args!("breakpoint hit in {}", top.name()));
            self.breakpoint_marker = here;
            self.pause();
            return Ok(None);
        }
        self.breakpoint_marker = None;

        let opcode = self.with_top_context(|ctx, vm| ctx.step(vm))?;
        self.settle()?;
        Ok(opcode)
    }

    fn drain_top(&mut self) -> Result<(), VmError> {
        if self.call_stack.last().is_some_and(|c| c.has_pending()) {
            self.with_top_context(|ctx, vm| ctx.drain_continuations(vm))
        } else {
            Ok(())
        }
    }

    fn settle(&mut self) -> Result<(), VmError> {
        self.drain_top()?;
        while self.call_stack.len() > 1 && self.call_stack.last().is_some_and(|c| !c.is_executing())
        {
            let frame = self.pop_context()?;
            self.deliver(frame)?;
            self.drain_top()?;
        }
        Ok(())
    }

    /// Hand a finished frame's completion to whoever awaits it
    fn deliver(&mut self, frame: ExecutionContext) -> Result<(), VmError> {
        let id = frame.id();
        let completion = frame.completion();
        if self.host_awaited.remove(&id) {
            self.host_results.insert(id, completion);
            return Ok(());
        }
        for caller in self.call_stack.iter_mut().rev() {
            if let Some(entry) = caller.awaiting_mut(id) {
                entry.resolve(completion);
                return Ok(());
            }
        }
        match completion {
            Outcome::Throw(value) => Err(self.throw_error(value, frame.name().as_str())),
            _ => Ok(()),
        }
    }

    /// Report an uncaught script exception. The caller unwinds.
    pub fn throw_error(&mut self, value: Value, origin: &str) -> VmError {
        let message = error_message(&value);
        self.diagnostic(
            DiagnosticLevel::Error,
            format_args!("uncaught exception in {origin}: {message}"),
        );
        self.last_uncaught = Some(value);
        VmError::UncaughtException { message }
    }

    /// Drop every frame above the global one along with the global frame's
    /// pending continuations
    fn unwind_to_global(&mut self) {
        self.call_stack.truncate(1);
        if let Some(global) = self.call_stack.first_mut() {
            global.clear_continuations();
        }
        self.host_awaited.clear();
        self.host_results.clear();
        self.breakpoint_marker = None;
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // Drivers
    // ═══════════════════════════════════════════════════════════════════════════════

    /// Step until the current top frame has been popped or the VM pauses
    pub fn execute_until_halt(&mut self) -> Result<(), VmError> {
        if self.call_stack.len() <= 1 {
            return Ok(());
        }
        let Some(target) = self.call_stack.last().map(|c| c.id()) else {
            return Ok(());
        };
        while !self.paused && self.contains_frame(target) {
            self.execute_once(false)?;
        }
        Ok(())
    }

    /// Run frames until the stack is back at the global frame
    pub fn execute_until_global(&mut self) -> Result<(), VmError> {
        while !self.paused && !self.is_current_global() {
            self.execute_until_halt()?;
        }
        Ok(())
    }

    /// Run everything: the current stack, then every queued activation in order
    pub fn execute_until_empty(&mut self) -> Result<(), VmError> {
        while !self.paused {
            if self.call_stack.len() > 1 {
                if self.is_current_global() {
                    self.execute_until_halt()?;
                } else {
                    self.execute_until_global()?;
                }
                continue;
            }
            let Some(ctx) = self.work_queue.pop_front() else {
                break;
            };
            if ctx.is_outermost() {
                self.warn(format_args!(
                    "discarding queued outermost context {}",
                    ctx.name()
                ));
                continue;
            }
            self.push_context(ctx);
        }
        Ok(())
    }

    /// Call `callable` and run it to completion, returning its result
    pub fn invoke(&mut self, callable: &Value, this: &Value, args: &[Value]) -> Result<Value, VmError> {
        let result = self.call_function(callable, this, args)?;
        self.complete(result)
    }

    /// Drive a call result until it settles
    pub fn complete(&mut self, result: CallResult) -> Result<Value, VmError> {
        let mut current = result;
        loop {
            if let Some(id) = current.awaits() {
                self.host_awaited.insert(id);
                while !self.paused && self.contains_frame(id) {
                    self.execute_once(false)?;
                }
                match self.host_results.remove(&id) {
                    Some(outcome) => current.resolve(outcome),
                    None => {
                        self.host_awaited.remove(&id);
                        return Err(VmError::Suspended);
                    }
                }
                continue;
            }
            if current.is_throw() {
                let value = current.value().cloned().unwrap_or_default();
                return Err(self.throw_error(value, "host call"));
            }
            if !current.has_recall() {
                return Ok(current.value().cloned().unwrap_or_default());
            }
            match current.execute_recall(self)? {
                Some(next) => current = next,
                None => return Ok(Value::Undefined),
            }
        }
    }
}

/// "Name: message" for error-like objects, the display string otherwise
fn error_message(value: &Value) -> String {
    if let Value::Object(obj) = value {
        let name = obj.get_value("name");
        let message = obj.get_value("message");
        if let (Some(name), Some(message)) = (name, message) {
            let message = message.to_display_string();
            return if message.is_empty() {
                name.to_display_string()
            } else {
                format!("{}: {}", name.to_display_string(), message)
            };
        }
    }
    value.to_display_string()
}
