//! Instruction dispatch
//!
//! [`step`] executes the instruction under a frame's cursor. The dispatch is
//! one exhaustive match over [`Opcode`]: core opcodes are handled here, stage
//! opcodes are forwarded to the [`DomHandler`](crate::DomHandler), and the
//! exception-handler and `with` block constructs are rejected.
//!
//! Anything that may run script (calls, getters, setters, `valueOf`) hands
//! its [`CallResult`](crate::CallResult) to the frame's continuation queue,
//! so a step never blocks on another frame.

mod functions;
mod objects;
mod operators;

use crate::context::ExecutionContext;
use crate::continuation::ResultKind;
use crate::diagnostics::DiagnosticLevel;
use crate::error::VmError;
use crate::instruction::{Instruction, Opcode, Operand};
use crate::object::PropertyDescriptor;
use crate::value::{AvmString, CheapClone, Value};
use crate::vm::VirtualMachine;

use operators::{binary, unary};

/// How the cursor moves after an instruction
enum Flow {
    /// Advance to the next instruction
    Continue,
    /// The instruction positioned the cursor itself
    Jump,
}

/// Execute one instruction of `ctx`.
///
/// A queued native activation runs its call first. An exhausted stream
/// finishes the frame with `Normal`.
pub(crate) fn step(
    ctx: &mut ExecutionContext,
    vm: &mut VirtualMachine,
) -> Result<Option<Opcode>, VmError> {
    if !ctx.is_executing() {
        return Ok(None);
    }
    if let Some(call) = ctx.take_pending_native() {
        let result = vm.call_function(&call.callable, &call.this, &call.args)?;
        ctx.push_result(result);
        return Ok(None);
    }

    // The stream shares its instructions, so this clone is a refcount bump
    let stream = ctx.stream.clone();
    let Some(inst) = stream.current() else {
        let value = ctx.pop(vm);
        ctx.finish(ResultKind::Normal, value);
        return Ok(None);
    };
    if vm.diagnostics().enabled(DiagnosticLevel::Trace) {
        vm.diagnostic(
            DiagnosticLevel::Trace,
            format_args!("{} {:?} {:?}", ctx.name(), inst.opcode, inst.operands),
        );
    }

    match dispatch(ctx, vm, inst)? {
        Flow::Continue => ctx.stream.advance(),
        Flow::Jump => {}
    }
    Ok(Some(inst.opcode))
}

fn dispatch(
    ctx: &mut ExecutionContext,
    vm: &mut VirtualMachine,
    inst: &Instruction,
) -> Result<Flow, VmError> {
    match inst.opcode {
        // ═══════════════════════════════════════════════════════════════════════════
        // Arithmetic
        // ═══════════════════════════════════════════════════════════════════════════
        Opcode::Add => binary(ctx, vm, |b, a| Value::number(b.to_float() + a.to_float())),
        Opcode::Subtract => binary(ctx, vm, |b, a| Value::number(b.to_float() - a.to_float())),
        Opcode::Multiply => binary(ctx, vm, |b, a| Value::number(b.to_float() * a.to_float())),
        Opcode::Divide => binary(ctx, vm, |b, a| operators::divide(&b, &a)),
        Opcode::Modulo => binary(ctx, vm, |b, a| Value::number(b.to_float() % a.to_float())),
        Opcode::Add2 => operators::add2(ctx, vm)?,
        Opcode::Increment => unary(ctx, vm, |a| Value::Integer(a.to_integer().wrapping_add(1))),
        Opcode::Decrement => unary(ctx, vm, |a| Value::Integer(a.to_integer().wrapping_sub(1))),

        // ═══════════════════════════════════════════════════════════════════════════
        // Comparison and logic
        // ═══════════════════════════════════════════════════════════════════════════
        Opcode::Equals => binary(ctx, vm, |b, a| operators::legacy_equals(&b, &a)),
        Opcode::Equals2 => operators::equals2(ctx, vm)?,
        Opcode::StrictEquals => binary(ctx, vm, |b, a| Value::Boolean(b.strict_equals(&a))),
        Opcode::LessThan => binary(ctx, vm, |b, a| operators::legacy_less(&b, &a)),
        Opcode::LessThan2 => binary(ctx, vm, |b, a| b.abstract_less(&a)),
        Opcode::Greater => binary(ctx, vm, |b, a| a.abstract_less(&b)),
        Opcode::LogicalAnd => {
            binary(ctx, vm, |b, a| Value::Boolean(b.to_boolean() && a.to_boolean()))
        }
        Opcode::LogicalOr => {
            binary(ctx, vm, |b, a| Value::Boolean(b.to_boolean() || a.to_boolean()))
        }
        Opcode::LogicalNot => unary(ctx, vm, |a| Value::Boolean(!a.to_boolean())),

        // ═══════════════════════════════════════════════════════════════════════════
        // Bitwise
        // ═══════════════════════════════════════════════════════════════════════════
        Opcode::BitwiseAnd => binary(ctx, vm, |b, a| Value::Integer(b.to_integer() & a.to_integer())),
        Opcode::BitwiseOr => binary(ctx, vm, |b, a| Value::Integer(b.to_integer() | a.to_integer())),
        Opcode::BitwiseXOr => binary(ctx, vm, |b, a| Value::Integer(b.to_integer() ^ a.to_integer())),
        Opcode::ShiftLeft => binary(ctx, vm, |b, a| operators::shift_left(&b, &a)),
        Opcode::ShiftRight => binary(ctx, vm, |b, a| operators::shift_right(&b, &a)),
        Opcode::ShiftRight2 => binary(ctx, vm, |b, a| operators::shift_right_unsigned(&b, &a)),

        // ═══════════════════════════════════════════════════════════════════════════
        // Strings
        // ═══════════════════════════════════════════════════════════════════════════
        Opcode::StringEquals => binary(ctx, vm, |b, a| operators::string_equals(&b, &a)),
        Opcode::StringCompare => binary(ctx, vm, |b, a| operators::string_less(&b, &a)),
        Opcode::StringGreater => binary(ctx, vm, |b, a| operators::string_greater(&b, &a)),
        Opcode::StringConcat => binary(ctx, vm, |b, a| operators::concat(&b, &a)),
        Opcode::StringLength => unary(ctx, vm, |a| operators::byte_length(&a)),
        Opcode::MbLength => unary(ctx, vm, |a| operators::char_length(&a)),
        Opcode::SubString | Opcode::MbSubString => operators::substring(ctx, vm),
        Opcode::Ord => unary(ctx, vm, |a| operators::byte_ord(&a)),
        Opcode::MbOrd => unary(ctx, vm, |a| operators::char_ord(&a)),
        Opcode::Chr => unary(ctx, vm, |a| operators::byte_chr(&a)),
        Opcode::MbChr => unary(ctx, vm, |a| operators::char_chr(&a)),

        // ═══════════════════════════════════════════════════════════════════════════
        // Conversion
        // ═══════════════════════════════════════════════════════════════════════════
        Opcode::ToInteger => unary(ctx, vm, |a| Value::Integer(a.to_integer())),
        Opcode::ToNumber => operators::to_number(ctx, vm)?,
        Opcode::ToString => operators::to_string(ctx, vm)?,
        Opcode::TypeOf => unary(ctx, vm, |a| Value::string(a.type_of())),

        // ═══════════════════════════════════════════════════════════════════════════
        // Stack and registers
        // ═══════════════════════════════════════════════════════════════════════════
        Opcode::Pop => {
            ctx.pop(vm);
        }
        Opcode::PushDuplicate => {
            let top = ctx.pop(vm);
            ctx.push(top.clone());
            ctx.push(top);
        }
        Opcode::StackSwap => {
            let a = ctx.pop(vm);
            let b = ctx.pop(vm);
            ctx.push(a);
            ctx.push(b);
        }
        Opcode::PushData => {
            for operand in &inst.operands {
                let value = resolve_operand(ctx, operand)?;
                ctx.push(value);
            }
        }
        Opcode::EaPushByte
        | Opcode::EaPushShort
        | Opcode::EaPushLong
        | Opcode::EaPushFloat
        | Opcode::EaPushString => {
            let value = resolve_operand(ctx, inst.operand(0)?)?;
            ctx.push(value);
        }
        Opcode::EaPushConstantByte | Opcode::EaPushConstantWord => {
            let value = ctx.constant(index_operand(inst, 0)?)?;
            ctx.push(value);
        }
        Opcode::EaPushRegister => {
            let value = ctx.register(index_operand(inst, 0)?)?;
            ctx.push(value);
        }
        Opcode::SetRegister => {
            let value = ctx.peek().cloned().unwrap_or_default();
            ctx.set_register(index_operand(inst, 0)?, value)?;
        }
        Opcode::EaPushZero => ctx.push(Value::Integer(0)),
        Opcode::EaPushOne => ctx.push(Value::Integer(1)),
        Opcode::EaPushTrue => ctx.push(Value::Boolean(true)),
        Opcode::EaPushFalse => ctx.push(Value::Boolean(false)),
        Opcode::EaPushNull => ctx.push(Value::Null),
        Opcode::EaPushUndefined => ctx.push(Value::Undefined),
        Opcode::EaPushThis | Opcode::EaPushThisVar => {
            let this = ctx.this_obj.clone();
            ctx.push(this);
        }
        Opcode::EaPushGlobal | Opcode::EaPushGlobalVar => {
            let global = Value::Object(ctx.global_obj.cheap_clone());
            ctx.push(global);
        }

        // ═══════════════════════════════════════════════════════════════════════════
        // Variables
        // ═══════════════════════════════════════════════════════════════════════════
        Opcode::GetVariable => {
            let name = ctx.pop(vm).to_avm_string();
            get_variable(ctx, vm, &name)?;
        }
        Opcode::EaGetStringVar => {
            let name = AvmString::from(inst.string_operand(0)?);
            get_variable(ctx, vm, &name)?;
        }
        Opcode::EaPushValueOfVar => {
            let name = constant_name(ctx, inst, 0)?;
            get_variable(ctx, vm, &name)?;
        }
        Opcode::SetVariable => {
            let value = ctx.pop(vm);
            let name = ctx.pop(vm).to_avm_string();
            set_variable(ctx, vm, &name, value)?;
        }
        Opcode::EaSetStringVar => {
            let name = AvmString::from(inst.string_operand(0)?);
            let value = ctx.pop(vm);
            set_variable(ctx, vm, &name, value)?;
        }
        Opcode::EaZeroVar => {
            let name = ctx.pop(vm).to_avm_string();
            set_variable(ctx, vm, &name, Value::Integer(0))?;
        }
        Opcode::DefineLocal => {
            let value = ctx.pop(vm);
            let name = ctx.pop(vm).to_avm_string();
            ctx.scope
                .put_on_local(name, PropertyDescriptor::data(value, true, true, false));
        }
        Opcode::Var => {
            let name = ctx.pop(vm).to_avm_string();
            if !ctx.scope.has_on_local(name.as_str()) {
                ctx.scope.put_on_local(
                    name,
                    PropertyDescriptor::data(Value::Undefined, true, true, false),
                );
            }
        }
        Opcode::Delete => {
            let name = ctx.pop(vm).to_avm_string();
            let object = ctx.pop(vm);
            ctx.push(objects::delete_member(&object, name.as_str()));
        }
        Opcode::Delete2 => {
            let name = ctx.pop(vm).to_avm_string();
            let deleted = ctx.scope.delete_on_chain(name.as_str());
            ctx.push(Value::Boolean(deleted));
        }

        // ═══════════════════════════════════════════════════════════════════════════
        // Members
        // ═══════════════════════════════════════════════════════════════════════════
        Opcode::GetMember => {
            let name = ctx.pop(vm).to_avm_string();
            let object = ctx.pop(vm);
            objects::get_member(ctx, vm, &object, name.as_str())?;
        }
        Opcode::EaGetStringMember => {
            let object = ctx.pop(vm);
            objects::get_member(ctx, vm, &object, inst.string_operand(0)?)?;
        }
        Opcode::EaGetNamedMember => {
            let name = constant_name(ctx, inst, 0)?;
            let object = ctx.pop(vm);
            objects::get_member(ctx, vm, &object, name.as_str())?;
        }
        Opcode::SetMember => {
            let value = ctx.pop(vm);
            let name = ctx.pop(vm).to_avm_string();
            let object = ctx.pop(vm);
            objects::set_member(ctx, vm, &object, name.as_str(), value)?;
        }
        Opcode::EaSetStringMember => {
            let value = ctx.pop(vm);
            let object = ctx.pop(vm);
            objects::set_member(ctx, vm, &object, inst.string_operand(0)?, value)?;
        }

        // ═══════════════════════════════════════════════════════════════════════════
        // Calls
        // ═══════════════════════════════════════════════════════════════════════════
        Opcode::CallFunction | Opcode::EaCallFunc | Opcode::EaCallFuncPop => {
            let name = ctx.pop(vm).to_avm_string();
            let args = functions::pop_args(ctx, vm);
            let discard = inst.opcode == Opcode::EaCallFuncPop;
            functions::call_named_function(ctx, vm, name.as_str(), args, discard)?;
        }
        Opcode::EaCallNamedFunc | Opcode::EaCallNamedFuncPop => {
            let name = constant_name(ctx, inst, 0)?;
            let args = functions::pop_args(ctx, vm);
            let discard = inst.opcode == Opcode::EaCallNamedFuncPop;
            functions::call_named_function(ctx, vm, name.as_str(), args, discard)?;
        }
        Opcode::CallMethod | Opcode::EaCallMethod | Opcode::EaCallMethodPop => {
            let name = ctx.pop(vm);
            let object = ctx.pop(vm);
            let args = functions::pop_args(ctx, vm);
            let discard = inst.opcode == Opcode::EaCallMethodPop;
            functions::call_method(ctx, vm, object, &name, args, discard)?;
        }
        Opcode::EaCallNamedMethod | Opcode::EaCallNamedMethodPop => {
            let name = Value::String(constant_name(ctx, inst, 0)?);
            let object = ctx.pop(vm);
            let args = functions::pop_args(ctx, vm);
            let discard = inst.opcode == Opcode::EaCallNamedMethodPop;
            functions::call_method(ctx, vm, object, &name, args, discard)?;
        }
        Opcode::NewObject => {
            let name = ctx.pop(vm).to_avm_string();
            let args = functions::pop_args(ctx, vm);
            functions::new_object(ctx, vm, name.as_str(), args)?;
        }
        Opcode::NewMethod => {
            let name = ctx.pop(vm);
            let object = ctx.pop(vm);
            let args = functions::pop_args(ctx, vm);
            functions::new_method(ctx, vm, object, &name, args)?;
        }
        Opcode::DefineFunction => {
            functions::define_function(ctx, vm, inst)?;
            return Ok(Flow::Jump);
        }
        Opcode::DefineFunction2 => {
            functions::define_function2(ctx, vm, inst)?;
            return Ok(Flow::Jump);
        }

        // ═══════════════════════════════════════════════════════════════════════════
        // Objects
        // ═══════════════════════════════════════════════════════════════════════════
        Opcode::InitArray => objects::init_array(ctx, vm),
        Opcode::InitObject => objects::init_object(ctx, vm),
        Opcode::Enumerate => {
            let name = ctx.pop(vm).to_avm_string();
            let object = objects::peek_variable(ctx, name.as_str());
            objects::push_keys(ctx, &object);
        }
        Opcode::Enumerate2 => {
            let object = ctx.pop(vm);
            objects::push_keys(ctx, &object);
        }
        Opcode::InstanceOf => {
            let constructor = ctx.pop(vm);
            let object = ctx.pop(vm);
            ctx.push(Value::Boolean(vm.instance_of(&object, &constructor)));
        }
        Opcode::CastOp => {
            let object = ctx.pop(vm);
            let constructor = ctx.pop(vm);
            ctx.push(objects::cast(vm, object, &constructor));
        }
        Opcode::ImplementsOp => objects::implements(ctx, vm),
        Opcode::Extends => {
            let sup = ctx.pop(vm);
            let sub = ctx.pop(vm);
            objects::extends(vm, &sub, &sup);
        }

        // ═══════════════════════════════════════════════════════════════════════════
        // Control
        // ═══════════════════════════════════════════════════════════════════════════
        Opcode::BranchAlways => {
            ctx.stream.branch(inst.branch_offset()?)?;
            return Ok(Flow::Jump);
        }
        Opcode::BranchIfTrue | Opcode::EaBranchIfFalse => {
            let condition = ctx.pop(vm).to_boolean();
            let taken = condition == (inst.opcode == Opcode::BranchIfTrue);
            if taken {
                ctx.stream.branch(inst.branch_offset()?)?;
                return Ok(Flow::Jump);
            }
        }
        Opcode::End => {
            let value = ctx.pop(vm);
            ctx.finish(ResultKind::Normal, value);
            return Ok(Flow::Jump);
        }
        Opcode::Return => {
            let value = ctx.pop(vm);
            ctx.finish(ResultKind::Return, value);
            return Ok(Flow::Jump);
        }
        Opcode::Throw => {
            let value = ctx.pop(vm);
            ctx.finish(ResultKind::Throw, value);
            return Ok(Flow::Jump);
        }
        Opcode::ConstantPool => {
            let pool = inst
                .operands
                .iter()
                .map(|operand| pool_entry(ctx, operand))
                .collect::<Result<Vec<_>, VmError>>()?;
            ctx.set_constants(pool.into());
        }
        Opcode::Padding => {}
        Opcode::Random => {
            let max = ctx.pop(vm);
            let value = operators::random(vm, &max);
            ctx.push(value);
        }
        Opcode::GetTime => ctx.push(Value::number(vm.elapsed_millis() as f64)),
        Opcode::Trace => {
            let value = ctx.pop(vm);
            vm.info(format_args!("{}", value.to_display_string()));
        }

        // ═══════════════════════════════════════════════════════════════════════════
        // Stage opcodes, owned by the DOM handler
        // ═══════════════════════════════════════════════════════════════════════════
        Opcode::NextFrame
        | Opcode::PrevFrame
        | Opcode::Play
        | Opcode::Stop
        | Opcode::ToggleQuality
        | Opcode::StopSounds
        | Opcode::GotoFrame
        | Opcode::GotoFrame2
        | Opcode::GotoLabel
        | Opcode::CallFrame
        | Opcode::WaitForFrame
        | Opcode::WaitForFrameExpr
        | Opcode::SetTarget
        | Opcode::SetTarget2
        | Opcode::GetProperty
        | Opcode::SetProperty
        | Opcode::CloneSprite
        | Opcode::RemoveSprite
        | Opcode::StartDragMovie
        | Opcode::StopDragMovie
        | Opcode::TargetPath
        | Opcode::TraceStart
        | Opcode::GetUrl
        | Opcode::GetUrl2 => forward_to_dom(ctx, vm, inst)?,

        // ═══════════════════════════════════════════════════════════════════════════
        // Unsupported block constructs
        // ═══════════════════════════════════════════════════════════════════════════
        Opcode::Try | Opcode::With => return Err(VmError::UnhandledOpcode(inst.opcode)),
    }
    Ok(Flow::Continue)
}

// ═══════════════════════════════════════════════════════════════════════════════
// Operand helpers
// ═══════════════════════════════════════════════════════════════════════════════

/// Value of a push operand; registers and constants read the frame
fn resolve_operand(ctx: &ExecutionContext, operand: &Operand) -> Result<Value, VmError> {
    match operand {
        Operand::Register(index) => ctx.register(usize::from(*index)),
        Operand::Constant(index) => ctx.constant(usize::from(*index)),
        literal => Ok(literal.literal().unwrap_or_default()),
    }
}

/// `ConstantPool` entries index the movie-level constant table
fn pool_entry(ctx: &ExecutionContext, operand: &Operand) -> Result<Value, VmError> {
    match operand {
        Operand::Constant(index) => {
            let index = usize::from(*index);
            let table = ctx.global_constants();
            table.get(index).cloned().ok_or(VmError::InvalidConstant {
                index,
                count: table.len(),
            })
        }
        other => resolve_operand(ctx, other),
    }
}

fn index_operand(inst: &Instruction, index: usize) -> Result<usize, VmError> {
    usize::try_from(inst.integer_operand(index)?)
        .map_err(|_| VmError::invalid_operand(inst.opcode, format!("operand {index} is negative")))
}

/// Name held in the active constant pool at the index given by an operand
fn constant_name(
    ctx: &ExecutionContext,
    inst: &Instruction,
    index: usize,
) -> Result<AvmString, VmError> {
    Ok(ctx.constant(index_operand(inst, index)?)?.to_avm_string())
}

fn get_variable(
    ctx: &mut ExecutionContext,
    vm: &mut VirtualMachine,
    name: &AvmString,
) -> Result<(), VmError> {
    let scope = ctx.scope.cheap_clone();
    let result = scope.get_on_chain(vm, name.as_str())?;
    ctx.push_result(result);
    Ok(())
}

fn set_variable(
    ctx: &mut ExecutionContext,
    vm: &mut VirtualMachine,
    name: &AvmString,
    value: Value,
) -> Result<(), VmError> {
    let scope = ctx.scope.cheap_clone();
    let result = scope.set_on_chain(vm, name.as_str(), value)?;
    ctx.push_result(result.discard());
    Ok(())
}

/// Give the DOM handler the opcode. `GetURL` forms it declines fall back to
/// its URL dispatch.
fn forward_to_dom(
    ctx: &mut ExecutionContext,
    vm: &mut VirtualMachine,
    inst: &Instruction,
) -> Result<(), VmError> {
    let Some(dom) = vm.dom_handler() else {
        return Err(VmError::UnhandledOpcode(inst.opcode));
    };
    if dom.try_handle(vm, ctx, inst)? {
        return Ok(());
    }
    match inst.opcode {
        Opcode::GetUrl => {
            let url = inst.string_operand(0)?;
            let target = inst.string_operand(1)?;
            dom.handle_url(vm, ctx, url, target)
        }
        Opcode::GetUrl2 => {
            let target = ctx.pop(vm).to_avm_string();
            let url = ctx.pop(vm).to_avm_string();
            dom.handle_url(vm, ctx, url.as_str(), target.as_str())
        }
        other => Err(VmError::UnhandledOpcode(other)),
    }
}
