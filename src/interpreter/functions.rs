//! Function definition, calls and construction

use crate::context::ExecutionContext;
use crate::continuation::{CallResult, ResultKind};
use crate::error::VmError;
use crate::instruction::{Instruction, PreloadFlags};
use crate::object::{FunctionVersion, Parameter, ScriptFunction};
use crate::stream::InstructionStream;
use crate::value::{AvmString, CheapClone, Value};
use crate::vm::VirtualMachine;

// ═══════════════════════════════════════════════════════════════════════════════
// Definition
// ═══════════════════════════════════════════════════════════════════════════════

/// `DefineFunction`: `[name, n, param*n, body_size]`
pub(super) fn define_function(
    ctx: &mut ExecutionContext,
    vm: &mut VirtualMachine,
    inst: &Instruction,
) -> Result<(), VmError> {
    let name = AvmString::from(inst.string_operand(0)?);
    let count = count_operand(inst, 1)?;
    let params = (0..count)
        .map(|i| {
            Ok(Parameter {
                name: AvmString::from(inst.string_operand(2 + i)?),
                register: 0,
            })
        })
        .collect::<Result<Vec<_>, VmError>>()?;
    let body_size = count_operand(inst, 2 + count)?;
    let body = carve_body(ctx, body_size)?;

    let function = ScriptFunction {
        name,
        version: FunctionVersion::V1,
        params,
        register_count: vm.options().default_register_count,
        flags: PreloadFlags::empty(),
        body,
        constants: ctx.constants().cheap_clone(),
        global_constants: ctx.global_constants().cheap_clone(),
        scope: ctx.scope.cheap_clone(),
    };
    bind_function(ctx, vm, function)
}

/// `DefineFunction2`: `[name, n, registers, flags, (register, name)*n, body_size]`
pub(super) fn define_function2(
    ctx: &mut ExecutionContext,
    vm: &mut VirtualMachine,
    inst: &Instruction,
) -> Result<(), VmError> {
    let name = AvmString::from(inst.string_operand(0)?);
    let count = count_operand(inst, 1)?;
    let declared_registers = count_operand(inst, 2)?;
    let raw_flags = u32::try_from(inst.integer_operand(3)?)
        .map_err(|_| VmError::invalid_operand(inst.opcode, "preload flags out of range"))?;
    let flags = PreloadFlags::from_bits_truncate(raw_flags);

    let params = (0..count)
        .map(|i| {
            let register = u8::try_from(inst.integer_operand(4 + 2 * i)?).map_err(|_| {
                VmError::invalid_operand(inst.opcode, format!("parameter {i} register out of range"))
            })?;
            Ok(Parameter {
                name: AvmString::from(inst.string_operand(5 + 2 * i)?),
                register,
            })
        })
        .collect::<Result<Vec<_>, VmError>>()?;
    let body_size = count_operand(inst, 4 + 2 * count)?;
    let body = carve_body(ctx, body_size)?;

    // Room for every preloaded value and register parameter
    let preloaded = usize::try_from(flags.preload_count()).unwrap_or(0);
    let highest_param = params.iter().map(|p| usize::from(p.register)).max().unwrap_or(0);
    let register_count = declared_registers.max(preloaded + 1).max(highest_param + 1);

    let function = ScriptFunction {
        name,
        version: FunctionVersion::V2,
        params,
        register_count,
        flags,
        body,
        constants: ctx.constants().cheap_clone(),
        global_constants: ctx.global_constants().cheap_clone(),
        scope: ctx.scope.cheap_clone(),
    };
    bind_function(ctx, vm, function)
}

fn count_operand(inst: &Instruction, index: usize) -> Result<usize, VmError> {
    usize::try_from(inst.integer_operand(index)?)
        .map_err(|_| VmError::invalid_operand(inst.opcode, format!("operand {index} is negative")))
}

/// The body follows the define instruction; the cursor ends up after it
fn carve_body(ctx: &mut ExecutionContext, byte_length: usize) -> Result<InstructionStream, VmError> {
    ctx.stream.advance();
    ctx.stream.extract_subrange(byte_length, true, true)
}

/// Named functions are bound in the current scope, anonymous ones pushed
fn bind_function(
    ctx: &mut ExecutionContext,
    vm: &mut VirtualMachine,
    function: ScriptFunction,
) -> Result<(), VmError> {
    let name = function.name.cheap_clone();
    let object = Value::Object(vm.new_script_function(function));
    if name.is_empty() {
        ctx.push(object);
        return Ok(());
    }
    let scope = ctx.scope.cheap_clone();
    let result = scope.set_on_local(vm, name, object)?;
    ctx.push_result(result.discard());
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════════
// Calls
// ═══════════════════════════════════════════════════════════════════════════════

/// Pop an argument count, then that many arguments. The first popped value
/// is the first argument.
pub(super) fn pop_args(ctx: &mut ExecutionContext, vm: &VirtualMachine) -> Vec<Value> {
    let count = usize::try_from(ctx.pop(vm).to_integer()).unwrap_or(0);
    let count = count.min(ctx.stack().len());
    (0..count).map(|_| ctx.pop(vm)).collect()
}

/// Run `f` on the callee once its lookup has settled
fn with_callee<F>(vm: &mut VirtualMachine, callee: CallResult, f: F) -> Result<CallResult, VmError>
where
    F: FnOnce(&mut VirtualMachine, Value) -> Result<CallResult, VmError> + 'static,
{
    if callee.kind() == ResultKind::Return && !callee.has_recall() {
        let function = callee.value().cloned().unwrap_or_default();
        return f(vm, function);
    }
    Ok(callee.then(move |vm, function| f(vm, function).map(Some)))
}

fn deliver(ctx: &mut ExecutionContext, result: CallResult, discard: bool) {
    if discard {
        ctx.push_result(result.discard());
    } else {
        ctx.push_result(result);
    }
}

/// Call the function bound to `name` in scope, with the global object as `this`
pub(super) fn call_named_function(
    ctx: &mut ExecutionContext,
    vm: &mut VirtualMachine,
    name: &str,
    args: Vec<Value>,
    discard: bool,
) -> Result<(), VmError> {
    let scope = ctx.scope.cheap_clone();
    let callee = scope.get_on_chain(vm, name)?;
    let this = Value::Object(ctx.global_obj.cheap_clone());
    let result = with_callee(vm, callee, move |vm, function| {
        vm.call_function(&function, &this, &args)
    })?;
    deliver(ctx, result, discard);
    Ok(())
}

/// Call `object[name]` with `object` as `this`. An empty or undefined name
/// calls `object` itself.
pub(super) fn call_method(
    ctx: &mut ExecutionContext,
    vm: &mut VirtualMachine,
    object: Value,
    name: &Value,
    args: Vec<Value>,
    discard: bool,
) -> Result<(), VmError> {
    let name = member_name(name);
    let result = match name {
        None => {
            let this = Value::Object(ctx.global_obj.cheap_clone());
            vm.call_function(&object, &this, &args)?
        }
        Some(name) => {
            let callee = vm.get_member(&object, name.as_str())?;
            with_callee(vm, callee, move |vm, function| {
                vm.call_function(&function, &object, &args)
            })?
        }
    };
    deliver(ctx, result, discard);
    Ok(())
}

/// `NewObject`: construct the constructor bound to `name` in scope
pub(super) fn new_object(
    ctx: &mut ExecutionContext,
    vm: &mut VirtualMachine,
    name: &str,
    args: Vec<Value>,
) -> Result<(), VmError> {
    let scope = ctx.scope.cheap_clone();
    let callee = scope.get_on_chain(vm, name)?;
    let result = with_callee(vm, callee, move |vm, constructor| vm.construct(&constructor, &args))?;
    ctx.push_result(result);
    Ok(())
}

/// `NewMethod`: construct `object[name]`, or `object` for an empty name
pub(super) fn new_method(
    ctx: &mut ExecutionContext,
    vm: &mut VirtualMachine,
    object: Value,
    name: &Value,
    args: Vec<Value>,
) -> Result<(), VmError> {
    let result = match member_name(name) {
        None => vm.construct(&object, &args)?,
        Some(name) => {
            let callee = vm.get_member(&object, name.as_str())?;
            with_callee(vm, callee, move |vm, constructor| vm.construct(&constructor, &args))?
        }
    };
    ctx.push_result(result);
    Ok(())
}

fn member_name(name: &Value) -> Option<AvmString> {
    if name.is_undefined() {
        return None;
    }
    let name = name.to_avm_string();
    (!name.is_empty()).then_some(name)
}
