//! Member access, literals, enumeration and class wiring

use crate::context::ExecutionContext;
use crate::error::VmError;
use crate::object::{ObjectRef, PropertyDescriptor};
use crate::value::{AvmString, CheapClone, Value};
use crate::vm::VirtualMachine;

// ═══════════════════════════════════════════════════════════════════════════════
// Members
// ═══════════════════════════════════════════════════════════════════════════════

pub(super) fn get_member(
    ctx: &mut ExecutionContext,
    vm: &mut VirtualMachine,
    object: &Value,
    name: &str,
) -> Result<(), VmError> {
    let result = vm.get_member(object, name)?;
    ctx.push_result(result);
    Ok(())
}

pub(super) fn set_member(
    ctx: &mut ExecutionContext,
    vm: &mut VirtualMachine,
    object: &Value,
    name: &str,
    value: Value,
) -> Result<(), VmError> {
    let result = vm.put_member(object, name, value)?;
    ctx.push_result(result.discard());
    Ok(())
}

/// `Delete`: remove an own property. Non-objects and non-configurable
/// properties give `false`.
pub(super) fn delete_member(object: &Value, name: &str) -> Value {
    match object {
        Value::Object(obj) => Value::Boolean(obj.delete_own_property(name)),
        _ => Value::Boolean(false),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Literals
// ═══════════════════════════════════════════════════════════════════════════════

/// Pops a count, then the elements; the first popped is element 0
pub(super) fn init_array(ctx: &mut ExecutionContext, vm: &VirtualMachine) {
    let count = usize::try_from(ctx.pop(vm).to_integer()).unwrap_or(0);
    let count = count.min(ctx.stack().len());
    let elements: Vec<Value> = (0..count).map(|_| ctx.pop(vm)).collect();
    ctx.push(Value::Object(vm.new_array(elements)));
}

/// Pops a count, then `(value, name)` pairs
pub(super) fn init_object(ctx: &mut ExecutionContext, vm: &VirtualMachine) {
    let count = usize::try_from(ctx.pop(vm).to_integer()).unwrap_or(0);
    let object = vm.new_object();
    for _ in 0..count {
        let value = ctx.pop(vm);
        let name = ctx.pop(vm).to_avm_string();
        object.set(name, value);
    }
    ctx.push(Value::Object(object));
}

// ═══════════════════════════════════════════════════════════════════════════════
// Enumeration
// ═══════════════════════════════════════════════════════════════════════════════

/// Push a `Null` terminator followed by the enumerable keys of `object`
pub(super) fn push_keys(ctx: &mut ExecutionContext, object: &Value) {
    ctx.push(Value::Null);
    if let Value::Object(obj) = object {
        for key in obj.enumerable_keys() {
            ctx.push(Value::String(key));
        }
    }
}

/// Value of a variable without running accessors
pub(super) fn peek_variable(ctx: &ExecutionContext, name: &str) -> Value {
    match ctx.scope.lookup_on_chain(name) {
        Some((PropertyDescriptor::Data { value, .. }, _)) => value,
        _ => Value::Undefined,
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Classes
// ═══════════════════════════════════════════════════════════════════════════════

fn prototype_of(constructor: &ObjectRef) -> Option<ObjectRef> {
    match constructor.get_value("prototype") {
        Some(Value::Object(proto)) => Some(proto),
        _ => None,
    }
}

/// `Extends`: give `sub` a fresh prototype inheriting from `sup.prototype`
pub(super) fn extends(vm: &VirtualMachine, sub: &Value, sup: &Value) {
    let (Some(sub), Some(sup)) = (
        sub.as_object().filter(|o| o.is_callable()),
        sup.as_object().filter(|o| o.is_callable()),
    ) else {
        vm.warn(format_args!(
            "Extends needs two functions, got {} and {}",
            sub.to_display_string(),
            sup.to_display_string()
        ));
        return;
    };
    let proto = vm.new_object();
    proto.set_prototype(prototype_of(sup));
    proto.set_hidden("__constructor__", Value::Object(sup.cheap_clone()));
    proto.set_hidden("constructor", Value::Object(sub.cheap_clone()));
    sub.set_hidden("prototype", Value::Object(proto));
}

/// `CastOp`: the object when it is an instance of `constructor`, `Null` otherwise
pub(super) fn cast(vm: &VirtualMachine, object: Value, constructor: &Value) -> Value {
    if vm.instance_of(&object, constructor) {
        object
    } else {
        Value::Null
    }
}

/// `ImplementsOp`: pops the constructor, a count and that many interfaces
pub(super) fn implements(ctx: &mut ExecutionContext, vm: &VirtualMachine) {
    let constructor = ctx.pop(vm);
    let count = usize::try_from(ctx.pop(vm).to_integer()).unwrap_or(0);
    let count = count.min(ctx.stack().len());
    let interfaces: Vec<Value> = (0..count).map(|_| ctx.pop(vm)).collect();

    let Some(proto) = constructor.as_object().and_then(prototype_of) else {
        vm.warn(format_args!(
            "ImplementsOp target {} has no prototype",
            constructor.to_display_string()
        ));
        return;
    };
    proto.set_hidden(
        AvmString::from("__implements__"),
        Value::Object(vm.new_array(interfaces)),
    );
}
