//! Object constructor and prototype methods

use crate::continuation::CallResult;
use crate::error::VmError;
use crate::object::PropertyDescriptor;
use crate::value::Value;
use crate::vm::VirtualMachine;

use super::{ClassEntry, arg};

pub fn class() -> ClassEntry {
    ClassEntry::new("Object", object_constructor)
        .method("toString", object_to_string)
        .method("valueOf", object_value_of)
        .method("hasOwnProperty", object_has_own_property)
        .method("addProperty", object_add_property)
}

/// `Object(value)` returns object arguments unchanged; `new Object()` keeps
/// the instance the VM allocated
pub fn object_constructor(
    vm: &mut VirtualMachine,
    this: &Value,
    args: &[Value],
) -> Result<CallResult, VmError> {
    let value = arg(args, 0);
    if value.is_object() {
        return Ok(CallResult::returned(value));
    }
    match this {
        Value::Object(obj) if !obj.ptr_eq(vm.global_object()) => {
            Ok(CallResult::returned(this.clone()))
        }
        _ => Ok(CallResult::returned(Value::Object(vm.new_object()))),
    }
}

pub fn object_to_string(
    _vm: &mut VirtualMachine,
    this: &Value,
    _args: &[Value],
) -> Result<CallResult, VmError> {
    Ok(CallResult::returned(Value::string(this.to_display_string())))
}

pub fn object_value_of(
    _vm: &mut VirtualMachine,
    this: &Value,
    _args: &[Value],
) -> Result<CallResult, VmError> {
    Ok(CallResult::returned(this.clone()))
}

pub fn object_has_own_property(
    _vm: &mut VirtualMachine,
    this: &Value,
    args: &[Value],
) -> Result<CallResult, VmError> {
    let name = arg(args, 0).to_avm_string();
    let found = this
        .as_object()
        .is_some_and(|obj| obj.has_own_property(name.as_str()));
    Ok(CallResult::returned(Value::Boolean(found)))
}

/// `addProperty(name, getter, setter)`: define an accessor. The setter may be
/// `null` for a read-only property.
pub fn object_add_property(
    vm: &mut VirtualMachine,
    this: &Value,
    args: &[Value],
) -> Result<CallResult, VmError> {
    let name = arg(args, 0).to_avm_string();
    let getter = arg(args, 1);
    let setter = arg(args, 2);
    let Some(obj) = this.as_object() else {
        return Ok(CallResult::returned(Value::Boolean(false)));
    };
    if name.is_empty() || !getter.is_callable() || !(setter.is_callable() || setter.is_null()) {
        vm.warn(format_args!("addProperty('{name}') needs a getter function"));
        return Ok(CallResult::returned(Value::Boolean(false)));
    }
    let desc = PropertyDescriptor::accessor(getter.as_object().cloned(), setter.as_object().cloned());
    Ok(CallResult::returned(Value::Boolean(
        obj.define_own_property(name, desc),
    )))
}
