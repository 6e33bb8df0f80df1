//! Array constructor and prototype methods

use crate::continuation::CallResult;
use crate::error::VmError;
use crate::object::array_length;
use crate::value::Value;
use crate::vm::VirtualMachine;

use super::{ClassEntry, arg};

pub fn class() -> ClassEntry {
    ClassEntry::new("Array", array_constructor)
        .method("push", array_push)
        .method("pop", array_pop)
        .method("join", array_join)
        .method("toString", array_to_string)
        .static_method("isArray", array_is_array)
}

/// `Array(n)` makes `n` empty slots; any other argument list becomes the elements
pub fn array_constructor(
    vm: &mut VirtualMachine,
    _this: &Value,
    args: &[Value],
) -> Result<CallResult, VmError> {
    let elements = match args {
        [length @ (Value::Integer(_) | Value::Float(_))] => match array_length(length) {
            Some(n) => vec![Value::Undefined; n],
            None => {
                let error = vm.construct_error("RangeError", "Invalid array length");
                return Ok(CallResult::thrown(error));
            }
        },
        _ => args.to_vec(),
    };
    Ok(CallResult::returned(Value::Object(vm.new_array(elements))))
}

fn not_an_array(vm: &VirtualMachine, method: &str, this: &Value) -> CallResult {
    vm.warn(format_args!(
        "Array.prototype.{method} called on {}",
        this.to_display_string()
    ));
    CallResult::returned(Value::Undefined)
}

/// Appends the arguments, returning the new length
pub fn array_push(
    vm: &mut VirtualMachine,
    this: &Value,
    args: &[Value],
) -> Result<CallResult, VmError> {
    let Some(array) = this.as_object().filter(|o| o.is_array()) else {
        return Ok(not_an_array(vm, "push", this));
    };
    let mut length = array.array_elements().map_or(0, |e| e.len());
    for value in args {
        length = array.array_push(value.clone()).unwrap_or(length);
    }
    Ok(CallResult::returned(Value::number(length as f64)))
}

pub fn array_pop(
    vm: &mut VirtualMachine,
    this: &Value,
    _args: &[Value],
) -> Result<CallResult, VmError> {
    match this.as_object().and_then(|o| o.array_pop()) {
        Some(value) => Ok(CallResult::returned(value)),
        None => Ok(not_an_array(vm, "pop", this)),
    }
}

/// Elements joined by the separator (`,` by default); nullish elements are empty
pub fn array_join(
    vm: &mut VirtualMachine,
    this: &Value,
    args: &[Value],
) -> Result<CallResult, VmError> {
    let Some(elements) = this.as_object().and_then(|o| o.array_elements()) else {
        return Ok(not_an_array(vm, "join", this));
    };
    let separator = match arg(args, 0) {
        Value::Undefined => ",".to_string(),
        other => other.to_display_string(),
    };
    let joined = elements
        .iter()
        .map(|v| {
            if v.is_nullish() {
                String::new()
            } else {
                v.to_display_string()
            }
        })
        .collect::<Vec<_>>()
        .join(&separator);
    Ok(CallResult::returned(Value::string(joined)))
}

pub fn array_to_string(
    vm: &mut VirtualMachine,
    this: &Value,
    _args: &[Value],
) -> Result<CallResult, VmError> {
    array_join(vm, this, &[])
}

pub fn array_is_array(
    _vm: &mut VirtualMachine,
    _this: &Value,
    args: &[Value],
) -> Result<CallResult, VmError> {
    let is_array = arg(args, 0).as_object().is_some_and(|o| o.is_array());
    Ok(CallResult::returned(Value::Boolean(is_array)))
}
