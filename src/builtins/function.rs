//! Function prototype: `call` and `apply`

use crate::continuation::CallResult;
use crate::error::VmError;
use crate::value::{CheapClone, Value};
use crate::vm::VirtualMachine;

use super::{ClassEntry, arg};

pub fn class() -> ClassEntry {
    ClassEntry::new("Function", function_constructor)
        .method("call", function_call)
        .method("apply", function_apply)
}

/// Functions cannot be built from source text at runtime
pub fn function_constructor(
    vm: &mut VirtualMachine,
    _this: &Value,
    _args: &[Value],
) -> Result<CallResult, VmError> {
    let error = vm.construct_error("TypeError", "Function constructor is not supported");
    Ok(CallResult::thrown(error))
}

/// Body of `Function.prototype` itself, which is callable and returns `undefined`
pub fn function_prototype(
    _vm: &mut VirtualMachine,
    _this: &Value,
    _args: &[Value],
) -> Result<CallResult, VmError> {
    Ok(CallResult::returned(Value::Undefined))
}

/// A nullish receiver means the global object
fn receiver(vm: &VirtualMachine, this_arg: Value) -> Value {
    if this_arg.is_nullish() {
        Value::Object(vm.global_object().cheap_clone())
    } else {
        this_arg
    }
}

/// `fn.call(thisArg, ...args)`
pub fn function_call(
    vm: &mut VirtualMachine,
    this: &Value,
    args: &[Value],
) -> Result<CallResult, VmError> {
    let receiver = receiver(vm, arg(args, 0));
    let rest = args.get(1..).unwrap_or_default();
    vm.call_function(this, &receiver, rest)
}

/// `fn.apply(thisArg, argsArray)`
pub fn function_apply(
    vm: &mut VirtualMachine,
    this: &Value,
    args: &[Value],
) -> Result<CallResult, VmError> {
    let receiver = receiver(vm, arg(args, 0));
    let call_args = match arg(args, 1) {
        Value::Object(list) => list.array_elements().unwrap_or_default(),
        _ => Vec::new(),
    };
    vm.call_function(this, &receiver, &call_args)
}
