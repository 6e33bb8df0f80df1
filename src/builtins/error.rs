//! Error and the derived error classes

use crate::continuation::CallResult;
use crate::error::VmError;
use crate::object::{Object, ObjectKind, ObjectRef};
use crate::value::{CheapClone, Value};
use crate::vm::VirtualMachine;

use super::{ClassEntry, arg};

const DERIVED: [&str; 6] = [
    "TypeError",
    "ReferenceError",
    "RangeError",
    "SyntaxError",
    "EvalError",
    "URIError",
];

/// `Error` first, then the classes inheriting from it
pub fn classes() -> Vec<ClassEntry> {
    let base = ClassEntry::new("Error", error_constructor)
        .method("toString", error_to_string)
        .value("name", Value::string("Error"))
        .value("message", Value::string(""));
    let derived = DERIVED.into_iter().map(|name| {
        ClassEntry::new(name, error_constructor)
            .parent("Error")
            .value("name", Value::string(name))
            .value("message", Value::string(""))
    });
    std::iter::once(base).chain(derived).collect()
}

/// Shared by every error class. `new X(msg)` fills in the allocated instance
/// and takes the class name from its prototype; a plain call builds an `Error`.
pub fn error_constructor(
    vm: &mut VirtualMachine,
    this: &Value,
    args: &[Value],
) -> Result<CallResult, VmError> {
    let target = match this {
        Value::Object(obj) if !obj.ptr_eq(vm.global_object()) => obj.cheap_clone(),
        _ => {
            let proto = vm.prototype("Error").unwrap_or_else(|| vm.object_prototype());
            ObjectRef::new(Object::error(Some(proto)))
        }
    };
    let class = target
        .prototype()
        .and_then(|proto| proto.get_value("name"))
        .map(|name| name.to_avm_string());
    {
        let mut inner = target.borrow_mut();
        inner.kind = ObjectKind::Error;
        if let Some(class) = class {
            inner.class = class;
        }
    }
    let message = arg(args, 0);
    if !message.is_undefined() {
        target.set_hidden("message", Value::String(message.to_avm_string()));
    }
    Ok(CallResult::returned(Value::Object(target)))
}

/// "Name: message", or just the name when the message is empty
pub fn error_to_string(
    _vm: &mut VirtualMachine,
    this: &Value,
    _args: &[Value],
) -> Result<CallResult, VmError> {
    let Some(obj) = this.as_object() else {
        return Ok(CallResult::returned(Value::string("Error")));
    };
    let name = obj
        .get_value("name")
        .map_or_else(|| "Error".to_string(), |v| v.to_display_string());
    let message = obj
        .get_value("message")
        .map(|v| v.to_display_string())
        .unwrap_or_default();
    let text = if message.is_empty() {
        name
    } else {
        format!("{name}: {message}")
    };
    Ok(CallResult::returned(Value::string(text)))
}
