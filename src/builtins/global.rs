//! Global functions and variables

use crate::continuation::CallResult;
use crate::error::VmError;
use crate::value::Value;
use crate::vm::VirtualMachine;

use super::{Registry, arg};

pub fn register(registry: Registry) -> Registry {
    registry
        .function("setInterval", set_interval)
        .function("clearInterval", clear_interval)
        .variable("NaN", Value::Float(f64::NAN))
        .variable("Infinity", Value::Float(f64::INFINITY))
}

/// `setInterval(fn, ms, ...args)` or `setInterval(object, "method", ms, ...args)`.
/// Returns the interval id.
pub fn set_interval(
    vm: &mut VirtualMachine,
    _this: &Value,
    args: &[Value],
) -> Result<CallResult, VmError> {
    let first = arg(args, 0);
    let (callable, this_obj, rest) = if first.is_callable() {
        (first, Value::Undefined, args.get(1..).unwrap_or_default())
    } else {
        let method = arg(args, 1).to_avm_string();
        let callable = first
            .as_object()
            .and_then(|o| o.get_value(method.as_str()))
            .unwrap_or_default();
        (callable, first, args.get(2..).unwrap_or_default())
    };
    if !callable.is_callable() {
        vm.warn(format_args!("setInterval needs a function"));
        return Ok(CallResult::returned(Value::Undefined));
    }
    let period = u64::try_from(arg(rest, 0).to_integer()).unwrap_or(0);
    let extra = rest.get(1..).unwrap_or_default().to_vec();

    let (id, name) = vm.next_interval_name();
    vm.create_interval(name, period, callable, this_obj, extra);
    Ok(CallResult::returned(Value::number(f64::from(id))))
}

/// `clearInterval(id)`
pub fn clear_interval(
    vm: &mut VirtualMachine,
    _this: &Value,
    args: &[Value],
) -> Result<CallResult, VmError> {
    let name = arg(args, 0).to_avm_string();
    let cleared = vm.clear_interval(name.as_str());
    Ok(CallResult::returned(Value::Boolean(cleared)))
}
