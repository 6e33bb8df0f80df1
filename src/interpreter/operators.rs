//! Arithmetic, comparison, bitwise, string and conversion opcodes
//!
//! Binary opcodes pop the right operand (`a`, top of stack) first and the
//! left operand (`b`) second.

use crate::context::ExecutionContext;
use crate::error::VmError;
use crate::value::Value;
use crate::vm::VirtualMachine;

/// Pop `a` then `b`, push `op(b, a)`
pub(super) fn binary(
    ctx: &mut ExecutionContext,
    vm: &VirtualMachine,
    op: impl FnOnce(Value, Value) -> Value,
) {
    let a = ctx.pop(vm);
    let b = ctx.pop(vm);
    ctx.push(op(b, a));
}

/// Pop one value, push `op(value)`
pub(super) fn unary(
    ctx: &mut ExecutionContext,
    vm: &VirtualMachine,
    op: impl FnOnce(Value) -> Value,
) {
    let a = ctx.pop(vm);
    ctx.push(op(a));
}

// ═══════════════════════════════════════════════════════════════════════════════
// Numbers
// ═══════════════════════════════════════════════════════════════════════════════

pub(super) fn divide(b: &Value, a: &Value) -> Value {
    let divisor = a.to_float();
    if divisor == 0.0 {
        Value::Float(f64::NAN)
    } else {
        Value::number(b.to_float() / divisor)
    }
}

/// Legacy `LessThan`: numeric, with NaN read as 0
pub(super) fn legacy_less(b: &Value, a: &Value) -> Value {
    let zero_nan = |f: f64| if f.is_nan() { 0.0 } else { f };
    Value::Boolean(zero_nan(b.to_float()) < zero_nan(a.to_float()))
}

/// Legacy `Equals`: numeric equality
pub(super) fn legacy_equals(b: &Value, a: &Value) -> Value {
    Value::Boolean(b.to_float() == a.to_float())
}

pub(super) fn shift_left(b: &Value, a: &Value) -> Value {
    Value::Integer(b.to_integer().wrapping_shl(shift_count(a)))
}

pub(super) fn shift_right(b: &Value, a: &Value) -> Value {
    Value::Integer(b.to_integer().wrapping_shr(shift_count(a)))
}

/// Unsigned right shift; results above `i32::MAX` stay exact as floats
pub(super) fn shift_right_unsigned(b: &Value, a: &Value) -> Value {
    let shifted = u32::from_ne_bytes(b.to_integer().to_ne_bytes()) >> shift_count(a);
    match i32::try_from(shifted) {
        Ok(i) => Value::Integer(i),
        Err(_) => Value::Float(f64::from(shifted)),
    }
}

fn shift_count(a: &Value) -> u32 {
    u32::try_from(a.to_integer() & 0x1f).unwrap_or(0)
}

/// Integer in `[0, max)` from the VM's random provider
pub(super) fn random(vm: &mut VirtualMachine, max: &Value) -> Value {
    let max = max.to_integer();
    if max <= 0 {
        return Value::Integer(0);
    }
    let scaled = (vm.random() * f64::from(max)).floor();
    Value::Integer((scaled as i32).clamp(0, max - 1))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Strings
// ═══════════════════════════════════════════════════════════════════════════════

pub(super) fn concat(b: &Value, a: &Value) -> Value {
    Value::string(format!("{}{}", b.to_avm_string(), a.to_avm_string()))
}

/// Length in bytes
pub(super) fn byte_length(a: &Value) -> Value {
    Value::Integer(i32::try_from(a.to_avm_string().len()).unwrap_or(i32::MAX))
}

/// Length in characters
pub(super) fn char_length(a: &Value) -> Value {
    Value::Integer(i32::try_from(a.to_avm_string().char_count()).unwrap_or(i32::MAX))
}

/// Pops count, then the 1-based start index, then the string
pub(super) fn substring(ctx: &mut ExecutionContext, vm: &VirtualMachine) {
    let count = ctx.pop(vm).to_integer();
    let index = ctx.pop(vm).to_integer();
    let source = ctx.pop(vm).to_avm_string();

    let start = usize::try_from(index.saturating_sub(1)).unwrap_or(0);
    let extracted: String = match usize::try_from(count) {
        Ok(count) => source.as_str().chars().skip(start).take(count).collect(),
        // A negative count takes the rest of the string
        Err(_) => source.as_str().chars().skip(start).collect(),
    };
    ctx.push(Value::string(extracted));
}

/// First byte of the string, 0 when empty
pub(super) fn byte_ord(a: &Value) -> Value {
    let s = a.to_avm_string();
    Value::Integer(s.as_str().bytes().next().map_or(0, i32::from))
}

/// Code point of the first character, 0 when empty
pub(super) fn char_ord(a: &Value) -> Value {
    let s = a.to_avm_string();
    let code = s.as_str().chars().next().map_or(0, u32::from);
    Value::Integer(i32::try_from(code).unwrap_or(0))
}

/// Single-byte character for the low 8 bits of the code
pub(super) fn byte_chr(a: &Value) -> Value {
    let code = a.to_integer() & 0xff;
    let ch = u8::try_from(code).map(char::from).unwrap_or_default();
    Value::string(ch.to_string())
}

/// Character for a code point; invalid code points give the empty string
pub(super) fn char_chr(a: &Value) -> Value {
    let ch = u32::try_from(a.to_integer()).ok().and_then(char::from_u32);
    Value::string(ch.map(String::from).unwrap_or_default())
}

pub(super) fn string_less(b: &Value, a: &Value) -> Value {
    Value::Boolean(b.to_avm_string() < a.to_avm_string())
}

pub(super) fn string_greater(b: &Value, a: &Value) -> Value {
    Value::Boolean(b.to_avm_string() > a.to_avm_string())
}

pub(super) fn string_equals(b: &Value, a: &Value) -> Value {
    Value::Boolean(b.to_avm_string() == a.to_avm_string())
}

// ═══════════════════════════════════════════════════════════════════════════════
// Coercing opcodes
// ═══════════════════════════════════════════════════════════════════════════════

/// `Add2`, `Equals2`, `ToNumber` and `ToString` may call `valueOf`/`toString`,
/// so their results go through the frame's continuation queue.
pub(super) fn add2(ctx: &mut ExecutionContext, vm: &mut VirtualMachine) -> Result<(), VmError> {
    let a = ctx.pop(vm);
    let b = ctx.pop(vm);
    let result = vm.add_values(b, a)?;
    ctx.push_result(result);
    Ok(())
}

pub(super) fn equals2(ctx: &mut ExecutionContext, vm: &mut VirtualMachine) -> Result<(), VmError> {
    let a = ctx.pop(vm);
    let b = ctx.pop(vm);
    let result = vm.abstract_equals(b, a)?;
    ctx.push_result(result);
    Ok(())
}

pub(super) fn to_number(ctx: &mut ExecutionContext, vm: &mut VirtualMachine) -> Result<(), VmError> {
    let a = ctx.pop(vm);
    let result = vm.to_number(&a)?;
    ctx.push_result(result);
    Ok(())
}

pub(super) fn to_string(ctx: &mut ExecutionContext, vm: &mut VirtualMachine) -> Result<(), VmError> {
    let a = ctx.pop(vm);
    let result = vm.to_string_value(&a)?;
    ctx.push_result(result);
    Ok(())
}
