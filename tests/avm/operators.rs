//! Arithmetic, comparison, string and conversion opcodes

use super::*;
use avm::{Opcode, Value};

// ═══════════════════════════════════════════════════════════════════════════════
// Arithmetic
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_add2_numbers() {
    let result = eval(vec![push(vec![int(40), int(2)]), op(Opcode::Add2)]);
    assert_number(&result, 42.0);
}

#[test]
fn test_add2_concatenates_when_either_side_is_a_string() {
    let result = eval(vec![push(vec![s("n="), int(7)]), op(Opcode::Add2)]);
    assert_string(&result, "n=7");
}

#[test]
fn test_operand_order_for_subtract_and_modulo() {
    let diff = eval(vec![push(vec![int(10), int(3)]), op(Opcode::Subtract)]);
    assert_number(&diff, 7.0);
    let rem = eval(vec![push(vec![int(10), int(3)]), op(Opcode::Modulo)]);
    assert_number(&rem, 1.0);
}

#[test]
fn test_divide_by_zero_is_nan() {
    let result = eval(vec![push(vec![int(1), int(0)]), op(Opcode::Divide)]);
    assert!(result.to_float().is_nan());
}

#[test]
fn test_increment_and_bitwise() {
    let inc = eval(vec![push(vec![int(41)]), op(Opcode::Increment)]);
    assert_number(&inc, 42.0);
    let and = eval(vec![push(vec![int(0b1100), int(0b1010)]), op(Opcode::BitwiseAnd)]);
    assert_number(&and, 8.0);
    let shr = eval(vec![push(vec![int(-1), int(28)]), op(Opcode::ShiftRight2)]);
    assert_number(&shr, 15.0);
}

// ═══════════════════════════════════════════════════════════════════════════════
// Comparison
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_less_than2_and_greater() {
    let less = eval(vec![push(vec![int(1), int(2)]), op(Opcode::LessThan2)]);
    assert!(matches!(less, Value::Boolean(true)));
    let greater = eval(vec![push(vec![int(1), int(2)]), op(Opcode::Greater)]);
    assert!(matches!(greater, Value::Boolean(false)));
}

#[test]
fn test_less_than2_with_nan_is_undefined() {
    let result = eval(vec![push(vec![s("abc"), int(2)]), op(Opcode::LessThan2)]);
    assert!(result.is_undefined());
}

#[test]
fn test_equals2_coerces_strings_and_numbers() {
    let result = eval(vec![push(vec![s("5"), int(5)]), op(Opcode::Equals2)]);
    assert!(matches!(result, Value::Boolean(true)));
    let strict = eval(vec![push(vec![s("5"), int(5)]), op(Opcode::StrictEquals)]);
    assert!(matches!(strict, Value::Boolean(false)));
}

#[test]
fn test_equals2_null_and_undefined() {
    let result = eval(vec![
        push(vec![Operand::Null, Operand::Undefined]),
        op(Opcode::Equals2),
    ]);
    assert!(matches!(result, Value::Boolean(true)));
}

// ═══════════════════════════════════════════════════════════════════════════════
// Strings
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_substring_is_one_based() {
    let result = eval(vec![
        push(vec![s("bytecode"), int(5), int(4)]),
        op(Opcode::SubString),
    ]);
    assert_string(&result, "code");
}

#[test]
fn test_length_opcodes_count_bytes_and_chars() {
    let bytes = eval(vec![push(vec![s("héllo")]), op(Opcode::StringLength)]);
    assert_number(&bytes, 6.0);
    let chars = eval(vec![push(vec![s("héllo")]), op(Opcode::MbLength)]);
    assert_number(&chars, 5.0);
}

#[test]
fn test_typeof() {
    let result = eval(vec![push(vec![Operand::Null]), op(Opcode::TypeOf)]);
    assert_string(&result, "null");
}

// ═══════════════════════════════════════════════════════════════════════════════
// Control flow
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_counting_loop_with_registers() {
    // r1 = counter, r2 = sum; sum 0..5
    let init = vec![
        push(vec![int(0)]),
        reg(Opcode::SetRegister, 1),
        op(Opcode::Pop),
        push(vec![int(0)]),
        reg(Opcode::SetRegister, 2),
        op(Opcode::Pop),
    ];
    let cond = vec![
        reg(Opcode::EaPushRegister, 1),
        push(vec![int(5)]),
        op(Opcode::LessThan2),
    ];
    let body = vec![
        reg(Opcode::EaPushRegister, 2),
        reg(Opcode::EaPushRegister, 1),
        op(Opcode::Add2),
        reg(Opcode::SetRegister, 2),
        op(Opcode::Pop),
        reg(Opcode::EaPushRegister, 1),
        op(Opcode::Increment),
        reg(Opcode::SetRegister, 1),
        op(Opcode::Pop),
    ];
    let exit = 5 + byte_len(&body) + 5;
    let back = byte_len(&cond) + 5 + byte_len(&body);

    let mut script = init;
    script.extend(cond);
    script.push(branch(Opcode::EaBranchIfFalse, exit, false));
    script.extend(body);
    script.push(branch(Opcode::BranchAlways, back, true));
    script.push(push(vec![s("total")]));
    script.push(reg(Opcode::EaPushRegister, 2));
    script.push(op(Opcode::SetVariable));

    let mut t = create_test_vm();
    run(&mut t, script).unwrap();
    assert_number(&t.global("total"), 10.0);
}

#[test]
fn test_constant_pool_feeds_push_constant() {
    let result = eval(vec![
        inst(Opcode::ConstantPool, vec![s("alpha"), s("beta")]),
        Instruction::new(Opcode::EaPushConstantByte, vec![int(1)], 2),
    ]);
    assert_string(&result, "beta");
}

#[test]
fn test_pop_from_empty_stack_warns() {
    let mut t = create_test_vm();
    run(&mut t, vec![op(Opcode::Pop)]).unwrap();
    assert!(t.warnings().iter().any(|w| w.contains("empty operand stack")));
}
