//! Instruction stream positioning and sub-range extraction

use super::*;
use avm::{ExecutionContext, InstructionStream, Opcode, Value, VmError};

fn sample() -> InstructionStream {
    // positions: 0, 5, 6, 11, 12
    InstructionStream::new(vec![
        Instruction::new(Opcode::PushData, vec![], 5),
        op(Opcode::Pop),
        Instruction::new(Opcode::BranchAlways, vec![int(0)], 5),
        op(Opcode::Pop),
        op(Opcode::End),
    ])
}

#[test]
fn test_branch_offset_zero_stays_on_the_branch() {
    let mut stream = sample();
    stream.seek_index(2);
    stream.branch(0).unwrap();
    assert_eq!(stream.index(), Some(2));
}

#[test]
fn test_branch_to_stream_end_finishes() {
    let mut stream = sample();
    stream.seek_index(2);
    stream.branch(7).unwrap();
    assert!(stream.is_finished());
    assert!(stream.current().is_none());
}

#[test]
fn test_backward_branch() {
    let mut stream = sample();
    stream.seek_index(2);
    stream.branch(-6).unwrap();
    assert_eq!(stream.index(), Some(0));
}

#[test]
fn test_branch_off_boundary_is_a_fault() {
    let mut stream = sample();
    stream.seek_index(2);
    let err = stream.branch(2).unwrap_err();
    assert!(matches!(err, VmError::InvalidBranch { offset: 2, position: 6 }));
    assert_eq!(stream.index(), Some(2));
}

#[test]
fn test_validate_branches_reports_bad_targets() {
    let stream = InstructionStream::new(vec![
        Instruction::new(Opcode::BranchAlways, vec![int(3)], 5),
        op(Opcode::Pop),
    ]);
    assert!(matches!(
        stream.validate_branches(),
        Err(VmError::InvalidBranch { .. })
    ));
}

#[test]
fn test_extract_subrange_off_boundary_is_a_fault() {
    let mut stream = sample();
    assert!(matches!(
        stream.extract_subrange(3, true, false),
        Err(VmError::InvalidSubrange { length: 3, position: 0 })
    ));
    assert_eq!(stream.index(), Some(0));
}

/// Step until the stream runs out, leaving the operand stack intact
fn run_to_end(ctx: &mut ExecutionContext, t: &mut TestVm) {
    while ctx.stream.current().is_some() {
        ctx.step(&mut t.vm).unwrap();
    }
}

#[test]
fn test_carved_body_matches_inline_execution() {
    let body = vec![
        Instruction::new(Opcode::EaPushConstantByte, vec![int(0)], 2),
        push(vec![int(3), int(4)]),
        op(Opcode::Multiply),
        op(Opcode::StringConcat),
        push(vec![Operand::Constant(1)]),
    ];
    let pool: Vec<Value> = vec![Value::string("x"), Value::Integer(9)];

    let mut t = create_test_vm();
    let this = t.global_this();

    let mut inline = t
        .vm
        .create_context("inline", InstructionStream::new(body.clone()), this.clone());
    inline.set_constants(pool.clone().into());
    run_to_end(&mut inline, &mut t);

    let mut outer = vec![op(Opcode::Padding)];
    outer.extend(body.clone());
    outer.push(op(Opcode::End));
    let mut source = InstructionStream::new(outer);
    source.advance();
    let carved = source.extract_subrange(byte_len(&body), true, false).unwrap();
    assert_eq!(source.current().map(|i| i.opcode), Some(Opcode::End));

    let mut fresh = t.vm.create_context("carved", carved, this);
    fresh.set_constants(pool.into());
    run_to_end(&mut fresh, &mut t);

    assert_eq!(inline.stack().len(), fresh.stack().len());
    for (a, b) in inline.stack().iter().zip(fresh.stack()) {
        assert!(a.strict_equals(b), "{a:?} != {b:?}");
    }
    assert!(matches!(inline.stack(), [Value::String(_), Value::Integer(9)]));
}

#[test]
fn test_extract_subrange_appends_end() {
    let mut stream = sample();
    let body = stream.extract_subrange(6, false, true).unwrap();
    assert_eq!(body.len(), 3);
    assert_eq!(
        body.instructions().last().map(|i| i.opcode),
        Some(Opcode::End)
    );
    assert_eq!(stream.index(), Some(0));
}
