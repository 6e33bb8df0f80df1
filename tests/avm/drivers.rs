//! Stepping drivers, the work queue, breakpoints and uncaught exceptions

use super::*;
use avm::{DiagnosticLevel, InstructionStream, Opcode, Value, VmError, VmOptions};

/// Root script appending `tag` to the global `trail`
fn tagger(tag: &str) -> InstructionStream {
    InstructionStream::new(vec![
        push(vec![s("trail"), s("trail")]),
        op(Opcode::GetVariable),
        push(vec![s(tag)]),
        op(Opcode::StringConcat),
        op(Opcode::SetVariable),
    ])
}

fn trail(t: &TestVm) -> String {
    t.global("trail").to_display_string()
}

#[test]
fn test_execute_once_steps_one_instruction() {
    let mut t = create_test_vm();
    let this = t.global_this();
    let ctx = t.vm.create_context("once", tagger("a"), this);
    t.vm.push_context(ctx);
    assert_eq!(t.vm.execute_once(false).unwrap(), Some(Opcode::PushData));
    assert_eq!(t.vm.execute_once(false).unwrap(), Some(Opcode::GetVariable));
    assert_eq!(t.vm.call_depth(), 2);
}

#[test]
fn test_execute_once_on_global_frame_does_nothing() {
    let mut t = create_test_vm();
    assert_eq!(t.vm.execute_once(false).unwrap(), None);
    assert!(t.vm.is_current_global());
}

#[test]
fn test_execute_until_halt_stops_after_top_frame() {
    let mut t = create_test_vm();
    t.vm.global_object().set("trail", Value::string(""));
    let this = t.global_this();
    let lower = t.vm.create_context("lower", tagger("L"), this.clone());
    let upper = t.vm.create_context("upper", tagger("U"), this);
    t.vm.push_context(lower);
    t.vm.push_context(upper);

    t.vm.execute_until_halt().unwrap();
    assert_eq!(trail(&t), "U");
    assert_eq!(t.vm.call_depth(), 2);

    t.vm.execute_until_global().unwrap();
    assert_eq!(trail(&t), "UL");
    assert!(t.vm.is_current_global());
}

#[test]
fn test_execute_until_empty_promotes_queue_in_order() {
    let mut t = create_test_vm();
    t.vm.global_object().set("trail", Value::string(""));
    let this = t.global_this();
    for tag in ["1", "2", "3"] {
        let ctx = t.vm.create_context(tag, tagger(tag), this.clone());
        t.vm.enqueue_context(ctx);
    }
    assert_eq!(t.vm.dump_work_queue().len(), 3);
    t.vm.execute_until_empty().unwrap();
    assert_eq!(trail(&t), "123");
    assert_eq!(t.vm.work_queue_len(), 0);
}

#[test]
fn test_queued_outermost_context_is_discarded() {
    let mut t = create_test_vm();
    t.vm.global_object().set("trail", Value::string(""));
    let this = t.global_this();
    let mut ctx = t.vm.create_context("root", tagger("x"), this);
    ctx.set_outermost(true);
    t.vm.enqueue_context(ctx);
    t.vm.execute_until_empty().unwrap();
    assert_eq!(trail(&t), "");
    assert!(t.warnings().iter().any(|w| w.contains("outermost")));
}

#[test]
fn test_outermost_frame_counts_as_global() {
    let mut t = create_test_vm();
    let this = t.global_this();
    let mut ctx = t.vm.create_context("root", tagger("x"), this);
    ctx.set_outermost(true);
    t.vm.push_context(ctx);
    assert!(t.vm.is_current_global());
    t.vm.execute_until_empty().unwrap();
    assert_eq!(t.vm.call_depth(), 1);
}

#[test]
fn test_popping_global_frame_is_a_fault() {
    let mut t = create_test_vm();
    assert!(matches!(t.vm.pop_context(), Err(VmError::GlobalFramePop)));
}

#[test]
fn test_breakpoint_pauses_once() {
    let mut t = create_test_vm();
    let script = vec![push(vec![int(1)]).with_breakpoint(), op(Opcode::Pop)];
    let this = t.global_this();
    let ctx = t.vm.create_context("bp", InstructionStream::new(script), this);
    t.vm.push_context(ctx);

    assert_eq!(t.vm.execute_once(false).unwrap(), None);
    assert!(t.vm.is_paused());
    t.vm.resume();
    assert_eq!(t.vm.execute_once(false).unwrap(), Some(Opcode::PushData));
    assert_eq!(t.vm.execute_once(false).unwrap(), Some(Opcode::Pop));
}

#[test]
fn test_breakpoints_can_be_ignored() {
    let mut t = create_test_vm_with(VmOptions::new().with_ignore_breakpoints(true));
    let script = vec![push(vec![int(1)]).with_breakpoint(), op(Opcode::Pop)];
    run(&mut t, script).unwrap();
    assert!(!t.vm.is_paused());
    assert_eq!(t.vm.call_depth(), 1);
}

#[test]
fn test_uncaught_throw_unwinds_to_global() {
    let mut t = create_test_vm();
    t.vm.global_object().set("trail", Value::string(""));
    let mut script = define_function(
        "fail",
        &[],
        vec![push(vec![s("boom")]), op(Opcode::Throw)],
    );
    script.extend(call("fail", vec![]));
    script.extend(tagger("after").instructions().iter().cloned());

    let err = run(&mut t, script).unwrap_err();
    assert!(matches!(err, VmError::UncaughtException { ref message } if message == "boom"));
    assert_eq!(t.vm.call_depth(), 1);
    assert_eq!(trail(&t), "");
    assert_string(t.vm.last_uncaught().unwrap(), "boom");
    let errors = t.diagnostics.messages(DiagnosticLevel::Error);
    assert!(errors.iter().any(|e| e.contains("boom")));
}

#[test]
fn test_vm_continues_after_uncaught_throw() {
    let mut t = create_test_vm();
    let err = run(&mut t, vec![push(vec![s("first")]), op(Opcode::Throw)]);
    assert!(err.is_err());
    run(&mut t, vec![push(vec![s("ok"), int(1)]), op(Opcode::SetVariable)]).unwrap();
    assert_number(&t.global("ok"), 1.0);
}

#[test]
fn test_invalid_register_is_a_fault() {
    let mut t = create_test_vm();
    let err = run(&mut t, vec![reg(Opcode::EaPushRegister, 99)]).unwrap_err();
    assert!(matches!(err, VmError::InvalidRegister { index: 99, .. }));
}

#[test]
fn test_invalid_constant_is_a_fault() {
    let mut t = create_test_vm();
    let err = run(&mut t, vec![push(vec![Operand::Constant(3)])]).unwrap_err();
    assert!(matches!(err, VmError::InvalidConstant { index: 3, count: 0 }));
}

#[test]
fn test_invoke_returns_script_result() {
    let mut t = create_test_vm();
    run(
        &mut t,
        define_function("seven", &[], vec![push(vec![int(7)]), op(Opcode::Return)]),
    )
    .unwrap();
    let seven = t.global("seven");
    let this = t.global_this();
    assert_number(&t.vm.invoke(&seven, &this, &[]).unwrap(), 7.0);
    assert_eq!(t.vm.call_depth(), 1);
}

#[test]
fn test_invoke_surfaces_script_throw() {
    let mut t = create_test_vm();
    run(
        &mut t,
        define_function("fail", &[], vec![push(vec![s("nope")]), op(Opcode::Throw)]),
    )
    .unwrap();
    let fail = t.global("fail");
    let this = t.global_this();
    let err = t.vm.invoke(&fail, &this, &[]).unwrap_err();
    assert!(err.is_uncaught());
}

#[test]
fn test_invoke_while_paused_is_suspended() {
    let mut t = create_test_vm();
    run(
        &mut t,
        define_function("seven", &[], vec![push(vec![int(7)]), op(Opcode::Return)]),
    )
    .unwrap();
    let seven = t.global("seven");
    let this = t.global_this();
    t.vm.pause();
    assert!(matches!(
        t.vm.invoke(&seven, &this, &[]),
        Err(VmError::Suspended)
    ));
}

#[test]
fn test_enqueue_call_runs_native_activation() {
    let mut t = create_test_vm();
    let set_interval = t.global("setInterval");
    let seven = {
        run(
            &mut t,
            define_function("seven", &[], vec![push(vec![int(7)]), op(Opcode::Return)]),
        )
        .unwrap();
        t.global("seven")
    };
    let this = t.global_this();
    t.vm
        .enqueue_call(&set_interval, &this, &[seven, Value::Integer(50)])
        .unwrap();
    assert_eq!(t.vm.interval_count(), 0);
    t.vm.execute_until_empty().unwrap();
    assert_eq!(t.vm.interval_count(), 1);
}

#[test]
fn test_dump_call_stack_lists_top_first() {
    let mut t = create_test_vm();
    let this = t.global_this();
    let ctx = t.vm.create_context("visible", tagger("v"), this);
    t.vm.push_context(ctx);
    let dump = t.vm.dump_call_stack();
    assert_eq!(dump.len(), 2);
    assert!(dump.first().is_some_and(|d| d.contains("visible")));
    assert!(dump.last().is_some_and(|d| d.contains("Global")));
}
