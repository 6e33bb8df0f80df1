//! Continuation queue ordering and recall chains

use std::cell::RefCell;
use std::rc::Rc;

use super::*;
use avm::{CallResult, InstructionStream, Opcode, Outcome, Value};

type Log = Rc<RefCell<Vec<&'static str>>>;

/// Settled result whose recall records `label` and passes the value through
fn logged(log: &Log, label: &'static str, value: i32) -> CallResult {
    let log = log.clone();
    CallResult::returned(Value::Integer(value)).then(move |_, v| {
        log.borrow_mut().push(label);
        Ok(Some(CallResult::returned(v)))
    })
}

fn stack_integers(values: &[Value]) -> Vec<i32> {
    values.iter().map(|v| v.to_integer()).collect()
}

#[test]
fn test_drain_runs_in_fifo_order() {
    let mut t = create_test_vm();
    let this = t.global_this();
    let mut ctx = t.vm.create_context("queue", InstructionStream::default(), this);
    let log = Log::default();

    ctx.enqueue(logged(&log, "A", 1));
    ctx.enqueue(logged(&log, "B", 2));
    ctx.enqueue(logged(&log, "C", 3));
    assert_eq!(ctx.pending_count(), 3);
    ctx.drain_continuations(&mut t.vm).unwrap();

    assert_eq!(*log.borrow(), vec!["A", "B", "C"]);
    assert_eq!(stack_integers(ctx.stack()), vec![1, 2, 3]);
    assert!(!ctx.has_pending());
}

#[test]
fn test_result_spawned_by_recall_runs_before_the_rest() {
    let mut t = create_test_vm();
    let this = t.global_this();
    let mut ctx = t.vm.create_context("queue", InstructionStream::default(), this);
    let log = Log::default();

    let spawned = log.clone();
    let b = {
        let log = log.clone();
        CallResult::returned(Value::Integer(2)).then(move |_, _| {
            log.borrow_mut().push("B");
            Ok(Some(logged(&spawned, "D", 4)))
        })
    };
    ctx.enqueue(logged(&log, "A", 1));
    ctx.enqueue(b);
    ctx.enqueue(logged(&log, "C", 3));
    ctx.drain_continuations(&mut t.vm).unwrap();

    assert_eq!(*log.borrow(), vec!["A", "B", "D", "C"]);
    assert_eq!(stack_integers(ctx.stack()), vec![1, 4, 3]);
}

#[test]
fn test_pending_call_blocks_later_continuations() {
    let mut t = create_test_vm();
    run(
        &mut t,
        define_function("nine", &[], vec![push(vec![int(9)]), op(Opcode::Return)]),
    )
    .unwrap();
    let nine = t.global("nine");

    let log = Log::default();
    let this = t.global_this();
    let mut ctx = t.vm.create_context(
        "caller",
        InstructionStream::new(vec![op(Opcode::Padding), op(Opcode::Padding)]),
        this.clone(),
    );
    let b = {
        let log = log.clone();
        let after = log.clone();
        CallResult::returned(Value::Undefined).then(move |vm, _| {
            log.borrow_mut().push("B");
            let call = vm.call_function(&nine, &this, &[])?;
            Ok(Some(call.then(move |_, v| {
                after.borrow_mut().push("D");
                Ok(Some(CallResult::returned(v)))
            })))
        })
    };
    ctx.enqueue(logged(&log, "A", 1));
    ctx.enqueue(b);
    ctx.enqueue(logged(&log, "C", 3));
    t.vm.push_context(ctx);

    t.vm.execute_once(false).unwrap();
    assert_eq!(*log.borrow(), vec!["A", "B"]);
    assert_eq!(t.vm.call_depth(), 3);
    let caller = t.vm.dump_call_stack();
    assert!(caller.first().is_some_and(|top| top.contains("nine")));

    while t.vm.call_depth() > 2 {
        t.vm.execute_once(false).unwrap();
    }
    assert_eq!(*log.borrow(), vec!["A", "B", "D", "C"]);
    let top = t.vm.current_context().unwrap();
    assert_eq!(stack_integers(top.stack()), vec![1, 9, 3]);
}

#[test]
fn test_thrown_result_abandons_remaining_recall() {
    let mut t = create_test_vm();
    let log = Log::default();
    let inner = log.clone();
    let result = CallResult::thrown(Value::string("bad")).then(move |_, _| {
        inner.borrow_mut().push("never");
        Ok(None)
    });
    let settled = result.execute_recall(&mut t.vm).unwrap().unwrap();
    assert!(matches!(settled.outcome(), Outcome::Throw(Value::String(_))));
    assert!(log.borrow().is_empty());
}

#[test]
fn test_discard_pushes_nothing() {
    let mut t = create_test_vm();
    let this = t.global_this();
    let mut ctx = t.vm.create_context("queue", InstructionStream::default(), this);
    ctx.push_result(CallResult::returned(Value::Integer(5)).discard());
    ctx.push_result(CallResult::returned(Value::Integer(6)));
    ctx.drain_continuations(&mut t.vm).unwrap();
    assert_eq!(stack_integers(ctx.stack()), vec![6]);
}

#[test]
fn test_normal_completion_in_queue_is_reported() {
    let mut t = create_test_vm();
    let this = t.global_this();
    let mut ctx = t.vm.create_context("queue", InstructionStream::default(), this);
    ctx.enqueue(CallResult::normal(Value::Undefined));
    ctx.drain_continuations(&mut t.vm).unwrap();
    assert!(ctx.stack().is_empty());
    assert!(t.warnings().iter().any(|w| w.contains("without a result")));
}
