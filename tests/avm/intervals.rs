//! Interval timers, ticking and pause/resume

use super::*;
use avm::{Opcode, Value};

/// Defines `bump`, which increments the global `count`
fn setup_counter(t: &mut TestVm) -> Value {
    t.vm.global_object().set("count", Value::Integer(0));
    run(
        t,
        define_function(
            "bump",
            &[],
            vec![
                push(vec![s("count"), s("count")]),
                op(Opcode::GetVariable),
                op(Opcode::Increment),
                op(Opcode::SetVariable),
            ],
        ),
    )
    .unwrap();
    t.global("bump")
}

fn count(t: &TestVm) -> i32 {
    t.global("count").to_integer()
}

#[test]
fn test_interval_fires_once_period_has_elapsed() {
    let mut t = create_test_vm();
    let bump = setup_counter(&mut t);
    let this = t.global_this();
    t.vm.create_interval("tick", 1000, bump, this, vec![]);

    t.vm.update_intervals(999).unwrap();
    assert_eq!(count(&t), 0);
    assert_eq!(t.vm.interval("tick").map(|i| i.last_fire), Some(0));

    t.vm.update_intervals(1000).unwrap();
    assert_eq!(count(&t), 1);
    assert_eq!(t.vm.interval("tick").map(|i| i.last_fire), Some(1000));
    assert_eq!(t.vm.last_tick(), 1000);

    // A late tick still fires exactly once
    t.vm.update_intervals(3500).unwrap();
    assert_eq!(count(&t), 2);
    assert_eq!(t.vm.interval("tick").map(|i| i.last_fire), Some(3500));
}

#[test]
fn test_tick_reads_the_clock() {
    let mut t = create_test_vm();
    let bump = setup_counter(&mut t);
    let this = t.global_this();
    t.vm.create_interval("tick", 100, bump, this, vec![]);

    t.clock.set(150);
    t.vm.tick().unwrap();
    assert_eq!(count(&t), 1);
    t.clock.advance(50);
    t.vm.tick().unwrap();
    assert_eq!(count(&t), 1);
    t.clock.advance(50);
    t.vm.tick().unwrap();
    assert_eq!(count(&t), 2);
}

#[test]
fn test_paused_vm_skips_intervals_and_resume_shifts_them() {
    let mut t = create_test_vm();
    let bump = setup_counter(&mut t);
    let this = t.global_this();
    t.vm.create_interval("tick", 1000, bump, this, vec![]);

    t.clock.set(400);
    t.vm.pause();
    t.vm.update_intervals(5000).unwrap();
    assert_eq!(count(&t), 0);

    t.clock.set(2400);
    t.vm.resume();
    assert!(!t.vm.is_paused());
    assert_eq!(t.vm.interval("tick").map(|i| i.last_fire), Some(2000));
    assert_eq!(t.vm.last_tick(), 2000);

    t.vm.update_intervals(2999).unwrap();
    assert_eq!(count(&t), 0);
    t.vm.update_intervals(3000).unwrap();
    assert_eq!(count(&t), 1);
}

#[test]
fn test_clear_interval() {
    let mut t = create_test_vm();
    let bump = setup_counter(&mut t);
    let this = t.global_this();
    t.vm.create_interval("tick", 10, bump, this, vec![]);
    assert!(t.vm.clear_interval("tick"));
    assert!(!t.vm.clear_interval("tick"));
    t.vm.update_intervals(100).unwrap();
    assert_eq!(count(&t), 0);
}

#[test]
fn test_interval_passes_arguments() {
    let mut t = create_test_vm();
    run(
        &mut t,
        define_function(
            "record",
            &["value"],
            vec![
                push(vec![s("recorded"), s("value")]),
                op(Opcode::GetVariable),
                op(Opcode::SetVariable),
            ],
        ),
    )
    .unwrap();
    let record = t.global("record");
    let this = t.global_this();
    t.vm
        .create_interval("args", 5, record, this, vec![Value::string("payload")]);
    t.vm.update_intervals(5).unwrap();
    assert_string(&t.global("recorded"), "payload");
}

#[test]
fn test_set_interval_and_clear_interval_from_script() {
    let mut t = create_test_vm();
    setup_counter(&mut t);

    // id = setInterval(bump, 100)
    let script = vec![
        op(Opcode::EaPushGlobal),
        push(vec![int(100), s("bump")]),
        op(Opcode::GetVariable),
        push(vec![int(2), s("setInterval")]),
        op(Opcode::CallFunction),
        inst(Opcode::EaSetStringMember, vec![s("id")]),
    ];
    run(&mut t, script).unwrap();
    let id = t.global("id");
    assert_number(&id, 1.0);
    assert_eq!(t.vm.interval_count(), 1);

    t.vm.update_intervals(100).unwrap();
    assert_eq!(count(&t), 1);

    run(
        &mut t,
        vec![push(vec![s("id")]), op(Opcode::GetVariable)]
            .into_iter()
            .chain(call_with_stack_arg("clearInterval"))
            .collect(),
    )
    .unwrap();
    assert_eq!(t.vm.interval_count(), 0);
}

#[test]
fn test_set_interval_method_form() {
    let mut t = create_test_vm();
    let bump = setup_counter(&mut t);
    let target = t.vm.new_object();
    target.set("onTick", bump);

    let set_interval = t.global("setInterval");
    let this = t.global_this();
    let args = [
        Value::Object(target),
        Value::string("onTick"),
        Value::Integer(20),
    ];
    let id = t.vm.invoke(&set_interval, &this, &args).unwrap();
    let name = id.to_display_string();
    let state = t.vm.interval(&name).unwrap();
    assert_eq!(state.period, 20);
    assert!(state.this_obj.is_object());

    t.vm.update_intervals(20).unwrap();
    assert_eq!(count(&t), 1);
}

/// Call a one-argument global function whose argument is already on the stack
fn call_with_stack_arg(name: &str) -> Vec<Instruction> {
    vec![push(vec![int(1), s(name)]), op(Opcode::CallFunction), op(Opcode::Pop)]
}
