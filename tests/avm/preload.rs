//! Register preloading and named bindings of `DefineFunction2` activations

use super::*;
use avm::{Opcode, PreloadFlags, Value};

/// Store the value pushed by `load` into `global[name]`
fn export(name: &str, load: Instruction) -> Vec<Instruction> {
    vec![
        op(Opcode::EaPushGlobal),
        load,
        inst(Opcode::EaSetStringMember, vec![s(name)]),
    ]
}

fn export_variable(name: &str, variable: &str) -> Vec<Instruction> {
    vec![
        op(Opcode::EaPushGlobal),
        push(vec![s(variable)]),
        op(Opcode::GetVariable),
        inst(Opcode::EaSetStringMember, vec![s(name)]),
    ]
}

#[test]
fn test_preload_this_and_arguments() {
    let mut t = create_test_vm();
    let mut body = export("reg_this", reg(Opcode::EaPushRegister, 1));
    body.extend(export("reg_args", reg(Opcode::EaPushRegister, 2)));
    body.extend(export_variable("named_this", "this"));
    body.extend(export_variable("named_args", "arguments"));
    let flags = PreloadFlags::PRELOAD_THIS | PreloadFlags::PRELOAD_ARGUMENTS;
    run(&mut t, define_function2("probe", 3, flags, &[], body)).unwrap();

    let receiver = Value::Object(t.vm.new_object());
    let probe = t.global("probe");
    t.vm
        .invoke(&probe, &receiver, &[Value::Integer(7), Value::string("x")])
        .unwrap();

    assert!(t.global("reg_this").strict_equals(&receiver));
    assert!(t.global("named_this").strict_equals(&receiver));

    let args = t.global("reg_args");
    let elements = args.as_object().and_then(|o| o.array_elements()).unwrap();
    assert!(matches!(elements.as_slice(), [Value::Integer(7), Value::String(_)]));
    assert_eq!(elements.get(1).and_then(|v| v.as_str()), Some("x"));
    assert!(t.global("named_args").strict_equals(&args));
}

#[test]
fn test_suppressed_arguments_are_not_bound() {
    let mut t = create_test_vm();
    let body = vec![
        push(vec![s("arguments")]),
        op(Opcode::GetVariable),
        op(Opcode::TypeOf),
        op(Opcode::Return),
    ];
    let flags = PreloadFlags::PRELOAD_THIS | PreloadFlags::SUPPRESS_ARGUMENTS;
    run(&mut t, define_function2("quiet", 2, flags, &[], body)).unwrap();

    let quiet = t.global("quiet");
    let this = t.global_this();
    let kind = t.vm.invoke(&quiet, &this, &[Value::Integer(1)]).unwrap();
    assert_string(&kind, "undefined");
}

#[test]
fn test_preloads_fill_registers_in_fixed_order() {
    let mut t = create_test_vm();
    // this -> r1, global -> r2, extern -> r3
    let mut body = export("r1", reg(Opcode::EaPushRegister, 1));
    body.extend(export("r2", reg(Opcode::EaPushRegister, 2)));
    body.extend(export("r3", reg(Opcode::EaPushRegister, 3)));
    let flags = PreloadFlags::PRELOAD_EXTERN
        | PreloadFlags::PRELOAD_GLOBAL
        | PreloadFlags::PRELOAD_THIS
        | PreloadFlags::SUPPRESS_ARGUMENTS;
    run(&mut t, define_function2("order", 0, flags, &[], body)).unwrap();

    let order = t.global("order");
    let receiver = Value::Object(t.vm.new_object());
    t.vm.invoke(&order, &receiver, &[]).unwrap();

    assert!(t.global("r1").strict_equals(&receiver));
    assert!(t.global("r2").strict_equals(&t.global_this()));
    let extern_obj = Value::Object(t.vm.extern_object().clone());
    assert!(t.global("r3").strict_equals(&extern_obj));
}

#[test]
fn test_register_and_named_parameters() {
    let mut t = create_test_vm();
    let body = vec![
        reg(Opcode::EaPushRegister, 1),
        push(vec![s("label")]),
        op(Opcode::GetVariable),
        op(Opcode::Add2),
        op(Opcode::Return),
    ];
    let flags = PreloadFlags::SUPPRESS_THIS | PreloadFlags::SUPPRESS_ARGUMENTS;
    run(
        &mut t,
        define_function2("pair", 2, flags, &[(1, "count"), (0, "label")], body),
    )
    .unwrap();

    let pair = t.global("pair");
    let this = t.global_this();
    let result = t
        .vm
        .invoke(&pair, &this, &[Value::Integer(3), Value::string(" items")])
        .unwrap();
    assert_string(&result, "3 items");
}

#[test]
fn test_super_is_grandparent_prototype() {
    let mut t = create_test_vm();
    let body = export_variable("seen_super", "super");
    let flags = PreloadFlags::SUPPRESS_THIS | PreloadFlags::SUPPRESS_ARGUMENTS;
    run(&mut t, define_function2("up", 1, flags, &[], body)).unwrap();

    let base = t.vm.new_object();
    let middle = t.vm.new_object();
    middle.set_prototype(Some(base.clone()));
    let receiver = t.vm.new_object();
    receiver.set_prototype(Some(middle));

    let up = t.global("up");
    t.vm.invoke(&up, &Value::Object(receiver), &[]).unwrap();
    assert!(t.global("seen_super").strict_equals(&Value::Object(base)));
}
