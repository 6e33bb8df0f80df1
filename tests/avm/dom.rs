//! Stage opcodes and the DOM handler boundary

use std::cell::RefCell;
use std::rc::Rc;

use super::*;
use avm::{
    DomHandler, ExecutionContext, InstructionStream, NullDom, Object, ObjectRef, Opcode, Value,
    VirtualMachine, VmError, VmOptions,
};

/// Host stand-in that plays and stops, answers `GetProperty` and records
/// URL traffic
#[derive(Default)]
struct StageHost {
    handled: RefCell<Vec<Opcode>>,
    commands: RefCell<Vec<(String, String)>>,
    loads: RefCell<Vec<String>>,
    root: RefCell<Option<ObjectRef>>,
}

impl DomHandler for StageHost {
    fn try_handle(
        &self,
        vm: &mut VirtualMachine,
        ctx: &mut ExecutionContext,
        instruction: &Instruction,
    ) -> Result<bool, VmError> {
        match instruction.opcode {
            Opcode::Play | Opcode::Stop => {
                self.handled.borrow_mut().push(instruction.opcode);
                Ok(true)
            }
            Opcode::GetProperty => {
                let _property = ctx.pop(vm);
                let _target = ctx.pop(vm);
                ctx.push(Value::Integer(100));
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn fs_command(
        &self,
        _vm: &mut VirtualMachine,
        _ctx: &mut ExecutionContext,
        command: &str,
        args: &str,
    ) {
        self.commands
            .borrow_mut()
            .push((command.to_string(), args.to_string()));
    }

    fn load_movie(
        &self,
        _vm: &mut VirtualMachine,
        target: &ObjectRef,
        url: &str,
    ) -> Result<(), VmError> {
        self.loads.borrow_mut().push(url.to_string());
        target.set_instance_name("loading");
        Ok(())
    }

    fn resolve_variable(&self, name: &str) -> Value {
        match name {
            "version" => Value::string("AVM 1"),
            _ => Value::Undefined,
        }
    }

    fn root(&self) -> Option<ObjectRef> {
        self.root.borrow().clone()
    }
}

fn stage_vm() -> (TestVm, Rc<StageHost>) {
    let host = Rc::new(StageHost::default());
    let t = create_test_vm_with(VmOptions::new().with_dom_handler(host.clone()));
    (t, host)
}

fn sprite(t: &TestVm, name: &str) -> ObjectRef {
    ObjectRef::new(Object::stage(Some(t.vm.object_prototype()), name))
}

#[test]
fn test_stage_opcode_without_handler_is_unhandled() {
    let mut t = create_test_vm();
    let err = run(&mut t, vec![op(Opcode::Play)]).unwrap_err();
    assert_eq!(err, VmError::UnhandledOpcode(Opcode::Play));
}

#[test]
fn test_null_dom_declines_everything() {
    let mut t = create_test_vm_with(VmOptions::new().with_dom_handler(Rc::new(NullDom)));
    let err = run(&mut t, vec![op(Opcode::TraceStart)]).unwrap_err();
    assert_eq!(err, VmError::UnhandledOpcode(Opcode::TraceStart));
}

#[test]
fn test_handler_receives_stage_opcodes() {
    let (mut t, host) = stage_vm();
    run(&mut t, vec![op(Opcode::Play), op(Opcode::Stop)]).unwrap();
    assert_eq!(*host.handled.borrow(), vec![Opcode::Play, Opcode::Stop]);
}

#[test]
fn test_handler_can_use_the_operand_stack() {
    let (mut t, _host) = stage_vm();
    run(
        &mut t,
        vec![
            push(vec![s("width"), s("/"), int(8)]),
            op(Opcode::GetProperty),
            op(Opcode::SetVariable),
        ],
    )
    .unwrap();
    assert_number(&t.global("width"), 100.0);
}

#[test]
fn test_declined_stage_opcode_is_unhandled() {
    let (mut t, _host) = stage_vm();
    let err = run(&mut t, vec![op(Opcode::NextFrame)]).unwrap_err();
    assert_eq!(err, VmError::UnhandledOpcode(Opcode::NextFrame));
}

#[test]
fn test_try_and_with_are_unhandled_even_with_a_handler() {
    let (mut t, _host) = stage_vm();
    let err = run(&mut t, vec![op(Opcode::Try)]).unwrap_err();
    assert_eq!(err, VmError::UnhandledOpcode(Opcode::Try));

    let (mut t, _host) = stage_vm();
    let err = run(&mut t, vec![op(Opcode::With)]).unwrap_err();
    assert_eq!(err, VmError::UnhandledOpcode(Opcode::With));
}

#[test]
fn test_get_url_fs_command() {
    let (mut t, host) = stage_vm();
    run(
        &mut t,
        vec![inst(Opcode::GetUrl, vec![s("FSCommand:quit"), s("true")])],
    )
    .unwrap();
    assert_eq!(
        *host.commands.borrow(),
        vec![("quit".to_string(), "true".to_string())]
    );
}

#[test]
fn test_get_url2_pops_url_and_target() {
    let (mut t, host) = stage_vm();
    run(
        &mut t,
        vec![
            push(vec![s("FSCommand:fullscreen"), s("false")]),
            op(Opcode::GetUrl2),
        ],
    )
    .unwrap();
    assert_eq!(
        *host.commands.borrow(),
        vec![("fullscreen".to_string(), "false".to_string())]
    );
}

#[test]
fn test_get_url_loads_into_this_sprite_keeping_its_name() {
    let (mut t, host) = stage_vm();
    let clip = sprite(&t, "clip1");
    let stream = InstructionStream::new(vec![inst(
        Opcode::GetUrl,
        vec![s("movie.swf"), s("")],
    )]);
    let ctx = t
        .vm
        .create_context("clip", stream, Value::Object(clip.clone()));
    t.vm.push_context(ctx);
    t.vm.execute_until_empty().unwrap();

    assert_eq!(*host.loads.borrow(), vec!["movie.swf".to_string()]);
    assert_eq!(clip.instance_name().map(|n| n.to_string()), Some("clip1".to_string()));
}

#[test]
fn test_get_url_on_non_sprite_warns() {
    let (mut t, host) = stage_vm();
    run(
        &mut t,
        vec![inst(Opcode::GetUrl, vec![s("movie.swf"), s("")])],
    )
    .unwrap();
    assert!(host.loads.borrow().is_empty());
    assert!(t.warnings().iter().any(|w| w.contains("not a sprite")));
}

#[test]
fn test_resolve_target_path_walks_children_and_parents() {
    let (t, host) = stage_vm();
    let root = sprite(&t, "_root");
    let child = sprite(&t, "child");
    let leaf = sprite(&t, "leaf");
    root.set("child", Value::Object(child.clone()));
    child.set_parent(Some(&root));
    child.set("leaf", Value::Object(leaf.clone()));
    leaf.set_parent(Some(&child));
    *host.root.borrow_mut() = Some(root.clone());

    let found = host.resolve_target_path("/child/leaf");
    assert!(found.as_object().is_some_and(|o| o.ptr_eq(&leaf)));
    let back = host.resolve_target_path("/child/leaf/..");
    assert!(back.as_object().is_some_and(|o| o.ptr_eq(&child)));
    let top = host.resolve_target_path("/");
    assert!(top.as_object().is_some_and(|o| o.ptr_eq(&root)));
    assert!(host.resolve_target_path("/missing").is_undefined());
    assert!(host.resolve_target_path("child").is_undefined());
}

#[test]
fn test_extern_object_misses_go_to_handler() {
    let (mut t, _host) = stage_vm();
    let extern_obj = Value::Object(t.vm.extern_object().clone());
    let result = t.vm.get_member(&extern_obj, "version").unwrap();
    assert_string(&t.vm.complete(result).unwrap(), "AVM 1");

    t.vm.extern_object().set("version", Value::string("override"));
    let result = t.vm.get_member(&extern_obj, "version").unwrap();
    assert_string(&t.vm.complete(result).unwrap(), "override");
}
