//! Host stage boundary
//!
//! Frame navigation, sprite manipulation, URL dispatch and extern variables
//! belong to the host. The interpreter forwards those opcodes to a
//! [`DomHandler`]; an opcode the handler declines is a fatal
//! [`VmError::UnhandledOpcode`].

use crate::context::ExecutionContext;
use crate::error::VmError;
use crate::instruction::Instruction;
use crate::object::ObjectRef;
use crate::value::Value;
use crate::vm::VirtualMachine;

const FS_COMMAND_PREFIX: &str = "FSCommand:";

/// Callbacks the VM uses for stage-flavored behavior.
///
/// Methods take `&self` so handlers can re-enter the VM (through the `vm`
/// argument) while the VM holds the handler.
pub trait DomHandler {
    /// Perform a stage opcode. `Ok(false)` means the opcode is not supported.
    fn try_handle(
        &self,
        vm: &mut VirtualMachine,
        ctx: &mut ExecutionContext,
        instruction: &Instruction,
    ) -> Result<bool, VmError>;

    /// Host command sent through a `FSCommand:` URL
    fn fs_command(
        &self,
        vm: &mut VirtualMachine,
        _ctx: &mut ExecutionContext,
        command: &str,
        args: &str,
    ) {
        vm.info(format_args!("FSCommand {command} {args}"));
    }

    /// Replace the content of a stage object with the movie at `url`
    fn load_movie(
        &self,
        vm: &mut VirtualMachine,
        _target: &ObjectRef,
        url: &str,
    ) -> Result<(), VmError> {
        vm.warn(format_args!("loading movies is not supported: {url}"));
        Ok(())
    }

    /// Value of an extern variable missing from the extern object
    fn resolve_variable(&self, _name: &str) -> Value {
        Value::Undefined
    }

    /// Root of the stage tree, used by target paths and `PreloadRoot`
    fn root(&self) -> Option<ObjectRef> {
        None
    }

    /// Dispatch a `GetURL`. `FSCommand:` URLs go to [`fs_command`](Self::fs_command);
    /// other URLs load a movie into the target sprite, keeping its instance name.
    fn handle_url(
        &self,
        vm: &mut VirtualMachine,
        ctx: &mut ExecutionContext,
        url: &str,
        target: &str,
    ) -> Result<(), VmError> {
        if let Some(command) = url.strip_prefix(FS_COMMAND_PREFIX) {
            self.fs_command(vm, ctx, command, target);
            return Ok(());
        }
        let resolved = if target.starts_with('/') {
            self.resolve_target_path(target)
        } else {
            ctx.this_obj.clone()
        };
        match resolved.as_object() {
            Some(sprite) if sprite.is_stage() => {
                let instance_name = sprite.instance_name();
                self.load_movie(vm, sprite, url)?;
                if let Some(name) = instance_name {
                    sprite.set_instance_name(name);
                }
                Ok(())
            }
            _ => {
                vm.warn(format_args!("GetURL target '{target}' is not a sprite"));
                Ok(())
            }
        }
    }

    /// Resolve a `/`-separated path from [`root`](Self::root); `..` steps to
    /// the parent. Paths not starting with `/` are `Undefined`.
    fn resolve_target_path(&self, path: &str) -> Value {
        let Some(rest) = path.strip_prefix('/') else {
            return Value::Undefined;
        };
        let Some(mut current) = self.root() else {
            return Value::Undefined;
        };
        for segment in rest.split('/').filter(|s| !s.is_empty()) {
            let next = if segment == ".." {
                current.parent()
            } else {
                match current.get_own_property(segment).and_then(|d| d.value().cloned()) {
                    Some(Value::Object(child)) => Some(child),
                    _ => None,
                }
            };
            match next {
                Some(next) => current = next,
                None => return Value::Undefined,
            }
        }
        Value::Object(current)
    }
}

/// Handler that declines every stage opcode
#[derive(Debug, Clone, Copy, Default)]
pub struct NullDom;

impl DomHandler for NullDom {
    fn try_handle(
        &self,
        _vm: &mut VirtualMachine,
        _ctx: &mut ExecutionContext,
        _instruction: &Instruction,
    ) -> Result<bool, VmError> {
        Ok(false)
    }
}
