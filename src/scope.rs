//! Lexical environments
//!
//! A scope is either backed by an object (the global object, activation
//! `this`) or by a private record of descriptors (function locals). Scopes
//! link outward through `Rc`, so closures keep their defining chain alive.

use std::cell::RefCell;
use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::continuation::CallResult;
use crate::error::VmError;
use crate::object::{ObjectRef, PropertyDescriptor};
use crate::value::{AvmString, CheapClone, Value};
use crate::vm::VirtualMachine;

pub type SharedScope = Rc<Scope>;

pub enum ScopeKind {
    /// Bindings are the object's properties, including inherited ones
    Object(ObjectRef),
    Record(RefCell<FxHashMap<AvmString, PropertyDescriptor>>),
}

pub struct Scope {
    outer: Option<SharedScope>,
    kind: ScopeKind,
}

impl Scope {
    pub fn object(object: ObjectRef, outer: Option<SharedScope>) -> SharedScope {
        Rc::new(Scope {
            outer,
            kind: ScopeKind::Object(object),
        })
    }

    pub fn record(outer: Option<SharedScope>) -> SharedScope {
        Rc::new(Scope {
            outer,
            kind: ScopeKind::Record(RefCell::new(FxHashMap::default())),
        })
    }

    pub fn outer(&self) -> Option<&SharedScope> {
        self.outer.as_ref()
    }

    pub fn kind(&self) -> &ScopeKind {
        &self.kind
    }

    /// Backing object of an object scope
    pub fn object_ref(&self) -> Option<&ObjectRef> {
        match &self.kind {
            ScopeKind::Object(obj) => Some(obj),
            ScopeKind::Record(_) => None,
        }
    }

    /// Number of scopes in the chain, this one included
    pub fn depth(&self) -> usize {
        let mut depth = 1;
        let mut current = self.outer.as_ref();
        while let Some(scope) = current {
            depth += 1;
            current = scope.outer.as_ref();
        }
        depth
    }

    /// `this` for accessors resolved in this scope
    fn receiver(&self) -> Value {
        match &self.kind {
            ScopeKind::Object(obj) => Value::Object(obj.cheap_clone()),
            ScopeKind::Record(_) => Value::Undefined,
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // Local operations
    // ═══════════════════════════════════════════════════════════════════════════════

    pub fn has_on_local(&self, name: &str) -> bool {
        self.lookup_on_local(name).is_some()
    }

    pub fn lookup_on_local(&self, name: &str) -> Option<PropertyDescriptor> {
        match &self.kind {
            ScopeKind::Object(obj) => obj.find_property(name),
            ScopeKind::Record(record) => record.borrow().get(name).cloned(),
        }
    }

    /// Install a descriptor on this scope. Fails over a non-writable record
    /// binding or a non-configurable object property.
    pub fn put_on_local(&self, name: impl Into<AvmString>, desc: PropertyDescriptor) -> bool {
        match &self.kind {
            ScopeKind::Object(obj) => obj.define_own_property(name, desc),
            ScopeKind::Record(record) => {
                let name = name.into();
                let mut record = record.borrow_mut();
                if record.get(&name).is_some_and(|d| !d.is_writable()) {
                    return false;
                }
                record.insert(name, desc);
                true
            }
        }
    }

    pub fn delete_on_local(&self, name: &str) -> bool {
        match &self.kind {
            ScopeKind::Object(obj) => obj.delete_own_property(name),
            ScopeKind::Record(record) => {
                let mut record = record.borrow_mut();
                match record.get(name).map(|d| d.is_configurable()) {
                    Some(false) => false,
                    Some(true) => {
                        record.remove(name);
                        true
                    }
                    None => true,
                }
            }
        }
    }

    /// Assign in this scope, creating a writable, enumerable, non-configurable
    /// binding when none exists. Resolves to `Boolean(assigned)`.
    pub fn set_on_local(
        &self,
        vm: &mut VirtualMachine,
        name: impl Into<AvmString>,
        value: Value,
    ) -> Result<CallResult, VmError> {
        let name = name.into();
        match self.lookup_on_local(name.as_str()) {
            None => {
                let ok = self.put_on_local(name, PropertyDescriptor::data(value, true, true, false));
                Ok(CallResult::returned(Value::Boolean(ok)))
            }
            Some(PropertyDescriptor::Accessor { set: Some(setter), .. }) => {
                let result = vm.call_function(&Value::Object(setter), &self.receiver(), &[value])?;
                Ok(result.then(|_, _| Ok(Some(CallResult::returned(Value::Boolean(true))))))
            }
            Some(PropertyDescriptor::Accessor { set: None, .. }) => {
                Ok(CallResult::returned(Value::Boolean(false)))
            }
            Some(PropertyDescriptor::Data {
                writable,
                enumerable,
                configurable,
                ..
            }) => {
                if writable {
                    self.put_on_local(
                        name,
                        PropertyDescriptor::data(value, writable, enumerable, configurable),
                    );
                }
                Ok(CallResult::returned(Value::Boolean(writable)))
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // Chain operations
    // ═══════════════════════════════════════════════════════════════════════════════

    /// First scope, innermost outward, that binds `name`
    pub fn lookup_on_chain(
        self: &Rc<Self>,
        name: &str,
    ) -> Option<(PropertyDescriptor, SharedScope)> {
        let mut current = Some(self.cheap_clone());
        while let Some(scope) = current {
            if let Some(desc) = scope.lookup_on_local(name) {
                return Some((desc, scope));
            }
            current = scope.outer.clone();
        }
        None
    }

    /// Read a binding. A miss is logged and yields `Undefined`.
    pub fn get_on_chain(
        self: &Rc<Self>,
        vm: &mut VirtualMachine,
        name: &str,
    ) -> Result<CallResult, VmError> {
        match self.lookup_on_chain(name) {
            Some((PropertyDescriptor::Data { value, .. }, _)) => Ok(CallResult::returned(value)),
            Some((PropertyDescriptor::Accessor { get: Some(getter), .. }, scope)) => {
                vm.call_function(&Value::Object(getter), &scope.receiver(), &[])
            }
            Some((PropertyDescriptor::Accessor { get: None, .. }, _)) => {
                Ok(CallResult::returned(Value::Undefined))
            }
            None => {
                vm.warn(format_args!("variable '{name}' is not defined"));
                Ok(CallResult::returned(Value::Undefined))
            }
        }
    }

    /// Assign where the binding lives, or create it on this scope
    pub fn set_on_chain(
        self: &Rc<Self>,
        vm: &mut VirtualMachine,
        name: &str,
        value: Value,
    ) -> Result<CallResult, VmError> {
        match self.lookup_on_chain(name) {
            Some((_, scope)) => scope.set_on_local(vm, name, value),
            None => self.set_on_local(vm, name, value),
        }
    }

    /// Delete from the first scope binding `name`; non-configurable bindings stay
    pub fn delete_on_chain(self: &Rc<Self>, name: &str) -> bool {
        match self.lookup_on_chain(name) {
            Some((desc, _)) if !desc.is_configurable() => false,
            Some((_, scope)) => scope.delete_on_local(name),
            None => true,
        }
    }
}
