//! Calls, construction, member access and coercions that may run script

use crate::continuation::CallResult;
use crate::error::VmError;
use crate::object::{FunctionKind, Object, ObjectKind, ObjectRef, PropertyDescriptor};
use crate::value::{CheapClone, Hint, Value};

use super::VirtualMachine;

/// Bound on prototype walks in `instance_of`
const MAX_CHAIN: usize = 1024;

impl VirtualMachine {
    // ═══════════════════════════════════════════════════════════════════════════════
    // Calls
    // ═══════════════════════════════════════════════════════════════════════════════

    /// Call `callable`. Natives run immediately; script functions get a new
    /// frame on the call stack and the result is `Executing(frame)`.
    /// Non-callables produce a thrown `TypeError`.
    pub fn call_function(
        &mut self,
        callable: &Value,
        this: &Value,
        args: &[Value],
    ) -> Result<CallResult, VmError> {
        let Some(function) = callable.as_object().and_then(|o| o.function()) else {
            let message = format!("{} is not a function", callable.to_display_string());
            return Ok(CallResult::thrown(self.construct_error("TypeError", &message)));
        };
        match function {
            FunctionKind::Native(native) => (native.call)(self, this, args),
            FunctionKind::Script(script) => {
                if self.call_depth() >= self.options.max_call_depth {
                    let error =
                        self.construct_error("RangeError", "Maximum call stack size exceeded");
                    return Ok(CallResult::thrown(error));
                }
                let ctx = self.create_activation(&script, this, args)?;
                let id = ctx.id();
                self.push_context(ctx);
                Ok(CallResult::executing(id))
            }
        }
    }

    /// `new callable(args)`: a fresh object inheriting from the constructor's
    /// `prototype`, replaced by the constructor's result when that is an object
    pub fn construct(&mut self, callable: &Value, args: &[Value]) -> Result<CallResult, VmError> {
        let Some(constructor) = callable.as_object().filter(|o| o.is_callable()) else {
            let message = format!("{} is not a constructor", callable.to_display_string());
            return Ok(CallResult::thrown(self.construct_error("TypeError", &message)));
        };
        let proto = match constructor.get_value("prototype") {
            Some(Value::Object(proto)) => proto,
            _ => self.object_prototype(),
        };
        let instance = ObjectRef::new(Object::ordinary(Some(proto)));
        instance.set_hidden("__constructor__", callable.clone());
        let this = Value::Object(instance.cheap_clone());
        let result = self.call_function(callable, &this, args)?;
        Ok(result.then(move |_, value| {
            let value = if value.is_object() {
                value
            } else {
                Value::Object(instance)
            };
            Ok(Some(CallResult::returned(value)))
        }))
    }

    /// Script error object of class `name`. Unknown classes fall back to
    /// `Error` with the class name prefixed to the message.
    pub fn construct_error(&self, name: &str, message: &str) -> Value {
        let (class, proto, message) = match self.prototype(name) {
            Some(proto) => (name.to_string(), proto, message.to_string()),
            None => (
                "Error".to_string(),
                self.prototype("Error")
                    .unwrap_or_else(|| self.object_prototype()),
                format!("({name}){message}"),
            ),
        };
        let error = ObjectRef::new(Object::new(class, Some(proto), ObjectKind::Error));
        error.set_hidden("message", Value::string(message));
        Value::Object(error)
    }

    /// `value instanceof constructor`, including interfaces declared with
    /// `ImplementsOp`
    pub fn instance_of(&self, value: &Value, constructor: &Value) -> bool {
        let (Some(object), Some(constructor)) = (value.as_object(), constructor.as_object()) else {
            return false;
        };
        let Some(Value::Object(target)) = constructor.get_value("prototype") else {
            return false;
        };
        let mut current = object.prototype();
        let mut depth = 0;
        while let Some(proto) = current {
            if proto.ptr_eq(&target) || implements(&proto, constructor) {
                return true;
            }
            depth += 1;
            if depth > MAX_CHAIN {
                break;
            }
            current = proto.prototype();
        }
        false
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // Members
    // ═══════════════════════════════════════════════════════════════════════════════

    /// Prototype used for member lookups on a primitive
    fn primitive_prototype(&self, value: &Value) -> Option<ObjectRef> {
        let class = match value {
            Value::String(_) => "String",
            Value::Integer(_) | Value::Float(_) => "Number",
            Value::Boolean(_) => "Boolean",
            _ => return None,
        };
        Some(self.prototype(class).unwrap_or_else(|| self.object_prototype()))
    }

    /// Read `object[name]`, running getters. Misses on the extern object are
    /// resolved by the DOM handler.
    pub fn get_member(&mut self, object: &Value, name: &str) -> Result<CallResult, VmError> {
        let holder = match object {
            Value::Object(obj) => {
                if name == "__proto__" {
                    let proto = obj.prototype().map(Value::Object).unwrap_or(Value::Null);
                    return Ok(CallResult::returned(proto));
                }
                obj.cheap_clone()
            }
            Value::String(s) if name == "length" => {
                let len = i32::try_from(s.char_count()).unwrap_or(i32::MAX);
                return Ok(CallResult::returned(Value::Integer(len)));
            }
            Value::Undefined | Value::Null => {
                self.warn(format_args!(
                    "cannot read property '{name}' of {}",
                    object.to_display_string()
                ));
                return Ok(CallResult::returned(Value::Undefined));
            }
            primitive => match self.primitive_prototype(primitive) {
                Some(proto) => proto,
                None => return Ok(CallResult::returned(Value::Undefined)),
            },
        };
        match holder.find_property(name) {
            Some(PropertyDescriptor::Data { value, .. }) => Ok(CallResult::returned(value)),
            Some(PropertyDescriptor::Accessor { get: Some(getter), .. }) => {
                self.call_function(&Value::Object(getter), object, &[])
            }
            Some(PropertyDescriptor::Accessor { get: None, .. }) => {
                Ok(CallResult::returned(Value::Undefined))
            }
            None if holder.is_extern() => {
                let value = match self.dom_handler() {
                    Some(dom) => dom.resolve_variable(name),
                    None => Value::Undefined,
                };
                Ok(CallResult::returned(value))
            }
            None => {
                self.warn(format_args!(
                    "property '{name}' not found on {}",
                    object.to_display_string()
                ));
                Ok(CallResult::returned(Value::Undefined))
            }
        }
    }

    /// Write `object[name] = value`, running setters. Resolves to
    /// `Boolean(assigned)`.
    pub fn put_member(
        &mut self,
        object: &Value,
        name: &str,
        value: Value,
    ) -> Result<CallResult, VmError> {
        let Value::Object(obj) = object else {
            self.warn(format_args!(
                "cannot set property '{name}' on {}",
                object.to_display_string()
            ));
            return Ok(CallResult::returned(Value::Boolean(false)));
        };
        if name == "__proto__" {
            match value {
                Value::Object(proto) => obj.set_prototype(Some(proto)),
                Value::Null => obj.set_prototype(None),
                _ => return Ok(CallResult::returned(Value::Boolean(false))),
            }
            return Ok(CallResult::returned(Value::Boolean(true)));
        }
        match obj.find_property(name) {
            Some(PropertyDescriptor::Accessor { set: Some(setter), .. }) => {
                let result = self.call_function(&Value::Object(setter), object, &[value])?;
                Ok(result.then(|_, _| Ok(Some(CallResult::returned(Value::Boolean(true))))))
            }
            Some(PropertyDescriptor::Accessor { set: None, .. }) => {
                Ok(CallResult::returned(Value::Boolean(false)))
            }
            _ => Ok(CallResult::returned(Value::Boolean(obj.set(name, value)))),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // Coercions
    // ═══════════════════════════════════════════════════════════════════════════════

    /// `[[DefaultValue]]`: primitives pass through, objects try `valueOf` and
    /// `toString` (order set by `hint`) until one returns a primitive.
    pub fn to_primitive(&mut self, value: &Value, hint: Hint) -> Result<CallResult, VmError> {
        match value {
            Value::Object(obj) => {
                let methods = match hint {
                    Hint::Number => ["valueOf", "toString"],
                    Hint::String => ["toString", "valueOf"],
                };
                self.try_default_value(obj.cheap_clone(), methods, 0)
            }
            primitive => Ok(CallResult::returned(primitive.clone())),
        }
    }

    fn try_default_value(
        &mut self,
        object: ObjectRef,
        methods: [&'static str; 2],
        index: usize,
    ) -> Result<CallResult, VmError> {
        let Some(name) = methods.get(index) else {
            let error = self.construct_error("TypeError", "Cannot convert object to primitive value");
            return Ok(CallResult::thrown(error));
        };
        if object.find_property(name).is_none() {
            return self.try_default_value(object, methods, index + 1);
        }
        // Accessor-defined conversion methods run their getter first
        let this = Value::Object(object.cheap_clone());
        let lookup = self.get_member(&this, name)?;
        Ok(lookup.then(move |vm, method| {
            if !method.is_callable() {
                return vm.try_default_value(object, methods, index + 1).map(Some);
            }
            let result = vm.call_function(&method, &this, &[])?;
            Ok(Some(result.then(move |vm, value| {
                if value.is_primitive() {
                    Ok(Some(CallResult::returned(value)))
                } else {
                    vm.try_default_value(object, methods, index + 1).map(Some)
                }
            })))
        }))
    }

    pub fn to_number(&mut self, value: &Value) -> Result<CallResult, VmError> {
        if value.is_primitive() {
            return Ok(CallResult::returned(value.to_number()));
        }
        let result = self.to_primitive(value, Hint::Number)?;
        Ok(result.then(|_, p| Ok(Some(CallResult::returned(p.to_number())))))
    }

    pub fn to_string_value(&mut self, value: &Value) -> Result<CallResult, VmError> {
        if value.is_primitive() {
            return Ok(CallResult::returned(Value::String(value.to_avm_string())));
        }
        let result = self.to_primitive(value, Hint::String)?;
        Ok(result.then(|_, p| Ok(Some(CallResult::returned(Value::String(p.to_avm_string()))))))
    }

    /// `==` with objects converted through `to_primitive`
    pub fn abstract_equals(&mut self, a: Value, b: Value) -> Result<CallResult, VmError> {
        if let Some(equal) = a.loose_equals(&b) {
            return Ok(CallResult::returned(Value::Boolean(equal)));
        }
        if a.is_object() {
            let result = self.to_primitive(&a, Hint::Number)?;
            Ok(result.then(move |vm, a| vm.abstract_equals(a, b).map(Some)))
        } else {
            let result = self.to_primitive(&b, Hint::Number)?;
            Ok(result.then(move |vm, b| vm.abstract_equals(a, b).map(Some)))
        }
    }

    /// `Add2`: numeric when both primitives are numbers, concatenation otherwise
    pub fn add_values(&mut self, a: Value, b: Value) -> Result<CallResult, VmError> {
        if a.is_object() {
            let result = self.to_primitive(&a, Hint::Number)?;
            return Ok(result.then(move |vm, a| vm.add_values(a, b).map(Some)));
        }
        if b.is_object() {
            let result = self.to_primitive(&b, Hint::Number)?;
            return Ok(result.then(move |vm, b| vm.add_values(a, b).map(Some)));
        }
        let sum = if a.is_number() && b.is_number() {
            Value::number(a.to_float() + b.to_float())
        } else {
            Value::string(format!("{}{}", a.to_avm_string(), b.to_avm_string()))
        };
        Ok(CallResult::returned(sum))
    }
}

/// Whether `proto` declares `constructor` through `__implements__`
fn implements(proto: &ObjectRef, constructor: &ObjectRef) -> bool {
    let Some(Value::Object(list)) = proto
        .get_own_property("__implements__")
        .and_then(|d| d.value().cloned())
    else {
        return false;
    };
    list.array_elements().is_some_and(|interfaces| {
        interfaces
            .iter()
            .any(|i| i.as_object().is_some_and(|o| o.ptr_eq(constructor)))
    })
}
