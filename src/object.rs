//! Object model
//!
//! Objects live behind `Rc<RefCell<..>>` handles. Prototype links and closure
//! scopes are strong references; stage parent links are weak so a child clip
//! never keeps its parent alive.

use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use rustc_hash::{FxBuildHasher, FxHashSet};

use crate::continuation::CallResult;
use crate::error::VmError;
use crate::instruction::PreloadFlags;
use crate::scope::SharedScope;
use crate::stream::InstructionStream;
use crate::value::{AvmString, CheapClone, Value};
use crate::vm::VirtualMachine;

/// Guard against prototype cycles introduced through `__proto__`
const MAX_PROTOTYPE_DEPTH: usize = 1024;

/// Largest array length. Element stores and `length` writes past it are refused
/// or become named properties.
pub const MAX_ARRAY_LENGTH: usize = 1 << 20;

/// Signature of host-implemented functions: `(vm, this, arguments)`.
///
/// Natives that need script to run (a callback, `valueOf`) return a pending
/// [`CallResult`] and finish their work in a recall code.
pub type NativeFn = fn(&mut VirtualMachine, &Value, &[Value]) -> Result<CallResult, VmError>;

/// Ordered own-property table
pub type PropertyMap = IndexMap<AvmString, PropertyDescriptor, FxBuildHasher>;

// ═══════════════════════════════════════════════════════════════════════════════
// Property descriptors
// ═══════════════════════════════════════════════════════════════════════════════

/// A named property; exactly one of data or accessor
#[derive(Debug, Clone)]
pub enum PropertyDescriptor {
    Data {
        value: Value,
        writable: bool,
        enumerable: bool,
        configurable: bool,
    },
    Accessor {
        get: Option<ObjectRef>,
        set: Option<ObjectRef>,
        enumerable: bool,
        configurable: bool,
    },
}

impl PropertyDescriptor {
    pub fn data(value: Value, writable: bool, enumerable: bool, configurable: bool) -> Self {
        PropertyDescriptor::Data {
            value,
            writable,
            enumerable,
            configurable,
        }
    }

    /// Writable, enumerable and configurable; what plain assignment creates
    pub fn plain(value: Value) -> Self {
        Self::data(value, true, true, true)
    }

    /// Writable and configurable but skipped by enumeration; used for builtins
    pub fn hidden(value: Value) -> Self {
        Self::data(value, true, false, true)
    }

    pub fn accessor(get: Option<ObjectRef>, set: Option<ObjectRef>) -> Self {
        PropertyDescriptor::Accessor {
            get,
            set,
            enumerable: false,
            configurable: true,
        }
    }

    pub fn is_configurable(&self) -> bool {
        match self {
            PropertyDescriptor::Data { configurable, .. }
            | PropertyDescriptor::Accessor { configurable, .. } => *configurable,
        }
    }

    pub fn is_enumerable(&self) -> bool {
        match self {
            PropertyDescriptor::Data { enumerable, .. }
            | PropertyDescriptor::Accessor { enumerable, .. } => *enumerable,
        }
    }

    /// Accessors count as writable when they carry a setter
    pub fn is_writable(&self) -> bool {
        match self {
            PropertyDescriptor::Data { writable, .. } => *writable,
            PropertyDescriptor::Accessor { set, .. } => set.is_some(),
        }
    }

    /// Stored value of a data property
    pub fn value(&self) -> Option<&Value> {
        match self {
            PropertyDescriptor::Data { value, .. } => Some(value),
            PropertyDescriptor::Accessor { .. } => None,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Functions
// ═══════════════════════════════════════════════════════════════════════════════

/// Callable payload of a function object
#[derive(Clone)]
pub enum FunctionKind {
    Native(NativeFunction),
    Script(Rc<ScriptFunction>),
}

// Script functions are behind Rc, natives are Copy
impl CheapClone for FunctionKind {}

#[derive(Clone, Copy)]
pub struct NativeFunction {
    pub name: &'static str,
    pub call: NativeFn,
}

/// Which define opcode produced a function
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionVersion {
    /// `DefineFunction`: named parameters, no preload
    V1,
    /// `DefineFunction2`: register parameters and preload flags
    V2,
}

/// A formal parameter; register 0 means "bind by name"
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: AvmString,
    pub register: u8,
}

/// A function materialized by `DefineFunction`/`DefineFunction2`
pub struct ScriptFunction {
    pub name: AvmString,
    pub version: FunctionVersion,
    pub params: Vec<Parameter>,
    pub register_count: usize,
    pub flags: PreloadFlags,
    pub body: InstructionStream,
    /// Constant pool active at definition time
    pub constants: Rc<[Value]>,
    /// Movie-level constant table the body's `ConstantPool` reads from
    pub global_constants: Rc<[Value]>,
    /// Scope chain captured at definition time
    pub scope: SharedScope,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Objects
// ═══════════════════════════════════════════════════════════════════════════════

/// Internal object kind
#[derive(Clone)]
pub enum ObjectKind {
    Ordinary,
    Function(FunctionKind),
    Array(Vec<Value>),
    Error,
    /// Host variable bridge; misses fall through to the DOM handler
    Extern,
    /// Host display object
    Stage { instance_name: AvmString },
}

pub struct Object {
    pub class: AvmString,
    pub prototype: Option<ObjectRef>,
    pub extensible: bool,
    pub properties: PropertyMap,
    pub kind: ObjectKind,
    pub parent: Option<WeakObjectRef>,
}

impl Object {
    pub fn new(class: impl Into<AvmString>, prototype: Option<ObjectRef>, kind: ObjectKind) -> Self {
        Self {
            class: class.into(),
            prototype,
            extensible: true,
            properties: PropertyMap::default(),
            kind,
            parent: None,
        }
    }

    pub fn ordinary(prototype: Option<ObjectRef>) -> Self {
        Self::new("Object", prototype, ObjectKind::Ordinary)
    }

    pub fn array(prototype: Option<ObjectRef>, elements: Vec<Value>) -> Self {
        Self::new("Array", prototype, ObjectKind::Array(elements))
    }

    pub fn function(prototype: Option<ObjectRef>, function: FunctionKind) -> Self {
        Self::new("Function", prototype, ObjectKind::Function(function))
    }

    pub fn error(prototype: Option<ObjectRef>) -> Self {
        Self::new("Error", prototype, ObjectKind::Error)
    }

    pub fn stage(prototype: Option<ObjectRef>, instance_name: impl Into<AvmString>) -> Self {
        Self::new(
            "MovieClip",
            prototype,
            ObjectKind::Stage {
                instance_name: instance_name.into(),
            },
        )
    }

    fn own_property(&self, name: &str) -> Option<PropertyDescriptor> {
        if let ObjectKind::Array(elements) = &self.kind {
            if name == "length" {
                let len = i32::try_from(elements.len()).unwrap_or(i32::MAX);
                return Some(PropertyDescriptor::data(Value::Integer(len), true, false, false));
            }
            if let Some(index) = array_index(name) {
                return elements
                    .get(index)
                    .map(|v| PropertyDescriptor::plain(v.clone()));
            }
        }
        self.properties.get(name).cloned()
    }
}

/// Shared handle to an [`Object`]
#[derive(Clone)]
pub struct ObjectRef(Rc<RefCell<Object>>);

impl CheapClone for ObjectRef {}

/// Non-owning link, used for stage parents
#[derive(Clone)]
pub struct WeakObjectRef(Weak<RefCell<Object>>);

impl WeakObjectRef {
    pub fn upgrade(&self) -> Option<ObjectRef> {
        self.0.upgrade().map(ObjectRef)
    }
}

impl ObjectRef {
    pub fn new(object: Object) -> Self {
        ObjectRef(Rc::new(RefCell::new(object)))
    }

    pub fn borrow(&self) -> Ref<'_, Object> {
        self.0.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, Object> {
        self.0.borrow_mut()
    }

    /// Identity comparison
    pub fn ptr_eq(&self, other: &ObjectRef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn downgrade(&self) -> WeakObjectRef {
        WeakObjectRef(Rc::downgrade(&self.0))
    }

    pub fn class_name(&self) -> AvmString {
        self.borrow().class.cheap_clone()
    }

    pub fn prototype(&self) -> Option<ObjectRef> {
        self.borrow().prototype.clone()
    }

    pub fn set_prototype(&self, prototype: Option<ObjectRef>) {
        self.borrow_mut().prototype = prototype;
    }

    pub fn is_callable(&self) -> bool {
        matches!(self.borrow().kind, ObjectKind::Function(_))
    }

    pub fn is_stage(&self) -> bool {
        matches!(self.borrow().kind, ObjectKind::Stage { .. })
    }

    pub fn is_extern(&self) -> bool {
        matches!(self.borrow().kind, ObjectKind::Extern)
    }

    pub fn is_array(&self) -> bool {
        matches!(self.borrow().kind, ObjectKind::Array(_))
    }

    pub fn function(&self) -> Option<FunctionKind> {
        match &self.borrow().kind {
            ObjectKind::Function(f) => Some(f.cheap_clone()),
            _ => None,
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // Property access
    // ═══════════════════════════════════════════════════════════════════════════════

    pub fn get_own_property(&self, name: &str) -> Option<PropertyDescriptor> {
        self.borrow().own_property(name)
    }

    pub fn has_own_property(&self, name: &str) -> bool {
        self.get_own_property(name).is_some()
    }

    /// Look a property up along the prototype chain
    pub fn find_property(&self, name: &str) -> Option<PropertyDescriptor> {
        self.find_property_with_holder(name).map(|(desc, _)| desc)
    }

    /// Like [`find_property`](Self::find_property), also returning the object that holds it
    pub fn find_property_with_holder(&self, name: &str) -> Option<(PropertyDescriptor, ObjectRef)> {
        let mut current = Some(self.cheap_clone());
        let mut depth = 0;
        while let Some(obj) = current {
            if let Some(desc) = obj.get_own_property(name) {
                return Some((desc, obj));
            }
            depth += 1;
            if depth > MAX_PROTOTYPE_DEPTH {
                return None;
            }
            current = obj.prototype();
        }
        None
    }

    /// Data value along the prototype chain, without running accessors
    pub fn get_value(&self, name: &str) -> Option<Value> {
        self.find_property(name).and_then(|d| d.value().cloned())
    }

    /// Define or replace an own property. Fails on non-configurable
    /// properties (a writable data property still takes the new value) and
    /// on new properties of non-extensible objects.
    pub fn define_own_property(&self, name: impl Into<AvmString>, desc: PropertyDescriptor) -> bool {
        let name = name.into();
        let mut guard = self.borrow_mut();
        let obj = &mut *guard;
        if let ObjectKind::Array(elements) = &mut obj.kind {
            if let PropertyDescriptor::Data { value, .. } = &desc {
                if name.as_str() == "length" {
                    let Some(len) = array_length(value) else {
                        return false;
                    };
                    elements.resize(len, Value::Undefined);
                    return true;
                }
                if let Some(index) = array_index(name.as_str()) {
                    set_element(elements, index, value.clone());
                    return true;
                }
            }
        }
        match obj.properties.get_mut(&name) {
            Some(existing) if !existing.is_configurable() => {
                match (existing, desc) {
                    (
                        PropertyDescriptor::Data {
                            value: slot,
                            writable: true,
                            ..
                        },
                        PropertyDescriptor::Data { value, .. },
                    ) => {
                        *slot = value;
                        true
                    }
                    _ => false,
                }
            }
            Some(existing) => {
                *existing = desc;
                true
            }
            None if obj.extensible => {
                obj.properties.insert(name, desc);
                true
            }
            None => false,
        }
    }

    /// Assign an own data property the way script assignment does: update a
    /// writable property in place or create a plain one.
    pub fn set(&self, name: impl Into<AvmString>, value: Value) -> bool {
        let name = name.into();
        match self.get_own_property(name.as_str()) {
            Some(PropertyDescriptor::Data { writable: false, .. }) => false,
            Some(PropertyDescriptor::Data {
                writable: true,
                enumerable,
                configurable,
                ..
            }) => self.define_own_property(
                name,
                PropertyDescriptor::data(value, true, enumerable, configurable),
            ),
            Some(PropertyDescriptor::Accessor { .. }) => false,
            None => self.define_own_property(name, PropertyDescriptor::plain(value)),
        }
    }

    /// Define a non-enumerable data property
    pub fn set_hidden(&self, name: impl Into<AvmString>, value: Value) -> bool {
        self.define_own_property(name, PropertyDescriptor::hidden(value))
    }

    pub fn delete_own_property(&self, name: &str) -> bool {
        let mut guard = self.borrow_mut();
        let obj = &mut *guard;
        if let ObjectKind::Array(elements) = &mut obj.kind {
            if name == "length" {
                return false;
            }
            if let Some(index) = array_index(name) {
                if let Some(slot) = elements.get_mut(index) {
                    *slot = Value::Undefined;
                }
                return true;
            }
        }
        match obj.properties.get(name).map(|d| d.is_configurable()) {
            Some(false) => false,
            Some(true) => {
                obj.properties.shift_remove(name);
                true
            }
            None => true,
        }
    }

    /// Enumerable property names along the prototype chain, own first
    pub fn enumerable_keys(&self) -> Vec<AvmString> {
        let mut seen: FxHashSet<AvmString> = FxHashSet::default();
        let mut keys = Vec::new();
        let mut current = Some(self.cheap_clone());
        let mut depth = 0;
        while let Some(obj) = current {
            {
                let inner = obj.borrow();
                if let ObjectKind::Array(elements) = &inner.kind {
                    for index in 0..elements.len() {
                        let key = AvmString::from(index.to_string());
                        if seen.insert(key.cheap_clone()) {
                            keys.push(key);
                        }
                    }
                }
                for (key, desc) in &inner.properties {
                    // Shadowed names stay hidden even if the shadowing one is not enumerable
                    if seen.insert(key.cheap_clone()) && desc.is_enumerable() {
                        keys.push(key.cheap_clone());
                    }
                }
            }
            depth += 1;
            if depth > MAX_PROTOTYPE_DEPTH {
                break;
            }
            current = obj.prototype();
        }
        keys
    }

    /// Enumerable own data properties in insertion order
    pub fn enumerable_own_values(&self) -> Vec<(AvmString, Value)> {
        self.borrow()
            .properties
            .iter()
            .filter(|(_, desc)| desc.is_enumerable())
            .filter_map(|(key, desc)| desc.value().map(|v| (key.cheap_clone(), v.clone())))
            .collect()
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // Arrays
    // ═══════════════════════════════════════════════════════════════════════════════

    pub fn array_elements(&self) -> Option<Vec<Value>> {
        match &self.borrow().kind {
            ObjectKind::Array(elements) => Some(elements.clone()),
            _ => None,
        }
    }

    pub fn array_push(&self, value: Value) -> Option<usize> {
        match &mut self.borrow_mut().kind {
            ObjectKind::Array(elements) => {
                elements.push(value);
                Some(elements.len())
            }
            _ => None,
        }
    }

    pub fn array_pop(&self) -> Option<Value> {
        match &mut self.borrow_mut().kind {
            ObjectKind::Array(elements) => Some(elements.pop().unwrap_or_default()),
            _ => None,
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // Stage objects
    // ═══════════════════════════════════════════════════════════════════════════════

    pub fn parent(&self) -> Option<ObjectRef> {
        self.borrow().parent.as_ref().and_then(|p| p.upgrade())
    }

    pub fn set_parent(&self, parent: Option<&ObjectRef>) {
        self.borrow_mut().parent = parent.map(|p| p.downgrade());
    }

    pub fn instance_name(&self) -> Option<AvmString> {
        match &self.borrow().kind {
            ObjectKind::Stage { instance_name } => Some(instance_name.cheap_clone()),
            _ => None,
        }
    }

    pub fn set_instance_name(&self, name: impl Into<AvmString>) {
        if let ObjectKind::Stage { instance_name } = &mut self.borrow_mut().kind {
            *instance_name = name.into();
        }
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.try_borrow() {
            Ok(obj) => write!(f, "[{} {:p}]", obj.class, Rc::as_ptr(&self.0)),
            Err(_) => write!(f, "[<borrowed> {:p}]", Rc::as_ptr(&self.0)),
        }
    }
}

/// Canonical array index ("3" but not "03" or "-1") below
/// [`MAX_ARRAY_LENGTH`]. Larger indices are ordinary named properties.
fn array_index(name: &str) -> Option<usize> {
    let index = name.parse::<usize>().ok()?;
    (index < MAX_ARRAY_LENGTH && index.to_string() == name).then_some(index)
}

/// Valid value for an array's `length`: integral and within the cap
pub(crate) fn array_length(value: &Value) -> Option<usize> {
    let n = value.to_float();
    let valid = n.fract() == 0.0 && n >= 0.0 && n <= MAX_ARRAY_LENGTH as f64;
    valid.then_some(n as usize)
}

fn set_element(elements: &mut Vec<Value>, index: usize, value: Value) {
    if index >= elements.len() {
        let Some(len) = index.checked_add(1) else {
            return;
        };
        elements.resize(len, Value::Undefined);
    }
    if let Some(slot) = elements.get_mut(index) {
        *slot = value;
    }
}
