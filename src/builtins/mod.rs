//! Builtin class and global registration table
//!
//! The VM reads a [`Registry`] once at construction: every class gets a
//! prototype and a native constructor linked through hidden `prototype` and
//! `constructor` properties, and the constructors, functions and variables
//! are exposed on the global object.

pub mod array;
pub mod error;
pub mod function;
pub mod global;
pub mod object;

use crate::object::NativeFn;
use crate::value::Value;

/// One builtin class
pub struct ClassEntry {
    pub name: &'static str,
    /// Class whose prototype this class's prototype inherits from; `Object` when absent
    pub parent: Option<&'static str>,
    pub constructor: NativeFn,
    pub prototype_methods: Vec<(&'static str, NativeFn)>,
    pub prototype_values: Vec<(&'static str, Value)>,
    pub static_methods: Vec<(&'static str, NativeFn)>,
}

impl ClassEntry {
    pub fn new(name: &'static str, constructor: NativeFn) -> Self {
        Self {
            name,
            parent: None,
            constructor,
            prototype_methods: Vec::new(),
            prototype_values: Vec::new(),
            static_methods: Vec::new(),
        }
    }

    pub fn parent(mut self, parent: &'static str) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn method(mut self, name: &'static str, function: NativeFn) -> Self {
        self.prototype_methods.push((name, function));
        self
    }

    pub fn value(mut self, name: &'static str, value: Value) -> Self {
        self.prototype_values.push((name, value));
        self
    }

    pub fn static_method(mut self, name: &'static str, function: NativeFn) -> Self {
        self.static_methods.push((name, function));
        self
    }
}

/// Classes, global functions and global variables installed at startup
#[derive(Default)]
pub struct Registry {
    pub classes: Vec<ClassEntry>,
    pub functions: Vec<(&'static str, NativeFn)>,
    pub variables: Vec<(&'static str, Value)>,
}

impl Registry {
    /// An empty table. `Object` and `Function` prototypes exist regardless.
    pub fn new() -> Self {
        Self::default()
    }

    /// The default library: `Object`, `Function`, `Array`, the error classes,
    /// `setInterval` and `clearInterval`.
    pub fn standard() -> Self {
        let mut registry = Registry::new()
            .class(object::class())
            .class(function::class())
            .class(array::class());
        for class in error::classes() {
            registry = registry.class(class);
        }
        global::register(registry)
    }

    pub fn class(mut self, entry: ClassEntry) -> Self {
        self.classes.push(entry);
        self
    }

    pub fn function(mut self, name: &'static str, function: NativeFn) -> Self {
        self.functions.push((name, function));
        self
    }

    pub fn variable(mut self, name: &'static str, value: Value) -> Self {
        self.variables.push((name, value));
        self
    }

    pub fn find_class(&self, name: &str) -> Option<&ClassEntry> {
        self.classes.iter().find(|c| c.name == name)
    }
}

/// Argument at `index`, `Undefined` when missing
pub(crate) fn arg(args: &[Value], index: usize) -> Value {
    args.get(index).cloned().unwrap_or_default()
}
