//! VM construction options

use std::rc::Rc;

use crate::builtins::Registry;
use crate::diagnostics::{DiagnosticsSink, TracingDiagnostics};
use crate::dom::DomHandler;
use crate::platform::{RandomProvider, TimeProvider};

/// Settings and collaborators for a [`super::VirtualMachine`]
pub struct VmOptions {
    /// Registers allocated for the global and host-created contexts
    pub global_register_count: usize,
    /// Registers allocated for `DefineFunction` activations
    pub default_register_count: usize,
    /// Run through breakpoint-flagged instructions without pausing
    pub ignore_breakpoints: bool,
    /// Call stack depth at which calls throw a `RangeError`
    pub max_call_depth: usize,
    pub(crate) diagnostics: Rc<dyn DiagnosticsSink>,
    pub(crate) time_provider: Option<Box<dyn TimeProvider>>,
    pub(crate) random_provider: Option<Box<dyn RandomProvider>>,
    pub(crate) registry: Option<Registry>,
    pub(crate) dom: Option<Rc<dyn DomHandler>>,
}

impl Default for VmOptions {
    fn default() -> Self {
        Self {
            global_register_count: 4,
            default_register_count: 4,
            ignore_breakpoints: false,
            max_call_depth: 256,
            diagnostics: Rc::new(TracingDiagnostics),
            time_provider: None,
            random_provider: None,
            registry: None,
            dom: None,
        }
    }
}

impl VmOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_diagnostics(mut self, sink: impl DiagnosticsSink + 'static) -> Self {
        self.diagnostics = Rc::new(sink);
        self
    }

    pub fn with_time_provider(mut self, provider: impl TimeProvider + 'static) -> Self {
        self.time_provider = Some(Box::new(provider));
        self
    }

    pub fn with_random_provider(mut self, provider: impl RandomProvider + 'static) -> Self {
        self.random_provider = Some(Box::new(provider));
        self
    }

    /// Replace the standard builtin table
    pub fn with_registry(mut self, registry: Registry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn with_dom_handler(mut self, handler: Rc<dyn DomHandler>) -> Self {
        self.dom = Some(handler);
        self
    }

    pub fn with_ignore_breakpoints(mut self, ignore: bool) -> Self {
        self.ignore_breakpoints = ignore;
        self
    }

    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }

    pub fn with_global_register_count(mut self, count: usize) -> Self {
        self.global_register_count = count;
        self
    }

    pub fn with_default_register_count(mut self, count: usize) -> Self {
        self.default_register_count = count;
        self
    }

    pub(crate) fn take_time_provider(&mut self) -> Box<dyn TimeProvider> {
        match self.time_provider.take() {
            Some(provider) => provider,
            None => Box::new(crate::platform::StdTimeProvider::new()),
        }
    }

    pub(crate) fn take_random_provider(&mut self) -> Box<dyn RandomProvider> {
        match self.random_provider.take() {
            Some(provider) => provider,
            None => Box::new(crate::platform::StdRandomProvider::new()),
        }
    }
}
