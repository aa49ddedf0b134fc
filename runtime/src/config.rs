//! Embedder-facing configuration for a `Global`, in the same builder-on-a-
//! plain-struct style the compiler crate in this lineage uses for its own
//! `CompilerConfig`. Lets a host tune GC pressure and initial stack sizing
//! without reaching into `Global`'s internals.

/// Tunables a hosting application can set before constructing a `Global`.
#[derive(Debug, Clone)]
pub struct EmbedderConfig {
    /// Allocation count at which a minor GC pass is triggered.
    pub gc_threshold: u64,
    /// Initial capacity reserved for a fresh `ReferenceStack`.
    pub initial_stack_capacity: usize,
    /// Whether to register the `std` namespace (`std.io`, …) as a global.
    pub register_std: bool,
}

impl Default for EmbedderConfig {
    fn default() -> Self {
        EmbedderConfig { gc_threshold: 1024, initial_stack_capacity: 16, register_std: true }
    }
}

impl EmbedderConfig {
    pub fn new() -> Self {
        EmbedderConfig::default()
    }

    pub fn with_gc_threshold(mut self, threshold: u64) -> Self {
        self.gc_threshold = threshold;
        self
    }

    pub fn with_initial_stack_capacity(mut self, capacity: usize) -> Self {
        self.initial_stack_capacity = capacity;
        self
    }

    pub fn with_std_registered(mut self, register: bool) -> Self {
        self.register_std = register;
        self
    }
}
