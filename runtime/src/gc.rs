//! Garbage_Collector: tracing, generational (3 generations), non-moving,
//! cooperative collection of `Variable`s reachable from live roots.
//!
//! `Rc` alone reclaims acyclic structures, but a closure or container can
//! hold a `Variable` that transitively holds a reference back to itself
//! (directly or through an `Opaque`/`Function`), so a tracing pass is still
//! needed to break cycles. Identity is keyed on the address of the `Rc`'s
//! allocation, obtained via `Rc::as_ptr(..).cast::<()>()`, so that two
//! handles into the same variable converge to one entry regardless of how
//! many `Reference`s alias it.

use std::collections::HashMap;
use std::rc::Rc;

use asteria_core::alloc_stats::AllocStats;

use crate::variable::{Generation, Variable};

pub type VariableKey = *const ();

/// Map from variable identity to the live handle, used as both the
/// `staged` and `temp` sets during a trace.
pub type VariableMap = HashMap<VariableKey, Rc<Variable>>;

fn key_of(var: &Rc<Variable>) -> VariableKey {
    Rc::as_ptr(var).cast::<()>()
}

/// Inserts `var` into `staged` (if not already present) and into `temp`.
/// Called by every `collect_variables` implementation when it reaches a
/// `Variable` root or transitive reference.
pub fn stage_variable(var: &Rc<Variable>, staged: &mut VariableMap, temp: &mut VariableMap) {
    let key = key_of(var);
    temp.insert(key, var.clone());
    if let std::collections::hash_map::Entry::Vacant(e) = staged.entry(key) {
        e.insert(var.clone());
        var.get().collect_variables(staged, temp);
    }
}

/// A single generation's live set.
#[derive(Default)]
struct GenerationSet {
    vars: VariableMap,
}

pub struct GarbageCollector {
    newest: GenerationSet,
    middle: GenerationSet,
    oldest: GenerationSet,
    stats: AllocStats,
    /// How many allocations occur before a minor collection is advisable.
    threshold: u64,
}

/// A thing the collector can ask to enumerate its transitively reachable
/// variables. Implemented by `Reference`, `ReferenceStack`, `Value`,
/// `Rod`, and the executive context's named map.
pub trait Trace {
    fn collect_variables(&self, staged: &mut VariableMap, temp: &mut VariableMap);
}

impl Trace for crate::reference::Reference {
    fn collect_variables(&self, staged: &mut VariableMap, temp: &mut VariableMap) {
        crate::reference::Reference::collect_variables(self, staged, temp)
    }
}

impl Trace for crate::reference_stack::ReferenceStack {
    fn collect_variables(&self, staged: &mut VariableMap, temp: &mut VariableMap) {
        crate::reference_stack::ReferenceStack::collect_variables(self, staged, temp)
    }
}

impl Trace for crate::value::Value {
    fn collect_variables(&self, staged: &mut VariableMap, temp: &mut VariableMap) {
        crate::value::Value::collect_variables(self, staged, temp)
    }
}

impl Trace for crate::rod::Rod {
    fn collect_variables(&self, staged: &mut VariableMap, temp: &mut VariableMap) {
        crate::rod::Rod::collect_variables(self, staged, temp)
    }
}

impl GarbageCollector {
    pub fn new(threshold: u64) -> Self {
        GarbageCollector {
            newest: GenerationSet::default(),
            middle: GenerationSet::default(),
            oldest: GenerationSet::default(),
            stats: AllocStats::new(),
            threshold,
        }
    }

    pub fn stats(&self) -> &AllocStats {
        &self.stats
    }

    /// Registers a freshly allocated variable in the `newest` generation
    /// and records the allocation for the collection heuristic.
    pub fn track(&mut self, var: Rc<Variable>) {
        var.set_generation(Generation::Newest);
        self.newest.vars.insert(key_of(&var), var);
        self.stats.record_allocation();
    }

    pub fn should_collect(&self) -> bool {
        self.stats.should_collect(self.threshold)
    }

    /// Traces from `roots`, reaping anything in `newest` that is
    /// unreachable and promoting survivors into `middle`.
    ///
    /// `roots` is whatever the driver considers live right now: the
    /// current reference stack, every live executive context's named
    /// map, pending defer lists, and so on. The collector does not keep
    /// its own notion of roots; it is handed a fresh one each cycle
    /// because the call stack (and therefore the live context chain)
    /// only the evaluator knows about at collection time.
    pub fn collect_minor(&mut self, roots: &[&dyn Trace]) {
        let _span = tracing::debug_span!("gc_collect", generation = "minor").entered();
        let mut staged = VariableMap::new();
        let mut temp = VariableMap::new();
        for root in roots {
            root.collect_variables(&mut staged, &mut temp);
        }
        // also trace the surviving older generations, since they may be
        // the only thing keeping a newest-generation variable reachable
        for var in self.middle.vars.values().chain(self.oldest.vars.values()) {
            stage_variable(var, &mut staged, &mut temp);
        }

        let survivors: Vec<Rc<Variable>> = self
            .newest
            .vars
            .drain()
            .filter_map(|(k, v)| temp.contains_key(&k).then_some(v))
            .collect();

        for var in survivors {
            var.promote();
            self.middle.vars.insert(key_of(&var), var);
        }

        self.stats.record_minor_collection();
        tracing::debug!(staged = staged.len(), "gc pass complete");
    }

    /// A full trace over all three generations, reaping anything
    /// unreachable anywhere. This is the only way memory in `middle` or
    /// `oldest` is ever reclaimed.
    pub fn collect_major(&mut self, roots: &[&dyn Trace]) {
        let _span = tracing::debug_span!("gc_collect", generation = "major").entered();
        let mut staged = VariableMap::new();
        let mut temp = VariableMap::new();
        for root in roots {
            root.collect_variables(&mut staged, &mut temp);
        }

        self.newest.vars.retain(|k, _| temp.contains_key(k));
        self.middle.vars.retain(|k, _| temp.contains_key(k));

        let oldest_survivors: Vec<Rc<Variable>> = self
            .oldest
            .vars
            .drain()
            .filter_map(|(k, v)| temp.contains_key(&k).then_some(v))
            .collect();
        for var in oldest_survivors {
            var.set_generation(Generation::Oldest);
            self.oldest.vars.insert(key_of(&var), var);
        }

        let middle_promoted: Vec<Rc<Variable>> = self
            .middle
            .vars
            .iter()
            .filter(|(_, v)| v.generation() == Generation::Oldest)
            .map(|(_, v)| v.clone())
            .collect();
        for var in middle_promoted {
            let key = key_of(&var);
            self.middle.vars.remove(&key);
            self.oldest.vars.insert(key, var);
        }

        self.stats.record_major_collection();
        tracing::debug!(staged = staged.len(), "gc pass complete");
    }

    pub fn live_count(&self) -> usize {
        self.newest.vars.len() + self.middle.vars.len() + self.oldest.vars.len()
    }
}
