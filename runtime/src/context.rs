//! Contexts (scopes): a name -> `Reference` map chained to a parent.
//!
//! Three executive kinds exist. A **function** context is the root of an
//! invocation: it binds parameter names off the incoming stack and owns
//! the call's defer list. A **plain** context is any nested block scope
//! (an `if`/`while`/`{}` body); it chains to its parent for name lookup
//! but has no defer list or magic names of its own. A **defer** context
//! is a throwaway scope used only to run a captured defer list once its
//! enclosing function frame is gone (tail-call unwind, §4.3) — it has no
//! parent and no magic names.
//!
//! Lazy "magic" names (`__this`, `__func`, `__varg`) are synthesized on
//! first lookup in a function context rather than populated eagerly for
//! every call.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use asteria_core::SourceLocation;

use crate::function::InstantiatedFunction;
use crate::gc::{GarbageCollector, VariableMap};
use crate::hooks::HookBus;
use crate::reference::Reference;
use crate::reference_stack::ReferenceStack;
use crate::rod::Rod;
use crate::runtime_error::RuntimeError;
use crate::value::{CowFunction, Value};
use crate::variadic::VariadicArguer;

#[derive(Default)]
struct Scope {
    named: HashMap<Rc<str>, Reference>,
}

enum Kind {
    Plain,
    Function { func: Rc<InstantiatedFunction>, lazy_args: Vec<Reference> },
    Defer,
}

pub struct ExecutiveContext {
    parent: Option<Rc<ExecutiveContext>>,
    scope: RefCell<Scope>,
    kind: Kind,
    defer: RefCell<Vec<(SourceLocation, Rc<Rod>)>>,
}

impl ExecutiveContext {
    pub fn new_plain(parent: Rc<ExecutiveContext>) -> Rc<Self> {
        Rc::new(ExecutiveContext {
            parent: Some(parent),
            scope: RefCell::new(Scope::default()),
            kind: Kind::Plain,
            defer: RefCell::new(Vec::new()),
        })
    }

    pub fn new_defer() -> Rc<Self> {
        Rc::new(ExecutiveContext {
            parent: None,
            scope: RefCell::new(Scope::default()),
            kind: Kind::Defer,
            defer: RefCell::new(Vec::new()),
        })
    }

    /// Binds the incoming stack's arguments to `func`'s declared parameter
    /// names. Missing parameters become void temporaries; a surplus is an
    /// error unless the parameter list ends in the `...` sentinel, in
    /// which case the overflow is captured for `__varg`.
    pub fn new_function(func: Rc<InstantiatedFunction>, self_ref: Reference, stack: &mut ReferenceStack) -> Result<Rc<Self>, RuntimeError> {
        let mut scope = Scope::default();
        if !self_ref.is_void() {
            scope.named.insert(Rc::from("__this"), self_ref);
        }

        let size = stack.size();
        let mut idx = 0usize;
        let mut has_ellipsis = false;
        for name in func.params() {
            if name.as_ref() == "..." {
                has_ellipsis = true;
                continue;
            }
            let r = if idx < size {
                let taken = std::mem::take(stack.mut_bottom(idx));
                idx += 1;
                taken
            } else {
                Reference::temporary(Value::Null)
            };
            scope.named.insert(Rc::from(name.as_ref()), r);
        }

        let mut lazy_args = Vec::new();
        if idx < size {
            if !has_ellipsis {
                return Err(RuntimeError::format(
                    &format!("too many arguments passed to `{}`", func.name()),
                    SourceLocation::unknown(),
                ));
            }
            while idx < size {
                lazy_args.push(std::mem::take(stack.mut_bottom(idx)));
                idx += 1;
            }
        }
        stack.clear();

        Ok(Rc::new(ExecutiveContext {
            parent: None,
            scope: RefCell::new(scope),
            kind: Kind::Function { func, lazy_args },
            defer: RefCell::new(Vec::new()),
        }))
    }

    pub fn parent(&self) -> Option<&Rc<ExecutiveContext>> {
        self.parent.as_ref()
    }

    fn is_function(&self) -> bool {
        matches!(self.kind, Kind::Function { .. })
    }

    /// Walks up from `ctx` to the nearest enclosing function context, which
    /// is where `defer` statements register (§4.4: "current function
    /// context's defer list"), not wherever the `defer` statement's own
    /// block scope happens to be.
    pub fn function_root(ctx: &Rc<ExecutiveContext>) -> Rc<ExecutiveContext> {
        let mut cur = ctx.clone();
        loop {
            if cur.is_function() {
                return cur;
            }
            match cur.parent.clone() {
                Some(p) => cur = p,
                None => return cur,
            }
        }
    }

    /// Walks this context and its ancestors looking for `name`, lazily
    /// synthesizing `__func`/`__varg` on first mention in the nearest
    /// enclosing function context.
    pub fn lookup(&self, name: &str) -> Option<Reference> {
        if let Some(r) = self.scope.borrow().named.get(name) {
            return Some(r.clone());
        }
        if let Kind::Function { func, lazy_args } = &self.kind {
            match name {
                "__func" => {
                    let r = Reference::temporary(Value::String(func.name().to_string().into()));
                    self.scope.borrow_mut().named.insert(Rc::from(name), r.clone());
                    return Some(r);
                }
                "__varg" => {
                    let arguer: CowFunction = Rc::new(VariadicArguer::new(func.clone(), lazy_args.clone()));
                    let r = Reference::temporary(Value::Function(arguer));
                    self.scope.borrow_mut().named.insert(Rc::from(name), r.clone());
                    return Some(r);
                }
                _ => {}
            }
        }
        self.parent.as_ref().and_then(|p| p.lookup(name))
    }

    /// Declares (or redeclares) `name` in this context's own scope,
    /// shadowing any same-named binding in a parent.
    pub fn declare(&self, name: &str, r: Reference) {
        self.scope.borrow_mut().named.insert(Rc::from(name), r);
    }

    pub fn push_defer(&self, sloc: SourceLocation, rod: Rc<Rod>) {
        self.defer.borrow_mut().push((sloc, rod));
    }

    pub fn has_defer(&self) -> bool {
        !self.defer.borrow().is_empty()
    }

    pub fn take_defer(&self) -> Vec<(SourceLocation, Rc<Rod>)> {
        std::mem::take(&mut *self.defer.borrow_mut())
    }

    fn pop_defer_back(&self) -> Option<(SourceLocation, Rc<Rod>)> {
        self.defer.borrow_mut().pop()
    }

    /// Scope-exit, normal path (§4.4). If the result is a pending tail
    /// call, the defer list is not run here at all — it moves onto the
    /// PTC so it fires once the tail call actually resolves. Otherwise
    /// each defer runs in a throwaway context, most-recently-registered
    /// first; a throw aborts the remaining defers and is annotated with
    /// a `defer` frame before propagating.
    pub fn run_defers_normal(&self, status: crate::rod::Status, global: &mut Global, stack: &mut ReferenceStack, alt_stack: &mut ReferenceStack) -> Result<crate::rod::Status, RuntimeError> {
        use crate::rod::Status;

        if !self.has_defer() {
            return Ok(status);
        }

        if status == Status::ReturnRef {
            if let Some(ptc) = stack.top(0).as_ptc() {
                while let Some((sloc, rod)) = self.pop_defer_back() {
                    ptc.push_defer(sloc, rod);
                }
                return Ok(status);
            }
        }

        let saved_result = if status == Status::ReturnRef {
            let r = std::mem::take(stack.mut_top(0));
            stack.pop(1);
            Some(r)
        } else {
            None
        };

        while let Some((sloc, rod)) = self.pop_defer_back() {
            let defer_ctx = ExecutiveContext::new_defer();
            if let Err(mut err) = rod.execute(&defer_ctx, global, stack, alt_stack) {
                err.push_frame_defer(sloc);
                self.run_defers_exceptional(&mut err, global, stack, alt_stack);
                return Err(err);
            }
        }

        if let Some(r) = saved_result {
            stack.push(r);
        }
        Ok(status)
    }

    /// Scope-exit, exceptional path: keeps draining the same defer list,
    /// running each in turn; if a defer itself throws, it *replaces* the
    /// in-flight exception (annotated with a `defer` frame) rather than
    /// being swallowed.
    pub fn run_defers_exceptional(&self, err: &mut RuntimeError, global: &mut Global, stack: &mut ReferenceStack, alt_stack: &mut ReferenceStack) {
        while let Some((sloc, rod)) = self.pop_defer_back() {
            let defer_ctx = ExecutiveContext::new_defer();
            if let Err(mut nested) = rod.execute(&defer_ctx, global, stack, alt_stack) {
                nested.push_frame_defer(sloc);
                *err = nested;
            }
        }
    }

    pub fn collect_variables(&self, staged: &mut VariableMap, temp: &mut VariableMap) {
        for r in self.scope.borrow().named.values() {
            r.collect_variables(staged, temp);
        }
        for (_, rod) in self.defer.borrow().iter() {
            rod.collect_variables(staged, temp);
        }
        if let Kind::Function { lazy_args, .. } = &self.kind {
            for r in lazy_args {
                r.collect_variables(staged, temp);
            }
        }
    }
}

/// The process-wide context: garbage collector, RNG state, hook bus, and
/// the registered top-level bindings a script sees as e.g. `std`.
pub struct Global {
    gc: RefCell<GarbageCollector>,
    hooks: RefCell<Option<Rc<dyn HookBus>>>,
    globals: RefCell<HashMap<Rc<str>, Value>>,
    rng_counter: std::cell::Cell<u64>,
    initial_stack_capacity: usize,
}

impl Global {
    pub fn new() -> Self {
        Global::with_config(crate::config::EmbedderConfig::default())
    }

    /// Builds a `Global` from embedder-chosen tunables (§4.11: GC
    /// threshold, initial stack capacity, whether `std` gets registered).
    pub fn with_config(config: crate::config::EmbedderConfig) -> Self {
        let global = Global {
            gc: RefCell::new(GarbageCollector::new(config.gc_threshold)),
            hooks: RefCell::new(None),
            globals: RefCell::new(HashMap::new()),
            rng_counter: std::cell::Cell::new(0),
            initial_stack_capacity: config.initial_stack_capacity,
        };
        if config.register_std {
            crate::library::register_std(&global);
        }
        global
    }

    /// A fresh `ReferenceStack` pre-sized to this `Global`'s configured
    /// initial capacity, for callers assembling a top-level call.
    pub fn new_stack(&self) -> crate::reference_stack::ReferenceStack {
        crate::reference_stack::ReferenceStack::with_capacity(self.initial_stack_capacity)
    }

    pub fn gc(&self) -> std::cell::RefMut<'_, GarbageCollector> {
        self.gc.borrow_mut()
    }

    pub fn set_hooks(&self, hooks: Rc<dyn HookBus>) {
        *self.hooks.borrow_mut() = Some(hooks);
    }

    pub fn hooks(&self) -> Option<Rc<dyn HookBus>> {
        self.hooks.borrow().clone()
    }

    pub fn set_global(&self, name: impl Into<Rc<str>>, value: Value) {
        self.globals.borrow_mut().insert(name.into(), value);
    }

    pub fn get_global(&self, name: &str) -> Option<Value> {
        self.globals.borrow().get(name).cloned()
    }

    /// A stream of distinct seeds for `ArrayRandom` subscripts and other
    /// non-cryptographic uses; not shared with the host RNG.
    pub fn next_rng_seed(&self) -> u32 {
        let v = self.rng_counter.get();
        self.rng_counter.set(v.wrapping_add(0x9E37_79B9));
        v as u32
    }
}

impl Default for Global {
    fn default() -> Self {
        Global::new()
    }
}
