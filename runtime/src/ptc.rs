//! PTC_Arguments: a captured call frame representing a pending tail call.
//!
//! When a rod's tail position is a call, the executor does not recurse;
//! it packages everything the call would have needed into a `PtcArguments`
//! and leaves it as the `Ptc` variant of its result reference. The caller
//! loop (`Reference::dereference_*` call sites, via `check_function_result`
//! in `function.rs`) unwraps these iteratively.

use std::cell::RefCell;
use std::rc::Rc;

use asteria_core::SourceLocation;

use crate::function::InstantiatedFunction;
use crate::reference::Reference;
use crate::reference_stack::ReferenceStack;
use crate::rod::Rod;
use crate::value::CowFunction;

/// How the caller intends to observe the tail call's result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PtcDisposition {
    /// Not a tail call; the caller recurses normally. `PtcArguments` is
    /// never constructed with this disposition.
    None,
    /// `return void-expr;` — the result is discarded once resolved.
    Void,
    /// `return ref expr;` — the caller wants the callee's own reference,
    /// not a copy.
    ByRef,
    /// `return expr;` — the default; the caller wants a copied value.
    ByVal,
}

#[derive(Debug)]
pub struct PtcArguments {
    sloc: SourceLocation,
    ptc: PtcDisposition,
    target: CowFunction,
    self_ref: Reference,
    stack: ReferenceStack,
    caller_opt: Option<Rc<InstantiatedFunction>>,
    defer: RefCell<Vec<(SourceLocation, Rc<Rod>)>>,
}

impl PtcArguments {
    pub fn new(sloc: SourceLocation, ptc: PtcDisposition, target: CowFunction, self_ref: Reference, stack: ReferenceStack) -> Self {
        PtcArguments { sloc, ptc, target, self_ref, stack, caller_opt: None, defer: RefCell::new(Vec::new()) }
    }

    pub fn sloc(&self) -> &SourceLocation {
        &self.sloc
    }

    pub fn ptc_aware(&self) -> PtcDisposition {
        self.ptc
    }

    pub fn target(&self) -> &CowFunction {
        &self.target
    }

    pub fn into_parts(self) -> (SourceLocation, PtcDisposition, CowFunction, Reference, ReferenceStack, Option<Rc<InstantiatedFunction>>, Vec<(SourceLocation, Rc<Rod>)>) {
        let defer = self.defer.into_inner();
        (self.sloc, self.ptc, self.target, self.self_ref, self.stack, self.caller_opt, defer)
    }

    pub fn self_ref(&self) -> &Reference {
        &self.self_ref
    }

    pub fn mut_self_ref(&mut self) -> &mut Reference {
        &mut self.self_ref
    }

    pub fn stack(&self) -> &ReferenceStack {
        &self.stack
    }

    pub fn mut_stack(&mut self) -> &mut ReferenceStack {
        &mut self.stack
    }

    pub fn caller_opt(&self) -> Option<&Rc<InstantiatedFunction>> {
        self.caller_opt.as_ref()
    }

    pub fn set_caller(&mut self, caller: Rc<InstantiatedFunction>) {
        self.caller_opt = Some(caller);
    }

    /// Appends a defer captured from the returning function's own scope;
    /// this is how `defer` survives a tail call (§4.4: defers of a frame
    /// whose result is a pending PTC are not run locally, they are moved
    /// here so they fire once the tail call actually resolves). Takes
    /// `&self` since a `PtcArguments` is reached through a plain
    /// `Reference`, not a unique owner, by the time defers are appended.
    pub fn push_defer(&self, sloc: SourceLocation, rod: Rc<Rod>) {
        self.defer.borrow_mut().push((sloc, rod));
    }

    pub fn collect_variables(&self, staged: &mut crate::gc::VariableMap, temp: &mut crate::gc::VariableMap) {
        self.self_ref.collect_variables(staged, temp);
        self.stack.collect_variables(staged, temp);
        for (_, rod) in self.defer.borrow().iter() {
            rod.collect_variables(staged, temp);
        }
    }
}
