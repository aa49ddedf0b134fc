//! Reference: a path expression evaluated against the heap.
//!
//! A `Reference` is one of five variants plus an ordered list of
//! `Subscript`s applied on top of it. Values are only ever observed by
//! dereferencing a `Reference`; nothing else in the evaluator holds a bare
//! `Value` for longer than one step.

use std::rc::Rc;

use asteria_core::SourceLocation;

use crate::ptc::PtcArguments;
use crate::runtime_error::RuntimeError;
use crate::subscript::Subscript;
use crate::value::{Value, NULL};
use crate::variable::Variable;

#[derive(Debug, Clone)]
enum RefBase {
    Invalid,
    Void,
    Temporary(Value),
    Variable(Rc<Variable>),
    Ptc(Rc<PtcArguments>),
}

#[derive(Debug, Clone)]
pub struct Reference {
    base: RefBase,
    subscripts: Vec<Subscript>,
}

impl Default for Reference {
    fn default() -> Self {
        Reference::invalid()
    }
}

impl Reference {
    pub fn invalid() -> Self {
        Reference { base: RefBase::Invalid, subscripts: Vec::new() }
    }

    pub fn void() -> Self {
        Reference { base: RefBase::Void, subscripts: Vec::new() }
    }

    pub fn temporary(value: Value) -> Self {
        Reference { base: RefBase::Temporary(value), subscripts: Vec::new() }
    }

    pub fn variable(var: Rc<Variable>) -> Self {
        Reference { base: RefBase::Variable(var), subscripts: Vec::new() }
    }

    pub fn ptc(ptc: Rc<PtcArguments>) -> Self {
        Reference { base: RefBase::Ptc(ptc), subscripts: Vec::new() }
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self.base, RefBase::Invalid)
    }

    pub fn is_void(&self) -> bool {
        matches!(self.base, RefBase::Void)
    }

    pub fn is_ptc(&self) -> bool {
        matches!(self.base, RefBase::Ptc(_))
    }

    pub fn as_ptc(&self) -> Option<&Rc<PtcArguments>> {
        match &self.base {
            RefBase::Ptc(p) => Some(p),
            _ => None,
        }
    }

    /// Detaches a pending tail call, leaving `self` reset to invalid. Used
    /// by the PTC-resolution loop, which replaces each resolved call with
    /// whatever the callee itself produced (possibly another pending call).
    pub fn take_ptc(&mut self) -> Option<Rc<PtcArguments>> {
        match std::mem::replace(&mut self.base, RefBase::Invalid) {
            RefBase::Ptc(p) => Some(p),
            other => {
                self.base = other;
                None
            }
        }
    }

    pub fn as_variable(&self) -> Option<&Rc<Variable>> {
        match &self.base {
            RefBase::Variable(v) => Some(v),
            _ => None,
        }
    }

    pub fn push_subscript(&mut self, sub: Subscript) -> Result<(), RuntimeError> {
        match self.base {
            RefBase::Temporary(_) | RefBase::Variable(_) => {
                self.subscripts.push(sub);
                Ok(())
            }
            _ => Err(RuntimeError::format(
                "attempt to subscript a non-dereferenceable reference",
                SourceLocation::unknown(),
            )),
        }
    }

    pub fn pop_subscript(&mut self, count: usize) {
        if count <= self.subscripts.len() {
            let new_len = self.subscripts.len() - count;
            self.subscripts.truncate(new_len);
        } else {
            self.base = RefBase::Void;
            self.subscripts.clear();
        }
    }

    /// Readonly dereference returning an owned `Value` (clones containers
    /// cheaply via `Rc`). If any intermediate subscript misses, the result
    /// is the static null, not an error. This is the form most of the
    /// evaluator uses, since a `Variable`'s value lives behind a `RefCell`
    /// and cannot be borrowed out past this call.
    pub fn dereference_readonly_owned(&self) -> Result<Value, RuntimeError> {
        match &self.base {
            RefBase::Temporary(v) => Ok(apply_subscripts_read(v, &self.subscripts).clone()),
            RefBase::Variable(var) => {
                if !var.is_initialized() {
                    return Err(RuntimeError::format(
                        "Variable not initialized",
                        SourceLocation::unknown(),
                    ));
                }
                let guard = var.get();
                Ok(apply_subscripts_read(&guard, &self.subscripts).clone())
            }
            RefBase::Void => Err(RuntimeError::format(
                "attempt to use the result of a void function",
                SourceLocation::unknown(),
            )),
            RefBase::Invalid => Err(RuntimeError::format(
                "reference not initialized",
                SourceLocation::unknown(),
            )),
            RefBase::Ptc(_) => Err(RuntimeError::format(
                "pending tail call not resolved before dereference",
                SourceLocation::unknown(),
            )),
        }
    }

    /// Mutable dereference: requires a `Variable` base that is initialized
    /// and not `const`. Temporaries are not user-modifiable.
    pub fn dereference_mutable<'a>(&'a self, f: impl FnOnce(&mut Value) -> Result<(), RuntimeError>) -> Result<(), RuntimeError> {
        match &self.base {
            RefBase::Variable(var) => {
                if !var.is_initialized() {
                    return Err(RuntimeError::format(
                        "Variable not initialized",
                        SourceLocation::unknown(),
                    ));
                }
                if var.is_immutable() {
                    return Err(RuntimeError::format(
                        "`const` variable not modifiable",
                        SourceLocation::unknown(),
                    ));
                }
                let mut guard = var.get_mut();
                let target = apply_subscripts_open(&mut guard, &self.subscripts)?;
                f(target)
            }
            RefBase::Temporary(_) => Err(RuntimeError::format(
                "attempt to modify a temporary value",
                SourceLocation::unknown(),
            )),
            _ => Err(RuntimeError::format(
                "attempt to modify a non-dereferenceable reference",
                SourceLocation::unknown(),
            )),
        }
    }

    /// Copy dereference: owning value extracted by copy-on-write of the
    /// last container, collapsing subscripts. Used internally (e.g. to
    /// materialize a value before pushing it as an argument).
    pub fn dereference_copy(&self) -> Result<Value, RuntimeError> {
        self.dereference_readonly_owned()
    }

    /// Unset dereference: removes and returns the subelement identified by
    /// the final subscript. Zero subscripts is an error.
    pub fn dereference_unset(&self) -> Result<Value, RuntimeError> {
        let (last, rest) = self
            .subscripts
            .split_last()
            .ok_or_else(|| RuntimeError::format("cannot unset a reference with no subscript", SourceLocation::unknown()))?;

        match &self.base {
            RefBase::Variable(var) => {
                if !var.is_initialized() {
                    return Err(RuntimeError::format(
                        "Variable not initialized",
                        SourceLocation::unknown(),
                    ));
                }
                if var.is_immutable() {
                    return Err(RuntimeError::format(
                        "`const` variable not modifiable",
                        SourceLocation::unknown(),
                    ));
                }
                let mut guard = var.get_mut();
                let parent = apply_subscripts_open(&mut guard, rest)?;
                Ok(last.apply_unset(parent))
            }
            RefBase::Temporary(v) => {
                let mut v = v.clone();
                let parent = apply_subscripts_open(&mut v, rest)?;
                Ok(last.apply_unset(parent))
            }
            _ => Err(RuntimeError::format(
                "attempt to unset through a non-dereferenceable reference",
                SourceLocation::unknown(),
            )),
        }
    }

    pub fn collect_variables(&self, staged: &mut crate::gc::VariableMap, temp: &mut crate::gc::VariableMap) {
        match &self.base {
            RefBase::Variable(var) => crate::gc::stage_variable(var, staged, temp),
            RefBase::Temporary(v) => v.collect_variables(staged, temp),
            RefBase::Ptc(p) => p.collect_variables(staged, temp),
            RefBase::Invalid | RefBase::Void => {}
        }
    }
}

fn apply_subscripts_read<'v>(base: &'v Value, subs: &[Subscript]) -> &'v Value {
    let mut current = base;
    for sub in subs {
        match sub.apply_read(current) {
            Some(v) => current = v,
            None => return &NULL,
        }
    }
    current
}

fn apply_subscripts_open<'v>(base: &'v mut Value, subs: &[Subscript]) -> Result<&'v mut Value, RuntimeError> {
    let mut current = base;
    for sub in subs {
        current = sub
            .apply_open(current)
            .map_err(|msg| RuntimeError::format(&msg, SourceLocation::unknown()))?;
    }
    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn readonly_missing_subscript_is_static_null() {
        let r = Reference::temporary(Value::object(Default::default()));
        let mut r = r;
        r.push_subscript(Subscript::from("missing")).unwrap();
        let v = r.dereference_readonly_owned().unwrap();
        assert_eq!(v, Value::Null);
    }

    #[test]
    fn temporary_rejects_mutable_dereference() {
        let r = Reference::temporary(Value::Int(1));
        let err = r.dereference_mutable(|_| Ok(())).unwrap_err();
        assert!(err.what().contains("temporary"));
    }

    #[test]
    fn unset_with_no_subscript_is_an_error() {
        let r = Reference::temporary(Value::Int(1));
        assert!(r.dereference_unset().is_err());
    }
}
