//! Binding_Generator: adapts a native Rust closure into a `CowFunction`.
//!
//! The original generator overloads on the native callable's exact
//! signature (self-aware vs. not, global-aware vs. not, returning a
//! `Value` vs. a `Reference`) so library authors never write boilerplate
//! `Abstract_Function` impls by hand. Rust closures aren't overloaded by
//! shape the way C++ templates are, so this crate collapses all of them
//! to one closure signature — `Fn(&mut Reference, &mut Global,
//! ReferenceStack) -> Result<Value, RuntimeError>` — and lets callers
//! ignore the `self`/`global` parameters they don't need.

use std::fmt;
use std::rc::Rc;

use asteria_core::SourceLocation;

use crate::context::Global;
use crate::gc::VariableMap;
use crate::reference::Reference;
use crate::reference_stack::ReferenceStack;
use crate::runtime_error::RuntimeError;
use crate::value::{AbstractFunction, CowFunction, Value};

pub type NativeBody = dyn Fn(&mut Reference, &mut Global, ReferenceStack) -> Result<Value, RuntimeError>;

pub struct NativeBinding {
    name: &'static str,
    params: &'static str,
    sloc: SourceLocation,
    body: Box<NativeBody>,
}

impl fmt::Debug for NativeBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativeBinding({})", self.name)
    }
}

impl NativeBinding {
    pub fn new(name: &'static str, params: &'static str, file: &'static str, line: u32, body: impl Fn(&mut Reference, &mut Global, ReferenceStack) -> Result<Value, RuntimeError> + 'static) -> CowFunction {
        Rc::new(NativeBinding { name, params, sloc: SourceLocation::new(file, line, 0), body: Box::new(body) })
    }
}

impl AbstractFunction for NativeBinding {
    fn describe(&self) -> String {
        format!("`{}({})` at '{}'", self.name, self.params, self.sloc)
    }

    fn invoke_ptc_aware(&self, self_ref: &mut Reference, global: &mut Global, stack: ReferenceStack) -> Result<(), RuntimeError> {
        let value = (self.body)(self_ref, global, stack)?;
        *self_ref = Reference::temporary(value);
        Ok(())
    }

    fn collect_variables(&self, _staged: &mut VariableMap, _temp: &mut VariableMap) {}
}

/// Shorthand for binding a no-argument-reading native that only ever needs
/// the call stack already parsed by its caller — used by bindings with a
/// single fixed overload where `ArgumentReader` overhead buys nothing.
pub fn bind(name: &'static str, params: &'static str, file: &'static str, line: u32, body: impl Fn(&mut Reference, &mut Global, ReferenceStack) -> Result<Value, RuntimeError> + 'static) -> CowFunction {
    NativeBinding::new(name, params, file, line, body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binding_describes_itself_with_name_and_params() {
        let f = bind("succ", "x", "test", 1, |_self_ref, _global, mut stack| {
            let n = stack.mut_top(0).dereference_readonly_owned()?;
            match n {
                Value::Int(n) => Ok(Value::Int(n + 1)),
                other => Err(RuntimeError::format(&format!("expected integer, got {}", other.type_name()), SourceLocation::unknown())),
            }
        });
        assert!(f.describe().contains("succ(x)"));
    }

    #[test]
    fn binding_invokes_the_closure() {
        let f = bind("succ", "x", "test", 1, |_self_ref, _global, mut stack| {
            let n = stack.mut_top(0).dereference_readonly_owned()?;
            match n {
                Value::Int(n) => Ok(Value::Int(n + 1)),
                other => Err(RuntimeError::format(&format!("expected integer, got {}", other.type_name()), SourceLocation::unknown())),
            }
        });
        let mut stack = ReferenceStack::new();
        stack.push(Reference::temporary(Value::Int(41)));
        let mut self_ref = Reference::void();
        let mut global = Global::new();
        f.invoke_ptc_aware(&mut self_ref, &mut global, stack).unwrap();
        assert_eq!(self_ref.dereference_readonly_owned().unwrap(), Value::Int(42));
    }
}
