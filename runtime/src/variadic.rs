//! Variadic_Arguer: the native callable bound to `__varg` in a function
//! context whose parameter list ends in `...`.
//!
//! Given no argument, it returns the count of captured variadic arguments;
//! given an integer, it returns the indexed argument (wrapping negative
//! indices once, like array subscripting) or `null` if still out of range.

use std::fmt;
use std::rc::Rc;

use asteria_core::SourceLocation;

use crate::context::Global;
use crate::function::InstantiatedFunction;
use crate::gc::VariableMap;
use crate::reference::Reference;
use crate::reference_stack::ReferenceStack;
use crate::runtime_error::RuntimeError;
use crate::value::{AbstractFunction, Value};

pub struct VariadicArguer {
    sloc: SourceLocation,
    func_name: Rc<str>,
    vargs: Vec<Reference>,
}

impl fmt::Debug for VariadicArguer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VariadicArguer({})", self.func_name)
    }
}

impl VariadicArguer {
    pub fn new(func: Rc<InstantiatedFunction>, vargs: Vec<Reference>) -> Self {
        VariadicArguer { sloc: func.sloc().clone(), func_name: func.name().into(), vargs }
    }

    pub fn is_empty(&self) -> bool {
        self.vargs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.vargs.len()
    }

    pub fn arg(&self, index: usize) -> Option<&Reference> {
        self.vargs.get(index)
    }
}

impl AbstractFunction for VariadicArguer {
    fn describe(&self) -> String {
        format!("`__varg([index])` at '{}'", self.sloc)
    }

    fn invoke_ptc_aware(&self, self_ref: &mut Reference, _global: &mut Global, stack: ReferenceStack) -> Result<(), RuntimeError> {
        if stack.is_empty() {
            *self_ref = Reference::temporary(Value::Int(self.vargs.len() as i64));
            return Ok(());
        }
        if stack.size() > 1 {
            return Err(RuntimeError::format("`__varg` takes at most one argument", self.sloc.clone()));
        }

        let arg = stack.top(0).dereference_readonly_owned()?;
        match arg {
            Value::Null => {
                *self_ref = Reference::temporary(Value::Int(self.vargs.len() as i64));
            }
            Value::Int(index) => {
                let len = self.vargs.len() as i64;
                let resolved = if index >= 0 { index } else { len + index };
                if resolved < 0 || resolved >= len {
                    *self_ref = Reference::temporary(Value::Null);
                } else {
                    *self_ref = self.vargs[resolved as usize].clone();
                }
            }
            other => {
                return Err(RuntimeError::format(
                    &format!("`__varg` index must be an integer or null, got {}", other.type_name()),
                    self.sloc.clone(),
                ));
            }
        }
        Ok(())
    }

    fn collect_variables(&self, staged: &mut VariableMap, temp: &mut VariableMap) {
        for r in &self.vargs {
            r.collect_variables(staged, temp);
        }
    }
}
