//! Instantiated_Function: a finalized rod plus the metadata needed to call
//! it — source location, display name, and declared parameter list.
//!
//! `invoke_ptc_aware` is the one place that turns an `AIR_Status` exit
//! code back into the uniform `self_ref`-mutation ABI every callable
//! implements (§6.2): `next`/`return_void` clears to void, `return_ref`
//! takes the top of the primary stack, and a stray `break`/`continue`
//! escaping the function body is itself a runtime error.

use std::fmt;
use std::rc::Rc;

use asteria_core::SourceLocation;

use crate::context::{ExecutiveContext, Global};
use crate::gc::VariableMap;
use crate::reference::Reference;
use crate::reference_stack::ReferenceStack;
use crate::rod::{Rod, Status};
use crate::runtime_error::RuntimeError;
use crate::value::AbstractFunction;

#[derive(Clone)]
pub struct InstantiatedFunction {
    sloc: SourceLocation,
    name: Rc<str>,
    params: Vec<Rc<str>>,
    rod: Rc<Rod>,
}

impl fmt::Debug for InstantiatedFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InstantiatedFunction({})", self.name)
    }
}

impl InstantiatedFunction {
    pub fn new(sloc: SourceLocation, name: impl Into<Rc<str>>, params: Vec<Rc<str>>, rod: Rod) -> Self {
        InstantiatedFunction { sloc, name: name.into(), params, rod: Rc::new(rod) }
    }

    pub fn sloc(&self) -> &SourceLocation {
        &self.sloc
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &[Rc<str>] {
        &self.params
    }
}

impl AbstractFunction for InstantiatedFunction {
    fn describe(&self) -> String {
        format!("`{}` at '{}'", self.name, self.sloc)
    }

    fn invoke_ptc_aware(&self, self_ref: &mut Reference, global: &mut Global, mut stack: ReferenceStack) -> Result<(), RuntimeError> {
        let func_ctx = ExecutiveContext::new_function(Rc::new(self.clone()), std::mem::take(self_ref), &mut stack)?;
        let mut alt_stack = ReferenceStack::new();

        if let Some(hooks) = global.hooks() {
            hooks.on_function_enter(&self.name)?;
        }

        let result = self.rod.execute(&func_ctx, global, &mut stack, &mut alt_stack);

        if let Some(hooks) = global.hooks() {
            hooks.on_function_leave(&self.name)?;
        }

        let status = match result {
            Ok(status) => status,
            Err(mut err) => {
                func_ctx.run_defers_exceptional(&mut err, global, &mut stack, &mut alt_stack);
                err.push_frame_function(self.sloc.clone(), &self.name);
                return Err(err);
            }
        };

        let status = func_ctx.run_defers_normal(status, global, &mut stack, &mut alt_stack)?;

        match status {
            Status::Next | Status::ReturnVoid => {
                *self_ref = Reference::void();
                Ok(())
            }
            Status::ReturnRef => {
                *self_ref = stack.mut_top(0).clone();
                Ok(())
            }
            Status::BreakUnspec | Status::BreakSwitch | Status::BreakWhile | Status::BreakFor => {
                Err(RuntimeError::format("stray `break` statement", self.sloc.clone()))
            }
            Status::ContinueUnspec | Status::ContinueWhile | Status::ContinueFor => {
                Err(RuntimeError::format("stray `continue` statement", self.sloc.clone()))
            }
        }
    }

    fn collect_variables(&self, staged: &mut VariableMap, temp: &mut VariableMap) {
        self.rod.collect_variables(staged, temp);
    }
}
