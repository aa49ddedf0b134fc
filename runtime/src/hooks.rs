//! Hook bus: an optional observability callback a `Global` may carry.
//!
//! At most one hook implementation is attached at a time. Every method
//! has a default no-op body so embedders only override what they need;
//! an exception thrown from a hook propagates as a normal `RuntimeError`.

use asteria_core::SourceLocation;

use crate::ptc::PtcDisposition;
use crate::runtime_error::RuntimeError;
use crate::value::CowFunction;

pub trait HookBus {
    fn on_call(&self, _sloc: &SourceLocation, _target: &CowFunction) -> Result<(), RuntimeError> {
        Ok(())
    }

    fn on_return(&self, _sloc: &SourceLocation, _ptc: PtcDisposition) -> Result<(), RuntimeError> {
        Ok(())
    }

    fn on_function_enter(&self, _name: &str) -> Result<(), RuntimeError> {
        Ok(())
    }

    fn on_function_leave(&self, _name: &str) -> Result<(), RuntimeError> {
        Ok(())
    }

    fn on_variable_declare(&self, _sloc: &SourceLocation, _name: &str) -> Result<(), RuntimeError> {
        Ok(())
    }

    fn on_single_step_trap(&self, _sloc: &SourceLocation) -> Result<(), RuntimeError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct CountingHooks {
        calls: Cell<u64>,
    }

    impl HookBus for CountingHooks {
        fn on_call(&self, _sloc: &SourceLocation, _target: &CowFunction) -> Result<(), RuntimeError> {
            self.calls.set(self.calls.get() + 1);
            Ok(())
        }
    }

    #[test]
    fn default_methods_are_no_ops() {
        struct Silent;
        impl HookBus for Silent {}
        let h = Silent;
        assert!(h.on_return(&SourceLocation::unknown(), PtcDisposition::None).is_ok());
    }

    #[test]
    fn on_call_can_count_invocations() {
        let h = CountingHooks { calls: Cell::new(0) };
        h.on_call(&SourceLocation::unknown(), &(dummy_function() as CowFunction)).unwrap();
        assert_eq!(h.calls.get(), 1);
    }

    fn dummy_function() -> std::rc::Rc<dyn crate::value::AbstractFunction> {
        #[derive(Debug)]
        struct D;
        impl crate::value::AbstractFunction for D {
            fn describe(&self) -> String {
                "dummy".into()
            }
            fn invoke_ptc_aware(
                &self,
                _self_ref: &mut crate::reference::Reference,
                _global: &mut crate::context::Global,
                _stack: crate::reference_stack::ReferenceStack,
            ) -> Result<(), RuntimeError> {
                Ok(())
            }
        }
        std::rc::Rc::new(D)
    }
}
