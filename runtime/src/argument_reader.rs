//! Argument_Reader: positional argument parsing for native bindings, with
//! support for trying several overloads against the same call before
//! giving up.
//!
//! A binding calls `start_overload()`, then `required`/`optional` once per
//! declared parameter in order, then `end_overload()`; a type mismatch or
//! leftover/missing argument marks the overload as failed without raising
//! an error immediately, so the binding can fall through to the next
//! overload. Only `throw_no_matching_function_call` actually raises,
//! listing every overload signature that was tried.

use asteria_core::SourceLocation;

use crate::reference::Reference;
use crate::reference_stack::ReferenceStack;
use crate::runtime_error::RuntimeError;
use crate::value::{AsteriaString, CowFunction, ObjectMap, Opaque, Value};

struct State {
    params: String,
    nparams: u32,
    matched: bool,
}

impl Default for State {
    fn default() -> Self {
        State { params: String::new(), nparams: 0, matched: true }
    }
}

pub struct ArgumentReader {
    name: String,
    stack: ReferenceStack,
    state: State,
    overloads: Vec<String>,
}

impl ArgumentReader {
    pub fn new(name: impl Into<String>, stack: ReferenceStack) -> Self {
        ArgumentReader { name: name.into(), stack, state: State::default(), overloads: Vec::new() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Resets per-overload state. Call once before each group of
    /// `required`/`optional` calls.
    pub fn start_overload(&mut self) {
        self.state = State::default();
    }

    fn peek(&self) -> Option<&Reference> {
        let idx = self.state.nparams as usize;
        if idx < self.stack.size() {
            Some(self.stack.bottom(idx))
        } else {
            None
        }
    }

    fn advance(&mut self, type_name: &str) {
        self.state.params.push(':');
        self.state.params.push_str(type_name);
        self.state.nparams += 1;
    }

    fn mark_failure(&mut self) {
        self.state.matched = false;
    }

    /// `None` if the argument is absent or explicitly `null`; `Some(T)` if
    /// present and of the expected type. Any other type marks the overload
    /// as non-matching (not an error — the caller tries the next overload).
    pub fn optional<T>(&mut self, extract: impl FnOnce(&Value) -> Option<T>, type_name: &str) -> Option<T> {
        self.advance(type_name);
        match self.peek() {
            None => None,
            Some(r) => match r.dereference_readonly_owned() {
                Ok(Value::Null) => None,
                Ok(v) => match extract(&v) {
                    Some(t) => Some(t),
                    None => {
                        self.mark_failure();
                        None
                    }
                },
                Err(_) => {
                    self.mark_failure();
                    None
                }
            },
        }
    }

    /// Like `optional`, but absence or a type mismatch both mark the
    /// overload as non-matching.
    pub fn required<T>(&mut self, extract: impl FnOnce(&Value) -> Option<T>, type_name: &str) -> Option<T> {
        self.advance(type_name);
        match self.peek() {
            None => {
                self.mark_failure();
                None
            }
            Some(r) => match r.dereference_readonly_owned() {
                Ok(v) => match extract(&v) {
                    Some(t) => Some(t),
                    None => {
                        self.mark_failure();
                        None
                    }
                },
                Err(_) => {
                    self.mark_failure();
                    None
                }
            },
        }
    }

    pub fn required_bool(&mut self) -> Option<bool> {
        self.required(|v| if let Value::Bool(b) = v { Some(*b) } else { None }, "boolean")
    }

    pub fn optional_bool(&mut self) -> Option<bool> {
        self.optional(|v| if let Value::Bool(b) = v { Some(*b) } else { None }, "boolean")
    }

    pub fn required_int(&mut self) -> Option<i64> {
        self.required(|v| if let Value::Int(n) = v { Some(*n) } else { None }, "integer")
    }

    pub fn optional_int(&mut self) -> Option<i64> {
        self.optional(|v| if let Value::Int(n) = v { Some(*n) } else { None }, "integer")
    }

    pub fn required_real(&mut self) -> Option<f64> {
        self.required(
            |v| match v {
                Value::Real(r) => Some(*r),
                Value::Int(n) => Some(*n as f64),
                _ => None,
            },
            "real",
        )
    }

    pub fn optional_real(&mut self) -> Option<f64> {
        self.optional(
            |v| match v {
                Value::Real(r) => Some(*r),
                Value::Int(n) => Some(*n as f64),
                _ => None,
            },
            "real",
        )
    }

    pub fn required_string(&mut self) -> Option<AsteriaString> {
        self.required(|v| if let Value::String(s) = v { Some(s.clone()) } else { None }, "string")
    }

    pub fn optional_string(&mut self) -> Option<AsteriaString> {
        self.optional(|v| if let Value::String(s) = v { Some(s.clone()) } else { None }, "string")
    }

    pub fn required_array(&mut self) -> Option<Vec<Value>> {
        self.required(|v| v.as_array().map(<[Value]>::to_vec), "array")
    }

    pub fn required_object(&mut self) -> Option<ObjectMap> {
        self.required(|v| v.as_object().cloned(), "object")
    }

    pub fn required_function(&mut self) -> Option<CowFunction> {
        self.required(|v| if let Value::Function(f) = v { Some(f.clone()) } else { None }, "function")
    }

    pub fn required_opaque(&mut self) -> Option<Opaque> {
        self.required(|v| if let Value::Opaque(o) = v { Some(o.clone()) } else { None }, "opaque")
    }

    /// Declares the end of an overload's fixed parameters and forbids
    /// variadic arguments: matches only if every declared parameter
    /// matched and no extra arguments remain.
    pub fn end_overload(&mut self) -> bool {
        let matches = self.state.matched && (self.state.nparams as usize) == self.stack.size();
        self.record_overload();
        matches
    }

    /// Like `end_overload`, but accepts (and returns) any arguments beyond
    /// the declared fixed ones as variadic trailing references.
    pub fn end_overload_variadic(&mut self) -> Option<Vec<Reference>> {
        if !self.state.matched {
            self.record_overload();
            return None;
        }
        let extra: Vec<Reference> = (self.state.nparams as usize..self.stack.size())
            .map(|i| self.stack.bottom(i).clone())
            .collect();
        self.record_overload();
        Some(extra)
    }

    fn record_overload(&mut self) {
        let mut sig = self.name.clone();
        sig.push('(');
        sig.push_str(self.state.params.trim_start_matches(':').replace(':', ", ").as_str());
        sig.push(')');
        self.overloads.push(sig);
    }

    /// Raises "no matching function call" listing every overload signature
    /// tried so far, in the order `end_overload` rejected them.
    pub fn throw_no_matching_function_call(&self) -> RuntimeError {
        let mut message = format!("no matching overload for `{}` found; candidates are:", self.name);
        for sig in &self.overloads {
            message.push_str("\n  ");
            message.push_str(sig);
        }
        RuntimeError::format(&message, SourceLocation::unknown())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_type_mismatch_rejects_the_overload() {
        let mut stack = ReferenceStack::new();
        stack.push(Reference::temporary(Value::String("x".into())));
        let mut reader = ArgumentReader::new("f", stack);

        reader.start_overload();
        let n = reader.required_int();
        assert!(n.is_none());
        assert!(!reader.end_overload());
    }

    #[test]
    fn optional_missing_argument_is_none_and_still_matches() {
        let stack = ReferenceStack::new();
        let mut reader = ArgumentReader::new("f", stack);

        reader.start_overload();
        let n = reader.optional_int();
        assert!(n.is_none());
        assert!(reader.end_overload());
    }

    #[test]
    fn extra_arguments_reject_a_non_variadic_overload() {
        let mut stack = ReferenceStack::new();
        stack.push(Reference::temporary(Value::Int(1)));
        stack.push(Reference::temporary(Value::Int(2)));
        let mut reader = ArgumentReader::new("f", stack);

        reader.start_overload();
        let _ = reader.required_int();
        assert!(!reader.end_overload());
    }

    #[test]
    fn variadic_overload_captures_trailing_arguments() {
        let mut stack = ReferenceStack::new();
        stack.push(Reference::temporary(Value::Int(1)));
        stack.push(Reference::temporary(Value::Int(2)));
        stack.push(Reference::temporary(Value::Int(3)));
        let mut reader = ArgumentReader::new("f", stack);

        reader.start_overload();
        let _ = reader.required_int();
        let vargs = reader.end_overload_variadic().unwrap();
        assert_eq!(vargs.len(), 2);
    }
}
