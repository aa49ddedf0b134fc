//! Asteria Runtime: the evaluation core of the Asteria scripting language.
//!
//! This crate implements everything a compiled script needs to actually
//! run: the value model (`value`), the reference/subscript machinery that
//! addresses into it (`reference`, `subscript`, `reference_stack`), the
//! context chain and garbage collector that own storage (`context`,
//! `gc`, `variable`), the `AVM_Rod` interpreter and its proper-tail-call
//! support (`rod`, `ptc`, `function`, `variadic`), the native-function
//! binding layer (`argument_reader`, `binding`), and a small standard
//! library (`library`). It does not parse or compile Asteria source; it
//! only executes rods that something upstream (a compiler, or a test, or
//! a hand-assembled fixture) has already built.

pub mod argument_reader;
pub mod binding;
pub mod config;
pub mod context;
pub mod function;
pub mod gc;
pub mod hooks;
pub mod library;
pub mod ptc;
pub mod reference;
pub mod reference_stack;
pub mod rod;
pub mod runtime_error;
pub mod subscript;
pub mod value;
pub mod variable;
pub mod variadic;

pub use config::EmbedderConfig;
pub use context::{ExecutiveContext, Global};
pub use function::InstantiatedFunction;
pub use reference::Reference;
pub use reference_stack::ReferenceStack;
pub use rod::{Rod, RodNode, Status};
pub use runtime_error::RuntimeError;
pub use value::Value;
