//! Asteria Core: language-agnostic primitives shared by the Asteria runtime
//!
//! This crate provides the small, self-contained pieces that the runtime
//! evaluation core builds on but which have no opinion about the script
//! value model itself:
//!
//! - `source_location`: `(file, line, column)` triples attached to rod
//!   records, IR nodes and runtime error frames.
//! - `numeric`: bit-exact ASCII <-> IEEE-754 conversion used by the lexer
//!   and by value formatting.
//! - `alloc_stats`: a small cross-cutting registry of allocation counters,
//!   used by the garbage collector to decide when to run a collection.
//!
//! # Modules

pub mod alloc_stats;
pub mod numeric;
pub mod source_location;

pub use source_location::SourceLocation;
