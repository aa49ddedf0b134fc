//! Source locations
//!
//! A `SourceLocation` is attached, optionally, to rod records, to IR nodes,
//! and to every frame of a runtime error backtrace. It carries no behavior
//! of its own beyond display.

use std::fmt;
use std::rc::Rc;

/// `(file, line, column)` as produced by the lexer and carried through IR
/// lowering into the rod.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceLocation {
    file: Rc<str>,
    line: u32,
    column: u32,
}

impl SourceLocation {
    pub fn new(file: impl Into<Rc<str>>, line: u32, column: u32) -> Self {
        SourceLocation {
            file: file.into(),
            line,
            column,
        }
    }

    /// A placeholder location for natively-constructed errors that have no
    /// script-side position (e.g. `Runtime_Error::format`).
    pub fn unknown() -> Self {
        SourceLocation::new("<native>", 0, 0)
    }

    pub fn file(&self) -> &str {
        &self.file
    }

    pub fn line(&self) -> u32 {
        self.line
    }

    pub fn column(&self) -> u32 {
        self.column
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}
