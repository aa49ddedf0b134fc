//! Standard library surface exposed through the native binding interface
//! (§6). The textual standard library itself is out of scope for this
//! crate (§1) — this module exists only so the runtime's own tests and
//! embedders have a minimal, real `std` object to call through, built the
//! same way any host binding would be.

pub mod io;

use crate::context::Global;
use crate::value::{ObjectMap, Value};

/// Registers the small `std` namespace this crate actually implements
/// (currently just `std.io`) as a global binding visible to scripts.
pub fn register_std(global: &Global) {
    let mut std_ns = ObjectMap::new();
    std_ns.insert("io".into(), io::namespace());
    global.set_global("std", Value::object(std_ns));
}
