//! `std.io`: the tiny slice of the textual standard library this crate
//! actually implements, written out using exactly the native binding
//! interface (`binding::bind`, `argument_reader::ArgumentReader`) any host
//! embedder would use. Grounded on the real `std_io_putln` (writes UTF-8,
//! appends `\n`, returns the byte count written) but widened to accept any
//! value (stringified via `Display`) rather than only a string, since nothing
//! upstream of this crate does implicit argument stringification for it.

use std::io::Write as _;

use crate::argument_reader::ArgumentReader;
use crate::binding::bind;
use crate::value::{ObjectMap, Value};

pub fn namespace() -> Value {
    let mut io = ObjectMap::new();
    io.insert("putln".into(), Value::Function(bind("std.io.putln", "value", file!(), line!(), |_self_ref, _global, stack| {
        let mut reader = ArgumentReader::new("std.io.putln", stack);
        reader.start_overload();
        let text = reader.optional_string();
        if reader.end_overload() {
            return write_line(&text.map(|s| s.to_string()).unwrap_or_default());
        }

        reader.start_overload();
        let value = reader.required(|v| Some(v.clone()), "value");
        if reader.end_overload() {
            return write_line(&value.map(|v| v.to_string()).unwrap_or_default());
        }
        Err(reader.throw_no_matching_function_call())
    })));
    Value::object(io)
}

fn write_line(text: &str) -> Result<Value, crate::runtime_error::RuntimeError> {
    let stdout = std::io::stdout();
    let mut lock = stdout.lock();
    let _ = write!(lock, "{text}\n");
    Ok(Value::Int(text.len() as i64 + 1))
}
