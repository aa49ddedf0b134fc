//! Value: what a script talks about
//!
//! `Value` is a closed, nine-way tagged union. It owns no pointers into the
//! evaluator's stacks or contexts; the only way to observe or mutate a
//! script-visible value is through a [`crate::reference::Reference`].
//!
//! Shared containers (`String`, `Array`, `Object`, `Function`, `Opaque`) use
//! `Rc` rather than `Arc`: per the concurrency model, a single script
//! invocation (and everything it allocates) never crosses a thread
//! boundary, so an atomic refcount would be pure overhead. Mutation of a
//! shared container goes through `Rc::make_mut`, which is exactly the
//! "clone if shared, then mutate in place" contract the language promises:
//!
//! ```
//! use asteria_runtime::value::Value;
//! let a = Value::array(vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
//! let mut b = a.clone();
//! b.as_array_mut().unwrap()[0] = Value::Int(9);
//! assert_eq!(a.as_array().unwrap()[0], Value::Int(1));
//! assert_eq!(b.as_array().unwrap()[0], Value::Int(9));
//! ```

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use crate::gc::VariableMap;
use crate::reference::Reference;
use crate::runtime_error::RuntimeError;
use crate::variable::Variable;

/// An immutable, prehashed UTF-8 string. Hashing is computed once at
/// construction so that object-key lookups never recompute it, matching
/// the ABI requirement that the hash function be shared between compiler
/// and runtime.
#[derive(Debug, Clone)]
pub struct AsteriaString {
    text: Rc<str>,
    hash: u64,
}

impl AsteriaString {
    pub fn new(text: impl Into<Rc<str>>) -> Self {
        let text = text.into();
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        text.hash(&mut hasher);
        AsteriaString { text, hash: hasher.finish() }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn prehashed(&self) -> u64 {
        self.hash
    }
}

impl PartialEq for AsteriaString {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash && self.text == other.text
    }
}
impl Eq for AsteriaString {}

impl Hash for AsteriaString {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}

impl fmt::Display for AsteriaString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl From<&str> for AsteriaString {
    fn from(s: &str) -> Self {
        AsteriaString::new(s)
    }
}

impl From<String> for AsteriaString {
    fn from(s: String) -> Self {
        AsteriaString::new(s)
    }
}

/// Insertion-ordered mapping from prehashed string key to `Value`.
///
/// A plain `HashMap` would not preserve insertion order, which scripts can
/// observe (iteration order, `std.json` encoding, ...), so entries live in
/// a `Vec` and a side index gives O(1) lookup by key.
#[derive(Debug, Clone, Default)]
pub struct ObjectMap {
    entries: Vec<(AsteriaString, Value)>,
    index: HashMap<AsteriaString, usize>,
}

impl ObjectMap {
    pub fn new() -> Self {
        ObjectMap::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &AsteriaString) -> Option<&Value> {
        self.index.get(key).map(|&i| &self.entries[i].1)
    }

    pub fn get_mut(&mut self, key: &AsteriaString) -> Option<&mut Value> {
        let idx = *self.index.get(key)?;
        Some(&mut self.entries[idx].1)
    }

    /// Insert or overwrite a key, preserving its original position on update.
    pub fn insert(&mut self, key: AsteriaString, value: Value) {
        if let Some(&idx) = self.index.get(&key) {
            self.entries[idx].1 = value;
        } else {
            self.index.insert(key.clone(), self.entries.len());
            self.entries.push((key, value));
        }
    }

    /// Remove a key, returning its value and reindexing subsequent entries.
    pub fn remove(&mut self, key: &AsteriaString) -> Option<Value> {
        let idx = self.index.remove(key)?;
        let (_, value) = self.entries.remove(idx);
        for (_, i) in self.index.iter_mut() {
            if *i > idx {
                *i -= 1;
            }
        }
        Some(value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&AsteriaString, &Value)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }
}

impl PartialEq for ObjectMap {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().all(|(k, v)| other.get(k) == Some(v))
    }
}

/// The native half of the `function` type: a bare function pointer plus a
/// human-readable description, used for builtins that need no captured
/// state and no heap allocation per binding.
pub type NativeThunk =
    fn(self_ref: &mut Reference, global: &mut crate::context::Global, stack: crate::reference_stack::ReferenceStack)
        -> Result<(), RuntimeError>;

/// The open set of callables a `function` value may hold: either a bare
/// native function pointer, or a polymorphic callable (script closures,
/// bound natives with captured arguments, the variadic arguer) behind a
/// shared handle. Trait objects model this open set; the closed sum types
/// above (`Value`, `Subscript`, exit `Status`) use plain enums instead.
pub trait AbstractFunction: fmt::Debug {
    /// A human-readable name/signature, used in backtraces and in
    /// "no matching overload" errors.
    fn describe(&self) -> String;

    /// The uniform native ABI (see §6.2): on entry `self_ref` holds the
    /// receiver, on successful return it holds the result (void, temporary,
    /// variable, or a pending tail call).
    fn invoke_ptc_aware(
        &self,
        self_ref: &mut Reference,
        global: &mut crate::context::Global,
        stack: crate::reference_stack::ReferenceStack,
    ) -> Result<(), RuntimeError>;

    /// Trace any `Variable`s this callable holds onto (e.g. a closure's
    /// captured references). Most native functions hold none.
    fn collect_variables(&self, _staged: &mut VariableMap, _temp: &mut VariableMap) {}
}

pub type CowFunction = Rc<dyn AbstractFunction>;

/// The open set for the `opaque` type: a script-visible handle to a
/// host-defined object. Implementors that hold `Variable`s (rare, but
/// possible for host-provided container types) must report them so the
/// collector can trace through them.
pub trait OpaqueObject: fmt::Debug {
    fn describe(&self) -> String;

    fn collect_variables(&self, _staged: &mut VariableMap, _temp: &mut VariableMap) {}

    /// Opaque objects may decline to participate in copy-on-write, forcing
    /// in-place mutation shared by all holders, or provide a shallow copy.
    /// `None` means "not cloneable"; such an object can only ever be moved.
    fn clone_opt(&self) -> Option<Rc<dyn OpaqueObject>> {
        None
    }
}

pub type Opaque = Rc<dyn OpaqueObject>;

/// The nine script types, as a closed discriminated union.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Real(f64),
    String(AsteriaString),
    Opaque(Opaque),
    Function(CowFunction),
    Array(Rc<Vec<Value>>),
    Object(Rc<ObjectMap>),
}

/// Result of comparing two values: a partial order that is explicitly
/// "unordered" rather than panicking when comparison is not meaningful
/// (NaN against anything, or most cross-type comparisons).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compare {
    Less,
    Equal,
    Greater,
    Unordered,
}

impl Value {
    pub fn array(values: Vec<Value>) -> Value {
        Value::Array(Rc::new(values))
    }

    pub fn object(map: ObjectMap) -> Value {
        Value::Object(Rc::new(map))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Int(_) => "integer",
            Value::Real(_) => "real",
            Value::String(_) => "string",
            Value::Opaque(_) => "opaque",
            Value::Function(_) => "function",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Script-level truthiness: `null`, `false`, zero, empty string/array/object
    /// are falsy; everything else (including NaN) is truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Real(r) => *r != 0.0,
            Value::String(s) => !s.as_str().is_empty(),
            Value::Opaque(_) | Value::Function(_) => true,
            Value::Array(a) => !a.is_empty(),
            Value::Object(o) => !o.is_empty(),
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_array_mut(&mut self) -> Option<&mut Vec<Value>> {
        match self {
            Value::Array(a) => Some(Rc::make_mut(a)),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectMap> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_object_mut(&mut self) -> Option<&mut ObjectMap> {
        match self {
            Value::Object(o) => Some(Rc::make_mut(o)),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Structural equality. Cross-type comparisons (other than the
    /// int/real numeric tower) are always `false`, never an error.
    pub fn value_eq(&self, other: &Value) -> bool {
        matches!(self.compare(other), Compare::Equal)
    }

    /// Structural comparison with an explicit "unordered" outcome, used by
    /// relational operators and by sort/compare-based library functions.
    pub fn compare(&self, other: &Value) -> Compare {
        use Value::*;
        match (self, other) {
            (Null, Null) => Compare::Equal,
            (Bool(a), Bool(b)) => ord_to_compare(a.cmp(b)),
            (Int(a), Int(b)) => ord_to_compare(a.cmp(b)),
            (Real(a), Real(b)) => real_compare(*a, *b),
            (Int(a), Real(b)) => real_compare(*a as f64, *b),
            (Real(a), Int(b)) => real_compare(*a, *b as f64),
            (String(a), String(b)) => ord_to_compare(a.as_str().cmp(b.as_str())),
            (Array(a), Array(b)) => compare_arrays(a, b),
            (Object(a), Object(b)) if a.len() == 0 && b.len() == 0 => Compare::Equal,
            (Opaque(a), Opaque(b)) => {
                if Rc::ptr_eq(a, b) {
                    Compare::Equal
                } else {
                    Compare::Unordered
                }
            }
            (Function(a), Function(b)) => {
                if Rc::ptr_eq(a, b) {
                    Compare::Equal
                } else {
                    Compare::Unordered
                }
            }
            _ => Compare::Unordered,
        }
    }

    /// Script-level `+` for numbers and string concatenation; anything else
    /// is a type violation.
    pub fn add(&self, other: &Value) -> Result<Value, String> {
        use Value::*;
        match (self, other) {
            (Int(a), Int(b)) => a
                .checked_add(*b)
                .map(Int)
                .ok_or_else(|| "integer overflow in `+`".to_string()),
            (Real(a), Real(b)) => Ok(Real(a + b)),
            (Int(a), Real(b)) => Ok(Real(*a as f64 + b)),
            (Real(a), Int(b)) => Ok(Real(a + *b as f64)),
            (String(a), String(b)) => {
                let mut s = String::with_capacity(a.as_str().len() + b.as_str().len());
                s.push_str(a.as_str());
                s.push_str(b.as_str());
                Ok(String(AsteriaString::new(s)))
            }
            (Array(a), Array(b)) => {
                let mut v = Vec::with_capacity(a.len() + b.len());
                v.extend(a.iter().cloned());
                v.extend(b.iter().cloned());
                Ok(Value::array(v))
            }
            _ => Err(format!(
                "operator `+` not defined for {} and {}",
                self.type_name(),
                other.type_name()
            )),
        }
    }

    /// Length, for the `#` prefix operator: string byte length, array
    /// element count, or object key count. Anything else is a type
    /// violation.
    pub fn length(&self) -> Result<i64, String> {
        match self {
            Value::String(s) => Ok(s.as_str().len() as i64),
            Value::Array(a) => Ok(a.len() as i64),
            Value::Object(o) => Ok(o.len() as i64),
            _ => Err(format!("operator `#` not defined for {}", self.type_name())),
        }
    }

    /// Walk any `Variable`s reachable from this value (through closures'
    /// captured environments or opaque objects) into the GC's staging set.
    pub fn collect_variables(&self, staged: &mut VariableMap, temp: &mut VariableMap) {
        match self {
            Value::Function(f) => f.collect_variables(staged, temp),
            Value::Opaque(o) => o.collect_variables(staged, temp),
            Value::Array(a) => {
                for v in a.iter() {
                    v.collect_variables(staged, temp);
                }
            }
            Value::Object(o) => {
                for (_, v) in o.iter() {
                    v.collect_variables(staged, temp);
                }
            }
            _ => {}
        }
    }
}

fn ord_to_compare(o: Ordering) -> Compare {
    match o {
        Ordering::Less => Compare::Less,
        Ordering::Equal => Compare::Equal,
        Ordering::Greater => Compare::Greater,
    }
}

fn real_compare(a: f64, b: f64) -> Compare {
    match a.partial_cmp(&b) {
        Some(o) => ord_to_compare(o),
        None => Compare::Unordered,
    }
}

fn compare_arrays(a: &[Value], b: &[Value]) -> Compare {
    for (x, y) in a.iter().zip(b.iter()) {
        match x.compare(y) {
            Compare::Equal => continue,
            other => return other,
        }
    }
    ord_to_compare(a.len().cmp(&b.len()))
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.value_eq(other)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Real(r) => write!(f, "{}", asteria_core::numeric::format_real(*r, asteria_core::numeric::Base::Decimal)),
            Value::String(s) => write!(f, "{s}"),
            Value::Opaque(o) => write!(f, "<opaque: {}>", o.describe()),
            Value::Function(fun) => write!(f, "<function: {}>", fun.describe()),
            Value::Array(a) => {
                write!(f, "[")?;
                for (i, v) in a.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v}")?;
                }
                write!(f, "]")
            }
            Value::Object(o) => {
                write!(f, "{{")?;
                for (i, (k, v)) in o.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

/// The static immutable null singleton returned by missing lookups.
/// Every all-zero-bit `Value` represents null, per the data model
/// invariant; the comparison below only ever needs identity, not bit
/// pattern inspection, since `Value::Null` carries no payload.
pub static NULL: Value = Value::Null;
