//! Subscript: one step of a reference's path into a parent `Value`.
//!
//! Out-of-range array indices wrap negatively once (`-1` = last element),
//! then saturate to "not present" rather than erroring; `open` extends
//! arrays and creates object keys on demand.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::value::{AsteriaString, ObjectMap, Value};

#[derive(Debug, Clone)]
pub enum Subscript {
    ArrayIndex(i64),
    ObjectKey(AsteriaString),
    ArrayHead,
    ArrayTail,
    /// Chooses a uniformly random index using a stream seeded independently
    /// of any global RNG. Repeated reads against the same seed within one
    /// rod execution are deterministic; cross-invocation determinism is an
    /// open question this implementation does not attempt to guarantee.
    ArrayRandom(u32),
}

/// Resolve a possibly-negative index against a length, wrapping once.
/// Returns `None` if the result is still out of bounds.
fn resolve_index(index: i64, len: usize) -> Option<usize> {
    if index >= 0 {
        let i = index as usize;
        if i < len {
            Some(i)
        } else {
            None
        }
    } else {
        let wrapped = (len as i64) + index;
        if wrapped >= 0 {
            Some(wrapped as usize)
        } else {
            None
        }
    }
}

impl Subscript {
    /// Read-only application: a miss (wrong parent type, or out of range)
    /// returns `None`, which the caller turns into the static null.
    pub fn apply_read<'v>(&self, parent: &'v Value) -> Option<&'v Value> {
        match self {
            Subscript::ArrayIndex(i) => {
                let a = parent.as_array()?;
                resolve_index(*i, a.len()).map(|idx| &a[idx])
            }
            Subscript::ObjectKey(k) => parent.as_object()?.get(k),
            Subscript::ArrayHead => parent.as_array()?.first(),
            Subscript::ArrayTail => parent.as_array()?.last(),
            Subscript::ArrayRandom(seed) => {
                let a = parent.as_array()?;
                if a.is_empty() {
                    return None;
                }
                let mut rng = StdRng::seed_from_u64(*seed as u64);
                let idx = rng.gen_range(0..a.len());
                Some(&a[idx])
            }
        }
    }

    /// Write application: like `apply_read` but through a mutable borrow;
    /// still a pure miss-returns-`None` operation, no materialization.
    pub fn apply_write<'v>(&self, parent: &'v mut Value) -> Option<&'v mut Value> {
        match self {
            Subscript::ArrayIndex(i) => {
                let len = parent.as_array()?.len();
                let idx = resolve_index(*i, len)?;
                parent.as_array_mut().map(|a| &mut a[idx])
            }
            Subscript::ObjectKey(k) => parent.as_object_mut()?.get_mut(k),
            Subscript::ArrayHead => parent.as_array_mut()?.first_mut(),
            Subscript::ArrayTail => parent.as_array_mut()?.last_mut(),
            Subscript::ArrayRandom(seed) => {
                let len = parent.as_array()?.len();
                if len == 0 {
                    return None;
                }
                let mut rng = StdRng::seed_from_u64(*seed as u64);
                let idx = rng.gen_range(0..len);
                parent.as_array_mut().map(|a| &mut a[idx])
            }
        }
    }

    /// Open application: always returns a mutable slot, extending
    /// containers as needed. Negative out-of-range indices are rejected
    /// (there is no sensible element to extend "before the start").
    pub fn apply_open<'v>(&self, parent: &'v mut Value) -> Result<&'v mut Value, String> {
        match self {
            Subscript::ArrayIndex(i) => {
                let a = parent
                    .as_array_mut()
                    .ok_or_else(|| format!("cannot index into {}", parent.type_name()))?;
                if *i >= 0 {
                    let idx = *i as usize;
                    if idx >= a.len() {
                        a.resize(idx + 1, Value::Null);
                    }
                    Ok(&mut a[idx])
                } else {
                    let wrapped = (a.len() as i64) + i;
                    if wrapped < 0 {
                        return Err(format!("negative index {i} out of range for open"));
                    }
                    Ok(&mut a[wrapped as usize])
                }
            }
            Subscript::ObjectKey(k) => {
                let o = parent
                    .as_object_mut()
                    .ok_or_else(|| format!("cannot index into {}", parent.type_name()))?;
                if o.get(k).is_none() {
                    o.insert(k.clone(), Value::Null);
                }
                Ok(o.get_mut(k).expect("just inserted"))
            }
            Subscript::ArrayHead => {
                let a = parent
                    .as_array_mut()
                    .ok_or_else(|| format!("cannot index into {}", parent.type_name()))?;
                a.insert(0, Value::Null);
                Ok(&mut a[0])
            }
            Subscript::ArrayTail => {
                let a = parent
                    .as_array_mut()
                    .ok_or_else(|| format!("cannot index into {}", parent.type_name()))?;
                a.push(Value::Null);
                let last = a.len() - 1;
                Ok(&mut a[last])
            }
            Subscript::ArrayRandom(_) => {
                // Non-deterministic opens behave like array-tail (append).
                Subscript::ArrayTail.apply_open(parent)
            }
        }
    }

    /// Remove and return the addressed subelement; a miss returns null.
    pub fn apply_unset(&self, parent: &mut Value) -> Value {
        match self {
            Subscript::ArrayIndex(i) => match parent.as_array_mut() {
                Some(a) => match resolve_index(*i, a.len()) {
                    Some(idx) => a.remove(idx),
                    None => Value::Null,
                },
                None => Value::Null,
            },
            Subscript::ObjectKey(k) => parent
                .as_object_mut()
                .and_then(|o| o.remove(k))
                .unwrap_or(Value::Null),
            Subscript::ArrayHead => match parent.as_array_mut() {
                Some(a) if !a.is_empty() => a.remove(0),
                _ => Value::Null,
            },
            Subscript::ArrayTail => match parent.as_array_mut() {
                Some(a) => a.pop().unwrap_or(Value::Null),
                None => Value::Null,
            },
            Subscript::ArrayRandom(seed) => match parent.as_array() {
                Some(a) if !a.is_empty() => {
                    let mut rng = StdRng::seed_from_u64(*seed as u64);
                    let idx = rng.gen_range(0..a.len());
                    parent.as_array_mut().unwrap().remove(idx)
                }
                _ => Value::Null,
            },
        }
    }
}

/// Convenience for object-key subscripts from plain string literals.
impl From<&str> for Subscript {
    fn from(key: &str) -> Self {
        Subscript::ObjectKey(AsteriaString::new(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arr(v: Vec<i64>) -> Value {
        Value::array(v.into_iter().map(Value::Int).collect())
    }

    #[test]
    fn negative_index_wraps_once() {
        let a = arr(vec![1, 2, 3]);
        assert_eq!(Subscript::ArrayIndex(-1).apply_read(&a), Some(&Value::Int(3)));
        assert_eq!(Subscript::ArrayIndex(-3).apply_read(&a), Some(&Value::Int(1)));
        assert_eq!(Subscript::ArrayIndex(-4).apply_read(&a), None);
    }

    #[test]
    fn open_extends_with_nulls() {
        let mut a = arr(vec![1]);
        let slot = Subscript::ArrayIndex(3).apply_open(&mut a).unwrap();
        *slot = Value::Int(9);
        assert_eq!(a.as_array().unwrap(), &[Value::Int(1), Value::Null, Value::Null, Value::Int(9)]);
    }

    #[test]
    fn tail_append_sugar() {
        let mut a = arr(vec![1, 2]);
        let len = a.length().unwrap();
        let slot = Subscript::ArrayIndex(len).apply_open(&mut a).unwrap();
        *slot = Value::Int(3);
        assert_eq!(a.as_array().unwrap(), &[Value::Int(1), Value::Int(2), Value::Int(3)]);
    }

    #[test]
    fn unset_object_key_returns_prior_value() {
        let mut o = ObjectMap::new();
        o.insert("x".into(), Value::Int(5));
        let mut v = Value::object(o);
        let removed = Subscript::from("x").apply_unset(&mut v);
        assert_eq!(removed, Value::Int(5));
        assert_eq!(Subscript::from("x").apply_read(&v), None);
    }
}
