//! Copy-on-write production of new snapshots.
//!
//! A [`Producer`] turns a base snapshot into a mutable draft and, once the
//! draft has been edited, finalizes it into the next snapshot. The contract
//! every producer must honour:
//!
//! - if the draft is observably unchanged, `finish` returns `base` itself
//!   (so `next.same(&base)` holds);
//! - otherwise it returns a new tree that shares every unchanged sub-tree
//!   with `base`.

use std::sync::Arc;

use crate::Value;

/// The copy-on-write primitive used by commit transactions.
pub trait Producer {
    /// Derive a mutable draft from `base`.
    fn draft(&self, base: &Value) -> Value;

    /// Finalize `draft` into the next snapshot.
    fn finish(&self, base: &Value, draft: Value) -> Value;
}

impl<P: Producer + ?Sized> Producer for Box<P> {
    fn draft(&self, base: &Value) -> Value {
        self.as_ref().draft(base)
    }

    fn finish(&self, base: &Value, draft: Value) -> Value {
        self.as_ref().finish(base, draft)
    }
}

/// Default producer built on the reference-counted nodes of [`Value`].
///
/// Drafting is a handle clone; nodes are copied on first write. Finishing
/// reconciles the draft against the base so that sub-trees whose content did
/// not change get their original identity back, including ones that were
/// written with an equal value.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuralSharing;

impl Producer for StructuralSharing {
    fn draft(&self, base: &Value) -> Value {
        base.clone()
    }

    fn finish(&self, base: &Value, draft: Value) -> Value {
        reconcile(base, draft)
    }
}

/// Apply `recipe` to a draft of `base` and return the next snapshot.
///
/// ```rust
/// use class_state_snapshot::{produce, path, Value};
///
/// let base = Value::map();
/// let unchanged = produce(&base, |_| {});
/// assert!(unchanged.same(&base));
///
/// let next = produce(&base, |draft| {
///     draft.set(&path!("name"), Value::from("jack")).unwrap();
/// });
/// assert!(!next.same(&base));
/// ```
pub fn produce<F>(base: &Value, recipe: F) -> Value
where
    F: FnOnce(&mut Value),
{
    let producer = StructuralSharing;
    let mut draft = producer.draft(base);
    recipe(&mut draft);
    producer.finish(base, draft)
}

/// Like [`produce`], for recipes that can fail. On error the draft is
/// dropped and `base` is untouched.
pub fn try_produce<F, E>(base: &Value, recipe: F) -> Result<Value, E>
where
    F: FnOnce(&mut Value) -> Result<(), E>,
{
    let producer = StructuralSharing;
    let mut draft = producer.draft(base);
    recipe(&mut draft)?;
    Ok(producer.finish(base, draft))
}

fn reconcile(base: &Value, next: Value) -> Value {
    if base.same(&next) {
        return base.clone();
    }
    match (base, next) {
        (Value::Map(base_map), Value::Map(mut next_map)) => {
            let mut changed = base_map.len() != next_map.len();
            for (key, slot) in Arc::make_mut(&mut next_map).iter_mut() {
                match base_map.get(key) {
                    Some(base_child) => {
                        let child = reconcile(base_child, std::mem::take(slot));
                        changed |= !child.same(base_child);
                        *slot = child;
                    }
                    None => changed = true,
                }
            }
            if changed {
                Value::Map(next_map)
            } else {
                base.clone()
            }
        }
        (Value::Array(base_items), Value::Array(mut next_items)) => {
            let mut changed = base_items.len() != next_items.len();
            for (base_child, slot) in base_items.iter().zip(Arc::make_mut(&mut next_items)) {
                let child = reconcile(base_child, std::mem::take(slot));
                changed |= !child.same(base_child);
                *slot = child;
            }
            if changed {
                Value::Array(next_items)
            } else {
                base.clone()
            }
        }
        (_, next) => next,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{path, Path};
    use collection_literals::btree;
    use proptest::prelude::*;

    fn user() -> Value {
        Value::from(btree! {
            "x".to_string() => Value::from(1i64),
            "y".to_string() => Value::from(2i64),
            "obj".to_string() => Value::from(btree! {
                "x".to_string() => Value::from(1i64),
                "y".to_string() => Value::from(2i64),
            }),
        })
    }

    #[test]
    fn untouched_draft_returns_base() {
        let base = user();
        let next = produce(&base, |_| {});
        assert!(next.same(&base));
        assert!(next.field("obj").unwrap().same(base.field("obj").unwrap()));
    }

    #[test]
    fn equal_write_returns_base() {
        let base = user();
        let next = produce(&base, |draft| {
            draft.set(&path!("obj/x"), Value::from(1i64)).unwrap();
        });
        assert!(next.same(&base));
    }

    #[test]
    fn real_write_shares_siblings() {
        let base = Value::from(btree! {
            "a".to_string() => Value::from(btree! { "v".to_string() => Value::from(1i64) }),
            "b".to_string() => Value::from(btree! { "v".to_string() => Value::from(1i64) }),
        });
        let next = produce(&base, |draft| {
            draft.set(&path!("a/v"), Value::from(2i64)).unwrap();
        });
        assert!(!next.same(&base));
        assert_eq!(next.get(&path!("a/v")), Some(&Value::from(2i64)));
        assert!(next.field("b").unwrap().same(base.field("b").unwrap()));
        assert_eq!(base.get(&path!("a/v")), Some(&Value::from(1i64)));
    }

    #[test]
    fn replaced_key_counts_as_change() {
        let base = user();
        let next = produce(&base, |draft| {
            let map = draft.as_map_mut().unwrap();
            map.remove("x");
            map.insert("z".to_string(), Value::from(1i64));
        });
        assert!(!next.same(&base));
    }

    #[test]
    fn array_push_is_a_change() {
        let base = Value::from(btree! { "list".to_string() => Value::array() });
        let next = produce(&base, |draft| {
            draft
                .get_mut(&path!("list"))
                .and_then(Value::as_array_mut)
                .unwrap()
                .push(Value::from("jack"));
        });
        assert_eq!(next.field("list"), Some(&Value::from(vec!["jack"])));
        assert_eq!(base.field("list"), Some(&Value::array()));
    }

    #[test]
    fn failed_recipe_leaves_base() {
        let base = user();
        let result: Result<Value, &str> = try_produce(&base, |draft| {
            draft.set(&path!("x"), Value::from(9i64)).unwrap();
            Err("boom")
        });
        assert_eq!(result.unwrap_err(), "boom");
        assert_eq!(base.field("x"), Some(&Value::from(1i64)));
    }

    proptest! {
        #[test]
        fn prop_rewriting_same_values_keeps_identity(values in proptest::collection::vec(any::<i64>(), 0..8)) {
            let base: Value = values
                .iter()
                .enumerate()
                .map(|(i, v)| (format!("f{}", i), Value::from(*v)))
                .collect();
            let next = produce(&base, |draft| {
                for (i, v) in values.iter().enumerate() {
                    draft.set(&Path::field(&format!("f{}", i)).unwrap(), Value::from(*v)).unwrap();
                }
            });
            prop_assert!(next.same(&base));
        }

        #[test]
        fn prop_changed_value_breaks_identity(values in proptest::collection::vec(any::<i64>(), 1..8), pick in any::<prop::sample::Index>()) {
            let base: Value = values
                .iter()
                .enumerate()
                .map(|(i, v)| (format!("f{}", i), Value::from(*v)))
                .collect();
            let index = pick.index(values.len());
            let next = produce(&base, |draft| {
                let field = Path::field(&format!("f{}", index)).unwrap();
                draft.set(&field, Value::from(values[index].wrapping_add(1))).unwrap();
            });
            prop_assert!(!next.same(&base));
        }
    }
}
