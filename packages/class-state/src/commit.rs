//! Commit transactions.
//!
//! A commit method runs against a draft of the store's snapshot. When it
//! returns successfully the draft is finished by the context's producer and
//! published; an error or a panic discards it.

use std::fmt;
use std::rc::Rc;

use class_state_snapshot::Value;
use serde::de::DeserializeOwned;

use crate::binding::Binding;
use crate::class::{Method, Store};
use crate::context::Context;
use crate::projection::View;
use crate::Error;

/// Clears the binding's draft unless the transaction completed.
struct DraftGuard<'a, S: Store> {
    binding: &'a Binding<S>,
    done: bool,
}

impl<'a, S: Store> DraftGuard<'a, S> {
    fn open(binding: &'a Binding<S>, draft: Value) -> Self {
        binding.open_draft(draft);
        DraftGuard {
            binding,
            done: false,
        }
    }

    fn close(mut self) -> Option<Value> {
        self.done = true;
        self.binding.take_draft()
    }
}

impl<S: Store> Drop for DraftGuard<'_, S> {
    fn drop(&mut self) {
        if !self.done {
            self.binding.take_draft();
        }
    }
}

pub(crate) fn transact<S: Store>(
    binding: &Rc<Binding<S>>,
    context: &Context,
    method: &Method<S>,
    args: &[Value],
) -> Result<Value, Error> {
    let _scope = context.enter();

    // Nested commits write straight into the open draft. A failing one
    // rolls the draft back to where it started, even if the caller goes on.
    if binding.is_drafting() {
        let checkpoint = binding.current();
        let mut view = View::new(binding, context.clone());
        let result = method(&mut view, args);
        if result.is_err() && binding.is_drafting() {
            log::trace!("rolling back nested {} commit at {}", S::CLASS, binding.key());
            binding.open_draft(checkpoint);
        }
        return result;
    }

    let base = binding.snapshot();
    let guard = DraftGuard::open(binding, context.producer().draft(&base));
    let result = {
        let mut view = View::new(binding, context.clone());
        method(&mut view, args)
    };
    let draft = guard.close();
    let value = result?;

    let next = match draft {
        Some(draft) => context.producer().finish(&base, draft),
        None => base,
    };
    binding.publish(next)?;
    Ok(value)
}

/// A commit method detached from the projection it came from.
///
/// Stays valid across publishes: it refers to the binding, not to one
/// snapshot generation.
pub struct CommitFn<S: Store> {
    binding: Rc<Binding<S>>,
    name: String,
    method: Method<S>,
}

impl<S: Store> Clone for CommitFn<S> {
    fn clone(&self) -> Self {
        CommitFn {
            binding: self.binding.clone(),
            name: self.name.clone(),
            method: self.method.clone(),
        }
    }
}

impl<S: Store> fmt::Debug for CommitFn<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CommitFn({}.{} at {})", S::CLASS, self.name, self.binding.key())
    }
}

impl<S: Store> CommitFn<S> {
    pub(crate) fn new(binding: Rc<Binding<S>>, name: &str, method: Method<S>) -> Self {
        CommitFn {
            binding,
            name: name.to_string(),
            method,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn invoke(&self, args: &[Value]) -> Result<Value, Error> {
        let context = self.binding.attached()?;
        transact(&self.binding, &context, &self.method, args)
    }

    pub fn invoke_as<T: DeserializeOwned>(&self, args: &[Value]) -> Result<T, Error> {
        Ok(class_state_snapshot::from_value(&self.invoke(args)?)?)
    }
}
