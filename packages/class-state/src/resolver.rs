//! The ambient context, for stores that reach other stores.
//!
//! Entering a store (a getter, a method, a commit or [`Projection::enter`])
//! pushes its context on a per-thread stack for the duration of the call.
//! [`connect_current`] binds against the innermost one, so a store can
//! depend on another without threading the context through its API.

use std::cell::RefCell;
use std::marker::PhantomData;

use crate::class::Store;
use crate::context::Context;
use crate::projection::Projection;
use crate::Error;

thread_local! {
    static ACTIVE: RefCell<Vec<Context>> = const { RefCell::new(Vec::new()) };
}

/// Keeps a context active until dropped.
#[must_use = "the context is only active while the scope is alive"]
pub struct ContextScope {
    // Scopes pop a thread-local stack and must stay on their thread.
    _not_send: PhantomData<*const ()>,
}

impl Drop for ContextScope {
    fn drop(&mut self) {
        let _ = ACTIVE.try_with(|active| active.borrow_mut().pop());
    }
}

pub(crate) fn enter(context: &Context) -> ContextScope {
    ACTIVE.with(|active| active.borrow_mut().push(context.clone()));
    ContextScope {
        _not_send: PhantomData,
    }
}

/// The innermost active context on this thread.
pub fn active_context() -> Option<Context> {
    ACTIVE.with(|active| active.borrow().last().cloned())
}

/// Get or create store `S` in the active context.
///
/// Fails with [`Error::NoActiveContext`] outside of any store call or
/// [`Context::enter`] scope.
pub fn connect_current<S: Store>(name: &str, params: &S::Params) -> Result<Projection<S>, Error> {
    let context = active_context().ok_or(Error::NoActiveContext)?;
    context.bind::<S>(name, params)
}
