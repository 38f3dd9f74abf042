//! The record tying a store instance to its snapshot.

use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::rc::{Rc, Weak};

use class_state_snapshot::Value;

use crate::class::{Class, Member, Store};
use crate::commit;
use crate::context::{Context, ContextInner};
use crate::key::Key;
use crate::projection::{Projection, View};
use crate::Error;

/// Lifecycle of a binding.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// Created from defaults; nothing promoted into the context yet.
    Fresh,
    /// Hydrated, or published at least once.
    Bound,
    /// Removed from its context. Terminal.
    Disconnected,
}

/// Identity token shared by the projections of one snapshot generation.
#[derive(Debug)]
pub(crate) struct Facade {
    pub(crate) generation: u64,
}

struct BindingState {
    snapshot: Value,
    connecting: bool,
    draft: Option<Value>,
    facade: Rc<Facade>,
}

/// A store instance bound to a key of a context.
///
/// Owns the raw instance and the current snapshot. Reached from a
/// projection through [`Projection::binding`].
pub struct Binding<S: Store> {
    key: Key,
    class: Rc<Class<S>>,
    context: RefCell<Option<Weak<ContextInner>>>,
    raw: RefCell<S>,
    defaults: Value,
    state: RefCell<BindingState>,
}

impl<S: Store> fmt::Debug for Binding<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("class", &S::CLASS)
            .field("key", &self.key)
            .field("phase", &self.phase())
            .finish()
    }
}

impl<S: Store> Binding<S> {
    pub(crate) fn new(
        context: &Context,
        key: Key,
        class: Rc<Class<S>>,
        raw: S,
        defaults: Value,
        snapshot: Value,
        connecting: bool,
    ) -> Rc<Self> {
        Rc::new(Binding {
            key,
            class,
            context: RefCell::new(Some(Rc::downgrade(&context.inner))),
            raw: RefCell::new(raw),
            defaults,
            state: RefCell::new(BindingState {
                snapshot,
                connecting,
                draft: None,
                facade: Rc::new(Facade { generation: 0 }),
            }),
        })
    }

    pub fn key(&self) -> &Key {
        &self.key
    }

    /// The published snapshot. Drafts in flight are not visible here.
    pub fn snapshot(&self) -> Value {
        self.state.borrow().snapshot.clone()
    }

    /// The snapshot extracted from the freshly constructed instance,
    /// before any hydration.
    pub fn default_state(&self) -> &Value {
        &self.defaults
    }

    pub fn is_connecting(&self) -> bool {
        self.state.borrow().connecting
    }

    pub fn phase(&self) -> Phase {
        if self.context().is_none() {
            Phase::Disconnected
        } else if self.is_connecting() {
            Phase::Bound
        } else {
            Phase::Fresh
        }
    }

    pub fn context(&self) -> Option<Context> {
        self.context
            .borrow()
            .as_ref()
            .and_then(Weak::upgrade)
            .map(|inner| Context { inner })
    }

    /// Remove this store from its context and release it.
    ///
    /// The key disappears from the context and a later bind builds a new
    /// binding. Projections of this binding fail with
    /// [`Error::Disconnected`] from now on.
    pub fn disconnect(&self) {
        let context = self.context.borrow_mut().take().and_then(|weak| weak.upgrade());
        if let Some(inner) = context {
            log::debug!("disconnected {} at {}", S::CLASS, self.key);
            Context { inner }.release(&self.key);
        }
    }

    pub(crate) fn class(&self) -> &Class<S> {
        &self.class
    }

    pub(crate) fn attached(&self) -> Result<Context, Error> {
        self.context().ok_or_else(|| Error::Disconnected {
            key: self.key.clone(),
        })
    }

    pub(crate) fn projection(self: &Rc<Self>) -> Projection<S> {
        let facade = self.state.borrow().facade.clone();
        Projection::new(self.clone(), facade)
    }

    pub(crate) fn raw(&self) -> Ref<'_, S> {
        self.raw.borrow()
    }

    pub(crate) fn raw_mut(&self) -> RefMut<'_, S> {
        self.raw.borrow_mut()
    }

    pub(crate) fn is_drafting(&self) -> bool {
        self.state.borrow().draft.is_some()
    }

    /// Start a transaction over `draft`.
    pub(crate) fn open_draft(&self, draft: Value) {
        self.state.borrow_mut().draft = Some(draft);
    }

    /// End the transaction, handing back the draft.
    pub(crate) fn take_draft(&self) -> Option<Value> {
        self.state.try_borrow_mut().ok().and_then(|mut state| state.draft.take())
    }

    /// The data the current reader sees: the draft while one is open,
    /// otherwise the published snapshot.
    pub(crate) fn current(&self) -> Value {
        let state = self.state.borrow();
        state.draft.as_ref().unwrap_or(&state.snapshot).clone()
    }

    /// Promote `next` to the published snapshot.
    pub(crate) fn publish(&self, next: Value) -> Result<(), Error> {
        let context = self.attached()?;
        {
            let mut state = self.state.borrow_mut();
            if next.same(&state.snapshot) {
                log::trace!("commit on {} left the snapshot unchanged", self.key);
                return Ok(());
            }
            state.snapshot = next.clone();
            state.connecting = true;
            state.facade = Rc::new(Facade {
                generation: state.facade.generation + 1,
            });
            log::trace!("published {} generation {}", self.key, state.facade.generation);
        }
        context.set(&self.key, next);
        Ok(())
    }

    /// Read a member: snapshot data first, then getters.
    pub(crate) fn read(self: &Rc<Self>, context: &Context, name: &str) -> Result<Value, Error> {
        let data = {
            let state = self.state.borrow();
            match &state.draft {
                Some(draft) => draft.field(name).cloned().map(|value| (value, false)),
                None => state
                    .snapshot
                    .field(name)
                    .cloned()
                    .map(|value| (value, state.connecting)),
            }
        };
        if let Some((value, track)) = data {
            if track {
                context.depend(&self.key, name);
            }
            return Ok(value);
        }

        match self.class.member(name) {
            Some(Member::Getter(getter)) => {
                let _scope = context.enter();
                let view = View::new(self, context.clone());
                getter(&view)
            }
            Some(Member::Method { .. }) => Err(Error::NotAValue {
                class: S::CLASS,
                member: name.to_string(),
            }),
            None => Err(self.unknown(name)),
        }
    }

    /// Modify a data field of the open draft.
    ///
    /// `update` must not call back into this store.
    pub(crate) fn write<R>(&self, name: &str, update: impl FnOnce(&mut Value) -> R) -> Result<R, Error> {
        let mut state = self.state.borrow_mut();
        let is_field = state.snapshot.field(name).is_some();
        let Some(draft) = state.draft.as_mut() else {
            return Err(if is_field {
                Error::IllegalMutation {
                    class: S::CLASS,
                    field: name.to_string(),
                }
            } else {
                self.not_a_field(name)
            });
        };
        match draft.as_map_mut().and_then(|fields| fields.get_mut(name)) {
            Some(slot) => Ok(update(slot)),
            None => Err(self.not_a_field(name)),
        }
    }

    /// Invoke a method. Commit methods run inside a transaction.
    pub(crate) fn invoke(self: &Rc<Self>, name: &str, args: &[Value]) -> Result<Value, Error> {
        let context = self.attached()?;
        match self.class.member(name) {
            Some(Member::Method { method, commit: true }) => {
                commit::transact(self, &context, method, args)
            }
            Some(Member::Method { method, commit: false }) => {
                let _scope = context.enter();
                let mut view = View::new(self, context.clone());
                method(&mut view, args)
            }
            Some(Member::Getter(_)) => Err(Error::NotAMethod {
                class: S::CLASS,
                member: name.to_string(),
            }),
            None if self.current().field(name).is_some() => Err(Error::NotAMethod {
                class: S::CLASS,
                member: name.to_string(),
            }),
            None => Err(self.unknown(name)),
        }
    }

    pub(crate) fn is_current(&self, facade: &Rc<Facade>) -> bool {
        Rc::ptr_eq(&self.state.borrow().facade, facade)
    }

    fn unknown(&self, name: &str) -> Error {
        Error::UnknownMember {
            class: S::CLASS,
            member: name.to_string(),
        }
    }

    fn not_a_field(&self, name: &str) -> Error {
        if self.class.has_member(name) {
            Error::NotAField {
                class: S::CLASS,
                member: name.to_string(),
            }
        } else {
            self.unknown(name)
        }
    }
}
