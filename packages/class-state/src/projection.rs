//! The caller-facing façade of a bound store, and the view its getters and
//! methods run against.

use std::cell::{Ref, RefMut};
use std::fmt;
use std::rc::Rc;

use class_state_snapshot::{from_value, Path, Value};
use serde::de::DeserializeOwned;

use crate::binding::{Binding, Facade};
use crate::class::{Member, Store};
use crate::commit::CommitFn;
use crate::context::Context;
use crate::key::Key;
use crate::Error;

/// Handle to a bound store.
///
/// Data fields read from the current snapshot; everything else dispatches
/// through the store's [`crate::Class`] table. Two projections compare equal
/// under [`Projection::ptr_eq`] exactly when they were taken from the same
/// binding with no state change in between.
///
/// A projection holds its binding but not the binding's context; see
/// [`Context::bind`].
pub struct Projection<S: Store> {
    binding: Rc<Binding<S>>,
    facade: Rc<Facade>,
}

impl<S: Store> Clone for Projection<S> {
    fn clone(&self) -> Self {
        Projection {
            binding: self.binding.clone(),
            facade: self.facade.clone(),
        }
    }
}

impl<S: Store> fmt::Debug for Projection<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Projection")
            .field("binding", &self.binding)
            .field("generation", &self.facade.generation)
            .finish()
    }
}

impl<S: Store> Projection<S> {
    pub(crate) fn new(binding: Rc<Binding<S>>, facade: Rc<Facade>) -> Self {
        Projection { binding, facade }
    }

    pub fn ptr_eq(a: &Projection<S>, b: &Projection<S>) -> bool {
        Rc::ptr_eq(&a.facade, &b.facade)
    }

    /// Whether both projections front the same binding, regardless of state
    /// changes since they were taken.
    pub fn same_binding(a: &Projection<S>, b: &Projection<S>) -> bool {
        Rc::ptr_eq(&a.binding, &b.binding)
    }

    /// The binding behind this projection.
    pub fn binding(&self) -> &Binding<S> {
        &self.binding
    }

    /// Whether no commit has changed the snapshot since this projection was
    /// taken.
    pub fn is_current(&self) -> bool {
        self.binding.is_current(&self.facade)
    }

    pub fn snapshot(&self) -> Result<Value, Error> {
        self.binding.attached()?;
        Ok(self.binding.snapshot())
    }

    /// Read a data field or evaluate a getter.
    pub fn get(&self, name: &str) -> Result<Value, Error> {
        let context = self.binding.attached()?;
        self.binding.read(&context, name)
    }

    pub fn field<T: DeserializeOwned>(&self, name: &str) -> Result<T, Error> {
        Ok(from_value(&self.get(name)?)?)
    }

    /// Assign a data field. Only legal while a commit on this store is in
    /// flight.
    pub fn set(&self, name: &str, value: impl Into<Value>) -> Result<(), Error> {
        self.binding.attached()?;
        let value = value.into();
        self.binding.write(name, |slot| *slot = value)
    }

    /// Detach the commit method `name` as a callable.
    pub fn commit(&self, name: &str) -> Result<CommitFn<S>, Error> {
        self.binding.attached()?;
        match self.binding.class().member(name) {
            Some(Member::Method { method, commit: true }) => {
                Ok(CommitFn::new(self.binding.clone(), name, method.clone()))
            }
            Some(_) => Err(Error::NotAMethod {
                class: S::CLASS,
                member: name.to_string(),
            }),
            None => Err(Error::UnknownMember {
                class: S::CLASS,
                member: name.to_string(),
            }),
        }
    }

    /// Call a method; commit methods run in a transaction.
    pub fn call(&self, name: &str, args: &[Value]) -> Result<Value, Error> {
        self.binding.invoke(name, args)
    }

    pub fn call_as<T: DeserializeOwned>(&self, name: &str, args: &[Value]) -> Result<T, Error> {
        Ok(from_value(&self.call(name, args)?)?)
    }

    /// Run `f` against the store's view, with this store's context active.
    ///
    /// Outside of a commit the view is read-only for data fields; the raw
    /// instance is freely accessible.
    pub fn enter<R>(&self, f: impl FnOnce(&mut View<'_, S>) -> R) -> Result<R, Error> {
        let context = self.binding.attached()?;
        let _scope = context.enter();
        let mut view = View::new(&self.binding, context.clone());
        Ok(f(&mut view))
    }
}

/// The receiver getters and methods run against.
///
/// Data fields resolve to the open draft while a commit is in flight and to
/// the published snapshot otherwise. Hidden state lives on the raw instance.
pub struct View<'a, S: Store> {
    binding: &'a Rc<Binding<S>>,
    context: Context,
}

impl<'a, S: Store> View<'a, S> {
    pub(crate) fn new(binding: &'a Rc<Binding<S>>, context: Context) -> Self {
        View { binding, context }
    }

    pub fn key(&self) -> &Key {
        self.binding.key()
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Whether writes to data fields are currently allowed.
    pub fn is_drafting(&self) -> bool {
        self.binding.is_drafting()
    }

    /// The data fields as the view sees them.
    pub fn snapshot(&self) -> Value {
        self.binding.current()
    }

    pub fn get(&self, name: &str) -> Result<Value, Error> {
        self.binding.read(&self.context, name)
    }

    pub fn field<T: DeserializeOwned>(&self, name: &str) -> Result<T, Error> {
        Ok(from_value(&self.get(name)?)?)
    }

    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<(), Error> {
        let value = value.into();
        self.binding.write(name, |slot| *slot = value)
    }

    /// Modify a data field in place. Unchanged parts keep their identity.
    pub fn update<R>(&mut self, name: &str, f: impl FnOnce(&mut Value) -> R) -> Result<R, Error> {
        self.binding.write(name, f)
    }

    /// Write below a data field, e.g. `list/0/text`.
    ///
    /// The first component names the field; the rest is created as records
    /// where missing.
    pub fn set_in(&mut self, path: &Path, value: impl Into<Value>) -> Result<(), Error> {
        let value = value.into();
        let (field, rest) = path.split_first().ok_or_else(|| Error::NotAField {
            class: S::CLASS,
            member: String::new(),
        })?;
        if rest.is_empty() {
            return self.set(field, value);
        }
        self.binding
            .write(field, |slot| slot.set(&rest, value))?
            .map_err(Error::from)
    }

    /// The raw instance, for hidden fields.
    pub fn raw(&self) -> Ref<'_, S> {
        self.binding.raw()
    }

    /// The raw instance, mutably. Changes here never reach the snapshot.
    pub fn raw_mut(&mut self) -> RefMut<'_, S> {
        self.binding.raw_mut()
    }

    /// Call another member of this store. Commit methods join the open
    /// transaction when there is one.
    pub fn call(&mut self, name: &str, args: &[Value]) -> Result<Value, Error> {
        self.binding.invoke(name, args)
    }

    pub fn call_as<T: DeserializeOwned>(&mut self, name: &str, args: &[Value]) -> Result<T, Error> {
        Ok(from_value(&self.call(name, args)?)?)
    }

    /// Get or create another store in this view's context.
    pub fn connect<T: Store>(&self, name: &str, params: &T::Params) -> Result<Projection<T>, Error> {
        self.context.bind::<T>(name, params)
    }
}
