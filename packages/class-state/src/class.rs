//! Store classes and their dispatch tables.
//!
//! A store class is an ordinary Rust type implementing [`Store`]. Its
//! [`Store::define`] hook fills a [`Class`] table once per thread: which
//! fields are snapshot data, which names are getters, ordinary methods or
//! commit methods. Every access through a projection is routed by this
//! table rather than by inspecting the instance.

use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use class_state_snapshot::{from_value, Value};
use serde::de::DeserializeOwned;

use crate::key::KeyParams;
use crate::property::{Property, Unsupported};
use crate::projection::View;
use crate::Error;

/// Names starting with this prefix are commit methods.
pub const COMMIT_PREFIX: char = '$';

/// A class whose instances can be bound to a context.
///
/// ```rust
/// use class_state::{arg, Class, Store, Value};
///
/// struct User {
///     name: String,
///     age: u32,
/// }
///
/// impl Store for User {
///     const CLASS: &'static str = "User";
///     type Params = ();
///
///     fn construct(_: &()) -> Self {
///         User { name: String::new(), age: 18 }
///     }
///
///     fn define(class: &mut Class<Self>) {
///         class
///             .field("name", |u| &u.name)
///             .field("age", |u| &u.age)
///             .method("$setName", |this, args| {
///                 this.set("name", arg::<String>(args, 0)?)?;
///                 Ok(Value::Null)
///             });
///     }
/// }
/// ```
pub trait Store: Sized + 'static {
    /// Class name used in error messages.
    const CLASS: &'static str;

    /// Constructor parameters; they also distinguish instances in the key.
    type Params: KeyParams;

    fn construct(params: &Self::Params) -> Self;

    fn define(class: &mut Class<Self>);
}

pub type Getter<S> = Rc<dyn Fn(&View<'_, S>) -> Result<Value, Error>>;
pub type Method<S> = Rc<dyn Fn(&mut View<'_, S>, &[Value]) -> Result<Value, Error>>;

/// Decode the argument at `index` of a method call.
pub fn arg<T: DeserializeOwned>(args: &[Value], index: usize) -> Result<T, Error> {
    let value = args.get(index).ok_or_else(|| Error::Argument {
        index,
        message: format!("missing, {} given", args.len()),
    })?;
    from_value(value).map_err(|e| Error::Argument {
        index,
        message: e.to_string(),
    })
}

pub(crate) struct FieldDef<S> {
    name: &'static str,
    read: Box<dyn Fn(&S) -> Result<Value, Unsupported>>,
}

impl<S> FieldDef<S> {
    pub(crate) fn name(&self) -> &'static str {
        self.name
    }

    pub(crate) fn read(&self, instance: &S) -> Result<Value, Unsupported> {
        (self.read)(instance)
    }
}

pub(crate) enum Member<S: Store> {
    Getter(Getter<S>),
    Method { method: Method<S>, commit: bool },
}

/// Dispatch table of a store class.
pub struct Class<S: Store> {
    fields: Vec<FieldDef<S>>,
    members: HashMap<&'static str, Member<S>>,
}

thread_local! {
    static CLASSES: RefCell<HashMap<TypeId, Rc<dyn Any>>> = RefCell::new(HashMap::new());
}

impl<S: Store> Class<S> {
    fn new() -> Self {
        Class {
            fields: Vec::new(),
            members: HashMap::new(),
        }
    }

    /// The table for `S`, built by [`Store::define`] on first use.
    pub fn shared() -> Rc<Self> {
        let cached = CLASSES.with(|classes| classes.borrow().get(&TypeId::of::<S>()).cloned());
        if let Some(class) = cached.and_then(|c| c.downcast::<Self>().ok()) {
            return class;
        }

        let mut class = Class::new();
        S::define(&mut class);
        let class = Rc::new(class);
        CLASSES.with(|classes| {
            classes
                .borrow_mut()
                .insert(TypeId::of::<S>(), class.clone() as Rc<dyn Any>)
        });
        class
    }

    /// Declare an enumerable field. Its value at construction time becomes
    /// part of the default snapshot; afterwards the snapshot is the only
    /// source of truth for it.
    pub fn field<P, F>(&mut self, name: &'static str, read: F) -> &mut Self
    where
        P: Property + ?Sized,
        F: Fn(&S) -> &P + 'static,
    {
        self.fields.retain(|f| f.name != name);
        self.fields.push(FieldDef {
            name,
            read: Box::new(move |instance| read(instance).to_plain()),
        });
        self
    }

    /// Declare a computed member evaluated against the store's view.
    pub fn getter<F>(&mut self, name: &'static str, getter: F) -> &mut Self
    where
        F: Fn(&View<'_, S>) -> Result<Value, Error> + 'static,
    {
        self.members.insert(name, Member::Getter(Rc::new(getter)));
        self
    }

    /// Declare a method. Names starting with `$` are commit methods.
    pub fn method<F>(&mut self, name: &'static str, method: F) -> &mut Self
    where
        F: Fn(&mut View<'_, S>, &[Value]) -> Result<Value, Error> + 'static,
    {
        let commit = name.starts_with(COMMIT_PREFIX);
        self.members.insert(
            name,
            Member::Method {
                method: Rc::new(method),
                commit,
            },
        );
        self
    }

    /// Declare a commit method regardless of its name.
    pub fn commit<F>(&mut self, name: &'static str, method: F) -> &mut Self
    where
        F: Fn(&mut View<'_, S>, &[Value]) -> Result<Value, Error> + 'static,
    {
        self.members.insert(
            name,
            Member::Method {
                method: Rc::new(method),
                commit: true,
            },
        );
        self
    }

    pub(crate) fn fields(&self) -> impl Iterator<Item = &FieldDef<S>> {
        self.fields.iter()
    }

    pub(crate) fn member(&self, name: &str) -> Option<&Member<S>> {
        self.members.get(name)
    }

    /// Names of the declared enumerable fields, in declaration order.
    pub fn field_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields.iter().map(|f| f.name)
    }

    pub fn is_commit(&self, name: &str) -> bool {
        matches!(self.members.get(name), Some(Member::Method { commit: true, .. }))
    }

    pub fn has_member(&self, name: &str) -> bool {
        self.members.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    thread_local! {
        static DEFINE_CALLS: Cell<usize> = const { Cell::new(0) };
    }

    struct Counter {
        count: i64,
        _step: i64,
    }

    impl Store for Counter {
        const CLASS: &'static str = "Counter";
        type Params = ();

        fn construct(_: &()) -> Self {
            Counter { count: 0, _step: 1 }
        }

        fn define(class: &mut Class<Self>) {
            DEFINE_CALLS.with(|c| c.set(c.get() + 1));
            class
                .field("count", |c| &c.count)
                .getter("double", |this| {
                    Ok(Value::from(this.field::<i64>("count")? * 2))
                })
                .method("$add", |this, _| {
                    this.update("count", |v| *v = Value::from(v.as_i64().unwrap_or(0) + 1))?;
                    Ok(Value::Null)
                })
                .method("describe", |this, _| Ok(Value::from(format!("count={}", this.get("count")?.as_i64().unwrap_or(0)))))
                .commit("reset", |this, _| {
                    this.set("count", 0i64)?;
                    Ok(Value::Null)
                });
        }
    }

    #[test]
    fn table_is_built_once_per_thread() {
        let a = Class::<Counter>::shared();
        let calls = DEFINE_CALLS.with(Cell::get);
        let b = Class::<Counter>::shared();
        assert!(Rc::ptr_eq(&a, &b));
        assert_eq!(DEFINE_CALLS.with(Cell::get), calls);
    }

    #[test]
    fn commit_methods_by_prefix_or_registration() {
        let class = Class::<Counter>::shared();
        assert!(class.is_commit("$add"));
        assert!(class.is_commit("reset"));
        assert!(!class.is_commit("describe"));
        assert!(!class.is_commit("double"));
        assert!(class.has_member("double"));
    }

    #[test]
    fn arg_decodes_or_reports_index() {
        let args = [Value::from("jack"), Value::from(3i64)];
        assert_eq!(arg::<String>(&args, 0).unwrap(), "jack");
        assert_eq!(arg::<u8>(&args, 1).unwrap(), 3);
        assert!(matches!(arg::<String>(&args, 1), Err(Error::Argument { index: 1, .. })));
        assert!(matches!(arg::<String>(&args, 2), Err(Error::Argument { index: 2, .. })));
    }

    #[test]
    fn hidden_fields_are_not_enumerated() {
        let class = Class::<Counter>::shared();
        assert_eq!(class.field_names().collect::<Vec<_>>(), vec!["count"]);
    }
}
