//! The snapshot store shared by every store bound to it.
//!
//! A [`Context`] maps keys to snapshots and keeps the live bindings for those
//! keys. It is created once per application, session or request and can be
//! pre-populated from a server-rendered payload (hydration).

use std::any::Any;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use class_state_snapshot::{Producer, StructuralSharing, Value};

use crate::binding::Binding;
use crate::class::{Class, Store};
use crate::key::{derive_key, key_of, Key, Params};
use crate::projection::Projection;
use crate::property::extract_initial_state;
use crate::resolver::{self, ContextScope};
use crate::Error;

/// Backing mapping of a context.
///
/// Methods take `&self` so that an observing wrapper may call back into the
/// context while it is being written to.
pub trait SnapshotMap {
    fn get(&self, key: &Key) -> Option<Value>;
    fn set(&self, key: &Key, snapshot: Value);
    fn delete(&self, key: &Key) -> Option<Value>;
    fn has(&self, key: &Key) -> bool;
    fn keys(&self) -> Vec<Key>;
}

/// The default in-memory backing map.
#[derive(Debug, Default)]
pub struct MemoryMap {
    entries: RefCell<BTreeMap<Key, Value>>,
}

impl MemoryMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a map with initial data.
    pub fn with_data(entries: BTreeMap<Key, Value>) -> Self {
        MemoryMap {
            entries: RefCell::new(entries),
        }
    }
}

impl SnapshotMap for MemoryMap {
    fn get(&self, key: &Key) -> Option<Value> {
        self.entries.borrow().get(key).cloned()
    }

    fn set(&self, key: &Key, snapshot: Value) {
        self.entries.borrow_mut().insert(key.clone(), snapshot);
    }

    fn delete(&self, key: &Key) -> Option<Value> {
        self.entries.borrow_mut().remove(key)
    }

    fn has(&self, key: &Key) -> bool {
        self.entries.borrow().contains_key(key)
    }

    fn keys(&self) -> Vec<Key> {
        self.entries.borrow().keys().cloned().collect()
    }
}

/// Process-unique identifier of a context.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(u64);

impl ContextId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        ContextId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "context#{}", self.0)
    }
}

/// A snapshot-backed read reported to the dependency hook.
#[derive(Clone, Copy, Debug)]
pub struct Dependency<'a> {
    pub context: ContextId,
    pub key: &'a Key,
    pub field: &'a str,
}

type WrapFn = Box<dyn FnOnce(Box<dyn SnapshotMap>) -> Box<dyn SnapshotMap>>;
type DependFn = Box<dyn Fn(&Dependency<'_>)>;

/// Configuration of a new [`Context`].
pub struct ContextBuilder {
    state: BTreeMap<Key, Value>,
    wrap: Option<WrapFn>,
    depend: Option<DependFn>,
    producer: Box<dyn Producer>,
}

impl Default for ContextBuilder {
    fn default() -> Self {
        ContextBuilder {
            state: BTreeMap::new(),
            wrap: None,
            depend: None,
            producer: Box::new(StructuralSharing),
        }
    }
}

impl ContextBuilder {
    /// Pre-populate the context, typically with a server-rendered payload.
    pub fn state<K: Into<Key>>(mut self, state: impl IntoIterator<Item = (K, Value)>) -> Self {
        self.state
            .extend(state.into_iter().map(|(key, value)| (key.into(), value)));
        self
    }

    /// Pre-populate the context from the JSON produced by [`Context::to_json`].
    pub fn state_json(self, json: &str) -> Result<Self, Error> {
        let state: BTreeMap<String, Value> = serde_json::from_str(json)?;
        Ok(self.state(state))
    }

    /// Replace the backing map with whatever `wrap` returns for it.
    ///
    /// The wrapper sees hydration state already loaded.
    pub fn wrap<F>(mut self, wrap: F) -> Self
    where
        F: FnOnce(Box<dyn SnapshotMap>) -> Box<dyn SnapshotMap> + 'static,
    {
        self.wrap = Some(Box::new(wrap));
        self
    }

    /// Report every snapshot-backed read of a bound store.
    pub fn on_depend<F>(mut self, depend: F) -> Self
    where
        F: Fn(&Dependency<'_>) + 'static,
    {
        self.depend = Some(Box::new(depend));
        self
    }

    pub fn producer(mut self, producer: impl Producer + 'static) -> Self {
        self.producer = Box::new(producer);
        self
    }

    pub fn build(self) -> Context {
        let hydrated = self.state.len();
        let mut map: Box<dyn SnapshotMap> = Box::new(MemoryMap::with_data(self.state));
        if let Some(wrap) = self.wrap {
            map = wrap(map);
        }
        let id = ContextId::next();
        log::debug!("created {} with {} hydrated keys", id, hydrated);
        Context {
            inner: Rc::new(ContextInner {
                id,
                map,
                bindings: RefCell::new(HashMap::new()),
                depend: self.depend,
                producer: self.producer,
            }),
        }
    }
}

struct Registered {
    class: &'static str,
    defaults: Value,
    binding: Rc<dyn Any>,
}

pub(crate) struct ContextInner {
    id: ContextId,
    map: Box<dyn SnapshotMap>,
    bindings: RefCell<HashMap<Key, Registered>>,
    depend: Option<DependFn>,
    producer: Box<dyn Producer>,
}

/// Shared handle to a snapshot store and its live bindings.
#[derive(Clone)]
pub struct Context {
    pub(crate) inner: Rc<ContextInner>,
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("id", &self.inner.id)
            .field("keys", &self.keys())
            .finish()
    }
}

impl Context {
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> ContextBuilder {
        ContextBuilder::default()
    }

    pub fn id(&self) -> ContextId {
        self.inner.id
    }

    pub fn ptr_eq(a: &Context, b: &Context) -> bool {
        Rc::ptr_eq(&a.inner, &b.inner)
    }

    pub fn get(&self, key: &Key) -> Option<Value> {
        self.inner.map.get(key)
    }

    pub fn set(&self, key: &Key, snapshot: Value) {
        self.inner.map.set(key, snapshot)
    }

    pub fn delete(&self, key: &Key) -> Option<Value> {
        self.inner.map.delete(key)
    }

    pub fn has(&self, key: &Key) -> bool {
        self.inner.map.has(key)
    }

    pub fn keys(&self) -> Vec<Key> {
        self.inner.map.keys()
    }

    /// Make this the ambient context until the returned guard drops.
    ///
    /// Stores connected through [`crate::connect_current`] inside the scope
    /// bind against this context.
    pub fn enter(&self) -> ContextScope {
        resolver::enter(self)
    }

    /// Get or create the store `S` named `name`.
    ///
    /// The first call for a key constructs the instance, extracts its
    /// default snapshot and merges any hydrated state over it. Later calls
    /// for the same key return a projection of the same binding.
    ///
    /// A projection does not keep its context alive. Hold on to the
    /// `Context` for as long as its stores are used; once the last handle
    /// drops, every projection it handed out fails with
    /// [`Error::Disconnected`].
    pub fn bind<S: Store>(&self, name: &str, params: &S::Params) -> Result<Projection<S>, Error> {
        let key = key_of(name, params);
        if let Some(projection) = self.registered::<S>(&key)? {
            return Ok(projection);
        }

        let class = Class::<S>::shared();
        let raw = S::construct(params);
        let defaults = extract_initial_state(&class, &raw)?;

        // Construction may itself have bound this key.
        if let Some(projection) = self.registered::<S>(&key)? {
            return Ok(projection);
        }

        let (snapshot, connecting) = match self.inner.map.get(&key) {
            Some(persisted) => (hydrate(&key, &defaults, &persisted)?, true),
            None => (defaults.clone(), false),
        };
        log::debug!(
            "bound {} at {} in {} (hydrated: {})",
            S::CLASS,
            key,
            self.inner.id,
            connecting
        );

        let binding = Binding::new(self, key.clone(), class, raw, defaults.clone(), snapshot, connecting);
        self.inner.bindings.borrow_mut().insert(
            key,
            Registered {
                class: S::CLASS,
                defaults,
                binding: binding.clone() as Rc<dyn Any>,
            },
        );
        Ok(binding.projection())
    }

    /// The projection of an already bound store, if any.
    pub fn lookup<S: Store>(&self, name: &str, params: &S::Params) -> Result<Option<Projection<S>>, Error> {
        self.registered::<S>(&key_of(name, params))
    }

    /// The promoted snapshot for `name`, falling back to the default
    /// snapshot of a bound store that has not committed yet.
    pub fn state(&self, name: &str, params: Option<&Params>) -> Option<Value> {
        self.state_at(&derive_key(name, params))
    }

    fn state_at(&self, key: &Key) -> Option<Value> {
        self.inner.map.get(key).or_else(|| {
            self.inner
                .bindings
                .borrow()
                .get(key)
                .map(|registered| registered.defaults.clone())
        })
    }

    /// Like [`Context::state`], binding `S` first when nothing is there.
    pub fn state_or_create<S: Store>(&self, name: &str, params: &S::Params) -> Result<Value, Error> {
        if let Some(state) = self.state_at(&key_of(name, params)) {
            return Ok(state);
        }
        let projection = self.bind::<S>(name, params)?;
        Ok(projection.binding().default_state().clone())
    }

    /// Every promoted snapshot, keyed by store key.
    pub fn dehydrate(&self) -> BTreeMap<String, Value> {
        self.keys()
            .into_iter()
            .filter_map(|key| {
                let value = self.inner.map.get(&key)?;
                Some((key.as_str().to_string(), value))
            })
            .collect()
    }

    /// Serialize [`Context::dehydrate`] for embedding in a rendered page.
    pub fn to_json(&self) -> Result<String, Error> {
        Ok(serde_json::to_string(&self.dehydrate())?)
    }

    pub(crate) fn producer(&self) -> &dyn Producer {
        self.inner.producer.as_ref()
    }

    pub(crate) fn depend(&self, key: &Key, field: &str) {
        if let Some(depend) = &self.inner.depend {
            depend(&Dependency {
                context: self.inner.id,
                key,
                field,
            });
        }
    }

    /// Drop `key` from both the map and the binding registry.
    pub(crate) fn release(&self, key: &Key) {
        self.inner.map.delete(key);
        let removed = self.inner.bindings.borrow_mut().remove(key);
        // The binding may own the last handle to other stores; drop it after
        // the registry borrow ends.
        drop(removed);
    }

    fn registered<S: Store>(&self, key: &Key) -> Result<Option<Projection<S>>, Error> {
        let entry = self
            .inner
            .bindings
            .borrow()
            .get(key)
            .map(|registered| (registered.class, registered.binding.clone()));
        match entry {
            None => Ok(None),
            Some((class, binding)) => match binding.downcast::<Binding<S>>() {
                Ok(binding) => Ok(Some(binding.projection())),
                Err(_) => Err(Error::KeyOccupied {
                    key: key.clone(),
                    class,
                }),
            },
        }
    }
}

/// Shallow merge of persisted state over the defaults; persisted wins.
fn hydrate(key: &Key, defaults: &Value, persisted: &Value) -> Result<Value, Error> {
    let persisted = persisted.as_map().ok_or_else(|| Error::InvalidHydration {
        key: key.clone(),
        found: persisted.kind(),
    })?;
    let mut merged = defaults.as_map().cloned().unwrap_or_default();
    merged.extend(persisted.iter().map(|(k, v)| (k.clone(), v.clone())));
    Ok(Value::from(merged))
}
