//! Class-shaped stores over immutable snapshots.
//!
//! Application code works with ordinary store types: fields and methods.
//! The durable state of every store lives in a [`Context`], a flat map from
//! keys to plain-data snapshots. Reading a field reads the snapshot; calling
//! a commit method runs it against a copy-on-write draft and publishes the
//! result only when something changed, sharing every unchanged subtree with
//! the previous snapshot.
//!
//! - [`Store`] and [`Class`]: declare a store's fields, getters and methods
//! - [`Context`]: the snapshot map, hydration and dehydration
//! - [`Projection`]: the handle callers hold; [`View`]: what methods see
//! - [`connect_current`]: reach another store from inside a store
//!
//! # Example
//!
//! ```rust
//! use class_state::{arg, Class, Context, Projection, Store, Value};
//!
//! struct User {
//!     name: String,
//!     age: u32,
//! }
//!
//! impl Store for User {
//!     const CLASS: &'static str = "User";
//!     type Params = ();
//!
//!     fn construct(_: &()) -> Self {
//!         User { name: String::new(), age: 18 }
//!     }
//!
//!     fn define(class: &mut Class<Self>) {
//!         class
//!             .field("name", |u| &u.name)
//!             .field("age", |u| &u.age)
//!             .method("$setName", |this, args| {
//!                 this.set("name", arg::<String>(args, 0)?)?;
//!                 Ok(Value::Null)
//!             });
//!     }
//! }
//!
//! let context = Context::new();
//! let user = context.bind::<User>("user", &()).unwrap();
//! user.call("$setName", &[Value::from("jack")]).unwrap();
//!
//! assert_eq!(user.field::<String>("name").unwrap(), "jack");
//! assert!(!user.is_current());
//!
//! let again = context.bind::<User>("user", &()).unwrap();
//! assert!(!Projection::ptr_eq(&user, &again));
//! assert!(Projection::same_binding(&user, &again));
//! assert_eq!(context.to_json().unwrap(), r#"{"user":{"age":18,"name":"jack"}}"#);
//! ```

mod binding;
mod class;
mod commit;
mod context;
mod error;
mod key;
mod projection;
mod property;
mod resolver;

pub use binding::{Binding, Phase};
pub use class::{arg, Class, Getter, Method, Store, COMMIT_PREFIX};
pub use commit::CommitFn;
pub use context::{Context, ContextBuilder, ContextId, Dependency, MemoryMap, SnapshotMap};
pub use error::{Error, MethodError};
pub use key::{derive_key, key_of, Key, KeyParams, ParamValue, Params};
pub use projection::{Projection, View};
pub use property::{extract_initial_state, Property, Unsupported};
pub use resolver::{active_context, connect_current, ContextScope};

pub use class_state_snapshot::{self as snapshot, path, Path, Producer, StructuralSharing, Value};
