use std::cell::{Cell, RefCell};
use std::rc::Rc;

use class_state::{
    arg, connect_current, derive_key, Class, Context, Error, Key, KeyParams, Params,
    Producer, Projection, SnapshotMap, Store, StructuralSharing, Value,
};

struct Blog {
    text: String,
}

impl Store for Blog {
    const CLASS: &'static str = "Blog";
    type Params = ();

    fn construct(_: &()) -> Self {
        Blog {
            text: String::new(),
        }
    }

    fn define(class: &mut Class<Self>) {
        class.field("text", |b| &b.text).method("$setText", |this, args| {
            this.set("text", arg::<String>(args, 0)?)?;
            Ok(Value::Null)
        });
    }
}

struct Author {
    name: String,
}

impl Author {
    fn blog() -> Result<Projection<Blog>, Error> {
        connect_current::<Blog>("blog", &())
    }
}

impl Store for Author {
    const CLASS: &'static str = "Author";
    type Params = ();

    fn construct(_: &()) -> Self {
        Author {
            name: String::new(),
        }
    }

    fn define(class: &mut Class<Self>) {
        class
            .field("name", |a| &a.name)
            .getter("log", |this| {
                let text: String = Author::blog()?.field("text")?;
                Ok(Value::from(format!(
                    "'{}' published '{}'",
                    this.field::<String>("name")?,
                    text
                )))
            })
            .method("$setName", |this, args| {
                this.set("name", arg::<String>(args, 0)?)?;
                Ok(Value::Null)
            });
    }
}

#[test]
fn test_multiple_instances() {
    let context = Context::new();
    let author = context.bind::<Author>("user", &()).unwrap();

    author.call("$setName", &[Value::from("jack")]).unwrap();
    let blog = author.enter(|_| Author::blog()).unwrap().unwrap();
    blog.call("$setText", &[Value::from("hello world.")]).unwrap();

    assert_eq!(author.field::<String>("name").unwrap(), "jack");
    assert_eq!(
        author.field::<String>("log").unwrap(),
        "'jack' published 'hello world.'"
    );

    let again = author.enter(|view| view.connect::<Blog>("blog", &())).unwrap().unwrap();
    assert!(Projection::ptr_eq(&again, &context.bind::<Blog>("blog", &()).unwrap()));
}

#[test]
fn test_cross_store_uses_the_owning_context() {
    let first = Context::new();
    let second = Context::new();
    let a = first.bind::<Author>("user", &()).unwrap();
    let b = second.bind::<Author>("user", &()).unwrap();

    let _outer = second.enter();
    let blog = a.enter(|_| Author::blog()).unwrap().unwrap();
    blog.call("$setText", &[Value::from("first")]).unwrap();

    assert!(Context::ptr_eq(&blog.binding().context().unwrap(), &first));
    assert_eq!(b.field::<String>("log").unwrap(), "'' published ''");
    assert_eq!(a.field::<String>("log").unwrap(), "'' published 'first'");
}

#[test]
fn test_connect_current_without_context() {
    assert!(matches!(Author::blog(), Err(Error::NoActiveContext)));
    let err = connect_current::<Blog>("blog", &()).unwrap_err();
    assert_eq!(err.to_string(), "No state context found");
}

struct Member {
    uid: i64,
    name: String,
}

struct Uid(i64);

impl KeyParams for Uid {
    fn key_params(&self) -> Option<Params> {
        Some(Params::new().with("uid", self.0))
    }
}

impl Store for Member {
    const CLASS: &'static str = "Member";
    type Params = Uid;

    fn construct(params: &Uid) -> Self {
        Member {
            uid: params.0,
            name: String::new(),
        }
    }

    fn define(class: &mut Class<Self>) {
        class
            .field("uid", |m| &m.uid)
            .field("name", |m| &m.name)
            .method("$setName", |this, args| {
                this.set("name", arg::<String>(args, 0)?)?;
                Ok(Value::Null)
            });
    }
}

#[test]
fn test_params() {
    let context = Context::new();
    let user100 = context.bind::<Member>("user", &Uid(100)).unwrap();
    user100.call("$setName", &[Value::from("jack")]).unwrap();
    assert_eq!(user100.field::<i64>("uid").unwrap(), 100);

    let user200 = context.bind::<Member>("user", &Uid(200)).unwrap();
    user200.call("$setName", &[Value::from("tom")]).unwrap();
    assert_eq!(user100.field::<i64>("uid").unwrap(), 100);
    assert!(!Projection::same_binding(&user100, &user200));

    let key100 = Key::from("user?uid=100");
    let key200 = Key::from("user?uid=200");
    assert!(context.get(&key100).unwrap().same(&user100.binding().snapshot()));
    assert!(context.get(&key200).unwrap().same(&user200.binding().snapshot()));
    assert_eq!(context.to_json().unwrap(), concat!(
        r#"{"user?uid=100":{"name":"jack","uid":100},"#,
        r#""user?uid=200":{"name":"tom","uid":200}}"#
    ));
}

struct Doc {
    id: i64,
}

impl Store for Doc {
    const CLASS: &'static str = "Doc";
    type Params = i64;

    fn construct(id: &i64) -> Self {
        Doc { id: *id }
    }

    fn define(class: &mut Class<Self>) {
        class.field("id", |d| &d.id);
    }
}

#[test]
fn test_scalar_params() {
    let context = Context::new();
    let doc = context.bind::<Doc>("doc", &100).unwrap();
    assert_eq!(doc.binding().key(), &Key::from("doc?100"));
    assert_eq!(doc.field::<i64>("id").unwrap(), 100);

    assert!(Projection::same_binding(&doc, &context.bind::<Doc>("doc", &100).unwrap()));
    assert!(context.lookup::<Doc>("doc", &200).unwrap().is_none());
    let state = context.state_or_create::<Doc>("doc", &100).unwrap();
    assert_eq!(state.field("id"), Some(&Value::from(100i64)));
}

#[test]
fn test_state_queries() {
    let context = Context::new();
    assert!(context.state("user", Some(&Params::new().with("uid", 1))).is_none());

    let state = context.state_or_create::<Member>("user", &Uid(1)).unwrap();
    assert_eq!(state.field("name"), Some(&Value::from("")));
    assert!(context.lookup::<Member>("user", &Uid(1)).unwrap().is_some());
    assert!(context.lookup::<Member>("user", &Uid(2)).unwrap().is_none());

    // Defaults serve until the first commit promotes the snapshot.
    let params = Params::new().with("uid", 1);
    assert!(context.get(&derive_key("user", Some(&params))).is_none());
    let member = context.bind::<Member>("user", &Uid(1)).unwrap();
    member.call("$setName", &[Value::from("jack")]).unwrap();
    let promoted = context.state("user", Some(&params)).unwrap();
    assert_eq!(promoted.field("name"), Some(&Value::from("jack")));
}

#[test]
fn test_server_render_round_trip() {
    let server = Context::new();
    let member = server.bind::<Member>("user", &Uid(7)).unwrap();
    member.call("$setName", &[Value::from("jack")]).unwrap();
    let payload = server.to_json().unwrap();

    let client = Context::builder().state_json(&payload).unwrap().build();
    let member = client.bind::<Member>("user", &Uid(7)).unwrap();
    assert_eq!(member.field::<String>("name").unwrap(), "jack");
    assert!(member.binding().is_connecting());
    assert_eq!(client.dehydrate(), server.dehydrate());
}

struct Counter {
    count: i64,
    batches: u32,
}

impl Store for Counter {
    const CLASS: &'static str = "Counter";
    type Params = ();

    fn construct(_: &()) -> Self {
        Counter {
            count: 0,
            batches: 0,
        }
    }

    fn define(class: &mut Class<Self>) {
        class
            .field("count", |c| &c.count)
            .method("$inc", |this, _| {
                this.update("count", |v| *v = Value::from(v.as_i64().unwrap_or(0) + 1))?;
                Ok(Value::Null)
            })
            .method("$incTwice", |this, _| {
                this.call("$inc", &[])?;
                let seen = this.field::<i64>("count")?;
                this.call("$inc", &[])?;
                this.raw_mut().batches += 1;
                Ok(Value::from(seen))
            })
            .method("$add", |this, args| {
                let mut total = this.field::<i64>("count")?;
                for i in 0..args.len() {
                    total += arg::<i64>(args, i)?;
                }
                this.set("count", total)?;
                Ok(Value::Bool(true))
            })
            .method("$overflow", |this, _| {
                this.set("count", 99i64)?;
                Err(Error::method("overflow"))
            })
            .method("$incTolerant", |this, _| {
                let _ = this.call("$overflow", &[]);
                this.call("$inc", &[])?;
                Ok(Value::from(this.field::<i64>("count")?))
            });
    }
}

/// Records every write that reaches the backing map.
struct Recording {
    inner: Box<dyn SnapshotMap>,
    writes: Rc<RefCell<Vec<Key>>>,
}

impl SnapshotMap for Recording {
    fn get(&self, key: &Key) -> Option<Value> {
        self.inner.get(key)
    }

    fn set(&self, key: &Key, snapshot: Value) {
        self.writes.borrow_mut().push(key.clone());
        self.inner.set(key, snapshot)
    }

    fn delete(&self, key: &Key) -> Option<Value> {
        self.inner.delete(key)
    }

    fn has(&self, key: &Key) -> bool {
        self.inner.has(key)
    }

    fn keys(&self) -> Vec<Key> {
        self.inner.keys()
    }
}

fn recording_context() -> (Context, Rc<RefCell<Vec<Key>>>) {
    let writes = Rc::new(RefCell::new(Vec::new()));
    let log = writes.clone();
    let context = Context::builder()
        .wrap(move |inner| -> Box<dyn SnapshotMap> { Box::new(Recording { inner, writes: log }) })
        .build();
    (context, writes)
}

#[test]
fn test_reentrant_commit_publishes_once() {
    let (context, writes) = recording_context();
    let counter = context.bind::<Counter>("counter", &()).unwrap();

    let seen = counter.call_as::<i64>("$incTwice", &[]).unwrap();
    assert_eq!(seen, 1);
    assert_eq!(counter.field::<i64>("count").unwrap(), 2);
    assert_eq!(writes.borrow().len(), 1);
    assert_eq!(counter.enter(|view| view.raw().batches).unwrap(), 1);
}

#[test]
fn test_failed_nested_commit_rolls_back() {
    let (context, writes) = recording_context();
    let counter = context.bind::<Counter>("counter", &()).unwrap();
    counter.call("$inc", &[]).unwrap();

    let seen = counter.call_as::<i64>("$incTolerant", &[]).unwrap();
    assert_eq!(seen, 2);
    assert_eq!(counter.field::<i64>("count").unwrap(), 2);
    assert_eq!(writes.borrow().len(), 2);

    // A top-level failure still publishes nothing.
    assert!(counter.call("$overflow", &[]).is_err());
    assert_eq!(counter.field::<i64>("count").unwrap(), 2);
    assert_eq!(writes.borrow().len(), 2);
}

#[test]
fn test_return_value_and_args() {
    let (context, writes) = recording_context();
    let counter = context.bind::<Counter>("counter", &()).unwrap();
    let add = counter.commit("$add").unwrap();

    assert!(add.invoke_as::<bool>(&[Value::from(2i64), Value::from(3i64)]).unwrap());
    assert_eq!(counter.field::<i64>("count").unwrap(), 5);
    assert_eq!(*writes.borrow(), vec![Key::from("counter")]);

    // Adding nothing changes nothing, and nothing is written.
    assert!(counter.call_as::<bool>("$add", &[]).unwrap());
    assert_eq!(writes.borrow().len(), 1);
}

#[test]
fn test_wrapped_map_sees_hydrated_state() {
    let seen = Rc::new(Cell::new(0usize));
    let count = seen.clone();
    let _context = Context::builder()
        .state([("counter", Value::from(vec![Value::from(1i64)]))])
        .wrap(move |inner| {
            count.set(inner.keys().len());
            inner
        })
        .build();
    assert_eq!(seen.get(), 1);
}

#[test]
fn test_dependency_hook() {
    let reads = Rc::new(RefCell::new(Vec::new()));
    let log = reads.clone();
    let context = Context::builder()
        .on_depend(move |dep| log.borrow_mut().push((dep.key.to_string(), dep.field.to_string())))
        .build();
    let counter = context.bind::<Counter>("counter", &()).unwrap();

    // Fresh bindings are not tracked.
    counter.get("count").unwrap();
    assert!(reads.borrow().is_empty());

    counter.call("$inc", &[]).unwrap();
    assert!(reads.borrow().is_empty());

    counter.get("count").unwrap();
    assert_eq!(
        *reads.borrow(),
        vec![("counter".to_string(), "count".to_string())]
    );
}

/// Counts finished drafts and delegates to the default producer.
struct CountingProducer {
    finished: Rc<Cell<usize>>,
}

impl Producer for CountingProducer {
    fn draft(&self, base: &Value) -> Value {
        StructuralSharing.draft(base)
    }

    fn finish(&self, base: &Value, draft: Value) -> Value {
        self.finished.set(self.finished.get() + 1);
        StructuralSharing.finish(base, draft)
    }
}

#[test]
fn test_injected_producer() {
    let finished = Rc::new(Cell::new(0));
    let context = Context::builder()
        .producer(CountingProducer {
            finished: finished.clone(),
        })
        .build();
    let counter = context.bind::<Counter>("counter", &()).unwrap();

    counter.call("$incTwice", &[]).unwrap();
    assert_eq!(finished.get(), 1);
    assert!(counter.call("$add", &[Value::from("x")]).is_err());
    assert_eq!(finished.get(), 1);
}
