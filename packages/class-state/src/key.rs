//! Store keys: the identity of a store instance inside a context.

use std::fmt;

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

/// Everything but `A-Z a-z 0-9 - _ . ! ~ * ' ( )` is escaped.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// The canonical key a store's snapshot lives under, e.g. `user?uid=100`.
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct Key(String);

impl Key {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Key {
    fn from(key: &str) -> Self {
        Key(key.to_string())
    }
}

impl From<String> for Key {
    fn from(key: String) -> Self {
        Key(key)
    }
}

impl AsRef<str> for Key {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A single parameter value.
#[derive(Clone, Debug, PartialEq)]
pub enum ParamValue {
    Str(String),
    Int(i64),
    Float(f64),
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Str(s) => f.write_str(s),
            ParamValue::Int(i) => write!(f, "{}", i),
            ParamValue::Float(x) => write!(f, "{}", x),
        }
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Str(v.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        ParamValue::Str(v)
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::Int(v)
    }
}

impl From<i32> for ParamValue {
    fn from(v: i32) -> Self {
        ParamValue::Int(v as i64)
    }
}

impl From<u32> for ParamValue {
    fn from(v: u32) -> Self {
        ParamValue::Int(v as i64)
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Float(v)
    }
}

/// Parameters distinguishing several live instances of one store class.
///
/// Entries keep insertion order; [`derive_key`] sorts them, so the order
/// in which parameters are added never changes the key.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Params {
    entries: Vec<(String, ParamValue)>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a parameter, replacing any earlier value under the same name.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<ParamValue>) {
        let name = name.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }
}

impl<K: Into<String>, V: Into<ParamValue>> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Params::new();
        for (name, value) in iter {
            params.insert(name, value);
        }
        params
    }
}

/// Constructor parameters of a store class, as seen by key derivation.
///
/// Stores without parameters use `()`. Typed parameter structs implement
/// this to project themselves onto the key. A single scalar parameter
/// (`i64`, `String`, ...) keys the store as `name?value`.
pub trait KeyParams {
    fn key_params(&self) -> Option<Params>;

    /// A lone scalar parameter, used in place of a parameter map.
    fn key_scalar(&self) -> Option<ParamValue> {
        None
    }
}

impl KeyParams for () {
    fn key_params(&self) -> Option<Params> {
        None
    }
}

impl KeyParams for Params {
    fn key_params(&self) -> Option<Params> {
        Some(self.clone())
    }
}

impl<P: KeyParams> KeyParams for Option<P> {
    fn key_params(&self) -> Option<Params> {
        self.as_ref().and_then(KeyParams::key_params)
    }

    fn key_scalar(&self) -> Option<ParamValue> {
        self.as_ref().and_then(KeyParams::key_scalar)
    }
}

macro_rules! scalar_key_params {
    ($($ty:ty),*) => {
        $(
            impl KeyParams for $ty {
                fn key_params(&self) -> Option<Params> {
                    None
                }

                fn key_scalar(&self) -> Option<ParamValue> {
                    Some(ParamValue::from(self.clone()))
                }
            }
        )*
    };
}

scalar_key_params!(ParamValue, String, i64, i32, u32, f64);

/// Derive the key for `name` and optional parameters.
///
/// Parameters are sorted by name and appended as a query:
/// `user?age=200&uid=100`. Values are percent-encoded the way
/// `encodeURIComponent` does it; names are taken verbatim. An empty
/// parameter set adds nothing.
pub fn derive_key(name: &str, params: Option<&Params>) -> Key {
    let mut key = name.to_string();
    if let Some(params) = params.filter(|p| !p.is_empty()) {
        let mut pairs: Vec<(&str, &ParamValue)> = params.iter().collect();
        pairs.sort_by(|a, b| a.0.cmp(b.0));
        let query = pairs
            .iter()
            .map(|(n, v)| format!("{}={}", n, encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        key.push('?');
        key.push_str(&query);
    }
    Key(key)
}

/// The key a store constructed with `params` lives under.
///
/// A scalar parameter gives `name?value`; otherwise this is
/// [`derive_key`] over [`KeyParams::key_params`].
pub fn key_of<P: KeyParams + ?Sized>(name: &str, params: &P) -> Key {
    match params.key_scalar() {
        Some(value) => Key(format!("{}?{}", name, encode(&value))),
        None => derive_key(name, params.key_params().as_ref()),
    }
}

fn encode(value: &ParamValue) -> String {
    utf8_percent_encode(&value.to_string(), COMPONENT).to_string()
}
