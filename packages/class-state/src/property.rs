//! Classification of instance fields into snapshot-safe plain data.
//!
//! Only sequences, booleans, null, numbers, strings and plain records may
//! live in a snapshot. Every field a store class declares goes through
//! [`Property`] once, when the store is constructed; runtime types with no
//! plain-data shape report their type name instead of a value.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::time::{Duration, Instant, SystemTime};

use class_state_snapshot::Value;

use crate::class::Class;
use crate::{Error, Store};

/// A value with no plain-data representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Unsupported {
    pub type_name: &'static str,
}

/// Conversion of a field value into snapshot data.
pub trait Property {
    fn to_plain(&self) -> Result<Value, Unsupported>;
}

impl<P: Property + ?Sized> Property for &P {
    fn to_plain(&self) -> Result<Value, Unsupported> {
        (**self).to_plain()
    }
}

impl<P: Property + ?Sized> Property for Box<P> {
    fn to_plain(&self) -> Result<Value, Unsupported> {
        (**self).to_plain()
    }
}

impl Property for Value {
    fn to_plain(&self) -> Result<Value, Unsupported> {
        Ok(self.clone())
    }
}

impl Property for () {
    fn to_plain(&self) -> Result<Value, Unsupported> {
        Ok(Value::Null)
    }
}

impl Property for bool {
    fn to_plain(&self) -> Result<Value, Unsupported> {
        Ok(Value::Bool(*self))
    }
}

macro_rules! integer_property {
    ($($t:ty),*) => {
        $(
            impl Property for $t {
                fn to_plain(&self) -> Result<Value, Unsupported> {
                    Ok(Value::Integer(i64::from(*self)))
                }
            }
        )*
    };
}

integer_property!(i8, i16, i32, i64, u8, u16, u32);

macro_rules! wide_integer_property {
    ($($t:ty),*) => {
        $(
            impl Property for $t {
                fn to_plain(&self) -> Result<Value, Unsupported> {
                    i64::try_from(*self).map(Value::Integer).map_err(|_| Unsupported {
                        type_name: stringify!($t),
                    })
                }
            }
        )*
    };
}

wide_integer_property!(u64, usize, isize);

impl Property for f32 {
    fn to_plain(&self) -> Result<Value, Unsupported> {
        Ok(Value::Float(f64::from(*self)))
    }
}

impl Property for f64 {
    fn to_plain(&self) -> Result<Value, Unsupported> {
        Ok(Value::Float(*self))
    }
}

impl Property for str {
    fn to_plain(&self) -> Result<Value, Unsupported> {
        Ok(Value::String(self.to_string()))
    }
}

impl Property for String {
    fn to_plain(&self) -> Result<Value, Unsupported> {
        Ok(Value::String(self.clone()))
    }
}

impl<P: Property> Property for Option<P> {
    fn to_plain(&self) -> Result<Value, Unsupported> {
        match self {
            Some(v) => v.to_plain(),
            None => Ok(Value::Null),
        }
    }
}

impl<P: Property> Property for [P] {
    fn to_plain(&self) -> Result<Value, Unsupported> {
        self.iter().map(Property::to_plain).collect()
    }
}

impl<P: Property> Property for Vec<P> {
    fn to_plain(&self) -> Result<Value, Unsupported> {
        self.as_slice().to_plain()
    }
}

/// A record with string keys is plain data.
impl<P: Property> Property for BTreeMap<String, P> {
    fn to_plain(&self) -> Result<Value, Unsupported> {
        self.iter()
            .map(|(k, v)| v.to_plain().map(|v| (k.clone(), v)))
            .collect()
    }
}

macro_rules! unsupported_property {
    ($name:literal => $($t:tt)*) => {
        impl $($t)* {
            fn to_plain(&self) -> Result<Value, Unsupported> {
                Err(Unsupported { type_name: $name })
            }
        }
    };
}

unsupported_property!("HashMap" => <K, V, S> Property for HashMap<K, V, S>);
unsupported_property!("HashSet" => <T, S> Property for HashSet<T, S>);
unsupported_property!("BTreeSet" => <T> Property for BTreeSet<T>);
unsupported_property!("SystemTime" => Property for SystemTime);
unsupported_property!("Instant" => Property for Instant);
unsupported_property!("Duration" => Property for Duration);

/// Build the first snapshot of a freshly constructed store instance.
///
/// Walks the fields `class` declares, in declaration order. Fails on the
/// first field whose value is not plain data.
pub fn extract_initial_state<S: Store>(class: &Class<S>, instance: &S) -> Result<Value, Error> {
    let mut state = BTreeMap::new();
    for field in class.fields() {
        let value = field
            .read(instance)
            .map_err(|unsupported| Error::UnsupportedPropertyType {
                type_name: unsupported.type_name,
                class: S::CLASS,
                field: field.name().to_string(),
            })?;
        state.insert(field.name().to_string(), value);
    }
    Ok(Value::from(state))
}
