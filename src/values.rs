//! Session values and the process-wide value type registry.
//!
//! A session maps string keys to [`Value`]s, which hold any `Send + Sync` type.
//! Putting a value into a session always works. Writing the session to a backend
//! requires the value's concrete type to be registered with [`register`], which binds it
//! to a stable tag name and to serde encode/decode functions. Saving a session that holds
//! an unregistered type fails with [`SessionError::UnregisteredType`].
//!
//! The registry is populated with the built-in shapes on first use:
//!
//! | Rust type | tag |
//! |---|---|
//! | `String` | `string` |
//! | `bool` | `bool` |
//! | `i64` | `int` |
//! | `u64` | `uint` |
//! | `f64` | `float` |
//! | `Vec<String>` | `[]string` |
//! | `HashMap<String, serde_json::Value>` | `map[string]any` |
//! | `HashMap<String, String>` | `map[string]string` |
//!
//! Encoded sessions are a JSON object of `{ key: { "type": tag, "value": ... } }`.
//!
//! ```rust
//! use gosub_sessions::values::{self, Value};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize)]
//! struct Cart { items: Vec<u32> }
//!
//! values::register::<Cart>("cart").unwrap();
//! let v = Value::new(Cart { items: vec![1, 2] });
//! assert_eq!(v.downcast_ref::<Cart>().unwrap().items, vec![1, 2]);
//! ```
use std::any::{Any, TypeId};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use lazy_static::lazy_static;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, SessionError};

/// The key/value mapping held by a session.
pub type Values = HashMap<String, Value>;

/// A dynamically typed session value. Cloning is cheap and shares the inner value.
#[derive(Clone)]
pub struct Value {
    inner: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
}

impl Value {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            inner: Arc::new(value),
            type_name: std::any::type_name::<T>(),
        }
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }

    pub fn is<T: Any>(&self) -> bool {
        self.inner.is::<T>()
    }

    /// Rust type name of the held value.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    fn value_type_id(&self) -> TypeId {
        (*self.inner).type_id()
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match to_json(self) {
            Ok(json) => write!(f, "Value({}: {json})", self.type_name),
            Err(_) => write!(f, "Value({})", self.type_name),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::new(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::new(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::new(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::new(n)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::new(n)
    }
}

type EncodeFn = fn(&(dyn Any + Send + Sync)) -> Result<serde_json::Value>;
type DecodeFn = fn(serde_json::Value) -> Result<Value>;

struct Entry {
    tag: String,
    encode: EncodeFn,
    decode: DecodeFn,
}

#[derive(Default)]
struct Registry {
    by_type: HashMap<TypeId, Arc<Entry>>,
    by_tag: HashMap<String, Arc<Entry>>,
}

impl Registry {
    fn with_builtins() -> Self {
        let mut r = Registry::default();
        // tags are distinct, these cannot conflict
        let _ = r.insert::<String>("string");
        let _ = r.insert::<bool>("bool");
        let _ = r.insert::<i64>("int");
        let _ = r.insert::<u64>("uint");
        let _ = r.insert::<f64>("float");
        let _ = r.insert::<Vec<String>>("[]string");
        let _ = r.insert::<HashMap<String, serde_json::Value>>("map[string]any");
        let _ = r.insert::<HashMap<String, String>>("map[string]string");
        r
    }

    fn insert<T>(&mut self, tag: &str) -> Result<()>
    where
        T: Serialize + DeserializeOwned + Any + Send + Sync,
    {
        let type_id = TypeId::of::<T>();

        if let Some(existing) = self.by_tag.get(tag) {
            if self.by_type.get(&type_id).is_some_and(|e| Arc::ptr_eq(e, existing)) {
                return Ok(());
            }
            return Err(SessionError::RegistryConflict(tag.to_string()));
        }

        if let Some(existing) = self.by_type.get(&type_id) {
            log::debug!(
                "session value type {} already registered as {}",
                std::any::type_name::<T>(),
                existing.tag
            );
            return Ok(());
        }

        let entry = Arc::new(Entry {
            tag: tag.to_string(),
            encode: encode_as::<T>,
            decode: decode_as::<T>,
        });
        self.by_type.insert(type_id, entry.clone());
        self.by_tag.insert(tag.to_string(), entry);
        Ok(())
    }
}

fn encode_as<T: Serialize + DeserializeOwned + Any>(value: &(dyn Any + Send + Sync)) -> Result<serde_json::Value> {
    let value = value
        .downcast_ref::<T>()
        .ok_or_else(|| SessionError::UnregisteredType(std::any::type_name::<T>().to_string()))?;
    let json = serde_json::to_value(value)?;

    // non-finite floats serialize as null; refuse what could not be read back
    if json.is_null() {
        serde_json::from_value::<T>(serde_json::Value::Null)?;
    }
    Ok(json)
}

fn decode_as<T: DeserializeOwned + Any + Send + Sync>(json: serde_json::Value) -> Result<Value> {
    Ok(Value::new(serde_json::from_value::<T>(json)?))
}

lazy_static! {
    static ref REGISTRY: RwLock<Registry> = RwLock::new(Registry::with_builtins());
}

/// Registers `T` under `tag` so values of that type can be saved and loaded.
///
/// Registering the same type again is a no-op. Binding a tag that already belongs to a
/// different type fails with [`SessionError::RegistryConflict`].
pub fn register<T>(tag: &str) -> Result<()>
where
    T: Serialize + DeserializeOwned + Any + Send + Sync,
{
    REGISTRY
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .insert::<T>(tag)
}

/// Returns `true` if `T` can be written to a backend.
pub fn is_registered<T: Any>() -> bool {
    REGISTRY
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .by_type
        .contains_key(&TypeId::of::<T>())
}

fn to_json(value: &Value) -> Result<serde_json::Value> {
    let entry = REGISTRY
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .by_type
        .get(&value.value_type_id())
        .cloned()
        .ok_or_else(|| SessionError::UnregisteredType(value.type_name.to_string()))?;

    (entry.encode)(&*value.inner)
}

#[derive(Serialize, Deserialize)]
struct Tagged {
    #[serde(rename = "type")]
    tag: String,
    value: serde_json::Value,
}

/// Serializes a session mapping. Fails on the first value of an unregistered type.
pub fn encode_values(values: &Values) -> Result<Vec<u8>> {
    let registry = REGISTRY.read().unwrap_or_else(PoisonError::into_inner);

    let mut out = BTreeMap::new();
    for (key, value) in values {
        let entry = registry
            .by_type
            .get(&value.value_type_id())
            .ok_or_else(|| SessionError::UnregisteredType(value.type_name.to_string()))?;
        out.insert(
            key.as_str(),
            Tagged {
                tag: entry.tag.clone(),
                value: (entry.encode)(&*value.inner)?,
            },
        );
    }

    Ok(serde_json::to_vec(&out)?)
}

/// Deserializes a mapping produced by [`encode_values`].
pub fn decode_values(data: &[u8]) -> Result<Values> {
    let tagged: HashMap<String, Tagged> = serde_json::from_slice(data)?;
    let registry = REGISTRY.read().unwrap_or_else(PoisonError::into_inner);

    let mut values = Values::with_capacity(tagged.len());
    for (key, Tagged { tag, value }) in tagged {
        let entry = registry
            .by_tag
            .get(&tag)
            .ok_or_else(|| SessionError::UnregisteredType(tag.clone()))?;
        values.insert(key, (entry.decode)(value)?);
    }

    Ok(values)
}
