use std::any::Any;

use crate::options::Options;
use crate::values::{Value, Values};

/// A named session for one request.
///
/// Obtained from [`Store::new`](crate::store::Store::new); only durable once passed to
/// [`Store::save`](crate::store::Store::save).
#[derive(Debug, Clone)]
pub struct Session {
    name: String,
    /// Server-side identifier. Empty for cookie-backed sessions and for file or sqlite
    /// sessions that have not been saved yet.
    pub id: String,
    pub values: Values,
    pub options: Options,
    /// `true` when no stored state was found for the request.
    pub is_new: bool,
}

impl Session {
    pub fn new(name: &str, options: Options) -> Self {
        Self {
            name: name.to_string(),
            id: String::new(),
            values: Values::new(),
            options,
            is_new: true,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Typed read. `None` if the key is absent or holds a different type.
    pub fn get_as<T: Any>(&self, key: &str) -> Option<&T> {
        self.values.get(key).and_then(|v| v.downcast_ref::<T>())
    }

    pub fn set<K: Into<String>, V: Into<Value>>(&mut self, key: K, value: V) {
        self.values.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_session_is_new_and_empty() {
        let s = Session::new("app", Options::default());
        assert_eq!(s.name(), "app");
        assert!(s.is_new);
        assert!(s.id.is_empty());
        assert!(s.values.is_empty());
    }

    #[test]
    fn set_get_remove() {
        let mut s = Session::new("app", Options::default());
        s.set("user", "ann");
        s.set("visits", 3i64);

        assert_eq!(s.get_as::<String>("user").map(String::as_str), Some("ann"));
        assert_eq!(s.get_as::<i64>("visits"), Some(&3));
        assert!(s.get_as::<bool>("visits").is_none());

        assert!(s.remove("user").is_some());
        assert!(s.get("user").is_none());
    }
}
