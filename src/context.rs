//! Request-scoped session access.
//!
//! A [`SessionContext`] lives for one request. It borrows the request and response
//! headers, holds the process-wide [`StoreHandle`] (or nothing, when the application runs
//! without sessions) and caches the session it fetched, so changes made early in a
//! request are visible to later calls on the same context.
//!
//! ```rust
//! use http::HeaderMap;
//! use gosub_sessions::config::SessionConfig;
//! use gosub_sessions::context::SessionContext;
//! use gosub_sessions::manager::SessionManager;
//!
//! let cfg = SessionConfig::builder().key_pair("signing-key").build();
//! let store = SessionManager::new(cfg.clone()).load_store_or_degraded();
//!
//! let request = HeaderMap::new();
//! let mut response = HeaderMap::new();
//! let mut ctx = SessionContext::new(&request, &mut response, store, &cfg.name);
//! ctx.set_and_save("user", "ann")?;
//! assert_eq!(ctx.get::<String>("user")?.as_deref(), Some("ann"));
//! # Ok::<(), gosub_sessions::errors::SessionError>(())
//! ```
use std::any::Any;

use http::HeaderMap;

use crate::errors::{Result, SessionError};
use crate::session::Session;
use crate::store::StoreHandle;
use crate::values::{Value, Values};

pub struct SessionContext<'a> {
    request: &'a HeaderMap,
    response: &'a mut HeaderMap,
    store: Option<StoreHandle>,
    name: String,
    session: Option<Session>,
}

impl<'a> SessionContext<'a> {
    pub fn new(
        request: &'a HeaderMap,
        response: &'a mut HeaderMap,
        store: Option<StoreHandle>,
        name: &str,
    ) -> Self {
        Self {
            request,
            response,
            store,
            name: name.to_string(),
            session: None,
        }
    }

    /// Returns `false` when the application runs without a session store.
    pub fn has_store(&self) -> bool {
        self.store.is_some()
    }

    /// Fetches the session on first use and splits the borrows a save needs.
    fn parts(&mut self) -> Result<(&StoreHandle, &mut HeaderMap, &mut Session)> {
        let store = self.store.as_ref().ok_or(SessionError::NoStoreConfigured)?;
        let session = match self.session.take() {
            Some(session) => session,
            None => store.new(self.request, &self.name)?,
        };
        Ok((store, &mut *self.response, self.session.insert(session)))
    }

    /// Returns this request's session, fetching or creating it through the store.
    ///
    /// Fails with [`SessionError::NoStoreConfigured`] when running without a store.
    pub fn get_session(&mut self) -> Result<&mut Session> {
        self.parts().map(|(_, _, session)| session)
    }

    /// Persists the session and writes its cookie to the response.
    pub fn save_session(&mut self) -> Result<()> {
        let request = self.request;
        let (store, response, session) = self.parts()?;
        store.save(request, response, session)
    }

    /// Returns a copy of the session values.
    ///
    /// If the session cannot be fetched (including when there is no store) the result is an
    /// empty mapping; the error is logged, not returned.
    pub fn session_values(&mut self) -> Values {
        match self.get_session() {
            Ok(session) => session.values.clone(),
            Err(e) => {
                log::debug!("session values unavailable: {e}");
                Values::new()
            }
        }
    }

    /// Sets `key` in memory only. Visible to later calls on this context; lost unless saved.
    pub fn set_value<K: Into<String>, V: Into<Value>>(&mut self, key: K, value: V) -> Result<()> {
        self.get_session()?.set(key, value);
        Ok(())
    }

    /// Sets `key` and persists the session immediately.
    pub fn set_and_save<K: Into<String>, V: Into<Value>>(&mut self, key: K, value: V) -> Result<()> {
        self.set_value(key, value)?;
        self.save_session()
    }

    /// Returns the value for `key`, or `None` if the session has no such key.
    pub fn get_value(&mut self, key: &str) -> Result<Option<Value>> {
        Ok(self.get_session()?.get(key).cloned())
    }

    /// Typed [`get_value`](Self::get_value). `None` also when the value has another type.
    pub fn get<T: Any + Clone>(&mut self, key: &str) -> Result<Option<T>> {
        Ok(self.get_session()?.get_as::<T>(key).cloned())
    }

    /// Removes `key` in memory and returns its old value.
    pub fn remove_value(&mut self, key: &str) -> Result<Option<Value>> {
        Ok(self.get_session()?.remove(key))
    }

    /// Deletes the stored session and expires its cookie.
    ///
    /// The cached session is emptied, so later calls in this request see no values.
    pub fn destroy_session(&mut self) -> Result<()> {
        let request = self.request;
        let (store, response, session) = self.parts()?;

        let max_age = session.options.max_age;
        session.values.clear();
        session.options.max_age = -1;
        let res = store.save(request, response, session);

        session.options.max_age = max_age;
        session.id.clear();
        session.is_new = true;
        res
    }
}
