//! Session store selection.
//!
//! The [`SessionManager`] is the only place that knows every backend. It reads the
//! configured store name, builds the matching backend once, and hands out a
//! [`StoreHandle`] the rest of the application shares.
//!
//! Unknown or empty store names select the cookie backend, so a typo in the configuration
//! never keeps the application from starting.
use std::sync::Arc;

use crate::config::SessionConfig;
use crate::errors::Result;
use crate::keys::key_pairs;
use crate::options::Options;
use crate::store::{CookieSessionStore, FileSessionStore, StoreHandle};

/// Backend selected by a configured store name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Cookie,
    File,
    Sqlite,
}

impl StoreKind {
    /// Exact, case-sensitive match; anything unrecognised is [`StoreKind::Cookie`].
    pub fn from_name(name: &str) -> Self {
        match name {
            "file" => StoreKind::File,
            "sqlite" => StoreKind::Sqlite,
            "cookie" => StoreKind::Cookie,
            other => {
                if !other.is_empty() {
                    log::warn!("unknown session store {other:?}, using cookie store");
                }
                StoreKind::Cookie
            }
        }
    }
}

pub struct SessionManager {
    config: SessionConfig,
}

impl SessionManager {
    pub fn new(config: SessionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn kind(&self) -> StoreKind {
        StoreKind::from_name(&self.config.store)
    }

    /// Builds the configured store.
    ///
    /// Fails with [`SessionError::StoreInit`](crate::errors::SessionError::StoreInit) if the backend cannot be constructed.
    pub fn load_store(&self) -> Result<StoreHandle> {
        let keys = key_pairs(&self.config.key_pairs);
        let options = Options::from_config(&self.config);

        let store: StoreHandle = match self.kind() {
            StoreKind::Cookie => Arc::new(CookieSessionStore::new(&keys, options)),
            StoreKind::File => Arc::new(FileSessionStore::new(self.config.file_path.clone(), &keys, options)?),
            StoreKind::Sqlite => self.sqlite_store(&keys, options)?,
        };

        log::debug!("session store {:?} ready for {:?}", self.kind(), self.config.name);
        Ok(store)
    }

    /// Builds the configured store, or logs why it could not and returns `None`.
    ///
    /// Applications can run without sessions; session calls then fail with
    /// [`SessionError::NoStoreConfigured`](crate::errors::SessionError::NoStoreConfigured).
    pub fn load_store_or_degraded(&self) -> Option<StoreHandle> {
        match self.load_store() {
            Ok(store) => Some(store),
            Err(e) => {
                log::warn!("running without session store: {e}");
                None
            }
        }
    }

    #[cfg(feature = "sqlite_session_store")]
    fn sqlite_store(&self, keys: &[Vec<u8>], options: Options) -> Result<StoreHandle> {
        use crate::store::SqliteSessionStore;
        Ok(Arc::new(SqliteSessionStore::new(&self.config.sqlite_path, keys, options)?))
    }

    #[cfg(not(feature = "sqlite_session_store"))]
    fn sqlite_store(&self, _keys: &[Vec<u8>], _options: Options) -> Result<StoreHandle> {
        Err(crate::errors::SessionError::StoreInit(
            "sqlite session store support is not compiled in".to_string(),
        ))
    }
}
