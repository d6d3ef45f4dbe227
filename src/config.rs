//! Session configuration.
//!
//! `SessionConfig` is the resolved configuration the surrounding framework hands to the
//! [`SessionManager`](crate::manager::SessionManager). It selects the backend and carries
//! the cookie policy and secrets shared by every backend.
//!
//! `SessionConfig` provides defaults via [`Default`] and a fluent
//! [`SessionConfig::builder()`] for customization.
//!
//! # Examples
//!
//! ```rust
//! use gosub_sessions::config::SessionConfig;
//!
//! let cfg = SessionConfig::builder()
//!     .store("file")
//!     .name("app_session")
//!     .max_age(3600)
//!     .secure(true)
//!     .key_pair("very-secret-signing-key")
//!     .file_path("/tmp/app-sessions")
//!     .build();
//! assert_eq!(cfg.store, "file");
//! assert_eq!(cfg.key_pairs.len(), 1);
//! ```
//!
//! # Fields (summary)
//! - `store`: backend name, one of `file`, `cookie` or `sqlite`. Anything else selects the cookie backend.
//! - `name`: name of the session and of the cookie carrying it.
//! - `path` / `domain`: cookie scoping.
//! - `max_age`: cookie lifetime in seconds. Negative deletes the session, zero means a browser-session cookie.
//! - `secure`: sets the `Secure` cookie attribute (and `HttpOnly`, see [`Options`](crate::options::Options)).
//! - `key_pairs`: ordered secrets. Even positions sign, odd positions encrypt.
//! - `file_path`: directory used by the file backend, `gosub_sessions` under the system
//!   temp directory by default.
//! - `sqlite_path`: database file used by the sqlite backend.

use serde::Deserialize;
use std::path::PathBuf;

/// Thirty days, the default lifetime of a session cookie.
pub const DEFAULT_MAX_AGE: i64 = 86400 * 30;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub store: String,
    pub name: String,
    pub path: String,
    pub domain: String,
    pub max_age: i64,
    pub secure: bool,
    pub key_pairs: Vec<String>,
    pub file_path: PathBuf,
    pub sqlite_path: PathBuf,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            store: "cookie".to_string(),
            name: "gosub_session".to_string(),
            path: "/".to_string(),
            domain: String::new(),
            max_age: DEFAULT_MAX_AGE,
            secure: false,
            key_pairs: Vec::new(),
            file_path: std::env::temp_dir().join("gosub_sessions"),
            sqlite_path: PathBuf::from("session.db"),
        }
    }
}

impl SessionConfig {
    pub fn builder() -> SessionConfigBuilder {
        SessionConfigBuilder::default()
    }
}

/// Builder for [`SessionConfig`].
#[derive(Debug, Clone, Default)]
pub struct SessionConfigBuilder {
    inner: SessionConfig,
}

impl SessionConfigBuilder {
    #[inline]
    fn map(mut self, f: impl FnOnce(&mut SessionConfig)) -> Self {
        f(&mut self.inner);
        self
    }

    pub fn store<S: Into<String>>(self, store: S) -> Self { self.map(|c| c.store = store.into()) }
    pub fn name<S: Into<String>>(self, name: S) -> Self { self.map(|c| c.name = name.into()) }
    pub fn path<S: Into<String>>(self, path: S) -> Self { self.map(|c| c.path = path.into()) }
    pub fn domain<S: Into<String>>(self, domain: S) -> Self { self.map(|c| c.domain = domain.into()) }
    pub fn max_age(self, secs: i64) -> Self { self.map(|c| c.max_age = secs) }
    pub fn secure(self, on: bool) -> Self { self.map(|c| c.secure = on) }
    pub fn key_pair<S: Into<String>>(self, key: S) -> Self { self.map(|c| c.key_pairs.push(key.into())) }
    pub fn key_pairs<I, S>(self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.map(|c| c.key_pairs = keys.into_iter().map(Into::into).collect())
    }
    pub fn file_path<P: Into<PathBuf>>(self, dir: P) -> Self { self.map(|c| c.file_path = dir.into()) }
    pub fn sqlite_path<P: Into<PathBuf>>(self, db: P) -> Self { self.map(|c| c.sqlite_path = db.into()) }

    /// Apply multiple changes in one go.
    pub fn with(self, f: impl FnOnce(&mut SessionConfig)) -> Self { self.map(f) }

    pub fn build(self) -> SessionConfig {
        self.inner
    }
}
