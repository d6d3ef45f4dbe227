//! Session store infrastructure.
//!
//! A **session store** locates the session belonging to an incoming request and writes it
//! back when the application saves it. Three interchangeable implementations exist:
//! - [`CookieSessionStore`]: the whole session lives in a signed (and optionally
//!   encrypted) cookie. Nothing is kept server-side.
//! - [`FileSessionStore`]: one file per session in a directory; the cookie only carries
//!   the signed session id.
//! - [`SqliteSessionStore`]: one row per session in a SQLite table; the cookie only
//!   carries the signed session id.
//!
//! ## Design notes
//! - A store is built once by the [`SessionManager`](crate::manager::SessionManager) and
//!   shared by every request through a [`StoreHandle`].
//! - Implementations are `Send + Sync` and synchronize internally; all trait methods take `&self`.
//! - Code holding a [`StoreHandle`] must not care which backend it got.
//!
//! ## Example
//! ```rust,no_run
//! use http::HeaderMap;
//! use gosub_sessions::options::Options;
//! use gosub_sessions::store::{FileSessionStore, Store};
//!
//! let keys = vec![b"signing-key".to_vec()];
//! let store = FileSessionStore::new("/var/lib/app/sessions".into(), &keys, Options::default())?;
//!
//! let request = HeaderMap::new();
//! let mut response = HeaderMap::new();
//! let mut session = store.new(&request, "app")?;
//! session.set("user", "ann");
//! store.save(&request, &mut response, &mut session)?;
//! # Ok::<(), gosub_sessions::errors::SessionError>(())
//! ```
mod cookie;
mod file;
#[cfg(feature = "sqlite_session_store")]
mod sqlite;

use std::sync::Arc;

use http::HeaderMap;

use crate::errors::Result;
use crate::session::Session;

pub use cookie::CookieSessionStore;
pub use file::FileSessionStore;
#[cfg(feature = "sqlite_session_store")]
pub use sqlite::SqliteSessionStore;

/// Shared, type-erased handle to the process-wide store.
pub type StoreHandle = Arc<dyn Store + Send + Sync>;

/// Contract shared by every session backend.
pub trait Store: Send + Sync {
    /// Returns the session called `name` for `request`.
    ///
    /// A missing, tampered, expired or otherwise unreadable session reference yields a fresh,
    /// empty session with `is_new` set. Errors are reserved for backend failures such as
    /// an unreadable session directory or database.
    fn new(&self, request: &HeaderMap, name: &str) -> Result<Session>;

    /// Persists `session` and writes its cookie to `response`.
    ///
    /// A negative `session.options.max_age` deletes the stored session and expires the cookie.
    fn save(&self, request: &HeaderMap, response: &mut HeaderMap, session: &mut Session) -> Result<()>;
}

/// Generates a new server-side session id.
pub(crate) fn generate_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Ids come from the client; only accept the shape [`generate_id`] produces.
pub(crate) fn is_valid_id(id: &str) -> bool {
    !id.is_empty() && id.len() <= 64 && id.bytes().all(|b| b.is_ascii_alphanumeric())
}
