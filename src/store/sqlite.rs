//! SQLite-backed session store.
//!
//! `SqliteSessionStore` keeps every session as one row of the `sessions` table. The
//! cookie only carries the signed session id. Row data goes through the same codec as
//! the cookie, so it is signed and, with an encryption key, encrypted at rest.
//!
//! ## Design
//! - One **table** (`sessions`), created on construction if absent. The migration is
//!   idempotent, so opening an existing database is fine.
//! - Saving is a single upsert keyed by id; SQLite serializes concurrent writers.
//! - Rows whose `expires_on` has passed are treated as missing. [`SqliteSessionStore::delete_expired`]
//!   purges them.
//! - Database access is via an `r2d2` pool for safe multi-threaded use.
//!
//! ## Schema
//! ```sql
//! CREATE TABLE sessions (
//!     id           TEXT NOT NULL PRIMARY KEY,
//!     session_data BLOB NOT NULL,
//!     created_on   INTEGER NOT NULL,
//!     modified_on  INTEGER NOT NULL,
//!     expires_on   INTEGER            -- unix seconds, NULL = no expiry
//! );
//! ```
use std::path::Path;
use std::time::Duration;

use http::HeaderMap;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use r2d2_sqlite::SqliteConnectionManager;

use crate::codec::SecureCookie;
use crate::cookies::{request_cookie, set_cookie, Cookie};
use crate::errors::{Result, SessionError};
use crate::keys::KeyPair;
use crate::options::Options;
use crate::session::Session;
use crate::store::{generate_id, is_valid_id, Store};
use crate::values::{decode_values, encode_values, Values};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS sessions (
        id TEXT NOT NULL PRIMARY KEY,
        session_data BLOB NOT NULL,
        created_on INTEGER NOT NULL,
        modified_on INTEGER NOT NULL,
        expires_on INTEGER
    );
    CREATE INDEX IF NOT EXISTS sessions_expires_on ON sessions (expires_on);";

/// Creates the `sessions` table if needed.
fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

pub struct SqliteSessionStore {
    /// Connection pool for SQLite database (so it can run multithreaded)
    pool: Pool<SqliteConnectionManager>,
    cookie_codec: SecureCookie,
    data_codec: SecureCookie,
    options: Options,
}

impl SqliteSessionStore {
    /// Opens (or creates) the database at `path` and ensures the schema exists.
    ///
    /// Fails with [`SessionError::StoreInit`] if the database cannot be opened or migrated.
    pub fn new(path: &Path, keys: &[Vec<u8>], options: Options) -> Result<Self> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE | OpenFlags::SQLITE_OPEN_URI;

        // open once up front so a bad location fails now instead of on the first request
        let conn = Connection::open_with_flags(path, flags)
            .map_err(|e| SessionError::StoreInit(format!("cannot open {}: {e}", path.display())))?;
        migrate(&conn).map_err(|e| SessionError::StoreInit(e.to_string()))?;
        drop(conn);

        let manager = SqliteConnectionManager::file(path)
            .with_flags(flags)
            .with_init(|c| {
                c.busy_timeout(Duration::from_secs(5))?;
                c.pragma_update(None, "journal_mode", "WAL")?;
                Ok(())
            });

        let pool = Pool::builder()
            .max_size(16)
            .connection_timeout(Duration::from_secs(5))
            .build(manager)
            .map_err(|e| SessionError::StoreInit(e.to_string()))?;

        log::info!("sqlite session store at {}", path.display());
        Ok(Self::with_pool(pool, keys, options))
    }

    /// Opens a private in-memory database. Sessions are lost when the store is dropped.
    pub fn in_memory(keys: &[Vec<u8>], options: Options) -> Result<Self> {
        let manager = SqliteConnectionManager::memory().with_init(|c| c.execute_batch(SCHEMA));

        // every connection to :memory: is its own database, so keep exactly one
        let pool = Pool::builder()
            .max_size(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .build(manager)
            .map_err(|e| SessionError::StoreInit(e.to_string()))?;

        Ok(Self::with_pool(pool, keys, options))
    }

    fn with_pool(pool: Pool<SqliteConnectionManager>, keys: &[Vec<u8>], options: Options) -> Self {
        let pairs = KeyPair::from_keys(keys);
        let cookie_codec = SecureCookie::new(pairs.clone()).max_age(options.max_age);
        let data_codec = SecureCookie::new(pairs).max_age(options.max_age).max_length(0);
        if !cookie_codec.is_signed() {
            log::warn!("sqlite session store has no signing key, session ids are not authenticated");
        }

        Self {
            pool,
            cookie_codec,
            data_codec,
            options,
        }
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>> {
        Ok(self.pool.get()?)
    }

    fn load(&self, name: &str, id: &str) -> Result<Option<Values>> {
        let data: Option<Vec<u8>> = self
            .conn()?
            .query_row(
                "SELECT session_data FROM sessions
                 WHERE id = ?1 AND (expires_on IS NULL OR expires_on > ?2)",
                params![id, now()],
                |row| row.get(0),
            )
            .optional()?;

        let Some(data) = data else {
            return Ok(None);
        };

        let decoded = String::from_utf8(data)
            .map_err(|e| SessionError::InvalidCookie(e.to_string()))
            .and_then(|data| self.data_codec.decode(name, &data))
            .and_then(|data| decode_values(&data));

        match decoded {
            Ok(values) => Ok(Some(values)),
            Err(e) => {
                log::debug!("ignoring unreadable session row {id}: {e}");
                Ok(None)
            }
        }
    }

    fn upsert(&self, id: &str, data: &[u8], max_age: i64) -> Result<()> {
        let now = now();
        let expires_on = (max_age > 0).then(|| now.saturating_add(max_age));

        self.conn()?.execute(
            "INSERT INTO sessions (id, session_data, created_on, modified_on, expires_on)
             VALUES (?1, ?2, ?3, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET
                session_data = excluded.session_data,
                modified_on = excluded.modified_on,
                expires_on = excluded.expires_on",
            params![id, data, now, expires_on],
        )?;
        Ok(())
    }

    fn erase(&self, id: &str) -> Result<()> {
        self.conn()?.execute("DELETE FROM sessions WHERE id = ?1", [id])?;
        Ok(())
    }

    /// Deletes rows whose expiry has passed. Returns the number of rows removed.
    pub fn delete_expired(&self) -> Result<usize> {
        let removed = self.conn()?.execute(
            "DELETE FROM sessions WHERE expires_on IS NOT NULL AND expires_on <= ?1",
            [now()],
        )?;
        if removed > 0 {
            log::debug!("removed {removed} expired session rows");
        }
        Ok(removed)
    }
}

impl Store for SqliteSessionStore {
    fn new(&self, request: &HeaderMap, name: &str) -> Result<Session> {
        let mut session = Session::new(name, self.options.clone());

        let Some(raw) = request_cookie(request, name) else {
            return Ok(session);
        };

        let id = match self.cookie_codec.decode(name, &raw).map(String::from_utf8) {
            Ok(Ok(id)) if is_valid_id(&id) => id,
            _ => {
                log::debug!("discarding session cookie {name}: invalid session id");
                return Ok(session);
            }
        };

        if let Some(values) = self.load(name, &id)? {
            session.id = id;
            session.values = values;
            session.is_new = false;
        }

        Ok(session)
    }

    fn save(&self, _request: &HeaderMap, response: &mut HeaderMap, session: &mut Session) -> Result<()> {
        let name = session.name().to_string();

        if session.options.max_age < 0 {
            if !session.id.is_empty() {
                self.erase(&session.id)?;
            }
            return set_cookie(response, &Cookie::new(&name, "", &session.options));
        }

        if session.id.is_empty() {
            session.id = generate_id();
        }

        let data = self.data_codec.encode(&name, &encode_values(&session.values)?)?;
        self.upsert(&session.id, data.as_bytes(), session.options.max_age)?;

        let value = self.cookie_codec.encode(&name, session.id.as_bytes())?;
        set_cookie(response, &Cookie::new(&name, &value, &session.options))?;

        session.is_new = false;
        Ok(())
    }
}

fn now() -> i64 {
    time::OffsetDateTime::now_utc().unix_timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cookies::next_request_headers;
    use crate::keys::key_pairs;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;
    use http::header::COOKIE;
    use http::HeaderValue;
    use std::sync::Arc;
    use std::thread;

    fn keys() -> Vec<Vec<u8>> {
        key_pairs(&["hash-key".into()])
    }

    fn save_new(store: &SqliteSessionStore, key: &str, value: i64) -> (Session, HeaderMap) {
        let request = HeaderMap::new();
        let mut response = HeaderMap::new();
        let mut session = store.new(&request, "app").unwrap();
        session.set(key, value);
        store.save(&request, &mut response, &mut session).unwrap();
        (session, next_request_headers(&response))
    }

    #[test]
    fn roundtrip_through_file_database() {
        let tmp = tempfile::tempdir().unwrap();
        let store = SqliteSessionStore::new(&tmp.path().join("session.db"), &keys(), Options::default()).unwrap();

        let (saved, next) = save_new(&store, "visits", 3);
        let loaded = store.new(&next, "app").unwrap();
        assert!(!loaded.is_new);
        assert_eq!(loaded.id, saved.id);
        assert_eq!(loaded.get_as::<i64>("visits"), Some(&3));
    }

    #[test]
    fn upsert_overwrites_existing_row() {
        let store = SqliteSessionStore::in_memory(&keys(), Options::default()).unwrap();

        let (_, next) = save_new(&store, "visits", 1);
        let mut session = store.new(&next, "app").unwrap();
        session.set("visits", 2i64);
        let mut response = HeaderMap::new();
        store.save(&next, &mut response, &mut session).unwrap();

        let loaded = store.new(&next_request_headers(&response), "app").unwrap();
        assert_eq!(loaded.get_as::<i64>("visits"), Some(&2));

        let rows: i64 = store
            .conn()
            .unwrap()
            .query_row("SELECT COUNT(*) FROM sessions", [], |r| r.get(0))
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[test]
    fn reopening_existing_database_is_fine() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("session.db");

        let next = {
            let store = SqliteSessionStore::new(&path, &keys(), Options::default()).unwrap();
            save_new(&store, "visits", 9).1
        };

        let store = SqliteSessionStore::new(&path, &keys(), Options::default()).unwrap();
        let loaded = store.new(&next, "app").unwrap();
        assert_eq!(loaded.get_as::<i64>("visits"), Some(&9));
    }

    #[test]
    fn unopenable_location_fails_init() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("missing").join("dir").join("session.db");
        let res = SqliteSessionStore::new(&path, &keys(), Options::default());
        assert!(matches!(res, Err(SessionError::StoreInit(_))));
    }

    #[test]
    fn expired_rows_are_ignored_and_purged() {
        let store = SqliteSessionStore::in_memory(&keys(), Options::default()).unwrap();
        let (saved, next) = save_new(&store, "visits", 1);

        store
            .conn()
            .unwrap()
            .execute("UPDATE sessions SET expires_on = ?1 WHERE id = ?2", params![now() - 10, saved.id])
            .unwrap();

        assert!(store.new(&next, "app").unwrap().is_new);
        assert_eq!(store.delete_expired().unwrap(), 1);
        assert_eq!(store.delete_expired().unwrap(), 0);
    }

    #[test]
    fn negative_max_age_deletes_row() {
        let store = SqliteSessionStore::in_memory(&keys(), Options::default()).unwrap();
        let (mut session, next) = save_new(&store, "visits", 1);

        session.options.max_age = -1;
        let mut response = HeaderMap::new();
        store.save(&next, &mut response, &mut session).unwrap();

        assert!(store.new(&next, "app").unwrap().is_new);
    }

    #[test]
    fn concurrent_upserts() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Arc::new(
            SqliteSessionStore::new(&tmp.path().join("session.db"), &keys(), Options::default()).unwrap(),
        );

        let handles: Vec<_> = (0..8i64)
            .map(|n| {
                let store = store.clone();
                thread::spawn(move || (n, save_new(&store, "n", n).1))
            })
            .collect();

        for handle in handles {
            let (n, next) = handle.join().unwrap();
            assert_eq!(store.new(&next, "app").unwrap().get_as::<i64>("n"), Some(&n));
        }
    }

    #[test]
    fn empty_key_entries_do_not_disable_signing() {
        let keys = key_pairs(&["new-auth".into(), "".into(), "".into(), "".into(), "old-auth".into()]);
        let store = SqliteSessionStore::in_memory(&keys, Options::default()).unwrap();
        let (saved, next) = save_new(&store, "visits", 5);

        let ts = now();
        let value = URL_SAFE_NO_PAD.encode(format!("{ts}|{}|", URL_SAFE_NO_PAD.encode(&saved.id)));
        let mut forged = HeaderMap::new();
        forged.insert(COOKIE, HeaderValue::from_str(&format!("app={value}")).unwrap());

        assert!(store.new(&forged, "app").unwrap().is_new);
        assert_eq!(store.new(&next, "app").unwrap().get_as::<i64>("visits"), Some(&5));
    }

    #[test]
    fn huge_max_age_saves_and_loads() {
        let options = Options {
            max_age: i64::MAX,
            ..Options::default()
        };
        let store = SqliteSessionStore::in_memory(&keys(), options).unwrap();
        let (saved, next) = save_new(&store, "visits", 2);

        assert_eq!(store.new(&next, "app").unwrap().get_as::<i64>("visits"), Some(&2));
        let expires_on: i64 = store
            .conn()
            .unwrap()
            .query_row("SELECT expires_on FROM sessions WHERE id = ?1", [&saved.id], |r| r.get(0))
            .unwrap();
        assert_eq!(expires_on, i64::MAX);
    }

    #[test]
    fn row_data_is_encrypted_with_encryption_key() {
        let keys = key_pairs(&["hash-key".into(), "block-key".into()]);
        let store = SqliteSessionStore::in_memory(&keys, Options::default()).unwrap();

        let request = HeaderMap::new();
        let mut response = HeaderMap::new();
        let mut session = store.new(&request, "app").unwrap();
        session.set("secret", "plain-text-value");
        store.save(&request, &mut response, &mut session).unwrap();

        let data: Vec<u8> = store
            .conn()
            .unwrap()
            .query_row("SELECT session_data FROM sessions WHERE id = ?1", [&session.id], |r| r.get(0))
            .unwrap();
        assert!(!String::from_utf8_lossy(&data).contains("plain-text-value"));

        let loaded = store.new(&next_request_headers(&response), "app").unwrap();
        assert_eq!(loaded.get_as::<String>("secret").unwrap(), "plain-text-value");
    }
}
