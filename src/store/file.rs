//! File-backed session store.
//!
//! `FileSessionStore` writes each session to its own file, `session_<id>`, inside one
//! directory. The cookie only carries the signed session id.
//!
//! ### Concurrency
//! - Writers of the same id are serialized by a per-id lock. The lock is held for a single
//!   write and released when its guard drops, on every path.
//! - Writers of different ids never share a lock.
//! - Each write goes to a temporary file in the same directory which is then renamed over
//!   the session file, so readers see either the old or the new contents, never a partial file.
//!
//! ### On-disk format
//! The file holds the serialized mapping encoded with [`SecureCookie`] (no length limit),
//! so stored sessions are signed, and encrypted when an encryption key is configured.
use std::collections::HashMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::{Duration, SystemTime};

use http::HeaderMap;
use tempfile::NamedTempFile;

use crate::codec::SecureCookie;
use crate::cookies::{request_cookie, set_cookie, Cookie};
use crate::errors::{Result, SessionError};
use crate::keys::KeyPair;
use crate::options::Options;
use crate::session::Session;
use crate::store::{generate_id, is_valid_id, Store};
use crate::values::{decode_values, encode_values, Values};

const FILE_PREFIX: &str = "session_";

pub struct FileSessionStore {
    dir: PathBuf,
    /// Encodes the id carried in the cookie.
    cookie_codec: SecureCookie,
    /// Encodes the session file contents.
    file_codec: SecureCookie,
    options: Options,
    /// Per-id write locks. Entries die with their last guard holder.
    locks: Mutex<HashMap<String, Weak<Mutex<()>>>>,
}

impl FileSessionStore {
    /// Creates the store, creating `dir` if needed.
    ///
    /// Fails with [`SessionError::StoreInit`] if the directory cannot be created or written to.
    pub fn new(dir: PathBuf, keys: &[Vec<u8>], options: Options) -> Result<Self> {
        fs::create_dir_all(&dir)
            .map_err(|e| SessionError::StoreInit(format!("cannot create {}: {e}", dir.display())))?;
        NamedTempFile::new_in(&dir)
            .map_err(|e| SessionError::StoreInit(format!("cannot write to {}: {e}", dir.display())))?;

        let pairs = KeyPair::from_keys(keys);
        let cookie_codec = SecureCookie::new(pairs.clone()).max_age(options.max_age);
        let file_codec = SecureCookie::new(pairs).max_age(options.max_age).max_length(0);
        if !cookie_codec.is_signed() {
            log::warn!("file session store has no signing key, session ids are not authenticated");
        }

        log::info!("file session store at {}", dir.display());

        Ok(Self {
            dir,
            cookie_codec,
            file_codec,
            options,
            locks: Mutex::new(HashMap::new()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{FILE_PREFIX}{id}"))
    }

    /// Returns the write lock for `id`, creating it if no one holds it.
    fn lock_for(&self, id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(lock) = locks.get(id).and_then(Weak::upgrade) {
            return lock;
        }

        locks.retain(|_, weak| weak.strong_count() > 0);
        let lock = Arc::new(Mutex::new(()));
        locks.insert(id.to_string(), Arc::downgrade(&lock));
        lock
    }

    /// Loads the mapping stored for `id`. `None` when there is no usable file.
    fn load(&self, id: &str, name: &str) -> Result<Option<Values>> {
        let contents = match fs::read_to_string(self.path_for(id)) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        match self
            .file_codec
            .decode(name, &contents)
            .and_then(|data| decode_values(&data))
        {
            Ok(values) => Ok(Some(values)),
            Err(e) => {
                log::debug!("ignoring unreadable session file for {id}: {e}");
                Ok(None)
            }
        }
    }

    fn write(&self, id: &str, contents: &str) -> Result<()> {
        let lock = self.lock_for(id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(contents.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(self.path_for(id)).map_err(|e| SessionError::Io(e.error))?;
        Ok(())
    }

    fn erase(&self, id: &str) -> Result<()> {
        let lock = self.lock_for(id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        match fs::remove_file(self.path_for(id)) {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }

    /// Removes session files not modified within the configured max-age.
    ///
    /// Returns the number of files removed. Does nothing when max-age is not positive.
    pub fn delete_expired(&self) -> Result<usize> {
        if self.options.max_age <= 0 {
            return Ok(0);
        }
        let max_age = Duration::from_secs(self.options.max_age.unsigned_abs());
        let now = SystemTime::now();

        let mut removed = 0;
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let file_name = entry.file_name();
            let Some(id) = file_name.to_str().and_then(|n| n.strip_prefix(FILE_PREFIX)) else {
                continue;
            };

            let modified = entry.metadata()?.modified()?;
            if now.duration_since(modified).unwrap_or_default() > max_age {
                self.erase(id)?;
                removed += 1;
            }
        }

        if removed > 0 {
            log::debug!("removed {removed} expired session files from {}", self.dir.display());
        }
        Ok(removed)
    }
}

impl Store for FileSessionStore {
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

        if let Some(values) = self.load(&id, name)? {
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

        let data = encode_values(&session.values)?;
        let contents = self.file_codec.encode(&name, &data)?;
        self.write(&session.id, &contents)?;

        let value = self.cookie_codec.encode(&name, session.id.as_bytes())?;
        set_cookie(response, &Cookie::new(&name, &value, &session.options))?;

        session.is_new = false;
        Ok(())
    }
}
