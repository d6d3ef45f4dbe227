//! Cookie-backed session store.
//!
//! `CookieSessionStore` keeps the entire session in the cookie itself. The mapping is
//! serialized with the value registry and encoded with [`SecureCookie`].
//!
//! ### Security
//! - With at least one key the cookie is signed, and encrypted when a second key is set.
//! - With **no keys** the cookie is neither signed nor encrypted. The client can read and
//!   rewrite it at will. This mode exists so a misconfigured deployment still starts;
//!   it logs a warning on construction.
//!
//! ### Limits
//! Encoded cookies above [`DEFAULT_MAX_LENGTH`](crate::codec::DEFAULT_MAX_LENGTH) bytes are
//! refused with [`SessionError::PayloadTooLarge`](crate::errors::SessionError::PayloadTooLarge).
use http::HeaderMap;

use crate::codec::SecureCookie;
use crate::cookies::{request_cookie, set_cookie, Cookie};
use crate::errors::Result;
use crate::keys::KeyPair;
use crate::options::Options;
use crate::session::Session;
use crate::store::Store;
use crate::values::{decode_values, encode_values};

pub struct CookieSessionStore {
    codec: SecureCookie,
    options: Options,
}

impl CookieSessionStore {
    pub fn new(keys: &[Vec<u8>], options: Options) -> Self {
        let codec = SecureCookie::new(KeyPair::from_keys(keys)).max_age(options.max_age);
        if !codec.is_signed() {
            log::warn!("cookie session store has no signing key, session cookies can be forged");
        }

        Self { codec, options }
    }

    pub fn options(&self) -> &Options {
        &self.options
    }
}

impl Store for CookieSessionStore {
    fn new(&self, request: &HeaderMap, name: &str) -> Result<Session> {
        let mut session = Session::new(name, self.options.clone());

        let Some(raw) = request_cookie(request, name) else {
            return Ok(session);
        };

        match self
            .codec
            .decode(name, &raw)
            .and_then(|data| decode_values(&data))
        {
            Ok(values) => {
                session.values = values;
                session.is_new = false;
            }
            Err(e) => log::debug!("discarding session cookie {name}: {e}"),
        }

        Ok(session)
    }

    fn save(&self, _request: &HeaderMap, response: &mut HeaderMap, session: &mut Session) -> Result<()> {
        let name = session.name().to_string();

        if session.options.max_age < 0 {
            return set_cookie(response, &Cookie::new(&name, "", &session.options));
        }

        let data = encode_values(&session.values)?;
        let value = self.codec.encode(&name, &data)?;
        set_cookie(response, &Cookie::new(&name, &value, &session.options))?;

        session.is_new = false;
        Ok(())
    }
}
