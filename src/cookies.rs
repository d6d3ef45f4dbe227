//! Cookie header plumbing.
//!
//! Stores read the session cookie from the request's `Cookie` headers and write it back
//! as a `Set-Cookie` header on the response. Only what sessions need is handled:
//! `Path`, `Domain`, `Expires`, `Max-Age`, `Secure` and `HttpOnly`.
use http::header::{COOKIE, SET_COOKIE};
use http::{HeaderMap, HeaderValue};
use time::macros::format_description;
use time::{Duration, OffsetDateTime};

use crate::errors::{Result, SessionError};
use crate::options::Options;

/// An outgoing session cookie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub path: Option<String>,
    pub domain: Option<String>,
    /// `Expires` attribute, already formatted as an HTTP date.
    pub expires: Option<String>,
    /// Rendered as `Max-Age=n` when positive and `Max-Age=0` when negative.
    pub max_age: Option<i64>,
    pub secure: bool,
    pub http_only: bool,
}

impl Cookie {
    /// Builds a cookie carrying `value` with the attributes from `opts`.
    ///
    /// A positive `max_age` sets `Expires` relative to now, a negative one sets it to the
    /// epoch so browsers drop the cookie, zero leaves it as a browser-session cookie.
    pub fn new(name: &str, value: &str, opts: &Options) -> Self {
        let (expires, max_age) = match opts.max_age {
            0 => (None, None),
            // past the representable date range only Max-Age is sent
            n if n > 0 => (
                OffsetDateTime::now_utc().checked_add(Duration::seconds(n)).map(http_date),
                Some(n),
            ),
            n => (Some(http_date(OffsetDateTime::UNIX_EPOCH + Duration::seconds(1))), Some(n)),
        };

        Cookie {
            name: name.to_string(),
            value: value.to_string(),
            path: Some(opts.path.clone()).filter(|p| !p.is_empty()),
            domain: Some(opts.domain.clone()).filter(|d| !d.is_empty()),
            expires,
            max_age,
            secure: opts.secure,
            http_only: opts.http_only,
        }
    }

    /// Renders the `Set-Cookie` header value.
    pub fn to_header_value(&self) -> String {
        let mut out = format!("{}={}", self.name, self.value);
        if let Some(path) = &self.path {
            out.push_str(&format!("; Path={path}"));
        }
        if let Some(domain) = &self.domain {
            out.push_str(&format!("; Domain={domain}"));
        }
        if let Some(expires) = &self.expires {
            out.push_str(&format!("; Expires={expires}"));
        }
        if let Some(max_age) = self.max_age {
            out.push_str(&format!("; Max-Age={}", max_age.max(0)));
        }
        if self.http_only {
            out.push_str("; HttpOnly");
        }
        if self.secure {
            out.push_str("; Secure");
        }
        out
    }

    /// Returns `true` if this cookie tells the client to delete it.
    pub fn is_removal(&self) -> bool {
        self.max_age.is_some_and(|n| n < 0)
    }
}

fn http_date(t: OffsetDateTime) -> String {
    let fmt = format_description!(
        "[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] GMT"
    );
    t.format(&fmt).unwrap_or_default()
}

/// Returns the value of the first request cookie called `name`.
pub fn request_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|h| h.to_str().ok())
        .flat_map(|h| h.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| k.trim() == name)
        .map(|(_, v)| v.trim().trim_matches('"').to_string())
}

/// Appends `cookie` as a `Set-Cookie` header.
pub fn set_cookie(response: &mut HeaderMap, cookie: &Cookie) -> Result<()> {
    let value = HeaderValue::from_str(&cookie.to_header_value())
        .map_err(|e| SessionError::InvalidCookie(e.to_string()))?;
    response.append(SET_COOKIE, value);
    Ok(())
}

/// Builds the `Cookie` headers a client would send after receiving `response`.
///
/// Cookies that were set for removal are left out.
pub fn next_request_headers(response: &HeaderMap) -> HeaderMap {
    let pairs: Vec<String> = response
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|h| h.to_str().ok())
        .filter(|h| {
            !h.split(';')
                .skip(1)
                .any(|attr| attr.trim().eq_ignore_ascii_case("max-age=0"))
        })
        .filter_map(|h| h.split(';').next())
        .map(|pair| pair.trim().to_string())
        .collect();

    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(&pairs.join("; ")) {
        if !pairs.is_empty() {
            headers.insert(COOKIE, value);
        }
    }
    headers
}
