use crate::config::SessionConfig;

/// Cookie attributes applied when a session is written back.
///
/// Shared by every backend; each [`Session`](crate::session::Session) carries its own copy
/// so a handler can change e.g. `max_age` for one response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    pub path: String,
    pub domain: String,
    /// Seconds. `< 0` deletes the session, `0` writes a browser-session cookie.
    pub max_age: i64,
    pub secure: bool,
    pub http_only: bool,
}

impl Options {
    /// Builds options from configuration.
    ///
    /// `http_only` follows the `secure` setting; there is no separate switch for it.
    pub fn from_config(cfg: &SessionConfig) -> Self {
        Self {
            path: cfg.path.clone(),
            domain: cfg.domain.clone(),
            max_age: cfg.max_age,
            secure: cfg.secure,
            http_only: cfg.secure,
        }
    }
}

impl Default for Options {
    fn default() -> Self {
        Self::from_config(&SessionConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_only_mirrors_secure() {
        let on = Options::from_config(&SessionConfig::builder().secure(true).build());
        assert!(on.secure && on.http_only);

        let off = Options::from_config(&SessionConfig::builder().secure(false).build());
        assert!(!off.secure && !off.http_only);
    }

    #[test]
    fn copies_cookie_scope() {
        let cfg = SessionConfig::builder()
            .path("/app")
            .domain("example.com")
            .max_age(-1)
            .build();
        let opts = Options::from_config(&cfg);
        assert_eq!(opts.path, "/app");
        assert_eq!(opts.domain, "example.com");
        assert_eq!(opts.max_age, -1);
    }
}
