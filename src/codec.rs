//! Secure cookie value codec.
//!
//! Values are optionally encrypted (AES-256-GCM, key derived from the configured
//! secret with HKDF-SHA256), timestamped and signed with HMAC-SHA256 over
//! `name|timestamp|payload`, then base64url encoded:
//!
//! ```text
//! base64url( timestamp "|" base64url(payload) "|" base64url(mac) )
//! ```
//!
//! With no signing key the mac field is left empty and is never checked. Such cookies
//! can be forged or edited by the client.
use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, Key, KeyInit, Nonce};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;

use crate::errors::{Result, SessionError};
use crate::keys::KeyPair;

type HmacSha256 = Hmac<Sha256>;

/// Practical upper bound for a single cookie value.
pub const DEFAULT_MAX_LENGTH: usize = 4096;

const NONCE_LENGTH: usize = 12;
const HKDF_INFO: &[u8] = b"gosub-sessions-cookie-v1";

#[derive(Clone, Debug)]
pub struct SecureCookie {
    pairs: Vec<KeyPair>,
    /// Seconds; timestamps older than this are rejected. `<= 0` disables the check.
    max_age: i64,
    /// Encoded length limit. `0` disables the check.
    max_length: usize,
}

impl SecureCookie {
    /// Builds a codec from key pairs, newest first.
    ///
    /// Pairs without a signing key are dropped as soon as any pair has one, so a stray
    /// empty entry never reopens the unsigned path. Only when no pair signs does the codec
    /// run unsigned, using the first pair (or no keys at all).
    pub fn new(pairs: Vec<KeyPair>) -> Self {
        let total = pairs.len();
        let signed: Vec<KeyPair> = pairs.iter().filter(|p| !p.auth.is_empty()).cloned().collect();

        let pairs = if signed.is_empty() {
            let first = pairs.into_iter().next();
            vec![first.unwrap_or(KeyPair { auth: Vec::new(), encryption: None })]
        } else {
            if signed.len() < total {
                log::warn!("ignoring {} key pair(s) without a signing key", total - signed.len());
            }
            signed
        };

        Self {
            pairs,
            max_age: 0,
            max_length: DEFAULT_MAX_LENGTH,
        }
    }

    pub fn max_age(mut self, secs: i64) -> Self {
        self.max_age = secs;
        self
    }

    pub fn max_length(mut self, len: usize) -> Self {
        self.max_length = len;
        self
    }

    /// Returns `true` when encoded values carry a signature.
    pub fn is_signed(&self) -> bool {
        !self.pairs[0].auth.is_empty()
    }

    /// Encodes `data` for the cookie called `name`.
    pub fn encode(&self, name: &str, data: &[u8]) -> Result<String> {
        self.encode_at(name, data, now())
    }

    fn encode_at(&self, name: &str, data: &[u8], timestamp: i64) -> Result<String> {
        let pair = &self.pairs[0];

        let payload = match &pair.encryption {
            Some(key) => encrypt(key, data)?,
            None => data.to_vec(),
        };
        let payload = URL_SAFE_NO_PAD.encode(payload);

        let mac = if pair.auth.is_empty() {
            String::new()
        } else {
            URL_SAFE_NO_PAD.encode(sign(&pair.auth, name, timestamp, &payload)?)
        };

        let encoded = URL_SAFE_NO_PAD.encode(format!("{timestamp}|{payload}|{mac}"));
        if self.max_length > 0 && encoded.len() > self.max_length {
            return Err(SessionError::PayloadTooLarge {
                size: encoded.len(),
                limit: self.max_length,
            });
        }

        Ok(encoded)
    }

    /// Decodes a value previously produced by [`encode`](Self::encode) for `name`.
    ///
    /// Every key pair is tried in order; the error from the last attempt is returned.
    pub fn decode(&self, name: &str, value: &str) -> Result<Vec<u8>> {
        if self.max_length > 0 && value.len() > self.max_length {
            return Err(SessionError::InvalidCookie("value too long".into()));
        }

        let raw = URL_SAFE_NO_PAD
            .decode(value)
            .map_err(|e| SessionError::InvalidCookie(e.to_string()))?;
        let raw = String::from_utf8(raw).map_err(|e| SessionError::InvalidCookie(e.to_string()))?;

        let mut parts = raw.splitn(3, '|');
        let (Some(ts), Some(payload), Some(mac)) = (parts.next(), parts.next(), parts.next()) else {
            return Err(SessionError::InvalidCookie("malformed value".into()));
        };
        let timestamp: i64 = ts
            .parse()
            .map_err(|_| SessionError::InvalidCookie("bad timestamp".into()))?;

        if self.max_age > 0 && timestamp < now().saturating_sub(self.max_age) {
            return Err(SessionError::InvalidCookie("expired timestamp".into()));
        }

        let mut last_err = SessionError::InvalidCookie("no key pair matched".into());
        for pair in &self.pairs {
            match decode_with(pair, name, timestamp, payload, mac) {
                Ok(data) => return Ok(data),
                Err(e) => last_err = e,
            }
        }

        Err(last_err)
    }
}

fn decode_with(pair: &KeyPair, name: &str, timestamp: i64, payload: &str, mac: &str) -> Result<Vec<u8>> {
    if !pair.auth.is_empty() {
        let mac = URL_SAFE_NO_PAD
            .decode(mac)
            .map_err(|e| SessionError::InvalidCookie(e.to_string()))?;
        mac_for(&pair.auth, name, timestamp, payload)?
            .verify_slice(&mac)
            .map_err(|_| SessionError::InvalidCookie("signature mismatch".into()))?;
    }

    let data = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|e| SessionError::InvalidCookie(e.to_string()))?;

    match &pair.encryption {
        Some(key) => decrypt(key, &data),
        None => Ok(data),
    }
}

fn mac_for(key: &[u8], name: &str, timestamp: i64, payload: &str) -> Result<HmacSha256> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(key).map_err(|e| SessionError::InvalidCookie(e.to_string()))?;
    mac.update(format!("{name}|{timestamp}|{payload}").as_bytes());
    Ok(mac)
}

fn sign(key: &[u8], name: &str, timestamp: i64, payload: &str) -> Result<Vec<u8>> {
    Ok(mac_for(key, name, timestamp, payload)?.finalize().into_bytes().to_vec())
}

fn cipher(secret: &[u8]) -> Result<Aes256Gcm> {
    let hkdf = Hkdf::<Sha256>::new(None, secret);
    let mut okm = [0u8; 32];
    hkdf.expand(HKDF_INFO, &mut okm)
        .map_err(|e| SessionError::InvalidCookie(e.to_string()))?;
    Ok(Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&okm)))
}

/// Returns `nonce || ciphertext`.
fn encrypt(secret: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let mut nonce = [0u8; NONCE_LENGTH];
    rand::rng().fill_bytes(&mut nonce);

    let sealed = cipher(secret)?
        .encrypt(Nonce::from_slice(&nonce), data)
        .map_err(|_| SessionError::InvalidCookie("encryption failed".into()))?;

    let mut out = Vec::with_capacity(NONCE_LENGTH + sealed.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&sealed);
    Ok(out)
}

fn decrypt(secret: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    if data.len() < NONCE_LENGTH {
        return Err(SessionError::InvalidCookie("ciphertext too short".into()));
    }
    let (nonce, sealed) = data.split_at(NONCE_LENGTH);
    cipher(secret)?
        .decrypt(Nonce::from_slice(nonce), sealed)
        .map_err(|_| SessionError::InvalidCookie("decryption failed".into()))
}

fn now() -> i64 {
    time::OffsetDateTime::now_utc().unix_timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::key_pairs;

    fn codec(keys: &[&str]) -> SecureCookie {
        let keys: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
        SecureCookie::new(KeyPair::from_keys(&key_pairs(&keys)))
    }

    fn tamper(value: &str) -> String {
        let raw = String::from_utf8(URL_SAFE_NO_PAD.decode(value).unwrap()).unwrap();
        let mut parts: Vec<String> = raw.splitn(3, '|').map(String::from).collect();
        parts[1] = URL_SAFE_NO_PAD.encode(b"{\"admin\":true}");
        URL_SAFE_NO_PAD.encode(parts.join("|"))
    }

    #[test]
    fn signed_roundtrip() {
        let c = codec(&["hash-key"]);
        assert!(c.is_signed());
        let v = c.encode("sid", b"hello").unwrap();
        assert_eq!(c.decode("sid", &v).unwrap(), b"hello");
    }

    #[test]
    fn signed_value_rejects_tampering() {
        let c = codec(&["hash-key"]);
        let v = c.encode("sid", b"hello").unwrap();
        assert!(matches!(c.decode("sid", &tamper(&v)), Err(SessionError::InvalidCookie(_))));
    }

    #[test]
    fn signature_is_bound_to_cookie_name() {
        let c = codec(&["hash-key"]);
        let v = c.encode("sid", b"hello").unwrap();
        assert!(c.decode("other", &v).is_err());
    }

    #[test]
    fn unsigned_value_accepts_tampering() {
        let c = codec(&[]);
        assert!(!c.is_signed());
        let v = c.encode("sid", b"hello").unwrap();
        assert_eq!(c.decode("sid", &tamper(&v)).unwrap(), b"{\"admin\":true}");
    }

    #[test]
    fn encrypted_payload_is_opaque() {
        let c = codec(&["hash-key", "block-key"]);
        let v = c.encode("sid", b"plain-secret").unwrap();
        let raw = String::from_utf8(URL_SAFE_NO_PAD.decode(&v).unwrap()).unwrap();
        assert!(!raw.contains(&URL_SAFE_NO_PAD.encode(b"plain-secret")));
        assert_eq!(c.decode("sid", &v).unwrap(), b"plain-secret");
    }

    #[test]
    fn rotated_keys_still_decode() {
        let old = codec(&["old-hash"]);
        let v = old.encode("sid", b"data").unwrap();

        let rotated = codec(&["new-hash", "", "old-hash"]);
        assert_eq!(rotated.decode("sid", &v).unwrap(), b"data");
    }

    #[test]
    fn empty_trailing_key_keeps_signature_check() {
        let c = codec(&["hash-key", "block-key", ""]);
        assert!(c.is_signed());

        let forged = URL_SAFE_NO_PAD.encode(format!("{}|{}|", now(), URL_SAFE_NO_PAD.encode(b"{}")));
        assert!(c.decode("sid", &forged).is_err());

        let v = c.encode("sid", b"data").unwrap();
        assert_eq!(c.decode("sid", &v).unwrap(), b"data");
    }

    #[test]
    fn empty_rotation_slot_keeps_signature_check() {
        let c = codec(&["new-hash", "", "", "", "old-hash"]);
        let forged = URL_SAFE_NO_PAD.encode(format!("{}|{}|", now(), URL_SAFE_NO_PAD.encode(b"{}")));
        assert!(c.decode("sid", &forged).is_err());

        let old = codec(&["old-hash"]).encode("sid", b"data").unwrap();
        assert_eq!(c.decode("sid", &old).unwrap(), b"data");
    }

    #[test]
    fn huge_max_age_does_not_overflow() {
        let c = codec(&["hash-key"]).max_age(i64::MAX);
        let v = c.encode("sid", b"data").unwrap();
        assert_eq!(c.decode("sid", &v).unwrap(), b"data");
    }

    #[test]
    fn expired_timestamp_is_rejected() {
        let c = codec(&["hash-key"]).max_age(60);
        let v = c.encode_at("sid", b"data", now() - 3600).unwrap();
        assert!(c.decode("sid", &v).is_err());

        let fresh = c.encode("sid", b"data").unwrap();
        assert!(c.decode("sid", &fresh).is_ok());
    }

    #[test]
    fn oversized_payload_fails() {
        let c = codec(&["hash-key"]);
        let big = vec![b'x'; DEFAULT_MAX_LENGTH];
        match c.encode("sid", &big) {
            Err(SessionError::PayloadTooLarge { size, limit }) => {
                assert!(size > limit);
                assert_eq!(limit, DEFAULT_MAX_LENGTH);
            }
            other => panic!("expected PayloadTooLarge, got {other:?}"),
        }

        assert!(c.max_length(0).encode("sid", &big).is_ok());
    }

    #[test]
    fn garbage_is_invalid() {
        let c = codec(&["hash-key"]);
        assert!(c.decode("sid", "not base64 !!").is_err());
        assert!(c.decode("sid", &URL_SAFE_NO_PAD.encode("no-separators")).is_err());
    }
}
