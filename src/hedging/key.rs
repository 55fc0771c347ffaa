//! Coalescing key derivation.
//!
//! Two requests with equal keys are the same logical request and race for a
//! shared response. The key embeds the method, target URL and content-type
//! verbatim, while the body and the credential are reduced to SHA-256 digests
//! so no secret material lives in the registry.
//!
//! ```text
//! METHOD ':' URL ':' hex(sha256(body)) [':AUTH:' hex(sha256(credential))] [':CT:' content-type]
//! ```
//!
//! `:` and `\` inside verbatim fields are backslash-escaped, and bytes outside
//! printable ASCII are written as `\xNN`, so no field can forge a separator.

use std::fmt;

use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderName, Method};
use sha2::{Digest as _, Sha256};

const SEPARATOR: char = ':';

/// Deterministic identity of a request for hedging purposes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey(String);

impl RequestKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Computes [`RequestKey`]s. Pure; holds only the credential header name.
#[derive(Debug, Clone)]
pub struct KeyGenerator {
    credential_header: HeaderName,
}

impl KeyGenerator {
    pub fn new(credential_header: HeaderName) -> Self {
        Self { credential_header }
    }

    /// Derive the key for a request. A missing body is passed as `&[]`.
    pub fn compute_key(
        &self,
        method: &Method,
        url: &str,
        headers: &HeaderMap,
        body: &[u8],
    ) -> RequestKey {
        let mut key = String::with_capacity(method.as_str().len() + url.len() + 160);

        push_verbatim(&mut key, method.as_str().as_bytes());
        key.push(SEPARATOR);
        push_verbatim(&mut key, url.as_bytes());
        key.push(SEPARATOR);
        key.push_str(&digest(body));

        if let Some(credential) = headers.get(&self.credential_header) {
            key.push_str(":AUTH:");
            key.push_str(&digest(credential.as_bytes()));
        }

        if let Some(content_type) = headers.get(CONTENT_TYPE) {
            key.push_str(":CT:");
            push_verbatim(&mut key, content_type.as_bytes());
        }

        RequestKey(key)
    }
}

impl Default for KeyGenerator {
    fn default() -> Self {
        Self::new(AUTHORIZATION)
    }
}

fn digest(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

fn push_verbatim(key: &mut String, field: &[u8]) {
    for &byte in field {
        match byte {
            b':' | b'\\' => {
                key.push('\\');
                key.push(byte as char);
            }
            0x20..=0x7e => key.push(byte as char),
            _ => key.push_str(&format!("\\x{byte:02x}")),
        }
    }
}
