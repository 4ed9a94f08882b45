//! Session indicator extraction.
//!
//! A request carries credential evidence either as `Authorization: Bearer <token>`
//! or as a session cookie. The header wins when both are present.

use axum::http::HeaderMap;
use axum::http::header::{AUTHORIZATION, COOKIE};

/// Where the credential was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    Header,
    Cookie,
}

/// Token presented by the caller. Not validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub source: CredentialSource,
    pub token: String,
}

impl Credential {
    /// Find credential evidence in request headers.
    ///
    /// A malformed `Authorization` header does not count as evidence, but the
    /// cookie is still consulted.
    pub fn from_headers(headers: &HeaderMap, cookie_name: &str) -> Option<Self> {
        let from_header = headers
            .get(AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(bearer_token_from_header)
            .map(|token| Credential {
                source: CredentialSource::Header,
                token: token.to_string(),
            });

        from_header.or_else(|| {
            headers
                .get_all(COOKIE)
                .iter()
                .filter_map(|h| h.to_str().ok())
                .find_map(|cookie_header| token_from_cookie_header(cookie_header, cookie_name))
                .map(|token| Credential {
                    source: CredentialSource::Cookie,
                    token: token.to_string(),
                })
        })
    }
}

/// Extract a Bearer token from an Authorization header value.
pub fn bearer_token_from_header(header_value: &str) -> Option<&str> {
    let mut parts = header_value.split_whitespace();
    let scheme = parts.next()?;

    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }

    let token = parts.next()?;
    if parts.next().is_some() {
        return None;
    }

    Some(token)
}

/// Look up a non-empty cookie value by name.
pub fn token_from_cookie_header<'a>(cookie_header: &'a str, cookie_name: &str) -> Option<&'a str> {
    cookie_header.split(';').map(str::trim).find_map(|pair| {
        let (name, value) = pair.split_once('=')?;
        let value = value.trim().trim_matches('"');
        if name.trim() == cookie_name && !value.is_empty() {
            Some(value)
        } else {
            None
        }
    })
}
