use std::fmt;
use std::time::Duration;

use http::header::{COOKIE, SET_COOKIE};
use http::{HeaderMap, HeaderValue};
use sessionkit_core::{SessionError, SessionResult};

/// `Expires` attribute used to make a client drop a cookie right away
pub const EXPIRED_DATE: &str = "Thu, 01 Jan 1970 00:00:00 GMT";

/// Find the value of cookie `name` in the request headers.
///
/// All `Cookie` headers are scanned and the first non-empty value wins. The value is
/// URL-unescaped; a value that does not decode is treated as missing.
pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| {
            let (key, value) = pair.trim().split_once('=')?;
            (key.trim() == name).then(|| value.trim().trim_matches('"'))
        })
        .filter(|raw| !raw.is_empty())
        .find_map(|raw| match urlencoding::decode(raw) {
            Ok(decoded) if !decoded.is_empty() => Some(decoded.into_owned()),
            _ => None,
        })
}

/// Whole seconds covering `lifetime`; a partial second counts as one so a live
/// session never gets `Max-Age=0`
fn max_age_secs(lifetime: Duration) -> i64 {
    let secs = lifetime
        .as_secs()
        .saturating_add(u64::from(lifetime.subsec_nanos() > 0));
    i64::try_from(secs).unwrap_or(i64::MAX)
}

/// A `Set-Cookie` directive for the session cookie
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetCookie {
    name: String,
    value: String,
    max_age: i64,
    expires: Option<&'static str>,
}

impl SetCookie {
    /// Cookie carrying `session_id`, valid for `max_lifetime` rounded up to whole seconds
    pub fn session(name: &str, session_id: &str, max_lifetime: Duration) -> Self {
        Self {
            name: name.to_string(),
            value: urlencoding::encode(session_id).into_owned(),
            max_age: max_age_secs(max_lifetime),
            expires: None,
        }
    }

    /// Cookie instructing the client to discard `name` immediately
    pub fn expired(name: &str) -> Self {
        Self {
            name: name.to_string(),
            value: String::new(),
            max_age: -1,
            expires: Some(EXPIRED_DATE),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The escaped value as it is sent to the client
    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn max_age(&self) -> i64 {
        self.max_age
    }

    pub fn to_header_value(&self) -> SessionResult<HeaderValue> {
        HeaderValue::from_str(&self.to_string()).map_err(|e| {
            SessionError::Config(format!("invalid Set-Cookie for {:?}: {}", self.name, e))
        })
    }
}

impl fmt::Display for SetCookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}; Path=/", self.name, self.value)?;
        if let Some(expires) = self.expires {
            write!(f, "; Expires={}", expires)?;
        }
        write!(f, "; HttpOnly; Max-Age={}", self.max_age)
    }
}

/// Append a `Set-Cookie` header, keeping any already present
pub fn append_set_cookie(headers: &mut HeaderMap, cookie: &SetCookie) -> SessionResult<()> {
    headers.append(SET_COOKIE, cookie.to_header_value()?);
    Ok(())
}
