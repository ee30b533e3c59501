use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use sessionkit_core::{SessionError, SessionResult};

/// Bytes of entropy behind every session identifier
pub const SESSION_ID_BYTES: usize = 32;

/// Generate a session identifier from the OS random source.
///
/// The identifier is URL-safe base64 without padding. A failing random source is
/// reported as `SessionError::Entropy`, never papered over with a weaker value.
pub fn generate_session_id() -> SessionResult<String> {
    let mut buf = [0u8; SESSION_ID_BYTES];
    getrandom::getrandom(&mut buf).map_err(|e| SessionError::Entropy(e.to_string()))?;
    Ok(URL_SAFE_NO_PAD.encode(buf))
}
