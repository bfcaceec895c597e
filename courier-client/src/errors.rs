//! Error types for courier-client.

use std::{fmt, io};

// ─── RpcError ─────────────────────────────────────────────────────────────────

/// An error reported by the backend in response to an RPC call.
///
/// Numeric values are stripped from the name and placed in [`RpcError::value`].
///
/// # Example
/// `FLOOD_WAIT_30` → `RpcError { code: 420, name: "FLOOD_WAIT", value: Some(30) }`
#[derive(Clone, Debug, PartialEq)]
pub struct RpcError {
    /// HTTP-like status code.
    pub code: i32,
    /// Error name in SCREAMING_SNAKE_CASE with digits removed.
    pub name: String,
    /// Numeric suffix extracted from the name, if any.
    pub value: Option<u32>,
}

/// Error name the backend uses when a transferred authorization token is stale.
///
/// The registry retries the import when it sees this; every other error aborts
/// the handshake on the first attempt.
pub const AUTH_BYTES_INVALID: &str = "AUTH_BYTES_INVALID";

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RPC {}: {}", self.code, self.name)?;
        if let Some(v) = self.value {
            write!(f, " (value: {v})")?;
        }
        Ok(())
    }
}

impl std::error::Error for RpcError {}

impl RpcError {
    /// Parse a raw backend error message like `"FLOOD_WAIT_30"` into an `RpcError`.
    pub fn from_wire(code: i32, message: &str) -> Self {
        // Try to find a numeric suffix after the last underscore.
        // e.g. "FLOOD_WAIT_30" → name = "FLOOD_WAIT", value = Some(30)
        if let Some(idx) = message.rfind('_') {
            let suffix = &message[idx + 1..];
            if !suffix.is_empty() && suffix.chars().all(|c| c.is_ascii_digit()) {
                if let Ok(v) = suffix.parse::<u32>() {
                    let name = message[..idx].to_string();
                    return Self { code, name, value: Some(v) };
                }
            }
        }
        Self { code, name: message.to_string(), value: None }
    }

    /// Match on the error name, with optional wildcard prefix/suffix `'*'`.
    ///
    /// # Examples
    /// - `err.is("AUTH_BYTES_INVALID")` — exact match
    /// - `err.is("PHONE_CODE_*")` — starts-with match
    /// - `err.is("*_INVALID")` — ends-with match
    pub fn is(&self, pattern: &str) -> bool {
        if let Some(prefix) = pattern.strip_suffix('*') {
            self.name.starts_with(prefix)
        } else if let Some(suffix) = pattern.strip_prefix('*') {
            self.name.ends_with(suffix)
        } else {
            self.name == pattern
        }
    }
}

// ─── InvocationError ──────────────────────────────────────────────────────────

/// The error type returned from any [`crate::Client`] method that talks to the
/// backend.
#[derive(Debug)]
pub enum InvocationError {
    /// The backend rejected the request.
    Rpc(RpcError),
    /// Network / I/O failure at the session layer.
    Io(io::Error),
    /// Response deserialization failed at the session layer.
    Deserialize(String),
    /// The client has not been connected yet (or was disconnected).
    NotConnected,
    /// Authorization transfer to a foreign DC failed after all attempts.
    AuthorizationFailed,
}

impl fmt::Display for InvocationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rpc(e)              => write!(f, "{e}"),
            Self::Io(e)               => write!(f, "I/O error: {e}"),
            Self::Deserialize(s)      => write!(f, "deserialize error: {s}"),
            Self::NotConnected        => write!(f, "client has not been started yet"),
            Self::AuthorizationFailed => write!(f, "authorization export/import failed"),
        }
    }
}

impl std::error::Error for InvocationError {}

impl From<io::Error> for InvocationError {
    fn from(e: io::Error) -> Self { Self::Io(e) }
}

impl From<RpcError> for InvocationError {
    fn from(e: RpcError) -> Self { Self::Rpc(e) }
}

impl InvocationError {
    /// Returns `true` if this is the named RPC error (supports `'*'` wildcards).
    pub fn is(&self, pattern: &str) -> bool {
        match self {
            Self::Rpc(e) => e.is(pattern),
            _            => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_suffix_split() {
        let e = RpcError::from_wire(420, "FLOOD_WAIT_30");
        assert_eq!(e.name, "FLOOD_WAIT");
        assert_eq!(e.value, Some(30));
    }

    #[test]
    fn plain_name_kept_whole() {
        let e = RpcError::from_wire(400, "AUTH_BYTES_INVALID");
        assert_eq!(e.name, "AUTH_BYTES_INVALID");
        assert_eq!(e.value, None);
    }

    #[test]
    fn wildcard_matching() {
        let e = RpcError::from_wire(400, "AUTH_BYTES_INVALID");
        assert!(e.is("AUTH_BYTES_INVALID"));
        assert!(e.is("AUTH_*"));
        assert!(e.is("*_INVALID"));
        assert!(!e.is("FLOOD_WAIT"));
    }

    #[test]
    fn invocation_error_is_only_matches_rpc() {
        let rpc = InvocationError::Rpc(RpcError::from_wire(400, "AUTH_BYTES_INVALID"));
        assert!(rpc.is(AUTH_BYTES_INVALID));
        assert!(!InvocationError::NotConnected.is(AUTH_BYTES_INVALID));
    }
}
