//! The session boundary.
//!
//! A [`Session`] owns one authenticated connection to one DC: wire encoding,
//! encryption, retries, flood-wait sleeps and reconnects all live behind it.
//! This crate only orchestrates *which* session a request reaches and how it
//! is wrapped on the way there.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::errors::InvocationError;
use crate::peers::Response;
use crate::request::Wrapped;

// ─── Invocation defaults ──────────────────────────────────────────────────────

/// Default number of times a session retries a failed call.
pub const MAX_RETRIES: u32 = 10;
/// Default time a session waits for a single response.
pub const WAIT_TIMEOUT: Duration = Duration::from_secs(15);

/// Per-call parameters threaded through to the session unchanged.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InvokeOptions {
    pub retries:         u32,
    pub timeout:         Duration,
    /// Flood waits up to this long are slept through by the session.
    pub sleep_threshold: Duration,
}

impl Default for InvokeOptions {
    fn default() -> Self {
        Self {
            retries:         MAX_RETRIES,
            timeout:         WAIT_TIMEOUT,
            sleep_threshold: Duration::from_secs(10),
        }
    }
}

// ─── Authorization transfer ───────────────────────────────────────────────────

/// A transferable authorization token exported from the primary DC.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExportedAuthorization {
    pub id:    i64,
    pub bytes: Vec<u8>,
}

// ─── Session identity ─────────────────────────────────────────────────────────

/// Why a secondary session exists; passed to the factory at creation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionPurpose {
    /// The client's main session on its home DC.
    Primary,
    /// Media transfer session on a (possibly foreign) DC.
    Media,
    /// Session acting for a delegate (business) connection.
    Delegate,
}

/// Key under which the registry caches a secondary session.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum SessionKey {
    /// Media access to the given DC.
    Media { dc_id: i32 },
    /// Requests issued on behalf of a delegate connection.
    Delegate { connection_id: String },
}

impl SessionKey {
    pub(crate) fn purpose(&self) -> SessionPurpose {
        match self {
            Self::Media { .. }    => SessionPurpose::Media,
            Self::Delegate { .. } => SessionPurpose::Delegate,
        }
    }
}

// ─── Session trait ────────────────────────────────────────────────────────────

/// One authenticated call-and-wait connection to one DC.
///
/// Implementations perform the actual network I/O, including any retry and
/// backoff policy governed by [`InvokeOptions`]; the dispatcher never issues
/// more than one `invoke` per call of its own.
#[async_trait]
pub trait Session: Send + Sync {
    /// Send a wrapped request and wait for its reply.
    async fn invoke(&self, request: Wrapped, options: InvokeOptions)
        -> Result<Response, InvocationError>;

    /// Establish the transport-level connection.
    async fn start(&self) -> Result<(), InvocationError>;

    /// Tear the connection down and release its resources.
    async fn stop(&self);

    /// Export an authorization token scoped to `dc_id` (primary session only).
    async fn export_authorization(&self, dc_id: i32)
        -> Result<ExportedAuthorization, InvocationError>;

    /// Import an authorization token previously exported from the primary DC.
    async fn import_authorization(&self, auth: ExportedAuthorization)
        -> Result<(), InvocationError>;
}

/// Builds sessions; owns auth-key acquisition for DCs we have no key for.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn create(
        &self,
        dc_id:     i32,
        test_mode: bool,
        purpose:   SessionPurpose,
    ) -> Result<Arc<dyn Session>, InvocationError>;
}
