//! # courier-client
//!
//! Async invocation core for an MTProto-style RPC backend.
//!
//! The crate owns the orchestration around every call, not the wire:
//! - Generic dispatcher — envelope wrapping (delegation, update suppression,
//!   takeout), session selection, peer-cache side effects
//! - Lazily-created per-DC session registry with the
//!   export/import authorization handshake (3 attempts, clean rollback)
//! - Cursor-based [`PaginatedIter`] shared by every list-style endpoint
//!
//! Wire encoding, encryption, retries and network I/O live behind the
//! [`Session`] trait; persisted state behind [`Storage`].

#![deny(unsafe_code)]

mod errors;
mod paginate;
mod peers;
mod registry;
mod request;
mod session;
mod storage;

pub use errors::{AUTH_BYTES_INVALID, InvocationError, RpcError};
pub use paginate::{MAX_PAGE_SIZE, PaginatedIter};
pub use peers::{EntitySet, PeerEntity, PeerKind, Response};
pub use registry::SessionRegistry;
pub use request::{Envelope, Request, Wrapped};
pub use session::{
    ExportedAuthorization, InvokeOptions, MAX_RETRIES, Session, SessionFactory, SessionKey,
    SessionPurpose, WAIT_TIMEOUT,
};
pub use storage::{MemoryStorage, Storage};

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, info};

use peers::PeerCache;

// ─── Config ───────────────────────────────────────────────────────────────────

/// Configuration for [`Client::connect`].
#[derive(Clone)]
pub struct Config {
    /// Home DC the primary session connects to.
    pub home_dc_id:      i32,
    /// Suppress server-side updates for every request issued by this client.
    pub no_updates:      bool,
    /// Default flood-wait threshold handed to sessions on each call.
    pub sleep_threshold: Duration,
    /// Builds the primary and any secondary sessions.
    pub factory:         Arc<dyn SessionFactory>,
    /// Persisted client-wide settings.
    pub storage:         Arc<dyn Storage>,
}

impl Config {
    pub fn new(
        home_dc_id: i32,
        factory:    Arc<dyn SessionFactory>,
        storage:    Arc<dyn Storage>,
    ) -> Self {
        Self {
            home_dc_id,
            no_updates: false,
            sleep_threshold: Duration::from_secs(10),
            factory,
            storage,
        }
    }
}

// ─── InvokeParams ─────────────────────────────────────────────────────────────

/// A delegate (business) connection on whose behalf requests can be issued.
///
/// The owning DC arrives with the connection metadata, outside this crate, so
/// the caller carries it here.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DelegateConnection {
    pub connection_id: String,
    pub dc_id:         i32,
}

/// Per-call knobs for [`Client::invoke_with`].
#[derive(Clone, Debug)]
pub struct InvokeParams {
    pub retries: u32,
    pub timeout: Duration,
    /// Overrides the client-wide flood-wait threshold for this call.
    pub sleep_threshold: Option<Duration>,
    /// Issue the request on behalf of this delegate connection, through its
    /// own session.
    pub delegate_connection: Option<DelegateConnection>,
}

impl Default for InvokeParams {
    fn default() -> Self {
        Self {
            retries:             MAX_RETRIES,
            timeout:             WAIT_TIMEOUT,
            sleep_threshold:     None,
            delegate_connection: None,
        }
    }
}

// ─── Client ───────────────────────────────────────────────────────────────────

struct ClientInner {
    primary:         Arc<dyn Session>,
    registry:        SessionRegistry,
    peer_cache:      Mutex<PeerCache>,
    connected:       AtomicBool,
    no_updates:      AtomicBool,
    takeout_id:      Mutex<Option<i64>>,
    sleep_threshold: Duration,
}

/// Handle to one logical client. Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Client {
    /// Create the primary session on the home DC and start it.
    pub async fn connect(config: Config) -> Result<Self, InvocationError> {
        let test_mode = config.storage.test_mode().await?;
        let primary = config
            .factory
            .create(config.home_dc_id, test_mode, SessionPurpose::Primary)
            .await?;
        primary.start().await?;
        info!("primary session up on DC{} (test_mode={test_mode})", config.home_dc_id);

        let registry = SessionRegistry::new(config.factory.clone(), config.storage.clone());

        Ok(Self {
            inner: Arc::new(ClientInner {
                primary,
                registry,
                peer_cache: Mutex::new(PeerCache::default()),
                connected: AtomicBool::new(true),
                no_updates: AtomicBool::new(config.no_updates),
                takeout_id: Mutex::new(None),
                sleep_threshold: config.sleep_threshold,
            }),
        })
    }

    /// Stop every session owned by this client. Later invokes fail with
    /// [`InvocationError::NotConnected`].
    pub async fn disconnect(&self) {
        self.inner.connected.store(false, Ordering::SeqCst);
        self.inner.registry.close().await;
        self.inner.primary.stop().await;
        info!("client disconnected");
    }

    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    // ── Dispatcher ─────────────────────────────────────────────────────────

    /// Invoke a raw request with default parameters.
    ///
    /// See [`invoke_with`](Self::invoke_with) for the full contract.
    pub async fn invoke(&self, request: Request) -> Result<Response, InvocationError> {
        self.invoke_with(request, InvokeParams::default()).await
    }

    /// Invoke a raw request.
    ///
    /// The request is wrapped in the active envelopes (delegate, then
    /// suppress-updates, then takeout, innermost first) and forwarded to the
    /// right session: the delegate connection's own session when
    /// `params.delegate_connection` is set, the primary session otherwise.
    /// Identity records carried by the response are merged into the peer
    /// cache before the raw response is returned unmodified.
    ///
    /// Backend errors propagate verbatim; retry and flood-wait handling are
    /// the session's job, governed by the parameters passed through here.
    pub async fn invoke_with(
        &self,
        request: Request,
        params:  InvokeParams,
    ) -> Result<Response, InvocationError> {
        if !self.is_connected() {
            return Err(InvocationError::NotConnected);
        }

        let takeout_id = *self.inner.takeout_id.lock().await;
        let no_updates = self.inner.no_updates.load(Ordering::SeqCst);
        let delegate   = params.delegate_connection.as_ref();

        let envelopes = request::envelope_stack(
            delegate.map(|conn| conn.connection_id.as_str()),
            no_updates,
            takeout_id,
        );

        let session = match delegate {
            Some(conn) => {
                self.inner
                    .registry
                    .get_or_create(
                        SessionKey::Delegate { connection_id: conn.connection_id.clone() },
                        conn.dc_id,
                        &self.inner.primary,
                    )
                    .await?
            }
            None => self.inner.primary.clone(),
        };

        let options = InvokeOptions {
            retries:         params.retries,
            timeout:         params.timeout,
            sleep_threshold: params.sleep_threshold.unwrap_or(self.inner.sleep_threshold),
        };

        let response = session.invoke(Wrapped { request, envelopes }, options).await?;

        if let Some(entities) = response.entities() {
            let mut cache = self.inner.peer_cache.lock().await;
            cache.merge(entities);
            debug!("cached {} users, {} chats", entities.users.len(), entities.chats.len());
        }

        Ok(response)
    }

    // ── Secondary sessions ─────────────────────────────────────────────────

    /// Session for media transfer against `dc_id`, created and authorized on
    /// first use and shared afterwards.
    pub async fn media_session(&self, dc_id: i32) -> Result<Arc<dyn Session>, InvocationError> {
        if !self.is_connected() {
            return Err(InvocationError::NotConnected);
        }
        self.inner
            .registry
            .get_or_create(SessionKey::Media { dc_id }, dc_id, &self.inner.primary)
            .await
    }

    // ── Client-wide request state ──────────────────────────────────────────

    /// Wrap subsequent requests in the takeout envelope for `takeout_id`.
    pub async fn begin_takeout(&self, takeout_id: i64) {
        *self.inner.takeout_id.lock().await = Some(takeout_id);
    }

    /// Stop wrapping requests in the takeout envelope.
    pub async fn end_takeout(&self) {
        *self.inner.takeout_id.lock().await = None;
    }

    /// Toggle update suppression for every subsequent request.
    pub fn set_no_updates(&self, no_updates: bool) {
        self.inner.no_updates.store(no_updates, Ordering::SeqCst);
    }

    // ── Peer cache ─────────────────────────────────────────────────────────

    /// Look up a user identity record observed in an earlier response.
    pub async fn cached_user(&self, id: i64) -> Option<PeerEntity> {
        self.inner.peer_cache.lock().await.user(id).cloned()
    }

    /// Look up a chat/channel identity record observed in an earlier response.
    pub async fn cached_chat(&self, id: i64) -> Option<PeerEntity> {
        self.inner.peer_cache.lock().await.chat(id).cloned()
    }
}
