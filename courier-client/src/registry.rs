//! Secondary-session registry and authorization handshake.
//!
//! Sessions for foreign DCs (media access) and delegate connections are
//! created lazily, at most once per key, and shared from then on. One lock
//! guards the whole map *and* the handshake: creation is rare and must never
//! race, so two concurrent callers asking for the same key observe exactly
//! one handshake and share its result.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::errors::{AUTH_BYTES_INVALID, InvocationError};
use crate::session::{Session, SessionFactory, SessionKey};
use crate::storage::Storage;

/// Attempts at importing an exported authorization before giving up.
const HANDSHAKE_ATTEMPTS: usize = 3;

// ─── SessionRegistry ──────────────────────────────────────────────────────────

/// Lazily-created cache of secondary [`Session`]s, one per [`SessionKey`].
///
/// Owned by the client; [`close`](Self::close) stops every session it created.
pub struct SessionRegistry {
    factory:  Arc<dyn SessionFactory>,
    storage:  Arc<dyn Storage>,
    sessions: Mutex<HashMap<SessionKey, Arc<dyn Session>>>,
}

impl SessionRegistry {
    pub fn new(factory: Arc<dyn SessionFactory>, storage: Arc<dyn Storage>) -> Self {
        Self { factory, storage, sessions: Mutex::new(HashMap::new()) }
    }

    /// Return the session cached under `key`, creating and authorizing it on
    /// first use.
    ///
    /// The new session is authorized by exporting a token from `primary` and
    /// importing it on the target DC, retried up to 3 times when the backend
    /// reports stale authorization bytes. A failed handshake stops the new
    /// session and leaves no entry under `key`.
    pub async fn get_or_create(
        &self,
        key:     SessionKey,
        dc_id:   i32,
        primary: &Arc<dyn Session>,
    ) -> Result<Arc<dyn Session>, InvocationError> {
        let mut sessions = self.sessions.lock().await;

        if let Some(session) = sessions.get(&key) {
            return Ok(session.clone());
        }

        let test_mode = self.storage.test_mode().await?;
        let session   = self.factory.create(dc_id, test_mode, key.purpose()).await?;
        session.start().await?;

        if let Err(e) = self.handshake(primary, &session, dc_id).await {
            session.stop().await;
            return Err(e);
        }

        info!("session for {key:?} authorized on DC{dc_id}");
        sessions.insert(key, session.clone());
        Ok(session)
    }

    async fn handshake(
        &self,
        primary: &Arc<dyn Session>,
        session: &Arc<dyn Session>,
        dc_id:   i32,
    ) -> Result<(), InvocationError> {
        for attempt in 1..=HANDSHAKE_ATTEMPTS {
            let exported = primary.export_authorization(dc_id).await?;
            match session.import_authorization(exported).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is(AUTH_BYTES_INVALID) => {
                    warn!("stale authorization bytes for DC{dc_id} (attempt {attempt}/{HANDSHAKE_ATTEMPTS})");
                }
                Err(e) => return Err(e),
            }
        }
        Err(InvocationError::AuthorizationFailed)
    }

    /// Whether a session is currently cached under `key`.
    pub async fn contains(&self, key: &SessionKey) -> bool {
        self.sessions.lock().await.contains_key(key)
    }

    /// Stop and drop every session owned by the registry.
    pub async fn close(&self) {
        let mut sessions = self.sessions.lock().await;
        for (key, session) in sessions.drain() {
            debug!("stopping session for {key:?}");
            session.stop().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use crate::errors::RpcError;
    use crate::peers::Response;
    use crate::request::Wrapped;
    use crate::session::{ExportedAuthorization, InvokeOptions, SessionPurpose};
    use crate::storage::MemoryStorage;

    /// Import outcomes are planned per session; `Err(name)` becomes an RPC
    /// error with that name, an empty plan means every import succeeds.
    struct FakeSession {
        started:     AtomicUsize,
        stopped:     AtomicUsize,
        exports:     AtomicUsize,
        imports:     AtomicUsize,
        import_plan: StdMutex<VecDeque<Result<(), &'static str>>>,
    }

    impl FakeSession {
        fn new(plan: Vec<Result<(), &'static str>>) -> Self {
            Self {
                started:     AtomicUsize::new(0),
                stopped:     AtomicUsize::new(0),
                exports:     AtomicUsize::new(0),
                imports:     AtomicUsize::new(0),
                import_plan: StdMutex::new(plan.into()),
            }
        }
    }

    #[async_trait]
    impl Session for FakeSession {
        async fn invoke(
            &self,
            _request: Wrapped,
            _options: InvokeOptions,
        ) -> Result<Response, InvocationError> {
            Ok(Response::new(Vec::new()))
        }

        async fn start(&self) -> Result<(), InvocationError> {
            self.started.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn stop(&self) {
            self.stopped.fetch_add(1, Ordering::SeqCst);
        }

        async fn export_authorization(
            &self,
            dc_id: i32,
        ) -> Result<ExportedAuthorization, InvocationError> {
            self.exports.fetch_add(1, Ordering::SeqCst);
            Ok(ExportedAuthorization { id: dc_id as i64, bytes: vec![1, 2, 3] })
        }

        async fn import_authorization(
            &self,
            _auth: ExportedAuthorization,
        ) -> Result<(), InvocationError> {
            self.imports.fetch_add(1, Ordering::SeqCst);
            match self.import_plan.lock().unwrap().pop_front() {
                None | Some(Ok(())) => Ok(()),
                Some(Err(name)) => Err(InvocationError::Rpc(RpcError::from_wire(400, name))),
            }
        }
    }

    #[derive(Default)]
    struct FakeFactory {
        created:  AtomicUsize,
        plans:    StdMutex<VecDeque<Vec<Result<(), &'static str>>>>,
        sessions: StdMutex<Vec<Arc<FakeSession>>>,
    }

    #[async_trait]
    impl SessionFactory for FakeFactory {
        async fn create(
            &self,
            _dc_id:     i32,
            _test_mode: bool,
            _purpose:   SessionPurpose,
        ) -> Result<Arc<dyn Session>, InvocationError> {
            // Widen the window for racing callers.
            tokio::task::yield_now().await;
            self.created.fetch_add(1, Ordering::SeqCst);
            let plan    = self.plans.lock().unwrap().pop_front().unwrap_or_default();
            let session = Arc::new(FakeSession::new(plan));
            self.sessions.lock().unwrap().push(session.clone());
            Ok(session)
        }
    }

    fn registry_with(factory: Arc<FakeFactory>) -> SessionRegistry {
        SessionRegistry::new(factory, Arc::new(MemoryStorage::default()))
    }

    fn fake_primary() -> (Arc<FakeSession>, Arc<dyn Session>) {
        let primary = Arc::new(FakeSession::new(Vec::new()));
        let as_dyn: Arc<dyn Session> = primary.clone();
        (primary, as_dyn)
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_session() {
        let factory  = Arc::new(FakeFactory::default());
        let registry = Arc::new(registry_with(factory.clone()));
        let (_, primary) = fake_primary();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let registry = registry.clone();
            let primary  = primary.clone();
            handles.push(tokio::spawn(async move {
                registry.get_or_create(SessionKey::Media { dc_id: 4 }, 4, &primary).await
            }));
        }

        let mut sessions = Vec::new();
        for handle in handles {
            sessions.push(handle.await.unwrap().unwrap());
        }

        assert_eq!(factory.created.load(Ordering::SeqCst), 1);
        let created = factory.sessions.lock().unwrap()[0].clone();
        assert_eq!(created.started.load(Ordering::SeqCst), 1);
        for session in &sessions {
            assert!(Arc::ptr_eq(session, &sessions[0]));
        }
    }

    #[tokio::test]
    async fn cached_session_skips_factory() {
        let factory  = Arc::new(FakeFactory::default());
        let registry = registry_with(factory.clone());
        let (_, primary) = fake_primary();

        let key = SessionKey::Delegate { connection_id: "biz-1".into() };
        let first  = registry.get_or_create(key.clone(), 4, &primary).await.unwrap();
        let second = registry.get_or_create(key, 4, &primary).await.unwrap();

        assert_eq!(factory.created.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn stale_bytes_retried_up_to_three_times() {
        let factory = Arc::new(FakeFactory::default());
        factory.plans.lock().unwrap().push_back(vec![
            Err(AUTH_BYTES_INVALID),
            Err(AUTH_BYTES_INVALID),
            Ok(()),
        ]);
        let registry = registry_with(factory.clone());
        let (primary_fake, primary) = fake_primary();

        let key = SessionKey::Media { dc_id: 2 };
        registry.get_or_create(key.clone(), 2, &primary).await.unwrap();

        let session = factory.sessions.lock().unwrap()[0].clone();
        assert_eq!(session.imports.load(Ordering::SeqCst), 3);
        assert_eq!(primary_fake.exports.load(Ordering::SeqCst), 3);
        assert_eq!(session.stopped.load(Ordering::SeqCst), 0);
        assert!(registry.contains(&key).await);
    }

    #[tokio::test]
    async fn exhausted_handshake_rolls_back_cleanly() {
        let factory = Arc::new(FakeFactory::default());
        factory.plans.lock().unwrap().push_back(vec![
            Err(AUTH_BYTES_INVALID),
            Err(AUTH_BYTES_INVALID),
            Err(AUTH_BYTES_INVALID),
        ]);
        let registry = registry_with(factory.clone());
        let (_, primary) = fake_primary();

        let key = SessionKey::Media { dc_id: 2 };
        let err = registry.get_or_create(key.clone(), 2, &primary).await.err().unwrap();
        assert!(matches!(err, InvocationError::AuthorizationFailed));

        let session = factory.sessions.lock().unwrap()[0].clone();
        assert_eq!(session.imports.load(Ordering::SeqCst), 3);
        assert_eq!(session.stopped.load(Ordering::SeqCst), 1);
        assert!(!registry.contains(&key).await);
    }

    #[tokio::test]
    async fn foreign_import_error_aborts_on_first_attempt() {
        let factory = Arc::new(FakeFactory::default());
        factory.plans.lock().unwrap().push_back(vec![Err("SESSION_REVOKED")]);
        let registry = registry_with(factory.clone());
        let (primary_fake, primary) = fake_primary();

        let key = SessionKey::Media { dc_id: 5 };
        let err = registry.get_or_create(key.clone(), 5, &primary).await.err().unwrap();
        assert!(err.is("SESSION_REVOKED"));

        let session = factory.sessions.lock().unwrap()[0].clone();
        assert_eq!(primary_fake.exports.load(Ordering::SeqCst), 1);
        assert_eq!(session.imports.load(Ordering::SeqCst), 1);
        assert_eq!(session.stopped.load(Ordering::SeqCst), 1);
        assert!(!registry.contains(&key).await);
    }

    #[tokio::test]
    async fn close_stops_every_owned_session() {
        let factory  = Arc::new(FakeFactory::default());
        let registry = registry_with(factory.clone());
        let (_, primary) = fake_primary();

        let media    = SessionKey::Media { dc_id: 4 };
        let delegate = SessionKey::Delegate { connection_id: "biz-1".into() };
        registry.get_or_create(media.clone(), 4, &primary).await.unwrap();
        registry.get_or_create(delegate.clone(), 4, &primary).await.unwrap();

        registry.close().await;

        assert!(!registry.contains(&media).await);
        assert!(!registry.contains(&delegate).await);
        for session in factory.sessions.lock().unwrap().iter() {
            assert_eq!(session.stopped.load(Ordering::SeqCst), 1);
        }
    }
}
