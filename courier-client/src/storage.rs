//! Storage boundary — client-wide persisted settings.
//!
//! The real persistence backend (auth keys, peer tables, update state) lives
//! outside this crate; the invocation core only needs to know whether the
//! account runs against the test or production backend when it spins up a
//! secondary session.

use async_trait::async_trait;

use crate::errors::InvocationError;

/// Persisted client-wide state consumed by the session registry.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Whether sessions must target the test backend.
    async fn test_mode(&self) -> Result<bool, InvocationError>;
}

/// Volatile in-memory storage, handy for tests and throwaway clients.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    test_mode: bool,
}

impl MemoryStorage {
    pub fn new(test_mode: bool) -> Self {
        Self { test_mode }
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn test_mode(&self) -> Result<bool, InvocationError> {
        Ok(self.test_mode)
    }
}
