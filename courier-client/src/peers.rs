//! Peer identity records and the access cache.
//!
//! Many responses carry lightweight `users` / `chats` collections alongside
//! the primary payload. The dispatcher merges them into a [`PeerCache`] so
//! later calls can resolve peers without re-fetching; whether a response
//! carries them at all is an explicit capability ([`Response::entities`])
//! rather than a field probe.

use std::collections::HashMap;

// ─── PeerEntity ───────────────────────────────────────────────────────────────

/// What kind of peer an identity record describes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PeerKind {
    User,
    Chat,
    Channel,
}

/// A lightweight identity record observed in a response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PeerEntity {
    pub id:          i64,
    pub kind:        PeerKind,
    pub access_hash: Option<i64>,
    pub username:    Option<String>,
}

impl PeerEntity {
    pub fn new(id: i64, kind: PeerKind) -> Self {
        Self { id, kind, access_hash: None, username: None }
    }

    pub fn access_hash(mut self, hash: i64) -> Self {
        self.access_hash = Some(hash); self
    }

    pub fn username(mut self, name: impl Into<String>) -> Self {
        self.username = Some(name.into()); self
    }
}

// ─── EntitySet ────────────────────────────────────────────────────────────────

/// The auxiliary identity collections a response may expose.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EntitySet {
    pub users: Vec<PeerEntity>,
    pub chats: Vec<PeerEntity>,
}

// ─── Response ─────────────────────────────────────────────────────────────────

/// A raw reply from the session layer.
///
/// The primary payload stays opaque; decoding it is the concern of the
/// domain-object parsers, not of this crate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Response {
    body:     Vec<u8>,
    entities: Option<EntitySet>,
}

impl Response {
    /// A response that exposes no identity collections.
    pub fn new(body: impl Into<Vec<u8>>) -> Self {
        Self { body: body.into(), entities: None }
    }

    /// A response that also carries `users` / `chats` records.
    pub fn with_entities(body: impl Into<Vec<u8>>, entities: EntitySet) -> Self {
        Self { body: body.into(), entities: Some(entities) }
    }

    /// The raw primary payload, unmodified.
    pub fn body(&self) -> &[u8] { &self.body }

    /// The identity collections, if this response type carries any.
    pub fn entities(&self) -> Option<&EntitySet> { self.entities.as_ref() }
}

// ─── PeerCache ────────────────────────────────────────────────────────────────

/// Caches identity records keyed by id so later calls can resolve peers.
///
/// Merge is last-writer-wins per id: a newer snapshot of the same peer
/// replaces the older one wholesale.
#[derive(Default)]
pub(crate) struct PeerCache {
    users: HashMap<i64, PeerEntity>,
    chats: HashMap<i64, PeerEntity>,
}

impl PeerCache {
    pub(crate) fn merge(&mut self, entities: &EntitySet) {
        for user in &entities.users {
            self.users.insert(user.id, user.clone());
        }
        for chat in &entities.chats {
            self.chats.insert(chat.id, chat.clone());
        }
    }

    pub(crate) fn user(&self, id: i64) -> Option<&PeerEntity> {
        self.users.get(&id)
    }

    pub(crate) fn chat(&self, id: i64) -> Option<&PeerEntity> {
        self.chats.get(&id)
    }
}
