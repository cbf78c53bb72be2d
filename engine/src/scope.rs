//! Sync scopes and query routing.
//!
//! A scope identifies one reconciliation unit (a community or conversation
//! space) and carries the routing information the transport needs: records
//! owned by the local actor are queried against the local identity's store,
//! records owned by a peer go through the remote-peer variant of the same
//! query.

use crate::{CollectionId, PeerId, ScopeId};
use serde::{Deserialize, Serialize};

/// Who owns the records behind a scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum OwningIdentity {
    /// The local actor's own store
    Local,
    /// A distinct remote identity
    Peer { id: PeerId },
}

/// Transport route derived from a scope's owning identity.
///
/// Both routes have identical query semantics; only the transport differs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryRoute {
    Local,
    Peer(PeerId),
}

/// One reconciliation unit: a target collection plus its owning identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncScope {
    /// Scope identifier
    pub id: ScopeId,
    /// Target collection (drive-equivalent) in the origin store
    pub collection: CollectionId,
    /// Owning identity, used to pick the query route
    pub owner: OwningIdentity,
}

impl SyncScope {
    /// Create a scope owned by the local actor.
    pub fn new(id: impl Into<ScopeId>, collection: impl Into<CollectionId>) -> Self {
        Self {
            id: id.into(),
            collection: collection.into(),
            owner: OwningIdentity::Local,
        }
    }

    /// Create a scope owned by a remote peer identity.
    pub fn with_peer(
        id: impl Into<ScopeId>,
        collection: impl Into<CollectionId>,
        peer: impl Into<PeerId>,
    ) -> Self {
        Self {
            id: id.into(),
            collection: collection.into(),
            owner: OwningIdentity::Peer { id: peer.into() },
        }
    }

    /// Derive the transport route for this scope.
    pub fn route(&self) -> QueryRoute {
        match &self.owner {
            OwningIdentity::Local => QueryRoute::Local,
            OwningIdentity::Peer { id } => QueryRoute::Peer(id.clone()),
        }
    }
}
