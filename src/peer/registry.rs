//! Registry of live connection handles, keyed by remote peer

use crate::peer::handle::ConnectionHandle;
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// At most one live handle per remote peer
///
/// Inserting for a peer that already has a handle closes the stale one
/// first, so a crashed-and-rejoining remote never leaks a connection.
#[derive(Default)]
pub struct ConnectionRegistry {
    handles: RwLock<HashMap<String, Arc<ConnectionHandle>>>,
}

impl ConnectionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the handle for its remote peer, closing any stale one
    pub async fn insert(&self, handle: Arc<ConnectionHandle>) {
        let stale = {
            let mut handles = self.handles.write().await;
            handles.insert(handle.remote_id().to_string(), handle.clone())
        };
        if let Some(stale) = stale {
            warn!(remote_id = %stale.remote_id(), "Replacing stale connection");
            stale.close().await;
        }
        debug!(remote_id = %handle.remote_id(), "Connection registered");
    }

    /// Look up the handle for a remote peer
    pub async fn get(&self, remote_id: &str) -> Option<Arc<ConnectionHandle>> {
        self.handles.read().await.get(remote_id).cloned()
    }

    /// Remove and close the handle for a remote peer
    pub async fn remove(&self, remote_id: &str) -> bool {
        let removed = self.handles.write().await.remove(remote_id);
        match removed {
            Some(handle) => {
                handle.close().await;
                info!(remote_id, "Connection removed");
                true
            }
            None => false,
        }
    }

    /// Close and drop every handle
    pub async fn clear(&self) {
        let handles: Vec<_> = self.handles.write().await.drain().collect();
        if handles.is_empty() {
            return;
        }
        join_all(handles.iter().map(|(_, h)| h.close())).await;
        info!(count = handles.len(), "All connections closed");
    }

    /// Number of live handles
    pub async fn count(&self) -> usize {
        self.handles.read().await.len()
    }

    /// Remote ids with a live handle
    pub async fn remote_ids(&self) -> Vec<String> {
        self.handles.read().await.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peer::transport::{NegotiationRole, PeerTransport};
    use crate::signaling::CandidateInit;
    use crate::Result;
    use async_trait::async_trait;

    struct NullTransport;

    #[async_trait]
    impl PeerTransport for NullTransport {
        async fn create_offer(&self) -> Result<String> {
            Ok(String::new())
        }
        async fn create_answer(&self, _offer_sdp: &str) -> Result<String> {
            Ok(String::new())
        }
        async fn apply_answer(&self, _answer_sdp: &str) -> Result<()> {
            Ok(())
        }
        async fn add_remote_candidate(&self, _candidate: CandidateInit) -> Result<()> {
            Ok(())
        }
        async fn close(&self) -> Result<()> {
            Ok(())
        }
    }

    fn handle(remote: &str) -> Arc<ConnectionHandle> {
        Arc::new(ConnectionHandle::new(
            remote,
            NegotiationRole::Responder,
            Arc::new(NullTransport),
        ))
    }

    #[tokio::test]
    async fn test_insert_and_lookup() {
        let registry = ConnectionRegistry::new();
        registry.insert(handle("bob")).await;

        assert_eq!(registry.count().await, 1);
        assert!(registry.get("bob").await.is_some());
        assert!(registry.get("carol").await.is_none());
    }

    #[tokio::test]
    async fn test_reinsert_closes_stale_handle() {
        let registry = ConnectionRegistry::new();
        let first = handle("bob");
        registry.insert(first.clone()).await;
        registry.insert(handle("bob")).await;

        assert_eq!(registry.count().await, 1);
        assert!(first.is_closed());
        // The live handle is the replacement, not the stale one
        assert!(!registry.get("bob").await.unwrap().is_closed());
    }

    #[tokio::test]
    async fn test_remove_closes_handle() {
        let registry = ConnectionRegistry::new();
        let h = handle("bob");
        registry.insert(h.clone()).await;

        assert!(registry.remove("bob").await);
        assert!(h.is_closed());
        assert!(!registry.remove("bob").await);
    }

    #[tokio::test]
    async fn test_clear_closes_everything() {
        let registry = ConnectionRegistry::new();
        let a = handle("bob");
        let b = handle("carol");
        registry.insert(a.clone()).await;
        registry.insert(b.clone()).await;

        registry.clear().await;
        assert_eq!(registry.count().await, 0);
        assert!(a.is_closed());
        assert!(b.is_closed());
    }
}
