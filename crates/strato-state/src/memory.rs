use std::collections::HashMap;
use std::sync::Mutex;

use strato_core::cluster::ClusterState;

use crate::store::{StateError, StateStore};

/// In-memory state backend for tests and embedded use.
#[derive(Default)]
pub struct MemoryStore {
    map: Mutex<HashMap<String, ClusterState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStore {
    fn load(&self, cluster_id: &str) -> Result<ClusterState, StateError> {
        self.map
            .lock()
            .unwrap()
            .get(cluster_id)
            .cloned()
            .ok_or_else(|| StateError::NotFound(cluster_id.to_string()))
    }

    fn persist(&self, cluster_id: &str, state: &ClusterState) -> Result<(), StateError> {
        self.map
            .lock()
            .unwrap()
            .insert(cluster_id.to_string(), state.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_roundtrip() {
        let store = MemoryStore::new();
        let state = ClusterState {
            cluster_id: "cell-1".to_string(),
            ..Default::default()
        };
        store.persist("cell-1", &state).unwrap();
        assert_eq!(store.load("cell-1").unwrap(), state);
        assert!(matches!(
            store.load("cell-2"),
            Err(StateError::NotFound(_))
        ));
    }
}
