use strato_core::cluster::ClusterState;
use thiserror::Error;

/// Why a state operation failed. `NotFound` is a normal outcome for a
/// cluster that has not run `setup` yet; `Corrupt` and `Io` are fatal
/// to the invoking stage.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("no state recorded for cluster {0}")]
    NotFound(String),

    #[error("state for cluster {0} is corrupt")]
    Corrupt(String, #[source] serde_json::Error),

    #[error("state storage error")]
    Io(#[from] std::io::Error),
}

/// Persistence contract for cluster state.
///
/// The persisted record is the sole communication channel between
/// provisioning stages that run as separate invocations: each stage
/// loads the record, merges in the fields it discovered, and persists
/// the result. `persist` must be atomic — a reader never observes a
/// half-written record.
pub trait StateStore: Send + Sync {
    fn load(&self, cluster_id: &str) -> Result<ClusterState, StateError>;

    fn persist(&self, cluster_id: &str, state: &ClusterState) -> Result<(), StateError>;

    /// Load-then-merge convenience: returns the stored record with
    /// `partial` filled into its zero-valued fields, or `partial`
    /// itself when nothing is stored yet.
    fn load_merged(&self, cluster_id: &str, partial: &ClusterState) -> Result<ClusterState, StateError> {
        match self.load(cluster_id) {
            Ok(mut existing) => {
                existing.merge(partial);
                Ok(existing)
            }
            Err(StateError::NotFound(_)) => Ok(partial.clone()),
            Err(e) => Err(e),
        }
    }
}
