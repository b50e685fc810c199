use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::info;

use strato_core::cluster::ClusterState;

use crate::store::{StateError, StateStore};

/// JSON-file state backend: one `<cluster-id>.json` per cluster under a
/// per-operator directory with owner-only permissions.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        FileStore { dir: dir.into() }
    }

    /// Default state directory: `$STRATO_STATE_DIR`, else `$HOME/.strato`.
    pub fn default_dir() -> PathBuf {
        if let Ok(dir) = std::env::var("STRATO_STATE_DIR") {
            return PathBuf::from(dir);
        }
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        Path::new(&home).join(".strato")
    }

    fn state_path(&self, cluster_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", cluster_id))
    }

    #[cfg(unix)]
    fn create_state_dir(&self) -> std::io::Result<()> {
        use std::os::unix::fs::DirBuilderExt;
        std::fs::DirBuilder::new()
            .recursive(true)
            .mode(0o700)
            .create(&self.dir)
    }

    #[cfg(not(unix))]
    fn create_state_dir(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.dir)
    }
}

impl StateStore for FileStore {
    fn load(&self, cluster_id: &str) -> Result<ClusterState, StateError> {
        let path = self.state_path(cluster_id);
        let data = match std::fs::read_to_string(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StateError::NotFound(cluster_id.to_string()));
            }
            Err(e) => return Err(StateError::Io(e)),
        };
        serde_json::from_str(&data).map_err(|e| StateError::Corrupt(cluster_id.to_string(), e))
    }

    fn persist(&self, cluster_id: &str, state: &ClusterState) -> Result<(), StateError> {
        self.create_state_dir()?;

        let data = serde_json::to_vec_pretty(state)
            .map_err(|e| StateError::Corrupt(cluster_id.to_string(), e))?;

        // Write-then-rename so a crashed stage never leaves a
        // half-written record behind.
        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(&data)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tmp.as_file()
                .set_permissions(std::fs::Permissions::from_mode(0o600))?;
        }
        let path = self.state_path(cluster_id);
        tmp.persist(&path).map_err(|e| StateError::Io(e.error))?;

        info!(cluster_id, path = %path.display(), "Cluster state persisted");
        Ok(())
    }
}
