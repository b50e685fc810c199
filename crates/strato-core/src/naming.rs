use anyhow::{Result, bail};

use crate::cluster::Role;

/// Validate a cluster ID: lowercase alphanumeric + hyphens, 1-63 chars.
/// It names the state file and tags cloud resources, so keep it DNS-safe.
pub fn validate_cluster_id(id: &str) -> Result<()> {
    if id.is_empty() || id.len() > 63 {
        bail!("Cluster ID must be 1-63 characters, got {}", id.len());
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        bail!("Cluster ID must be lowercase alphanumeric + hyphens: {:?}", id);
    }
    if id.starts_with('-') || id.ends_with('-') {
        bail!("Cluster ID must not start or end with a hyphen: {:?}", id);
    }
    Ok(())
}

/// Node hostname: "<role>-<host_id>.<domain>".
pub fn node_hostname(role: Role, host_id: u32, domain: &str) -> String {
    format!("{}-{}.{}", role, host_id, domain)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_cluster_id_valid() {
        assert!(validate_cluster_id("cell-1").is_ok());
        assert!(validate_cluster_id("a").is_ok());
        assert!(validate_cluster_id("prod-eu-3").is_ok());
    }

    #[test]
    fn test_validate_cluster_id_invalid() {
        assert!(validate_cluster_id("").is_err());
        assert!(validate_cluster_id("UPPER").is_err());
        assert!(validate_cluster_id("-leading").is_err());
        assert!(validate_cluster_id("trailing-").is_err());
        assert!(validate_cluster_id("has space").is_err());
        assert!(validate_cluster_id(&"a".repeat(64)).is_err());
    }

    #[test]
    fn test_node_hostname() {
        assert_eq!(
            node_hostname(Role::Master, 1, "cell-1.example.com"),
            "master-1.cell-1.example.com"
        );
        assert_eq!(node_hostname(Role::Edge, 12, "x.io"), "edge-12.x.io");
    }
}
