use serde::{Deserialize, Serialize};

/// Outcome of an idempotent creation operation. Re-running a stage must
/// converge, so "already exists" is a normal result, not an error: the
/// caller branches on this domain-level outcome instead of inspecting
/// transport status codes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Creation {
    /// The resource was created in this call; carries its new id.
    Created(String),
    /// The resource existed before this call.
    AlreadyExists,
}

impl Creation {
    pub fn id(&self) -> Option<&str> {
        match self {
            Creation::Created(id) => Some(id),
            Creation::AlreadyExists => None,
        }
    }
}

/// Where an ingress rule accepts traffic from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuleSource {
    /// A CIDR block, e.g. "0.0.0.0/0".
    Cidr(String),
    /// Other security groups; traffic from members of any listed group.
    Groups(Vec<String>),
}

/// One firewall ingress rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngressRule {
    /// "tcp", "udp", or "-1" for any protocol.
    pub protocol: String,
    /// Inclusive port range; `None` means all ports (any-protocol rules).
    pub port_range: Option<(u16, u16)>,
    pub source: RuleSource,
}

impl IngressRule {
    /// TCP on a single port, open to the world.
    pub fn tcp_public(port: u16) -> Self {
        IngressRule {
            protocol: "tcp".to_string(),
            port_range: Some((port, port)),
            source: RuleSource::Cidr("0.0.0.0/0".to_string()),
        }
    }

    /// UDP on a single port, open to the world.
    pub fn udp_public(port: u16) -> Self {
        IngressRule {
            protocol: "udp".to_string(),
            port_range: Some((port, port)),
            source: RuleSource::Cidr("0.0.0.0/0".to_string()),
        }
    }

    /// Any protocol, any port, from members of the given groups.
    pub fn all_from_groups(groups: &[&str]) -> Self {
        IngressRule {
            protocol: "-1".to_string(),
            port_range: None,
            source: RuleSource::Groups(groups.iter().map(|g| g.to_string()).collect()),
        }
    }
}

/// The single network interface attached to a launched instance.
/// Device index 0 and delete-on-termination are fixed by the launcher.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InterfaceSpec {
    pub subnet_id: String,
    pub security_groups: Vec<String>,
    /// Static private address, if the operator pinned one.
    pub private_ip: Option<String>,
    /// Auto-assign a public address at launch.
    pub associate_public_ip: bool,
}

/// Everything the cloud needs to launch one node instance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchRequest {
    pub image_id: String,
    pub instance_type: String,
    pub key_pair: String,
    pub availability_zone: String,
    /// Instance profile name granting the node its IAM role.
    pub iam_profile: String,
    /// Base64-encoded bootstrap payload.
    pub user_data: String,
    pub interface: InterfaceSpec,
}

/// Identifiers captured from a successful launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchReservation {
    pub instance_id: String,
    /// Primary network interface (device index 0).
    pub interface_id: String,
}

/// Addresses described on a network interface. The private address
/// appears once the interface is provisioned; the public one only when
/// an association exists.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InterfaceAddresses {
    pub private_ip: Option<String>,
    pub public_ip: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_creation_id() {
        assert_eq!(Creation::Created("r-1".into()).id(), Some("r-1"));
        assert_eq!(Creation::AlreadyExists.id(), None);
    }

    #[test]
    fn test_rule_constructors() {
        let rule = IngressRule::tcp_public(443);
        assert_eq!(rule.protocol, "tcp");
        assert_eq!(rule.port_range, Some((443, 443)));
        assert_eq!(rule.source, RuleSource::Cidr("0.0.0.0/0".to_string()));

        let trust = IngressRule::all_from_groups(&["sg-1", "sg-2"]);
        assert_eq!(trust.protocol, "-1");
        assert!(trust.port_range.is_none());
        match trust.source {
            RuleSource::Groups(groups) => assert_eq!(groups, vec!["sg-1", "sg-2"]),
            other => panic!("expected group source, got {:?}", other),
        }
    }
}
