use anyhow::Result;
use tracing::info;

use strato_cloud::{Compute, IngressRule};
use strato_core::cluster::Role;

/// UDP port the edge nodes expose for the overlay control plane.
pub const EDGE_CONTROL_PORT: u16 = 18443;

/// Security-group ids created by [`FirewallProvisioner::provision`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FirewallFacts {
    pub master_sec_grp: String,
    pub worker_sec_grp: String,
    pub edge_sec_grp: String,
}

impl FirewallFacts {
    pub fn apply(&self, state: &mut strato_core::cluster::ClusterState) {
        state.master_sec_grp = Some(self.master_sec_grp.clone());
        state.worker_sec_grp = Some(self.worker_sec_grp.clone());
        state.edge_sec_grp = Some(self.edge_sec_grp.clone());
    }

    pub fn group(&self, role: Role) -> &str {
        match role {
            Role::Master => &self.master_sec_grp,
            Role::Worker => &self.worker_sec_grp,
            Role::Edge => &self.edge_sec_grp,
        }
    }
}

/// Creates one security group per role and authors the ingress rules:
/// full inter-group trust between all three roles, plus role-specific
/// public exposure (worker 80/443; edge 22/80/443 + the UDP control
/// port; master nothing extra).
pub struct FirewallProvisioner<'a, C: Compute> {
    cloud: &'a C,
}

impl<'a, C: Compute> FirewallProvisioner<'a, C> {
    pub fn new(cloud: &'a C) -> Self {
        FirewallProvisioner { cloud }
    }

    pub fn provision(&self, vpc_id: &str, domain: &str) -> Result<FirewallFacts> {
        let mut facts = FirewallFacts::default();
        for role in Role::ALL {
            let description = format!("{} {}", domain, role);
            let group_id = self
                .cloud
                .create_security_group(vpc_id, role.as_str(), &description)?;
            info!(id = %group_id, "New {} security group", role);
            self.cloud.tag(&group_id, "Name", &description)?;
            match role {
                Role::Master => facts.master_sec_grp = group_id,
                Role::Worker => facts.worker_sec_grp = group_id,
                Role::Edge => facts.edge_sec_grp = group_id,
            }
        }

        for role in Role::ALL {
            self.cloud
                .authorize_ingress(facts.group(role), &self.rules_for(role, &facts))?;
            info!(role = %role, "New firewall rules defined");
        }

        Ok(facts)
    }

    fn rules_for(&self, role: Role, facts: &FirewallFacts) -> Vec<IngressRule> {
        let trust = IngressRule::all_from_groups(&[
            facts.master_sec_grp.as_str(),
            facts.worker_sec_grp.as_str(),
            facts.edge_sec_grp.as_str(),
        ]);
        match role {
            Role::Master => vec![trust],
            Role::Worker => vec![
                trust,
                IngressRule::tcp_public(80),
                IngressRule::tcp_public(443),
            ],
            Role::Edge => vec![
                trust,
                IngressRule::tcp_public(22),
                IngressRule::tcp_public(80),
                IngressRule::tcp_public(443),
                IngressRule::udp_public(EDGE_CONTROL_PORT),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strato_cloud::RuleSource;
    use strato_cloud::SimCloud;

    fn provisioned() -> (SimCloud, FirewallFacts) {
        let cloud = SimCloud::new();
        let vpc_id = cloud.create_vpc("10.0.0.0/16").unwrap();
        let facts = FirewallProvisioner::new(&cloud)
            .provision(&vpc_id, "cell-1.example.com")
            .unwrap();
        (cloud, facts)
    }

    fn tcp_ports(rules: &[IngressRule]) -> Vec<u16> {
        let mut ports: Vec<u16> = rules
            .iter()
            .filter(|r| r.protocol == "tcp")
            .filter_map(|r| r.port_range.map(|(from, _)| from))
            .collect();
        ports.sort_unstable();
        ports
    }

    #[test]
    fn test_three_groups_created_and_tagged() {
        let (cloud, facts) = provisioned();
        for role in Role::ALL {
            let group = facts.group(role);
            assert!(group.starts_with("sg-"));
            assert_eq!(
                cloud.tag_of(group, "Name").unwrap(),
                format!("cell-1.example.com {}", role)
            );
        }
    }

    #[test]
    fn test_edge_rules_exact() {
        let (cloud, facts) = provisioned();
        let rules = cloud.group_rules(&facts.edge_sec_grp);

        assert_eq!(tcp_ports(&rules), vec![22, 80, 443]);

        let udp: Vec<u16> = rules
            .iter()
            .filter(|r| r.protocol == "udp")
            .filter_map(|r| r.port_range.map(|(from, _)| from))
            .collect();
        assert_eq!(udp, vec![EDGE_CONTROL_PORT]);

        // Full trust from all three groups, and nothing else.
        let trust: Vec<_> = rules.iter().filter(|r| r.protocol == "-1").collect();
        assert_eq!(trust.len(), 1);
        match &trust[0].source {
            RuleSource::Groups(groups) => {
                assert_eq!(groups.len(), 3);
                assert!(groups.contains(&facts.master_sec_grp));
                assert!(groups.contains(&facts.worker_sec_grp));
                assert!(groups.contains(&facts.edge_sec_grp));
            }
            other => panic!("expected group trust, got {:?}", other),
        }
        assert_eq!(rules.len(), 5);
    }

    #[test]
    fn test_worker_exposes_http_only() {
        let (cloud, facts) = provisioned();
        let rules = cloud.group_rules(&facts.worker_sec_grp);
        assert_eq!(tcp_ports(&rules), vec![80, 443]);
        assert!(rules.iter().all(|r| r.protocol != "udp"));
        assert_eq!(rules.len(), 3);
    }

    #[test]
    fn test_master_exposes_nothing_public() {
        let (cloud, facts) = provisioned();
        let rules = cloud.group_rules(&facts.master_sec_grp);
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].protocol, "-1");
    }
}
