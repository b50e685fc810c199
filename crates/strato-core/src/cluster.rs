use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

/// Node function class. Determines instance type, subnet placement,
/// and firewall exposure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Master,
    Worker,
    Edge,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Master, Role::Worker, Role::Edge];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Master => "master",
            Role::Worker => "worker",
            Role::Edge => "edge",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "master" => Ok(Role::Master),
            "worker" => Ok(Role::Worker),
            "edge" => Ok(Role::Edge),
            other => bail!("Unknown role {:?}, expected master, worker or edge", other),
        }
    }
}

/// The durable record of one cluster's infrastructure, persisted as one
/// JSON document per cluster id.
///
/// Intent fields are supplied by the operator and fixed for the cluster
/// lifetime. Discovered fields are filled in by provisioning stages,
/// write-once per field: [`ClusterState::merge`] never overwrites a
/// populated field, so stages running in separate invocations only
/// contribute the subset they own.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterState {
    // ---- Intent ----
    pub cluster_id: String,
    pub domain: String,
    pub region: String,
    pub zone: String,
    pub vpc_cidr: String,
    pub int_subnet_cidr: String,
    pub ext_subnet_cidr: String,
    pub master_count: u32,
    pub worker_count: u32,
    pub edge_count: u32,
    pub master_type: String,
    pub worker_type: String,
    pub edge_type: String,
    /// Base-image release channel (stable, beta, alpha).
    pub channel: String,
    pub key_pair: String,
    /// Bootstrap token policy: "auto" requests one from the token
    /// service; anything else is passed through verbatim.
    pub bootstrap_token: String,
    pub ca_cert: String,
    pub overlay_network: String,
    pub overlay_subnet_len: String,
    pub overlay_subnet_min: String,
    pub overlay_subnet_max: String,
    pub overlay_backend: String,

    // ---- Discovered ----
    pub vpc_id: Option<String>,
    pub main_route_table_id: Option<String>,
    pub route_table_id: Option<String>,
    pub inet_gateway_id: Option<String>,
    pub nat_gateway_id: Option<String>,
    pub int_subnet_id: Option<String>,
    pub ext_subnet_id: Option<String>,
    pub master_role_id: Option<String>,
    pub worker_role_id: Option<String>,
    pub edge_role_id: Option<String>,
    pub volume_policy_arn: Option<String>,
    pub master_sec_grp: Option<String>,
    pub worker_sec_grp: Option<String>,
    pub edge_sec_grp: Option<String>,
    pub allocation_id: Option<String>,
    pub image_id: Option<String>,
}

fn fill_str(dst: &mut String, src: &str) {
    if dst.is_empty() && !src.is_empty() {
        *dst = src.to_string();
    }
}

fn fill_u32(dst: &mut u32, src: u32) {
    if *dst == 0 {
        *dst = src;
    }
}

fn fill_opt(dst: &mut Option<String>, src: &Option<String>) {
    if dst.is_none() && src.is_some() {
        dst.clone_from(src);
    }
}

impl ClusterState {
    /// Field-wise union: only zero-valued fields in `self` accept values
    /// from `partial`. A populated field is never overwritten, which lets
    /// stages contribute disjoint subsets of the record without seeing
    /// the whole picture.
    pub fn merge(&mut self, partial: &ClusterState) {
        fill_str(&mut self.cluster_id, &partial.cluster_id);
        fill_str(&mut self.domain, &partial.domain);
        fill_str(&mut self.region, &partial.region);
        fill_str(&mut self.zone, &partial.zone);
        fill_str(&mut self.vpc_cidr, &partial.vpc_cidr);
        fill_str(&mut self.int_subnet_cidr, &partial.int_subnet_cidr);
        fill_str(&mut self.ext_subnet_cidr, &partial.ext_subnet_cidr);
        fill_u32(&mut self.master_count, partial.master_count);
        fill_u32(&mut self.worker_count, partial.worker_count);
        fill_u32(&mut self.edge_count, partial.edge_count);
        fill_str(&mut self.master_type, &partial.master_type);
        fill_str(&mut self.worker_type, &partial.worker_type);
        fill_str(&mut self.edge_type, &partial.edge_type);
        fill_str(&mut self.channel, &partial.channel);
        fill_str(&mut self.key_pair, &partial.key_pair);
        fill_str(&mut self.bootstrap_token, &partial.bootstrap_token);
        fill_str(&mut self.ca_cert, &partial.ca_cert);
        fill_str(&mut self.overlay_network, &partial.overlay_network);
        fill_str(&mut self.overlay_subnet_len, &partial.overlay_subnet_len);
        fill_str(&mut self.overlay_subnet_min, &partial.overlay_subnet_min);
        fill_str(&mut self.overlay_subnet_max, &partial.overlay_subnet_max);
        fill_str(&mut self.overlay_backend, &partial.overlay_backend);

        fill_opt(&mut self.vpc_id, &partial.vpc_id);
        fill_opt(&mut self.main_route_table_id, &partial.main_route_table_id);
        fill_opt(&mut self.route_table_id, &partial.route_table_id);
        fill_opt(&mut self.inet_gateway_id, &partial.inet_gateway_id);
        fill_opt(&mut self.nat_gateway_id, &partial.nat_gateway_id);
        fill_opt(&mut self.int_subnet_id, &partial.int_subnet_id);
        fill_opt(&mut self.ext_subnet_id, &partial.ext_subnet_id);
        fill_opt(&mut self.master_role_id, &partial.master_role_id);
        fill_opt(&mut self.worker_role_id, &partial.worker_role_id);
        fill_opt(&mut self.edge_role_id, &partial.edge_role_id);
        fill_opt(&mut self.volume_policy_arn, &partial.volume_policy_arn);
        fill_opt(&mut self.master_sec_grp, &partial.master_sec_grp);
        fill_opt(&mut self.worker_sec_grp, &partial.worker_sec_grp);
        fill_opt(&mut self.edge_sec_grp, &partial.edge_sec_grp);
        fill_opt(&mut self.allocation_id, &partial.allocation_id);
        fill_opt(&mut self.image_id, &partial.image_id);
    }

    /// Availability zone string ("us-east-1" + "a" -> "us-east-1a").
    pub fn availability_zone(&self) -> String {
        format!("{}{}", self.region, self.zone)
    }

    pub fn node_count(&self, role: Role) -> u32 {
        match role {
            Role::Master => self.master_count,
            Role::Worker => self.worker_count,
            Role::Edge => self.edge_count,
        }
    }

    pub fn instance_type(&self, role: Role) -> &str {
        match role {
            Role::Master => &self.master_type,
            Role::Worker => &self.worker_type,
            Role::Edge => &self.edge_type,
        }
    }

    /// Masters live on the internal subnet; workers and edges on the
    /// external one.
    pub fn subnet_id(&self, role: Role) -> Option<&str> {
        match role {
            Role::Master => self.int_subnet_id.as_deref(),
            Role::Worker | Role::Edge => self.ext_subnet_id.as_deref(),
        }
    }

    pub fn security_group(&self, role: Role) -> Option<&str> {
        match role {
            Role::Master => self.master_sec_grp.as_deref(),
            Role::Worker => self.worker_sec_grp.as_deref(),
            Role::Edge => self.edge_sec_grp.as_deref(),
        }
    }

    /// The overlay "host-gw" backend routes pod traffic via the node
    /// itself, which only works with the source/dest check disabled.
    pub fn source_dest_check(&self) -> bool {
        self.overlay_backend != "host-gw"
    }
}
