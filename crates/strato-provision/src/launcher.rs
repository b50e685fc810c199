use std::thread;

use anyhow::{Result, bail};
use base64::Engine as _;
use serde::Serialize;
use tracing::{info, warn};

use strato_cloud::{Balancer, CloudError, Compute, InterfaceSpec, LaunchRequest};
use strato_core::retry::{poll_until, retry_on};

use crate::budgets::Budgets;

/// What kind of public address a node gets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublicIpPolicy {
    /// No public address; the node egresses through NAT.
    Disabled,
    /// Auto-assign a public address at launch.
    AutoAssign,
    /// Allocate an elastic IP and associate it after launch.
    Elastic,
}

impl std::str::FromStr for PublicIpPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "false" => Ok(PublicIpPolicy::Disabled),
            "true" => Ok(PublicIpPolicy::AutoAssign),
            "elastic" => Ok(PublicIpPolicy::Elastic),
            other => bail!(
                "Unknown public IP policy {:?}, expected true, false or elastic",
                other
            ),
        }
    }
}

impl std::fmt::Display for PublicIpPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PublicIpPolicy::Disabled => f.write_str("false"),
            PublicIpPolicy::AutoAssign => f.write_str("true"),
            PublicIpPolicy::Elastic => f.write_str("elastic"),
        }
    }
}

/// Everything needed to launch one node. Produced per Add/Run
/// invocation and discarded afterwards; only the launched resources
/// persist.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    pub hostname: String,
    pub region: String,
    pub zone: String,
    pub image_id: String,
    pub instance_type: String,
    pub key_pair: String,
    pub subnet_id: String,
    pub security_groups: Vec<String>,
    /// Instance profile name; by convention the role name.
    pub iam_profile: String,
    pub public_ip: PublicIpPolicy,
    pub private_ip: Option<String>,
    pub source_dest_check: bool,
    pub balancer_name: Option<String>,
}

impl LaunchSpec {
    pub fn availability_zone(&self) -> String {
        format!("{}{}", self.region, self.zone)
    }
}

/// Result of one launch: the created ids plus whatever addresses the
/// discovery poll managed to observe.
#[derive(Debug, Clone, Serialize)]
pub struct LaunchOutput {
    #[serde(skip)]
    pub instance_id: String,
    #[serde(skip)]
    pub interface_id: String,
    #[serde(rename = "internal", skip_serializing_if = "Option::is_none")]
    pub internal_ip: Option<String>,
    #[serde(rename = "external", skip_serializing_if = "Option::is_none")]
    pub external_ip: Option<String>,
}

impl LaunchOutput {
    /// The `run` result contract: `{"internal": ip, "external": ip}`.
    pub fn addresses_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Drives the per-node launch protocol:
/// launch → tag → attributes → [elastic IP] → [balancer] → IP discovery.
pub struct InstanceLauncher<'a, C: Compute + Balancer> {
    cloud: &'a C,
    budgets: &'a Budgets,
}

impl<'a, C: Compute + Balancer> InstanceLauncher<'a, C> {
    pub fn new(cloud: &'a C, budgets: &'a Budgets) -> Self {
        InstanceLauncher { cloud, budgets }
    }

    pub fn launch(&self, spec: &LaunchSpec, payload: &[u8]) -> Result<LaunchOutput> {
        let request = LaunchRequest {
            image_id: spec.image_id.clone(),
            instance_type: spec.instance_type.clone(),
            key_pair: spec.key_pair.clone(),
            availability_zone: spec.availability_zone(),
            iam_profile: spec.iam_profile.clone(),
            user_data: base64::engine::general_purpose::STANDARD.encode(payload),
            interface: InterfaceSpec {
                subnet_id: spec.subnet_id.clone(),
                security_groups: spec.security_groups.clone(),
                private_ip: spec.private_ip.clone(),
                associate_public_ip: spec.public_ip == PublicIpPolicy::AutoAssign,
            },
        };

        // Freshly created IAM profiles and subnets can fail parameter
        // validation for a few seconds; retry only that class.
        let reservation = retry_on(
            self.budgets.launch_attempts,
            self.budgets.launch_retry_delay,
            "run_instance",
            CloudError::is_transient,
            || self.cloud.run_instance(&request),
        )?;
        info!(
            id = %reservation.instance_id,
            "New {} instance requested",
            spec.instance_type,
        );

        self.cloud
            .tag(&reservation.instance_id, "Name", &spec.hostname)?;
        info!(id = %spec.hostname, "New instance tagged");

        // Overlay gateway nodes forward traffic not addressed to
        // themselves; that needs the check off.
        self.cloud
            .set_source_dest_check(&reservation.instance_id, spec.source_dest_check)?;

        if spec.public_ip == PublicIpPolicy::Elastic {
            self.assign_elastic_ip(&reservation.instance_id, &reservation.interface_id)?;
        }

        if let Some(balancer) = &spec.balancer_name {
            self.cloud
                .register_instance(balancer, &reservation.instance_id)?;
            info!(id = %balancer, "Instance registered with load balancer");
        }

        let (internal_ip, external_ip) = self.discover_addresses(&reservation.interface_id);

        Ok(LaunchOutput {
            instance_id: reservation.instance_id,
            interface_id: reservation.interface_id,
            internal_ip,
            external_ip,
        })
    }

    fn assign_elastic_ip(&self, instance_id: &str, interface_id: &str) -> Result<()> {
        let allocation_id = self.cloud.allocate_address()?;
        info!(id = %allocation_id, "New elastic IP allocated");

        poll_until(
            self.budgets.run_poll_attempts,
            self.budgets.run_poll_interval,
            "instance is running",
            || Ok(self.cloud.instance_running(instance_id)?),
        )?;

        let association_id = self.cloud.associate_address(&allocation_id, interface_id)?;
        info!(id = %association_id, "New elastic IP association");
        Ok(())
    }

    /// Poll the interface until an internal address shows up, capturing
    /// an external one if an association exists. Failure here is
    /// reported but non-fatal: the instance already exists.
    fn discover_addresses(&self, interface_id: &str) -> (Option<String>, Option<String>) {
        for attempt in 1..=self.budgets.ip_poll_attempts {
            match self.cloud.interface_addresses(interface_id) {
                Ok(addrs) if addrs.private_ip.is_some() => {
                    return (addrs.private_ip, addrs.public_ip);
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(interface_id, error = %e, "Address discovery failed");
                    return (None, None);
                }
            }
            if attempt < self.budgets.ip_poll_attempts {
                thread::sleep(self.budgets.ip_poll_interval);
            }
        }
        warn!(interface_id, "No internal address discovered");
        (None, None)
    }
}
