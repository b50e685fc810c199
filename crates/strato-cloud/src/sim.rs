//! In-memory simulated cloud provider.
//!
//! Backs the test suite and `--provider sim` dry runs: every operation
//! is recorded in an ordered call log, resource ids are generated
//! locally, and name-keyed identity resources report conflicts exactly
//! like a real control plane re-running a setup stage would see.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use tracing::info;

use crate::api::{Balancer, Compute, Identity};
use crate::error::{CloudError, CloudResult};
use crate::types::{
    Creation, IngressRule, InterfaceAddresses, LaunchRequest, LaunchReservation,
};

/// Short resource id: "<prefix>-" + 8 hex chars.
fn resource_id(prefix: &str) -> String {
    let bytes = uuid::Uuid::new_v4();
    let b = bytes.as_bytes();
    format!("{}-{:02x}{:02x}{:02x}{:02x}", prefix, b[0], b[1], b[2], b[3])
}

#[derive(Debug, Clone)]
struct SimGroup {
    vpc_id: String,
    name: String,
    rules: Vec<IngressRule>,
}

#[derive(Debug, Clone)]
struct SimInstance {
    request: LaunchRequest,
    interface_id: String,
    source_dest_check: bool,
}

#[derive(Debug, Clone, Default)]
struct SimInterface {
    private_ip: Option<String>,
    public_ip: Option<String>,
}

#[derive(Default)]
struct SimState {
    ops: Vec<String>,
    vpcs: HashSet<String>,
    subnets: HashMap<String, String>,
    route_tables: HashMap<String, String>,
    main_route_tables: HashMap<String, String>,
    gateways: HashSet<String>,
    allocations: HashSet<String>,
    /// NAT gateway id -> availability polls remaining before "available".
    nat_gateways: HashMap<String, u32>,
    groups: HashMap<String, SimGroup>,
    policies: HashMap<String, String>,
    roles: HashSet<String>,
    profiles: HashSet<String>,
    role_policies: HashSet<(String, String)>,
    profile_roles: HashSet<(String, String)>,
    instances: HashMap<String, SimInstance>,
    launch_order: Vec<String>,
    interfaces: HashMap<String, SimInterface>,
    registrations: Vec<(String, String)>,
    tags: HashMap<String, HashMap<String, String>>,
    /// op name -> remaining injected InvalidParameter failures.
    fail_invalid: HashMap<String, u32>,
    nat_polls_required: u32,
    ip_counter: u32,
}

/// The simulated cloud. Interior mutability so one instance can be
/// shared across provisioning threads.
pub struct SimCloud {
    inner: Mutex<SimState>,
}

impl Default for SimCloud {
    fn default() -> Self {
        Self::new()
    }
}

impl SimCloud {
    pub fn new() -> Self {
        SimCloud {
            inner: Mutex::new(SimState {
                nat_polls_required: 1,
                ..Default::default()
            }),
        }
    }

    /// Inject `times` InvalidParameter failures on the named operation.
    pub fn fail_invalid_parameter(&self, op: &str, times: u32) {
        let mut st = self.lock();
        st.fail_invalid.insert(op.to_string(), times);
    }

    /// Number of availability polls a NAT gateway needs before it
    /// reports available (default 1).
    pub fn set_nat_polls_required(&self, polls: u32) {
        self.lock().nat_polls_required = polls;
    }

    /// Ordered log of every operation the provider served.
    pub fn ops(&self) -> Vec<String> {
        self.lock().ops.clone()
    }

    /// Index of the first logged operation starting with `prefix`.
    pub fn op_index(&self, prefix: &str) -> Option<usize> {
        self.lock().ops.iter().position(|op| op.starts_with(prefix))
    }

    /// Count of logged operations starting with `prefix`.
    pub fn op_count(&self, prefix: &str) -> usize {
        self.lock()
            .ops
            .iter()
            .filter(|op| op.starts_with(prefix))
            .count()
    }

    /// Ingress rules authored on a security group.
    pub fn group_rules(&self, group_id: &str) -> Vec<IngressRule> {
        self.lock()
            .groups
            .get(group_id)
            .map(|g| g.rules.clone())
            .unwrap_or_default()
    }

    /// Launch requests in submission order.
    pub fn launch_requests(&self) -> Vec<LaunchRequest> {
        let st = self.lock();
        st.launch_order
            .iter()
            .filter_map(|id| st.instances.get(id))
            .map(|i| i.request.clone())
            .collect()
    }

    /// Value of a resource's tag, if set.
    pub fn tag_of(&self, resource_id: &str, key: &str) -> Option<String> {
        self.lock()
            .tags
            .get(resource_id)
            .and_then(|m| m.get(key))
            .cloned()
    }

    /// (balancer, instance) registrations in order.
    pub fn registrations(&self) -> Vec<(String, String)> {
        self.lock().registrations.clone()
    }

    pub fn source_dest_check_of(&self, instance_id: &str) -> Option<bool> {
        self.lock()
            .instances
            .get(instance_id)
            .map(|i| i.source_dest_check)
    }

    /// Primary network interface of a launched instance.
    pub fn interface_of(&self, instance_id: &str) -> Option<String> {
        self.lock()
            .instances
            .get(instance_id)
            .map(|i| i.interface_id.clone())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SimState> {
        self.inner.lock().unwrap()
    }
}

impl SimState {
    fn record(&mut self, op: String) {
        info!(op = %op, "sim cloud call");
        self.ops.push(op);
    }

    fn maybe_fail(&mut self, op: &str) -> CloudResult<()> {
        if let Some(remaining) = self.fail_invalid.get_mut(op) {
            if *remaining > 0 {
                *remaining -= 1;
                self.record(format!("{} (injected failure)", op));
                return Err(CloudError::InvalidParameter(format!(
                    "injected transient failure for {}",
                    op
                )));
            }
        }
        Ok(())
    }

    fn next_private_ip(&mut self) -> String {
        self.ip_counter += 1;
        format!("10.0.1.{}", self.ip_counter)
    }

    fn next_public_ip(&mut self) -> String {
        self.ip_counter += 1;
        format!("54.200.0.{}", self.ip_counter)
    }
}

impl Compute for SimCloud {
    fn create_vpc(&self, cidr: &str) -> CloudResult<String> {
        let mut st = self.lock();
        st.maybe_fail("create_vpc")?;
        let id = resource_id("vpc");
        let main = resource_id("rtb");
        st.vpcs.insert(id.clone());
        st.main_route_tables.insert(id.clone(), main);
        st.record(format!("create_vpc {} {}", id, cidr));
        Ok(id)
    }

    fn main_route_table(&self, vpc_id: &str) -> CloudResult<String> {
        let mut st = self.lock();
        let main = st
            .main_route_tables
            .get(vpc_id)
            .cloned()
            .ok_or_else(|| CloudError::NotFound(format!("vpc {}", vpc_id)))?;
        st.record(format!("main_route_table {} -> {}", vpc_id, main));
        Ok(main)
    }

    fn create_subnet(
        &self,
        vpc_id: &str,
        cidr: &str,
        availability_zone: &str,
    ) -> CloudResult<String> {
        let mut st = self.lock();
        st.maybe_fail("create_subnet")?;
        if !st.vpcs.contains(vpc_id) {
            return Err(CloudError::NotFound(format!("vpc {}", vpc_id)));
        }
        let id = resource_id("subnet");
        st.subnets.insert(id.clone(), vpc_id.to_string());
        st.record(format!(
            "create_subnet {} {} {} {}",
            id, vpc_id, cidr, availability_zone
        ));
        Ok(id)
    }

    fn create_route_table(&self, vpc_id: &str) -> CloudResult<String> {
        let mut st = self.lock();
        st.maybe_fail("create_route_table")?;
        let id = resource_id("rtb");
        st.route_tables.insert(id.clone(), vpc_id.to_string());
        st.record(format!("create_route_table {} {}", id, vpc_id));
        Ok(id)
    }

    fn associate_route_table(&self, route_table_id: &str, subnet_id: &str) -> CloudResult<String> {
        let mut st = self.lock();
        let id = resource_id("rtbassoc");
        st.record(format!(
            "associate_route_table {} {} -> {}",
            route_table_id, subnet_id, id
        ));
        Ok(id)
    }

    fn create_internet_gateway(&self) -> CloudResult<String> {
        let mut st = self.lock();
        let id = resource_id("igw");
        st.gateways.insert(id.clone());
        st.record(format!("create_internet_gateway {}", id));
        Ok(id)
    }

    fn attach_internet_gateway(&self, gateway_id: &str, vpc_id: &str) -> CloudResult<()> {
        let mut st = self.lock();
        st.record(format!("attach_internet_gateway {} {}", gateway_id, vpc_id));
        Ok(())
    }

    fn create_gateway_route(
        &self,
        route_table_id: &str,
        dest_cidr: &str,
        gateway_id: &str,
    ) -> CloudResult<()> {
        let mut st = self.lock();
        st.record(format!(
            "create_gateway_route {} {} via {}",
            route_table_id, dest_cidr, gateway_id
        ));
        Ok(())
    }

    fn allocate_address(&self) -> CloudResult<String> {
        let mut st = self.lock();
        let id = resource_id("eipalloc");
        st.allocations.insert(id.clone());
        st.record(format!("allocate_address {}", id));
        Ok(id)
    }

    fn create_nat_gateway(
        &self,
        subnet_id: &str,
        allocation_id: &str,
        client_token: &str,
    ) -> CloudResult<String> {
        let mut st = self.lock();
        st.maybe_fail("create_nat_gateway")?;
        let id = resource_id("nat");
        let polls = st.nat_polls_required;
        st.nat_gateways.insert(id.clone(), polls);
        st.record(format!(
            "create_nat_gateway {} {} {} token={}",
            id, subnet_id, allocation_id, client_token
        ));
        Ok(id)
    }

    fn nat_gateway_available(&self, nat_gateway_id: &str) -> CloudResult<bool> {
        let mut st = self.lock();
        let remaining = st
            .nat_gateways
            .get_mut(nat_gateway_id)
            .ok_or_else(|| CloudError::NotFound(format!("nat gateway {}", nat_gateway_id)))?;
        let available = if *remaining <= 1 {
            *remaining = 0;
            true
        } else {
            *remaining -= 1;
            false
        };
        st.record(format!(
            "nat_gateway_available {} -> {}",
            nat_gateway_id, available
        ));
        Ok(available)
    }

    fn create_nat_route(
        &self,
        route_table_id: &str,
        dest_cidr: &str,
        nat_gateway_id: &str,
    ) -> CloudResult<()> {
        let mut st = self.lock();
        st.record(format!(
            "create_nat_route {} {} via {}",
            route_table_id, dest_cidr, nat_gateway_id
        ));
        Ok(())
    }

    fn create_security_group(
        &self,
        vpc_id: &str,
        name: &str,
        description: &str,
    ) -> CloudResult<String> {
        let mut st = self.lock();
        st.maybe_fail("create_security_group")?;
        if st
            .groups
            .values()
            .any(|g| g.vpc_id == vpc_id && g.name == name)
        {
            return Err(CloudError::AlreadyExists(format!("security group {}", name)));
        }
        let id = resource_id("sg");
        st.groups.insert(
            id.clone(),
            SimGroup {
                vpc_id: vpc_id.to_string(),
                name: name.to_string(),
                rules: Vec::new(),
            },
        );
        st.record(format!(
            "create_security_group {} {} {:?}",
            id, name, description
        ));
        Ok(id)
    }

    fn authorize_ingress(&self, group_id: &str, rules: &[IngressRule]) -> CloudResult<()> {
        let mut st = self.lock();
        let group = st
            .groups
            .get_mut(group_id)
            .ok_or_else(|| CloudError::NotFound(format!("security group {}", group_id)))?;
        group.rules.extend_from_slice(rules);
        st.record(format!(
            "authorize_ingress {} ({} rules)",
            group_id,
            rules.len()
        ));
        Ok(())
    }

    fn tag(&self, resource_id: &str, key: &str, value: &str) -> CloudResult<()> {
        let mut st = self.lock();
        st.tags
            .entry(resource_id.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());
        st.record(format!("tag {} {}={}", resource_id, key, value));
        Ok(())
    }

    fn run_instance(&self, req: &LaunchRequest) -> CloudResult<LaunchReservation> {
        let mut st = self.lock();
        st.maybe_fail("run_instance")?;
        let instance_id = resource_id("i");
        let interface_id = resource_id("eni");
        let private_ip = req
            .interface
            .private_ip
            .clone()
            .unwrap_or_else(|| st.next_private_ip());
        let public_ip = if req.interface.associate_public_ip {
            Some(st.next_public_ip())
        } else {
            None
        };
        st.interfaces.insert(
            interface_id.clone(),
            SimInterface {
                private_ip: Some(private_ip),
                public_ip,
            },
        );
        st.instances.insert(
            instance_id.clone(),
            SimInstance {
                request: req.clone(),
                interface_id: interface_id.clone(),
                source_dest_check: true,
            },
        );
        st.launch_order.push(instance_id.clone());
        st.record(format!(
            "run_instance {} {} {} subnet={}",
            instance_id, req.instance_type, req.image_id, req.interface.subnet_id
        ));
        Ok(LaunchReservation {
            instance_id,
            interface_id,
        })
    }

    fn set_source_dest_check(&self, instance_id: &str, enabled: bool) -> CloudResult<()> {
        let mut st = self.lock();
        let instance = st
            .instances
            .get_mut(instance_id)
            .ok_or_else(|| CloudError::NotFound(format!("instance {}", instance_id)))?;
        instance.source_dest_check = enabled;
        st.record(format!("set_source_dest_check {} {}", instance_id, enabled));
        Ok(())
    }

    fn instance_running(&self, instance_id: &str) -> CloudResult<bool> {
        let mut st = self.lock();
        let known = st.instances.contains_key(instance_id);
        st.record(format!("instance_running {} -> {}", instance_id, known));
        if known {
            Ok(true)
        } else {
            Err(CloudError::NotFound(format!("instance {}", instance_id)))
        }
    }

    fn associate_address(&self, allocation_id: &str, interface_id: &str) -> CloudResult<String> {
        let mut st = self.lock();
        if !st.allocations.contains(allocation_id) {
            return Err(CloudError::NotFound(format!("allocation {}", allocation_id)));
        }
        let public = st.next_public_ip();
        let iface = st
            .interfaces
            .get_mut(interface_id)
            .ok_or_else(|| CloudError::NotFound(format!("interface {}", interface_id)))?;
        iface.public_ip = Some(public);
        let id = resource_id("eipassoc");
        st.record(format!(
            "associate_address {} {} -> {}",
            allocation_id, interface_id, id
        ));
        Ok(id)
    }

    fn interface_addresses(&self, interface_id: &str) -> CloudResult<InterfaceAddresses> {
        let mut st = self.lock();
        let iface = st
            .interfaces
            .get(interface_id)
            .cloned()
            .ok_or_else(|| CloudError::NotFound(format!("interface {}", interface_id)))?;
        st.record(format!("interface_addresses {}", interface_id));
        Ok(InterfaceAddresses {
            private_ip: iface.private_ip,
            public_ip: iface.public_ip,
        })
    }
}

impl Identity for SimCloud {
    fn find_policy(&self, path: &str, name: &str) -> CloudResult<Option<String>> {
        let mut st = self.lock();
        let arn = st.policies.get(&format!("{}{}", path, name)).cloned();
        st.record(format!("find_policy {}{} -> {}", path, name, arn.is_some()));
        Ok(arn)
    }

    fn create_policy(
        &self,
        path: &str,
        name: &str,
        _document: &str,
        _description: &str,
    ) -> CloudResult<String> {
        let mut st = self.lock();
        let key = format!("{}{}", path, name);
        if st.policies.contains_key(&key) {
            return Err(CloudError::AlreadyExists(format!("policy {}", key)));
        }
        let arn = format!("arn:sim:iam::policy{}{}", path, name);
        st.policies.insert(key.clone(), arn.clone());
        st.record(format!("create_policy {}", key));
        Ok(arn)
    }

    fn create_role(&self, path: &str, name: &str, _trust_policy: &str) -> CloudResult<Creation> {
        let mut st = self.lock();
        if !st.roles.insert(name.to_string()) {
            st.record(format!("create_role {}{} (exists)", path, name));
            return Ok(Creation::AlreadyExists);
        }
        let id = resource_id("role");
        st.record(format!("create_role {}{} -> {}", path, name, id));
        Ok(Creation::Created(id))
    }

    fn create_instance_profile(&self, path: &str, name: &str) -> CloudResult<Creation> {
        let mut st = self.lock();
        if !st.profiles.insert(name.to_string()) {
            st.record(format!("create_instance_profile {}{} (exists)", path, name));
            return Ok(Creation::AlreadyExists);
        }
        let id = resource_id("profile");
        st.record(format!("create_instance_profile {}{} -> {}", path, name, id));
        Ok(Creation::Created(id))
    }

    fn instance_profile_exists(&self, name: &str) -> CloudResult<bool> {
        let mut st = self.lock();
        let exists = st.profiles.contains(name);
        st.record(format!("instance_profile_exists {} -> {}", name, exists));
        Ok(exists)
    }

    fn attach_role_policy(&self, role: &str, policy_arn: &str) -> CloudResult<()> {
        let mut st = self.lock();
        st.role_policies
            .insert((role.to_string(), policy_arn.to_string()));
        st.record(format!("attach_role_policy {} {}", role, policy_arn));
        Ok(())
    }

    fn add_role_to_profile(&self, profile: &str, role: &str) -> CloudResult<Creation> {
        let mut st = self.lock();
        if !st
            .profile_roles
            .insert((profile.to_string(), role.to_string()))
        {
            st.record(format!("add_role_to_profile {} {} (exists)", profile, role));
            return Ok(Creation::AlreadyExists);
        }
        st.record(format!("add_role_to_profile {} {}", profile, role));
        Ok(Creation::Created(profile.to_string()))
    }
}

impl Balancer for SimCloud {
    fn register_instance(&self, balancer_name: &str, instance_id: &str) -> CloudResult<()> {
        let mut st = self.lock();
        st.registrations
            .push((balancer_name.to_string(), instance_id.to_string()));
        st.record(format!("register_instance {} {}", balancer_name, instance_id));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::InterfaceSpec;

    fn launch_request(subnet: &str) -> LaunchRequest {
        LaunchRequest {
            image_id: "img-123".to_string(),
            instance_type: "m4.large".to_string(),
            key_pair: "ops".to_string(),
            availability_zone: "us-east-1a".to_string(),
            iam_profile: "worker".to_string(),
            user_data: "cGF5bG9hZA==".to_string(),
            interface: InterfaceSpec {
                subnet_id: subnet.to_string(),
                security_groups: vec!["sg-1".to_string()],
                private_ip: None,
                associate_public_ip: false,
            },
        }
    }

    #[test]
    fn test_vpc_and_subnet_lifecycle() {
        let cloud = SimCloud::new();
        let vpc = cloud.create_vpc("10.0.0.0/16").unwrap();
        assert!(vpc.starts_with("vpc-"));
        let main = cloud.main_route_table(&vpc).unwrap();
        assert!(main.starts_with("rtb-"));
        let subnet = cloud.create_subnet(&vpc, "10.0.1.0/24", "us-east-1a").unwrap();
        assert!(subnet.starts_with("subnet-"));
        assert!(cloud.create_subnet("vpc-nope", "10.0.2.0/24", "us-east-1a").is_err());
    }

    #[test]
    fn test_nat_gateway_polls() {
        let cloud = SimCloud::new();
        cloud.set_nat_polls_required(3);
        let vpc = cloud.create_vpc("10.0.0.0/16").unwrap();
        let subnet = cloud.create_subnet(&vpc, "10.0.2.0/24", "us-east-1a").unwrap();
        let alloc = cloud.allocate_address().unwrap();
        let nat = cloud.create_nat_gateway(&subnet, &alloc, "example.com").unwrap();
        assert!(!cloud.nat_gateway_available(&nat).unwrap());
        assert!(!cloud.nat_gateway_available(&nat).unwrap());
        assert!(cloud.nat_gateway_available(&nat).unwrap());
        assert!(cloud.nat_gateway_available(&nat).unwrap());
    }

    #[test]
    fn test_identity_conflicts_as_creation_outcome() {
        let cloud = SimCloud::new();
        let first = cloud.create_role("/strato/", "master", "{}").unwrap();
        assert!(matches!(first, Creation::Created(_)));
        let second = cloud.create_role("/strato/", "master", "{}").unwrap();
        assert_eq!(second, Creation::AlreadyExists);

        assert!(matches!(
            cloud.create_instance_profile("/strato/", "master").unwrap(),
            Creation::Created(_)
        ));
        assert_eq!(
            cloud.create_instance_profile("/strato/", "master").unwrap(),
            Creation::AlreadyExists
        );
        assert!(cloud.instance_profile_exists("master").unwrap());
        assert!(!cloud.instance_profile_exists("edge").unwrap());
    }

    #[test]
    fn test_injected_transient_failures_then_success() {
        let cloud = SimCloud::new();
        cloud.fail_invalid_parameter("run_instance", 2);
        let req = launch_request("subnet-1");
        assert!(matches!(
            cloud.run_instance(&req),
            Err(CloudError::InvalidParameter(_))
        ));
        assert!(matches!(
            cloud.run_instance(&req),
            Err(CloudError::InvalidParameter(_))
        ));
        let res = cloud.run_instance(&req).unwrap();
        assert!(res.instance_id.starts_with("i-"));
        assert!(res.interface_id.starts_with("eni-"));
    }

    #[test]
    fn test_interface_addresses_and_association() {
        let cloud = SimCloud::new();
        let mut req = launch_request("subnet-1");
        req.interface.private_ip = Some("10.0.1.50".to_string());
        let res = cloud.run_instance(&req).unwrap();
        let addrs = cloud.interface_addresses(&res.interface_id).unwrap();
        assert_eq!(addrs.private_ip.as_deref(), Some("10.0.1.50"));
        assert!(addrs.public_ip.is_none());

        let alloc = cloud.allocate_address().unwrap();
        cloud.associate_address(&alloc, &res.interface_id).unwrap();
        let addrs = cloud.interface_addresses(&res.interface_id).unwrap();
        assert!(addrs.public_ip.is_some());
    }

    #[test]
    fn test_op_log_ordering() {
        let cloud = SimCloud::new();
        let vpc = cloud.create_vpc("10.0.0.0/16").unwrap();
        cloud.create_subnet(&vpc, "10.0.1.0/24", "us-east-1a").unwrap();
        assert!(cloud.op_index("create_vpc").unwrap() < cloud.op_index("create_subnet").unwrap());
        assert_eq!(cloud.op_count("create_subnet"), 1);
    }

    #[test]
    fn test_group_rules_recorded() {
        let cloud = SimCloud::new();
        let vpc = cloud.create_vpc("10.0.0.0/16").unwrap();
        let sg = cloud.create_security_group(&vpc, "edge", "demo edge").unwrap();
        cloud
            .authorize_ingress(&sg, &[IngressRule::tcp_public(443)])
            .unwrap();
        let rules = cloud.group_rules(&sg);
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].port_range, Some((443, 443)));
        // Same name in same VPC is a conflict.
        assert!(matches!(
            cloud.create_security_group(&vpc, "edge", "again"),
            Err(CloudError::AlreadyExists(_))
        ));
    }
}
