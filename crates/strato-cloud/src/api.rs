use crate::error::CloudResult;
use crate::types::{
    Creation, IngressRule, InterfaceAddresses, LaunchRequest, LaunchReservation,
};

/// Compute-service operations: networking fabric, firewall groups, and
/// instance launch. Every call is a blocking round trip; availability
/// checks are plain predicates so callers own the polling discipline.
pub trait Compute: Send + Sync {
    fn create_vpc(&self, cidr: &str) -> CloudResult<String>;

    /// Id of the VPC's implicit main route table.
    fn main_route_table(&self, vpc_id: &str) -> CloudResult<String>;

    fn create_subnet(&self, vpc_id: &str, cidr: &str, availability_zone: &str)
    -> CloudResult<String>;

    fn create_route_table(&self, vpc_id: &str) -> CloudResult<String>;

    /// Returns the association id.
    fn associate_route_table(&self, route_table_id: &str, subnet_id: &str) -> CloudResult<String>;

    fn create_internet_gateway(&self) -> CloudResult<String>;

    fn attach_internet_gateway(&self, gateway_id: &str, vpc_id: &str) -> CloudResult<()>;

    /// Route `dest_cidr` on `route_table_id` via an internet gateway.
    fn create_gateway_route(
        &self,
        route_table_id: &str,
        dest_cidr: &str,
        gateway_id: &str,
    ) -> CloudResult<()>;

    /// Allocate an elastic IP; returns the allocation id.
    fn allocate_address(&self) -> CloudResult<String>;

    fn create_nat_gateway(
        &self,
        subnet_id: &str,
        allocation_id: &str,
        client_token: &str,
    ) -> CloudResult<String>;

    /// Whether the NAT gateway has reached the available state.
    fn nat_gateway_available(&self, nat_gateway_id: &str) -> CloudResult<bool>;

    /// Route `dest_cidr` on `route_table_id` via a NAT gateway.
    fn create_nat_route(
        &self,
        route_table_id: &str,
        dest_cidr: &str,
        nat_gateway_id: &str,
    ) -> CloudResult<()>;

    fn create_security_group(
        &self,
        vpc_id: &str,
        name: &str,
        description: &str,
    ) -> CloudResult<String>;

    fn authorize_ingress(&self, group_id: &str, rules: &[IngressRule]) -> CloudResult<()>;

    /// Tag any resource with a key/value pair.
    fn tag(&self, resource_id: &str, key: &str, value: &str) -> CloudResult<()>;

    fn run_instance(&self, req: &LaunchRequest) -> CloudResult<LaunchReservation>;

    fn set_source_dest_check(&self, instance_id: &str, enabled: bool) -> CloudResult<()>;

    /// Whether the instance has reached the running state.
    fn instance_running(&self, instance_id: &str) -> CloudResult<bool>;

    /// Associate an allocated address with a network interface,
    /// reassociation allowed. Returns the association id.
    fn associate_address(&self, allocation_id: &str, interface_id: &str) -> CloudResult<String>;

    fn interface_addresses(&self, interface_id: &str) -> CloudResult<InterfaceAddresses>;
}

/// Identity-service operations: roles, policies, instance profiles.
/// Creation calls are idempotent-on-conflict and return [`Creation`].
pub trait Identity: Send + Sync {
    /// Look up a customer-managed policy by path and name; returns its
    /// ARN if present.
    fn find_policy(&self, path: &str, name: &str) -> CloudResult<Option<String>>;

    /// Returns the new policy's ARN.
    fn create_policy(
        &self,
        path: &str,
        name: &str,
        document: &str,
        description: &str,
    ) -> CloudResult<String>;

    fn create_role(&self, path: &str, name: &str, trust_policy: &str) -> CloudResult<Creation>;

    fn create_instance_profile(&self, path: &str, name: &str) -> CloudResult<Creation>;

    /// Read-after-write visibility check for a just-created profile.
    fn instance_profile_exists(&self, name: &str) -> CloudResult<bool>;

    fn attach_role_policy(&self, role: &str, policy_arn: &str) -> CloudResult<()>;

    fn add_role_to_profile(&self, profile: &str, role: &str) -> CloudResult<Creation>;
}

/// Load-balancer operations.
pub trait Balancer: Send + Sync {
    fn register_instance(&self, balancer_name: &str, instance_id: &str) -> CloudResult<()>;
}

/// The full provider surface the orchestrator needs.
pub trait CloudApi: Compute + Identity + Balancer {}

impl<T: Compute + Identity + Balancer> CloudApi for T {}
