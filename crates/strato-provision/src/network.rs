use anyhow::Result;
use tracing::info;

use strato_cloud::Compute;
use strato_core::cluster::ClusterState;
use strato_core::retry::poll_until;

use crate::budgets::Budgets;

/// Every route reaches the world.
const DEFAULT_ROUTE: &str = "0.0.0.0/0";

/// Network identifiers discovered by [`NetworkProvisioner::provision`].
/// Applied to cluster state as one disjoint ownership group: no other
/// provisioner writes these fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkFacts {
    pub main_route_table_id: String,
    pub route_table_id: String,
    pub inet_gateway_id: String,
    pub nat_gateway_id: String,
    pub allocation_id: String,
    pub int_subnet_id: String,
    pub ext_subnet_id: String,
}

impl NetworkFacts {
    pub fn apply(&self, state: &mut ClusterState) {
        state.main_route_table_id = Some(self.main_route_table_id.clone());
        state.route_table_id = Some(self.route_table_id.clone());
        state.inet_gateway_id = Some(self.inet_gateway_id.clone());
        state.nat_gateway_id = Some(self.nat_gateway_id.clone());
        state.allocation_id = Some(self.allocation_id.clone());
        state.int_subnet_id = Some(self.int_subnet_id.clone());
        state.ext_subnet_id = Some(self.ext_subnet_id.clone());
    }
}

/// Builds the VPC network fabric in strict dependency order: each step
/// requires the previous step's discovered id, and a failed step aborts
/// the whole provisioner with no compensating teardown.
pub struct NetworkProvisioner<'a, C: Compute> {
    cloud: &'a C,
    budgets: &'a Budgets,
}

impl<'a, C: Compute> NetworkProvisioner<'a, C> {
    pub fn new(cloud: &'a C, budgets: &'a Budgets) -> Self {
        NetworkProvisioner { cloud, budgets }
    }

    /// Create and tag the VPC. Runs serially before everything else:
    /// the VPC id is the one discovered fact the concurrent setup tasks
    /// all depend on.
    pub fn create_vpc(&self, cidr: &str, domain: &str) -> Result<String> {
        let vpc_id = self.cloud.create_vpc(cidr)?;
        info!(id = %vpc_id, "New VPC created");
        self.cloud.tag(&vpc_id, "Name", domain)?;
        Ok(vpc_id)
    }

    /// Steps 2-7 of the network build: main route table discovery,
    /// subnets, dedicated route table, internet gateway + default
    /// route, NAT gateway + default route on the main table.
    pub fn provision(&self, intent: &ClusterState, vpc_id: &str) -> Result<NetworkFacts> {
        let az = intent.availability_zone();

        // The main route table exists implicitly with the VPC; its id
        // is needed before NAT routing can target it.
        let main_route_table_id = self.cloud.main_route_table(vpc_id)?;
        info!(id = %main_route_table_id, "Main route table discovered");

        let int_subnet_id = self.create_subnet(vpc_id, &intent.int_subnet_cidr, &az, "internal")?;
        let ext_subnet_id = self.create_subnet(vpc_id, &intent.ext_subnet_cidr, &az, "external")?;

        let route_table_id = self.cloud.create_route_table(vpc_id)?;
        info!(id = %route_table_id, "New route table added");

        let association_id = self
            .cloud
            .associate_route_table(&route_table_id, &ext_subnet_id)?;
        info!(id = %association_id, "New route table association");

        let inet_gateway_id = self.cloud.create_internet_gateway()?;
        info!(id = %inet_gateway_id, "New internet gateway");

        self.cloud.attach_internet_gateway(&inet_gateway_id, vpc_id)?;
        info!("Internet gateway attached to VPC");

        self.cloud
            .create_gateway_route(&route_table_id, DEFAULT_ROUTE, &inet_gateway_id)?;
        info!("New default route added via internet gateway");

        let allocation_id = self.cloud.allocate_address()?;
        info!(id = %allocation_id, "New elastic IP allocated");

        let nat_gateway_id =
            self.cloud
                .create_nat_gateway(&ext_subnet_id, &allocation_id, &intent.domain)?;
        info!(id = %nat_gateway_id, "New NAT gateway requested");

        poll_until(
            self.budgets.nat_poll_attempts,
            self.budgets.nat_poll_interval,
            "NAT gateway is available",
            || Ok(self.cloud.nat_gateway_available(&nat_gateway_id)?),
        )?;

        // Internal subnet egress goes through NAT via the main table.
        self.cloud
            .create_nat_route(&main_route_table_id, DEFAULT_ROUTE, &nat_gateway_id)?;
        info!("New default route added via NAT gateway");

        Ok(NetworkFacts {
            main_route_table_id,
            route_table_id,
            inet_gateway_id,
            nat_gateway_id,
            allocation_id,
            int_subnet_id,
            ext_subnet_id,
        })
    }

    fn create_subnet(&self, vpc_id: &str, cidr: &str, az: &str, name: &str) -> Result<String> {
        let subnet_id = self.cloud.create_subnet(vpc_id, cidr, az)?;
        info!(id = %subnet_id, "New {} subnet", name);
        self.cloud.tag(&subnet_id, "Name", name)?;
        Ok(subnet_id)
    }
}
