use anyhow::{Context, Result};
use tracing::info;

use strato_cloud::CloudApi;
use strato_core::cluster::{ClusterState, Role};
use strato_core::naming;
use strato_core::task::{join3, join_all};
use strato_state::StateStore;

use crate::budgets::Budgets;
use crate::firewall::FirewallProvisioner;
use crate::launcher::{InstanceLauncher, LaunchOutput, LaunchSpec, PublicIpPolicy};
use crate::network::NetworkProvisioner;
use crate::payload;
use crate::resolve;
use crate::security::SecurityProvisioner;

/// Parameters for adding one node to an existing cluster.
#[derive(Debug, Clone)]
pub struct AddRequest {
    pub cluster_id: String,
    pub role: Role,
    pub host_id: u32,
    /// Overrides image resolution when supplied (deploy passes the id
    /// it already resolved so each node skips the manifest fetch).
    pub image_id: Option<String>,
    pub gzip_payload: bool,
}

/// Sequences the provisioners into the four public operations.
///
/// Stages communicate only through the persisted cluster state: setup
/// and deploy write it, add loads it, run needs none of it. Concurrent
/// tasks within a stage write disjoint state fields (network, IAM, and
/// firewall facts are separate structs merged after the join), so no
/// lock is taken on the shared record.
pub struct ClusterOrchestrator<'a, C: CloudApi, S: StateStore> {
    cloud: &'a C,
    store: &'a S,
    budgets: Budgets,
}

impl<'a, C: CloudApi, S: StateStore> ClusterOrchestrator<'a, C, S> {
    pub fn new(cloud: &'a C, store: &'a S) -> Self {
        ClusterOrchestrator {
            cloud,
            store,
            budgets: Budgets::default(),
        }
    }

    pub fn with_budgets(mut self, budgets: Budgets) -> Self {
        self.budgets = budgets;
        self
    }

    /// Build the network and trust fabric: VPC first (everything needs
    /// its id), then network, IAM, and firewall concurrently. Persists
    /// the merged state before returning.
    pub fn setup(&self, intent: &ClusterState) -> Result<ClusterState> {
        info!(cluster_id = %intent.cluster_id, "Entering setup stage");
        naming::validate_cluster_id(&intent.cluster_id)?;

        let network = NetworkProvisioner::new(self.cloud, &self.budgets);
        let vpc_id = network.create_vpc(&intent.vpc_cidr, &intent.domain)?;

        let (net_facts, iam_facts, fw_facts) = join3(
            || network.provision(intent, &vpc_id),
            || SecurityProvisioner::new(self.cloud, &self.budgets).provision(),
            || FirewallProvisioner::new(self.cloud).provision(&vpc_id, &intent.domain),
        )?;

        let mut partial = intent.clone();
        partial.vpc_id = Some(vpc_id);
        net_facts.apply(&mut partial);
        iam_facts.apply(&mut partial);
        fw_facts.apply(&mut partial);

        // Load-then-merge keeps previously discovered ids on re-setup:
        // the cloud reported "already exists" for them, so the fresh
        // partial has nothing better to offer.
        let state = self.store.load_merged(&intent.cluster_id, &partial)?;
        self.store.persist(&intent.cluster_id, &state)?;
        Ok(state)
    }

    /// Full cluster construction: fabric setup, token and image
    /// resolution concurrently, then per-role and per-instance node
    /// fan-out with an inner join per role and an outer join across
    /// roles.
    pub fn deploy(&self, intent: &ClusterState) -> Result<ClusterState> {
        info!(cluster_id = %intent.cluster_id, "Entering deploy stage");

        let (setup_state, token, image_id) = join3(
            || self.setup(intent),
            || resolve::resolve_token(&intent.bootstrap_token, intent.master_count),
            || match &intent.image_id {
                Some(id) => Ok(id.clone()),
                None => resolve::resolve_image(&intent.channel, &intent.region),
            },
        )?;

        let mut state = intent.clone();
        state.bootstrap_token = token;
        state.image_id = Some(image_id);
        state.merge(&setup_state);
        self.store.persist(&state.cluster_id, &state)?;

        let roles: Vec<Role> = Role::ALL
            .into_iter()
            .filter(|role| state.node_count(*role) > 0)
            .collect();
        let state_ref = &state;
        let tasks: Vec<_> = roles
            .iter()
            .map(|role| {
                let role = *role;
                move || self.deploy_role(state_ref, role)
            })
            .collect();
        let deployed: usize = join_all(tasks)?.iter().map(Vec::len).sum();
        info!(cluster_id = %state.cluster_id, nodes = deployed, "Deploy complete");

        Ok(state)
    }

    fn deploy_role(&self, state: &ClusterState, role: Role) -> Result<Vec<LaunchOutput>> {
        let count = state.node_count(role);
        info!(role = %role, count, "Deploying {} nodes", role);

        let tasks: Vec<_> = (1..=count)
            .map(|host_id| {
                let request = AddRequest {
                    cluster_id: state.cluster_id.clone(),
                    role,
                    host_id,
                    image_id: state.image_id.clone(),
                    gzip_payload: true,
                };
                move || self.add(&request)
            })
            .collect();
        join_all(tasks)
    }

    /// Add one node: load persisted state, derive role parameters, then
    /// run the two-phase pipeline — build the bootstrap payload, launch
    /// with it. The payload is the only thing phase one hands to phase
    /// two.
    pub fn add(&self, request: &AddRequest) -> Result<LaunchOutput> {
        let role = request.role;
        info!(cluster_id = %request.cluster_id, role = %role, host_id = request.host_id, "Adding node");

        let state = self.store.load(&request.cluster_id)?;

        let image_id = match request.image_id.clone().or_else(|| state.image_id.clone()) {
            Some(id) => id,
            None => resolve::resolve_image(&state.channel, &state.region)?,
        };

        let subnet_id = state
            .subnet_id(role)
            .with_context(|| format!("No subnet provisioned for role {}; run setup first", role))?
            .to_string();
        let security_group = state
            .security_group(role)
            .with_context(|| {
                format!("No security group provisioned for role {}; run setup first", role)
            })?
            .to_string();

        let spec = LaunchSpec {
            hostname: naming::node_hostname(role, request.host_id, &state.domain),
            region: state.region.clone(),
            zone: state.zone.clone(),
            image_id,
            instance_type: state.instance_type(role).to_string(),
            key_pair: state.key_pair.clone(),
            subnet_id,
            security_groups: vec![security_group],
            iam_profile: role.to_string(),
            public_ip: match role {
                Role::Master => PublicIpPolicy::Disabled,
                Role::Worker | Role::Edge => PublicIpPolicy::AutoAssign,
            },
            private_ip: None,
            source_dest_check: state.source_dest_check(),
            balancer_name: None,
        };

        let payload = payload::build(&state, role, request.host_id, request.gzip_payload)?;
        self.run(&spec, &payload)
    }

    /// Execute the launch protocol for one instance spec and payload.
    pub fn run(&self, spec: &LaunchSpec, payload: &[u8]) -> Result<LaunchOutput> {
        InstanceLauncher::new(self.cloud, &self.budgets).launch(spec, payload)
    }
}
