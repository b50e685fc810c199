use std::io::Read;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing::info;

use strato_cloud::SimCloud;
use strato_core::cluster::{ClusterState, Role};
use strato_provision::{AddRequest, ClusterOrchestrator, LaunchSpec, PublicIpPolicy};
use strato_state::FileStore;

use crate::logging::{self, LogFormat};

#[derive(Parser)]
#[command(
    name = "stratoctl",
    version,
    about = "Staged cluster provisioner for cloud IaaS"
)]
struct Cli {
    /// Log output format: text, json
    #[arg(long, global = true, default_value = "text")]
    log_format: String,

    /// Cloud provider backend (currently: sim)
    #[arg(long, global = true, default_value = "sim")]
    provider: String,

    /// Directory holding cluster state files (default: ~/.strato)
    #[arg(long, global = true)]
    state_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the network and trust fabric for a new cluster
    Setup {
        #[arg(long)]
        cluster_id: String,
        /// DNS domain the cluster lives under; also the VPC name tag
        #[arg(long)]
        domain: String,
        #[arg(long)]
        region: String,
        /// Availability zone suffix (e.g. "a")
        #[arg(long)]
        zone: String,
        #[arg(long)]
        vpc_cidr_block: String,
        #[arg(long)]
        internal_subnet_cidr: String,
        #[arg(long)]
        external_subnet_cidr: String,
    },

    /// Provision the fabric and launch every node of the cluster
    Deploy {
        #[arg(long)]
        cluster_id: String,
        #[arg(long)]
        domain: String,
        #[arg(long)]
        region: String,
        #[arg(long)]
        zone: String,
        #[arg(long)]
        vpc_cidr_block: String,
        #[arg(long)]
        internal_subnet_cidr: String,
        #[arg(long)]
        external_subnet_cidr: String,
        #[arg(long, default_value_t = 0)]
        master_count: u32,
        #[arg(long, default_value_t = 0)]
        worker_count: u32,
        #[arg(long, default_value_t = 0)]
        edge_count: u32,
        #[arg(long, default_value = "m4.large")]
        master_type: String,
        #[arg(long, default_value = "c4.xlarge")]
        worker_type: String,
        #[arg(long, default_value = "t2.small")]
        edge_type: String,
        /// Base-image release channel
        #[arg(long, default_value = "stable")]
        channel: String,
        #[arg(long)]
        key_pair: String,
        /// Bootstrap token, or "auto" to request one from the token service
        #[arg(long, default_value = "auto")]
        bootstrap_token: String,
        /// Path to a CA certificate to install on every node
        #[arg(long)]
        ca_cert: Option<PathBuf>,
        /// Skip image resolution and use this image id
        #[arg(long)]
        image_id: Option<String>,
        #[arg(long, default_value = "10.128.0.0/21")]
        overlay_network: String,
        #[arg(long, default_value = "27")]
        overlay_subnet_len: String,
        #[arg(long, default_value = "10.128.0.192")]
        overlay_subnet_min: String,
        #[arg(long, default_value = "10.128.7.224")]
        overlay_subnet_max: String,
        /// Overlay backend: vxlan, udp, host-gw (host-gw disables the
        /// instance source/dest check)
        #[arg(long, default_value = "vxlan")]
        overlay_backend: String,
    },

    /// Add one node to an existing cluster
    Add {
        #[arg(long)]
        cluster_id: String,
        /// Node role: master, worker, edge
        #[arg(long)]
        role: String,
        #[arg(long)]
        host_id: u32,
        /// Skip image resolution and use this image id
        #[arg(long)]
        image_id: Option<String>,
        /// Gzip the bootstrap payload
        #[arg(long)]
        gzip_payload: bool,
    },

    /// Launch one instance from an explicit spec; reads the bootstrap
    /// payload from stdin and prints the discovered addresses as JSON
    Run {
        #[arg(long)]
        region: String,
        #[arg(long)]
        zone: String,
        #[arg(long)]
        key_pair: String,
        #[arg(long)]
        subnet_id: String,
        /// Comma-separated security group ids
        #[arg(long)]
        security_group_ids: String,
        #[arg(long)]
        instance_type: String,
        /// Hostname; also the instance Name tag
        #[arg(long)]
        hostname: String,
        /// Public IP policy: true, false, elastic
        #[arg(long, default_value = "false")]
        public_ip: String,
        /// IAM instance profile name
        #[arg(long)]
        iam_role: String,
        /// Apply the source/dest check: true, false
        #[arg(long, default_value = "true")]
        source_dest_check: String,
        #[arg(long)]
        image_id: String,
        /// Register the instance with this load balancer
        #[arg(long)]
        elb_name: Option<String>,
        /// Static private address for the primary interface
        #[arg(long)]
        private_ip: Option<String>,
    },
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    logging::init(LogFormat::from_str(&cli.log_format)?);

    if cli.provider != "sim" {
        bail!(
            "Unknown provider {:?}; only the simulated provider is built in, \
             vendor adapters plug in through the strato-cloud traits",
            cli.provider
        );
    }
    let cloud = SimCloud::new();
    let store = FileStore::new(
        cli.state_dir
            .clone()
            .unwrap_or_else(FileStore::default_dir),
    );
    let orchestrator = ClusterOrchestrator::new(&cloud, &store);

    match cli.command {
        Commands::Setup {
            cluster_id,
            domain,
            region,
            zone,
            vpc_cidr_block,
            internal_subnet_cidr,
            external_subnet_cidr,
        } => {
            let intent = ClusterState {
                cluster_id,
                domain,
                region,
                zone,
                vpc_cidr: vpc_cidr_block,
                int_subnet_cidr: internal_subnet_cidr,
                ext_subnet_cidr: external_subnet_cidr,
                ..Default::default()
            };
            let state = orchestrator.setup(&intent)?;
            info!(cluster_id = %state.cluster_id, "Setup complete");
        }

        Commands::Deploy {
            cluster_id,
            domain,
            region,
            zone,
            vpc_cidr_block,
            internal_subnet_cidr,
            external_subnet_cidr,
            master_count,
            worker_count,
            edge_count,
            master_type,
            worker_type,
            edge_type,
            channel,
            key_pair,
            bootstrap_token,
            ca_cert,
            image_id,
            overlay_network,
            overlay_subnet_len,
            overlay_subnet_min,
            overlay_subnet_max,
            overlay_backend,
        } => {
            let ca_cert = match ca_cert {
                Some(path) => std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read CA certificate {}", path.display()))?,
                None => String::new(),
            };
            let intent = ClusterState {
                cluster_id,
                domain,
                region,
                zone,
                vpc_cidr: vpc_cidr_block,
                int_subnet_cidr: internal_subnet_cidr,
                ext_subnet_cidr: external_subnet_cidr,
                master_count,
                worker_count,
                edge_count,
                master_type,
                worker_type,
                edge_type,
                channel,
                key_pair,
                bootstrap_token,
                ca_cert,
                overlay_network,
                overlay_subnet_len,
                overlay_subnet_min,
                overlay_subnet_max,
                overlay_backend,
                image_id,
                ..Default::default()
            };
            let state = orchestrator.deploy(&intent)?;
            info!(cluster_id = %state.cluster_id, "Deploy complete");
        }

        Commands::Add {
            cluster_id,
            role,
            host_id,
            image_id,
            gzip_payload,
        } => {
            let request = AddRequest {
                cluster_id,
                role: Role::from_str(&role)?,
                host_id,
                image_id,
                gzip_payload,
            };
            let output = orchestrator.add(&request)?;
            println!("{}", output.addresses_json());
        }

        Commands::Run {
            region,
            zone,
            key_pair,
            subnet_id,
            security_group_ids,
            instance_type,
            hostname,
            public_ip,
            iam_role,
            source_dest_check,
            image_id,
            elb_name,
            private_ip,
        } => {
            let spec = LaunchSpec {
                hostname,
                region,
                zone,
                image_id,
                instance_type,
                key_pair,
                subnet_id,
                security_groups: security_group_ids
                    .split(',')
                    .map(|g| g.trim().to_string())
                    .filter(|g| !g.is_empty())
                    .collect(),
                iam_profile: iam_role,
                public_ip: PublicIpPolicy::from_str(&public_ip)?,
                private_ip,
                source_dest_check: source_dest_check
                    .parse::<bool>()
                    .context("--source-dest-check expects true or false")?,
                balancer_name: elb_name,
            };

            // The bootstrap payload arrives on stdin: phase one of the
            // node pipeline pipes its output straight into this phase.
            let mut payload = Vec::new();
            std::io::stdin()
                .read_to_end(&mut payload)
                .context("Failed to read bootstrap payload from stdin")?;

            let output = orchestrator.run(&spec, &payload)?;
            println!("{}", output.addresses_json());
        }
    }

    Ok(())
}
