//! Scenario tests driving the library facade the way an embedding
//! would: simulated cloud, in-memory state store, full stages.

use stratoctl::cloud::SimCloud;
use stratoctl::core::cluster::{ClusterState, Role};
use stratoctl::provision::{AddRequest, Budgets, ClusterOrchestrator};
use stratoctl::state::{MemoryStore, StateStore};

fn intent() -> ClusterState {
    ClusterState {
        cluster_id: "cell-1".to_string(),
        domain: "cell-1.example.com".to_string(),
        region: "us-east-1".to_string(),
        zone: "a".to_string(),
        vpc_cidr: "10.0.0.0/16".to_string(),
        int_subnet_cidr: "10.0.1.0/24".to_string(),
        ext_subnet_cidr: "10.0.2.0/24".to_string(),
        master_count: 1,
        worker_count: 1,
        edge_count: 1,
        master_type: "m4.large".to_string(),
        worker_type: "c4.xlarge".to_string(),
        edge_type: "t2.small".to_string(),
        key_pair: "ops".to_string(),
        bootstrap_token: "tok-fixed".to_string(),
        overlay_backend: "vxlan".to_string(),
        image_id: Some("img-12345678".to_string()),
        ..Default::default()
    }
}

#[test]
fn test_full_cluster_deploy_scenario() {
    let cloud = SimCloud::new();
    let store = MemoryStore::new();
    let orchestrator = ClusterOrchestrator::new(&cloud, &store).with_budgets(Budgets::fast());

    let state = orchestrator.deploy(&intent()).unwrap();

    // One launch per node, with role-appropriate placement.
    let requests = cloud.launch_requests();
    assert_eq!(requests.len(), 3);
    let master = requests.iter().find(|r| r.iam_profile == "master").unwrap();
    let worker = requests.iter().find(|r| r.iam_profile == "worker").unwrap();
    let edge = requests.iter().find(|r| r.iam_profile == "edge").unwrap();

    assert_eq!(
        master.interface.subnet_id,
        state.int_subnet_id.clone().unwrap()
    );
    assert!(!master.interface.associate_public_ip);
    assert_eq!(
        worker.interface.subnet_id,
        state.ext_subnet_id.clone().unwrap()
    );
    assert!(worker.interface.associate_public_ip);
    assert_eq!(edge.interface.subnet_id, state.ext_subnet_id.clone().unwrap());

    // Payloads are distinct per node and gzip-compressed on deploy.
    assert_ne!(master.user_data, worker.user_data);

    // The dependency chain held: VPC before subnets, NAT available
    // before the NAT route, IAM profiles before any launch.
    let ops = cloud.ops();
    let vpc = ops.iter().position(|op| op.starts_with("create_vpc")).unwrap();
    let subnet = ops
        .iter()
        .position(|op| op.starts_with("create_subnet"))
        .unwrap();
    let nat_ok = ops
        .iter()
        .position(|op| op.starts_with("nat_gateway_available") && op.ends_with("true"))
        .unwrap();
    let nat_route = ops
        .iter()
        .position(|op| op.starts_with("create_nat_route"))
        .unwrap();
    let first_launch = ops
        .iter()
        .position(|op| op.starts_with("run_instance"))
        .unwrap();
    assert!(vpc < subnet);
    assert!(nat_ok < nat_route);
    assert!(nat_route < first_launch);
}

#[test]
fn test_resetup_is_idempotent_against_conflicts() {
    let cloud = SimCloud::new();
    let store = MemoryStore::new();
    let orchestrator = ClusterOrchestrator::new(&cloud, &store).with_budgets(Budgets::fast());

    let first = orchestrator.setup(&intent()).unwrap();
    // The second run sees "already exists" for roles, profiles, and
    // the volume policy; the persisted state must not change.
    let second = orchestrator.setup(&intent()).unwrap();
    assert_eq!(first, second);
    assert_eq!(store.load("cell-1").unwrap(), first);
    assert_eq!(cloud.op_count("create_policy"), 1);
}

#[test]
fn test_state_is_the_only_channel_between_stages() {
    let cloud = SimCloud::new();
    let store = MemoryStore::new();
    let orchestrator = ClusterOrchestrator::new(&cloud, &store).with_budgets(Budgets::fast());

    let state = orchestrator.setup(&intent()).unwrap();

    // A second orchestrator (fresh process in spirit) sees the first
    // one's effects purely through the store.
    let later = ClusterOrchestrator::new(&cloud, &store).with_budgets(Budgets::fast());
    let out = later
        .add(&AddRequest {
            cluster_id: "cell-1".to_string(),
            role: Role::Edge,
            host_id: 7,
            image_id: Some("img-12345678".to_string()),
            gzip_payload: false,
        })
        .unwrap();

    assert_eq!(
        cloud.tag_of(&out.instance_id, "Name").as_deref(),
        Some("edge-7.cell-1.example.com")
    );
    let req = cloud
        .launch_requests()
        .into_iter()
        .find(|r| r.iam_profile == "edge")
        .unwrap();
    assert_eq!(req.interface.subnet_id, state.ext_subnet_id.unwrap());
    assert_eq!(
        req.interface.security_groups,
        vec![state.edge_sec_grp.unwrap()]
    );
}

#[test]
fn test_edge_firewall_scenario() {
    let cloud = SimCloud::new();
    let store = MemoryStore::new();
    let orchestrator = ClusterOrchestrator::new(&cloud, &store).with_budgets(Budgets::fast());
    let state = orchestrator.setup(&intent()).unwrap();

    let rules = cloud.group_rules(state.edge_sec_grp.as_deref().unwrap());
    let mut tcp: Vec<u16> = rules
        .iter()
        .filter(|r| r.protocol == "tcp")
        .filter_map(|r| r.port_range.map(|(p, _)| p))
        .collect();
    tcp.sort_unstable();
    assert_eq!(tcp, vec![22, 80, 443]);
    assert_eq!(rules.iter().filter(|r| r.protocol == "udp").count(), 1);
    assert_eq!(rules.iter().filter(|r| r.protocol == "-1").count(), 1);
    assert_eq!(rules.len(), 5);
}

#[test]
fn test_merge_never_overwrites_via_store() {
    let store = MemoryStore::new();
    let mut original = intent();
    original.vpc_id = Some("vpc-original".to_string());
    store.persist("cell-1", &original).unwrap();

    let mut conflicting = intent();
    conflicting.vpc_id = Some("vpc-imposter".to_string());
    let merged = store.load_merged("cell-1", &conflicting).unwrap();
    assert_eq!(merged.vpc_id.as_deref(), Some("vpc-original"));
}

#[test]
fn test_launch_requests_see_gzipped_payload_on_deploy() {
    let cloud = SimCloud::new();
    let store = MemoryStore::new();
    let orchestrator = ClusterOrchestrator::new(&cloud, &store).with_budgets(Budgets::fast());
    let mut st = intent();
    st.worker_count = 0;
    st.edge_count = 0;
    orchestrator.deploy(&st).unwrap();

    use base64::Engine as _;
    let requests = cloud.launch_requests();
    assert_eq!(requests.len(), 1);
    let payload = base64::engine::general_purpose::STANDARD
        .decode(&requests[0].user_data)
        .unwrap();
    // Gzip magic bytes: deploy compresses node payloads.
    assert_eq!(&payload[..2], &[0x1f, 0x8b]);
}
