//! Bootstrap payload builder.
//!
//! Phase one of the two-phase node pipeline: render the cloud-config
//! document a node boots with, parameterized by role and cluster state.
//! Its output is the sole input of phase two (the launch), whether the
//! phases run in-process or as piped commands.

use std::io::Write;

use anyhow::{Context, Result};
use flate2::Compression;
use flate2::write::GzEncoder;
use tera::Tera;
use tracing::info;

use strato_core::cluster::{ClusterState, Role};
use strato_core::naming;

const TEMPLATE: &str = r#"#cloud-config
hostname: {{ hostname }}

write_files:
  - path: /etc/strato/cluster.env
    permissions: "0600"
    owner: root
    content: |
      CLUSTER_ID={{ cluster_id }}
      ROLE={{ role }}
      HOST_ID={{ host_id }}
      DOMAIN={{ domain }}
      MASTER_COUNT={{ master_count }}
      BOOTSTRAP_TOKEN={{ bootstrap_token }}
      OVERLAY_NETWORK={{ overlay_network }}
      OVERLAY_SUBNET_LEN={{ overlay_subnet_len }}
      OVERLAY_SUBNET_MIN={{ overlay_subnet_min }}
      OVERLAY_SUBNET_MAX={{ overlay_subnet_max }}
      OVERLAY_BACKEND={{ overlay_backend }}
{% if ca_cert %}  - path: /etc/ssl/certs/cluster-ca.pem
    permissions: "0644"
    owner: root
    content: |
{{ ca_cert }}
{% endif %}
coreos:
  units:
    - name: overlay.service
      command: start
{% if role == "master" %}    - name: control-plane.service
      command: start
{% else %}    - name: node-agent.service
      command: start
{% endif %}{% if role == "edge" %}    - name: edge-proxy.service
      command: start
{% endif %}"#;

/// Render the bootstrap payload for one node, optionally gzipped.
pub fn build(state: &ClusterState, role: Role, host_id: u32, gzip: bool) -> Result<Vec<u8>> {
    let mut ctx = tera::Context::new();
    ctx.insert("cluster_id", &state.cluster_id);
    ctx.insert("role", role.as_str());
    ctx.insert("host_id", &host_id);
    ctx.insert(
        "hostname",
        &naming::node_hostname(role, host_id, &state.domain),
    );
    ctx.insert("domain", &state.domain);
    ctx.insert("master_count", &state.master_count);
    ctx.insert("bootstrap_token", &state.bootstrap_token);
    ctx.insert("overlay_network", &state.overlay_network);
    ctx.insert("overlay_subnet_len", &state.overlay_subnet_len);
    ctx.insert("overlay_subnet_min", &state.overlay_subnet_min);
    ctx.insert("overlay_subnet_max", &state.overlay_subnet_max);
    ctx.insert("overlay_backend", &state.overlay_backend);
    ctx.insert("ca_cert", &indent_block(&state.ca_cert, 6));

    let rendered =
        Tera::one_off(TEMPLATE, &ctx, false).context("Failed to render bootstrap payload")?;
    info!(
        role = %role,
        host_id,
        bytes = rendered.len(),
        gzip,
        "Bootstrap payload rendered",
    );

    if !gzip {
        return Ok(rendered.into_bytes());
    }
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(rendered.as_bytes())?;
    encoder
        .finish()
        .context("Failed to compress bootstrap payload")
}

/// Indent every line of a PEM block so it nests under a YAML literal.
fn indent_block(text: &str, spaces: usize) -> String {
    if text.is_empty() {
        return String::new();
    }
    let pad = " ".repeat(spaces);
    text.lines()
        .map(|line| format!("{}{}", pad, line))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    fn state() -> ClusterState {
        ClusterState {
            cluster_id: "cell-1".to_string(),
            domain: "cell-1.example.com".to_string(),
            master_count: 3,
            bootstrap_token: "tok-abc".to_string(),
            overlay_network: "10.128.0.0/21".to_string(),
            overlay_subnet_len: "27".to_string(),
            overlay_subnet_min: "10.128.0.192".to_string(),
            overlay_subnet_max: "10.128.7.224".to_string(),
            overlay_backend: "vxlan".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_payload_contains_cluster_parameters() {
        let payload = build(&state(), Role::Master, 1, false).unwrap();
        let text = String::from_utf8(payload).unwrap();
        assert!(text.starts_with("#cloud-config"));
        assert!(text.contains("hostname: master-1.cell-1.example.com"));
        assert!(text.contains("BOOTSTRAP_TOKEN=tok-abc"));
        assert!(text.contains("OVERLAY_BACKEND=vxlan"));
        assert!(text.contains("MASTER_COUNT=3"));
    }

    #[test]
    fn test_payload_role_specific_units() {
        let master = String::from_utf8(build(&state(), Role::Master, 1, false).unwrap()).unwrap();
        assert!(master.contains("control-plane.service"));
        assert!(!master.contains("node-agent.service"));
        assert!(!master.contains("edge-proxy.service"));

        let worker = String::from_utf8(build(&state(), Role::Worker, 2, false).unwrap()).unwrap();
        assert!(worker.contains("node-agent.service"));
        assert!(!worker.contains("control-plane.service"));

        let edge = String::from_utf8(build(&state(), Role::Edge, 1, false).unwrap()).unwrap();
        assert!(edge.contains("node-agent.service"));
        assert!(edge.contains("edge-proxy.service"));
    }

    #[test]
    fn test_payload_ca_cert_block_optional() {
        let without = String::from_utf8(build(&state(), Role::Worker, 1, false).unwrap()).unwrap();
        assert!(!without.contains("cluster-ca.pem"));

        let mut st = state();
        st.ca_cert = "-----BEGIN CERTIFICATE-----\nAAAA\n-----END CERTIFICATE-----".to_string();
        let with = String::from_utf8(build(&st, Role::Worker, 1, false).unwrap()).unwrap();
        assert!(with.contains("cluster-ca.pem"));
        assert!(with.contains("      -----BEGIN CERTIFICATE-----"));
    }

    #[test]
    fn test_payload_gzip_roundtrip() {
        let plain = build(&state(), Role::Worker, 1, false).unwrap();
        let gzipped = build(&state(), Role::Worker, 1, true).unwrap();
        assert_ne!(plain, gzipped);
        // Gzip magic.
        assert_eq!(&gzipped[..2], &[0x1f, 0x8b]);

        let mut decoder = flate2::read::GzDecoder::new(&gzipped[..]);
        let mut decompressed = Vec::new();
        decoder.read_to_end(&mut decompressed).unwrap();
        assert_eq!(decompressed, plain);
    }

    #[test]
    fn test_indent_block() {
        assert_eq!(indent_block("", 4), "");
        assert_eq!(indent_block("a\nb", 2), "  a\n  b");
    }
}
