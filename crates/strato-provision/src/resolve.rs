//! External fact resolvers: the base-image id for the target region
//! and the cluster bootstrap token. Both run concurrently with the
//! network build during deploy; their outputs merge into cluster state
//! before node fan-out begins.

use anyhow::{Context, Result, bail};
use tracing::info;

use crate::http;

/// Provider-published image-channel manifest location.
const IMAGE_MANIFEST_BASE: &str = "https://coreos.com/dist/aws/aws";

/// Public bootstrap-token service.
const TOKEN_SERVICE_BASE: &str = "https://discovery.etcd.io";

fn manifest_url(channel: &str) -> String {
    let base = std::env::var("STRATO_IMAGE_MANIFEST_URL")
        .unwrap_or_else(|_| IMAGE_MANIFEST_BASE.to_string());
    format!("{}-{}.json", base, channel)
}

fn token_url(size: u32) -> String {
    let base =
        std::env::var("STRATO_TOKEN_SERVICE_URL").unwrap_or_else(|_| TOKEN_SERVICE_BASE.to_string());
    format!("{}/new?size={}", base, size)
}

/// Fetch the channel manifest and select the image for the region.
/// Any decode or lookup failure is fatal: no image means no launch.
pub fn resolve_image(channel: &str, region: &str) -> Result<String> {
    let url = manifest_url(channel);
    let manifest = http::fetch_json(&url)
        .with_context(|| format!("Failed to fetch image manifest for channel {}", channel))?;
    let image_id = parse_image_manifest(&manifest, region)?;
    info!(id = %image_id, "Latest {} channel image located", channel);
    Ok(image_id)
}

/// Pick the hardware-virtualized image for `region` out of a channel
/// manifest shaped `{"<region>": {"hvm": "<image-id>", ...}, ...}`.
pub fn parse_image_manifest(manifest: &serde_json::Value, region: &str) -> Result<String> {
    manifest
        .get(region)
        .and_then(|entry| entry.get("hvm"))
        .and_then(|id| id.as_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow::anyhow!("Image manifest has no hvm entry for region {}", region))
}

/// Resolve the bootstrap token policy: "auto" requests a token sized to
/// the master count from the token service; anything else passes
/// through unchanged.
pub fn resolve_token(policy: &str, master_count: u32) -> Result<String> {
    if policy != "auto" {
        return Ok(policy.to_string());
    }
    let body = http::fetch_text(&token_url(master_count))
        .context("Failed to request bootstrap token")?;
    let token = body.trim();
    if token.is_empty() {
        bail!("Token service returned an empty bootstrap token");
    }
    info!(id = %token, "New bootstrap token requested");
    Ok(token.to_string())
}
