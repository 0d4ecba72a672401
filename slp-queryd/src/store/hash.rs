use anyhow::{Context, Result};
use serde::Serialize;
use sha2::{Sha256, Digest};
use shared::types::{Attributes, WatchedRecord};

/// Only stable fields: timestamps and the remaining lifetime move on every
/// poll without the service itself changing.
#[derive(Serialize)]
struct HashView<'a> {
    watch: &'a str,
    slp_url: &'a str,
    ip: &'a str,
    port: u16,
    host: &'a str,
    protocol: &'a str,
    slp_type: &'a str,
    attributes: &'a Attributes,
    alive: bool,
}

/// Computes a SHA-256 hash of the stored records.
/// Records are sorted by watch and URL for deterministic output.
pub fn compute_hash(records: &[WatchedRecord]) -> Result<String> {
    let mut indices: Vec<usize> = (0..records.len()).collect();
    indices.sort_by(|&a, &b| {
        let (a, b) = (&records[a], &records[b]);
        (a.watch.as_str(), a.record.slp_url.as_str())
            .cmp(&(b.watch.as_str(), b.record.slp_url.as_str()))
    });

    let views: Vec<HashView<'_>> = indices
        .iter()
        .map(|&i| {
            let w = &records[i];
            HashView {
                watch: &w.watch,
                slp_url: &w.record.slp_url,
                ip: &w.record.ip,
                port: w.record.port,
                host: &w.record.host,
                protocol: &w.record.protocol,
                slp_type: &w.record.slp_type,
                attributes: &w.record.attributes,
                alive: w.alive,
            }
        })
        .collect();

    let mut hasher = Sha256::new();
    for view in &views {
        let json = serde_json::to_vec(view)
            .with_context(|| format!("Failed to serialize {} for hashing", view.slp_url))?;
        hasher.update(&json);
        hasher.update(b"\n");
    }
    Ok(hex::encode(hasher.finalize()))
}
