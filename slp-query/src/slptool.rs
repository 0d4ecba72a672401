//! `DiscoveryClient` backed by OpenSLP's `slptool` command.

use std::collections::HashMap;
use std::net::IpAddr;
use std::path::PathBuf;
use std::process::Command;
use anyhow::{bail, Context, Result};
use shared::types::RawDiscoveryRecord;
use crate::discovery::DiscoveryClient;
use crate::service_url;

const DEFAULT_PROGRAM: &str = "slptool";

#[derive(Debug, Clone)]
pub struct SlptoolClient {
    program: PathBuf,
}

impl SlptoolClient {
    pub fn new() -> Self {
        Self {
            program: PathBuf::from(DEFAULT_PROGRAM),
        }
    }

    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    fn run(&self, args: &[&str]) -> Result<String> {
        tracing::debug!("Running {} {}", self.program.display(), args.join(" "));

        let output = Command::new(&self.program)
            .args(args)
            .output()
            .with_context(|| format!("Failed to run {}", self.program.display()))?;

        if !output.status.success() {
            bail!(
                "{} {} exited with {}: {}",
                self.program.display(),
                args.first().copied().unwrap_or_default(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl Default for SlptoolClient {
    fn default() -> Self {
        Self::new()
    }
}

fn scoped<'a>(scope: &'a str, command: &[&'a str]) -> Vec<&'a str> {
    let mut args = Vec::with_capacity(command.len() + 2);
    if !scope.is_empty() {
        args.extend(["-s", scope]);
    }
    args.extend_from_slice(command);
    args
}

impl DiscoveryClient for SlptoolClient {
    fn find_services(&self, service_type: &str, scope: &str) -> Result<Vec<RawDiscoveryRecord>> {
        let stdout = self.run(&scoped(scope, &["findsrvs", service_type]))?;
        parse_services(&stdout)?
            .into_iter()
            .map(resolve_address)
            .collect()
    }

    fn find_service_types(&self, pattern: &str, scope: &str) -> Result<Vec<String>> {
        let stdout = self.run(&scoped(scope, &["findsrvtypes", pattern]))?;
        Ok(parse_service_types(&stdout))
    }

    fn get_attributes(&self, url: &str, ip: &str) -> Result<HashMap<String, String>> {
        let stdout = self.run(&["-u", ip, "findattrs", url])?;
        Ok(parse_attributes(&stdout))
    }
}

/// One `url,lifetime` pair per line.
fn parse_services(stdout: &str) -> Result<Vec<RawDiscoveryRecord>> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| -> Result<RawDiscoveryRecord> {
            let (url, lifetime) = line
                .rsplit_once(',')
                .with_context(|| format!("Missing lifetime in service reply '{}'", line))?;
            let lifetime = lifetime
                .trim()
                .parse::<u16>()
                .with_context(|| format!("Invalid lifetime in service reply '{}'", line))?;
            Ok(service_url::raw_record(url.trim(), lifetime)?)
        })
        .collect()
}

/// Registrations may name a host instead of an address. Attribute requests
/// and reverse lookups need the address, so the first one found is used.
fn resolve_address(mut record: RawDiscoveryRecord) -> Result<RawDiscoveryRecord> {
    if record.ip.parse::<IpAddr>().is_ok() {
        return Ok(record);
    }

    let addr = dns_lookup::lookup_host(&record.ip)
        .with_context(|| format!("Failed to resolve host '{}' of {}", record.ip, record.srv_url))?
        .into_iter()
        .next()
        .with_context(|| format!("No address for host '{}' of {}", record.ip, record.srv_url))?;

    tracing::debug!("Resolved {} to {}", record.ip, addr);
    record.ip = addr.to_string();
    Ok(record)
}

/// Types come back comma separated, possibly over several lines.
fn parse_service_types(stdout: &str) -> Vec<String> {
    stdout
        .split([',', '\n'])
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Attribute list such as `(location=3rd floor),(color=true,false),duplex`.
/// Keyword attributes map to an empty value.
fn parse_attributes(stdout: &str) -> HashMap<String, String> {
    let mut attrs = HashMap::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    let text = stdout.trim();

    let mut push = |item: &str| {
        let item = item.trim();
        if item.is_empty() {
            return;
        }
        let inner = item
            .strip_prefix('(')
            .and_then(|i| i.strip_suffix(')'))
            .unwrap_or(item);
        match inner.split_once('=') {
            Some((key, value)) => attrs.insert(key.trim().to_string(), value.trim().to_string()),
            None => attrs.insert(inner.trim().to_string(), String::new()),
        };
    };

    for (idx, ch) in text.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' | '\n' if depth == 0 => {
                push(&text[start..idx]);
                start = idx + ch.len_utf8();
            }
            _ => {}
        }
    }
    push(&text[start..]);

    attrs
}
