//! Container service manifest merging.
//!
//! New services are added by name; a name that already exists is left
//! untouched. Before anything is added, every host port the new service
//! publishes is checked against the ports already claimed in the document,
//! including those of services added earlier in the same merge.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde_yaml::{Mapping, Value};

use super::{Summary, malformed};
use crate::error::{MergeConflict, Result};

/// Upper bound on ports expanded from a single range entry.
const MAX_RANGE: u32 = 1024;

pub fn is_compose_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext == "yml" || ext == "yaml")
}

/// Host port plus protocol; `8000/tcp` and `8000/udp` do not collide.
type HostPort = (u16, String);

pub fn merge_services(existing: &str, additions: &Mapping) -> Result<(String, Summary)> {
    let mut doc: Value = if existing.trim().is_empty() {
        Value::Mapping(Mapping::new())
    } else {
        serde_yaml::from_str(existing)?
    };
    let root = doc
        .as_mapping_mut()
        .ok_or_else(|| malformed("service manifest root is not a mapping"))?;

    if !root.get("services").is_some_and(Value::is_mapping) {
        if root.get("services").is_some_and(|value| !value.is_null()) {
            return Err(malformed("service manifest `services` is not a mapping"));
        }
        root.insert(Value::from("services"), Value::Mapping(Mapping::new()));
    }
    let services = root
        .get_mut("services")
        .and_then(Value::as_mapping_mut)
        .ok_or_else(|| malformed("service manifest `services` is not a mapping"))?;

    let mut claimed: BTreeMap<HostPort, String> = BTreeMap::new();
    for (name, definition) in services.iter() {
        for port in host_ports(definition) {
            claimed.entry(port).or_insert_with(|| key_name(name));
        }
    }

    let mut summary = Summary::default();
    let mut appended = Mapping::new();
    for (name, definition) in additions {
        let service = key_name(name);
        if services.contains_key(name) {
            summary.skipped.push(service);
            continue;
        }

        let ports = host_ports(definition);
        if let Some(((port, _), owner)) = ports
            .iter()
            .find_map(|port| claimed.get(port).map(|owner| (port, owner)))
        {
            return Err(MergeConflict::PortCollision {
                file: PathBuf::new(),
                port: *port,
                service,
                existing_service: owner.clone(),
            }
            .into());
        }

        for port in ports {
            claimed.insert(port, service.clone());
        }
        services.insert(name.clone(), definition.clone());
        appended.insert(name.clone(), definition.clone());
        summary.added.push(service);
    }

    if !summary.changed() {
        return Ok((existing.to_string(), summary));
    }
    if let Some(text) = splice_services(existing, &appended)? {
        if serde_yaml::from_str::<Value>(&text).is_ok_and(|parsed| parsed == doc) {
            return Ok((text, summary));
        }
    }
    Ok((serde_yaml::to_string(&doc)?, summary))
}

/// Insert the new service blocks as text at the end of the `services:`
/// block, so comments and quoting elsewhere survive. `None` when there is
/// no block-style `services:` key to append under.
fn splice_services(existing: &str, appended: &Mapping) -> Result<Option<String>> {
    let lines: Vec<&str> = existing.split_inclusive('\n').collect();
    let Some(header) = lines.iter().position(|line| is_services_header(line)) else {
        return Ok(None);
    };

    let mut last_child = header;
    let mut indent = None;
    for (index, line) in lines.iter().enumerate().skip(header + 1) {
        let content = line.trim_end();
        let body = content.trim_start();
        if body.is_empty() || body.starts_with('#') {
            continue;
        }
        let leading = content.len() - body.len();
        if leading == 0 {
            break;
        }
        indent.get_or_insert(leading);
        last_child = index;
    }
    let pad = " ".repeat(indent.unwrap_or(2));
    let block = serde_yaml::to_string(&Value::Mapping(appended.clone()))?;

    let mut out = String::with_capacity(existing.len() + block.len() * 2);
    for line in &lines[..=last_child] {
        out.push_str(line);
    }
    if !out.ends_with('\n') {
        out.push('\n');
    }
    for line in block.lines() {
        if !line.is_empty() {
            out.push_str(&pad);
        }
        out.push_str(line);
        out.push('\n');
    }
    for line in &lines[last_child + 1..] {
        out.push_str(line);
    }
    Ok(Some(out))
}

fn is_services_header(line: &str) -> bool {
    line.trim_end()
        .strip_prefix("services:")
        .is_some_and(|rest| {
            let rest = rest.trim_start();
            rest.is_empty() || rest.starts_with('#')
        })
}

fn key_name(key: &Value) -> String {
    match key {
        Value::String(name) => name.clone(),
        other => serde_yaml::to_string(other)
            .map(|text| text.trim().to_string())
            .unwrap_or_default(),
    }
}

/// Host-side ports a service definition publishes.
pub fn host_ports(definition: &Value) -> Vec<HostPort> {
    let Some(entries) = definition.get("ports").and_then(Value::as_sequence) else {
        return Vec::new();
    };

    let mut ports = Vec::new();
    for entry in entries {
        match entry {
            Value::String(published) => ports.extend(parse_short_syntax(published)),
            Value::Mapping(long) => {
                let protocol = long
                    .get("protocol")
                    .and_then(Value::as_str)
                    .unwrap_or("tcp")
                    .to_string();
                let published = match long.get("published") {
                    Some(Value::Number(number)) => number.to_string(),
                    Some(Value::String(text)) => text.clone(),
                    _ => continue,
                };
                ports.extend(
                    expand_range(&published)
                        .into_iter()
                        .map(|port| (port, protocol.clone())),
                );
            }
            // A bare number publishes the container port on a random host port.
            _ => {}
        }
    }
    ports
}

/// `[IP:]HOST:CONTAINER[/PROTO]`, where HOST may be a range or empty.
fn parse_short_syntax(published: &str) -> Vec<HostPort> {
    let (published, protocol) = published
        .rsplit_once('/')
        .map_or((published, "tcp"), |(published, proto)| (published, proto));
    let Some((host, _container)) = published.rsplit_once(':') else {
        return Vec::new();
    };
    let host = if let Some((_, after_bracket)) = host.rsplit_once("]:") {
        after_bracket
    } else if let Some((_, port)) = host.rsplit_once(':') {
        port
    } else {
        host
    };
    if host.contains('.') {
        // `IP:CONTAINER` with no host port.
        return Vec::new();
    }

    expand_range(host)
        .into_iter()
        .map(|port| (port, protocol.to_string()))
        .collect()
}

fn expand_range(published: &str) -> Vec<u16> {
    let published = published.trim();
    if published.is_empty() {
        return Vec::new();
    }
    match published.split_once('-') {
        Some((low, high)) => match (low.trim().parse::<u16>(), high.trim().parse::<u16>()) {
            (Ok(low), Ok(high)) if low <= high && u32::from(high - low) < MAX_RANGE => {
                (low..=high).collect()
            }
            _ => Vec::new(),
        },
        None => published.parse::<u16>().map(|port| vec![port]).unwrap_or_default(),
    }
}
