//! Parsers for the small DSLs embedded in the environment description:
//! port specs, memory/byte sizes, and restart policies.

use regex::Regex;
use std::sync::OnceLock;

use crate::config::ConfigError;

/// A single port mapping between a container's internal port and the
/// host-visible (external) port, plus the protocol both ends agree on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortSpec {
    pub name: Option<String>,
    pub exposed: u16,
    pub external: Option<u16>,
    pub protocol: String,
}

fn port_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?P<p1>\d+)(?:-(?P<p2>\d+))?(?:/(?P<proto>tcp|udp))?$").unwrap()
    })
}

/// Parse a single textual port spec of the form `port`, `port/proto`, or
/// `exposed-external` (optionally suffixed with `/proto`).
fn parse_port_string(spec: &str) -> Result<(u16, Option<u16>, String), ConfigError> {
    let caps = port_regex()
        .captures(spec)
        .ok_or_else(|| ConfigError::InvalidPortSpec(spec.to_string()))?;

    let p1: u16 = caps["p1"]
        .parse()
        .map_err(|_| ConfigError::InvalidPortSpec(spec.to_string()))?;
    let p2: Option<u16> = caps
        .name("p2")
        .map(|m| m.as_str().parse())
        .transpose()
        .map_err(|_| ConfigError::InvalidPortSpec(spec.to_string()))?;
    let proto = caps
        .name("proto")
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| "tcp".to_string());

    Ok((p1, p2, proto))
}

/// Parse one entry of a container's `ports` map. `key` is the port name
/// (or the bare port spec when no name is given); `value` is either a bare
/// port spec string, an `exposed:external` mapping string, or `null` to
/// reuse the key as both the exposed and external port.
pub fn parse_port_spec(name: Option<&str>, value: &str) -> Result<PortSpec, ConfigError> {
    if let Some((exposed_str, external_str)) = value.split_once(':') {
        let (exposed, exposed_p2, exposed_proto) = parse_port_string(exposed_str)?;
        if exposed_p2.is_some() {
            return Err(ConfigError::InvalidPortSpec(value.to_string()));
        }
        let (external, external_p2, external_proto) = parse_port_string(external_str)?;
        if external_p2.is_some() {
            return Err(ConfigError::InvalidPortSpec(value.to_string()));
        }
        if exposed_proto != external_proto {
            return Err(ConfigError::PortProtocolMismatch(value.to_string()));
        }
        return Ok(PortSpec {
            name: name.map(str::to_string),
            exposed,
            external: Some(external),
            protocol: exposed_proto,
        });
    }

    let (p1, p2, proto) = parse_port_string(value)?;
    Ok(PortSpec {
        name: name.map(str::to_string),
        exposed: p1,
        external: p2,
        protocol: proto,
    })
}

/// Parse a memory-style byte size with an optional `k`/`m`/`g` suffix
/// (case-insensitive). A bare integer is bytes.
pub fn parse_bytes(spec: &str) -> Result<u64, ConfigError> {
    let spec = spec.trim();
    if spec.is_empty() {
        return Err(ConfigError::InvalidByteSize(spec.to_string()));
    }

    let (digits, multiplier) = match spec.chars().last().unwrap().to_ascii_lowercase() {
        'k' => (&spec[..spec.len() - 1], 1024u64),
        'm' => (&spec[..spec.len() - 1], 1024u64 * 1024),
        'g' => (&spec[..spec.len() - 1], 1024u64 * 1024 * 1024),
        _ => (spec, 1u64),
    };

    let value: u64 = digits
        .parse()
        .map_err(|_| ConfigError::InvalidByteSize(spec.to_string()))?;
    Ok(value * multiplier)
}

/// Container restart policy, as accepted by the remote engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestartPolicy {
    pub name: String,
    pub max_retries: u32,
}

const VALID_RESTART_POLICIES: &[&str] = &["no", "always", "on-failure", "unless-stopped"];

/// Parse a restart policy given either as `name` or `name:retries`.
pub fn parse_restart_policy(spec: &str) -> Result<RestartPolicy, ConfigError> {
    let (name, retries) = match spec.split_once(':') {
        Some((name, retries)) => {
            let retries: u32 = retries
                .parse()
                .map_err(|_| ConfigError::InvalidRestartPolicy(spec.to_string()))?;
            (name, retries)
        }
        None => (spec, 0),
    };

    if !VALID_RESTART_POLICIES.contains(&name) {
        return Err(ConfigError::InvalidRestartPolicy(spec.to_string()));
    }

    Ok(RestartPolicy {
        name: name.to_string(),
        max_retries: retries,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_port() {
        let p = parse_port_spec(None, "8080").unwrap();
        assert_eq!(p.exposed, 8080);
        assert_eq!(p.external, None);
        assert_eq!(p.protocol, "tcp");
    }

    #[test]
    fn parses_port_with_protocol() {
        let p = parse_port_spec(None, "53/udp").unwrap();
        assert_eq!(p.exposed, 53);
        assert_eq!(p.protocol, "udp");
    }

    #[test]
    fn parses_exposed_external_mapping() {
        let p = parse_port_spec(Some("web"), "8080:80").unwrap();
        assert_eq!(p.exposed, 8080);
        assert_eq!(p.external, Some(80));
        assert_eq!(p.name.as_deref(), Some("web"));
    }

    #[test]
    fn rejects_protocol_mismatch() {
        let err = parse_port_spec(None, "8080/tcp:80/udp").unwrap_err();
        assert!(matches!(err, ConfigError::PortProtocolMismatch(_)));
    }

    #[test]
    fn rejects_garbage_port() {
        assert!(parse_port_spec(None, "not-a-port").is_err());
    }

    #[test]
    fn parses_byte_sizes() {
        assert_eq!(parse_bytes("512").unwrap(), 512);
        assert_eq!(parse_bytes("1k").unwrap(), 1024);
        assert_eq!(parse_bytes("2M").unwrap(), 2 * 1024 * 1024);
        assert_eq!(parse_bytes("1g").unwrap(), 1024 * 1024 * 1024);
    }

    #[test]
    fn parses_restart_policy() {
        let p = parse_restart_policy("on-failure:5").unwrap();
        assert_eq!(p.name, "on-failure");
        assert_eq!(p.max_retries, 5);

        let p = parse_restart_policy("always").unwrap();
        assert_eq!(p.max_retries, 0);
    }

    #[test]
    fn rejects_unknown_restart_policy() {
        assert!(parse_restart_policy("sometimes").is_err());
    }
}
