//! Environment description loading.
//!
//! Parses the YAML environment description into the raw configuration
//! structs consumed by the conductor. Template preprocessing (the upstream
//! tool's Jinja2 pass) is out of scope here; this loader only parses plain
//! YAML, rejecting duplicate mapping keys the way the upstream custom
//! constructor does.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("environment description file {0} not found")]
    FileNotFound(String),

    #[error("error reading environment description file {0}: {1}")]
    Io(String, std::io::Error),

    #[error("error parsing environment description: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("duplicate key '{0}' in environment description")]
    DuplicateKey(String),

    #[error("invalid port spec: {0}")]
    InvalidPortSpec(String),

    #[error("port spec has mismatched protocols: {0}")]
    PortProtocolMismatch(String),

    #[error("invalid byte size: {0}")]
    InvalidByteSize(String),

    #[error("invalid restart policy: {0}")]
    InvalidRestartPolicy(String),

    #[error("invalid ship provider '{0}', available providers: {1}")]
    InvalidShipProvider(String, String),

    #[error("invalid lifecycle check configuration: {0}")]
    InvalidLifecycleCheck(String),

    #[error("invalid volume configuration: {0}")]
    InvalidVolume(String),

    #[error("invalid auditor configuration: {0}")]
    InvalidAuditor(String),

    #[error("unknown entity '{0}'")]
    UnknownEntity(String),
}

fn default_docker_port() -> u16 {
    2375
}

fn default_timeout() -> u64 {
    5
}

#[derive(Debug, Clone, Deserialize)]
pub struct ShipConfig {
    pub ip: String,
    pub endpoint: Option<String>,
    #[serde(default = "default_docker_port")]
    pub docker_port: u16,
    pub api_version: Option<String>,
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ShipDefaults {
    pub docker_port: Option<u16>,
    pub api_version: Option<String>,
    pub timeout: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LifecycleCheckRaw {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(flatten)]
    pub params: HashMap<String, serde_yaml::Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContainerConfig {
    pub image: Option<String>,
    /// Name of the ship this instance is placed on; required unless the
    /// environment has exactly one ship.
    pub ship: Option<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub ports: HashMap<String, String>,
    #[serde(default)]
    pub volumes: HashMap<String, String>,
    #[serde(default)]
    pub volumes_from: Vec<String>,
    #[serde(default)]
    pub links: Vec<String>,
    #[serde(default)]
    pub privileged: bool,
    #[serde(default)]
    pub extra_hosts: Vec<String>,
    pub net: Option<String>,
    pub restart: Option<String>,
    #[serde(default)]
    pub dns: Vec<String>,
    #[serde(default)]
    pub stop_timeout: Option<u32>,
    pub mem_limit: Option<String>,
    pub memswap_limit: Option<String>,
    pub cpu_shares: Option<i64>,
    #[serde(default)]
    pub lifecycle: HashMap<String, Vec<LifecycleCheckRaw>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub image: String,
    #[serde(default)]
    pub omit: bool,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub requires: Vec<String>,
    #[serde(default)]
    pub wants_info: Vec<String>,
    #[serde(default)]
    pub ports: HashMap<String, String>,
    pub mem_limit: Option<String>,
    pub memswap_limit: Option<String>,
    pub cpu_shares: Option<i64>,
    #[serde(default)]
    pub lifecycle: HashMap<String, Vec<LifecycleCheckRaw>>,
    pub instances: Option<ServiceInstances>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ServiceInstances {
    Count(u32),
    Named(HashMap<String, ContainerConfig>),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegistryConfig {
    pub username: Option<String>,
    pub password: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuditConfig {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(flatten)]
    pub params: HashMap<String, serde_yaml::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EnvironmentConfig {
    pub name: String,
    #[serde(default = "default_ship_provider")]
    pub ship_provider: String,
    #[serde(default)]
    pub ship_defaults: ShipDefaults,
    pub ships: HashMap<String, ShipConfig>,
    #[serde(default)]
    pub registries: HashMap<String, RegistryConfig>,
    pub services: HashMap<String, ServiceConfig>,
    #[serde(default)]
    pub audit: Vec<AuditConfig>,
}

fn default_ship_provider() -> String {
    "static".to_string()
}

const AVAILABLE_SHIP_PROVIDERS: &[&str] = &["static"];

/// Recursively walk a parsed YAML value checking for duplicate keys in any
/// mapping, matching `MaestroYamlConstructor`'s behavior upstream.
fn check_no_duplicate_keys(value: &serde_yaml::Value) -> Result<(), ConfigError> {
    match value {
        serde_yaml::Value::Mapping(map) => {
            let mut seen = std::collections::HashSet::new();
            for (key, val) in map {
                let key_repr = serde_yaml::to_string(key).unwrap_or_default();
                if !seen.insert(key_repr.clone()) {
                    return Err(ConfigError::DuplicateKey(key_repr));
                }
                check_no_duplicate_keys(val)?;
            }
            Ok(())
        }
        serde_yaml::Value::Sequence(seq) => {
            for item in seq {
                check_no_duplicate_keys(item)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

/// Load and parse an environment description file. Use `-` to read from
/// stdin.
pub fn load(path: &str) -> Result<EnvironmentConfig, ConfigError> {
    let raw = if path == "-" {
        use std::io::Read;
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .map_err(|e| ConfigError::Io(path.to_string(), e))?;
        buf
    } else {
        if !Path::new(path).exists() {
            return Err(ConfigError::FileNotFound(path.to_string()));
        }
        std::fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_string(), e))?
    };

    let value: serde_yaml::Value = serde_yaml::from_str(&raw)?;
    check_no_duplicate_keys(&value)?;

    let config: EnvironmentConfig = serde_yaml::from_value(value)?;

    if !AVAILABLE_SHIP_PROVIDERS.contains(&config.ship_provider.as_str()) {
        return Err(ConfigError::InvalidShipProvider(
            config.ship_provider.clone(),
            AVAILABLE_SHIP_PROVIDERS.join(", "),
        ));
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
name: sample
ships:
  ship1:
    ip: 10.0.0.1
services:
  redis:
    image: redis:7
    ports:
      main: "6379"
"#;

    #[test]
    fn parses_minimal_environment() {
        let config: EnvironmentConfig = serde_yaml::from_str(SAMPLE).unwrap();
        assert_eq!(config.name, "sample");
        assert_eq!(config.ships["ship1"].ip, "10.0.0.1");
        assert_eq!(config.ships["ship1"].docker_port, 2375);
    }

    #[test]
    fn rejects_duplicate_keys() {
        let dup = "name: a\nname: b\nships: {}\nservices: {}\n";
        let value: serde_yaml::Value = serde_yaml::from_str(dup).unwrap();
        assert!(check_no_duplicate_keys(&value).is_err());
    }

    #[test]
    fn rejects_unknown_ship_provider() {
        let raw = format!("{}\nship_provider: dynamic\n", SAMPLE);
        let value: serde_yaml::Value = serde_yaml::from_str(&raw).unwrap();
        let config: EnvironmentConfig = serde_yaml::from_value(value).unwrap();
        assert!(!AVAILABLE_SHIP_PROVIDERS.contains(&config.ship_provider.as_str()));
    }
}
