//! The entity data model: ships, services, and containers.
//!
//! A `Ship` is a Docker host. A `Service` is a named group of one or more
//! `Container` instances running the same image. Dependency edges
//! (`requires`, `wants_info`, `needed_for`) are wired between services by
//! the conductor once every entity has been parsed; see [`crate::conductor`].

pub mod parse;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

pub use parse::{parse_bytes, parse_port_spec, parse_restart_policy, PortSpec, RestartPolicy};

/// A Docker host that containers are scheduled onto. Every container
/// scheduled on a ship shares that ship's single remote-engine connection.
#[derive(Debug, Clone)]
pub struct Ship {
    pub name: String,
    pub ip: String,
    pub endpoint: Option<String>,
    pub docker_port: u16,
    pub api_version: Option<String>,
    pub timeout: std::time::Duration,
}

impl Ship {
    /// The address the remote engine client should dial.
    pub fn address(&self) -> String {
        self.endpoint
            .clone()
            .unwrap_or_else(|| format!("{}:{}", self.ip, self.docker_port))
    }
}

/// A named group of containers running the same image, plus the
/// dependency edges that drive the conductor's ordering.
#[derive(Debug, Clone)]
pub struct Service {
    pub name: String,
    pub image: String,
    pub omit: bool,
    pub env: HashMap<String, String>,
    /// Names of services this one requires to be up before it starts.
    pub requires: Vec<String>,
    /// Names of services whose link variables this one wants, without
    /// requiring them to be started first (link vars only, no ordering).
    pub wants_info: Vec<String>,
    /// Names of services that must be stopped before this one stops
    /// (the reverse dependency, used when ordering stop/restart).
    pub needed_for: Vec<String>,
    pub lifecycle: HashMap<String, Vec<crate::lifecycle::LifecycleCheckConfig>>,
    pub limits: ResourceLimits,
    pub ports: Vec<PortSpec>,
    pub container_names: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ResourceLimits {
    pub memory: Option<u64>,
    pub memory_swap: Option<i64>,
    pub cpu_shares: Option<i64>,
}

/// A single scheduled instance of a service, bound to a ship.
#[derive(Debug, Clone)]
pub struct Container {
    // Identity (PartialEq/Eq/Hash below) is by `name`, matching how
    // containers are keyed everywhere else (e.g. `Conductor::containers`).
    pub name: String,
    pub service: String,
    pub ship: String,
    /// The placement ship's IP/hostname, used as the connectable host
    /// address peers see in link variables (`ship` above is the name,
    /// used to look up the engine connection).
    pub ship_ip: String,
    pub image: String,
    pub command: Option<Vec<String>>,
    pub env: HashMap<String, String>,
    pub ports: Vec<PortSpec>,
    pub volumes: Vec<VolumeMount>,
    pub volumes_from: Vec<String>,
    pub links: Vec<String>,
    pub privileged: bool,
    pub extra_hosts: Vec<String>,
    pub network_mode: Option<String>,
    pub restart_policy: Option<RestartPolicy>,
    pub dns: Vec<String>,
    pub stop_timeout: u32,
    pub limits: ResourceLimits,
    pub lifecycle: HashMap<String, Vec<crate::lifecycle::LifecycleCheckConfig>>,
}

impl PartialEq for Container {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Container {}

impl std::hash::Hash for Container {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

#[derive(Debug, Clone)]
pub struct VolumeMount {
    pub source: String,
    pub target: String,
    pub read_only: bool,
}

/// Compute the link environment variables a dependent container should see
/// for every peer and every transitively required/wanted service.
///
/// Peers in the same service get both the external and `_INTERNAL_PORT`
/// variant (they share a network and can reach each other directly);
/// containers reached through `requires`/`wants_info` only get the
/// externally-published variant, matching the upstream behavior where
/// `wants_info` affects link variables only, never scheduling order.
pub fn link_variables(
    container: &Container,
    peers: &[&Container],
    linked: &[(&Container, bool)],
) -> BTreeMap<String, String> {
    let mut vars = BTreeMap::new();

    let instance_suffix = |name: &str| -> String { name.to_uppercase().replace('-', "_") };

    let emit = |vars: &mut BTreeMap<String, String>, c: &Container, internal: bool| {
        let prefix = instance_suffix(&c.name);
        vars.insert(format!("{}_HOST", prefix), c.ship_ip.clone());
        for port in &c.ports {
            let Some(port_name) = &port.name else {
                continue;
            };
            let port_prefix = format!("{}_{}_PORT", prefix, port_name.to_uppercase());
            if let Some(external) = port.external {
                vars.insert(port_prefix, external.to_string());
            }
            if internal {
                vars.insert(
                    format!("{}_{}_INTERNAL_PORT", prefix, port_name.to_uppercase()),
                    port.exposed.to_string(),
                );
            }
        }
    };

    for peer in peers {
        if peer.name == container.name {
            continue;
        }
        emit(&mut vars, peer, true);
    }

    let mut instance_counts: HashMap<String, usize> = HashMap::new();
    for (linked_container, _) in linked {
        emit(&mut vars, linked_container, false);
        *instance_counts
            .entry(linked_container.service.clone())
            .or_default() += 1;
    }
    for (service, count) in instance_counts {
        vars.insert(
            format!("{}_INSTANCES", instance_suffix(&service)),
            count.to_string(),
        );
    }

    vars
}

pub type ContainerRef = Arc<Container>;
pub type ServiceRef = Arc<Service>;
pub type ShipRef = Arc<Ship>;
