//! The conductor: builds the entity graph from a parsed environment
//! description, expands user-supplied selections into concrete containers,
//! and computes dependency-respecting execution order.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use thiserror::Error;

use crate::config::{ConfigError, ContainerConfig, EnvironmentConfig, ServiceInstances};
use crate::entities::{
    link_variables, parse_bytes, parse_port_spec, parse_restart_policy, Container, ResourceLimits,
    Service, Ship,
};
use crate::lifecycle::LifecycleCheckConfig;

#[derive(Debug, Error)]
pub enum ConductorError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("unknown service or container '{0}'")]
    UnknownThing(String),

    #[error("dependency cycle detected among: {0}")]
    Cycle(String),

    #[error("service '{0}' requires unknown service '{1}'")]
    UnknownDependency(String, String),

    #[error("container '{0}' binds the same host path to two different targets")]
    VolumeConflict(String),
}

/// The fully resolved entity graph for one environment description.
pub struct Conductor {
    pub name: String,
    pub ships: HashMap<String, Arc<Ship>>,
    pub services: HashMap<String, Arc<Service>>,
    pub containers: HashMap<String, Arc<Container>>,
    /// name -> names of containers it depends on (via service `requires`).
    forward_edges: HashMap<String, HashSet<String>>,
    /// name -> names of containers that depend on it.
    reverse_edges: HashMap<String, HashSet<String>>,
}

impl Conductor {
    pub fn build(config: &EnvironmentConfig) -> Result<Self, ConductorError> {
        let ships = build_ships(config);
        let mut services = HashMap::new();
        let mut containers = HashMap::new();

        for (service_name, service_config) in &config.services {
            let lifecycle = parse_lifecycle_map(&service_config.lifecycle);
            let ports = service_config
                .ports
                .iter()
                .map(|(name, spec)| parse_port_spec(Some(name), spec))
                .collect::<Result<Vec<_>, _>>()?;

            let limits = ResourceLimits {
                memory: service_config.mem_limit.as_deref().map(parse_bytes).transpose()?,
                memory_swap: service_config
                    .memswap_limit
                    .as_deref()
                    .map(parse_bytes)
                    .transpose()?
                    .map(|v| v as i64),
                cpu_shares: service_config.cpu_shares,
            };

            let instance_configs = expand_instances(service_name, service_config);
            let mut container_names = Vec::new();

            for (instance_name, instance_config) in &instance_configs {
                let ship = resolve_ship(&ships, instance_config.ship.as_deref())?;

                let mut env = service_config.env.clone();
                env.extend(instance_config.env.clone());
                seed_env(
                    &mut env,
                    &config.name,
                    service_name,
                    instance_name,
                    &ship.ip,
                    &instance_config
                        .image
                        .clone()
                        .unwrap_or_else(|| service_config.image.clone()),
                );

                let mut container_ports = ports.clone();
                for (name, spec) in &instance_config.ports {
                    container_ports.push(parse_port_spec(Some(name), spec)?);
                }

                let volumes = instance_config
                    .volumes
                    .iter()
                    .map(|(source, target)| crate::entities::VolumeMount {
                        source: source.clone(),
                        target: target.trim_end_matches(":ro").to_string(),
                        read_only: target.ends_with(":ro"),
                    })
                    .collect::<Vec<_>>();
                check_volume_conflicts(instance_name, &volumes)?;

                let restart_policy = instance_config
                    .restart
                    .as_deref()
                    .map(parse_restart_policy)
                    .transpose()?;

                let mut container_lifecycle = lifecycle.clone();
                for (phase, checks) in parse_lifecycle_map(&instance_config.lifecycle) {
                    container_lifecycle.entry(phase).or_default().extend(checks);
                }

                let container = Container {
                    name: instance_name.clone(),
                    service: service_name.clone(),
                    ship: ship.name.clone(),
                    ship_ip: ship.ip.clone(),
                    image: instance_config
                        .image
                        .clone()
                        .unwrap_or_else(|| service_config.image.clone()),
                    command: None,
                    env,
                    ports: container_ports,
                    volumes,
                    volumes_from: instance_config.volumes_from.clone(),
                    links: instance_config.links.clone(),
                    privileged: instance_config.privileged,
                    extra_hosts: instance_config.extra_hosts.clone(),
                    network_mode: instance_config.net.clone(),
                    restart_policy,
                    dns: instance_config.dns.clone(),
                    stop_timeout: instance_config.stop_timeout.unwrap_or(10),
                    limits: limits.clone(),
                    lifecycle: container_lifecycle,
                };

                container_names.push(instance_name.clone());
                containers.insert(instance_name.clone(), Arc::new(container));
            }

            let service = Service {
                name: service_name.clone(),
                image: service_config.image.clone(),
                omit: service_config.omit,
                env: service_config.env.clone(),
                requires: service_config.requires.clone(),
                wants_info: service_config.wants_info.clone(),
                needed_for: Vec::new(),
                lifecycle,
                limits,
                ports,
                container_names,
            };
            services.insert(service_name.clone(), service);
        }

        let mut reverse_needed_for: HashMap<String, Vec<String>> = HashMap::new();
        for service in services.values() {
            for dep in &service.requires {
                if !services.contains_key(dep) {
                    return Err(ConductorError::UnknownDependency(
                        service.name.clone(),
                        dep.clone(),
                    ));
                }
                reverse_needed_for
                    .entry(dep.clone())
                    .or_default()
                    .push(service.name.clone());
            }
        }
        for (name, needed_for) in reverse_needed_for {
            if let Some(service) = services.get_mut(&name) {
                service.needed_for = needed_for;
            }
        }

        let services: HashMap<String, Arc<Service>> =
            services.into_iter().map(|(k, v)| (k, Arc::new(v))).collect();

        let (forward_edges, reverse_edges) = build_container_edges(&services, &containers);

        inject_link_variables(&services, &mut containers);

        Ok(Self {
            name: config.name.clone(),
            ships,
            services,
            containers,
            forward_edges,
            reverse_edges,
        })
    }

    /// Expand a list of service/container names (the CLI's "things") into
    /// the concrete set of containers they refer to. An empty list expands
    /// to every non-omitted service (or every service, for `status`).
    pub fn expand_things(
        &self,
        things: &[String],
        include_omitted: bool,
    ) -> Result<HashSet<Arc<Container>>, ConductorError> {
        let names: Vec<String> = if things.is_empty() {
            self.services
                .values()
                .filter(|s| include_omitted || !s.omit)
                .map(|s| s.name.clone())
                .collect()
        } else {
            things.to_vec()
        };

        let mut result = HashSet::new();
        for name in names {
            if let Some(service) = self.services.get(&name) {
                for container_name in &service.container_names {
                    result.insert(self.containers[container_name].clone());
                }
            } else if let Some(container) = self.containers.get(&name) {
                result.insert(container.clone());
            } else {
                return Err(ConductorError::UnknownThing(name));
            }
        }
        Ok(result)
    }

    /// Gather the transitive closure of `seed` along `requires` edges.
    /// `forward` walks dependencies (what `seed` needs); reverse walks
    /// dependents (what needs `seed`), used when stopping.
    pub fn gather(&self, seed: &HashSet<Arc<Container>>, forward: bool) -> HashSet<Arc<Container>> {
        let edges = if forward {
            &self.forward_edges
        } else {
            &self.reverse_edges
        };

        let mut result: HashSet<Arc<Container>> = seed.clone();
        let mut frontier: Vec<String> = seed.iter().map(|c| c.name.clone()).collect();

        while let Some(name) = frontier.pop() {
            if let Some(neighbors) = edges.get(&name) {
                for neighbor in neighbors {
                    let container = &self.containers[neighbor];
                    if result.insert(container.clone()) {
                        frontier.push(neighbor.clone());
                    }
                }
            }
        }
        result
    }

    /// Topologically order `set` using the iterative-peel algorithm: in
    /// each pass, move every item whose unresolved dependencies (restricted
    /// to `set`) are already ordered. Ties are broken by container name for
    /// determinism. Forward order is used for start/pull; reverse
    /// (dependents-first) for stop.
    pub fn order(
        &self,
        set: &HashSet<Arc<Container>>,
        forward: bool,
    ) -> Result<Vec<Arc<Container>>, ConductorError> {
        let edges = if forward {
            &self.forward_edges
        } else {
            &self.reverse_edges
        };

        let mut remaining: BTreeMap<String, Arc<Container>> =
            set.iter().map(|c| (c.name.clone(), c.clone())).collect();
        let mut ordered_names: HashSet<String> = HashSet::new();
        let mut ordered = Vec::with_capacity(set.len());

        while !remaining.is_empty() {
            let mut ready: Vec<String> = remaining
                .keys()
                .filter(|name| {
                    edges
                        .get(*name)
                        .map(|deps| {
                            deps.iter()
                                .all(|d| !remaining.contains_key(d) || ordered_names.contains(d))
                        })
                        .unwrap_or(true)
                })
                .cloned()
                .collect();

            if ready.is_empty() {
                let stuck: Vec<String> = remaining.keys().cloned().collect();
                return Err(ConductorError::Cycle(stuck.join(", ")));
            }

            ready.sort();
            for name in ready {
                let container = remaining.remove(&name).unwrap();
                ordered_names.insert(name);
                ordered.push(container);
            }
        }

        Ok(ordered)
    }

    /// The real dependency edges among `set`'s members, restricted to
    /// `set` itself: no edge is invented between containers that have no
    /// `requires` relationship, even if the topological order happens to
    /// place one before the other. Used to build the play scheduler's
    /// wait-on-these-containers map without over-serializing siblings.
    pub fn edges_within(
        &self,
        set: &HashSet<Arc<Container>>,
        forward: bool,
    ) -> HashMap<String, HashSet<String>> {
        let edges = if forward {
            &self.forward_edges
        } else {
            &self.reverse_edges
        };
        let names: HashSet<&str> = set.iter().map(|c| c.name.as_str()).collect();

        set.iter()
            .map(|c| {
                let restricted = edges
                    .get(&c.name)
                    .map(|deps| {
                        deps.iter()
                            .filter(|d| names.contains(d.as_str()))
                            .cloned()
                            .collect()
                    })
                    .unwrap_or_default();
                (c.name.clone(), restricted)
            })
            .collect()
    }
}

fn build_ships(config: &EnvironmentConfig) -> HashMap<String, Arc<Ship>> {
    config
        .ships
        .iter()
        .map(|(name, ship_config)| {
            let docker_port = if ship_config.docker_port != 0 {
                ship_config.docker_port
            } else {
                config.ship_defaults.docker_port.unwrap_or(2375)
            };
            let ship = Ship {
                name: name.clone(),
                ip: ship_config.ip.clone(),
                endpoint: ship_config.endpoint.clone(),
                docker_port,
                api_version: ship_config
                    .api_version
                    .clone()
                    .or_else(|| config.ship_defaults.api_version.clone()),
                timeout: std::time::Duration::from_secs(
                    if ship_config.timeout != 0 {
                        ship_config.timeout
                    } else {
                        config.ship_defaults.timeout.unwrap_or(5)
                    },
                ),
            };
            (name.clone(), Arc::new(ship))
        })
        .collect()
}

/// Resolve a container instance's placement ship: the named ship if one
/// was given, or the environment's sole ship if there's exactly one,
/// erroring otherwise since placement would be ambiguous.
fn resolve_ship(
    ships: &HashMap<String, Arc<Ship>>,
    name: Option<&str>,
) -> Result<Arc<Ship>, ConductorError> {
    match name {
        Some(name) => ships
            .get(name)
            .cloned()
            .ok_or_else(|| ConductorError::Config(ConfigError::UnknownEntity(format!("ship '{}'", name)))),
        None => {
            let mut iter = ships.values();
            match (iter.next(), iter.next()) {
                (Some(only), None) => Ok(only.clone()),
                _ => Err(ConductorError::Config(ConfigError::UnknownEntity(
                    "ship (ambiguous placement: specify 'ship' on the container instance)".into(),
                ))),
            }
        }
    }
}

/// Seed the variables every container sees regardless of its own `env`
/// block: environment name, service name, container name, host IP, and
/// the image split into repository and tag.
fn seed_env(
    env: &mut HashMap<String, String>,
    environment_name: &str,
    service_name: &str,
    container_name: &str,
    host_ip: &str,
    image: &str,
) {
    let (repository, tag) = match image.rsplit_once(':') {
        Some((repo, tag)) if !tag.contains('/') => (repo.to_string(), tag.to_string()),
        _ => (image.to_string(), "latest".to_string()),
    };

    env.insert("MAESTRO_ENVIRONMENT_NAME".into(), environment_name.to_string());
    env.insert("SERVICE_NAME".into(), service_name.to_string());
    env.insert("CONTAINER_NAME".into(), container_name.to_string());
    env.insert("CONTAINER_HOST_ADDRESS".into(), host_ip.to_string());
    env.insert("DOCKER_IMAGE".into(), repository);
    env.insert("DOCKER_TAG".into(), tag);
}

fn expand_instances<'a>(
    service_name: &str,
    service_config: &'a crate::config::ServiceConfig,
) -> Vec<(String, ContainerConfig)> {
    match &service_config.instances {
        None => vec![(service_name.to_string(), ContainerConfig::default())],
        Some(ServiceInstances::Count(n)) => (1..=*n)
            .map(|i| (format!("{}-{}", service_name, i), ContainerConfig::default()))
            .collect(),
        Some(ServiceInstances::Named(map)) => map
            .iter()
            .map(|(suffix, cfg)| (format!("{}-{}", service_name, suffix), cfg.clone()))
            .collect(),
    }
}

fn parse_lifecycle_map(
    raw: &HashMap<String, Vec<crate::config::LifecycleCheckRaw>>,
) -> HashMap<String, Vec<LifecycleCheckConfig>> {
    raw.iter()
        .map(|(phase, checks)| {
            (
                phase.clone(),
                checks.iter().map(LifecycleCheckConfig::from_raw).collect(),
            )
        })
        .collect()
}

fn check_volume_conflicts(
    container_name: &str,
    volumes: &[crate::entities::VolumeMount],
) -> Result<(), ConductorError> {
    let mut seen: HashMap<&str, &str> = HashMap::new();
    for v in volumes {
        if let Some(existing_target) = seen.insert(v.source.as_str(), v.target.as_str()) {
            if existing_target != v.target {
                return Err(ConductorError::VolumeConflict(container_name.to_string()));
            }
        }
    }
    Ok(())
}

fn build_container_edges(
    services: &HashMap<String, Arc<Service>>,
    containers: &HashMap<String, Arc<Container>>,
) -> (HashMap<String, HashSet<String>>, HashMap<String, HashSet<String>>) {
    let mut forward: HashMap<String, HashSet<String>> = HashMap::new();
    let mut reverse: HashMap<String, HashSet<String>> = HashMap::new();

    for container in containers.values() {
        forward.entry(container.name.clone()).or_default();
        reverse.entry(container.name.clone()).or_default();
    }

    for service in services.values() {
        for dep_name in &service.requires {
            let Some(dep_service) = services.get(dep_name) else { continue };
            for container_name in &service.container_names {
                for dep_container in &dep_service.container_names {
                    forward
                        .entry(container_name.clone())
                        .or_default()
                        .insert(dep_container.clone());
                    reverse
                        .entry(dep_container.clone())
                        .or_default()
                        .insert(container_name.clone());
                }
            }
        }
    }

    (forward, reverse)
}

fn inject_link_variables(
    services: &HashMap<String, Arc<Service>>,
    containers: &mut HashMap<String, Arc<Container>>,
) {
    let snapshot: HashMap<String, Container> = containers
        .iter()
        .map(|(k, v)| (k.clone(), (**v).clone()))
        .collect();

    for (_name, container) in containers.iter_mut() {
        let Some(service) = services.get(&container.service) else { continue };
        let peers: Vec<&Container> = service
            .container_names
            .iter()
            .filter_map(|n| snapshot.get(n))
            .collect();

        let mut linked = Vec::new();
        for dep_name in service.requires.iter().chain(service.wants_info.iter()) {
            let Some(dep_service) = services.get(dep_name) else { continue };
            for dep_container_name in &dep_service.container_names {
                if let Some(c) = snapshot.get(dep_container_name) {
                    linked.push((c, false));
                }
            }
        }

        let vars = link_variables(container, &peers, &linked);
        let mut updated = (**container).clone();
        updated.env.extend(vars);
        *Arc::make_mut(container) = updated;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EnvironmentConfig;

    fn sample_config(yaml: &str) -> EnvironmentConfig {
        serde_yaml::from_str(yaml).unwrap()
    }

    const TWO_SERVICES: &str = r#"
name: sample
ships:
  ship1:
    ip: 10.0.0.1
services:
  db:
    image: postgres:16
  web:
    image: myapp:latest
    requires: [db]
"#;

    #[test]
    fn builds_dependency_edges() {
        let config = sample_config(TWO_SERVICES);
        let conductor = Conductor::build(&config).unwrap();
        let all = conductor.expand_things(&[], false).unwrap();
        let order = conductor.order(&all, true).unwrap();
        let positions: HashMap<_, _> = order.iter().enumerate().map(|(i, c)| (c.name.clone(), i)).collect();
        assert!(positions["db"] < positions["web"]);
    }

    #[test]
    fn detects_cycles() {
        let yaml = r#"
name: sample
ships:
  ship1:
    ip: 10.0.0.1
services:
  a:
    image: a
    requires: [b]
  b:
    image: b
    requires: [a]
"#;
        let config = sample_config(yaml);
        let conductor = Conductor::build(&config).unwrap();
        let all = conductor.expand_things(&[], false).unwrap();
        assert!(matches!(conductor.order(&all, true), Err(ConductorError::Cycle(_))));
    }

    #[test]
    fn order_is_deterministic_across_runs() {
        let config = sample_config(TWO_SERVICES);
        let conductor = Conductor::build(&config).unwrap();
        let all = conductor.expand_things(&[], false).unwrap();
        let first = conductor.order(&all, true).unwrap();
        let second = conductor.order(&all, true).unwrap();
        let first_names: Vec<_> = first.iter().map(|c| c.name.clone()).collect();
        let second_names: Vec<_> = second.iter().map(|c| c.name.clone()).collect();
        assert_eq!(first_names, second_names);
    }

    #[test]
    fn expand_things_skips_omitted_services_by_default() {
        let yaml = r#"
name: sample
ships:
  ship1:
    ip: 10.0.0.1
services:
  hidden:
    image: x
    omit: true
  visible:
    image: y
"#;
        let config = sample_config(yaml);
        let conductor = Conductor::build(&config).unwrap();
        let all = conductor.expand_things(&[], false).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all.iter().next().unwrap().name, "visible");
    }
}
