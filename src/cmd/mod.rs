//! CLI command handlers: one module per verb, matching the argument groups
//! of the upstream `status`/`pull`/`start`/`stop`/`restart`/`clean`/`logs`/
//! `deptree`/`complete` subcommands.

mod clean;
mod complete;
mod deptree;
mod logs;
mod pull;
mod restart;
mod start;
mod status;
mod stop;

use std::collections::HashMap;
use std::sync::Arc;

use clap::{Args, Subcommand};

use maestro::audit::{AuditSink, LogSink, MultiplexAuditor};
use maestro::conductor::Conductor;
use maestro::config::EnvironmentConfig;
use maestro::engine::{BollardEngine, Engine, RegistryAuth};
use maestro::entities::Container;
use maestro::output::OutputManager;

#[derive(Args, Clone, Default)]
pub struct ThingsArgs {
    /// Container(s) or service(s) to act on; defaults to every
    /// non-omitted service (every service for `status`).
    pub things: Vec<String>,
}

#[derive(Args, Clone, Default)]
pub struct ConcurrencyArgs {
    /// Limit how many containers can be acted on at the same time.
    #[arg(short = 'c', long)]
    pub concurrency: Option<usize>,

    /// Include dependencies in the selection.
    #[arg(short = 'd', long = "with-dependencies")]
    pub with_dependencies: bool,

    /// Ignore dependency order (run everything concurrently).
    #[arg(short = 'i', long = "ignore-dependencies")]
    pub ignore_dependencies: bool,
}

#[derive(Args, Clone, Default)]
pub struct RefreshArgs {
    /// Force refresh of container images from the registry.
    #[arg(short = 'r', long = "refresh-images", conflicts_with = "reuse")]
    pub refresh_images: bool,

    /// Reuse an existing container instead of recreating it.
    #[arg(long)]
    pub reuse: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Display container status
    Status {
        #[command(flatten)]
        things: ThingsArgs,
        #[command(flatten)]
        concurrency: ConcurrencyArgs,
        /// Show full status including per-port reachability.
        #[arg(short = 'F', long)]
        full: bool,
    },
    /// Pull container images from registry
    Pull {
        #[command(flatten)]
        things: ThingsArgs,
        #[command(flatten)]
        concurrency: ConcurrencyArgs,
    },
    /// Start services and containers
    Start {
        #[command(flatten)]
        things: ThingsArgs,
        #[command(flatten)]
        concurrency: ConcurrencyArgs,
        #[command(flatten)]
        refresh: RefreshArgs,
    },
    /// Stop services and containers
    Stop {
        #[command(flatten)]
        things: ThingsArgs,
        #[command(flatten)]
        concurrency: ConcurrencyArgs,
    },
    /// Restart services and containers
    Restart {
        #[command(flatten)]
        things: ThingsArgs,
        #[command(flatten)]
        concurrency: ConcurrencyArgs,
        #[command(flatten)]
        refresh: RefreshArgs,
        /// Delay, in seconds, between each container.
        #[arg(long, default_value_t = 0)]
        step_delay: u64,
        /// Delay, in seconds, between stopping and starting each container.
        #[arg(long, default_value_t = 0)]
        stop_start_delay: u64,
        /// Only restart if the container image was updated.
        #[arg(long)]
        only_if_changed: bool,
    },
    /// Cleanup and remove stopped containers
    Clean {
        #[command(flatten)]
        things: ThingsArgs,
        #[command(flatten)]
        concurrency: ConcurrencyArgs,
    },
    /// Show logs for a container
    Logs {
        #[command(flatten)]
        things: ThingsArgs,
        /// Follow logs as they are generated.
        #[arg(short = 'F', long)]
        follow: bool,
        /// Only show the last LINES lines.
        #[arg(short = 'n')]
        lines: Option<u32>,
    },
    /// Display the service dependency tree
    Deptree {
        #[command(flatten)]
        things: ThingsArgs,
        /// Show dependencies recursively (possible duplicates).
        #[arg(short = 'r', long)]
        recursive: bool,
    },
    /// Shell auto-completion helper
    Complete {
        tokens: Vec<String>,
    },
}

/// Shared context every verb needs: the built entity graph, a concrete
/// engine per ship, the output manager, and the audit dispatcher.
pub struct CommandContext {
    pub conductor: Conductor,
    pub engines: HashMap<String, Arc<dyn Engine>>,
    pub output: Arc<OutputManager>,
    pub auditor: Arc<MultiplexAuditor>,
    pub registries: HashMap<String, RegistryAuth>,
}

impl CommandContext {
    pub fn build(config: EnvironmentConfig) -> anyhow::Result<Self> {
        let conductor = Conductor::build(&config)?;

        let mut engines: HashMap<String, Arc<dyn Engine>> = HashMap::new();
        for ship in conductor.ships.values() {
            let engine = BollardEngine::connect(&ship.address(), ship.api_version.as_deref())?;
            engines.insert(ship.name.clone(), Arc::new(engine));
        }

        let registries = config
            .registries
            .iter()
            .map(|(key, reg)| {
                (
                    key.clone(),
                    RegistryAuth {
                        username: reg.username.clone(),
                        password: reg.password.clone(),
                        email: reg.email.clone(),
                        server_address: Some(key.clone()),
                    },
                )
            })
            .collect();

        let sinks: Vec<Arc<dyn AuditSink>> = vec![Arc::new(LogSink)];

        Ok(Self {
            conductor,
            engines,
            output: Arc::new(OutputManager::new()),
            auditor: Arc::new(MultiplexAuditor::new(sinks)),
            registries,
        })
    }

    pub fn engine_for(&self, container: &Container) -> anyhow::Result<Arc<dyn Engine>> {
        self.engines
            .get(&container.ship)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no engine configured for ship '{}'", container.ship))
    }

    /// Resolve registry credentials for an image, matching by registry key
    /// or by host; silently returns `None` if nothing is configured (the
    /// login task treats that as "skip, no username available").
    pub fn registry_auth_for(&self, image: &str) -> Option<RegistryAuth> {
        let host = maestro::task::registry_host(image)?;
        self.registries
            .get(host)
            .or_else(|| self.registries.values().find(|r| r.server_address.as_deref() == Some(host)))
            .cloned()
    }
}

/// Concurrency limit, clamped to the selection size, matching the
/// upstream's "no explicit limit means run everything in parallel".
pub fn resolve_concurrency(args: &ConcurrencyArgs, selection_size: usize) -> usize {
    args.concurrency.unwrap_or(selection_size).max(1)
}

pub async fn dispatch(command: Commands, ctx: CommandContext) -> anyhow::Result<()> {
    match command {
        Commands::Status { things, concurrency, full } => {
            status::run(ctx, things, concurrency, full).await
        }
        Commands::Pull { things, concurrency } => pull::run(ctx, things, concurrency).await,
        Commands::Start { things, concurrency, refresh } => {
            start::run(ctx, things, concurrency, refresh).await
        }
        Commands::Stop { things, concurrency } => stop::run(ctx, things, concurrency).await,
        Commands::Restart {
            things,
            concurrency,
            refresh,
            step_delay,
            stop_start_delay,
            only_if_changed,
        } => {
            restart::run(
                ctx,
                things,
                concurrency,
                refresh,
                step_delay,
                stop_start_delay,
                only_if_changed,
            )
            .await
        }
        Commands::Clean { things, concurrency } => clean::run(ctx, things, concurrency).await,
        Commands::Logs { things, follow, lines } => logs::run(ctx, things, follow, lines).await,
        Commands::Deptree { things, recursive } => deptree::run(ctx, things, recursive).await,
        Commands::Complete { tokens } => complete::run(ctx, tokens).await,
    }
}
