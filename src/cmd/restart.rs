use std::time::Duration;

use maestro::play::{dependency_map, Play};
use maestro::task::{RestartTask, StartTask};

use super::{resolve_concurrency, CommandContext, ConcurrencyArgs, RefreshArgs, ThingsArgs};

#[allow(clippy::too_many_arguments)]
pub async fn run(
    ctx: CommandContext,
    things: ThingsArgs,
    concurrency: ConcurrencyArgs,
    refresh: RefreshArgs,
    step_delay: u64,
    stop_start_delay: u64,
    only_if_changed: bool,
) -> anyhow::Result<()> {
    let selection = ctx.conductor.expand_things(&things.things, false)?;
    let working_set = if concurrency.ignore_dependencies {
        selection
    } else {
        ctx.conductor.gather(&selection, true)
    };

    let deps = if concurrency.ignore_dependencies {
        Default::default()
    } else {
        dependency_map(&ctx.conductor, &working_set, true)
    };

    let play = Play {
        what: "restart".into(),
        concurrency: resolve_concurrency(&concurrency, working_set.len()),
    };

    let containers: Vec<_> = working_set.into_iter().collect();
    let engines = ctx.engines.clone();
    let image_auth: std::collections::HashMap<String, Option<maestro::engine::RegistryAuth>> =
        containers
            .iter()
            .map(|c| (c.name.clone(), ctx.registry_auth_for(&c.image)))
            .collect();
    let reuse = refresh.reuse;
    let refresh_images = refresh.refresh_images;

    if step_delay > 0 {
        // A non-zero step delay serializes the play: each container must
        // fully finish before the next may be acted on.
        play_with_step_delay(
            &play,
            containers,
            &deps,
            &engines,
            &image_auth,
            reuse,
            refresh_images,
            stop_start_delay,
            only_if_changed,
            ctx.output.clone(),
            ctx.auditor.clone(),
        )
        .await?;
        return Ok(());
    }

    play.run(
        containers,
        move |name| deps.get(name).cloned().unwrap_or_default(),
        move |c| -> Box<dyn maestro::task::Task> {
            Box::new(RestartTask {
                start: StartTask {
                    reuse,
                    refresh_image: refresh_images,
                    registry_auth: image_auth.get(&c.name).cloned().flatten(),
                },
                stop_start_delay: Duration::from_secs(stop_start_delay),
                only_if_changed,
            })
        },
        move |c| {
            engines
                .get(&c.ship)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("no engine for ship '{}'", c.ship))
        },
        ctx.output,
        ctx.auditor,
    )
    .await?;

    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn play_with_step_delay(
    play: &Play,
    containers: Vec<std::sync::Arc<maestro::entities::Container>>,
    deps: &std::collections::HashMap<String, std::collections::HashSet<String>>,
    engines: &std::collections::HashMap<String, std::sync::Arc<dyn maestro::engine::Engine>>,
    image_auth: &std::collections::HashMap<String, Option<maestro::engine::RegistryAuth>>,
    reuse: bool,
    refresh_images: bool,
    stop_start_delay: u64,
    only_if_changed: bool,
    output: std::sync::Arc<maestro::output::OutputManager>,
    auditor: std::sync::Arc<maestro::audit::MultiplexAuditor>,
) -> anyhow::Result<()> {
    let order = {
        let mut remaining: Vec<_> = containers.clone();
        let mut done = std::collections::HashSet::new();
        let mut ordered = Vec::new();
        while !remaining.is_empty() {
            let ready_idx = remaining.iter().position(|c| {
                deps.get(&c.name)
                    .map(|d| d.iter().all(|dep| done.contains(dep)))
                    .unwrap_or(true)
            });
            let Some(idx) = ready_idx else { break };
            let c = remaining.remove(idx);
            done.insert(c.name.clone());
            ordered.push(c);
        }
        ordered
    };

    for container in order {
        let engine = engines
            .get(&container.ship)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no engine for ship '{}'", container.ship))?;
        let single = vec![container.clone()];
        let single_engines = engines.clone();

        play.run(
            single,
            |_name| Default::default(),
            {
                let image_auth = image_auth.clone();
                move |c| -> Box<dyn maestro::task::Task> {
                    Box::new(RestartTask {
                        start: StartTask {
                            reuse,
                            refresh_image: refresh_images,
                            registry_auth: image_auth.get(&c.name).cloned().flatten(),
                        },
                        stop_start_delay: Duration::from_secs(stop_start_delay),
                        only_if_changed,
                    })
                }
            },
            move |c| {
                single_engines
                    .get(&c.ship)
                    .cloned()
                    .ok_or_else(|| anyhow::anyhow!("no engine for ship '{}'", c.ship))
            },
            output.clone(),
            auditor.clone(),
        )
        .await?;

        let _ = engine;
        tokio::time::sleep(Duration::from_secs(step_delay)).await;
    }

    Ok(())
}
