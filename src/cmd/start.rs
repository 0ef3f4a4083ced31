use maestro::play::{dependency_map, Play};
use maestro::task::StartTask;

use super::{resolve_concurrency, CommandContext, ConcurrencyArgs, RefreshArgs, ThingsArgs};

pub async fn run(
    ctx: CommandContext,
    things: ThingsArgs,
    concurrency: ConcurrencyArgs,
    refresh: RefreshArgs,
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
        what: "start".into(),
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

    play.run(
        containers,
        move |name| deps.get(name).cloned().unwrap_or_default(),
        move |c| -> Box<dyn maestro::task::Task> {
            Box::new(StartTask {
                reuse,
                refresh_image: refresh_images,
                registry_auth: image_auth.get(&c.name).cloned().flatten(),
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
