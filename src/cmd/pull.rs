use maestro::play::{dependency_map, Play};
use maestro::task::PullTask;

use super::{resolve_concurrency, CommandContext, ConcurrencyArgs, ThingsArgs};

pub async fn run(
    ctx: CommandContext,
    things: ThingsArgs,
    concurrency: ConcurrencyArgs,
) -> anyhow::Result<()> {
    let selection = ctx.conductor.expand_things(&things.things, false)?;
    let working_set = if concurrency.with_dependencies {
        ctx.conductor.gather(&selection, true)
    } else {
        selection
    };

    let deps = if concurrency.ignore_dependencies {
        Default::default()
    } else {
        dependency_map(&ctx.conductor, &working_set, true)
    };

    let play = Play {
        what: "pull".into(),
        concurrency: resolve_concurrency(&concurrency, working_set.len()),
    };

    let containers: Vec<_> = working_set.into_iter().collect();
    let engines = ctx.engines.clone();
    let image_auth: std::collections::HashMap<String, Option<maestro::engine::RegistryAuth>> =
        containers
            .iter()
            .map(|c| (c.name.clone(), ctx.registry_auth_for(&c.image)))
            .collect();

    play.run(
        containers,
        move |name| deps.get(name).cloned().unwrap_or_default(),
        move |c| -> Box<dyn maestro::task::Task> {
            Box::new(PullTask {
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
