use maestro::play::{dependency_map, Play};
use maestro::task::CleanTask;

use super::{resolve_concurrency, CommandContext, ConcurrencyArgs, ThingsArgs};

pub async fn run(
    ctx: CommandContext,
    things: ThingsArgs,
    concurrency: ConcurrencyArgs,
) -> anyhow::Result<()> {
    let selection = ctx.conductor.expand_things(&things.things, false)?;
    let working_set = if concurrency.ignore_dependencies {
        selection
    } else {
        ctx.conductor.gather(&selection, false)
    };

    let deps = if concurrency.ignore_dependencies {
        Default::default()
    } else {
        dependency_map(&ctx.conductor, &working_set, false)
    };

    let play = Play {
        what: "clean".into(),
        concurrency: resolve_concurrency(&concurrency, working_set.len()),
    };

    let containers: Vec<_> = working_set.into_iter().collect();
    let engines = ctx.engines.clone();

    play.run(
        containers,
        move |name| deps.get(name).cloned().unwrap_or_default(),
        |_c| -> Box<dyn maestro::task::Task> { Box::new(CleanTask) },
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
