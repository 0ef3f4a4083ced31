use maestro::play::{dependency_map, Play};
use maestro::task::{FullStatusTask, StatusTask};

use super::{resolve_concurrency, CommandContext, ConcurrencyArgs, ThingsArgs};

pub async fn run(
    ctx: CommandContext,
    things: ThingsArgs,
    concurrency: ConcurrencyArgs,
    full: bool,
) -> anyhow::Result<()> {
    let selection = ctx.conductor.expand_things(&things.things, true)?;
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
        what: "status".into(),
        concurrency: resolve_concurrency(&concurrency, working_set.len()),
    };

    let containers: Vec<_> = working_set.into_iter().collect();
    let engines = ctx.engines.clone();
    play.run(
        containers,
        move |name| deps.get(name).cloned().unwrap_or_default(),
        move |_c: &maestro::entities::Container| -> Box<dyn maestro::task::Task> {
            if full {
                Box::new(FullStatusTask)
            } else {
                Box::new(StatusTask)
            }
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
