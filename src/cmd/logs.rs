use super::{CommandContext, ThingsArgs};

pub async fn run(
    ctx: CommandContext,
    things: ThingsArgs,
    follow: bool,
    lines: Option<u32>,
) -> anyhow::Result<()> {
    let selection = ctx.conductor.expand_things(&things.things, true)?;
    let mut containers: Vec<_> = selection.into_iter().collect();
    containers.sort_by(|a, b| a.name.cmp(&b.name));
    let multiple = containers.len() > 1;

    for container in containers {
        let engine = ctx.engine_for(&container)?;
        let output = engine.logs(&container.name, lines, follow).await?;
        if multiple {
            println!("==> {} <==", container.name);
        }
        print!("{}", output);
    }

    Ok(())
}
