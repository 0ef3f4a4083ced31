use std::collections::HashSet;

use super::{CommandContext, ThingsArgs};

pub async fn run(ctx: CommandContext, things: ThingsArgs, recursive: bool) -> anyhow::Result<()> {
    let names: Vec<String> = if things.things.is_empty() {
        let mut all: Vec<String> = ctx.conductor.services.keys().cloned().collect();
        all.sort();
        all
    } else {
        things.things.clone()
    };

    for name in names {
        let Some(service) = ctx.conductor.services.get(&name) else {
            anyhow::bail!("unknown service '{}'", name);
        };
        println!("{}", service.name);
        let mut seen = HashSet::new();
        print_requires(&ctx, service, 1, recursive, &mut seen);
    }

    Ok(())
}

fn print_requires(
    ctx: &CommandContext,
    service: &maestro::entities::Service,
    depth: usize,
    recursive: bool,
    seen: &mut HashSet<String>,
) {
    let indent = "  ".repeat(depth);
    for dep_name in &service.requires {
        println!("{}{}", indent, dep_name);
        if !recursive && !seen.insert(dep_name.clone()) {
            continue;
        }
        if let Some(dep) = ctx.conductor.services.get(dep_name) {
            print_requires(ctx, dep, depth + 1, recursive, seen);
        }
    }
}
