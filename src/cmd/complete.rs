use super::CommandContext;

/// Prints the completion candidates for the given partial argument tokens:
/// subcommand names when nothing has been typed yet, otherwise service and
/// container names, one per line, for the shell's completion script to
/// consume.
pub async fn run(ctx: CommandContext, tokens: Vec<String>) -> anyhow::Result<()> {
    const VERBS: &[&str] = &[
        "status", "pull", "start", "stop", "restart", "clean", "logs", "deptree", "complete",
    ];

    if tokens.is_empty() {
        for verb in VERBS {
            println!("{}", verb);
        }
        return Ok(());
    }

    let mut names: Vec<&str> = ctx
        .conductor
        .services
        .keys()
        .map(String::as_str)
        .chain(ctx.conductor.containers.keys().map(String::as_str))
        .collect();
    names.sort();
    names.dedup();

    let prefix = tokens.last().map(String::as_str).unwrap_or("");
    for name in names {
        if name.starts_with(prefix) {
            println!("{}", name);
        }
    }

    Ok(())
}
