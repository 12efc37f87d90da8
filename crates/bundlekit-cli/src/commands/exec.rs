use super::{json_pretty, open_bundle, Failure, EXIT_FAILURE};
use std::path::Path;
use std::process::Command;
use tracing::debug;

/// Set up the bundle, then run `command` with the sandbox variables inherited.
pub fn run(project: &Path, command: &[String], json: bool) -> Result<u8, Failure> {
    let Some((program, args)) = command.split_first() else {
        return Err(Failure::new("no command given"));
    };

    let mut bundle = open_bundle(project)?;
    let report = bundle.setup()?;
    if json {
        eprintln!("{}", json_pretty(&report)?);
    }

    debug!("exec {program} {}", args.join(" "));
    let status = Command::new(program)
        .args(args)
        .current_dir(project)
        .status()
        .map_err(|e| Failure::new(format!("failed to run {program}: {e}")))?;

    Ok(status
        .code()
        .and_then(|c| u8::try_from(c).ok())
        .unwrap_or(EXIT_FAILURE))
}
