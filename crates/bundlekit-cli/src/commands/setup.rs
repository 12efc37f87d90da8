use super::{colorize_status, json_pretty, open_bundle, Failure, EXIT_SUCCESS};
use bundlekit_core::SetupOutcome;
use std::path::Path;

pub fn run(project: &Path, groups: &[String], json: bool) -> Result<u8, Failure> {
    let mut bundle = open_bundle(project)?;
    let report = bundle.setup()?;
    let required = bundle.require_groups(groups)?;

    if json {
        let value = serde_json::json!({
            "setup": report,
            "required": required,
        });
        println!("{}", json_pretty(&value)?);
        return Ok(EXIT_SUCCESS);
    }

    match &report.outcome {
        SetupOutcome::AlreadyActive => println!("{}", colorize_status("already active")),
        SetupOutcome::Fresh => println!("{}", colorize_status("fresh")),
        SetupOutcome::Regenerated { reason: None } => {
            println!("{} (no artifact yet)", colorize_status("regenerated"));
        }
        SetupOutcome::Regenerated {
            reason: Some(reason),
        } => println!("{} ({reason})", colorize_status("regenerated")),
    }
    for pkg in &required {
        println!("  {} {}", pkg.name, pkg.version);
    }
    Ok(EXIT_SUCCESS)
}
