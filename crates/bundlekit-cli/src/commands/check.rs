use super::{colorize_status, json_pretty, open_bundle, Failure, EXIT_FAILURE, EXIT_SUCCESS};
use std::path::Path;

pub fn run(project: &Path, json: bool) -> Result<u8, Failure> {
    let bundle = open_bundle(project)?;
    let report = bundle.check()?;

    if json {
        println!("{}", json_pretty(&report)?);
    } else {
        match &report.reason {
            None => println!("{}", colorize_status("fresh")),
            Some(reason) => println!("{}: {reason}", colorize_status("stale")),
        }
        println!("  declaration: {}", report.declaration_checksum.short());
        println!("  lock:        {}", report.lock_checksum.short());
        match &report.artifact {
            Some(stamp) => println!("  artifact:    generated by {}", stamp.generator_version),
            None => println!("  artifact:    (none)"),
        }
    }

    Ok(if report.fresh { EXIT_SUCCESS } else { EXIT_FAILURE })
}
