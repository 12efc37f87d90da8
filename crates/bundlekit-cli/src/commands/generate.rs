use super::{colorize_status, json_pretty, open_bundle, Failure, EXIT_SUCCESS};
use bundlekit_core::WriteOutcome;
use std::path::Path;

pub fn run(project: &Path, json: bool) -> Result<u8, Failure> {
    let bundle = open_bundle(project)?;
    let report = bundle.generate()?;

    if json {
        println!("{}", json_pretty(&report)?);
    } else {
        let status = match report.write {
            WriteOutcome::Written => "written",
            WriteOutcome::Unchanged => "unchanged",
        };
        println!(
            "{} {} ({} packages)",
            colorize_status(status),
            report.artifact.display(),
            report.packages.len()
        );
    }
    Ok(EXIT_SUCCESS)
}
