use super::{json_pretty, open_bundle, Failure, EXIT_SUCCESS};
use bundlekit_schema::DescriptorOrigin;
use std::path::Path;

pub fn run(project: &Path, name: &str, json: bool) -> Result<u8, Failure> {
    let mut bundle = open_bundle(project)?;
    bundle.setup()?;
    let pkg = bundle.lookup(name)?;

    if json {
        println!("{}", json_pretty(&pkg)?);
        return Ok(EXIT_SUCCESS);
    }

    println!("{} {}", pkg.name, pkg.version);
    println!("  summary: {}", pkg.summary);
    println!("  root:    {}", pkg.root.display());
    match &pkg.origin {
        DescriptorOrigin::Authored { path } => println!("  descriptor: {}", path.display()),
        DescriptorOrigin::Synthesized => println!("  descriptor: (synthesized)"),
    }
    println!("  files:   {}", pkg.files.len());
    for file in &pkg.files {
        println!("    {file}");
    }
    Ok(EXIT_SUCCESS)
}
