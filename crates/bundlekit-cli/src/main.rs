mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "bundle",
    version,
    about = "Locked load-path environments for package bundles"
)]
struct Cli {
    /// Project directory containing the declaration and lock.
    #[arg(long, default_value = ".", global = true)]
    project: PathBuf,

    /// Output results as structured JSON.
    #[arg(long, default_value_t = false, global = true)]
    json: bool,

    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Enable trace-level logging (more detailed than --verbose).
    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Report whether the environment artifact is fresh; writes nothing.
    Check,
    /// Regenerate the environment artifact from the lock.
    Generate,
    /// Verify or regenerate the artifact and activate the bundle.
    Setup {
        /// Groups to activate (default group when omitted).
        #[arg(long = "group")]
        groups: Vec<String>,
    },
    /// Run a command with the bundle environment exported.
    Exec {
        /// Command and arguments to run.
        #[arg(required = true, last = true)]
        command: Vec<String>,
    },
    /// Show the descriptor of a bundled package.
    Show {
        /// Package name.
        name: String,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("BUNDLEKIT_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();

    let project = cli.project.as_path();
    let json_output = cli.json;

    let result = match cli.command {
        Commands::Check => commands::check::run(project, json_output),
        Commands::Generate => commands::generate::run(project, json_output),
        Commands::Setup { groups } => commands::setup::run(project, &groups, json_output),
        Commands::Exec { command } => commands::exec::run(project, &command, json_output),
        Commands::Show { name } => commands::show::run(project, &name, json_output),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(failure) => {
            eprintln!("error: {failure}");
            ExitCode::from(failure.code)
        }
    }
}
