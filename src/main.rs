use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli_settings_gen::{print_stats, print_warnings, run};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Root of the firmware source tree, used as the compiler's include path.
    source_root: PathBuf,

    /// Path to the YAML settings description.
    description: PathBuf,

    /// Print post-run statistics (settings count, word-table size, estimated
    /// name storage) to standard output.
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let outcome: anyhow::Result<()> = (|| {
        let output = run(&args.source_root, &args.description)
            .context("settings generation failed")?;
        if args.verbose {
            print_stats(&output.stats);
        }
        print_warnings(&output.unused_tables);
        Ok(())
    })();

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:?}");
            ExitCode::FAILURE
        }
    }
}
