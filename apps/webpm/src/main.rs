//! Local smoke-test binary: resolves and fetches one package through
//! `webpm-core` and prints a summary. Not the packaged CLI surface this
//! library targets (it's meant to run inside a browser), just a way to
//! drive the pipeline against a real registry from a terminal.

use anyhow::Result;
use clap::Parser;
use webpm_core::InstallOptions;

#[derive(Parser)]
#[command(name = "webpm", about = "Smoke-test driver for webpm-core")]
struct Args {
    /// Package specifier, e.g. "react" or "react@18.2.0".
    specifier: String,

    #[arg(long)]
    version: Option<String>,

    #[arg(long, default_value = "https://registry.npmjs.org")]
    registry: String,

    #[arg(long)]
    prefer_offline: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let opts = InstallOptions {
        version: args.version,
        registry: args.registry,
        prefer_offline: args.prefer_offline,
        ..InstallOptions::default()
    };

    let tree = webpm_core::install(&args.specifier, opts).await?;

    webpm_logger::info(&format!(
        "resolved {}@{}: {} packages, {} files ({}ms resolve, {}ms fetch, {}ms extract, {}ms total)",
        tree.root.name,
        tree.root.version,
        tree.all_packages.len(),
        tree.total_files,
        tree.timings.resolution_ms,
        tree.timings.fetching_ms,
        tree.timings.extraction_ms,
        tree.timings.total_ms,
    ));

    Ok(())
}
