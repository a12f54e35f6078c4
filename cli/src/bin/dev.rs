//! `devsync-dev`: watches a local directory and mirrors changes to a remote
//! exec host over an SSH tunnel (§6).

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use devsync_cli::common_args::CommonArgs;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "devsync-dev",
    version,
    about = "Mirror local filesystem changes to a remote exec host over SSH"
)]
struct Args {
    #[command(flatten)]
    common: CommonArgs,

    /// Directory to store the received remote log and any dev-side state
    #[arg(long, value_name = "PATH", default_value = "./devsync-data", help_heading = "Output")]
    data_dir: PathBuf,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    common::logging::init(&args.common.output_config(), common::TracingConfig::default());

    common::runtime::run(args.common.runtime_config(), async_main(args))
}

async fn async_main(args: Args) -> anyhow::Result<()> {
    let profile = common::DevProfile::load(&args.common.profile)
        .with_context(|| format!("failed to load dev profile from {}", args.common.profile.display()))?;
    profile.validate()?;

    let cancel = tokio_util::sync::CancellationToken::new();
    let supervisor = core::DevSupervisor::new(profile, args.data_dir);

    let run_cancel = cancel.clone();
    let mut handle = tokio::spawn(async move { supervisor.run(run_cancel).await });

    tokio::select! {
        result = &mut handle => {
            return result.context("dev supervisor task panicked")?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutting down on Ctrl-C");
            cancel.cancel();
        }
    }
    handle.await.context("dev supervisor task panicked")?
}
