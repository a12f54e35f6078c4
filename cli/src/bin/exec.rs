//! `devsync-exec`: accepts one dev-side client at a time, applies `FILE`
//! requests under configured mappings, and optionally ships logs back (§6).

use anyhow::Context;
use clap::Parser;

use devsync_cli::common_args::CommonArgs;

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum LogMode {
    /// Ship no logs (§4.5 `DISABLED`).
    Disabled,
    /// Capture this process's own `tracing` events (§4.5 `INTERNAL`).
    Internal,
    /// Tail the profile's configured `log_file_path` (§4.5 `EXTERNAL`).
    External,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "devsync-exec",
    version,
    about = "Apply mirrored filesystem changes from a dev host, under configured mappings"
)]
struct Args {
    #[command(flatten)]
    common: CommonArgs,

    /// How to source logs shipped back to the dev side
    #[arg(long, value_enum, default_value_t = LogMode::External, help_heading = "Logging")]
    log_mode: LogMode,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // `INTERNAL` mode needs the capture layer installed before anything else
    // logs, so the log pipeline doesn't miss this process's own early events.
    let (capture_layer, internal_receiver) = if args.log_mode == LogMode::Internal {
        let (layer, receiver) = common::logging::CapturingLayer::new();
        (Some(layer), Some(receiver))
    } else {
        (None, None)
    };
    common::logging::init(
        &args.common.output_config(),
        common::TracingConfig {
            capture_layer,
            debug_log_file: None,
        },
    );

    common::runtime::run(args.common.runtime_config(), async_main(args, internal_receiver))
}

async fn async_main(
    args: Args,
    internal_receiver: Option<tokio::sync::mpsc::UnboundedReceiver<common::logging::LogRecord>>,
) -> anyhow::Result<()> {
    let profile = common::ExecProfile::load(&args.common.profile)
        .with_context(|| format!("failed to load exec profile from {}", args.common.profile.display()))?;
    profile.validate()?;

    if args.log_mode == LogMode::External && profile.log_file_path.is_none() {
        anyhow::bail!("--log-mode external requires log_file_path in the profile");
    }

    let cancel = tokio_util::sync::CancellationToken::new();
    let supervisor = core::ExecSupervisor::new(profile);

    let run_cancel = cancel.clone();
    let mut handle = tokio::spawn(async move { supervisor.run(internal_receiver, run_cancel).await });

    tokio::select! {
        result = &mut handle => {
            return result.context("exec supervisor task panicked")?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutting down on Ctrl-C");
            cancel.cancel();
        }
    }
    handle.await.context("exec supervisor task panicked")?
}
