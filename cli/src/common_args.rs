//! CLI flags shared by both binaries, flattened into each binary's own
//! `Args` the way the teacher groups option clusters under `help_heading`s.

use std::path::PathBuf;

#[derive(clap::Args, Debug, Clone)]
pub struct CommonArgs {
    /// Path to the TOML profile file
    #[arg(long, value_name = "PATH")]
    pub profile: PathBuf,

    /// Verbose level: -v INFO / -vv DEBUG / -vvv TRACE (default: INFO)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, help_heading = "Output")]
    pub verbose: u8,

    /// Quiet mode, only report errors
    #[arg(short = 'q', long = "quiet", help_heading = "Output")]
    pub quiet: bool,

    /// Number of worker threads (0 = number of CPU cores)
    #[arg(long, default_value_t = 0, value_name = "N", help_heading = "Runtime")]
    pub max_workers: usize,

    /// Number of blocking threads (0 = tokio default)
    #[arg(long, default_value_t = 0, value_name = "N", help_heading = "Runtime")]
    pub max_blocking_threads: usize,
}

impl CommonArgs {
    #[must_use]
    pub fn output_config(&self) -> common::OutputConfig {
        common::OutputConfig {
            quiet: self.quiet,
            verbose: self.verbose,
        }
    }

    #[must_use]
    pub fn runtime_config(&self) -> common::RuntimeConfig {
        common::RuntimeConfig {
            max_workers: self.max_workers,
            max_blocking_threads: self.max_blocking_threads,
        }
    }
}
