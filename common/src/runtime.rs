//! Builds the tokio runtime from [`crate::config::RuntimeConfig`] and runs a
//! binary's async body on it, mirroring the teacher's `common::run` harness
//! pattern of keeping runtime construction out of `main`.

use anyhow::Result;

/// Builds a multi-threaded tokio runtime honoring `max_workers`/`max_blocking_threads`
/// (0 means "use the tokio default"), then blocks on `future`.
pub fn run<F, T>(runtime_cfg: crate::config::RuntimeConfig, future: F) -> Result<T>
where
    F: std::future::Future<Output = Result<T>>,
{
    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.enable_all();
    if runtime_cfg.max_workers > 0 {
        builder.worker_threads(runtime_cfg.max_workers);
    }
    if runtime_cfg.max_blocking_threads > 0 {
        builder.max_blocking_threads(runtime_cfg.max_blocking_threads);
    }
    let rt = builder.build()?;
    rt.block_on(future)
}
