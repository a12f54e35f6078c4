//! Internal library backing the `devsync-dev`/`devsync-exec` binaries:
//! path mapping (C2), filesystem watching and request building (C3),
//! request execution (C4), the log pipeline (C5), endpoint state machines
//! (C7) and the supervisor (C8). Not intended for direct use outside this
//! workspace.

pub mod endpoint;
pub mod executor;
pub mod filter;
pub mod history;
pub mod logpipe;
pub mod mapping;
pub mod supervisor;
pub mod watcher;

pub use endpoint::{DevSync, ExecSync};
pub use executor::ExecutorQueue;
pub use history::LoopSuppression;
pub use logpipe::{LogSource, RotatingWriter};
pub use mapping::{DevMapper, ExecMapper, PathMapper};
pub use supervisor::{DevSupervisor, ExecSupervisor};
