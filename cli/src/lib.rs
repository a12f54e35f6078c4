//! Shared code between the `devsync-dev` and `devsync-exec` binaries.

pub mod common_args;
