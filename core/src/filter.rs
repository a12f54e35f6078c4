//! Event filter (§4.3, rules 1-7; rules 8-9 need a path mapper and file I/O
//! respectively and live in [`crate::watcher`]). Grounded directly in
//! `original_source/pyremotedev/localrepositoryhandler.py`'s
//! `LocalRepositoryHandler.__filter_event`.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

const REJECTED_EXTENSIONS: &[&str] = &[".swp", ".swpx", ".swx", ".tmp", ".offset"];
const REJECTED_FILENAMES: &[&str] = &["4913", ".gitignore"];
const REJECTED_DIRS: &[&str] = &[".git", ".vscode", ".editor"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawKind {
    Created,
    Modified,
    Removed,
    Moved,
}

/// A filesystem-change event in a form independent of the `notify` crate's
/// own event type, so the drop-rule chain is unit-testable without a real
/// watcher.
#[derive(Debug, Clone)]
pub struct RawEvent {
    pub kind: RawKind,
    pub src_path: PathBuf,
    pub dest_path: Option<PathBuf>,
    pub is_dir: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    EmptyOrSelfEvent,
    ExplicitDropList,
    RejectedExtension,
    TildePrefixOrSuffix,
    RejectedFilename,
    RejectedDirSegment,
    DirectoryModified,
}

fn has_rejected_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| REJECTED_EXTENSIONS.contains(&format!(".{e}").as_str()))
        .unwrap_or(false)
}

fn starts_or_ends_with_tilde(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('~') || n.ends_with('~'))
        .unwrap_or(false)
}

fn has_rejected_filename(path: &Path) -> bool {
    // Exact basename match (SPEC_FULL.md §4.3 rule 5: "Basename ∈ {4913,
    // .gitignore}"), not the original's looser `endswith` check - see
    // DESIGN.md for the fidelity note.
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| REJECTED_FILENAMES.contains(&n))
        .unwrap_or(false)
}

fn has_rejected_dir_segment(path: &Path) -> bool {
    path.components().any(|c| {
        c.as_os_str()
            .to_str()
            .map(|s| REJECTED_DIRS.contains(&s))
            .unwrap_or(false)
    })
}

/// Evaluates the ordered drop-rule chain (§4.3 steps 1-7). `None` means the
/// event survives and should proceed to path mapping (step 8) and, for
/// `UPDATE`/`CREATE`, content read (step 9).
#[must_use]
pub fn evaluate(
    event: &RawEvent,
    drop_list: &HashSet<PathBuf>,
    self_path: Option<&Path>,
) -> Option<DropReason> {
    if event.src_path.as_os_str().is_empty() || event.src_path == Path::new(".") {
        return Some(DropReason::EmptyOrSelfEvent);
    }
    if let Some(self_path) = self_path {
        if event.src_path == self_path {
            return Some(DropReason::EmptyOrSelfEvent);
        }
    }
    if drop_list.contains(&event.src_path) {
        return Some(DropReason::ExplicitDropList);
    }
    if let Some(dest) = &event.dest_path {
        if drop_list.contains(dest) {
            return Some(DropReason::ExplicitDropList);
        }
    }
    if has_rejected_extension(&event.src_path) {
        return Some(DropReason::RejectedExtension);
    }
    if starts_or_ends_with_tilde(&event.src_path)
        || event.dest_path.as_deref().is_some_and(starts_or_ends_with_tilde)
    {
        return Some(DropReason::TildePrefixOrSuffix);
    }
    if has_rejected_filename(&event.src_path) {
        return Some(DropReason::RejectedFilename);
    }
    if has_rejected_dir_segment(&event.src_path) {
        return Some(DropReason::RejectedDirSegment);
    }
    if event.kind == RawKind::Modified && event.is_dir {
        return Some(DropReason::DirectoryModified);
    }
    None
}
