//! Bridges the synchronous `notify` watcher callback into the async world
//! (the same bridge shown in `other_examples/Kristopher38-syncd`'s
//! `main.rs`), and builds `FILE` requests from surviving events (§4.3).

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use notify::{RecommendedWatcher, Watcher as _};
use transport::protocol::{FileAction, FileKind, FileRequest};

use crate::filter::{self, DropReason, RawEvent, RawKind};
use crate::mapping::PathMapper;

/// Owns the underlying OS watch handle; dropping it stops the watch.
pub struct DirWatcher {
    _inner: RecommendedWatcher,
    pub events: tokio::sync::mpsc::UnboundedReceiver<RawEvent>,
}

/// Starts a recursive watch on `root`, translating `notify` events into
/// [`RawEvent`]s on an unbounded channel.
pub fn watch(root: &Path) -> anyhow::Result<DirWatcher> {
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<notify::Event>| {
            if let Ok(event) = res {
                for raw in translate(event) {
                    let _ = tx.send(raw);
                }
            }
        },
        notify::Config::default(),
    )?;
    watcher.watch(root, notify::RecursiveMode::Recursive)?;
    Ok(DirWatcher {
        _inner: watcher,
        events: rx,
    })
}

fn translate(event: notify::Event) -> Vec<RawEvent> {
    use notify::event::{ModifyKind, RemoveKind, RenameMode};
    use notify::EventKind;

    match event.kind {
        EventKind::Create(_) => event
            .paths
            .into_iter()
            .map(|p| RawEvent {
                kind: RawKind::Created,
                is_dir: p.is_dir(),
                src_path: p,
                dest_path: None,
            })
            .collect(),
        EventKind::Remove(kind) => {
            let is_dir = matches!(kind, RemoveKind::Folder);
            event
                .paths
                .into_iter()
                .map(|p| RawEvent {
                    kind: RawKind::Removed,
                    is_dir,
                    src_path: p,
                    dest_path: None,
                })
                .collect()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) if event.paths.len() == 2 => {
            let is_dir = event.paths[1].is_dir();
            vec![RawEvent {
                kind: RawKind::Moved,
                is_dir,
                src_path: event.paths[0].clone(),
                dest_path: Some(event.paths[1].clone()),
            }]
        }
        EventKind::Modify(ModifyKind::Data(_) | ModifyKind::Any) => event
            .paths
            .into_iter()
            .map(|p| RawEvent {
                kind: RawKind::Modified,
                is_dir: p.is_dir(),
                src_path: p,
                dest_path: None,
            })
            .collect(),
        _ => vec![],
    }
}

fn action_for(event: &RawEvent) -> FileAction {
    match event.kind {
        RawKind::Created => FileAction::Create,
        RawKind::Modified => FileAction::Update,
        RawKind::Removed => FileAction::Delete,
        RawKind::Moved => FileAction::Move,
    }
}

/// Runs the full §4.3 pipeline on one event: rules 1-7 via [`filter::evaluate`],
/// rule 8 (path mapping) and rule 9 (content read for `UPDATE`/`CREATE` files).
/// Returns `None` if the event was dropped; the reason, if any, is logged by
/// the caller via `tracing`.
pub async fn build_request(
    event: &RawEvent,
    drop_list: &HashSet<PathBuf>,
    self_path: Option<&Path>,
    mapper: &dyn PathMapper,
) -> Result<Option<FileRequest>, DropReason> {
    if let Some(reason) = filter::evaluate(event, drop_list, self_path) {
        return Err(reason);
    }

    let kind = if event.is_dir {
        FileKind::Dir
    } else {
        FileKind::File
    };
    let action = action_for(event);

    let wire_src = match mapper.to_wire(&event.src_path) {
        Some(wire) => wire,
        None => return Ok(None), // rule 8: unmappable, dropped with a debug log upstream
    };
    let wire_dest = match (&action, &event.dest_path) {
        (FileAction::Move, Some(dest)) => match mapper.to_wire(dest) {
            Some(wire) => Some(wire),
            None => return Ok(None),
        },
        _ => None,
    };

    let (content, digest) = if matches!(action, FileAction::Create | FileAction::Update)
        && kind == FileKind::File
    {
        let bytes = match tokio::fs::read(&event.src_path).await {
            Ok(bytes) => bytes,
            Err(_) => return Ok(None), // rule 9: unreadable, dropped
        };
        if bytes.is_empty() {
            return Ok(None); // rule 9: empty file, dropped
        }
        let digest = transport::digest::hex_digest(&bytes);
        (Some(bytes), Some(digest))
    } else {
        (None, None)
    };

    Ok(Some(FileRequest {
        action,
        kind,
        src: wire_src,
        dest: wire_dest,
        content,
        digest,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::DevMapper;

    #[tokio::test]
    async fn builds_create_request_with_digest() {
        let tmp = tempfile::tempdir().unwrap();
        let file_path = tmp.path().join("a.txt");
        tokio::fs::write(&file_path, b"hi").await.unwrap();
        let mapper = DevMapper::new(tmp.path().to_path_buf());
        let event = RawEvent {
            kind: RawKind::Created,
            is_dir: false,
            src_path: file_path,
            dest_path: None,
        };
        let request = build_request(&event, &HashSet::new(), None, &mapper)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(request.src, "a.txt");
        assert_eq!(request.digest.as_deref(), Some("49f68a5c8493ec2c0bf489821c21fc3b"));
    }

    #[tokio::test]
    async fn drops_empty_file_create() {
        let tmp = tempfile::tempdir().unwrap();
        let file_path = tmp.path().join("empty.txt");
        tokio::fs::write(&file_path, b"").await.unwrap();
        let mapper = DevMapper::new(tmp.path().to_path_buf());
        let event = RawEvent {
            kind: RawKind::Created,
            is_dir: false,
            src_path: file_path,
            dest_path: None,
        };
        let result = build_request(&event, &HashSet::new(), None, &mapper)
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn drops_unmappable_path() {
        let tmp = tempfile::tempdir().unwrap();
        let mapper = DevMapper::new(tmp.path().join("repo"));
        let event = RawEvent {
            kind: RawKind::Created,
            is_dir: false,
            src_path: PathBuf::from("/totally/elsewhere/a.txt"),
            dest_path: None,
        };
        let result = build_request(&event, &HashSet::new(), None, &mapper)
            .await
            .unwrap();
        assert!(result.is_none());
    }
}
