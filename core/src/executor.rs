//! Request executor (§4.4). Grounded directly in
//! `original_source/pyremotedev/file.py`'s `RequestFileExecutor.__process_request`:
//! same action set, same idempotent-on-replay semantics, same symlink rules.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::Mutex;
use transport::protocol::{FileAction, FileKind, FileRequest};

use crate::mapping::PathMapper;

const QUEUE_CAPACITY: usize = 200;
const IDLE_POLL_INTERVAL: std::time::Duration = std::time::Duration::from_millis(250);

/// Bounded, newest-first work queue (§4.4, §5): new requests are pushed to
/// the front; the oldest (back) entry is dropped when the queue is full.
#[derive(Clone, Default)]
pub struct ExecutorQueue {
    inner: Arc<Mutex<VecDeque<FileRequest>>>,
}

impl ExecutorQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn push(&self, request: FileRequest) {
        let mut queue = self.inner.lock().await;
        if queue.len() == QUEUE_CAPACITY {
            let dropped = queue.pop_back();
            if let Some(dropped) = dropped {
                tracing::debug!(src = %dropped.src, "executor queue full, dropping oldest request");
            }
        }
        queue.push_front(request);
    }

    async fn pop(&self) -> Option<FileRequest> {
        self.inner.lock().await.pop_back()
    }

    /// Whether the queue currently holds no pending requests.
    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.is_empty()
    }
}

/// Runs the executor loop until `cancel` fires: pops requests off the back
/// of the queue and applies them via `mapper`; sleeps [`IDLE_POLL_INTERVAL`]
/// when the queue is empty.
pub async fn run(
    queue: ExecutorQueue,
    mapper: Arc<dyn PathMapper>,
    cancel: tokio_util::sync::CancellationToken,
) {
    loop {
        if cancel.is_cancelled() {
            return;
        }
        match queue.pop().await {
            Some(request) => apply(&request, mapper.as_ref()).await,
            None => {
                tokio::select! {
                    () = tokio::time::sleep(IDLE_POLL_INTERVAL) => {}
                    () = cancel.cancelled() => return,
                }
            }
        }
    }
}

/// Applies a single request, rewriting `src`/`dest` with `mapper` first.
/// Unmappable requests are dropped (§4.4). Failures are logged, not propagated.
pub async fn apply(request: &FileRequest, mapper: &dyn PathMapper) {
    let Some(src) = mapper.from_wire(&request.src) else {
        tracing::debug!(src = %request.src, "executor: unmappable src, dropping");
        return;
    };
    let dest = match &request.dest {
        Some(dest) => match mapper.from_wire(dest) {
            Some(dest) => Some(dest),
            None => {
                tracing::debug!(dest = %dest, "executor: unmappable dest, dropping");
                return;
            }
        },
        None => None,
    };
    let link = mapper.link_for(&request.src);

    let result = match (request.action, request.kind) {
        (FileAction::Create, FileKind::Dir) => create_dir(&src).await,
        (FileAction::Create, FileKind::File) => create_file(&src, request, link.as_deref()).await,
        (FileAction::Delete, FileKind::Dir) => delete_dir(&src).await,
        (FileAction::Delete, FileKind::File) => delete_file(&src, link.as_deref()).await,
        (FileAction::Move, _) => {
            let Some(dest) = dest else {
                tracing::debug!("executor: MOVE request missing dest, dropping");
                return;
            };
            move_path(&src, &dest, link.as_deref()).await
        }
        (FileAction::Update, FileKind::Dir) => {
            tracing::debug!(path = %src.display(), "executor: UPDATE(DIR) is a no-op");
            Ok(())
        }
        (FileAction::Update, FileKind::File) => {
            update_file(&src, request, link.as_deref()).await
        }
    };
    if let Err(err) = result {
        tracing::warn!(path = %src.display(), %err, "executor: filesystem operation failed");
    }
}

async fn create_dir(path: &std::path::Path) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(path).await?;
    Ok(())
}

async fn ensure_symlink(link: Option<&std::path::Path>, target: &std::path::Path) -> anyhow::Result<()> {
    let Some(link) = link else { return Ok(()) };
    if tokio::fs::symlink_metadata(link).await.is_ok() {
        return Ok(()); // already exists, leave it
    }
    if let Some(parent) = link.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    #[cfg(unix)]
    tokio::fs::symlink(target, link).await?;
    #[cfg(not(unix))]
    tokio::fs::copy(target, link).await.map(|_| ())?;
    Ok(())
}

async fn create_file(
    path: &std::path::Path,
    request: &FileRequest,
    link: Option<&std::path::Path>,
) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let content = request.content.as_deref().unwrap_or(&[]);
    tokio::fs::write(path, content).await?;
    ensure_symlink(link, path).await?;
    Ok(())
}

async fn update_file(
    path: &std::path::Path,
    request: &FileRequest,
    link: Option<&std::path::Path>,
) -> anyhow::Result<()> {
    let content = request.content.as_deref().unwrap_or(&[]);
    tokio::fs::write(path, content).await?;
    ensure_symlink(link, path).await?;
    Ok(())
}

async fn delete_dir(path: &std::path::Path) -> anyhow::Result<()> {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err.into()),
    }
}

async fn delete_file(path: &std::path::Path, link: Option<&std::path::Path>) -> anyhow::Result<()> {
    if let Some(link) = link {
        match tokio::fs::remove_file(link).await {
            Ok(()) | Err(_) => {} // absence of the symlink is not an error
        }
    }
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err.into()),
    }
}

async fn move_path(
    src: &std::path::Path,
    dest: &std::path::Path,
    link: Option<&std::path::Path>,
) -> anyhow::Result<()> {
    if tokio::fs::symlink_metadata(src).await.is_err() {
        tracing::debug!(path = %src.display(), "executor: MOVE source absent, dropping");
        return Ok(());
    }
    if let Some(link) = link {
        let _ = tokio::fs::remove_file(link).await;
        if let Some(parent) = link.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        #[cfg(unix)]
        tokio::fs::symlink(dest, link).await?;
    }
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::rename(src, dest).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::DevMapper;

    fn mapper(root: &std::path::Path) -> DevMapper {
        DevMapper::new(root.to_path_buf())
    }

    #[tokio::test]
    async fn create_file_writes_content() {
        let tmp = tempfile::tempdir().unwrap();
        let mapper = mapper(tmp.path());
        let request = FileRequest::with_content(FileAction::Create, "a.txt".to_string(), b"hi".to_vec());
        apply(&request, &mapper).await;
        let content = tokio::fs::read(tmp.path().join("a.txt")).await.unwrap();
        assert_eq!(content, b"hi");
    }

    #[tokio::test]
    async fn update_is_idempotent_under_replay() {
        let tmp = tempfile::tempdir().unwrap();
        let mapper = mapper(tmp.path());
        let request = FileRequest::with_content(FileAction::Update, "a.txt".to_string(), b"v2".to_vec());
        apply(&request, &mapper).await;
        apply(&request, &mapper).await;
        let content = tokio::fs::read(tmp.path().join("a.txt")).await.unwrap();
        assert_eq!(content, b"v2");
    }

    #[tokio::test]
    async fn delete_missing_file_is_not_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let mapper = mapper(tmp.path());
        let request = FileRequest {
            action: FileAction::Delete,
            kind: FileKind::File,
            src: "missing.txt".to_string(),
            dest: None,
            content: None,
            digest: None,
        };
        apply(&request, &mapper).await; // must not panic
    }

    #[tokio::test]
    async fn move_missing_source_is_noop() {
        let tmp = tempfile::tempdir().unwrap();
        let mapper = mapper(tmp.path());
        let request = FileRequest {
            action: FileAction::Move,
            kind: FileKind::File,
            src: "missing.txt".to_string(),
            dest: Some("elsewhere.txt".to_string()),
            content: None,
            digest: None,
        };
        apply(&request, &mapper).await;
        assert!(!tmp.path().join("elsewhere.txt").exists());
    }

    #[tokio::test]
    async fn move_renames_existing_file() {
        let tmp = tempfile::tempdir().unwrap();
        tokio::fs::write(tmp.path().join("a.txt"), b"hi").await.unwrap();
        let mapper = mapper(tmp.path());
        let request = FileRequest {
            action: FileAction::Move,
            kind: FileKind::File,
            src: "a.txt".to_string(),
            dest: Some("b.txt".to_string()),
            content: None,
            digest: None,
        };
        apply(&request, &mapper).await;
        assert!(!tmp.path().join("a.txt").exists());
        assert_eq!(tokio::fs::read(tmp.path().join("b.txt")).await.unwrap(), b"hi");
    }

    #[tokio::test]
    async fn queue_drops_oldest_past_capacity() {
        let queue = ExecutorQueue::new();
        for i in 0..QUEUE_CAPACITY {
            queue
                .push(FileRequest::with_content(
                    FileAction::Update,
                    format!("f{i}.txt"),
                    vec![0u8],
                ))
                .await;
        }
        queue
            .push(FileRequest::with_content(
                FileAction::Update,
                "new.txt".to_string(),
                vec![0u8],
            ))
            .await;
        let mut seen = vec![];
        while let Some(req) = queue.pop().await {
            seen.push(req.src);
        }
        assert!(!seen.contains(&"f0.txt".to_string()));
        assert!(seen.contains(&"new.txt".to_string()));
    }
}
