//! Supervisor (§4.8, C8): the exec-side accept loop and per-role wiring of
//! the watcher, executor, log pipeline and endpoint into one running
//! process.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use common::logging::LogRecord;
use common::{DevProfile, ExecProfile};
use socket2::{Domain, Socket, Type};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use transport::protocol::{LogRequest, Request};
use transport::ssh::SshTarget;

use crate::endpoint::{DevSync, ExecSync};
use crate::executor::{self, ExecutorQueue};
use crate::filter::RawEvent;
use crate::history::LoopSuppression;
use crate::logpipe::{self, LogSource, RotatingWriter};
use crate::mapping::{DevMapper, ExecMapper, PathMapper};
use crate::watcher::{self, DirWatcher};

const ACCEPT_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(1);

/// Drains a [`DirWatcher`]'s events, turns survivors into `FILE` requests
/// and forwards them as `Request::File` until `cancel` fires (§4.3, §4.7's
/// "Outbound: FILE from C3").
async fn pump_watcher(
    mut watcher: DirWatcher,
    drop_list: Arc<HashSet<PathBuf>>,
    self_path: Option<PathBuf>,
    mapper: Arc<dyn PathMapper>,
    outbound: mpsc::UnboundedSender<Request>,
    cancel: CancellationToken,
) {
    loop {
        let event: RawEvent = tokio::select! {
            maybe_event = watcher.events.recv() => {
                match maybe_event {
                    Some(event) => event,
                    None => return,
                }
            }
            () = cancel.cancelled() => return,
        };
        match watcher::build_request(&event, &drop_list, self_path.as_deref(), mapper.as_ref()).await {
            Ok(Some(request)) => {
                if outbound.send(Request::File(request)).is_err() {
                    return;
                }
            }
            Ok(None) => {}
            Err(reason) => tracing::debug!(?reason, "dropped filesystem event"),
        }
    }
}

/// Drains an exec-side mapping watcher and checks each surviving event
/// against `history` (recently applied `FILE` requests) rather than
/// forwarding it anywhere — see the comment at the call site.
async fn watch_for_local_edits(
    mut watcher: DirWatcher,
    drop_list: Arc<HashSet<PathBuf>>,
    mapper: Arc<dyn PathMapper>,
    history: Arc<Mutex<LoopSuppression>>,
    cancel: CancellationToken,
) {
    loop {
        let event: RawEvent = tokio::select! {
            maybe_event = watcher.events.recv() => {
                match maybe_event {
                    Some(event) => event,
                    None => return,
                }
            }
            () = cancel.cancelled() => return,
        };
        match watcher::build_request(&event, &drop_list, None, mapper.as_ref()).await {
            Ok(Some(request)) => {
                if history.lock().await.contains(&request) {
                    tracing::debug!(src = %request.src, "exec-side watcher observed its own applied change");
                } else {
                    tracing::warn!(
                        src = %request.src,
                        "edit made directly on the exec host is not synchronized back"
                    );
                }
            }
            Ok(None) => {}
            Err(reason) => tracing::debug!(?reason, "dropped filesystem event"),
        }
    }
}

/// Dev-side process role: one [`DevSync`] plus one watcher on `local_dir`.
pub struct DevSupervisor {
    profile: DevProfile,
    data_dir: PathBuf,
}

impl DevSupervisor {
    #[must_use]
    pub fn new(profile: DevProfile, data_dir: PathBuf) -> Self {
        Self { profile, data_dir }
    }

    pub async fn run(&self, cancel: CancellationToken) -> anyhow::Result<()> {
        let mapper: Arc<dyn PathMapper> = Arc::new(DevMapper::new(self.profile.local_dir.clone()));
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let file_queue = ExecutorQueue::new();
        let history = Arc::new(Mutex::new(LoopSuppression::new()));

        std::fs::create_dir_all(&self.data_dir)?;
        let log_path = logpipe::dev_log_path(&self.data_dir, &self.profile.remote_host);
        let log_writer = Arc::new(std::sync::Mutex::new(RotatingWriter::open(log_path)?));

        let dir_watcher = watcher::watch(&self.profile.local_dir)?;
        let watcher_task = tokio::spawn(pump_watcher(
            dir_watcher,
            Arc::new(HashSet::new()),
            None,
            mapper.clone(),
            outbound_tx,
            cancel.clone(),
        ));
        let executor_task = tokio::spawn(executor::run(file_queue.clone(), mapper, cancel.clone()));

        let target = SshTarget::from(&self.profile);
        let dev_sync = DevSync::new(target);
        let result = dev_sync
            .run(outbound_rx, file_queue, log_writer, history, cancel)
            .await;

        watcher_task.abort();
        executor_task.abort();
        result
    }
}

/// Forwards whatever the process-wide log source produces to whichever
/// `ExecSync` session is currently active, dropping records while no
/// client is connected (no restart-safety is needed here: `EXTERNAL` mode's
/// own offset file, not this forwarder, is what survives a restart).
#[derive(Clone, Default)]
struct LogForwarder {
    current: Arc<Mutex<Option<mpsc::UnboundedSender<LogRequest>>>>,
}

impl LogForwarder {
    async fn route(&self, mut source: mpsc::UnboundedReceiver<LogRequest>) {
        while let Some(request) = source.recv().await {
            let guard = self.current.lock().await;
            match guard.as_ref() {
                Some(sender) if sender.send(request).is_ok() => {}
                Some(_) => tracing::debug!("active session's log channel closed, dropping record"),
                None => tracing::debug!("no active exec session, dropping log record"),
            }
        }
    }

    async fn attach(&self) -> mpsc::UnboundedReceiver<LogRequest> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.current.lock().await = Some(tx);
        rx
    }
}

fn reuseaddr_listener(addr: std::net::SocketAddr) -> anyhow::Result<TcpListener> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, None)?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(128)?;
    Ok(TcpListener::from_std(socket.into())?)
}

/// Exec-side process role: the accept loop on [`transport::ssh::EXEC_LISTEN_PORT`].
pub struct ExecSupervisor {
    profile: ExecProfile,
}

impl ExecSupervisor {
    #[must_use]
    pub fn new(profile: ExecProfile) -> Self {
        Self { profile }
    }

    fn watched_dirs(&self) -> Vec<PathBuf> {
        let mut dirs: Vec<PathBuf> = self
            .profile
            .mappings
            .values()
            .map(|entry| entry.dest.clone())
            .collect();
        dirs.sort();
        dirs.dedup();
        dirs
    }

    pub async fn run(
        &self,
        internal_log_source: Option<mpsc::UnboundedReceiver<LogRecord>>,
        cancel: CancellationToken,
    ) -> anyhow::Result<()> {
        let mapper: Arc<dyn PathMapper> = Arc::new(ExecMapper::from_profile(&self.profile)?);
        let mut drop_list = HashSet::new();
        if let Some(log_file) = &self.profile.log_file_path {
            drop_list.insert(log_file.clone());
        }
        let drop_list = Arc::new(drop_list);

        let listener = reuseaddr_listener(std::net::SocketAddr::from((
            std::net::Ipv4Addr::UNSPECIFIED,
            transport::ssh::EXEC_LISTEN_PORT,
        )))?;

        let log_source = match internal_log_source {
            Some(receiver) => LogSource::Internal(receiver),
            None => match &self.profile.log_file_path {
                Some(path) => LogSource::External { path: path.clone() },
                None => LogSource::Disabled,
            },
        };
        let forwarder = LogForwarder::default();
        let (log_tx, log_rx) = mpsc::unbounded_channel::<LogRequest>();
        let forwarder_clone = forwarder.clone();
        tokio::spawn(async move { forwarder_clone.route(log_rx).await });
        let log_cancel = cancel.clone();
        tokio::spawn(async move {
            logpipe::run(
                log_source,
                move |request| {
                    let log_tx = log_tx.clone();
                    Box::pin(async move { log_tx.send(request).map_err(|e| anyhow::anyhow!(e.to_string())) })
                },
                log_cancel,
            )
            .await;
        });

        let mut current_session: Option<(CancellationToken, tokio::task::JoinHandle<()>)> = None;

        loop {
            if cancel.is_cancelled() {
                break;
            }
            let accepted = tokio::select! {
                result = tokio::time::timeout(ACCEPT_TIMEOUT, listener.accept()) => result,
                () = cancel.cancelled() => break,
            };
            let Ok(accept_result) = accepted else { continue }; // timed out, loop again
            let (stream, peer) = match accept_result {
                Ok(pair) => pair,
                Err(err) => {
                    tracing::warn!(%err, "accept failed");
                    continue;
                }
            };
            tracing::info!(%peer, "accepted new client, stopping any previous session");

            if let Some((token, handle)) = current_session.take() {
                token.cancel();
                let _ = handle.await;
            }

            let file_queue = ExecutorQueue::new();
            let history = Arc::new(Mutex::new(LoopSuppression::new()));
            let session_cancel = CancellationToken::new();

            let mut watcher_tasks = Vec::new();
            let executor_task = tokio::spawn(executor::run(
                file_queue.clone(),
                mapper.clone(),
                session_cancel.clone(),
            ));
            watcher_tasks.push(executor_task);
            // FILE requests only ever flow dev -> exec (§2 "Data flow"); the
            // exec-side watcher exists solely so a just-applied C4 mutation,
            // observed echoing back through the filesystem watcher, can be
            // recognized via the shared history and dropped instead of
            // logged as a surprise. Anything that does NOT match history is
            // an edit made directly on the exec host and is not synced back.
            for dir in self.watched_dirs() {
                match watcher::watch(&dir) {
                    Ok(dir_watcher) => {
                        let task = tokio::spawn(watch_for_local_edits(
                            dir_watcher,
                            drop_list.clone(),
                            mapper.clone(),
                            history.clone(),
                            session_cancel.clone(),
                        ));
                        watcher_tasks.push(task);
                    }
                    Err(err) => tracing::warn!(%err, dir = %dir.display(), "failed to watch mapping directory"),
                }
            }

            let (reader, sender) = transport::stream::split(stream);
            let log_rx = forwarder.attach().await;
            let session_token = session_cancel.clone();
            let handle = tokio::spawn(async move {
                if let Err(err) = ExecSync::run(reader, sender, file_queue, log_rx, history, session_token).await {
                    tracing::warn!(%err, "exec session ended with an error");
                }
                for task in watcher_tasks {
                    task.abort();
                }
            });
            current_session = Some((session_cancel, handle));
        }

        if let Some((token, handle)) = current_session {
            token.cancel();
            let _ = handle.await;
        }
        Ok(())
    }
}
