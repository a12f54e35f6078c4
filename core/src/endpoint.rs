//! Endpoint state machines (§4.7): `DevSync` drives the dev-side
//! reconnect loop over the SSH tunnel; `ExecSync` is bound to one accepted
//! client socket on the exec side. Both share a `LoopSuppression` history
//! and dispatch inbound requests to C4/C5.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use transport::protocol::{FileRequest, Request};
use transport::ssh::SshTarget;
use transport::stream::{FramedReader, SharedSender};

use crate::executor::ExecutorQueue;
use crate::history::LoopSuppression;
use crate::logpipe::RotatingWriter;

/// Dev loop waits this long between reconnect attempts (§4.6).
pub const RECONNECT_DELAY: Duration = Duration::from_secs(2);
/// Receive-loop poll interval (§4.6, §5).
pub const RECEIVE_POLL_INTERVAL: Duration = Duration::from_millis(250);
/// Consecutive send failures after which an endpoint declares itself fatal (§4.6).
pub const MAX_CONSECUTIVE_SEND_FAILURES: u32 = 10;
/// Consecutive empty reads on a connected socket treated as a lost connection (§4.6).
pub const MAX_CONSECUTIVE_EMPTY_READS: u32 = 8;

enum SessionOutcome {
    /// The socket was lost, or a `GOODBYE` asked for a fresh session.
    Reconnect,
    /// `cancel` fired or the outbound channel closed; stop for good.
    Shutdown,
}

enum Dispatch {
    Continue,
    Goodbye,
}

async fn dispatch_dev(
    request: Request,
    file_queue: &ExecutorQueue,
    log_writer: &std::sync::Mutex<RotatingWriter>,
    history: &Mutex<LoopSuppression>,
) -> Dispatch {
    match request {
        Request::File(file_request) => {
            if history.lock().await.contains(&file_request) {
                tracing::debug!(src = %file_request.src, "dropping echoed FILE request");
                return Dispatch::Continue;
            }
            file_queue.push(file_request).await;
            Dispatch::Continue
        }
        Request::Log(log_request) => {
            if let Err(err) = log_writer.lock().unwrap().write_request(&log_request) {
                tracing::warn!(%err, "failed writing received LOG request");
            }
            Dispatch::Continue
        }
        Request::Goodbye => Dispatch::Goodbye,
        Request::Ping | Request::Pong | Request::Unknown => Dispatch::Continue,
    }
}

async fn dispatch_exec(
    request: Request,
    file_queue: &ExecutorQueue,
    sender: &SharedSender,
    history: &Mutex<LoopSuppression>,
) -> Dispatch {
    match request {
        Request::File(file_request) => {
            {
                let mut history = history.lock().await;
                if history.contains(&file_request) {
                    tracing::debug!(src = %file_request.src, "dropping echoed FILE request");
                    return Dispatch::Continue;
                }
                // Recorded now so the exec-side watcher can recognize C4's
                // own filesystem mutation as it echoes back, instead of
                // misclassifying it as a local edit (supervisor.rs).
                history.push(&file_request);
            }
            file_queue.push(file_request).await;
            Dispatch::Continue
        }
        Request::Ping => {
            if let Err(err) = sender.send(Request::Pong).await {
                tracing::warn!(%err, "failed replying PONG");
            }
            Dispatch::Continue
        }
        Request::Log(_) => {
            tracing::warn!("received unexpected LOG request on exec side, dropping");
            Dispatch::Continue
        }
        Request::Goodbye => Dispatch::Goodbye,
        Request::Pong | Request::Unknown => Dispatch::Continue,
    }
}

fn push_outbound_history<'a>(
    request: &'a Request,
) -> Option<&'a FileRequest> {
    match request {
        Request::File(file_request) => Some(file_request),
        _ => None,
    }
}

/// Dev-side endpoint: owns the SSH tunnel and retries it on loss (§4.6, §4.7).
pub struct DevSync {
    target: SshTarget,
}

impl DevSync {
    #[must_use]
    pub fn new(target: SshTarget) -> Self {
        Self { target }
    }

    /// Runs until `cancel` fires or a fatal send-failure threshold is hit.
    /// `outbound` carries `FILE` requests from C3's watcher; `file_queue` is
    /// C4's inbound queue; `log_writer` is the dev-side rotating writer (C5).
    pub async fn run(
        &self,
        mut outbound: mpsc::UnboundedReceiver<Request>,
        file_queue: ExecutorQueue,
        log_writer: Arc<std::sync::Mutex<RotatingWriter>>,
        history: Arc<Mutex<LoopSuppression>>,
        cancel: CancellationToken,
    ) -> anyhow::Result<()> {
        loop {
            if cancel.is_cancelled() {
                return Ok(());
            }
            let (session, local_port) = match transport::ssh::open_tunnel(&self.target).await {
                Ok(pair) => pair,
                Err(err) => {
                    tracing::warn!(%err, "failed to open SSH tunnel, retrying");
                    if !sleep_or_cancel(RECONNECT_DELAY, &cancel).await {
                        return Ok(());
                    }
                    continue;
                }
            };
            let (reader, sender) = match transport::stream::connect_and_handshake(local_port).await {
                Ok(pair) => pair,
                Err(err) => {
                    tracing::warn!(%err, "handshake failed, retrying");
                    drop(session);
                    if !sleep_or_cancel(RECONNECT_DELAY, &cancel).await {
                        return Ok(());
                    }
                    continue;
                }
            };
            tracing::info!("ready to synchronize");
            let outcome = run_dev_session(
                reader,
                sender,
                &mut outbound,
                &file_queue,
                &log_writer,
                &history,
                &cancel,
            )
            .await?;
            drop(session);
            match outcome {
                SessionOutcome::Shutdown => return Ok(()),
                SessionOutcome::Reconnect => {
                    if !sleep_or_cancel(RECONNECT_DELAY, &cancel).await {
                        return Ok(());
                    }
                }
            }
        }
    }
}

async fn sleep_or_cancel(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        () = tokio::time::sleep(duration) => true,
        () = cancel.cancelled() => false,
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_dev_session(
    mut reader: FramedReader,
    sender: SharedSender,
    outbound: &mut mpsc::UnboundedReceiver<Request>,
    file_queue: &ExecutorQueue,
    log_writer: &std::sync::Mutex<RotatingWriter>,
    history: &Mutex<LoopSuppression>,
    cancel: &CancellationToken,
) -> anyhow::Result<SessionOutcome> {
    let mut send_failures = 0u32;
    let mut empty_reads = 0u32;
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return Ok(SessionOutcome::Shutdown),
            maybe_request = outbound.recv() => {
                let Some(request) = maybe_request else {
                    return Ok(SessionOutcome::Shutdown);
                };
                if let Some(file_request) = push_outbound_history(&request) {
                    history.lock().await.push(file_request);
                }
                match sender.send(request).await {
                    Ok(()) => send_failures = 0,
                    Err(err) => {
                        send_failures += 1;
                        tracing::warn!(%err, send_failures, "send failed");
                        if send_failures >= MAX_CONSECUTIVE_SEND_FAILURES {
                            anyhow::bail!("{MAX_CONSECUTIVE_SEND_FAILURES} consecutive send failures, terminating");
                        }
                        return Ok(SessionOutcome::Reconnect);
                    }
                }
            }
            frame = tokio::time::timeout(RECEIVE_POLL_INTERVAL, reader.next()) => {
                match frame {
                    Ok(Some(Ok(request))) => {
                        empty_reads = 0;
                        match dispatch_dev(request, file_queue, log_writer, history).await {
                            Dispatch::Continue => {}
                            Dispatch::Goodbye => return Ok(SessionOutcome::Reconnect),
                        }
                    }
                    Ok(Some(Err(err))) => {
                        tracing::warn!(%err, "decode error, reconnecting");
                        return Ok(SessionOutcome::Reconnect);
                    }
                    Ok(None) => return Ok(SessionOutcome::Reconnect),
                    Err(_elapsed) => {
                        empty_reads += 1;
                        if empty_reads >= MAX_CONSECUTIVE_EMPTY_READS {
                            tracing::warn!("too many consecutive empty reads, reconnecting");
                            return Ok(SessionOutcome::Reconnect);
                        }
                    }
                }
            }
        }
    }
}

/// Exec-side endpoint: bound to one accepted client socket (§4.7).
pub struct ExecSync;

impl ExecSync {
    /// Runs until `cancel` fires (the supervisor is replacing this client)
    /// or the socket is lost. `log_outbound` carries `LOG` requests from C5.
    pub async fn run(
        reader: FramedReader,
        sender: SharedSender,
        file_queue: ExecutorQueue,
        mut log_outbound: mpsc::UnboundedReceiver<transport::protocol::LogRequest>,
        history: Arc<Mutex<LoopSuppression>>,
        cancel: CancellationToken,
    ) -> anyhow::Result<()> {
        let mut reader = reader;
        let mut empty_reads = 0u32;
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    let _ = sender.send(Request::Goodbye).await;
                    return Ok(());
                }
                maybe_log = log_outbound.recv() => {
                    if let Some(log_request) = maybe_log {
                        if let Err(err) = sender.send(Request::Log(log_request)).await {
                            tracing::warn!(%err, "failed sending LOG request");
                        }
                    }
                }
                frame = tokio::time::timeout(RECEIVE_POLL_INTERVAL, reader.next()) => {
                    match frame {
                        Ok(Some(Ok(request))) => {
                            empty_reads = 0;
                            match dispatch_exec(request, &file_queue, &sender, &history).await {
                                Dispatch::Continue => {}
                                Dispatch::Goodbye => return Ok(()),
                            }
                        }
                        Ok(Some(Err(err))) => {
                            tracing::warn!(%err, "decode error, ending session");
                            return Ok(());
                        }
                        Ok(None) => return Ok(()),
                        Err(_elapsed) => {
                            empty_reads += 1;
                            if empty_reads >= MAX_CONSECUTIVE_EMPTY_READS {
                                tracing::warn!("too many consecutive empty reads, ending session");
                                return Ok(());
                            }
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use transport::protocol::FileAction;

    #[tokio::test]
    async fn dispatch_dev_drops_history_echo() {
        let queue = ExecutorQueue::new();
        let history = Mutex::new(LoopSuppression::new());
        let request = FileRequest::with_content(FileAction::Update, "a.txt".to_string(), b"hi".to_vec());
        history.lock().await.push(&request);
        let tmp = tempfile::tempdir().unwrap();
        let writer = std::sync::Mutex::new(
            RotatingWriter::open(tmp.path().join("remote_host.log")).unwrap(),
        );
        let outcome = dispatch_dev(Request::File(request), &queue, &writer, &history).await;
        assert!(matches!(outcome, Dispatch::Continue));
        assert!(queue.is_empty().await, "history-echoed request must not reach the queue");
    }

    #[tokio::test]
    async fn dispatch_dev_enqueues_non_echoed_request() {
        let queue = ExecutorQueue::new();
        let history = Mutex::new(LoopSuppression::new());
        let request = FileRequest::with_content(FileAction::Update, "a.txt".to_string(), b"hi".to_vec());
        let tmp = tempfile::tempdir().unwrap();
        let writer = std::sync::Mutex::new(
            RotatingWriter::open(tmp.path().join("remote_host.log")).unwrap(),
        );
        let outcome = dispatch_dev(Request::File(request), &queue, &writer, &history).await;
        assert!(matches!(outcome, Dispatch::Continue));
        assert!(!queue.is_empty().await, "a genuinely new request must reach the queue");
    }

    #[tokio::test]
    async fn dispatch_dev_recognizes_goodbye() {
        let queue = ExecutorQueue::new();
        let history = Mutex::new(LoopSuppression::new());
        let tmp = tempfile::tempdir().unwrap();
        let writer = std::sync::Mutex::new(
            RotatingWriter::open(tmp.path().join("remote_host.log")).unwrap(),
        );
        let outcome = dispatch_dev(Request::Goodbye, &queue, &writer, &history).await;
        assert!(matches!(outcome, Dispatch::Goodbye));
    }
}
