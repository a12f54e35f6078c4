//! Log pipeline (§4.5, C5): exec-side log production (`INTERNAL`/`EXTERNAL`/
//! `DISABLED`) and the dev-side rotating writer that reassembles received
//! `LOG` requests.

use std::path::{Path, PathBuf};

use common::logging::LogRecord;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, AsyncWriteExt};
use transport::protocol::{LogRecordPayload, LogRequest};

const ROTATION_MAX_BYTES: u64 = 2 * 1024 * 1024;
const ROTATION_BACKUPS: u32 = 2;
const TAIL_POLL_INTERVAL: std::time::Duration = std::time::Duration::from_millis(250);

/// Exec-side log production mode, selected at startup (§4.5).
pub enum LogSource {
    Disabled,
    /// Captures `tracing::Event`s via [`common::logging::CapturingLayer`].
    Internal(tokio::sync::mpsc::UnboundedReceiver<LogRecord>),
    /// Tails `path`, persisting a byte offset alongside it for restart safety.
    External { path: PathBuf },
}

fn record_to_payload(record: &LogRecord) -> LogRecordPayload {
    LogRecordPayload {
        name: record.logger.clone(),
        level: record.level.clone(),
        file: record.file.clone(),
        line: record.line,
        message: record.message.clone(),
        function: record.function.clone(),
    }
}

/// Runs the exec-side log source until `cancel` fires, sending each
/// surviving record through `send`.
pub async fn run(
    source: LogSource,
    send: impl Fn(LogRequest) -> futures::future::BoxFuture<'static, anyhow::Result<()>>,
    cancel: tokio_util::sync::CancellationToken,
) {
    match source {
        LogSource::Disabled => {
            cancel.cancelled().await;
        }
        LogSource::Internal(mut receiver) => loop {
            tokio::select! {
                record = receiver.recv() => {
                    let Some(record) = record else { return };
                    let request = LogRequest {
                        log_record: Some(record_to_payload(&record)),
                        log_message: None,
                    };
                    if request.is_empty() {
                        continue;
                    }
                    if let Err(err) = send(request).await {
                        tracing::warn!(%err, "failed sending LOG request");
                    }
                }
                () = cancel.cancelled() => return,
            }
        },
        LogSource::External { path } => {
            if let Err(err) = tail_file(&path, &send, &cancel).await {
                tracing::warn!(%err, path = %path.display(), "log tail loop ended with an error");
            }
        }
    }
}

fn offset_path(path: &Path) -> PathBuf {
    let mut offset = path.as_os_str().to_owned();
    offset.push(".offset");
    PathBuf::from(offset)
}

async fn read_offset(offset_file: &Path) -> u64 {
    match tokio::fs::read_to_string(offset_file).await {
        Ok(text) => text.trim().parse().unwrap_or(0),
        Err(_) => 0,
    }
}

async fn write_offset(offset_file: &Path, offset: u64) -> anyhow::Result<()> {
    tokio::fs::write(offset_file, offset.to_string()).await?;
    Ok(())
}

/// Follows `path` line-by-line from a persisted byte offset (grounded in
/// `original_source/pyremotedev/logs.py`'s `pygtail`-style tailer); no crate
/// in the pack offers an async tail-with-persisted-offset primitive.
async fn tail_file(
    path: &Path,
    send: &impl Fn(LogRequest) -> futures::future::BoxFuture<'static, anyhow::Result<()>>,
    cancel: &tokio_util::sync::CancellationToken,
) -> anyhow::Result<()> {
    let offset_file = offset_path(path);
    let mut offset = read_offset(&offset_file).await;

    loop {
        if cancel.is_cancelled() {
            return Ok(());
        }
        let file = match tokio::fs::File::open(path).await {
            Ok(file) => file,
            Err(_) => {
                tokio::select! {
                    () = tokio::time::sleep(TAIL_POLL_INTERVAL) => continue,
                    () = cancel.cancelled() => return Ok(()),
                }
            }
        };
        let len = file.metadata().await?.len();
        if len < offset {
            offset = 0; // file was truncated or rotated underneath us
        }
        let mut reader = tokio::io::BufReader::new(file);
        reader.seek(std::io::SeekFrom::Start(offset)).await?;
        let mut line = String::new();
        loop {
            line.clear();
            let bytes_read = reader.read_line(&mut line).await?;
            if bytes_read == 0 {
                break;
            }
            offset += bytes_read as u64;
            let text = line.trim_end_matches(['\n', '\r']);
            if text.is_empty() {
                continue;
            }
            let request = LogRequest {
                log_record: None,
                log_message: Some(text.to_string()),
            };
            if let Err(err) = send(request).await {
                tracing::warn!(%err, "failed sending LOG request");
            }
            write_offset(&offset_file, offset).await?;
        }
        tokio::select! {
            () = tokio::time::sleep(TAIL_POLL_INTERVAL) => {}
            () = cancel.cancelled() => return Ok(()),
        }
    }
}

/// Dev-side rotating writer (§4.5): 2 MiB per file, 2 backups, UTF-8. No
/// crate in the pack offers size-triggered rotation with a fixed backup
/// count, so this is hand-written against `std::fs`, mirroring Python's
/// `logging.handlers.RotatingFileHandler` used by the original.
pub struct RotatingWriter {
    path: PathBuf,
    file: std::fs::File,
    written: u64,
}

impl RotatingWriter {
    pub fn open(path: PathBuf) -> anyhow::Result<Self> {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;
        let written = file.metadata()?.len();
        Ok(Self { path, file, written })
    }

    fn rotate(&mut self) -> anyhow::Result<()> {
        use std::fs;
        let oldest = self.path.with_extension(format!("log.{ROTATION_BACKUPS}"));
        let _ = fs::remove_file(&oldest);
        for i in (1..ROTATION_BACKUPS).rev() {
            let from = self.path.with_extension(format!("log.{i}"));
            let to = self.path.with_extension(format!("log.{}", i + 1));
            if from.exists() {
                fs::rename(&from, &to)?;
            }
        }
        let backup_one = self.path.with_extension("log.1");
        fs::rename(&self.path, &backup_one)?;
        self.file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        self.written = 0;
        Ok(())
    }

    fn write_line(&mut self, line: &str) -> anyhow::Result<()> {
        use std::io::Write;
        if self.written >= ROTATION_MAX_BYTES {
            self.rotate()?;
        }
        let bytes = format!("{line}\n");
        self.file.write_all(bytes.as_bytes())?;
        self.written += bytes.len() as u64;
        Ok(())
    }

    /// Appends a received `LOG` request, reconstructing a synthetic record
    /// for `log_record` payloads and writing `log_message` payloads verbatim.
    pub fn write_request(&mut self, request: &LogRequest) -> anyhow::Result<()> {
        if let Some(record) = &request.log_record {
            let location = match (&record.file, record.line) {
                (Some(file), Some(line)) => format!(" {file}:{line}"),
                (Some(file), None) => format!(" {file}"),
                _ => String::new(),
            };
            let mut line = format!("{} {} {}{}", record.name, record.level, record.message, location);
            if let Some(function) = &record.function {
                line.push_str(" - ");
                line.push_str(function);
            }
            self.write_line(&line)?;
        }
        if let Some(message) = &request.log_message {
            self.write_line(message)?;
        }
        Ok(())
    }
}

/// Builds the dev-side log file path for `host` under `data_dir` (§4.5:
/// `remote_<host>.log`).
#[must_use]
pub fn dev_log_path(data_dir: &Path, host: &str) -> PathBuf {
    data_dir.join(format!("remote_{host}.log"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotating_writer_rotates_past_threshold() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("remote_host.log");
        let mut writer = RotatingWriter::open(path.clone()).unwrap();
        writer.written = ROTATION_MAX_BYTES; // force rotation on next write
        writer.write_line("after rotation").unwrap();
        assert!(path.with_extension("log.1").exists());
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("after rotation"));
    }

    #[test]
    fn write_request_handles_both_payload_kinds() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("remote_host.log");
        let mut writer = RotatingWriter::open(path.clone()).unwrap();
        writer
            .write_request(&LogRequest {
                log_record: Some(LogRecordPayload {
                    name: "exec".to_string(),
                    level: "INFO".to_string(),
                    file: Some("main.rs".to_string()),
                    line: Some(10),
                    message: "started".to_string(),
                    function: None,
                }),
                log_message: None,
            })
            .unwrap();
        writer
            .write_request(&LogRequest {
                log_record: None,
                log_message: Some("raw line".to_string()),
            })
            .unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("started"));
        assert!(contents.contains("raw line"));
    }

    #[tokio::test]
    async fn tail_file_resumes_from_persisted_offset() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("app.log");
        tokio::fs::write(&path, "first\n").await.unwrap();

        let sent = std::sync::Arc::new(tokio::sync::Mutex::new(Vec::<String>::new()));
        let sent_clone = sent.clone();
        let send = move |req: LogRequest| {
            let sent = sent_clone.clone();
            Box::pin(async move {
                if let Some(msg) = req.log_message {
                    sent.lock().await.push(msg);
                }
                Ok(())
            }) as futures::future::BoxFuture<'static, anyhow::Result<()>>
        };
        let cancel = tokio_util::sync::CancellationToken::new();
        let cancel_clone = cancel.clone();
        let path_clone = path.clone();
        let handle = tokio::spawn(async move {
            let _ = tail_file(&path_clone, &send, &cancel_clone).await;
        });
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        tokio::fs::write(&path, "first\nsecond\n").await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(400)).await;
        cancel.cancel();
        let _ = handle.await;
        let seen = sent.lock().await.clone();
        assert_eq!(seen, vec!["first".to_string(), "second".to_string()]);
    }
}
