use std::{path::PathBuf, sync::Arc};

use chrono::{SecondsFormat, Utc};
use reqwest::{Method, StatusCode};
use tokio::{
    fs::OpenOptions,
    io::AsyncWriteExt,
    sync::{mpsc, oneshot},
};
use tracing::warn;

enum LogCommand {
    Line(String),
    /// Acknowledged once every line queued before it has been written.
    Close(oneshot::Sender<()>),
}

/// Appends one line per API exchange to a file from a background task.
#[derive(Debug)]
pub struct RequestLog {
    sender: mpsc::UnboundedSender<LogCommand>,
}

impl RequestLog {
    pub fn new(path: PathBuf) -> Arc<Self> {
        let (tx, mut rx) = mpsc::unbounded_channel::<LogCommand>();
        let log = Arc::new(Self { sender: tx });

        tokio::spawn(async move {
            let mut file = match OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .await
            {
                Ok(file) => Some(file),
                Err(err) => {
                    warn!(?err, path = %path.display(), "failed to open request log");
                    None
                }
            };

            while let Some(command) = rx.recv().await {
                match command {
                    LogCommand::Line(line) => {
                        let Some(open) = file.as_mut() else {
                            continue;
                        };
                        let written = match open.write_all(line.as_bytes()).await {
                            Ok(()) => open.flush().await,
                            Err(err) => Err(err),
                        };
                        if let Err(err) = written {
                            warn!(?err, "failed to write request log");
                            file = None;
                        }
                    }
                    LogCommand::Close(done) => {
                        let _ = done.send(());
                        break;
                    }
                }
            }
        });

        log
    }

    pub fn record(&self, method: &Method, path: &str, outcome: Result<StatusCode, &str>) {
        let _ = self
            .sender
            .send(LogCommand::Line(format_line(method, path, outcome)));
    }

    /// Waits until every recorded line is on disk, then stops the writer.
    /// Lines recorded afterwards are dropped.
    pub async fn close(&self) {
        let (done, written) = oneshot::channel();
        if self.sender.send(LogCommand::Close(done)).is_err() {
            return;
        }
        let _ = written.await;
    }
}

fn format_line(method: &Method, path: &str, outcome: Result<StatusCode, &str>) -> String {
    let at = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
    match outcome {
        Ok(status) => format!("{} {} {} -> {}\n", at, method, path, status.as_u16()),
        Err(error) => format!("{} {} {} -> error: {}\n", at, method, path, error),
    }
}
