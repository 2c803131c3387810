//! Typed stand-in for speech capture
//!
//! Each line of input counts as one final transcript. Lines typed while
//! capture is not armed are discarded, the way a microphone would not hear
//! them.

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{Mutex, Notify, mpsc};
use tokio_util::sync::CancellationToken;

use super::SpeechCapture;
use crate::Result;

/// Reads utterances from a line source
pub struct TypedInput {
    lines: Mutex<mpsc::Receiver<String>>,
    abort: Notify,
}

impl TypedInput {
    /// Read lines from a channel
    #[must_use]
    pub fn new(lines: mpsc::Receiver<String>) -> Self {
        Self {
            lines: Mutex::new(lines),
            abort: Notify::new(),
        }
    }

    /// Read lines from stdin
    ///
    /// `closed` is cancelled when stdin reaches end of input.
    #[must_use]
    pub fn stdin(closed: CancellationToken) -> Self {
        let (tx, rx) = mpsc::channel(16);

        tokio::spawn(async move {
            let mut reader = BufReader::new(tokio::io::stdin()).lines();
            loop {
                match reader.next_line().await {
                    Ok(Some(line)) => {
                        if tx.send(line).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to read stdin");
                        break;
                    }
                }
            }
            tracing::debug!("stdin closed");
            closed.cancel();
        });

        Self::new(rx)
    }
}

#[async_trait]
impl SpeechCapture for TypedInput {
    fn is_supported(&self) -> bool {
        true
    }

    async fn listen(&self) -> Result<Option<String>> {
        let mut lines = self.lines.lock().await;

        while let Ok(stale) = lines.try_recv() {
            tracing::debug!(ignored = %stale, "discarding input typed while not listening");
        }

        let aborted = self.abort.notified();
        tokio::pin!(aborted);

        tokio::select! {
            () = &mut aborted => Ok(None),
            line = lines.recv() => match line {
                Some(line) => Ok(Some(line.trim().to_string()).filter(|l| !l.is_empty())),
                // Input is gone; stay silent until the call is ended
                None => {
                    aborted.await;
                    Ok(None)
                }
            },
        }
    }

    fn abort(&self) {
        self.abort.notify_waiters();
    }
}
