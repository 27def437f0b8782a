//! Bounded, cancellable streaming of issue records.
//!
//! A producer thread reads JSONL and pushes records through a bounded
//! channel; the consumer pulls them as an iterator. Dropping or cancelling
//! the stream closes the channel and the producer stops at its next send.

use crate::wire::WireRecord;
use std::io::BufRead;
use std::thread::{self, JoinHandle};
use tokio::sync::mpsc;
use tracing::debug;

pub const DEFAULT_CAPACITY: usize = 64;

pub struct IssueStream {
    receiver: mpsc::Receiver<Result<WireRecord, StreamError>>,
    producer: Option<JoinHandle<()>>,
}

impl IssueStream {
    /// Start reading `reader` on a background thread. At most `capacity`
    /// parsed records wait in the channel at any time.
    pub fn spawn<R: BufRead + Send + 'static>(reader: R, capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let producer = thread::spawn(move || produce(reader, sender));
        Self {
            receiver,
            producer: Some(producer),
        }
    }

    /// Stop the producer. Records already buffered are still yielded.
    pub fn cancel(&mut self) {
        self.receiver.close();
    }

    /// Cancel, then wait for the producer thread to exit.
    pub fn finish(mut self) -> Result<(), StreamError> {
        self.cancel();
        while self.receiver.blocking_recv().is_some() {}
        match self.producer.take() {
            Some(handle) => handle.join().map_err(|_| StreamError::ProducerPanicked),
            None => Ok(()),
        }
    }
}

impl Iterator for IssueStream {
    type Item = Result<WireRecord, StreamError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.receiver.blocking_recv()
    }
}

impl Drop for IssueStream {
    fn drop(&mut self) {
        self.receiver.close();
    }
}

fn produce(reader: impl BufRead, sender: mpsc::Sender<Result<WireRecord, StreamError>>) {
    for (line_no, line) in reader.lines().enumerate() {
        let line_no = line_no + 1;
        let (item, fatal) = match line {
            Err(e) => (
                Err(StreamError::Io {
                    line: line_no,
                    message: e.to_string(),
                }),
                true,
            ),
            Ok(line) => {
                let trimmed = line.trim();
                if trimmed.is_empty() || trimmed.starts_with('#') {
                    continue;
                }
                let item = WireRecord::parse(trimmed).map_err(|e| StreamError::Parse {
                    line: line_no,
                    message: e.to_string(),
                });
                (item, false)
            }
        };
        if sender.blocking_send(item).is_err() {
            debug!(line = line_no, "issue stream cancelled by consumer");
            return;
        }
        if fatal {
            return;
        }
    }
}

/// Per-line stream failures. Parse errors leave the stream running;
/// an I/O error ends it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    #[error("I/O error at line {line}: {message}")]
    Io { line: usize, message: String },

    #[error("parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("stream producer panicked")]
    ProducerPanicked,
}
