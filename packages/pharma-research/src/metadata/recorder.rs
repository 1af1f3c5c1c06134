//! Append-only writer for run records.
//!
//! Records go through a channel to a dedicated writer task, so recording
//! never blocks the caller returning results. `flush` acknowledges that
//! everything sent so far has hit the disk; call it before process exit.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use tokio::sync::{mpsc, oneshot};
use tracing::{error, info};

use crate::metadata::RunRecord;

enum Command {
    Write(Box<RunRecord>),
    Flush(oneshot::Sender<()>),
}

/// Fire-and-forget run recorder backed by a writer task.
pub struct RunRecorder {
    tx: mpsc::UnboundedSender<Command>,
}

impl RunRecorder {
    /// Create a recorder appending to `path`. The header row is written
    /// when the file is created.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let (tx, mut rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Some(command) = rx.recv().await {
                match command {
                    Command::Write(record) => {
                        if let Err(e) = append_record(&path, &record) {
                            error!(error = %e, path = %path.display(), "failed to append run record");
                        } else {
                            info!(run_id = %record.run_id, "run record persisted");
                        }
                    }
                    Command::Flush(ack) => {
                        let _ = ack.send(());
                    }
                }
            }
        });

        Self { tx }
    }

    /// Queue a record for persistence. Never blocks.
    pub fn record(&self, record: RunRecord) {
        if self.tx.send(Command::Write(Box::new(record))).is_err() {
            error!("run recorder task is gone; record dropped");
        }
    }

    /// Wait until every record queued so far has been written.
    pub async fn flush(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.tx.send(Command::Flush(ack_tx)).is_ok() {
            let _ = ack_rx.await;
        }
    }
}

fn append_record(path: &Path, record: &RunRecord) -> std::io::Result<()> {
    let needs_header = match std::fs::metadata(path) {
        Ok(meta) => meta.len() == 0,
        Err(_) => true,
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    if needs_header {
        writeln!(file, "{}", RunRecord::header().join(","))?;
    }
    writeln!(file, "{}", record.to_csv_row())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Query, RunStats};
    use chrono::NaiveDate;

    fn record() -> RunRecord {
        let query = Query::new(
            vec!["insulin".into()],
            NaiveDate::from_ymd_opt(2024, 10, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 10, 17).unwrap(),
        )
        .unwrap();
        RunRecord::from_run(&query, RunStats::default(), "single")
    }

    #[tokio::test]
    async fn writes_header_then_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metadata.csv");
        let recorder = RunRecorder::new(&path);

        recorder.record(record());
        recorder.record(record());
        recorder.flush().await;

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("run_id,execution_timestamp"));
        assert_ne!(lines[1], lines[2], "run ids differ");
    }

    #[tokio::test]
    async fn header_is_not_duplicated_across_recorders() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metadata.csv");

        let first = RunRecorder::new(&path);
        first.record(record());
        first.flush().await;

        let second = RunRecorder::new(&path);
        second.record(record());
        second.flush().await;

        let content = std::fs::read_to_string(&path).unwrap();
        let header_count = content
            .lines()
            .filter(|l| l.starts_with("run_id,"))
            .count();
        assert_eq!(header_count, 1);
        assert_eq!(content.lines().count(), 3);
    }

    #[tokio::test]
    async fn creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/deep/metadata.csv");
        let recorder = RunRecorder::new(&path);

        recorder.record(record());
        recorder.flush().await;

        assert!(path.exists());
    }
}
