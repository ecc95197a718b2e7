//! Bounded, non-blocking front for any sink.
//!
//! Entries are queued on a bounded channel and written by one dedicated
//! writer thread. [`LogSink::write`] never blocks: when the queue is full the
//! entry is dropped and [`LogSinkError::QueueFull`] is returned, so a hung
//! backend cannot wedge a caller.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TrySendError};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use labhost_core::LogEntry;

use crate::{LogSink, LogSinkError};

/// Default queue depth.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1_024;

enum WriterCommand {
    Write(LogEntry),
    Flush(SyncSender<()>),
}

#[derive(Debug, Default)]
struct WriterStats {
    dropped: AtomicU64,
    backend_failures: AtomicU64,
}

/// Asynchronous sink wrapping an inner backend.
pub struct AsyncLogSink {
    sender: Mutex<Option<SyncSender<WriterCommand>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    stats: Arc<WriterStats>,
}

impl AsyncLogSink {
    /// Spawns the writer thread in front of `inner`.
    ///
    /// # Errors
    /// Returns [`LogSinkError::Io`] when the writer thread cannot be spawned.
    pub fn spawn(inner: Arc<dyn LogSink>, capacity: usize) -> Result<Self, LogSinkError> {
        let (sender, receiver) = mpsc::sync_channel::<WriterCommand>(capacity.max(1));
        let stats = Arc::new(WriterStats::default());
        let worker_stats = Arc::clone(&stats);

        let worker = std::thread::Builder::new()
            .name("labhost-log-writer".to_string())
            .spawn(move || run_writer(&receiver, inner.as_ref(), &worker_stats))?;

        Ok(Self {
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(Some(worker)),
            stats,
        })
    }

    /// Number of entries dropped because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.stats.dropped.load(Ordering::Relaxed)
    }

    /// Number of entries the backend failed to record.
    pub fn backend_failures(&self) -> u64 {
        self.stats.backend_failures.load(Ordering::Relaxed)
    }

    /// Closes the queue, lets the writer drain it, and waits up to `timeout`.
    ///
    /// Returns `true` when the writer finished within the budget. A writer
    /// that overruns is left detached.
    pub fn shutdown(&self, timeout: Duration) -> bool {
        drop(self.lock_sender().take());

        let Some(worker) = self
            .worker
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
        else {
            return true;
        };

        let deadline = Instant::now() + timeout;
        while !worker.is_finished() {
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        let _ = worker.join();
        true
    }

    fn lock_sender(&self) -> std::sync::MutexGuard<'_, Option<SyncSender<WriterCommand>>> {
        self.sender
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn current_sender(&self) -> Result<SyncSender<WriterCommand>, LogSinkError> {
        self.lock_sender().clone().ok_or(LogSinkError::Closed)
    }
}

impl LogSink for AsyncLogSink {
    fn write(&self, entry: LogEntry) -> Result<(), LogSinkError> {
        match self.current_sender()?.try_send(WriterCommand::Write(entry)) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                Err(LogSinkError::QueueFull)
            }
            Err(TrySendError::Disconnected(_)) => Err(LogSinkError::Closed),
        }
    }

    /// Waits (at most one second) until everything queued so far is written.
    fn flush(&self) -> Result<(), LogSinkError> {
        let (ack_tx, ack_rx) = mpsc::sync_channel(1);
        match self.current_sender()?.try_send(WriterCommand::Flush(ack_tx)) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => return Err(LogSinkError::QueueFull),
            Err(TrySendError::Disconnected(_)) => return Err(LogSinkError::Closed),
        }
        match ack_rx.recv_timeout(Duration::from_secs(1)) {
            Ok(()) => Ok(()),
            Err(RecvTimeoutError::Timeout) => Err(LogSinkError::QueueFull),
            Err(RecvTimeoutError::Disconnected) => Err(LogSinkError::Closed),
        }
    }
}

impl Drop for AsyncLogSink {
    fn drop(&mut self) {
        self.shutdown(Duration::from_secs(1));
    }
}

fn run_writer(receiver: &Receiver<WriterCommand>, inner: &dyn LogSink, stats: &WriterStats) {
    while let Ok(command) = receiver.recv() {
        match command {
            WriterCommand::Write(entry) => {
                let written = catch_unwind(AssertUnwindSafe(|| inner.write(entry)));
                if !matches!(written, Ok(Ok(()))) {
                    stats.backend_failures.fetch_add(1, Ordering::Relaxed);
                }
            }
            WriterCommand::Flush(ack) => {
                let _ = catch_unwind(AssertUnwindSafe(|| inner.flush()));
                let _ = ack.send(());
            }
        }
    }
    let _ = catch_unwind(AssertUnwindSafe(|| inner.flush()));
}
