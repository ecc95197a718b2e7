//! Performance monitoring collaborator.
//!
//! Counter collection itself is not part of the host; the host only drives
//! the monitor through start, stop, cleanup and dispose.

use std::collections::VecDeque;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use thiserror::Error;

/// Samples retained by [`SamplingPerformanceMonitor`].
pub const SAMPLE_HISTORY: usize = 64;

/// Monitor lifecycle failures.
#[derive(Debug, Error)]
pub enum MonitorError {
    /// The sampling thread could not be started.
    #[error("failed to spawn monitor thread: {0}")]
    Spawn(#[source] std::io::Error),
    /// The monitor was already disposed.
    #[error("performance monitor is disposed")]
    Disposed,
    /// The sampling thread panicked.
    #[error("monitor thread panicked")]
    WorkerPanicked,
}

/// Lifecycle contract the host drives.
pub trait PerformanceMonitor: Send + Sync {
    /// Begins collection.
    ///
    /// # Errors
    /// Returns [`MonitorError`] when collection cannot start.
    fn start(&self) -> Result<(), MonitorError>;
    /// Stops collection.
    ///
    /// # Errors
    /// Returns [`MonitorError`] when the collector did not stop cleanly.
    fn stop(&self) -> Result<(), MonitorError>;
    /// Releases collected data.
    ///
    /// # Errors
    /// Returns [`MonitorError`] on backend failure.
    fn cleanup(&self) -> Result<(), MonitorError>;
    /// Releases the monitor itself. No method may be used afterwards.
    ///
    /// # Errors
    /// Returns [`MonitorError`] on backend failure.
    fn dispose(&self) -> Result<(), MonitorError>;
}

/// Monitor that does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullPerformanceMonitor;

impl PerformanceMonitor for NullPerformanceMonitor {
    fn start(&self) -> Result<(), MonitorError> {
        Ok(())
    }

    fn stop(&self) -> Result<(), MonitorError> {
        Ok(())
    }

    fn cleanup(&self) -> Result<(), MonitorError> {
        Ok(())
    }

    fn dispose(&self) -> Result<(), MonitorError> {
        Ok(())
    }
}

/// One uptime sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PerformanceSample {
    /// Time since [`PerformanceMonitor::start`].
    pub uptime: Duration,
}

struct Sampler {
    stop: Sender<()>,
    worker: JoinHandle<()>,
}

#[derive(Default)]
struct SamplingState {
    sampler: Option<Sampler>,
    disposed: bool,
}

/// Samples process uptime on a background thread at a fixed interval.
pub struct SamplingPerformanceMonitor {
    interval: Duration,
    state: Mutex<SamplingState>,
    samples: Arc<Mutex<VecDeque<PerformanceSample>>>,
}

impl SamplingPerformanceMonitor {
    /// Creates a stopped monitor sampling every `interval`.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            state: Mutex::new(SamplingState::default()),
            samples: Arc::new(Mutex::new(VecDeque::with_capacity(SAMPLE_HISTORY))),
        }
    }

    /// Returns `true` while the sampling thread runs.
    pub fn is_running(&self) -> bool {
        self.state().sampler.is_some()
    }

    /// Recent samples, oldest first.
    pub fn samples(&self) -> Vec<PerformanceSample> {
        lock(&self.samples).iter().copied().collect()
    }

    fn state(&self) -> MutexGuard<'_, SamplingState> {
        lock(&self.state)
    }
}

impl PerformanceMonitor for SamplingPerformanceMonitor {
    fn start(&self) -> Result<(), MonitorError> {
        let mut state = self.state();
        if state.disposed {
            return Err(MonitorError::Disposed);
        }
        if state.sampler.is_some() {
            return Ok(());
        }

        let (stop, stop_rx) = mpsc::channel::<()>();
        let samples = Arc::clone(&self.samples);
        let interval = self.interval;
        let worker = std::thread::Builder::new()
            .name("labhost-perf-sampler".to_string())
            .spawn(move || {
                let started = Instant::now();
                loop {
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {
                            let sample = PerformanceSample {
                                uptime: started.elapsed(),
                            };
                            let mut samples = lock(&samples);
                            if samples.len() == SAMPLE_HISTORY {
                                samples.pop_front();
                            }
                            samples.push_back(sample);
                            tracing::trace!(uptime_ms = sample.uptime.as_millis() as u64, "performance sample");
                        }
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
            })
            .map_err(MonitorError::Spawn)?;

        state.sampler = Some(Sampler { stop, worker });
        Ok(())
    }

    fn stop(&self) -> Result<(), MonitorError> {
        let Some(sampler) = self.state().sampler.take() else {
            return Ok(());
        };
        let _ = sampler.stop.send(());
        sampler.worker.join().map_err(|_| MonitorError::WorkerPanicked)
    }

    fn cleanup(&self) -> Result<(), MonitorError> {
        lock(&self.samples).clear();
        Ok(())
    }

    fn dispose(&self) -> Result<(), MonitorError> {
        self.stop()?;
        self.state().disposed = true;
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sampler_collects_until_stopped() {
        let monitor = SamplingPerformanceMonitor::new(Duration::from_millis(5));
        monitor.start().expect("start");
        monitor.start().expect("second start is a no-op");
        assert!(monitor.is_running());

        let deadline = Instant::now() + Duration::from_secs(2);
        while monitor.samples().is_empty() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        monitor.stop().expect("stop");
        assert!(!monitor.is_running());
        assert!(!monitor.samples().is_empty());

        monitor.cleanup().expect("cleanup");
        assert!(monitor.samples().is_empty());
    }

    #[test]
    fn disposed_monitor_refuses_to_start() {
        let monitor = SamplingPerformanceMonitor::new(Duration::from_millis(50));
        monitor.start().expect("start");
        monitor.dispose().expect("dispose");
        assert!(matches!(monitor.start(), Err(MonitorError::Disposed)));
    }
}
