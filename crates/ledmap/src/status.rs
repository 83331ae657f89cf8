//! Periodic status snapshots

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, TrySendError};
use ledmap_core::StatusSnapshot;
use tracing::{debug, info};

use crate::context::ShowContext;
use crate::error::{Result, ShowError};

const QUEUE_DEPTH: usize = 8;

/// Publishes a [`StatusSnapshot`] every interval. A consumer that falls
/// behind misses snapshots; the show never waits for it.
pub struct StatusPublisher {
    receiver: Receiver<StatusSnapshot>,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl StatusPublisher {
    pub fn spawn(context: Arc<ShowContext>, interval: Duration) -> Result<Self> {
        let (sender, receiver) = bounded(QUEUE_DEPTH);
        let running = Arc::new(AtomicBool::new(true));
        let flag = running.clone();
        let interval = interval.max(Duration::from_millis(1));

        let thread = thread::Builder::new()
            .name("status-publisher".to_string())
            .spawn(move || {
                info!("Status publisher started ({:?})", interval);
                while flag.load(Ordering::Relaxed) {
                    let started = Instant::now();
                    match sender.try_send(context.status()) {
                        Ok(()) => {}
                        Err(TrySendError::Full(_)) => {
                            debug!("Status consumer lagging, snapshot skipped")
                        }
                        Err(TrySendError::Disconnected(_)) => break,
                    }
                    let elapsed = started.elapsed();
                    if elapsed < interval {
                        thread::sleep(interval - elapsed);
                    }
                }
                info!("Status publisher stopped");
            })
            .map_err(|e| ShowError::Spawn(e.to_string()))?;

        Ok(Self {
            receiver,
            running,
            thread: Some(thread),
        })
    }

    pub fn receiver(&self) -> &Receiver<StatusSnapshot> {
        &self.receiver
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for StatusPublisher {
    fn drop(&mut self) {
        self.stop();
    }
}
