use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::mpsc::{self, Receiver, Sender};
use tracing::error;

/// A deferred task destined for the UI thread.
pub type UiJob = Box<dyn FnOnce() + Send + 'static>;

/// Single-consumer task queue standing in for a GUI toolkit's
/// "schedule on the main thread" primitive.
///
/// Producers clone a [`UiHandle`] and post jobs from any thread; the UI
/// loop calls [`UiQueue::drain`] once per tick on the thread that owns the
/// queue. This is the only supported way for background work to reach
/// UI-owned state.
pub struct UiQueue {
    tx: Sender<UiJob>,
    rx: Receiver<UiJob>,
}

impl UiQueue {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        Self { tx, rx }
    }

    pub fn handle(&self) -> UiHandle {
        UiHandle {
            tx: self.tx.clone(),
        }
    }

    /// Run every currently queued job, returning how many executed. A
    /// panicking job is caught and logged so one bad callback cannot kill
    /// the UI loop.
    pub fn drain(&self) -> usize {
        let mut executed = 0;
        while let Ok(job) = self.rx.try_recv() {
            executed += 1;
            if catch_unwind(AssertUnwindSafe(job)).is_err() {
                error!("UI task panicked");
            }
        }
        executed
    }
}

impl Default for UiQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Cloneable producer side of a [`UiQueue`].
#[derive(Clone)]
pub struct UiHandle {
    tx: Sender<UiJob>,
}

impl UiHandle {
    /// Post a job for the next drain. Silently dropped if the queue is
    /// gone, matching the bridge rule that callbacks die with their
    /// destination.
    pub fn post(&self, job: impl FnOnce() + Send + 'static) {
        let _ = self.tx.send(Box::new(job));
    }
}
