use parking_lot::Mutex;
use std::fmt::Display;
use std::future::Future;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::ui::UiHandle;

/// How long `stop()` waits for the worker before abandoning it.
const SHUTDOWN_WAIT: Duration = Duration::from_secs(5);

pub type SuccessCallback<T> = Box<dyn FnOnce(T) + Send + 'static>;
pub type ErrorCallback<E> = Box<dyn FnOnce(E) + Send + 'static>;

struct Worker {
    handle: tokio::runtime::Handle,
    cancel: CancellationToken,
    done_rx: mpsc::Receiver<()>,
    thread: Option<thread::JoinHandle<()>>,
}

/// Bridge between async device I/O and the single-threaded UI loop.
///
/// `start()` spins up one dedicated worker thread running a current-thread
/// tokio runtime for the lifetime of the bridge; all submitted operations
/// execute cooperatively on that thread, so the UI thread never blocks on
/// device I/O. No ordering is guaranteed between concurrently submitted
/// operations.
pub struct AsyncBridge {
    worker: Mutex<Option<Worker>>,
}

impl AsyncBridge {
    pub fn new() -> Self {
        Self {
            worker: Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.worker.lock().is_some()
    }

    /// Start the worker loop. Idempotent while running.
    pub fn start(&self) {
        let mut slot = self.worker.lock();
        if slot.is_some() {
            return;
        }

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let (handle_tx, handle_rx) = mpsc::channel();
        let (done_tx, done_rx) = mpsc::channel();

        let spawned = thread::Builder::new()
            .name("async-bridge".into())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        error!("Failed to build bridge runtime: {e}");
                        return;
                    }
                };
                if handle_tx.send(runtime.handle().clone()).is_err() {
                    return;
                }
                runtime.block_on(token.cancelled());
                // Dropping the runtime drops in-flight tasks; their
                // completion callbacks die with the loop.
                drop(runtime);
                let _ = done_tx.send(());
            });

        let thread = match spawned {
            Ok(thread) => thread,
            Err(e) => {
                error!("Failed to spawn bridge worker: {e}");
                return;
            }
        };

        match handle_rx.recv() {
            Ok(handle) => {
                *slot = Some(Worker {
                    handle,
                    cancel,
                    done_rx,
                    thread: Some(thread),
                });
                info!("AsyncBridge started");
            }
            Err(_) => {
                warn!("Bridge worker exited during startup");
                let _ = thread.join();
            }
        }
    }

    /// Submit an operation from any thread. Returns `None` without polling
    /// the future when the bridge is not running; callers must check.
    /// Completion callbacks, if provided, run on the worker thread.
    pub fn run_async<T, E, Fut>(
        &self,
        future: Fut,
        on_success: Option<SuccessCallback<T>>,
        on_error: Option<ErrorCallback<E>>,
    ) -> Option<JoinHandle<()>>
    where
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Display + Send + 'static,
    {
        let slot = self.worker.lock();
        let worker = match slot.as_ref() {
            Some(worker) => worker,
            None => {
                warn!("AsyncBridge not running, cannot schedule operation");
                return None;
            }
        };

        Some(worker.handle.spawn(async move {
            match future.await {
                Ok(value) => {
                    if let Some(callback) = on_success {
                        callback(value);
                    }
                }
                Err(e) => {
                    error!("Error in async operation: {e}");
                    if let Some(callback) = on_error {
                        callback(e);
                    }
                }
            }
        }))
    }

    /// Same submission semantics as [`run_async`](Self::run_async), but
    /// completion callbacks are marshaled through the UI queue and execute
    /// on the UI thread. This is the only path by which async results may
    /// touch UI-owned state.
    pub fn run_async_with_ui_callback<T, E, Fut>(
        &self,
        future: Fut,
        ui: &UiHandle,
        on_success: Option<SuccessCallback<T>>,
        on_error: Option<ErrorCallback<E>>,
    ) -> Option<JoinHandle<()>>
    where
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Display + Send + 'static,
    {
        let deferred_success = on_success.map(|callback| {
            let ui = ui.clone();
            Box::new(move |value: T| ui.post(move || callback(value))) as SuccessCallback<T>
        });
        let deferred_error = on_error.map(|callback| {
            let ui = ui.clone();
            Box::new(move |e: E| ui.post(move || callback(e))) as ErrorCallback<E>
        });
        self.run_async(future, deferred_success, deferred_error)
    }

    /// Signal the loop to terminate and wait a bounded time for the worker.
    /// The bridge is considered stopped regardless of the outcome: a wedged
    /// worker is abandoned, not force-killed.
    pub fn stop(&self) {
        let worker = self.worker.lock().take();
        let Some(mut worker) = worker else {
            return;
        };

        worker.cancel.cancel();
        match worker.done_rx.recv_timeout(SHUTDOWN_WAIT) {
            Ok(()) => {
                if let Some(thread) = worker.thread.take() {
                    let _ = thread.join();
                }
                info!("AsyncBridge stopped");
            }
            Err(_) => {
                warn!(
                    "Bridge worker did not exit within {SHUTDOWN_WAIT:?}; abandoning it"
                );
            }
        }
    }
}

impl Default for AsyncBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for AsyncBridge {
    fn drop(&mut self) {
        self.stop();
    }
}
