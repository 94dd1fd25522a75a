use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::time::Duration;

use application::bridge::{AsyncBridge, ErrorCallback, SuccessCallback};
use application::ui::UiQueue;

fn success_sender<T: Send + 'static>(tx: mpsc::Sender<T>) -> Option<SuccessCallback<T>> {
    Some(Box::new(move |value| {
        let _ = tx.send(value);
    }))
}

fn error_sender(tx: mpsc::Sender<String>) -> Option<ErrorCallback<String>> {
    Some(Box::new(move |e: String| {
        let _ = tx.send(e);
    }))
}

#[test]
fn test_run_async_before_start_returns_none_and_never_polls() {
    let bridge = AsyncBridge::new();
    let polled = Arc::new(AtomicBool::new(false));

    let flag = polled.clone();
    let handle = bridge.run_async(
        async move {
            flag.store(true, Ordering::SeqCst);
            Ok::<_, String>(())
        },
        None::<SuccessCallback<()>>,
        None::<ErrorCallback<String>>,
    );

    assert!(handle.is_none());
    std::thread::sleep(Duration::from_millis(50));
    assert!(!polled.load(Ordering::SeqCst));
}

#[test]
fn test_success_callback_runs_on_worker_thread() {
    let bridge = AsyncBridge::new();
    bridge.start();
    assert!(bridge.is_running());

    let (tx, rx) = mpsc::channel();
    let handle = bridge.run_async(
        async {
            Ok::<_, String>(std::thread::current().name().map(str::to_string))
        },
        success_sender(tx),
        None::<ErrorCallback<String>>,
    );
    assert!(handle.is_some());

    let callback_thread = rx.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(callback_thread.as_deref(), Some("async-bridge"));

    bridge.stop();
}

#[test]
fn test_error_callback_receives_the_error() {
    let bridge = AsyncBridge::new();
    bridge.start();

    let (tx, rx) = mpsc::channel();
    bridge.run_async(
        async { Err::<(), String>("transport burped".to_string()) },
        None::<SuccessCallback<()>>,
        error_sender(tx),
    );

    let error = rx.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(error, "transport burped");

    bridge.stop();
}

#[test]
fn test_ui_callback_runs_only_when_queue_drains() {
    let bridge = AsyncBridge::new();
    bridge.start();
    let ui = UiQueue::new();

    let (tx, rx) = mpsc::channel();
    bridge.run_async_with_ui_callback(
        async { Ok::<_, String>(21 * 2) },
        &ui.handle(),
        success_sender(tx),
        None::<ErrorCallback<String>>,
    );

    // Wait until the worker has posted the completion, then verify nothing
    // ran before the drain.
    let mut drained_values = Vec::new();
    for _ in 0..100 {
        if ui.drain() > 0 {
            drained_values.push(rx.recv_timeout(Duration::from_millis(100)).unwrap());
            break;
        }
        assert!(rx.try_recv().is_err());
        std::thread::sleep(Duration::from_millis(10));
    }
    assert_eq!(drained_values, vec![42]);

    bridge.stop();
}

#[test]
fn test_start_is_idempotent_and_stop_restart_works() {
    let bridge = AsyncBridge::new();
    bridge.start();
    bridge.start();
    assert!(bridge.is_running());

    bridge.stop();
    bridge.stop();
    assert!(!bridge.is_running());

    // A stopped bridge rejects work...
    let rejected = bridge.run_async(
        async { Ok::<_, String>(()) },
        None::<SuccessCallback<()>>,
        None::<ErrorCallback<String>>,
    );
    assert!(rejected.is_none());

    // ...and a restarted one accepts it again.
    bridge.start();
    let (tx, rx) = mpsc::channel();
    bridge.run_async(
        async { Ok::<_, String>(7) },
        success_sender(tx),
        None::<ErrorCallback<String>>,
    );
    assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), 7);
    bridge.stop();
}

#[test]
fn test_stop_drops_in_flight_callbacks() {
    let bridge = AsyncBridge::new();
    bridge.start();

    let (tx, rx) = mpsc::channel();
    bridge.run_async(
        async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok::<_, String>(())
        },
        success_sender(tx),
        None::<ErrorCallback<String>>,
    );

    bridge.stop();

    // The pending operation died with the loop; its callback never fires.
    assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
}
