use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use application::bus::{EventBus, Subscriber};
use application::ui::UiQueue;
use domain::{AppEvent, EventType};

fn counting_subscriber(counter: &Arc<AtomicUsize>) -> Subscriber {
    let counter = counter.clone();
    Arc::new(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    })
}

#[test]
fn test_publish_with_no_subscribers_is_a_noop() {
    let bus = EventBus::new();
    bus.publish(&AppEvent::settings_changed());
}

#[test]
fn test_duplicate_subscription_fires_once() {
    let bus = EventBus::new();
    let counter = Arc::new(AtomicUsize::new(0));
    let callback = counting_subscriber(&counter);

    bus.subscribe(EventType::SettingsChanged, callback.clone());
    bus.subscribe(EventType::SettingsChanged, callback);

    bus.publish(&AppEvent::settings_changed());
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[test]
fn test_subscribers_only_see_their_event_type() {
    let bus = EventBus::new();
    let counter = Arc::new(AtomicUsize::new(0));

    bus.subscribe(EventType::AppMinimized, counting_subscriber(&counter));

    bus.publish(&AppEvent::app_restored());
    assert_eq!(counter.load(Ordering::SeqCst), 0);

    bus.publish(&AppEvent::app_minimized());
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[test]
fn test_panicking_subscriber_does_not_stop_later_ones() {
    let bus = EventBus::new();
    let later = Arc::new(AtomicUsize::new(0));

    bus.subscribe(
        EventType::DeviceStateChanged,
        Arc::new(|_| panic!("bad handler")),
    );
    bus.subscribe(EventType::DeviceStateChanged, counting_subscriber(&later));

    bus.publish(&AppEvent::device_state_changed("light:1"));
    assert_eq!(later.load(Ordering::SeqCst), 1);
}

#[test]
fn test_subscribers_run_in_subscription_order() {
    let bus = EventBus::new();
    let order = Arc::new(Mutex::new(Vec::new()));

    for tag in ["first", "second", "third"] {
        let order = order.clone();
        bus.subscribe(
            EventType::DiscoveryStarted,
            Arc::new(move |_| order.lock().push(tag)),
        );
    }

    bus.publish(&AppEvent::discovery_started());
    assert_eq!(order.lock().clone(), vec!["first", "second", "third"]);
}

#[test]
fn test_unsubscribe_is_best_effort() {
    let bus = EventBus::new();
    let counter = Arc::new(AtomicUsize::new(0));
    let callback = counting_subscriber(&counter);
    let never_subscribed = counting_subscriber(&counter);

    bus.subscribe(EventType::SettingsChanged, callback.clone());

    // Removing something never subscribed is silently ignored.
    bus.unsubscribe(EventType::SettingsChanged, &never_subscribed);
    bus.unsubscribe(EventType::AppMinimized, &callback);

    bus.publish(&AppEvent::settings_changed());
    assert_eq!(counter.load(Ordering::SeqCst), 1);

    bus.unsubscribe(EventType::SettingsChanged, &callback);
    bus.publish(&AppEvent::settings_changed());
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[test]
fn test_publish_deferred_runs_on_drain_only() {
    let bus = EventBus::new();
    let ui = UiQueue::new();
    let counter = Arc::new(AtomicUsize::new(0));

    bus.subscribe(EventType::DeviceRemoved, counting_subscriber(&counter));

    bus.publish_deferred(AppEvent::device_removed("light:1"), &ui.handle());
    assert_eq!(counter.load(Ordering::SeqCst), 0);

    assert_eq!(ui.drain(), 1);
    assert_eq!(counter.load(Ordering::SeqCst), 1);

    // Nothing left queued.
    assert_eq!(ui.drain(), 0);
}
