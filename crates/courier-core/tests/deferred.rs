use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use chrono::TimeZone;
use chrono::Utc;
use courier_core::ports::FixedClock;
use courier_core::{
    Context, ContextError, DispatchError, Envelope, Message, Registry, RegistryBuilder,
    ResultCallback, batch, handler_fn,
};
use tokio::sync::oneshot;

#[derive(Debug)]
struct Tick;
impl Message for Tick {}

#[derive(Debug)]
struct Boom;
impl Message for Boom {}

fn ticking_registry(ran: &Arc<AtomicBool>) -> Registry {
    let registry = Registry::new();
    let ran = Arc::clone(ran);
    registry.register(handler_fn(move |_ctx, _: &mut Tick| {
        ran.store(true, Ordering::SeqCst);
        Ok(())
    }));
    registry
}

fn capture() -> (ResultCallback, oneshot::Receiver<Result<(), DispatchError>>) {
    let (tx, rx) = oneshot::channel();
    let callback: ResultCallback = Box::new(move |result| {
        let _ = tx.send(result);
    });
    (callback, rx)
}

#[tokio::test]
async fn dispatch_after_runs_later_and_reports_success() {
    let ran = Arc::new(AtomicBool::new(false));
    let registry = ticking_registry(&ran);
    let (callback, rx) = capture();

    registry.dispatch_after(
        &Context::background(),
        Duration::from_millis(10),
        Some(callback),
        Envelope::owned(Tick),
    );
    assert!(!ran.load(Ordering::SeqCst));

    rx.await.unwrap().unwrap();
    assert!(ran.load(Ordering::SeqCst));
}

#[tokio::test]
async fn zero_delay_is_still_asynchronous() {
    let ran = Arc::new(AtomicBool::new(false));
    let registry = ticking_registry(&ran);
    let (callback, rx) = capture();

    registry.dispatch_after(&Context::background(), Duration::ZERO, Some(callback), Envelope::owned(Tick));
    assert!(!ran.load(Ordering::SeqCst));

    rx.await.unwrap().unwrap();
    assert!(ran.load(Ordering::SeqCst));
}

#[tokio::test]
async fn cancel_before_timer_skips_handlers() {
    let ran = Arc::new(AtomicBool::new(false));
    let registry = ticking_registry(&ran);
    let (ctx, cancel) = Context::with_cancel(&Context::background());
    let (callback, rx) = capture();

    registry.dispatch_after(&ctx, Duration::from_millis(50), Some(callback), Envelope::owned(Tick));
    cancel.cancel();

    let err = rx.await.unwrap().unwrap_err();
    assert!(matches!(err, DispatchError::Context(ContextError::Canceled)));
    assert!(!ran.load(Ordering::SeqCst));
}

#[tokio::test]
async fn already_canceled_context_wins_over_zero_delay() {
    let ran = Arc::new(AtomicBool::new(false));
    let registry = ticking_registry(&ran);
    let (ctx, cancel) = Context::with_cancel(&Context::background());
    cancel.cancel();
    let (callback, rx) = capture();

    registry.dispatch_after(&ctx, Duration::ZERO, Some(callback), Envelope::owned(Tick));

    let err = rx.await.unwrap().unwrap_err();
    assert!(matches!(err, DispatchError::Context(ContextError::Canceled)));
    assert!(!ran.load(Ordering::SeqCst));
}

#[tokio::test]
async fn deadline_before_timer_reports_deadline_exceeded() {
    let ran = Arc::new(AtomicBool::new(false));
    let registry = ticking_registry(&ran);
    let (ctx, _cancel) = Context::with_timeout(&Context::background(), Duration::from_millis(5));
    let (callback, rx) = capture();

    registry.dispatch_after(&ctx, Duration::from_secs(5), Some(callback), Envelope::owned(Tick));

    let err = rx.await.unwrap().unwrap_err();
    assert!(matches!(err, DispatchError::Context(ContextError::DeadlineExceeded)));
    assert!(!ran.load(Ordering::SeqCst));
}

#[tokio::test]
async fn missing_callback_still_dispatches() {
    let ran = Arc::new(AtomicBool::new(false));
    let registry = ticking_registry(&ran);

    let deferred = registry.dispatch_after(
        &Context::background(),
        Duration::from_millis(1),
        None,
        Envelope::owned(Tick),
    );
    deferred.join().await.unwrap();

    assert!(ran.load(Ordering::SeqCst));
}

#[tokio::test]
async fn handler_failure_reaches_the_callback() {
    let registry = Registry::new();
    registry.register(handler_fn(|_ctx, _: &mut Boom| Err("boom".into())));
    let (callback, rx) = capture();

    registry.dispatch_after(&Context::background(), Duration::ZERO, Some(callback), Envelope::owned(Boom));

    let err = rx.await.unwrap().unwrap_err();
    assert_eq!(err.handler_error().unwrap().to_string(), "boom");
}

#[tokio::test]
async fn deferred_batch_is_fail_fast() {
    let calls = Arc::new(AtomicUsize::new(0));
    let registry = Registry::new();
    let counter = Arc::clone(&calls);
    registry.register(handler_fn(move |_ctx, _: &mut Tick| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }));
    registry.register(handler_fn(|_ctx, _: &mut Boom| Err("boom".into())));
    let (callback, rx) = capture();

    let mut messages = batch![];
    messages.push_owned(Tick);
    messages.push_owned(Boom);
    messages.push_owned(Tick);
    registry.dispatch_after(&Context::background(), Duration::ZERO, Some(callback), messages);

    assert!(rx.await.unwrap().is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn dispatch_at_in_the_past_runs_asynchronously() {
    let now = Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap();
    let ran = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&ran);
    let registry = RegistryBuilder::new()
        .register(handler_fn(move |_ctx, _: &mut Tick| {
            flag.store(true, Ordering::SeqCst);
            Ok(())
        }))
        .clock(FixedClock::new(now))
        .build()
        .unwrap();
    let (callback, rx) = capture();

    registry.dispatch_at(
        &Context::background(),
        now - chrono::Duration::hours(1),
        Some(callback),
        Envelope::owned(Tick),
    );
    assert!(!ran.load(Ordering::SeqCst));

    rx.await.unwrap().unwrap();
    assert!(ran.load(Ordering::SeqCst));
}

#[tokio::test(start_paused = true)]
async fn dispatch_at_waits_for_the_gap_on_the_clock() {
    let now = Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap();
    let ran = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&ran);
    let registry = RegistryBuilder::new()
        .register(handler_fn(move |_ctx, _: &mut Tick| {
            flag.store(true, Ordering::SeqCst);
            Ok(())
        }))
        .clock(FixedClock::new(now))
        .build()
        .unwrap();

    let deferred = registry.dispatch_at(
        &Context::background(),
        now + chrono::Duration::seconds(30),
        None,
        Envelope::owned(Tick),
    );

    tokio::time::sleep(Duration::from_secs(29)).await;
    assert!(!ran.load(Ordering::SeqCst));

    deferred.join().await.unwrap();
    assert!(ran.load(Ordering::SeqCst));
}
