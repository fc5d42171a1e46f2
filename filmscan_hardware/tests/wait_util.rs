use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::thread;
use std::time::Duration;

use filmscan_hardware::error::HwError;
use filmscan_hardware::util::poll_until;
use rstest::rstest;

#[test]
fn poll_until_success_path() {
    let ready = Arc::new(AtomicBool::new(false));
    let ready_bg = ready.clone();
    // Flip ready after a short delay
    thread::spawn(move || {
        thread::sleep(Duration::from_millis(3));
        ready_bg.store(true, Ordering::Relaxed);
    });

    let res = poll_until(
        || Ok(ready.load(Ordering::Relaxed)),
        Duration::from_millis(200),
        Duration::from_micros(200),
    );
    assert!(res.is_ok(), "expected success, got {res:?}");
}

#[rstest]
#[case(Duration::ZERO, Duration::from_micros(200))]
#[case(Duration::from_millis(5), Duration::from_micros(200))]
#[case(Duration::from_millis(5), Duration::from_millis(2))]
fn poll_until_times_out(#[case] timeout: Duration, #[case] interval: Duration) {
    let mut checks = 0u32;
    let err = poll_until(
        || {
            checks += 1;
            Ok(false)
        },
        timeout,
        interval,
    )
    .expect_err("expected timeout error");

    match err {
        HwError::DataReadyTimeout => {}
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(checks >= 1);
}

#[rstest]
#[case(1)]
#[case(4)]
fn poll_until_returns_once_ready(#[case] ready_on: u32) {
    let mut checks = 0u32;
    poll_until(
        || {
            checks += 1;
            Ok(checks >= ready_on)
        },
        Duration::from_secs(1),
        Duration::from_micros(50),
    )
    .expect("ready before the deadline");
    assert_eq!(checks, ready_on);
}

#[test]
fn poll_until_propagates_read_errors() {
    let err = poll_until(
        || Err(HwError::I2c("nack".into())),
        Duration::from_millis(5),
        Duration::from_micros(200),
    )
    .expect_err("read error");
    assert!(matches!(err, HwError::I2c(_)));
}
