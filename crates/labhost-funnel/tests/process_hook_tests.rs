//! Integration tests for process-wide panic capture and hook registration.

mod common;

use std::time::Duration;

use labhost_core::{CATEGORY_FAILURE, LogLevel};
use labhost_funnel::{FunnelError, FunnelRegistration};

use common::{harness, wait_for_entries};

// The panic hook is process-wide, so every hook scenario lives in one test.
#[test]
fn process_hook_tests_route_each_panic_through_one_capture_point() {
    let h = harness();
    let registration = FunnelRegistration::install(h.funnel.clone()).expect("first install");

    assert!(matches!(
        FunnelRegistration::install(h.funnel.clone()),
        Err(FunnelError::AlreadyInstalled)
    ));

    let stray = std::thread::Builder::new()
        .name("stray-worker".to_string())
        .spawn(|| panic!("calibration table missing"))
        .expect("thread spawns");
    assert!(stray.join().is_err());
    assert!(wait_for_entries(&h.sink, 1), "hook failure was logged");

    let entries = h.sink.entries();
    assert_eq!(entries[0].level, LogLevel::Error);
    assert_eq!(entries[0].category, CATEGORY_FAILURE);
    assert!(entries[0].message.contains("ProcessDomain"));
    assert!(entries[0].message.contains("calibration table missing"));
    assert!(!entries[0].message.contains("terminating"));
    let cause = entries[0].cause.as_ref().expect("cause recorded");
    assert!(cause.location.is_some(), "hook records the panic site");
    assert!(wait_for_reports(&h, 1));

    let ui = registration.ui_dispatcher();
    assert_eq!(ui.run(|| -> u8 { panic!("result grid overflow") }), None);

    std::thread::sleep(Duration::from_millis(100));
    let entries = h.sink.entries();
    assert_eq!(entries.len(), 2, "an in-scope panic is logged exactly once");
    assert!(entries[1].message.contains("UIThread"));
    assert!(
        entries[1]
            .cause
            .as_ref()
            .and_then(|cause| cause.location.as_deref())
            .is_some_and(|location| location.ends_with(".rs") || location.contains(".rs:"))
    );

    let stats = h.funnel.stats();
    assert_eq!(stats.process_domain, 1);
    assert_eq!(stats.ui_thread, 1);
    assert_eq!(stats.fell_back, 0);

    registration.uninstall(Duration::from_secs(2));
    let again = FunnelRegistration::install(h.funnel.clone()).expect("reinstall after removal");
    drop(again);
}

fn wait_for_reports(h: &common::Harness, expected: usize) -> bool {
    let deadline = std::time::Instant::now() + Duration::from_secs(2);
    while std::time::Instant::now() < deadline {
        if h.reporter.shown().len() >= expected {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    false
}
