//! Integration tests for failures raised on the UI dispatcher.

mod common;

use std::io;

use labhost_funnel::{Disposition, FailureHandler, UiDispatcher};

use common::harness;

#[test]
fn ui_dispatch_tests_event_loop_survives_repeated_failures() {
    let h = harness();
    let ui = UiDispatcher::new(h.funnel.clone());

    let mut handled = 0;
    for tick in 0..5 {
        let result = ui.run(|| {
            if tick % 2 == 1 {
                panic!("tick {tick} handler failed");
            }
            tick
        });
        if result.is_some() {
            handled += 1;
        }
    }

    assert_eq!(handled, 3);
    assert_eq!(h.sink.len(), 2);
    assert_eq!(h.reporter.shown().len(), 2);
    assert!(
        h.reporter.shown()[0]
            .user_message
            .contains("The application will keep running")
    );
}

#[test]
fn ui_dispatch_tests_error_values_are_reported_with_their_chain() {
    let h = harness();
    let ui = UiDispatcher::new(h.funnel.clone());

    let outcome = ui.run_fallible(|| -> Result<(), io::Error> {
        Err(io::Error::new(io::ErrorKind::PermissionDenied, "label printer busy"))
    });
    assert_eq!(outcome, None);

    let shown = h.reporter.shown();
    assert_eq!(shown.len(), 1);
    assert_eq!(shown[0].cause.message, "label printer busy");
}

#[test]
fn ui_dispatch_tests_direct_handler_calls_report_disposition() {
    let h = harness();
    let cause = labhost_core::FailureCause::new("panic", "sample id parse");
    assert_eq!(h.funnel.on_ui_thread_failure(cause.clone()), Disposition::Reported);
    assert_eq!(
        h.funnel.on_process_failure(cause, true),
        Disposition::LoggedOnly
    );
    assert_eq!(h.reporter.shown().len(), 1);
}
