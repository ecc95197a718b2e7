//! Thread-local capture scopes.
//!
//! Code running inside a scope has its panics caught by the scope owner
//! (UI dispatcher, background spawner, funnel forwarding, [`contain`]). The
//! process-wide panic hook checks the scope so each panic is reported by
//! exactly one capture point.

use std::cell::{Cell, RefCell};
use std::panic::{AssertUnwindSafe, catch_unwind};

use labhost_core::FailureCause;

thread_local! {
    static CAPTURE_DEPTH: Cell<usize> = const { Cell::new(0) };
    static LAST_PANIC_LOCATION: RefCell<Option<String>> = const { RefCell::new(None) };
}

/// RAII marker for "a capture point on this thread will handle panics".
pub(crate) struct CaptureScope {
    _not_send: std::marker::PhantomData<*const ()>,
}

impl CaptureScope {
    pub(crate) fn enter() -> Self {
        CAPTURE_DEPTH.with(|depth| depth.set(depth.get() + 1));
        Self {
            _not_send: std::marker::PhantomData,
        }
    }
}

impl Drop for CaptureScope {
    fn drop(&mut self) {
        CAPTURE_DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

/// Returns `true` when the current thread is inside a capture scope.
pub(crate) fn in_capture_scope() -> bool {
    CAPTURE_DEPTH.with(|depth| depth.get() > 0)
}

/// Remembers where the current thread's in-scope panic happened.
pub(crate) fn note_panic_location(location: Option<String>) {
    let _ = LAST_PANIC_LOCATION.try_with(|slot| {
        if let Ok(mut slot) = slot.try_borrow_mut() {
            *slot = location;
        }
    });
}

fn take_panic_location() -> Option<String> {
    LAST_PANIC_LOCATION
        .try_with(|slot| slot.try_borrow_mut().ok().and_then(|mut slot| slot.take()))
        .ok()
        .flatten()
}

/// Runs `work`, converting a panic into a [`FailureCause`] without
/// forwarding it anywhere.
///
/// When the funnel's panic hook is installed the cause carries the panic
/// location.
///
/// # Errors
/// Returns the panic as a [`FailureCause`].
pub fn contain<T>(work: impl FnOnce() -> T) -> Result<T, FailureCause> {
    let _scope = CaptureScope::enter();
    let _ = take_panic_location();
    catch_unwind(AssertUnwindSafe(work)).map_err(|payload| {
        let mut cause = FailureCause::from_panic(payload.as_ref());
        cause.location = take_panic_location();
        cause
    })
}
