use std::sync::{Mutex, MutexGuard};

/// Callback run when a termination signal reaches the process.
pub(crate) type InterruptHandler = Box<dyn Fn() + Send + Sync>;

static HANDLER: Mutex<Option<InterruptHandler>> = Mutex::new(None);

fn lock() -> MutexGuard<'static, Option<InterruptHandler>> {
    match HANDLER.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Installs (or clears) the process-wide interrupt callback.
///
/// The queue installs a callback that posts a `QUIT` event while it is live;
/// the platform signal glue is expected to call [`raise_interrupt`] when a
/// termination signal arrives.
pub(crate) fn set_interrupt_handler(handler: Option<InterruptHandler>) {
    *lock() = handler;
}

/// Delivers a termination signal to the registered callback, if any.
///
/// Called by the platform signal glue (and by tests). The callback runs on
/// the caller's thread and must not re-enter the handler registration.
pub fn raise_interrupt() {
    if let Some(handler) = lock().as_ref() {
        handler();
    }
}
