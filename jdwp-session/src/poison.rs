use std::panic::Location;
use std::sync::{Mutex, MutexGuard};

/// Lock a table mutex, recovering the guard if a previous holder panicked
#[track_caller]
pub(crate) fn lock<'a, T>(mutex: &'a Mutex<T>, context: &'static str) -> MutexGuard<'a, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(err) => {
            let loc = Location::caller();
            tracing::error!(
                context,
                file = loc.file(),
                line = loc.line(),
                "mutex poisoned; continuing with recovered guard"
            );
            err.into_inner()
        }
    }
}
