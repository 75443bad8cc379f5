use std::{cell::Cell, marker::PhantomData};

thread_local! {
    static IGNORE_ON_ERROR: Cell<usize> = const { Cell::new(0) };
}

/// True while an [`IgnoreOnErrorGuard`] is alive on the current thread.
pub fn should_ignore_on_error() -> bool {
    IGNORE_ON_ERROR.with(|count| count.get() > 0)
}

/// Suppresses global capture on the current thread until dropped.
#[derive(Debug)]
#[must_use = "capture resumes as soon as the guard is dropped"]
pub struct IgnoreOnErrorGuard {
    _not_send: PhantomData<*const ()>,
}

impl Drop for IgnoreOnErrorGuard {
    fn drop(&mut self) {
        IGNORE_ON_ERROR.with(|count| count.set(count.get().saturating_sub(1)));
    }
}

pub fn ignore_on_error() -> IgnoreOnErrorGuard {
    IGNORE_ON_ERROR.with(|count| count.set(count.get() + 1));
    IgnoreOnErrorGuard {
        _not_send: PhantomData,
    }
}

/// Runs `f` with global capture suppressed on this thread, e.g. around code
/// that panics on purpose under `catch_unwind`.
pub fn without_capture<R>(f: impl FnOnce() -> R) -> R {
    let _guard = ignore_on_error();
    f()
}
