//! Process-wide subscription registry behind the low-level hooks.
//!
//! A single panic hook is installed no matter how many subscribers exist;
//! every captured error is fanned out to the subscribers in registration
//! order. Subscribing twice yields two deliveries.

use std::{
    backtrace::Backtrace,
    panic::PanicHookInfo,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard, OnceLock, PoisonError,
    },
};

use report_sink::ErrorValue;
use tracing::debug;

use crate::stacktrace::{
    panic_error_value, set_stack_trace_limit, RawStackTrace, DEFAULT_STACK_TRACE_LIMIT,
};

pub type Subscriber = Arc<dyn Fn(&RawStackTrace, &ErrorValue) + Send + Sync>;

type PanicHook = dyn Fn(&PanicHookInfo<'_>) + Send + Sync + 'static;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Default)]
struct Registry {
    next_id: u64,
    subscribers: Vec<(SubscriptionId, Subscriber)>,
    previous_panic_hook: Option<Arc<PanicHook>>,
}

static ONERROR_INSTALLED: AtomicBool = AtomicBool::new(false);
static REJECTION_INSTALLED: AtomicBool = AtomicBool::new(false);

fn registry() -> MutexGuard<'static, Registry> {
    static REGISTRY: OnceLock<Mutex<Registry>> = OnceLock::new();
    REGISTRY
        .get_or_init(|| Mutex::new(Registry::default()))
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
}

pub fn subscribe<F>(subscriber: F) -> SubscriptionId
where
    F: Fn(&RawStackTrace, &ErrorValue) + Send + Sync + 'static,
{
    let mut registry = registry();
    let id = SubscriptionId(registry.next_id);
    registry.next_id += 1;
    registry.subscribers.push((id, Arc::new(subscriber)));
    id
}

pub fn unsubscribe(id: SubscriptionId) -> bool {
    let mut registry = registry();
    let before = registry.subscribers.len();
    registry.subscribers.retain(|(existing, _)| *existing != id);
    registry.subscribers.len() != before
}

pub fn subscriber_count() -> usize {
    registry().subscribers.len()
}

/// Hands `trace` and `error` to every subscriber. Returns how many were
/// called.
pub fn notify(trace: &RawStackTrace, error: &ErrorValue) -> usize {
    let subscribers: Vec<Subscriber> = registry()
        .subscribers
        .iter()
        .map(|(_, subscriber)| subscriber.clone())
        .collect();
    for subscriber in &subscribers {
        subscriber(trace, error);
    }
    subscribers.len()
}

/// Installs the panic hook, chaining to whatever hook was set before.
/// Later calls are no-ops until [`uninstall`].
pub fn install_global_handler() {
    if ONERROR_INSTALLED.swap(true, Ordering::SeqCst) {
        return;
    }
    let previous: Arc<PanicHook> = Arc::from(std::panic::take_hook());
    registry().previous_panic_hook = Some(previous.clone());
    std::panic::set_hook(Box::new(move |info| {
        on_panic(info);
        previous(info);
    }));
}

pub fn install_unhandled_rejection_handler() {
    REJECTION_INSTALLED.store(true, Ordering::SeqCst);
}

pub fn global_handler_installed() -> bool {
    ONERROR_INSTALLED.load(Ordering::SeqCst)
}

pub fn unhandled_rejection_handler_installed() -> bool {
    REJECTION_INSTALLED.load(Ordering::SeqCst)
}

/// Drops every subscriber, restores the panic hook that was active before
/// [`install_global_handler`] and stops forwarding rejections.
pub fn uninstall() {
    REJECTION_INSTALLED.store(false, Ordering::SeqCst);
    let previous = {
        let mut registry = registry();
        registry.subscribers.clear();
        registry.previous_panic_hook.take()
    };
    if ONERROR_INSTALLED.swap(false, Ordering::SeqCst) {
        if let Some(previous) = previous {
            std::panic::set_hook(Box::new(move |info| previous(info)));
        }
    }
    set_stack_trace_limit(DEFAULT_STACK_TRACE_LIMIT);
    debug!("global handlers uninstalled");
}

fn on_panic(info: &PanicHookInfo<'_>) {
    if !ONERROR_INSTALLED.load(Ordering::SeqCst) || subscriber_count() == 0 {
        return;
    }
    let backtrace = Backtrace::force_capture();
    let trace = RawStackTrace::from_panic(info, &backtrace);
    let error = panic_error_value(&trace, &backtrace);
    notify(&trace, &error);
}
