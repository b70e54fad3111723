use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A view that re-reads the catalog when it changes.
///
/// `update` carries no data: observers pull whatever they display from the
/// catalog manager.
pub trait BookObserver: Send + Sync {
    fn update(&self) -> anyhow::Result<()>;
}

/// Adapts a closure into a [`BookObserver`].
pub struct FnObserver<F>(F);

impl<F> FnObserver<F>
where
    F: Fn() -> anyhow::Result<()> + Send + Sync,
{
    pub fn new(callback: F) -> Self {
        Self(callback)
    }
}

impl<F> BookObserver for FnObserver<F>
where
    F: Fn() -> anyhow::Result<()> + Send + Sync,
{
    fn update(&self) -> anyhow::Result<()> {
        (self.0)()
    }
}

/// Outcome of one notification round.
#[derive(Debug, Default)]
pub struct NotifyReport {
    pub notified: usize,
    pub failures: Vec<String>,
}

impl NotifyReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Fan-out of change notifications to attached observers.
///
/// Each round works on a snapshot of the registry taken before the first
/// observer runs, so observers may attach or detach (themselves included)
/// from inside `update`; the change takes effect from the next round.
/// A failing observer is logged and recorded in the report, and the
/// remaining observers are still notified.
#[derive(Default)]
pub struct ChangeNotifier {
    observers: Mutex<Vec<Arc<dyn BookObserver>>>,
}

fn same_observer(a: &Arc<dyn BookObserver>, b: &Arc<dyn BookObserver>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

impl ChangeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Arc<dyn BookObserver>>> {
        self.observers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Attach `observer` unless it is already attached. Returns whether it was added.
    pub fn attach(&self, observer: Arc<dyn BookObserver>) -> bool {
        let mut observers = self.lock();
        if observers.iter().any(|o| same_observer(o, &observer)) {
            return false;
        }
        observers.push(observer);
        true
    }

    /// Detach `observer` if attached. Returns whether it was removed.
    pub fn detach(&self, observer: &Arc<dyn BookObserver>) -> bool {
        let mut observers = self.lock();
        let before = observers.len();
        observers.retain(|o| !same_observer(o, observer));
        observers.len() != before
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Call `update` on every attached observer, in attachment order.
    pub fn notify_all(&self) -> NotifyReport {
        let snapshot: Vec<Arc<dyn BookObserver>> = self.lock().clone();
        let mut report = NotifyReport::default();

        for observer in snapshot {
            report.notified += 1;
            if let Err(e) = observer.update() {
                tracing::error!(error = %e, "observer failed to refresh");
                report.failures.push(format!("{e:#}"));
            }
        }

        if !report.is_clean() {
            tracing::warn!(
                failed = report.failures.len(),
                notified = report.notified,
                "change notification finished with failures"
            );
        }
        report
    }
}
