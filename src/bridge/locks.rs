//! Per-tab mutual exclusion.
//!
//! The protocol does not serialize logically related operations arriving
//! over different connections, so two concurrent typing runs against the
//! same tab would interleave their keystrokes in the shared editable
//! region. The arena hands out one async mutex per tab id; the façade holds
//! it from tab resolution until the session closes.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

/// Arena of per-tab locks keyed by tab id.
#[derive(Debug, Default)]
pub struct TabLocks {
    locks: parking_lot::Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl TabLocks {
    /// Creates an empty arena.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the lock handle for a tab, creating it on first use.
    pub fn for_tab(&self, tab_id: &str) -> Arc<Mutex<()>> {
        self.locks
            .lock()
            .entry(tab_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Number of tabs that have been locked at least once.
    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    /// Whether no tab has been locked yet.
    pub fn is_empty(&self) -> bool {
        self.locks.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_same_tab_shares_one_lock() {
        let arena = TabLocks::new();
        let a = arena.for_tab("A");
        let b = arena.for_tab("A");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn test_different_tabs_get_independent_locks() {
        let arena = TabLocks::new();
        let a = arena.for_tab("A");
        let b = arena.for_tab("B");
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(arena.len(), 2);
    }

    #[tokio::test]
    async fn test_same_tab_operations_never_interleave() {
        let arena = Arc::new(TabLocks::new());
        let trace: Arc<parking_lot::Mutex<Vec<String>>> =
            Arc::new(parking_lot::Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for op in ["first", "second"] {
            let arena = arena.clone();
            let trace = trace.clone();
            handles.push(tokio::spawn(async move {
                let lock = arena.for_tab("A");
                let _guard = lock.lock().await;
                trace.lock().push(format!("{op}:start"));
                // Yield while holding the lock; an interleaving bug would
                // let the other task record between start and end.
                tokio::time::sleep(Duration::from_millis(20)).await;
                trace.lock().push(format!("{op}:end"));
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let trace = trace.lock();
        assert_eq!(trace.len(), 4);
        // Whichever operation started first must finish before the other
        // starts.
        let first = trace[0].split(':').next().unwrap().to_string();
        assert_eq!(trace[1], format!("{first}:end"));
    }

    #[tokio::test]
    async fn test_different_tabs_can_overlap() {
        let arena = Arc::new(TabLocks::new());
        let a = arena.for_tab("A");
        let b = arena.for_tab("B");

        // Holding A's lock must not block B's.
        let _guard_a = a.lock().await;
        let guard_b = tokio::time::timeout(Duration::from_millis(50), b.lock()).await;
        assert!(guard_b.is_ok());
    }
}
