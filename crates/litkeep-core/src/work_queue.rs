//! Lock-free work queue for distributing records across worker threads.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Workers call [`claim()`](WorkQueue::claim) to atomically take the
/// next item. Items already satisfied (e.g. records with nothing left
/// to retrieve) should be filtered out at construction time.
pub struct WorkQueue<T> {
    items: Vec<T>,
    cursor: AtomicUsize,
}

impl<T> WorkQueue<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self {
            items,
            cursor: AtomicUsize::new(0),
        }
    }

    /// Keep only items the predicate accepts (re-run / resume support).
    pub fn filtered(items: Vec<T>, keep: impl Fn(&T) -> bool) -> Self {
        let kept: Vec<T> = items.into_iter().filter(|t| keep(t)).collect();
        log::debug!("{} items queued", kept.len());
        Self::new(kept)
    }

    /// Atomically claim the next item, or `None` when drained.
    pub fn claim(&self) -> Option<&T> {
        let i = self.cursor.fetch_add(1, Ordering::Relaxed);
        self.items.get(i)
    }

    pub fn total(&self) -> usize {
        self.items.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claims_in_order() {
        let q = WorkQueue::new(vec!["a", "b"]);
        assert_eq!(q.total(), 2);
        assert_eq!(q.claim(), Some(&"a"));
        assert_eq!(q.claim(), Some(&"b"));
        assert_eq!(q.claim(), None);
    }

    #[test]
    fn filtered_drops_rejected() {
        let q = WorkQueue::filtered(vec![1, 2, 3, 4, 5], |n| n % 2 == 1);
        assert_eq!(q.total(), 3);
        assert_eq!(q.claim(), Some(&1));
        assert_eq!(q.claim(), Some(&3));
        assert_eq!(q.claim(), Some(&5));
        assert_eq!(q.claim(), None);
    }

    #[test]
    fn concurrent_claims_unique() {
        use std::collections::HashSet;
        use std::sync::{Arc, Mutex};

        let q = Arc::new(WorkQueue::new((0..1000).collect::<Vec<i32>>()));
        let seen = Arc::new(Mutex::new(HashSet::new()));
        let mut handles = Vec::new();
        for _ in 0..4 {
            let q = q.clone();
            let seen = seen.clone();
            handles.push(std::thread::spawn(move || {
                while let Some(n) = q.claim() {
                    assert!(seen.lock().unwrap().insert(*n), "item claimed twice");
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(seen.lock().unwrap().len(), 1000);
    }
}
