//! Round-robin selection strategy.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Round-robin selector.
/// Stores a cursor shared by every caller targeting the same service.
#[derive(Debug, Default)]
pub struct RoundRobinSelector {
    cursor: AtomicUsize,
}

impl RoundRobinSelector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current cursor value.
    pub fn cursor(&self) -> usize {
        self.cursor.load(Ordering::Acquire)
    }

    /// Claim the next index for a list of `len` items.
    ///
    /// Returns `None` for an empty list without touching the cursor.
    pub fn next_index(&self, len: usize) -> Option<usize> {
        if len == 0 {
            return None;
        }

        // A cursor left past the end by a longer list is folded back into
        // range before advancing, so the rotation continues without a repeat.
        let claimed = match self.cursor.fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
            let current = current % len;
            Some(if current >= len - 1 { 0 } else { current + 1 })
        }) {
            Ok(prev) | Err(prev) => prev,
        };

        Some(claimed % len)
    }

    /// Select the next item from `items`.
    pub fn select<'a, T>(&self, items: &'a [T]) -> Option<&'a T> {
        self.next_index(items.len()).map(|i| &items[i])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_round_robin_cycle() {
        let selector = RoundRobinSelector::new();
        let indices: Vec<usize> = (0..7).map(|_| selector.next_index(3).unwrap()).collect();
        assert_eq!(indices, vec![0, 1, 2, 0, 1, 2, 0]);
    }

    #[test]
    fn test_single_item() {
        let selector = RoundRobinSelector::new();
        for _ in 0..4 {
            assert_eq!(selector.next_index(1), Some(0));
        }
        assert_eq!(selector.cursor(), 0);
    }

    #[test]
    fn test_empty_leaves_cursor() {
        let selector = RoundRobinSelector::new();
        selector.next_index(5);
        selector.next_index(5);
        assert_eq!(selector.cursor(), 2);

        let empty: Vec<&str> = Vec::new();
        assert!(selector.select(&empty).is_none());
        assert_eq!(selector.cursor(), 2);
    }

    #[test]
    fn test_shrinking_list() {
        let selector = RoundRobinSelector::new();
        for _ in 0..4 {
            selector.next_index(5);
        }
        assert_eq!(selector.cursor(), 4);

        let next = selector.next_index(2).unwrap();
        assert!(next < 2);
        assert_eq!(next, 0);
        assert_eq!(selector.next_index(2), Some(1));
        assert_eq!(selector.next_index(2), Some(0));
    }

    #[test]
    fn test_shrink_keeps_rotating() {
        let selector = RoundRobinSelector::new();
        for _ in 0..5 {
            selector.next_index(7);
        }
        assert_eq!(selector.cursor(), 5);

        let indices: Vec<usize> = (0..4).map(|_| selector.next_index(3).unwrap()).collect();
        assert_eq!(indices, vec![2, 0, 1, 2]);
    }

    #[test]
    fn test_select_items() {
        let selector = RoundRobinSelector::new();
        let items = ["a", "b", "c"];
        let picked: Vec<&str> = (0..4).map(|_| *selector.select(&items).unwrap()).collect();
        assert_eq!(picked, vec!["a", "b", "c", "a"]);
    }

    #[test]
    fn test_concurrent_selection() {
        const THREADS: usize = 8;
        const PER_THREAD: usize = 300;
        const LEN: usize = 6;

        let selector = Arc::new(RoundRobinSelector::new());
        let mut counts = [0usize; LEN];

        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let selector = selector.clone();
                std::thread::spawn(move || {
                    (0..PER_THREAD)
                        .map(|_| selector.next_index(LEN).unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        for handle in handles {
            for index in handle.join().unwrap() {
                counts[index] += 1;
            }
        }

        // 2400 selections over 6 slots is exactly 400 full cycles.
        assert!(counts.iter().all(|&c| c == THREADS * PER_THREAD / LEN));
        assert_eq!(selector.cursor(), 0);
    }
}
