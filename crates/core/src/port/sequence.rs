// Sequence Number Provider Port (for request tracing)

use std::sync::atomic::{AtomicU64, Ordering};

/// Source of request sequence numbers
///
/// Every value returned must be strictly greater than all values returned before it.
pub trait SequenceProvider: Send + Sync {
    fn next_seq_no(&self) -> u64;
}

/// Lock-free counter starting at 1 (production)
#[derive(Debug)]
pub struct AtomicSequence {
    next: AtomicU64,
}

impl AtomicSequence {
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    pub fn starting_at(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first),
        }
    }
}

impl Default for AtomicSequence {
    fn default() -> Self {
        Self::new()
    }
}

impl SequenceProvider for AtomicSequence {
    fn next_seq_no(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn test_sequence_starts_at_one() {
        let seq = AtomicSequence::new();
        assert_eq!(seq.next_seq_no(), 1);
        assert_eq!(seq.next_seq_no(), 2);
    }

    #[test]
    fn test_concurrent_sequence_unique_and_increasing() {
        let seq = Arc::new(AtomicSequence::new());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let seq = Arc::clone(&seq);
                std::thread::spawn(move || {
                    let values: Vec<u64> = (0..1000).map(|_| seq.next_seq_no()).collect();
                    // Per caller, values come out strictly increasing
                    assert!(values.windows(2).all(|w| w[0] < w[1]));
                    values
                })
            })
            .collect();

        let mut all = HashSet::new();
        for handle in handles {
            for value in handle.join().unwrap() {
                assert!(all.insert(value), "duplicate sequence number {}", value);
            }
        }
        assert_eq!(all.len(), 8000);
    }
}
