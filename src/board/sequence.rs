//! Monotonic sequence numbers for root post keys.

use std::sync::atomic::{AtomicU64, Ordering};

/// Bits reserved below the millisecond timestamp for same-millisecond posts.
const COUNTER_BITS: u32 = 12;

/// Returns the current time in milliseconds since the Unix epoch.
pub fn current_timestamp_millis() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Issues strictly increasing sequence values derived from the wall clock.
///
/// Values are `millis << 12` plus a counter, so posts created later sort
/// later, including across process restarts. If the clock steps backwards the
/// generator keeps counting from its last value.
#[derive(Debug, Default)]
pub struct SequenceGenerator {
    last: AtomicU64,
}

impl SequenceGenerator {
    /// Creates a generator that never issues a value `<= floor`.
    pub fn starting_after(floor: u64) -> Self {
        Self {
            last: AtomicU64::new(floor),
        }
    }

    /// Returns the next sequence value.
    pub fn next(&self) -> u64 {
        let now = current_timestamp_millis() << COUNTER_BITS;
        let mut last = self.last.load(Ordering::Relaxed);
        loop {
            let candidate = now.max(last + 1);
            match self
                .last
                .compare_exchange_weak(last, candidate, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return candidate,
                Err(actual) => last = actual,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn test_strictly_increasing() {
        let generator = SequenceGenerator::default();
        let mut prev = generator.next();
        for _ in 0..10_000 {
            let next = generator.next();
            assert!(next > prev);
            prev = next;
        }
    }

    #[test]
    fn test_respects_floor() {
        let floor = u64::MAX / 2;
        let generator = SequenceGenerator::starting_after(floor);
        assert_eq!(generator.next(), floor + 1);
    }

    #[test]
    fn test_unique_across_threads() {
        let generator = Arc::new(SequenceGenerator::default());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let generator = Arc::clone(&generator);
                std::thread::spawn(move || (0..1000).map(|_| generator.next()).collect::<Vec<_>>())
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for value in handle.join().unwrap() {
                assert!(seen.insert(value), "duplicate sequence {}", value);
            }
        }
        assert_eq!(seen.len(), 4000);
    }
}
