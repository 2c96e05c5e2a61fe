//! Rolling sample window
//!
//! Holds at most `floor(seconds * rate)` samples. Eviction pops from the
//! front, and `first_index` keeps the logical position of the oldest retained
//! sample so consumers can still line samples up with the acquisition count
//! after old data is gone.

use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone)]
pub struct RollingBuffer {
    samples: VecDeque<i16>,
    rate: u32,
    capacity: usize,
    first_index: u64,
}

/// Immutable copy of the window at one point in time
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub samples: Vec<i16>,
    pub first_index: u64,
    pub rate: u32,
}

impl RollingBuffer {
    pub fn new(rate: u32, capacity_seconds: f64) -> Self {
        let capacity = (capacity_seconds * rate as f64).floor().max(0.0) as usize;
        Self::with_capacity(rate, capacity)
    }

    pub fn with_capacity(rate: u32, capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            rate,
            capacity,
            first_index: 0,
        }
    }

    /// A window holding the most recent `capacity` of `samples`
    pub fn from_samples(rate: u32, capacity: usize, samples: &[i16]) -> Self {
        let mut buffer = Self::with_capacity(rate, capacity);
        buffer.extend(samples);
        buffer.evict_to_capacity();
        buffer
    }

    pub fn append(&mut self, sample: i16) {
        self.samples.push_back(sample);
    }

    pub fn extend(&mut self, samples: &[i16]) {
        self.samples.extend(samples.iter().copied());
    }

    /// Drop the oldest samples beyond capacity; returns how many were dropped
    pub fn evict_to_capacity(&mut self) -> usize {
        let excess = self.samples.len().saturating_sub(self.capacity);
        if excess > 0 {
            self.samples.drain(..excess);
            self.first_index += excess as u64;
        }
        excess
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            samples: self.samples.iter().copied().collect(),
            first_index: self.first_index,
            rate: self.rate,
        }
    }

    /// Empty the window; the next sample keeps counting from where the
    /// discarded ones left off
    pub fn reset(&mut self) {
        self.first_index += self.samples.len() as u64;
        self.samples.clear();
    }

    /// Replace contents and geometry, e.g. with a decoded recording;
    /// returns how many of `samples` did not fit
    pub fn replace(&mut self, rate: u32, capacity: usize, samples: &[i16]) -> usize {
        self.rate = rate;
        self.capacity = capacity;
        self.reset();
        self.extend(samples);
        self.evict_to_capacity()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn rate(&self) -> u32 {
        self.rate
    }

    pub fn first_index(&self) -> u64 {
        self.first_index
    }

    /// Samples ever appended to this buffer
    pub fn total_appended(&self) -> u64 {
        self.first_index + self.samples.len() as u64
    }
}

impl Snapshot {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Time axis: offset in seconds of every sample from the window start
    pub fn seconds(&self) -> Vec<f64> {
        let rate = self.rate.max(1) as f64;
        (0..self.samples.len()).map(|i| i as f64 / rate).collect()
    }

    pub fn as_f64(&self) -> Vec<f64> {
        self.samples.iter().map(|&s| s as f64).collect()
    }
}

/// Mutex-guarded window shared by the sampler and readers
#[derive(Debug)]
pub struct SharedBuffer {
    inner: Mutex<RollingBuffer>,
}

impl SharedBuffer {
    pub fn new(buffer: RollingBuffer) -> Self {
        Self {
            inner: Mutex::new(buffer),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RollingBuffer> {
        // A poisoned lock still holds a consistent window: every mutation
        // completes under a single guard.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append a chunk and evict in one step; returns samples dropped
    pub fn push_chunk(&self, samples: &[i16]) -> usize {
        let mut buffer = self.lock();
        buffer.extend(samples);
        buffer.evict_to_capacity()
    }

    pub fn snapshot(&self) -> Snapshot {
        self.lock().snapshot()
    }

    pub fn with<R>(&self, f: impl FnOnce(&RollingBuffer) -> R) -> R {
        f(&self.lock())
    }

    pub fn with_mut<R>(&self, f: impl FnOnce(&mut RollingBuffer) -> R) -> R {
        f(&mut self.lock())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_from_seconds() {
        assert_eq!(RollingBuffer::new(100, 1.0).capacity(), 100);
        assert_eq!(RollingBuffer::new(4096, 5.0).capacity(), 20480);
        assert_eq!(RollingBuffer::new(3, 0.5).capacity(), 1);
    }

    #[test]
    fn test_evict_drops_oldest_first() {
        let mut buffer = RollingBuffer::with_capacity(10, 4);
        buffer.extend(&[1, 2, 3, 4, 5, 6]);
        assert_eq!(buffer.evict_to_capacity(), 2);
        assert_eq!(buffer.snapshot().samples, vec![3, 4, 5, 6]);
        assert_eq!(buffer.first_index(), 2);
    }

    #[test]
    fn test_evict_under_capacity_is_noop() {
        let mut buffer = RollingBuffer::with_capacity(10, 4);
        buffer.extend(&[1, 2]);
        assert_eq!(buffer.evict_to_capacity(), 0);
        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.first_index(), 0);
    }

    #[test]
    fn test_index_accounting() {
        let mut buffer = RollingBuffer::with_capacity(10, 7);
        let mut produced = 0u64;
        for chunk in 0..20i16 {
            let samples: Vec<i16> = (0..3).map(|i| chunk * 3 + i).collect();
            buffer.extend(&samples);
            buffer.evict_to_capacity();
            produced += samples.len() as u64;

            assert!(buffer.len() <= buffer.capacity());
            assert_eq!(buffer.first_index(), produced - buffer.len() as u64);
            assert_eq!(buffer.total_appended(), produced);
        }
        assert_eq!(buffer.len(), 7);
        assert_eq!(buffer.snapshot().samples, (53..60).collect::<Vec<i16>>());
    }

    #[test]
    fn test_chunk_larger_than_capacity() {
        let mut buffer = RollingBuffer::with_capacity(10, 3);
        buffer.extend(&[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(buffer.evict_to_capacity(), 5);
        assert_eq!(buffer.snapshot().samples, vec![6, 7, 8]);
    }

    #[test]
    fn test_append_one_sample_at_a_time() {
        let mut buffer = RollingBuffer::with_capacity(10, 3);
        for sample in [5, -5, 7, -7] {
            buffer.append(sample);
            buffer.evict_to_capacity();
        }
        assert_eq!(buffer.snapshot().samples, vec![-5, 7, -7]);
        assert_eq!(buffer.first_index(), 1);
        assert_eq!(buffer.total_appended(), 4);
    }

    #[test]
    fn test_reset_keeps_indexing_monotonic() {
        let mut buffer = RollingBuffer::with_capacity(10, 2);
        buffer.extend(&[1, 2, 3]);
        buffer.evict_to_capacity();
        assert_eq!(buffer.first_index(), 1);

        buffer.reset();
        assert!(buffer.is_empty());
        assert_eq!(buffer.first_index(), 3);
        assert_eq!(buffer.total_appended(), 3);

        buffer.append(4);
        assert_eq!(buffer.snapshot().first_index, 3);
        assert_eq!(buffer.total_appended(), 4);
    }

    #[test]
    fn test_replace_continues_index_space() {
        let mut buffer = RollingBuffer::with_capacity(10, 4);
        buffer.extend(&[1, 2]);
        assert_eq!(buffer.replace(20, 2, &[7, 8, 9]), 1);
        assert_eq!(buffer.snapshot().samples, vec![8, 9]);
        assert_eq!(buffer.first_index(), 3);
        assert_eq!(buffer.total_appended(), 5);
    }

    #[test]
    fn test_replace_adopts_rate_and_trims() {
        let mut buffer = RollingBuffer::with_capacity(10, 2);
        assert_eq!(buffer.replace(8000, 3, &[1, 2, 3, 4]), 1);
        assert_eq!(buffer.rate(), 8000);
        assert_eq!(buffer.snapshot().samples, vec![2, 3, 4]);
        assert_eq!(buffer.first_index(), 1);
    }

    #[test]
    fn test_from_samples_keeps_most_recent() {
        let buffer = RollingBuffer::from_samples(4, 3, &[1, 2, 3, 4, 5]);
        assert_eq!(buffer.snapshot().samples, vec![3, 4, 5]);
        assert_eq!(buffer.first_index(), 2);
        assert_eq!(buffer.rate(), 4);

        let short = RollingBuffer::from_samples(4, 8, &[1, 2]);
        assert_eq!(short.len(), 2);
        assert_eq!(short.first_index(), 0);
    }

    #[test]
    fn test_snapshot_time_axis() {
        let mut buffer = RollingBuffer::with_capacity(4, 8);
        buffer.extend(&[0, 0, 0, 0, 0]);
        let snapshot = buffer.snapshot();
        assert_eq!(snapshot.seconds(), vec![0.0, 0.25, 0.5, 0.75, 1.0]);
    }

    #[test]
    fn test_snapshot_is_detached() {
        let shared = SharedBuffer::new(RollingBuffer::with_capacity(10, 4));
        shared.push_chunk(&[1, 2]);
        let snapshot = shared.snapshot();
        shared.push_chunk(&[3, 4, 5]);
        assert_eq!(snapshot.samples, vec![1, 2]);
        assert_eq!(shared.snapshot().samples, vec![2, 3, 4, 5]);
    }

    #[test]
    fn test_concurrent_readers_never_see_overfull_window() {
        use std::sync::Arc;

        let shared = Arc::new(SharedBuffer::new(RollingBuffer::with_capacity(10, 50)));
        let writer = {
            let shared = Arc::clone(&shared);
            std::thread::spawn(move || {
                for chunk in 0..2000i16 {
                    shared.push_chunk(&[chunk; 16]);
                }
            })
        };

        while !writer.is_finished() {
            let snapshot = shared.snapshot();
            assert!(snapshot.len() <= 50);
        }
        writer.join().unwrap();
        assert_eq!(shared.snapshot().len(), 50);
    }
}
