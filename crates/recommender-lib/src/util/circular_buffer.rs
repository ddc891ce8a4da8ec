//! Fixed-capacity ring buffer with FIFO eviction
//!
//! Holds one slot per aggregation period. Rolling the window forward
//! overwrites the oldest slot in place instead of shifting the contents.

/// Ring of at most `capacity` elements that overwrites its oldest slot once full
#[derive(Debug, Clone)]
pub struct CircularBuffer<T> {
    elements: Vec<T>,
    capacity: usize,
    /// Position of the oldest element once the buffer has filled
    oldest: usize,
}

impl<T> CircularBuffer<T> {
    /// Create an empty buffer holding at most `capacity` elements
    ///
    /// # Panics
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity >= 1, "circular buffer capacity must be at least 1");
        Self {
            elements: Vec::with_capacity(capacity),
            capacity,
            oldest: 0,
        }
    }

    /// Append `value` as the newest element
    ///
    /// Returns `None` while the buffer is still growing. Once full, the oldest
    /// element is overwritten and returned.
    pub fn push(&mut self, value: T) -> Option<T> {
        if self.elements.len() < self.capacity {
            self.elements.push(value);
            return None;
        }

        let evicted = std::mem::replace(&mut self.elements[self.oldest], value);
        self.oldest = (self.oldest + 1) % self.capacity;
        Some(evicted)
    }

    /// Most recently pushed element
    ///
    /// # Panics
    /// Panics if nothing has been pushed yet.
    pub fn head(&self) -> &T {
        let index = self.head_index();
        &self.elements[index]
    }

    /// Mutable access to the most recently pushed element
    ///
    /// # Panics
    /// Panics if nothing has been pushed yet.
    pub fn head_mut(&mut self) -> &mut T {
        let index = self.head_index();
        &mut self.elements[index]
    }

    /// Iterate over held elements, oldest first
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        let (newer, older) = self.elements.split_at(self.oldest);
        older.iter().chain(newer.iter())
    }

    /// Number of elements currently held
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Check if nothing has been pushed yet
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Check if the next push will evict
    pub fn is_full(&self) -> bool {
        self.elements.len() == self.capacity
    }

    /// Maximum number of elements
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn head_index(&self) -> usize {
        assert!(!self.is_empty(), "head of an empty circular buffer");
        if self.is_full() {
            (self.oldest + self.capacity - 1) % self.capacity
        } else {
            self.elements.len() - 1
        }
    }
}

impl<T: Clone> CircularBuffer<T> {
    /// Copy of all held elements in insertion order, oldest first
    pub fn contents(&self) -> Vec<T> {
        self.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::{BucketingScheme, Histogram};
    use std::sync::Arc;

    #[test]
    fn test_fifo_eviction() {
        let mut buffer = CircularBuffer::new(3);

        assert_eq!(buffer.push(1.0), None);
        assert_eq!(buffer.contents(), vec![1.0]);
        assert_eq!(*buffer.head(), 1.0);

        assert_eq!(buffer.push(2.0), None);
        assert_eq!(buffer.contents(), vec![1.0, 2.0]);
        assert_eq!(*buffer.head(), 2.0);

        assert_eq!(buffer.push(3.0), None);
        assert_eq!(buffer.contents(), vec![1.0, 2.0, 3.0]);
        assert_eq!(*buffer.head(), 3.0);

        assert_eq!(buffer.push(4.0), Some(1.0));
        assert_eq!(buffer.contents(), vec![2.0, 3.0, 4.0]);
        assert_eq!(*buffer.head(), 4.0);
    }

    #[test]
    fn test_wraps_multiple_times() {
        let mut buffer = CircularBuffer::new(3);
        let mut evicted = Vec::new();
        for i in 1..=10 {
            if let Some(old) = buffer.push(i as f64) {
                evicted.push(old);
            }
        }

        assert_eq!(evicted, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]);
        assert_eq!(buffer.contents(), vec![8.0, 9.0, 10.0]);
        assert_eq!(*buffer.head(), 10.0);
        assert_eq!(buffer.len(), 3);
    }

    #[test]
    fn test_capacity_one() {
        let mut buffer = CircularBuffer::new(1);

        assert_eq!(buffer.push(5.0), None);
        assert_eq!(buffer.push(6.0), Some(5.0));
        assert_eq!(buffer.contents(), vec![6.0]);
        assert_eq!(*buffer.head(), 6.0);
    }

    #[test]
    fn test_head_mut_updates_slot() {
        let mut buffer = CircularBuffer::new(2);
        buffer.push(1.0);
        buffer.push(2.0);
        buffer.push(3.0);

        *buffer.head_mut() += 0.5;

        assert_eq!(buffer.contents(), vec![2.0, 3.5]);
        assert_eq!(buffer.push(4.0), Some(2.0));
        assert_eq!(buffer.push(5.0), Some(3.5));
    }

    #[test]
    fn test_holds_per_period_histograms() {
        let scheme = Arc::new(BucketingScheme::linear(10.0, 1.0).unwrap());
        let mut periods = CircularBuffer::new(2);

        periods.push(Histogram::new(scheme.clone()));
        periods.head_mut().add_sample(3.0, 1.0);
        periods.push(Histogram::new(scheme.clone()));
        periods.head_mut().add_sample(7.0, 1.0);

        let expired = periods.push(Histogram::new(scheme)).unwrap();
        assert_eq!(expired.percentile(0.5), 3.0);
        assert!(periods.head().is_empty());
        assert_eq!(periods.iter().filter(|h| !h.is_empty()).count(), 1);
    }

    #[test]
    #[should_panic(expected = "at least 1")]
    fn test_zero_capacity_panics() {
        let _ = CircularBuffer::<f64>::new(0);
    }

    #[test]
    #[should_panic(expected = "empty circular buffer")]
    fn test_head_of_empty_buffer_panics() {
        let buffer = CircularBuffer::<f64>::new(3);
        let _ = buffer.head();
    }
}
