/// Fixed-capacity circular buffer.
///
/// Wrap in `parking_lot::Mutex` for cross-thread access.
///
/// Overflow behavior: drops the oldest items.
#[derive(Debug)]
pub struct RingBuffer<T> {
    buffer: Vec<Option<T>>,
    write_index: usize,
    read_index: usize,
    available: usize,
    capacity: usize,
}

impl<T: Clone> RingBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: vec![None; capacity],
            write_index: 0,
            read_index: 0,
            available: 0,
            capacity,
        }
    }

    /// Push one item, evicting the oldest when full.
    ///
    /// Returns the evicted item, if any. A zero-capacity buffer drops everything.
    pub fn push(&mut self, item: T) -> Option<T> {
        if self.capacity == 0 {
            return Some(item);
        }

        let evicted = if self.available == self.capacity {
            let old = self.buffer[self.read_index].take();
            self.read_index = (self.read_index + 1) % self.capacity;
            self.available -= 1;
            old
        } else {
            None
        };

        self.buffer[self.write_index] = Some(item);
        self.write_index = (self.write_index + 1) % self.capacity;
        self.available += 1;
        evicted
    }

    /// Write a slice, keeping only the last `capacity` items if it is larger.
    pub fn write(&mut self, items: &[T]) {
        let items = if items.len() > self.capacity {
            &items[items.len() - self.capacity..]
        } else {
            items
        };
        for item in items {
            self.push(item.clone());
        }
    }

    /// Read and remove up to `count` items, oldest first.
    pub fn read(&mut self, count: usize) -> Vec<T> {
        let to_read = count.min(self.available);
        let mut result = Vec::with_capacity(to_read);
        for _ in 0..to_read {
            if let Some(item) = self.buffer[self.read_index].take() {
                result.push(item);
            }
            self.read_index = (self.read_index + 1) % self.capacity;
            self.available -= 1;
        }
        result
    }

    /// Copy of every buffered item, oldest first, without consuming.
    pub fn snapshot(&self) -> Vec<T> {
        (0..self.available)
            .filter_map(|i| self.buffer[(self.read_index + i) % self.capacity].clone())
            .collect()
    }

    /// Number of items currently buffered.
    pub fn count(&self) -> usize {
        self.available
    }

    pub fn is_empty(&self) -> bool {
        self.available == 0
    }

    pub fn reset(&mut self) {
        self.buffer.iter_mut().for_each(|slot| *slot = None);
        self.write_index = 0;
        self.read_index = 0;
        self.available = 0;
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
