//! Experience replay memory.

use rand::seq::index;
use rand::Rng;

/// A single transition stored in the replay memory.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub state: Vec<f64>,
    pub action: usize,
    pub reward: f64,
    pub next_state: Vec<f64>,
    /// Whether this was the last step of the episode.
    pub done: bool,
}

/// Fixed-capacity FIFO ring of transitions.
///
/// Once full, each push overwrites the oldest entry.
#[derive(Debug)]
pub struct ReplayBuffer {
    transitions: Vec<Transition>,
    capacity: usize,
    /// Slot the next push writes to once the buffer is full.
    cursor: usize,
}

impl ReplayBuffer {
    /// Creates an empty buffer holding at most `capacity` transitions.
    pub fn new(capacity: usize) -> Self {
        Self {
            transitions: Vec::with_capacity(capacity.min(1 << 16)),
            capacity,
            cursor: 0,
        }
    }

    /// Stores a transition, evicting the oldest one when full.
    pub fn push(&mut self, transition: Transition) {
        if self.capacity == 0 {
            return;
        }
        if self.transitions.len() < self.capacity {
            self.transitions.push(transition);
        } else {
            self.transitions[self.cursor] = transition;
        }
        self.cursor = (self.cursor + 1) % self.capacity;
    }

    /// Draws `batch_size` distinct transitions uniformly at random.
    ///
    /// # Panics
    ///
    /// Panics unless `len() > batch_size`; callers only sample once the
    /// memory holds more than one batch.
    pub fn sample<R: Rng>(&self, batch_size: usize, rng: &mut R) -> Vec<&Transition> {
        assert!(
            self.transitions.len() > batch_size,
            "replay buffer holds {} transitions, need more than {}",
            self.transitions.len(),
            batch_size
        );
        index::sample(rng, self.transitions.len(), batch_size)
            .into_iter()
            .map(|i| &self.transitions[i])
            .collect()
    }

    /// Returns the number of stored transitions.
    pub fn len(&self) -> usize {
        self.transitions.len()
    }

    /// Returns `true` if no transition has been stored.
    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }

    /// Returns the maximum number of transitions kept.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Iterates from the oldest stored transition to the newest.
    pub fn iter(&self) -> impl Iterator<Item = &Transition> {
        let split = if self.transitions.len() < self.capacity {
            0
        } else {
            self.cursor
        };
        self.transitions[split..]
            .iter()
            .chain(&self.transitions[..split])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;

    fn tagged(tag: usize) -> Transition {
        Transition {
            state: vec![tag as f64],
            action: tag,
            reward: 0.0,
            next_state: vec![tag as f64 + 1.0],
            done: false,
        }
    }

    #[test]
    fn push_grows_until_capacity() {
        let mut buf = ReplayBuffer::new(3);
        assert!(buf.is_empty());
        buf.push(tagged(0));
        buf.push(tagged(1));
        assert_eq!(buf.len(), 2);
        buf.push(tagged(2));
        buf.push(tagged(3));
        assert_eq!(buf.len(), 3);
    }

    #[test]
    fn eviction_is_fifo() {
        let mut buf = ReplayBuffer::new(3);
        for tag in 0..5 {
            buf.push(tagged(tag));
        }
        let order: Vec<usize> = buf.iter().map(|t| t.action).collect();
        assert_eq!(order, vec![2, 3, 4]);
    }

    #[test]
    fn sample_is_without_replacement() {
        let mut buf = ReplayBuffer::new(100);
        for tag in 0..50 {
            buf.push(tagged(tag));
        }
        let mut rng = StdRng::seed_from_u64(42);
        let batch = buf.sample(49, &mut rng);
        let distinct: HashSet<usize> = batch.iter().map(|t| t.action).collect();
        assert_eq!(distinct.len(), 49);
    }

    #[test]
    #[should_panic(expected = "need more than")]
    fn sampling_requires_more_than_a_batch() {
        let mut buf = ReplayBuffer::new(10);
        for tag in 0..4 {
            buf.push(tagged(tag));
        }
        let mut rng = StdRng::seed_from_u64(0);
        buf.sample(4, &mut rng);
    }

    #[test]
    fn iter_before_wraparound_keeps_insertion_order() {
        let mut buf = ReplayBuffer::new(4);
        for tag in 0..3 {
            buf.push(tagged(tag));
        }
        let order: Vec<usize> = buf.iter().map(|t| t.action).collect();
        assert_eq!(order, vec![0, 1, 2]);
    }
}
