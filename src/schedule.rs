//! A queue that stores arbitrary data sorted by simulation day
//!
//! Defines a `DayQueue<T>` holding deferred work, such as contact tracing that runs a few days
//! after symptom onset. Items scheduled for the same day are returned in the order they were
//! added. Adding is *O*(log(*n*)) and retrieval of everything due is *O*(*k* log(*n*)).
//!
//! The queue is part of a run's snapshot, so it can be exported to and rebuilt from a plain list
//! of `(day, item)` pairs.

use std::{cmp::Ordering, collections::BinaryHeap};

use crate::hashing::{HashMap, HashMapExt};

pub struct DayQueue<T> {
    queue: BinaryHeap<Entry>,
    data_map: HashMap<u64, T>,
    counter: u64,
}

impl<T> DayQueue<T> {
    /// Create a new empty `DayQueue<T>`
    #[must_use]
    pub fn new() -> DayQueue<T> {
        DayQueue {
            queue: BinaryHeap::new(),
            data_map: HashMap::new(),
            counter: 0,
        }
    }

    /// Add an item to be handled on `day`
    pub fn add(&mut self, day: u32, data: T) {
        let id = self.counter;
        self.queue.push(Entry { day, id });
        self.data_map.insert(id, data);
        self.counter += 1;
    }

    /// Removes and returns every item due on or before `day`, earliest first
    pub fn pop_due(&mut self, day: u32) -> Vec<T> {
        let mut due = Vec::new();
        while self.queue.peek().is_some_and(|entry| entry.day <= day) {
            if let Some(entry) = self.queue.pop() {
                if let Some(data) = self.data_map.remove(&entry.id) {
                    due.push(data);
                }
            }
        }
        due
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data_map.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data_map.is_empty()
    }
}

impl<T: Clone> DayQueue<T> {
    /// All pending items in the order they will be returned
    #[must_use]
    pub fn pending(&self) -> Vec<(u32, T)> {
        let mut entries: Vec<&Entry> = self.queue.iter().collect();
        entries.sort_by(|a, b| b.cmp(a));
        entries
            .into_iter()
            .filter_map(|entry| {
                self.data_map
                    .get(&entry.id)
                    .map(|data| (entry.day, data.clone()))
            })
            .collect()
    }

    /// Rebuilds a queue from the output of [`DayQueue::pending`]
    #[must_use]
    pub fn from_pending(pending: Vec<(u32, T)>) -> Self {
        let mut queue = DayQueue::new();
        for (day, data) in pending {
            queue.add(day, data);
        }
        queue
    }
}

impl<T> Default for DayQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// A day and id object used to order items in the `DayQueue<T>`
#[derive(PartialEq, Eq, Debug)]
struct Entry {
    day: u32,
    id: u64,
}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Entry objects are ordered in increasing order by day and then id (reversed for the max-heap)
impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.day.cmp(&other.day).reverse() {
            Ordering::Equal => self.id.cmp(&other.id).reverse(),
            day_ordering => day_ordering,
        }
    }
}
