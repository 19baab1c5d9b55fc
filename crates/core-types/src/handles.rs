use std::collections::HashMap;

const DEFAULT_START: i64 = 1000;

/// Integer handle table.
///
/// `reset` drops every entry but keeps the allocation counter, so a handle issued before
/// the reset can never name a value stored after it.
#[derive(Debug)]
pub struct Handles<T> {
    next: i64,
    entries: HashMap<i64, T>,
}

impl<T> Default for Handles<T> {
    fn default() -> Self {
        Self::starting_at(DEFAULT_START)
    }
}

impl<T> Handles<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(start: i64) -> Self {
        Self {
            next: start,
            entries: HashMap::new(),
        }
    }

    pub fn create(&mut self, value: T) -> i64 {
        let handle = self.next;
        self.next += 1;
        self.entries.insert(handle, value);
        handle
    }

    pub fn get(&self, handle: i64) -> Option<&T> {
        self.entries.get(&handle)
    }

    pub fn reset(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
