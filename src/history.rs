use std::collections::VecDeque;

use crate::conversation::Message;

/// Fixed-capacity message log that keeps the most recent entries.
#[derive(Debug, Clone)]
pub struct BoundedHistory {
    messages: VecDeque<Message>,
    capacity: usize,
}

impl BoundedHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self { messages: VecDeque::with_capacity(capacity), capacity }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Appends and returns how many old messages were evicted.
    pub fn push(&mut self, message: Message) -> usize {
        self.messages.push_back(message);
        self.evict()
    }

    pub fn set_capacity(&mut self, capacity: usize) -> usize {
        self.capacity = capacity.max(1);
        self.evict()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.back()
    }

    fn evict(&mut self) -> usize {
        let mut dropped = 0;
        while self.messages.len() > self.capacity {
            self.messages.pop_front();
            dropped += 1;
        }
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbered(n: usize) -> Message {
        Message::user(format!("m{n}"))
    }

    fn contents(h: &BoundedHistory) -> Vec<String> {
        h.iter().map(|m| m.content.clone()).collect()
    }

    #[test]
    fn keeps_the_last_limit_messages_in_order() {
        for limit in 1..8 {
            for n in 0..20 {
                let mut h = BoundedHistory::new(limit);
                for i in 0..n {
                    h.push(numbered(i));
                }
                assert_eq!(h.len(), n.min(limit), "n={n} limit={limit}");
                let expected: Vec<String> = (n.saturating_sub(limit)..n).map(|i| format!("m{i}")).collect();
                assert_eq!(contents(&h), expected, "n={n} limit={limit}");
            }
        }
    }

    #[test]
    fn push_reports_evictions() {
        let mut h = BoundedHistory::new(2);
        assert_eq!(h.push(numbered(0)), 0);
        assert_eq!(h.push(numbered(1)), 0);
        assert_eq!(h.push(numbered(2)), 1);
        assert_eq!(h.last().unwrap().content, "m2");
    }

    #[test]
    fn shrinking_capacity_drops_oldest() {
        let mut h = BoundedHistory::new(5);
        for i in 0..5 {
            h.push(numbered(i));
        }
        assert_eq!(h.set_capacity(2), 3);
        assert_eq!(contents(&h), vec!["m3", "m4"]);
        assert_eq!(h.set_capacity(10), 0);
        assert_eq!(h.capacity(), 10);
    }

    #[test]
    fn clear_empties() {
        let mut h = BoundedHistory::new(3);
        h.push(numbered(0));
        h.clear();
        assert!(h.is_empty());
        assert!(h.last().is_none());
    }
}
