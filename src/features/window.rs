//! Bounded event window
//!
//! Fixed-capacity ring buffer of events. Inserts evict by timestamp cutoff
//! (twice the feature window behind the newest event) and by capacity, so
//! memory stays bounded regardless of event rate.

use std::collections::VecDeque;

use crate::stream::Event;

/// Time-bounded, capacity-bounded event buffer
#[derive(Debug, Clone)]
pub struct EventWindow {
    events: VecDeque<Event>,
    /// Events older than `latest - retention_ms` are evicted on insert
    retention_ms: i64,
    capacity: usize,
    latest_ts: i64,
}

impl EventWindow {
    pub fn new(retention_ms: i64, capacity: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(capacity.min(1024)),
            retention_ms,
            capacity: capacity.max(1),
            latest_ts: i64::MIN,
        }
    }

    /// Append an event. Out-of-order events are accepted; the cutoff always
    /// follows the newest timestamp seen.
    pub fn push(&mut self, event: Event) {
        self.latest_ts = self.latest_ts.max(event.timestamp);
        self.events.push_back(event);
        self.prune();

        while self.events.len() > self.capacity {
            self.events.pop_front();
        }
    }

    fn prune(&mut self) {
        let cutoff = self.latest_ts.saturating_sub(self.retention_ms);
        // Front-first eviction; a late straggler behind a newer event is
        // dropped once it reaches the front.
        while let Some(front) = self.events.front() {
            if front.timestamp < cutoff {
                self.events.pop_front();
            } else {
                break;
            }
        }
    }

    /// Events with `timestamp >= since`
    pub fn since(&self, since: i64) -> impl Iterator<Item = &Event> {
        self.events.iter().filter(move |e| e.timestamp >= since)
    }

    /// Newest timestamp observed, if any
    pub fn latest_timestamp(&self) -> Option<i64> {
        if self.events.is_empty() {
            None
        } else {
            Some(self.latest_ts)
        }
    }

    /// True when every retained event is older than `cutoff`
    pub fn is_stale(&self, cutoff: i64) -> bool {
        self.events.is_empty() || self.latest_ts < cutoff
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::EventKind;

    fn buy(ts: i64) -> Event {
        Event::new(EventKind::Buy, "mint1", "w", 0.1, ts)
    }

    #[test]
    fn test_evicts_older_than_retention() {
        let mut window = EventWindow::new(1_000, 100);
        window.push(buy(0));
        window.push(buy(500));
        window.push(buy(1_400));

        assert_eq!(window.len(), 2);
        assert_eq!(window.since(0).count(), 2);
    }

    #[test]
    fn test_capacity_bound() {
        let mut window = EventWindow::new(i64::MAX, 3);
        for ts in 0..10 {
            window.push(buy(ts));
        }
        assert_eq!(window.len(), 3);
        assert_eq!(window.since(0).next().map(|e| e.timestamp), Some(7));
    }

    #[test]
    fn test_accepts_out_of_order() {
        let mut window = EventWindow::new(10_000, 100);
        window.push(buy(5_000));
        window.push(buy(4_900));
        assert_eq!(window.len(), 2);
        assert_eq!(window.latest_timestamp(), Some(5_000));
        assert_eq!(window.since(4_950).count(), 1);
    }

    #[test]
    fn test_staleness() {
        let mut window = EventWindow::new(10_000, 100);
        assert!(window.is_stale(0));
        window.push(buy(100));
        assert!(!window.is_stale(50));
        assert!(window.is_stale(200));
    }
}
