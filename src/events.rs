//! The raw material of a profiling run: an append-only log of breakpoint
//! hits. Insertion order is chronological order and is never touched
//! afterwards, the aggregation pass depends on that.

use std::time::Instant;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Event {
    pub addr: u64,
    /// monotonic, milliseconds
    pub timestamp: u64,
}

#[derive(Debug, Default)]
pub struct EventLog {
    events: Vec<Event>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// O(1) append, called from the debugger notification context.
    pub fn record(&mut self, addr: u64, timestamp: u64) {
        self.events.push(Event { addr, timestamp });
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Hands the full log over to the aggregation pass, leaving the log
    /// empty. Consumed exactly once per session.
    pub fn drain(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }
}

pub trait Clock {
    fn now_ms(&self) -> u64;
}

/// Wall-clock-backed monotonic time, relative to session creation.
pub struct SystemClock {
    start: Instant,
}

impl Default for SystemClock {
    fn default() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_keeps_insertion_order_and_duplicates() {
        let mut log = EventLog::new();
        log.record(0x200, 5);
        log.record(0x100, 7);
        log.record(0x200, 7);

        assert_eq!(log.len(), 3);

        let events = log.drain();
        assert_eq!(
            events,
            vec![
                Event {
                    addr: 0x200,
                    timestamp: 5
                },
                Event {
                    addr: 0x100,
                    timestamp: 7
                },
                Event {
                    addr: 0x200,
                    timestamp: 7
                },
            ]
        );

        assert!(log.is_empty());
    }

    #[test]
    fn system_clock_counts_up_from_creation() {
        let clock = SystemClock::default();
        let first = clock.now_ms();
        let second = clock.now_ms();
        assert!(second >= first);
    }
}
