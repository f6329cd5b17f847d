//! Event cursor
//!
//! Remembers the logical time of the newest event already folded into the
//! trader book, plus the epoch before which nothing is ever counted.

use crate::indexer::AccountEvent;

/// Why an event was or was not admitted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admit,
    /// Older than the tracking epoch
    BeforeEpoch,
    /// At or below the watermark: folded by an earlier pass
    AlreadySeen,
}

#[derive(Debug, Clone)]
pub struct EventCursor {
    last_processed_lt: Option<u64>,
    tracking_start_time: i64,
}

impl EventCursor {
    pub fn new(tracking_start_time: i64) -> Self {
        Self {
            last_processed_lt: None,
            tracking_start_time,
        }
    }

    pub fn last_processed_lt(&self) -> Option<u64> {
        self.last_processed_lt
    }

    pub fn admit(&self, event: &AccountEvent) -> Admission {
        if event.timestamp < self.tracking_start_time {
            return Admission::BeforeEpoch;
        }
        match self.last_processed_lt {
            Some(watermark) if event.lt <= watermark => Admission::AlreadySeen,
            _ => Admission::Admit,
        }
    }

    /// Move the watermark forward. Returns false (and changes nothing) if
    /// `lt` would move it backward or leave it in place.
    pub fn advance(&mut self, lt: u64) -> bool {
        match self.last_processed_lt {
            Some(watermark) if lt <= watermark => false,
            _ => {
                self.last_processed_lt = Some(lt);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(lt: u64, timestamp: i64) -> AccountEvent {
        AccountEvent {
            lt,
            timestamp,
            ..Default::default()
        }
    }

    #[test]
    fn test_epoch_boundary() {
        let cursor = EventCursor::new(1_000);
        assert_eq!(cursor.admit(&event(5, 999)), Admission::BeforeEpoch);
        assert_eq!(cursor.admit(&event(5, 1_000)), Admission::Admit);
    }

    #[test]
    fn test_watermark_is_inclusive() {
        let mut cursor = EventCursor::new(0);
        assert!(cursor.advance(50));
        assert_eq!(cursor.admit(&event(50, 10)), Admission::AlreadySeen);
        assert_eq!(cursor.admit(&event(49, 10)), Admission::AlreadySeen);
        assert_eq!(cursor.admit(&event(51, 10)), Admission::Admit);
    }

    #[test]
    fn test_never_moves_backward() {
        let mut cursor = EventCursor::new(0);
        assert!(cursor.advance(100));
        assert!(!cursor.advance(40));
        assert!(!cursor.advance(100));
        assert_eq!(cursor.last_processed_lt(), Some(100));
        assert!(cursor.advance(101));
        assert_eq!(cursor.last_processed_lt(), Some(101));
    }
}
