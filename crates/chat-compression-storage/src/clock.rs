use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

/// Hands out strictly increasing timestamps, so two upserts of the same
/// conversation always move `updated_at` forward even within one clock tick.
#[derive(Debug)]
pub(crate) struct MonotonicClock {
    last: Mutex<Option<DateTime<Utc>>>,
}

impl MonotonicClock {
    pub(crate) fn new() -> Self {
        Self {
            last: Mutex::new(None),
        }
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        // Micros is the coarsest precision any backend stores.
        let mut now = truncate_to_micros(Utc::now());
        let mut last = self.last.lock();
        if let Some(prev) = *last {
            if now <= prev {
                now = prev + Duration::microseconds(1);
            }
        }
        *last = Some(now);
        now
    }
}

fn truncate_to_micros(ts: DateTime<Utc>) -> DateTime<Utc> {
    let micros = ts.timestamp_micros();
    DateTime::from_timestamp_micros(micros).unwrap_or(ts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strictly_increasing() {
        let clock = MonotonicClock::new();
        let mut prev = clock.now();
        for _ in 0..1000 {
            let next = clock.now();
            assert!(next > prev);
            prev = next;
        }
    }

    #[test]
    fn test_micro_precision() {
        let clock = MonotonicClock::new();
        let ts = clock.now();
        assert_eq!(ts.timestamp_subsec_nanos() % 1_000, 0);
    }
}
