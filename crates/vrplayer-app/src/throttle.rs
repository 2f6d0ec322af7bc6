use std::time::{Duration, Instant};

/// Lets a repeating log line through at most once per interval.
#[derive(Debug, Clone)]
pub struct LogThrottle {
    interval: Duration,
    last: Option<Instant>,
    suppressed: u32,
}

impl LogThrottle {
    pub fn new(interval: Duration) -> Self {
        Self { interval, last: None, suppressed: 0 }
    }

    /// `Some(suppressed)` when the line should be logged now, with the
    /// number of occurrences swallowed since the previous one.
    pub fn ready(&mut self, now: Instant) -> Option<u32> {
        match self.last {
            Some(at) if now.saturating_duration_since(at) < self.interval => {
                self.suppressed += 1;
                None
            }
            _ => {
                self.last = Some(now);
                Some(std::mem::take(&mut self.suppressed))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_occurrence_passes_then_throttles() {
        let mut throttle = LogThrottle::new(Duration::from_secs(5));
        let t0 = Instant::now();
        assert_eq!(throttle.ready(t0), Some(0));
        assert_eq!(throttle.ready(t0 + Duration::from_millis(10)), None);
        assert_eq!(throttle.ready(t0 + Duration::from_secs(4)), None);
        assert_eq!(throttle.ready(t0 + Duration::from_secs(5)), Some(2));
        assert_eq!(throttle.ready(t0 + Duration::from_secs(6)), None);
    }
}
