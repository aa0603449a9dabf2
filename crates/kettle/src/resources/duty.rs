//! Duty-cycle ticker
//!
//! Slow PWM for relays: within each period the output is on for the first
//! `duty` percent and off for the rest.

use std::time::{Duration, Instant};

/// Period used when the configured one is missing or not positive
pub const DEFAULT_PERIOD: Duration = Duration::from_secs(10);

/// Phase reference for one duty-cycled output
#[derive(Debug, Clone, Copy)]
pub struct DutyCycle {
    started: Instant,
}

impl DutyCycle {
    pub fn new(now: Instant) -> Self {
        Self { started: now }
    }

    /// Whether the output is on at `now`
    pub fn output(&self, now: Instant, period: Duration, duty: f64) -> bool {
        if duty.is_nan() || duty <= 0.0 || period.is_zero() {
            return false;
        }
        if duty >= 100.0 {
            return true;
        }

        let period = period.as_secs_f64();
        let phase = now.saturating_duration_since(self.started).as_secs_f64() % period;
        phase < period * duty / 100.0
    }
}

/// Period in seconds from a component value
pub fn period_from_secs(secs: Option<f64>) -> Duration {
    match secs {
        Some(s) if s.is_finite() && s > 0.0 => Duration::from_secs_f64(s),
        _ => DEFAULT_PERIOD,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_follows_duty() {
        let start = Instant::now();
        let ticker = DutyCycle::new(start);
        let period = Duration::from_secs(10);

        assert!(ticker.output(start, period, 30.0));
        assert!(ticker.output(start + Duration::from_secs(2), period, 30.0));
        assert!(!ticker.output(start + Duration::from_secs(4), period, 30.0));
        assert!(ticker.output(start + Duration::from_secs(11), period, 30.0));
        assert!(!ticker.output(start + Duration::from_secs(19), period, 30.0));
    }

    #[test]
    fn test_output_limits() {
        let start = Instant::now();
        let ticker = DutyCycle::new(start);
        let later = start + Duration::from_secs(7);

        assert!(!ticker.output(later, DEFAULT_PERIOD, 0.0));
        assert!(!ticker.output(later, DEFAULT_PERIOD, f64::NAN));
        assert!(ticker.output(later, DEFAULT_PERIOD, 100.0));
        assert!(!ticker.output(later, Duration::ZERO, 50.0));
    }

    #[test]
    fn test_period_from_secs() {
        assert_eq!(period_from_secs(Some(2.5)), Duration::from_millis(2500));
        assert_eq!(period_from_secs(Some(0.0)), DEFAULT_PERIOD);
        assert_eq!(period_from_secs(None), DEFAULT_PERIOD);
    }
}
