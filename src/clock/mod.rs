//! Variable-speed virtual clock.
//!
//! The [`VirtualClock`] is a pull-based counter: time only advances when
//! [`VirtualClock::sample`] is called. Each sample adds the wall-clock delta
//! since the previous sample, scaled by the current speed multiplier, to an
//! accumulated "stretched" time. Changing the speed never rescales time that
//! has already been accumulated.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use thiserror::Error;

/// Errors raised by the virtual clock.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum ClockError {
    /// Speed must be finite and strictly positive.
    #[error("invalid speed multiplier {0}: must be finite and > 0")]
    InvalidSpeed(f64),
}

/// A monotonic wall-clock source, in milliseconds.
pub trait TimeSource: Send + Sync {
    fn now_ms(&self) -> f64;
}

/// Wall-clock time measured from the moment the source was created.
#[derive(Debug, Clone)]
pub struct SystemTimeSource {
    origin: Instant,
}

impl SystemTimeSource {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemTimeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for SystemTimeSource {
    fn now_ms(&self) -> f64 {
        self.origin.elapsed().as_secs_f64() * 1000.0
    }
}

/// A hand-driven time source. Clones share the same reading.
///
/// Used to drive sessions deterministically without real time passing.
#[derive(Debug, Clone, Default)]
pub struct ManualTimeSource {
    bits: Arc<AtomicU64>,
}

impl ManualTimeSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the current reading. Readings must not go backwards.
    pub fn set(&self, ms: f64) {
        self.bits.store(ms.to_bits(), Ordering::SeqCst);
    }

    /// Move the reading forward by `ms`.
    pub fn advance(&self, ms: f64) {
        let now = self.now_ms();
        self.set(now + ms);
    }
}

impl TimeSource for ManualTimeSource {
    fn now_ms(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::SeqCst))
    }
}

/// Clock shared between the playback loop and the input callback.
pub type SharedClock = Arc<Mutex<VirtualClock>>;

/// Speed-adjustable elapsed-time counter.
pub struct VirtualClock {
    source: Arc<dyn TimeSource>,
    speed: f64,
    stretched_ms: f64,
    last_sample_ms: Option<f64>,
}

impl VirtualClock {
    /// Create a stopped clock reading zero at speed 1.0.
    pub fn new(source: Arc<dyn TimeSource>) -> Self {
        Self::starting_at(source, 0.0)
    }

    /// Create a stopped clock whose first reading is `initial_ms`.
    ///
    /// A negative value gives a lead-in before musical time zero.
    pub fn starting_at(source: Arc<dyn TimeSource>, initial_ms: f64) -> Self {
        Self {
            source,
            speed: 1.0,
            stretched_ms: initial_ms,
            last_sample_ms: None,
        }
    }

    /// Wrap the clock for sharing across threads.
    pub fn shared(self) -> SharedClock {
        Arc::new(Mutex::new(self))
    }

    /// Anchor the wall-clock reference. Time accumulates from here on.
    pub fn start(&mut self) {
        self.last_sample_ms = Some(self.source.now_ms());
    }

    pub fn is_started(&self) -> bool {
        self.last_sample_ms.is_some()
    }

    /// Advance the clock and return the virtual elapsed time in milliseconds.
    ///
    /// Before [`start`](Self::start) this returns the current reading
    /// without advancing.
    pub fn sample(&mut self) -> f64 {
        if let Some(last) = self.last_sample_ms {
            let now = self.source.now_ms();
            // A source that steps backwards must not move virtual time back.
            let delta = (now - last).max(0.0);
            self.stretched_ms += delta * self.speed;
            self.last_sample_ms = Some(now.max(last));
        }
        self.stretched_ms
    }

    /// Last accumulated reading, without sampling.
    pub fn elapsed_ms(&self) -> f64 {
        self.stretched_ms
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    /// Change the speed multiplier for all future deltas.
    ///
    /// Time up to this call is accumulated at the old speed first. On error
    /// the previous speed is kept.
    pub fn set_speed(&mut self, multiplier: f64) -> Result<(), ClockError> {
        if !multiplier.is_finite() || multiplier <= 0.0 {
            return Err(ClockError::InvalidSpeed(multiplier));
        }
        self.sample();
        self.speed = multiplier;
        Ok(())
    }
}

impl std::fmt::Debug for VirtualClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VirtualClock")
            .field("speed", &self.speed)
            .field("stretched_ms", &self.stretched_ms)
            .field("last_sample_ms", &self.last_sample_ms)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn manual_clock() -> (ManualTimeSource, VirtualClock) {
        let source = ManualTimeSource::new();
        let clock = VirtualClock::new(Arc::new(source.clone()));
        (source, clock)
    }

    #[test]
    fn unstarted_clock_does_not_advance() {
        let (source, mut clock) = manual_clock();
        source.advance(500.0);
        assert_eq!(clock.sample(), 0.0);
        assert!(!clock.is_started());
    }

    #[test]
    fn advances_at_unit_speed() {
        let (source, mut clock) = manual_clock();
        clock.start();
        source.advance(250.0);
        assert_approx_eq!(clock.sample(), 250.0);
        source.advance(250.0);
        assert_approx_eq!(clock.sample(), 500.0);
    }

    #[test]
    fn speed_scales_future_deltas_only() {
        let (source, mut clock) = manual_clock();
        clock.start();
        source.advance(1000.0);
        // Not sampled yet: set_speed must book the pending 1000ms at 1.0x.
        clock.set_speed(2.0).unwrap();
        assert_approx_eq!(clock.elapsed_ms(), 1000.0);
        source.advance(1000.0);
        assert_approx_eq!(clock.sample(), 3000.0);
    }

    #[test]
    fn rejects_non_positive_and_non_finite_speed() {
        let (_source, mut clock) = manual_clock();
        clock.set_speed(1.5).unwrap();
        for bad in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                clock.set_speed(bad),
                Err(ClockError::InvalidSpeed(_))
            ));
        }
        assert_eq!(clock.speed(), 1.5);
    }

    #[test]
    fn lead_in_starts_negative() {
        let source = ManualTimeSource::new();
        let mut clock = VirtualClock::starting_at(Arc::new(source.clone()), -100.0);
        clock.start();
        assert_approx_eq!(clock.sample(), -100.0);
        source.advance(150.0);
        assert_approx_eq!(clock.sample(), 50.0);
    }

    #[test]
    fn backwards_source_is_ignored() {
        let (source, mut clock) = manual_clock();
        source.set(100.0);
        clock.start();
        source.set(300.0);
        assert_approx_eq!(clock.sample(), 200.0);
        source.set(250.0);
        assert_approx_eq!(clock.sample(), 200.0);
        source.set(400.0);
        assert_approx_eq!(clock.sample(), 300.0);
    }

    #[test]
    fn system_source_is_monotonic() {
        let source = SystemTimeSource::new();
        let a = source.now_ms();
        let b = source.now_ms();
        assert!(b >= a);
    }
}
