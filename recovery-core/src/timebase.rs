//! Time base and servo pulse, both advanced from the periodic tick.

use portable_atomic::{AtomicU16, AtomicU8, Ordering};

/// Tick period of the scheduler.
pub const TICK_PERIOD_MS: u64 = 20;

/// Servo frame period in microseconds; one pulse per tick.
pub const SERVO_PERIOD_US: u32 = TICK_PERIOD_MS as u32 * 1000;
/// Pulse width at position 0.
pub const SERVO_MIN_PULSE_US: u32 = 1000;
/// Pulse width at position 255.
pub const SERVO_MAX_PULSE_US: u32 = 2000;

/// 16-bit tick counter.
///
/// Wraps silently after 65536 ticks (about 22 minutes). Compare times
/// as "ticks since mark", never across long intervals.
pub struct TimeBase {
    ticks: AtomicU16,
}

impl TimeBase {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ticks: AtomicU16::new(0),
        }
    }

    /// Advance by one tick. Tick context only.
    #[inline]
    pub fn tick(&self) {
        self.ticks.fetch_add(1, Ordering::AcqRel);
    }

    #[inline]
    pub fn reset(&self) {
        self.ticks.store(0, Ordering::Release);
    }

    #[inline]
    #[must_use]
    pub fn get(&self) -> u16 {
        self.ticks.load(Ordering::Acquire)
    }
}

impl Default for TimeBase {
    fn default() -> Self {
        Self::new()
    }
}

/// Requested servo position, 0..=255 over the full travel.
///
/// Setting the position is a plain store; the platform layer picks it
/// up on the next pulse.
pub struct ServoPulse {
    position: AtomicU8,
}

impl ServoPulse {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            position: AtomicU8::new(0),
        }
    }

    #[inline]
    pub fn set_position(&self, position: u8) {
        self.position.store(position, Ordering::Release);
    }

    #[inline]
    #[must_use]
    pub fn position(&self) -> u8 {
        self.position.load(Ordering::Acquire)
    }

    /// Pulse width for the current position.
    #[must_use]
    pub fn pulse_width_us(&self) -> u32 {
        pulse_width_us(self.position())
    }

    /// Compare value for a PWM counter whose period `top + 1` spans one
    /// servo frame.
    #[must_use]
    pub fn compare_for_top(&self, top: u16) -> u16 {
        let counts = (u32::from(top) + 1) * self.pulse_width_us() / SERVO_PERIOD_US;
        u16::try_from(counts).unwrap_or(top)
    }
}

impl Default for ServoPulse {
    fn default() -> Self {
        Self::new()
    }
}

/// Map a 0..=255 position linearly onto the 1-2 ms pulse window.
#[inline]
#[must_use]
pub const fn pulse_width_us(position: u8) -> u32 {
    SERVO_MIN_PULSE_US + position as u32 * (SERVO_MAX_PULSE_US - SERVO_MIN_PULSE_US) / 255
}
