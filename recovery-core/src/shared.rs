//! State shared between the tick/UART interrupt context and the flight
//! loop.

use crate::beeper::BeepSequencer;
use crate::flight::FlightStatus;
use crate::link::Link;
use crate::timebase::{ServoPulse, TimeBase};

/// Everything both execution contexts touch.
///
/// Build once at start-up and hand out `&'static` references. Every
/// field synchronizes internally, either through atomics or through a
/// critical-section mutex, so plain shared references suffice.
pub struct SharedState {
    pub time: TimeBase,
    pub beeper: BeepSequencer,
    pub servo: ServoPulse,
    pub link: Link,
    pub status: FlightStatus,
}

impl SharedState {
    #[must_use]
    pub fn new() -> Self {
        Self {
            time: TimeBase::new(),
            beeper: BeepSequencer::new(),
            servo: ServoPulse::new(),
            link: Link::new(),
            status: FlightStatus::new(),
        }
    }

    /// Periodic tick, once every [`TICK_PERIOD_MS`](crate::TICK_PERIOD_MS).
    ///
    /// Advances the time base and the beeper. Returns the new buzzer
    /// level when it changes; the caller also refreshes the servo pulse
    /// from [`servo`](Self::servo).
    pub fn on_tick(&self) -> Option<bool> {
        self.time.tick();
        self.beeper.tick()
    }

    /// The previous byte left the UART; returns the next one to write,
    /// beginning with `START` when a new frame has been queued.
    pub fn on_tx_complete(&self) -> Option<u8> {
        self.link.on_tx_complete()
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}
