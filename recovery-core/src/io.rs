//! Sensor and actuator traits.
//!
//! Implemented by the platform layer over GPIO and ADC peripherals, and
//! by plain mocks in tests. Reads take `&self` because a sensor may be
//! sampled from both the flight loop and the command handler.

/// Battery voltage sampling.
pub trait BatterySensor {
    /// Battery level as an 8-bit ADC reading. A failed conversion reads
    /// as 0, which is below any sensible empty limit.
    fn battery_level(&self) -> u8;
}

impl<T: BatterySensor + ?Sized> BatterySensor for &T {
    fn battery_level(&self) -> u8 {
        (**self).battery_level()
    }
}

/// Digital inputs consulted by the flight state machine.
pub trait Sensors: BatterySensor {
    /// Arming switch closed.
    fn is_armed(&self) -> bool;

    /// Breakwire intact; it is severed at lift-off.
    fn is_breakwire_connected(&self) -> bool;

    /// A pyro charge is connected and intact.
    fn has_continuity(&self) -> bool;

    /// External deploy vote, e.g. from an apogee detector.
    fn is_vote_asserted(&self) -> bool;
}

/// Outputs driven by the flight state machine.
///
/// The servo and buzzer are not here: the tick scheduler drives those.
pub trait Actuators {
    fn set_status_led(&mut self, on: bool);

    /// Energize the pyro channel. Irreversible in practice.
    fn set_pyro(&mut self, on: bool);

    /// Signal lift-off to an expansion board.
    fn set_launch_asserted(&mut self, on: bool);
}
