//! RP2040 implementations of the core sensor and actuator traits.

use core::cell::RefCell;

use defmt::warn;
use embassy_rp::adc::{Adc, Blocking, Channel};
use embassy_rp::gpio::{Input, Level, Output};
use embassy_rp::pwm::{Config as PwmConfig, Pwm};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use fixed::types::U12F4;
use fixed_macro::fixed;
use recovery_core::{Actuators, BatterySensor, Sensors, ServoPulse};

/// 125 MHz / 40 = 3.125 MHz counter clock.
const SERVO_PWM_DIVIDER: U12F4 = fixed!(40: U12F4);
/// 62 500 counts at 3.125 MHz is one 20 ms servo frame.
pub const SERVO_PWM_TOP: u16 = 62_499;

/// Battery ADC shared by the flight loop and the command handler.
pub struct BatteryMonitor {
    adc: Mutex<CriticalSectionRawMutex, RefCell<(Adc<'static, Blocking>, Channel<'static>)>>,
}

impl BatteryMonitor {
    pub fn new(adc: Adc<'static, Blocking>, channel: Channel<'static>) -> Self {
        Self {
            adc: Mutex::new(RefCell::new((adc, channel))),
        }
    }
}

impl BatterySensor for BatteryMonitor {
    fn battery_level(&self) -> u8 {
        self.adc.lock(|cell| {
            let mut guard = cell.borrow_mut();
            let (adc, channel) = &mut *guard;
            match adc.blocking_read(channel) {
                // 12-bit conversion, protocol carries the top 8 bits
                Ok(raw) => (raw >> 4) as u8,
                Err(_) => {
                    warn!("battery conversion failed");
                    0
                }
            }
        })
    }
}

/// Digital inputs plus the shared battery monitor.
pub struct BoardSensors {
    pub vote: Input<'static>,
    pub armed: Input<'static>,
    pub breakwire: Input<'static>,
    pub continuity: Input<'static>,
    pub battery: &'static BatteryMonitor,
}

impl BatterySensor for BoardSensors {
    fn battery_level(&self) -> u8 {
        self.battery.battery_level()
    }
}

impl Sensors for BoardSensors {
    fn is_armed(&self) -> bool {
        self.armed.is_low()
    }

    fn is_breakwire_connected(&self) -> bool {
        self.breakwire.is_high()
    }

    fn has_continuity(&self) -> bool {
        self.continuity.is_high()
    }

    fn is_vote_asserted(&self) -> bool {
        self.vote.is_low()
    }
}

/// Outputs owned by the flight loop.
pub struct BoardActuators {
    pub led: Output<'static>,
    pub pyro: Output<'static>,
    pub launch_asserted: Output<'static>,
}

impl Actuators for BoardActuators {
    fn set_status_led(&mut self, on: bool) {
        self.led.set_level(Level::from(on));
    }

    fn set_pyro(&mut self, on: bool) {
        self.pyro.set_level(Level::from(on));
    }

    fn set_launch_asserted(&mut self, on: bool) {
        self.launch_asserted.set_level(Level::from(on));
    }
}

/// Piezo buzzer output, driven by the tick task.
pub struct Buzzer(Output<'static>);

impl Buzzer {
    pub fn new(pin: Output<'static>) -> Self {
        Self(pin)
    }

    pub fn set(&mut self, on: bool) {
        self.0.set_level(Level::from(on));
    }
}

/// Hardware PWM generating the 50 Hz servo pulse.
pub struct ServoPwm {
    pwm: Pwm<'static>,
    config: PwmConfig,
}

impl ServoPwm {
    /// Slice configuration for a 20 ms frame, starting at position 0.
    #[must_use]
    pub fn config() -> PwmConfig {
        let mut config = PwmConfig::default();
        config.divider = SERVO_PWM_DIVIDER;
        config.top = SERVO_PWM_TOP;
        config.compare_a = ServoPulse::new().compare_for_top(SERVO_PWM_TOP);
        config
    }

    pub fn new(pwm: Pwm<'static>) -> Self {
        Self {
            pwm,
            config: Self::config(),
        }
    }

    /// Follow the requested position; only touches the hardware on change.
    pub fn apply(&mut self, servo: &ServoPulse) {
        let compare = servo.compare_for_top(SERVO_PWM_TOP);
        if compare != self.config.compare_a {
            self.config.compare_a = compare;
            self.pwm.set_config(&self.config);
        }
    }
}
