//! Rocket recovery-deployment controller for RP2040.
//!
//! Board glue around [`recovery_core`]: GPIO sensors and actuators, the
//! battery ADC, the servo PWM and calibration flash. The tasks
//! themselves live in the binary.
//!
//! # Hardware Configuration
//!
//! | Function         | GPIO | Description |
//! |------------------|------|-------------|
//! | UART1 TX         | 8    | LBP link, 38400 8N1 |
//! | UART1 RX         | 9    | LBP link |
//! | Vote             | 2    | Deploy vote input (active low, pull-up) |
//! | Armed            | 3    | Arming switch (active low, pull-up) |
//! | Breakwire        | 4    | High while intact (pull-down) |
//! | Continuity       | 5    | High while a charge is connected (pull-up) |
//! | Launch asserted  | 13   | Lift-off signal to expansion boards |
//! | Pyro             | 14   | Pyro channel MOSFET |
//! | Buzzer           | 15   | Piezo driver |
//! | Servo            | 16   | PWM slice 0 A, 50 Hz |
//! | LED              | 25   | On-board LED (status) |
//! | Battery          | 26   | ADC0 via /2 divider |
//!
//! # Architecture
//!
//! - **Tick task** (interrupt executor): advances the time base and the
//!   beeper every 20 ms, drives the buzzer and servo outputs.
//! - **UART RX task** (interrupt executor): frames bytes and dispatches
//!   packets.
//! - **UART TX task** (interrupt executor): drains replies byte by byte.
//! - **Flight loop** (thread mode): polls the state machine every 10 ms.
//! - **Persist task** (thread mode): writes calibration changes to flash
//!   once they settle.
//!
//! # Features
//!
//! - **`dev-panic`** (default): Use `panic-probe` for development (prints panic info via RTT)
//! - **`prod-panic`**: Use `panic-reset` for production (silent watchdog reset)

#![no_std]

#[cfg(all(feature = "dev-panic", feature = "prod-panic"))]
compile_error!("Cannot enable both `dev-panic` and `prod-panic` features");

pub use recovery_core::{
    AtomicConfig, ConfigCommands, Endpoint, FlightController, FlightState, SharedState,
    FLIGHT_POLL_MS, TICK_PERIOD_MS,
};

pub mod board;
pub mod storage;

pub use board::{BatteryMonitor, BoardActuators, BoardSensors, Buzzer, ServoPwm};
pub use storage::{ConfigFlash, FLASH_SIZE, PERSIST_DEBOUNCE_MS};

/// UART baud rate of the LBP link.
pub const UART_BAUD: u32 = 38_400;
