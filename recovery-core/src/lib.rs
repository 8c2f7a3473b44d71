//! Platform-agnostic core of the recovery-deployment controller.
//!
//! Everything here runs on the target and on the host alike; the
//! firmware crate only supplies pins, timers and the UART.
//!
//! # Execution contexts
//!
//! Two contexts share one [`SharedState`]:
//!
//! - **Interrupt context**: [`SharedState::on_tick`] every 20 ms,
//!   [`Endpoint::on_byte`] for each received byte and
//!   [`SharedState::on_tx_complete`] after each transmitted byte.
//! - **Main context**: [`FlightController::poll`] every 10 ms.
//!
//! Shared fields are atomics or critical-section mutexes, so neither
//! side ever blocks the other for longer than a read-modify-write.
//!
//! # Modules
//!
//! - [`timebase`]: tick counter and servo pulse ([`TimeBase`], [`ServoPulse`])
//! - [`beeper`]: beep queue and sequencer ([`BeepSequencer`])
//! - [`link`]: transmit reservation ([`Link`], [`TxLease`])
//! - [`dispatch`]: reserved commands and forwarding ([`dispatch()`], [`Endpoint`])
//! - [`commands`]: calibration getters/setters ([`ConfigCommands`])
//! - [`flight`]: flight state machine ([`FlightController`], [`transition`])
//! - [`config`], [`io`]: collaborator traits
//!
//! # Example
//!
//! ```rust
//! use recovery_core::{AtomicConfig, ConfigCommands, Endpoint, SharedState};
//! use recovery_core::io::BatterySensor;
//!
//! struct Battery;
//! impl BatterySensor for Battery {
//!     fn battery_level(&self) -> u8 { 200 }
//! }
//!
//! let shared = SharedState::new();
//! let config = AtomicConfig::new();
//! let mut commands = ConfigCommands::new(&config, &Battery, &shared.servo);
//! let mut endpoint = Endpoint::new();
//!
//! // Synchronous "get battery voltage" (id 0x13), CRC 0x7F.
//! for byte in [0x55, 0x00, 0x00, 0x13, 0x7F, 0x5A] {
//!     endpoint.on_byte(byte, &shared, &mut commands);
//! }
//! // The reply is queued; the writer pulls it byte by byte, START first.
//! assert!(shared.link.take_pending());
//! assert_eq!(shared.on_tx_complete(), Some(0x55));
//! ```
//!
//! # Features
//!
//! - **`std`**: Enable standard library support (for host testing)
//! - **`defmt`**: Log through defmt and derive `defmt::Format`

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(feature = "std")]
extern crate std;

// Must come first: the logging macros are textually scoped.
mod fmt;

pub mod beeper;
pub mod commands;
pub mod config;
pub mod dispatch;
pub mod flight;
pub mod io;
pub mod link;
pub mod shared;
pub mod timebase;

pub use beeper::{BeepPhase, BeepQueue, BeepSequencer, BEEP_FOREVER, BEEP_LONG, BEEP_NORMAL, BEEP_SHORT};
pub use commands::{ConfigCommand, ConfigCommands};
pub use config::{AtomicConfig, ByteSlot, ConfigStore, DeployMode, ImageError, WordSlot, CONFIG_IMAGE_LEN};
pub use dispatch::{dispatch, CommandHandler, Disposition, Endpoint};
pub use flight::{transition, Action, FlightController, FlightInputs, FlightSettings, FlightState, FlightStatus, Step};
pub use io::{Actuators, BatterySensor, Sensors};
pub use link::{Link, TxLease};
pub use shared::SharedState;
pub use timebase::{ServoPulse, TimeBase, TICK_PERIOD_MS};

/// Main-loop poll period of the flight state machine.
pub const FLIGHT_POLL_MS: u64 = 10;
