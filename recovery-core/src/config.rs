//! Calibration parameters and the store that holds them.
//!
//! The controller never owns its configuration: it reads and writes
//! named scalar slots through [`ConfigStore`]. Every access must be
//! atomic, because the flight loop and the interrupt-driven command
//! handler touch the same slots.
//!
//! [`AtomicConfig`] also serializes itself into a small checksummed
//! image, which the platform keeps in non-volatile memory:
//!
//! ```text
//! 0..4    magic "SRPC"
//! 4       version
//! 5..11   word slots, little-endian
//! 11..16  byte slots
//! 16      CRC-8 over bytes 0..16
//! ```

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use lbp_proto::calculate_crc8;
use portable_atomic::{AtomicBool, AtomicU16, AtomicU8, Ordering};

/// Default minimum deploy time: 10 s.
pub const DEFAULT_MIN_DEPLOY_TIME: u16 = 500;
/// Default maximum deploy time: 14 s.
pub const DEFAULT_MAX_DEPLOY_TIME: u16 = 700;
/// 6.5 V seen through the /2 divider on an 8-bit ADC reading.
pub const DEFAULT_BATTERY_EMPTY_LIMIT: u8 = 166;
pub const DEFAULT_SERVO_CLOSED_POSITION: u8 = 0;
pub const DEFAULT_SERVO_OPEN_POSITION: u8 = 255;

/// 16-bit slots, all in 20 ms ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WordSlot {
    MinDeployTime,
    MaxDeployTime,
    /// Time from launch to deployment on the last flight.
    LastDeployTime,
}

impl WordSlot {
    const COUNT: usize = 3;

    const fn index(self) -> usize {
        self as usize
    }
}

/// 8-bit slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ByteSlot {
    BatteryEmptyLimit,
    /// Raw [`DeployMode`]: zero for pyro, anything else for servo.
    DeployMode,
    ServoClosedPosition,
    ServoOpenPosition,
    Address,
}

impl ByteSlot {
    const COUNT: usize = 5;

    const fn index(self) -> usize {
        self as usize
    }
}

/// Deployment actuator selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DeployMode {
    Pyro,
    Servo,
}

impl DeployMode {
    #[inline]
    #[must_use]
    pub const fn from_raw(raw: u8) -> Self {
        if raw == 0 {
            Self::Pyro
        } else {
            Self::Servo
        }
    }

    #[inline]
    #[must_use]
    pub const fn to_raw(self) -> u8 {
        match self {
            Self::Pyro => 0,
            Self::Servo => 1,
        }
    }
}

/// Atomic access to the persisted calibration slots.
///
/// Implementations must not tear a value when a read races a write from
/// another execution context.
pub trait ConfigStore {
    fn read_u16(&self, slot: WordSlot) -> u16;
    fn write_u16(&self, slot: WordSlot, value: u16);
    fn read_u8(&self, slot: ByteSlot) -> u8;
    fn write_u8(&self, slot: ByteSlot, value: u8);

    /// Configured deployment actuator.
    fn deploy_mode(&self) -> DeployMode {
        DeployMode::from_raw(self.read_u8(ByteSlot::DeployMode))
    }
}

impl<T: ConfigStore + ?Sized> ConfigStore for &T {
    fn read_u16(&self, slot: WordSlot) -> u16 {
        (**self).read_u16(slot)
    }

    fn write_u16(&self, slot: WordSlot, value: u16) {
        (**self).write_u16(slot, value);
    }

    fn read_u8(&self, slot: ByteSlot) -> u8 {
        (**self).read_u8(slot)
    }

    fn write_u8(&self, slot: ByteSlot, value: u8) {
        (**self).write_u8(slot, value);
    }
}

/// Size of a serialized [`AtomicConfig`].
pub const CONFIG_IMAGE_LEN: usize = 17;

const IMAGE_MAGIC: [u8; 4] = *b"SRPC";
const IMAGE_VERSION: u8 = 1;
const WORDS_AT: usize = 5;
const BYTES_AT: usize = WORDS_AT + 2 * WordSlot::COUNT;
const CRC_AT: usize = BYTES_AT + ByteSlot::COUNT;

/// Why a stored image was not restored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ImageError {
    /// Nothing stored yet (erased memory reads as all ones).
    Magic,
    /// Written by an incompatible firmware.
    Version,
    /// Torn or corrupted write.
    Checksum,
}

/// [`ConfigStore`] backed by atomic cells.
///
/// Const-constructible so it can live in a `static`. Every write that
/// changes a value marks the store dirty and wakes
/// [`wait_changed`](Self::wait_changed), so the platform can write the
/// [`image`](Self::to_image) through to non-volatile memory.
pub struct AtomicConfig {
    words: [AtomicU16; WordSlot::COUNT],
    bytes: [AtomicU8; ByteSlot::COUNT],
    dirty: AtomicBool,
    changed: Signal<CriticalSectionRawMutex, ()>,
}

impl AtomicConfig {
    /// A store holding the factory defaults.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            words: [
                AtomicU16::new(DEFAULT_MIN_DEPLOY_TIME),
                AtomicU16::new(DEFAULT_MAX_DEPLOY_TIME),
                AtomicU16::new(0),
            ],
            bytes: [
                AtomicU8::new(DEFAULT_BATTERY_EMPTY_LIMIT),
                AtomicU8::new(DeployMode::Servo.to_raw()),
                AtomicU8::new(DEFAULT_SERVO_CLOSED_POSITION),
                AtomicU8::new(DEFAULT_SERVO_OPEN_POSITION),
                AtomicU8::new(0),
            ],
            dirty: AtomicBool::new(false),
            changed: Signal::new(),
        }
    }

    /// Serialize every slot.
    #[must_use]
    pub fn to_image(&self) -> [u8; CONFIG_IMAGE_LEN] {
        let mut image = [0u8; CONFIG_IMAGE_LEN];
        image[..4].copy_from_slice(&IMAGE_MAGIC);
        image[4] = IMAGE_VERSION;
        for (i, word) in self.words.iter().enumerate() {
            let at = WORDS_AT + 2 * i;
            image[at..at + 2].copy_from_slice(&word.load(Ordering::Acquire).to_le_bytes());
        }
        for (i, byte) in self.bytes.iter().enumerate() {
            image[BYTES_AT + i] = byte.load(Ordering::Acquire);
        }
        image[CRC_AT] = calculate_crc8(&image[..CRC_AT]);
        image
    }

    /// Restore every slot from a stored image.
    ///
    /// Leaves the store untouched on error and never marks it dirty.
    pub fn load_image(&self, image: &[u8; CONFIG_IMAGE_LEN]) -> Result<(), ImageError> {
        if image[..4] != IMAGE_MAGIC {
            return Err(ImageError::Magic);
        }
        if image[4] != IMAGE_VERSION {
            return Err(ImageError::Version);
        }
        if calculate_crc8(&image[..CRC_AT]) != image[CRC_AT] {
            return Err(ImageError::Checksum);
        }
        for (i, word) in self.words.iter().enumerate() {
            let at = WORDS_AT + 2 * i;
            word.store(u16::from_le_bytes([image[at], image[at + 1]]), Ordering::Release);
        }
        for (i, byte) in self.bytes.iter().enumerate() {
            byte.store(image[BYTES_AT + i], Ordering::Release);
        }
        Ok(())
    }

    /// Whether a slot changed since the last call; clears the flag.
    pub fn take_dirty(&self) -> bool {
        self.dirty.swap(false, Ordering::AcqRel)
    }

    /// Wait for a write that changed a slot.
    pub async fn wait_changed(&self) {
        self.changed.wait().await;
    }

    fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
        self.changed.signal(());
    }
}

impl Default for AtomicConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStore for AtomicConfig {
    fn read_u16(&self, slot: WordSlot) -> u16 {
        self.words[slot.index()].load(Ordering::Acquire)
    }

    fn write_u16(&self, slot: WordSlot, value: u16) {
        if self.words[slot.index()].swap(value, Ordering::AcqRel) != value {
            self.mark_dirty();
        }
    }

    fn read_u8(&self, slot: ByteSlot) -> u8 {
        self.bytes[slot.index()].load(Ordering::Acquire)
    }

    fn write_u8(&self, slot: ByteSlot, value: u8) {
        if self.bytes[slot.index()].swap(value, Ordering::AcqRel) != value {
            self.mark_dirty();
        }
    }
}
