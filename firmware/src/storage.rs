//! Calibration persistence in on-board flash.
//!
//! # Flash Layout
//!
//! ```text
//! [Boot2]        0x000000 - 0x000100
//! [Firmware]     0x000100 - 0x1FF000 (see memory.x)
//! [Calibration]  0x1FF000 - 0x200000 (4 KB, last sector)
//! ```
//!
//! Erase and program stall execute-in-place, so every interrupt is
//! masked for the duration of a save (a sector erase takes ~50 ms).
//! Saves only happen after calibration writes, which are ground
//! operations or the final deploy-time log.

use defmt::{info, warn};
use embassy_rp::flash::{Blocking, Error, Flash, ERASE_SIZE, PAGE_SIZE};
use embassy_rp::peripherals::FLASH;
use recovery_core::config::{AtomicConfig, ImageError, CONFIG_IMAGE_LEN};

/// Flash capacity of the board (W25Q16, 2 MB).
pub const FLASH_SIZE: usize = 2 * 1024 * 1024;

/// Offset of the calibration sector from the start of flash.
pub const CONFIG_OFFSET: u32 = (FLASH_SIZE - ERASE_SIZE) as u32;

/// Calibration writes are batched until the store has been quiet this long.
pub const PERSIST_DEBOUNCE_MS: u64 = 500;

/// The calibration sector.
pub struct ConfigFlash {
    flash: Flash<'static, FLASH, Blocking, FLASH_SIZE>,
}

impl ConfigFlash {
    pub fn new(flash: Flash<'static, FLASH, Blocking, FLASH_SIZE>) -> Self {
        Self { flash }
    }

    /// Restore stored calibration into `config`.
    ///
    /// Keeps the factory defaults when the sector is blank or damaged.
    pub fn load(&mut self, config: &AtomicConfig) {
        let mut image = [0u8; CONFIG_IMAGE_LEN];
        if let Err(e) = self.flash.blocking_read(CONFIG_OFFSET, &mut image) {
            warn!("calibration read failed: {:?}", e);
            return;
        }
        match config.load_image(&image) {
            Ok(()) => info!("calibration restored from flash"),
            Err(ImageError::Magic) => info!("no stored calibration, using defaults"),
            Err(e) => warn!("stored calibration rejected ({:?}), using defaults", e),
        }
    }

    /// Erase the sector and write the current image.
    pub fn save(&mut self, config: &AtomicConfig) -> Result<(), Error> {
        let mut page = [0xFF; PAGE_SIZE];
        page[..CONFIG_IMAGE_LEN].copy_from_slice(&config.to_image());

        self.flash
            .blocking_erase(CONFIG_OFFSET, CONFIG_OFFSET + ERASE_SIZE as u32)?;
        self.flash.blocking_write(CONFIG_OFFSET, &page)
    }
}
