//! Launch box protocol (LBP): link-layer framing, CRC and packet types.
//!
//! This crate contains everything needed to put LBP packets on a byte
//! stream and take them off again, without any knowledge of the device
//! that answers them:
//!
//! - **Framing**: [`RxFramer`] turns received bytes into CRC-checked
//!   packets, [`TxFramer`] turns a reserved packet back into wire bytes
//!   one byte per transmit-complete event, `START` included.
//! - **Packets**: [`Packet`] (fixed 32-byte record) and [`PacketKind`]
//!   (the 2-bit type field).
//! - **Message ids**: [`MessageId`] splits raw ids into the reserved
//!   protocol range and the application range.
//! - **CRC**: [`calculate_crc8`] and the running [`Crc8Digest`].
//!
//! # Wire format
//!
//! ```text
//! 0x55  START
//! ...   srcinfo, destinfo, id, payload (escaped)
//! ...   CRC-8 over srcinfo..payload (escaped)
//! 0x5A  STOP
//! ```
//!
//! Any `START`, `STOP` or `ESCAPE` byte inside the frame is sent as
//! `ESCAPE` followed by the ones' complement of the original byte.
//!
//! # Example
//!
//! ```
//! use lbp_proto::{RxFramer, TxFramer, PacketKind};
//!
//! let mut tx = TxFramer::new();
//! let packet = tx.acquire().unwrap();
//! packet.id = 0x13;
//! tx.send(0).unwrap();
//!
//! let mut rx = RxFramer::new();
//! let mut received = None;
//! while let Some(byte) = tx.next_byte() {
//!     if let Some(frame) = rx.push_byte(byte).unwrap() {
//!         received = Some(frame);
//!     }
//! }
//!
//! let frame = received.unwrap();
//! assert_eq!(frame.packet.id, 0x13);
//! assert_eq!(frame.packet.kind(), PacketKind::Sync);
//! assert_eq!(frame.payload_len, 0);
//! ```
//!
//! # Features
//!
//! - **`std`**: Enable standard library support (for host testing)
//! - **`defmt`**: Enable defmt formatting (for embedded logging)
//! - **`heapless`**: Enable [`encode_frame()`] for whole-frame encoding
//!
//! # No-std Support
//!
//! This crate is `#![no_std]` by default and uses no heap allocations.

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(feature = "std")]
extern crate std;

pub mod crc;
pub mod message;
pub mod packet;
pub mod rx;
pub mod tx;

pub use crc::{calculate_crc8, Crc8Digest};
pub use message::{MessageId, ReservedCommand};
pub use packet::{Packet, PacketKind};
pub use rx::{FrameError, Received, RxFramer};
pub use tx::{LinkBusy, TxFramer};

#[cfg(feature = "heapless")]
pub use tx::{encode_frame, MAX_FRAME_LEN};

/// Start-of-frame delimiter.
pub const START: u8 = 0x55;

/// End-of-frame delimiter.
pub const STOP: u8 = 0x5A;

/// Escape marker; the following byte is the complement of the original.
pub const ESCAPE: u8 = 0x50;

/// Size of the receive and transmit packet buffers.
pub const BUFFER_SIZE: usize = 32;

/// srcinfo, destinfo and id.
pub const HEADER_LEN: usize = 3;

/// Largest payload a packet can carry.
pub const MAX_PAYLOAD: usize = BUFFER_SIZE - HEADER_LEN;

/// Source address used by end devices; routers rewrite it on the way.
pub const SOURCE_ADDRESS: u8 = 0x3F;

/// Link-layer state, one instance per direction.
///
/// `Idle`, `Frame`, `Escaping` and `Ending` track the byte stream.
/// `Filling` and `Starting` are transmit-only: the buffer is reserved by
/// the application, or committed with `START` not yet handed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkState {
    #[default]
    Idle,
    Frame,
    Escaping,
    Ending,
    Filling,
    Starting,
}

/// Returns `true` if `byte` collides with a delimiter and must be escaped.
#[inline]
#[must_use]
pub const fn needs_escape(byte: u8) -> bool {
    matches!(byte, START | STOP | ESCAPE)
}
