//! Fixed-size LBP packet and header field accessors.

use crate::{BUFFER_SIZE, HEADER_LEN, MAX_PAYLOAD, SOURCE_ADDRESS};

/// Mask of the 2-bit type field in `src_info`.
pub const TYPE_MASK: u8 = 0xC0;

/// Mask of the 2-bit sequence field in `dest_info`.
pub const SEQUENCE_MASK: u8 = 0xC0;

/// Mask of the 6-bit address fields.
pub const ADDRESS_MASK: u8 = 0x3F;

/// Packet type, stored in bits 7-6 of `src_info`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum PacketKind {
    /// Command; the peer must answer with a reply.
    Sync = 0x00,
    /// Answer to a synchronous command.
    Reply = 0x40,
    /// Command for which no reply is expected.
    Async = 0x80,
    /// Asynchronous packet relayed to every port.
    Broadcast = 0xC0,
}

impl PacketKind {
    /// Decode the type field of a `src_info` byte.
    #[inline]
    #[must_use]
    pub const fn from_src_info(src_info: u8) -> Self {
        match src_info & TYPE_MASK {
            0x00 => Self::Sync,
            0x40 => Self::Reply,
            0x80 => Self::Async,
            _ => Self::Broadcast,
        }
    }

    /// The type field bits, already shifted into position.
    #[inline]
    #[must_use]
    pub const fn bits(self) -> u8 {
        self as u8
    }

    /// Whether the sender waits for an answer.
    #[inline]
    #[must_use]
    pub const fn is_sync(self) -> bool {
        matches!(self, Self::Sync)
    }
}

/// A 32-byte LBP packet: three header bytes followed by the payload.
///
/// The payload length is not stored; it is implied by the frame length
/// and travels next to the packet (see [`crate::Received`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Packet {
    /// Bits 7-6: [`PacketKind`], bits 5-0: source address.
    pub src_info: u8,
    /// Bits 7-6: sequence number, bits 5-0: destination address.
    pub dest_info: u8,
    /// Message id.
    pub id: u8,
    /// Payload bytes.
    pub data: [u8; MAX_PAYLOAD],
}

impl Packet {
    /// All-zero packet.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            src_info: 0,
            dest_info: 0,
            id: 0,
            data: [0; MAX_PAYLOAD],
        }
    }

    /// Fresh outgoing packet: synchronous type, end-device source address.
    #[must_use]
    pub const fn outgoing() -> Self {
        Self {
            src_info: SOURCE_ADDRESS,
            ..Self::empty()
        }
    }

    /// Rebuild a packet from a raw frame buffer.
    #[must_use]
    pub fn from_bytes(bytes: &[u8; BUFFER_SIZE]) -> Self {
        let mut data = [0u8; MAX_PAYLOAD];
        data.copy_from_slice(&bytes[HEADER_LEN..]);
        Self {
            src_info: bytes[0],
            dest_info: bytes[1],
            id: bytes[2],
            data,
        }
    }

    /// Byte `index` of the packet in wire order.
    ///
    /// Returns 0 for indices past the end of the buffer.
    #[inline]
    #[must_use]
    pub fn byte_at(&self, index: usize) -> u8 {
        match index {
            0 => self.src_info,
            1 => self.dest_info,
            2 => self.id,
            i => self.data.get(i - HEADER_LEN).copied().unwrap_or(0),
        }
    }

    /// Packet type.
    #[inline]
    #[must_use]
    pub const fn kind(&self) -> PacketKind {
        PacketKind::from_src_info(self.src_info)
    }

    /// Replace the type field, keeping the source address.
    #[inline]
    pub fn set_kind(&mut self, kind: PacketKind) {
        self.src_info = (self.src_info & ADDRESS_MASK) | kind.bits();
    }

    /// 6-bit source address.
    #[inline]
    #[must_use]
    pub const fn source(&self) -> u8 {
        self.src_info & ADDRESS_MASK
    }

    /// 6-bit destination address.
    #[inline]
    #[must_use]
    pub const fn destination(&self) -> u8 {
        self.dest_info & ADDRESS_MASK
    }

    /// 2-bit sequence number (0-3).
    #[inline]
    #[must_use]
    pub const fn sequence(&self) -> u8 {
        (self.dest_info & SEQUENCE_MASK) >> 6
    }

    /// `dest_info` for an answer to this packet: back to the sender,
    /// carrying the same sequence number.
    #[inline]
    #[must_use]
    pub const fn reply_dest_info(&self) -> u8 {
        self.source() | (self.dest_info & SEQUENCE_MASK)
    }

    /// The first `len` payload bytes (clamped to the payload size).
    #[inline]
    #[must_use]
    pub fn payload(&self, len: usize) -> &[u8] {
        &self.data[..len.min(MAX_PAYLOAD)]
    }
}

impl Default for Packet {
    fn default() -> Self {
        Self::empty()
    }
}
