//! Transmit-direction link layer.
//!
//! The transmit buffer is shared between whoever composes a packet and
//! the transmit-complete interrupt that drains it, so access is
//! arbitrated by [`LinkState`]:
//!
//! ```text
//! Idle --acquire--> Filling --send--> Starting --> Frame <-> Escaping --> Ending --> Idle
//!                      \--discard--> Idle
//! ```
//!
//! Every wire byte, `START` included, comes out of
//! [`TxFramer::next_byte`], called once per completed transmission. A
//! frame committed right after the previous `STOP` was handed out
//! therefore always follows it on the wire.

use crate::crc::Crc8Digest;
use crate::packet::Packet;
use crate::{needs_escape, LinkState, ESCAPE, HEADER_LEN, MAX_PAYLOAD, START, STOP};

/// The transmit buffer is reserved or a frame is still going out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LinkBusy;

/// Transmit state machine and buffer.
pub struct TxFramer {
    packet: Packet,
    len: usize,
    index: usize,
    crc: Crc8Digest,
    state: LinkState,
    /// Byte whose complement follows the pending `ESCAPE`.
    escaped: u8,
    /// State to return to once the escaped byte is out.
    resume: LinkState,
}

impl TxFramer {
    /// Create an idle framer.
    #[must_use]
    pub fn new() -> Self {
        Self {
            packet: Packet::outgoing(),
            len: 0,
            index: 0,
            crc: Crc8Digest::new(),
            state: LinkState::Idle,
            escaped: 0,
            resume: LinkState::Idle,
        }
    }

    /// Current link state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> LinkState {
        self.state
    }

    /// Whether the buffer can be acquired.
    #[inline]
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.state == LinkState::Idle
    }

    /// Reserve the transmit buffer.
    ///
    /// Moves `Idle` to `Filling` and hands out the packet with `src_info`
    /// set to a synchronous packet from [`crate::SOURCE_ADDRESS`]. Returns
    /// `None` if the buffer is reserved or still being sent; callers skip
    /// their reply in that case rather than retry.
    pub fn acquire(&mut self) -> Option<&mut Packet> {
        if self.state != LinkState::Idle {
            return None;
        }
        self.state = LinkState::Filling;
        self.packet = Packet::outgoing();
        Some(&mut self.packet)
    }

    /// The reserved packet, while in `Filling`.
    pub fn packet_mut(&mut self) -> Option<&mut Packet> {
        match self.state {
            LinkState::Filling => Some(&mut self.packet),
            _ => None,
        }
    }

    /// Commit the reserved packet with `payload_len` payload bytes.
    ///
    /// The next [`next_byte`](Self::next_byte) call yields `START`.
    pub fn send(&mut self, payload_len: usize) -> Result<(), LinkBusy> {
        if self.state != LinkState::Filling {
            return Err(LinkBusy);
        }
        self.len = payload_len.min(MAX_PAYLOAD) + HEADER_LEN;
        self.index = 0;
        self.crc.reset();
        self.state = LinkState::Starting;
        Ok(())
    }

    /// Give up the reservation without transmitting.
    ///
    /// Has no effect on a frame that is already being sent.
    pub fn discard(&mut self) {
        if self.state == LinkState::Filling {
            self.state = LinkState::Idle;
        }
    }

    /// Next byte to transmit after the previous one completed.
    ///
    /// Returns `None` when there is nothing (left) to send.
    pub fn next_byte(&mut self) -> Option<u8> {
        match self.state {
            LinkState::Idle | LinkState::Filling => None,
            LinkState::Starting => {
                self.state = LinkState::Frame;
                Some(START)
            }
            LinkState::Ending => {
                self.state = LinkState::Idle;
                Some(STOP)
            }
            LinkState::Escaping => {
                self.state = self.resume;
                Some(!self.escaped)
            }
            LinkState::Frame if self.index < self.len => {
                let byte = self.packet.byte_at(self.index);
                self.index += 1;
                self.crc.update(byte);
                Some(self.emit(byte, LinkState::Frame))
            }
            LinkState::Frame => {
                let crc = self.crc.take();
                Some(self.emit(crc, LinkState::Ending))
            }
        }
    }

    fn emit(&mut self, byte: u8, next: LinkState) -> u8 {
        if needs_escape(byte) {
            self.escaped = byte;
            self.resume = next;
            self.state = LinkState::Escaping;
            ESCAPE
        } else {
            self.state = next;
            byte
        }
    }
}

impl Default for TxFramer {
    fn default() -> Self {
        Self::new()
    }
}

/// Worst case: START, a full 32-byte body plus the CRC all escaped, STOP.
#[cfg(feature = "heapless")]
pub const MAX_FRAME_LEN: usize = 2 + 2 * (crate::BUFFER_SIZE + 1);

/// Encode `packet` with `payload_len` payload bytes into a complete frame,
/// the way a ground station puts a request on the wire.
///
/// Returns `None` only if the frame would not fit [`MAX_FRAME_LEN`].
#[cfg(feature = "heapless")]
#[must_use]
pub fn encode_frame(packet: &Packet, payload_len: usize) -> Option<heapless::Vec<u8, MAX_FRAME_LEN>> {
    let mut framer = TxFramer::new();
    *framer.acquire()? = *packet;
    framer.send(payload_len).ok()?;

    let mut out = heapless::Vec::new();
    while let Some(byte) = framer.next_byte() {
        out.push(byte).ok()?;
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use crate::rx::{FrameError, Received, RxFramer};
    use crate::{calculate_crc8, PacketKind, BUFFER_SIZE};
    use std::vec::Vec;

    fn drain(framer: &mut TxFramer) -> Vec<u8> {
        core::iter::from_fn(|| framer.next_byte()).collect()
    }

    fn transmit(packet: Packet, payload_len: usize) -> Vec<u8> {
        let mut framer = TxFramer::new();
        *framer.acquire().unwrap() = packet;
        framer.send(payload_len).unwrap();
        let wire = drain(&mut framer);
        assert!(framer.is_idle());
        wire
    }

    fn receive(wire: &[u8]) -> (Vec<Received>, Vec<FrameError>) {
        let mut rx = RxFramer::new();
        let mut frames = Vec::new();
        let mut errors = Vec::new();
        for &b in wire {
            match rx.push_byte(b) {
                Ok(Some(frame)) => frames.push(frame),
                Ok(None) => {}
                Err(e) => errors.push(e),
            }
        }
        (frames, errors)
    }

    /// xorshift32; deterministic filler for property loops.
    fn next_random(state: &mut u32) -> u32 {
        *state ^= *state << 13;
        *state ^= *state >> 17;
        *state ^= *state << 5;
        *state
    }

    /// Bytes biased towards the delimiters and their complements.
    fn delimiter_heavy(state: &mut u32) -> u8 {
        const PICKS: [u8; 8] = [START, STOP, ESCAPE, !START, !STOP, !ESCAPE, 0x00, 0xFF];
        let r = next_random(state);
        if r & 0x100 == 0 {
            PICKS[(r & 0x07) as usize]
        } else {
            r as u8
        }
    }

    #[test]
    fn test_acquire_is_exclusive() {
        let mut framer = TxFramer::new();
        assert!(framer.acquire().is_some());
        assert_eq!(framer.state(), LinkState::Filling);
        assert!(framer.acquire().is_none());

        framer.discard();
        assert!(framer.is_idle());
        assert!(framer.acquire().is_some());
    }

    #[test]
    fn test_acquire_prefills_source() {
        let mut framer = TxFramer::new();
        let packet = framer.acquire().unwrap();
        assert_eq!(packet.src_info, crate::SOURCE_ADDRESS);
        assert_eq!(packet.kind(), PacketKind::Sync);
    }

    #[test]
    fn test_busy_while_sending() {
        let mut framer = TxFramer::new();
        framer.acquire().unwrap();
        framer.send(0).unwrap();
        assert_eq!(framer.state(), LinkState::Starting);
        assert!(framer.acquire().is_none());
        assert_eq!(framer.send(0), Err(LinkBusy));

        // discard() must not cut a frame short
        framer.discard();
        assert_eq!(framer.state(), LinkState::Starting);
        assert_eq!(framer.next_byte(), Some(START));
        framer.discard();
        assert_eq!(framer.state(), LinkState::Frame);
    }

    #[test]
    fn test_send_without_acquire_fails() {
        let mut framer = TxFramer::new();
        assert_eq!(framer.send(1), Err(LinkBusy));
        assert_eq!(framer.next_byte(), None);
    }

    #[test]
    fn test_plain_frame_layout() {
        let mut packet = Packet::outgoing();
        packet.set_kind(PacketKind::Reply);
        packet.dest_info = 0x01;
        packet.id = 0x13;
        packet.data[0] = 0xA6;

        let body = [0x7F, 0x01, 0x13, 0xA6];
        let crc = calculate_crc8(&body);
        let wire = transmit(packet, 1);

        assert_eq!(wire[0], START);
        assert_eq!(&wire[1..5], &body);
        assert_eq!(*wire.last().unwrap(), STOP);
        if needs_escape(crc) {
            assert_eq!(&wire[5..7], &[ESCAPE, !crc]);
        } else {
            assert_eq!(wire[5], crc);
        }
    }

    #[test]
    fn test_frame_sent_after_stop_starts_with_start() {
        let mut framer = TxFramer::new();
        let packet = framer.acquire().unwrap();
        packet.id = 0x02;
        framer.send(0).unwrap();

        let mut wire = Vec::new();
        let mut queued = false;
        while let Some(byte) = framer.next_byte() {
            wire.push(byte);
            if byte == STOP && !queued {
                // STOP is still on its way out when the next frame is committed.
                framer.acquire().unwrap().id = 0x06;
                framer.send(0).unwrap();
                queued = true;
            }
        }

        assert_eq!(wire.iter().filter(|&&b| b == START).count(), 2);
        let (frames, errors) = receive(&wire);
        assert!(errors.is_empty());
        let ids: Vec<u8> = frames.iter().map(|f| f.packet.id).collect();
        assert_eq!(ids, [0x02, 0x06]);
    }

    #[test]
    fn test_delimiters_never_appear_inside_frame() {
        let mut packet = Packet::outgoing();
        packet.id = START;
        packet.data[..3].copy_from_slice(&[STOP, ESCAPE, START]);
        let wire = transmit(packet, 3);

        let inner = &wire[1..wire.len() - 1];
        assert!(!inner.contains(&START));
        assert!(!inner.contains(&STOP));
    }

    #[test]
    fn test_escaped_last_byte_precedes_crc() {
        let mut packet = Packet::outgoing();
        packet.id = 0x20;
        packet.data[0] = 0x01;
        packet.data[1] = STOP;
        let wire = transmit(packet, 2);

        let (frames, errors) = receive(&wire);
        assert!(errors.is_empty());
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].payload_len, 2);
        assert_eq!(frames[0].packet.payload(2), &[0x01, STOP]);
    }

    #[test]
    fn test_roundtrip_every_payload_length() {
        let mut seed = 0x2545_F491;
        for round in 0..16 {
            for len in 0..=crate::MAX_PAYLOAD - 1 {
                let mut packet = Packet::outgoing();
                packet.src_info = delimiter_heavy(&mut seed);
                packet.dest_info = delimiter_heavy(&mut seed);
                packet.id = delimiter_heavy(&mut seed);
                for b in &mut packet.data[..len] {
                    *b = delimiter_heavy(&mut seed);
                }
                let wire = transmit(packet, len);

                assert_eq!(wire[0], START);
                assert_eq!(*wire.last().unwrap(), STOP);
                let inner = &wire[1..wire.len() - 1];
                assert!(!inner.contains(&START) && !inner.contains(&STOP), "round {round} len {len}");

                let (frames, errors) = receive(&wire);
                assert!(errors.is_empty(), "round {round} len {len}");
                assert_eq!(frames.len(), 1);
                let frame = &frames[0];
                assert_eq!(frame.payload_len, len);
                assert_eq!(frame.packet.payload(len), packet.payload(len));
                assert_eq!(
                    (frame.packet.src_info, frame.packet.dest_info, frame.packet.id),
                    (packet.src_info, packet.dest_info, packet.id)
                );
            }
        }
    }

    #[test]
    fn test_oversized_payload_is_clamped() {
        let wire = transmit(Packet::outgoing(), 100);
        assert_eq!(wire.len(), 1 + BUFFER_SIZE + 1 + 1);

        // A full 29-byte payload plus CRC exceeds the receive buffer.
        let (frames, errors) = receive(&wire);
        assert!(frames.is_empty());
        assert_eq!(errors, [FrameError::Overflow]);
    }

    #[cfg(feature = "heapless")]
    #[test]
    fn test_encode_frame_matches_framer() {
        let mut packet = Packet::outgoing();
        packet.id = STOP;
        packet.data[0] = ESCAPE;
        let frame = encode_frame(&packet, 1).unwrap();
        assert_eq!(frame.as_slice(), transmit(packet, 1).as_slice());
    }

    #[cfg(feature = "heapless")]
    #[test]
    fn test_encode_frame_worst_case_fits() {
        // Every body byte is a delimiter and so is the CRC (0x50).
        let mut packet = Packet {
            src_info: START,
            dest_info: START,
            id: START,
            data: [START; crate::MAX_PAYLOAD],
        };
        packet.data[23..].copy_from_slice(&[ESCAPE, ESCAPE, ESCAPE, START, STOP, STOP]);
        let mut body = [0u8; BUFFER_SIZE];
        for (i, b) in body.iter_mut().enumerate() {
            *b = packet.byte_at(i);
        }
        assert_eq!(calculate_crc8(&body), ESCAPE);

        let frame = encode_frame(&packet, crate::MAX_PAYLOAD).unwrap();
        assert_eq!(frame.len(), MAX_FRAME_LEN);
        assert_eq!(frame.first(), Some(&START));
        assert_eq!(frame.last(), Some(&STOP));
        assert_eq!(frame.as_slice(), transmit(packet, crate::MAX_PAYLOAD).as_slice());
    }
}
