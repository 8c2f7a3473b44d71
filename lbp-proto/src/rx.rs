//! Receive-direction link layer.
//!
//! [`RxFramer`] is fed one byte per UART receive event. It strips the
//! delimiters and escapes, accumulates the CRC and hands out a
//! [`Received`] packet once a well-formed frame has been closed.

use crate::crc::Crc8Digest;
use crate::packet::Packet;
use crate::{LinkState, BUFFER_SIZE, ESCAPE, HEADER_LEN, START, STOP};

/// Smallest well-formed frame body: three header bytes plus the CRC.
pub const MIN_FRAME_LEN: usize = HEADER_LEN + 1;

/// Reasons a frame was dropped. The framer is back in `Idle` whenever
/// one of these is returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameError {
    /// `START` seen inside a frame.
    Aborted,
    /// More than [`BUFFER_SIZE`] body bytes.
    Overflow,
    /// Frame closed with fewer than [`MIN_FRAME_LEN`] body bytes.
    Truncated,
    /// Frame closed with a non-zero running CRC.
    Crc,
}

/// A well-formed packet taken off the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Received {
    pub packet: Packet,
    /// Payload bytes, excluding the header and the CRC byte.
    pub payload_len: usize,
}

/// Receive state machine over `Idle`, `Frame` and `Escaping`.
pub struct RxFramer {
    buffer: [u8; BUFFER_SIZE],
    len: usize,
    crc: Crc8Digest,
    state: LinkState,
}

impl RxFramer {
    /// Create a new framer waiting for `START`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: [0u8; BUFFER_SIZE],
            len: 0,
            crc: Crc8Digest::new(),
            state: LinkState::Idle,
        }
    }

    /// Current link state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> LinkState {
        self.state
    }

    /// Drop any partial frame and wait for the next `START`.
    pub fn reset(&mut self) {
        self.state = LinkState::Idle;
    }

    /// Feed one received byte.
    ///
    /// Returns `Ok(Some(_))` when this byte closed a well-formed frame,
    /// `Ok(None)` while nothing is complete, and `Err(_)` when a frame
    /// was dropped.
    pub fn push_byte(&mut self, byte: u8) -> Result<Option<Received>, FrameError> {
        let byte = match self.state {
            LinkState::Escaping => {
                self.state = LinkState::Frame;
                !byte
            }
            LinkState::Frame => match byte {
                ESCAPE => {
                    self.state = LinkState::Escaping;
                    return Ok(None);
                }
                START => {
                    self.state = LinkState::Idle;
                    return Err(FrameError::Aborted);
                }
                STOP => {
                    self.state = LinkState::Idle;
                    return self.close();
                }
                data => data,
            },
            _ => {
                if byte == START {
                    self.len = 0;
                    self.crc.reset();
                    self.state = LinkState::Frame;
                }
                return Ok(None);
            }
        };

        if self.len == BUFFER_SIZE {
            self.state = LinkState::Idle;
            return Err(FrameError::Overflow);
        }

        self.buffer[self.len] = byte;
        self.len += 1;
        self.crc.update(byte);
        Ok(None)
    }

    fn close(&mut self) -> Result<Option<Received>, FrameError> {
        let crc = self.crc.take();
        if self.len < MIN_FRAME_LEN {
            return Err(FrameError::Truncated);
        }
        if crc != 0 {
            return Err(FrameError::Crc);
        }
        Ok(Some(Received {
            packet: Packet::from_bytes(&self.buffer),
            payload_len: self.len - MIN_FRAME_LEN,
        }))
    }
}

impl Default for RxFramer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calculate_crc8;

    fn feed(framer: &mut RxFramer, bytes: &[u8]) -> (usize, Option<Received>, Option<FrameError>) {
        let mut frames = 0;
        let mut last = None;
        let mut error = None;
        for &b in bytes {
            match framer.push_byte(b) {
                Ok(Some(frame)) => {
                    frames += 1;
                    last = Some(frame);
                }
                Ok(None) => {}
                Err(e) => error = Some(e),
            }
        }
        (frames, last, error)
    }

    #[test]
    fn test_receives_plain_frame() {
        let body = [0x80, 0x00, 0x13];
        let crc = calculate_crc8(&body);
        assert!(!crate::needs_escape(crc));
        let mut framer = RxFramer::new();
        let (frames, frame, error) = feed(&mut framer, &[START, 0x80, 0x00, 0x13, crc, STOP]);

        assert_eq!(frames, 1);
        assert_eq!(error, None);
        let frame = frame.unwrap();
        assert_eq!(frame.payload_len, 0);
        assert_eq!(frame.packet.id, 0x13);
        assert_eq!(frame.packet.kind(), crate::PacketKind::Async);
        assert_eq!(framer.state(), LinkState::Idle);
    }

    #[test]
    fn test_unescapes_reserved_bytes() {
        let body = [0x00, 0x00, 0x20, START, STOP];
        let crc = calculate_crc8(&body);
        let mut wire = [START, 0x00, 0x00, 0x20, ESCAPE, !START, ESCAPE, !STOP, 0, 0, 0];
        let mut n = 8;
        if crate::needs_escape(crc) {
            wire[n] = ESCAPE;
            wire[n + 1] = !crc;
            n += 2;
        } else {
            wire[n] = crc;
            n += 1;
        }
        wire[n] = STOP;
        n += 1;

        let mut framer = RxFramer::new();
        let (frames, frame, _) = feed(&mut framer, &wire[..n]);
        assert_eq!(frames, 1);
        let frame = frame.unwrap();
        assert_eq!(frame.payload_len, 2);
        assert_eq!(frame.packet.payload(2), &[START, STOP]);
    }

    #[test]
    fn test_ignores_noise_before_start() {
        let body = [0x00, 0x00, 0x02];
        let crc = calculate_crc8(&body);
        let mut framer = RxFramer::new();
        let (frames, _, error) =
            feed(&mut framer, &[0x00, STOP, ESCAPE, 0xFF, START, 0x00, 0x00, 0x02, crc, STOP]);
        assert_eq!(frames, 1);
        assert_eq!(error, None);
    }

    #[test]
    fn test_bad_crc_is_dropped() {
        let body = [0x00, 0x00, 0x13];
        let crc = calculate_crc8(&body) ^ 0x01;
        let mut framer = RxFramer::new();
        let (frames, _, error) = feed(&mut framer, &[START, 0x00, 0x00, 0x13, crc, STOP]);
        assert_eq!(frames, 0);
        assert_eq!(error, Some(FrameError::Crc));
    }

    #[test]
    fn test_short_frame_is_dropped_even_with_zero_crc() {
        let mut framer = RxFramer::new();
        assert_eq!(feed(&mut framer, &[START, STOP]).2, Some(FrameError::Truncated));

        // [0x00, 0x00, 0x00] has a running CRC of zero but no room for a CRC byte.
        let (frames, _, error) = feed(&mut framer, &[START, 0x00, 0x00, 0x00, STOP]);
        assert_eq!(frames, 0);
        assert_eq!(error, Some(FrameError::Truncated));
    }

    #[test]
    fn test_start_inside_frame_aborts() {
        let body = [0x00, 0x00, 0x02];
        let crc = calculate_crc8(&body);
        let mut framer = RxFramer::new();
        let (frames, _, error) =
            feed(&mut framer, &[START, 0x00, START, 0x00, 0x00, 0x02, crc, STOP]);
        assert_eq!(frames, 0);
        assert_eq!(error, Some(FrameError::Aborted));
        assert_eq!(framer.state(), LinkState::Idle);
    }

    #[test]
    fn test_oversized_frame_is_dropped() {
        let mut framer = RxFramer::new();
        framer.push_byte(START).unwrap();
        for _ in 0..BUFFER_SIZE {
            assert_eq!(framer.push_byte(0x11), Ok(None));
        }
        assert_eq!(framer.push_byte(0x11), Err(FrameError::Overflow));
        assert_eq!(framer.state(), LinkState::Idle);
        // The closing STOP is now just noise.
        assert_eq!(framer.push_byte(STOP), Ok(None));
    }

    #[test]
    fn test_full_buffer_frame_is_accepted() {
        let mut body = [0x33u8; BUFFER_SIZE - 1];
        body[2] = 0x42;
        let crc = calculate_crc8(&body);
        let mut framer = RxFramer::new();
        framer.push_byte(START).unwrap();
        for &b in &body {
            framer.push_byte(b).unwrap();
        }
        if crate::needs_escape(crc) {
            framer.push_byte(ESCAPE).unwrap();
            framer.push_byte(!crc).unwrap();
        } else {
            framer.push_byte(crc).unwrap();
        }
        let frame = framer.push_byte(STOP).unwrap().unwrap();
        assert_eq!(frame.payload_len, crate::MAX_PAYLOAD - 1);
        assert_eq!(frame.packet.id, 0x42);
    }
}
