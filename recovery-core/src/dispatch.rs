//! Packet dispatch: answers reserved protocol commands and forwards
//! application commands to a [`CommandHandler`].
//!
//! Runs in interrupt context, once per received frame. Nothing here
//! blocks; a reply is composed in place and handed to the transmit link,
//! which sends it byte by byte afterwards.

use lbp_proto::message::{
    EXTENDED_IDENTIFY, IDENTIFY, IDENTIFY_ASYNC_REPLY, NACK, STATUS_REQUEST,
    STATUS_REQUEST_ASYNC_REPLY,
};
use lbp_proto::{FrameError, MessageId, Packet, PacketKind, ReservedCommand, RxFramer};

use crate::flight::FlightStatus;
use crate::link::TxLease;
use crate::shared::SharedState;

/// Identify reply payload.
pub const IDENTIFY_CONTENT: [u8; 2] = [0xB0, 0x01];
/// Extended identify, page 0.
pub const EXTENDED_IDENTIFY_CONTENT: [u8; 2] = [0x0B, 0x00];
/// Extended identify, page 1. Sent one byte short; peers expect that.
pub const DEVICE_NAME: &[u8] = b"SRP V0.0 ";
/// Extended identify pages from here on are reserved.
pub const RESERVED_PAGES: u8 = 0x10;

const STATUS_BASE: u8 = 0x10;
const STATUS_ERROR: u8 = 0x04;
const STATUS_ARMED: u8 = 0x01;

/// Handler for application commands (id `0x10` and up).
///
/// Called for synchronous requests only, with a reply whose type,
/// destination and source are already filled in. The handler sets the
/// id and payload and settles the lease.
pub trait CommandHandler {
    fn handle(&mut self, request: &Packet, payload_len: usize, reply: TxLease<'_>);
}

impl<H: CommandHandler + ?Sized> CommandHandler for &mut H {
    fn handle(&mut self, request: &Packet, payload_len: usize, reply: TxLease<'_>) {
        (**self).handle(request, payload_len, reply);
    }
}

/// What became of a received packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Disposition {
    /// A reserved command was answered.
    Replied,
    /// Handed to the application handler.
    Forwarded,
    /// Intentionally ignored.
    Dropped,
    /// The transmit buffer was taken; the packet was not processed.
    Busy,
}

/// Status request payload byte.
#[must_use]
pub fn status_byte(status: &FlightStatus) -> u8 {
    let mut byte = STATUS_BASE;
    if status.is_error() {
        byte |= STATUS_ERROR;
    }
    if status.is_armed() {
        byte |= STATUS_ARMED;
    }
    byte
}

/// Process one validated packet.
pub fn dispatch<H: CommandHandler + ?Sized>(
    request: &Packet,
    payload_len: usize,
    shared: &SharedState,
    handler: &mut H,
) -> Disposition {
    let Some(mut reply) = shared.link.acquire() else {
        warn!("link busy, ignoring id {=u8:#x}", request.id);
        return Disposition::Busy;
    };
    reply.dest_info = request.reply_dest_info();

    let kind = request.kind();
    if kind == PacketKind::Reply {
        reply.discard();
        return Disposition::Dropped;
    }
    let sync = kind.is_sync();
    reply.set_kind(if sync {
        PacketKind::Reply
    } else {
        PacketKind::Async
    });

    match MessageId::from(request.id) {
        MessageId::Reserved(command) => {
            trace!("reserved {} sync={}", command, sync);
            reserved(command, request, payload_len, sync, &shared.status, reply)
        }
        MessageId::Application(_) if sync => {
            handler.handle(request, payload_len, reply);
            Disposition::Forwarded
        }
        MessageId::Application(_) => {
            reply.discard();
            Disposition::Dropped
        }
    }
}

fn reserved(
    command: ReservedCommand,
    request: &Packet,
    payload_len: usize,
    sync: bool,
    status: &FlightStatus,
    mut reply: TxLease<'_>,
) -> Disposition {
    match command {
        ReservedCommand::Nack => drop_reply(reply),
        ReservedCommand::Identify => {
            reply.id = if sync { IDENTIFY } else { IDENTIFY_ASYNC_REPLY };
            reply.data[..IDENTIFY_CONTENT.len()].copy_from_slice(&IDENTIFY_CONTENT);
            send(reply, IDENTIFY_CONTENT.len())
        }
        ReservedCommand::ExtendedIdentify if sync => {
            let page = if payload_len == 0 { 0 } else { request.data[0] };
            if page >= RESERVED_PAGES {
                return nack(reply);
            }
            reply.id = EXTENDED_IDENTIFY;
            match page {
                0 => {
                    reply.data[..2].copy_from_slice(&EXTENDED_IDENTIFY_CONTENT);
                    send(reply, 2)
                }
                1 => {
                    reply.data[..DEVICE_NAME.len()].copy_from_slice(DEVICE_NAME);
                    send(reply, DEVICE_NAME.len() - 1)
                }
                _ => send(reply, 0),
            }
        }
        ReservedCommand::StatusRequest => {
            reply.id = if sync {
                STATUS_REQUEST
            } else {
                STATUS_REQUEST_ASYNC_REPLY
            };
            reply.data[0] = status_byte(status);
            send(reply, 1)
        }
        ReservedCommand::ExtendedIdentify
        | ReservedCommand::NetworkDiscovery
        | ReservedCommand::Unrecognized(_) => {
            if sync {
                nack(reply)
            } else {
                drop_reply(reply)
            }
        }
    }
}

/// Answer with an empty Nack.
pub fn nack(mut reply: TxLease<'_>) -> Disposition {
    reply.id = NACK;
    send(reply, 0)
}

fn send(reply: TxLease<'_>, payload_len: usize) -> Disposition {
    match reply.send(payload_len) {
        Ok(()) => Disposition::Replied,
        Err(_) => Disposition::Busy,
    }
}

fn drop_reply(reply: TxLease<'_>) -> Disposition {
    reply.discard();
    Disposition::Dropped
}

/// Receive side of the link: frames incoming bytes and dispatches each
/// complete packet.
pub struct Endpoint {
    rx: RxFramer,
}

impl Endpoint {
    #[must_use]
    pub fn new() -> Self {
        Self { rx: RxFramer::new() }
    }

    /// Feed one received byte. Returns the dispatch result when the byte
    /// completed a valid frame.
    pub fn on_byte<H: CommandHandler + ?Sized>(
        &mut self,
        byte: u8,
        shared: &SharedState,
        handler: &mut H,
    ) -> Option<Disposition> {
        match self.rx.push_byte(byte) {
            Ok(Some(frame)) => Some(dispatch(&frame.packet, frame.payload_len, shared, handler)),
            Ok(None) => None,
            Err(err) => {
                log_frame_error(err);
                None
            }
        }
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Self::new()
    }
}

fn log_frame_error(err: FrameError) {
    match err {
        FrameError::Crc => warn!("frame dropped: bad CRC"),
        other => debug!("frame dropped: {}", other),
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use crate::flight::FlightState;
    use lbp_proto::{LinkState, START};
    use std::vec::Vec;

    /// Records forwarded requests and answers with a fixed byte.
    #[derive(Default)]
    struct Recorder {
        seen: Vec<(u8, usize)>,
    }

    impl CommandHandler for Recorder {
        fn handle(&mut self, request: &Packet, payload_len: usize, mut reply: TxLease<'_>) {
            self.seen.push((request.id, payload_len));
            reply.id = request.id;
            reply.data[0] = 0xEE;
            let _ = reply.send(1);
        }
    }

    fn request(src_info: u8, id: u8, payload: &[u8]) -> (Packet, usize) {
        let mut packet = Packet::empty();
        packet.src_info = src_info;
        packet.dest_info = 0x00;
        packet.id = id;
        packet.data[..payload.len()].copy_from_slice(payload);
        (packet, payload.len())
    }

    /// Drain the link and decode whatever was sent.
    fn sent(shared: &SharedState) -> Option<(Packet, usize)> {
        if !shared.link.take_pending() {
            return None;
        }
        assert_eq!(shared.link.state(), LinkState::Starting);
        let mut rx = RxFramer::new();
        let mut out = None;
        while let Some(byte) = shared.on_tx_complete() {
            if let Some(frame) = rx.push_byte(byte).unwrap() {
                out = Some((frame.packet, frame.payload_len));
            }
        }
        out
    }

    fn run(src_info: u8, id: u8, payload: &[u8]) -> (Disposition, Option<(Packet, usize)>) {
        let shared = SharedState::new();
        let mut handler = Recorder::default();
        let (packet, len) = request(src_info, id, payload);
        let result = dispatch(&packet, len, &shared, &mut handler);
        assert!(handler.seen.is_empty());
        let reply = sent(&shared);
        assert!(shared.link.is_idle());
        (result, reply)
    }

    #[test]
    fn test_sync_identify() {
        let (result, reply) = run(0x05, IDENTIFY, &[]);
        assert_eq!(result, Disposition::Replied);
        let (packet, len) = reply.unwrap();
        assert_eq!(packet.id, IDENTIFY);
        assert_eq!(packet.kind(), PacketKind::Reply);
        assert_eq!(packet.source(), lbp_proto::SOURCE_ADDRESS);
        assert_eq!(packet.payload(len), &IDENTIFY_CONTENT);
    }

    #[test]
    fn test_async_identify() {
        let (result, reply) = run(0x85, IDENTIFY, &[]);
        assert_eq!(result, Disposition::Replied);
        let (packet, len) = reply.unwrap();
        assert_eq!(packet.id, IDENTIFY_ASYNC_REPLY);
        assert_eq!(packet.kind(), PacketKind::Async);
        assert_eq!(len, 2);
    }

    #[test]
    fn test_reply_addressed_to_sender() {
        let shared = SharedState::new();
        let (mut packet, len) = request(0x05, IDENTIFY, &[]);
        packet.dest_info = 0x80 | 0x3F;
        dispatch(&packet, len, &shared, &mut Recorder::default());
        let (reply, _) = sent(&shared).unwrap();
        assert_eq!(reply.destination(), 0x05);
        assert_eq!(reply.sequence(), 2);
    }

    #[test]
    fn test_extended_identify_pages() {
        let (_, reply) = run(0x00, EXTENDED_IDENTIFY, &[]);
        let (packet, len) = reply.unwrap();
        assert_eq!(packet.id, EXTENDED_IDENTIFY);
        assert_eq!(packet.payload(len), &EXTENDED_IDENTIFY_CONTENT);

        let (_, reply) = run(0x00, EXTENDED_IDENTIFY, &[0x00]);
        assert_eq!(reply.unwrap().1, 2);

        let (_, reply) = run(0x00, EXTENDED_IDENTIFY, &[0x05]);
        let (packet, len) = reply.unwrap();
        assert_eq!(packet.id, EXTENDED_IDENTIFY);
        assert_eq!(len, 0);

        let (_, reply) = run(0x00, EXTENDED_IDENTIFY, &[0x10]);
        let (packet, len) = reply.unwrap();
        assert_eq!(packet.id, NACK);
        assert_eq!(len, 0);
    }

    #[test]
    fn test_extended_identify_name_drops_last_byte() {
        let (_, reply) = run(0x00, EXTENDED_IDENTIFY, &[0x01]);
        let (packet, len) = reply.unwrap();
        assert_eq!(len, DEVICE_NAME.len() - 1);
        assert_eq!(packet.payload(len), b"SRP V0.0");
    }

    #[test]
    fn test_extended_identify_async_dropped() {
        let (result, reply) = run(0x80, EXTENDED_IDENTIFY, &[0x01]);
        assert_eq!(result, Disposition::Dropped);
        assert!(reply.is_none());
    }

    #[test]
    fn test_network_discovery() {
        let (_, reply) = run(0x00, 0x04, &[]);
        assert_eq!(reply.unwrap().0.id, NACK);

        let (result, reply) = run(0x80, 0x04, &[]);
        assert_eq!(result, Disposition::Dropped);
        assert!(reply.is_none());
    }

    #[test]
    fn test_unrecognized_reserved() {
        let (_, reply) = run(0x00, 0x0A, &[1, 2]);
        let (packet, len) = reply.unwrap();
        assert_eq!((packet.id, len), (NACK, 0));
        assert_eq!(packet.kind(), PacketKind::Reply);

        let (result, reply) = run(0xC0, 0x0A, &[]);
        assert_eq!(result, Disposition::Dropped);
        assert!(reply.is_none());
    }

    #[test]
    fn test_received_nack_and_replies_dropped() {
        for (src_info, id) in [(0x00, NACK), (0x80, NACK), (0x40, IDENTIFY), (0x40, 0x13)] {
            let (result, reply) = run(src_info, id, &[]);
            assert_eq!(result, Disposition::Dropped);
            assert!(reply.is_none());
        }
    }

    #[test]
    fn test_status_request() {
        let shared = SharedState::new();
        let (packet, len) = request(0x00, STATUS_REQUEST, &[]);

        shared.status.publish(FlightState::Idle);
        dispatch(&packet, len, &shared, &mut Recorder::default());
        let (reply, _) = sent(&shared).unwrap();
        assert_eq!(reply.data[0], 0x10);

        shared.status.publish(FlightState::Error);
        dispatch(&packet, len, &shared, &mut Recorder::default());
        assert_eq!(sent(&shared).unwrap().0.data[0], 0x14);

        shared.status.publish(FlightState::Armed);
        dispatch(&packet, len, &shared, &mut Recorder::default());
        assert_eq!(sent(&shared).unwrap().0.data[0], 0x11);

        let (packet, len) = request(0x80, STATUS_REQUEST, &[]);
        dispatch(&packet, len, &shared, &mut Recorder::default());
        let (reply, len) = sent(&shared).unwrap();
        assert_eq!((reply.id, len), (STATUS_REQUEST_ASYNC_REPLY, 1));
    }

    #[test]
    fn test_application_commands_forwarded_when_sync() {
        let shared = SharedState::new();
        let mut handler = Recorder::default();

        let (packet, len) = request(0x00, 0x24, &[0x99]);
        assert_eq!(dispatch(&packet, len, &shared, &mut handler), Disposition::Forwarded);
        let (reply, _) = sent(&shared).unwrap();
        assert_eq!(reply.kind(), PacketKind::Reply);
        assert_eq!(reply.data[0], 0xEE);

        let (packet, len) = request(0x80, 0x24, &[0x99]);
        assert_eq!(dispatch(&packet, len, &shared, &mut handler), Disposition::Dropped);
        assert_eq!(handler.seen, [(0x24, 1)]);
    }

    #[test]
    fn test_busy_link_skips_packet() {
        let shared = SharedState::new();
        let mut handler = Recorder::default();
        let held = shared.link.acquire().unwrap();

        let (packet, len) = request(0x00, 0x13, &[]);
        assert_eq!(dispatch(&packet, len, &shared, &mut handler), Disposition::Busy);
        assert!(handler.seen.is_empty());
        assert_eq!(shared.link.state(), LinkState::Filling);
        drop(held);
        assert!(shared.link.is_idle());
    }

    #[test]
    fn test_endpoint_ignores_bad_frames() {
        let shared = SharedState::new();
        let mut handler = Recorder::default();
        let mut endpoint = Endpoint::new();

        // wrong CRC, then too short
        for &byte in &[START, 0x00, 0x00, 0x02, 0x00, 0x5A, START, 0x00, 0x5A] {
            assert_eq!(endpoint.on_byte(byte, &shared, &mut handler), None);
        }
        assert!(shared.link.is_idle());
        assert!(!shared.link.take_pending());
    }
}
