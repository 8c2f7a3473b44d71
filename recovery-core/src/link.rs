//! Transmit side of the link, shared between reply composers and the
//! transmit-complete path.
//!
//! [`Link::acquire`] hands out a [`TxLease`]: the right to compose one
//! packet. The lease is settled by [`TxLease::send`] or
//! [`TxLease::discard`]; dropping it unsettled discards as well, so a
//! reservation can never leak and wedge the link.

use core::cell::RefCell;
use core::ops::{Deref, DerefMut};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::signal::Signal;
use lbp_proto::{LinkBusy, LinkState, Packet, TxFramer};

/// Transmit framer behind a critical section, plus the wake-up for the
/// UART writer.
///
/// The writer pulls every byte, `START` included, from
/// [`on_tx_complete`](Self::on_tx_complete), so a frame committed while
/// the previous `STOP` is still in the UART goes out after it.
pub struct Link {
    framer: Mutex<CriticalSectionRawMutex, RefCell<TxFramer>>,
    pending: Signal<CriticalSectionRawMutex, ()>,
}

impl Link {
    #[must_use]
    pub fn new() -> Self {
        Self {
            framer: Mutex::new(RefCell::new(TxFramer::new())),
            pending: Signal::new(),
        }
    }

    /// Reserve the transmit buffer, or `None` while it is busy.
    ///
    /// Callers skip their transmission when the link is busy; there is
    /// no retry.
    pub fn acquire(&self) -> Option<TxLease<'_>> {
        let packet = self
            .framer
            .lock(|framer| framer.borrow_mut().acquire().map(|packet| *packet))?;
        Some(TxLease {
            link: self,
            packet,
            settled: false,
        })
    }

    /// Next byte to write once the previous one is out, starting with
    /// `START` for a freshly sent frame. `None` when nothing is queued.
    pub fn on_tx_complete(&self) -> Option<u8> {
        self.framer.lock(|framer| framer.borrow_mut().next_byte())
    }

    /// Wait until a frame has been sent since the last wake-up.
    ///
    /// The frame may already have been drained by then; the writer just
    /// pulls bytes until [`on_tx_complete`](Self::on_tx_complete) runs dry.
    pub async fn wait_pending(&self) {
        self.pending.wait().await;
    }

    /// Non-blocking variant of [`wait_pending`](Self::wait_pending).
    pub fn take_pending(&self) -> bool {
        self.pending.try_take().is_some()
    }

    #[must_use]
    pub fn state(&self) -> LinkState {
        self.framer.lock(|framer| framer.borrow().state())
    }

    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.state() == LinkState::Idle
    }

    fn start(&self, packet: &Packet, payload_len: usize) -> Result<(), LinkBusy> {
        self.framer.lock(|framer| {
            let mut framer = framer.borrow_mut();
            let buffer = framer.packet_mut().ok_or(LinkBusy)?;
            *buffer = *packet;
            framer.send(payload_len)
        })
    }

    fn release(&self) {
        self.framer.lock(|framer| framer.borrow_mut().discard());
    }
}

impl Default for Link {
    fn default() -> Self {
        Self::new()
    }
}

/// Exclusive right to compose and send one packet.
///
/// Dereferences to the packet being composed; `src_info` starts out as a
/// synchronous packet from [`lbp_proto::SOURCE_ADDRESS`].
#[must_use = "dropping a lease discards the packet"]
pub struct TxLease<'a> {
    link: &'a Link,
    packet: Packet,
    settled: bool,
}

impl TxLease<'_> {
    /// Queue the packet with `payload_len` payload bytes for
    /// transmission.
    pub fn send(mut self, payload_len: usize) -> Result<(), LinkBusy> {
        self.settled = true;
        self.link.start(&self.packet, payload_len)?;
        self.link.pending.signal(());
        Ok(())
    }

    /// Give the buffer back without sending.
    pub fn discard(mut self) {
        self.settled = true;
        self.link.release();
    }
}

impl Deref for TxLease<'_> {
    type Target = Packet;

    fn deref(&self) -> &Packet {
        &self.packet
    }
}

impl DerefMut for TxLease<'_> {
    fn deref_mut(&mut self) -> &mut Packet {
        &mut self.packet
    }
}

impl Drop for TxLease<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.link.release();
        }
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use lbp_proto::{RxFramer, START, STOP};
    use std::vec::Vec;

    /// Pull bytes the way the UART writer does.
    fn drain(link: &Link) -> Vec<u8> {
        core::iter::from_fn(|| link.on_tx_complete()).collect()
    }

    #[test]
    fn test_lease_is_exclusive() {
        let link = Link::new();
        let lease = link.acquire().unwrap();
        assert!(link.acquire().is_none());
        assert_eq!(link.state(), LinkState::Filling);
        lease.discard();
        assert!(link.is_idle());
        assert!(link.acquire().is_some());
    }

    #[test]
    fn test_dropped_lease_releases_link() {
        let link = Link::new();
        {
            let mut lease = link.acquire().unwrap();
            lease.id = 0x42;
        }
        assert!(link.is_idle());
        assert!(!link.take_pending());
        assert_eq!(link.on_tx_complete(), None);
    }

    #[test]
    fn test_send_wakes_writer_and_drains() {
        let link = Link::new();
        let mut lease = link.acquire().unwrap();
        lease.id = 0x13;
        lease.data[0] = 0xA6;
        lease.send(1).unwrap();

        assert_eq!(link.state(), LinkState::Starting);
        assert!(link.acquire().is_none());
        assert!(link.take_pending());
        assert!(!link.take_pending());

        let wire = drain(&link);
        assert_eq!(wire[0], START);
        assert!(link.is_idle());

        let mut rx = RxFramer::new();
        let frame = wire
            .iter()
            .find_map(|&b| rx.push_byte(b).unwrap())
            .unwrap();
        assert_eq!(frame.packet.id, 0x13);
        assert_eq!(frame.packet.payload(frame.payload_len), &[0xA6]);
    }

    #[test]
    fn test_reply_committed_after_stop_keeps_its_start() {
        let link = Link::new();
        let mut lease = link.acquire().unwrap();
        lease.id = 0x02;
        lease.send(0).unwrap();

        let mut wire = Vec::new();
        while let Some(byte) = link.on_tx_complete() {
            wire.push(byte);
            if byte == STOP {
                break;
            }
        }
        // STOP is handed out; the link is free while the UART still shifts it.
        assert!(link.is_idle());
        let mut lease = link.acquire().unwrap();
        lease.id = 0x06;
        lease.send(0).unwrap();
        assert_eq!(link.on_tx_complete(), Some(START));
        wire.push(START);
        wire.extend(drain(&link));

        let mut rx = RxFramer::new();
        let ids: Vec<u8> = wire
            .iter()
            .filter_map(|&b| rx.push_byte(b).unwrap())
            .map(|frame| frame.packet.id)
            .collect();
        assert_eq!(ids, [0x02, 0x06]);
    }

    #[test]
    fn test_nothing_to_send_when_idle() {
        let link = Link::new();
        assert_eq!(link.on_tx_complete(), None);
        assert!(!link.take_pending());
    }
}
