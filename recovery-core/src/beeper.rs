//! Audible feedback queue and its per-tick sequencer.
//!
//! Each queued beep sounds for its duration and is followed by a silent
//! gap of the same length, so every entry plays as a 50% duty cycle
//! pattern. Entries play strictly in FIFO order.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;

/// Number of beeps that can be pending at once.
pub const BEEP_QUEUE_CAPACITY: usize = 8;

/// Beep durations, in ticks.
pub const BEEP_SHORT: u8 = 12;
pub const BEEP_NORMAL: u8 = 25;
pub const BEEP_LONG: u8 = 50;
/// Never ends: the on-phase counter wraps before it can exceed 255.
pub const BEEP_FOREVER: u8 = 255;

/// Fixed-capacity ring buffer of beep durations.
#[derive(Debug, Clone)]
pub struct BeepQueue {
    entries: [u8; BEEP_QUEUE_CAPACITY],
    index: usize,
    count: usize,
}

impl BeepQueue {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: [0; BEEP_QUEUE_CAPACITY],
            index: 0,
            count: 0,
        }
    }

    /// Append a beep. Returns `false` and drops it when full.
    pub fn push(&mut self, duration: u8) -> bool {
        if self.count == BEEP_QUEUE_CAPACITY {
            return false;
        }
        self.entries[(self.index + self.count) % BEEP_QUEUE_CAPACITY] = duration;
        self.count += 1;
        true
    }

    #[must_use]
    pub fn front(&self) -> Option<u8> {
        (self.count > 0).then(|| self.entries[self.index])
    }

    pub fn pop(&mut self) -> Option<u8> {
        let front = self.front()?;
        self.index = (self.index + 1) % BEEP_QUEUE_CAPACITY;
        self.count -= 1;
        Some(front)
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.count
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

impl Default for BeepQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BeepPhase {
    Off,
    On,
    /// Silent gap after a beep, as long as the beep itself.
    Cooldown,
}

struct Inner {
    queue: BeepQueue,
    phase: BeepPhase,
    elapsed: u8,
}

impl Inner {
    fn start_beep(&mut self) -> Option<bool> {
        self.phase = BeepPhase::On;
        self.elapsed = 0;
        Some(true)
    }

    fn step(&mut self) -> Option<bool> {
        if self.phase == BeepPhase::Off {
            return if self.queue.is_empty() {
                None
            } else {
                self.start_beep()
            };
        }

        self.elapsed = self.elapsed.wrapping_add(1);
        let Some(duration) = self.queue.front() else {
            self.phase = BeepPhase::Off;
            return Some(false);
        };
        if self.elapsed <= duration {
            return None;
        }

        match self.phase {
            BeepPhase::On => {
                self.phase = BeepPhase::Cooldown;
                self.elapsed = 0;
                Some(false)
            }
            _ => {
                self.queue.pop();
                if self.queue.is_empty() {
                    self.phase = BeepPhase::Off;
                    None
                } else {
                    self.start_beep()
                }
            }
        }
    }
}

/// Beep queue shared between producers and the tick consumer.
///
/// [`enqueue`](Self::enqueue) may be called from any context; the
/// queue is only ever touched inside a critical section.
pub struct BeepSequencer {
    inner: Mutex<CriticalSectionRawMutex, RefCell<Inner>>,
}

impl BeepSequencer {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(RefCell::new(Inner {
                queue: BeepQueue::new(),
                phase: BeepPhase::Off,
                elapsed: 0,
            })),
        }
    }

    /// Queue a beep of `duration` ticks. Silently dropped when the
    /// queue is full.
    pub fn enqueue(&self, duration: u8) {
        let queued = self.inner.lock(|inner| inner.borrow_mut().queue.push(duration));
        if !queued {
            trace!("beep queue full, dropping {=u8}", duration);
        }
    }

    /// Beeps queued, including the one playing.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.lock(|inner| inner.borrow().queue.len())
    }

    #[must_use]
    pub fn phase(&self) -> BeepPhase {
        self.inner.lock(|inner| inner.borrow().phase)
    }

    /// Advance one tick. Returns the new buzzer level if it changed.
    pub fn tick(&self) -> Option<bool> {
        self.inner.lock(|inner| inner.borrow_mut().step())
    }
}

impl Default for BeepSequencer {
    fn default() -> Self {
        Self::new()
    }
}
