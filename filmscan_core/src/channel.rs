//! Lock-free command queue between the receive interrupt and the control loop.
//!
//! Single producer (the I2C receive path), single consumer (the loop).
//! Each slot packs `(code << 16) | param` into one `AtomicU32`, so a slot is
//! published with one store and no `unsafe` is needed. One slot is always kept
//! free to tell "full" from "empty": a channel of capacity `N` holds at most
//! `N - 1` commands.

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use crate::protocol::RawCommand;

pub const DEFAULT_CAPACITY: usize = 20;

pub struct CommandChannel<const N: usize = DEFAULT_CAPACITY> {
    slots: [AtomicU32; N],
    /// Next slot the producer writes.
    write: AtomicUsize,
    /// Next slot the consumer reads.
    read: AtomicUsize,
}

impl<const N: usize> Default for CommandChannel<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> std::fmt::Debug for CommandChannel<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandChannel")
            .field("capacity", &N)
            .field("len", &self.len())
            .finish()
    }
}

#[inline]
fn pack(code: u8, param: u16) -> u32 {
    (u32::from(code) << 16) | u32::from(param)
}

#[inline]
fn unpack(word: u32) -> RawCommand {
    RawCommand {
        code: ((word >> 16) & 0xFF) as u8,
        param: (word & 0xFFFF) as u16,
    }
}

impl<const N: usize> CommandChannel<N> {
    pub fn new() -> Self {
        assert!(N >= 2, "command channel needs at least two slots");
        Self {
            slots: std::array::from_fn(|_| AtomicU32::new(0)),
            write: AtomicUsize::new(0),
            read: AtomicUsize::new(0),
        }
    }

    /// Enqueue without blocking. Returns `false` (and leaves the queue
    /// untouched) when full.
    pub fn push(&self, code: u8, param: u16) -> bool {
        let w = self.write.load(Ordering::Relaxed);
        let next = (w + 1) % N;
        if next == self.read.load(Ordering::Acquire) {
            return false;
        }
        self.slots[w].store(pack(code, param), Ordering::Relaxed);
        self.write.store(next, Ordering::Release);
        true
    }

    /// Dequeue the oldest command, if any.
    pub fn pop(&self) -> Option<RawCommand> {
        let r = self.read.load(Ordering::Relaxed);
        if r == self.write.load(Ordering::Acquire) {
            return None;
        }
        let word = self.slots[r].load(Ordering::Relaxed);
        self.read.store((r + 1) % N, Ordering::Release);
        Some(unpack(word))
    }

    pub fn len(&self) -> usize {
        let w = self.write.load(Ordering::Acquire);
        let r = self.read.load(Ordering::Acquire);
        (w + N - r) % N
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of commands that can be outstanding at once.
    pub const fn usable_capacity(&self) -> usize {
        N - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_round_trips_extremes() {
        for (code, param) in [(0u8, 0u16), (255, 65535), (54, 0xFFFE)] {
            assert_eq!(unpack(pack(code, param)), RawCommand::new(code, param));
        }
    }

    #[test]
    fn wraps_around_the_ring() {
        let ch: CommandChannel<4> = CommandChannel::new();
        for round in 0..10u16 {
            assert!(ch.push(12, round));
            assert!(ch.push(40, round));
            assert_eq!(ch.pop(), Some(RawCommand::new(12, round)));
            assert_eq!(ch.pop(), Some(RawCommand::new(40, round)));
        }
        assert!(ch.is_empty());
    }
}
