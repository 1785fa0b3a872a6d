//! Packet Burst Tracker
//!
//! Counts outgoing packets over a trailing 50 ms window (five 10 ms slots)
//! and turns the count into a trust weight for the next RTT sample.
//! Near-simultaneous packets queue on the server and inflate the apparent
//! round trip of any single one of them.
//!
//! | Packets in window | Weight |
//! |-------------------|--------|
//! | 0-1 | 1.0 |
//! | 2 | 0.5 |
//! | 3 | 0.25 |
//! | 4+ | 0.1 |

use tracing::trace;

/// Number of slots in the rolling window
pub const SLOT_COUNT: usize = 5;

/// Duration covered by one slot (seconds)
pub const SLOT_DURATION: f64 = 0.010;

/// Outgoing packet observed by the host
///
/// The payload is not inspected yet; classification by opcode is reserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PacketEvent {
    /// Raw opcode of the outgoing packet
    pub opcode: u16,
}

/// Rolling 50 ms packet counter
#[derive(Debug, Clone, Default)]
pub struct PacketBurstTracker {
    slots: [u32; SLOT_COUNT],
    index: usize,
    elapsed: f64,
}

impl PacketBurstTracker {
    /// Create an empty tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Age the window by `delta_time` seconds
    ///
    /// Rotates once per elapsed slot, so infrequent calls still expire stale
    /// counts.
    pub fn update(&mut self, delta_time: f64) {
        if !delta_time.is_finite() || delta_time <= 0.0 {
            return;
        }

        // Anything beyond a full window clears every slot; cap the loop there.
        self.elapsed = (self.elapsed + delta_time).min(SLOT_DURATION * (SLOT_COUNT + 1) as f64);

        // Tolerance keeps accumulated float error from skipping a rotation.
        while self.elapsed >= SLOT_DURATION - 1e-9 {
            self.elapsed = (self.elapsed - SLOT_DURATION).max(0.0);
            self.index = (self.index + 1) % SLOT_COUNT;
            self.slots[self.index] = 0;
        }
    }

    /// Count one outgoing packet in the current slot
    pub fn record_packet(&mut self, event: PacketEvent) {
        self.slots[self.index] = self.slots[self.index].saturating_add(1);
        trace!(
            "PacketBurstTracker: opcode=0x{:04x} window={}",
            event.opcode,
            self.total_packets_sent()
        );
    }

    /// Packets sent in the trailing window
    pub fn total_packets_sent(&self) -> u32 {
        self.slots.iter().sum()
    }

    /// Trust weight for an RTT sample taken now
    pub fn rtt_weight(&self) -> f64 {
        match self.total_packets_sent() {
            0 | 1 => 1.0,
            2 => 0.5,
            3 => 0.25,
            _ => 0.1,
        }
    }

    /// Zero all slots, the cursor and the timer
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
