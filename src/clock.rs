//! Hybrid logical clock packed into the engine's `u64` timestamps.
//!
//! The operation log treats timestamps as opaque monotonic `u64`s chosen
//! by the caller. This module is one way to choose them: a hybrid logical
//! clock whose reading packs wall-clock milliseconds, a logical counter,
//! and a node id into a single `u64`, so that
//!
//! - readings stay monotonic even when the wall clock stalls or steps
//!   backward,
//! - readings from different nodes never collide as long as node ids
//!   differ,
//! - comparing two readings as plain integers respects causality for
//!   events the clock has observed.
//!
//! Layout, most significant first: 48 bits of physical milliseconds,
//! 8 bits of logical counter, 8 bits of node id.
//!
//! # Example
//!
//! ```
//! use crdt_oplog::clock::HybridClock;
//!
//! let mut clock = HybridClock::new(1);
//! let a = clock.now();
//! let b = clock.now();
//! assert!(b > a);
//! ```

const LOGICAL_BITS: u32 = 8;
const NODE_BITS: u32 = 8;
const PHYSICAL_SHIFT: u32 = LOGICAL_BITS + NODE_BITS;
const LOGICAL_MAX: u64 = (1 << LOGICAL_BITS) - 1;
const NODE_MASK: u64 = (1 << NODE_BITS) - 1;

/// Pack the three components into a timestamp.
#[must_use]
pub fn pack(physical_ms: u64, logical: u64, node_id: u8) -> u64 {
    (physical_ms << PHYSICAL_SHIFT) | ((logical & LOGICAL_MAX) << NODE_BITS) | u64::from(node_id)
}

/// Physical milliseconds component of a timestamp.
#[must_use]
pub fn physical(ts: u64) -> u64 {
    ts >> PHYSICAL_SHIFT
}

/// Logical counter component of a timestamp.
#[must_use]
pub fn logical(ts: u64) -> u64 {
    (ts >> NODE_BITS) & LOGICAL_MAX
}

/// Node id component of a timestamp.
#[must_use]
pub fn node_id(ts: u64) -> u8 {
    (ts & NODE_MASK) as u8
}

/// A hybrid logical clock for a single node.
///
/// Call [`now`](HybridClock::now) for local events and
/// [`observe`](HybridClock::observe) when folding in a timestamp received
/// from another replica.
pub struct HybridClock {
    node_id: u8,
    last_physical: u64,
    last_logical: u64,
    /// Wall-clock milliseconds source; swappable for tests.
    time_fn: fn() -> u64,
}

fn system_time_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

impl HybridClock {
    /// Create a clock for the given node, reading `SystemTime`.
    #[must_use]
    pub fn new(node_id: u8) -> Self {
        Self::with_time_source(node_id, system_time_ms)
    }

    /// Create a clock with a custom milliseconds source.
    #[must_use]
    pub fn with_time_source(node_id: u8, time_fn: fn() -> u64) -> Self {
        Self {
            node_id,
            last_physical: 0,
            last_logical: 0,
            time_fn,
        }
    }

    /// Generate a timestamp for a local event.
    ///
    /// Strictly greater than every timestamp this clock has produced or
    /// observed. When the logical counter would overflow within one
    /// millisecond, the physical component is advanced instead.
    pub fn now(&mut self) -> u64 {
        let pt = (self.time_fn)();
        self.tick(pt, 0);
        pack(self.last_physical, self.last_logical, self.node_id)
    }

    /// Fold a remote timestamp into the clock and generate a reading
    /// strictly greater than both it and every local reading so far.
    pub fn observe(&mut self, remote: u64) -> u64 {
        let pt = (self.time_fn)().max(physical(remote));
        let floor = if physical(remote) == pt {
            logical(remote) + 1
        } else {
            0
        };
        self.tick(pt, floor);
        pack(self.last_physical, self.last_logical, self.node_id)
    }

    /// The node id this clock stamps into its readings.
    #[must_use]
    pub fn node_id(&self) -> u8 {
        self.node_id
    }

    fn tick(&mut self, pt: u64, floor: u64) {
        if pt > self.last_physical {
            self.last_physical = pt;
            self.last_logical = floor;
        } else {
            let next = (self.last_logical + 1).max(floor);
            if next > LOGICAL_MAX {
                self.last_physical += 1;
                self.last_logical = 0;
            } else {
                self.last_logical = next;
            }
        }
    }
}
