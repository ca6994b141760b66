//! Salt replay detection.
//!
//! A `ReplayGuard` remembers the salts of recently accepted sessions in a
//! ring of bloom filter generations. When a generation fills up the
//! oldest one is cleared and reused, so memory stays bounded while an
//! attacker replaying a captured session within the retention window is
//! still caught.

use std::collections::hash_map::RandomState;
use std::f64::consts::LN_2;
use std::hash::BuildHasher;

use parking_lot::Mutex;

/// Process-wide salt filter shared by every connection of a node.
///
/// `test` and `add` are cheap and take `&self`; a disabled guard (see
/// [`ReplayGuard::disabled`]) never reports a hit.
pub struct ReplayGuard {
    inner: Option<Mutex<BloomRing>>,
}

impl ReplayGuard {
    /// Build a guard that retains roughly `capacity` salts across
    /// `generations` filter generations at the given false positive rate.
    pub fn new(generations: usize, capacity: usize, false_positive_rate: f64) -> Self {
        let generations = generations.max(1);
        let slot_capacity = (capacity / generations).max(1);
        Self {
            inner: Some(Mutex::new(BloomRing::new(
                generations,
                slot_capacity,
                false_positive_rate,
            ))),
        }
    }

    /// A guard that accepts everything.
    pub fn disabled() -> Self {
        Self { inner: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.is_some()
    }

    /// Whether `salt` has been seen within the retention window. Empty
    /// salts (the plain method) are never flagged.
    pub fn test(&self, salt: &[u8]) -> bool {
        if salt.is_empty() {
            return false;
        }
        match &self.inner {
            Some(ring) => ring.lock().test(salt),
            None => false,
        }
    }

    /// Record `salt` as seen.
    pub fn add(&self, salt: &[u8]) {
        if salt.is_empty() {
            return;
        }
        if let Some(ring) = &self.inner {
            ring.lock().add(salt);
        }
    }
}

struct BloomRing {
    slots: Vec<Bloom>,
    active: usize,
    entries: usize,
    slot_capacity: usize,
}

impl BloomRing {
    fn new(generations: usize, slot_capacity: usize, false_positive_rate: f64) -> Self {
        let slots = (0..generations)
            .map(|_| Bloom::new(slot_capacity, false_positive_rate))
            .collect();
        Self {
            slots,
            active: 0,
            entries: 0,
            slot_capacity,
        }
    }

    fn add(&mut self, data: &[u8]) {
        if self.entries >= self.slot_capacity {
            // Rotate into the oldest generation, evicting its contents.
            self.active = (self.active + 1) % self.slots.len();
            self.slots[self.active].clear();
            self.entries = 0;
        }
        self.slots[self.active].add(data);
        self.entries += 1;
    }

    fn test(&self, data: &[u8]) -> bool {
        self.slots.iter().any(|slot| slot.test(data))
    }
}

/// Fixed-size bloom filter using double hashing over two independent
/// `RandomState` seeds.
struct Bloom {
    bits: Vec<u64>,
    bit_count: usize,
    hashes: usize,
    h1: RandomState,
    h2: RandomState,
}

impl Bloom {
    fn new(capacity: usize, false_positive_rate: f64) -> Self {
        let n = capacity.max(1) as f64;
        let p = false_positive_rate.clamp(1e-12, 0.5);

        let bit_count = (((-n * p.ln()) / (LN_2 * LN_2)).ceil() as usize).max(64);
        let hashes = (((bit_count as f64 / n) * LN_2).round() as usize).max(1);

        Self {
            bits: vec![0u64; bit_count.div_ceil(64)],
            bit_count,
            hashes,
            h1: RandomState::new(),
            h2: RandomState::new(),
        }
    }

    fn indices(&self, data: &[u8]) -> (u64, u64) {
        (self.h1.hash_one(data), self.h2.hash_one(data))
    }

    fn add(&mut self, data: &[u8]) {
        let (a, b) = self.indices(data);
        for i in 0..self.hashes {
            let bit = (a.wrapping_add((i as u64).wrapping_mul(b)) % self.bit_count as u64) as usize;
            self.bits[bit / 64] |= 1 << (bit % 64);
        }
    }

    fn test(&self, data: &[u8]) -> bool {
        let (a, b) = self.indices(data);
        (0..self.hashes).all(|i| {
            let bit = (a.wrapping_add((i as u64).wrapping_mul(b)) % self.bit_count as u64) as usize;
            self.bits[bit / 64] & (1 << (bit % 64)) != 0
        })
    }

    fn clear(&mut self) {
        self.bits.fill(0);
    }
}
