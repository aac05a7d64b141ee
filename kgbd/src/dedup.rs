//! Per-channel duplicate suppression.
//!
//! Two windows per channel, both of 100 fingerprints: an ordered set of our
//! own recent deliveries (hooks sometimes fire twice), and an MRU of
//! everything recently said on the channel by anyone (so we do not repeat
//! what another bot or human just announced). A message's fingerprint is a
//! hash of the channel name and the first 100 characters of its first line.

use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet, VecDeque};
use std::hash::{Hash, Hasher};

/// Window capacity for both the seen set and the on-channel MRU.
pub const WINDOW: usize = 100;

/// Characters of the first line that contribute to the fingerprint.
const PREFIX_CHARS: usize = 100;

/// Fingerprint of a message on a channel.
pub fn fingerprint(channel: &str, first_line: &str) -> u64 {
    let prefix: String = first_line.chars().take(PREFIX_CHARS).collect();
    let mut hasher = DefaultHasher::new();
    channel.hash(&mut hasher);
    prefix.hash(&mut hasher);
    hasher.finish()
}

/// Ordered fingerprint set; the oldest entry is evicted at capacity.
#[derive(Debug, Default)]
pub struct SeenSet {
    order: VecDeque<u64>,
    set: HashSet<u64>,
}

impl SeenSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a fingerprint. Returns `false` when it was already present,
    /// in which case the message must be dropped.
    pub fn insert(&mut self, fp: u64) -> bool {
        if self.set.contains(&fp) {
            return false;
        }
        if self.order.len() == WINDOW {
            if let Some(oldest) = self.order.pop_front() {
                self.set.remove(&oldest);
            }
        }
        self.order.push_back(fp);
        self.set.insert(fp);
        true
    }

    pub fn contains(&self, fp: u64) -> bool {
        self.set.contains(&fp)
    }
}

/// MRU of fingerprints seen on-channel; a hit promotes to the front.
#[derive(Debug, Default)]
pub struct MruSet {
    order: VecDeque<u64>,
}

impl MruSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a fingerprint observed on the channel.
    pub fn observe(&mut self, fp: u64) {
        if let Some(pos) = self.order.iter().position(|&f| f == fp) {
            self.order.remove(pos);
        } else if self.order.len() == WINDOW {
            self.order.pop_back();
        }
        self.order.push_front(fp);
    }

    pub fn contains(&self, fp: u64) -> bool {
        self.order.contains(&fp)
    }
}

/// Both windows for every channel of one IRC session.
///
/// Created when the session connects and discarded with it, so state never
/// outlives the connection it was learned on.
#[derive(Debug, Default)]
pub struct SessionDedup {
    seen: HashMap<String, SeenSet>,
    heard: HashMap<String, MruSet>,
}

impl SessionDedup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decide whether a message may go out on `channel`.
    ///
    /// Records the fingerprint as delivered when admitted.
    pub fn admit(&mut self, channel: &str, first_line: &str) -> bool {
        let fp = fingerprint(channel, first_line);
        if self.heard.entry(channel.to_string()).or_default().contains(fp) {
            return false;
        }
        self.seen.entry(channel.to_string()).or_default().insert(fp)
    }

    /// Record a message some speaker (including us) produced on the channel.
    pub fn observe(&mut self, channel: &str, message: &str) {
        let fp = fingerprint(channel, message);
        self.heard.entry(channel.to_string()).or_default().observe(fp);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_delivery_is_suppressed() {
        let mut dedup = SessionDedup::new();
        assert!(dedup.admit("#c", "test alice r1 (A)file"));
        assert!(!dedup.admit("#c", "test alice r1 (A)file"));
    }

    #[test]
    fn channels_are_independent() {
        let mut dedup = SessionDedup::new();
        assert!(dedup.admit("#a", "same line"));
        assert!(dedup.admit("#b", "same line"));
    }

    #[test]
    fn window_holds_one_hundred_and_evicts_oldest() {
        let mut set = SeenSet::new();
        for i in 0..WINDOW as u64 {
            assert!(set.insert(i));
        }
        assert!(set.contains(0));

        // One past capacity evicts the oldest fingerprint only.
        assert!(set.insert(WINDOW as u64));
        assert!(!set.contains(0));
        assert!(set.contains(1));

        // The evicted fingerprint is admissible again.
        assert!(set.insert(0));
    }

    #[test]
    fn fingerprint_ignores_text_past_one_hundred_chars() {
        let head = "z".repeat(100);
        let a = format!("{head}tail-one");
        let b = format!("{head}tail-two");
        assert_eq!(fingerprint("#c", &a), fingerprint("#c", &b));
        assert_ne!(fingerprint("#c", &head), fingerprint("#d", &head));
    }

    #[test]
    fn heard_traffic_blocks_matching_delivery() {
        let mut dedup = SessionDedup::new();
        dedup.observe("#c", "test alice r1 (A)file");
        assert!(!dedup.admit("#c", "test alice r1 (A)file"));
        assert!(dedup.admit("#c", "test alice r2 file"));
    }

    #[test]
    fn mru_promotes_repeated_fingerprints() {
        let mut mru = MruSet::new();
        for i in 0..WINDOW as u64 {
            mru.observe(i);
        }
        // Touch the oldest, then push one more: the promoted entry survives.
        mru.observe(0);
        mru.observe(WINDOW as u64);
        assert!(mru.contains(0));
        assert!(!mru.contains(1));
    }
}
