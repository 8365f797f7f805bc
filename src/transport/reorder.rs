//! Bounded reorder window for one remote stream.
//!
//! Sequence numbers are unwrapped into a 64-bit space relative to the next
//! expected one. Packets ahead of it wait in a small hold buffer; the W
//! sequences behind it are tracked in two bitmaps (delivered, skipped) the
//! same way an anti-replay window tracks nonces, so a late packet can be told
//! apart from a duplicate without storing it.

use std::collections::BTreeMap;
use std::time::Duration;

use tokio::time::Instant;

use crate::core::MAX_REORDER_WINDOW;

/// Counters kept by a reorder window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReorderStats {
    /// Packets released in order.
    pub delivered: u64,
    /// Sequences skipped and not (yet) recovered.
    pub lost: u64,
    /// Skipped sequences that arrived late and were still delivered.
    pub recovered: u64,
    /// Packets older than the window.
    pub late: u64,
    /// Packets already delivered or held.
    pub duplicates: u64,
}

/// Reorder buffer for one source.
#[derive(Debug)]
pub struct ReorderWindow<T> {
    window: u64,
    hold: Duration,
    /// Next expected unwrapped sequence. `None` until the first packet.
    next: Option<u64>,
    /// Held packets keyed by unwrapped sequence.
    pending: BTreeMap<u64, (Instant, T)>,
    /// Bit i set: sequence `next - 1 - i` was delivered.
    delivered_bits: u64,
    /// Bit i set: sequence `next - 1 - i` was skipped as lost.
    skipped_bits: u64,
    stats: ReorderStats,
}

/// Unwrapped sequences start here so older packets never underflow.
const SEQUENCE_BASE: u64 = 1 << 32;

impl<T> ReorderWindow<T> {
    /// Create a window of `window` sequences (clamped to 1..=64).
    pub fn new(window: usize, hold: Duration) -> Self {
        Self {
            window: window.clamp(1, MAX_REORDER_WINDOW) as u64,
            hold,
            next: None,
            pending: BTreeMap::new(),
            delivered_bits: 0,
            skipped_bits: 0,
            stats: ReorderStats::default(),
        }
    }

    /// Counters so far.
    pub fn stats(&self) -> ReorderStats {
        self.stats
    }

    /// Number of packets waiting for a gap to fill.
    pub fn held(&self) -> usize {
        self.pending.len()
    }

    /// Next expected sequence number.
    pub fn next_expected(&self) -> Option<u16> {
        self.next.map(|next| next as u16)
    }

    /// Offer a packet; returns everything now releasable, in order.
    pub fn push(&mut self, sequence: u16, now: Instant, item: T) -> Vec<T> {
        let Some(next) = self.next else {
            self.next = Some(SEQUENCE_BASE + u64::from(sequence));
            self.advance(true);
            self.stats.delivered += 1;
            return vec![item];
        };

        let delta = i64::from(sequence.wrapping_sub(next as u16) as i16);
        let unwrapped = next.wrapping_add_signed(delta);

        if unwrapped < next {
            return self.accept_old(next - unwrapped, item);
        }

        if self.pending.contains_key(&unwrapped) {
            self.stats.duplicates += 1;
            return Vec::new();
        }
        self.pending.insert(unwrapped, (now, item));
        self.settle(now)
    }

    /// Release packets whose hold time ran out.
    pub fn tick(&mut self, now: Instant) -> Vec<T> {
        self.settle(now)
    }

    /// Release everything held, skipping any gaps.
    pub fn flush(&mut self) -> Vec<T> {
        let mut out = Vec::with_capacity(self.pending.len());
        while let Some((&first, _)) = self.pending.first_key_value() {
            self.skip_to(first);
            out.extend(self.release_contiguous());
        }
        out
    }

    fn accept_old(&mut self, age: u64, item: T) -> Vec<T> {
        if age > self.window {
            self.stats.late += 1;
            return Vec::new();
        }

        let mask = 1u64 << (age - 1);
        if self.delivered_bits & mask != 0 {
            self.stats.duplicates += 1;
            return Vec::new();
        }
        if self.skipped_bits & mask != 0 {
            self.skipped_bits &= !mask;
            self.stats.lost = self.stats.lost.saturating_sub(1);
            self.stats.recovered += 1;
        }
        self.delivered_bits |= mask;
        self.stats.delivered += 1;
        vec![item]
    }

    fn settle(&mut self, now: Instant) -> Vec<T> {
        let mut out = self.release_contiguous();

        while let Some((&first, _)) = self.pending.first_key_value() {
            let Some(next) = self.next else { break };
            let Some((&newest, _)) = self.pending.last_key_value() else {
                break;
            };
            let full = self.pending.len() as u64 >= self.window;
            let too_wide = newest - next >= self.window;
            let expired = self
                .pending
                .values()
                .any(|(held_at, _)| now.saturating_duration_since(*held_at) >= self.hold);

            if !(full || too_wide || expired) {
                break;
            }
            self.skip_to(first);
            out.extend(self.release_contiguous());
        }
        out
    }

    fn release_contiguous(&mut self) -> Vec<T> {
        let mut out = Vec::new();
        while let Some(next) = self.next {
            let Some((_, item)) = self.pending.remove(&next) else {
                break;
            };
            self.advance(true);
            self.stats.delivered += 1;
            out.push(item);
        }
        out
    }

    /// Advance `next` by one, recording whether it was delivered.
    fn advance(&mut self, delivered: bool) {
        self.delivered_bits = (self.delivered_bits << 1) | u64::from(delivered);
        self.skipped_bits = (self.skipped_bits << 1) | u64::from(!delivered);
        if let Some(next) = self.next.as_mut() {
            *next += 1;
        }
    }

    /// Declare every sequence before `target` lost.
    fn skip_to(&mut self, target: u64) {
        let Some(next) = self.next else { return };
        if target <= next {
            return;
        }
        let gap = target - next;
        self.stats.lost += gap;

        if gap >= u64::from(u64::BITS) {
            self.delivered_bits = 0;
            self.skipped_bits = u64::MAX;
        } else {
            self.delivered_bits <<= gap;
            self.skipped_bits = (self.skipped_bits << gap) | ((1u64 << gap) - 1);
        }
        self.next = Some(target);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOLD: Duration = Duration::from_millis(60);

    fn window() -> ReorderWindow<u16> {
        ReorderWindow::new(8, HOLD)
    }

    fn push(w: &mut ReorderWindow<u16>, seq: u16, now: Instant) -> Vec<u16> {
        w.push(seq, now, seq)
    }

    #[test]
    fn test_in_order_delivery() {
        let now = Instant::now();
        let mut w = window();
        for seq in 1..=5 {
            assert_eq!(push(&mut w, seq, now), vec![seq]);
        }
        assert_eq!(w.stats().delivered, 5);
        assert_eq!(w.stats().lost, 0);
    }

    #[test]
    fn test_earlier_packet_after_first() {
        let now = Instant::now();
        let mut w = window();
        assert_eq!(push(&mut w, 10, now), vec![10]);
        assert_eq!(push(&mut w, 8, now), vec![8]);
        assert_eq!(w.stats().delivered, 2);
        assert_eq!(w.stats().recovered, 0);
    }

    #[test]
    fn test_gap_filled_releases_run() {
        let now = Instant::now();
        let mut w = window();
        push(&mut w, 1, now);
        assert!(push(&mut w, 3, now).is_empty());
        assert!(push(&mut w, 4, now).is_empty());
        assert_eq!(w.held(), 2);

        assert_eq!(push(&mut w, 2, now), vec![2, 3, 4]);
        assert_eq!(w.held(), 0);
        assert_eq!(w.stats().lost, 0);
    }

    #[test]
    fn test_hold_timeout_skips_gap() {
        let start = Instant::now();
        let mut w = window();
        push(&mut w, 1, start);
        assert!(push(&mut w, 3, start).is_empty());

        assert!(w.tick(start + Duration::from_millis(30)).is_empty());
        assert_eq!(w.tick(start + HOLD), vec![3]);
        assert_eq!(w.stats().lost, 1);

        // the skipped packet still arrives within the window
        assert_eq!(push(&mut w, 2, start + HOLD), vec![2]);
        assert_eq!(w.stats().lost, 0);
        assert_eq!(w.stats().recovered, 1);
    }

    #[test]
    fn test_wide_gap_skipped() {
        let now = Instant::now();
        let mut w = window();
        push(&mut w, 1, now);

        assert_eq!(push(&mut w, 20, now), vec![20]);
        assert_eq!(w.stats().lost, 18);
        assert_eq!(w.next_expected(), Some(21));
    }

    #[test]
    fn test_full_buffer_skips_gap() {
        let now = Instant::now();
        let mut w: ReorderWindow<u16> = ReorderWindow::new(3, HOLD);
        push(&mut w, 1, now);
        assert!(push(&mut w, 3, now).is_empty());
        assert!(push(&mut w, 4, now).is_empty());
        assert_eq!(push(&mut w, 5, now), vec![3, 4, 5]);
        assert_eq!(w.stats().lost, 1);
    }

    #[test]
    fn test_duplicates_and_late_dropped() {
        let now = Instant::now();
        let mut w = window();
        for seq in 1..=20 {
            push(&mut w, seq, now);
        }
        let before = w.stats();

        assert!(push(&mut w, 20, now).is_empty());
        assert!(push(&mut w, 15, now).is_empty());
        assert!(push(&mut w, 2, now).is_empty());

        let after = w.stats();
        assert_eq!(after.duplicates, before.duplicates + 2);
        assert_eq!(after.late, before.late + 1);
        assert_eq!(after.lost, before.lost);
        assert_eq!(after.delivered, before.delivered);
    }

    #[test]
    fn test_late_packet_does_not_affect_newer_loss() {
        let now = Instant::now();
        let mut w = window();
        push(&mut w, 1, now);
        push(&mut w, 30, now); // skips 2..=29
        let lost = w.stats().lost;

        assert!(push(&mut w, 5, now).is_empty());
        assert_eq!(w.stats().lost, lost);
        assert_eq!(w.stats().late, 1);
        assert_eq!(push(&mut w, 31, now), vec![31]);
    }

    #[test]
    fn test_sequence_wrap() {
        let now = Instant::now();
        let mut w = window();
        push(&mut w, u16::MAX - 1, now);
        assert_eq!(push(&mut w, 0, now), Vec::<u16>::new());
        assert_eq!(push(&mut w, u16::MAX, now), vec![u16::MAX, 0]);
        assert_eq!(push(&mut w, 1, now), vec![1]);
    }

    #[test]
    fn test_flush_releases_held() {
        let now = Instant::now();
        let mut w = window();
        push(&mut w, 1, now);
        push(&mut w, 4, now);
        push(&mut w, 6, now);

        assert_eq!(w.flush(), vec![4, 6]);
        assert_eq!(w.held(), 0);
        assert_eq!(w.stats().lost, 3);
    }
}
