//! Segment model and range planning.
//!
//! A task's byte range [0, total) is partitioned into non-overlapping
//! segments; each segment tracks its own received count and status so a
//! paused or crashed transfer resumes mid-segment instead of from zero.

use serde::{Deserialize, Serialize};

/// Transfer state of a single segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SegmentStatus {
    /// Planned, no worker assigned yet.
    Pending,
    /// A worker is transferring this segment.
    Active,
    /// Fully received. Done segments are immutable.
    Done,
    /// Last attempt failed; eligible for retry.
    Failed,
}

/// A single segment: byte range [start, end) (half-open) plus progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    /// Start offset (inclusive).
    pub start: u64,
    /// End offset (exclusive).
    pub end: u64,
    /// Bytes received so far, counted from `start`.
    pub received: u64,
    /// Current transfer state.
    pub status: SegmentStatus,
}

impl Segment {
    /// New pending segment covering [start, end).
    pub fn new(start: u64, end: u64) -> Self {
        Segment {
            start,
            end,
            received: 0,
            status: SegmentStatus::Pending,
        }
    }

    /// Length of this segment in bytes.
    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    /// True when the range is empty.
    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    /// Bytes still missing.
    pub fn remaining(&self) -> u64 {
        self.len().saturating_sub(self.received)
    }

    /// Absolute offset the next ranged request should start from.
    pub fn resume_offset(&self) -> u64 {
        self.start + self.received
    }

    /// True once every byte of the range has been received.
    pub fn is_done(&self) -> bool {
        self.status == SegmentStatus::Done
    }

    /// HTTP Range header value for the unfetched tail: `bytes=offset-(end-1)`.
    pub fn range_header_value(&self) -> String {
        if self.resume_offset() >= self.end {
            "bytes=0-0".to_string()
        } else {
            format!("bytes={}-{}", self.resume_offset(), self.end - 1)
        }
    }
}

/// Ordered, non-overlapping segment set covering [0, total).
///
/// Serialized to JSON for the queue database so progress survives
/// restarts at byte granularity.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SegmentTable {
    total: u64,
    segments: Vec<Segment>,
}

impl SegmentTable {
    /// Plans `count` segments over [0, total), as equal as possible.
    ///
    /// The remainder is spread one byte at a time over the leading
    /// segments. Returns an empty table if `total` or `count` is 0.
    pub fn plan(total: u64, count: usize) -> Self {
        if total == 0 || count == 0 {
            return SegmentTable {
                total,
                segments: Vec::new(),
            };
        }
        let count = (count as u64).min(total);
        let base = total / count;
        let remainder = total % count;

        let mut segments = Vec::with_capacity(count as usize);
        let mut offset = 0u64;
        for i in 0..count {
            let len = base + if i < remainder { 1 } else { 0 };
            let end = (offset + len).min(total);
            segments.push(Segment::new(offset, end));
            offset = end;
        }
        SegmentTable { total, segments }
    }

    /// Single segment covering the whole resource (servers without
    /// Range support degrade to this).
    pub fn single(total: u64) -> Self {
        SegmentTable::plan(total, 1)
    }

    /// Total resource size this table covers.
    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Sum of received bytes across all segments.
    ///
    /// This is the task's `bytes_done`; the two must never diverge.
    pub fn bytes_done(&self) -> u64 {
        self.segments.iter().map(|s| s.received).sum()
    }

    /// True when every segment is done (empty table counts as done).
    pub fn all_done(&self) -> bool {
        self.segments.iter().all(|s| s.is_done())
    }

    /// Indices and copies of segments that still have bytes missing.
    pub fn incomplete(&self) -> Vec<(usize, Segment)> {
        self.segments
            .iter()
            .enumerate()
            .filter(|(_, s)| !s.is_done())
            .map(|(i, s)| (i, *s))
            .collect()
    }

    /// Records `delta` received bytes for segment `index`, clamped to the
    /// segment length. Marks the segment done once complete.
    pub fn record_received(&mut self, index: usize, delta: u64) {
        if let Some(s) = self.segments.get_mut(index) {
            if s.status == SegmentStatus::Done {
                return;
            }
            s.received = (s.received + delta).min(s.len());
            if s.received == s.len() {
                s.status = SegmentStatus::Done;
            }
        }
    }

    pub fn mark_active(&mut self, index: usize) {
        if let Some(s) = self.segments.get_mut(index) {
            if s.status != SegmentStatus::Done {
                s.status = SegmentStatus::Active;
            }
        }
    }

    pub fn mark_done(&mut self, index: usize) {
        if let Some(s) = self.segments.get_mut(index) {
            s.received = s.len();
            s.status = SegmentStatus::Done;
        }
    }

    pub fn mark_failed(&mut self, index: usize) {
        if let Some(s) = self.segments.get_mut(index) {
            if s.status != SegmentStatus::Done {
                s.status = SegmentStatus::Failed;
            }
        }
    }

    /// Demotes Active/Failed segments back to Pending. Called when a task
    /// is paused so no segment claims a live worker across a restart.
    pub fn release_workers(&mut self) {
        for s in &mut self.segments {
            if s.status == SegmentStatus::Active || s.status == SegmentStatus::Failed {
                s.status = SegmentStatus::Pending;
            }
        }
    }

    /// Re-splits only the unfetched remainder across `active_count` new
    /// segments. Received prefixes of partially-transferred segments are
    /// frozen as done sub-segments; completed bytes are never re-fetched.
    ///
    /// Disjoint unfetched gaps cannot be merged, so when `active_count`
    /// is smaller than the number of gaps each gap still gets one
    /// segment. Extra segments go to the gaps with the most bytes left
    /// per piece.
    pub fn resplit_remaining(&mut self, active_count: usize) {
        let mut done: Vec<Segment> = Vec::new();
        let mut gaps: Vec<(u64, u64)> = Vec::new();

        for s in &self.segments {
            if s.received > 0 {
                let mut frozen = *s;
                frozen.end = s.start + s.received;
                frozen.received = frozen.len();
                frozen.status = SegmentStatus::Done;
                done.push(frozen);
            }
            if s.received < s.len() {
                let gap_start = s.start + s.received;
                // Merge with the previous gap when contiguous.
                match gaps.last_mut() {
                    Some(last) if last.1 == gap_start => last.1 = s.end,
                    _ => gaps.push((gap_start, s.end)),
                }
            }
        }

        if gaps.is_empty() {
            self.segments = done;
            return;
        }

        let remaining: u64 = gaps.iter().map(|(a, b)| b - a).sum();
        let target = active_count.max(1).min(remaining as usize).max(gaps.len());

        // One segment per gap, then hand out the rest to whichever gap
        // currently has the largest per-piece size.
        let mut counts = vec![1usize; gaps.len()];
        let mut extra = target - gaps.len();
        while extra > 0 {
            let (idx, _) = gaps
                .iter()
                .enumerate()
                .map(|(i, (a, b))| (i, (b - a) / counts[i] as u64))
                .max_by_key(|&(_, per_piece)| per_piece)
                .expect("gaps not empty");
            counts[idx] += 1;
            extra -= 1;
        }

        let mut fresh: Vec<Segment> = Vec::new();
        for ((start, end), n) in gaps.into_iter().zip(counts) {
            let sub = SegmentTable::plan(end - start, n);
            for s in sub.segments {
                fresh.push(Segment::new(start + s.start, start + s.end));
            }
        }

        done.extend(fresh);
        done.sort_by_key(|s| s.start);
        done.retain(|s| !s.is_empty());
        self.segments = done;
    }

    /// Verifies the table invariants: segments sorted, pairwise disjoint,
    /// contiguous, and covering exactly [0, total).
    pub fn check_invariants(&self) -> anyhow::Result<()> {
        if self.segments.is_empty() {
            return Ok(());
        }
        let mut expected = 0u64;
        for (i, s) in self.segments.iter().enumerate() {
            if s.start != expected {
                anyhow::bail!(
                    "segment {} starts at {} but previous ended at {}",
                    i,
                    s.start,
                    expected
                );
            }
            if s.end <= s.start {
                anyhow::bail!("segment {} has empty or inverted range", i);
            }
            if s.received > s.len() {
                anyhow::bail!("segment {} received {} exceeds length {}", i, s.received, s.len());
            }
            expected = s.end;
        }
        if expected != self.total {
            anyhow::bail!("segments cover [0, {}) but total is {}", expected, self.total);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_even() {
        let t = SegmentTable::plan(1000, 4);
        let s = t.segments();
        assert_eq!(s.len(), 4);
        assert_eq!((s[0].start, s[0].end), (0, 250));
        assert_eq!((s[1].start, s[1].end), (250, 500));
        assert_eq!((s[2].start, s[2].end), (500, 750));
        assert_eq!((s[3].start, s[3].end), (750, 1000));
        t.check_invariants().unwrap();
    }

    #[test]
    fn plan_remainder_spread_to_front() {
        let t = SegmentTable::plan(10, 4);
        let s = t.segments();
        assert_eq!(s.len(), 4);
        assert_eq!((s[0].start, s[0].end), (0, 3));
        assert_eq!((s[1].start, s[1].end), (3, 6));
        assert_eq!((s[2].start, s[2].end), (6, 8));
        assert_eq!((s[3].start, s[3].end), (8, 10));
        t.check_invariants().unwrap();
    }

    #[test]
    fn plan_more_segments_than_bytes() {
        let t = SegmentTable::plan(3, 8);
        assert_eq!(t.len(), 3);
        t.check_invariants().unwrap();
    }

    #[test]
    fn plan_empty() {
        assert!(SegmentTable::plan(0, 4).is_empty());
        assert!(SegmentTable::plan(100, 0).is_empty());
    }

    #[test]
    fn range_header_resumes_from_offset() {
        let mut s = Segment::new(100, 200);
        assert_eq!(s.range_header_value(), "bytes=100-199");
        s.received = 40;
        assert_eq!(s.range_header_value(), "bytes=140-199");
        assert_eq!(s.remaining(), 60);
    }

    #[test]
    fn record_received_clamps_and_completes() {
        let mut t = SegmentTable::plan(100, 2);
        t.record_received(0, 30);
        assert_eq!(t.bytes_done(), 30);
        assert!(!t.segments()[0].is_done());
        t.record_received(0, 1000);
        assert_eq!(t.segments()[0].received, 50);
        assert!(t.segments()[0].is_done());
        // Done segments are immutable.
        t.record_received(0, 10);
        assert_eq!(t.segments()[0].received, 50);
    }

    #[test]
    fn bytes_done_equals_sum_of_received() {
        let mut t = SegmentTable::plan(1000, 4);
        t.mark_done(0);
        t.record_received(1, 100);
        t.record_received(3, 7);
        assert_eq!(t.bytes_done(), 250 + 100 + 7);
    }

    #[test]
    fn resplit_remaining_preserves_completed_bytes() {
        // Scenario: 1000 bytes in 4 segments; 2 done, 2 partial at 100
        // bytes each. Adding one segment re-splits only the remaining
        // 300 bytes.
        let mut t = SegmentTable::plan(1000, 4);
        t.mark_done(0);
        t.mark_done(1);
        t.record_received(2, 100);
        t.record_received(3, 100);
        assert_eq!(t.bytes_done(), 700);

        t.resplit_remaining(3);
        t.check_invariants().unwrap();
        assert_eq!(t.bytes_done(), 700, "completed bytes never re-fetched");

        let incomplete = t.incomplete();
        assert_eq!(incomplete.len(), 3);
        let remaining: u64 = incomplete.iter().map(|(_, s)| s.remaining()).sum();
        assert_eq!(remaining, 300);
        for (_, s) in &incomplete {
            assert_eq!(s.received, 0, "fresh segments start empty");
        }
    }

    #[test]
    fn resplit_remaining_shrink_keeps_one_per_gap() {
        let mut t = SegmentTable::plan(1000, 4);
        t.mark_done(1); // gaps [0,250) and [500,1000) are disjoint
        t.resplit_remaining(1);
        t.check_invariants().unwrap();
        // Two disjoint gaps cannot merge into one segment.
        assert_eq!(t.incomplete().len(), 2);
        assert_eq!(t.bytes_done(), 250);
    }

    #[test]
    fn resplit_remaining_all_done_is_noop() {
        let mut t = SegmentTable::plan(100, 2);
        t.mark_done(0);
        t.mark_done(1);
        t.resplit_remaining(8);
        assert!(t.all_done());
        assert_eq!(t.bytes_done(), 100);
    }

    #[test]
    fn release_workers_demotes_active() {
        let mut t = SegmentTable::plan(100, 2);
        t.mark_active(0);
        t.mark_failed(1);
        t.release_workers();
        assert_eq!(t.segments()[0].status, SegmentStatus::Pending);
        assert_eq!(t.segments()[1].status, SegmentStatus::Pending);
    }

    #[test]
    fn table_json_roundtrip() {
        let mut t = SegmentTable::plan(1000, 4);
        t.mark_done(0);
        t.record_received(1, 123);
        let json = serde_json::to_string(&t).unwrap();
        let back: SegmentTable = serde_json::from_str(&json).unwrap();
        assert_eq!(back.total(), 1000);
        assert_eq!(back.bytes_done(), t.bytes_done());
        assert_eq!(back.segments(), t.segments());
    }
}
