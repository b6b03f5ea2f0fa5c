//! Extended segment store (`spec.md` §3, §4.D, §4.E).
//!
//! Owns the append-only segment list and the `firstnode`/`next2` adjacency
//! index built by `index_segments`. The splitting and distance-computation
//! algorithms that populate this store live in [`crate::segment`]; this
//! type is the storage + traversal half, grounded on `segmentsx.c`'s
//! `SegmentsX`/`FirstSegmentX`/`NextSegmentX`.

use crate::error::{CoreError, Result};
use crate::model::{SegmentX, NO_SEGMENT};

#[derive(Default)]
pub struct SegmentsX {
    segments: Vec<SegmentX>,
    /// `firstnode[n]` is the index of a segment incident to node `n`, or
    /// `NO_SEGMENT`. Built by `index_segments`.
    firstnode: Vec<u32>,
}

impl SegmentsX {
    pub fn new() -> Self {
        SegmentsX::default()
    }

    /// Append a segment, normalizing `node1 <= node2` and flipping the
    /// direction-dependent bits to match (`AppendSegmentList`,
    /// `spec.md` invariant 3).
    pub fn append(&mut self, mut segment: SegmentX) -> Result<()> {
        if self.segments.len() >= u32::MAX as usize {
            return Err(CoreError::CapacityExceeded("SegmentsX"));
        }
        if segment.node1 > segment.node2 {
            segment.swap_nodes();
        }
        segment.next2 = NO_SEGMENT;
        self.segments.push(segment);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn get(&self, index: u32) -> &SegmentX {
        &self.segments[index as usize]
    }

    pub fn get_mut(&mut self, index: u32) -> &mut SegmentX {
        &mut self.segments[index as usize]
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &SegmentX)> {
        self.segments.iter().enumerate().map(|(i, s)| (i as u32, s))
    }

    pub fn replace_all(&mut self, segments: Vec<SegmentX>) {
        self.segments = segments;
        self.firstnode.clear();
    }

    pub fn into_vec(self) -> Vec<SegmentX> {
        self.segments
    }

    pub fn as_slice(&self) -> &[SegmentX] {
        &self.segments
    }

    /// Build the `firstnode` adjacency index: walk the (already sorted)
    /// segment list last-to-first, threading each node's incidence list
    /// through `next2` (`spec.md` §4.E `IndexSegments`, invariant 3).
    pub fn index_segments(&mut self, num_nodes: usize) {
        let mut firstnode = vec![NO_SEGMENT; num_nodes];

        for i in (0..self.segments.len()).rev() {
            let (node1, node2) = {
                let s = &self.segments[i];
                (s.node1, s.node2)
            };
            self.segments[i].next2 = firstnode[node2 as usize];
            firstnode[node1 as usize] = i as u32;
            firstnode[node2 as usize] = i as u32;
        }

        self.firstnode = firstnode;
    }

    pub fn first_segment(&self, node: u32) -> Option<u32> {
        match self.firstnode.get(node as usize).copied() {
            Some(NO_SEGMENT) | None => None,
            Some(i) => Some(i),
        }
    }

    /// Advance from `segment` (incident to `node`) to the next segment
    /// incident to `node`, or `None` if `segment` was the last
    /// (`NextSegmentX`).
    pub fn next_segment(&self, segment: u32, node: u32) -> Option<u32> {
        let s = &self.segments[segment as usize];
        if s.node1 == node {
            let next = segment + 1;
            if (next as usize) < self.segments.len() && self.segments[next as usize].node1 == node {
                Some(next)
            } else {
                None
            }
        } else {
            match s.next2 {
                NO_SEGMENT => None,
                n => Some(n),
            }
        }
    }

    /// Every segment index incident to `node`, via `first_segment` +
    /// repeated `next_segment` (`spec.md` invariant 4 / testable property
    /// 4: "adjacency completeness").
    pub fn incident(&self, node: u32) -> impl Iterator<Item = u32> + '_ {
        let mut current = self.first_segment(node);
        std::iter::from_fn(move || {
            let this = current?;
            current = self.next_segment(this, node);
            Some(this)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Distance;

    fn seg(node1: u32, node2: u32, way: u32) -> SegmentX {
        SegmentX {
            node1,
            node2,
            next2: NO_SEGMENT,
            way,
            distance: Distance(10),
            kind: crate::model::segment_flags::SEGMENT_NORMAL,
            incline: 0,
        }
    }

    #[test]
    fn append_normalizes_node_order() {
        let mut segs = SegmentsX::new();
        segs.append(seg(5, 2, 0)).unwrap();
        assert_eq!(segs.get(0).node1, 2);
        assert_eq!(segs.get(0).node2, 5);
    }

    #[test]
    fn adjacency_visits_every_incident_segment_once() {
        let mut segs = SegmentsX::new();
        // Star graph: node 0 connects to 1, 2, 3.
        segs.append(seg(0, 1, 0)).unwrap();
        segs.append(seg(0, 2, 0)).unwrap();
        segs.append(seg(0, 3, 0)).unwrap();
        segs.index_segments(4);

        let mut at_zero: Vec<u32> = segs.incident(0).collect();
        at_zero.sort();
        assert_eq!(at_zero, vec![0, 1, 2]);

        assert_eq!(segs.incident(1).collect::<Vec<_>>(), vec![0]);
        assert_eq!(segs.incident(2).collect::<Vec<_>>(), vec![1]);
        assert_eq!(segs.incident(3).collect::<Vec<_>>(), vec![2]);
    }
}
