//! Binary min-heap used to k-way merge sorted runs.
//!
//! Kept separate from `search::queue` even though both are binary heaps:
//! this one orders opaque byte records by a runtime comparator closure plus
//! a sequence-number tiebreak, where `search::queue` orders node searches by
//! a `Distance` key and supports in-place key lowering. Different enough
//! shapes that sharing one generic type would just be indirection.

use std::cmp::Ordering;

pub struct MergeHeap<'a, F> {
    items: Vec<(Vec<u8>, u64, usize)>,
    compare: &'a F,
}

impl<'a, F> MergeHeap<'a, F>
where
    F: Fn(&[u8], &[u8]) -> Ordering,
{
    pub fn new(compare: &'a F) -> Self {
        MergeHeap {
            items: Vec::new(),
            compare,
        }
    }

    fn order(&self, a: &(Vec<u8>, u64, usize), b: &(Vec<u8>, u64, usize)) -> Ordering {
        (self.compare)(&a.0, &b.0).then_with(|| a.1.cmp(&b.1))
    }

    pub fn push(&mut self, bytes: Vec<u8>, seq: u64, run_id: usize) {
        self.items.push((bytes, seq, run_id));
        let mut i = self.items.len() - 1;
        while i > 0 {
            let parent = (i - 1) / 2;
            if self.order(&self.items[i], &self.items[parent]) == Ordering::Less {
                self.items.swap(i, parent);
                i = parent;
            } else {
                break;
            }
        }
    }

    pub fn pop(&mut self) -> Option<(Vec<u8>, u64, usize)> {
        if self.items.is_empty() {
            return None;
        }
        let last = self.items.len() - 1;
        self.items.swap(0, last);
        let top = self.items.pop();

        let mut i = 0;
        loop {
            let left = 2 * i + 1;
            let right = 2 * i + 2;
            let mut smallest = i;
            if left < self.items.len()
                && self.order(&self.items[left], &self.items[smallest]) == Ordering::Less
            {
                smallest = left;
            }
            if right < self.items.len()
                && self.order(&self.items[right], &self.items[smallest]) == Ordering::Less
            {
                smallest = right;
            }
            if smallest == i {
                break;
            }
            self.items.swap(i, smallest);
            i = smallest;
        }

        top
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pops_in_ascending_order() {
        let compare = |a: &[u8], b: &[u8]| {
            u32::from_le_bytes(a.try_into().unwrap()).cmp(&u32::from_le_bytes(b.try_into().unwrap()))
        };
        let mut heap = MergeHeap::new(&compare);
        for (v, run) in [(5u32, 0usize), (1, 1), (3, 0), (2, 2)] {
            heap.push(v.to_le_bytes().to_vec(), run as u64, run);
        }
        let mut out = Vec::new();
        while let Some((bytes, _, _)) = heap.pop() {
            out.push(u32::from_le_bytes(bytes.try_into().unwrap()));
        }
        assert_eq!(out, vec![1, 2, 3, 5]);
    }

    #[test]
    fn ties_break_by_sequence_number() {
        let compare = |_: &[u8], _: &[u8]| Ordering::Equal;
        let mut heap = MergeHeap::new(&compare);
        heap.push(vec![9], 2, 0);
        heap.push(vec![8], 0, 0);
        heap.push(vec![7], 1, 0);
        let mut out = Vec::new();
        while let Some((bytes, _, _)) = heap.pop() {
            out.push(bytes[0]);
        }
        assert_eq!(out, vec![8, 7, 9]);
    }
}
