//! Binary min-heap of result handles, ordered by `sortby` (grounded on
//! `queue.c`). Operates directly on a [`Results`] table rather than raw
//! result pointers: `queued` (the 1-based heap slot, `NOT_QUEUED` meaning
//! absent) lives on the `ResultEntry` itself, exactly as in the original.

use super::results::{Results, NOT_QUEUED};

pub struct Queue {
    /// 1-based; `heap[0]` is an unused placeholder so parent/child index
    /// arithmetic (`i/2`, `2*i`, `2*i+1`) matches the original directly.
    heap: Vec<u32>,
}

impl Queue {
    pub fn new() -> Self {
        Queue { heap: vec![0] }
    }

    pub fn is_empty(&self) -> bool {
        self.heap.len() == 1
    }

    pub fn len(&self) -> usize {
        self.heap.len() - 1
    }

    /// Insert `handle` with the given score, or — if already queued —
    /// lower its key in place and re-bubble up. Never raises an
    /// already-queued entry's key; callers only call this with improving
    /// scores (`InsertInQueue`).
    pub fn insert(&mut self, results: &mut Results, handle: u32, score: u32) {
        let mut index = results.queued(handle) as usize;

        if index == NOT_QUEUED as usize {
            self.heap.push(handle);
            index = self.heap.len() - 1;
            results.set_queued(handle, index as u32);
        }

        results.set_sortby(handle, score);

        while index > 1 {
            let parent = index / 2;
            if results.sortby(self.heap[index]) >= results.sortby(self.heap[parent]) {
                break;
            }
            self.heap.swap(index, parent);
            results.set_queued(self.heap[index], index as u32);
            results.set_queued(self.heap[parent], parent as u32);
            index = parent;
        }
    }

    /// Pop and return the handle with the lowest `sortby`, or `None` if
    /// empty (`PopFromQueue`).
    pub fn pop(&mut self, results: &mut Results) -> Option<u32> {
        if self.heap.len() == 1 {
            return None;
        }

        let top = self.heap[1];
        results.set_queued(top, NOT_QUEUED);

        let last = self.heap.pop().unwrap();
        let occupied = self.heap.len() - 1;
        if occupied == 0 {
            return Some(top);
        }
        self.heap[1] = last;

        let mut index = 1usize;
        while 2 * index < occupied {
            let mut newindex = 2 * index;
            if results.sortby(self.heap[newindex]) > results.sortby(self.heap[newindex + 1]) {
                newindex += 1;
            }
            if results.sortby(self.heap[index]) <= results.sortby(self.heap[newindex]) {
                break;
            }
            self.heap.swap(index, newindex);
            results.set_queued(self.heap[index], index as u32);
            results.set_queued(self.heap[newindex], newindex as u32);
            index = newindex;
        }

        if 2 * index == occupied {
            let newindex = 2 * index;
            if results.sortby(self.heap[index]) > results.sortby(self.heap[newindex]) {
                self.heap.swap(index, newindex);
                results.set_queued(self.heap[index], index as u32);
                results.set_queued(self.heap[newindex], newindex as u32);
            }
        }

        Some(top)
    }
}

impl Default for Queue {
    fn default() -> Self {
        Self::new()
    }
}
