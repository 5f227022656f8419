//! The lookahead sentence queue (§5): a priority-banded FIFO. The
//! priority band is drained completely before a single item is taken from
//! the normal band, then control returns to draining priority again — a
//! priority item (e.g. a sentence the user just jumped to) always wins,
//! but a flood of priority inserts can't starve normal playback forever.
//!
//! The currently-playing sentence is never represented here: the
//! controller removes an item from the queue before handing it to the
//! player, and a sentence only re-enters the queue if navigation puts it
//! back in front of playback.

use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::model::{Priority, Sentence};

struct QueueState {
    priority: VecDeque<Sentence>,
    normal: VecDeque<Sentence>,
}

pub struct LookaheadQueue {
    state: Mutex<QueueState>,
    max_depth: usize,
}

impl LookaheadQueue {
    pub fn new(max_depth: usize) -> Self {
        Self {
            state: Mutex::new(QueueState { priority: VecDeque::new(), normal: VecDeque::new() }),
            max_depth,
        }
    }

    pub fn push(&self, sentence: Sentence) {
        let mut state = self.state.lock();
        match sentence.priority {
            Priority::High | Priority::Immediate => state.priority.push_back(sentence),
            Priority::Low | Priority::Normal => state.normal.push_back(sentence),
        }
    }

    /// Drains the priority band first; only once it is empty does a
    /// single normal-band item get returned.
    pub fn pop(&self) -> Option<Sentence> {
        let mut state = self.state.lock();
        if let Some(s) = state.priority.pop_front() {
            return Some(s);
        }
        state.normal.pop_front()
    }

    pub fn len(&self) -> usize {
        let state = self.state.lock();
        state.priority.len() + state.normal.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() >= self.max_depth
    }

    pub fn has_room(&self) -> bool {
        !self.is_full()
    }

    /// Drops every queued item. Used when navigation invalidates the
    /// current lookahead window (§5 cancellation semantics).
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.priority.clear();
        state.normal.clear();
    }

    /// Removes a queued sentence by id, if present. Used when the
    /// controller needs to pull a specific sentence out ahead of its
    /// normal turn (e.g. "play this one next").
    pub fn remove(&self, id: u64) -> Option<Sentence> {
        let mut state = self.state.lock();
        if let Some(pos) = state.priority.iter().position(|s| s.id == id) {
            return state.priority.remove(pos);
        }
        if let Some(pos) = state.normal.iter().position(|s| s.id == id) {
            return state.normal.remove(pos);
        }
        None
    }
}
