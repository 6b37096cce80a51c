// src/scheduler/policy.rs - Selection rules over the ready queue
use std::collections::VecDeque;

use crate::process::ProcessControlBlock;

/// Index of the entry with the least remaining burst. The first of equal
/// minima wins. With `skip_finished` set, finished entries are ignored, which
/// turns the retirement finder into a dispatch selector.
pub fn shortest_remaining<T: AsRef<ProcessControlBlock>>(queue: &VecDeque<T>, skip_finished: bool) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, entry) in queue.iter().enumerate() {
        let pcb = entry.as_ref();
        if skip_finished && pcb.is_finished() {
            continue;
        }
        let remaining = pcb.remaining();
        match best {
            Some((_, min)) if remaining >= min => {}
            _ => best = Some((i, remaining)),
        }
    }
    best.map(|(i, _)| i)
}

/// Persistent round-robin position over a ready queue whose length changes
/// between ticks.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RoundRobinCursor {
    position: usize,
}

impl RoundRobinCursor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn position(&self) -> usize {
        self.position
    }

    /// Wraps the cursor back into `[0, len)`.
    pub fn clamp(&mut self, len: usize) {
        self.position = if len == 0 { 0 } else { self.position % len };
    }

    /// A new arrival landing under the cursor has just started, so the next
    /// resumption begins after it.
    pub fn on_admit(&mut self, index: usize) {
        if index == self.position {
            self.position += 1;
        }
    }

    /// Keeps the cursor on the same entry when an earlier one is removed.
    pub fn on_remove(&mut self, index: usize) {
        if index < self.position {
            self.position -= 1;
        }
    }

    /// Picks up to `want` resumable entries, starting at the cursor and trying
    /// each entry at most once. Each pick is claimed with `try_activate`, so
    /// an entry that is already active is skipped instead of dispatched twice.
    /// The caller owns the activation of every returned entry.
    pub fn select<T: AsRef<ProcessControlBlock>>(&mut self, queue: &VecDeque<T>, want: usize) -> Vec<usize> {
        let len = queue.len();
        self.clamp(len);
        let mut picked = Vec::with_capacity(want);
        for _ in 0..len {
            if picked.len() == want {
                break;
            }
            let index = self.position;
            self.position = (self.position + 1) % len;
            let pcb = queue[index].as_ref();
            if pcb.is_finished() || !pcb.try_activate() {
                continue;
            }
            picked.push(index);
        }
        picked
    }
}
