//! Deferred work on the single UI thread.
//!
//! Tasks carry no captured state: each one re-reads the document and the
//! tiers when it fires, so a later toggle or load simply supersedes whatever
//! an earlier task would have seen.

use std::{
    cell::Cell,
    rc::Rc,
    time::{Duration, Instant},
};

use crate::state::NodeId;

/// Time elapsed since the page was opened
pub trait Clock {
    fn now(&self) -> Duration;
}

/// Wall clock
#[derive(Debug, Clone)]
pub struct SystemClock {
    start: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        SystemClock {
            start: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.start.elapsed()
    }
}

/// Hand-driven clock; clones share the same time
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Rc<Cell<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get() + by);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        self.now.get()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Task {
    /// Scroll to a node and highlight it
    RevealAnchor(NodeId),
    ClearHighlight(NodeId),
    /// Republish the current tree state and share URL
    RefreshShareUrl,
}

#[derive(Debug)]
struct Scheduled {
    due: Duration,
    seq: u64,
    task: Task,
}

/// Due-time ordered queue of tasks
#[derive(Debug, Default)]
pub struct Scheduler {
    queue: Vec<Scheduled>,
    next_seq: u64,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, now: Duration, delay: Duration, task: Task) {
        tracing::trace!("Scheduling {:?} in {:?}", task, delay);
        self.queue.push(Scheduled {
            due: now + delay,
            seq: self.next_seq,
            task,
        });
        self.next_seq += 1;
    }

    /// Remove and return every task due at `now`, earliest first
    /// (ties in scheduling order)
    pub fn take_due(&mut self, now: Duration) -> Vec<Task> {
        let (mut due, pending): (Vec<Scheduled>, Vec<Scheduled>) =
            self.queue.drain(..).partition(|s| s.due <= now);
        self.queue = pending;

        due.sort_by_key(|s| (s.due, s.seq));
        due.into_iter().map(|s| s.task).collect()
    }

    pub fn next_due(&self) -> Option<Duration> {
        self.queue.iter().map(|s| s.due).min()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }
}
