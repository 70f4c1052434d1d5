//! Timer table with scoped ownership
//!
//! Every timer lives in one `TimerTable`. The component that schedules a
//! timer records its id in a `TimerScope` it owns; the scope releases ids as
//! they fire and cancels everything it still holds on teardown.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::Serialize;
use tracing::debug;

use crate::core::session::TurnId;
use crate::types::ClientEvent;

/// Handle to one scheduled timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TimerId(u64);

/// Which neutral confirmation is due
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmStep {
    /// Unconditional re-push
    First,
    /// Re-push only if the recorded state is still not neutral
    Second,
}

/// What to do when a timer fires
#[derive(Debug, Clone, PartialEq)]
pub enum TimerTask {
    ChannelPump,
    ReadinessPoll,
    StatusCheck,
    StartMotionFallback,
    TurnFallback(TurnId),
    AudioSafety(TurnId),
    AudioErrorGrace(TurnId),
    NeutralConfirm(ConfirmStep),
    IntroLaunch,
    IntroWaitTimeout,
    PendingStartTimeout,
    VisitorInfo,
    QuizExplanation {
        text: String,
        emotion: String,
        audio: Option<String>,
    },
    QuizFollowUp(ClientEvent),
    QuizProposalRequest,
}

/// All scheduled timers, fired in due order then scheduling order
#[derive(Debug, Default)]
pub struct TimerTable {
    next_id: u64,
    queue: BTreeMap<(u64, TimerId), TimerTask>,
    due_by_id: HashMap<TimerId, u64>,
}

impl TimerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `task` to fire `delay_ms` after `now`
    pub fn schedule(&mut self, now: u64, delay_ms: u64, task: TimerTask) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        let due = now.saturating_add(delay_ms);
        self.queue.insert((due, id), task);
        self.due_by_id.insert(id, due);
        id
    }

    /// Cancel a timer. Returns false if it already fired or was cancelled.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        match self.due_by_id.remove(&id) {
            Some(due) => self.queue.remove(&(due, id)).is_some(),
            None => false,
        }
    }

    /// Remove and return the earliest timer due at or before `now`
    pub fn pop_due(&mut self, now: u64) -> Option<(TimerId, TimerTask)> {
        let (&(due, id), _) = self.queue.iter().next()?;
        if due > now {
            return None;
        }
        self.due_by_id.remove(&id);
        self.queue.remove(&(due, id)).map(|task| (id, task))
    }

    /// Earliest due time
    pub fn next_due(&self) -> Option<u64> {
        self.queue.keys().next().map(|(due, _)| *due)
    }

    pub fn is_pending(&self, id: TimerId) -> bool {
        self.due_by_id.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

/// Timers owned by one component
#[derive(Debug)]
pub struct TimerScope {
    name: &'static str,
    ids: HashSet<TimerId>,
}

impl TimerScope {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            ids: HashSet::new(),
        }
    }

    /// Schedule and track in one step
    pub fn schedule(
        &mut self,
        table: &mut TimerTable,
        now: u64,
        delay_ms: u64,
        task: TimerTask,
    ) -> TimerId {
        let id = table.schedule(now, delay_ms, task);
        self.ids.insert(id);
        id
    }

    /// Forget a fired timer. Returns false if this scope did not own it.
    pub fn release(&mut self, id: TimerId) -> bool {
        self.ids.remove(&id)
    }

    /// Cancel one owned timer
    pub fn cancel(&mut self, table: &mut TimerTable, id: TimerId) -> bool {
        self.ids.remove(&id) && table.cancel(id)
    }

    /// Cancel everything this scope still owns
    pub fn cancel_all(&mut self, table: &mut TimerTable) -> usize {
        let count = self.ids.len();
        for id in self.ids.drain() {
            table.cancel(id);
        }
        if count > 0 {
            debug!(scope = self.name, count, "cancelled scoped timers");
        }
        count
    }

    pub fn contains(&self, id: TimerId) -> bool {
        self.ids.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}
