//! Deferred reply delivery.
//!
//! The caller's reply callback never runs inside the call that produced the
//! reply. Completions are pushed onto a [`TaskQueue`] owned by the caller,
//! which drains it on its own turn. This keeps the caller's stack unwound
//! before its callback runs, so it can safely dispatch again from within a
//! reply handler.
//!
//! Reply timeouts live on the same queue: each timed reply registers a
//! deadline, and the owner fires expired deadlines while draining. No thread
//! is spawned per request, and a deadline whose reply already ran is
//! discarded on the next drain.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fmt;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::warn;

use crate::errors::SupplierError;
use crate::response::{Payload, Reply};

/// Tracing target for scheduling.
const SCHEDULE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::schedule");

/// Unit of deferred work.
pub type Task = Box<dyn FnOnce() + Send>;

enum Job {
    Run(Task),
    Arm(Deadline),
}

/// Handle for deferring work onto a [`TaskQueue`].
#[derive(Debug, Clone)]
pub struct Spawner {
    sender: Sender<Job>,
}

impl Spawner {
    /// Queues `task` for the next turn.
    ///
    /// Returns `false` when the queue has been dropped; the task is discarded.
    pub fn defer<F>(&self, task: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        self.sender.send(Job::Run(Box::new(task))).is_ok()
    }

    fn arm(&self, deadline: Deadline) -> bool {
        self.sender.send(Job::Arm(deadline)).is_ok()
    }
}

/// Queue of deferred tasks and reply deadlines, drained by its owner.
pub struct TaskQueue {
    sender: Sender<Job>,
    receiver: Receiver<Job>,
    deadlines: RefCell<BinaryHeap<Deadline>>,
}

impl fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskQueue")
            .field("pending_timeouts", &self.pending_timeouts())
            .finish_non_exhaustive()
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            sender,
            receiver,
            deadlines: RefCell::new(BinaryHeap::new()),
        }
    }

    /// Returns a handle that defers onto this queue.
    pub fn spawner(&self) -> Spawner {
        Spawner {
            sender: self.sender.clone(),
        }
    }

    /// Number of registered reply timeouts that have neither fired nor been
    /// beaten by their reply.
    pub fn pending_timeouts(&self) -> usize {
        self.deadlines.borrow().len()
    }

    /// Runs queued tasks and expired timeouts without blocking, including
    /// tasks they queue.
    ///
    /// Queued tasks run before deadlines are checked, so a reply queued in
    /// time beats its timeout however late the drain happens.
    ///
    /// Returns the number of tasks and timeouts run.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        loop {
            match self.receiver.try_recv() {
                Ok(job) => ran += self.accept(job),
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => {
                    let fired = self.settle(Instant::now());
                    if fired == 0 {
                        return ran;
                    }
                    ran += fired;
                }
            }
        }
    }

    /// Runs tasks as they arrive, and timeouts as they expire, until `budget`
    /// elapses.
    ///
    /// Returns the number of tasks and timeouts run.
    pub fn run_for(&self, budget: Duration) -> usize {
        let end = Instant::now() + budget;
        let mut ran = 0;
        loop {
            ran += self.run_pending();
            let now = Instant::now();
            let remaining = end.saturating_duration_since(now);
            if remaining.is_zero() {
                return ran;
            }
            let wait = self
                .next_deadline()
                .map_or(remaining, |at| remaining.min(at.saturating_duration_since(now)));
            match self.receiver.recv_timeout(wait) {
                Ok(job) => ran += self.accept(job),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => return ran,
            }
        }
    }

    fn accept(&self, job: Job) -> usize {
        match job {
            Job::Run(task) => {
                task();
                1
            }
            Job::Arm(deadline) => {
                self.deadlines.borrow_mut().push(deadline);
                0
            }
        }
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.deadlines.borrow().peek().map(|deadline| deadline.at)
    }

    /// Drops answered deadlines, then fires those expired at `now`.
    fn settle(&self, now: Instant) -> usize {
        self.deadlines
            .borrow_mut()
            .retain(|deadline| !deadline.slot.is_spent());

        let mut fired = 0;
        loop {
            let expired = {
                let mut deadlines = self.deadlines.borrow_mut();
                match deadlines.peek() {
                    Some(next) if next.at <= now => deadlines.pop(),
                    _ => None,
                }
            };
            let Some(deadline) = expired else {
                return fired;
            };
            if let Some(callback) = deadline.slot.take() {
                callback(Err(SupplierError::TimedOut {
                    after: deadline.after,
                }));
                fired += 1;
            }
        }
    }
}

type ReplyFn = Box<dyn FnOnce(Result<Payload, SupplierError>) + Send>;

/// Single-use slot holding the caller's callback.
#[derive(Clone)]
struct ReplySlot {
    inner: Arc<Mutex<Option<ReplyFn>>>,
}

impl ReplySlot {
    fn new(callback: ReplyFn) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Some(callback))),
        }
    }

    fn take(&self) -> Option<ReplyFn> {
        match self.inner.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }
    }

    fn is_spent(&self) -> bool {
        match self.inner.lock() {
            Ok(guard) => guard.is_none(),
            Err(poisoned) => poisoned.into_inner().is_none(),
        }
    }

    fn deliver(&self, result: Result<Payload, SupplierError>) {
        match self.take() {
            Some(callback) => callback(result),
            None => warn!(
                target: SCHEDULE_TARGET,
                "reply dropped: request already answered"
            ),
        }
    }
}

/// Reply timeout registered with a [`TaskQueue`]; ordered soonest first.
struct Deadline {
    at: Instant,
    after: Duration,
    slot: ReplySlot,
}

impl PartialEq for Deadline {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at
    }
}

impl Eq for Deadline {}

impl PartialOrd for Deadline {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Deadline {
    fn cmp(&self, other: &Self) -> Ordering {
        other.at.cmp(&self.at)
    }
}

/// Wraps `on_reply` so completions are delivered on the next queue turn.
///
/// With a `timeout`, the queue fails the reply with `TimedOut` once that long
/// has passed without a completion; the first completion to run wins and
/// later ones are dropped.
pub fn deferred_reply<F>(spawner: &Spawner, timeout: Option<Duration>, on_reply: F) -> Reply
where
    F: FnOnce(Result<Payload, SupplierError>) + Send + 'static,
{
    let slot = ReplySlot::new(Box::new(on_reply));

    if let Some(after) = timeout {
        let deadline = Deadline {
            at: Instant::now() + after,
            after,
            slot: slot.clone(),
        };
        if !spawner.arm(deadline) {
            warn!(target: SCHEDULE_TARGET, "reply timeout dropped: task queue closed");
        }
    }

    let spawner = spawner.clone();
    Reply::new(move |result| {
        if !spawner.defer(move || slot.deliver(result)) {
            warn!(target: SCHEDULE_TARGET, "reply dropped: task queue closed");
        }
    })
}
