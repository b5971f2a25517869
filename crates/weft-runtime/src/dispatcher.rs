#![forbid(unsafe_code)]

//! The UI-thread task queue.
//!
//! Everything that happens after a tree is built (handler events, slot
//! rebuilds, queued closes, messages from other threads) runs as a task on
//! the [`Dispatcher`]. The owner of the event loop calls
//! [`Dispatcher::run_queued`] whenever it is idle.
//!
//! # Invariants
//!
//! 1. Tasks run in FIFO order, one at a time, on the thread that owns the
//!    dispatcher.
//! 2. `run_queued` never re-enters: a nested call returns 0 and leaves the
//!    queue to the outer call.
//! 3. A task tagged with a [`TreeToken`] whose tree has closed is dropped
//!    without running.
//! 4. Posting with a [`TaskKey`] that is already pending replaces the
//!    pending task; only the latest request for a key runs.
//!
//! # Failure Modes
//!
//! | Failure | Behavior |
//! |---------|----------|
//! | task returns `Err` | recorded as a [`Notification`], logged at warn |
//! | task panics (`catch_panics`) | recorded as [`TaskError::Panic`] |
//! | task panics (no `catch_panics`) | unwinds out of `run_queued` |
//! | remote sender used after the dispatcher is gone | `send` returns the message back |
//! | more than [`NOTIFICATION_CAPACITY`] failures pending | oldest notification is dropped |
//! | every sender of a channel dropped | channel is closed after its last message is queued |

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;

use tracing::{debug, debug_span, warn};

use crate::config::RuntimeConfig;
use crate::error::TaskError;

/// Result of one task.
pub type TaskResult = Result<(), TaskError>;

// ---------------------------------------------------------------------------
// Tree identity
// ---------------------------------------------------------------------------

/// Global counter for unique tree IDs.
static TREE_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Identity of one mounted tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TreeId(u64);

impl TreeId {
    fn new() -> Self {
        Self(TREE_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    #[inline]
    pub const fn id(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TreeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tree-{}", self.0)
    }
}

/// Identity plus liveness of a mounted tree.
///
/// Clones share liveness: closing any clone closes them all.
#[derive(Debug, Clone)]
pub struct TreeToken {
    id: TreeId,
    alive: Rc<Cell<bool>>,
}

impl TreeToken {
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: TreeId::new(),
            alive: Rc::new(Cell::new(true)),
        }
    }

    #[must_use]
    pub const fn id(&self) -> TreeId {
        self.id
    }

    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.alive.get()
    }

    /// Mark the tree closed. Returns `false` if it already was.
    pub fn close(&self) -> bool {
        self.alive.replace(false)
    }
}

impl Default for TreeToken {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tasks and notifications
// ---------------------------------------------------------------------------

/// Supersession key for [`Dispatcher::post_keyed`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskKey(String);

impl TaskKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TaskKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<String> for TaskKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

/// Sequence number of a posted task.
pub type TaskId = u64;

struct Task {
    id: TaskId,
    tree: Option<TreeToken>,
    key: Option<TaskKey>,
    run: Box<dyn FnOnce() -> TaskResult>,
}

/// A task failure, kept for the application to inspect.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub task: TaskId,
    pub tree: Option<TreeId>,
    pub error: TaskError,
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.tree {
            Some(tree) => write!(f, "task {} ({tree}): {}", self.task, self.error),
            None => write!(f, "task {}: {}", self.task, self.error),
        }
    }
}

/// Notifications kept before the oldest are discarded.
pub const NOTIFICATION_CAPACITY: usize = 256;

/// Drains one channel; `false` once every sender is gone.
type Inlet = Box<dyn Fn(&Dispatcher) -> bool>;

struct DispatcherInner {
    queue: RefCell<VecDeque<Task>>,
    next_id: Cell<TaskId>,
    running: Cell<bool>,
    config: RuntimeConfig,
    notifications: RefCell<VecDeque<Notification>>,
    sink: RefCell<Option<Rc<dyn Fn(&Notification)>>>,
    inlets: RefCell<Vec<Inlet>>,
}

/// Handle to the UI-thread task queue. Clones share the queue.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Rc<DispatcherInner>,
}

/// Resets the running flag even if a task unwinds.
struct RunGuard<'a>(&'a Cell<bool>);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

impl Dispatcher {
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    #[must_use]
    pub fn with_config(config: RuntimeConfig) -> Self {
        Self {
            inner: Rc::new(DispatcherInner {
                queue: RefCell::new(VecDeque::new()),
                next_id: Cell::new(1),
                running: Cell::new(false),
                config,
                notifications: RefCell::new(VecDeque::new()),
                sink: RefCell::new(None),
                inlets: RefCell::new(Vec::new()),
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    // --- Posting ---

    /// Queue an untagged task.
    pub fn post(&self, task: impl FnOnce() -> TaskResult + 'static) -> TaskId {
        self.enqueue(None, None, Box::new(task))
    }

    /// Queue a task that is dropped if `tree` closes before it runs.
    pub fn post_for(
        &self,
        tree: &TreeToken,
        task: impl FnOnce() -> TaskResult + 'static,
    ) -> TaskId {
        self.enqueue(Some(tree.clone()), None, Box::new(task))
    }

    /// Queue a task, replacing any pending task with the same key.
    pub fn post_keyed(
        &self,
        key: impl Into<TaskKey>,
        tree: Option<&TreeToken>,
        task: impl FnOnce() -> TaskResult + 'static,
    ) -> TaskId {
        let key = key.into();
        let superseded = {
            let mut queue = self.inner.queue.borrow_mut();
            let before = queue.len();
            queue.retain(|pending| pending.key.as_ref() != Some(&key));
            before - queue.len()
        };
        if superseded > 0 {
            debug!(key = key.as_str(), "superseded pending task");
        }
        self.enqueue(tree.cloned(), Some(key), Box::new(task))
    }

    fn enqueue(
        &self,
        tree: Option<TreeToken>,
        key: Option<TaskKey>,
        run: Box<dyn FnOnce() -> TaskResult>,
    ) -> TaskId {
        let id = self.inner.next_id.get();
        self.inner.next_id.set(id + 1);
        self.inner.queue.borrow_mut().push_back(Task { id, tree, key, run });
        id
    }

    // --- Running ---

    /// Run queued tasks until the queue is empty or the batch limit is hit.
    ///
    /// Returns the number of tasks executed. Dropped tasks of closed trees
    /// are not counted.
    pub fn run_queued(&self) -> usize {
        if self.inner.running.replace(true) {
            return 0;
        }
        let _guard = RunGuard(&self.inner.running);
        let _span = debug_span!("run_queued").entered();

        self.drain_inlets();

        let mut executed = 0;
        while executed < self.inner.config.max_batch {
            let Some(task) = self.inner.queue.borrow_mut().pop_front() else {
                break;
            };
            if let Some(tree) = &task.tree {
                if !tree.is_alive() {
                    debug!(task = task.id, tree = %tree.id(), "dropped task of closed tree");
                    continue;
                }
            }
            executed += 1;
            let tree = task.tree.as_ref().map(TreeToken::id);
            let result = if self.inner.config.catch_panics {
                catch_unwind(AssertUnwindSafe(task.run))
                    .unwrap_or_else(|payload| Err(TaskError::Panic(panic_message(&*payload))))
            } else {
                (task.run)()
            };
            if let Err(error) = result {
                self.record(Notification {
                    task: task.id,
                    tree,
                    error,
                });
            }
        }
        executed
    }

    fn drain_inlets(&self) {
        let mut inlets = std::mem::take(&mut *self.inner.inlets.borrow_mut());
        inlets.retain(|inlet| inlet(self));
        let mut slot = self.inner.inlets.borrow_mut();
        let added = std::mem::replace(&mut *slot, inlets);
        slot.extend(added);
    }

    fn record(&self, notification: Notification) {
        warn!(%notification, "task failed");
        let sink = self.inner.sink.borrow().clone();
        if let Some(sink) = sink {
            sink(&notification);
        }
        let mut notifications = self.inner.notifications.borrow_mut();
        if notifications.len() == NOTIFICATION_CAPACITY {
            notifications.pop_front();
        }
        notifications.push_back(notification);
    }

    // --- Queue management ---

    /// Drop every pending task.
    pub fn clear(&self) {
        self.inner.queue.borrow_mut().clear();
    }

    /// Drop the pending tasks of one tree.
    pub fn clear_tree(&self, tree: TreeId) -> usize {
        let mut queue = self.inner.queue.borrow_mut();
        let before = queue.len();
        queue.retain(|task| task.tree.as_ref().map(TreeToken::id) != Some(tree));
        before - queue.len()
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.inner.running.get()
    }

    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.queue.borrow().len()
    }

    // --- Notifications ---

    /// Deliver every future notification to `sink` as well.
    pub fn set_sink(&self, sink: impl Fn(&Notification) + 'static) {
        *self.inner.sink.borrow_mut() = Some(Rc::new(sink));
    }

    /// Take the notifications recorded so far.
    pub fn take_notifications(&self) -> Vec<Notification> {
        self.inner.notifications.borrow_mut().drain(..).collect()
    }

    // --- Remote inlets ---

    /// Open a channel from other threads into this queue.
    ///
    /// Messages are drained at the start of each `run_queued` and handled
    /// by `on_message` as ordinary tasks, in send order.
    pub fn channel<M: Send + 'static>(
        &self,
        on_message: impl Fn(M) -> TaskResult + 'static,
    ) -> RemoteSender<M> {
        let (tx, rx) = mpsc::channel::<M>();
        let on_message: Rc<dyn Fn(M) -> TaskResult> = Rc::new(on_message);
        self.inner
            .inlets
            .borrow_mut()
            .push(Box::new(move |dispatcher: &Dispatcher| {
                loop {
                    match rx.try_recv() {
                        Ok(message) => {
                            let handler = Rc::clone(&on_message);
                            dispatcher.post(move || handler(message));
                        }
                        Err(mpsc::TryRecvError::Empty) => return true,
                        Err(mpsc::TryRecvError::Disconnected) => {
                            debug!("remote channel closed");
                            return false;
                        }
                    }
                }
            }));
        RemoteSender { tx }
    }

    /// Channels with at least one live sender, as of the last drain.
    #[must_use]
    pub fn open_channels(&self) -> usize {
        self.inner.inlets.borrow().len()
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("pending", &self.pending_count())
            .field("running", &self.is_running())
            .finish()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

/// Thread-safe handle for posting messages into a [`Dispatcher`].
pub struct RemoteSender<M> {
    tx: mpsc::Sender<M>,
}

impl<M: Send> RemoteSender<M> {
    /// Send a message. Fails, returning the message, if the dispatcher is
    /// gone.
    pub fn send(&self, message: M) -> Result<(), M> {
        self.tx.send(message).map_err(|e| e.0)
    }
}

impl<M> Clone for RemoteSender<M> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<M> fmt::Debug for RemoteSender<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteSender").finish()
    }
}
