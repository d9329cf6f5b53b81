//! Host event loops the notebook transport defers work onto
//!
//! A [`HostLoop`] is the async loop owned by the embedding process (a
//! notebook kernel, a GUI shell, a test). Canvases never draw synchronously
//! from `update()`; they schedule a callback here instead.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use tokio::task::{AbortHandle, LocalSet};

/// Callback scheduled on a host loop
pub type HostCallback = Box<dyn FnOnce()>;

/// Cancellation handle of a scheduled callback
#[derive(Debug)]
pub struct CallHandle {
    cancelled: Rc<Cell<bool>>,
    abort: Option<AbortHandle>,
}

impl CallHandle {
    fn new(abort: Option<AbortHandle>) -> (Self, Rc<Cell<bool>>) {
        let cancelled = Rc::new(Cell::new(false));
        let handle = Self {
            cancelled: Rc::clone(&cancelled),
            abort,
        };
        (handle, cancelled)
    }

    /// Prevent the callback from running; harmless if it already ran
    pub fn cancel(&self) {
        self.cancelled.set(true);
        if let Some(abort) = &self.abort {
            abort.abort();
        }
    }

    /// Whether [`cancel`](Self::cancel) was called
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.get()
    }
}

/// Async loop of the embedding process
pub trait HostLoop {
    /// Run `callback` on the next loop iteration
    fn call_soon(&self, callback: HostCallback) -> CallHandle;

    /// Run `callback` once `delay` has elapsed
    fn call_later(&self, delay: Duration, callback: HostCallback) -> CallHandle;
}

/// Host loop backed by a tokio [`LocalSet`]
///
/// Callbacks are spawned onto the set, so they only run while the embedding
/// code drives it (`LocalSet::run_until` or awaiting the set).
#[derive(Clone)]
pub struct TokioHostLoop {
    local: Rc<LocalSet>,
}

impl TokioHostLoop {
    /// Schedule onto `local`
    pub fn new(local: Rc<LocalSet>) -> Self {
        Self { local }
    }

    /// The set callbacks are spawned onto
    pub fn local_set(&self) -> &Rc<LocalSet> {
        &self.local
    }
}

impl fmt::Debug for TokioHostLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokioHostLoop").finish_non_exhaustive()
    }
}

impl HostLoop for TokioHostLoop {
    fn call_soon(&self, callback: HostCallback) -> CallHandle {
        self.call_later(Duration::ZERO, callback)
    }

    fn call_later(&self, delay: Duration, callback: HostCallback) -> CallHandle {
        let cancelled = Rc::new(Cell::new(false));
        let flag = Rc::clone(&cancelled);
        let task = self.local.spawn_local(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if !flag.get() {
                callback();
            }
        });
        CallHandle {
            cancelled,
            abort: Some(task.abort_handle()),
        }
    }
}

struct Scheduled {
    due: f64,
    sequence: u64,
    cancelled: Rc<Cell<bool>>,
    callback: HostCallback,
}

/// Deterministic host loop with virtual time
///
/// Nothing runs until [`run_once`](Self::run_once) is called; `call_later`
/// delays are measured against [`advance`](Self::advance).
#[derive(Default)]
pub struct ManualHostLoop {
    now: Cell<f64>,
    sequence: Cell<u64>,
    queue: RefCell<Vec<Scheduled>>,
}

impl ManualHostLoop {
    /// Empty loop at time zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Virtual time in seconds
    pub fn now(&self) -> f64 {
        self.now.get()
    }

    /// Move virtual time forward
    pub fn advance(&self, delay: Duration) {
        self.now.set(self.now.get() + delay.as_secs_f64());
    }

    /// Callbacks still waiting to run
    pub fn pending(&self) -> usize {
        self.queue
            .borrow()
            .iter()
            .filter(|scheduled| !scheduled.cancelled.get())
            .count()
    }

    /// Run every callback due now, in scheduling order; returns how many ran
    ///
    /// Callbacks scheduled while this iteration runs wait for the next one.
    pub fn run_once(&self) -> usize {
        let now = self.now.get();
        let mut due: Vec<Scheduled> = {
            let mut queue = self.queue.borrow_mut();
            let (due, waiting): (Vec<_>, Vec<_>) = queue.drain(..).partition(|s| s.due <= now);
            *queue = waiting;
            due
        };
        due.sort_by(|a, b| a.due.total_cmp(&b.due).then(a.sequence.cmp(&b.sequence)));

        let mut ran = 0;
        for scheduled in due {
            if scheduled.cancelled.get() {
                continue;
            }
            (scheduled.callback)();
            ran += 1;
        }
        ran
    }

    fn schedule(&self, due: f64, callback: HostCallback) -> CallHandle {
        let (handle, cancelled) = CallHandle::new(None);
        let sequence = self.sequence.get();
        self.sequence.set(sequence + 1);
        self.queue.borrow_mut().push(Scheduled {
            due,
            sequence,
            cancelled,
            callback,
        });
        handle
    }
}

impl fmt::Debug for ManualHostLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualHostLoop")
            .field("now", &self.now.get())
            .field("pending", &self.pending())
            .finish()
    }
}

impl HostLoop for ManualHostLoop {
    fn call_soon(&self, callback: HostCallback) -> CallHandle {
        self.schedule(self.now.get(), callback)
    }

    fn call_later(&self, delay: Duration, callback: HostCallback) -> CallHandle {
        self.schedule(self.now.get() + delay.as_secs_f64(), callback)
    }
}
