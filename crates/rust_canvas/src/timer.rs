//! Public timer wrapper

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::time::Duration;

use log::debug;

use crate::application::{Application, ApplicationInner};
use crate::backend::TimerBackend;
use crate::error::AppError;
use crate::foundation::time::Clock;

/// Notifications delivered to timer callbacks
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TimerEvent {
    /// The timer was started
    Start,
    /// The timer was stopped
    Stop,
    /// The interval elapsed
    Timeout {
        /// Zero-based count of timeouts since the last start
        iteration: u64,
        /// Seconds since the last start
        elapsed: f64,
        /// Seconds since the previous timeout (or the start)
        dt: f64,
    },
}

type TimerCallback = Rc<RefCell<dyn FnMut(&TimerEvent)>>;

/// Identifies a callback registered with [`Timer::connect`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerCallbackId(u64);

struct TimerState {
    interval: Cell<Duration>,
    running: Cell<bool>,
    iter_count: Cell<u64>,
    max_iterations: Cell<Option<u64>>,
    first_emit_time: Cell<f64>,
    last_emit_time: Cell<f64>,
    callbacks: RefCell<Vec<(TimerCallbackId, TimerCallback)>>,
    next_callback_id: Cell<u64>,
    backend: RefCell<Option<Rc<dyn TimerBackend>>>,
    clock: Rc<dyn Clock>,
}

impl TimerState {
    fn backend(&self) -> Option<Rc<dyn TimerBackend>> {
        self.backend.borrow().clone()
    }

    fn emit(&self, event: &TimerEvent) {
        let callbacks: Vec<TimerCallback> = self
            .callbacks
            .borrow()
            .iter()
            .map(|(_, callback)| Rc::clone(callback))
            .collect();
        for callback in callbacks {
            match callback.try_borrow_mut() {
                Ok(mut callback) => callback(event),
                Err(_) => debug!("Skipping re-entrant timer callback for {event:?}"),
            }
        }
    }

    fn stop(&self) {
        if let Some(backend) = self.backend() {
            backend.stop();
        }
        if self.running.replace(false) {
            self.emit(&TimerEvent::Stop);
        }
    }

    fn timeout(&self) {
        if !self.running.get() {
            debug!("Timer fired while stopped, ignoring");
            return;
        }
        if self.limit_reached() {
            self.stop();
            return;
        }

        let now = self.clock.now();
        let iteration = self.iter_count.get();
        let event = TimerEvent::Timeout {
            iteration,
            elapsed: now - self.first_emit_time.get(),
            dt: now - self.last_emit_time.get(),
        };
        self.last_emit_time.set(now);
        self.iter_count.set(iteration + 1);
        self.emit(&event);

        if self.running.get() && self.limit_reached() {
            self.stop();
        }
    }

    fn limit_reached(&self) -> bool {
        self.max_iterations
            .get()
            .is_some_and(|max| self.iter_count.get() >= max)
    }
}

/// Handed to timer backends; calling [`fire`](Self::fire) delivers one timeout
///
/// Holds only weak references, so a backend that outlives its timer or its
/// application fires into nothing.
#[derive(Clone)]
pub struct TimerTarget {
    state: Weak<TimerState>,
    app: Weak<ApplicationInner>,
}

impl TimerTarget {
    /// Deliver one timeout
    pub fn fire(&self) {
        if self.app.strong_count() == 0 {
            debug!("Timer fired after the application was torn down");
            return;
        }
        let Some(state) = self.state.upgrade() else {
            debug!("Timer fired after it was dropped");
            return;
        };
        state.timeout();
    }

    /// Whether both the timer and its application still exist
    pub fn is_alive(&self) -> bool {
        self.app.strong_count() > 0 && self.state.strong_count() > 0
    }
}

impl fmt::Debug for TimerTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerTarget").field("alive", &self.is_alive()).finish()
    }
}

/// Periodic timer driven by the application's event loop
///
/// Cloning yields another handle to the same timer.
#[derive(Clone)]
pub struct Timer {
    state: Rc<TimerState>,
}

impl Timer {
    /// Create a stopped timer on `app`'s backend
    pub fn new(app: &Application, interval: Duration) -> Result<Self, AppError> {
        let state = Rc::new(TimerState {
            interval: Cell::new(interval),
            running: Cell::new(false),
            iter_count: Cell::new(0),
            max_iterations: Cell::new(None),
            first_emit_time: Cell::new(0.0),
            last_emit_time: Cell::new(0.0),
            callbacks: RefCell::new(Vec::new()),
            next_callback_id: Cell::new(0),
            backend: RefCell::new(None),
            clock: app.clock(),
        });

        let target = TimerTarget {
            state: Rc::downgrade(&state),
            app: app.downgrade(),
        };
        let backend = app.backend().create_timer(target)?;
        state.backend.replace(Some(backend));

        Ok(Self { state })
    }

    /// Stop automatically after `iterations` timeouts; `None` runs forever
    pub fn with_iterations(self, iterations: Option<u64>) -> Self {
        self.set_iterations(iterations);
        self
    }

    /// Change the iteration limit
    pub fn set_iterations(&self, iterations: Option<u64>) {
        self.state.max_iterations.set(iterations);
    }

    /// Iteration limit
    pub fn max_iterations(&self) -> Option<u64> {
        self.state.max_iterations.get()
    }

    /// Register a callback for start, stop and timeout notifications
    pub fn connect<F>(&self, callback: F) -> TimerCallbackId
    where
        F: FnMut(&TimerEvent) + 'static,
    {
        let id = TimerCallbackId(self.state.next_callback_id.get());
        self.state.next_callback_id.set(id.0 + 1);
        self.state
            .callbacks
            .borrow_mut()
            .push((id, Rc::new(RefCell::new(callback))));
        id
    }

    /// Remove a callback; returns false if it was already gone
    pub fn disconnect(&self, id: TimerCallbackId) -> bool {
        let mut callbacks = self.state.callbacks.borrow_mut();
        let before = callbacks.len();
        callbacks.retain(|(registered, _)| *registered != id);
        callbacks.len() != before
    }

    /// Remove every callback
    pub fn disconnect_all(&self) {
        self.state.callbacks.borrow_mut().clear();
    }

    /// Start (or restart) with the current interval
    pub fn start(&self) {
        self.start_with(None, None);
    }

    /// Start (or restart), first replacing the interval and the iteration
    /// limit where given
    pub fn start_with(&self, interval: Option<Duration>, iterations: Option<u64>) {
        if let Some(interval) = interval {
            self.state.interval.set(interval);
        }
        if let Some(iterations) = iterations {
            self.state.max_iterations.set(Some(iterations));
        }

        let Some(backend) = self.state.backend() else {
            return;
        };
        if self.is_running() {
            backend.stop();
        }

        let now = self.state.clock.now();
        self.state.running.set(true);
        self.state.iter_count.set(0);
        self.state.first_emit_time.set(now);
        self.state.last_emit_time.set(now);
        backend.start(self.state.interval.get());
        self.state.emit(&TimerEvent::Start);
    }

    /// Stop; safe to call repeatedly and from the timer's own callback
    pub fn stop(&self) {
        self.state.stop();
    }

    /// Whether the timer is scheduled
    pub fn is_running(&self) -> bool {
        self.state.running.get()
    }

    /// Current interval
    pub fn interval(&self) -> Duration {
        self.state.interval.get()
    }

    /// Change the interval, restarting a running timer
    pub fn set_interval(&self, interval: Duration) {
        self.state.interval.set(interval);
        if self.is_running() {
            self.stop();
            self.start();
        }
    }

    /// Timeouts delivered since the last start
    pub fn iteration(&self) -> u64 {
        self.state.iter_count.get()
    }
}

impl fmt::Debug for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Timer")
            .field("interval", &self.interval())
            .field("running", &self.is_running())
            .field("iteration", &self.iteration())
            .finish()
    }
}
