//! Event loop integration with an interactive prompt
//!
//! An [`InteractiveHook`] is called from the prompt's idle callback. Each
//! call runs one [`Application::process_events`] pass and then waits at most
//! the configured budget, so windows stay responsive while the prompt reads
//! input. While a hook is installed [`Application::run`] returns immediately.

pub mod host_loop;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info};

use crate::application::Application;
use crate::error::AppError;
use crate::foundation::time::Stopwatch;

pub use host_loop::{CallHandle, HostCallback, HostLoop, ManualHostLoop, TokioHostLoop};

/// Outcome of one hook invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookStatus {
    /// The prompt has input to read
    InputReady,
    /// An interrupt was requested; the request is consumed
    Interrupted,
    /// Nothing happened within the budget
    Idle,
}

/// Requests that a running hook return; can be sent to a signal handler thread
#[derive(Debug, Clone)]
pub struct InterruptHandle {
    flag: Arc<AtomicBool>,
}

impl InterruptHandle {
    /// Ask the hook to return at its next check
    pub fn interrupt(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }
}

/// Idle callback driving an application from a prompt
pub struct InteractiveHook {
    app: Application,
    budget: Duration,
    interrupt: Arc<AtomicBool>,
}

impl InteractiveHook {
    /// Put `app` in interactive mode
    ///
    /// Only one hook may be installed per application.
    pub fn install(app: &Application) -> Result<Self, AppError> {
        if app.is_interactive() {
            return Err(AppError::Configuration(format!(
                "An interactive hook is already installed on '{}'",
                app.backend_name()
            )));
        }
        app.set_interactive(true);
        info!("Interactive hook installed on '{}'", app.backend_name());
        Ok(Self {
            app: app.clone(),
            budget: app.config().interactive_budget(),
            interrupt: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Override the per-invocation wait
    #[must_use]
    pub fn with_budget(mut self, budget: Duration) -> Self {
        self.budget = budget;
        self
    }

    /// Per-invocation wait
    pub fn budget(&self) -> Duration {
        self.budget
    }

    /// Handle that interrupts this hook
    pub fn interrupt_handle(&self) -> InterruptHandle {
        InterruptHandle {
            flag: Arc::clone(&self.interrupt),
        }
    }

    /// One invocation: dispatch pending events, then wait out the budget
    /// unless input is ready or an interrupt arrived
    pub fn poll(&self, input_ready: impl FnOnce() -> bool) -> HookStatus {
        let stopwatch = Stopwatch::start_new();
        if self.take_interrupt() {
            return HookStatus::Interrupted;
        }

        self.app.process_events();

        if self.take_interrupt() {
            return HookStatus::Interrupted;
        }
        if input_ready() {
            return HookStatus::InputReady;
        }

        let remaining = stopwatch.remaining(self.budget);
        if !remaining.is_zero() {
            std::thread::sleep(remaining);
        }
        HookStatus::Idle
    }

    /// Invoke repeatedly until input is ready or an interrupt arrives
    pub fn run_until(&self, mut input_ready: impl FnMut() -> bool) -> HookStatus {
        loop {
            match self.poll(&mut input_ready) {
                HookStatus::Idle => {}
                status => return status,
            }
        }
    }

    fn take_interrupt(&self) -> bool {
        let interrupted = self.interrupt.swap(false, Ordering::SeqCst);
        if interrupted {
            debug!("Interactive hook interrupted");
        }
        interrupted
    }
}

impl Drop for InteractiveHook {
    fn drop(&mut self) {
        self.app.set_interactive(false);
        info!("Interactive hook removed from '{}'", self.app.backend_name());
    }
}
