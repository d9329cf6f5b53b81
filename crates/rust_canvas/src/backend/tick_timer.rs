//! Timers for toolkits without native timer support
//!
//! A [`TickTimer`] only fires when its application backend ticks it during
//! `process_events()`. The [`TimerRegistry`] keeps the timers of one
//! application in registration order.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::time::Duration;

use super::TimerBackend;
use crate::foundation::time::Clock;
use crate::timer::TimerTarget;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Schedule {
    deadline: f64,
    interval: f64,
}

/// Timer ticked by hand against a [`Clock`]
pub struct TickTimer {
    clock: Rc<dyn Clock>,
    target: TimerTarget,
    schedule: Cell<Option<Schedule>>,
}

impl TickTimer {
    /// Unscheduled timer delivering to `target`
    pub fn new(clock: Rc<dyn Clock>, target: TimerTarget) -> Self {
        Self {
            clock,
            target,
            schedule: Cell::new(None),
        }
    }

    /// Fire if the deadline has passed; returns whether it fired
    ///
    /// The timer re-arms before the callback runs, so a callback that stops
    /// or restarts the timer has the last word.
    pub fn tick(&self) -> bool {
        let Some(schedule) = self.schedule.get() else {
            return false;
        };
        let now = self.clock.now();
        if now < schedule.deadline {
            return false;
        }
        self.schedule.set(Some(Schedule {
            deadline: now + schedule.interval,
            interval: schedule.interval,
        }));
        self.target.fire();
        true
    }

    /// Whether a schedule is pending
    pub fn is_armed(&self) -> bool {
        self.schedule.get().is_some()
    }

    /// Time of the next expiry
    pub fn deadline(&self) -> Option<f64> {
        self.schedule.get().map(|schedule| schedule.deadline)
    }
}

impl TimerBackend for TickTimer {
    fn start(&self, interval: Duration) {
        let interval = interval.as_secs_f64();
        self.schedule.set(Some(Schedule {
            deadline: self.clock.now() + interval,
            interval,
        }));
    }

    fn stop(&self) {
        self.schedule.set(None);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Outstanding tick timers of one application backend
#[derive(Default)]
pub struct TimerRegistry {
    timers: RefCell<Vec<Weak<TickTimer>>>,
}

impl TimerRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Track `timer`; dropped timers are pruned on the next tick
    pub fn register(&self, timer: &Rc<TickTimer>) {
        self.timers.borrow_mut().push(Rc::downgrade(timer));
    }

    /// Tick every live timer in registration order; returns how many fired
    pub fn tick_all(&self) -> usize {
        let timers = self.live();
        timers.iter().filter(|timer| timer.tick()).count()
    }

    /// Cancel every pending schedule
    pub fn stop_all(&self) {
        for timer in self.live() {
            timer.stop();
        }
    }

    /// Number of live timers
    pub fn len(&self) -> usize {
        self.live().len()
    }

    /// Whether no live timer is registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Earliest pending deadline
    pub fn next_deadline(&self) -> Option<f64> {
        self.live()
            .iter()
            .filter_map(|timer| timer.deadline())
            .reduce(f64::min)
    }

    fn live(&self) -> Vec<Rc<TickTimer>> {
        let mut timers = self.timers.borrow_mut();
        timers.retain(|timer| timer.strong_count() > 0);
        timers.iter().filter_map(Weak::upgrade).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::headless_app;
    use crate::timer::{Timer, TimerEvent};

    #[test]
    fn test_timers_tick_in_registration_order() {
        let (app, clock) = headless_app();
        let order = Rc::new(RefCell::new(Vec::new()));

        let timers: Vec<Timer> = ["first", "second", "third"]
            .iter()
            .map(|name| {
                let timer = Timer::new(&app, Duration::from_millis(10)).unwrap();
                let sink = Rc::clone(&order);
                let name = (*name).to_string();
                timer.connect(move |event| {
                    if matches!(event, TimerEvent::Timeout { .. }) {
                        sink.borrow_mut().push(name.clone());
                    }
                });
                timer.start();
                timer
            })
            .collect();

        clock.advance(0.01);
        app.process_events();
        assert_eq!(*order.borrow(), vec!["first", "second", "third"]);
        drop(timers);
    }

    #[test]
    fn test_dropped_timers_are_pruned() {
        let (app, _clock) = headless_app();
        let timer = Timer::new(&app, Duration::from_millis(10)).unwrap();
        let registry = app
            .backend()
            .as_any()
            .downcast_ref::<crate::backend::headless::HeadlessApp>()
            .map(|headless| headless.timer_count());
        assert_eq!(registry, Some(1));

        drop(timer);
        let registry = app
            .backend()
            .as_any()
            .downcast_ref::<crate::backend::headless::HeadlessApp>()
            .map(|headless| headless.timer_count());
        assert_eq!(registry, Some(0));
    }
}
