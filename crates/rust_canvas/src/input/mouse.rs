//! Toolkit-independent mouse event synthesis
//!
//! Every canvas owns one [`MouseEventState`]. Adapters feed it raw
//! press/release/move/wheel input; it keeps track of the pressed buttons and
//! the open press, throttles moves, links drag events together and detects
//! double-clicks for toolkits that cannot report them natively.

use std::cell::RefCell;
use std::rc::Rc;

use super::{Modifiers, MouseButton};

/// Maximum time between two presses recognized as a double-click (seconds)
pub const DOUBLE_CLICK_THRESHOLD: f64 = 0.30;

/// Minimum spacing between two delivered move events (seconds)
pub const MOVE_THROTTLE: f64 = 0.010;

/// Timing parameters of the synthesizer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InputTiming {
    /// Maximum gap between two presses for a double-click
    pub double_click_threshold: f64,
    /// Minimum gap between two move events
    pub move_throttle: f64,
}

impl Default for InputTiming {
    fn default() -> Self {
        Self {
            double_click_threshold: DOUBLE_CLICK_THRESHOLD,
            move_throttle: MOVE_THROTTLE,
        }
    }
}

/// Kind of a synthesized mouse event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseEventKind {
    /// Button went down
    Press,
    /// Button went up
    Release,
    /// Pointer moved
    Move,
    /// Wheel or trackpad scroll
    Wheel,
    /// Second press of a double-click
    DoubleClick,
}

/// Raw input as reported by an adapter
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MouseInput {
    /// Pointer position in logical pixels
    pub pos: (f64, f64),
    /// Modifiers held at the time
    pub modifiers: Modifiers,
    /// Scroll amount, only meaningful for wheel input
    pub delta: (f64, f64),
    /// Timestamp in seconds
    pub time: f64,
}

impl MouseInput {
    /// Input at `pos` stamped with `time`
    pub fn new(pos: (f64, f64), time: f64) -> Self {
        Self {
            pos,
            modifiers: Modifiers::empty(),
            delta: (0.0, 0.0),
            time,
        }
    }

    /// Attach keyboard modifiers
    pub fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }

    /// Attach a scroll delta
    pub fn with_delta(mut self, delta: (f64, f64)) -> Self {
        self.delta = delta;
        self
    }
}

/// A normalized mouse event delivered to canvas handlers
#[derive(Debug)]
pub struct MouseEvent {
    /// What happened
    pub kind: MouseEventKind,
    /// Pointer position in logical pixels
    pub pos: (f64, f64),
    /// Button that triggered the event; for moves during a drag, the drag button
    pub button: Option<MouseButton>,
    /// Buttons held down after this event was applied, in press order
    pub buttons: Vec<MouseButton>,
    /// Modifiers held at the time
    pub modifiers: Modifiers,
    /// Scroll amount
    pub delta: (f64, f64),
    /// Timestamp in seconds
    pub time: f64,
    press_event: Option<Rc<MouseEvent>>,
    last_event: RefCell<Option<Rc<MouseEvent>>>,
}

impl MouseEvent {
    fn new(
        kind: MouseEventKind,
        button: Option<MouseButton>,
        input: &MouseInput,
        press_event: Option<Rc<MouseEvent>>,
        last_event: Option<Rc<MouseEvent>>,
    ) -> Self {
        Self {
            kind,
            pos: input.pos,
            button,
            buttons: Vec::new(),
            modifiers: input.modifiers,
            delta: input.delta,
            time: input.time,
            press_event,
            last_event: RefCell::new(last_event),
        }
    }

    /// The press that was open when this event was generated
    pub fn press_event(&self) -> Option<Rc<MouseEvent>> {
        self.press_event.clone()
    }

    /// The event delivered just before this one, unless the chain was broken
    pub fn last_event(&self) -> Option<Rc<MouseEvent>> {
        self.last_event.borrow().clone()
    }

    /// Whether a button was held when this event was generated
    pub fn is_dragging(&self) -> bool {
        self.press_event.is_some()
    }

    /// Positions of the drag that led to this event, oldest first
    ///
    /// Walks back through the linked events up to (not including) the press
    /// that started the drag. Returns `None` when no drag is in progress.
    pub fn trail(&self) -> Option<Vec<(f64, f64)>> {
        if !self.is_dragging() {
            return None;
        }
        let mut positions = Vec::new();
        if self.kind != MouseEventKind::Press {
            positions.push(self.pos);
            let mut cursor = self.last_event();
            while let Some(event) = cursor {
                if event.kind == MouseEventKind::Press {
                    break;
                }
                positions.push(event.pos);
                cursor = event.last_event();
            }
        }
        positions.reverse();
        Some(positions)
    }

    fn forget_last_event(&self) {
        self.last_event.replace(None);
    }
}

/// Per-canvas mouse bookkeeping
///
/// `open_presses` holds one press per button currently down, oldest first.
/// The pressed-button set and the open press are both derived from it, so
/// the open press is `None` exactly when no button is down.
#[derive(Debug, Default)]
pub struct MouseEventState {
    timing: InputTiming,
    open_presses: Vec<Rc<MouseEvent>>,
    last_event: Option<Rc<MouseEvent>>,
    last_mouse_press: Option<Rc<MouseEvent>>,
    last_move_time: Option<f64>,
}

impl MouseEventState {
    /// Create an empty state with the given timings
    pub fn new(timing: InputTiming) -> Self {
        Self {
            timing,
            ..Self::default()
        }
    }

    /// Timings in use
    pub fn timing(&self) -> InputTiming {
        self.timing
    }

    /// Buttons currently held, in press order
    pub fn buttons(&self) -> Vec<MouseButton> {
        self.open_presses.iter().filter_map(|press| press.button).collect()
    }

    /// The press that started the current drag
    pub fn press_event(&self) -> Option<Rc<MouseEvent>> {
        self.open_presses.first().cloned()
    }

    /// Most recently delivered event
    pub fn last_event(&self) -> Option<Rc<MouseEvent>> {
        self.last_event.clone()
    }

    /// Most recent press, used for double-click timing
    pub fn last_mouse_press(&self) -> Option<Rc<MouseEvent>> {
        self.last_mouse_press.clone()
    }

    /// Record a button press and return the event to deliver
    pub fn press(&mut self, button: MouseButton, input: &MouseInput) -> Rc<MouseEvent> {
        let mut event = MouseEvent::new(
            MouseEventKind::Press,
            Some(button),
            input,
            self.press_event(),
            self.last_event.clone(),
        );

        // A second press of a held button means the toolkit dropped a release
        self.open_presses.retain(|press| press.button != Some(button));
        event.buttons = self.buttons();
        event.buttons.push(button);

        let event = Rc::new(event);
        self.open_presses.push(Rc::clone(&event));
        self.last_event = Some(Rc::clone(&event));
        event
    }

    /// Compare `press` with the previous press and synthesize a double-click
    ///
    /// Must be called once per press by adapters without native double-click
    /// delivery.
    #[allow(clippy::float_cmp)]
    pub fn detect_double_click(&mut self, press: &Rc<MouseEvent>) -> Option<Rc<MouseEvent>> {
        let previous = self.last_mouse_press.replace(Rc::clone(press));
        let previous = previous?;

        let is_double = press.time - previous.time <= self.timing.double_click_threshold
            && previous.pos == press.pos
            && previous.button == press.button;
        if !is_double {
            return None;
        }

        let input = MouseInput {
            pos: press.pos,
            modifiers: press.modifiers,
            delta: (0.0, 0.0),
            time: press.time,
        };
        let button = press.button?;
        Some(self.double_click(button, &input))
    }

    /// Build a double-click event, either natively reported or synthesized
    pub fn double_click(&mut self, button: MouseButton, input: &MouseInput) -> Rc<MouseEvent> {
        let mut event = MouseEvent::new(
            MouseEventKind::DoubleClick,
            Some(button),
            input,
            self.press_event(),
            self.last_event.clone(),
        );
        event.buttons = self.buttons();
        Rc::new(event)
    }

    /// Record a pointer move; `None` when throttled
    pub fn movement(&mut self, input: &MouseInput) -> Option<Rc<MouseEvent>> {
        if let Some(previous) = self.last_move_time {
            if input.time - previous < self.timing.move_throttle {
                return None;
            }
        }
        self.last_move_time = Some(input.time);

        let press = self.press_event();
        let button = match &press {
            Some(press) => press.button,
            None => {
                // Nothing held: the chain ends here
                if let Some(last) = &self.last_event {
                    last.forget_last_event();
                }
                None
            }
        };

        let mut event = MouseEvent::new(
            MouseEventKind::Move,
            button,
            input,
            press,
            self.last_event.clone(),
        );
        event.buttons = self.buttons();

        let event = Rc::new(event);
        self.last_event = Some(Rc::clone(&event));
        Some(event)
    }

    /// Record a button release and return the event to deliver
    pub fn release(&mut self, button: MouseButton, input: &MouseInput) -> Rc<MouseEvent> {
        let press = self.press_event();
        self.open_presses.retain(|open| open.button != Some(button));

        let mut event = MouseEvent::new(
            MouseEventKind::Release,
            Some(button),
            input,
            press,
            self.last_event.clone(),
        );
        event.buttons = self.buttons();

        let event = Rc::new(event);
        self.last_event = Some(Rc::clone(&event));
        event
    }

    /// Build a wheel event; wheel input does not extend the event chain
    pub fn wheel(&mut self, input: &MouseInput) -> Rc<MouseEvent> {
        let mut event = MouseEvent::new(
            MouseEventKind::Wheel,
            None,
            input,
            self.press_event(),
            self.last_event.clone(),
        );
        event.buttons = self.buttons();
        Rc::new(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(x: f64, y: f64, time: f64) -> MouseInput {
        MouseInput::new((x, y), time)
    }

    fn press_with_detection(
        state: &mut MouseEventState,
        button: MouseButton,
        input: &MouseInput,
    ) -> Option<Rc<MouseEvent>> {
        let press = state.press(button, input);
        state.detect_double_click(&press)
    }

    #[test]
    fn test_buttons_track_unmatched_presses() {
        let mut state = MouseEventState::default();
        assert!(state.press_event().is_none());

        state.press(MouseButton::Left, &at(0.0, 0.0, 0.0));
        assert_eq!(state.buttons(), vec![MouseButton::Left]);

        state.press(MouseButton::Right, &at(0.0, 0.0, 0.1));
        assert_eq!(state.buttons(), vec![MouseButton::Left, MouseButton::Right]);
        assert_eq!(state.press_event().and_then(|p| p.button), Some(MouseButton::Left));

        // Releasing the drag button hands the drag to the remaining one
        let release = state.release(MouseButton::Left, &at(0.0, 0.0, 0.2));
        assert_eq!(release.buttons, vec![MouseButton::Right]);
        assert_eq!(state.press_event().and_then(|p| p.button), Some(MouseButton::Right));

        state.release(MouseButton::Right, &at(0.0, 0.0, 0.3));
        assert!(state.buttons().is_empty());
        assert!(state.press_event().is_none());
    }

    #[test]
    fn test_release_without_press_is_harmless() {
        let mut state = MouseEventState::default();
        let release = state.release(MouseButton::Middle, &at(1.0, 1.0, 0.0));
        assert!(release.buttons.is_empty());
        assert!(state.press_event().is_none());
    }

    #[test]
    fn test_repeated_press_of_held_button_counts_once() {
        let mut state = MouseEventState::default();
        state.press(MouseButton::Left, &at(0.0, 0.0, 0.0));
        state.press(MouseButton::Left, &at(5.0, 0.0, 1.0));
        assert_eq!(state.buttons(), vec![MouseButton::Left]);
        state.release(MouseButton::Left, &at(5.0, 0.0, 1.1));
        assert!(state.press_event().is_none());
    }

    #[test]
    fn test_double_click_within_threshold() {
        let mut state = MouseEventState::default();
        assert!(press_with_detection(&mut state, MouseButton::Left, &at(10.0, 10.0, 1.0)).is_none());
        state.release(MouseButton::Left, &at(10.0, 10.0, 1.05));

        let double = press_with_detection(&mut state, MouseButton::Left, &at(10.0, 10.0, 1.25))
            .expect("double-click expected");
        assert_eq!(double.kind, MouseEventKind::DoubleClick);
        assert_eq!(double.button, Some(MouseButton::Left));
        assert_eq!(double.pos, (10.0, 10.0));
    }

    #[test]
    fn test_no_double_click_when_moved_late_or_other_button() {
        let mut state = MouseEventState::default();
        press_with_detection(&mut state, MouseButton::Left, &at(10.0, 10.0, 0.0));
        state.release(MouseButton::Left, &at(10.0, 10.0, 0.01));
        // Moved by one pixel
        assert!(press_with_detection(&mut state, MouseButton::Left, &at(11.0, 10.0, 0.1)).is_none());
        state.release(MouseButton::Left, &at(11.0, 10.0, 0.11));
        // Too late
        assert!(press_with_detection(&mut state, MouseButton::Left, &at(11.0, 10.0, 0.5)).is_none());
        state.release(MouseButton::Left, &at(11.0, 10.0, 0.51));
        // Different button
        assert!(press_with_detection(&mut state, MouseButton::Right, &at(11.0, 10.0, 0.6)).is_none());
    }

    #[test]
    fn test_threshold_is_inclusive_and_configurable() {
        let timing = InputTiming { double_click_threshold: 0.5, ..InputTiming::default() };
        let mut state = MouseEventState::new(timing);
        press_with_detection(&mut state, MouseButton::Left, &at(0.0, 0.0, 0.0));
        state.release(MouseButton::Left, &at(0.0, 0.0, 0.1));
        assert!(press_with_detection(&mut state, MouseButton::Left, &at(0.0, 0.0, 0.5)).is_some());
    }

    #[test]
    fn test_triple_click_compares_with_preceding_press() {
        let mut state = MouseEventState::default();
        let mut doubles = 0;
        for i in 0..3 {
            let time = f64::from(i) * 0.2;
            if press_with_detection(&mut state, MouseButton::Left, &at(3.0, 3.0, time)).is_some() {
                doubles += 1;
            }
            state.release(MouseButton::Left, &at(3.0, 3.0, time + 0.01));
        }
        assert_eq!(doubles, 2);
    }

    #[test]
    fn test_moves_are_throttled() {
        let mut state = MouseEventState::default();
        assert!(state.movement(&at(0.0, 0.0, 0.000)).is_some());
        assert!(state.movement(&at(1.0, 0.0, 0.004)).is_none());
        assert!(state.movement(&at(2.0, 0.0, 0.011)).is_some());
    }

    #[test]
    fn test_move_without_button_breaks_chain() {
        let mut state = MouseEventState::default();
        let first = state.movement(&at(0.0, 0.0, 0.0)).unwrap();
        let second = state.movement(&at(1.0, 0.0, 0.1)).unwrap();
        assert!(Rc::ptr_eq(&second.last_event().unwrap(), &first));

        let third = state.movement(&at(2.0, 0.0, 0.2)).unwrap();
        assert!(second.last_event().is_none());
        assert!(third.button.is_none());
        assert!(third.trail().is_none());
    }

    #[test]
    fn test_drag_moves_carry_press_button_and_trail() {
        let mut state = MouseEventState::default();
        state.movement(&at(0.0, 0.0, 0.0));
        state.press(MouseButton::Right, &at(0.0, 0.0, 0.1));
        state.movement(&at(1.0, 1.0, 0.2));
        state.movement(&at(2.0, 2.0, 0.3));
        let last = state.movement(&at(3.0, 3.0, 0.4)).unwrap();

        assert_eq!(last.button, Some(MouseButton::Right));
        assert_eq!(last.buttons, vec![MouseButton::Right]);
        assert_eq!(last.trail().unwrap(), vec![(1.0, 1.0), (2.0, 2.0), (3.0, 3.0)]);
    }

    #[test]
    fn test_wheel_keeps_delta_and_modifiers() {
        let mut state = MouseEventState::default();
        let input = at(4.0, 4.0, 0.0)
            .with_delta((0.0, -1.5))
            .with_modifiers(Modifiers::SHIFT);
        let wheel = state.wheel(&input);
        assert_eq!(wheel.kind, MouseEventKind::Wheel);
        assert_eq!(wheel.delta, (0.0, -1.5));
        assert!(wheel.modifiers.contains(Modifiers::SHIFT));
        assert!(state.last_event().is_none());
    }
}
