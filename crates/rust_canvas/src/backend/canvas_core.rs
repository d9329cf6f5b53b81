//! Shared canvas event plumbing
//!
//! Adapters own a [`CanvasCore`] and forward raw native input to it. The core
//! runs the mouse synthesizer and emits the normalized events on the canvas'
//! [`EventHub`]. The synthesizer borrow is always released before emitting so
//! handlers can call back into the canvas.

use std::cell::RefCell;
use std::rc::Rc;

use crate::events::{CanvasEvent, EventHub, KeyEvent, Region};
use crate::input::{InputTiming, Key, Modifiers, MouseButton, MouseEvent, MouseEventState, MouseInput};

/// Event synthesizer and emitter owned by every canvas adapter
#[derive(Debug)]
pub struct CanvasCore {
    hub: EventHub,
    mouse: RefCell<MouseEventState>,
    native_double_click: bool,
}

impl CanvasCore {
    /// Build a core emitting on `hub`
    ///
    /// With `native_double_click` the manual double-click detection is
    /// skipped and the adapter reports double-clicks itself.
    pub fn new(hub: EventHub, timing: InputTiming, native_double_click: bool) -> Self {
        Self {
            hub,
            mouse: RefCell::new(MouseEventState::new(timing)),
            native_double_click,
        }
    }

    /// Hub the events are emitted on
    pub fn events(&self) -> &EventHub {
        &self.hub
    }

    /// Buttons currently held
    pub fn buttons(&self) -> Vec<MouseButton> {
        self.mouse.borrow().buttons()
    }

    /// Emit `initialize`
    pub fn initialize(&self) {
        self.hub.emit(&CanvasEvent::Initialize);
    }

    /// Emit `resize`
    pub fn resize(&self, size: (u32, u32), physical_size: (u32, u32)) {
        self.hub.emit(&CanvasEvent::Resize { size, physical_size });
    }

    /// Emit `draw`
    pub fn draw(&self, region: Option<Region>) {
        self.hub.emit(&CanvasEvent::Draw { region });
    }

    /// Emit `close`
    pub fn close(&self) {
        self.hub.emit(&CanvasEvent::Close);
    }

    /// Deliver a button press, followed by a synthesized double-click if any
    pub fn mouse_press(&self, button: MouseButton, input: MouseInput) -> Rc<MouseEvent> {
        let (press, double_click) = {
            let mut mouse = self.mouse.borrow_mut();
            let press = mouse.press(button, &input);
            let double_click = if self.native_double_click {
                None
            } else {
                mouse.detect_double_click(&press)
            };
            (press, double_click)
        };

        self.hub.emit(&CanvasEvent::Mouse(Rc::clone(&press)));
        if let Some(double_click) = double_click {
            self.hub.emit(&CanvasEvent::Mouse(double_click));
        }
        press
    }

    /// Deliver a button release
    pub fn mouse_release(&self, button: MouseButton, input: MouseInput) -> Rc<MouseEvent> {
        let release = self.mouse.borrow_mut().release(button, &input);
        self.hub.emit(&CanvasEvent::Mouse(Rc::clone(&release)));
        release
    }

    /// Deliver a pointer move unless throttled
    pub fn mouse_move(&self, input: MouseInput) -> Option<Rc<MouseEvent>> {
        let movement = self.mouse.borrow_mut().movement(&input)?;
        self.hub.emit(&CanvasEvent::Mouse(Rc::clone(&movement)));
        Some(movement)
    }

    /// Deliver a scroll
    pub fn mouse_wheel(&self, input: MouseInput) -> Rc<MouseEvent> {
        let wheel = self.mouse.borrow_mut().wheel(&input);
        self.hub.emit(&CanvasEvent::Mouse(Rc::clone(&wheel)));
        wheel
    }

    /// Deliver a double-click reported by the toolkit
    pub fn mouse_double_click(&self, button: MouseButton, input: MouseInput) -> Rc<MouseEvent> {
        let double_click = self.mouse.borrow_mut().double_click(button, &input);
        self.hub.emit(&CanvasEvent::Mouse(Rc::clone(&double_click)));
        double_click
    }

    /// Deliver a key press
    pub fn key_press(&self, key: Option<Key>, text: impl Into<String>, modifiers: Modifiers) {
        self.hub.emit(&CanvasEvent::KeyPress(KeyEvent {
            key,
            text: text.into(),
            modifiers,
        }));
    }

    /// Deliver a key release
    pub fn key_release(&self, key: Option<Key>, text: impl Into<String>, modifiers: Modifiers) {
        self.hub.emit(&CanvasEvent::KeyRelease(KeyEvent {
            key,
            text: text.into(),
            modifiers,
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventType;
    use crate::input::MouseEventKind;

    fn recording_core(native_double_click: bool) -> (CanvasCore, Rc<RefCell<Vec<EventType>>>) {
        let hub = EventHub::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        for event_type in [
            EventType::MousePress,
            EventType::MouseRelease,
            EventType::MouseMove,
            EventType::MouseDoubleClick,
            EventType::KeyPress,
        ] {
            let seen = Rc::clone(&seen);
            hub.connect(event_type, move |event| seen.borrow_mut().push(event.event_type()));
        }
        (CanvasCore::new(hub, InputTiming::default(), native_double_click), seen)
    }

    #[test]
    fn test_press_then_double_click_order() {
        let (core, seen) = recording_core(false);
        core.mouse_press(MouseButton::Left, MouseInput::new((1.0, 1.0), 0.0));
        core.mouse_release(MouseButton::Left, MouseInput::new((1.0, 1.0), 0.05));
        core.mouse_press(MouseButton::Left, MouseInput::new((1.0, 1.0), 0.1));

        assert_eq!(
            *seen.borrow(),
            vec![
                EventType::MousePress,
                EventType::MouseRelease,
                EventType::MousePress,
                EventType::MouseDoubleClick,
            ]
        );
    }

    #[test]
    fn test_native_double_click_skips_detection() {
        let (core, seen) = recording_core(true);
        core.mouse_press(MouseButton::Left, MouseInput::new((1.0, 1.0), 0.0));
        core.mouse_press(MouseButton::Left, MouseInput::new((1.0, 1.0), 0.1));
        assert!(!seen.borrow().contains(&EventType::MouseDoubleClick));

        let double = core.mouse_double_click(MouseButton::Left, MouseInput::new((1.0, 1.0), 0.1));
        assert_eq!(double.kind, MouseEventKind::DoubleClick);
        assert_eq!(seen.borrow().last(), Some(&EventType::MouseDoubleClick));
    }

    #[test]
    fn test_handler_can_query_core_during_emit() {
        let hub = EventHub::new();
        let core = Rc::new(CanvasCore::new(hub.clone(), InputTiming::default(), false));
        let observed = Rc::new(RefCell::new(Vec::new()));

        let weak = Rc::downgrade(&core);
        let sink = Rc::clone(&observed);
        hub.connect(EventType::MousePress, move |_| {
            if let Some(core) = weak.upgrade() {
                sink.borrow_mut().extend(core.buttons());
            }
        });

        core.mouse_press(MouseButton::Middle, MouseInput::new((0.0, 0.0), 0.0));
        assert_eq!(*observed.borrow(), vec![MouseButton::Middle]);
    }

    #[test]
    fn test_key_events_carry_text() {
        let (core, _) = recording_core(false);
        let texts = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&texts);
        core.events().connect(EventType::KeyPress, move |event| {
            if let CanvasEvent::KeyPress(key) = event {
                sink.borrow_mut().push((key.key, key.text.clone()));
            }
        });

        core.key_press(Some(Key::Char('A')), "a", Modifiers::empty());
        assert_eq!(*texts.borrow(), vec![(Some(Key::Char('A')), "a".to_string())]);
    }
}
