//! Canvas event hub
//! Key principles:
//! - Typed events (one enum, no string keys)
//! - Handler returns bool (true = consumed, stops forwarding)
//! - Registration per event type (only notify interested handlers)
//! - Emission never holds a borrow while handlers run, so handlers may
//!   connect, disconnect, close the canvas or stop timers re-entrantly

use std::cell::RefCell;
use std::rc::Rc;

use log::debug;

use crate::input::{Key, Modifiers, MouseEvent, MouseEventKind};

/// Event type identification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    /// GL context is ready, emitted once before the first draw
    Initialize,
    /// Canvas size changed
    Resize,
    /// Canvas needs to be redrawn
    Draw,
    /// Canvas was closed
    Close,
    /// Mouse button went down
    MousePress,
    /// Mouse button went up
    MouseRelease,
    /// Pointer moved
    MouseMove,
    /// Wheel scrolled
    MouseWheel,
    /// Double-click detected
    MouseDoubleClick,
    /// Key went down
    KeyPress,
    /// Key went up
    KeyRelease,
}

/// Area of the canvas to redraw, in logical pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    /// Left edge
    pub x: u32,
    /// Top edge
    pub y: u32,
    /// Width
    pub width: u32,
    /// Height
    pub height: u32,
}

impl Region {
    /// Region covering a whole canvas of `size`
    pub const fn full(size: (u32, u32)) -> Self {
        Self { x: 0, y: 0, width: size.0, height: size.1 }
    }
}

/// A keyboard event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyEvent {
    /// Normalized key, `None` when the toolkit reported something unknown
    pub key: Option<Key>,
    /// Text produced by the key, possibly empty
    pub text: String,
    /// Modifiers held at the time
    pub modifiers: Modifiers,
}

/// Everything a canvas can emit
#[derive(Debug, Clone)]
pub enum CanvasEvent {
    /// GL context is ready
    Initialize,
    /// New logical and physical (framebuffer) size
    Resize {
        /// Logical size
        size: (u32, u32),
        /// Physical size in device pixels
        physical_size: (u32, u32),
    },
    /// Redraw request; `None` means the whole canvas
    Draw {
        /// Area to redraw
        region: Option<Region>,
    },
    /// Canvas closed
    Close,
    /// Any mouse event, see [`MouseEvent::kind`]
    Mouse(Rc<MouseEvent>),
    /// Key went down
    KeyPress(KeyEvent),
    /// Key went up
    KeyRelease(KeyEvent),
}

impl CanvasEvent {
    /// Type used to route the event to handlers
    pub fn event_type(&self) -> EventType {
        match self {
            Self::Initialize => EventType::Initialize,
            Self::Resize { .. } => EventType::Resize,
            Self::Draw { .. } => EventType::Draw,
            Self::Close => EventType::Close,
            Self::Mouse(event) => match event.kind {
                MouseEventKind::Press => EventType::MousePress,
                MouseEventKind::Release => EventType::MouseRelease,
                MouseEventKind::Move => EventType::MouseMove,
                MouseEventKind::Wheel => EventType::MouseWheel,
                MouseEventKind::DoubleClick => EventType::MouseDoubleClick,
            },
            Self::KeyPress(_) => EventType::KeyPress,
            Self::KeyRelease(_) => EventType::KeyRelease,
        }
    }

    /// The mouse payload, if any
    pub fn as_mouse(&self) -> Option<&Rc<MouseEvent>> {
        match self {
            Self::Mouse(event) => Some(event),
            _ => None,
        }
    }
}

/// Event handler trait
/// Returns true if event was consumed (stops forwarding)
/// Returns false to allow forwarding to other handlers
pub trait EventHandler {
    /// Handle an event, return true if consumed
    fn on_event(&mut self, event: &CanvasEvent) -> bool;
}

struct FnHandler<F>(F);

impl<F: FnMut(&CanvasEvent)> EventHandler for FnHandler<F> {
    fn on_event(&mut self, event: &CanvasEvent) -> bool {
        (self.0)(event);
        false
    }
}

/// Identifies one registration for [`EventHub::disconnect`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

type SharedHandler = Rc<RefCell<dyn EventHandler>>;

struct Registration {
    id: HandlerId,
    event_type: EventType,
    handler: SharedHandler,
}

#[derive(Default)]
struct HubInner {
    next_id: u64,
    registrations: Vec<Registration>,
}

/// Per-canvas registry of event handlers
///
/// Cloning yields another handle to the same registry. Handlers that need the
/// canvas should capture a weak handle to it, otherwise the canvas keeps
/// itself alive.
#[derive(Clone, Default)]
pub struct EventHub {
    inner: Rc<RefCell<HubInner>>,
}

impl EventHub {
    /// Create an empty hub
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a closure for one event type; closures never consume events
    pub fn connect<F>(&self, event_type: EventType, callback: F) -> HandlerId
    where
        F: FnMut(&CanvasEvent) + 'static,
    {
        self.connect_handler(event_type, FnHandler(callback))
    }

    /// Register a handler for a specific event type
    /// Only handlers registered for this type will be notified
    pub fn connect_handler<H>(&self, event_type: EventType, handler: H) -> HandlerId
    where
        H: EventHandler + 'static,
    {
        let mut inner = self.inner.borrow_mut();
        let id = HandlerId(inner.next_id);
        inner.next_id += 1;
        inner.registrations.push(Registration {
            id,
            event_type,
            handler: Rc::new(RefCell::new(handler)),
        });
        id
    }

    /// Remove a registration; returns false if it was already gone
    pub fn disconnect(&self, id: HandlerId) -> bool {
        let mut inner = self.inner.borrow_mut();
        let before = inner.registrations.len();
        inner.registrations.retain(|registration| registration.id != id);
        inner.registrations.len() != before
    }

    /// Number of handlers registered for `event_type`
    pub fn handler_count(&self, event_type: EventType) -> usize {
        self.inner
            .borrow()
            .registrations
            .iter()
            .filter(|registration| registration.event_type == event_type)
            .count()
    }

    /// Dispatch to registered handlers in registration order
    /// Stops on first handler that returns true (consumed)
    pub fn emit(&self, event: &CanvasEvent) -> bool {
        let event_type = event.event_type();
        let handlers: Vec<SharedHandler> = self
            .inner
            .borrow()
            .registrations
            .iter()
            .filter(|registration| registration.event_type == event_type)
            .map(|registration| Rc::clone(&registration.handler))
            .collect();

        for handler in handlers {
            let Ok(mut handler) = handler.try_borrow_mut() else {
                debug!("Skipping re-entrant {event_type:?} handler");
                continue;
            };
            if handler.on_event(event) {
                // Event consumed, stop forwarding
                return true;
            }
        }
        false
    }
}

impl std::fmt::Debug for EventHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventHub")
            .field("handlers", &self.inner.borrow().registrations.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct ConsumingHandler {
        calls: Rc<Cell<u32>>,
    }

    impl EventHandler for ConsumingHandler {
        fn on_event(&mut self, _event: &CanvasEvent) -> bool {
            self.calls.set(self.calls.get() + 1);
            true
        }
    }

    #[test]
    fn test_only_matching_handlers_are_notified() {
        let hub = EventHub::new();
        let draws = Rc::new(Cell::new(0));
        let closes = Rc::new(Cell::new(0));

        let counter = Rc::clone(&draws);
        hub.connect(EventType::Draw, move |_| counter.set(counter.get() + 1));
        let counter = Rc::clone(&closes);
        hub.connect(EventType::Close, move |_| counter.set(counter.get() + 1));

        hub.emit(&CanvasEvent::Draw { region: None });
        hub.emit(&CanvasEvent::Draw { region: Some(Region::full((4, 4))) });

        assert_eq!(draws.get(), 2);
        assert_eq!(closes.get(), 0);
    }

    #[test]
    fn test_consumed_event_stops_forwarding() {
        let hub = EventHub::new();
        let consumed = Rc::new(Cell::new(0));
        let after = Rc::new(Cell::new(0));

        hub.connect_handler(EventType::Close, ConsumingHandler { calls: Rc::clone(&consumed) });
        let counter = Rc::clone(&after);
        hub.connect(EventType::Close, move |_| counter.set(counter.get() + 1));

        assert!(hub.emit(&CanvasEvent::Close));
        assert_eq!(consumed.get(), 1);
        assert_eq!(after.get(), 0);
    }

    #[test]
    fn test_disconnect() {
        let hub = EventHub::new();
        let id = hub.connect(EventType::Resize, |_| {});
        assert_eq!(hub.handler_count(EventType::Resize), 1);
        assert!(hub.disconnect(id));
        assert!(!hub.disconnect(id));
        assert_eq!(hub.handler_count(EventType::Resize), 0);
    }

    #[test]
    fn test_handler_may_emit_and_connect_reentrantly() {
        let hub = EventHub::new();
        let calls = Rc::new(Cell::new(0));

        let inner_hub = hub.clone();
        let counter = Rc::clone(&calls);
        hub.connect(EventType::Draw, move |_| {
            counter.set(counter.get() + 1);
            inner_hub.connect(EventType::Close, |_| {});
            // Re-entering the running handler is skipped, not a panic
            inner_hub.emit(&CanvasEvent::Draw { region: None });
        });

        hub.emit(&CanvasEvent::Draw { region: None });
        assert_eq!(calls.get(), 1);
        assert_eq!(hub.handler_count(EventType::Close), 1);
    }
}
