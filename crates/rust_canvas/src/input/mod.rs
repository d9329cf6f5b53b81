//! Input vocabulary shared by every backend
//!
//! Buttons, keys and modifiers are normalized here so that handlers never see
//! toolkit-specific codes.

pub mod mouse;

pub use mouse::{InputTiming, MouseEvent, MouseEventKind, MouseEventState, MouseInput};

use bitflags::bitflags;

/// Mouse buttons
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    /// Left mouse button
    Left,
    /// Right mouse button
    Right,
    /// Middle mouse button
    Middle,
    /// Any further button, numbered from 4
    Other(u8),
}

impl MouseButton {
    /// Map the 1-based button numbering (1 = left, 2 = right, 3 = middle)
    pub const fn from_index(index: u8) -> Self {
        match index {
            1 => Self::Left,
            2 => Self::Right,
            3 => Self::Middle,
            other => Self::Other(other),
        }
    }

    /// 1-based button number
    pub const fn index(self) -> u8 {
        match self {
            Self::Left => 1,
            Self::Right => 2,
            Self::Middle => 3,
            Self::Other(other) => other,
        }
    }
}

bitflags! {
    /// Keyboard modifiers held during an input event
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Modifiers: u8 {
        /// Shift
        const SHIFT = 1 << 0;
        /// Control
        const CONTROL = 1 << 1;
        /// Alt / Option
        const ALT = 1 << 2;
        /// Meta / Super / Command
        const META = 1 << 3;
    }
}

/// Normalized key identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    /// Shift key
    Shift,
    /// Control key
    Control,
    /// Alt key
    Alt,
    /// Meta key
    Meta,
    /// Up arrow
    Up,
    /// Down arrow
    Down,
    /// Left arrow
    Left,
    /// Right arrow
    Right,
    /// Page up
    PageUp,
    /// Page down
    PageDown,
    /// Home
    Home,
    /// End
    End,
    /// Insert
    Insert,
    /// Delete
    Delete,
    /// Backspace
    Backspace,
    /// Tab
    Tab,
    /// Enter / Return
    Enter,
    /// Escape
    Escape,
    /// Space bar
    Space,
    /// Function key F1..F12
    F(u8),
    /// Any printable key, upper-cased
    Char(char),
}

const NAMED_KEYS: &[(Key, &str)] = &[
    (Key::Shift, "Shift"),
    (Key::Control, "Control"),
    (Key::Alt, "Alt"),
    (Key::Meta, "Meta"),
    (Key::Up, "Up"),
    (Key::Down, "Down"),
    (Key::Left, "Left"),
    (Key::Right, "Right"),
    (Key::PageUp, "PageUp"),
    (Key::PageDown, "PageDown"),
    (Key::Home, "Home"),
    (Key::End, "End"),
    (Key::Insert, "Insert"),
    (Key::Delete, "Delete"),
    (Key::Backspace, "Backspace"),
    (Key::Tab, "Tab"),
    (Key::Enter, "Enter"),
    (Key::Escape, "Escape"),
    (Key::Space, "Space"),
];

impl Key {
    /// Canonical name, e.g. `"Escape"`, `"F5"` or `"A"`
    pub fn name(&self) -> String {
        match self {
            Self::F(n) => format!("F{n}"),
            Self::Char(c) => c.to_string(),
            named => NAMED_KEYS
                .iter()
                .find(|(key, _)| key == named)
                .map_or_else(String::new, |(_, name)| (*name).to_string()),
        }
    }

    /// Parse a key name as sent by browser frontends ("ArrowUp", "a", "F3", " ")
    pub fn from_name(name: &str) -> Option<Self> {
        let trimmed = match name {
            "ArrowUp" => "Up",
            "ArrowDown" => "Down",
            "ArrowLeft" => "Left",
            "ArrowRight" => "Right",
            "Return" => "Enter",
            "Esc" => "Escape",
            "Ctrl" => "Control",
            " " => "Space",
            other => other,
        };

        if let Some((key, _)) = NAMED_KEYS
            .iter()
            .find(|(_, key_name)| key_name.eq_ignore_ascii_case(trimmed))
        {
            return Some(*key);
        }

        if let Some(number) = trimmed.strip_prefix('F').and_then(|n| n.parse::<u8>().ok()) {
            if (1..=12).contains(&number) {
                return Some(Self::F(number));
            }
        }

        let mut chars = trimmed.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Some(Self::Char(c.to_ascii_uppercase())),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_button_index_round_trip() {
        assert_eq!(MouseButton::from_index(1), MouseButton::Left);
        assert_eq!(MouseButton::from_index(3), MouseButton::Middle);
        assert_eq!(MouseButton::from_index(7), MouseButton::Other(7));
        assert_eq!(MouseButton::Right.index(), 2);
    }

    #[test]
    fn test_key_from_browser_names() {
        assert_eq!(Key::from_name("ArrowUp"), Some(Key::Up));
        assert_eq!(Key::from_name("a"), Some(Key::Char('A')));
        assert_eq!(Key::from_name("F11"), Some(Key::F(11)));
        assert_eq!(Key::from_name(" "), Some(Key::Space));
        assert_eq!(Key::from_name("escape"), Some(Key::Escape));
        assert_eq!(Key::from_name("Unidentified"), None);
    }

    #[test]
    fn test_key_names() {
        assert_eq!(Key::PageDown.name(), "PageDown");
        assert_eq!(Key::F(2).name(), "F2");
        assert_eq!(Key::Char('Q').name(), "Q");
    }
}
