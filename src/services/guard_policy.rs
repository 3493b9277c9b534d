use std::fmt;
use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Key {
    Char(char),
    Function(u8),
}

/// A keyboard shortcut as reported by the terminal front end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct KeyChord {
    pub(crate) ctrl: bool,
    pub(crate) shift: bool,
    pub(crate) key: Key,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum InputAction {
    Copy,
    Cut,
    Paste,
    ContextMenu,
    SelectStart,
    DragStart,
    Key(KeyChord),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unrecognised input action: {0}")]
pub(crate) struct UnknownInputAction(String);

impl FromStr for InputAction {
    type Err = UnknownInputAction;

    /// Accepts event names (`copy`, `contextmenu`, ...) and chords such as
    /// `ctrl+c`, `ctrl+shift+i` or `f12`.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_ascii_lowercase();
        let action = match normalized.as_str() {
            "copy" => Self::Copy,
            "cut" => Self::Cut,
            "paste" => Self::Paste,
            "contextmenu" | "context-menu" => Self::ContextMenu,
            "selectstart" => Self::SelectStart,
            "dragstart" => Self::DragStart,
            chord => Self::Key(parse_chord(chord).ok_or_else(|| UnknownInputAction(raw.to_string()))?),
        };
        Ok(action)
    }
}

fn parse_chord(chord: &str) -> Option<KeyChord> {
    let mut ctrl = false;
    let mut shift = false;
    let mut key = None;

    for part in chord.split('+').map(str::trim) {
        match part {
            "ctrl" | "control" => ctrl = true,
            "shift" => shift = true,
            _ if key.is_some() => return None,
            _ => key = Some(parse_key(part)?),
        }
    }

    Some(KeyChord { ctrl, shift, key: key? })
}

fn parse_key(part: &str) -> Option<Key> {
    if let Some(number) = part.strip_prefix('f').filter(|rest| !rest.is_empty()) {
        return number.parse().ok().filter(|n| (1..=24).contains(n)).map(Key::Function);
    }
    let mut chars = part.chars();
    let ch = chars.next()?;
    if chars.next().is_some() {
        return None;
    }
    Some(Key::Char(ch.to_ascii_uppercase()))
}

impl fmt::Display for InputAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Copy => f.write_str("copy"),
            Self::Cut => f.write_str("cut"),
            Self::Paste => f.write_str("paste"),
            Self::ContextMenu => f.write_str("contextmenu"),
            Self::SelectStart => f.write_str("selectstart"),
            Self::DragStart => f.write_str("dragstart"),
            Self::Key(chord) => {
                if chord.ctrl {
                    f.write_str("Ctrl+")?;
                }
                if chord.shift {
                    f.write_str("Shift+")?;
                }
                match chord.key {
                    Key::Char(ch) => write!(f, "{ch}"),
                    Key::Function(n) => write!(f, "F{n}"),
                }
            }
        }
    }
}

const BLOCKED_CTRL_KEYS: [char; 7] = ['C', 'A', 'X', 'V', 'Z', 'Y', 'U'];
const BLOCKED_CTRL_SHIFT_KEYS: [char; 2] = ['I', 'J'];

/// Best-effort suppression of clipboard, context-menu and devtools input
/// while a quiz is active.
#[derive(Debug, Default)]
pub(crate) struct GuardPolicy {
    attached: bool,
}

impl GuardPolicy {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn attach(&mut self) {
        if !self.attached {
            self.attached = true;
            tracing::debug!("Input guard attached");
        }
    }

    pub(crate) fn detach(&mut self) {
        if self.attached {
            self.attached = false;
            tracing::debug!("Input guard detached");
        }
    }

    pub(crate) fn is_attached(&self) -> bool {
        self.attached
    }

    pub(crate) fn should_suppress(&self, action: InputAction) -> bool {
        self.attached && is_guarded(action)
    }
}

fn is_guarded(action: InputAction) -> bool {
    match action {
        InputAction::Key(KeyChord { key: Key::Function(12), .. }) => true,
        InputAction::Key(KeyChord { ctrl: true, shift: false, key: Key::Char(ch) }) => {
            BLOCKED_CTRL_KEYS.contains(&ch)
        }
        InputAction::Key(KeyChord { ctrl: true, shift: true, key: Key::Char(ch) }) => {
            BLOCKED_CTRL_SHIFT_KEYS.contains(&ch)
        }
        InputAction::Key(_) => false,
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn action(raw: &str) -> InputAction {
        raw.parse().expect("input action")
    }

    #[test]
    fn detached_policy_suppresses_nothing() {
        let policy = GuardPolicy::new();
        assert!(!policy.should_suppress(InputAction::Copy));
        assert!(!policy.should_suppress(action("f12")));
    }

    #[test]
    fn attached_policy_blocks_clipboard_and_devtools() {
        let mut policy = GuardPolicy::new();
        policy.attach();

        for raw in [
            "copy", "cut", "paste", "contextmenu", "selectstart", "dragstart", "ctrl+c", "Ctrl+A",
            "ctrl+x", "ctrl+v", "ctrl+z", "ctrl+y", "ctrl+u", "F12", "ctrl+shift+i", "ctrl+shift+J",
        ] {
            assert!(policy.should_suppress(action(raw)), "{raw} should be suppressed");
        }
        for raw in ["ctrl+b", "shift+i", "f5", "q", "ctrl+shift+c"] {
            assert!(!policy.should_suppress(action(raw)), "{raw} should pass through");
        }

        policy.detach();
        assert!(!policy.is_attached());
        assert!(!policy.should_suppress(action("ctrl+c")));
    }

    #[test]
    fn rejects_unparseable_actions() {
        assert!("ctrl+".parse::<InputAction>().is_err());
        assert!("ctrl+ab".parse::<InputAction>().is_err());
        assert!("f99".parse::<InputAction>().is_err());
    }

    #[test]
    fn display_renders_chords() {
        assert_eq!(action("ctrl+shift+i").to_string(), "Ctrl+Shift+I");
        assert_eq!(action("f12").to_string(), "F12");
    }
}
