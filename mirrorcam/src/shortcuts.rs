//! Keyboard shortcuts

use std::fmt;

/// Action bound to a key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Shortcut {
    /// Take a photo (`Space` or `Enter`)
    Photo,
    /// Toggle fullscreen preview (`F`)
    Fullscreen,
    /// Start or stop recording (`R`)
    Record,
}

impl Shortcut {
    /// Map a physical key code (`Space`, `Enter`, `KeyF`, `KeyR`) to an action
    ///
    /// Codes are matched case-sensitively, as keyboard event codes are.
    /// Bare letters (`f`, `R`) are accepted too, for terminal front ends.
    pub fn from_key_code(code: &str) -> Option<Self> {
        match code {
            "Space" | "Enter" | "NumpadEnter" | " " => Some(Shortcut::Photo),
            "KeyF" | "f" | "F" => Some(Shortcut::Fullscreen),
            "KeyR" | "r" | "R" => Some(Shortcut::Record),
            _ => None,
        }
    }
}

impl fmt::Display for Shortcut {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Shortcut::Photo => "photo",
            Shortcut::Fullscreen => "fullscreen",
            Shortcut::Record => "record",
        };
        f.write_str(name)
    }
}
