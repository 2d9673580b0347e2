//! Theme preference and resolution
//!
//! The user picks one of three [`ThemeMode`]s. `Auto` follows the system
//! appearance signal live; `Light` and `Dark` pin the resolved [`Theme`]
//! regardless of later system changes.

use crate::error::{CoreError, CoreResult};
use crate::preference::{PreferenceStore, THEME_KEY};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// User-selected theme mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemeMode {
    /// Follow the system appearance
    #[default]
    Auto,
    /// Always light
    Light,
    /// Always dark
    Dark,
}

impl ThemeMode {
    /// Stored string form
    pub fn as_str(&self) -> &'static str {
        match self {
            ThemeMode::Auto => "auto",
            ThemeMode::Light => "light",
            ThemeMode::Dark => "dark",
        }
    }

    /// Next mode in the `auto -> light -> dark -> auto` cycle
    pub fn next(&self) -> Self {
        match self {
            ThemeMode::Auto => ThemeMode::Light,
            ThemeMode::Light => ThemeMode::Dark,
            ThemeMode::Dark => ThemeMode::Auto,
        }
    }

    /// One-letter toggle label
    pub fn label(&self) -> &'static str {
        match self {
            ThemeMode::Auto => "A",
            ThemeMode::Light => "L",
            ThemeMode::Dark => "D",
        }
    }

    /// Tooltip text for the toggle
    pub fn title(&self) -> &'static str {
        match self {
            ThemeMode::Auto => "Theme: follow system",
            ThemeMode::Light => "Theme: light",
            ThemeMode::Dark => "Theme: dark",
        }
    }
}

impl fmt::Display for ThemeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ThemeMode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "auto" => Ok(ThemeMode::Auto),
            "light" => Ok(ThemeMode::Light),
            "dark" => Ok(ThemeMode::Dark),
            other => Err(CoreError::InvalidPreference {
                key: THEME_KEY.to_string(),
                value: other.to_string(),
            }),
        }
    }
}

/// Concrete theme applied to the interface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    /// Light palette
    Light,
    /// Dark palette
    Dark,
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Theme::Light => f.write_str("light"),
            Theme::Dark => f.write_str("dark"),
        }
    }
}

/// System light/dark appearance signal
///
/// The platform integration (or a test) feeds changes through [`set`](Self::set);
/// consumers hold a `watch` receiver.
#[derive(Debug)]
pub struct SystemAppearance {
    tx: watch::Sender<Theme>,
}

impl SystemAppearance {
    /// Create a signal with an initial appearance
    pub fn new(initial: Theme) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx }
    }

    /// Current system appearance
    pub fn current(&self) -> Theme {
        *self.tx.borrow()
    }

    /// Publish a system appearance change
    pub fn set(&self, theme: Theme) {
        self.tx.send_if_modified(|current| {
            if *current == theme {
                false
            } else {
                *current = theme;
                true
            }
        });
    }

    /// Subscribe to appearance changes
    pub fn subscribe(&self) -> watch::Receiver<Theme> {
        self.tx.subscribe()
    }
}

impl Default for SystemAppearance {
    fn default() -> Self {
        Self::new(Theme::Light)
    }
}

/// Owns the theme mode, its persistence, and the applied theme
#[derive(Debug)]
pub struct ThemeManager {
    mode: ThemeMode,
    applied: Theme,
    store: Arc<dyn PreferenceStore>,
    appearance: watch::Receiver<Theme>,
}

impl ThemeManager {
    /// Load the stored mode (unknown or unreadable values fall back to `auto`)
    pub fn load(store: Arc<dyn PreferenceStore>, appearance: watch::Receiver<Theme>) -> Self {
        let mode = match store.get(THEME_KEY) {
            Ok(Some(raw)) => raw.parse().unwrap_or_else(|e| {
                warn!("Ignoring stored theme: {}", e);
                ThemeMode::Auto
            }),
            Ok(None) => ThemeMode::Auto,
            Err(e) => {
                warn!("Failed to read theme preference: {}", e);
                ThemeMode::Auto
            }
        };

        let mut manager = Self {
            mode,
            applied: Theme::Light,
            store,
            appearance,
        };
        manager.appearance.mark_unchanged();
        manager.applied = manager.resolved();
        debug!(mode = %manager.mode, theme = %manager.applied, "Theme loaded");
        manager
    }

    /// Current mode
    pub fn mode(&self) -> ThemeMode {
        self.mode
    }

    /// Theme the current mode resolves to right now
    pub fn resolved(&self) -> Theme {
        match self.mode {
            ThemeMode::Auto => *self.appearance.borrow(),
            ThemeMode::Light => Theme::Light,
            ThemeMode::Dark => Theme::Dark,
        }
    }

    /// Theme last applied to the interface
    pub fn applied(&self) -> Theme {
        self.applied
    }

    /// Switch mode, persist it, and apply the resolved theme
    ///
    /// A failed write leaves the current mode and theme in place.
    pub fn set_mode(&mut self, mode: ThemeMode) -> CoreResult<Theme> {
        self.store.set(THEME_KEY, mode.as_str())?;
        self.mode = mode;
        self.applied = self.resolved();
        info!(mode = %mode, theme = %self.applied, "Theme mode changed");
        Ok(self.applied)
    }

    /// Advance to the next mode in the cycle
    pub fn cycle(&mut self) -> CoreResult<ThemeMode> {
        let next = self.mode.next();
        self.set_mode(next)?;
        Ok(next)
    }

    /// Apply a pending system appearance change
    ///
    /// Returns the newly applied theme when it changed. Outside `auto` the
    /// change is consumed without affecting the applied theme.
    pub fn sync_system(&mut self) -> Option<Theme> {
        if !self.appearance.has_changed().unwrap_or(false) {
            return None;
        }
        self.appearance.mark_unchanged();
        self.reapply()
    }

    /// Wait for the next system appearance change and apply it
    ///
    /// Returns `None` once the appearance signal is gone.
    pub async fn next_system_change(&mut self) -> Option<Theme> {
        loop {
            self.appearance.changed().await.ok()?;
            self.appearance.mark_unchanged();
            if let Some(theme) = self.reapply() {
                return Some(theme);
            }
        }
    }

    fn reapply(&mut self) -> Option<Theme> {
        if self.mode != ThemeMode::Auto {
            return None;
        }
        let resolved = self.resolved();
        if resolved == self.applied {
            return None;
        }
        self.applied = resolved;
        debug!(theme = %resolved, "Applied system appearance");
        Some(resolved)
    }
}
