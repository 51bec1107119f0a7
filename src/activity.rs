//! Activity signals: per-shape "elevated" flags and last user interaction.
//!
//! The lifecycle loop only ever reads these, once per tick. They are written by
//! the UI layer (pointer and keyboard handlers) and by browser-host notifications
//! (playback started, devtools opened, download finished, ...).

use crate::clock::Millis;
use crate::ids::ShapeId;
use bitflags::bitflags;
use std::collections::HashMap;
use std::fmt::Display;
use std::sync::RwLock;

bitflags! {
    /// Signals that keep a tab hot no matter where it is on the canvas.
    #[derive(Default)]
    pub struct TabFlags: u8 {
        const AUDIBLE   = 0b00001;
        const CAPTURING = 0b00010;
        const DEVTOOLS  = 0b00100;
        const DOWNLOADS = 0b01000;
        const PINNED    = 0b10000;
    }
}

impl TabFlags {
    pub fn from_signals(audible: bool, capturing: bool, devtools: bool, downloads: bool, pinned: bool) -> Self {
        let mut flags = TabFlags::empty();
        flags.set(TabFlags::AUDIBLE, audible);
        flags.set(TabFlags::CAPTURING, capturing);
        flags.set(TabFlags::DEVTOOLS, devtools);
        flags.set(TabFlags::DOWNLOADS, downloads);
        flags.set(TabFlags::PINNED, pinned);
        flags
    }

    /// Elevated tabs are never demoted.
    pub fn is_elevated(&self) -> bool {
        !self.is_empty()
    }
}

impl Display for TabFlags {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut parts = Vec::new();

        if self.contains(TabFlags::AUDIBLE) {
            parts.push("audible");
        }
        if self.contains(TabFlags::CAPTURING) {
            parts.push("capturing");
        }
        if self.contains(TabFlags::DEVTOOLS) {
            parts.push("devtools");
        }
        if self.contains(TabFlags::DOWNLOADS) {
            parts.push("downloads");
        }
        if self.contains(TabFlags::PINNED) {
            parts.push("pinned");
        }

        if parts.is_empty() {
            write!(f, "none")
        } else {
            write!(f, "{}", parts.join("+"))
        }
    }
}

/// Read-only view of the activity signals, keyed by shape.
pub trait ActivityOracle: Send + Sync {
    /// Flags for the shape; unknown shapes have no flags.
    fn flags(&self, shape: &ShapeId) -> TabFlags;

    /// Last time the user interacted with the shape, `None` if never.
    fn last_interaction_ms(&self, shape: &ShapeId) -> Option<Millis>;
}

#[derive(Debug, Default, Clone, Copy)]
struct ShapeActivity {
    flags: TabFlags,
    last_interaction: Option<Millis>,
}

/// In-memory [`ActivityOracle`] that the UI layer writes into.
#[derive(Debug, Default)]
pub struct ActivityBoard {
    shapes: RwLock<HashMap<ShapeId, ShapeActivity>>,
}

impl ActivityBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a pointer/keyboard interaction. Older timestamps never overwrite newer ones.
    pub fn record_interaction(&self, shape: &ShapeId, at: Millis) {
        let mut guard = self.shapes.write().unwrap_or_else(|e| e.into_inner());
        let entry = guard.entry(shape.clone()).or_default();
        entry.last_interaction = Some(entry.last_interaction.map_or(at, |prev| prev.max(at)));
    }

    pub fn set_flag(&self, shape: &ShapeId, flag: TabFlags, on: bool) {
        let mut guard = self.shapes.write().unwrap_or_else(|e| e.into_inner());
        guard.entry(shape.clone()).or_default().flags.set(flag, on);
    }

    pub fn set_flags(&self, shape: &ShapeId, flags: TabFlags) {
        let mut guard = self.shapes.write().unwrap_or_else(|e| e.into_inner());
        guard.entry(shape.clone()).or_default().flags = flags;
    }

    /// Forget everything about a shape (e.g. it was deleted from the canvas).
    pub fn clear(&self, shape: &ShapeId) {
        let mut guard = self.shapes.write().unwrap_or_else(|e| e.into_inner());
        guard.remove(shape);
    }
}

impl ActivityOracle for ActivityBoard {
    fn flags(&self, shape: &ShapeId) -> TabFlags {
        let guard = self.shapes.read().unwrap_or_else(|e| e.into_inner());
        guard.get(shape).map(|a| a.flags).unwrap_or_default()
    }

    fn last_interaction_ms(&self, shape: &ShapeId) -> Option<Millis> {
        let guard = self.shapes.read().unwrap_or_else(|e| e.into_inner());
        guard
            .get(shape)
            .and_then(|a| a.last_interaction)
            .filter(|ts| *ts > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_display() {
        assert_eq!(TabFlags::empty().to_string(), "none");
        assert_eq!(TabFlags::AUDIBLE.to_string(), "audible");
        assert_eq!((TabFlags::PINNED | TabFlags::DEVTOOLS).to_string(), "devtools+pinned");
    }

    #[test]
    fn any_flag_elevates() {
        assert!(!TabFlags::default().is_elevated());
        assert!(TabFlags::from_signals(false, false, false, true, false).is_elevated());
        assert_eq!(
            TabFlags::from_signals(true, true, true, true, true),
            TabFlags::all()
        );
    }

    #[test]
    fn unknown_shape_has_nothing() {
        let board = ActivityBoard::new();
        let shape = ShapeId::from("nope");
        assert_eq!(board.flags(&shape), TabFlags::empty());
        assert_eq!(board.last_interaction_ms(&shape), None);
    }

    #[test]
    fn interactions_only_move_forward() {
        let board = ActivityBoard::new();
        let shape = ShapeId::from("s");
        board.record_interaction(&shape, 500);
        board.record_interaction(&shape, 200);
        assert_eq!(board.last_interaction_ms(&shape), Some(500));
    }

    #[test]
    fn zero_timestamp_counts_as_never() {
        let board = ActivityBoard::new();
        let shape = ShapeId::from("s");
        board.record_interaction(&shape, 0);
        assert_eq!(board.last_interaction_ms(&shape), None);
    }

    #[test]
    fn set_and_clear_flags() {
        let board = ActivityBoard::new();
        let shape = ShapeId::from("s");
        board.set_flag(&shape, TabFlags::AUDIBLE, true);
        board.set_flag(&shape, TabFlags::PINNED, true);
        board.set_flag(&shape, TabFlags::AUDIBLE, false);
        assert_eq!(board.flags(&shape), TabFlags::PINNED);

        board.clear(&shape);
        assert_eq!(board.flags(&shape), TabFlags::empty());
    }
}
