//! Per-tab lifecycle state machine.
//!
//! Every tracked tab has exactly one [`LifecycleState`], stored in a single
//! register keyed by [`TabId`]. Transitions only happen through the methods on
//! [`TabRegister`], and each transition queues the host commands it needs in a
//! [`TickEffects`] buffer:
//!
//! | from            | to        | host commands      |
//! |-----------------|-----------|--------------------|
//! | untracked       | hot       | thaw, show         |
//! | warm / frozen   | hot       | thaw, show         |
//! | hot             | warm      | hide               |
//! | warm            | frozen    | freeze             |
//! | warm / frozen   | discarded | hide, destroy      |
//!
//! Discarded tabs leave the register entirely. Their ids are remembered as
//! tombstones so a canvas that keeps reporting a destroyed tab never gets it
//! promoted again; the canvas has to assign a new tab id instead. A tombstone is
//! only needed while its shape still points at the dead id, see
//! [`TabRegister::retain_tombstones`].

use crate::clock::Millis;
use crate::host::HostCommand;
use crate::ids::{ShapeId, TabId};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// Live, attached to the canvas and rendering.
    Hot,
    /// Running but detached from the canvas.
    Warm,
    /// Suspended by the engine; resuming has a cold-start cost.
    Frozen,
    /// Destroyed. Terminal.
    Discarded,
}

impl LifecycleState {
    pub fn can_transition_to(self, next: LifecycleState) -> bool {
        use LifecycleState::*;
        matches!(
            (self, next),
            (Hot, Warm) | (Warm, Hot) | (Frozen, Hot) | (Warm, Frozen) | (Warm, Discarded) | (Frozen, Discarded)
        )
    }

    pub fn is_hidden(self) -> bool {
        matches!(self, LifecycleState::Warm | LifecycleState::Frozen)
    }
}

impl Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LifecycleState::Hot => write!(f, "hot"),
            LifecycleState::Warm => write!(f, "warm"),
            LifecycleState::Frozen => write!(f, "frozen"),
            LifecycleState::Discarded => write!(f, "discarded"),
        }
    }
}

/// A state change of one tab, reported to observers after the tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateChange {
    pub tab_id: TabId,
    pub shape_id: ShapeId,
    /// `None` when the tab was not tracked before.
    pub from: Option<LifecycleState>,
    pub to: LifecycleState,
}

/// Commands and state changes produced during one tick, flushed once the tick is done.
#[derive(Debug, Default)]
pub struct TickEffects {
    pub commands: Vec<HostCommand>,
    pub changes: Vec<StateChange>,
}

impl TickEffects {
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty() && self.changes.is_empty()
    }

    fn record(&mut self, tab_id: &TabId, shape_id: &ShapeId, from: Option<LifecycleState>, to: LifecycleState) {
        log::debug!(
            "tab {} (shape {}): {} -> {}",
            tab_id,
            shape_id,
            from.map_or_else(|| "untracked".to_string(), |s| s.to_string()),
            to
        );
        self.changes.push(StateChange {
            tab_id: tab_id.clone(),
            shape_id: shape_id.clone(),
            from,
            to,
        });
    }
}

#[derive(Debug, Clone)]
pub struct TrackedTab {
    pub shape_id: ShapeId,
    pub state: LifecycleState,
    /// Hidden time accumulated over idle ticks since the tab left `Hot`.
    pub hidden_for_ms: Millis,
    /// When the tab left `Hot`.
    pub hidden_since: Option<Millis>,
    /// Last tick on which the tab's shape was visible.
    pub last_visible_at: Option<Millis>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TabSnapshot {
    pub tab_id: TabId,
    pub shape_id: ShapeId,
    pub state: LifecycleState,
    pub hidden_for_ms: Millis,
    pub last_visible_at: Option<Millis>,
}

#[derive(Debug, Default)]
pub struct TabRegister {
    tabs: HashMap<TabId, TrackedTab>,
    by_shape: HashMap<ShapeId, TabId>,
    /// Destroyed tab ids and the shape they belonged to.
    tombstones: HashMap<TabId, ShapeId>,
}

impl TabRegister {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tabs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tabs.is_empty()
    }

    pub fn get(&self, tab_id: &TabId) -> Option<&TrackedTab> {
        self.tabs.get(tab_id)
    }

    pub fn state_of(&self, tab_id: &TabId) -> Option<LifecycleState> {
        self.tabs.get(tab_id).map(|t| t.state)
    }

    pub fn is_hot(&self, tab_id: &TabId) -> bool {
        self.state_of(tab_id) == Some(LifecycleState::Hot)
    }

    pub fn is_discarded(&self, tab_id: &TabId) -> bool {
        self.tombstones.contains_key(tab_id)
    }

    pub fn tombstone_count(&self) -> usize {
        self.tombstones.len()
    }

    /// Tab currently tracked for a shape.
    pub fn tab_for_shape(&self, shape_id: &ShapeId) -> Option<&TabId> {
        self.by_shape.get(shape_id)
    }

    /// Hot tabs with their shapes, sorted by tab id.
    pub fn hot_tabs(&self) -> Vec<(TabId, ShapeId)> {
        self.tabs_in(|s| s == LifecycleState::Hot)
    }

    /// Warm and frozen tabs with their shapes, sorted by tab id.
    pub fn hidden_tabs(&self) -> Vec<(TabId, ShapeId)> {
        self.tabs_in(LifecycleState::is_hidden)
    }

    fn tabs_in(&self, pred: impl Fn(LifecycleState) -> bool) -> Vec<(TabId, ShapeId)> {
        let mut out: Vec<_> = self
            .tabs
            .iter()
            .filter(|(_, t)| pred(t.state))
            .map(|(id, t)| (id.clone(), t.shape_id.clone()))
            .collect();
        out.sort();
        out
    }

    pub fn mark_visible(&mut self, tab_id: &TabId, now: Millis) {
        if let Some(tab) = self.tabs.get_mut(tab_id) {
            tab.last_visible_at = Some(now);
        }
    }

    /// Make a tab hot. Returns false if it already is, or if it was discarded.
    pub fn promote(&mut self, tab_id: &TabId, shape_id: &ShapeId, now: Millis, fx: &mut TickEffects) -> bool {
        if self.tombstones.contains_key(tab_id) {
            log::debug!("tab {} was discarded, not promoting it again", tab_id);
            return false;
        }

        let from = self.state_of(tab_id);
        if from == Some(LifecycleState::Hot) {
            return false;
        }
        debug_assert!(from.map_or(true, |s| s.can_transition_to(LifecycleState::Hot)));

        self.tabs.insert(
            tab_id.clone(),
            TrackedTab {
                shape_id: shape_id.clone(),
                state: LifecycleState::Hot,
                hidden_for_ms: 0,
                hidden_since: None,
                last_visible_at: Some(now),
            },
        );
        self.by_shape.insert(shape_id.clone(), tab_id.clone());

        fx.commands.push(HostCommand::Thaw(tab_id.clone()));
        fx.commands.push(HostCommand::Show(tab_id.clone()));
        fx.record(tab_id, shape_id, from, LifecycleState::Hot);
        true
    }

    /// Hot -> warm. Starts the hidden timer.
    pub fn demote(&mut self, tab_id: &TabId, now: Millis, fx: &mut TickEffects) -> bool {
        let Some(tab) = self.tabs.get_mut(tab_id) else {
            return false;
        };
        if tab.state != LifecycleState::Hot {
            return false;
        }

        tab.state = LifecycleState::Warm;
        tab.hidden_for_ms = 0;
        tab.hidden_since = Some(now);

        fx.commands.push(HostCommand::Hide(tab_id.clone()));
        let shape_id = tab.shape_id.clone();
        fx.record(tab_id, &shape_id, Some(LifecycleState::Hot), LifecycleState::Warm);
        true
    }

    /// Warm -> frozen.
    pub fn freeze(&mut self, tab_id: &TabId, fx: &mut TickEffects) -> bool {
        let Some(tab) = self.tabs.get_mut(tab_id) else {
            return false;
        };
        if tab.state != LifecycleState::Warm {
            return false;
        }

        tab.state = LifecycleState::Frozen;

        fx.commands.push(HostCommand::Freeze(tab_id.clone()));
        let shape_id = tab.shape_id.clone();
        fx.record(tab_id, &shape_id, Some(LifecycleState::Warm), LifecycleState::Frozen);
        true
    }

    /// Warm or frozen -> discarded. Drops all tracking for the tab.
    pub fn discard(&mut self, tab_id: &TabId, fx: &mut TickEffects) -> bool {
        match self.state_of(tab_id) {
            Some(state) if state.is_hidden() => {}
            _ => return false,
        }
        self.remove(tab_id, fx)
    }

    /// Destroy a tab regardless of its state, e.g. because its shape was deleted.
    pub fn remove(&mut self, tab_id: &TabId, fx: &mut TickEffects) -> bool {
        let Some(tab) = self.tabs.remove(tab_id) else {
            return false;
        };
        if self.by_shape.get(&tab.shape_id) == Some(tab_id) {
            self.by_shape.remove(&tab.shape_id);
        }
        self.tombstones.insert(tab_id.clone(), tab.shape_id.clone());

        fx.commands.push(HostCommand::Hide(tab_id.clone()));
        fx.commands.push(HostCommand::Destroy(tab_id.clone()));
        fx.record(tab_id, &tab.shape_id, Some(tab.state), LifecycleState::Discarded);
        true
    }

    /// Add idle time to a hidden tab's timer and return the new total.
    pub fn advance_hidden(&mut self, tab_id: &TabId, delta_ms: Millis) -> Option<Millis> {
        let tab = self.tabs.get_mut(tab_id)?;
        if !tab.state.is_hidden() {
            return None;
        }
        tab.hidden_for_ms = tab.hidden_for_ms.saturating_add(delta_ms);
        Some(tab.hidden_for_ms)
    }

    /// Keep only the tombstones for which `still_reported(tab, shape)` holds, i.e. the
    /// shape is still assigned the destroyed id. Returns how many were dropped.
    pub fn retain_tombstones(&mut self, mut still_reported: impl FnMut(&TabId, &ShapeId) -> bool) -> usize {
        let before = self.tombstones.len();
        self.tombstones.retain(|tab_id, shape_id| still_reported(tab_id, shape_id));
        before - self.tombstones.len()
    }

    pub fn snapshot(&self) -> Vec<TabSnapshot> {
        let mut out: Vec<_> = self
            .tabs
            .iter()
            .map(|(id, t)| TabSnapshot {
                tab_id: id.clone(),
                shape_id: t.shape_id.clone(),
                state: t.state,
                hidden_for_ms: t.hidden_for_ms,
                last_visible_at: t.last_visible_at,
            })
            .collect();
        out.sort_by(|a, b| a.tab_id.cmp(&b.tab_id));
        out
    }
}
