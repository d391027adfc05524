//! Live pointer set, kept in arrival order.

use crate::pointer::{Buttons, Point, PointerEvent, PointerId, TargetId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Down,
    Moving,
}

#[derive(Debug, Clone)]
pub struct Pointer {
    pub id: PointerId,
    /// Target the pointer went down on; later events stay captured to it.
    pub target: TargetId,
    pub screen: Point,
    pub previous_screen: Point,
    /// Surface-space position after the host's coordinate transform.
    pub position: Point,
    pub previous_position: Point,
    pub pressure: f32,
    pub buttons: Buttons,
    pub liveness: Liveness,
    pub down_ms: u64,
    pub last_ms: u64,
    /// Accumulated screen-space travel since down.
    pub moved: f32,
    pub(crate) seq: u64,
    pub(crate) eligible_ms: u64,
}

impl Pointer {
    pub fn age_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.down_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Moved,
    /// Below the motion threshold with unchanged pressure and buttons.
    Coalesced,
    /// No live pointer with that identity (e.g. mouse hover).
    Ignored,
}

#[derive(Debug)]
pub struct PointerTracker {
    pointers: Vec<Pointer>,
    next_seq: u64,
    move_epsilon: f32,
}

impl Default for PointerTracker {
    fn default() -> Self {
        Self::new(0.0)
    }
}

impl PointerTracker {
    pub fn new(move_epsilon: f32) -> Self {
        Self {
            pointers: Vec::new(),
            next_seq: 0,
            move_epsilon: move_epsilon.max(0.0),
        }
    }

    pub fn len(&self) -> usize {
        self.pointers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pointers.is_empty()
    }

    pub fn get(&self, id: PointerId) -> Option<&Pointer> {
        self.pointers.iter().find(|p| p.id == id)
    }

    /// All live pointers, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Pointer> {
        self.pointers.iter()
    }

    pub fn on_target<'a>(&'a self, target: &'a TargetId) -> impl Iterator<Item = &'a Pointer> + 'a {
        self.pointers.iter().filter(move |p| &p.target == target)
    }

    pub fn on_pointer_down(&mut self, ev: &PointerEvent, logical: Point) {
        // a repeated down replaces the stale record; callers handle the loss first
        self.pointers.retain(|p| p.id != ev.pointer);
        let seq = self.next_seq;
        self.next_seq += 1;
        self.pointers.push(Pointer {
            id: ev.pointer,
            target: ev.target.clone(),
            screen: ev.position,
            previous_screen: ev.position,
            position: logical,
            previous_position: logical,
            pressure: ev.pressure,
            buttons: ev.buttons,
            liveness: Liveness::Down,
            down_ms: ev.time_ms,
            last_ms: ev.time_ms,
            moved: 0.0,
            seq,
            eligible_ms: ev.time_ms,
        });
    }

    pub fn on_pointer_move(&mut self, ev: &PointerEvent, logical: Point) -> Transition {
        let epsilon = self.move_epsilon;
        let Some(p) = self.pointers.iter_mut().find(|p| p.id == ev.pointer) else {
            return Transition::Ignored;
        };
        let step = p.screen.distance(ev.position);
        if step < epsilon && p.pressure == ev.pressure && p.buttons == ev.buttons {
            return Transition::Coalesced;
        }
        p.previous_screen = p.screen;
        p.previous_position = p.position;
        p.screen = ev.position;
        p.position = logical;
        p.pressure = ev.pressure;
        p.buttons = ev.buttons;
        p.moved += step;
        p.last_ms = ev.time_ms;
        p.liveness = Liveness::Moving;
        Transition::Moved
    }

    /// Removes the pointer, returning its last state.
    pub fn on_pointer_up(&mut self, id: PointerId) -> Option<Pointer> {
        let idx = self.pointers.iter().position(|p| p.id == id)?;
        Some(self.pointers.remove(idx))
    }

    pub(crate) fn reset_eligibility(&mut self, id: PointerId, now_ms: u64) {
        if let Some(p) = self.pointers.iter_mut().find(|p| p.id == id) {
            p.eligible_ms = now_ms;
        }
    }
}
