//! Pointer identities, coordinates and raw pointer events.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PointerKind {
    Pen,
    Touch,
    Mouse,
}

impl PointerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PointerKind::Pen => "pen",
            PointerKind::Touch => "touch",
            PointerKind::Mouse => "mouse",
        }
    }
}

impl fmt::Display for PointerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of one physical contact. Kinds do not share an id space, so
/// `touch:1` and `pen:1` are different pointers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PointerId {
    pub kind: PointerKind,
    pub id: u32,
}

impl PointerId {
    pub const fn new(kind: PointerKind, id: u32) -> Self {
        Self { kind, id }
    }

    pub const fn pen(id: u32) -> Self {
        Self::new(PointerKind::Pen, id)
    }

    pub const fn touch(id: u32) -> Self {
        Self::new(PointerKind::Touch, id)
    }

    pub const fn mouse(id: u32) -> Self {
        Self::new(PointerKind::Mouse, id)
    }
}

impl fmt::Display for PointerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: Point) -> f32 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// Button mask reported with a pointer event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Buttons(pub u32);

impl Buttons {
    pub const NONE: Buttons = Buttons(0);
    pub const PRIMARY: Buttons = Buttons(1);
    /// Secondary mouse button, or the pen barrel button.
    pub const SECONDARY: Buttons = Buttons(2);
    pub const AUXILIARY: Buttons = Buttons(4);
    /// Pen eraser end in contact.
    pub const ERASER: Buttons = Buttons(32);

    pub fn contains(self, other: Buttons) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn intersects(self, other: Buttons) -> bool {
        self.0 & other.0 != 0
    }

    pub fn union(self, other: Buttons) -> Buttons {
        Buttons(self.0 | other.0)
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

/// Surface or element a pointer event was hit-tested against.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetId(String);

impl TargetId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TargetId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TargetId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Down,
    Move,
    Up,
    Cancel,
}

/// One raw pointer transition as delivered by the host input system.
///
/// Serialized flat, e.g.
/// `{"phase":"down","kind":"touch","id":1,"target":"canvas","x":10,"y":20,"time_ms":0}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointerEvent {
    pub phase: Phase,
    #[serde(flatten)]
    pub pointer: PointerId,
    pub target: TargetId,
    #[serde(flatten)]
    pub position: Point,
    #[serde(default)]
    pub pressure: f32,
    #[serde(default)]
    pub buttons: Buttons,
    pub time_ms: u64,
}

impl PointerEvent {
    pub fn new(
        phase: Phase,
        pointer: PointerId,
        target: impl Into<TargetId>,
        position: Point,
        time_ms: u64,
    ) -> Self {
        Self {
            phase,
            pointer,
            target: target.into(),
            position,
            pressure: 0.0,
            buttons: Buttons::NONE,
            time_ms,
        }
    }

    pub fn down(pointer: PointerId, target: impl Into<TargetId>, x: f32, y: f32, time_ms: u64) -> Self {
        Self::new(Phase::Down, pointer, target, Point::new(x, y), time_ms)
    }

    pub fn moved(pointer: PointerId, target: impl Into<TargetId>, x: f32, y: f32, time_ms: u64) -> Self {
        Self::new(Phase::Move, pointer, target, Point::new(x, y), time_ms)
    }

    pub fn up(pointer: PointerId, target: impl Into<TargetId>, x: f32, y: f32, time_ms: u64) -> Self {
        Self::new(Phase::Up, pointer, target, Point::new(x, y), time_ms)
    }

    pub fn with_pressure(mut self, pressure: f32) -> Self {
        self.pressure = pressure.clamp(0.0, 1.0);
        self
    }

    pub fn with_buttons(mut self, buttons: Buttons) -> Self {
        self.buttons = buttons;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_spaces_are_distinct() {
        assert_ne!(PointerId::touch(1), PointerId::pen(1));
        assert_eq!(PointerId::touch(1).to_string(), "touch:1");
    }

    #[test]
    fn test_buttons_contains() {
        let b = Buttons::PRIMARY.union(Buttons::ERASER);
        assert!(b.contains(Buttons::ERASER));
        assert!(!b.contains(Buttons::SECONDARY));
        assert!(b.intersects(Buttons(33)));
        assert!(Buttons::NONE.is_empty());
    }

    #[test]
    fn test_event_json_is_flat() {
        let line = r#"{"phase":"down","kind":"pen","id":3,"target":"canvas","x":1.5,"y":2.0,"buttons":32,"time_ms":40}"#;
        let ev: PointerEvent = serde_json::from_str(line).unwrap();
        assert_eq!(ev.phase, Phase::Down);
        assert_eq!(ev.pointer, PointerId::pen(3));
        assert_eq!(ev.target.as_str(), "canvas");
        assert_eq!(ev.position, Point::new(1.5, 2.0));
        assert!(ev.buttons.contains(Buttons::ERASER));
        assert_eq!(ev.pressure, 0.0);
    }

    #[test]
    fn test_pressure_is_clamped() {
        let ev = PointerEvent::down(PointerId::pen(1), "c", 0.0, 0.0, 0).with_pressure(3.0);
        assert_eq!(ev.pressure, 1.0);
    }
}
