//! Active gestures and the context handed to lifecycle callbacks.

use std::any::Any;
use std::fmt;

use crate::definition::{DefinitionId, GestureBuilder, GestureDefinition};
use crate::error::{ConfigurationError, UnboundRoleError};
use crate::host::{Host, InkHandle};
use crate::pointer::{Point, PointerId, TargetId};
use crate::registry::Registry;
use crate::tracker::{Pointer, PointerTracker};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GestureId(pub(crate) u64);

impl fmt::Display for GestureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gesture#{}", self.0)
    }
}

/// Ordinal position in a gesture's pattern, independent of which physical
/// pointer fills it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Role(usize);

impl Role {
    pub const FIRST: Role = Role(0);
    pub const SECOND: Role = Role(1);
    pub const THIRD: Role = Role(2);

    /// Zero-based.
    pub const fn nth(index: usize) -> Self {
        Role(index)
    }

    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "role #{}", self.0 + 1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GestureState {
    Candidate,
    Started,
    Ended,
    Cancelled,
}

impl GestureState {
    pub fn is_terminal(self) -> bool {
        matches!(self, GestureState::Ended | GestureState::Cancelled)
    }
}

pub type MoveHandler<H> = Box<dyn FnMut(&mut GestureCx<'_, H>)>;

/// A live instance of a definition, bound to specific pointers.
pub struct ActiveGesture<H> {
    pub(crate) id: GestureId,
    pub(crate) definition: DefinitionId,
    pub(crate) name: String,
    pub(crate) target: TargetId,
    pub(crate) exclusive: bool,
    pub(crate) recheck: bool,
    pub(crate) min_pointers: usize,
    pub(crate) repeat_count: u32,
    pub(crate) repeat_timeout_ms: u64,
    pub(crate) repeat_slop: f32,
    pub(crate) roles: Vec<Option<PointerId>>,
    pub(crate) state: GestureState,
    pub(crate) started_ms: u64,
    pub(crate) start_point: Point,
    pub(crate) moves: u64,
    pub(crate) repeat: u32,
    pub(crate) local: Option<Box<dyn Any>>,
    pub(crate) move_handler: Option<MoveHandler<H>>,
    pub(crate) inks: Vec<(PointerId, Box<dyn InkHandle>)>,
}

impl<H> ActiveGesture<H> {
    pub(crate) fn new(
        id: GestureId,
        def: &GestureDefinition<H>,
        pointers: &[&Pointer],
        now_ms: u64,
    ) -> Self {
        Self {
            id,
            definition: def.id,
            name: def.name.clone(),
            target: def.target.clone(),
            exclusive: def.exclusive,
            recheck: def.recheck_on_pointer_loss,
            min_pointers: def.min_pointers,
            repeat_count: def.repeat_count,
            repeat_timeout_ms: def.repeat_timeout_ms,
            repeat_slop: def.repeat_slop,
            roles: pointers.iter().map(|p| Some(p.id)).collect(),
            state: GestureState::Candidate,
            started_ms: now_ms,
            start_point: pointers.first().map(|p| p.position).unwrap_or_default(),
            moves: 0,
            repeat: 0,
            local: None,
            move_handler: None,
            inks: Vec::new(),
        }
    }

    pub fn id(&self) -> GestureId {
        self.id
    }

    pub fn definition(&self) -> DefinitionId {
        self.definition
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn target(&self) -> &TargetId {
        &self.target
    }

    pub fn state(&self) -> GestureState {
        self.state
    }

    pub fn is_exclusive(&self) -> bool {
        self.exclusive
    }

    pub fn min_pointers(&self) -> usize {
        self.min_pointers
    }

    pub fn started_ms(&self) -> u64 {
        self.started_ms
    }

    pub fn start_point(&self) -> Point {
        self.start_point
    }

    pub fn move_count(&self) -> u64 {
        self.moves
    }

    /// Position of this occurrence within the definition's repeat window,
    /// known once the gesture has ended.
    pub fn repeat_ordinal(&self) -> u32 {
        self.repeat
    }

    pub fn roles(&self) -> &[Option<PointerId>] {
        &self.roles
    }

    pub fn pointer_id(&self, role: Role) -> Option<PointerId> {
        self.roles.get(role.index()).copied().flatten()
    }

    pub fn bound_pointers(&self) -> impl Iterator<Item = PointerId> + '_ {
        self.roles.iter().filter_map(|r| *r)
    }

    pub fn pointer_count_bound(&self) -> usize {
        self.roles.iter().filter(|r| r.is_some()).count()
    }

    pub fn binds(&self, pointer: PointerId) -> bool {
        self.roles.contains(&Some(pointer))
    }

    pub(crate) fn unbind(&mut self, pointer: PointerId) -> Option<Role> {
        let idx = self.roles.iter().position(|r| *r == Some(pointer))?;
        self.roles[idx] = None;
        Some(Role(idx))
    }

    pub(crate) fn is_live(&self) -> bool {
        self.state == GestureState::Started
    }

    pub(crate) fn feed_ink(&mut self, pointer: PointerId, at: Point, pressure: f32) {
        for (owner, ink) in self.inks.iter_mut() {
            if *owner == pointer && !ink.is_ended() {
                ink.add_point(at, pressure);
            }
        }
    }

    pub(crate) fn end_ink_for(&mut self, pointer: PointerId) {
        for (owner, ink) in self.inks.iter_mut() {
            if *owner == pointer {
                ink.end();
            }
        }
    }

    pub(crate) fn end_all_inks(&mut self) {
        for (_, ink) in self.inks.iter_mut() {
            ink.end();
        }
    }
}

impl<H> fmt::Debug for ActiveGesture<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveGesture")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("state", &self.state)
            .field("roles", &self.roles)
            .field("exclusive", &self.exclusive)
            .finish_non_exhaustive()
    }
}

/// Requests a callback makes of the engine, applied once it returns.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Op {
    Cancel { gesture: GestureId, reason: String },
    End { gesture: GestureId },
    Unregister(Selector),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Selector {
    Name(String),
    Target { target: TargetId, group: Option<String> },
}

/// Receiver context for lifecycle callbacks.
pub struct GestureCx<'a, H> {
    pub(crate) gesture: &'a mut ActiveGesture<H>,
    pub(crate) tracker: &'a PointerTracker,
    pub(crate) registry: &'a mut Registry<H>,
    pub(crate) host: &'a mut H,
    pub(crate) ops: &'a mut Vec<Op>,
    pub(crate) now_ms: u64,
}

impl<'a, H: Host + 'static> GestureCx<'a, H> {
    pub fn gesture(&self) -> &ActiveGesture<H> {
        self.gesture
    }

    pub fn id(&self) -> GestureId {
        self.gesture.id
    }

    pub fn name(&self) -> &str {
        &self.gesture.name
    }

    pub fn state(&self) -> GestureState {
        self.gesture.state
    }

    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }

    pub fn host(&self) -> &H {
        self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        self.host
    }

    pub fn is_key_pressed(&self, key: &str) -> bool {
        self.host.is_key_pressed(key)
    }

    // ---- pointer queries ----

    pub fn pointer_count_bound(&self) -> usize {
        self.gesture.pointer_count_bound()
    }

    pub fn pointer(&self, role: Role) -> Result<&Pointer, UnboundRoleError> {
        self.gesture
            .pointer_id(role)
            .and_then(|id| self.tracker.get(id))
            .ok_or(UnboundRoleError { role })
    }

    pub fn pointer_identity(&self, role: Role) -> Result<PointerId, UnboundRoleError> {
        self.pointer(role).map(|p| p.id)
    }

    pub fn pointer_name(&self, role: Role) -> Result<String, UnboundRoleError> {
        self.pointer(role).map(|p| p.id.to_string())
    }

    /// Surface-space position.
    pub fn current_point(&self, role: Role) -> Result<Point, UnboundRoleError> {
        self.pointer(role).map(|p| p.position)
    }

    pub fn previous_point(&self, role: Role) -> Result<Point, UnboundRoleError> {
        self.pointer(role).map(|p| p.previous_position)
    }

    pub fn screen_point(&self, role: Role) -> Result<Point, UnboundRoleError> {
        self.pointer(role).map(|p| p.screen)
    }

    pub fn distance(&self, a: Role, b: Role) -> Result<f32, UnboundRoleError> {
        Ok(self.current_point(a)?.distance(self.current_point(b)?))
    }

    // ---- instance-local state ----

    pub fn set_local<T: Any>(&mut self, value: T) {
        self.gesture.local = Some(Box::new(value));
    }

    pub fn local<T: Any>(&self) -> Option<&T> {
        self.gesture.local.as_ref().and_then(|b| b.downcast_ref())
    }

    pub fn local_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.gesture.local.as_mut().and_then(|b| b.downcast_mut())
    }

    pub fn take_local<T: Any>(&mut self) -> Option<T> {
        match self.gesture.local.take()?.downcast::<T>() {
            Ok(value) => Some(*value),
            Err(other) => {
                self.gesture.local = Some(other);
                None
            }
        }
    }

    /// Replaces the definition's move callback for this instance only.
    pub fn set_move_handler(&mut self, f: impl FnMut(&mut GestureCx<'_, H>) + 'static) {
        self.gesture.move_handler = Some(Box::new(f));
    }

    // ---- lifecycle requests ----

    pub fn cancel(&mut self, reason: impl Into<String>) {
        self.ops.push(Op::Cancel {
            gesture: self.gesture.id,
            reason: reason.into(),
        });
    }

    pub fn end(&mut self) {
        self.ops.push(Op::End {
            gesture: self.gesture.id,
        });
    }

    // ---- registry access ----

    pub fn register(&mut self, builder: GestureBuilder<H>) -> Result<DefinitionId, ConfigurationError> {
        self.registry.register(builder)
    }

    /// Removal takes effect when the callback returns.
    pub fn unregister(&mut self, name: &str) {
        self.ops.push(Op::Unregister(Selector::Name(name.to_string())));
    }

    pub fn unregister_target(&mut self, target: &TargetId, group: Option<&str>) {
        self.ops.push(Op::Unregister(Selector::Target {
            target: target.clone(),
            group: group.map(str::to_string),
        }));
    }

    pub fn find_by_name(&self, name: &str) -> Option<&GestureDefinition<H>> {
        self.registry.find_by_name(name)
    }

    // ---- ink ----

    /// Starts capturing ink for the role's pointer. Returns `false` when the
    /// host has no ink collaborator.
    pub fn start_ink(&mut self, role: Role) -> Result<bool, UnboundRoleError> {
        let (id, at, pressure) = {
            let p = self.pointer(role)?;
            (p.id, p.position, p.pressure)
        };
        let Some(capture) = self.host.ink() else {
            return Ok(false);
        };
        let handle = capture.start_ink(id, at, pressure);
        self.gesture.inks.push((id, handle));
        Ok(true)
    }

    /// Ends the role's ink and returns its points.
    pub fn end_ink(&mut self, role: Role) -> Result<Option<Vec<Point>>, UnboundRoleError> {
        let id = self.gesture.pointer_id(role).ok_or(UnboundRoleError { role })?;
        let Some(idx) = self.gesture.inks.iter().position(|(owner, _)| *owner == id) else {
            return Ok(None);
        };
        let (_, mut ink) = self.gesture.inks.remove(idx);
        ink.end();
        Ok(Some(ink.points().to_vec()))
    }

    pub fn ink_points(&self, role: Role) -> Result<Option<&[Point]>, UnboundRoleError> {
        let id = self.gesture.pointer_id(role).ok_or(UnboundRoleError { role })?;
        Ok(self
            .gesture
            .inks
            .iter()
            .find(|(owner, _)| *owner == id)
            .map(|(_, ink)| ink.points()))
    }
}
