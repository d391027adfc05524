//! The recognition engine: matches live pointers against registered
//! definitions, arbitrates between candidates and drives lifecycles.
//!
//! Every public entry point is one transition. Recognition runs to
//! completion before it returns; callbacks may call back in through
//! [`GestureCx`], and their cancel/end/unregister requests are applied as
//! soon as the callback returns, inside the same transition.

use std::collections::{HashMap, HashSet};

use log::{debug, trace, warn};

use crate::active::{ActiveGesture, GestureCx, GestureId, GestureState, Op, Selector};
use crate::config::EngineConfig;
use crate::definition::{ConditionCx, DefinitionId, GestureBuilder, GestureDefinition};
use crate::error::ConfigurationError;
use crate::host::Host;
use crate::pointer::{Phase, Point, PointerEvent, PointerId, TargetId};
use crate::registry::Registry;
use crate::tracker::{Pointer, PointerTracker, Transition};

/// Upper bound on recognition rounds per target and transition.
const MAX_ROUNDS: usize = 16;

enum Callback {
    Started,
    Moved,
    Ended(Option<PointerId>),
    Cancelled(String),
}

enum Termination {
    Ended(Option<PointerId>),
    Cancelled(String),
}

#[derive(Debug, Default, Clone, Copy)]
struct RepeatWindow {
    count: u32,
    last_end_ms: u64,
    last_point: Point,
}

pub struct Engine<H> {
    config: EngineConfig,
    registry: Registry<H>,
    tracker: PointerTracker,
    active: Vec<ActiveGesture<H>>,
    /// Live pointers released by a terminated gesture without recheck.
    spent: HashSet<PointerId>,
    /// (definition, pointer) pairs released during the current transition.
    suppressed: HashSet<(DefinitionId, PointerId)>,
    /// Live pointers freed by a recheck gesture during the current transition.
    released: HashSet<PointerId>,
    recheck: Vec<TargetId>,
    repeats: HashMap<DefinitionId, RepeatWindow>,
    ops: Vec<Op>,
    next_gesture: u64,
}

impl<H: Host + 'static> Default for Engine<H> {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl<H: Host + 'static> Engine<H> {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            registry: Registry::new(config.clone()),
            tracker: PointerTracker::new(config.move_epsilon),
            config,
            active: Vec::new(),
            spent: HashSet::new(),
            suppressed: HashSet::new(),
            released: HashSet::new(),
            recheck: Vec::new(),
            repeats: HashMap::new(),
            ops: Vec::new(),
            next_gesture: 1,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &Registry<H> {
        &self.registry
    }

    pub fn pointers(&self) -> &PointerTracker {
        &self.tracker
    }

    // ---- administration ----

    pub fn register(&mut self, builder: GestureBuilder<H>) -> Result<DefinitionId, ConfigurationError> {
        self.registry.register(builder)
    }

    /// Removes the named definition, cancelling its live instances first.
    /// Unknown names are a no-op.
    pub fn unregister(&mut self, name: &str, host: &mut H) -> bool {
        self.begin_transition();
        let now = self.latest_time();
        let removed = self.remove_definitions(&Selector::Name(name.to_string()), now, host);
        self.settle(now, host);
        removed > 0
    }

    pub fn unregister_target(&mut self, target: &TargetId, group: Option<&str>, host: &mut H) -> usize {
        self.begin_transition();
        let now = self.latest_time();
        let sel = Selector::Target {
            target: target.clone(),
            group: group.map(str::to_string),
        };
        let removed = self.remove_definitions(&sel, now, host);
        self.settle(now, host);
        removed
    }

    pub fn set_enabled(&mut self, name: &str, enabled: bool) -> bool {
        self.registry.set_enabled(name, enabled)
    }

    pub fn find<'a>(&'a self, target: &'a TargetId) -> impl Iterator<Item = &'a GestureDefinition<H>> + 'a {
        self.registry.find(target)
    }

    pub fn find_by_name(&self, name: &str) -> Option<&GestureDefinition<H>> {
        self.registry.find_by_name(name)
    }

    pub fn active_gestures(&self) -> impl Iterator<Item = &ActiveGesture<H>> {
        self.active.iter().filter(|g| g.is_live())
    }

    pub fn active_gesture_names(&self) -> Vec<&str> {
        self.active_gestures().map(|g| g.name()).collect()
    }

    pub fn gesture(&self, id: GestureId) -> Option<&ActiveGesture<H>> {
        self.active.iter().find(|g| g.id == id)
    }

    // ---- pointer input ----

    pub fn handle(&mut self, event: &PointerEvent, host: &mut H) {
        match event.phase {
            Phase::Down => self.pointer_down(event, host),
            Phase::Move => self.pointer_move(event, host),
            Phase::Up | Phase::Cancel => self.pointer_up(event, host),
        }
    }

    pub fn pointer_down(&mut self, ev: &PointerEvent, host: &mut H) {
        self.begin_transition();
        let now = ev.time_ms;
        if self.tracker.get(ev.pointer).is_some() {
            warn!("{} went down again without an up; treating the old contact as lifted", ev.pointer);
            self.lose_pointer(ev.pointer, now, host);
        }
        let logical = host.to_logical_point(ev.position, &ev.target);
        self.tracker.on_pointer_down(ev, logical);
        trace!("{} down on '{}' at {:?}", ev.pointer, ev.target, ev.position);

        self.recognize(&ev.target, now, None, host);
        self.settle(now, host);
    }

    pub fn pointer_move(&mut self, ev: &PointerEvent, host: &mut H) {
        self.begin_transition();
        let now = ev.time_ms;
        let Some(target) = self.tracker.get(ev.pointer).map(|p| p.target.clone()) else {
            return;
        };
        let logical = host.to_logical_point(ev.position, &target);
        match self.tracker.on_pointer_move(ev, logical) {
            Transition::Moved => {}
            Transition::Coalesced | Transition::Ignored => return,
        }

        let pressure = ev.pressure;
        let moving: Vec<GestureId> = self
            .active
            .iter_mut()
            .filter(|g| g.is_live() && g.binds(ev.pointer))
            .map(|g| {
                g.feed_ink(ev.pointer, logical, pressure);
                g.moves += 1;
                g.id
            })
            .collect();
        for gid in moving {
            self.dispatch(gid, Callback::Moved, now, host);
        }

        if self.has_unbound_pointers(&target) {
            self.recognize(&target, now, None, host);
        }
        self.settle(now, host);
    }

    /// Handles both `up` and `cancel` phases: either way the contact is gone.
    pub fn pointer_up(&mut self, ev: &PointerEvent, host: &mut H) {
        self.begin_transition();
        let now = ev.time_ms;
        let Some(target) = self.tracker.get(ev.pointer).map(|p| p.target.clone()) else {
            trace!("{} up without a matching down", ev.pointer);
            return;
        };
        if !self.spent.contains(&ev.pointer) && !self.exclusively_bound(ev.pointer) {
            // last chance for a candidate that was waiting on a larger pattern
            self.recognize(&target, now, Some(ev.pointer), host);
        }
        self.lose_pointer(ev.pointer, now, host);
        self.settle(now, host);
    }

    /// Resolves deferred candidates whose ambiguity window has passed. Hosts
    /// may call this from a timer; otherwise the next pointer event does it.
    pub fn poll(&mut self, now_ms: u64, host: &mut H) {
        self.begin_transition();
        let mut targets: Vec<TargetId> = Vec::new();
        for p in self.tracker.iter() {
            if !targets.contains(&p.target) {
                targets.push(p.target.clone());
            }
        }
        for target in targets {
            if self.has_unbound_pointers(&target) {
                self.recognize(&target, now_ms, None, host);
            }
        }
        self.settle(now_ms, host);
    }

    // ---- explicit lifecycle control ----

    pub fn cancel(&mut self, gesture: GestureId, reason: &str, host: &mut H) -> bool {
        self.begin_transition();
        let now = self.latest_time();
        let live = self.active.iter().any(|g| g.id == gesture && g.is_live());
        self.terminate(gesture, Termination::Cancelled(reason.to_string()), now, host);
        self.settle(now, host);
        live
    }

    pub fn end(&mut self, gesture: GestureId, host: &mut H) -> bool {
        self.begin_transition();
        let now = self.latest_time();
        let live = self.active.iter().any(|g| g.id == gesture && g.is_live());
        self.terminate(gesture, Termination::Ended(None), now, host);
        self.settle(now, host);
        live
    }

    pub fn cancel_all(&mut self, reason: &str, host: &mut H) {
        self.begin_transition();
        let now = self.latest_time();
        let ids: Vec<GestureId> = self.active.iter().map(|g| g.id).collect();
        for gid in ids {
            self.terminate(gid, Termination::Cancelled(reason.to_string()), now, host);
        }
        // nothing rechecks after a global cancel
        self.recheck.clear();
    }

    // ---- recognition ----

    fn begin_transition(&mut self) {
        self.suppressed.clear();
        self.released.clear();
    }

    fn latest_time(&self) -> u64 {
        self.tracker.iter().map(|p| p.last_ms).max().unwrap_or(0)
    }

    fn settle(&mut self, now: u64, host: &mut H) {
        while let Some(target) = self.recheck.pop() {
            self.recognize(&target, now, None, host);
        }
    }

    fn recognize(&mut self, target: &TargetId, now: u64, flush: Option<PointerId>, host: &mut H) {
        for _ in 0..MAX_ROUNDS {
            if !self.recognition_round(target, now, flush, host) {
                return;
            }
        }
        debug!("recognition on '{target}' stopped after {MAX_ROUNDS} rounds");
    }

    /// One sweep over the target's candidates. Returns whether anything was
    /// promoted.
    fn recognition_round(
        &mut self,
        target: &TargetId,
        now: u64,
        flush: Option<PointerId>,
        host: &mut H,
    ) -> bool {
        let mut promoted = false;
        for def_id in self.candidate_order(target) {
            while let Some(binding) = self.find_binding(def_id, target, now, host) {
                if self.is_deferred(def_id, &binding, now, flush) {
                    break;
                }
                self.promote(def_id, &binding, now, host);
                promoted = true;
            }
        }
        promoted
    }

    /// Conditioned definitions first, then the rest; registration order
    /// within each group.
    fn candidate_order(&self, target: &TargetId) -> Vec<DefinitionId> {
        // not strict registration order: a satisfied condition outranks an
        // earlier unconditioned definition on the same pointers
        let (conditioned, plain): (Vec<_>, Vec<_>) = self
            .registry
            .find(target)
            .filter(|d| d.enabled)
            .partition(|d| d.condition.is_some());
        conditioned.into_iter().chain(plain).map(|d| d.id).collect()
    }

    fn exclusively_bound(&self, pointer: PointerId) -> bool {
        self.active
            .iter()
            .any(|g| g.is_live() && g.exclusive && g.binds(pointer))
    }

    fn bound_to_definition(&self, pointer: PointerId, def: DefinitionId) -> bool {
        self.active
            .iter()
            .any(|g| g.is_live() && g.definition == def && g.binds(pointer))
    }

    fn has_unbound_pointers(&self, target: &TargetId) -> bool {
        self.tracker
            .on_target(target)
            .any(|p| !self.spent.contains(&p.id) && !self.exclusively_bound(p.id))
    }

    fn eligible<'a>(&'a self, def: &GestureDefinition<H>, target: &'a TargetId) -> Vec<&'a Pointer> {
        self.tracker
            .on_target(target)
            .filter(|p| !self.spent.contains(&p.id))
            .filter(|p| !self.suppressed.contains(&(def.id, p.id)))
            .filter(|p| {
                if def.exclusive {
                    !self.exclusively_bound(p.id)
                } else {
                    !self.bound_to_definition(p.id, def.id)
                }
            })
            .collect()
    }

    fn find_binding(&self, def_id: DefinitionId, target: &TargetId, now: u64, host: &H) -> Option<Vec<PointerId>> {
        let def = self.registry.get(def_id).filter(|d| d.enabled)?;
        let pool = self.eligible(def, target);
        if pool.len() < def.min_pointers {
            return None;
        }
        let kinds: Vec<_> = pool.iter().map(|p| p.id.kind).collect();
        let timeout = def.recognition_timeout_ms;

        let chosen = def.pattern.bind(&kinds, def.min_pointers, |idx| {
            let pointers: Vec<&Pointer> = idx.iter().map(|&i| pool[i]).collect();
            let first = pointers.iter().map(|p| p.eligible_ms).min().unwrap_or(now);
            let last = pointers.iter().map(|p| p.eligible_ms).max().unwrap_or(now);
            if last - first > timeout {
                trace!(
                    "'{}' pattern completed {}ms after it began (timeout {timeout}ms)",
                    def.name,
                    last - first
                );
                return false;
            }
            match &def.condition {
                Some(cond) => {
                    let cx = ConditionCx {
                        host,
                        pointers: &pointers,
                        name: &def.name,
                    };
                    let ok = cond(&cx);
                    if !ok {
                        trace!("'{}' condition rejected {} pointer(s)", def.name, pointers.len());
                    }
                    ok
                }
                None => true,
            }
        })?;
        Some(chosen.into_iter().map(|i| pool[i].id).collect())
    }

    /// An exclusive candidate waits while another exclusive definition could
    /// still grow out of the same pointers within its recognition window,
    /// measured from when those pointers went down. Bindings holding the
    /// lifting pointer, or a pointer a recheck gesture just handed back, never
    /// wait.
    fn is_deferred(&self, def_id: DefinitionId, binding: &[PointerId], now: u64, flush: Option<PointerId>) -> bool {
        let Some(def) = self.registry.get(def_id) else {
            return false;
        };
        if !def.exclusive {
            return false;
        }
        if let Some(lifting) = flush {
            if binding.contains(&lifting) {
                return false;
            }
        }
        if binding.iter().any(|p| self.released.contains(p)) {
            return false;
        }
        let pointers: Vec<&Pointer> = binding.iter().filter_map(|id| self.tracker.get(*id)).collect();
        let kinds: Vec<_> = pointers.iter().map(|p| p.id.kind).collect();
        let earliest = pointers.iter().map(|p| p.down_ms).min().unwrap_or(now);

        let blocker = self.registry.find(&def.target).find(|other| {
            other.id != def.id
                && other.enabled
                && other.exclusive
                && now.saturating_sub(earliest) <= other.recognition_timeout_ms
                && !binding.iter().any(|p| self.suppressed.contains(&(other.id, *p)))
                && other.pattern.could_extend(&kinds, other.min_pointers)
        });
        match blocker {
            Some(other) => {
                trace!(
                    "'{}' deferred: '{}' may still complete within {}ms",
                    def.name,
                    other.name,
                    other.recognition_timeout_ms
                );
                true
            }
            None => false,
        }
    }

    fn promote(&mut self, def_id: DefinitionId, binding: &[PointerId], now: u64, host: &mut H) {
        let Some(def) = self.registry.get(def_id) else {
            return;
        };
        let pointers: Vec<&Pointer> = binding.iter().filter_map(|id| self.tracker.get(*id)).collect();
        let gid = GestureId(self.next_gesture);
        let mut gesture = ActiveGesture::new(gid, def, &pointers, now);
        gesture.state = GestureState::Started;
        debug!(
            "'{}' started as {gid} with [{}]",
            def.name,
            binding.iter().map(|p| p.to_string()).collect::<Vec<_>>().join(", ")
        );
        self.next_gesture += 1;
        self.active.push(gesture);
        self.dispatch(gid, Callback::Started, now, host);
    }

    fn lose_pointer(&mut self, pointer: PointerId, now: u64, host: &mut H) {
        self.tracker.on_pointer_up(pointer);
        self.spent.remove(&pointer);

        let affected: Vec<GestureId> = self
            .active
            .iter()
            .filter(|g| g.is_live() && g.binds(pointer))
            .map(|g| g.id)
            .collect();
        for gid in affected {
            let Some(g) = self.active.iter_mut().find(|g| g.id == gid) else {
                continue;
            };
            g.end_ink_for(pointer);
            g.unbind(pointer);
            if g.pointer_count_bound() < g.min_pointers {
                self.terminate(gid, Termination::Ended(Some(pointer)), now, host);
            } else {
                debug!(
                    "'{}' lost {pointer}, continuing with {} pointer(s)",
                    g.name,
                    g.pointer_count_bound()
                );
            }
        }
    }

    fn terminate(&mut self, gid: GestureId, how: Termination, now: u64, host: &mut H) {
        let Some(g) = self.active.iter_mut().find(|g| g.id == gid) else {
            return;
        };
        if g.state.is_terminal() {
            return;
        }
        g.state = match how {
            Termination::Ended(_) => GestureState::Ended,
            Termination::Cancelled(_) => GestureState::Cancelled,
        };
        g.end_all_inks();
        let def = g.definition;
        let recheck = g.recheck;
        let target = g.target.clone();
        let released: Vec<PointerId> = g.bound_pointers().collect();

        for p in &released {
            self.suppressed.insert((def, *p));
            if self.tracker.get(*p).is_none() {
                continue;
            }
            if recheck {
                self.spent.remove(p);
                self.released.insert(*p);
                self.tracker.reset_eligibility(*p, now);
            } else {
                self.spent.insert(*p);
            }
        }
        if recheck && !self.recheck.contains(&target) {
            self.recheck.push(target);
        }

        match how {
            Termination::Ended(lifted) => {
                self.note_repeat(gid, now);
                debug!("{gid} ended (lifted: {lifted:?})");
                self.dispatch(gid, Callback::Ended(lifted), now, host);
            }
            Termination::Cancelled(reason) => {
                debug!("{gid} cancelled: {reason}");
                self.dispatch(gid, Callback::Cancelled(reason), now, host);
            }
        }
        self.active.retain(|g| g.id != gid);
    }

    fn note_repeat(&mut self, gid: GestureId, now: u64) {
        let Some(g) = self.active.iter_mut().find(|g| g.id == gid) else {
            return;
        };
        let window = self.repeats.entry(g.definition).or_default();
        let continues = window.count > 0
            && g.started_ms.saturating_sub(window.last_end_ms) <= g.repeat_timeout_ms
            && window.last_point.distance(g.start_point) <= g.repeat_slop;
        window.count = if continues { window.count + 1 } else { 1 };
        window.last_end_ms = now;
        window.last_point = g.start_point;
        g.repeat = window.count;
        if window.count >= g.repeat_count {
            window.count = 0;
        }
    }

    fn remove_definitions(&mut self, sel: &Selector, now: u64, host: &mut H) -> usize {
        let ids = self.registry.select(|d| match sel {
            Selector::Name(name) => &d.name == name,
            Selector::Target { target, group } => {
                &d.target == target && (group.is_none() || d.group == *group)
            }
        });
        if ids.is_empty() {
            return 0;
        }
        let doomed: Vec<GestureId> = self
            .active
            .iter()
            .filter(|g| ids.contains(&g.definition))
            .map(|g| g.id)
            .collect();
        for gid in doomed {
            self.terminate(gid, Termination::Cancelled("definition removed".into()), now, host);
        }
        self.registry.remove_ids(&ids);
        for id in &ids {
            self.repeats.remove(id);
        }
        ids.len()
    }

    // ---- dispatch ----

    fn dispatch(&mut self, gid: GestureId, callback: Callback, now: u64, host: &mut H) {
        let Some(pos) = self.active.iter().position(|g| g.id == gid) else {
            return;
        };
        let def_id = self.active[pos].definition;
        let mut handler = self.registry.take_handler(def_id);
        {
            let Self {
                active,
                tracker,
                registry,
                ops,
                ..
            } = self;
            let mut cx = GestureCx {
                gesture: &mut active[pos],
                tracker,
                registry,
                host: &mut *host,
                ops,
                now_ms: now,
            };
            match callback {
                Callback::Started => {
                    if let Some(h) = handler.as_mut() {
                        h.started(&mut cx);
                    }
                }
                Callback::Moved => {
                    if let Some(mut f) = cx.gesture.move_handler.take() {
                        f(&mut cx);
                        if cx.gesture.move_handler.is_none() {
                            cx.gesture.move_handler = Some(f);
                        }
                    } else if let Some(h) = handler.as_mut() {
                        h.moved(&mut cx);
                    }
                }
                Callback::Ended(lifted) => {
                    if let Some(h) = handler.as_mut() {
                        h.ended(&mut cx, lifted);
                        let count = cx.gesture.repeat;
                        if cx.gesture.repeat_count > 1 && count >= cx.gesture.repeat_count {
                            h.repeated(&mut cx, count);
                        }
                    }
                }
                Callback::Cancelled(reason) => {
                    if let Some(h) = handler.as_mut() {
                        h.cancelled(&mut cx, &reason);
                    }
                }
            }
        }
        if let Some(h) = handler {
            self.registry.restore_handler(def_id, h);
        }
        self.apply_ops(now, host);
    }

    fn apply_ops(&mut self, now: u64, host: &mut H) {
        while !self.ops.is_empty() {
            let ops = std::mem::take(&mut self.ops);
            for op in ops {
                match op {
                    Op::Cancel { gesture, reason } => {
                        self.terminate(gesture, Termination::Cancelled(reason), now, host)
                    }
                    Op::End { gesture } => self.terminate(gesture, Termination::Ended(None), now, host),
                    Op::Unregister(sel) => {
                        self.remove_definitions(&sel, now, host);
                    }
                }
            }
        }
    }
}
