//! Gesture definitions: the declarative half of a gesture.

use std::fmt;

use crate::active::{GestureCx, Role};
use crate::config::EngineConfig;
use crate::error::ConfigurationError;
use crate::host::Host;
use crate::pattern::Pattern;
use crate::pointer::{Buttons, PointerId, TargetId};
use crate::tracker::Pointer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DefinitionId(pub(crate) u64);

impl fmt::Display for DefinitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "def#{}", self.0)
    }
}

pub type Condition<H> = Box<dyn Fn(&ConditionCx<'_, H>) -> bool>;

/// What a condition predicate may look at: the candidate pointers in role
/// order and the host state. Conditions must not change engine state.
pub struct ConditionCx<'a, H> {
    pub(crate) host: &'a H,
    pub(crate) pointers: &'a [&'a Pointer],
    pub(crate) name: &'a str,
}

impl<'a, H: Host> ConditionCx<'a, H> {
    pub fn host(&self) -> &H {
        self.host
    }

    pub fn name(&self) -> &str {
        self.name
    }

    pub fn pointers(&self) -> &[&'a Pointer] {
        self.pointers
    }

    pub fn pointer(&self, role: Role) -> Option<&Pointer> {
        self.pointers.get(role.index()).copied()
    }

    pub fn is_key_pressed(&self, key: &str) -> bool {
        self.host.is_key_pressed(key)
    }

    /// True when any candidate pointer reports all of `buttons`.
    pub fn any_buttons(&self, buttons: Buttons) -> bool {
        self.pointers.iter().any(|p| p.buttons.contains(buttons))
    }
}

/// Lifecycle callbacks for one definition. Every method has an empty
/// default, so handlers implement only what they need.
pub trait GestureHandler<H> {
    fn started(&mut self, _cx: &mut GestureCx<'_, H>) {}

    fn moved(&mut self, _cx: &mut GestureCx<'_, H>) {}

    /// `lifted` is the pointer whose loss ended the gesture, or `None` when
    /// it was ended explicitly.
    fn ended(&mut self, _cx: &mut GestureCx<'_, H>, _lifted: Option<PointerId>) {}

    fn cancelled(&mut self, _cx: &mut GestureCx<'_, H>, _reason: &str) {}

    /// The definition's repeat count was reached (e.g. a double tap).
    fn repeated(&mut self, _cx: &mut GestureCx<'_, H>, _count: u32) {}
}

impl<H, T: GestureHandler<H> + ?Sized> GestureHandler<H> for Box<T> {
    fn started(&mut self, cx: &mut GestureCx<'_, H>) {
        (**self).started(cx)
    }

    fn moved(&mut self, cx: &mut GestureCx<'_, H>) {
        (**self).moved(cx)
    }

    fn ended(&mut self, cx: &mut GestureCx<'_, H>, lifted: Option<PointerId>) {
        (**self).ended(cx, lifted)
    }

    fn cancelled(&mut self, cx: &mut GestureCx<'_, H>, reason: &str) {
        (**self).cancelled(cx, reason)
    }

    fn repeated(&mut self, cx: &mut GestureCx<'_, H>, count: u32) {
        (**self).repeated(cx, count)
    }
}

type Slot<H> = Option<Box<dyn FnMut(&mut GestureCx<'_, H>)>>;

/// Closure-based [`GestureHandler`].
pub struct Callbacks<H> {
    started: Slot<H>,
    moved: Slot<H>,
    ended: Option<Box<dyn FnMut(&mut GestureCx<'_, H>, Option<PointerId>)>>,
    cancelled: Option<Box<dyn FnMut(&mut GestureCx<'_, H>, &str)>>,
    repeated: Option<Box<dyn FnMut(&mut GestureCx<'_, H>, u32)>>,
}

impl<H> Default for Callbacks<H> {
    fn default() -> Self {
        Self {
            started: None,
            moved: None,
            ended: None,
            cancelled: None,
            repeated: None,
        }
    }
}

impl<H: 'static> Callbacks<H> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_started(mut self, f: impl FnMut(&mut GestureCx<'_, H>) + 'static) -> Self {
        self.started = Some(Box::new(f));
        self
    }

    pub fn on_move(mut self, f: impl FnMut(&mut GestureCx<'_, H>) + 'static) -> Self {
        self.moved = Some(Box::new(f));
        self
    }

    pub fn on_ended(
        mut self,
        f: impl FnMut(&mut GestureCx<'_, H>, Option<PointerId>) + 'static,
    ) -> Self {
        self.ended = Some(Box::new(f));
        self
    }

    pub fn on_cancelled(mut self, f: impl FnMut(&mut GestureCx<'_, H>, &str) + 'static) -> Self {
        self.cancelled = Some(Box::new(f));
        self
    }

    pub fn on_repeated(mut self, f: impl FnMut(&mut GestureCx<'_, H>, u32) + 'static) -> Self {
        self.repeated = Some(Box::new(f));
        self
    }
}

impl<H> GestureHandler<H> for Callbacks<H> {
    fn started(&mut self, cx: &mut GestureCx<'_, H>) {
        if let Some(f) = self.started.as_mut() {
            f(cx);
        }
    }

    fn moved(&mut self, cx: &mut GestureCx<'_, H>) {
        if let Some(f) = self.moved.as_mut() {
            f(cx);
        }
    }

    fn ended(&mut self, cx: &mut GestureCx<'_, H>, lifted: Option<PointerId>) {
        if let Some(f) = self.ended.as_mut() {
            f(cx, lifted);
        }
    }

    fn cancelled(&mut self, cx: &mut GestureCx<'_, H>, reason: &str) {
        if let Some(f) = self.cancelled.as_mut() {
            f(cx, reason);
        }
    }

    fn repeated(&mut self, cx: &mut GestureCx<'_, H>, count: u32) {
        if let Some(f) = self.repeated.as_mut() {
            f(cx, count);
        }
    }
}

/// A registered gesture. Immutable once registered except for the enabled
/// flag.
pub struct GestureDefinition<H> {
    pub(crate) id: DefinitionId,
    pub(crate) name: String,
    pub(crate) target: TargetId,
    pub(crate) group: Option<String>,
    pub(crate) pattern: Pattern,
    pub(crate) min_pointers: usize,
    pub(crate) condition: Option<Condition<H>>,
    pub(crate) exclusive: bool,
    pub(crate) recheck_on_pointer_loss: bool,
    pub(crate) recognition_timeout_ms: u64,
    pub(crate) repeat_count: u32,
    pub(crate) repeat_timeout_ms: u64,
    pub(crate) repeat_slop: f32,
    pub(crate) enabled: bool,
    pub(crate) handler: Option<Box<dyn GestureHandler<H>>>,
}

impl<H> GestureDefinition<H> {
    pub fn id(&self) -> DefinitionId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn target(&self) -> &TargetId {
        &self.target
    }

    pub fn group(&self) -> Option<&str> {
        self.group.as_deref()
    }

    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    pub fn min_pointers(&self) -> usize {
        self.min_pointers
    }

    pub fn has_condition(&self) -> bool {
        self.condition.is_some()
    }

    pub fn is_exclusive(&self) -> bool {
        self.exclusive
    }

    pub fn rechecks_on_pointer_loss(&self) -> bool {
        self.recheck_on_pointer_loss
    }

    pub fn recognition_timeout_ms(&self) -> u64 {
        self.recognition_timeout_ms
    }

    pub fn repeat_count(&self) -> u32 {
        self.repeat_count
    }

    pub fn repeat_timeout_ms(&self) -> u64 {
        self.repeat_timeout_ms
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

impl<H> fmt::Debug for GestureDefinition<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GestureDefinition")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("target", &self.target)
            .field("group", &self.group)
            .field("pattern", &self.pattern.source())
            .field("min_pointers", &self.min_pointers)
            .field("exclusive", &self.exclusive)
            .field("recheck_on_pointer_loss", &self.recheck_on_pointer_loss)
            .field("recognition_timeout_ms", &self.recognition_timeout_ms)
            .field("repeat_count", &self.repeat_count)
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}

/// Collects registration options. Validation happens when the builder is
/// handed to [`Registry::register`](crate::Registry::register).
pub struct GestureBuilder<H> {
    name: String,
    target: Option<TargetId>,
    pattern: Option<String>,
    min_pointers: Option<usize>,
    condition: Option<Condition<H>>,
    exclusive: bool,
    recheck_on_pointer_loss: bool,
    recognition_timeout_ms: Option<u64>,
    repeat_count: u32,
    repeat_timeout_ms: Option<u64>,
    repeat_slop: Option<f32>,
    group: Option<String>,
    enabled: bool,
    handler: Option<Box<dyn GestureHandler<H>>>,
}

impl<H: 'static> GestureBuilder<H> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            target: None,
            pattern: None,
            min_pointers: None,
            condition: None,
            exclusive: true,
            recheck_on_pointer_loss: false,
            recognition_timeout_ms: None,
            repeat_count: 1,
            repeat_timeout_ms: None,
            repeat_slop: None,
            group: None,
            enabled: true,
            handler: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn target(mut self, target: impl Into<TargetId>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    pub fn min_pointers(mut self, n: usize) -> Self {
        self.min_pointers = Some(n);
        self
    }

    pub fn condition(mut self, f: impl Fn(&ConditionCx<'_, H>) -> bool + 'static) -> Self {
        self.condition = Some(Box::new(f));
        self
    }

    pub fn exclusive(mut self, exclusive: bool) -> Self {
        self.exclusive = exclusive;
        self
    }

    pub fn recheck_on_pointer_loss(mut self, recheck: bool) -> Self {
        self.recheck_on_pointer_loss = recheck;
        self
    }

    pub fn recognition_timeout_ms(mut self, ms: u64) -> Self {
        self.recognition_timeout_ms = Some(ms);
        self
    }

    pub fn repeat(mut self, count: u32, timeout_ms: u64) -> Self {
        self.repeat_count = count;
        self.repeat_timeout_ms = Some(timeout_ms);
        self
    }

    /// Largest distance between the start points of repeated occurrences.
    pub fn repeat_slop(mut self, slop: f32) -> Self {
        self.repeat_slop = Some(slop);
        self
    }

    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn handler(mut self, handler: impl GestureHandler<H> + 'static) -> Self {
        self.handler = Some(Box::new(handler));
        self
    }

    pub fn callbacks(self, callbacks: Callbacks<H>) -> Self {
        self.handler(callbacks)
    }

    pub(crate) fn build(
        self,
        id: DefinitionId,
        name: String,
        defaults: &EngineConfig,
    ) -> Result<GestureDefinition<H>, ConfigurationError> {
        let target = match self.target {
            Some(t) if !t.as_str().trim().is_empty() => t,
            _ => return Err(ConfigurationError::MissingTarget { name }),
        };
        let pattern = Pattern::parse(self.pattern.as_deref().unwrap_or(""))?;
        let min_pointers = self.min_pointers.unwrap_or_else(|| pattern.min_arity());
        if min_pointers == 0 {
            return Err(ConfigurationError::InvalidOption {
                name,
                reason: "minimum pointer count must be at least 1".into(),
            });
        }
        if min_pointers > pattern.max_arity() {
            return Err(ConfigurationError::InvalidOption {
                reason: format!(
                    "minimum pointer count {min_pointers} exceeds pattern '{pattern}' ({} at most)",
                    pattern.max_arity()
                ),
                name,
            });
        }
        if self.repeat_count == 0 {
            return Err(ConfigurationError::InvalidOption {
                name,
                reason: "repeat count must be at least 1".into(),
            });
        }
        let repeat_slop = self.repeat_slop.unwrap_or(defaults.repeat_slop);
        if !repeat_slop.is_finite() || repeat_slop < 0.0 {
            return Err(ConfigurationError::InvalidOption {
                name,
                reason: "repeat slop must be a finite, non-negative distance".into(),
            });
        }

        Ok(GestureDefinition {
            id,
            name,
            target,
            group: self.group,
            pattern,
            min_pointers,
            condition: self.condition,
            exclusive: self.exclusive,
            recheck_on_pointer_loss: self.recheck_on_pointer_loss,
            recognition_timeout_ms: self
                .recognition_timeout_ms
                .unwrap_or(defaults.recognition_timeout_ms),
            repeat_count: self.repeat_count,
            repeat_timeout_ms: self.repeat_timeout_ms.unwrap_or(defaults.repeat_timeout_ms),
            repeat_slop,
            enabled: self.enabled,
            handler: Some(self.handler.unwrap_or_else(|| Box::new(Callbacks::new()))),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(b: GestureBuilder<()>) -> Result<GestureDefinition<()>, ConfigurationError> {
        let name = b.name().to_string();
        b.build(DefinitionId(1), name, &EngineConfig::default())
    }

    #[test]
    fn test_defaults_follow_engine_config() {
        let def = build(GestureBuilder::new("Pan").target("canvas").pattern("touch")).unwrap();
        assert!(def.is_exclusive());
        assert!(!def.rechecks_on_pointer_loss());
        assert_eq!(def.min_pointers(), 1);
        assert_eq!(def.recognition_timeout_ms(), EngineConfig::default().recognition_timeout_ms);
        assert_eq!(def.repeat_count(), 1);
        assert!(def.is_enabled());
        assert!(!def.has_condition());
    }

    #[test]
    fn test_min_pointers_defaults_to_shortest_alternative() {
        let def = build(GestureBuilder::new("Mixed").target("c").pattern("pen | mouse + touch")).unwrap();
        assert_eq!(def.min_pointers(), 1);
    }

    #[test]
    fn test_missing_target_is_rejected() {
        let err = build(GestureBuilder::new("Pan").pattern("touch")).unwrap_err();
        assert_eq!(err, ConfigurationError::MissingTarget { name: "Pan".into() });
        let err = build(GestureBuilder::new("Pan").target("  ").pattern("touch")).unwrap_err();
        assert!(matches!(err, ConfigurationError::MissingTarget { .. }));
    }

    #[test]
    fn test_missing_pattern_is_malformed() {
        let err = build(GestureBuilder::new("Pan").target("c")).unwrap_err();
        assert!(matches!(err, ConfigurationError::MalformedPattern { .. }));
    }

    #[test]
    fn test_unreachable_minimum_is_rejected() {
        let err = build(GestureBuilder::new("Zoom").target("c").pattern("touch*2").min_pointers(3))
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidOption { .. }));
        let err = build(GestureBuilder::new("Zoom").target("c").pattern("touch").min_pointers(0))
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidOption { .. }));
    }

    #[test]
    fn test_zero_repeat_is_rejected() {
        let err = build(GestureBuilder::new("Tap").target("c").pattern("any").repeat(0, 100))
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidOption { .. }));
    }
}
