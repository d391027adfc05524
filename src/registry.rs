//! Registered gesture definitions, in registration order.

use std::collections::HashMap;

use log::debug;

use crate::config::EngineConfig;
use crate::definition::{DefinitionId, GestureBuilder, GestureDefinition, GestureHandler};
use crate::error::ConfigurationError;
use crate::pointer::TargetId;

/// Expands wildcard names (`stroke*`) into unique ones (`stroke-1`, ...).
#[derive(Debug, Default)]
pub struct NameGenerator {
    counters: HashMap<String, u64>,
}

impl NameGenerator {
    pub fn is_wildcard(name: &str) -> bool {
        name.ends_with('*')
    }

    pub fn generate(&mut self, name: &str, taken: impl Fn(&str) -> bool) -> String {
        let stem = name.trim_end_matches('*');
        let counter = self.counters.entry(stem.to_string()).or_insert(0);
        loop {
            *counter += 1;
            let candidate = format!("{stem}-{counter}");
            if !taken(&candidate) {
                return candidate;
            }
        }
    }
}

pub struct Registry<H> {
    entries: Vec<GestureDefinition<H>>,
    next_id: u64,
    names: NameGenerator,
    defaults: EngineConfig,
}

impl<H: 'static> Registry<H> {
    pub fn new(defaults: EngineConfig) -> Self {
        Self {
            entries: Vec::new(),
            next_id: 1,
            names: NameGenerator::default(),
            defaults,
        }
    }

    pub fn register(&mut self, builder: GestureBuilder<H>) -> Result<DefinitionId, ConfigurationError> {
        let requested = builder.name().trim().to_string();
        if requested.is_empty() || requested == "*" {
            return Err(ConfigurationError::EmptyName);
        }
        let name = if NameGenerator::is_wildcard(&requested) {
            let entries = &self.entries;
            self.names
                .generate(&requested, |n| entries.iter().any(|d| d.name == n))
        } else {
            if self.find_by_name(&requested).is_some() {
                return Err(ConfigurationError::DuplicateName(requested));
            }
            requested
        };

        let id = DefinitionId(self.next_id);
        let def = builder.build(id, name, &self.defaults)?;
        self.next_id += 1;
        debug!(
            "registered gesture '{}' on '{}' pattern='{}' min={} exclusive={} recheck={}",
            def.name,
            def.target,
            def.pattern,
            def.min_pointers,
            def.exclusive,
            def.recheck_on_pointer_loss
        );
        self.entries.push(def);
        Ok(id)
    }
}

impl<H> Registry<H> {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &GestureDefinition<H>> {
        self.entries.iter()
    }

    pub fn get(&self, id: DefinitionId) -> Option<&GestureDefinition<H>> {
        self.entries.iter().find(|d| d.id == id)
    }

    pub fn find_by_name(&self, name: &str) -> Option<&GestureDefinition<H>> {
        self.entries.iter().find(|d| d.name == name)
    }

    /// Definitions scoped to `target`, in registration order.
    pub fn find<'a>(&'a self, target: &'a TargetId) -> impl Iterator<Item = &'a GestureDefinition<H>> + 'a {
        self.entries.iter().filter(move |d| &d.target == target)
    }

    pub fn set_enabled(&mut self, name: &str, enabled: bool) -> bool {
        match self.entries.iter_mut().find(|d| d.name == name) {
            Some(def) => {
                def.enabled = enabled;
                true
            }
            None => false,
        }
    }

    /// Removes the named definition. Unknown names are a no-op.
    pub fn unregister(&mut self, name: &str) -> Option<DefinitionId> {
        self.unregister_where(|d| d.name == name).into_iter().next()
    }

    pub fn unregister_target(&mut self, target: &TargetId, group: Option<&str>) -> Vec<DefinitionId> {
        self.unregister_where(|d| &d.target == target && (group.is_none() || d.group.as_deref() == group))
    }

    pub fn unregister_where(&mut self, mut pred: impl FnMut(&GestureDefinition<H>) -> bool) -> Vec<DefinitionId> {
        let mut removed = Vec::new();
        self.entries.retain(|d| {
            if pred(d) {
                debug!("unregistered gesture '{}'", d.name);
                removed.push(d.id);
                false
            } else {
                true
            }
        });
        removed
    }

    /// Ids matching `pred` without removing them.
    pub(crate) fn select(&self, mut pred: impl FnMut(&GestureDefinition<H>) -> bool) -> Vec<DefinitionId> {
        self.entries.iter().filter(|d| pred(d)).map(|d| d.id).collect()
    }

    pub(crate) fn remove_ids(&mut self, ids: &[DefinitionId]) {
        self.unregister_where(|d| ids.contains(&d.id));
    }

    pub(crate) fn take_handler(&mut self, id: DefinitionId) -> Option<Box<dyn GestureHandler<H>>> {
        self.entries
            .iter_mut()
            .find(|d| d.id == id)
            .and_then(|d| d.handler.take())
    }

    pub(crate) fn restore_handler(&mut self, id: DefinitionId, handler: Box<dyn GestureHandler<H>>) {
        if let Some(def) = self.entries.iter_mut().find(|d| d.id == id) {
            def.handler = Some(handler);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> Registry<()> {
        Registry::new(EngineConfig::default())
    }

    fn gesture(name: &str, target: &str) -> GestureBuilder<()> {
        GestureBuilder::new(name).target(target).pattern("touch")
    }

    #[test]
    fn test_duplicate_name_is_rejected() {
        let mut r = registry();
        r.register(gesture("Pan", "canvas")).unwrap();
        let err = r.register(gesture("Pan", "other")).unwrap_err();
        assert_eq!(err, ConfigurationError::DuplicateName("Pan".into()));
        assert_eq!(r.len(), 1);
    }

    #[test]
    fn test_empty_name_is_rejected() {
        let mut r = registry();
        assert_eq!(r.register(gesture("  ", "c")).unwrap_err(), ConfigurationError::EmptyName);
        assert_eq!(r.register(gesture("*", "c")).unwrap_err(), ConfigurationError::EmptyName);
    }

    #[test]
    fn test_wildcard_names_are_generated() {
        let mut r = registry();
        r.register(gesture("stroke-2", "canvas")).unwrap();
        let a = r.register(gesture("stroke*", "canvas")).unwrap();
        let b = r.register(gesture("stroke*", "canvas")).unwrap();
        assert_eq!(r.get(a).unwrap().name(), "stroke-1");
        // stroke-2 is taken by an explicit registration
        assert_eq!(r.get(b).unwrap().name(), "stroke-3");
    }

    #[test]
    fn test_failed_build_does_not_consume_an_id() {
        let mut r = registry();
        assert!(r.register(GestureBuilder::new("Bad").target("c").pattern("paw")).is_err());
        let id = r.register(gesture("Good", "c")).unwrap();
        assert_eq!(id, DefinitionId(1));
    }

    #[test]
    fn test_unregister_is_idempotent() {
        let mut r = registry();
        let id = r.register(gesture("Pan", "canvas")).unwrap();
        assert_eq!(r.unregister("Pan"), Some(id));
        assert_eq!(r.unregister("Pan"), None);
        assert!(r.find_by_name("Pan").is_none());
        assert_eq!(r.unregister("never-registered"), None);
    }

    #[test]
    fn test_find_keeps_registration_order() {
        let mut r = registry();
        r.register(gesture("b", "canvas")).unwrap();
        r.register(gesture("x", "other")).unwrap();
        r.register(gesture("a", "canvas")).unwrap();
        let target = TargetId::from("canvas");
        let names: Vec<_> = r.find(&target).map(|d| d.name()).collect();
        assert_eq!(names, vec!["b", "a"]);
    }

    #[test]
    fn test_unregister_target_respects_group() {
        let mut r = registry();
        r.register(gesture("a", "canvas").group("tools")).unwrap();
        r.register(gesture("b", "canvas")).unwrap();
        r.register(gesture("c", "menu").group("tools")).unwrap();
        let canvas = TargetId::from("canvas");

        assert_eq!(r.unregister_target(&canvas, Some("tools")).len(), 1);
        assert!(r.find_by_name("a").is_none());
        assert!(r.find_by_name("c").is_some());

        assert_eq!(r.unregister_target(&canvas, None).len(), 1);
        assert_eq!(r.len(), 1);
    }

    #[test]
    fn test_set_enabled() {
        let mut r = registry();
        r.register(gesture("Pan", "canvas")).unwrap();
        assert!(r.set_enabled("Pan", false));
        assert!(!r.find_by_name("Pan").unwrap().is_enabled());
        assert!(!r.set_enabled("Nope", true));
    }
}
