//! Engine defaults and TOML gesture profiles.

use std::{
    fs,
    path::{Path, PathBuf},
};

use directories::UserDirs;
use log::info;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::definition::{ConditionCx, DefinitionId, GestureBuilder, GestureHandler};
use crate::engine::Engine;
use crate::error::ConfigurationError;
use crate::host::Host;
use crate::pointer::Buttons;

/// Defaults applied to definitions that don't set their own values, plus
/// tracker tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Largest spread between the first and last pointer of a binding.
    pub recognition_timeout_ms: u64,
    pub repeat_timeout_ms: u64,
    pub repeat_slop: f32,
    /// Screen-space distance below which a move is coalesced.
    pub move_epsilon: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            recognition_timeout_ms: 150,
            repeat_timeout_ms: 300,
            repeat_slop: 20.0,
            move_epsilon: 0.5,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), ProfileError> {
        if !self.move_epsilon.is_finite() || self.move_epsilon < 0.0 {
            return Err(ProfileError::Invalid(
                "engine.move_epsilon must be a finite, non-negative distance".into(),
            ));
        }
        if !self.repeat_slop.is_finite() || self.repeat_slop < 0.0 {
            return Err(ProfileError::Invalid(
                "engine.repeat_slop must be a finite, non-negative distance".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse profile: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("profile not found: {0}")]
    NotFound(PathBuf),
    #[error("no home directory to keep profiles in")]
    NoHome,
    #[error("invalid profile: {0}")]
    Invalid(String),
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Meta {
    pub name: Option<String>,
    pub description: Option<String>,
}

/// How raw device coordinates map onto the surface used by `live`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveConfig {
    pub target: String,
    pub x_max: f32,
    pub y_max: f32,
    pub pressure_max: f32,
    /// Logical surface size the device range is scaled to.
    pub width: f32,
    pub height: f32,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            target: "touchscreen".into(),
            x_max: 4096.0,
            y_max: 4096.0,
            pressure_max: 255.0,
            width: 1920.0,
            height: 1080.0,
        }
    }
}

impl LiveConfig {
    fn validate(&self) -> Result<(), ProfileError> {
        if self.target.trim().is_empty() {
            return Err(ProfileError::Invalid("live.target must not be empty".into()));
        }
        let ranges = [
            ("x_max", self.x_max),
            ("y_max", self.y_max),
            ("pressure_max", self.pressure_max),
            ("width", self.width),
            ("height", self.height),
        ];
        for (key, v) in ranges {
            if !v.is_finite() || v <= 0.0 {
                return Err(ProfileError::Invalid(format!("live.{key} must be positive, got {v}")));
            }
        }
        Ok(())
    }
}

/// Declarative condition for profile gestures. Every listed requirement must
/// hold; an empty table always passes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConditionSpec {
    pub keys: Vec<String>,
    pub not_keys: Vec<String>,
    /// Some candidate pointer reports all of these buttons.
    pub buttons: u32,
    /// No candidate pointer reports any of these buttons.
    pub not_buttons: u32,
}

impl ConditionSpec {
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty() && self.not_keys.is_empty() && self.buttons == 0 && self.not_buttons == 0
    }

    pub fn evaluate<H: Host>(&self, cx: &ConditionCx<'_, H>) -> bool {
        if !self.keys.iter().all(|k| cx.is_key_pressed(k)) {
            return false;
        }
        if self.not_keys.iter().any(|k| cx.is_key_pressed(k)) {
            return false;
        }
        if self.buttons != 0 && !cx.any_buttons(Buttons(self.buttons)) {
            return false;
        }
        let forbidden = Buttons(self.not_buttons);
        !(self.not_buttons != 0 && cx.pointers().iter().any(|p| p.buttons.intersects(forbidden)))
    }
}

fn yes() -> bool {
    true
}

fn one() -> u32 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GestureSpec {
    pub name: String,
    pub target: Option<String>,
    pub pattern: String,
    pub min_pointers: Option<usize>,
    #[serde(default = "yes")]
    pub exclusive: bool,
    #[serde(default)]
    pub recheck_on_pointer_loss: bool,
    pub recognition_timeout_ms: Option<u64>,
    #[serde(default = "one")]
    pub repeat_count: u32,
    pub repeat_timeout_ms: Option<u64>,
    pub repeat_slop: Option<f32>,
    pub group: Option<String>,
    #[serde(default = "yes")]
    pub enabled: bool,
    /// Capture ink for the first role while the gesture runs.
    #[serde(default)]
    pub ink: bool,
    pub when: Option<ConditionSpec>,
}

impl GestureSpec {
    pub fn builder<H: Host + 'static>(&self) -> GestureBuilder<H> {
        let mut b = GestureBuilder::new(self.name.clone())
            .pattern(self.pattern.clone())
            .exclusive(self.exclusive)
            .recheck_on_pointer_loss(self.recheck_on_pointer_loss)
            .enabled(self.enabled);
        if let Some(target) = &self.target {
            b = b.target(target.as_str());
        }
        if let Some(n) = self.min_pointers {
            b = b.min_pointers(n);
        }
        if let Some(ms) = self.recognition_timeout_ms {
            b = b.recognition_timeout_ms(ms);
        }
        if self.repeat_count != 1 || self.repeat_timeout_ms.is_some() {
            let timeout = self
                .repeat_timeout_ms
                .unwrap_or(EngineConfig::default().repeat_timeout_ms);
            b = b.repeat(self.repeat_count, timeout);
        }
        if let Some(slop) = self.repeat_slop {
            b = b.repeat_slop(slop);
        }
        if let Some(group) = &self.group {
            b = b.group(group.clone());
        }
        if let Some(when) = self.when.clone().filter(|w| !w.is_empty()) {
            b = b.condition(move |cx| when.evaluate(cx));
        }
        b
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default)]
    pub meta: Meta,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub live: LiveConfig,
    #[serde(default, rename = "gesture")]
    pub gestures: Vec<GestureSpec>,
}

impl Profile {
    pub fn from_toml_str(text: &str) -> Result<Self, ProfileError> {
        let profile: Profile = toml::from_str(text)?;
        profile.validate()?;
        Ok(profile)
    }

    pub fn load(path: &Path) -> Result<Self, ProfileError> {
        let text = fs::read_to_string(path).map_err(|source| ProfileError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn name(&self) -> &str {
        self.meta.name.as_deref().unwrap_or("unnamed")
    }

    pub fn validate(&self) -> Result<(), ProfileError> {
        self.engine.validate()?;
        self.live.validate()?;
        for g in &self.gestures {
            if g.name.trim().is_empty() {
                return Err(ProfileError::Invalid("gesture with empty name".into()));
            }
            if g.pattern.trim().is_empty() {
                return Err(ProfileError::Invalid(format!("gesture '{}' has no pattern", g.name)));
            }
        }
        Ok(())
    }

    /// Registers every gesture of the profile, stopping at the first
    /// registration the engine rejects.
    pub fn install<H, F>(&self, engine: &mut Engine<H>, mut make_handler: F) -> Result<Vec<DefinitionId>, ProfileError>
    where
        H: Host + 'static,
        F: FnMut(&GestureSpec) -> Box<dyn GestureHandler<H>>,
    {
        let mut ids = Vec::with_capacity(self.gestures.len());
        for spec in &self.gestures {
            let builder = spec.builder::<H>().handler(make_handler(spec));
            ids.push(engine.register(builder)?);
        }
        info!("installed {} gesture(s) from profile '{}'", ids.len(), self.name());
        Ok(ids)
    }
}

fn default_profile_text() -> &'static str {
    include_str!("../profiles/default.toml")
}

/// Profiles directory, `~/.config/gesturectl/profiles` by default.
#[derive(Debug, Clone)]
pub struct ProfileStore {
    dir: PathBuf,
}

impl ProfileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn user() -> Result<Self, ProfileError> {
        let home = UserDirs::new().ok_or(ProfileError::NoHome)?.home_dir().to_path_buf();
        Ok(Self::new(home.join(".config").join("gesturectl").join("profiles")))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Creates the directory and writes the bundled default profile if it is
    /// missing.
    pub fn install_default(&self) -> Result<PathBuf, ProfileError> {
        let io = |source| ProfileError::Io {
            path: self.dir.clone(),
            source,
        };
        fs::create_dir_all(&self.dir).map_err(io)?;
        let path = self.dir.join("default.toml");
        if !path.exists() {
            fs::write(&path, default_profile_text()).map_err(io)?;
            info!("installed default profile at {}", path.display());
        }
        Ok(path)
    }

    pub fn list_profiles(&self) -> Vec<String> {
        let mut v = Vec::new();
        if let Ok(rd) = fs::read_dir(&self.dir) {
            for e in rd.flatten() {
                let path = e.path();
                if path.extension().is_some_and(|ext| ext == "toml") {
                    if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                        v.push(stem.to_string());
                    }
                }
            }
        }
        v.sort();
        v
    }

    /// A bare name refers to `<dir>/<name>.toml`; anything that looks like a
    /// path is used as-is.
    pub fn resolve(&self, name_or_path: &str) -> PathBuf {
        let p = Path::new(name_or_path);
        if p.extension().is_some() || p.components().count() > 1 {
            p.to_path_buf()
        } else {
            self.dir.join(format!("{name_or_path}.toml"))
        }
    }

    pub fn load(&self, name_or_path: &str) -> Result<Profile, ProfileError> {
        let path = self.resolve(name_or_path);
        if !path.exists() {
            return Err(ProfileError::NotFound(path));
        }
        Profile::load(&path)
    }

    pub fn load_or_install_default(&self, name: Option<&str>) -> Result<Profile, ProfileError> {
        self.install_default()?;
        self.load(name.unwrap_or("default"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pointer::{PointerEvent, PointerId, Point};
    use crate::tracker::PointerTracker;

    struct Keys(Vec<&'static str>);

    impl Host for Keys {
        fn is_key_pressed(&self, key: &str) -> bool {
            self.0.contains(&key)
        }
    }

    fn scratch_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("gesturectl-{tag}-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn test_bundled_default_profile_is_valid() {
        let profile = Profile::from_toml_str(default_profile_text()).unwrap();
        assert!(!profile.gestures.is_empty());
        let mut engine: Engine<()> = Engine::new(profile.engine.clone());
        let ids = profile
            .install(&mut engine, |_| Box::new(crate::definition::Callbacks::new()))
            .unwrap();
        assert_eq!(ids.len(), profile.gestures.len());
    }

    #[test]
    fn test_parse_gesture_tables() {
        let text = r#"
            [meta]
            name = "test"

            [engine]
            recognition_timeout_ms = 90

            [[gesture]]
            name = "Zoom"
            target = "canvas"
            pattern = "touch*2"
            recheck_on_pointer_loss = true

            [[gesture]]
            name = "Erase"
            target = "canvas"
            pattern = "pen"
            [gesture.when]
            buttons = 32
        "#;
        let p = Profile::from_toml_str(text).unwrap();
        assert_eq!(p.name(), "test");
        assert_eq!(p.engine.recognition_timeout_ms, 90);
        assert_eq!(p.engine.repeat_timeout_ms, 300);
        assert_eq!(p.live, LiveConfig::default());
        assert_eq!(p.gestures.len(), 2);
        assert!(p.gestures[0].exclusive);
        assert!(p.gestures[0].recheck_on_pointer_loss);
        assert_eq!(p.gestures[1].when.as_ref().unwrap().buttons, 32);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let err = Profile::from_toml_str("[engine]\nmove_epsilon = -1.0\n").unwrap_err();
        assert!(matches!(err, ProfileError::Invalid(_)));
        let err = Profile::from_toml_str("[live]\nx_max = 0\n").unwrap_err();
        assert!(matches!(err, ProfileError::Invalid(_)));
        let err = Profile::from_toml_str("[[gesture]]\nname = \"x\"\npattern = \"\"\n").unwrap_err();
        assert!(matches!(err, ProfileError::Invalid(_)));
        let err = Profile::from_toml_str("[engine\n").unwrap_err();
        assert!(matches!(err, ProfileError::Parse(_)));
    }

    #[test]
    fn test_install_surfaces_registration_errors() {
        let p = Profile::from_toml_str("[[gesture]]\nname = \"Pan\"\npattern = \"touch\"\n").unwrap();
        let mut engine: Engine<()> = Engine::default();
        let err = p
            .install(&mut engine, |_| Box::new(crate::definition::Callbacks::new()))
            .unwrap_err();
        assert!(matches!(
            err,
            ProfileError::Configuration(ConfigurationError::MissingTarget { .. })
        ));
    }

    #[test]
    fn test_condition_spec() {
        let mut tracker = PointerTracker::default();
        let ev = PointerEvent::down(PointerId::pen(1), "canvas", 0.0, 0.0, 0).with_buttons(Buttons::ERASER);
        tracker.on_pointer_down(&ev, Point::new(0.0, 0.0));
        let pointers: Vec<_> = tracker.iter().collect();

        let held = Keys(vec!["Shift"]);
        let cx = ConditionCx {
            host: &held,
            pointers: &pointers,
            name: "Erase",
        };
        let eraser = ConditionSpec {
            buttons: Buttons::ERASER.0,
            ..Default::default()
        };
        assert!(eraser.evaluate(&cx));
        let no_eraser = ConditionSpec {
            not_buttons: Buttons::ERASER.0,
            ..Default::default()
        };
        assert!(!no_eraser.evaluate(&cx));
        let shifted = ConditionSpec {
            keys: vec!["Shift".into()],
            not_keys: vec!["Alt".into()],
            ..Default::default()
        };
        assert!(shifted.evaluate(&cx));
        let ctrl = ConditionSpec {
            keys: vec!["Control".into()],
            ..Default::default()
        };
        assert!(!ctrl.evaluate(&cx));
        assert!(ConditionSpec::default().is_empty());
    }

    #[test]
    fn test_store_installs_and_lists_default() {
        let dir = scratch_dir("store");
        let store = ProfileStore::new(&dir);
        assert!(store.list_profiles().is_empty());
        let profile = store.load_or_install_default(None).unwrap();
        assert_eq!(profile.name(), "default");
        assert_eq!(store.list_profiles(), vec!["default".to_string()]);
        assert!(matches!(store.load("missing"), Err(ProfileError::NotFound(_))));
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_resolve_names_and_paths() {
        let store = ProfileStore::new("/profiles");
        assert_eq!(store.resolve("work"), PathBuf::from("/profiles/work.toml"));
        assert_eq!(store.resolve("./work.toml"), PathBuf::from("./work.toml"));
        assert_eq!(store.resolve("/tmp/x.toml"), PathBuf::from("/tmp/x.toml"));
    }
}
