//! Multi-pointer gesture recognition.
//!
//! Hosts register named [`GestureDefinition`]s (pointer-type pattern, target,
//! optional condition, exclusivity) through a [`GestureBuilder`], then feed
//! raw [`PointerEvent`]s to the [`Engine`]. The engine tracks live pointers,
//! decides which definitions win which pointers and drives each winner
//! through `started` / `moved` / `ended` or `cancelled`.
//!
//! ```
//! use gesturectl::{Callbacks, Engine, GestureBuilder, PointerEvent, PointerId};
//!
//! let mut engine: Engine<()> = Engine::default();
//! engine
//!     .register(
//!         GestureBuilder::new("Pan")
//!             .target("canvas")
//!             .pattern("touch")
//!             .callbacks(Callbacks::new().on_started(|cx| println!("{} started", cx.name()))),
//!     )
//!     .unwrap();
//! engine.handle(&PointerEvent::down(PointerId::touch(1), "canvas", 10.0, 10.0, 0), &mut ());
//! assert_eq!(engine.active_gesture_names(), vec!["Pan"]);
//! ```

pub mod active;
pub mod config;
pub mod definition;
pub mod engine;
pub mod error;
pub mod host;
pub mod pattern;
pub mod pointer;
pub mod registry;
pub mod tracker;

pub use active::{ActiveGesture, GestureCx, GestureId, GestureState, MoveHandler, Role};
pub use config::{
    ConditionSpec, EngineConfig, GestureSpec, LiveConfig, Meta, Profile, ProfileError, ProfileStore,
};
pub use definition::{
    Callbacks, Condition, ConditionCx, DefinitionId, GestureBuilder, GestureDefinition, GestureHandler,
};
pub use engine::Engine;
pub use error::{ConfigurationError, UnboundRoleError};
pub use host::{Host, InkCapture, InkHandle, Stroke, StrokeRecorder};
pub use pattern::{KindMatcher, Pattern};
pub use pointer::{Buttons, Phase, Point, PointerEvent, PointerId, PointerKind, TargetId};
pub use registry::{NameGenerator, Registry};
pub use tracker::{Liveness, Pointer, PointerTracker, Transition};
