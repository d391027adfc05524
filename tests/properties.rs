//! Arbitration invariants over random pointer streams.

use std::collections::{HashMap, HashSet};

use gesturectl::{Callbacks, Engine, GestureBuilder, PointerEvent, PointerId};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Step {
    Down(u32),
    Move(u32, f32),
    Up(u32),
    Poll,
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        (0u32..5).prop_map(Step::Down),
        (0u32..5, -60.0f32..60.0).prop_map(|(i, dx)| Step::Move(i, dx)),
        (0u32..5).prop_map(Step::Up),
        Just(Step::Poll),
    ]
}

fn pointer(i: u32) -> PointerId {
    if i == 4 { PointerId::pen(1) } else { PointerId::touch(i) }
}

fn engine() -> Engine<()> {
    let mut e: Engine<()> = Engine::default();
    let defs = [
        GestureBuilder::new("Zoom").pattern("touch*2").recheck_on_pointer_loss(true),
        GestureBuilder::new("Pan").pattern("touch"),
        GestureBuilder::new("Trail").pattern("any").exclusive(false),
        GestureBuilder::new("Spread").pattern("touch*3").min_pointers(2),
        GestureBuilder::new("Draw").pattern("pen | pen + touch"),
        GestureBuilder::new("Tap").pattern("any").repeat(2, 200).recheck_on_pointer_loss(true),
    ];
    for b in defs {
        e.register(b.target("canvas").callbacks(Callbacks::new().on_move(|cx| {
            if cx.gesture().move_count() > 5 {
                cx.end();
            }
        })))
        .unwrap();
    }
    e
}

fn check(e: &Engine<()>) -> Result<(), TestCaseError> {
    let mut exclusive_owner: HashSet<PointerId> = HashSet::new();
    let mut per_definition: HashSet<(gesturectl::DefinitionId, PointerId)> = HashSet::new();
    for g in e.active_gestures() {
        prop_assert!(
            g.pointer_count_bound() >= g.min_pointers(),
            "{} has {} pointer(s), needs {}",
            g.name(),
            g.pointer_count_bound(),
            g.min_pointers()
        );
        for p in g.bound_pointers() {
            prop_assert!(e.pointers().get(p).is_some(), "{} bound to lifted {p}", g.name());
            if g.is_exclusive() {
                prop_assert!(exclusive_owner.insert(p), "{p} owned by two exclusive gestures");
            }
            prop_assert!(per_definition.insert((g.definition(), p)), "{p} bound twice by {}", g.name());
        }
    }
    Ok(())
}

proptest! {
    #[test]
    fn prop_arbitration_invariants(steps in prop::collection::vec((step(), 1u64..80), 1..80)) {
        let mut e = engine();
        let mut now = 0u64;
        let mut xs: HashMap<u32, f32> = HashMap::new();
        for (s, dt) in steps {
            now += dt;
            match s {
                Step::Down(i) => {
                    let x = i as f32 * 100.0;
                    xs.insert(i, x);
                    e.handle(&PointerEvent::down(pointer(i), "canvas", x, 0.0, now), &mut ());
                }
                Step::Move(i, dx) => {
                    let x = xs.entry(i).or_insert(0.0);
                    *x += dx;
                    e.handle(&PointerEvent::moved(pointer(i), "canvas", *x, 0.0, now), &mut ());
                }
                Step::Up(i) => {
                    let x = xs.remove(&i).unwrap_or(0.0);
                    e.handle(&PointerEvent::up(pointer(i), "canvas", x, 0.0, now), &mut ());
                }
                Step::Poll => e.poll(now, &mut ()),
            }
            check(&e)?;
        }
        e.cancel_all("done", &mut ());
        prop_assert!(e.active_gestures().next().is_none());
    }

    #[test]
    fn prop_tracker_matches_live_contacts(steps in prop::collection::vec((step(), 1u64..40), 1..60)) {
        let mut e = engine();
        let mut live: HashSet<u32> = HashSet::new();
        let mut now = 0u64;
        for (s, dt) in steps {
            now += dt;
            match s {
                Step::Down(i) => {
                    live.insert(i);
                    e.handle(&PointerEvent::down(pointer(i), "canvas", 0.0, 0.0, now), &mut ());
                }
                Step::Up(i) => {
                    live.remove(&i);
                    e.handle(&PointerEvent::up(pointer(i), "canvas", 0.0, 0.0, now), &mut ());
                }
                Step::Move(..) | Step::Poll => {}
            }
            prop_assert_eq!(e.pointers().len(), live.len());
        }
    }
}
