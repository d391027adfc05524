//! JSON lifecycle reporting shared by `replay` and `live`.

use std::collections::HashSet;

use gesturectl::{
    GestureCx, GestureHandler, GestureSpec, Host, InkCapture, Point, PointerId, Role,
    StrokeRecorder,
};
use serde_json::{Value, json};

/// Host used by the binary: tracks held keys, records ink and collects
/// lifecycle records until they are drained.
#[derive(Debug, Default)]
pub struct ReportHost {
    keys: HashSet<String>,
    ink: StrokeRecorder,
    records: Vec<Value>,
}

impl ReportHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_key(&mut self, key: &str, pressed: bool) {
        if pressed {
            self.keys.insert(key.to_string());
        } else {
            self.keys.remove(key);
        }
    }

    pub fn push(&mut self, record: Value) {
        self.records.push(record);
    }

    /// Pending records, with finished strokes appended as `stroke` records.
    pub fn drain(&mut self) -> Vec<Value> {
        for stroke in self.ink.take_finished() {
            self.records.push(json!({
                "event": "stroke",
                "pointer": stroke.pointer.to_string(),
                "points": stroke.points.len(),
            }));
        }
        std::mem::take(&mut self.records)
    }
}

impl Host for ReportHost {
    fn is_key_pressed(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    fn ink(&mut self) -> Option<&mut dyn InkCapture> {
        Some(&mut self.ink)
    }
}

fn point(p: Point) -> Value {
    json!([p.x, p.y])
}

/// Handler installed for every profile gesture.
pub struct Reporter {
    moves: bool,
    ink: bool,
}

impl Reporter {
    pub fn new(spec: &GestureSpec, moves: bool) -> Self {
        Self { moves, ink: spec.ink }
    }

    fn record(cx: &mut GestureCx<'_, ReportHost>, event: &str, extra: Value) {
        let mut rec = json!({
            "t": cx.now_ms(),
            "event": event,
            "gesture": cx.name(),
            "id": cx.id().to_string(),
        });
        if let (Value::Object(base), Value::Object(more)) = (&mut rec, extra) {
            base.extend(more);
        }
        cx.host_mut().push(rec);
    }

    fn bound(cx: &GestureCx<'_, ReportHost>) -> Vec<String> {
        cx.gesture().bound_pointers().map(|p| p.to_string()).collect()
    }
}

impl GestureHandler<ReportHost> for Reporter {
    fn started(&mut self, cx: &mut GestureCx<'_, ReportHost>) {
        let pointers = Self::bound(cx);
        let at = cx.current_point(Role::FIRST).map(point).unwrap_or(Value::Null);
        Self::record(cx, "started", json!({ "pointers": pointers, "at": at }));
        if self.ink {
            let _ = cx.start_ink(Role::FIRST);
        }
    }

    fn moved(&mut self, cx: &mut GestureCx<'_, ReportHost>) {
        if !self.moves {
            return;
        }
        let points: Vec<Value> = (0..cx.gesture().roles().len())
            .filter_map(|i| cx.current_point(Role::nth(i)).ok())
            .map(point)
            .collect();
        Self::record(cx, "moved", json!({ "points": points }));
    }

    fn ended(&mut self, cx: &mut GestureCx<'_, ReportHost>, lifted: Option<PointerId>) {
        let lifted = lifted.map(|p| p.to_string());
        let moves = cx.gesture().move_count();
        Self::record(cx, "ended", json!({ "lifted": lifted, "moves": moves }));
    }

    fn cancelled(&mut self, cx: &mut GestureCx<'_, ReportHost>, reason: &str) {
        Self::record(cx, "cancelled", json!({ "reason": reason }));
    }

    fn repeated(&mut self, cx: &mut GestureCx<'_, ReportHost>, count: u32) {
        Self::record(cx, "repeated", json!({ "count": count }));
    }
}
