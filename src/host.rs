//! Collaborators the engine consumes from the host application.

use std::cell::RefCell;
use std::rc::Rc;

use crate::pointer::{Point, PointerId, TargetId};

/// Host-side state and services reachable from conditions and callbacks.
///
/// The host type is also where shared interaction modes live (for example
/// "lasso combine in progress"); conditions read it through
/// [`ConditionCx::host`](crate::ConditionCx::host) and callbacks mutate it
/// through [`GestureCx::host_mut`](crate::GestureCx::host_mut).
pub trait Host {
    /// Maps a screen point into the target's surface space (pan/zoom).
    fn to_logical_point(&self, screen: Point, _target: &TargetId) -> Point {
        screen
    }

    fn is_key_pressed(&self, _key: &str) -> bool {
        false
    }

    fn ink(&mut self) -> Option<&mut dyn InkCapture> {
        None
    }
}

impl Host for () {}

pub trait InkCapture {
    fn start_ink(&mut self, pointer: PointerId, at: Point, pressure: f32) -> Box<dyn InkHandle>;
}

/// A stroke being captured for one pointer.
pub trait InkHandle {
    fn add_point(&mut self, at: Point, pressure: f32);
    fn end(&mut self);
    fn points(&self) -> &[Point];
    fn is_ended(&self) -> bool;
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stroke {
    pub pointer: PointerId,
    pub points: Vec<Point>,
    pub pressures: Vec<f32>,
}

/// In-memory ink capture; finished strokes are collected in order.
#[derive(Debug, Default, Clone)]
pub struct StrokeRecorder {
    finished: Rc<RefCell<Vec<Stroke>>>,
}

impl StrokeRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn finished(&self) -> Vec<Stroke> {
        self.finished.borrow().clone()
    }

    pub fn take_finished(&self) -> Vec<Stroke> {
        std::mem::take(&mut *self.finished.borrow_mut())
    }
}

impl InkCapture for StrokeRecorder {
    fn start_ink(&mut self, pointer: PointerId, at: Point, pressure: f32) -> Box<dyn InkHandle> {
        Box::new(RecordedInk {
            stroke: Stroke {
                pointer,
                points: vec![at],
                pressures: vec![pressure],
            },
            sink: Rc::clone(&self.finished),
            ended: false,
        })
    }
}

struct RecordedInk {
    stroke: Stroke,
    sink: Rc<RefCell<Vec<Stroke>>>,
    ended: bool,
}

impl InkHandle for RecordedInk {
    fn add_point(&mut self, at: Point, pressure: f32) {
        if self.ended {
            return;
        }
        self.stroke.points.push(at);
        self.stroke.pressures.push(pressure);
    }

    fn end(&mut self) {
        if self.ended {
            return;
        }
        self.ended = true;
        self.sink.borrow_mut().push(self.stroke.clone());
    }

    fn points(&self) -> &[Point] {
        &self.stroke.points
    }

    fn is_ended(&self) -> bool {
        self.ended
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recorder_collects_ended_strokes_once() {
        let mut rec = StrokeRecorder::new();
        let mut ink = rec.start_ink(PointerId::pen(1), Point::new(0.0, 0.0), 0.5);
        ink.add_point(Point::new(1.0, 1.0), 0.6);
        assert_eq!(ink.points().len(), 2);
        assert!(rec.finished().is_empty());

        ink.end();
        ink.end();
        ink.add_point(Point::new(9.0, 9.0), 0.6);
        let strokes = rec.take_finished();
        assert_eq!(strokes.len(), 1);
        assert_eq!(strokes[0].points.len(), 2);
        assert_eq!(strokes[0].pressures, vec![0.5, 0.6]);
        assert!(rec.finished().is_empty());
    }
}
