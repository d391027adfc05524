//! Live multitouch input: evdev MT slots decoded into pointer events.

use std::{
    io::Write,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use anyhow::{Context, Result, bail};
use evdev::{AbsoluteAxisCode, Device, EventType, SynchronizationCode};
use gesturectl::{Engine, LiveConfig, PointerEvent, PointerId, PointerKind, Profile, TargetId};
use log::{info, warn};

use crate::input;
use crate::report::{ReportHost, Reporter};

const MT_TOOL_PEN: i32 = 1;
const MAX_SLOTS: usize = 64;

#[derive(Debug, Clone, Default)]
struct SlotState {
    tracking_id: i32,
    x: i32,
    y: i32,
    pressure: i32,
    pen: bool,
    dirty: bool,
    /// Identity announced with the last `down`, until its `up`.
    reported: Option<PointerId>,
}

/// Turns MT protocol B slot updates into pointer events at each
/// `SYN_REPORT`.
#[derive(Debug)]
pub struct SlotDecoder {
    slots: Vec<SlotState>,
    cur_slot: usize,
    ranges: LiveConfig,
    target: TargetId,
}

impl SlotDecoder {
    pub fn new(ranges: LiveConfig) -> Self {
        Self {
            slots: Vec::new(),
            cur_slot: 0,
            target: TargetId::new(ranges.target.clone()),
            ranges,
        }
    }

    fn slot(&mut self) -> &mut SlotState {
        if self.slots.len() <= self.cur_slot {
            self.slots.resize(
                self.cur_slot + 1,
                SlotState {
                    tracking_id: -1,
                    ..SlotState::default()
                },
            );
        }
        &mut self.slots[self.cur_slot]
    }

    pub fn on_abs(&mut self, code: u16, value: i32) {
        match code {
            c if c == AbsoluteAxisCode::ABS_MT_SLOT.0 => {
                if let Ok(slot) = usize::try_from(value) {
                    if slot < MAX_SLOTS {
                        self.cur_slot = slot;
                    }
                }
            }
            c if c == AbsoluteAxisCode::ABS_MT_TRACKING_ID.0 => {
                let s = self.slot();
                s.tracking_id = value;
                s.dirty = true;
            }
            c if c == AbsoluteAxisCode::ABS_MT_POSITION_X.0 => {
                let s = self.slot();
                s.x = value;
                s.dirty = true;
            }
            c if c == AbsoluteAxisCode::ABS_MT_POSITION_Y.0 => {
                let s = self.slot();
                s.y = value;
                s.dirty = true;
            }
            c if c == AbsoluteAxisCode::ABS_MT_PRESSURE.0 => {
                let s = self.slot();
                s.pressure = value;
                s.dirty = true;
            }
            c if c == AbsoluteAxisCode::ABS_MT_TOOL_TYPE.0 => {
                self.slot().pen = value == MT_TOOL_PEN;
            }
            _ => {}
        }
    }

    pub fn on_syn_report(&mut self, time_ms: u64) -> Vec<PointerEvent> {
        let mut out = Vec::new();
        let (sx, sy) = (self.ranges.width / self.ranges.x_max, self.ranges.height / self.ranges.y_max);
        let pressure_max = self.ranges.pressure_max;

        for s in self.slots.iter_mut() {
            let x = s.x as f32 * sx;
            let y = s.y as f32 * sy;
            let pressure = s.pressure as f32 / pressure_max;
            let live_id = u32::try_from(s.tracking_id).ok();

            if let Some(old) = s.reported {
                if live_id != Some(old.id) {
                    out.push(PointerEvent::up(old, self.target.clone(), x, y, time_ms));
                    s.reported = None;
                }
            }
            match (live_id, s.reported) {
                (Some(id), None) => {
                    let kind = if s.pen { PointerKind::Pen } else { PointerKind::Touch };
                    let pointer = PointerId::new(kind, id);
                    out.push(
                        PointerEvent::down(pointer, self.target.clone(), x, y, time_ms).with_pressure(pressure),
                    );
                    s.reported = Some(pointer);
                }
                (Some(_), Some(pointer)) if s.dirty => {
                    out.push(
                        PointerEvent::moved(pointer, self.target.clone(), x, y, time_ms).with_pressure(pressure),
                    );
                }
                _ => {}
            }
            s.dirty = false;
        }
        out
    }
}

fn open_devices() -> Result<Vec<Device>> {
    let devices = input::discover_multitouch();
    if devices.is_empty() {
        bail!("no multitouch devices detected; run `gesturectl doctor`");
    }
    let mut devs = vec![];
    for d in devices {
        match Device::open(&d.path) {
            Ok(mut dev) => {
                if let Err(e) = dev.set_nonblocking(true) {
                    warn!("{}: cannot switch to non-blocking reads: {e}", d.path);
                    continue;
                }
                info!("reading {} ({})", d.name, d.path);
                devs.push(dev);
            }
            Err(e) => warn!("failed to open {}: {e}", d.path),
        }
    }
    if devs.is_empty() {
        bail!("failed to open all detected devices");
    }
    Ok(devs)
}

/// Feeds every detected multitouch device into an engine loaded with
/// `profile` until SIGINT/SIGTERM, printing lifecycle records as JSON lines.
pub fn run(profile: &Profile, moves: bool) -> Result<()> {
    let term = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(signal_hook::consts::SIGINT, Arc::clone(&term))?;
    signal_hook::flag::register(signal_hook::consts::SIGTERM, Arc::clone(&term))?;

    let mut devs = open_devices()?;
    let mut decoders: Vec<SlotDecoder> = devs.iter().map(|_| SlotDecoder::new(profile.live.clone())).collect();

    let mut host = ReportHost::new();
    let mut engine: Engine<ReportHost> = Engine::new(profile.engine.clone());
    profile
        .install(&mut engine, |spec| Box::new(Reporter::new(spec, moves)))
        .context("failed to install profile gestures")?;

    let start = Instant::now();
    let stdout = std::io::stdout();
    info!("live recognition running; Ctrl-C to stop");

    while !term.load(Ordering::Relaxed) {
        let mut any_event = false;
        for (dev, decoder) in devs.iter_mut().zip(decoders.iter_mut()) {
            let Ok(events) = dev.fetch_events() else {
                continue;
            };
            for ev in events {
                any_event = true;
                if ev.event_type() == EventType::ABSOLUTE {
                    decoder.on_abs(ev.code(), ev.value());
                } else if ev.event_type() == EventType::SYNCHRONIZATION
                    && ev.code() == SynchronizationCode::SYN_REPORT.0
                {
                    let now = start.elapsed().as_millis() as u64;
                    for pe in decoder.on_syn_report(now) {
                        engine.handle(&pe, &mut host);
                    }
                }
            }
        }

        if !any_event {
            engine.poll(start.elapsed().as_millis() as u64, &mut host);
        }
        let mut out = stdout.lock();
        for rec in host.drain() {
            writeln!(out, "{rec}")?;
        }
        drop(out);

        if !any_event {
            thread::sleep(Duration::from_millis(4));
        }
    }

    engine.cancel_all("shutdown", &mut host);
    let mut out = stdout.lock();
    for rec in host.drain() {
        writeln!(out, "{rec}")?;
    }
    info!("stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use gesturectl::Phase;

    fn decoder() -> SlotDecoder {
        SlotDecoder::new(LiveConfig {
            target: "screen".into(),
            x_max: 1000.0,
            y_max: 1000.0,
            pressure_max: 100.0,
            width: 100.0,
            height: 50.0,
        })
    }

    #[test]
    fn test_two_fingers_down_move_up() {
        let mut d = decoder();
        d.on_abs(AbsoluteAxisCode::ABS_MT_SLOT.0, 0);
        d.on_abs(AbsoluteAxisCode::ABS_MT_TRACKING_ID.0, 7);
        d.on_abs(AbsoluteAxisCode::ABS_MT_POSITION_X.0, 500);
        d.on_abs(AbsoluteAxisCode::ABS_MT_POSITION_Y.0, 500);
        d.on_abs(AbsoluteAxisCode::ABS_MT_SLOT.0, 1);
        d.on_abs(AbsoluteAxisCode::ABS_MT_TRACKING_ID.0, 8);
        d.on_abs(AbsoluteAxisCode::ABS_MT_POSITION_X.0, 100);
        let evs = d.on_syn_report(10);
        assert_eq!(evs.len(), 2);
        assert!(evs.iter().all(|e| e.phase == Phase::Down));
        assert_eq!(evs[0].pointer, PointerId::touch(7));
        assert_eq!(evs[0].position.x, 50.0);
        assert_eq!(evs[0].position.y, 25.0);
        assert_eq!(evs[0].target.as_str(), "screen");

        // nothing changed, nothing reported
        assert!(d.on_syn_report(12).is_empty());

        d.on_abs(AbsoluteAxisCode::ABS_MT_SLOT.0, 0);
        d.on_abs(AbsoluteAxisCode::ABS_MT_POSITION_X.0, 600);
        let evs = d.on_syn_report(20);
        assert_eq!(evs.len(), 1);
        assert_eq!(evs[0].phase, Phase::Move);
        assert_eq!(evs[0].position.x, 60.0);

        d.on_abs(AbsoluteAxisCode::ABS_MT_SLOT.0, 1);
        d.on_abs(AbsoluteAxisCode::ABS_MT_TRACKING_ID.0, -1);
        let evs = d.on_syn_report(30);
        assert_eq!(evs.len(), 1);
        assert_eq!(evs[0].phase, Phase::Up);
        assert_eq!(evs[0].pointer, PointerId::touch(8));
    }

    #[test]
    fn test_pen_tool_and_pressure() {
        let mut d = decoder();
        d.on_abs(AbsoluteAxisCode::ABS_MT_TOOL_TYPE.0, MT_TOOL_PEN);
        d.on_abs(AbsoluteAxisCode::ABS_MT_TRACKING_ID.0, 3);
        d.on_abs(AbsoluteAxisCode::ABS_MT_PRESSURE.0, 50);
        let evs = d.on_syn_report(0);
        assert_eq!(evs[0].pointer, PointerId::pen(3));
        assert_eq!(evs[0].pressure, 0.5);
    }

    #[test]
    fn test_reused_slot_with_new_tracking_id() {
        let mut d = decoder();
        d.on_abs(AbsoluteAxisCode::ABS_MT_TRACKING_ID.0, 1);
        d.on_syn_report(0);
        d.on_abs(AbsoluteAxisCode::ABS_MT_TRACKING_ID.0, 2);
        let evs = d.on_syn_report(5);
        let phases: Vec<_> = evs.iter().map(|e| (e.phase, e.pointer)).collect();
        assert_eq!(
            phases,
            vec![(Phase::Up, PointerId::touch(1)), (Phase::Down, PointerId::touch(2))]
        );
    }

    #[test]
    fn test_out_of_range_slot_is_ignored() {
        let mut d = decoder();
        d.on_abs(AbsoluteAxisCode::ABS_MT_SLOT.0, -1);
        d.on_abs(AbsoluteAxisCode::ABS_MT_SLOT.0, 1000);
        d.on_abs(AbsoluteAxisCode::ABS_MT_TRACKING_ID.0, 4);
        assert_eq!(d.on_syn_report(0).len(), 1);
        assert_eq!(d.slots.len(), 1);
    }
}
