//! Offline recognition over a recorded JSON-lines trace.

use std::io::{BufRead, Write};

use anyhow::{Context, Result};
use gesturectl::{Engine, PointerEvent, Profile};
use log::debug;
use serde::Deserialize;

use crate::report::{ReportHost, Reporter};

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TraceEntry {
    Pointer(PointerEvent),
    Key { key: String, pressed: bool },
    Poll { poll: u64 },
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReplaySummary {
    pub events: usize,
    pub records: usize,
}

/// Replays `trace` through an engine loaded with `profile`, writing one JSON
/// object per lifecycle record to `out`. Blank lines and `#` comments are
/// skipped; a line that is not a trace entry aborts with its line number.
pub fn replay(profile: &Profile, trace: impl BufRead, moves: bool, out: &mut impl Write) -> Result<ReplaySummary> {
    let mut host = ReportHost::new();
    let mut engine: Engine<ReportHost> = Engine::new(profile.engine.clone());
    profile
        .install(&mut engine, |spec| Box::new(Reporter::new(spec, moves)))
        .context("failed to install profile gestures")?;

    let mut summary = ReplaySummary::default();
    for (n, line) in trace.lines().enumerate() {
        let line = line.with_context(|| format!("failed to read trace line {}", n + 1))?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let entry: TraceEntry =
            serde_json::from_str(line).with_context(|| format!("trace line {}: not a pointer, key or poll entry", n + 1))?;
        match entry {
            TraceEntry::Pointer(ev) => {
                summary.events += 1;
                engine.handle(&ev, &mut host);
            }
            TraceEntry::Key { key, pressed } => {
                debug!("key {key} {}", if pressed { "down" } else { "up" });
                host.set_key(&key, pressed);
            }
            TraceEntry::Poll { poll } => engine.poll(poll, &mut host),
        }
        for rec in host.drain() {
            summary.records += 1;
            writeln!(out, "{rec}")?;
        }
    }

    if engine.active_gestures().next().is_some() {
        engine.cancel_all("end of trace", &mut host);
        for rec in host.drain() {
            summary.records += 1;
            writeln!(out, "{rec}")?;
        }
    }
    Ok(summary)
}
