//! group.rs
//!
//! Buckets the flat sequence by absolute tick into ordered groups and gives
//! each group its distance to the predecessor in ticks and in milliseconds.
//!
//! ticks_per_quarter = PPQ from the header
//! µs_per_quarter    = tempo in the latest set-tempo event
//! µs_per_tick       = µs_per_quarter / ticks_per_quarter
//! ms_per_tick       = µs_per_tick / 1000
//!
//! A tempo change takes effect starting at the group *after* its own tick,
//! matching how a real-time player would schedule it. Groups closer together
//! than the merge window fold into their predecessor, so near-simultaneous
//! events (chords spread over a few ticks, loose quantization) come out as
//! one group.

use std::collections::BTreeMap;

use crate::diag::{DiagSink, Log, Notice};
use crate::event::SheetEvent;
use crate::sheet::Sheet;

/// Default merge window, and also the smallest one that merges at all:
/// anything below is treated as "no merging".
pub const DEFAULT_MERGE_MS: f64 = 4.0;

/// Events sharing (or merged into) one tick position.
#[derive(Clone, Debug)]
pub struct TimeGroup<'a> {
    /// Absolute tick of the group. Merging keeps the emitted group's tick.
    pub ticks: u64,
    /// Distance to the previous emitted group, 0 for the first
    pub delta_ticks: u64,
    /// The same distance in milliseconds under the tempo in effect
    pub delta_ms: f64,
    pub events: Vec<&'a SheetEvent<'a>>,
}

impl<'a> Sheet<'a> {
    /// Group the sequence with diagnostics going to `tracing`.
    pub fn groups(&self, merge_ms: f64) -> Vec<TimeGroup<'_>> {
        to_groups(self, merge_ms, &mut Log)
    }
}

/// Bucket `sheet.sequence` by tick and compute inter-group deltas, merging
/// groups closer than `merge_ms` milliseconds into their predecessor.
///
/// A zero `first_tempo` yields a zero ms-per-tick rate, so every delta is
/// 0 ms and, with merging on, everything folds into one group. Callers that
/// care must check `Sheet::first_tempo` first.
pub fn to_groups<'s>(
    sheet: &'s Sheet<'_>,
    merge_ms: f64,
    sink: &mut dyn DiagSink,
) -> Vec<TimeGroup<'s>> {
    let mut buckets: BTreeMap<u64, Vec<&'s SheetEvent<'_>>> = BTreeMap::new();
    for ev in &sheet.sequence {
        buckets.entry(ev.ticks).or_default().push(ev);
    }

    let mut groups: Vec<TimeGroup<'s>> = buckets
        .into_iter()
        .map(|(ticks, events)| TimeGroup { ticks, delta_ticks: 0, delta_ms: 0.0, events })
        .collect();
    for i in 1..groups.len() {
        groups[i].delta_ticks = groups[i].ticks - groups[i - 1].ticks;
    }

    let ticks_per_beat = f64::from(sheet.ticks_per_beat);
    let mut ms_per_tick = f64::from(sheet.first_tempo) / ticks_per_beat / 1000.0;

    if merge_ms < DEFAULT_MERGE_MS {
        if merge_ms != 0.0 {
            sink.notice(Notice::MergeDisabled { merge_ms });
        }
        for i in 1..groups.len() {
            for ev in &groups[i - 1].events {
                if let Some(us_per_qn) = ev.tempo() {
                    ms_per_tick = f64::from(us_per_qn) / ticks_per_beat / 1000.0;
                }
            }
            groups[i].delta_ms = groups[i].delta_ticks as f64 * ms_per_tick;
        }
        return groups;
    }

    let mut merged: Vec<TimeGroup<'s>> = Vec::with_capacity(groups.len());
    for mut group in groups {
        // The first group has no predecessor and is never merged
        let Some(last) = merged.last_mut() else {
            merged.push(group);
            continue;
        };
        // Tempo events inside the last emitted group (including absorbed
        // ones) retune the rate before this group's delta is judged
        for ev in &last.events {
            if let Some(us_per_qn) = ev.tempo() {
                ms_per_tick = f64::from(us_per_qn) / ticks_per_beat / 1000.0;
            }
        }
        group.delta_ticks = group.ticks - last.ticks;
        group.delta_ms = group.delta_ticks as f64 * ms_per_tick;
        if group.delta_ms < merge_ms {
            sink.notice(Notice::GroupsMerged {
                delta_ticks: group.delta_ticks,
                delta_ms: group.delta_ms,
            });
            // Absorb: events concatenate, the emitted group's own tick and
            // deltas stand for the whole merged span
            last.events.append(&mut group.events);
        } else {
            merged.push(group);
        }
    }
    merged
}
