//! format0.rs
//!
//! Re-serializes a parsed sheet as a single-track (format 0) SMF.
//!
//! The filter keeps the playable subset: tempo changes, channel voice
//! messages, and sysex data. Instrument-assignment markers (program changes,
//! bank selects, XG bulk sets) are kept only on request, so a consumer that
//! assigns its own sounds gets a stream without them. All end-of-track
//! events collapse into the latest-ticked one, appended last. Delta times
//! are rebuilt over the filtered order, which closes the gaps the dropped
//! events leave behind.

use midly::num::{u15, u28};
use midly::{Format, Header, MetaMessage, Smf, Timing, TrackEvent, TrackEventKind};

use crate::event::{EventKind, MetaKind, SheetEvent};
use crate::sheet::{Sheet, SheetError};

#[derive(Clone, Copy, Debug, Default)]
pub struct Format0Options {
    /// Keep program-change / bank-select / XG bulk marker events
    pub instrument_markers: bool,
}

/// Serialize the playable subset of `sheet` into format-0 SMF bytes.
pub fn to_format0(sheet: &Sheet<'_>, options: &Format0Options) -> Result<Vec<u8>, SheetError> {
    let mut end_of_track: Option<&SheetEvent<'_>> = None;
    let mut filtered: Vec<&SheetEvent<'_>> = Vec::new();

    for ev in &sheet.sequence {
        if ev.set_instrument {
            if options.instrument_markers {
                filtered.push(ev);
            }
            continue;
        }
        match ev.kind {
            EventKind::Meta(MetaKind::EndOfTrack) => {
                if end_of_track.is_none_or(|eot| ev.ticks > eot.ticks) {
                    end_of_track = Some(ev);
                }
            }
            EventKind::Meta(MetaKind::Tempo) => filtered.push(ev),
            EventKind::Meta(_) => {}
            EventKind::Channel(_) | EventKind::SysEx(_) => filtered.push(ev),
        }
    }

    // Exactly one terminator, last, at the latest end-of-track tick seen.
    // A sheet without one (possible after decoder recovery) gets a fresh
    // terminator at the last filtered tick.
    let eot_kind = TrackEventKind::Meta(MetaMessage::EndOfTrack);
    let (eot_ticks, eot_kind) = match end_of_track {
        Some(ev) => (ev.ticks, ev.event.clone()),
        None => (filtered.last().map_or(0, |ev| ev.ticks), eot_kind),
    };

    let mut track: Vec<TrackEvent<'_>> = Vec::with_capacity(filtered.len() + 1);
    let mut prev_ticks = filtered.first().map_or(eot_ticks, |ev| ev.ticks);
    for ev in &filtered {
        track.push(TrackEvent {
            delta: delta_ticks(prev_ticks, ev.ticks),
            kind: ev.event.clone(),
        });
        prev_ticks = ev.ticks;
    }
    track.push(TrackEvent { delta: delta_ticks(prev_ticks, eot_ticks), kind: eot_kind });

    let smf = Smf {
        header: Header {
            format: Format::SingleTrack,
            timing: Timing::Metrical(u15::from(sheet.ticks_per_beat)),
        },
        tracks: vec![track],
    };
    let mut out = Vec::new();
    smf.write_std(&mut out)?;
    Ok(out)
}

/// Delta between consecutive filtered events. Saturates: the appended
/// end-of-track can sit earlier than the last voice event.
fn delta_ticks(prev: u64, next: u64) -> u28 {
    let delta = next.saturating_sub(prev);
    u28::from(delta.min(0x0FFF_FFFF) as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diag::Quiet;
    use crate::event::ChannelKind;
    use crate::sheet::tests::{end_of_track, ev, note_off, note_on, program, smf_bytes, tempo};

    fn multitrack_bytes() -> Vec<u8> {
        smf_bytes(vec![
            vec![
                ev(0, tempo(500_000)),
                ev(0, TrackEventKind::Meta(MetaMessage::TimeSignature(4, 2, 24, 8))),
                ev(0, program(0, 5)),
                ev(10, note_on(0, 60, 90)),
                ev(20, note_off(0, 60)),
                end_of_track(),
            ],
            vec![
                ev(5, note_on(1, 64, 70)),
                ev(40, note_off(1, 64)),
                end_of_track(),
            ],
        ])
    }

    #[test]
    fn drops_markers_and_unplayable_meta_by_default() {
        let bytes = multitrack_bytes();
        let sheet = Sheet::parse_with(&bytes, &mut Quiet).unwrap();
        let out = to_format0(&sheet, &Format0Options::default()).unwrap();

        let rt = Sheet::parse_with(&out, &mut Quiet).unwrap();
        assert!(!rt.sequence.iter().any(|e| e.set_instrument));
        assert!(!rt.sequence.iter().any(|e| {
            matches!(e.kind, EventKind::Meta(MetaKind::Unprocessed))
        }));
        // tempo + 4 notes + 1 end of track
        assert_eq!(rt.sequence.len(), 6);
        let eots = rt
            .sequence
            .iter()
            .filter(|e| e.kind == EventKind::Meta(MetaKind::EndOfTrack))
            .count();
        assert_eq!(eots, 1);
    }

    #[test]
    fn keeps_markers_on_request() {
        let bytes = multitrack_bytes();
        let sheet = Sheet::parse_with(&bytes, &mut Quiet).unwrap();
        let out = to_format0(&sheet, &Format0Options { instrument_markers: true }).unwrap();

        let rt = Sheet::parse_with(&out, &mut Quiet).unwrap();
        assert!(rt.sequence.iter().any(|e| {
            e.kind == EventKind::Channel(ChannelKind::ProgramChange)
        }));
    }

    #[test]
    fn header_declares_single_track() {
        let bytes = multitrack_bytes();
        let sheet = Sheet::parse_with(&bytes, &mut Quiet).unwrap();
        let out = to_format0(&sheet, &Format0Options::default()).unwrap();

        let smf = Smf::parse(&out).unwrap();
        assert_eq!(smf.header.format, Format::SingleTrack);
        assert_eq!(smf.tracks.len(), 1);
        assert_eq!(smf.header.timing, Timing::Metrical(u15::from(480u16)));
    }

    #[test]
    fn deltas_collapse_over_dropped_events() {
        // The first kept event starts at delta 0 no matter its absolute
        // tick; later deltas span the original tick distances.
        let bytes = smf_bytes(vec![vec![
            ev(7, note_on(0, 60, 64)),
            ev(10, note_on(0, 62, 64)),
            end_of_track(),
        ]]);
        let sheet = Sheet::parse_with(&bytes, &mut Quiet).unwrap();
        let out = to_format0(&sheet, &Format0Options::default()).unwrap();

        let smf = Smf::parse(&out).unwrap();
        let deltas: Vec<u32> = smf.tracks[0].iter().map(|e| e.delta.as_int()).collect();
        assert_eq!(deltas, vec![0, 10, 0]);
    }

    #[test]
    fn refiltering_is_byte_stable() {
        let bytes = multitrack_bytes();
        let sheet = Sheet::parse_with(&bytes, &mut Quiet).unwrap();
        let first = to_format0(&sheet, &Format0Options::default()).unwrap();

        let rt = Sheet::parse_with(&first, &mut Quiet).unwrap();
        let second = to_format0(&rt, &Format0Options::default()).unwrap();
        assert_eq!(first, second);
    }
}
