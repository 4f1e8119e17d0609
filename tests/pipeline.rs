//! End-to-end pipeline checks over synthetic files: parse, partition,
//! group, re-serialize, and parse the re-serialization again.

use std::io::Write;

use midly::num::{u4, u7, u15, u24, u28};
use midly::{Format, Header, MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind};

use midisheet::{EventKind, Format0Options, MetaKind, Quiet, ResetKind, Sheet, to_format0, to_groups};

fn ev(delta: u32, kind: TrackEventKind<'static>) -> TrackEvent<'static> {
    TrackEvent { delta: u28::from(delta), kind }
}

fn note_on(channel: u8, key: u8, vel: u8) -> TrackEventKind<'static> {
    TrackEventKind::Midi {
        channel: u4::from(channel),
        message: MidiMessage::NoteOn { key: u7::from(key), vel: u7::from(vel) },
    }
}

fn note_off(channel: u8, key: u8) -> TrackEventKind<'static> {
    TrackEventKind::Midi {
        channel: u4::from(channel),
        message: MidiMessage::NoteOff { key: u7::from(key), vel: u7::from(0) },
    }
}

fn program(channel: u8, program: u8) -> TrackEventKind<'static> {
    TrackEventKind::Midi {
        channel: u4::from(channel),
        message: MidiMessage::ProgramChange { program: u7::from(program) },
    }
}

fn smf_bytes(tracks: Vec<Vec<TrackEvent<'static>>>) -> Vec<u8> {
    let smf = Smf {
        header: Header {
            format: Format::Parallel,
            timing: Timing::Metrical(u15::from(480u16)),
        },
        tracks,
    };
    let mut out = Vec::new();
    smf.write_std(&mut out).unwrap();
    out
}

fn song_bytes() -> Vec<u8> {
    let eot = TrackEventKind::Meta(MetaMessage::EndOfTrack);
    smf_bytes(vec![
        vec![
            ev(0, TrackEventKind::Meta(MetaMessage::TrackName(b"pipeline song"))),
            ev(0, TrackEventKind::Meta(MetaMessage::Tempo(u24::from(500_000)))),
            ev(0, TrackEventKind::SysEx(&[0x41, 0x10, 0x42, 0x12, 0x40, 0x00, 0x7F, 0x00, 0x41, 0xF7])),
            ev(0, program(0, 5)),
            ev(0, note_on(0, 60, 80)),
            ev(240, note_off(0, 60)),
            ev(240, note_on(0, 64, 95)),
            ev(240, note_off(0, 64)),
            ev(0, eot.clone()),
        ],
        vec![
            ev(0, program(1, 33)),
            ev(120, note_on(1, 40, 60)),
            ev(600, note_off(1, 40)),
            ev(0, eot.clone()),
        ],
        vec![
            // Same tuple as track 0: must coalesce into the same instrument
            ev(0, program(0, 5)),
            ev(480, note_on(0, 67, 70)),
            ev(240, note_off(0, 67)),
            ev(0, eot),
        ],
    ])
}

fn is_routable(kind: EventKind) -> bool {
    use midisheet::ChannelKind::*;
    matches!(
        kind,
        EventKind::Channel(NoteOn | NoteOff | NoteAftertouch | ChannelAftertouch | PitchBend)
    )
}

#[test]
fn parse_holds_the_model_invariants() {
    let bytes = song_bytes();
    let sheet = Sheet::parse_with(&bytes, &mut Quiet).unwrap();

    assert_eq!(sheet.track_name.as_deref(), Some("pipeline song"));
    assert_eq!(sheet.reset, Some(ResetKind::Gs));
    assert_eq!(sheet.first_tempo, 500_000);

    // Non-decreasing ticks, index equals position
    assert!(sheet.sequence.windows(2).all(|w| w[0].ticks <= w[1].ticks));
    for (i, ev) in sheet.sequence.iter().enumerate() {
        assert_eq!(ev.index, i);
    }
    for (i, inst) in sheet.instruments.iter().enumerate() {
        assert_eq!(inst.index, i);
    }

    // Tracks 0 and 2 coalesce; track 1 is its own instrument
    assert_eq!(sheet.instruments.len(), 2);

    // Every routable channel event lands in exactly one partition
    let mut routed: Vec<usize> = sheet
        .instruments
        .iter()
        .flat_map(|inst| inst.events.iter().copied())
        .chain(sheet.unassigned.iter().copied())
        .collect();
    routed.sort_unstable();
    let expected: Vec<usize> = sheet
        .sequence
        .iter()
        .filter(|e| is_routable(e.kind))
        .map(|e| e.index)
        .collect();
    assert_eq!(routed, expected);
}

#[test]
fn format0_output_reparses_and_refilters_to_itself() {
    let bytes = song_bytes();
    let sheet = Sheet::parse_with(&bytes, &mut Quiet).unwrap();
    let options = Format0Options::default();
    let first = to_format0(&sheet, &options).unwrap();

    // Push the bytes through the filesystem like a real consumer would
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&first).unwrap();
    file.flush().unwrap();
    let reread = std::fs::read(file.path()).unwrap();

    let rt = Sheet::parse_with(&reread, &mut Quiet).unwrap();
    assert_eq!(rt.ticks_per_beat, sheet.ticks_per_beat);

    // Exactly one end of track, and nothing the filter would remove
    let eots = rt
        .sequence
        .iter()
        .filter(|e| e.kind == EventKind::Meta(MetaKind::EndOfTrack))
        .count();
    assert_eq!(eots, 1);
    assert!(!rt.sequence.iter().any(|e| e.set_instrument));

    // Filtering is idempotent: a second pass changes nothing
    let second = to_format0(&rt, &options).unwrap();
    assert_eq!(first, second);
}

#[test]
fn grouping_agrees_between_original_and_format0_copy() {
    let bytes = song_bytes();
    let sheet = Sheet::parse_with(&bytes, &mut Quiet).unwrap();
    let copy_bytes = to_format0(&sheet, &Format0Options::default()).unwrap();
    let copy = Sheet::parse_with(&copy_bytes, &mut Quiet).unwrap();

    let original = to_groups(&sheet, 4.0, &mut Quiet);
    let rewritten = to_groups(&copy, 4.0, &mut Quiet);

    // The copy drops markers and unplayable meta but keeps every sounding
    // tick, so the group timeline relative to the first note is unchanged
    let original_note_ticks: Vec<u64> = original
        .iter()
        .filter(|g| g.events.iter().any(|e| e.note_on_velocity().is_some()))
        .map(|g| g.ticks)
        .collect();
    let rewritten_note_ticks: Vec<u64> = rewritten
        .iter()
        .filter(|g| g.events.iter().any(|e| e.note_on_velocity().is_some()))
        .map(|g| g.ticks)
        .collect();
    assert_eq!(original_note_ticks, rewritten_note_ticks);
}
