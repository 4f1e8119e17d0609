//! event.rs
//!
//! Classified form of a decoded SMF track event.
//!
//! The low-level decoder (`midly`) hands us a closed set of event kinds; we
//! tag each one with a semantic category so downstream passes (grouping,
//! format-0 filtering, velocity analytics) can match on what an event *means*
//! without re-inspecting its payload. Categories the model does not act on
//! carry an explicit `Unprocessed` tag rather than being dropped: the flat
//! sequence always contains every decoded event.

use midly::TrackEventKind;

/// The sysex reset family a file declares, if any.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResetKind {
    Gm,
    Gs,
    Xg,
    Gm2,
}

/// Meta events the model reads. Everything else is `Unprocessed`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MetaKind {
    /// Tempo in microseconds per quarter note
    Tempo,
    /// Sequence/track name text
    TrackName,
    /// Sequencer-specific binary payload
    SequencerSpecific,
    /// Track terminator; the format-0 writer keeps exactly one
    EndOfTrack,
    /// Recorded but not interpreted (time signature, lyrics, markers, ...)
    Unprocessed,
}

/// Channel voice messages. `midly` decodes a closed set, so there is no
/// unknown variant here; only bank-select controllers get special handling.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelKind {
    NoteOn,
    NoteOff,
    NoteAftertouch,
    ChannelAftertouch,
    PitchBend,
    ProgramChange,
    Controller,
}

/// System-exclusive messages, split by the signature they matched.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SysExKind {
    /// One of the GM/GM2/GS/XG reset signatures
    Reset,
    /// XG bulk bank/program set (subop 1..=3)
    SetInstrument,
    /// Continuation packet (0xF7 escape); kept opaque, never reassembled
    Divided,
    /// No signature matched
    Unprocessed,
}

/// Semantic category of one decoded event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventKind {
    Meta(MetaKind),
    Channel(ChannelKind),
    SysEx(SysExKind),
}

/// One event of the flat chronological sequence.
///
/// Borrows its payload from the input byte buffer, like `midly::Smf` itself.
#[derive(Clone, Debug)]
pub struct SheetEvent<'a> {
    /// Position in `Sheet::sequence`, assigned after the stable time sort
    pub index: usize,
    /// Zero-based source track
    pub track: usize,
    /// Owning instrument partition, if the event was routed to one
    pub instrument: Option<usize>,
    /// Semantic category
    pub kind: EventKind,
    /// True for program changes, bank-select controllers, and XG bulk
    /// subops: events whose only job is to pick a sound
    pub set_instrument: bool,
    /// Absolute tick position within the file
    pub ticks: u64,
    /// The decoded payload, untouched
    pub event: TrackEventKind<'a>,
}

impl<'a> SheetEvent<'a> {
    /// Velocity of a note-on event, `None` for anything else.
    pub fn note_on_velocity(&self) -> Option<u8> {
        if self.kind != EventKind::Channel(ChannelKind::NoteOn) {
            return None;
        }
        match self.event {
            TrackEventKind::Midi {
                message: midly::MidiMessage::NoteOn { vel, .. },
                ..
            } => Some(vel.as_int()),
            _ => None,
        }
    }

    /// Tempo payload (µs per quarter note) of a set-tempo meta event.
    pub fn tempo(&self) -> Option<u32> {
        match self.event {
            TrackEventKind::Meta(midly::MetaMessage::Tempo(t)) => Some(t.as_int()),
            _ => None,
        }
    }
}
