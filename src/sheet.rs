//! sheet.rs
//!
//! This module parses a Standard MIDI File (SMF) into a `Sheet`: one flat,
//! time-sorted event sequence plus per-instrument partitions of the channel
//! events. The low-level byte decoding is delegated to `midly`; this module
//! classifies what `midly` hands back and resolves which "instrument" each
//! channel event addresses.
//!
//! ### Quick primer on instruments
//! - A MIDI channel does not name a sound by itself. The sound is picked by
//!   the most recent bank-select controllers (CC 0 = bank MSB, CC 32 = bank
//!   LSB) plus a program-change message on that channel.
//! - Yamaha XG files can do the same through sysex bulk messages instead of
//!   channel messages.
//! - We synthesize an `Instrument` identity per distinct
//!   (channel, bank MSB, bank LSB, program) tuple and partition note events
//!   by the identity active on their channel when they occur.
//!
//! Bank state is transient per track (each track chunk starts from bank 0/0),
//! but the instrument table and the per-channel active instrument persist
//! across tracks, so the same tuple appearing in two tracks coalesces into
//! one `Instrument`.

use std::collections::HashMap;

use midly::{MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};

use crate::diag::{DiagSink, Log, Notice};
use crate::event::{ChannelKind, EventKind, MetaKind, ResetKind, SheetEvent, SysExKind};

/// Bank-select continuous controller numbers.
const CC_BANK_MSB: u8 = 0;
const CC_BANK_LSB: u8 = 32;

/// Reset signatures, with the leading 0xF0 status already stripped by the
/// decoder. A message matches when it starts with the full signature.
const GM_RESET: &[u8] = &[0x7E, 0x7F, 0x09, 0x01, 0xF7];
const GM2_RESET: &[u8] = &[0x7E, 0x7F, 0x09, 0x03, 0xF7];
const GS_RESET: &[u8] = &[0x41, 0x10, 0x42, 0x12, 0x40, 0x00, 0x7F, 0x00, 0x41, 0xF7];
const XG_RESET: &[u8] = &[0x43, 0x10, 0x4C, 0x00, 0x00, 0x7E, 0x00, 0xF7];

/// PPQ assumed when the header carries SMPTE timing instead of a division.
const FALLBACK_TICKS_PER_BEAT: u16 = 480;

#[derive(thiserror::Error, Debug)]
pub enum SheetError {
    #[error("invalid midi file: {0}")]
    Parse(#[from] midly::Error),
    #[error("writing format-0 output: {0}")]
    Write(#[from] std::io::Error),
}

/// A resolved sound identity: the events of one (channel, bank, program)
/// tuple. `events` holds indices into `Sheet::sequence`, ascending.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Instrument {
    /// Position in `Sheet::instruments`
    pub index: usize,
    pub channel: u8,
    pub bank_msb: u8,
    pub bank_lsb: u8,
    pub program: u8,
    pub events: Vec<usize>,
}

/// The full parsed result of a MIDI file.
///
/// Borrows sysex and meta payloads from the input buffer; keep the bytes
/// alive as long as the sheet.
#[derive(Clone, Debug)]
pub struct Sheet<'a> {
    /// Reset family declared by a sysex signature, first match wins
    pub reset: Option<ResetKind>,
    /// First non-empty track-name meta event
    pub track_name: Option<String>,
    /// Ticks per quarter note from the header
    pub ticks_per_beat: u16,
    /// All events from all tracks, sorted by tick (stable over decode order)
    pub sequence: Vec<SheetEvent<'a>>,
    /// First non-zero tempo in decode order, µs per quarter note; 0 = unset
    pub first_tempo: u32,
    /// First sequencer-specific meta payload
    pub sequencer_specific: Option<Vec<u8>>,
    /// One entry per distinct (channel, bank, program) tuple, creation order
    pub instruments: Vec<Instrument>,
    /// Sequence indices of eligible channel events whose channel never
    /// resolved an instrument
    pub unassigned: Vec<usize>,
}

/// Document-scoped resolution state. Lives for one parse call; the
/// track-transient bank registers live in the track loop instead.
#[derive(Default)]
struct Resolver {
    instruments: Vec<Instrument>,
    by_key: HashMap<(u8, u8, u8, u8), usize>,
    /// Active instrument per channel, persisting across track boundaries
    active: HashMap<u8, usize>,
    /// Eligible events seen on a channel before any instrument resolved
    pending: HashMap<u8, Vec<usize>>,
}

impl Resolver {
    /// Resolve the instrument for `channel` under the given bank/program
    /// tuple, creating it (seeded with the channel's pending buffer) on
    /// first sight, and make it the channel's active instrument.
    fn set_instrument(&mut self, channel: u8, bank_msb: u8, bank_lsb: u8, program: u8) {
        let key = (channel, bank_msb, bank_lsb, program);
        let idx = match self.by_key.get(&key) {
            Some(&idx) => idx,
            None => {
                let idx = self.instruments.len();
                self.instruments.push(Instrument {
                    index: idx,
                    channel,
                    bank_msb,
                    bank_lsb,
                    program,
                    events: self.pending.remove(&channel).unwrap_or_default(),
                });
                self.by_key.insert(key, idx);
                idx
            }
        };
        self.active.insert(channel, idx);
    }

    /// Route an eligible channel event to the channel's active instrument,
    /// or buffer it until one resolves.
    fn route(&mut self, channel: u8, id: usize) {
        match self.active.get(&channel) {
            Some(&idx) => self.instruments[idx].events.push(id),
            None => self.pending.entry(channel).or_default().push(id),
        }
    }
}

impl<'a> Sheet<'a> {
    /// Parse an SMF byte buffer, reporting diagnostics through `tracing`.
    pub fn parse(bytes: &'a [u8]) -> Result<Self, SheetError> {
        Self::parse_with(bytes, &mut Log)
    }

    /// Parse an SMF byte buffer with an explicit diagnostic sink.
    ///
    /// Individual unrecognized events are recorded in the sequence and
    /// reported to `sink`, never fatal. A structurally broken container
    /// (bad header, truncated chunk) fails at the decoder boundary.
    pub fn parse_with(bytes: &'a [u8], sink: &mut dyn DiagSink) -> Result<Self, SheetError> {
        let smf = Smf::parse(bytes)?;

        let ticks_per_beat = match smf.header.timing {
            Timing::Metrical(t) => t.as_int(),
            // SMPTE timing carries no PPQ; assume the common division
            Timing::Timecode(..) => FALLBACK_TICKS_PER_BEAT,
        };

        let mut reset = None;
        let mut track_name = None;
        let mut first_tempo = 0u32;
        let mut sequencer_specific = None;
        let mut sequence: Vec<SheetEvent<'a>> = Vec::new();
        let mut resolver = Resolver::default();

        for (track_idx, track) in smf.tracks.iter().enumerate() {
            // Bank registers restart with every track chunk
            let mut bank_msb = 0u8;
            let mut bank_lsb = 0u8;
            let mut last_ticks = 0u64;

            for raw in track {
                let ticks = last_ticks + u64::from(raw.delta.as_int());
                let id = sequence.len();
                let mut kind;
                let mut set_instrument = false;

                match &raw.kind {
                    TrackEventKind::Meta(meta) => {
                        kind = EventKind::Meta(match meta {
                            MetaMessage::Tempo(t) => {
                                if first_tempo == 0 && t.as_int() != 0 {
                                    first_tempo = t.as_int();
                                }
                                MetaKind::Tempo
                            }
                            MetaMessage::TrackName(name) => {
                                if track_name.is_none() && !name.is_empty() {
                                    track_name =
                                        Some(String::from_utf8_lossy(name).into_owned());
                                }
                                MetaKind::TrackName
                            }
                            MetaMessage::SequencerSpecific(data) => {
                                if sequencer_specific.is_none() && !data.is_empty() {
                                    sequencer_specific = Some(data.to_vec());
                                }
                                MetaKind::SequencerSpecific
                            }
                            MetaMessage::EndOfTrack => MetaKind::EndOfTrack,
                            _ => {
                                sink.notice(Notice::UnprocessedMeta { track: track_idx, ticks });
                                MetaKind::Unprocessed
                            }
                        });
                    }
                    TrackEventKind::SysEx(data) => {
                        if let Some(found) = match_reset(data) {
                            kind = EventKind::SysEx(SysExKind::Reset);
                            if reset.is_none() {
                                reset = Some(found);
                            }
                        } else if is_xg_bulk(data) {
                            let (channel, subop, value) = (data[4], data[5], data[6]);
                            kind = EventKind::SysEx(SysExKind::SetInstrument);
                            set_instrument = true;
                            match subop {
                                1 => bank_msb = value,
                                2 => bank_lsb = value,
                                3 => resolver.set_instrument(channel, bank_msb, bank_lsb, value),
                                _ => {
                                    kind = EventKind::SysEx(SysExKind::Unprocessed);
                                    set_instrument = false;
                                    sink.notice(Notice::UnprocessedXgSubop {
                                        track: track_idx,
                                        ticks,
                                        subop,
                                    });
                                }
                            }
                        } else {
                            kind = EventKind::SysEx(SysExKind::Unprocessed);
                            sink.notice(Notice::UnprocessedSysEx { track: track_idx, ticks });
                        }
                    }
                    TrackEventKind::Escape(_) => {
                        kind = EventKind::SysEx(SysExKind::Divided);
                        sink.notice(Notice::DividedSysEx { track: track_idx, ticks });
                    }
                    TrackEventKind::Midi { channel, message } => {
                        let ch = channel.as_int();
                        kind = EventKind::Channel(match message {
                            MidiMessage::ProgramChange { program } => {
                                resolver.set_instrument(ch, bank_msb, bank_lsb, program.as_int());
                                set_instrument = true;
                                ChannelKind::ProgramChange
                            }
                            MidiMessage::Controller { controller, value } => {
                                match controller.as_int() {
                                    CC_BANK_MSB => {
                                        bank_msb = value.as_int();
                                        // An MSB without a following LSB means bank LSB 0
                                        bank_lsb = 0;
                                        set_instrument = true;
                                    }
                                    CC_BANK_LSB => {
                                        bank_lsb = value.as_int();
                                        set_instrument = true;
                                    }
                                    _ => sink.notice(Notice::UnprocessedChannel {
                                        track: track_idx,
                                        ticks,
                                    }),
                                }
                                ChannelKind::Controller
                            }
                            MidiMessage::NoteOn { .. } => {
                                resolver.route(ch, id);
                                ChannelKind::NoteOn
                            }
                            MidiMessage::NoteOff { .. } => {
                                resolver.route(ch, id);
                                ChannelKind::NoteOff
                            }
                            MidiMessage::Aftertouch { .. } => {
                                resolver.route(ch, id);
                                ChannelKind::NoteAftertouch
                            }
                            MidiMessage::ChannelAftertouch { .. } => {
                                resolver.route(ch, id);
                                ChannelKind::ChannelAftertouch
                            }
                            MidiMessage::PitchBend { .. } => {
                                resolver.route(ch, id);
                                ChannelKind::PitchBend
                            }
                        });
                    }
                }

                sequence.push(SheetEvent {
                    index: id,
                    track: track_idx,
                    instrument: None,
                    kind,
                    set_instrument,
                    ticks,
                    event: raw.kind.clone(),
                });
                last_ticks = ticks;
            }
        }

        // Merge all tracks into one chronological sequence. The sort is
        // stable, so simultaneous events keep decode order.
        sequence.sort_by_key(|e| e.ticks);

        // `index` still holds each event's decode id; use that to remap the
        // resolver's id lists onto sorted positions, then re-number.
        let mut position = vec![0usize; sequence.len()];
        for (i, ev) in sequence.iter().enumerate() {
            position[ev.index] = i;
        }
        for (i, ev) in sequence.iter_mut().enumerate() {
            ev.index = i;
        }

        let mut instruments = resolver.instruments;
        for (inst_idx, inst) in instruments.iter_mut().enumerate() {
            for id in inst.events.iter_mut() {
                *id = position[*id];
            }
            inst.events.sort_unstable();
            for &id in &inst.events {
                sequence[id].instrument = Some(inst_idx);
            }
        }

        let mut unassigned: Vec<usize> = resolver
            .pending
            .into_values()
            .flatten()
            .map(|id| position[id])
            .collect();
        unassigned.sort_unstable();

        Ok(Sheet {
            reset,
            track_name,
            ticks_per_beat,
            sequence,
            first_tempo,
            sequencer_specific,
            instruments,
            unassigned,
        })
    }
}

/// Match a sysex payload against the four reset signatures.
fn match_reset(data: &[u8]) -> Option<ResetKind> {
    if data.starts_with(GM_RESET) {
        Some(ResetKind::Gm)
    } else if data.starts_with(GM2_RESET) {
        Some(ResetKind::Gm2)
    } else if data.starts_with(GS_RESET) {
        Some(ResetKind::Gs)
    } else if data.starts_with(XG_RESET) {
        Some(ResetKind::Xg)
    } else {
        None
    }
}

/// XG bulk bank/program shape: `43 10 4C 08 <channel> <subop> <value> F7`.
/// Bytes 4..=6 are wildcards; byte 7 must terminate the message.
fn is_xg_bulk(data: &[u8]) -> bool {
    data.len() >= 8
        && data[0] == 0x43
        && data[1] == 0x10
        && data[2] == 0x4C
        && data[3] == 0x08
        && data[7] == 0xF7
}
