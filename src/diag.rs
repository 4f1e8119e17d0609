//! Diagnostic notices for events the parser records but does not act on.
//!
//! The core never fails on an unrecognized event; it pushes a `Notice` to an
//! injectable sink instead. Sinks observe, they never steer: no output of the
//! parser or the grouping engine depends on what a sink does.

use std::fmt;

/// Something the core saw and deliberately left alone.
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    /// A meta event with no document-level meaning (time signature, lyrics, ...).
    UnprocessedMeta { track: usize, ticks: u64 },
    /// A controller that is neither bank-select MSB nor LSB.
    UnprocessedChannel { track: usize, ticks: u64 },
    /// A sysex payload that matched no known signature.
    UnprocessedSysEx { track: usize, ticks: u64 },
    /// An XG bulk-set message with a subop outside 1..=3.
    UnprocessedXgSubop { track: usize, ticks: u64, subop: u8 },
    /// A continuation (escape) sysex packet, recorded but never reassembled.
    DividedSysEx { track: usize, ticks: u64 },
    /// A merge window below the minimum, treated as "no merging".
    MergeDisabled { merge_ms: f64 },
    /// Two tick groups folded into one.
    GroupsMerged { delta_ticks: u64, delta_ms: f64 },
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::UnprocessedMeta { track, ticks } => {
                write!(f, "meta event at track {track} tick {ticks} not processed")
            }
            Notice::UnprocessedChannel { track, ticks } => {
                write!(f, "channel event at track {track} tick {ticks} not processed")
            }
            Notice::UnprocessedSysEx { track, ticks } => {
                write!(f, "sysex event at track {track} tick {ticks} not processed")
            }
            Notice::UnprocessedXgSubop { track, ticks, subop } => {
                write!(f, "xg bulk subop {subop:#04x} at track {track} tick {ticks} not processed")
            }
            Notice::DividedSysEx { track, ticks } => {
                write!(f, "divided sysex at track {track} tick {ticks} kept as-is")
            }
            Notice::MergeDisabled { merge_ms } => {
                write!(f, "merge window {merge_ms} ms is below minimum, nothing will merge")
            }
            Notice::GroupsMerged { delta_ticks, delta_ms } => {
                write!(f, "merged groups {delta_ticks} ticks ({delta_ms:.3} ms) apart")
            }
        }
    }
}

/// Receiver for parser and grouping diagnostics.
pub trait DiagSink {
    fn notice(&mut self, notice: Notice);
}

/// Forwards notices to `tracing` at debug level. The default sink.
pub struct Log;

impl DiagSink for Log {
    fn notice(&mut self, notice: Notice) {
        tracing::debug!(target: "midisheet", "{notice}");
    }
}

/// Discards every notice.
pub struct Quiet;

impl DiagSink for Quiet {
    fn notice(&mut self, _notice: Notice) {}
}

/// Buffers notices in memory so callers can inspect them afterwards.
#[derive(Default)]
pub struct Collect(pub Vec<Notice>);

impl DiagSink for Collect {
    fn notice(&mut self, notice: Notice) {
        self.0.push(notice);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collect_buffers_in_order() {
        let mut sink = Collect::default();
        sink.notice(Notice::MergeDisabled { merge_ms: 1.0 });
        sink.notice(Notice::GroupsMerged { delta_ticks: 2, delta_ms: 2.08 });
        assert_eq!(sink.0.len(), 2);
        assert_eq!(sink.0[0], Notice::MergeDisabled { merge_ms: 1.0 });
    }
}
