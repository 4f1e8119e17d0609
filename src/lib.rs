//! Parse Standard MIDI Files into a normalized, queryable performance model.
//!
//! The pipeline is strictly downstream:
//!
//! 1. [`Sheet::parse`] wraps the low-level `midly` decoder, classifies every
//!    event, and partitions channel events by resolved instrument.
//! 2. [`to_groups`] buckets the flat sequence into tick groups with
//!    millisecond timing.
//! 3. [`to_format0`] re-serializes the playable subset as a single-track
//!    SMF byte buffer.
//! 4. [`velocity`] computes trimmed attack/dynamics statistics and remap
//!    tables from the model.
//!
//! The whole core is synchronous and side-effect-free apart from the
//! injectable [`diag::DiagSink`] diagnostics.

pub mod diag;
pub mod event;
pub mod format0;
pub mod group;
pub mod sheet;
pub mod velocity;

pub use diag::{Collect, DiagSink, Log, Notice, Quiet};
pub use event::{ChannelKind, EventKind, MetaKind, ResetKind, SheetEvent, SysExKind};
pub use format0::{Format0Options, to_format0};
pub use group::{DEFAULT_MERGE_MS, TimeGroup, to_groups};
pub use sheet::{Instrument, Sheet, SheetError};
