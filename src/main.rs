use anyhow::{Context, Result};
use clap::Parser;
use std::{fs, path::PathBuf};
use tracing_subscriber::EnvFilter;

use midisheet::velocity::{
    DynamicRangeOptions, MeanVelocityOptions, dynamic_range, mean_velocity,
};
use midisheet::{DEFAULT_MERGE_MS, Format0Options, Log, Sheet, to_format0, to_groups};

#[derive(Parser, Debug)]
struct Opt {
    /// Path to a Standard MIDI File
    midi: PathBuf,
    /// Write a single-track (format 0) copy here
    #[arg(long)]
    format0: Option<PathBuf>,
    /// Keep program/bank instrument markers in the format-0 output
    #[arg(long)]
    keep_markers: bool,
    /// Group merge window in milliseconds (below 4 disables merging)
    #[arg(long, default_value_t = DEFAULT_MERGE_MS)]
    merge_ms: f64,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let opt = Opt::parse();

    let bytes = fs::read(&opt.midi).with_context(|| format!("reading {:?}", opt.midi))?;
    let sheet = Sheet::parse(&bytes).with_context(|| format!("parsing {:?}", opt.midi))?;

    if let Some(name) = &sheet.track_name {
        println!("Track name: {}", name);
    }
    println!("PPQ: {}", sheet.ticks_per_beat);
    if let Some(reset) = sheet.reset {
        println!("Reset: {:?}", reset);
    }
    if sheet.first_tempo > 0 {
        println!(
            "First tempo: {} µs/qn (~{:.1} BPM)",
            sheet.first_tempo,
            60_000_000.0 / f64::from(sheet.first_tempo)
        );
    } else {
        println!("First tempo: none");
    }
    println!("Total events parsed: {}", sheet.sequence.len());

    println!("\nInstruments:");
    for inst in &sheet.instruments {
        println!(
            "  #{} ch {:2} bank {:3}/{:3} program {:3}  ({} events)",
            inst.index,
            inst.channel,
            inst.bank_msb,
            inst.bank_lsb,
            inst.program,
            inst.events.len()
        );
    }
    if !sheet.unassigned.is_empty() {
        println!("  {} channel events never resolved an instrument", sheet.unassigned.len());
    }

    let groups = to_groups(&sheet, opt.merge_ms, &mut Log);
    println!("\nGroups at {} ms window: {}", opt.merge_ms, groups.len());

    let mean = mean_velocity(&sheet, &MeanVelocityOptions::default());
    if mean.is_finite() {
        println!("Mean attack velocity: {}", mean);
    } else {
        println!("Mean attack velocity: n/a (no qualifying notes)");
    }
    match dynamic_range(&sheet, &DynamicRangeOptions::default()) {
        Some(range) => println!("Dynamic range: {}..={}", range.min, range.max),
        None => println!("Dynamic range: n/a"),
    }

    if let Some(path) = &opt.format0 {
        let options = Format0Options { instrument_markers: opt.keep_markers };
        let out = to_format0(&sheet, &options)?;
        fs::write(path, &out).with_context(|| format!("writing {:?}", path))?;
        println!("\nWrote format-0 copy to {:?} ({} bytes)", path, out.len());
    }

    Ok(())
}
