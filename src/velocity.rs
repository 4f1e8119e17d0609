//! velocity.rs
//!
//! Attack-velocity analytics: how hard a performance is played overall, how
//! wide its dynamics swing, and a lookup table that remaps one performance's
//! intensity onto another's.
//!
//! All three work on note-on velocities only. The trimmed statistics cut
//! configurable fractions off both ends of the sorted data so stray grace
//! notes and single accents do not dominate the result.

use crate::diag::Quiet;
use crate::group::to_groups;
use crate::sheet::Sheet;

/// Options for [`mean_velocity`].
#[derive(Clone, Copy, Debug)]
pub struct MeanVelocityOptions {
    /// Window for folding near-simultaneous notes into one "keystroke"
    pub merge_ms: f64,
    /// Fraction of the softest groups to discard
    pub cut_lightest: f64,
    /// Fraction of the loudest groups to discard
    pub cut_heaviest: f64,
}

impl Default for MeanVelocityOptions {
    fn default() -> Self {
        Self { merge_ms: 2000.0, cut_lightest: 0.3, cut_heaviest: 0.1 }
    }
}

/// Trimmed mean of per-group peak note-on velocities.
///
/// Groups the sheet with a wide merge window so a chord counts once, takes
/// each group's loudest note-on, discards silent groups and the configured
/// fractions of both ends, and averages the rest.
///
/// Returns `f64::NAN` for a sheet with no qualifying groups; callers must
/// treat that as "no answer", not an error.
pub fn mean_velocity(sheet: &Sheet<'_>, options: &MeanVelocityOptions) -> f64 {
    let groups = to_groups(sheet, options.merge_ms, &mut Quiet);
    let total = groups.len();

    let mut peaks: Vec<u8> = groups
        .iter()
        .map(|g| g.events.iter().filter_map(|e| e.note_on_velocity()).max().unwrap_or(0))
        .filter(|&v| v > 0)
        .collect();
    peaks.sort_unstable();

    // Cut sizes come from the group count before silent groups drop out,
    // matching the established trimming behavior
    let cut_lo = (total as f64 * options.cut_lightest).round() as usize;
    let cut_hi = (total as f64 * options.cut_heaviest).round() as usize;
    let end = total.saturating_sub(cut_hi).min(peaks.len());
    let start = cut_lo.min(end);
    let kept = &peaks[start..end];

    if kept.is_empty() {
        return f64::NAN;
    }
    let sum: u32 = kept.iter().map(|&v| u32::from(v)).sum();
    (f64::from(sum) / kept.len() as f64).round()
}

/// Histogram of positive note-on velocities across the whole sequence.
pub fn velocity_counts(sheet: &Sheet<'_>) -> [u32; 128] {
    let mut counts = [0u32; 128];
    for ev in &sheet.sequence {
        if let Some(vel) = ev.note_on_velocity() {
            if vel > 0 {
                counts[usize::from(vel)] += 1;
            }
        }
    }
    counts
}

/// Options for [`dynamic_range`].
#[derive(Clone, Copy, Debug)]
pub struct DynamicRangeOptions {
    pub cut_lightest: f64,
    pub cut_heaviest: f64,
}

impl Default for DynamicRangeOptions {
    fn default() -> Self {
        Self { cut_lightest: 0.01, cut_heaviest: 0.01 }
    }
}

/// Softest and loudest note-on velocity after trimming.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VelocityRange {
    pub min: u8,
    pub max: u8,
}

/// Trimmed dynamic range over all positive note-on velocities.
///
/// `None` when the sheet has no positive note-ons (or trimming ate them
/// all); a degenerate outcome, not an error.
pub fn dynamic_range(sheet: &Sheet<'_>, options: &DynamicRangeOptions) -> Option<VelocityRange> {
    let counts = velocity_counts(sheet);
    let mut velocities: Vec<u8> = Vec::new();
    for (vel, &count) in counts.iter().enumerate() {
        for _ in 0..count {
            velocities.push(vel as u8);
        }
    }

    let len = velocities.len();
    let cut_lo = (len as f64 * options.cut_lightest).round() as usize;
    let cut_hi = (len as f64 * options.cut_heaviest).round() as usize;
    let end = len.saturating_sub(cut_hi);
    let start = cut_lo.min(end);
    let kept = &velocities[start..end];

    Some(VelocityRange { min: *kept.first()?, max: *kept.last()? })
}

/// Target dynamics for [`remap_table`] / [`velocity_map`].
#[derive(Clone, Copy, Debug)]
pub struct VelocityMapOptions {
    /// Velocity the source mean should land on
    pub main_velocity: u8,
    /// Velocity the source dynamic minimum should land on
    pub dynamic_min: u8,
    /// Velocity the source dynamic maximum should land on
    pub dynamic_max: u8,
}

impl Default for VelocityMapOptions {
    fn default() -> Self {
        Self { main_velocity: 64, dynamic_min: 22, dynamic_max: 88 }
    }
}

/// Piecewise-linear velocity remap table.
///
/// 129 entries; index 0 is always 0 and index 128 pads the table for
/// callers indexing with raw bytes — the defined domain is 1..=127.
/// Indices below the source mean interpolate between
/// `(mean, target mean)` and `(dynamic min, target min)`; indices above it
/// between `(mean, target mean)` and `(dynamic max, target max)`; the mean
/// itself maps exactly. Outputs clamp to 1..=127.
pub fn remap_table(
    src_mean: u8,
    src_range: &VelocityRange,
    options: &VelocityMapOptions,
) -> [u8; 129] {
    let mut table = [0u8; 129];
    let mean = i32::from(src_mean);
    for i in 1..=128 {
        // Differences are oriented away from the mean on each side, so the
        // unit slope substituted for a flat segment keeps its direction:
        // below the mean it descends toward the floor, above it ascends.
        table[i as usize] = if i < mean {
            interpolate(
                mean - i32::from(src_range.min),
                i32::from(options.main_velocity) - i32::from(options.dynamic_min),
                options.main_velocity,
                i - mean,
            )
        } else if i > mean {
            interpolate(
                i32::from(src_range.max) - mean,
                i32::from(options.dynamic_max) - i32::from(options.main_velocity),
                options.main_velocity,
                i - mean,
            )
        } else {
            options.main_velocity
        };
    }
    table
}

/// Remap table for this sheet's own mean and range (computed with default
/// trimming). `None` when the sheet has no qualifying note-ons.
pub fn velocity_map(sheet: &Sheet<'_>, options: &VelocityMapOptions) -> Option<[u8; 129]> {
    let mean = mean_velocity(sheet, &MeanVelocityOptions::default());
    if !mean.is_finite() {
        return None;
    }
    let range = dynamic_range(sheet, &DynamicRangeOptions::default())?;
    Some(remap_table(mean as u8, &range, options))
}

/// Projects `offset` (signed distance from the source mean) through the
/// line anchored at `target_main`, clamped to the MIDI velocity range.
/// A zero difference on either axis substitutes 1 instead of dividing by
/// zero; callers orient both differences so the substitute keeps the
/// slope's sign.
fn interpolate(src_diff: i32, target_diff: i32, target_main: u8, offset: i32) -> u8 {
    let src_diff = match src_diff {
        0 => 1,
        d => d,
    };
    let target_diff = match target_diff {
        0 => 1,
        d => d,
    };
    let out = f64::from(target_main) + f64::from(offset * target_diff) / f64::from(src_diff);
    out.round().clamp(1.0, 127.0) as u8
}
