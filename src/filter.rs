// Copyright 2019 Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

//! The abstract per-plane filter contract (spec.md §4.3). The planner and
//! the graph engine cooperate exclusively through this trait; neither
//! branches on a filter's concrete identity.

use crate::buffer::LineBuffer;
use crate::pixel::PixelType;

/// Sentinel returned by [`Filter::max_buffering`] and [`Filter::step`]
/// meaning "the entire plane", used by `entire_plane` filters such as
/// error-diffusion dither.
pub const BUFFER_MAX: u32 = u32::MAX;

/// Half-open row or column range `[first, last)`.
pub type Range = (u32, u32);

/// Capability flags a filter declares once and the engine consults at
/// graph-completion time and during simulation.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct FilterFlags {
    /// Filter retains per-frame state; must be invoked on strictly
    /// ascending rows, stride equal to [`Filter::step`].
    pub has_state: bool,
    /// Output row `i` depends only on input row `i`.
    pub same_row: bool,
    /// Output may alias the input buffer.
    pub in_place: bool,
    /// Filter requires the full image width on every call.
    pub entire_row: bool,
    /// Filter requires the entire plane as a single batch.
    pub entire_plane: bool,
    /// One invocation reads/writes three planes simultaneously (a joint
    /// colorspace-matrix style operation).
    pub color: bool,
}

/// Size and type of one output row, or of the three jointly-produced rows
/// for a `color` filter.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FilterAttributes {
    /// Output width in pixels.
    pub width: u32,
    /// Output height in pixels.
    pub height: u32,
    /// Output pixel type.
    pub pixel_type: PixelType,
}

/// The per-plane streaming filter contract every node wraps.
///
/// Implementations are usually one of the concrete filters in
/// [`crate::filters`] or [`crate::kernel`]; the planner and engine only
/// ever see `&dyn Filter`.
pub trait Filter {
    /// Capability flags, queried once at graph-completion time.
    fn flags(&self) -> FilterFlags;

    /// Size/type of this filter's output.
    fn attributes(&self) -> FilterAttributes;

    /// Half-open range of input rows consumed to produce output row `i`
    /// (or the simultaneous group starting at `i`, if `step() > 1`).
    fn row_deps(&self, i: u32) -> Range {
        (i, i + 1)
    }

    /// Half-open range of input columns consumed to produce output columns
    /// `[left, right)`.
    fn col_deps(&self, left: u32, right: u32) -> Range {
        (left, right)
    }

    /// Output rows produced per `process` call when stepping through the
    /// whole plane. Usually 1; [`BUFFER_MAX`] for `entire_plane` filters.
    fn step(&self) -> u32 {
        1
    }

    /// Maximum value of `row_deps(i).1 - row_deps(i).0` over all `i`; may
    /// be [`BUFFER_MAX`] meaning "entire plane".
    fn max_buffering(&self) -> u32 {
        1
    }

    /// Size in bytes of this filter's per-frame context.
    fn context_size(&self) -> usize {
        0
    }

    /// Size in bytes of the scratch buffer needed to process columns
    /// `[left, right)`.
    fn tmp_size(&self, _left: u32, _right: u32) -> usize {
        0
    }

    /// Zero-initializes or seeds per-frame state at `ctx`.
    ///
    /// # Safety
    /// `ctx` must point to at least `context_size()` writable, properly
    /// aligned bytes.
    unsafe fn init_context(&self, _ctx: *mut u8) {}

    /// Produces `step()` output rows starting at `i`, covering columns
    /// `[left, right)`, consuming only the rows in `row_deps(i)` and the
    /// columns in `col_deps(left, right)` of `inputs`.
    ///
    /// # Safety
    /// `ctx` must be valid per `context_size()`/`init_context`, `tmp` valid
    /// per `tmp_size(left, right)`, and every `LineBuffer` in `inputs`
    /// and `outputs` must be valid for the rows/columns this call reads or
    /// writes.
    unsafe fn process(
        &self,
        ctx: *mut u8,
        inputs: &[LineBuffer<*const u8>],
        outputs: &[LineBuffer<*mut u8>],
        tmp: *mut u8,
        i: u32,
        left: u32,
        right: u32,
    );
}

/// Checks the consistency constraints of spec.md §4.3 at graph-completion
/// time. Returns `Err` describing the violated constraint.
pub(crate) fn check_flag_consistency(flags: FilterFlags) -> Result<(), &'static str> {
    if flags.entire_plane && !flags.entire_row {
        return Err("entire_plane implies entire_row");
    }
    if flags.in_place && !flags.same_row {
        return Err("in_place implies same_row");
    }
    Ok(())
}

/// Checks the `entire_plane => max_buffering == BUFFER_MAX && step ==
/// BUFFER_MAX` constraint, which needs the filter instance (not just its
/// flags).
pub(crate) fn check_entire_plane_buffering(
    flags: FilterFlags,
    max_buffering: u32,
    step: u32,
) -> Result<(), &'static str> {
    if flags.entire_plane && (max_buffering != BUFFER_MAX || step != BUFFER_MAX) {
        return Err("entire_plane filters must report BUFFER_MAX buffering and step");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entire_plane_requires_entire_row() {
        let mut f = FilterFlags::default();
        f.entire_plane = true;
        assert!(check_flag_consistency(f).is_err());
        f.entire_row = true;
        assert!(check_flag_consistency(f).is_ok());
    }

    #[test]
    fn in_place_requires_same_row() {
        let mut f = FilterFlags::default();
        f.in_place = true;
        assert!(check_flag_consistency(f).is_err());
        f.same_row = true;
        assert!(check_flag_consistency(f).is_ok());
    }

    #[test]
    fn entire_plane_requires_buffer_max() {
        let mut f = FilterFlags::default();
        f.entire_plane = true;
        f.entire_row = true;
        assert!(check_entire_plane_buffering(f, 10, BUFFER_MAX).is_err());
        assert!(check_entire_plane_buffering(f, BUFFER_MAX, BUFFER_MAX).is_ok());
    }
}
