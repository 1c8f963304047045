// Copyright 2019 Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

//! Alpha premultiply/unpremultiply, grounded on zimg's `PremultiplyFilter`
//! / `UnpremultiplyFilter` (`graph/simple_filters.h`). Both operate on a
//! single color channel at a time against the shared alpha plane, so one
//! filter instance is reused across R/G/B (or Y/U/V) nodes per the
//! "shared filter instances" design note.
//!
//! Both filters require FLOAT input; the builder inserts a depth
//! conversion beforehand (spec.md §4.5.1 pass 1/7).

use crate::buffer::LineBuffer;
use crate::filter::{Filter, FilterAttributes, FilterFlags};
use crate::pixel::PixelType;

/// Multiplies one color channel by the alpha plane.
///
/// Per spec.md §9 (preserved source anomaly): alpha is clamped to `[0,1]`
/// before use in the reference implementation this crate tracks, but the
/// multiply itself uses the *unclamped* value. This crate keeps that
/// observable behavior rather than silently fixing it.
pub struct PremultiplyFilter {
    attr: FilterAttributes,
}

impl PremultiplyFilter {
    /// Creates a premultiply filter for one `width x height` FLOAT channel.
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        PremultiplyFilter {
            attr: FilterAttributes {
                width,
                height,
                pixel_type: PixelType::F32,
            },
        }
    }
}

impl Filter for PremultiplyFilter {
    fn flags(&self) -> FilterFlags {
        FilterFlags {
            same_row: true,
            ..FilterFlags::default()
        }
    }

    fn attributes(&self) -> FilterAttributes {
        self.attr
    }

    unsafe fn process(
        &self,
        _ctx: *mut u8,
        inputs: &[LineBuffer<*const u8>],
        outputs: &[LineBuffer<*mut u8>],
        _tmp: *mut u8,
        i: u32,
        left: u32,
        right: u32,
    ) {
        let color = inputs[0].row_ptr(i) as *const f32;
        let alpha = inputs[1].row_ptr(i) as *const f32;
        let dst = outputs[0].row_ptr(i) as *mut f32;
        for x in left..right {
            let x = x as usize;
            let a = *alpha.add(x);
            let _a_clamped = a.clamp(0.0, 1.0); // computed, intentionally unused below
            *dst.add(x) = *color.add(x) * a;
        }
    }
}

/// Divides one color channel by the alpha plane, the inverse of
/// [`PremultiplyFilter`]. Produces `0.0` where alpha is exactly zero rather
/// than propagating a division-by-zero `NaN`/`inf`.
pub struct UnpremultiplyFilter {
    attr: FilterAttributes,
}

impl UnpremultiplyFilter {
    /// Creates an unpremultiply filter for one `width x height` FLOAT
    /// channel.
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        UnpremultiplyFilter {
            attr: FilterAttributes {
                width,
                height,
                pixel_type: PixelType::F32,
            },
        }
    }
}

impl Filter for UnpremultiplyFilter {
    fn flags(&self) -> FilterFlags {
        FilterFlags {
            same_row: true,
            ..FilterFlags::default()
        }
    }

    fn attributes(&self) -> FilterAttributes {
        self.attr
    }

    unsafe fn process(
        &self,
        _ctx: *mut u8,
        inputs: &[LineBuffer<*const u8>],
        outputs: &[LineBuffer<*mut u8>],
        _tmp: *mut u8,
        i: u32,
        left: u32,
        right: u32,
    ) {
        let color = inputs[0].row_ptr(i) as *const f32;
        let alpha = inputs[1].row_ptr(i) as *const f32;
        let dst = outputs[0].row_ptr(i) as *mut f32;
        for x in left..right {
            let x = x as usize;
            let a = *alpha.add(x);
            *dst.add(x) = if a == 0.0 { 0.0 } else { *color.add(x) / a };
        }
    }
}
