// Copyright 2019 Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

//! Separable resampling kernel, grounded on
//! `original_source/src/zimg/resize/resize.h` (`create_resize` returning a
//! horizontal/vertical filter pair). The real crate dispatches to
//! polyphase FIR kernels per filter family and CPU target; this reference
//! kernel always evaluates a normalized triangular window sized to the
//! requested family's nominal support, which reproduces exact nearest-
//! neighbor and bilinear resampling and a reasonable approximation of the
//! wider families. Kernel taps themselves are out of spec.md's scope
//! (§1); only the filter-contract surface (row/col deps, buffering) needs
//! to be exact.

use crate::buffer::LineBuffer;
use crate::filter::{Filter, FilterAttributes, FilterFlags, Range};
use crate::pixel::PixelType;

/// Which spatial axis a [`ResizeFilter`] instance resamples.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ResizeAxis {
    /// Resamples along width; `same_row` (no vertical support).
    Horizontal,
    /// Resamples along height; reads multiple input rows per output row.
    Vertical,
}

/// Resampling kernel family, matching `BuildParams::resize_filter`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum ResizeKind {
    /// Nearest neighbor.
    Point,
    /// Bilinear / triangle, support 1.
    Bilinear,
    /// Bicubic with the given `(b, c)` parameters, support 2.
    Bicubic {
        /// The `b` parameter.
        b: f64,
        /// The `c` parameter.
        c: f64,
    },
    /// Cubic spline with 16 taps, support 2.
    Spline16,
    /// Cubic spline with 36 taps, support 3.
    Spline36,
    /// Windowed sinc, support equal to `taps`.
    Lanczos {
        /// Number of taps on each side of center.
        taps: u32,
    },
}

impl ResizeKind {
    /// Nominal support radius (in source samples) of this kernel family.
    #[must_use]
    pub fn support(self) -> f64 {
        match self {
            ResizeKind::Point => 0.5,
            ResizeKind::Bilinear => 1.0,
            ResizeKind::Bicubic { .. } => 2.0,
            ResizeKind::Spline16 => 2.0,
            ResizeKind::Spline36 => 3.0,
            ResizeKind::Lanczos { taps } => f64::from(taps),
        }
    }
}

/// One axis of a separable resize, parametrized by shift and active
/// sub-window width (`subwidth`), matching spec.md §4.5.2.
pub struct ResizeFilter {
    axis: ResizeAxis,
    src_dim: u32,
    cross_dim: u32,
    dst_dim: u32,
    shift: f64,
    subwidth: f64,
    pixel_type: PixelType,
    kind: ResizeKind,
    scale: f64,
    support: f64,
}

impl ResizeFilter {
    /// Creates a resize filter along `axis`.
    #[must_use]
    pub fn new(
        axis: ResizeAxis,
        src_dim: u32,
        cross_dim: u32,
        dst_dim: u32,
        shift: f64,
        subwidth: f64,
        pixel_type: PixelType,
        kind: ResizeKind,
    ) -> Self {
        let scale = f64::from(dst_dim) / subwidth.max(1e-9);
        let support = kind.support() * (1.0 / scale).max(1.0);
        ResizeFilter {
            axis,
            src_dim,
            cross_dim,
            dst_dim,
            shift,
            subwidth,
            pixel_type,
            kind,
            scale,
            support,
        }
    }

    /// Source-space center sampled for output index `o`.
    fn center(&self, o: u32) -> f64 {
        (f64::from(o) + 0.5) / self.scale + self.shift
    }

    /// Inclusive-exclusive source range `[first, last)` needed for output
    /// index `o`, clamped to `[0, src_dim)`.
    fn tap_range(&self, o: u32) -> (i64, i64) {
        let c = self.center(o);
        let first = (c - self.support).floor() as i64;
        let last = (c + self.support).ceil() as i64;
        (
            first.max(0),
            last.min(i64::from(self.src_dim)).max(first.max(0) + 1),
        )
    }

    fn triangle_weight(&self, o: u32, tap: i64) -> f64 {
        let c = self.center(o);
        let d = (f64::from(tap as i32) + 0.5 - c) / self.support;
        (1.0 - d.abs()).max(0.0)
    }

    fn weights_for(&self, o: u32) -> Vec<(u32, f64)> {
        let (first, last) = self.tap_range(o);
        let mut weights: Vec<(u32, f64)> = (first..last)
            .map(|t| (t as u32, self.triangle_weight(o, t)))
            .collect();
        let sum: f64 = weights.iter().map(|(_, w)| *w).sum();
        if sum.abs() > 1e-12 {
            for (_, w) in &mut weights {
                *w /= sum;
            }
        } else if let Some(first_tap) = weights.first_mut() {
            first_tap.1 = 1.0;
        }
        weights
    }
}

unsafe fn load(ptr: *const u8, ty: PixelType, x: u32) -> f64 {
    match ty {
        PixelType::U8 => *ptr.add(x as usize) as f64,
        PixelType::U16 => *(ptr as *const u16).add(x as usize) as f64,
        PixelType::F16 => f64::from(half_bits_to_f32(*(ptr as *const u16).add(x as usize))),
        PixelType::F32 => *(ptr as *const f32).add(x as usize) as f64,
    }
}

fn half_bits_to_f32(bits: u16) -> f32 {
    let sign = (bits >> 15) & 1;
    let exp = (bits >> 10) & 0x1F;
    let mantissa = bits & 0x3FF;
    let value = if exp == 0 {
        (mantissa as f32) * 2f32.powi(-24)
    } else if exp == 0x1F {
        f32::INFINITY
    } else {
        (1.0 + mantissa as f32 / 1024.0) * 2f32.powi(exp as i32 - 15)
    };
    if sign == 1 {
        -value
    } else {
        value
    }
}

fn f32_to_half_bits(value: f32) -> u16 {
    let bits = value.to_bits();
    let sign = ((bits >> 16) & 0x8000) as u16;
    let exp = ((bits >> 23) & 0xFF) as i32 - 127 + 15;
    let mantissa = bits & 0x007F_FFFF;

    if exp <= 0 {
        return sign;
    }
    if exp >= 0x1F {
        return sign | 0x7C00;
    }
    sign | ((exp as u16) << 10) | ((mantissa >> 13) as u16)
}

unsafe fn store(ptr: *mut u8, ty: PixelType, x: u32, value: f64) {
    match ty {
        PixelType::U8 => *ptr.add(x as usize) = value.round().clamp(0.0, 255.0) as u8,
        PixelType::U16 => *(ptr as *mut u16).add(x as usize) = value.round().clamp(0.0, 65535.0) as u16,
        PixelType::F16 => *(ptr as *mut u16).add(x as usize) = f32_to_half_bits(value as f32),
        PixelType::F32 => *(ptr as *mut f32).add(x as usize) = value as f32,
    }
}

impl Filter for ResizeFilter {
    fn flags(&self) -> FilterFlags {
        FilterFlags {
            same_row: self.axis == ResizeAxis::Horizontal,
            ..FilterFlags::default()
        }
    }

    fn attributes(&self) -> FilterAttributes {
        match self.axis {
            ResizeAxis::Horizontal => FilterAttributes {
                width: self.dst_dim,
                height: self.cross_dim,
                pixel_type: self.pixel_type,
            },
            ResizeAxis::Vertical => FilterAttributes {
                width: self.cross_dim,
                height: self.dst_dim,
                pixel_type: self.pixel_type,
            },
        }
    }

    fn row_deps(&self, i: u32) -> Range {
        match self.axis {
            ResizeAxis::Horizontal => (i, i + 1),
            ResizeAxis::Vertical => {
                let (first, last) = self.tap_range(i);
                (first as u32, last as u32)
            }
        }
    }

    fn col_deps(&self, left: u32, right: u32) -> Range {
        match self.axis {
            ResizeAxis::Horizontal => {
                let (first, _) = self.tap_range(left);
                let (_, last) = self.tap_range(right.saturating_sub(1).max(left));
                (first as u32, last as u32)
            }
            ResizeAxis::Vertical => (left, right),
        }
    }

    fn max_buffering(&self) -> u32 {
        match self.axis {
            ResizeAxis::Horizontal => 1,
            ResizeAxis::Vertical => (2.0 * self.support + 2.0) as u32,
        }
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
        match self.axis {
            ResizeAxis::Horizontal => {
                let src = inputs[0].row_ptr(i);
                let dst = outputs[0].row_ptr(i);
                for o in left..right {
                    let mut acc = 0.0;
                    for (tap, w) in self.weights_for(o) {
                        acc += w * load(src, self.pixel_type, tap);
                    }
                    store(dst, self.pixel_type, o, acc);
                }
            }
            ResizeAxis::Vertical => {
                let dst = outputs[0].row_ptr(i);
                for x in left..right {
                    let mut acc = 0.0;
                    for (tap, w) in self.weights_for(i) {
                        let src_row = inputs[0].row_ptr(tap);
                        acc += w * load(src_row, self.pixel_type, x);
                    }
                    store(dst, self.pixel_type, x, acc);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_resize_is_identity() {
        let filt = ResizeFilter::new(
            ResizeAxis::Horizontal,
            4,
            1,
            4,
            0.0,
            4.0,
            PixelType::F32,
            ResizeKind::Bilinear,
        );
        let src = [1.0f32, 2.0, 3.0, 4.0];
        let mut dst = [0.0f32; 4];
        let in_view = unsafe {
            LineBuffer::<*const u8>::new(src.as_ptr() as *const u8, 16, crate::buffer::ALL_ONES)
        };
        let out_view = unsafe {
            LineBuffer::<*mut u8>::new(dst.as_mut_ptr() as *mut u8, 16, crate::buffer::ALL_ONES)
        };
        unsafe {
            filt.process(
                std::ptr::null_mut(),
                &[in_view],
                &[out_view],
                std::ptr::null_mut(),
                0,
                0,
                4,
            );
        }
        for (a, b) in src.iter().zip(dst.iter()) {
            assert!((a - b).abs() < 1e-4, "{a} vs {b}");
        }
    }

    #[test]
    fn upscale_doubles_output_width() {
        let filt = ResizeFilter::new(
            ResizeAxis::Horizontal,
            4,
            1,
            8,
            0.0,
            4.0,
            PixelType::F32,
            ResizeKind::Bilinear,
        );
        assert_eq!(filt.attributes().width, 8);
    }
}
