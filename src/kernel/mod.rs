// Copyright 2019 Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

//! The kernel factory: the one boundary spec.md declares opaque. Given a
//! conversion spec (colorspace / depth / resize), it returns concrete
//! [`crate::filter::Filter`] instances. This module ships a portable,
//! functionally-correct reference factory standing in for the SIMD kernel
//! bodies the spec places out of scope (resize polyphase FIR, dither LUTs,
//! colorspace matrix/LUT math): simple, not fast.

mod colorspace;
mod depth;
mod resize;

pub use colorspace::ColorMatrixFilter;
pub use depth::{DepthConvertFilter, DitherType};
pub use resize::{ResizeAxis, ResizeFilter, ResizeKind};

use crate::error::{Error, Result};
use crate::format::{ColorspaceDefinition, PixelFormat};
use crate::pixel::PixelType;

/// SIMD alignment a real kernel factory would declare for its inputs,
/// outputs, and scratch; exposed so the engine can size `tmp`/cache
/// allocations to a boundary real kernels could exploit (spec.md §6
/// alignment requirement; `original_source/src/zimg/common/osdep.h`).
pub const SIMD_ALIGNMENT: usize = 64;

/// Swappable table of transcendental functions used by colorspace transfer
/// kernels, standing in for the C++ original's global `libm`-replacement
/// function pointers (`Common/libm_wrapper.*`) without any process-global
/// mutable state: callers construct one `MathOps` and thread it through.
#[derive(Copy, Clone)]
pub struct MathOps {
    /// `x.powf(y)`.
    pub powf: fn(f64, f64) -> f64,
    /// `x.ln()`.
    pub ln: fn(f64) -> f64,
    /// `x.exp()`.
    pub exp: fn(f64) -> f64,
}

impl MathOps {
    /// The default table, backed directly by `std`'s `f64` intrinsics.
    pub const DEFAULT: MathOps = MathOps {
        powf: f64::powf,
        ln: f64::ln,
        exp: f64::exp,
    };
}

impl Default for MathOps {
    fn default() -> Self {
        MathOps::DEFAULT
    }
}

/// Describes one of the three kernel families the builder may request.
pub enum KernelSpec {
    /// A joint 3-plane colorspace matrix/transfer conversion.
    Colorspace {
        /// Plane width/height (luma dimensions; intermediate colorspace
        /// stages are always 4:4:4 per spec.md §4.5.1 pass 2).
        width: u32,
        /// See `width`.
        height: u32,
        /// Source colorspace definition.
        from: ColorspaceDefinition,
        /// Target colorspace definition.
        to: ColorspaceDefinition,
        /// Peak luminance in nits, for HDR transfer functions.
        peak_luminance: f64,
    },
    /// A depth/range conversion on one plane.
    Depth {
        /// Plane width.
        width: u32,
        /// Plane height.
        height: u32,
        /// Source pixel format.
        from: PixelFormat,
        /// Target pixel format.
        to: PixelFormat,
        /// Dithering method.
        dither: DitherType,
    },
    /// A one-dimensional resize along one axis.
    Resize {
        /// Axis being resized.
        axis: ResizeAxis,
        /// Source dimension along `axis`.
        src_dim: u32,
        /// Source dimension along the other axis (unchanged).
        cross_dim: u32,
        /// Target dimension along `axis`.
        dst_dim: u32,
        /// Sub-pixel shift applied before resampling.
        shift: f64,
        /// Width, in source samples, of the active sub-window along `axis`.
        subwidth: f64,
        /// Pixel type the resize operates in (always an intermediate type
        /// chosen by the builder, never the narrowest source/target type).
        pixel_type: PixelType,
        /// Selected resampling kernel.
        kind: ResizeKind,
    },
}

/// Returns the filter instance(s) implementing `spec`.
///
/// Implemented as a free function rather than a `dyn` factory trait object:
/// the builder always knows at compile time which of the three kernel
/// families it needs, and a trait object would only exist to be
/// immediately downcast. A pluggable external factory (e.g. a SIMD-dispatch
/// backend) can still conform to the same three match arms; see
/// `BuildParams::cpu` in [`crate::builder`] for the hint it would consult.
pub fn build_kernel(spec: KernelSpec, math: MathOps) -> Result<Box<dyn crate::filter::Filter>> {
    match spec {
        KernelSpec::Colorspace {
            width,
            height,
            from,
            to,
            peak_luminance,
        } => Ok(Box::new(ColorMatrixFilter::new(
            width,
            height,
            from,
            to,
            peak_luminance,
            math,
        ))),
        KernelSpec::Depth {
            width,
            height,
            from,
            to,
            dither,
        } => {
            if to.depth == 0 || to.depth > to.pixel_type.max_depth() {
                return Err(Error::BitDepthOverflow { depth: to.depth });
            }
            Ok(Box::new(DepthConvertFilter::new(
                width, height, from, to, dither,
            )))
        }
        KernelSpec::Resize {
            axis,
            src_dim,
            cross_dim,
            dst_dim,
            shift,
            subwidth,
            pixel_type,
            kind,
        } => {
            if dst_dim == 0 {
                return Err(Error::ResamplingNotAvailable);
            }
            Ok(Box::new(ResizeFilter::new(
                axis, src_dim, cross_dim, dst_dim, shift, subwidth, pixel_type, kind,
            )))
        }
    }
}
