// Copyright 2019 Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

// Permission is hereby granted, free of charge, to any person obtaining a copy of this
// software and associated documentation files (the "Software"), to deal in the Software
// without restriction, including without limitation the rights to use, copy, modify,
// merge, publish, distribute, sublicense, and/or sell copies of the Software, and to
// permit persons to whom the Software is furnished to do so.

// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR IMPLIED,
// INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY, FITNESS FOR A
// PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE AUTHORS OR COPYRIGHT
// HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER LIABILITY, WHETHER IN AN ACTION
// OF CONTRACT, TORT OR OTHERWISE, ARISING FROM, OUT OF OR IN CONNECTION WITH THE
// SOFTWARE OR THE USE OR OTHER DEALINGS IN THE SOFTWARE.

//! Tagged error kinds surfaced by the planner and the graph engine.

use thiserror::Error;

/// Errors that `build_graph` and `Graph::process` may return.
///
/// Configuration errors (everything except [`Error::OutOfMemory`],
/// [`Error::UserCallbackFailed`] and [`Error::Internal`]) are only ever
/// raised while building a graph; the engine itself can fail only through
/// resource exhaustion, a misbehaving callback, or a broken internal
/// invariant.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Allocation failure while building a graph or processing a frame.
    #[error("out of memory")]
    OutOfMemory,

    /// `width`/`height` is zero, exceeds the pixel type's addressable width,
    /// or otherwise fails the size checks of `ImageState`.
    #[error("invalid image size: {width}x{height}")]
    InvalidImageSize {
        /// Offending width.
        width: u32,
        /// Offending height.
        height: u32,
    },

    /// A `Grey` image declared non-zero chroma subsampling.
    #[error("greyscale images cannot be subsampled")]
    GreyscaleSubsampling,

    /// The declared `ColorFamily` is incompatible with the declared matrix.
    #[error("color family does not match matrix coefficients")]
    ColorFamilyMismatch,

    /// Subsampling factor above 2, or vertical subsampling combined with an
    /// interlaced `FieldParity`.
    #[error("unsupported chroma subsampling")]
    UnsupportedSubsampling,

    /// `width`/`height` is not a multiple of the chroma subsampling factor.
    #[error("image dimensions are not divisible by the subsampling factor")]
    ImageNotDivisible,

    /// `depth` exceeds the pixel type's maximum, or is too low for a
    /// limited-range format.
    #[error("bit depth {depth} is not representable in the given pixel type")]
    BitDepthOverflow {
        /// Offending depth.
        depth: u32,
    },

    /// The planner was asked to convert between field parities; unsupported.
    #[error("conversion between field parities is not supported")]
    NoFieldParityConversion,

    /// The requested colorspace conversion has no registered kernel.
    #[error("no colorspace conversion is available for the requested pair")]
    NoColorspaceConversion,

    /// The requested resampling configuration has no registered kernel.
    #[error("no resampling kernel is available for the requested configuration")]
    ResamplingNotAvailable,

    /// A planner or engine invariant was violated. Indicates a bug in this
    /// crate; callers cannot recover from it.
    #[error("internal error: {0}")]
    Internal(String),

    /// `unpack_cb` or `pack_cb` returned a nonzero status.
    #[error("user callback returned failure")]
    UserCallbackFailed,
}

/// Constructs an [`Error::Internal`] from any displayable contract
/// violation. Used at sites that should be unreachable if the planner and
/// engine are consistent with each other, in place of `unreachable!()` or a
/// panic, so that a broken invariant is always observable as an `Err`.
pub(crate) fn internal_error(msg: impl Into<String>) -> Error {
    Error::Internal(msg.into())
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
