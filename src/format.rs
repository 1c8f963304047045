// Copyright 2019 Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

//! Image descriptors: pixel format, colorspace definition, and the full
//! `ImageState` the builder converts between.

use crate::error::Error;
use crate::pixel::PixelType;

/// A pixel's storage layout: type, depth, range, and the two booleans that
/// change how the colorspace/resize passes treat a plane (`chroma`,
/// `ycgco`).
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PixelFormat {
    /// Underlying storage type.
    pub pixel_type: PixelType,
    /// Bits of precision actually used, `<= pixel_type.max_depth()`.
    pub depth: u32,
    /// `false` selects limited (studio) range, requiring `depth >= 8`.
    pub full_range: bool,
    /// Whether this plane is a chroma plane (affects default fill value
    /// when synthesizing fake chroma, see [`crate::builder`]).
    pub chroma: bool,
    /// Whether this plane uses the YCgCo rather than the default matrix'
    /// chroma center.
    pub ycgco: bool,
}

impl PixelFormat {
    /// Validates `self` against the invariants of spec.md §3 (depth
    /// bounds only; chroma/subsampling invariants live on `ImageState`).
    pub(crate) fn validate(&self) -> Result<(), Error> {
        if self.depth == 0 || self.depth > self.pixel_type.max_depth() {
            return Err(Error::BitDepthOverflow { depth: self.depth });
        }
        if !self.full_range && self.depth < 8 {
            return Err(Error::BitDepthOverflow { depth: self.depth });
        }
        Ok(())
    }
}

/// The three supported color families.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ColorFamily {
    /// Single achromatic plane.
    Grey,
    /// Red/Green/Blue planes.
    Rgb,
    /// Luma/Chroma planes.
    Yuv,
}

/// How the alpha plane, if any, relates to the color planes.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AlphaType {
    /// No alpha plane.
    None,
    /// Color channels are not multiplied by alpha.
    Straight,
    /// Color channels have already been multiplied by alpha.
    Premultiplied,
}

/// Field parity / interlacing of an image.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FieldParity {
    /// No interlacing.
    Progressive,
    /// Top-field-first interlaced.
    Top,
    /// Bottom-field-first interlaced.
    Bottom,
}

/// Horizontal chroma sample placement.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ChromaLocationW {
    /// Chroma sample aligned with the left luma sample of the pair.
    Left,
    /// Chroma sample centered between the two luma samples.
    Center,
}

/// Vertical chroma sample placement.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ChromaLocationH {
    /// Chroma sample centered between the two luma rows.
    Center,
    /// Chroma sample aligned with the top luma row.
    Top,
    /// Chroma sample aligned with the bottom luma row.
    Bottom,
}

/// Matrix coefficients, as enumerated by ITU/SMPTE.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MatrixCoefficients {
    /// Identity (RGB, no matrix applied).
    Rgb,
    /// Unspecified; treated as RGB-compatible by some validation rules.
    Unspecified,
    /// ITU-R BT.601.
    Rec601,
    /// ITU-R BT.709.
    Rec709,
    /// ITU-R BT.2020, non-constant luminance.
    Rec2020Ncl,
    /// ITU-R BT.2020, constant luminance.
    Rec2020Cl,
    /// YCgCo.
    YCgCo,
    /// ITU-R BT.2100 ICtCp.
    Rec2100ICtCp,
    /// Chromaticity-derived, non-constant luminance.
    ChromaticityDerivedNcl,
    /// Chromaticity-derived, constant luminance.
    ChromaticityDerivedCl,
}

/// Transfer characteristics.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TransferCharacteristics {
    /// Linear light.
    Linear,
    /// ITU-R BT.709.
    Rec709,
    /// SMPTE ST 2084 (PQ).
    St2084,
    /// ARIB STD-B67 (HLG).
    AribB67,
}

/// Color primaries.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ColorPrimaries {
    /// ITU-R BT.709.
    Rec709,
    /// ITU-R BT.2020.
    Rec2020,
    /// SMPTE-C.
    SmpteC,
    /// DCI-P3.
    DciP3,
    /// DCI-P3, D65 white point.
    DciP3D65,
}

/// `{ matrix, transfer, primaries }`, compared field-wise.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ColorspaceDefinition {
    /// Matrix coefficients.
    pub matrix: MatrixCoefficients,
    /// Transfer characteristics.
    pub transfer: TransferCharacteristics,
    /// Color primaries.
    pub primaries: ColorPrimaries,
}

impl ColorspaceDefinition {
    /// The RGB definition used for intermediate colorspace-conversion
    /// stages: identity matrix, linear-light agnostic transfer/primaries
    /// are carried through unchanged from whichever side supplied them.
    #[must_use]
    pub const fn rgb(transfer: TransferCharacteristics, primaries: ColorPrimaries) -> Self {
        ColorspaceDefinition {
            matrix: MatrixCoefficients::Rgb,
            transfer,
            primaries,
        }
    }
}

/// Source or target image descriptor consumed by the builder.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ImageState {
    /// Plane-0 (luma/green) width in pixels.
    pub width: u32,
    /// Plane-0 (luma/green) height in pixels.
    pub height: u32,
    /// Storage type.
    pub pixel_type: PixelType,
    /// Bits of precision.
    pub depth: u32,
    /// `false` selects limited range.
    pub full_range: bool,
    /// Color family.
    pub color: ColorFamily,
    /// Matrix/transfer/primaries.
    pub colorspace: ColorspaceDefinition,
    /// Horizontal chroma subsampling exponent, 0..=2.
    pub subsample_w: u32,
    /// Vertical chroma subsampling exponent, 0..=2.
    pub subsample_h: u32,
    /// Field parity.
    pub parity: FieldParity,
    /// Horizontal chroma sample placement.
    pub chroma_location_w: ChromaLocationW,
    /// Vertical chroma sample placement.
    pub chroma_location_h: ChromaLocationH,
    /// Active window left offset, in luma pixels.
    pub active_left: f64,
    /// Active window top offset, in luma pixels.
    pub active_top: f64,
    /// Active window width, in luma pixels.
    pub active_width: f64,
    /// Active window height, in luma pixels.
    pub active_height: f64,
    /// Alpha semantics.
    pub alpha: AlphaType,
}

impl ImageState {
    /// Returns the declared pixel format of the color planes.
    #[must_use]
    pub fn pixel_format(&self) -> PixelFormat {
        PixelFormat {
            pixel_type: self.pixel_type,
            depth: self.depth,
            full_range: self.full_range,
            chroma: false,
            ycgco: self.colorspace.matrix == MatrixCoefficients::YCgCo,
        }
    }

    /// Chroma plane width for YUV images; equal to `width` otherwise.
    #[must_use]
    pub fn chroma_width(&self) -> u32 {
        self.width >> self.subsample_w
    }

    /// Chroma plane height for YUV images; equal to `height` otherwise.
    #[must_use]
    pub fn chroma_height(&self) -> u32 {
        self.height >> self.subsample_h
    }

    /// Validates all invariants listed in spec.md §3. Called by
    /// [`crate::build_graph`] before any planning begins.
    pub fn validate(&self) -> Result<(), Error> {
        if self.width == 0 || self.height == 0 {
            return Err(Error::InvalidImageSize {
                width: self.width,
                height: self.height,
            });
        }
        if self.width > self.pixel_type.max_width() {
            return Err(Error::InvalidImageSize {
                width: self.width,
                height: self.height,
            });
        }

        match self.color {
            ColorFamily::Grey => {
                if self.subsample_w != 0 || self.subsample_h != 0 {
                    return Err(Error::GreyscaleSubsampling);
                }
                if self.colorspace.matrix == MatrixCoefficients::Rgb {
                    return Err(Error::ColorFamilyMismatch);
                }
            }
            ColorFamily::Rgb => {
                if self.subsample_w != 0 || self.subsample_h != 0 {
                    return Err(Error::UnsupportedSubsampling);
                }
                if !matches!(
                    self.colorspace.matrix,
                    MatrixCoefficients::Unspecified | MatrixCoefficients::Rgb
                ) {
                    return Err(Error::ColorFamilyMismatch);
                }
            }
            ColorFamily::Yuv => {
                if self.colorspace.matrix == MatrixCoefficients::Rgb {
                    return Err(Error::ColorFamilyMismatch);
                }
            }
        }

        if self.subsample_w > 2 || self.subsample_h > 2 {
            return Err(Error::UnsupportedSubsampling);
        }
        if self.subsample_h > 1 && self.parity != FieldParity::Progressive {
            return Err(Error::UnsupportedSubsampling);
        }

        if self.width % (1 << self.subsample_w) != 0 || self.height % (1 << self.subsample_h) != 0
        {
            return Err(Error::ImageNotDivisible);
        }

        self.pixel_format().validate()?;

        if !self.active_left.is_finite()
            || !self.active_top.is_finite()
            || !self.active_width.is_finite()
            || !self.active_height.is_finite()
        {
            return Err(Error::InvalidImageSize {
                width: self.width,
                height: self.height,
            });
        }
        if self.active_width <= 0.0 || self.active_height <= 0.0 {
            return Err(Error::InvalidImageSize {
                width: self.width,
                height: self.height,
            });
        }

        Ok(())
    }
}
