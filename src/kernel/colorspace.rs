// Copyright 2019 Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

//! Joint 3-plane colorspace conversion (matrix + transfer function),
//! grounded conceptually on zimg's colorspace graph node (matrix/transfer/
//! primaries conversion chained as one operation per spec.md §3
//! `ColorspaceDefinition`). Runs entirely in FLOAT, as required by
//! spec.md §4.5.1 pass 2 (depth is converted to FLOAT before this filter
//! is ever inserted).

use crate::buffer::LineBuffer;
use crate::filter::{Filter, FilterAttributes, FilterFlags};
use crate::format::{ColorspaceDefinition, MatrixCoefficients, TransferCharacteristics};
use crate::kernel::MathOps;
use crate::pixel::PixelType;

type Mat3 = [[f64; 3]; 3];

const IDENTITY: Mat3 = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];

/// RGB -> YUV analysis matrix for the given coefficients (`Kr`, `Kg`, `Kb`
/// derived per ITU convention); `Rgb`/`Unspecified` are identity.
fn rgb_to_yuv_matrix(matrix: MatrixCoefficients) -> Mat3 {
    let (kr, kb) = match matrix {
        MatrixCoefficients::Rec601 => (0.299, 0.114),
        MatrixCoefficients::Rec709 => (0.2126, 0.0722),
        MatrixCoefficients::Rec2020Ncl | MatrixCoefficients::Rec2020Cl => (0.2627, 0.0593),
        MatrixCoefficients::YCgCo => return ycgco_matrix(),
        _ => return IDENTITY,
    };
    let kg = 1.0 - kr - kb;
    [
        [kr, kg, kb],
        [-kr / (2.0 * (1.0 - kb)), -kg / (2.0 * (1.0 - kb)), 0.5],
        [0.5, -kg / (2.0 * (1.0 - kr)), -kb / (2.0 * (1.0 - kr))],
    ]
}

fn ycgco_matrix() -> Mat3 {
    [
        [0.25, 0.5, 0.25],
        [-0.25, 0.5, -0.25],
        [0.5, 0.0, -0.5],
    ]
}

fn invert3(m: Mat3) -> Mat3 {
    let det = m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
        - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
        + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0]);
    let inv_det = if det.abs() > 1e-12 { 1.0 / det } else { 0.0 };
    let mut out = [[0.0; 3]; 3];
    out[0][0] = (m[1][1] * m[2][2] - m[1][2] * m[2][1]) * inv_det;
    out[0][1] = (m[0][2] * m[2][1] - m[0][1] * m[2][2]) * inv_det;
    out[0][2] = (m[0][1] * m[1][2] - m[0][2] * m[1][1]) * inv_det;
    out[1][0] = (m[1][2] * m[2][0] - m[1][0] * m[2][2]) * inv_det;
    out[1][1] = (m[0][0] * m[2][2] - m[0][2] * m[2][0]) * inv_det;
    out[1][2] = (m[0][2] * m[1][0] - m[0][0] * m[1][2]) * inv_det;
    out[2][0] = (m[1][0] * m[2][1] - m[1][1] * m[2][0]) * inv_det;
    out[2][1] = (m[0][1] * m[2][0] - m[0][0] * m[2][1]) * inv_det;
    out[2][2] = (m[0][0] * m[1][1] - m[0][1] * m[1][0]) * inv_det;
    out
}

fn mul3(m: Mat3, v: [f64; 3]) -> [f64; 3] {
    [
        m[0][0] * v[0] + m[0][1] * v[1] + m[0][2] * v[2],
        m[1][0] * v[0] + m[1][1] * v[1] + m[1][2] * v[2],
        m[2][0] * v[0] + m[2][1] * v[1] + m[2][2] * v[2],
    ]
}

/// Applies `from`'s transfer function in reverse (encoded -> linear).
fn transfer_to_linear(transfer: TransferCharacteristics, v: f64, peak_luminance: f64, math: &MathOps) -> f64 {
    match transfer {
        TransferCharacteristics::Linear => v,
        TransferCharacteristics::Rec709 => {
            if v < 0.081 {
                v / 4.5
            } else {
                (math.powf)((v + 0.099) / 1.099, 1.0 / 0.45)
            }
        }
        TransferCharacteristics::St2084 => {
            // Simplified ST 2084 (PQ) EOTF, normalized against peak_luminance.
            let m1 = 0.1593017578125;
            let m2 = 78.84375;
            let c1 = 0.8359375;
            let c2 = 18.8515625;
            let c3 = 18.6875;
            let vp = v.max(1e-6).min(1.0);
            let num = (vp.powf(1.0 / m2) - c1).max(0.0);
            let den = c2 - c3 * vp.powf(1.0 / m2);
            let linear = if den.abs() > 1e-12 {
                (num / den).powf(1.0 / m1)
            } else {
                0.0
            };
            linear * (10000.0 / peak_luminance.max(1.0))
        }
        TransferCharacteristics::AribB67 => {
            let a = 0.17883277;
            let b = 1.0 - 4.0 * a;
            let c = 0.5 - a * (math.ln)(4.0 * a);
            if v <= 0.5 {
                (v * v) / 3.0
            } else {
                ((math.exp)((v - c) / a) - b) / 12.0
            }
        }
    }
}

/// Applies `to`'s transfer function forward (linear -> encoded).
fn linear_to_transfer(transfer: TransferCharacteristics, v: f64, peak_luminance: f64, math: &MathOps) -> f64 {
    match transfer {
        TransferCharacteristics::Linear => v,
        TransferCharacteristics::Rec709 => {
            if v < 0.018 {
                4.5 * v
            } else {
                1.099 * (math.powf)(v, 0.45) - 0.099
            }
        }
        TransferCharacteristics::St2084 => {
            let m1 = 0.1593017578125;
            let m2 = 78.84375;
            let c1 = 0.8359375;
            let c2 = 18.8515625;
            let c3 = 18.6875;
            let y = (v * peak_luminance.max(1.0) / 10000.0).max(0.0);
            let ym1 = y.powf(m1);
            ((c1 + c2 * ym1) / (1.0 + c3 * ym1)).powf(m2)
        }
        TransferCharacteristics::AribB67 => {
            let a = 0.17883277;
            let b = 1.0 - 4.0 * a;
            let c = 0.5 - a * (math.ln)(4.0 * a);
            if v <= 1.0 / 12.0 {
                (3.0 * v).sqrt()
            } else {
                a * (math.ln)(12.0 * v - b) + c
            }
        }
    }
}

/// Joint RGB<->YUV + transfer-function conversion over three simultaneous
/// planes, operating entirely in FLOAT.
pub struct ColorMatrixFilter {
    attr: FilterAttributes,
    forward: Mat3,
    from: ColorspaceDefinition,
    to: ColorspaceDefinition,
    peak_luminance: f64,
    math: MathOps,
}

impl ColorMatrixFilter {
    /// Creates a filter converting `width x height` FLOAT RGB/YUV triples
    /// from `from` to `to`.
    #[must_use]
    pub fn new(
        width: u32,
        height: u32,
        from: ColorspaceDefinition,
        to: ColorspaceDefinition,
        peak_luminance: f64,
        math: MathOps,
    ) -> Self {
        let from_to_rgb = invert3(rgb_to_yuv_matrix(from.matrix));
        let rgb_to_to = rgb_to_yuv_matrix(to.matrix);
        // Compose source-space -> RGB -> target-space once so `process`
        // performs a single 3x3 multiply per pixel rather than two.
        let mut forward = [[0.0; 3]; 3];
        for r in 0..3 {
            for c in 0..3 {
                forward[r][c] = (0..3).map(|k| rgb_to_to[r][k] * from_to_rgb[k][c]).sum();
            }
        }
        ColorMatrixFilter {
            attr: FilterAttributes {
                width,
                height,
                pixel_type: PixelType::F32,
            },
            forward,
            from,
            to,
            peak_luminance,
            math,
        }
    }
}

impl Filter for ColorMatrixFilter {
    fn flags(&self) -> FilterFlags {
        FilterFlags {
            same_row: true,
            color: true,
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
        let same_transfer = self.from.transfer == self.to.transfer;
        let rows: Vec<*const f32> = inputs.iter().map(|b| b.row_ptr(i) as *const f32).collect();
        let outs: Vec<*mut f32> = outputs.iter().map(|b| b.row_ptr(i) as *mut f32).collect();

        for x in left..right {
            let xu = x as usize;
            let sample = [
                *rows[0].add(xu) as f64,
                *rows[1].add(xu) as f64,
                *rows[2].add(xu) as f64,
            ];

            let matrixed = if same_transfer {
                mul3(self.forward, sample)
            } else {
                let rgb_from = mul3(invert3(rgb_to_yuv_matrix(self.from.matrix)), sample);
                let linear = [
                    transfer_to_linear(self.from.transfer, rgb_from[0], self.peak_luminance, &self.math),
                    transfer_to_linear(self.from.transfer, rgb_from[1], self.peak_luminance, &self.math),
                    transfer_to_linear(self.from.transfer, rgb_from[2], self.peak_luminance, &self.math),
                ];
                let encoded = [
                    linear_to_transfer(self.to.transfer, linear[0], self.peak_luminance, &self.math),
                    linear_to_transfer(self.to.transfer, linear[1], self.peak_luminance, &self.math),
                    linear_to_transfer(self.to.transfer, linear[2], self.peak_luminance, &self.math),
                ];
                mul3(rgb_to_yuv_matrix(self.to.matrix), encoded)
            };

            for (k, &v) in matrixed.iter().enumerate() {
                *outs[k].add(xu) = v as f32;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::ColorPrimaries;

    fn cs(matrix: MatrixCoefficients) -> ColorspaceDefinition {
        ColorspaceDefinition {
            matrix,
            transfer: TransferCharacteristics::Rec709,
            primaries: ColorPrimaries::Rec709,
        }
    }

    #[test]
    fn identity_matrix_is_actually_identity() {
        let filt = ColorMatrixFilter::new(1, 1, cs(MatrixCoefficients::Rgb), cs(MatrixCoefficients::Rgb), 100.0, MathOps::DEFAULT);
        let rgb = [0.2f32, 0.5, 0.8];
        let views: Vec<_> = rgb
            .iter()
            .map(|v| unsafe { LineBuffer::<*const u8>::new(v as *const f32 as *const u8, 4, crate::buffer::ALL_ONES) })
            .collect();
        let mut out = [0.0f32; 3];
        let out_views: Vec<_> = out
            .iter_mut()
            .map(|v| unsafe { LineBuffer::<*mut u8>::new(v as *mut f32 as *mut u8, 4, crate::buffer::ALL_ONES) })
            .collect();
        unsafe {
            filt.process(std::ptr::null_mut(), &views, &out_views, std::ptr::null_mut(), 0, 0, 1);
        }
        for (a, b) in rgb.iter().zip(out.iter()) {
            assert!((a - b).abs() < 1e-5);
        }
    }

    #[test]
    fn rgb_to_yuv_rec709_round_trips() {
        let fwd = ColorMatrixFilter::new(1, 1, cs(MatrixCoefficients::Rgb), cs(MatrixCoefficients::Rec709), 100.0, MathOps::DEFAULT);
        let bwd = ColorMatrixFilter::new(1, 1, cs(MatrixCoefficients::Rec709), cs(MatrixCoefficients::Rgb), 100.0, MathOps::DEFAULT);

        let rgb = [0.3f32, 0.6, 0.1];
        let views: Vec<_> = rgb
            .iter()
            .map(|v| unsafe { LineBuffer::<*const u8>::new(v as *const f32 as *const u8, 4, crate::buffer::ALL_ONES) })
            .collect();
        let mut yuv = [0.0f32; 3];
        let out_views: Vec<_> = yuv
            .iter_mut()
            .map(|v| unsafe { LineBuffer::<*mut u8>::new(v as *mut f32 as *mut u8, 4, crate::buffer::ALL_ONES) })
            .collect();
        unsafe {
            fwd.process(std::ptr::null_mut(), &views, &out_views, std::ptr::null_mut(), 0, 0, 1);
        }

        let yuv_views: Vec<_> = yuv
            .iter()
            .map(|v| unsafe { LineBuffer::<*const u8>::new(v as *const f32 as *const u8, 4, crate::buffer::ALL_ONES) })
            .collect();
        let mut rgb2 = [0.0f32; 3];
        let out2: Vec<_> = rgb2
            .iter_mut()
            .map(|v| unsafe { LineBuffer::<*mut u8>::new(v as *mut f32 as *mut u8, 4, crate::buffer::ALL_ONES) })
            .collect();
        unsafe {
            bwd.process(std::ptr::null_mut(), &yuv_views, &out2, std::ptr::null_mut(), 0, 0, 1);
        }

        for (a, b) in rgb.iter().zip(rgb2.iter()) {
            assert!((a - b).abs() < 1e-4, "{a} vs {b}");
        }
    }
}
