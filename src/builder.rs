// Copyright 2019 Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

//! The graph planner (spec.md §4.5): turns `(source, target, params)` into
//! a completed [`crate::graph::Graph`] by appending filter nodes for
//! exactly the residual differences between the two `ImageState`s, in the
//! fixed pass order of §4.5.1.

use std::rc::Rc;

use crate::error::{Error, Result};
use crate::filter::Filter;
use crate::filters::{FillValue, PremultiplyFilter, UnpremultiplyFilter, ValueInitializeFilter};
use crate::format::{
    AlphaType, ChromaLocationH, ChromaLocationW, ColorFamily, ColorspaceDefinition, FieldParity,
    ImageState, MatrixCoefficients, PixelFormat,
};
use crate::graph::Graph;
use crate::kernel::{self, DitherType, KernelSpec, MathOps, ResizeAxis, ResizeKind};
use crate::node::{NodeId, PlaneRef};
use crate::pixel::PixelType;

/// CPU dispatch hint; this crate has no SIMD backends to select between
/// (spec.md §1 Non-goals), so the value is accepted and logged only.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum CpuHint {
    /// Let the (nonexistent) dispatcher decide.
    #[default]
    Auto,
    /// Force the portable reference kernel path, which is the only path
    /// this crate ships.
    None,
}

/// Configuration accepted by [`build_graph`] (spec.md §6).
#[derive(Copy, Clone, Debug)]
pub struct BuildParams {
    /// Resampling kernel for the luma/RGB planes.
    pub resize_filter: ResizeKind,
    /// Resampling kernel for chroma planes; defaults to `resize_filter`.
    pub resize_filter_chroma: ResizeKind,
    /// Use the inverse-of-interpolation resampler. This reference kernel
    /// factory has only one resampling family per `ResizeKind`, so this
    /// flag is accepted but does not change kernel selection; see
    /// `DESIGN.md`.
    pub unresize: bool,
    /// Dithering method applied by depth/range conversions.
    pub dither: DitherType,
    /// Peak luminance in nits, consulted by HDR transfer functions.
    pub peak_luminance: f64,
    /// Whether to use an approximate (cheaper) gamma curve. Unused by this
    /// reference kernel factory, which always evaluates the exact transfer
    /// functions; accepted for interface compatibility.
    pub approximate_gamma: bool,
    /// Whether the source is scene-referred (affects HDR tone handling in
    /// a full kernel factory). Unused by this reference factory.
    pub scene_referred: bool,
    /// Kernel dispatch hint.
    pub cpu: CpuHint,
}

impl Default for BuildParams {
    fn default() -> Self {
        BuildParams {
            resize_filter: ResizeKind::Bilinear,
            resize_filter_chroma: ResizeKind::Bilinear,
            unresize: false,
            dither: DitherType::None,
            peak_luminance: 100.0,
            approximate_gamma: false,
            scene_referred: false,
            cpu: CpuHint::Auto,
        }
    }
}

/// Planner state threaded through the eight ordered passes.
struct Builder {
    graph: Graph,
    current: ImageState,
    target: ImageState,
    source_color: ColorFamily,
    plane_ids: [Option<PlaneRef>; 4],
    params: BuildParams,
    math: MathOps,
}

fn chroma_shift_w(loc: ChromaLocationW) -> f64 {
    match loc {
        ChromaLocationW::Left => -0.5,
        ChromaLocationW::Center => 0.0,
    }
}

fn chroma_shift_h(loc: ChromaLocationH, parity: FieldParity) -> f64 {
    let base = match loc {
        ChromaLocationH::Top => -0.5,
        ChromaLocationH::Bottom => 0.5,
        ChromaLocationH::Center => 0.0,
    };
    match parity {
        FieldParity::Top => (base - 0.5) / 2.0,
        FieldParity::Bottom => (base + 0.5) / 2.0,
        FieldParity::Progressive => base,
    }
}

impl Builder {
    fn active_planes(color: ColorFamily) -> &'static [u8] {
        match color {
            ColorFamily::Grey => &[0],
            ColorFamily::Rgb | ColorFamily::Yuv => &[0, 1, 2],
        }
    }

    fn plane_dims(&self, plane: u8) -> (u32, u32) {
        if plane == 0 || plane == 3 || self.current.color != ColorFamily::Yuv {
            (self.current.width, self.current.height)
        } else {
            (self.current.chroma_width(), self.current.chroma_height())
        }
    }

    fn plane_format(&self, plane: u8) -> PixelFormat {
        PixelFormat {
            pixel_type: self.current.pixel_type,
            depth: self.current.depth,
            full_range: if plane == 3 { true } else { self.current.full_range },
            chroma: plane != 0 && plane != 3 && self.current.color == ColorFamily::Yuv,
            ycgco: self.current.colorspace.matrix == MatrixCoefficients::YCgCo,
        }
    }

    fn require(&self, plane: u8) -> Result<PlaneRef> {
        self.plane_ids[plane as usize]
            .ok_or_else(|| crate::error::internal_error(format!("plane {plane} missing")))
    }

    /// Inserts a depth/range converter on one plane, updating `plane_ids`.
    /// Does not touch `self.current`; callers update the format fields
    /// once for every plane they convert.
    fn convert_plane(&mut self, plane: u8, to: PixelFormat) -> Result<()> {
        let from = self.plane_format(plane);
        if from == to {
            return Ok(());
        }
        let (width, height) = self.plane_dims(plane);
        let filter = kernel::build_kernel(
            KernelSpec::Depth {
                width,
                height,
                from,
                to,
                dither: self.params.dither,
            },
            self.math,
        )?;
        let filter: Rc<dyn Filter> = Rc::from(filter);
        let input = self.require(plane)?;
        let node = self.graph.add_filter(filter, vec![input], 1 << 0);
        self.plane_ids[plane as usize] = Some(PlaneRef { node, slot: 0 });
        Ok(())
    }

    fn set_color_format(&mut self, ty: PixelType, depth: u32, full_range: bool) -> Result<()> {
        for &p in Self::active_planes(self.current.color) {
            if self.plane_ids[p as usize].is_none() {
                continue;
            }
            let to = PixelFormat {
                pixel_type: ty,
                depth,
                full_range,
                chroma: p != 0 && self.current.color == ColorFamily::Yuv,
                ycgco: self.current.colorspace.matrix == MatrixCoefficients::YCgCo,
            };
            self.convert_plane(p, to)?;
        }
        self.current.pixel_type = ty;
        self.current.depth = depth;
        self.current.full_range = full_range;
        Ok(())
    }

    fn ensure_float(&mut self) -> Result<()> {
        if self.current.pixel_type != PixelType::F32 {
            self.set_color_format(PixelType::F32, 32, true)?;
        }
        Ok(())
    }

    /// Upsamples chroma to the luma resolution (4:4:4), needed before any
    /// per-pixel joint operation (premultiply, colorspace matrix).
    fn ensure_444(&mut self) -> Result<()> {
        if self.current.color != ColorFamily::Yuv {
            return Ok(());
        }
        if self.current.subsample_w == 0 && self.current.subsample_h == 0 {
            return Ok(());
        }
        for &p in &[1u8, 2u8] {
            if self.plane_ids[p as usize].is_none() {
                continue;
            }
            let (src_w, src_h) = self.plane_dims(p);
            let mut cur = self.require(p)?;
            if self.current.subsample_w > 0 {
                let filter = kernel::build_kernel(
                    KernelSpec::Resize {
                        axis: ResizeAxis::Horizontal,
                        src_dim: src_w,
                        cross_dim: src_h,
                        dst_dim: self.current.width,
                        shift: chroma_shift_w(self.current.chroma_location_w)
                            / f64::from(1u32 << self.current.subsample_w),
                        subwidth: f64::from(src_w),
                        pixel_type: self.current.pixel_type,
                        kind: self.params.resize_filter_chroma,
                    },
                    self.math,
                )?;
                let filter: Rc<dyn Filter> = Rc::from(filter);
                let node = self.graph.add_filter(filter, vec![cur], 1);
                cur = PlaneRef { node, slot: 0 };
            }
            if self.current.subsample_h > 0 {
                let src_h2 = src_h;
                let filter = kernel::build_kernel(
                    KernelSpec::Resize {
                        axis: ResizeAxis::Vertical,
                        src_dim: src_h2,
                        cross_dim: self.current.width,
                        dst_dim: self.current.height,
                        shift: chroma_shift_h(self.current.chroma_location_h, self.current.parity)
                            / f64::from(1u32 << self.current.subsample_h),
                        subwidth: f64::from(src_h2),
                        pixel_type: self.current.pixel_type,
                        kind: self.params.resize_filter_chroma,
                    },
                    self.math,
                )?;
                let filter: Rc<dyn Filter> = Rc::from(filter);
                let node = self.graph.add_filter(filter, vec![cur], 1);
                cur = PlaneRef { node, slot: 0 };
            }
            self.plane_ids[p as usize] = Some(cur);
        }
        self.current.subsample_w = 0;
        self.current.subsample_h = 0;
        Ok(())
    }

    fn colorspace_equal(&self) -> bool {
        if self.current.color == ColorFamily::Grey
            && self.target.color == ColorFamily::Grey
            && self.source_color != ColorFamily::Rgb
        {
            true
        } else {
            self.current.colorspace == self.target.colorspace
        }
    }

    /// Pass 1: premultiply straight alpha before any operation that would
    /// otherwise blend it incorrectly.
    fn pass1_alpha_unstraighten(&mut self) -> Result<()> {
        if self.current.alpha != AlphaType::Straight || self.plane_ids[3].is_none() {
            return Ok(());
        }
        let colorspace_pending = !self.colorspace_equal();
        let resize_pending = self.current.width != self.target.width
            || self.current.height != self.target.height
            || self.current.subsample_w != self.target.subsample_w
            || self.current.subsample_h != self.target.subsample_h
            || self.current.active_left != 0.0
            || self.current.active_top != 0.0
            || (self.current.active_width - f64::from(self.current.width)).abs() > 1e-9
            || (self.current.active_height - f64::from(self.current.height)).abs() > 1e-9;
        let alpha_drop_pending = self.target.alpha != AlphaType::Straight;

        if !(colorspace_pending || resize_pending || alpha_drop_pending) {
            return Ok(());
        }

        log::debug!("builder pass 1: alpha unstraighten (premultiply)");
        self.ensure_float()?;
        self.ensure_444()?;
        self.convert_plane(
            3,
            PixelFormat {
                pixel_type: PixelType::F32,
                depth: 32,
                full_range: true,
                chroma: false,
                ycgco: false,
            },
        )?;

        for &p in Self::active_planes(self.current.color) {
            let Some(color_ref) = self.plane_ids[p as usize] else { continue };
            let alpha_ref = self.require(3)?;
            let (w, h) = self.plane_dims(p);
            let filter: Rc<dyn Filter> = Rc::new(PremultiplyFilter::new(w, h));
            let node = self
                .graph
                .add_filter(filter, vec![color_ref, alpha_ref], 1);
            self.plane_ids[p as usize] = Some(PlaneRef { node, slot: 0 });
        }
        self.current.alpha = AlphaType::Premultiplied;
        Ok(())
    }

    /// Pass 2: joint 3-plane colorspace/transfer conversion.
    fn pass2_colorspace(&mut self) -> Result<()> {
        if self.colorspace_equal() {
            return Ok(());
        }
        log::debug!(
            "builder pass 2: colorspace {:?} -> {:?}",
            self.current.colorspace,
            self.target.colorspace
        );
        self.ensure_float()?;
        self.ensure_444()?;

        if self.current.color == ColorFamily::Grey {
            let luma = self.require(0)?;
            self.plane_ids[1] = Some(luma);
            self.plane_ids[2] = Some(luma);
            self.current.color = ColorFamily::Rgb;
            self.current.colorspace.matrix = MatrixCoefficients::Rgb;
        }

        let inputs = vec![self.require(0)?, self.require(1)?, self.require(2)?];
        let filter = kernel::build_kernel(
            KernelSpec::Colorspace {
                width: self.current.width,
                height: self.current.height,
                from: self.current.colorspace,
                to: self.target.colorspace,
                peak_luminance: self.params.peak_luminance,
            },
            self.math,
        )?;
        let filter: Rc<dyn Filter> = Rc::from(filter);
        let node = self.graph.add_filter(filter, inputs, 0b0111);
        self.plane_ids[0] = Some(PlaneRef { node, slot: 0 });
        self.plane_ids[1] = Some(PlaneRef { node, slot: 1 });
        self.plane_ids[2] = Some(PlaneRef { node, slot: 2 });

        self.current.colorspace = self.target.colorspace;
        self.current.color = if self.target.color == ColorFamily::Grey {
            ColorFamily::Yuv
        } else {
            self.target.color
        };
        Ok(())
    }

    /// Pass 3: drop chroma planes when heading to greyscale.
    fn pass3_chroma_discard(&mut self) {
        if self.current.color != ColorFamily::Grey && self.target.color == ColorFamily::Grey {
            log::debug!("builder pass 3: chroma discard");
            self.plane_ids[1] = None;
            self.plane_ids[2] = None;
            self.current.color = ColorFamily::Grey;
            self.current.subsample_w = 0;
            self.current.subsample_h = 0;
        }
    }

    fn resize_cost(&self) -> (bool, f64, f64) {
        let xscale = f64::from(self.target.width) / f64::from(self.current.width);
        let yscale = f64::from(self.target.height) / f64::from(self.current.height);
        let h_first_cost = xscale.max(1.0) * 2.0 + xscale * yscale.max(1.0);
        let v_first_cost = yscale.max(1.0) + yscale * xscale.max(1.0) * 2.0;
        (h_first_cost <= v_first_cost, xscale, yscale)
    }

    fn luma_shift(&self) -> f64 {
        let ratio = f64::from(self.current.height) / f64::from(self.target.height);
        match self.current.parity {
            FieldParity::Progressive => 0.0,
            FieldParity::Top => 0.25 * ratio - 0.25,
            FieldParity::Bottom => -(0.25 * ratio) + 0.25,
        }
    }

    fn chroma_extra_shift_w(&self, src_dim: u32, dst_dim: u32) -> f64 {
        let mut extra = 0.0;
        if self.current.subsample_w > 0 {
            extra -= (1.0 / f64::from(1u32 << self.current.subsample_w))
                * chroma_shift_w(self.current.chroma_location_w);
        }
        if self.target.subsample_w > 0 {
            extra += (1.0 / f64::from(1u32 << self.current.subsample_w))
                * chroma_shift_w(self.target.chroma_location_w)
                * f64::from(src_dim)
                / f64::from(dst_dim);
        }
        extra
    }

    fn chroma_extra_shift_h(&self, src_dim: u32, dst_dim: u32) -> f64 {
        let mut extra = 0.0;
        if self.current.subsample_h > 0 {
            extra -= (1.0 / f64::from(1u32 << self.current.subsample_h))
                * chroma_shift_h(self.current.chroma_location_h, self.current.parity);
        }
        if self.target.subsample_h > 0 {
            extra += (1.0 / f64::from(1u32 << self.current.subsample_h))
                * chroma_shift_h(self.target.chroma_location_h, self.target.parity)
                * f64::from(src_dim)
                / f64::from(dst_dim);
        }
        extra
    }

    fn resize_pixel_type(&self) -> PixelType {
        match (self.current.pixel_type, self.target.pixel_type) {
            (PixelType::U8, _) => PixelType::U16,
            (_, PixelType::F16) => PixelType::F32,
            (_, t) => t,
        }
    }

    fn apply_resize_axis(
        &mut self,
        plane: u8,
        axis: ResizeAxis,
        src_dim: u32,
        cross_dim: u32,
        dst_dim: u32,
        shift: f64,
        subwidth: f64,
        kind: ResizeKind,
    ) -> Result<()> {
        let ty = self.resize_pixel_type();
        let filter = kernel::build_kernel(
            KernelSpec::Resize {
                axis,
                src_dim,
                cross_dim,
                dst_dim,
                shift,
                subwidth,
                pixel_type: ty,
                kind,
            },
            self.math,
        )?;
        let filter: Rc<dyn Filter> = Rc::from(filter);
        let input = self.require(plane)?;
        let node = self.graph.add_filter(filter, vec![input], 1);
        self.plane_ids[plane as usize] = Some(PlaneRef { node, slot: 0 });
        Ok(())
    }

    /// Pass 4: spatial resize (and active-window materialization).
    fn resize_pass(&mut self) -> Result<()> {
        let spatial_pending = self.current.width != self.target.width
            || self.current.height != self.target.height;
        let subsample_pending = self.current.color == ColorFamily::Yuv
            && (self.current.subsample_w != self.target.subsample_w
                || self.current.subsample_h != self.target.subsample_h);
        let window_pending = self.current.active_left != 0.0
            || self.current.active_top != 0.0
            || (self.current.active_width - f64::from(self.current.width)).abs() > 1e-9
            || (self.current.active_height - f64::from(self.current.height)).abs() > 1e-9;

        if !(spatial_pending || subsample_pending || window_pending) {
            return Ok(());
        }
        log::debug!("builder pass 4: resize");

        if self.resize_pixel_type() != self.current.pixel_type {
            let ty = self.resize_pixel_type();
            self.set_color_format(ty, ty.max_depth(), true)?;
        }

        let (h_first, _, _) = self.resize_cost();
        let target_w = self.target.width;
        let target_h = self.target.height;
        let luma_shift = self.luma_shift();
        let active_left = self.current.active_left;
        let active_top = self.current.active_top;
        let active_width = self.current.active_width;
        let active_height = self.current.active_height;
        let src_w = self.current.width;
        let src_h = self.current.height;
        let resize_filter = self.params.resize_filter;

        // `cross_dim` for whichever axis runs second must reflect the plane's
        // dimension along the OTHER axis as it stands after the first axis
        // has already run, not the original source dimension (zimg's
        // `ResizeConversion::create`, `original_source/src/zimg/resize/resize.cpp`:
        // the h-first branch chains src_height -> dst_height for stage two,
        // the v-first branch chains src_width -> dst_width for stage two).
        if h_first {
            if src_w != target_w || active_left != 0.0 || (active_width - f64::from(src_w)).abs() > 1e-9 {
                self.apply_resize_axis(
                    0,
                    ResizeAxis::Horizontal,
                    src_w,
                    src_h,
                    target_w,
                    active_left,
                    active_width,
                    resize_filter,
                )?;
            }
            if src_h != target_h || active_top != 0.0 || (active_height - f64::from(src_h)).abs() > 1e-9 {
                self.apply_resize_axis(
                    0,
                    ResizeAxis::Vertical,
                    src_h,
                    target_w,
                    target_h,
                    luma_shift + active_top,
                    active_height,
                    resize_filter,
                )?;
            }
        } else {
            if src_h != target_h || active_top != 0.0 || (active_height - f64::from(src_h)).abs() > 1e-9 {
                self.apply_resize_axis(
                    0,
                    ResizeAxis::Vertical,
                    src_h,
                    src_w,
                    target_h,
                    luma_shift + active_top,
                    active_height,
                    resize_filter,
                )?;
            }
            if src_w != target_w || active_left != 0.0 || (active_width - f64::from(src_w)).abs() > 1e-9 {
                self.apply_resize_axis(
                    0,
                    ResizeAxis::Horizontal,
                    src_w,
                    target_h,
                    target_w,
                    active_left,
                    active_width,
                    resize_filter,
                )?;
            }
        }

        if self.current.color == ColorFamily::Yuv {
            let target_cw = self.target.width >> self.target.subsample_w;
            let target_ch = self.target.height >> self.target.subsample_h;
            for &p in &[1u8, 2u8] {
                if self.plane_ids[p as usize].is_none() {
                    continue;
                }
                let (src_cw, src_ch) = self.plane_dims(p);
                let extra_w = self.chroma_extra_shift_w(src_cw, target_cw);
                let extra_h = self.chroma_extra_shift_h(src_ch, target_ch);
                self.apply_resize_axis(
                    p,
                    ResizeAxis::Horizontal,
                    src_cw,
                    src_ch,
                    target_cw,
                    extra_w,
                    f64::from(src_cw),
                    self.params.resize_filter_chroma,
                )?;
                self.apply_resize_axis(
                    p,
                    ResizeAxis::Vertical,
                    src_ch,
                    target_cw,
                    target_ch,
                    extra_h,
                    f64::from(src_ch),
                    self.params.resize_filter_chroma,
                )?;
            }
        }

        if self.plane_ids[3].is_some() {
            self.apply_resize_axis(
                3,
                ResizeAxis::Horizontal,
                src_w,
                src_h,
                target_w,
                active_left,
                active_width,
                self.params.resize_filter,
            )?;
            self.apply_resize_axis(
                3,
                ResizeAxis::Vertical,
                src_h,
                target_w,
                target_h,
                active_top,
                active_height,
                self.params.resize_filter,
            )?;
        }

        self.current.width = target_w;
        self.current.height = target_h;
        self.current.subsample_w = self.target.subsample_w;
        self.current.subsample_h = self.target.subsample_h;
        self.current.active_left = 0.0;
        self.current.active_top = 0.0;
        self.current.active_width = f64::from(target_w);
        self.current.active_height = f64::from(target_h);
        Ok(())
    }

    /// Pass 5: depth/range conversion.
    fn pass5_depth(&mut self) -> Result<()> {
        if self.current.pixel_type != self.target.pixel_type
            || self.current.depth != self.target.depth
            || self.current.full_range != self.target.full_range
        {
            log::debug!("builder pass 5: depth/range conversion");
            self.set_color_format(
                self.target.pixel_type,
                self.target.depth,
                self.target.full_range,
            )?;
        }
        if self.plane_ids[3].is_some() {
            self.convert_plane(
                3,
                PixelFormat {
                    pixel_type: self.target.pixel_type,
                    depth: self.target.depth,
                    full_range: true,
                    chroma: false,
                    ycgco: false,
                },
            )?;
        }
        Ok(())
    }

    /// Pass 6: synthesize missing chroma when greyscale source feeds a
    /// color target.
    fn pass6_add_fake_chroma(&mut self) -> Result<()> {
        if self.current.color != ColorFamily::Grey || self.target.color == ColorFamily::Grey {
            return Ok(());
        }
        log::debug!("builder pass 6: add fake chroma ({:?})", self.target.color);
        if self.target.color == ColorFamily::Rgb {
            let luma = self.require(0)?;
            self.plane_ids[1] = Some(luma);
            self.plane_ids[2] = Some(luma);
            self.current.color = ColorFamily::Rgb;
            self.current.colorspace.matrix = MatrixCoefficients::Rgb;
        } else {
            let value = FillValue::mid_grey(self.current.pixel_type, self.current.depth);
            for &p in &[1u8, 2u8] {
                let (w, h) = (
                    self.target.width >> self.target.subsample_w,
                    self.target.height >> self.target.subsample_h,
                );
                let filter: Rc<dyn Filter> =
                    Rc::new(ValueInitializeFilter::new(w, h, self.current.pixel_type, value));
                let node = self.graph.add_filter(filter, vec![], 1);
                self.plane_ids[p as usize] = Some(PlaneRef { node, slot: 0 });
            }
            self.current.color = ColorFamily::Yuv;
            self.current.subsample_w = self.target.subsample_w;
            self.current.subsample_h = self.target.subsample_h;
        }
        Ok(())
    }

    /// Pass 7: unpremultiply when the target wants straight alpha back.
    fn pass7_alpha_restraighten(&mut self) -> Result<()> {
        if self.current.alpha != AlphaType::Premultiplied || self.target.alpha != AlphaType::Straight
        {
            return Ok(());
        }
        log::debug!("builder pass 7: alpha restraighten (unpremultiply)");
        self.ensure_float()?;
        for &p in Self::active_planes(self.current.color) {
            let Some(color_ref) = self.plane_ids[p as usize] else { continue };
            let alpha_ref = self.require(3)?;
            let (w, h) = self.plane_dims(p);
            let filter: Rc<dyn Filter> = Rc::new(UnpremultiplyFilter::new(w, h));
            let node = self
                .graph
                .add_filter(filter, vec![color_ref, alpha_ref], 1);
            self.plane_ids[p as usize] = Some(PlaneRef { node, slot: 0 });
        }
        self.current.alpha = AlphaType::Straight;
        Ok(())
    }

    /// Pass 8: synthesize an opaque alpha plane if the target wants alpha
    /// and the source never had one.
    fn pass8_add_opaque_alpha(&mut self) -> Result<()> {
        if self.target.alpha == AlphaType::None || self.plane_ids[3].is_some() {
            return Ok(());
        }
        log::debug!("builder pass 8: add opaque alpha");
        let value = FillValue::opaque_alpha(self.target.pixel_type, self.target.depth);
        let filter: Rc<dyn Filter> = Rc::new(ValueInitializeFilter::new(
            self.current.width,
            self.current.height,
            self.target.pixel_type,
            value,
        ));
        let node = self.graph.add_filter(filter, vec![], 1);
        self.plane_ids[3] = Some(PlaneRef { node, slot: 0 });
        self.current.alpha = self.target.alpha;
        Ok(())
    }
}

fn add_source_plane(
    graph: &mut Graph,
    plane: u8,
    width: u32,
    height: u32,
    pixel_type: PixelType,
) -> PlaneRef {
    let node: NodeId = graph.add_source(plane, width, height, pixel_type);
    PlaneRef { node, slot: plane }
}

/// Plans and completes a [`Graph`] converting `source` into `target` under
/// `params` (spec.md §6). Validates both descriptors first; every other
/// error this function returns comes from a kernel the planner asked for
/// that the reference factory could not build.
pub fn build_graph(source: ImageState, target: ImageState, params: BuildParams) -> Result<Graph> {
    source.validate()?;
    target.validate()?;
    if source.parity != FieldParity::Progressive
        && target.parity != FieldParity::Progressive
        && source.parity != target.parity
    {
        return Err(Error::NoFieldParityConversion);
    }

    let mut graph = Graph::new(source.width, target.width, target.subsample_w);
    let mut plane_ids: [Option<PlaneRef>; 4] = [None; 4];

    plane_ids[0] = Some(add_source_plane(
        &mut graph,
        0,
        source.width,
        source.height,
        source.pixel_type,
    ));
    if source.color != ColorFamily::Grey {
        plane_ids[1] = Some(add_source_plane(
            &mut graph,
            1,
            source.chroma_width(),
            source.chroma_height(),
            source.pixel_type,
        ));
        plane_ids[2] = Some(add_source_plane(
            &mut graph,
            2,
            source.chroma_width(),
            source.chroma_height(),
            source.pixel_type,
        ));
    }
    if source.alpha != AlphaType::None {
        plane_ids[3] = Some(add_source_plane(
            &mut graph,
            3,
            source.width,
            source.height,
            source.pixel_type,
        ));
    }

    let mut builder = Builder {
        graph,
        current: source,
        target,
        source_color: source.color,
        plane_ids,
        params,
        math: MathOps::DEFAULT,
    };

    builder.pass1_alpha_unstraighten()?;
    builder.pass2_colorspace()?;
    builder.pass3_chroma_discard();
    builder.resize_pass()?;
    builder.pass5_depth()?;
    builder.pass6_add_fake_chroma()?;
    builder.pass7_alpha_restraighten()?;
    builder.pass8_add_opaque_alpha()?;

    if builder.current.color != target.color
        || builder.current.pixel_type != target.pixel_type
        || builder.current.depth != target.depth
        || builder.current.alpha != target.alpha
    {
        return Err(crate::error::internal_error(
            "builder passes did not converge to the target image state",
        ));
    }

    let mut sink = [None; 4];
    sink[0] = builder.plane_ids[0];
    if target.color != ColorFamily::Grey {
        sink[1] = builder.plane_ids[1];
        sink[2] = builder.plane_ids[2];
    }
    if target.alpha != AlphaType::None {
        sink[3] = builder.plane_ids[3];
    }
    builder.graph.set_sink(sink);
    builder.graph.complete()?;
    Ok(builder.graph)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{ColorPrimaries, TransferCharacteristics};

    fn yuv420_8bit(width: u32, height: u32) -> ImageState {
        ImageState {
            width,
            height,
            pixel_type: PixelType::U8,
            depth: 8,
            full_range: false,
            color: ColorFamily::Yuv,
            colorspace: ColorspaceDefinition {
                matrix: MatrixCoefficients::Rec709,
                transfer: TransferCharacteristics::Rec709,
                primaries: ColorPrimaries::Rec709,
            },
            subsample_w: 1,
            subsample_h: 1,
            parity: FieldParity::Progressive,
            chroma_location_w: ChromaLocationW::Left,
            chroma_location_h: ChromaLocationH::Center,
            active_left: 0.0,
            active_top: 0.0,
            active_width: f64::from(width),
            active_height: f64::from(height),
            alpha: AlphaType::None,
        }
    }

    #[test]
    fn identity_conversion_builds_minimal_graph() {
        let state = yuv420_8bit(16, 16);
        let graph = build_graph(state, state, BuildParams::default()).unwrap();
        assert_eq!(graph.input_buffering(), graph.output_buffering());
    }

    #[test]
    fn greyscale_to_yuv_adds_fake_chroma() {
        let mut grey = yuv420_8bit(16, 16);
        grey.color = ColorFamily::Grey;
        grey.subsample_w = 0;
        grey.subsample_h = 0;
        grey.colorspace.matrix = MatrixCoefficients::Unspecified;
        let target = yuv420_8bit(16, 16);
        let graph = build_graph(grey, target, BuildParams::default()).unwrap();
        assert!(graph.tmp_size() > 0);
    }

    #[test]
    fn resize_changes_output_dimensions() {
        let source = yuv420_8bit(16, 16);
        let target = yuv420_8bit(32, 32);
        let graph = build_graph(source, target, BuildParams::default()).unwrap();
        assert!(graph.tmp_size() > 0);
    }

    #[test]
    fn adds_opaque_alpha_when_target_wants_it() {
        let source = yuv420_8bit(16, 16);
        let mut target = yuv420_8bit(16, 16);
        target.alpha = AlphaType::Straight;
        let graph = build_graph(source, target, BuildParams::default()).unwrap();
        assert!(graph.output_buffering() >= 1);
    }

    #[test]
    fn mismatched_parity_rejected() {
        let mut source = yuv420_8bit(16, 16);
        source.parity = FieldParity::Top;
        let mut target = yuv420_8bit(16, 16);
        target.parity = FieldParity::Bottom;
        let err = build_graph(source, target, BuildParams::default()).unwrap_err();
        assert_eq!(err, Error::NoFieldParityConversion);
    }
}
