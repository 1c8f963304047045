// Copyright 2019 Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

//! Integration tests for the boundary scenarios of spec.md §8. Hash-based
//! output validation (SHA-1 fixtures) is explicitly out of this crate's
//! scope (spec.md §1); these tests assert byte-exact / numerically-close
//! equality directly instead of against stored digests.

use pixgraph::{
    build_graph, AlphaType, BuildParams, ChromaLocationH, ChromaLocationW, ColorFamily,
    ColorPrimaries, ColorspaceDefinition, Error, FieldParity, ImageState, LineBuffer,
    MatrixCoefficients, PixelType, PlaneBuffers, ResizeKind, TransferCharacteristics, ALL_ONES,
};

fn rec709() -> ColorspaceDefinition {
    ColorspaceDefinition {
        matrix: MatrixCoefficients::Rec709,
        transfer: TransferCharacteristics::Rec709,
        primaries: ColorPrimaries::Rec709,
    }
}

fn grey_u8(width: u32, height: u32, full_range: bool) -> ImageState {
    ImageState {
        width,
        height,
        pixel_type: PixelType::U8,
        depth: 8,
        full_range,
        color: ColorFamily::Grey,
        colorspace: ColorspaceDefinition {
            matrix: MatrixCoefficients::Unspecified,
            ..rec709()
        },
        subsample_w: 0,
        subsample_h: 0,
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

fn yuv420_u8(width: u32, height: u32) -> ImageState {
    ImageState {
        width,
        height,
        pixel_type: PixelType::U8,
        depth: 8,
        full_range: false,
        color: ColorFamily::Yuv,
        colorspace: rec709(),
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

fn rgb_u8(width: u32, height: u32, alpha: AlphaType) -> ImageState {
    ImageState {
        width,
        height,
        pixel_type: PixelType::U8,
        depth: 8,
        full_range: true,
        color: ColorFamily::Rgb,
        colorspace: ColorspaceDefinition {
            matrix: MatrixCoefficients::Rgb,
            ..rec709()
        },
        subsample_w: 0,
        subsample_h: 0,
        parity: FieldParity::Progressive,
        chroma_location_w: ChromaLocationW::Left,
        chroma_location_h: ChromaLocationH::Center,
        active_left: 0.0,
        active_top: 0.0,
        active_width: f64::from(width),
        active_height: f64::from(height),
        alpha,
    }
}

fn view(data: &[u8], stride: u32) -> LineBuffer<*const u8> {
    unsafe { LineBuffer::<*const u8>::new(data.as_ptr(), stride as isize, ALL_ONES) }
}

fn view_mut(data: &mut [u8], stride: u32) -> LineBuffer<*mut u8> {
    unsafe { LineBuffer::<*mut u8>::new(data.as_mut_ptr(), stride as isize, ALL_ONES) }
}

/// Scenario 1: noop, single greyscale plane, byte-exact.
#[test]
fn scenario_1_grey_noop_is_byte_exact() {
    let state = grey_u8(64, 48, false);
    let graph = build_graph(state, state, BuildParams::default()).unwrap();

    let src: Vec<u8> = (0..64 * 48).map(|i| (i % 256) as u8).collect();
    let mut dst = vec![0u8; src.len()];

    let src_planes = PlaneBuffers::new([Some(view(&src, 64)), None, None, None]);
    let dst_planes = PlaneBuffers::new([Some(view_mut(&mut dst, 64)), None, None, None]);
    let mut tmp = vec![0u8; graph.tmp_size() as usize];
    graph
        .process(&src_planes, &dst_planes, &mut tmp, None, None)
        .unwrap();

    assert_eq!(src, dst);
}

/// Scenario 2: subsampled noop, each YUV 4:2:0 plane byte-exact.
#[test]
fn scenario_2_yuv420_noop_is_byte_exact_per_plane() {
    let state = yuv420_u8(64, 48);
    let graph = build_graph(state, state, BuildParams::default()).unwrap();

    let y: Vec<u8> = (0..64 * 48).map(|i| (i % 256) as u8).collect();
    let u: Vec<u8> = (0..32 * 24).map(|i| (i * 3 % 256) as u8).collect();
    let v: Vec<u8> = (0..32 * 24).map(|i| (i * 7 % 256) as u8).collect();
    let mut dy = vec![0u8; y.len()];
    let mut du = vec![0u8; u.len()];
    let mut dv = vec![0u8; v.len()];

    let src_planes = PlaneBuffers::new([
        Some(view(&y, 64)),
        Some(view(&u, 32)),
        Some(view(&v, 32)),
        None,
    ]);
    let dst_planes = PlaneBuffers::new([
        Some(view_mut(&mut dy, 64)),
        Some(view_mut(&mut du, 32)),
        Some(view_mut(&mut dv, 32)),
        None,
    ]);
    let mut tmp = vec![0u8; graph.tmp_size() as usize];
    graph
        .process(&src_planes, &dst_planes, &mut tmp, None, None)
        .unwrap();

    assert_eq!(y, dy);
    assert_eq!(u, du);
    assert_eq!(v, dv);
}

/// Scenario 3: horizontal upscale U8 -> U8 drives the resize through a
/// WORD (U16) intermediate; verified indirectly by checking the resize
/// actually interpolates (middle columns are not simply duplicated edge
/// values) and output width doubles exactly.
#[test]
fn scenario_3_horizontal_upscale_interpolates() {
    let source = grey_u8(4, 2, true);
    let mut target = source;
    target.width = 8;
    target.active_width = 8.0;

    let params = BuildParams {
        resize_filter: ResizeKind::Bicubic { b: 0.0, c: 0.5 },
        ..BuildParams::default()
    };
    let graph = build_graph(source, target, params).unwrap();

    let src: Vec<u8> = vec![0, 0, 255, 255, 0, 0, 255, 255];
    let mut dst = vec![0u8; 16];
    let src_planes = PlaneBuffers::new([Some(view(&src, 4)), None, None, None]);
    let dst_planes = PlaneBuffers::new([Some(view_mut(&mut dst, 8)), None, None, None]);
    let mut tmp = vec![0u8; graph.tmp_size() as usize];
    graph
        .process(&src_planes, &dst_planes, &mut tmp, None, None)
        .unwrap();

    // A pure nearest-neighbor duplication would repeat every input sample
    // twice; a real resampler blends across the 0->255 edge instead.
    let duplicated: Vec<u8> = src.iter().flat_map(|&v| [v, v]).collect();
    assert_ne!(dst, duplicated);
}

/// Scenario 4: 4:2:0 Left/Bottom chroma location resized up to 4:4:4 is
/// representable and produces plausible (finite, in-range) output; the
/// exact shift arithmetic is unit-tested directly against
/// `pixgraph::builder`'s private helpers in `src/builder.rs`.
#[test]
fn scenario_4_chroma_location_shift_builds_and_runs() {
    let mut source = yuv420_u8(64, 48);
    source.chroma_location_w = ChromaLocationW::Left;
    source.chroma_location_h = ChromaLocationH::Bottom;
    let mut target = source;
    target.subsample_w = 0;
    target.subsample_h = 0;

    let params = BuildParams {
        resize_filter_chroma: ResizeKind::Bilinear,
        ..BuildParams::default()
    };
    let graph = build_graph(source, target, params).unwrap();

    let y = vec![128u8; 64 * 48];
    let u = vec![100u8; 32 * 24];
    let v = vec![150u8; 32 * 24];
    let mut dy = vec![0u8; 64 * 48];
    let mut du = vec![0u8; 64 * 48];
    let mut dv = vec![0u8; 64 * 48];

    let src_planes = PlaneBuffers::new([
        Some(view(&y, 64)),
        Some(view(&u, 32)),
        Some(view(&v, 32)),
        None,
    ]);
    let dst_planes = PlaneBuffers::new([
        Some(view_mut(&mut dy, 64)),
        Some(view_mut(&mut du, 64)),
        Some(view_mut(&mut dv, 64)),
        None,
    ]);
    let mut tmp = vec![0u8; graph.tmp_size() as usize];
    graph
        .process(&src_planes, &dst_planes, &mut tmp, None, None)
        .unwrap();

    // A constant source plane must upsample to a (near-)constant plane.
    assert!(du.iter().all(|&v| (v as i32 - 100).abs() <= 2));
    assert!(dv.iter().all(|&v| (v as i32 - 150).abs() <= 2));
}

/// Scenario 5: straight alpha with a resize forces premultiply before and
/// unpremultiply after, so a fully-opaque image's colors survive the
/// round trip (premultiply-by-1 is the identity regardless of the
/// preserved unclamped-alpha quirk, spec.md §9).
#[test]
fn scenario_5_straight_alpha_with_resize_preserves_opaque_colors() {
    let source = rgb_u8(4, 4, AlphaType::Straight);
    let mut target = source;
    target.width = 8;
    target.height = 8;
    target.active_width = 8.0;
    target.active_height = 8.0;

    let graph = build_graph(source, target, BuildParams::default()).unwrap();
    assert!(graph.tmp_size() > 0);

    let n_src = 16;
    let r = vec![200u8; n_src];
    let g = vec![100u8; n_src];
    let b = vec![50u8; n_src];
    let a = vec![255u8; n_src]; // fully opaque
    let n_dst = 64;
    let mut dr = vec![0u8; n_dst];
    let mut dg = vec![0u8; n_dst];
    let mut db = vec![0u8; n_dst];
    let mut da = vec![0u8; n_dst];

    let src_planes = PlaneBuffers::new([
        Some(view(&r, 4)),
        Some(view(&g, 4)),
        Some(view(&b, 4)),
        Some(view(&a, 4)),
    ]);
    let dst_planes = PlaneBuffers::new([
        Some(view_mut(&mut dr, 8)),
        Some(view_mut(&mut dg, 8)),
        Some(view_mut(&mut db, 8)),
        Some(view_mut(&mut da, 8)),
    ]);
    let mut tmp = vec![0u8; graph.tmp_size() as usize];
    graph
        .process(&src_planes, &dst_planes, &mut tmp, None, None)
        .unwrap();

    assert!(dr.iter().all(|&v| (v as i32 - 200).abs() <= 2));
    assert!(dg.iter().all(|&v| (v as i32 - 100).abs() <= 2));
    assert!(db.iter().all(|&v| (v as i32 - 50).abs() <= 2));
    assert!(da.iter().all(|&v| v >= 253));
}

/// Scenario 6: an `unpack_cb` that fails on the very first row aborts the
/// whole `process` call with `UserCallbackFailed`, and no write past the
/// point of cancellation reaches the destination.
#[test]
fn scenario_6_unpack_cancellation_aborts_and_preserves_destination() {
    let source = grey_u8(16, 16, true);
    let mut target = source;
    target.width = 32;
    target.active_width = 32.0;
    let graph = build_graph(source, target, BuildParams::default()).unwrap();

    let src = vec![42u8; 16 * 16];
    let sentinel = 0xAAu8;
    let mut dst = vec![sentinel; 32 * 16];

    let src_planes = PlaneBuffers::new([Some(view(&src, 16)), None, None, None]);
    let dst_planes = PlaneBuffers::new([Some(view_mut(&mut dst, 32)), None, None, None]);
    let mut tmp = vec![0u8; graph.tmp_size() as usize];

    let mut unpack = |_plane: u8, row: u32, _l: u32, _r: u32| -> i32 {
        if row == 0 {
            1
        } else {
            0
        }
    };
    let result = graph.process(
        &src_planes,
        &dst_planes,
        &mut tmp,
        Some(&mut unpack),
        None,
    );
    assert_eq!(result, Err(Error::UserCallbackFailed));
    assert!(dst.iter().all(|&b| b == sentinel));
}

/// Invariant 4: `build_graph(s, s, default)` is a plain memcpy of every
/// populated plane.
#[test]
fn round_trip_identity_for_rgb_with_alpha() {
    let state = rgb_u8(8, 6, AlphaType::Straight);
    let graph = build_graph(state, state, BuildParams::default()).unwrap();

    let n = 8 * 6;
    let r: Vec<u8> = (0..n).map(|i| (i * 13 % 256) as u8).collect();
    let g: Vec<u8> = (0..n).map(|i| (i * 29 % 256) as u8).collect();
    let b: Vec<u8> = (0..n).map(|i| (i * 53 % 256) as u8).collect();
    let a: Vec<u8> = (0..n).map(|i| (i * 7 % 256) as u8).collect();
    let (mut dr, mut dg, mut db, mut da) = (
        vec![0u8; n],
        vec![0u8; n],
        vec![0u8; n],
        vec![0u8; n],
    );

    let src_planes = PlaneBuffers::new([
        Some(view(&r, 8)),
        Some(view(&g, 8)),
        Some(view(&b, 8)),
        Some(view(&a, 8)),
    ]);
    let dst_planes = PlaneBuffers::new([
        Some(view_mut(&mut dr, 8)),
        Some(view_mut(&mut dg, 8)),
        Some(view_mut(&mut db, 8)),
        Some(view_mut(&mut da, 8)),
    ]);
    let mut tmp = vec![0u8; graph.tmp_size() as usize];
    graph
        .process(&src_planes, &dst_planes, &mut tmp, None, None)
        .unwrap();

    assert_eq!(r, dr);
    assert_eq!(g, dg);
    assert_eq!(b, db);
    assert_eq!(a, da);
}

/// Invariant 6: building the same `(source, target, params)` twice
/// produces graphs with identical scheduling outcomes.
#[test]
fn build_graph_is_deterministic() {
    let source = yuv420_u8(64, 32);
    let mut target = source;
    target.width = 96;
    target.height = 48;
    target.active_width = 96.0;
    target.active_height = 48.0;

    let g1 = build_graph(source, target, BuildParams::default()).unwrap();
    let g2 = build_graph(source, target, BuildParams::default()).unwrap();

    assert_eq!(g1.tmp_size(), g2.tmp_size());
    assert_eq!(g1.input_buffering(), g2.input_buffering());
    assert_eq!(g1.output_buffering(), g2.output_buffering());
    assert_eq!(g1.is_planar(), g2.is_planar());
}

/// Resize with an identical spec is a no-op (spec.md §8 round-trip laws).
#[test]
fn resize_with_identical_spec_is_noop() {
    let state = grey_u8(32, 24, true);
    let graph = build_graph(state, state, BuildParams::default()).unwrap();
    assert_eq!(graph.output_buffering(), 1);
}

/// Mismatched interlaced parities have no registered conversion.
#[test]
fn mismatched_field_parity_is_rejected() {
    let mut source = grey_u8(16, 16, true);
    source.parity = FieldParity::Top;
    let mut target = grey_u8(16, 16, true);
    target.parity = FieldParity::Bottom;
    let err = build_graph(source, target, BuildParams::default()).unwrap_err();
    assert_eq!(err, Error::NoFieldParityConversion);
}

/// Property check: a greyscale identity graph run over a randomly-filled
/// buffer is a byte-exact copy regardless of the random seed, i.e. the
/// round-trip-identity invariant (spec.md §8 invariant 4) does not depend
/// on any particular fixture data.
#[test]
fn identity_round_trip_holds_for_random_buffers() {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    for seed in [0u64, 1, 42, 1337, 0xDEAD_BEEF] {
        let mut rng = StdRng::seed_from_u64(seed);
        let state = grey_u8(48, 32, true);
        let graph = build_graph(state, state, BuildParams::default()).unwrap();

        let src: Vec<u8> = (0..48 * 32).map(|_| rng.gen()).collect();
        let mut dst = vec![0u8; src.len()];
        let src_planes = PlaneBuffers::new([Some(view(&src, 48)), None, None, None]);
        let dst_planes = PlaneBuffers::new([Some(view_mut(&mut dst, 48)), None, None, None]);
        let mut tmp = vec![0u8; graph.tmp_size() as usize];
        graph
            .process(&src_planes, &dst_planes, &mut tmp, None, None)
            .unwrap();

        assert_eq!(src, dst, "seed {seed} produced a non-identity copy");
    }
}

/// Combinatorial sweep: every `(ColorFamily, MatrixCoefficients)` pairing
/// either validates successfully or fails with the specific mismatch kind
/// spec.md §3 names, never with an unrelated error or a panic.
#[test]
fn color_family_matrix_combinations_validate_or_reject_precisely() {
    use itertools::iproduct;

    let families = [ColorFamily::Grey, ColorFamily::Rgb, ColorFamily::Yuv];
    let matrices = [
        MatrixCoefficients::Rgb,
        MatrixCoefficients::Unspecified,
        MatrixCoefficients::Rec601,
        MatrixCoefficients::Rec709,
        MatrixCoefficients::YCgCo,
    ];

    for (&color, &matrix) in iproduct!(&families, &matrices) {
        let mut state = grey_u8(16, 16, true);
        state.color = color;
        state.colorspace.matrix = matrix;
        if color != ColorFamily::Grey {
            state.subsample_w = 0;
            state.subsample_h = 0;
        }

        let result = state.validate();
        match (color, matrix) {
            (ColorFamily::Grey, MatrixCoefficients::Rgb) => {
                assert_eq!(result, Err(Error::ColorFamilyMismatch));
            }
            (ColorFamily::Rgb, m) if m != MatrixCoefficients::Rgb && m != MatrixCoefficients::Unspecified => {
                assert_eq!(result, Err(Error::ColorFamilyMismatch));
            }
            (ColorFamily::Yuv, MatrixCoefficients::Rgb) => {
                assert_eq!(result, Err(Error::ColorFamilyMismatch));
            }
            _ => {
                assert!(result.is_ok(), "{color:?}/{matrix:?} unexpectedly rejected: {result:?}");
            }
        }
    }
}
