// Copyright 2019 Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

//! Criterion benches over the graph's own boundary scenarios (spec.md §8),
//! in place of the teacher's raw pixel-format conversion benches: the
//! thing worth timing here is `Graph::process`, not the reference kernel
//! math (which spec.md places out of scope).

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

use pixgraph::{
    build_graph, AlphaType, BuildParams, ChromaLocationH, ChromaLocationW, ColorFamily,
    ColorPrimaries, ColorspaceDefinition, FieldParity, Graph, ImageState, LineBuffer,
    MatrixCoefficients, PixelType, PlaneBuffers, ResizeKind, TransferCharacteristics, ALL_ONES,
};

fn rec709() -> ColorspaceDefinition {
    ColorspaceDefinition {
        matrix: MatrixCoefficients::Rec709,
        transfer: TransferCharacteristics::Rec709,
        primaries: ColorPrimaries::Rec709,
    }
}

fn yuv420(width: u32, height: u32) -> ImageState {
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

fn view(data: &[u8], stride: u32) -> LineBuffer<*const u8> {
    unsafe { LineBuffer::<*const u8>::new(data.as_ptr(), stride as isize, ALL_ONES) }
}

fn view_mut(data: &mut [u8], stride: u32) -> LineBuffer<*mut u8> {
    unsafe { LineBuffer::<*mut u8>::new(data.as_mut_ptr(), stride as isize, ALL_ONES) }
}

fn run_once(graph: &Graph, width: u32, height: u32, cw: u32, ch: u32) {
    let y = vec![128u8; (width * height) as usize];
    let u = vec![128u8; (cw * ch) as usize];
    let v = vec![128u8; (cw * ch) as usize];
    let mut dy = vec![0u8; (width * height) as usize];
    let mut du = vec![0u8; (cw * ch) as usize];
    let mut dv = vec![0u8; (cw * ch) as usize];

    let src = PlaneBuffers::new([
        Some(view(&y, width)),
        Some(view(&u, cw)),
        Some(view(&v, cw)),
        None,
    ]);
    let dst = PlaneBuffers::new([
        Some(view_mut(&mut dy, width)),
        Some(view_mut(&mut du, cw)),
        Some(view_mut(&mut dv, cw)),
        None,
    ]);
    let mut tmp = vec![0u8; graph.tmp_size() as usize];
    graph.process(&src, &dst, &mut tmp, None, None).unwrap();
}

fn bench_noop(c: &mut Criterion) {
    let mut group = c.benchmark_group("noop_yuv420");
    for &size in &[256u32, 1024] {
        let state = yuv420(size, size);
        let graph = build_graph(state, state, BuildParams::default()).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter(|| run_once(&graph, size, size, size >> 1, size >> 1));
        });
    }
    group.finish();
}

fn bench_upscale(c: &mut Criterion) {
    let mut group = c.benchmark_group("upscale_2x_bicubic");
    for &size in &[256u32, 1024] {
        let source = yuv420(size, size);
        let target = yuv420(size * 2, size * 2);
        let params = BuildParams {
            resize_filter: ResizeKind::Bicubic { b: 0.0, c: 0.5 },
            resize_filter_chroma: ResizeKind::Bicubic { b: 0.0, c: 0.5 },
            ..BuildParams::default()
        };
        let graph = build_graph(source, target, params).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter(|| run_once(&graph, size * 2, size * 2, size, size));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_noop, bench_upscale);
criterion_main!(benches);
