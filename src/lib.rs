// Copyright 2019 Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

//! `pixgraph` is a streaming image-format conversion library. It plans a
//! directed acyclic graph of per-plane filters (colorspace matrix/transfer,
//! depth/dither, horizontal/vertical resampling, alpha premultiply, plane
//! initialization, copies) converting a source [`ImageState`] into a target
//! `ImageState`, then executes that graph line by line over a bounded
//! circular line-buffer cache so an image of arbitrary height converts with
//! working memory proportional to filter support rather than image size.
//!
//! The three pieces of the crate, in dependency order:
//!
//! - [`pixel`]/[`format`]: the pixel and image descriptor model.
//! - [`buffer`]: the circular per-plane line buffer every filter and cache
//!   is addressed through.
//! - [`filter`]: the abstract per-plane streaming contract planner and
//!   engine cooperate through, without either knowing filter internals.
//! - [`kernel`]: the "kernel factory" producing concrete resize/depth/
//!   colorspace filter instances (spec's SIMD kernel bodies are out of
//!   scope; this ships a portable reference factory instead).
//! - [`filters`]: the kernel-independent filters (copy, fill, premultiply).
//! - [`graph`]: the DAG engine — simulation, allocation, tiled execution.
//! - [`builder`]: the planner that synthesizes a [`graph::Graph`] from two
//!   `ImageState`s.
//!
//! Entry points: [`builder::build_graph`] plans a graph; [`graph::Graph::process`]
//! executes it.

pub mod arena;
pub mod buffer;
pub mod builder;
pub mod error;
pub mod filter;
pub mod filters;
pub mod format;
pub mod graph;
pub mod kernel;
pub mod node;
pub mod pixel;

pub use builder::{build_graph, BuildParams, CpuHint};
pub use buffer::{LineBuffer, PlaneBuffers, ALL_ONES};
pub use error::{Error, Result};
pub use format::{
    AlphaType, ChromaLocationH, ChromaLocationW, ColorFamily, ColorPrimaries, ColorspaceDefinition,
    FieldParity, ImageState, MatrixCoefficients, PixelFormat, TransferCharacteristics,
};
pub use graph::{Graph, PackCb, UnpackCb};
pub use kernel::{DitherType, ResizeKind};
pub use pixel::PixelType;
