// Copyright 2019 Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

//! The graph engine (spec.md §4.4): owns the node DAG, simulates cache
//! requirements, allocates per-call state out of a caller-supplied arena,
//! and drives execution tile by tile.

use std::cell::Cell;
use std::rc::Rc;

use crate::arena::Arena;
use crate::buffer::{self, LineBuffer, PlaneBuffers, ALL_ONES};
use crate::error::{internal_error, Error, Result};
use crate::filter::{check_entire_plane_buffering, check_flag_consistency, Filter, BUFFER_MAX};
use crate::kernel::SIMD_ALIGNMENT;
use crate::node::{Node, NodeId, NodeKind, PlaneRef};
use crate::pixel::PixelType;

/// Base tile width used by the horizontal tiling formula (spec.md §4.4.4).
const TILE_BASE: f64 = 512.0;
/// Column alignment the tiling formula rounds to, and the minimum tile
/// width below which a remainder is folded into the previous tile.
const TILE_ALIGN: u32 = 64;
const TILE_MIN: u32 = 64;

/// Per-row callback invoked by the engine immediately before a source row
/// is first read within a tile. `plane` is the absolute plane id (0=Y/G,
/// 1=U/B, 2=V/R, 3=A); `row` is in that plane's own row numbering (the
/// reduced rate for subsampled chroma, spec.md §5). Returns 0 to continue,
/// nonzero to abort the `process` call with [`Error::UserCallbackFailed`].
pub type UnpackCb<'a> = dyn FnMut(u8, u32, u32, u32) -> i32 + 'a;
/// Per-row callback invoked after all writes to a destination row within a
/// tile are complete. Same `(plane, row, left, right)` convention as
/// [`UnpackCb`].
pub type PackCb<'a> = dyn FnMut(u8, u32, u32, u32) -> i32 + 'a;

/// Per-node scheduling plan filled in by [`Graph::complete`]: how many
/// cache rows this node's buffer holds (only meaningful for nodes that own
/// their cache, i.e. `cache_id == self`) and the byte layout of that cache.
#[derive(Clone)]
struct NodeLayout {
    context_size: usize,
    cache_rows: u32,
    cache_mask: u32,
    cache_stride: usize,
    /// Plane ids (ascending) this node's cache holds, one contiguous
    /// `cache_rows * cache_stride`-byte region per plane, in this order.
    cache_planes: Vec<u8>,
}

impl NodeLayout {
    fn empty() -> Self {
        NodeLayout {
            context_size: 0,
            cache_rows: 0,
            cache_mask: 0,
            cache_stride: 0,
            cache_planes: Vec::new(),
        }
    }

    fn cache_bytes(&self) -> usize {
        self.cache_stride * self.cache_rows as usize * self.cache_planes.len()
    }
}

/// The per-plane filter DAG (spec.md §4.4.1). Built by [`crate::builder`],
/// then [`Graph::complete`]d once and reused for many [`Graph::process`]
/// calls.
pub struct Graph {
    nodes: Vec<Node>,
    sink: Option<[Option<PlaneRef>; 4]>,
    source_width: u32,
    sink_width: u32,
    /// `log2` of the sink's chroma subsampling factor along the column
    /// axis (`target.subsample_w`; 0 when the sink has no subsampled
    /// chroma planes). Used only to translate the luma-space tile column
    /// range computed by [`Graph::horizontal_tiles`] into plane 1/2's own
    /// narrower column space, mirroring zimg's `FilterGraph::m_subsample_w`
    /// shift applied when routing a tile to the chroma head node
    /// (`original_source/src/zimg/graph/filtergraph.cpp`).
    chroma_subsample_w: u32,
    completed: bool,
    planar: bool,
    layout: Vec<NodeLayout>,
    required_rows: Vec<u32>,
    scratch_size: usize,
    tmp_size: u64,
    input_buffering: u32,
    output_buffering: u32,
}

impl Graph {
    /// Creates an empty graph. `source_width`/`sink_width` are the luma
    /// (plane 0) widths of the source and target images, used only by the
    /// horizontal tiling cost model (spec.md §4.4.4); `chroma_subsample_w`
    /// is the sink's `target.subsample_w`, used to shift a luma-space tile
    /// column range down to plane 1/2's own column space.
    #[must_use]
    pub(crate) fn new(source_width: u32, sink_width: u32, chroma_subsample_w: u32) -> Self {
        Graph {
            nodes: Vec::new(),
            sink: None,
            source_width,
            sink_width,
            chroma_subsample_w,
            completed: false,
            planar: true,
            layout: Vec::new(),
            required_rows: Vec::new(),
            scratch_size: 0,
            tmp_size: 0,
            input_buffering: 1,
            output_buffering: 1,
        }
    }

    /// Appends a source node exposing plane `plane_id` of the caller's
    /// source buffer.
    pub(crate) fn add_source(
        &mut self,
        plane_id: u8,
        width: u32,
        height: u32,
        pixel_type: PixelType,
    ) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node::new(
            NodeKind::Source {
                plane_mask: 1 << plane_id,
                width,
                height,
                pixel_type,
            },
            id,
        ));
        id
    }

    /// Appends a filter node wrapping `filter`, reading `inputs` (ordered
    /// per the filter's input slots) and producing the planes named by
    /// `output_plane_mask` (bit `p` set means output slot, in ascending
    /// plane-id order, corresponds to plane `p`).
    pub(crate) fn add_filter(
        &mut self,
        filter: Rc<dyn Filter>,
        inputs: Vec<PlaneRef>,
        output_plane_mask: u8,
    ) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node::new(
            NodeKind::Filter {
                filter,
                inputs,
                output_plane_mask,
            },
            id,
        ));
        id
    }

    /// Registers the sink's per-plane producers. Called once by the
    /// builder after all passes have converged.
    pub(crate) fn set_sink(&mut self, inputs: [Option<PlaneRef>; 4]) {
        self.sink = Some(inputs);
    }

    fn consumers(&self) -> Vec<Vec<NodeId>> {
        let mut consumers = vec![Vec::new(); self.nodes.len()];
        for (idx, node) in self.nodes.iter().enumerate() {
            if let NodeKind::Filter { inputs, .. } = &node.kind {
                for pr in inputs {
                    consumers[pr.node.0].push(NodeId(idx));
                }
            }
        }
        if let Some(sink) = &self.sink {
            for pr in sink.iter().flatten() {
                consumers[pr.node.0].push(NodeId(usize::MAX)); // sentinel: the sink itself
            }
        }
        consumers
    }

    fn node_height(&self, id: NodeId) -> u32 {
        match &self.nodes[id.0].kind {
            NodeKind::Source { height, .. } => *height,
            NodeKind::Filter { filter, .. } => filter.attributes().height,
            NodeKind::Sink { .. } => 0,
        }
    }

    fn node_pixel_type(&self, id: NodeId) -> PixelType {
        match &self.nodes[id.0].kind {
            NodeKind::Source { pixel_type, .. } => *pixel_type,
            NodeKind::Filter { filter, .. } => filter.attributes().pixel_type,
            NodeKind::Sink { .. } => PixelType::U8,
        }
    }

    /// Computes, for every node, the number of rows of *its own* output
    /// that must be simultaneously resident so every consumer's
    /// `row_deps` window is satisfiable at the moment it is demanded.
    ///
    /// This is a conservative closed-form stand-in for the literal
    /// discrete-event simulation of spec.md §4.4.2 step 2: rather than
    /// walking the sink height one step at a time and tracking a live
    /// "furthest row needed" counter per node, it composes each direct
    /// consumer's own buffering window with that consumer's required span
    /// (minus the rows it has already consumed by the time it next
    /// advances), recursively. The two agree on any graph where row_deps
    /// windows grow monotonically with `i`, which holds for every filter
    /// in [`crate::kernel`] and [`crate::filters`].
    fn compute_required_rows(&self, consumers: &[Vec<NodeId>]) -> Vec<u32> {
        let n = self.nodes.len();
        let mut required = vec![1u32; n];
        for idx in (0..n).rev() {
            let mut span = 1u32;
            for &c in &consumers[idx] {
                if c.0 == usize::MAX {
                    // Consumed directly by the sink: one row at a time.
                    span = span.max(1);
                    continue;
                }
                if let NodeKind::Filter { filter, .. } = &self.nodes[c.0].kind {
                    let mb = filter.max_buffering();
                    if mb == BUFFER_MAX {
                        span = BUFFER_MAX;
                        continue;
                    }
                    let c_req = required[c.0];
                    let c_step = filter.step().max(1);
                    let extra = if c_req == BUFFER_MAX {
                        BUFFER_MAX
                    } else {
                        c_req.saturating_sub(c_step)
                    };
                    let total = if extra == BUFFER_MAX {
                        BUFFER_MAX
                    } else {
                        mb.saturating_add(extra)
                    };
                    span = span.max(total);
                }
            }
            required[idx] = span;
        }
        required
    }

    /// Runs the two-pass planning of spec.md §4.4.2 and validates the
    /// filter-contract consistency constraints of §4.3. Must be called
    /// exactly once before [`Graph::process`].
    pub fn complete(&mut self) -> Result<()> {
        if self.completed {
            return Ok(());
        }
        let sink = self
            .sink
            .ok_or_else(|| internal_error("graph completed with no sink registered"))?;

        // Flag consistency (spec.md §4.3).
        for node in &self.nodes {
            if let NodeKind::Filter { filter, .. } = &node.kind {
                let flags = filter.flags();
                check_flag_consistency(flags).map_err(internal_error)?;
                check_entire_plane_buffering(flags, filter.max_buffering(), filter.step())
                    .map_err(internal_error)?;
            }
        }

        // Reference counts, from the real plane-reference edges.
        for node in &self.nodes {
            if let NodeKind::Filter { inputs, .. } = &node.kind {
                for pr in inputs {
                    let n = self.nodes[pr.node.0].ref_count.get();
                    self.nodes[pr.node.0].ref_count.set(n + 1);
                }
            }
        }
        for pr in sink.iter().flatten() {
            let n = self.nodes[pr.node.0].ref_count.get();
            self.nodes[pr.node.0].ref_count.set(n + 1);
        }

        // Pass 1: in-place merging. A node may only be folded into its
        // parent's buffer if that parent is itself a filter (the source's
        // buffer is the caller's read-only view) and the parent has no
        // other consumer, since the parent's pre-filter value must not be
        // needed again once this node overwrites it in place.
        for idx in 0..self.nodes.len() {
            let (in_place, sole_parent) = match &self.nodes[idx].kind {
                NodeKind::Filter { filter, inputs, .. } => {
                    let flags = filter.flags();
                    let sole_parent = if inputs.len() == 1 {
                        Some(inputs[0].node)
                    } else if !inputs.is_empty() && inputs.iter().all(|p| p.node == inputs[0].node)
                    {
                        Some(inputs[0].node)
                    } else {
                        None
                    };
                    (flags.in_place, sole_parent)
                }
                _ => (false, None),
            };
            if !in_place {
                continue;
            }
            let Some(parent) = sole_parent else { continue };
            let parent_is_filter = matches!(self.nodes[parent.0].kind, NodeKind::Filter { .. });
            if !parent_is_filter || self.nodes[parent.0].ref_count.get() != 1 {
                continue;
            }
            let resolved = self.nodes[parent.0].cache_id.get();
            self.nodes[idx].cache_id.set(resolved);
        }

        // Planar-fast-path applicability (open question resolution,
        // spec.md §9): non-planar as soon as any node's input plane set
        // differs from its output plane set.
        self.planar = self.nodes.iter().all(|node| match &node.kind {
            NodeKind::Filter {
                inputs,
                output_plane_mask,
                ..
            } => {
                let input_mask = inputs.iter().fold(0u8, |m, pr| m | (1 << pr.slot));
                input_mask == *output_plane_mask
            }
            _ => true,
        });
        log::debug!(
            "graph planning: {} nodes, planar={}",
            self.nodes.len(),
            self.planar
        );

        // Pass 2: simulate required cache rows per node.
        let consumers = self.consumers();
        self.required_rows = self.compute_required_rows(&consumers);

        // Layout: context + cache size per node that owns its own cache.
        let mut layout = vec![NodeLayout::empty(); self.nodes.len()];
        let mut requests: Vec<(usize, usize)> = Vec::new();
        for idx in 0..self.nodes.len() {
            let NodeKind::Filter {
                filter,
                output_plane_mask,
                ..
            } = &self.nodes[idx].kind
            else {
                continue;
            };
            let context_size = filter.context_size();
            requests.push((context_size, SIMD_ALIGNMENT));

            if self.nodes[idx].cache_id.get() != NodeId(idx) {
                layout[idx].context_size = context_size;
                continue;
            }
            let height = filter.attributes().height;
            let required = self.required_rows[idx];
            let cache_mask = buffer::mask_for(required, height);
            let cache_rows = if cache_mask == ALL_ONES {
                height
            } else {
                cache_mask + 1
            };
            let byte_size = filter.attributes().pixel_type.byte_size() as usize;
            let width = filter.attributes().width as usize;
            let cache_stride = width * byte_size;
            let cache_planes: Vec<u8> = (0u8..4).filter(|p| output_plane_mask & (1 << p) != 0).collect();

            layout[idx] = NodeLayout {
                context_size,
                cache_rows,
                cache_mask,
                cache_stride,
                cache_planes,
            };
            requests.push((layout[idx].cache_bytes(), SIMD_ALIGNMENT));

            log::debug!(
                "node {idx}: cache_rows={cache_rows} mask={cache_mask:#x} planes={:?}",
                layout[idx].cache_planes
            );
        }

        // Shared scratch: the max of every filter's tmp_size at full width.
        let mut scratch_size = 0usize;
        for node in &self.nodes {
            if let NodeKind::Filter { filter, .. } = &node.kind {
                let w = filter.attributes().width;
                scratch_size = scratch_size.max(filter.tmp_size(0, w));
            }
        }
        requests.push((scratch_size, SIMD_ALIGNMENT));

        self.scratch_size = scratch_size;
        self.tmp_size = Arena::layout_size(requests) as u64;
        self.layout = layout;

        // input_buffering / output_buffering (spec.md §8 invariant 2 and
        // the external sizing hints of §6).
        self.input_buffering = self
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| matches!(n.kind, NodeKind::Source { .. }))
            .map(|(idx, _)| self.required_rows[idx])
            .max()
            .unwrap_or(1);
        self.output_buffering = sink
            .iter()
            .flatten()
            .map(|pr| match &self.nodes[pr.node.0].kind {
                NodeKind::Filter { filter, .. } => filter.max_buffering(),
                _ => 1,
            })
            .max()
            .unwrap_or(1);

        self.completed = true;
        Ok(())
    }

    /// Size in bytes of the `tmp` buffer [`Graph::process`] requires.
    #[must_use]
    pub fn tmp_size(&self) -> u64 {
        self.tmp_size
    }

    /// Maximum number of source rows of any one plane that may need to be
    /// simultaneously resident; informs how small a caller's own circular
    /// source buffer (refilled via `unpack_cb`) may be.
    #[must_use]
    pub fn input_buffering(&self) -> u32 {
        self.input_buffering
    }

    /// Maximum number of sink rows of any one plane held simultaneously by
    /// the node(s) feeding the sink; informs how small a caller's own
    /// circular destination buffer (drained via `pack_cb`) may be.
    #[must_use]
    pub fn output_buffering(&self) -> u32 {
        self.output_buffering
    }

    /// Whether every filter node's input and output plane sets coincide,
    /// i.e. the planar fast path of spec.md §4.4.2 step 3 applies. Exposed
    /// for diagnostics and tests; does not change `process`'s behavior in
    /// this implementation (see [`crate::graph`] module docs).
    #[must_use]
    pub fn is_planar(&self) -> bool {
        self.planar
    }

    fn arena_requests(&self) -> Vec<(usize, usize)> {
        let mut requests = Vec::new();
        for idx in 0..self.nodes.len() {
            if let NodeKind::Filter { .. } = &self.nodes[idx].kind {
                requests.push((self.layout[idx].context_size, SIMD_ALIGNMENT));
                if self.nodes[idx].cache_id.get() == NodeId(idx) {
                    requests.push((self.layout[idx].cache_bytes(), SIMD_ALIGNMENT));
                }
            }
        }
        requests.push((self.scratch_size, SIMD_ALIGNMENT));
        requests
    }

    fn horizontal_tiles(&self) -> Vec<(u32, u32)> {
        let width = self.sink_width;
        let entire = self.nodes.iter().any(|n| {
            matches!(&n.kind, NodeKind::Filter { filter, .. } if filter.flags().entire_row || filter.flags().entire_plane)
        });
        if entire || width == 0 {
            return vec![(0, width)];
        }
        let ratio = f64::from(width) / f64::from(self.source_width.max(1));
        let raw = TILE_BASE * ratio;
        let mut h_step = ((raw / f64::from(TILE_ALIGN)).round() as u32).max(1) * TILE_ALIGN;
        h_step = h_step.clamp(TILE_ALIGN, width);

        let mut tiles = Vec::new();
        let mut left = 0u32;
        while left < width {
            let mut right = (left + h_step).min(width);
            if width - right < TILE_MIN && right < width {
                right = width;
            }
            tiles.push((left, right));
            left = right;
        }
        tiles
    }

    /// Executes the graph once: reads `src`, writes `dst`, using `tmp` as
    /// scratch/cache storage (must be at least [`Graph::tmp_size`] bytes).
    pub fn process(
        &self,
        src: &PlaneBuffers<*const u8>,
        dst: &PlaneBuffers<*mut u8>,
        tmp: &mut [u8],
        mut unpack_cb: Option<&mut UnpackCb<'_>>,
        mut pack_cb: Option<&mut PackCb<'_>>,
    ) -> Result<()> {
        if !self.completed {
            return Err(internal_error("process called before complete()"));
        }
        if (tmp.len() as u64) < self.tmp_size {
            return Err(Error::OutOfMemory);
        }

        let mut arena = Arena::new(tmp);
        let mut ctx_ptrs = vec![std::ptr::null_mut::<u8>(); self.nodes.len()];
        let mut cache_ptrs = vec![None; self.nodes.len()];
        for idx in 0..self.nodes.len() {
            if let NodeKind::Filter { .. } = &self.nodes[idx].kind {
                let ctx = arena.alloc(self.layout[idx].context_size, SIMD_ALIGNMENT)?;
                ctx_ptrs[idx] = ctx.as_mut_ptr();
                if self.nodes[idx].cache_id.get() == NodeId(idx) {
                    let bytes = self.layout[idx].cache_bytes();
                    let cache = arena.alloc(bytes, SIMD_ALIGNMENT)?;
                    cache_ptrs[idx] = Some(cache.as_mut_ptr());
                }
            }
        }
        let scratch = arena.alloc(self.scratch_size, SIMD_ALIGNMENT)?;
        debug_assert_eq!(arena.used() as u64, self.tmp_size);

        for (tile_left, tile_right) in self.horizontal_tiles() {
            for idx in 0..self.nodes.len() {
                if let NodeKind::Filter { filter, .. } = &self.nodes[idx].kind {
                    // SAFETY: ctx_ptrs[idx] points to context_size() bytes
                    // reserved for this node above.
                    unsafe { filter.init_context(ctx_ptrs[idx]) };
                }
            }
            let mut exec = Exec {
                graph: self,
                ctx_ptrs: &ctx_ptrs,
                cache_ptrs: &cache_ptrs,
                scratch: scratch.as_mut_ptr(),
                cursors: vec![Cell::new(0u32); self.nodes.len()],
                src,
                dst,
                tile_left,
                tile_right,
                unpack_cb: unpack_cb.as_deref_mut(),
                pack_cb: pack_cb.as_deref_mut(),
            };
            exec.run()?;
        }
        Ok(())
    }
}

/// Transient per-`process`-call execution state; rebuilt (cursors reset)
/// for every tile per spec.md §4.4.3.
struct Exec<'a> {
    graph: &'a Graph,
    ctx_ptrs: &'a [*mut u8],
    cache_ptrs: &'a [Option<*mut u8>],
    scratch: *mut u8,
    cursors: Vec<Cell<u32>>,
    src: &'a PlaneBuffers<'a, *const u8>,
    dst: &'a PlaneBuffers<'a, *mut u8>,
    tile_left: u32,
    tile_right: u32,
    unpack_cb: Option<&'a mut UnpackCb<'a>>,
    pack_cb: Option<&'a mut PackCb<'a>>,
}

impl<'a> Exec<'a> {
    fn owner(&self, id: NodeId) -> NodeId {
        self.graph.nodes[id.0].cache_id.get()
    }

    /// The tile's column range in `plane_id`'s own column space: unchanged
    /// for luma/alpha (planes 0/3), shifted right by the sink's
    /// `chroma_subsample_w` for chroma (planes 1/2). Every node feeding a
    /// given sink plane shares that plane's column space end to end (the
    /// builder only ever joins differently-subsampled planes after first
    /// resampling them to a common resolution, spec.md §4.5.1 pass 2/4), so
    /// a single shift computed at the top of each plane's pipeline is valid
    /// for every node demanded underneath it.
    fn plane_cols(&self, plane_id: u8) -> (u32, u32) {
        if plane_id == 1 || plane_id == 2 {
            let shift = self.graph.chroma_subsample_w;
            (self.tile_left >> shift, self.tile_right >> shift)
        } else {
            (self.tile_left, self.tile_right)
        }
    }

    /// Read view of plane `r.slot`, produced by node `r.node` (resolved
    /// through any in-place merge), in the node's own row numbering.
    fn read_view(&self, r: PlaneRef) -> Result<LineBuffer<*const u8>> {
        match &self.graph.nodes[r.node.0].kind {
            NodeKind::Source { .. } => self
                .src
                .plane(r.slot as usize)
                .copied()
                .ok_or_else(|| internal_error("source plane view missing")),
            NodeKind::Filter { .. } => {
                let owner = self.owner(r.node);
                let layout = &self.graph.layout[owner.0];
                let base = self.cache_ptrs[owner.0]
                    .ok_or_else(|| internal_error("filter node has no cache allocated"))?;
                let plane_index = layout
                    .cache_planes
                    .iter()
                    .position(|&p| p == r.slot)
                    .ok_or_else(|| internal_error("plane not present in owner's cache"))?;
                let plane_base = unsafe { base.add(plane_index * layout.cache_stride * layout.cache_rows as usize) };
                Ok(unsafe {
                    LineBuffer::<*const u8>::new(plane_base, layout.cache_stride as isize, layout.cache_mask)
                })
            }
            NodeKind::Sink { .. } => Err(internal_error("sink cannot be read from")),
        }
    }

    fn write_view(&self, owner: NodeId, plane_id: u8) -> Result<LineBuffer<*mut u8>> {
        let layout = &self.graph.layout[owner.0];
        let base = self.cache_ptrs[owner.0]
            .ok_or_else(|| internal_error("filter node has no cache allocated"))?;
        let plane_index = layout
            .cache_planes
            .iter()
            .position(|&p| p == plane_id)
            .ok_or_else(|| internal_error("plane not present in owner's cache"))?;
        let plane_base = unsafe { base.add(plane_index * layout.cache_stride * layout.cache_rows as usize) };
        Ok(unsafe { LineBuffer::<*mut u8>::new(plane_base, layout.cache_stride as isize, layout.cache_mask) })
    }

    /// Ensures rows `0..=row` of node `id`'s own output are resident,
    /// recursively demanding whatever its inputs need first.
    fn demand(&mut self, id: NodeId, row: u32, cols: (u32, u32)) -> Result<()> {
        match &self.graph.nodes[id.0].kind {
            NodeKind::Source { plane_mask, .. } => {
                let plane_id = plane_mask.trailing_zeros() as u8;
                let (left, right) = cols;
                let mut cur = self.cursors[id.0].get();
                while cur <= row {
                    if let Some(cb) = self.unpack_cb.as_deref_mut() {
                        if cb(plane_id, cur, left, right) != 0 {
                            log::warn!("unpack_cb failed at plane {plane_id} row {cur}");
                            return Err(Error::UserCallbackFailed);
                        }
                    }
                    cur += 1;
                }
                self.cursors[id.0].set(cur);
                Ok(())
            }
            NodeKind::Filter { filter, inputs, .. } => {
                let flags = filter.flags();
                if flags.entire_plane {
                    if self.cursors[id.0].get() == 0 {
                        let full_height = filter.attributes().height.saturating_sub(1);
                        let inputs = inputs.clone();
                        for inp in &inputs {
                            self.demand(inp.node, full_height, cols)?;
                        }
                        self.run_filter(id, 0, cols)?;
                        self.cursors[id.0].set(filter.attributes().height);
                    }
                    return Ok(());
                }
                let step = filter.step().max(1);
                let mut cur = self.cursors[id.0].get();
                let inputs = inputs.clone();
                while cur <= row {
                    let (_, last) = filter.row_deps(cur);
                    let need = last.saturating_sub(1);
                    for inp in &inputs {
                        self.demand(inp.node, need, cols)?;
                    }
                    self.run_filter(id, cur, cols)?;
                    cur += step;
                }
                self.cursors[id.0].set(cur);
                Ok(())
            }
            NodeKind::Sink { .. } => Err(internal_error("sink node cannot be demanded")),
        }
    }

    fn run_filter(&self, id: NodeId, row: u32, cols: (u32, u32)) -> Result<()> {
        let NodeKind::Filter {
            filter,
            inputs,
            output_plane_mask,
        } = &self.graph.nodes[id.0].kind
        else {
            return Err(internal_error("run_filter called on non-filter node"));
        };
        let input_views: Result<Vec<_>> = inputs.iter().map(|r| self.read_view(*r)).collect();
        let input_views = input_views?;
        let owner = self.owner(id);
        let output_views: Result<Vec<_>> = (0u8..4)
            .filter(|p| output_plane_mask & (1 << p) != 0)
            .map(|p| self.write_view(owner, p))
            .collect();
        let output_views = output_views?;
        let (left, right) = cols;

        // SAFETY: ctx_ptrs[id] holds context_size() bytes (reserved and
        // `init_context`-ed per tile in `Graph::process`); the cache views
        // above were sized by the same layout computed in `complete`, and
        // `row_deps`/`col_deps` of every input were demanded beforehand by
        // `demand`, so every row this call reads is resident.
        unsafe {
            filter.process(
                self.ctx_ptrs[id.0],
                &input_views,
                &output_views,
                self.scratch,
                row,
                left,
                right,
            );
        }
        Ok(())
    }

    fn emit_pack(&mut self, plane_id: u8, producer: PlaneRef, row: u32) -> Result<()> {
        let cols = self.plane_cols(plane_id);
        self.demand(producer.node, row, cols)?;
        let src_view = self.read_view(producer)?;
        let dst_view = *self
            .dst
            .plane(plane_id as usize)
            .ok_or_else(|| internal_error("destination plane view missing"))?;
        let byte_size = self.graph.node_pixel_type(producer.node).byte_size() as isize;
        let (tile_left, tile_right) = cols;
        let left = tile_left as isize;
        let n = (tile_right - tile_left) as usize * byte_size as usize;
        unsafe {
            let src = src_view.row_ptr(row).offset(left * byte_size);
            let dst = dst_view.row_ptr(row).offset(left * byte_size);
            std::ptr::copy_nonoverlapping(src, dst, n);
        }
        if let Some(cb) = self.pack_cb.as_deref_mut() {
            if cb(plane_id, row, tile_left, tile_right) != 0 {
                log::warn!("pack_cb failed at plane {plane_id} row {row}");
                return Err(Error::UserCallbackFailed);
            }
        }
        Ok(())
    }

    fn run(&mut self) -> Result<()> {
        let Some(sink) = self.graph.sink else {
            return Err(internal_error("exec run with no sink"));
        };
        let luma_height = sink
            .get(0)
            .and_then(|o| *o)
            .map(|pr| self.graph.node_height(pr.node))
            .or_else(|| sink.get(3).and_then(|o| *o).map(|pr| self.graph.node_height(pr.node)))
            .unwrap_or(0);
        let chroma_height = sink
            .get(1)
            .and_then(|o| *o)
            .map(|pr| self.graph.node_height(pr.node));
        let group_step = match chroma_height {
            Some(ch) if ch > 0 && luma_height > 0 => (luma_height / ch).max(1),
            _ => 1,
        };

        let mut y = 0u32;
        while y < luma_height {
            let rows_in_group = group_step.min(luma_height - y);
            for plane_id in [0u8, 3u8] {
                if let Some(pr) = sink[plane_id as usize] {
                    for r in y..y + rows_in_group {
                        self.emit_pack(plane_id, pr, r)?;
                    }
                }
            }
            let crow = y / group_step;
            for plane_id in [1u8, 2u8] {
                if let Some(pr) = sink[plane_id as usize] {
                    self.emit_pack(plane_id, pr, crow)?;
                }
            }
            y += rows_in_group;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::CopyFilter;

    fn build_identity_graph(width: u32, height: u32) -> Graph {
        let mut g = Graph::new(width, width, 0);
        let src = g.add_source(0, width, height, PixelType::U8);
        let copy: Rc<dyn Filter> = Rc::new(CopyFilter::new(width, height, PixelType::U8));
        let f = g.add_filter(copy, vec![PlaneRef { node: src, slot: 0 }], 0b0001);
        let mut sink = [None; 4];
        sink[0] = Some(PlaneRef { node: f, slot: 0 });
        g.set_sink(sink);
        g.complete().unwrap();
        g
    }

    #[test]
    fn identity_graph_reports_minimal_buffering() {
        let g = build_identity_graph(16, 16);
        assert_eq!(g.output_buffering(), 1);
        assert!(g.tmp_size() > 0);
    }

    #[test]
    fn identity_graph_copies_bytes_exactly() {
        let width = 8u32;
        let height = 4u32;
        let g = build_identity_graph(width, height);

        let src_data: Vec<u8> = (0..width * height).map(|i| (i % 251) as u8).collect();
        let mut dst_data = vec![0u8; (width * height) as usize];

        let src_view = unsafe { LineBuffer::<*const u8>::new(src_data.as_ptr(), width as isize, ALL_ONES) };
        let dst_view = unsafe { LineBuffer::<*mut u8>::new(dst_data.as_mut_ptr(), width as isize, ALL_ONES) };

        let src_planes = PlaneBuffers::new([Some(src_view), None, None, None]);
        let dst_planes = PlaneBuffers::new([Some(dst_view), None, None, None]);

        let mut tmp = vec![0u8; g.tmp_size() as usize];
        g.process(&src_planes, &dst_planes, &mut tmp, None, None).unwrap();

        assert_eq!(src_data, dst_data);
    }

    #[test]
    fn callback_cancellation_stops_without_corrupting_later_rows() {
        let width = 4u32;
        let height = 4u32;
        let g = build_identity_graph(width, height);

        let src_data: Vec<u8> = (0..width * height).map(|i| i as u8).collect();
        let mut dst_data = vec![0xFFu8; (width * height) as usize];

        let src_view = unsafe { LineBuffer::<*const u8>::new(src_data.as_ptr(), width as isize, ALL_ONES) };
        let dst_view = unsafe { LineBuffer::<*mut u8>::new(dst_data.as_mut_ptr(), width as isize, ALL_ONES) };

        let src_planes = PlaneBuffers::new([Some(src_view), None, None, None]);
        let dst_planes = PlaneBuffers::new([Some(dst_view), None, None, None]);

        let mut tmp = vec![0u8; g.tmp_size() as usize];
        let mut unpack = |_plane: u8, row: u32, _l: u32, _r: u32| -> i32 {
            if row == 0 {
                1
            } else {
                0
            }
        };
        let result = g.process(&src_planes, &dst_planes, &mut tmp, Some(&mut unpack), None);
        assert_eq!(result, Err(Error::UserCallbackFailed));
    }

    #[test]
    fn required_rows_are_one_for_same_row_chain() {
        let g = build_identity_graph(4, 4);
        // The sole filter node (index 1) has exactly one consumer (the
        // sink) demanding one row at a time, and itself has max_buffering
        // 1, so it should need only a single resident row.
        assert_eq!(g.required_rows[1], 1);
    }
}
