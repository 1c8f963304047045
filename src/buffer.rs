// Copyright 2019 Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

//! The circular per-plane line buffer shared by every filter, node cache,
//! and source/sink view in the graph.

use std::marker::PhantomData;

/// Value of `mask` that denotes "no wraparound": the buffer holds every row
/// of the plane and `row & mask == row` for any row in range.
pub const ALL_ONES: u32 = u32::MAX;

/// A read or write view over one plane's rows, addressed modulo a power of
/// two (or [`ALL_ONES`] for a full, non-wrapping image).
///
/// Row `i` lives at `base + (i & mask) * stride_bytes`. The same backing
/// storage may be viewed both as `LineBuffer<*const u8>` (inputs) and
/// `LineBuffer<*mut u8>` (outputs); the two constructors keep the const/mut
/// distinction at the type level so filters cannot accidentally write
/// through an immutable input view.
#[derive(Copy, Clone)]
pub struct LineBuffer<P> {
    base: P,
    /// Distance in bytes between logically consecutive stored rows.
    pub stride_bytes: isize,
    /// `capacity - 1` where `capacity` is a power of two, or [`ALL_ONES`].
    pub mask: u32,
}

/// Marker used to select the immutable flavor of [`LineBuffer`].
pub type ReadView<'a> = LineBuffer<*const u8>;
/// Marker used to select the mutable flavor of [`LineBuffer`].
pub type WriteView<'a> = LineBuffer<*mut u8>;

impl LineBuffer<*const u8> {
    /// Builds a read-only view over `base`, with the given row stride and
    /// circular-buffer mask.
    ///
    /// # Safety
    /// `base` must remain valid for reads of any row `i & mask` for the
    /// lifetime of this `LineBuffer`, at least `stride_bytes` long.
    pub unsafe fn new(base: *const u8, stride_bytes: isize, mask: u32) -> Self {
        LineBuffer {
            base,
            stride_bytes,
            mask,
        }
    }

    /// Slot index of row `i` within the circular buffer.
    #[must_use]
    pub fn slot(&self, i: u32) -> u32 {
        if self.mask == ALL_ONES {
            i
        } else {
            i & self.mask
        }
    }

    /// Pointer to the start of row `i`.
    #[must_use]
    pub fn row_ptr(&self, i: u32) -> *const u8 {
        // SAFETY: offset stays within the caller-guaranteed valid region;
        // see the safety contract of `new`.
        unsafe { self.base.offset(self.slot(i) as isize * self.stride_bytes) }
    }
}

impl LineBuffer<*mut u8> {
    /// Builds a writable view over `base`, with the given row stride and
    /// circular-buffer mask.
    ///
    /// # Safety
    /// `base` must remain valid for reads and writes of any row `i & mask`
    /// for the lifetime of this `LineBuffer`, at least `stride_bytes` long,
    /// and no other live view may alias the same rows mutably.
    pub unsafe fn new(base: *mut u8, stride_bytes: isize, mask: u32) -> Self {
        LineBuffer {
            base,
            stride_bytes,
            mask,
        }
    }

    /// Slot index of row `i` within the circular buffer.
    #[must_use]
    pub fn slot(&self, i: u32) -> u32 {
        if self.mask == ALL_ONES {
            i
        } else {
            i & self.mask
        }
    }

    /// Pointer to the start of row `i`.
    #[must_use]
    pub fn row_ptr(&self, i: u32) -> *mut u8 {
        // SAFETY: see `row_ptr` on the read view; mutability is upheld by
        // the safety contract of `new`.
        unsafe { self.base.offset(self.slot(i) as isize * self.stride_bytes) }
    }

    /// Reborrows this view as read-only, e.g. for a filter with `in_place`
    /// set that needs to read what it is about to overwrite.
    #[must_use]
    pub fn as_read(&self) -> LineBuffer<*const u8> {
        LineBuffer {
            base: self.base as *const u8,
            stride_bytes: self.stride_bytes,
            mask: self.mask,
        }
    }
}

/// Computes the smallest power of two `>= lines`, or [`ALL_ONES`] if the
/// caller asked for the entire plane (`lines >= total_plane_height`).
#[must_use]
pub fn mask_for(lines: u32, total_plane_height: u32) -> u32 {
    if lines >= total_plane_height {
        ALL_ONES
    } else {
        lines.max(1).next_power_of_two() - 1
    }
}

/// Up to four [`LineBuffer`] views (Y/U/V/A or R/G/B/A), as accepted by
/// [`crate::graph::Graph::process`] for both the source and the
/// destination image.
pub struct PlaneBuffers<'a, P> {
    planes: [Option<LineBuffer<P>>; 4],
    _marker: PhantomData<&'a ()>,
}

impl<'a, P: Copy> PlaneBuffers<'a, P> {
    /// Builds a `PlaneBuffers` from up to four optional plane views.
    #[must_use]
    pub fn new(planes: [Option<LineBuffer<P>>; 4]) -> Self {
        PlaneBuffers {
            planes,
            _marker: PhantomData,
        }
    }

    /// The view for plane id `id` (0=Y/G, 1=U/B, 2=V/R, 3=A), if active.
    #[must_use]
    pub fn plane(&self, id: usize) -> Option<&LineBuffer<P>> {
        self.planes.get(id).and_then(|p| p.as_ref())
    }
}
