// Copyright 2019 Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

//! Plane copy filters, grounded on zimg's `CopyFilter`/`CopyRectFilter`
//! (`graph/copy_filter.h`, `graph/simple_filters.h`).

use crate::buffer::LineBuffer;
use crate::filter::{Filter, FilterAttributes, FilterFlags, Range};
use crate::pixel::PixelType;

/// Copies an entire plane, row by row, unchanged. `in_place`-capable since
/// source and destination rows are identical in every respect.
pub struct CopyFilter {
    attr: FilterAttributes,
}

impl CopyFilter {
    /// Creates a copy filter producing `width x height` rows of `pixel_type`.
    #[must_use]
    pub fn new(width: u32, height: u32, pixel_type: PixelType) -> Self {
        CopyFilter {
            attr: FilterAttributes {
                width,
                height,
                pixel_type,
            },
        }
    }
}

impl Filter for CopyFilter {
    fn flags(&self) -> FilterFlags {
        FilterFlags {
            same_row: true,
            in_place: true,
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
        let bytes = self.attr.pixel_type.byte_size() as isize;
        let src = inputs[0].row_ptr(i).offset(left as isize * bytes);
        let dst = outputs[0].row_ptr(i).offset(left as isize * bytes);
        let n = (right - left) as usize * bytes as usize;
        if src as *const u8 != dst as *const u8 {
            std::ptr::copy(src, dst, n);
        }
    }
}

/// Copies a sub-rectangle `[left, left+width) x [top, top+height)` of a
/// larger source plane into a densely-packed destination plane. Used by the
/// planner wherever an active window narrower than the full plane must be
/// materialized, e.g. as the sole node of an identity graph over a cropped
/// active window.
pub struct CopyRectFilter {
    left: u32,
    top: u32,
    attr: FilterAttributes,
}

impl CopyRectFilter {
    /// Creates a filter copying the sub-rectangle at `(left, top)` of size
    /// `width x height`.
    #[must_use]
    pub fn new(left: u32, top: u32, width: u32, height: u32, pixel_type: PixelType) -> Self {
        CopyRectFilter {
            left,
            top,
            attr: FilterAttributes {
                width,
                height,
                pixel_type,
            },
        }
    }
}

impl Filter for CopyRectFilter {
    fn flags(&self) -> FilterFlags {
        FilterFlags {
            same_row: false,
            ..FilterFlags::default()
        }
    }

    fn attributes(&self) -> FilterAttributes {
        self.attr
    }

    fn row_deps(&self, i: u32) -> Range {
        (self.top + i, self.top + i + 1)
    }

    fn col_deps(&self, left: u32, right: u32) -> Range {
        (self.left + left, self.left + right)
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
        let bytes = self.attr.pixel_type.byte_size() as isize;
        let src_row = self.top + i;
        let src = inputs[0]
            .row_ptr(src_row)
            .offset((self.left + left) as isize * bytes);
        let dst = outputs[0].row_ptr(i).offset(left as isize * bytes);
        let n = (right - left) as usize * bytes as usize;
        std::ptr::copy(src, dst, n);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_filter_round_trips_bytes() {
        let filt = CopyFilter::new(4, 1, PixelType::U8);
        let src = [1u8, 2, 3, 4];
        let mut dst = [0u8; 4];
        let in_view = unsafe { LineBuffer::<*const u8>::new(src.as_ptr(), 4, crate::buffer::ALL_ONES) };
        let out_view = unsafe { LineBuffer::<*mut u8>::new(dst.as_mut_ptr(), 4, crate::buffer::ALL_ONES) };
        unsafe {
            filt.process(
                std::ptr::null_mut(),
                &[in_view],
                &[out_view],
                std::ptr::null_mut(),
                0,
                0,
                4,
            );
        }
        assert_eq!(dst, src);
    }

    #[test]
    fn copy_rect_filter_offsets_into_source() {
        let filt = CopyRectFilter::new(2, 1, 2, 1, PixelType::U8);
        assert_eq!(filt.row_deps(0), (1, 2));
        assert_eq!(filt.col_deps(0, 2), (2, 4));

        // 3 rows x 4 cols source plane.
        let src = [
            0u8, 0, 0, 0, //
            0, 0, 9, 8, //
            0, 0, 0, 0,
        ];
        let mut dst = [0u8; 2];
        let in_view = unsafe { LineBuffer::<*const u8>::new(src.as_ptr(), 4, crate::buffer::ALL_ONES) };
        let out_view = unsafe { LineBuffer::<*mut u8>::new(dst.as_mut_ptr(), 2, crate::buffer::ALL_ONES) };
        unsafe {
            filt.process(
                std::ptr::null_mut(),
                &[in_view],
                &[out_view],
                std::ptr::null_mut(),
                0,
                0,
                2,
            );
        }
        assert_eq!(dst, [9, 8]);
    }
}
