// Copyright 2026 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Plane-level pixel helpers shared by the video output pipeline: stride-respecting plane copies
//! and the 4:1:0 to 4:2:0 chroma upsampler used for formats a display sink cannot consume.

mod i410;

pub use i410::convert_i410_to_i420;
pub use i410::upsample_410_plane;
pub use i410::UpsampledPlane;

use remain::sorted;
use thiserror::Error as ThisError;

/// Read-only view of one image plane.
#[derive(Debug, Clone, Copy)]
pub struct PlaneRef<'a> {
    /// Pixel data, starting at the first byte of the first row.
    pub data: &'a [u8],
    /// Distance in bytes between the start of two consecutive rows.
    pub stride: usize,
    /// Number of meaningful bytes in each row.
    pub width: usize,
    /// Number of rows.
    pub lines: usize,
}

/// Writable view of one image plane.
#[derive(Debug)]
pub struct PlaneMut<'a> {
    pub data: &'a mut [u8],
    /// Distance in bytes between two rows. May exceed `width` when the owner pads rows for
    /// alignment.
    pub pitch: usize,
    pub width: usize,
    pub lines: usize,
}

impl<'a> PlaneRef<'a> {
    /// Returns row `y`, clipped to `width` bytes and to the available data.
    pub fn row(&self, y: usize) -> &'a [u8] {
        let start = (y * self.stride).min(self.data.len());
        let end = (start + self.width).min(self.data.len());
        &self.data[start..end]
    }

    /// Minimum number of bytes `data` must hold for every row to be complete.
    pub fn required_len(&self) -> usize {
        match self.lines {
            0 => 0,
            lines => (lines - 1) * self.stride + self.width,
        }
    }
}

#[sorted]
#[derive(Debug, ThisError, PartialEq, Eq)]
pub enum ConversionError {
    #[error("conversion needs {expected} planes, got {actual}")]
    PlaneCount { expected: usize, actual: usize },
    #[error("plane {plane} holds {actual} bytes, {expected} needed")]
    ShortPlane {
        plane: usize,
        expected: usize,
        actual: usize,
    },
}

/// Copies `src` into `dst` row by row.
///
/// Each row copies `min(src.stride, dst.pitch)` bytes, so any padding present in the source is
/// carried over as long as the destination has room for it. At most `min(src.lines, dst.lines)`
/// rows are written.
pub fn copy_plane(src: &PlaneRef, dst: &mut PlaneMut) {
    copy_rows(src.data, src.stride, dst, src.stride.min(dst.pitch), src.lines);
}

/// Copies `row_len` bytes of `lines` rows separated by `stride` bytes in `src` into `dst`,
/// clipping to the destination geometry.
pub(crate) fn copy_rows(
    src: &[u8],
    stride: usize,
    dst: &mut PlaneMut,
    row_len: usize,
    lines: usize,
) {
    if stride == 0 || dst.pitch == 0 {
        return;
    }

    let rows = lines.min(dst.lines);
    for (src_row, dst_row) in src
        .chunks(stride)
        .zip(dst.data.chunks_mut(dst.pitch))
        .take(rows)
    {
        let len = row_len.min(src_row.len()).min(dst_row.len());
        dst_row[..len].copy_from_slice(&src_row[..len]);
    }
}
