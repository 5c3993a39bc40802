// Copyright 2026 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Quantizer-driven deblocking and deringing of decoded pictures.
//!
//! Block-based codecs leave visible discontinuities on 8x8 block boundaries and ripples around
//! sharp edges when coarsely quantized. The filters here use the quantizer of each macroblock to
//! tell coding artifacts (small steps, weaker than the quantizer) from real picture content.

use bitflags::bitflags;
use chroma::PlaneMut;

use crate::format::Chroma;
use crate::sink::FrameBuffer;

bitflags! {
    /// Post-processing filters to run.
    ///
    /// `_H` filters smooth along rows, across vertical block edges; `_V` filters smooth along
    /// columns, across horizontal block edges.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PostProcMode: u32 {
        const DEBLOCK_LUMA_H = 1 << 0;
        const DEBLOCK_LUMA_V = 1 << 1;
        const DEBLOCK_CHROMA_H = 1 << 2;
        const DEBLOCK_CHROMA_V = 1 << 3;
        const DERING_LUMA = 1 << 4;
        const DERING_CHROMA = 1 << 5;
        /// Lower the filter level while the decoder is running late.
        const AUTO_LEVEL = 1 << 6;
    }
}

impl PostProcMode {
    /// Filters enabled by a quality level, each level adding one filter.
    pub fn for_quality(quality: u32, auto: bool) -> Self {
        const LEVELS: [PostProcMode; 6] = [
            PostProcMode::DEBLOCK_LUMA_H,
            PostProcMode::DEBLOCK_LUMA_V,
            PostProcMode::DEBLOCK_CHROMA_H,
            PostProcMode::DEBLOCK_CHROMA_V,
            PostProcMode::DERING_LUMA,
            PostProcMode::DERING_CHROMA,
        ];

        let mut mode = LEVELS
            .iter()
            .take(quality as usize)
            .fold(PostProcMode::empty(), |mode, &level| mode | level);
        mode.set(PostProcMode::AUTO_LEVEL, auto);
        mode
    }

    fn filters(self) -> PostProcMode {
        self - PostProcMode::AUTO_LEVEL
    }
}

/// Per-macroblock quantizer values of the last decoded picture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuantTable {
    pub mb_width: usize,
    pub mb_height: usize,
    /// Distance between two rows of `values`.
    pub stride: usize,
    pub values: Vec<u8>,
}

impl QuantTable {
    /// A table with the same quantizer for every macroblock.
    pub fn uniform(mb_width: usize, mb_height: usize, quantizer: u8) -> Self {
        QuantTable {
            mb_width,
            mb_height,
            stride: mb_width,
            values: vec![quantizer; mb_width * mb_height],
        }
    }

    /// Quantizer of macroblock (`mb_x`, `mb_y`), clamped to the table bounds. Zero disables
    /// filtering.
    pub fn at(&self, mb_x: usize, mb_y: usize) -> u8 {
        if self.mb_width == 0 || self.mb_height == 0 {
            return 0;
        }
        let x = mb_x.min(self.mb_width - 1);
        let y = mb_y.min(self.mb_height - 1);
        self.values.get(y * self.stride + x).copied().unwrap_or(0)
    }
}

const BLOCK: usize = 8;

/// Filters a picture in place.
pub struct PostProcessor {
    mode: PostProcMode,
}

impl PostProcessor {
    pub fn new(mode: PostProcMode) -> Self {
        PostProcessor { mode }
    }

    pub fn disabled() -> Self {
        Self::new(PostProcMode::empty())
    }

    pub fn mode(&self) -> PostProcMode {
        self.mode
    }

    pub fn is_active(&self) -> bool {
        !self.mode.filters().is_empty()
    }

    /// Filters `buffer`, laid out as `chroma`, using `quant`.
    ///
    /// Only planar 4:2:0 buffers are filtered, and only when quantizers are available. Returns
    /// whether anything ran.
    pub fn apply(
        &self,
        buffer: &FrameBuffer,
        chroma: Chroma,
        quant: Option<&QuantTable>,
        late: bool,
    ) -> bool {
        let quant = match quant {
            Some(quant) => quant,
            None => return false,
        };
        if !self.is_active() || !chroma.is_planar_420() {
            return false;
        }

        let mut mode = self.mode.filters();
        if late && self.mode.contains(PostProcMode::AUTO_LEVEL) {
            mode -= PostProcMode::DERING_LUMA | PostProcMode::DERING_CHROMA;
        }

        buffer.with_planes_mut(|planes| {
            for (index, plane) in planes.iter_mut().enumerate().take(3) {
                let (mb_size, deblock_h, deblock_v, dering) = if index == 0 {
                    (
                        16,
                        PostProcMode::DEBLOCK_LUMA_H,
                        PostProcMode::DEBLOCK_LUMA_V,
                        PostProcMode::DERING_LUMA,
                    )
                } else {
                    (
                        8,
                        PostProcMode::DEBLOCK_CHROMA_H,
                        PostProcMode::DEBLOCK_CHROMA_V,
                        PostProcMode::DERING_CHROMA,
                    )
                };
                let qp = |x: usize, y: usize| i32::from(quant.at(x / mb_size, y / mb_size));

                if mode.contains(deblock_h) {
                    deblock_rows(plane, &qp);
                }
                if mode.contains(deblock_v) {
                    deblock_columns(plane, &qp);
                }
                if mode.contains(dering) {
                    dering_blocks(plane, &qp);
                }
            }
        });
        true
    }
}

/// Smooths the step between `p0` and `q0` if it is small enough to be a blocking artifact.
fn filter_edge(data: &mut [u8], [p1, p0, q0, q1]: [usize; 4], qp: i32) {
    if qp == 0 {
        return;
    }
    let (vp1, vp0, vq0, vq1) = (
        i32::from(data[p1]),
        i32::from(data[p0]),
        i32::from(data[q0]),
        i32::from(data[q1]),
    );
    if (vp0 - vq0).abs() >= 2 * qp || (vp1 - vp0).abs() >= qp || (vq1 - vq0).abs() >= qp {
        return;
    }
    let delta = (((vq0 - vp0) * 4 + (vp1 - vq1) + 4) >> 3).clamp(-qp, qp);
    data[p0] = (vp0 + delta).clamp(0, 255) as u8;
    data[q0] = (vq0 - delta).clamp(0, 255) as u8;
}

fn deblock_rows(plane: &mut PlaneMut, qp: &impl Fn(usize, usize) -> i32) {
    for y in 0..plane.lines {
        let base = y * plane.pitch;
        for x in (BLOCK..plane.width.saturating_sub(1)).step_by(BLOCK) {
            if base + x + 1 >= plane.data.len() {
                return;
            }
            let i = base + x;
            filter_edge(plane.data, [i - 2, i - 1, i, i + 1], qp(x, y));
        }
    }
}

fn deblock_columns(plane: &mut PlaneMut, qp: &impl Fn(usize, usize) -> i32) {
    let pitch = plane.pitch;
    for y in (BLOCK..plane.lines.saturating_sub(1)).step_by(BLOCK) {
        for x in 0..plane.width {
            let i = y * pitch + x;
            if i + pitch >= plane.data.len() {
                return;
            }
            filter_edge(
                plane.data,
                [i - 2 * pitch, i - pitch, i, i + pitch],
                qp(x, y),
            );
        }
    }
}

/// Smooths ripples inside each 8x8 block.
///
/// Block samples are split in two classes by the mid value of the block; every interior sample
/// is replaced by the mean of its 3x3 neighbours of the same class, moved by at most the
/// quantizer. Flat blocks are left alone.
fn dering_blocks(plane: &mut PlaneMut, qp: &impl Fn(usize, usize) -> i32) {
    let pitch = plane.pitch;
    for by in (0..plane.lines).step_by(BLOCK) {
        for bx in (0..plane.width).step_by(BLOCK) {
            let w = BLOCK.min(plane.width - bx);
            let h = BLOCK.min(plane.lines - by);
            let q = qp(bx, by);
            if q == 0 || w < 3 || h < 3 || (by + h - 1) * pitch + bx + w > plane.data.len() {
                continue;
            }

            let mut block = [[0i32; BLOCK]; BLOCK];
            for (y, row) in block.iter_mut().enumerate().take(h) {
                let start = (by + y) * pitch + bx;
                for (x, v) in row.iter_mut().enumerate().take(w) {
                    *v = i32::from(plane.data[start + x]);
                }
            }

            let samples = block.iter().take(h).flat_map(|row| row.iter().take(w));
            let (min, max) = samples.fold((255, 0), |(min, max), &v| (v.min(min), v.max(max)));
            if max - min < 2 {
                continue;
            }
            let threshold = (max + min + 1) / 2;

            for y in 1..h - 1 {
                for x in 1..w - 1 {
                    let center = block[y][x];
                    let above = center >= threshold;
                    let (mut sum, mut count) = (0, 0);
                    for row in &block[y - 1..=y + 1] {
                        for &v in &row[x - 1..=x + 1] {
                            if (v >= threshold) == above {
                                sum += v;
                                count += 1;
                            }
                        }
                    }
                    let mean = (sum + count / 2) / count;
                    let value = mean.clamp(center - q, center + q);
                    plane.data[(by + y) * pitch + bx + x] = value.clamp(0, 255) as u8;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::Chroma;

    const WIDTH: u32 = 32;
    const HEIGHT: u32 = 32;

    fn buffer() -> FrameBuffer {
        FrameBuffer::new(0, &Chroma::I420.planes(WIDTH, HEIGHT), 16)
    }

    fn fill_luma(buffer: &FrameBuffer, f: impl Fn(usize, usize) -> u8) {
        buffer.with_planes_mut(|planes| {
            let luma = &mut planes[0];
            for y in 0..luma.lines {
                for x in 0..luma.width {
                    luma.data[y * luma.pitch + x] = f(x, y);
                }
            }
        });
    }

    fn luma_at(buffer: &FrameBuffer, x: usize, y: usize) -> u8 {
        buffer.with_planes(|planes| planes[0].data[y * planes[0].stride + x])
    }

    fn all_filters() -> PostProcMode {
        PostProcMode::for_quality(6, false)
    }

    #[test]
    fn quality_levels_add_filters() {
        assert_eq!(PostProcMode::for_quality(0, false), PostProcMode::empty());
        assert_eq!(
            PostProcMode::for_quality(2, false),
            PostProcMode::DEBLOCK_LUMA_H | PostProcMode::DEBLOCK_LUMA_V
        );
        assert!(PostProcMode::for_quality(6, false).contains(PostProcMode::DERING_CHROMA));
        assert_eq!(PostProcMode::for_quality(60, false), all_filters());
        assert_eq!(
            PostProcMode::for_quality(0, true),
            PostProcMode::AUTO_LEVEL
        );
        assert!(!PostProcessor::new(PostProcMode::AUTO_LEVEL).is_active());
    }

    #[test]
    fn uniform_picture_is_unchanged() {
        let buffer = buffer();
        fill_luma(&buffer, |_, _| 77);
        buffer.with_planes_mut(|planes| {
            planes[1].data.fill(128);
            planes[2].data.fill(128);
        });
        let before = buffer.with_planes(|planes| {
            planes.iter().map(|p| p.data.to_vec()).collect::<Vec<_>>()
        });

        let quant = QuantTable::uniform(2, 2, 31);
        let postproc = PostProcessor::new(all_filters());
        assert!(postproc.apply(&buffer, Chroma::I420, Some(&quant), false));

        let after = buffer.with_planes(|planes| {
            planes.iter().map(|p| p.data.to_vec()).collect::<Vec<_>>()
        });
        assert_eq!(before, after);
    }

    #[test]
    fn small_block_step_is_smoothed() {
        let buffer = buffer();
        fill_luma(&buffer, |x, _| if x < 8 { 100 } else { 108 });
        let quant = QuantTable::uniform(2, 2, 10);

        PostProcessor::new(PostProcMode::DEBLOCK_LUMA_H).apply(
            &buffer,
            Chroma::I420,
            Some(&quant),
            false,
        );

        let p0 = luma_at(&buffer, 7, 3);
        let q0 = luma_at(&buffer, 8, 3);
        assert!(p0 > 100 && q0 < 108, "p0 {} q0 {}", p0, q0);
        assert!(q0 >= p0);
        // Samples away from the edge are untouched.
        assert_eq!(luma_at(&buffer, 5, 3), 100);
        assert_eq!(luma_at(&buffer, 10, 3), 108);
    }

    #[test]
    fn strong_edge_is_kept() {
        let buffer = buffer();
        fill_luma(&buffer, |_, y| if y < 8 { 20 } else { 220 });
        let quant = QuantTable::uniform(2, 2, 10);

        PostProcessor::new(PostProcMode::DEBLOCK_LUMA_V).apply(
            &buffer,
            Chroma::I420,
            Some(&quant),
            false,
        );

        assert_eq!(luma_at(&buffer, 4, 7), 20);
        assert_eq!(luma_at(&buffer, 4, 8), 220);
    }

    #[test]
    fn vertical_deblocking_smooths_rows() {
        let buffer = buffer();
        fill_luma(&buffer, |_, y| if y < 16 { 60 } else { 64 });
        let quant = QuantTable::uniform(2, 2, 8);

        PostProcessor::new(PostProcMode::DEBLOCK_LUMA_V).apply(
            &buffer,
            Chroma::I420,
            Some(&quant),
            false,
        );

        assert!(luma_at(&buffer, 3, 15) > 60);
        assert!(luma_at(&buffer, 3, 16) < 64);
    }

    #[test]
    fn dering_flattens_ripple_and_keeps_edge() {
        let buffer = buffer();
        fill_luma(&buffer, |x, y| {
            if x % 8 >= 4 {
                200
            } else if (x + y) % 2 == 0 {
                100
            } else {
                104
            }
        });
        let quant = QuantTable::uniform(2, 2, 8);

        PostProcessor::new(PostProcMode::DERING_LUMA).apply(
            &buffer,
            Chroma::I420,
            Some(&quant),
            false,
        );

        for y in 1..7 {
            for x in 1..4 {
                let v = luma_at(&buffer, x, y);
                assert!((101..=103).contains(&v), "({}, {}) = {}", x, y, v);
            }
            for x in 4..8 {
                assert_eq!(luma_at(&buffer, x, y), 200);
            }
        }
    }

    #[test]
    fn auto_level_drops_dering_when_late() {
        let ripple = |x: usize, y: usize| {
            if x % 8 >= 4 {
                200
            } else if (x + y) % 2 == 0 {
                100
            } else {
                104
            }
        };
        let quant = QuantTable::uniform(2, 2, 8);
        let processor = PostProcessor::new(PostProcMode::DERING_LUMA | PostProcMode::AUTO_LEVEL);

        let buffer = buffer();
        fill_luma(&buffer, ripple);
        processor.apply(&buffer, Chroma::I420, Some(&quant), true);
        assert_eq!(luma_at(&buffer, 2, 2), 100);
        assert_eq!(luma_at(&buffer, 3, 2), 104);

        processor.apply(&buffer, Chroma::I420, Some(&quant), false);
        assert_ne!(luma_at(&buffer, 3, 2), 104);
    }

    #[test]
    fn nothing_runs_without_quantizers_or_on_other_layouts() {
        let processor = PostProcessor::new(all_filters());
        let buffer = buffer();
        assert!(!processor.apply(&buffer, Chroma::I420, None, false));

        let quant = QuantTable::uniform(2, 2, 8);
        let packed = FrameBuffer::new(1, &Chroma::Yuy2.planes(WIDTH, HEIGHT), 16);
        assert!(!processor.apply(&packed, Chroma::Yuy2, Some(&quant), false));
        assert!(processor.apply(&buffer, Chroma::Yv12, Some(&quant), false));
        assert!(!PostProcessor::disabled().apply(&buffer, Chroma::I420, Some(&quant), false));
    }

    #[test]
    fn quant_lookup_is_clamped() {
        let quant = QuantTable {
            mb_width: 2,
            mb_height: 1,
            stride: 3,
            values: vec![4, 5, 99],
        };
        assert_eq!(quant.at(0, 0), 4);
        assert_eq!(quant.at(7, 9), 5);
        assert_eq!(QuantTable::uniform(0, 0, 3).at(0, 0), 0);
    }
}
