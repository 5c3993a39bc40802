// Copyright 2026 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! 4:1:0 (YUV410P) to 4:2:0 (I420) conversion.
//!
//! This is a cheap stand-in for proper chroma resampling: samples are doubled horizontally with
//! a two-tap average, then every other row is synthesized from the rows around it. All averages
//! truncate.

use crate::copy_rows;
use crate::ConversionError;
use crate::PlaneMut;
use crate::PlaneRef;

/// A chroma plane upsampled to twice the width and twice the height of its source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsampledPlane {
    /// Tightly packed rows of `width` bytes.
    pub data: Vec<u8>,
    pub width: usize,
    pub lines: usize,
}

impl UpsampledPlane {
    pub fn row(&self, y: usize) -> &[u8] {
        &self.data[y * self.width..(y + 1) * self.width]
    }
}

fn average(a: u8, b: u8) -> u8 {
    ((u16::from(a) + u16::from(b)) / 2) as u8
}

/// Writes two output samples per input sample into `dst`: the sample itself, then its average
/// with the next one. The last input sample has no successor and is written twice.
fn double_row(src: &[u8], dst: &mut [u8]) {
    let last = match src.last() {
        Some(&last) => last,
        None => return,
    };

    for (x, pair) in src.windows(2).enumerate() {
        dst[2 * x] = pair[0];
        dst[2 * x + 1] = average(pair[0], pair[1]);
    }

    let end = 2 * src.len();
    dst[end - 2] = last;
    dst[end - 1] = last;
}

/// Upsamples one 4:1:0 chroma plane to 4:2:0 resolution.
///
/// The result always has exactly `2 * src.width` columns and `2 * src.lines` rows, whatever the
/// stride of the source. `src.data` is expected to cover `src.required_len()` bytes; missing
/// samples are left at zero.
pub fn upsample_410_plane(src: &PlaneRef) -> UpsampledPlane {
    let width = 2 * src.width;
    let lines = 2 * src.lines;
    let mut data = vec![0u8; width * lines];

    if width == 0 || lines == 0 {
        return UpsampledPlane { data, width, lines };
    }

    // Even rows: horizontally doubled source rows.
    for y in 0..src.lines {
        let start = 2 * y * width;
        double_row(src.row(y), &mut data[start..start + width]);
    }

    // Odd rows: average of the even row above and the even row below.
    for y in 0..src.lines - 1 {
        let (head, tail) = data.split_at_mut((2 * y + 1) * width);
        let above = &head[2 * y * width..];
        let (row, below) = tail.split_at_mut(width);
        for ((out, &a), &b) in row.iter_mut().zip(above).zip(below.iter()) {
            *out = average(a, b);
        }
    }

    // Nothing below the last even row, so the last row repeats it.
    data.copy_within((lines - 2) * width..(lines - 1) * width, (lines - 1) * width);

    UpsampledPlane { data, width, lines }
}

/// Converts a three-plane 4:1:0 picture into a three-plane 4:2:0 target.
///
/// Luma is copied row by row (`width` bytes for `height` rows). Each chroma plane is upsampled
/// into a scratch plane that is then copied into the target, clipped to the target pitch and row
/// count: targets are usually padded for alignment, so their pitch may exceed the scratch stride.
pub fn convert_i410_to_i420(
    src: &[PlaneRef],
    dst: &mut [PlaneMut],
    width: usize,
    height: usize,
) -> Result<(), ConversionError> {
    if src.len() < 3 {
        return Err(ConversionError::PlaneCount {
            expected: 3,
            actual: src.len(),
        });
    }
    if dst.len() < 3 {
        return Err(ConversionError::PlaneCount {
            expected: 3,
            actual: dst.len(),
        });
    }
    for (plane, src) in src.iter().take(3).enumerate() {
        if src.data.len() < src.required_len() {
            return Err(ConversionError::ShortPlane {
                plane,
                expected: src.required_len(),
                actual: src.data.len(),
            });
        }
    }

    let luma = &src[0];
    copy_rows(
        luma.data,
        luma.stride,
        &mut dst[0],
        width.min(luma.width),
        height.min(luma.lines),
    );

    for plane in 1..3 {
        let scratch = upsample_410_plane(&src[plane]);
        let target = &mut dst[plane];
        let row_len = scratch.width.min(target.pitch);
        copy_rows(&scratch.data, scratch.width, target, row_len, scratch.lines);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plane(data: &[u8], stride: usize, width: usize, lines: usize) -> PlaneRef<'_> {
        PlaneRef {
            data,
            stride,
            width,
            lines,
        }
    }

    #[test]
    fn horizontal_doubling_averages_neighbours_and_repeats_last_sample() {
        let src = [10u8, 20, 40];
        let up = upsample_410_plane(&plane(&src, 3, 3, 1));

        assert_eq!(up.width, 6);
        assert_eq!(up.lines, 2);
        assert_eq!(up.row(0), &[10, 15, 20, 30, 40, 40]);
        // Single source row: the synthesized row is a copy.
        assert_eq!(up.row(1), up.row(0));
    }

    #[test]
    fn vertical_interpolation_uses_rows_above_and_below() {
        let src = [0u8, 100, 50, 50];
        let up = upsample_410_plane(&plane(&src, 2, 2, 2));

        assert_eq!(up.row(0), &[0, 50, 100, 100]);
        assert_eq!(up.row(1), &[25, 50, 75, 75]);
        assert_eq!(up.row(2), &[50, 50, 50, 50]);
        assert_eq!(up.row(3), &[50, 50, 50, 50]);
    }

    #[test]
    fn averages_truncate() {
        let src = [1u8, 2, 255, 254];
        let up = upsample_410_plane(&plane(&src, 2, 2, 2));

        assert_eq!(up.row(0), &[1, 1, 2, 2]);
        assert_eq!(up.row(1), &[128, 127, 128, 128]);
    }

    #[test]
    fn constant_field_stays_constant() {
        for value in [0u8, 1, 127, 128, 254, 255] {
            let src = vec![value; 5 * 7];
            let up = upsample_410_plane(&plane(&src, 5, 5, 7));
            assert!(up.data.iter().all(|&s| s == value), "value {}", value);
        }
    }

    #[test]
    fn output_dimensions_ignore_source_padding() {
        // 3x2 plane stored with a stride of 8; the padding must not leak into the output.
        let mut src = vec![0xeeu8; 8 * 2];
        src[..3].copy_from_slice(&[9, 9, 9]);
        src[8..11].copy_from_slice(&[9, 9, 9]);
        let up = upsample_410_plane(&plane(&src, 8, 3, 2));

        assert_eq!(up.width, 6);
        assert_eq!(up.lines, 4);
        assert_eq!(up.data.len(), 6 * 4);
        assert!(up.data.iter().all(|&s| s == 9));
    }

    #[test]
    fn empty_plane_produces_empty_output() {
        let up = upsample_410_plane(&plane(&[], 0, 0, 0));
        assert_eq!(up.width, 0);
        assert_eq!(up.lines, 0);
        assert!(up.data.is_empty());
    }

    #[test]
    fn convert_fills_padded_target() {
        const WIDTH: usize = 16;
        const HEIGHT: usize = 8;
        const PITCH: usize = 32;

        let luma = vec![100u8; WIDTH * HEIGHT];
        let cb = vec![60u8; 4 * 2];
        let cr = vec![200u8; 4 * 2];
        let src = [
            plane(&luma, WIDTH, WIDTH, HEIGHT),
            plane(&cb, 4, 4, 2),
            plane(&cr, 4, 4, 2),
        ];

        let mut y = vec![0u8; PITCH * HEIGHT];
        let mut u = vec![0u8; PITCH / 2 * HEIGHT / 2];
        let mut v = vec![0u8; PITCH / 2 * HEIGHT / 2];
        let mut dst = [
            PlaneMut {
                data: &mut y,
                pitch: PITCH,
                width: WIDTH,
                lines: HEIGHT,
            },
            PlaneMut {
                data: &mut u,
                pitch: PITCH / 2,
                width: WIDTH / 2,
                lines: HEIGHT / 2,
            },
            PlaneMut {
                data: &mut v,
                pitch: PITCH / 2,
                width: WIDTH / 2,
                lines: HEIGHT / 2,
            },
        ];

        convert_i410_to_i420(&src, &mut dst, WIDTH, HEIGHT).unwrap();

        for row in y.chunks(PITCH) {
            assert!(row[..WIDTH].iter().all(|&s| s == 100));
            assert!(row[WIDTH..].iter().all(|&s| s == 0));
        }
        for row in u.chunks(PITCH / 2) {
            assert!(row[..WIDTH / 2].iter().all(|&s| s == 60));
            assert!(row[WIDTH / 2..].iter().all(|&s| s == 0));
        }
        for row in v.chunks(PITCH / 2) {
            assert!(row[..WIDTH / 2].iter().all(|&s| s == 200));
        }
    }

    #[test]
    fn convert_rejects_short_planes() {
        let luma = vec![0u8; 16];
        let chroma = vec![0u8; 1];
        let src = [
            plane(&luma, 4, 4, 4),
            plane(&chroma, 1, 1, 1),
            plane(&chroma, 2, 2, 1),
        ];
        let mut a = vec![0u8; 16];
        let mut b = vec![0u8; 4];
        let mut c = vec![0u8; 4];
        let mut dst = [
            PlaneMut {
                data: &mut a,
                pitch: 4,
                width: 4,
                lines: 4,
            },
            PlaneMut {
                data: &mut b,
                pitch: 2,
                width: 2,
                lines: 2,
            },
            PlaneMut {
                data: &mut c,
                pitch: 2,
                width: 2,
                lines: 2,
            },
        ];

        assert_eq!(
            convert_i410_to_i420(&src, &mut dst, 4, 4),
            Err(ConversionError::ShortPlane {
                plane: 2,
                expected: 2,
                actual: 1,
            })
        );
    }

    #[test]
    fn convert_needs_three_planes() {
        let luma = vec![0u8; 16];
        let src = [plane(&luma, 4, 4, 4)];
        assert_eq!(
            convert_i410_to_i420(&src, &mut [], 4, 4),
            Err(ConversionError::PlaneCount {
                expected: 3,
                actual: 1,
            })
        );
    }
}
