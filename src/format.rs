// Copyright 2026 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Pixel formats, sink chroma layouts and the stream description shared by the pipeline.

use std::fmt;
use std::fmt::Display;
use std::str::FromStr;

use enumn::N;
use thiserror::Error as ThisError;

/// Pixel formats a decoder can produce.
#[derive(PartialEq, Eq, N, Clone, Copy, Debug)]
#[repr(u32)]
pub enum PixelFormat {
    Yuv420p = 0,
    /// Packed 4:2:2, Y0 U Y1 V.
    Yuv422 = 1,
    Rgb24 = 2,
    Bgr24 = 3,
    Yuv422p = 4,
    Yuv444p = 5,
    Yuv410p = 6,
}

/// Chroma layouts understood by display sinks.
#[derive(PartialEq, Eq, Clone, Copy, Debug, Hash)]
pub enum Chroma {
    I420,
    /// Same as I420 with the two chroma planes swapped.
    Yv12,
    Yuy2,
    I422,
    I444,
    Rv24,
}

/// Dimensions of one plane, in bytes per row and rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaneSize {
    pub width: usize,
    pub lines: usize,
}

fn half(v: usize) -> usize {
    (v + 1) / 2
}

fn quarter(v: usize) -> usize {
    (v + 3) / 4
}

fn planar(width: usize, height: usize, chroma_width: usize, chroma_lines: usize) -> Vec<PlaneSize> {
    vec![
        PlaneSize {
            width,
            lines: height,
        },
        PlaneSize {
            width: chroma_width,
            lines: chroma_lines,
        },
        PlaneSize {
            width: chroma_width,
            lines: chroma_lines,
        },
    ]
}

fn packed(width: usize, height: usize) -> Vec<PlaneSize> {
    vec![PlaneSize {
        width,
        lines: height,
    }]
}

impl PixelFormat {
    /// Plane dimensions of a `width`x`height` picture in this format.
    pub fn planes(self, width: u32, height: u32) -> Vec<PlaneSize> {
        use PixelFormat::*;
        let (w, h) = (width as usize, height as usize);
        match self {
            Yuv420p => planar(w, h, half(w), half(h)),
            Yuv422 => packed(2 * w, h),
            Rgb24 | Bgr24 => packed(3 * w, h),
            Yuv422p => planar(w, h, half(w), h),
            Yuv444p => planar(w, h, w, h),
            Yuv410p => planar(w, h, quarter(w), quarter(h)),
        }
    }
}

impl Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use PixelFormat::*;
        match self {
            Yuv420p => write!(f, "yuv420p"),
            Yuv422 => write!(f, "yuv422"),
            Rgb24 => write!(f, "rgb24"),
            Bgr24 => write!(f, "bgr24"),
            Yuv422p => write!(f, "yuv422p"),
            Yuv444p => write!(f, "yuv444p"),
            Yuv410p => write!(f, "yuv410p"),
        }
    }
}

#[derive(Debug, ThisError, PartialEq, Eq)]
#[error("unknown pixel format: {0}")]
pub struct UnknownPixelFormat(String);

impl FromStr for PixelFormat {
    type Err = UnknownPixelFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        use PixelFormat::*;
        match s {
            "yuv420p" => Ok(Yuv420p),
            "yuv422" => Ok(Yuv422),
            "rgb24" => Ok(Rgb24),
            "bgr24" => Ok(Bgr24),
            "yuv422p" => Ok(Yuv422p),
            "yuv444p" => Ok(Yuv444p),
            "yuv410p" => Ok(Yuv410p),
            _ => Err(UnknownPixelFormat(s.to_owned())),
        }
    }
}

impl Chroma {
    /// Plane dimensions of a `width`x`height` buffer with this layout.
    pub fn planes(self, width: u32, height: u32) -> Vec<PlaneSize> {
        use Chroma::*;
        let (w, h) = (width as usize, height as usize);
        match self {
            I420 | Yv12 => planar(w, h, half(w), half(h)),
            Yuy2 => packed(2 * w, h),
            I422 => planar(w, h, half(w), h),
            I444 => planar(w, h, w, h),
            Rv24 => packed(3 * w, h),
        }
    }

    /// Whether this is one of the planar 4:2:0 layouts.
    pub fn is_planar_420(self) -> bool {
        matches!(self, Chroma::I420 | Chroma::Yv12)
    }

    pub fn fourcc(self) -> Fourcc {
        use Chroma::*;
        match self {
            I420 => Fourcc(*b"I420"),
            Yv12 => Fourcc(*b"YV12"),
            Yuy2 => Fourcc(*b"YUY2"),
            I422 => Fourcc(*b"I422"),
            I444 => Fourcc(*b"I444"),
            Rv24 => Fourcc(*b"RV24"),
        }
    }
}

impl Display for Chroma {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.fourcc().fmt(f)
    }
}

/// Maps a decoder pixel format to the sink chroma layout that can take its planes unchanged.
///
/// This is an approximation: it only looks at plane arrangement and subsampling and ignores
/// colour range and matrix. Formats without an entry must be converted before they can be shown.
pub fn chroma_for(format: PixelFormat) -> Option<Chroma> {
    use PixelFormat::*;
    match format {
        Yuv420p => Some(Chroma::I420),
        Yuv422 => Some(Chroma::Yuy2),
        Rgb24 => Some(Chroma::Rv24),
        Yuv422p => Some(Chroma::I422),
        Yuv444p => Some(Chroma::I444),
        Bgr24 | Yuv410p => None,
    }
}

/// Layout used for formats `chroma_for` cannot map.
pub const FALLBACK_CHROMA: Chroma = Chroma::I420;

/// Four character code, as found in stream headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Fourcc(pub [u8; 4]);

impl Fourcc {
    pub const fn new(code: &[u8; 4]) -> Self {
        Fourcc(*code)
    }
}

impl Display for Fourcc {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for &c in &self.0 {
            let c = if c.is_ascii_graphic() { c as char } else { '.' };
            write!(f, "{}", c)?;
        }
        Ok(())
    }
}

/// Codecs the output stage knows about. Only used to pick codec-specific behaviour; the actual
/// bitstream decoding is the decoder's business.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum CodecId {
    Mpeg1Video,
    Mpeg2Video,
    Mpeg4,
    MsMpeg4V1,
    MsMpeg4V2,
    MsMpeg4V3,
    H263,
    H263I,
    H264,
    Mjpeg,
    RawVideo,
}

impl CodecId {
    /// Whether quantizer-driven post-processing makes sense for this codec family.
    pub fn supports_postproc(self) -> bool {
        use CodecId::*;
        matches!(
            self,
            MsMpeg4V1 | MsMpeg4V2 | MsMpeg4V3 | Mpeg4 | H263 | H263I
        )
    }
}

impl Display for CodecId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use CodecId::*;
        match self {
            Mpeg1Video => write!(f, "mpeg1video"),
            Mpeg2Video => write!(f, "mpeg2video"),
            Mpeg4 => write!(f, "mpeg4"),
            MsMpeg4V1 => write!(f, "msmpeg4v1"),
            MsMpeg4V2 => write!(f, "msmpeg4v2"),
            MsMpeg4V3 => write!(f, "msmpeg4v3"),
            H263 => write!(f, "h263"),
            H263I => write!(f, "h263i"),
            H264 => write!(f, "h264"),
            Mjpeg => write!(f, "mjpeg"),
            RawVideo => write!(f, "rawvideo"),
        }
    }
}

/// Geometry of the decoded stream, as last reported by the decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamGeometry {
    pub width: u32,
    pub height: u32,
    /// Raw codec aspect code, see [`crate::aspect::AspectCode`].
    pub aspect_code: u32,
    pub pixel_format: PixelFormat,
}

impl StreamGeometry {
    pub fn has_display_size(&self) -> bool {
        self.width != 0 && self.height != 0
    }
}

/// Description of an elementary video stream handed to a decode session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamFormat {
    pub codec: CodecId,
    pub fourcc: Fourcc,
    pub width: u32,
    pub height: u32,
    pub aspect_code: u32,
    pub pixel_format: PixelFormat,
    /// Codec specific header bytes following the stream header, if any.
    pub extra_data: Vec<u8>,
}

impl StreamFormat {
    pub fn geometry(&self) -> StreamGeometry {
        StreamGeometry {
            width: self.width,
            height: self.height,
            aspect_code: self.aspect_code,
            pixel_format: self.pixel_format,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pixel_format_from_raw_value() {
        assert_eq!(PixelFormat::n(0), Some(PixelFormat::Yuv420p));
        assert_eq!(PixelFormat::n(6), Some(PixelFormat::Yuv410p));
        assert_eq!(PixelFormat::n(7), None);
    }

    #[test]
    fn pixel_format_names_round_trip() {
        for raw in 0..7 {
            let format = PixelFormat::n(raw).unwrap();
            assert_eq!(format.to_string().parse::<PixelFormat>(), Ok(format));
        }
        assert!("nv12".parse::<PixelFormat>().is_err());
    }

    #[test]
    fn chroma_map_is_partial() {
        assert_eq!(chroma_for(PixelFormat::Yuv420p), Some(Chroma::I420));
        assert_eq!(chroma_for(PixelFormat::Yuv444p), Some(Chroma::I444));
        assert_eq!(chroma_for(PixelFormat::Yuv410p), None);
        assert_eq!(chroma_for(PixelFormat::Bgr24), None);
    }

    #[test]
    fn mapped_chroma_has_same_plane_sizes() {
        for raw in 0..7 {
            let format = PixelFormat::n(raw).unwrap();
            if let Some(chroma) = chroma_for(format) {
                assert_eq!(format.planes(33, 17), chroma.planes(33, 17), "{}", format);
            }
        }
    }

    #[test]
    fn subsampled_planes_round_up() {
        let planes = PixelFormat::Yuv410p.planes(18, 10);
        assert_eq!(planes[0], PlaneSize { width: 18, lines: 10 });
        assert_eq!(planes[1], PlaneSize { width: 5, lines: 3 });

        let planes = Chroma::I420.planes(17, 9);
        assert_eq!(planes[2], PlaneSize { width: 9, lines: 5 });
    }

    #[test]
    fn postproc_codec_family() {
        assert!(CodecId::Mpeg4.supports_postproc());
        assert!(CodecId::H263I.supports_postproc());
        assert!(!CodecId::H264.supports_postproc());
        assert!(!CodecId::RawVideo.supports_postproc());
    }

    #[test]
    fn fourcc_display() {
        assert_eq!(Chroma::Yv12.to_string(), "YV12");
        assert_eq!(Fourcc([b'm', b'p', 0, b'4']).to_string(), "mp.4");
    }
}
