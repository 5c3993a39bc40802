// Copyright 2026 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Decoder for uncompressed planar video.
//!
//! Every payload carries one picture, planes stored back to back without padding, in the pixel
//! format of the current stream geometry. A payload made of a geometry header (see
//! [`geometry_header`]) changes the geometry instead and produces no picture; the same header is
//! accepted as extra data.

use chroma::copy_plane;
use chroma::PlaneRef;
use log::debug;

use super::BufferProvider;
use super::DecodeError;
use super::DecodeOptions;
use super::DecodedPicture;
use super::DecoderCapabilities;
use super::OpenError;
use super::OpenOptions;
use super::PictureType;
use super::RawPicture;
use super::VideoDecoder;
use crate::format::PixelFormat;
use crate::format::StreamGeometry;
use crate::postproc::QuantTable;

/// First bytes of a geometry header.
pub const GEOMETRY_MAGIC: [u8; 4] = *b"GEOM";
const GEOMETRY_HEADER_LEN: usize = 20;

/// Neutral chroma value written in grayscale mode.
const GRAY_CHROMA: u8 = 128;

/// Encodes a header announcing `geometry`.
pub fn geometry_header(geometry: &StreamGeometry) -> Vec<u8> {
    let mut header = Vec::with_capacity(GEOMETRY_HEADER_LEN);
    header.extend_from_slice(&GEOMETRY_MAGIC);
    header.extend_from_slice(&geometry.width.to_le_bytes());
    header.extend_from_slice(&geometry.height.to_le_bytes());
    header.extend_from_slice(&geometry.aspect_code.to_le_bytes());
    header.extend_from_slice(&(geometry.pixel_format as u32).to_le_bytes());
    header
}

fn read_u32(bytes: &[u8], offset: usize) -> Option<u32> {
    let b = bytes.get(offset..offset + 4)?;
    Some(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

/// Parses a geometry header, or returns `None` if `payload` is not one.
fn parse_geometry_header(payload: &[u8]) -> Option<Result<StreamGeometry, DecodeError>> {
    if !payload.starts_with(&GEOMETRY_MAGIC) {
        return None;
    }
    if payload.len() != GEOMETRY_HEADER_LEN {
        return Some(Err(DecodeError::Corrupt(format!(
            "geometry header of {} bytes",
            payload.len()
        ))));
    }

    let field = |offset| read_u32(payload, offset).unwrap_or_default();
    let raw_format = field(16);
    Some(match PixelFormat::n(raw_format) {
        Some(pixel_format) => Ok(StreamGeometry {
            width: field(4),
            height: field(8),
            aspect_code: field(12),
            pixel_format,
        }),
        None => Err(DecodeError::Corrupt(format!(
            "unknown pixel format {}",
            raw_format
        ))),
    })
}

pub struct RawDecoder {
    capabilities: DecoderCapabilities,
    geometry: StreamGeometry,
    grayscale: bool,
    extradata: Vec<u8>,
    quantizer: Option<u8>,
    quant_table: Option<QuantTable>,
    hurried: u64,
}

impl RawDecoder {
    pub fn new() -> Self {
        RawDecoder {
            capabilities: DecoderCapabilities {
                direct_rendering: true,
                hurry_up: true,
                quantizer_export: false,
            },
            geometry: StreamGeometry {
                width: 0,
                height: 0,
                aspect_code: 0,
                pixel_format: PixelFormat::Yuv420p,
            },
            grayscale: false,
            extradata: Vec::new(),
            quantizer: None,
            quant_table: None,
            hurried: 0,
        }
    }

    pub fn without_direct_rendering(mut self) -> Self {
        self.capabilities.direct_rendering = false;
        self
    }

    /// Exports `quantizer` for every macroblock of every picture.
    pub fn with_quantizer(mut self, quantizer: u8) -> Self {
        self.capabilities.quantizer_export = true;
        self.quantizer = Some(quantizer);
        self
    }

    pub fn extradata(&self) -> &[u8] {
        &self.extradata
    }

    /// Number of pictures decoded on the hurry path.
    pub fn hurried_frames(&self) -> u64 {
        self.hurried
    }

    fn split_planes(&self, payload: &[u8]) -> Result<Vec<(Vec<u8>, usize)>, DecodeError> {
        let sizes = self
            .geometry
            .pixel_format
            .planes(self.geometry.width, self.geometry.height);
        let expected: usize = sizes.iter().map(|p| p.width * p.lines).sum();
        if payload.len() < expected {
            return Err(DecodeError::Truncated {
                expected,
                actual: payload.len(),
            });
        }
        if payload.len() > expected {
            return Err(DecodeError::Corrupt(format!(
                "{} trailing bytes",
                payload.len() - expected
            )));
        }

        let mut rest = payload;
        let mut planes = Vec::with_capacity(sizes.len());
        for (index, size) in sizes.iter().enumerate() {
            let (data, tail) = rest.split_at(size.width * size.lines);
            rest = tail;
            let data = if self.grayscale && index > 0 && sizes.len() == 3 {
                vec![GRAY_CHROMA; data.len()]
            } else {
                data.to_vec()
            };
            planes.push((data, size.width));
        }
        Ok(planes)
    }
}

impl Default for RawDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl VideoDecoder for RawDecoder {
    fn capabilities(&self) -> DecoderCapabilities {
        self.capabilities
    }

    fn open(&mut self, options: &OpenOptions) -> Result<(), OpenError> {
        debug!(
            "raw decoder opened for {} ({}x{} {})",
            options.codec,
            options.geometry.width,
            options.geometry.height,
            options.geometry.pixel_format
        );
        self.geometry = options.geometry;
        self.grayscale = options.grayscale;
        Ok(())
    }

    fn set_extradata(&mut self, data: &[u8]) {
        if let Some(Ok(geometry)) = parse_geometry_header(data) {
            self.geometry = geometry;
        }
        self.extradata = data.to_vec();
    }

    fn geometry(&self) -> StreamGeometry {
        self.geometry
    }

    fn decode(
        &mut self,
        payload: &[u8],
        options: DecodeOptions,
        provider: Option<&mut dyn BufferProvider>,
    ) -> Result<Option<DecodedPicture>, DecodeError> {
        if let Some(header) = parse_geometry_header(payload) {
            self.geometry = header?;
            return Ok(None);
        }

        if !self.geometry.has_display_size() {
            // Nothing tells how the payload is laid out yet: hand it over as one opaque plane.
            return Ok(Some(DecodedPicture::Owned(RawPicture {
                format: self.geometry.pixel_format,
                width: 0,
                height: 0,
                planes: vec![payload.to_vec()],
                strides: vec![payload.len()],
            })));
        }

        let planes = self.split_planes(payload)?;
        if options.hurry {
            self.hurried += 1;
        }
        if let Some(quantizer) = self.quantizer {
            self.quant_table = Some(QuantTable::uniform(
                (self.geometry.width as usize + 15) / 16,
                (self.geometry.height as usize + 15) / 16,
                quantizer,
            ));
        }

        let sizes = self
            .geometry
            .pixel_format
            .planes(self.geometry.width, self.geometry.height);
        let buffer = provider.and_then(|p| p.get_buffer(&self.geometry, PictureType::Intra));
        if let Some(buffer) = buffer {
            buffer.with_planes_mut(|targets| {
                for ((size, (data, stride)), target) in
                    sizes.iter().zip(&planes).zip(targets.iter_mut())
                {
                    let source = PlaneRef {
                        data,
                        stride: *stride,
                        width: size.width,
                        lines: size.lines,
                    };
                    copy_plane(&source, target);
                }
            });
            return Ok(Some(DecodedPicture::Direct(buffer)));
        }

        let (planes, strides) = planes.into_iter().unzip();
        Ok(Some(DecodedPicture::Owned(RawPicture {
            format: self.geometry.pixel_format,
            width: self.geometry.width,
            height: self.geometry.height,
            planes,
            strides,
        })))
    }

    fn quantizer_table(&self) -> Option<&QuantTable> {
        self.quant_table.as_ref()
    }
}
