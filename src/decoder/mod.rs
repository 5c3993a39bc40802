// Copyright 2026 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! This module defines the interface a decoder library needs to implement to be driven by a
//! decode session.

pub mod raw;

use chroma::PlaneRef;
use remain::sorted;
use thiserror::Error as ThisError;

use crate::format::CodecId;
use crate::format::PixelFormat;
use crate::format::StreamGeometry;
use crate::postproc::QuantTable;
use crate::sink::FrameBuffer;

/// What a decoder can do, queried once when a session starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DecoderCapabilities {
    /// The decoder can write pictures into buffers supplied through a [`BufferProvider`].
    pub direct_rendering: bool,
    /// The decoder has a faster, lower fidelity decoding path.
    pub hurry_up: bool,
    /// The decoder exports per-macroblock quantizers of the last picture.
    pub quantizer_export: bool,
}

/// Settings passed to [`VideoDecoder::open`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenOptions {
    pub codec: CodecId,
    pub geometry: StreamGeometry,
    pub workaround_bugs: i32,
    pub error_resilience: i32,
    /// Skip chroma decoding.
    pub grayscale: bool,
    /// A [`BufferProvider`] will be passed to every `decode()` call.
    pub direct_rendering: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DecodeOptions {
    /// Take the fast path, if any.
    pub hurry: bool,
}

/// Coding type of the picture a buffer is requested for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PictureType {
    Intra,
    Predicted,
    Bidirectional,
}

/// A picture held in decoder-owned memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPicture {
    pub format: PixelFormat,
    pub width: u32,
    pub height: u32,
    pub planes: Vec<Vec<u8>>,
    pub strides: Vec<usize>,
}

impl RawPicture {
    pub fn plane_refs(&self) -> Vec<PlaneRef<'_>> {
        self.format
            .planes(self.width, self.height)
            .into_iter()
            .zip(self.planes.iter().zip(&self.strides))
            .map(|(size, (data, &stride))| PlaneRef {
                data,
                stride,
                width: size.width,
                lines: size.lines,
            })
            .collect()
    }

    /// Whether the picture carries any sample at all.
    pub fn is_empty(&self) -> bool {
        self.strides.first().map_or(true, |&stride| stride == 0)
    }
}

/// A picture produced by a decoder.
#[derive(Debug, Clone)]
pub enum DecodedPicture {
    /// Written into decoder memory, still to be copied into a sink buffer.
    Owned(RawPicture),
    /// Written straight into a buffer obtained from the [`BufferProvider`].
    Direct(FrameBuffer),
}

#[sorted]
#[derive(Debug, ThisError, PartialEq, Eq)]
pub enum DecodeError {
    #[error("corrupt bitstream: {0}")]
    Corrupt(String),
    #[error("payload holds {actual} bytes, {expected} expected")]
    Truncated { expected: usize, actual: usize },
}

#[sorted]
#[derive(Debug, ThisError, PartialEq, Eq)]
pub enum OpenError {
    #[error("codec {0} is not supported")]
    UnsupportedCodec(CodecId),
}

/// Supplies the buffers a decoder renders into in direct rendering mode.
pub trait BufferProvider {
    /// Returns the buffer the next picture, of geometry `geometry`, must be written to.
    ///
    /// `None` means no buffer can be provided for this picture and the decoder must use its own
    /// memory and return a [`DecodedPicture::Owned`].
    fn get_buffer(
        &mut self,
        geometry: &StreamGeometry,
        picture_type: PictureType,
    ) -> Option<FrameBuffer>;
}

/// A video decoder library.
pub trait VideoDecoder: Send {
    fn capabilities(&self) -> DecoderCapabilities;

    fn open(&mut self, options: &OpenOptions) -> Result<(), OpenError>;

    /// Installs out-of-band codec configuration data.
    fn set_extradata(&mut self, data: &[u8]);

    /// Geometry of the stream as currently known by the decoder.
    fn geometry(&self) -> StreamGeometry;

    /// Decodes one coded frame.
    ///
    /// Returns `Ok(None)` when the frame did not complete a picture. When `provider` is given,
    /// the decoder asks it for a destination buffer before writing a picture.
    fn decode(
        &mut self,
        payload: &[u8],
        options: DecodeOptions,
        provider: Option<&mut dyn BufferProvider>,
    ) -> Result<Option<DecodedPicture>, DecodeError>;

    /// Quantizers of the last decoded picture, if exported.
    fn quantizer_table(&self) -> Option<&QuantTable>;
}
