// Copyright 2026 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Per-stream decode loop.
//!
//! A [`DecodeSession`] owns everything one stream needs on its way to the display: the decoder,
//! the coded frame source, the attached sink, the direct rendering retention window and the
//! lateness policy. It is driven one coded frame at a time through
//! [`DecodeSession::process_one_frame`].

use std::sync::Arc;

use chroma::ConversionError;
use log::debug;
use log::error;
use log::info;
use log::warn;
use remain::sorted;
use serde::Serialize;
use thiserror::Error as ThisError;

use crate::buffers::acquire_buffer;
use crate::buffers::DirectRenderError;
use crate::buffers::DirectRenderer;
use crate::buffers::RetentionWindow;
use crate::cancel::StopSignals;
use crate::config::Parameters;
use crate::decoder::DecodeOptions;
use crate::decoder::DecodedPicture;
use crate::decoder::DecoderCapabilities;
use crate::decoder::OpenError;
use crate::decoder::OpenOptions;
use crate::decoder::RawPicture;
use crate::decoder::VideoDecoder;
use crate::format::chroma_for;
use crate::format::CodecId;
use crate::format::Fourcc;
use crate::format::PixelFormat;
use crate::format::StreamFormat;
use crate::format::StreamGeometry;
use crate::lateness::Clock;
use crate::lateness::FrameDecision;
use crate::lateness::LatenessPolicy;
use crate::postproc::PostProcMode;
use crate::postproc::PostProcessor;
use crate::sink::FrameBuffer;
use crate::sink::NegotiationError;
use crate::sink::PipelineId;
use crate::sink::PresentationContext;
use crate::sink::SinkHandle;
use crate::sink::SinkNegotiator;
use crate::source::CodedFrame;
use crate::source::Source;
use crate::source::SourceError;

/// Fourccs of MPEG-4 part 2 streams whose decoder configuration travels as extra data.
const MPEG4_EXTRADATA_FOURCCS: [Fourcc; 4] = [
    Fourcc::new(b"MP4S"),
    Fourcc::new(b"mp4s"),
    Fourcc::new(b"M4S2"),
    Fourcc::new(b"m4s2"),
];

#[sorted]
#[derive(Debug, ThisError)]
pub enum SessionError {
    #[error("stopped while waiting for a buffer")]
    Cancelled,
    #[error("failed to convert picture: {0}")]
    Conversion(ConversionError),
    #[error("session halted after a fatal error")]
    Halted,
    #[error("sink negotiation failed: {0}")]
    Negotiation(NegotiationError),
    #[error("cannot open decoder: {0}")]
    Open(OpenError),
    #[error("cannot read coded frames: {0}")]
    Source(SourceError),
    #[error("pixel format {0} cannot be displayed")]
    UnsupportedFormat(PixelFormat),
}

pub type SessionResult<T> = std::result::Result<T, SessionError>;

/// What happened to one coded frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// A picture was handed to the sink.
    Presented { timestamp: u64 },
    /// Decoded to keep the decoder's reference state, but not shown.
    DecodedOnly,
    /// Dropped before decoding because the session is too late.
    Skipped,
    /// Decoded without producing a picture.
    NoPicture,
    /// The decoder rejected the frame.
    DecodeFailed,
    /// A picture was decoded before the stream dimensions were known.
    NoDisplay,
    EndOfStream,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    pub pulled: u64,
    pub decoded: u64,
    pub presented: u64,
    pub hurried: u64,
    pub skipped: u64,
    pub errors: u64,
}

/// Decodes one stream and presents its pictures.
pub struct DecodeSession {
    params: Parameters,
    capabilities: DecoderCapabilities,
    decoder: Box<dyn VideoDecoder>,
    source: Box<dyn Source>,
    context: Arc<PresentationContext>,
    negotiator: SinkNegotiator,
    sink: Option<SinkHandle>,
    window: RetentionWindow,
    lateness: LatenessPolicy,
    postproc: PostProcessor,
    clock: Box<dyn Clock>,
    signals: StopSignals,
    direct_rendering: bool,
    stats: SessionStats,
    halted: bool,
}

impl DecodeSession {
    /// Opens `decoder` for `format` and attaches the session to `context`.
    pub fn new(
        format: StreamFormat,
        params: Parameters,
        mut decoder: Box<dyn VideoDecoder>,
        source: Box<dyn Source>,
        context: Arc<PresentationContext>,
        signals: StopSignals,
        clock: Box<dyn Clock>,
    ) -> SessionResult<Self> {
        if format.width == 0 || format.height == 0 {
            warn!("display information missing");
        }

        let capabilities = decoder.capabilities();
        let direct_rendering = capabilities.direct_rendering
            && params.direct_rendering
            && chroma_for(format.pixel_format).is_some();
        if direct_rendering {
            debug!("using direct rendering");
        }
        if chroma_for(format.pixel_format).is_none() {
            info!("internal chroma conversion from {}", format.pixel_format);
        }

        decoder
            .open(&OpenOptions {
                codec: format.codec,
                geometry: format.geometry(),
                workaround_bugs: params.workaround_bugs(),
                error_resilience: params.error_resilience(),
                grayscale: params.grayscale,
                direct_rendering,
            })
            .map_err(|e| {
                error!("cannot open codec {}: {}", format.codec, e);
                SessionError::Open(e)
            })?;
        debug!("{} decoder started", format.codec);

        if !format.extra_data.is_empty() {
            if format.codec == CodecId::Mpeg4 {
                // Let the decoder parse the headers before the first frame.
                if let Err(e) = decoder.decode(&format.extra_data, DecodeOptions::default(), None)
                {
                    debug!("extra data not accepted by the decoder: {}", e);
                }
            } else if MPEG4_EXTRADATA_FOURCCS.contains(&format.fourcc) {
                decoder.set_extradata(&format.extra_data);
            }
        }

        let postproc = PostProcessor::new(Self::postproc_mode(&format, &params, &capabilities));
        let negotiator = SinkNegotiator::new(context.register_pipeline());

        Ok(DecodeSession {
            window: RetentionWindow::new(params.retention_depth()),
            lateness: LatenessPolicy::new(params.hurry_up),
            params,
            capabilities,
            decoder,
            source,
            context,
            negotiator,
            sink: None,
            postproc,
            clock,
            signals,
            direct_rendering,
            stats: Default::default(),
            halted: false,
        })
    }

    fn postproc_mode(
        format: &StreamFormat,
        params: &Parameters,
        capabilities: &DecoderCapabilities,
    ) -> PostProcMode {
        if !params.wants_postproc() {
            return PostProcMode::empty();
        }
        if !format.codec.supports_postproc() || !capabilities.quantizer_export {
            warn!("post-processing unsupported for this codec");
            return PostProcMode::empty();
        }
        params.postproc_overrides()
            | PostProcMode::for_quality(params.postproc_quality(), params.postproc_auto)
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    pub fn pipeline(&self) -> PipelineId {
        self.negotiator.pipeline()
    }

    pub fn is_direct_rendering(&self) -> bool {
        self.direct_rendering
    }

    pub fn postproc_mode_in_use(&self) -> PostProcMode {
        self.postproc.mode()
    }

    /// The sink pictures are currently presented on.
    pub fn sink(&self) -> Option<&SinkHandle> {
        self.sink.as_ref()
    }

    /// Number of buffers currently pinned for the decoder.
    pub fn retained_buffers(&self) -> usize {
        self.window.len()
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Raises the error signal, drops every buffer reference and refuses any further work.
    fn fail<T>(&mut self, err: SessionError) -> SessionResult<T> {
        error!("decode session stopped: {}", err);
        if !self.signals.should_stop() {
            self.signals.raise_error();
        }
        self.window.release_all();
        self.halted = true;
        Err(err)
    }

    /// Pulls coded frames until a non-empty one shows up.
    fn pull_frame(&mut self) -> Result<Option<CodedFrame>, SourceError> {
        loop {
            match self.source.pull_coded_frame(&self.signals)? {
                Some(frame) if frame.payload.is_empty() => continue,
                frame => return Ok(frame),
            }
        }
    }

    /// Gives back buffers handed to the decoder that will not be presented. They stay linked in
    /// the retention window.
    fn return_unused(acquired: &[(SinkHandle, FrameBuffer)], presented: Option<&FrameBuffer>) {
        for (sink, buffer) in acquired {
            if presented.map_or(true, |p| !p.is_same(buffer)) {
                sink.lock().release_buffer(buffer);
            }
        }
    }

    /// Pulls, decodes and presents one coded frame.
    ///
    /// Fatal errors halt the session: they are returned once, and every later call returns
    /// `SessionError::Halted`.
    pub fn process_one_frame(&mut self) -> SessionResult<FrameOutcome> {
        if self.halted {
            return Err(SessionError::Halted);
        }

        let decision = self.lateness.decide();

        let frame = match self.pull_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => return Ok(FrameOutcome::EndOfStream),
            Err(SourceError::Cancelled) => return self.fail(SessionError::Cancelled),
            Err(e) => return self.fail(SessionError::Source(e)),
        };
        self.stats.pulled += 1;

        if decision == FrameDecision::Skip {
            debug!("skipping frame at {} ({} late)", frame.pts, self.lateness.late_frames());
            self.stats.skipped += 1;
            return Ok(FrameOutcome::Skipped);
        }

        let hurry = decision == FrameDecision::Hurry;
        let options = DecodeOptions {
            hurry: hurry && self.capabilities.hurry_up,
        };

        let (result, acquired) = if self.direct_rendering {
            let mut renderer = DirectRenderer::new(
                &self.negotiator,
                &self.context,
                &mut self.sink,
                &mut self.window,
                &self.signals,
                self.params.retry_interval(),
            );
            let result = self.decoder.decode(&frame.payload, options, Some(&mut renderer));
            let (acquired, failure) = renderer.finish();
            match failure {
                None => {}
                Some(DirectRenderError::Cancelled) => {
                    Self::return_unused(&acquired, None);
                    return self.fail(SessionError::Cancelled);
                }
                Some(DirectRenderError::Negotiation(e)) => {
                    Self::return_unused(&acquired, None);
                    return self.fail(SessionError::Negotiation(e));
                }
            }
            (result, acquired)
        } else {
            (self.decoder.decode(&frame.payload, options, None), Vec::new())
        };

        let picture = match result {
            Ok(picture) => picture,
            Err(e) => {
                warn!("cannot decode one frame ({} bytes): {}", frame.payload.len(), e);
                Self::return_unused(&acquired, None);
                self.stats.errors += 1;
                return Ok(FrameOutcome::DecodeFailed);
            }
        };
        self.stats.decoded += 1;
        self.lateness.record(frame.pts <= self.clock.now());

        let picture = match picture {
            Some(picture) if decision == FrameDecision::Draw => picture,
            Some(_) => {
                Self::return_unused(&acquired, None);
                self.stats.hurried += 1;
                return Ok(FrameOutcome::DecodedOnly);
            }
            None => {
                Self::return_unused(&acquired, None);
                return Ok(FrameOutcome::NoPicture);
            }
        };

        let (sink, buffer) = match picture {
            DecodedPicture::Direct(buffer) => {
                Self::return_unused(&acquired, Some(&buffer));
                let sink = acquired
                    .iter()
                    .find(|(_, b)| b.is_same(&buffer))
                    .map(|(sink, _)| sink.clone())
                    .or_else(|| self.sink.clone());
                match sink {
                    Some(sink) => (sink, buffer),
                    None => return Ok(FrameOutcome::NoPicture),
                }
            }
            DecodedPicture::Owned(raw) => {
                Self::return_unused(&acquired, None);
                if raw.is_empty() {
                    return Ok(FrameOutcome::NoPicture);
                }
                match self.prepare_indirect(&raw)? {
                    Some(prepared) => prepared,
                    None => return Ok(FrameOutcome::NoDisplay),
                }
            }
        };

        self.postproc.apply(
            &buffer,
            sink.geometry().chroma,
            self.decoder.quantizer_table(),
            self.lateness.late_frames() > 0,
        );

        sink.lock().present(&buffer, frame.pts);
        self.stats.presented += 1;
        Ok(FrameOutcome::Presented {
            timestamp: frame.pts,
        })
    }

    /// Negotiates a sink for `raw`, then acquires a buffer and copies the picture into it.
    ///
    /// Returns `Ok(None)` while the picture dimensions are unknown.
    fn prepare_indirect(
        &mut self,
        raw: &RawPicture,
    ) -> SessionResult<Option<(SinkHandle, FrameBuffer)>> {
        let geometry = StreamGeometry {
            width: raw.width,
            height: raw.height,
            aspect_code: self.decoder.geometry().aspect_code,
            pixel_format: raw.format,
        };

        let sink = match self.negotiator.ensure_sink(&self.context, &mut self.sink, &geometry) {
            Ok(sink) => sink,
            Err(NegotiationError::NoDisplaySize) => {
                debug!("display information missing, picture dropped");
                return Ok(None);
            }
            Err(e) => {
                error!("cannot create sink");
                return self.fail(SessionError::Negotiation(e));
            }
        };

        let buffer = match acquire_buffer(&sink, &self.signals, self.params.retry_interval()) {
            Ok(buffer) => buffer,
            Err(_) => return self.fail(SessionError::Cancelled),
        };

        if let Err(e) = copy_picture(raw, &buffer) {
            sink.lock().release_buffer(&buffer);
            return self.fail(e);
        }
        Ok(Some((sink, buffer)))
    }

    /// Calls `process_one_frame()` until the end of the stream or a stop request.
    pub fn run(&mut self) -> SessionResult<SessionStats> {
        while !self.signals.should_stop() {
            if self.process_one_frame()? == FrameOutcome::EndOfStream {
                break;
            }
        }
        info!("decode session finished: {:?}", self.stats);
        Ok(self.stats)
    }
}

/// Copies `raw` into `buffer`, converting the layout if the sink cannot take it as is.
fn copy_picture(raw: &RawPicture, buffer: &FrameBuffer) -> SessionResult<()> {
    let source = raw.plane_refs();
    match (chroma_for(raw.format), raw.format) {
        (Some(_), _) => {
            buffer.with_planes_mut(|targets| {
                for (source, target) in source.iter().zip(targets.iter_mut()) {
                    chroma::copy_plane(source, target);
                }
            });
            Ok(())
        }
        (None, PixelFormat::Yuv410p) => buffer
            .with_planes_mut(|targets| {
                chroma::convert_i410_to_i420(
                    &source,
                    targets,
                    raw.width as usize,
                    raw.height as usize,
                )
            })
            .map_err(SessionError::Conversion),
        (None, format) => Err(SessionError::UnsupportedFormat(format)),
    }
}

impl Drop for DecodeSession {
    fn drop(&mut self) {
        self.window.release_all();
        if let Some(sink) = self.sink.take() {
            self.context.release_to_context(self.pipeline(), &sink);
        }
    }
}
