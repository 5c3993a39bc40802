// Copyright 2026 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Frame buffer lifecycle: acquisition from a sink and the references kept on behalf of the
//! decoder in direct rendering mode.

use std::collections::VecDeque;
use std::thread;
use std::time::Duration;

use log::error;
use remain::sorted;
use thiserror::Error as ThisError;

use crate::cancel::StopSignals;
use crate::decoder::BufferProvider;
use crate::decoder::PictureType;
use crate::format::chroma_for;
use crate::format::StreamGeometry;
use crate::sink::FrameBuffer;
use crate::sink::NegotiationError;
use crate::sink::PresentationContext;
use crate::sink::SinkHandle;
use crate::sink::SinkNegotiator;

#[sorted]
#[derive(Debug, ThisError, PartialEq, Eq)]
pub enum BufferError {
    #[error("buffer acquisition cancelled")]
    Cancelled,
}

/// Waits for a free buffer of `sink`.
///
/// The sink is polled every `retry_interval` until it yields a buffer. `signals` is checked
/// after every failed attempt, so a stop request is noticed within one interval.
pub fn acquire_buffer(
    sink: &SinkHandle,
    signals: &StopSignals,
    retry_interval: Duration,
) -> Result<FrameBuffer, BufferError> {
    loop {
        if let Some(buffer) = sink.lock().acquire_buffer() {
            return Ok(buffer);
        }
        if signals.should_stop() {
            return Err(BufferError::Cancelled);
        }
        thread::sleep(retry_interval);
    }
}

struct Pinned {
    sink: SinkHandle,
    buffer: FrameBuffer,
}

/// The last few buffers handed to the decoder, linked so their sink does not reuse them while the
/// decoder may still read them as reference pictures.
///
/// Inserting into a full window unlinks the oldest entry. A decoder referencing pictures older
/// than the window depth reads buffers that may already have been overwritten.
pub struct RetentionWindow {
    depth: usize,
    entries: VecDeque<Pinned>,
}

impl RetentionWindow {
    pub fn new(depth: usize) -> Self {
        let depth = depth.max(1);
        RetentionWindow {
            depth,
            entries: VecDeque::with_capacity(depth + 1),
        }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Links `buffer` and makes it the newest entry, unlinking the oldest one if the window
    /// overflows.
    pub fn insert(&mut self, sink: &SinkHandle, buffer: &FrameBuffer) {
        sink.lock().link_buffer(buffer);
        self.entries.push_back(Pinned {
            sink: sink.clone(),
            buffer: buffer.clone(),
        });
        while self.entries.len() > self.depth {
            if let Some(evicted) = self.entries.pop_front() {
                evicted.sink.lock().unlink_buffer(&evicted.buffer);
            }
        }
    }

    /// Unlinks every entry, newest first.
    pub fn release_all(&mut self) {
        while let Some(pinned) = self.entries.pop_back() {
            pinned.sink.lock().unlink_buffer(&pinned.buffer);
        }
    }

    /// Pinned buffers, oldest first.
    pub fn buffers(&self) -> impl Iterator<Item = &FrameBuffer> {
        self.entries.iter().map(|p| &p.buffer)
    }
}

impl Drop for RetentionWindow {
    fn drop(&mut self) {
        self.release_all();
    }
}

#[sorted]
#[derive(Debug, ThisError)]
pub enum DirectRenderError {
    #[error("buffer acquisition cancelled")]
    Cancelled,
    #[error("sink negotiation failed: {0}")]
    Negotiation(NegotiationError),
}

impl From<BufferError> for DirectRenderError {
    fn from(e: BufferError) -> Self {
        match e {
            BufferError::Cancelled => DirectRenderError::Cancelled,
        }
    }
}

/// Hands sink buffers to a decoder rendering in place.
///
/// Lives for one `decode()` call. Every buffer given out is pinned in the retention window and
/// remembered, so that buffers the decoder did not end up returning can be given back.
pub struct DirectRenderer<'a> {
    negotiator: &'a SinkNegotiator,
    context: &'a PresentationContext,
    sink: &'a mut Option<SinkHandle>,
    window: &'a mut RetentionWindow,
    signals: &'a StopSignals,
    retry_interval: Duration,
    acquired: Vec<(SinkHandle, FrameBuffer)>,
    failure: Option<DirectRenderError>,
}

impl<'a> DirectRenderer<'a> {
    pub fn new(
        negotiator: &'a SinkNegotiator,
        context: &'a PresentationContext,
        sink: &'a mut Option<SinkHandle>,
        window: &'a mut RetentionWindow,
        signals: &'a StopSignals,
        retry_interval: Duration,
    ) -> Self {
        DirectRenderer {
            negotiator,
            context,
            sink,
            window,
            signals,
            retry_interval,
            acquired: Vec::new(),
            failure: None,
        }
    }

    /// Buffers given to the decoder, in order, and the error that stopped the renderer if any.
    pub fn finish(self) -> (Vec<(SinkHandle, FrameBuffer)>, Option<DirectRenderError>) {
        (self.acquired, self.failure)
    }
}

impl BufferProvider for DirectRenderer<'_> {
    fn get_buffer(
        &mut self,
        geometry: &StreamGeometry,
        _picture_type: PictureType,
    ) -> Option<FrameBuffer> {
        if self.failure.is_some() {
            return None;
        }
        // Formats the sink cannot take as is are converted after decoding.
        chroma_for(geometry.pixel_format)?;

        let sink = match self
            .negotiator
            .ensure_sink(self.context, self.sink, geometry)
        {
            Ok(sink) => sink,
            Err(NegotiationError::NoDisplaySize) => return None,
            Err(e) => {
                error!("cannot create sink: {}", e);
                self.failure = Some(DirectRenderError::Negotiation(e));
                return None;
            }
        };

        let buffer = match acquire_buffer(&sink, self.signals, self.retry_interval) {
            Ok(buffer) => buffer,
            Err(e) => {
                self.failure = Some(e.into());
                return None;
            }
        };

        self.window.insert(&sink, &buffer);
        self.acquired.push((sink, buffer.clone()));
        Some(buffer)
    }
}
