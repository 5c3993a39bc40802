// Copyright 2026 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Display sinks and their negotiation.
//!
//! A sink owns a pool of [`FrameBuffer`]s of one fixed geometry and presents them. Sinks live in
//! a [`PresentationContext`] shared by every pipeline; the [`SinkNegotiator`] of a pipeline finds,
//! reuses, tears down or creates the sink matching the stream it decodes.

mod buffer;
mod context;
pub mod memory;
mod negotiator;

use std::fmt;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;

pub use buffer::FrameBuffer;
pub use buffer::PlaneLayout;
pub use context::PipelineId;
pub use context::PresentationContext;
pub use negotiator::target_geometry;
pub use negotiator::NegotiationError;
pub use negotiator::SinkNegotiator;

use crate::aspect::Aspect;
use crate::format::Chroma;

/// Configured geometry of a display sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SinkGeometry {
    pub width: u32,
    pub height: u32,
    pub chroma: Chroma,
    pub aspect: Aspect,
}

impl SinkGeometry {
    /// Whether a sink configured with `self` can display pictures of `requested` geometry.
    pub fn matches(&self, requested: &SinkGeometry) -> bool {
        self.width == requested.width
            && self.height == requested.height
            && self.chroma == requested.chroma
            && self.aspect == requested.aspect
    }
}

impl fmt::Display for SinkGeometry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}x{} {} ({})",
            self.width, self.height, self.chroma, self.aspect
        )
    }
}

/// Buffer allocation and presentation contract of a display sink.
///
/// Scan-out happens elsewhere; implementations only need to track which buffers are free.
pub trait DisplaySink: Send {
    /// Returns a free buffer, or `None` if every buffer is in use.
    fn acquire_buffer(&mut self) -> Option<FrameBuffer>;

    /// Gives back a buffer obtained from `acquire_buffer()` without presenting it.
    fn release_buffer(&mut self, buffer: &FrameBuffer);

    /// Queues `buffer` for display at `timestamp`.
    fn present(&mut self, buffer: &FrameBuffer, timestamp: u64);

    /// Releases every resource of the sink. No other method is called afterwards.
    fn destroy(&mut self);

    /// Keeps `buffer` from being handed out again until a matching `unlink_buffer()`.
    fn link_buffer(&mut self, buffer: &FrameBuffer) {
        buffer.link();
    }

    fn unlink_buffer(&mut self, buffer: &FrameBuffer) {
        buffer.unlink();
    }
}

/// Creates display sinks for a presentation context.
pub trait SinkFactory: Send {
    fn create_sink(
        &mut self,
        geometry: &SinkGeometry,
    ) -> anyhow::Result<Arc<Mutex<dyn DisplaySink>>>;
}

/// Unique identifier of a sink within its presentation context.
pub type SinkId = u64;

/// Shared reference to a sink registered in a presentation context.
#[derive(Clone)]
pub struct SinkHandle {
    id: SinkId,
    geometry: SinkGeometry,
    sink: Arc<Mutex<dyn DisplaySink>>,
}

impl SinkHandle {
    pub(crate) fn new(
        id: SinkId,
        geometry: SinkGeometry,
        sink: Arc<Mutex<dyn DisplaySink>>,
    ) -> Self {
        SinkHandle { id, geometry, sink }
    }

    pub fn id(&self) -> SinkId {
        self.id
    }

    pub fn geometry(&self) -> &SinkGeometry {
        &self.geometry
    }

    pub fn lock(&self) -> MutexGuard<'_, dyn DisplaySink + 'static> {
        self.sink.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for SinkHandle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("SinkHandle")
            .field("id", &self.id)
            .field("geometry", &self.geometry)
            .finish()
    }
}
