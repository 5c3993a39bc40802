// Copyright 2026 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use log::debug;
use log::info;
use remain::sorted;
use thiserror::Error as ThisError;

use super::PipelineId;
use super::PresentationContext;
use super::SinkGeometry;
use super::SinkHandle;
use crate::aspect::resolve_aspect;
use crate::format::chroma_for;
use crate::format::StreamGeometry;
use crate::format::FALLBACK_CHROMA;

#[sorted]
#[derive(Debug, ThisError)]
pub enum NegotiationError {
    #[error("cannot create sink: {0:#}")]
    CreateFailed(anyhow::Error),
    #[error("display size is not known yet")]
    NoDisplaySize,
}

/// Sink geometry able to display pictures of `stream`.
///
/// Formats without a sink chroma get the fallback layout; their pictures must be converted.
pub fn target_geometry(stream: &StreamGeometry) -> SinkGeometry {
    SinkGeometry {
        width: stream.width,
        height: stream.height,
        chroma: chroma_for(stream.pixel_format).unwrap_or(FALLBACK_CHROMA),
        aspect: resolve_aspect(stream.width, stream.height, stream.aspect_code),
    }
}

/// Finds or creates the display sink of one pipeline.
pub struct SinkNegotiator {
    pipeline: PipelineId,
}

impl SinkNegotiator {
    pub fn new(pipeline: PipelineId) -> Self {
        SinkNegotiator { pipeline }
    }

    pub fn pipeline(&self) -> PipelineId {
        self.pipeline
    }

    /// Makes sure a sink able to display `requested` is attached to this pipeline and stored in
    /// `current`.
    ///
    /// The candidate is the sink already attached to the pipeline or, failing that, any sink left
    /// in the context by a finished pipeline. A matching candidate is reused, a mismatched one is
    /// destroyed and replaced by a new sink.
    pub fn ensure_sink(
        &self,
        context: &PresentationContext,
        current: &mut Option<SinkHandle>,
        requested: &StreamGeometry,
    ) -> Result<SinkHandle, NegotiationError> {
        if !requested.has_display_size() {
            return Err(NegotiationError::NoDisplaySize);
        }

        let target = target_geometry(requested);
        if let Some(sink) = current {
            if sink.geometry().matches(&target) {
                return Ok(sink.clone());
            }
        }

        let result = context.with_registry(|registry| {
            let candidate = registry
                .owned_by(self.pipeline)
                .or_else(|| registry.unowned());
            if let Some(index) = candidate {
                if registry.get(index).handle.geometry().matches(&target) {
                    debug!("reattaching sink {}", registry.get(index).handle.id());
                    return Ok(registry.attach(index, self.pipeline));
                }
                registry.destroy(index);
            }

            info!("no sink present, spawning one ({})", target);
            registry
                .create(&target, self.pipeline)
                .map_err(NegotiationError::CreateFailed)
        });

        *current = result.as_ref().ok().cloned();
        result
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;
    use crate::aspect::Aspect;
    use crate::format::Chroma;
    use crate::format::PixelFormat;
    use crate::sink::memory::MemorySinkFactory;

    fn stream(width: u32, height: u32, pixel_format: PixelFormat) -> StreamGeometry {
        StreamGeometry {
            width,
            height,
            aspect_code: 1,
            pixel_format,
        }
    }

    fn setup() -> (MemorySinkFactory, PresentationContext) {
        let factory = MemorySinkFactory::new(2);
        let context = PresentationContext::new(factory.clone());
        (factory, context)
    }

    #[test]
    fn target_falls_back_for_unmapped_formats() {
        let target = target_geometry(&stream(64, 48, PixelFormat::Yuv410p));
        assert_eq!(target.chroma, Chroma::I420);
        assert_eq!(target.aspect, Aspect::FOUR_THIRDS);
    }

    #[test]
    fn created_sink_matches_its_request() {
        let (factory, context) = setup();
        let negotiator = SinkNegotiator::new(context.register_pipeline());
        let mut current = None;
        let requested = stream(64, 48, PixelFormat::Yuv420p);

        let sink = negotiator
            .ensure_sink(&context, &mut current, &requested)
            .unwrap();
        assert!(sink.geometry().matches(&target_geometry(&requested)));

        for _ in 0..10 {
            let again = negotiator
                .ensure_sink(&context, &mut current, &requested)
                .unwrap();
            assert_eq!(again.id(), sink.id());
        }
        assert_eq!(factory.created_count(), 1);
        assert_eq!(current.map(|s| s.id()), Some(sink.id()));
    }

    #[test]
    fn zero_size_is_not_negotiated() {
        let (factory, context) = setup();
        let negotiator = SinkNegotiator::new(context.register_pipeline());
        let mut current = None;

        let err = negotiator
            .ensure_sink(&context, &mut current, &stream(0, 48, PixelFormat::Yuv420p))
            .unwrap_err();
        assert!(matches!(err, NegotiationError::NoDisplaySize));
        assert_eq!(factory.created_count(), 0);
        assert!(current.is_none());
    }

    #[test]
    fn mismatch_destroys_and_recreates() {
        let (factory, context) = setup();
        let negotiator = SinkNegotiator::new(context.register_pipeline());
        let mut current = None;

        let first = negotiator
            .ensure_sink(&context, &mut current, &stream(64, 48, PixelFormat::Yuv420p))
            .unwrap();
        let second = negotiator
            .ensure_sink(&context, &mut current, &stream(128, 96, PixelFormat::Yuv420p))
            .unwrap();

        assert_ne!(first.id(), second.id());
        assert_eq!(factory.created_count(), 2);
        assert_eq!(context.sink_count(), 1);
        assert!(factory.sinks()[0].lock().unwrap().is_destroyed());
    }

    #[test]
    fn sink_left_by_finished_pipeline_is_reused() {
        let (factory, context) = setup();
        let requested = stream(64, 48, PixelFormat::Yuv444p);

        let first = SinkNegotiator::new(context.register_pipeline());
        let mut current = None;
        let sink = first
            .ensure_sink(&context, &mut current, &requested)
            .unwrap();
        context.release_to_context(first.pipeline(), &sink);

        let second = SinkNegotiator::new(context.register_pipeline());
        let mut current = None;
        let reused = second
            .ensure_sink(&context, &mut current, &requested)
            .unwrap();

        assert_eq!(reused.id(), sink.id());
        assert_eq!(factory.created_count(), 1);
        assert_eq!(context.sink_of(second.pipeline()).map(|s| s.id()), Some(sink.id()));
    }

    #[test]
    fn live_sink_of_another_pipeline_is_left_alone() {
        let (factory, context) = setup();
        let requested = stream(64, 48, PixelFormat::Yuv420p);

        let first = SinkNegotiator::new(context.register_pipeline());
        let mut first_current = None;
        first
            .ensure_sink(&context, &mut first_current, &requested)
            .unwrap();

        let second = SinkNegotiator::new(context.register_pipeline());
        let mut second_current = None;
        second
            .ensure_sink(&context, &mut second_current, &stream(32, 32, PixelFormat::Yuv420p))
            .unwrap();

        assert_eq!(factory.created_count(), 2);
        assert_eq!(context.sink_count(), 2);
        assert!(!factory.sinks()[0].lock().unwrap().is_destroyed());
    }

    #[test]
    fn creation_failure_is_reported() {
        let (factory, context) = setup();
        factory.set_failing(true);
        let negotiator = SinkNegotiator::new(context.register_pipeline());
        let mut current = None;

        let err = negotiator
            .ensure_sink(&context, &mut current, &stream(64, 48, PixelFormat::Yuv420p))
            .unwrap_err();
        assert!(matches!(err, NegotiationError::CreateFailed(_)));
        assert!(current.is_none());
        assert_eq!(context.sink_count(), 0);
    }

    #[test]
    fn concurrent_pipelines_share_one_context() {
        const PIPELINES: usize = 4;
        const ROUNDS: u32 = 200;

        let (_factory, context) = setup();
        let context = Arc::new(context);

        let workers: Vec<_> = (0..PIPELINES)
            .map(|_| {
                let context = context.clone();
                thread::spawn(move || {
                    let negotiator = SinkNegotiator::new(context.register_pipeline());
                    let mut current = None;
                    for round in 0..ROUNDS {
                        let width = if round % 2 == 0 { 16 } else { 32 };
                        let requested = stream(width, 16, PixelFormat::Yuv420p);
                        let sink = negotiator
                            .ensure_sink(&context, &mut current, &requested)
                            .unwrap();
                        assert_eq!(*sink.geometry(), target_geometry(&requested));
                        if round % 10 == 5 {
                            context.release_to_context(negotiator.pipeline(), &sink);
                            current = None;
                        }
                    }
                    (negotiator, current)
                })
            })
            .collect();

        let pipelines: Vec<_> = workers.into_iter().map(|w| w.join().unwrap()).collect();
        // Each pipeline ends owning exactly one sink; released sinks were all taken back.
        assert!(pipelines.iter().all(|(_, current)| current.is_some()));
        assert_eq!(context.sink_count(), PIPELINES);
        assert!(context.unowned_sinks().is_empty());
        for (negotiator, current) in &pipelines {
            let owned = context.sink_of(negotiator.pipeline()).unwrap();
            assert_eq!(owned.id(), current.as_ref().unwrap().id());
        }
    }
}
